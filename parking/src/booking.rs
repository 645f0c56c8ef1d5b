use abi::{
    Booking, BookingAction, BookingQuery, BookingStatus, Id, ParkingError, PaymentMethod,
    PaymentStatus,
};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

const BOOKING_COLUMNS: &str = "id, user_id, vehicle_id, parking_lot_id, slot_id, status, \
                               payment_status, payment_method, entry_time, planned_checkout_time, \
                               checkout_time, amount, created_at, updated_at";

/// Row values of a booking about to be written.
pub(crate) struct BookingRow {
    pub user_id: Id,
    pub vehicle_id: Id,
    pub parking_lot_id: Id,
    pub slot_id: Id,
    pub entry_time: DateTime<Utc>,
    pub planned_checkout_time: DateTime<Utc>,
}

pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    row: BookingRow,
    now: DateTime<Utc>,
) -> Result<Booking, ParkingError> {
    let booking = sqlx::query_as::<_, Booking>(&format!(
        "INSERT INTO bookings \
         (user_id, vehicle_id, parking_lot_id, slot_id, status, payment_status, \
          entry_time, planned_checkout_time, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {BOOKING_COLUMNS}"
    ))
    .bind(row.user_id)
    .bind(row.vehicle_id)
    .bind(row.parking_lot_id)
    .bind(row.slot_id)
    .bind(BookingStatus::Pending)
    .bind(PaymentStatus::Pending)
    .bind(row.entry_time)
    .bind(row.planned_checkout_time)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;
    Ok(booking)
}

pub(crate) async fn get(conn: &mut SqliteConnection, id: Id) -> Result<Booking, ParkingError> {
    sqlx::query_as::<_, Booking>(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ParkingError::BookingNotFound(id))
}

/// Persist the mutable fields of `booking`, provided the stored status is
/// still `expected`. Losing that race is a concurrency conflict.
pub(crate) async fn save(
    conn: &mut SqliteConnection,
    booking: &Booking,
    expected: BookingStatus,
) -> Result<Booking, ParkingError> {
    let updated = sqlx::query_as::<_, Booking>(&format!(
        "UPDATE bookings SET slot_id = ?, status = ?, payment_status = ?, payment_method = ?, \
         checkout_time = ?, amount = ?, updated_at = ? \
         WHERE id = ? AND status = ? RETURNING {BOOKING_COLUMNS}"
    ))
    .bind(booking.slot_id)
    .bind(booking.status)
    .bind(booking.payment_status)
    .bind(booking.payment_method)
    .bind(booking.checkout_time)
    .bind(booking.amount.map(|amount| amount.to_string()))
    .bind(booking.updated_at)
    .bind(booking.id)
    .bind(expected)
    .fetch_optional(&mut *conn)
    .await?;

    updated.ok_or(ParkingError::ConcurrencyConflict)
}

/// Record payment of a COMPLETED booking. A booking paid in the meantime
/// is reported as such.
pub(crate) async fn mark_paid(
    conn: &mut SqliteConnection,
    id: Id,
    method: PaymentMethod,
    now: DateTime<Utc>,
) -> Result<Booking, ParkingError> {
    let updated = sqlx::query_as::<_, Booking>(&format!(
        "UPDATE bookings SET payment_status = ?, payment_method = ?, updated_at = ? \
         WHERE id = ? AND status = ? AND payment_status != ? RETURNING {BOOKING_COLUMNS}"
    ))
    .bind(PaymentStatus::Paid)
    .bind(method)
    .bind(now)
    .bind(id)
    .bind(BookingStatus::Completed)
    .bind(PaymentStatus::Paid)
    .fetch_optional(&mut *conn)
    .await?;

    match updated {
        Some(booking) => Ok(booking),
        None => {
            let current = get(conn, id).await?;
            current.ensure(BookingAction::Pay)?;
            Err(ParkingError::ConcurrencyConflict)
        }
    }
}

/// The PENDING or APPROVED booking of a vehicle, if any.
pub(crate) async fn find_open_for_vehicle(
    conn: &mut SqliteConnection,
    vehicle_id: Id,
) -> Result<Option<Booking>, ParkingError> {
    let booking = sqlx::query_as::<_, Booking>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE vehicle_id = ? AND status IN (?, ?)"
    ))
    .bind(vehicle_id)
    .bind(BookingStatus::Pending)
    .bind(BookingStatus::Approved)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(booking)
}

pub(crate) async fn query(
    conn: &mut SqliteConnection,
    query: &BookingQuery,
) -> Result<Vec<Booking>, ParkingError> {
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE 1 = 1"));

    if let Some(user_id) = query.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(lot_id) = query.parking_lot_id {
        builder.push(" AND parking_lot_id = ").push_bind(lot_id);
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status);
    }

    builder.push(if query.desc {
        " ORDER BY id DESC"
    } else {
        " ORDER BY id ASC"
    });
    builder
        .push(" LIMIT ")
        .push_bind(query.page_size)
        .push(" OFFSET ")
        .push_bind(query.offset());

    let bookings = builder
        .build_query_as::<Booking>()
        .fetch_all(&mut *conn)
        .await?;
    Ok(bookings)
}

#[cfg(test)]
mod tests {
    use abi::BookingQueryBuilder;

    use super::*;
    use crate::{test_utils::TestDb, Bookings};

    #[tokio::test]
    async fn save_should_reject_stale_status() {
        let db = TestDb::new().await;
        let lot = db.lot(1, 10).await;
        let v = db.vehicle(&db.user, "CAS-1").await;
        let booking = db.book(&db.user, v.id, lot.id).await;

        let mut conn = db.pool.acquire().await.unwrap();
        let mut approved = booking.clone();
        approved.status = BookingStatus::Approved;
        save(&mut conn, &approved, BookingStatus::Pending)
            .await
            .unwrap();

        let mut declined = booking;
        declined.status = BookingStatus::Declined;
        assert_eq!(
            save(&mut conn, &declined, BookingStatus::Pending)
                .await
                .unwrap_err(),
            ParkingError::ConcurrencyConflict
        );
        assert_eq!(
            get(&mut conn, declined.id).await.unwrap().status,
            BookingStatus::Approved
        );
    }

    #[tokio::test]
    async fn query_should_filter_and_page() {
        let db = TestDb::new().await;
        let lot = db.lot(5, 10).await;
        let mut ids = Vec::new();
        for plate in ["Q-1", "Q-2", "Q-3"] {
            let v = db.vehicle(&db.user, plate).await;
            ids.push(db.book(&db.user, v.id, lot.id).await.id);
        }
        db.manager.approve(&db.admin, ids[0]).await.unwrap();

        let mut conn = db.pool.acquire().await.unwrap();

        let q = BookingQueryBuilder::default()
            .user_id(db.user.user_id)
            .page_size(2)
            .build()
            .unwrap();
        let page = query(&mut conn, &q).await.unwrap();
        assert_eq!(
            page.iter().map(|b| b.id).collect::<Vec<_>>(),
            vec![ids[2], ids[1]]
        );

        let q = BookingQueryBuilder::default()
            .page(2)
            .page_size(2)
            .build()
            .unwrap();
        let page = query(&mut conn, &q).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, ids[0]);

        let q = BookingQueryBuilder::default()
            .parking_lot_id(lot.id)
            .status(BookingStatus::Approved)
            .desc(false)
            .build()
            .unwrap();
        let page = query(&mut conn, &q).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, ids[0]);

        let q = BookingQueryBuilder::default().user_id(999).build().unwrap();
        assert!(query(&mut conn, &q).await.unwrap().is_empty());
    }
}
