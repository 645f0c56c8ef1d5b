use abi::{
    BookingStatus, Caller, Id, LotOccupancy, NewParkingLot, ParkingError, ParkingLot,
    PaymentStatus, SlotStatus, Validator,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};
use tracing::{error, info};

use crate::{slot, ParkingLots, ParkingManager};

const LOT_COLUMNS: &str = "id, name, location, total_spaces, available_spaces, \
                           charging_fee_per_hour, admin_id, created_at";

pub(crate) async fn get(conn: &mut SqliteConnection, id: Id) -> Result<ParkingLot, ParkingError> {
    sqlx::query_as::<_, ParkingLot>(&format!("SELECT {LOT_COLUMNS} FROM parking_lots WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ParkingError::ParkingLotNotFound(id))
}

async fn insert(
    conn: &mut SqliteConnection,
    admin_id: Id,
    lot: &NewParkingLot,
    now: DateTime<Utc>,
) -> Result<ParkingLot, ParkingError> {
    let lot = sqlx::query_as::<_, ParkingLot>(&format!(
        "INSERT INTO parking_lots \
         (name, location, total_spaces, available_spaces, charging_fee_per_hour, admin_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {LOT_COLUMNS}"
    ))
    .bind(lot.name.trim())
    .bind(lot.location.trim())
    .bind(lot.total_spaces)
    .bind(lot.total_spaces)
    .bind(lot.charging_fee_per_hour.to_string())
    .bind(admin_id)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;
    Ok(lot)
}

/// The only writer of `available_spaces`. Moves the counter by `delta` and
/// fails instead of clamping when the result would leave `0..=total`.
pub(crate) async fn adjust_available(
    conn: &mut SqliteConnection,
    lot_id: Id,
    delta: i64,
) -> Result<ParkingLot, ParkingError> {
    let lot = get(conn, lot_id).await?;
    let value = lot.available_spaces + delta;
    if value < 0 || value > lot.total_spaces {
        error!(lot_id, value, total = lot.total_spaces, "occupancy counter drift");
        return Err(ParkingError::CounterOutOfRange {
            lot_id,
            value,
            total: lot.total_spaces,
        });
    }

    let updated = sqlx::query_as::<_, ParkingLot>(&format!(
        "UPDATE parking_lots SET available_spaces = ? \
         WHERE id = ? AND available_spaces = ? RETURNING {LOT_COLUMNS}"
    ))
    .bind(value)
    .bind(lot_id)
    .bind(lot.available_spaces)
    .fetch_optional(&mut *conn)
    .await?;

    updated.ok_or(ParkingError::ConcurrencyConflict)
}

pub(crate) async fn occupancy(
    conn: &mut SqliteConnection,
    lot_id: Id,
) -> Result<LotOccupancy, ParkingError> {
    let lot = get(conn, lot_id).await?;
    let row = sqlx::query(
        "SELECT \
           COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0) AS occupied, \
           COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0) AS maintenance \
         FROM slots WHERE parking_lot_id = ?",
    )
    .bind(SlotStatus::Occupied)
    .bind(SlotStatus::Maintenance)
    .bind(lot_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(LotOccupancy {
        parking_lot_id: lot.id,
        total_spaces: lot.total_spaces,
        available_spaces: lot.available_spaces,
        occupied_slots: row.try_get("occupied")?,
        maintenance_slots: row.try_get("maintenance")?,
    })
}

#[async_trait]
impl ParkingLots for ParkingManager {
    async fn create_lot(
        &self,
        caller: &Caller,
        lot: NewParkingLot,
    ) -> Result<ParkingLot, ParkingError> {
        caller.require_admin()?;
        lot.validate()?;

        let lot = &lot;
        self.policy
            .run("create_lot", move || self.try_create_lot(caller, lot))
            .await
    }

    async fn get_lot(&self, id: Id) -> Result<ParkingLot, ParkingError> {
        let mut conn = self.pool.acquire().await?;
        get(&mut conn, id).await
    }

    async fn list_lots(&self) -> Result<Vec<ParkingLot>, ParkingError> {
        let lots = sqlx::query_as::<_, ParkingLot>(&format!(
            "SELECT {LOT_COLUMNS} FROM parking_lots ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(lots)
    }

    async fn delete_lot(&self, caller: &Caller, id: Id) -> Result<(), ParkingError> {
        caller.require_admin()?;

        self.policy
            .run("delete_lot", move || self.try_delete_lot(caller, id))
            .await?;
        self.locks.remove(id);
        Ok(())
    }

    async fn occupancy(&self, id: Id) -> Result<LotOccupancy, ParkingError> {
        let mut conn = self.pool.acquire().await?;
        occupancy(&mut conn, id).await
    }
}

impl ParkingManager {
    async fn try_create_lot(
        &self,
        caller: &Caller,
        new_lot: &NewParkingLot,
    ) -> Result<ParkingLot, ParkingError> {
        let mut tx = self.begin_write().await?;
        let lot = insert(&mut tx, caller.user_id, new_lot, self.clock.now()).await?;
        slot::create_for_lot(&mut tx, lot.id, lot.total_spaces, new_lot.slot_type).await?;
        tx.commit().await?;

        info!(lot_id = lot.id, total_spaces = lot.total_spaces, "parking lot created");
        Ok(lot)
    }

    async fn try_delete_lot(&self, caller: &Caller, id: Id) -> Result<(), ParkingError> {
        let _guard = self.locks.acquire(id).await;
        let mut tx = self.begin_write().await?;

        let lot = get(&mut tx, id).await?;
        if lot.admin_id != caller.user_id {
            return Err(ParkingError::Forbidden(format!(
                "lot {} is managed by another administrator",
                id
            )));
        }

        // history stays, open bookings are closed before their slots go away
        let cancelled = sqlx::query(
            "UPDATE bookings SET status = ?, payment_status = ?, updated_at = ? \
             WHERE parking_lot_id = ? AND status IN (?, ?)",
        )
        .bind(BookingStatus::Cancelled)
        .bind(PaymentStatus::Unpaid)
        .bind(self.clock.now())
        .bind(id)
        .bind(BookingStatus::Pending)
        .bind(BookingStatus::Approved)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let slots = slot::delete_for_lot(&mut tx, id).await?;
        sqlx::query("DELETE FROM parking_lots WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(lot_id = id, slots, cancelled, "parking lot deleted");
        Ok(())
    }
}
