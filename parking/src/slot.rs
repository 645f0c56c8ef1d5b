use abi::{Caller, Id, ParkingError, Slot, SlotStatus, VehicleType};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::info;

use crate::{lot, ParkingManager, Slots};

const SLOT_COLUMNS: &str = "id, parking_lot_id, number, slot_type, status";

/// sqlite caps bound parameters per statement, insert slots in chunks
const INSERT_CHUNK: usize = 200;

pub(crate) async fn get(conn: &mut SqliteConnection, id: Id) -> Result<Slot, ParkingError> {
    sqlx::query_as::<_, Slot>(&format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ParkingError::SlotNotFound(id))
}

pub(crate) async fn list(conn: &mut SqliteConnection, lot_id: Id) -> Result<Vec<Slot>, ParkingError> {
    let slots = sqlx::query_as::<_, Slot>(&format!(
        "SELECT {SLOT_COLUMNS} FROM slots WHERE parking_lot_id = ? ORDER BY number"
    ))
    .bind(lot_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(slots)
}

/// First AVAILABLE slot of the lot by number.
pub(crate) async fn find_available(
    conn: &mut SqliteConnection,
    lot_id: Id,
) -> Result<Option<Slot>, ParkingError> {
    let slot = sqlx::query_as::<_, Slot>(&format!(
        "SELECT {SLOT_COLUMNS} FROM slots WHERE parking_lot_id = ? AND status = ? ORDER BY number LIMIT 1"
    ))
    .bind(lot_id)
    .bind(SlotStatus::Available)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(slot)
}

/// Compare-and-swap of the slot status. A slot that is no longer in `from`
/// reports the transition it was asked for together with its real status.
async fn transition(
    conn: &mut SqliteConnection,
    id: Id,
    from: SlotStatus,
    to: SlotStatus,
) -> Result<Slot, ParkingError> {
    let updated = sqlx::query_as::<_, Slot>(&format!(
        "UPDATE slots SET status = ? WHERE id = ? AND status = ? RETURNING {SLOT_COLUMNS}"
    ))
    .bind(to)
    .bind(id)
    .bind(from)
    .fetch_optional(&mut *conn)
    .await?;

    match updated {
        Some(slot) => Ok(slot),
        None => {
            let current = get(conn, id).await?;
            Err(ParkingError::InvalidSlotTransition {
                id,
                from: current.status,
                to,
            })
        }
    }
}

pub(crate) async fn mark_occupied(conn: &mut SqliteConnection, id: Id) -> Result<Slot, ParkingError> {
    transition(conn, id, SlotStatus::Available, SlotStatus::Occupied).await
}

pub(crate) async fn mark_available(conn: &mut SqliteConnection, id: Id) -> Result<Slot, ParkingError> {
    transition(conn, id, SlotStatus::Occupied, SlotStatus::Available).await
}

/// Maintenance is only entered from and left to AVAILABLE, so the lot
/// counter never has to follow it.
pub(crate) async fn set_maintenance(
    conn: &mut SqliteConnection,
    id: Id,
    enabled: bool,
) -> Result<Slot, ParkingError> {
    if enabled {
        transition(conn, id, SlotStatus::Available, SlotStatus::Maintenance).await
    } else {
        transition(conn, id, SlotStatus::Maintenance, SlotStatus::Available).await
    }
}

/// Slots numbered 1..=count, all AVAILABLE.
pub(crate) async fn create_for_lot(
    conn: &mut SqliteConnection,
    lot_id: Id,
    count: i64,
    slot_type: VehicleType,
) -> Result<(), ParkingError> {
    let numbers: Vec<i64> = (1..=count).collect();
    for chunk in numbers.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO slots (parking_lot_id, number, slot_type, status) ");
        builder.push_values(chunk, |mut b, number| {
            b.push_bind(lot_id)
                .push_bind(*number)
                .push_bind(slot_type)
                .push_bind(SlotStatus::Available);
        });
        builder.build().execute(&mut *conn).await?;
    }
    Ok(())
}

pub(crate) async fn delete_for_lot(conn: &mut SqliteConnection, lot_id: Id) -> Result<u64, ParkingError> {
    let res = sqlx::query("DELETE FROM slots WHERE parking_lot_id = ?")
        .bind(lot_id)
        .execute(&mut *conn)
        .await?;
    Ok(res.rows_affected())
}

#[async_trait]
impl Slots for ParkingManager {
    async fn find_available(&self, lot_id: Id) -> Result<Option<Slot>, ParkingError> {
        let mut conn = self.pool.acquire().await?;
        lot::get(&mut conn, lot_id).await?;
        find_available(&mut conn, lot_id).await
    }

    async fn list_slots(&self, lot_id: Id) -> Result<Vec<Slot>, ParkingError> {
        let mut conn = self.pool.acquire().await?;
        lot::get(&mut conn, lot_id).await?;
        list(&mut conn, lot_id).await
    }

    async fn set_maintenance(
        &self,
        caller: &Caller,
        slot_id: Id,
        enabled: bool,
    ) -> Result<Slot, ParkingError> {
        caller.require_admin()?;

        let lot_id = {
            let mut conn = self.pool.acquire().await?;
            get(&mut conn, slot_id).await?.parking_lot_id
        };

        self.policy
            .run("set_maintenance", move || {
                self.try_set_maintenance(caller, lot_id, slot_id, enabled)
            })
            .await
    }
}

impl ParkingManager {
    async fn try_set_maintenance(
        &self,
        caller: &Caller,
        lot_id: Id,
        slot_id: Id,
        enabled: bool,
    ) -> Result<Slot, ParkingError> {
        let _guard = self.locks.acquire(lot_id).await;
        let mut tx = self.begin_write().await?;

        let lot = lot::get(&mut tx, lot_id).await?;
        if lot.admin_id != caller.user_id {
            return Err(ParkingError::Forbidden(format!(
                "lot {} is managed by another administrator",
                lot_id
            )));
        }

        let slot = set_maintenance(&mut tx, slot_id, enabled).await?;
        tx.commit().await?;

        info!(slot_id, lot_id, status = %slot.status, "slot maintenance toggled");
        Ok(slot)
    }
}
