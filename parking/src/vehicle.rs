use abi::{Caller, Id, NewVehicle, ParkingError, Validator, Vehicle};
use async_trait::async_trait;
use sqlx::SqliteConnection;
use tracing::info;

use crate::{ParkingManager, Vehicles};

const VEHICLE_COLUMNS: &str = "id, owner_id, plate_number, vehicle_type, created_at";

pub(crate) async fn get(conn: &mut SqliteConnection, id: Id) -> Result<Vehicle, ParkingError> {
    sqlx::query_as::<_, Vehicle>(&format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ParkingError::VehicleNotFound(id))
}

/// The vehicle, provided `user_id` owns it.
pub(crate) async fn get_owned(
    conn: &mut SqliteConnection,
    id: Id,
    user_id: Id,
) -> Result<Vehicle, ParkingError> {
    let vehicle = get(conn, id).await?;
    if vehicle.owner_id != user_id {
        return Err(ParkingError::Forbidden(format!(
            "vehicle {} does not belong to user {}",
            id, user_id
        )));
    }
    Ok(vehicle)
}

#[async_trait]
impl Vehicles for ParkingManager {
    async fn register_vehicle(
        &self,
        caller: &Caller,
        vehicle: NewVehicle,
    ) -> Result<Vehicle, ParkingError> {
        vehicle.validate()?;

        let vehicle = &vehicle;
        self.policy
            .run("register_vehicle", move || self.try_register(caller, vehicle))
            .await
    }

    async fn get_vehicle(&self, caller: &Caller, id: Id) -> Result<Vehicle, ParkingError> {
        let mut conn = self.pool.acquire().await?;
        let vehicle = get(&mut conn, id).await?;
        caller.require_owner_or_admin(vehicle.owner_id)?;
        Ok(vehicle)
    }

    async fn list_vehicles(&self, caller: &Caller) -> Result<Vec<Vehicle>, ParkingError> {
        let vehicles = sqlx::query_as::<_, Vehicle>(&format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE owner_id = ? ORDER BY id"
        ))
        .bind(caller.user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(vehicles)
    }

    async fn delete_vehicle(&self, caller: &Caller, id: Id) -> Result<(), ParkingError> {
        self.policy
            .run("delete_vehicle", move || self.try_delete(caller, id))
            .await
    }
}

impl ParkingManager {
    async fn try_register(
        &self,
        caller: &Caller,
        vehicle: &NewVehicle,
    ) -> Result<Vehicle, ParkingError> {
        let vehicle = sqlx::query_as::<_, Vehicle>(&format!(
            "INSERT INTO vehicles (owner_id, plate_number, vehicle_type, created_at) \
             VALUES (?, ?, ?, ?) RETURNING {VEHICLE_COLUMNS}"
        ))
        .bind(caller.user_id)
        .bind(vehicle.normalized_plate())
        .bind(vehicle.vehicle_type)
        .bind(self.clock.now())
        .fetch_one(&self.pool)
        .await?;

        info!(vehicle_id = vehicle.id, owner_id = vehicle.owner_id, "vehicle registered");
        Ok(vehicle)
    }

    async fn try_delete(&self, caller: &Caller, id: Id) -> Result<(), ParkingError> {
        let mut tx = self.begin_write().await?;
        get_owned(&mut tx, id, caller.user_id).await?;

        let (referenced,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM bookings WHERE vehicle_id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if referenced > 0 {
            return Err(ParkingError::VehicleInUse(id));
        }

        sqlx::query("DELETE FROM vehicles WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(vehicle_id = id, "vehicle deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use abi::{ConstraintInfo, VehicleType};

    use super::*;
    use crate::{test_utils::TestDb, Bookings};

    fn is_duplicate_plate(err: &ParkingError) -> bool {
        matches!(
            err,
            ParkingError::DuplicateKey(ConstraintInfo::Parsed(v)) if v.is("vehicles", &["plate_number"])
        )
    }

    #[tokio::test]
    async fn register_vehicle_should_normalize_plate() {
        let db = TestDb::new().await;
        let v = db
            .manager
            .register_vehicle(&db.user, NewVehicle::new(" ab-123 ", VehicleType::Car))
            .await
            .unwrap();
        assert_eq!(v.plate_number, "AB-123");
        assert_eq!(v.owner_id, db.user.user_id);

        let listed = db.manager.list_vehicles(&db.user).await.unwrap();
        assert_eq!(listed, vec![v]);
    }

    #[tokio::test]
    async fn duplicate_plate_should_conflict() {
        let db = TestDb::new().await;
        db.vehicle(&db.user, "DUP-1").await;

        let err = db
            .manager
            .register_vehicle(&Caller::user(77), NewVehicle::new("dup-1", VehicleType::Car))
            .await
            .unwrap_err();
        assert!(is_duplicate_plate(&err), "{err:?}");
        assert_eq!(err.kind(), abi::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn foreign_vehicle_should_be_forbidden() {
        let db = TestDb::new().await;
        let v = db.vehicle(&db.user, "OWN-1").await;

        let err = db
            .manager
            .get_vehicle(&Caller::user(77), v.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ParkingError::Forbidden(_)));

        assert_eq!(db.manager.get_vehicle(&db.admin, v.id).await.unwrap(), v);

        let err = db
            .manager
            .delete_vehicle(&Caller::user(77), v.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ParkingError::Forbidden(_)));
    }

    #[tokio::test]
    async fn vehicle_with_bookings_cannot_be_deleted() {
        let db = TestDb::new().await;
        let lot = db.lot(1, 10).await;
        let booked = db.vehicle(&db.user, "BK-1").await;
        let spare = db.vehicle(&db.user, "BK-2").await;

        let booking = db.book(&db.user, booked.id, lot.id).await;
        db.manager.cancel(&db.user, booking.id).await.unwrap();

        assert_eq!(
            db.manager.delete_vehicle(&db.user, booked.id).await.unwrap_err(),
            ParkingError::VehicleInUse(booked.id)
        );

        db.manager.delete_vehicle(&db.user, spare.id).await.unwrap();
        assert_eq!(
            db.manager.get_vehicle(&db.user, spare.id).await.unwrap_err(),
            ParkingError::VehicleNotFound(spare.id)
        );
    }
}
