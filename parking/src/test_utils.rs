use std::sync::Arc;

use abi::{
    Booking, Caller, Config, Id, NewBooking, NewParkingLot, NewVehicle, ParkingLot, Vehicle,
    VehicleType,
};
use chrono::Duration;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tempfile::TempDir;

use crate::{Bookings, Clock, ManualClock, ParkingLots, ParkingManager, Vehicles};

/// A migrated database in a temp dir, plus one admin and one user.
pub struct TestDb {
    pub pool: SqlitePool,
    pub manager: ParkingManager,
    pub clock: ManualClock,
    pub admin: Caller,
    pub user: Caller,
    _dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parking.db");

        let mut config = Config::load("../service/fixtures/config.yml").unwrap();
        config.db.path = path.to_string_lossy().into_owned();

        let clock = ManualClock::new("2024-01-01T08:00:00Z".parse().unwrap());
        let manager = ParkingManager::from_config(&config)
            .await
            .unwrap()
            .with_clock(Arc::new(clock.clone()));

        Self {
            pool: manager.pool().clone(),
            manager,
            clock,
            admin: Caller::admin(1),
            user: Caller::user(2),
            _dir: dir,
        }
    }

    /// A lot owned by `self.admin` with a whole-number hourly fee.
    pub async fn lot(&self, total: i64, fee: i64) -> ParkingLot {
        let lot = NewParkingLot::new("Central", "Main St 1", total, Decimal::from(fee));
        self.manager.create_lot(&self.admin, lot).await.unwrap()
    }

    pub async fn vehicle(&self, owner: &Caller, plate: &str) -> Vehicle {
        self.manager
            .register_vehicle(owner, NewVehicle::new(plate, VehicleType::Car))
            .await
            .unwrap()
    }

    /// Entering now, leaving two hours later.
    pub fn new_booking(&self, vehicle_id: Id, lot_id: Id) -> NewBooking {
        let entry = self.clock.now();
        NewBooking::new(vehicle_id, lot_id, entry, entry + Duration::hours(2))
    }

    pub async fn book(&self, caller: &Caller, vehicle_id: Id, lot_id: Id) -> Booking {
        self.manager
            .create(caller, self.new_booking(vehicle_id, lot_id))
            .await
            .unwrap()
    }
}
