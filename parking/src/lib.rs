mod booking;
mod clock;
mod fee;
mod lock;
mod lot;
mod manager;
mod retry;
mod slot;
mod vehicle;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use abi::{
    Booking, BookingQuery, Caller, Id, LotOccupancy, NewBooking, NewParkingLot, NewVehicle,
    ParkingError, ParkingLot, PaymentMethod, Slot, Vehicle,
};
use async_trait::async_trait;
use sqlx::SqlitePool;

pub use clock::{Clock, ManualClock, SystemClock};
pub use fee::{billable_hours, compute_amount};
pub use retry::RetryPolicy;

use lock::LotLocks;

#[derive(Debug, Clone)]
pub struct ParkingManager {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    locks: Arc<LotLocks>,
    policy: RetryPolicy,
}

/// The booking lifecycle: every mutation keeps the lot counter, the slot
/// status and the booking row in step inside one transaction.
#[async_trait]
pub trait Bookings {
    /// reserve a slot of the lot for the caller's vehicle, booking starts PENDING
    async fn create(&self, caller: &Caller, req: NewBooking) -> Result<Booking, ParkingError>;
    /// admin: PENDING -> APPROVED, or DECLINED when no slot can be held
    async fn approve(&self, caller: &Caller, id: Id) -> Result<Booking, ParkingError>;
    /// admin: PENDING -> DECLINED, releasing the held slot
    async fn decline(&self, caller: &Caller, id: Id) -> Result<Booking, ParkingError>;
    /// owner: PENDING/APPROVED -> CANCELLED, releasing the held slot
    async fn cancel(&self, caller: &Caller, id: Id) -> Result<Booking, ParkingError>;
    /// APPROVED -> COMPLETED, charging the elapsed time at the lot's hourly rate
    async fn checkout(&self, caller: &Caller, id: Id) -> Result<Booking, ParkingError>;
    /// record payment of a COMPLETED booking
    async fn pay(
        &self,
        caller: &Caller,
        id: Id,
        method: PaymentMethod,
    ) -> Result<Booking, ParkingError>;
    /// get booking by id
    async fn get(&self, caller: &Caller, id: Id) -> Result<Booking, ParkingError>;
    /// query bookings, non-admins only see their own
    async fn query(
        &self,
        caller: &Caller,
        query: BookingQuery,
    ) -> Result<Vec<Booking>, ParkingError>;
}

#[async_trait]
pub trait ParkingLots {
    /// create a lot together with one slot per space
    async fn create_lot(
        &self,
        caller: &Caller,
        lot: NewParkingLot,
    ) -> Result<ParkingLot, ParkingError>;
    async fn get_lot(&self, id: Id) -> Result<ParkingLot, ParkingError>;
    async fn list_lots(&self) -> Result<Vec<ParkingLot>, ParkingError>;
    /// delete a lot and its slots, open bookings become CANCELLED
    async fn delete_lot(&self, caller: &Caller, id: Id) -> Result<(), ParkingError>;
    /// cached counter next to the counts derived from slot rows
    async fn occupancy(&self, id: Id) -> Result<LotOccupancy, ParkingError>;
}

#[async_trait]
pub trait Slots {
    /// an AVAILABLE slot of the lot, never one under maintenance
    async fn find_available(&self, lot_id: Id) -> Result<Option<Slot>, ParkingError>;
    async fn list_slots(&self, lot_id: Id) -> Result<Vec<Slot>, ParkingError>;
    /// toggle AVAILABLE <-> MAINTENANCE
    async fn set_maintenance(
        &self,
        caller: &Caller,
        slot_id: Id,
        enabled: bool,
    ) -> Result<Slot, ParkingError>;
}

#[async_trait]
pub trait Vehicles {
    async fn register_vehicle(
        &self,
        caller: &Caller,
        vehicle: NewVehicle,
    ) -> Result<Vehicle, ParkingError>;
    async fn get_vehicle(&self, caller: &Caller, id: Id) -> Result<Vehicle, ParkingError>;
    async fn list_vehicles(&self, caller: &Caller) -> Result<Vec<Vehicle>, ParkingError>;
    async fn delete_vehicle(&self, caller: &Caller, id: Id) -> Result<(), ParkingError>;
}
