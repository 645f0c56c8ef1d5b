use std::sync::Arc;

use abi::{
    Booking, BookingAction, BookingQuery, BookingStatus, Caller, Config, ConstraintInfo,
    ErrorKind, Id, NewBooking, ParkingError, PaymentMethod, PaymentStatus, Slot, Validator,
};
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Sqlite, SqliteConnection, SqlitePool, Transaction,
};
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

use crate::{
    booking::{self, BookingRow},
    compute_amount, lot, slot, vehicle, Bookings, Clock, ParkingManager, RetryPolicy,
    SystemClock,
};

/// A booking re-read inside a transaction while its lot is locked.
struct Locked {
    _guard: Option<OwnedMutexGuard<()>>,
    tx: Transaction<'static, Sqlite>,
    booking: Booking,
}

#[async_trait]
impl Bookings for ParkingManager {
    async fn create(&self, caller: &Caller, req: NewBooking) -> Result<Booking, ParkingError> {
        req.validate()?;

        let req = &req;
        self.policy
            .run("create", move || self.try_create(caller, req))
            .await
    }

    async fn approve(&self, caller: &Caller, id: Id) -> Result<Booking, ParkingError> {
        caller.require_admin()?;
        self.policy
            .run("approve", move || self.try_approve(id))
            .await
    }

    async fn decline(&self, caller: &Caller, id: Id) -> Result<Booking, ParkingError> {
        caller.require_admin()?;
        self.policy
            .run("decline", move || {
                self.try_release(caller, id, BookingAction::Decline)
            })
            .await
    }

    async fn cancel(&self, caller: &Caller, id: Id) -> Result<Booking, ParkingError> {
        self.policy
            .run("cancel", move || {
                self.try_release(caller, id, BookingAction::Cancel)
            })
            .await
    }

    async fn checkout(&self, caller: &Caller, id: Id) -> Result<Booking, ParkingError> {
        self.policy
            .run("checkout", move || self.try_checkout(caller, id))
            .await
    }

    async fn pay(
        &self,
        caller: &Caller,
        id: Id,
        method: PaymentMethod,
    ) -> Result<Booking, ParkingError> {
        self.policy
            .run("pay", move || self.try_pay(caller, id, method))
            .await
    }

    async fn get(&self, caller: &Caller, id: Id) -> Result<Booking, ParkingError> {
        let mut conn = self.pool.acquire().await?;
        let booking = booking::get(&mut conn, id).await?;
        caller.require_owner_or_admin(booking.user_id)?;
        Ok(booking)
    }

    async fn query(
        &self,
        caller: &Caller,
        mut query: BookingQuery,
    ) -> Result<Vec<Booking>, ParkingError> {
        query.validate()?;
        if !caller.is_admin() {
            query.user_id = Some(caller.user_id);
        }

        let mut conn = self.pool.acquire().await?;
        booking::query(&mut conn, &query).await
    }
}

impl ParkingManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
            locks: Default::default(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Open (or create) the database file, apply migrations and take the
    /// retry policy from the booking section.
    pub async fn from_config(config: &Config) -> Result<Self, ParkingError> {
        let options = SqliteConnectOptions::new()
            .filename(&config.db.path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.db.busy_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.db.max_connections)
            .connect_with(options)
            .await?;
        sqlx::migrate!("../migrations").run(&pool).await?;

        info!(path = %config.db.path, "database ready");
        Ok(Self::new(pool).with_policy((&config.booking).into()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a transaction that holds the database write lock from its first
    /// statement, so a read-then-write never has to upgrade a stale snapshot.
    pub(crate) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, ParkingError> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    async fn try_pay(
        &self,
        caller: &Caller,
        id: Id,
        method: PaymentMethod,
    ) -> Result<Booking, ParkingError> {
        let mut tx = self.begin_write().await?;
        let current = booking::get(&mut tx, id).await?;
        caller.require_owner_or_admin(current.user_id)?;
        current.ensure(BookingAction::Pay)?;

        let paid = booking::mark_paid(&mut tx, id, method, self.clock.now()).await?;
        tx.commit().await?;

        info!(booking_id = id, method = ?method, amount = ?paid.amount, "booking paid");
        Ok(paid)
    }

    async fn try_create(&self, caller: &Caller, req: &NewBooking) -> Result<Booking, ParkingError> {
        let _guard = self.locks.acquire(req.parking_lot_id).await;
        let mut tx = self.begin_write().await?;

        vehicle::get_owned(&mut tx, req.vehicle_id, caller.user_id).await?;
        if booking::find_open_for_vehicle(&mut tx, req.vehicle_id)
            .await?
            .is_some()
        {
            return Err(ParkingError::VehicleAlreadyBooked(req.vehicle_id));
        }

        let slot = allocate(&mut tx, req.parking_lot_id).await?;

        let row = BookingRow {
            user_id: caller.user_id,
            vehicle_id: req.vehicle_id,
            parking_lot_id: req.parking_lot_id,
            slot_id: slot.id,
            entry_time: req.entry_time,
            planned_checkout_time: req.checkout_time,
        };
        let booking = booking::insert(&mut tx, row, self.clock.now())
            .await
            .map_err(|e| match e {
                ParkingError::DuplicateKey(ConstraintInfo::Parsed(ref v))
                    if v.is("bookings", &["vehicle_id"]) =>
                {
                    ParkingError::VehicleAlreadyBooked(req.vehicle_id)
                }
                e => e,
            })?;
        tx.commit().await?;

        info!(
            booking_id = booking.id,
            lot_id = req.parking_lot_id,
            slot_id = slot.id,
            "booking created"
        );
        Ok(booking)
    }

    async fn try_approve(&self, id: Id) -> Result<Booking, ParkingError> {
        let Locked {
            _guard,
            mut tx,
            booking: mut next,
        } = self.lock_booking(id).await?;
        next.ensure(BookingAction::Approve)?;

        if next.slot_id.is_none() {
            let slot = match next.parking_lot_id {
                Some(lot_id) => match allocate(&mut tx, lot_id).await {
                    Ok(slot) => Some(slot),
                    Err(e) if e.kind() == ErrorKind::CapacityExhausted => None,
                    Err(e) => return Err(e),
                },
                None => None,
            };
            match slot {
                Some(slot) => next.slot_id = Some(slot.id),
                None => {
                    next.status = BookingStatus::Declined;
                    next.payment_status = PaymentStatus::Unpaid;
                }
            }
        }
        if next.status == BookingStatus::Pending {
            next.status = BookingStatus::Approved;
        }
        next.updated_at = self.clock.now();

        let booking = booking::save(&mut tx, &next, BookingStatus::Pending).await?;
        tx.commit().await?;

        if booking.status == BookingStatus::Declined {
            warn!(booking_id = id, "no slot left on approval, booking declined");
        } else {
            info!(booking_id = id, slot_id = ?booking.slot_id, "booking approved");
        }
        Ok(booking)
    }

    /// Decline and cancel both end the booking and give its slot back.
    async fn try_release(
        &self,
        caller: &Caller,
        id: Id,
        action: BookingAction,
    ) -> Result<Booking, ParkingError> {
        let Locked {
            _guard,
            mut tx,
            booking: mut next,
        } = self.lock_booking(id).await?;

        if action == BookingAction::Cancel && !next.is_owned_by(caller.user_id) {
            return Err(ParkingError::Forbidden(format!(
                "booking {} belongs to another user",
                id
            )));
        }
        next.ensure(action)?;

        let expected = next.status;
        release(&mut tx, &next).await?;
        next.status = match action {
            BookingAction::Decline => BookingStatus::Declined,
            _ => BookingStatus::Cancelled,
        };
        next.payment_status = PaymentStatus::Unpaid;
        next.updated_at = self.clock.now();

        let booking = booking::save(&mut tx, &next, expected).await?;
        tx.commit().await?;

        info!(booking_id = id, status = %booking.status, "booking closed, slot released");
        Ok(booking)
    }

    async fn try_checkout(&self, caller: &Caller, id: Id) -> Result<Booking, ParkingError> {
        let Locked {
            _guard,
            mut tx,
            booking: mut next,
        } = self.lock_booking(id).await?;
        caller.require_owner_or_admin(next.user_id)?;
        next.ensure(BookingAction::Checkout)?;

        let lot_id = next.parking_lot_id.ok_or(ParkingError::InvalidStateTransition {
            id,
            status: next.status,
            action: BookingAction::Checkout,
        })?;
        let lot = lot::get(&mut tx, lot_id).await?;

        let now = self.clock.now();
        let amount = compute_amount(next.entry_time, now, lot.charging_fee_per_hour)?;

        release(&mut tx, &next).await?;
        next.status = BookingStatus::Completed;
        next.checkout_time = Some(now);
        next.amount = Some(amount);
        next.updated_at = now;

        let booking = booking::save(&mut tx, &next, BookingStatus::Approved).await?;
        tx.commit().await?;

        info!(booking_id = id, lot_id, %amount, "booking checked out");
        Ok(booking)
    }

    /// Find the booking's lot without holding anything, take the lot lock,
    /// then read the booking again inside a transaction. A booking whose lot
    /// is gone needs no lock, it can no longer touch a counter.
    async fn lock_booking(&self, id: Id) -> Result<Locked, ParkingError> {
        let lot_id = {
            let mut conn = self.pool.acquire().await?;
            booking::get(&mut conn, id).await?.parking_lot_id
        };

        let _guard = match lot_id {
            Some(lot_id) => Some(self.locks.acquire(lot_id).await),
            None => None,
        };
        let mut tx = self.begin_write().await?;
        let booking = booking::get(&mut tx, id).await?;

        // the lot was deleted while we waited for its lock
        if booking.parking_lot_id != lot_id {
            return Err(ParkingError::ConcurrencyConflict);
        }

        Ok(Locked {
            _guard,
            tx,
            booking,
        })
    }
}

/// Take the first free slot of the lot and count it out of the available
/// spaces.
async fn allocate(conn: &mut SqliteConnection, lot_id: Id) -> Result<Slot, ParkingError> {
    let lot = lot::get(conn, lot_id).await?;
    if lot.is_full() {
        return Err(ParkingError::CapacityExhausted(lot_id));
    }

    let slot = slot::find_available(conn, lot_id)
        .await?
        .ok_or(ParkingError::NoSlotAvailable(lot_id))?;
    let slot = slot::mark_occupied(conn, slot.id).await?;
    lot::adjust_available(conn, lot_id, -1).await?;
    Ok(slot)
}

/// Give the booking's slot back to its lot.
async fn release(conn: &mut SqliteConnection, booking: &Booking) -> Result<(), ParkingError> {
    if let (Some(slot_id), Some(lot_id)) = (booking.slot_id, booking.parking_lot_id) {
        slot::mark_available(conn, slot_id).await?;
        lot::adjust_available(conn, lot_id, 1).await?;
    }
    Ok(())
}
