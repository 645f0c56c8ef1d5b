mod conflict;

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use conflict::*;

use crate::{BookingAction, BookingStatus, Id, SlotStatus};

#[derive(Error, Debug)]
pub enum ParkingError {
    #[error("booking not found: {0}")]
    BookingNotFound(Id),

    #[error("vehicle not found: {0}")]
    VehicleNotFound(Id),

    #[error("parking lot not found: {0}")]
    ParkingLotNotFound(Id),

    #[error("slot not found: {0}")]
    SlotNotFound(Id),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("cannot {action} booking {id} in status {status}")]
    InvalidStateTransition {
        id: Id,
        status: BookingStatus,
        action: BookingAction,
    },

    #[error("cannot move slot {id} from {from} to {to}")]
    InvalidSlotTransition {
        id: Id,
        from: SlotStatus,
        to: SlotStatus,
    },

    #[error("booking {0} is already paid")]
    AlreadyPaid(Id),

    #[error("parking lot {0} has no available spaces")]
    CapacityExhausted(Id),

    #[error("parking lot {0} has no available slot")]
    NoSlotAvailable(Id),

    #[error("available spaces of lot {lot_id} would become {value}, outside 0..={total}")]
    CounterOutOfRange { lot_id: Id, value: i64, total: i64 },

    #[error("vehicle {0} already has an open booking")]
    VehicleAlreadyBooked(Id),

    #[error("vehicle {0} is referenced by bookings")]
    VehicleInUse(Id),

    #[error("duplicate key: {0}")]
    DuplicateKey(ConstraintInfo),

    #[error("concurrent update conflict, retry the request")]
    ConcurrencyConflict,

    #[error("{0} did not finish in time")]
    Timeout(&'static str),

    #[error("invalid timespan")]
    InvalidTimespan,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("db error: {0}")]
    DbError(sqlx::Error),

    #[error("migration error: {0}")]
    MigrateError(sqlx::migrate::MigrateError),
}

/// Machine readable error category handed to callers of the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidStateTransition,
    CapacityExhausted,
    Conflict,
    ConcurrencyConflict,
    Timeout,
    ValidationError,
    Internal,
}

impl ParkingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BookingNotFound(_)
            | Self::VehicleNotFound(_)
            | Self::ParkingLotNotFound(_)
            | Self::SlotNotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::InvalidStateTransition { .. }
            | Self::InvalidSlotTransition { .. }
            | Self::AlreadyPaid(_) => ErrorKind::InvalidStateTransition,
            Self::CapacityExhausted(_) | Self::NoSlotAvailable(_) => ErrorKind::CapacityExhausted,
            Self::VehicleAlreadyBooked(_) | Self::VehicleInUse(_) | Self::DuplicateKey(_) => {
                ErrorKind::Conflict
            }
            Self::ConcurrencyConflict => ErrorKind::ConcurrencyConflict,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::InvalidTimespan | Self::Validation(_) => ErrorKind::ValidationError,
            Self::CounterOutOfRange { .. } | Self::DbError(_) | Self::MigrateError(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Only lost races are retried inside the core.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict)
    }
}

impl PartialEq for ParkingError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // sqlx errors carry no equality, compare by variant only
            (Self::DbError(_), Self::DbError(_)) => true,
            (Self::MigrateError(_), Self::MigrateError(_)) => true,
            (Self::BookingNotFound(v1), Self::BookingNotFound(v2)) => v1 == v2,
            (Self::VehicleNotFound(v1), Self::VehicleNotFound(v2)) => v1 == v2,
            (Self::ParkingLotNotFound(v1), Self::ParkingLotNotFound(v2)) => v1 == v2,
            (Self::SlotNotFound(v1), Self::SlotNotFound(v2)) => v1 == v2,
            (Self::Forbidden(v1), Self::Forbidden(v2)) => v1 == v2,
            (
                Self::InvalidStateTransition {
                    id: i1,
                    status: s1,
                    action: a1,
                },
                Self::InvalidStateTransition {
                    id: i2,
                    status: s2,
                    action: a2,
                },
            ) => i1 == i2 && s1 == s2 && a1 == a2,
            (
                Self::InvalidSlotTransition {
                    id: i1,
                    from: f1,
                    to: t1,
                },
                Self::InvalidSlotTransition {
                    id: i2,
                    from: f2,
                    to: t2,
                },
            ) => i1 == i2 && f1 == f2 && t1 == t2,
            (Self::AlreadyPaid(v1), Self::AlreadyPaid(v2)) => v1 == v2,
            (Self::CapacityExhausted(v1), Self::CapacityExhausted(v2)) => v1 == v2,
            (Self::NoSlotAvailable(v1), Self::NoSlotAvailable(v2)) => v1 == v2,
            (
                Self::CounterOutOfRange {
                    lot_id: l1,
                    value: v1,
                    total: t1,
                },
                Self::CounterOutOfRange {
                    lot_id: l2,
                    value: v2,
                    total: t2,
                },
            ) => l1 == l2 && v1 == v2 && t1 == t2,
            (Self::VehicleAlreadyBooked(v1), Self::VehicleAlreadyBooked(v2)) => v1 == v2,
            (Self::VehicleInUse(v1), Self::VehicleInUse(v2)) => v1 == v2,
            (Self::DuplicateKey(v1), Self::DuplicateKey(v2)) => v1 == v2,
            (Self::ConcurrencyConflict, Self::ConcurrencyConflict) => true,
            (Self::Timeout(v1), Self::Timeout(v2)) => v1 == v2,
            (Self::InvalidTimespan, Self::InvalidTimespan) => true,
            (Self::Validation(v1), Self::Validation(v2)) => v1 == v2,
            _ => false,
        }
    }
}

/// sqlite primary result codes for a busy or locked database
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl From<sqlx::Error> for ParkingError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) => {
                let primary = db
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| code & 0xff);
                if matches!(primary, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED)) {
                    return Self::ConcurrencyConflict;
                }

                if db.is_unique_violation() {
                    let info: ConstraintInfo = match db.message().parse() {
                        Ok(info) => info,
                        Err(never) => match never {},
                    };
                    return Self::from_unique_violation(info);
                }

                Self::DbError(sqlx::Error::Database(db))
            }
            sqlx::Error::PoolTimedOut => Self::ConcurrencyConflict,
            _ => Self::DbError(e),
        }
    }
}

impl ParkingError {
    fn from_unique_violation(info: ConstraintInfo) -> Self {
        if let ConstraintInfo::Parsed(ref v) = info {
            // both indexes only cover open bookings
            if v.is("bookings", &["slot_id"]) {
                return Self::ConcurrencyConflict;
            }
        }
        Self::DuplicateKey(info)
    }
}

impl From<sqlx::migrate::MigrateError> for ParkingError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Self::MigrateError(e)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InvalidStateTransition => "invalid_state_transition",
            ErrorKind::CapacityExhausted => "capacity_exhausted",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ConcurrencyConflict => "concurrency_conflict",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}
