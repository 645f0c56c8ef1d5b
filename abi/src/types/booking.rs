use core::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use super::optional_decimal_column;
use crate::{validate_range, Id, ParkingError, Validator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Approved,
    Declined,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Unpaid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    Online,
}

/// Lifecycle actions, used to validate transitions and to report failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingAction {
    Approve,
    Decline,
    Cancel,
    Checkout,
    Pay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Id,
    pub user_id: Id,
    pub vehicle_id: Id,
    /// null once the lot has been deleted
    pub parking_lot_id: Option<Id>,
    pub slot_id: Option<Id>,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub entry_time: DateTime<Utc>,
    pub planned_checkout_time: DateTime<Utc>,
    /// actual checkout, set when the booking completes
    pub checkout_time: Option<DateTime<Utc>>,
    pub amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub vehicle_id: Id,
    #[serde(alias = "parkingId")]
    pub parking_lot_id: Id,
    pub entry_time: DateTime<Utc>,
    pub checkout_time: DateTime<Utc>,
}

impl BookingStatus {
    /// PENDING and APPROVED bookings may still hold a slot.
    pub fn is_open(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Approved)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    /// Whether `action` may be applied to a booking in this status.
    pub fn allows(&self, action: BookingAction) -> bool {
        match action {
            BookingAction::Approve | BookingAction::Decline => *self == BookingStatus::Pending,
            BookingAction::Cancel => self.is_open(),
            BookingAction::Checkout => *self == BookingStatus::Approved,
            BookingAction::Pay => *self == BookingStatus::Completed,
        }
    }
}

impl Booking {
    pub fn ensure(&self, action: BookingAction) -> Result<(), ParkingError> {
        if !self.status.allows(action) {
            return Err(ParkingError::InvalidStateTransition {
                id: self.id,
                status: self.status,
                action,
            });
        }

        if action == BookingAction::Pay && self.payment_status == PaymentStatus::Paid {
            return Err(ParkingError::AlreadyPaid(self.id));
        }

        Ok(())
    }

    pub fn is_owned_by(&self, user_id: Id) -> bool {
        self.user_id == user_id
    }
}

impl<'r> FromRow<'r, SqliteRow> for Booking {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            vehicle_id: row.try_get("vehicle_id")?,
            parking_lot_id: row.try_get("parking_lot_id")?,
            slot_id: row.try_get("slot_id")?,
            status: row.try_get("status")?,
            payment_status: row.try_get("payment_status")?,
            payment_method: row.try_get("payment_method")?,
            entry_time: row.try_get("entry_time")?,
            planned_checkout_time: row.try_get("planned_checkout_time")?,
            checkout_time: row.try_get("checkout_time")?,
            amount: optional_decimal_column(row, "amount")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl NewBooking {
    pub fn new(
        vehicle_id: Id,
        parking_lot_id: Id,
        entry_time: DateTime<Utc>,
        checkout_time: DateTime<Utc>,
    ) -> Self {
        Self {
            vehicle_id,
            parking_lot_id,
            entry_time,
            checkout_time,
        }
    }
}

impl Validator for NewBooking {
    fn validate(&self) -> Result<(), ParkingError> {
        if self.vehicle_id <= 0 {
            return Err(ParkingError::VehicleNotFound(self.vehicle_id));
        }

        if self.parking_lot_id <= 0 {
            return Err(ParkingError::ParkingLotNotFound(self.parking_lot_id));
        }

        validate_range(self.entry_time, self.checkout_time)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "PENDING"),
            BookingStatus::Approved => write!(f, "APPROVED"),
            BookingStatus::Declined => write!(f, "DECLINED"),
            BookingStatus::Completed => write!(f, "COMPLETED"),
            BookingStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "PENDING"),
            PaymentStatus::Paid => write!(f, "PAID"),
            PaymentStatus::Unpaid => write!(f, "UNPAID"),
        }
    }
}

impl fmt::Display for BookingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingAction::Approve => write!(f, "approve"),
            BookingAction::Decline => write!(f, "decline"),
            BookingAction::Cancel => write!(f, "cancel"),
            BookingAction::Checkout => write!(f, "checkout"),
            BookingAction::Pay => write!(f, "pay"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(status: BookingStatus, payment_status: PaymentStatus) -> Booking {
        let now: DateTime<Utc> = "2024-01-01T10:00:00Z".parse().unwrap();
        Booking {
            id: 7,
            user_id: 1,
            vehicle_id: 1,
            parking_lot_id: Some(1),
            slot_id: Some(1),
            status,
            payment_status,
            payment_method: None,
            entry_time: now,
            planned_checkout_time: now,
            checkout_time: None,
            amount: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn transition_table_should_match_lifecycle() {
        use BookingAction::*;
        use BookingStatus::*;

        let allowed = [
            (Pending, vec![Approve, Decline, Cancel]),
            (Approved, vec![Cancel, Checkout]),
            (Declined, vec![]),
            (Completed, vec![Pay]),
            (Cancelled, vec![]),
        ];

        for (status, actions) in allowed {
            for action in [Approve, Decline, Cancel, Checkout, Pay] {
                assert_eq!(
                    status.allows(action),
                    actions.contains(&action),
                    "{status} / {action}"
                );
            }
        }
    }

    #[test]
    fn ensure_should_report_invalid_transition() {
        let b = booking(BookingStatus::Approved, PaymentStatus::Pending);
        assert_eq!(
            b.ensure(BookingAction::Approve).unwrap_err(),
            ParkingError::InvalidStateTransition {
                id: 7,
                status: BookingStatus::Approved,
                action: BookingAction::Approve,
            }
        );
    }

    #[test]
    fn ensure_should_reject_second_payment() {
        let b = booking(BookingStatus::Completed, PaymentStatus::Paid);
        assert_eq!(
            b.ensure(BookingAction::Pay).unwrap_err(),
            ParkingError::AlreadyPaid(7)
        );

        let b = booking(BookingStatus::Completed, PaymentStatus::Pending);
        assert!(b.ensure(BookingAction::Pay).is_ok());
    }

    #[test]
    fn new_booking_should_accept_parking_id_alias() {
        let req: NewBooking = serde_json::from_str(
            r#"{"vehicleId":3,"parkingId":4,"entryTime":"2024-01-01T10:00:00Z","checkoutTime":"2024-01-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(req.parking_lot_id, 4);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn new_booking_with_reversed_window_should_reject() {
        let req = NewBooking::new(
            1,
            1,
            "2024-01-01T12:00:00Z".parse().unwrap(),
            "2024-01-01T10:00:00Z".parse().unwrap(),
        );
        assert_eq!(req.validate().unwrap_err(), ParkingError::InvalidTimespan);
    }
}
