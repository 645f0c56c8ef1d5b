use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use super::decimal_column;
use crate::{Id, ParkingError, Validator, VehicleType};

/// Largest lot accepted; slots are created one row per space.
pub const MAX_TOTAL_SPACES: i64 = 10_000;

/// Highest hourly rate accepted, in currency units.
pub const MAX_FEE_PER_HOUR: i64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingLot {
    pub id: Id,
    pub name: String,
    pub location: String,
    pub total_spaces: i64,
    pub available_spaces: i64,
    pub charging_fee_per_hour: Decimal,
    pub admin_id: Id,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParkingLot {
    pub name: String,
    pub location: String,
    pub total_spaces: i64,
    pub charging_fee_per_hour: Decimal,
    /// every slot of the lot is created with this type
    #[serde(default)]
    pub slot_type: VehicleType,
}

/// Counter as cached on the lot next to the count derived from its slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotOccupancy {
    pub parking_lot_id: Id,
    pub total_spaces: i64,
    pub available_spaces: i64,
    pub occupied_slots: i64,
    pub maintenance_slots: i64,
}

impl ParkingLot {
    pub fn is_full(&self) -> bool {
        self.available_spaces <= 0
    }
}

impl<'r> FromRow<'r, SqliteRow> for ParkingLot {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            location: row.try_get("location")?,
            total_spaces: row.try_get("total_spaces")?,
            available_spaces: row.try_get("available_spaces")?,
            charging_fee_per_hour: decimal_column(row, "charging_fee_per_hour")?,
            admin_id: row.try_get("admin_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl NewParkingLot {
    pub fn new(
        name: impl Into<String>,
        location: impl Into<String>,
        total_spaces: i64,
        charging_fee_per_hour: Decimal,
    ) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            total_spaces,
            charging_fee_per_hour,
            slot_type: VehicleType::default(),
        }
    }
}

impl Validator for NewParkingLot {
    fn validate(&self) -> Result<(), ParkingError> {
        if self.name.trim().is_empty() {
            return Err(ParkingError::Validation("lot name is empty".into()));
        }

        if self.location.trim().is_empty() {
            return Err(ParkingError::Validation("lot location is empty".into()));
        }

        if !(1..=MAX_TOTAL_SPACES).contains(&self.total_spaces) {
            return Err(ParkingError::Validation(format!(
                "total spaces must be between 1 and {}, got {}",
                MAX_TOTAL_SPACES, self.total_spaces
            )));
        }

        if self.charging_fee_per_hour.is_sign_negative() {
            return Err(ParkingError::Validation(format!(
                "charging fee must not be negative, got {}",
                self.charging_fee_per_hour
            )));
        }

        if self.charging_fee_per_hour > Decimal::from(MAX_FEE_PER_HOUR) {
            return Err(ParkingError::Validation(format!(
                "charging fee must not exceed {}, got {}",
                MAX_FEE_PER_HOUR, self.charging_fee_per_hour
            )));
        }

        Ok(())
    }
}

impl LotOccupancy {
    /// `available == total - occupied`, the invariant every lifecycle step keeps.
    pub fn is_consistent(&self) -> bool {
        self.available_spaces == self.total_spaces - self.occupied_slots
    }
}
