mod booking;
mod booking_query;
mod caller;
mod parking_lot;
mod slot;
mod vehicle;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

pub use booking::*;
pub use booking_query::*;
pub use caller::*;
pub use parking_lot::*;
pub use slot::*;
pub use vehicle::*;

use crate::ParkingError;

pub trait Validator {
    fn validate(&self) -> Result<(), ParkingError>;
}

pub fn validate_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ParkingError> {
    if start >= end {
        return Err(ParkingError::InvalidTimespan);
    }

    Ok(())
}

/// Money columns are stored as TEXT, sqlite has no exact decimal type.
pub(crate) fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub(crate) fn optional_decimal_column(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<Decimal>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|raw| {
        Decimal::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
    })
    .transpose()
}
