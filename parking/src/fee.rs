use abi::ParkingError;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

const CURRENCY_DECIMAL_PLACES: u32 = 2;
const MILLIS_PER_HOUR: i64 = 3_600_000;

/// Wall-clock hours between entry and checkout, fractional.
pub fn billable_hours(
    entry: DateTime<Utc>,
    checkout: DateTime<Utc>,
) -> Result<Decimal, ParkingError> {
    let elapsed = checkout.signed_duration_since(entry).num_milliseconds();
    if elapsed < 0 {
        return Err(ParkingError::InvalidTimespan);
    }

    Ok(Decimal::from(elapsed) / Decimal::from(MILLIS_PER_HOUR))
}

/// `hours * rate`, rounded half away from zero to cents.
pub fn compute_amount(
    entry: DateTime<Utc>,
    checkout: DateTime<Utc>,
    fee_per_hour: Decimal,
) -> Result<Decimal, ParkingError> {
    let hours = billable_hours(entry, checkout)?;
    let mut amount = hours
        .checked_mul(fee_per_hour)
        .ok_or_else(|| {
            ParkingError::Validation(format!(
                "fee of {} over {} hours is out of range",
                fee_per_hour, hours
            ))
        })?
        .round_dp_with_strategy(CURRENCY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero);
    amount.rescale(CURRENCY_DECIMAL_PLACES);
    Ok(amount)
}
