use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Id, ParkingError, Validator, VehicleType};

const MAX_PLATE_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: Id,
    pub owner_id: Id,
    pub plate_number: String,
    pub vehicle_type: VehicleType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVehicle {
    pub plate_number: String,
    #[serde(default)]
    pub vehicle_type: VehicleType,
}

impl NewVehicle {
    pub fn new(plate_number: impl Into<String>, vehicle_type: VehicleType) -> Self {
        Self {
            plate_number: plate_number.into(),
            vehicle_type,
        }
    }

    /// Plates are compared upper-cased with surrounding whitespace removed.
    pub fn normalized_plate(&self) -> String {
        self.plate_number.trim().to_ascii_uppercase()
    }
}

impl Validator for NewVehicle {
    fn validate(&self) -> Result<(), ParkingError> {
        let plate = self.normalized_plate();

        if plate.is_empty() || plate.len() > MAX_PLATE_LEN {
            return Err(ParkingError::Validation(format!(
                "plate number must be 1 to {} characters",
                MAX_PLATE_LEN
            )));
        }

        if !plate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ' ')
        {
            return Err(ParkingError::Validation(format!(
                "invalid plate number: {}",
                self.plate_number
            )));
        }

        Ok(())
    }
}
