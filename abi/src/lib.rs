mod config;
mod error;
mod types;

pub use config::*;
pub use error::*;
pub use types::*;

/// Identifier of a parking lot, slot, vehicle, booking or user.
pub type Id = i64;
