use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::{BookingStatus, Id, ParkingError, Validator};

pub const MAX_PAGE_SIZE: i64 = 100;
/// Keeps `offset()` inside `i64` for any accepted page size.
pub const MAX_PAGE: i64 = i64::MAX / MAX_PAGE_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(default)]
#[serde(default, rename_all = "camelCase")]
pub struct BookingQuery {
    #[builder(setter(into, strip_option))]
    pub user_id: Option<Id>,
    #[builder(setter(into, strip_option))]
    pub parking_lot_id: Option<Id>,
    #[builder(setter(into, strip_option))]
    pub status: Option<BookingStatus>,
    #[builder(setter(into))]
    pub page: i64,
    #[builder(setter(into))]
    pub page_size: i64,
    pub desc: bool,
}

impl Default for BookingQuery {
    fn default() -> Self {
        Self {
            user_id: None,
            parking_lot_id: None,
            status: None,
            page: 1,
            page_size: 20,
            desc: true,
        }
    }
}

impl BookingQuery {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

impl Validator for BookingQuery {
    fn validate(&self) -> Result<(), ParkingError> {
        if !(1..=MAX_PAGE).contains(&self.page) {
            return Err(ParkingError::Validation(format!(
                "page must be between 1 and {}, got {}",
                MAX_PAGE, self.page
            )));
        }

        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(ParkingError::Validation(format!(
                "page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_should_fill_defaults() {
        let query = BookingQueryBuilder::default()
            .user_id(3)
            .status(BookingStatus::Approved)
            .page(2)
            .build()
            .unwrap();

        assert_eq!(query.user_id, Some(3));
        assert_eq!(query.parking_lot_id, None);
        assert_eq!(query.page_size, 20);
        assert!(query.desc);
        assert_eq!(query.offset(), 20);
        assert!(query.validate().is_ok());
    }

    #[test]
    fn out_of_range_paging_should_reject() {
        let query = BookingQueryBuilder::default().page(0).build().unwrap();
        assert!(matches!(query.validate(), Err(ParkingError::Validation(_))));

        let query = BookingQueryBuilder::default()
            .page_size(MAX_PAGE_SIZE + 1)
            .build()
            .unwrap();
        assert!(matches!(query.validate(), Err(ParkingError::Validation(_))));
    }

    #[test]
    fn huge_page_should_reject_without_overflow() {
        let query = BookingQueryBuilder::default()
            .page(i64::MAX)
            .build()
            .unwrap();
        assert!(matches!(query.validate(), Err(ParkingError::Validation(_))));
        assert_eq!(query.offset(), i64::MAX);

        let query = BookingQueryBuilder::default()
            .page(MAX_PAGE)
            .page_size(MAX_PAGE_SIZE)
            .build()
            .unwrap();
        assert!(query.validate().is_ok());
        assert_eq!(query.offset(), (MAX_PAGE - 1) * MAX_PAGE_SIZE);
    }
}
