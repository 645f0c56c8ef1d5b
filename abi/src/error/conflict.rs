// sqlite reports unique violations as
// "UNIQUE constraint failed: bookings.slot_id" or
// "UNIQUE constraint failed: slots.parking_lot_id, slots.number"

use lazy_static::lazy_static;
use regex::Regex;
use std::{convert::Infallible, str::FromStr};

lazy_static! {
    static ref UNIQUE_RE: Regex =
        Regex::new(r"UNIQUE constraint failed:\s*(?P<cols>[A-Za-z0-9_.,\s]+)").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintInfo {
    Parsed(UniqueViolation),
    UnParsed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueViolation {
    pub table: String,
    pub columns: Vec<String>,
}

impl UniqueViolation {
    pub fn is(&self, table: &str, columns: &[&str]) -> bool {
        self.table == table && self.columns.iter().map(String::as_str).eq(columns.iter().copied())
    }
}

impl FromStr for ConstraintInfo {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(violation) = s.parse() {
            Ok(Self::Parsed(violation))
        } else {
            Ok(Self::UnParsed(s.to_string()))
        }
    }
}

impl FromStr for UniqueViolation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cap = UNIQUE_RE.captures(s).ok_or(())?;

        let mut table = None;
        let mut columns = vec![];
        for qualified in cap["cols"].split(',') {
            let (t, c) = qualified.trim().split_once('.').ok_or(())?;
            // every column of one constraint belongs to the same table
            if *table.get_or_insert_with(|| t.to_string()) != t {
                return Err(());
            }
            columns.push(c.to_string());
        }

        Ok(Self {
            table: table.ok_or(())?,
            columns,
        })
    }
}

impl std::fmt::Display for ConstraintInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintInfo::Parsed(v) => write!(f, "{}({})", v.table, v.columns.join(", ")),
            ConstraintInfo::UnParsed(s) => write!(f, "{}", s),
        }
    }
}
