//! Patient demographics derived from PID fields.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{Datelike, Months, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ObservationError;

/// Canonical gender label shared by patients and metric definitions.
///
/// `Any` doubles as the wildcard on metric rows and as the label for
/// patients whose code is not recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Any,
}

impl Gender {
    /// Map a raw HL7 administrative sex code (PID-8).
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("M") => Gender::Male,
            Some("F") => Gender::Female,
            _ => Gender::Any,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Any => "Any",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = String;

    /// Parse a label as stored in the reference table.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Male" => Ok(Gender::Male),
            "Female" => Ok(Gender::Female),
            "Any" => Ok(Gender::Any),
            other => Err(format!("unknown gender '{}'", other)),
        }
    }
}

/// `YYYYMMDD`, optionally followed by the rest of an HL7 TS value.
fn dob_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{8})(?:\d{2}(?:\d{2}(?:\d{2}(?:\.\d{1,4})?)?)?)?(?:[+-]\d{4})?$")
            .expect("date of birth pattern is valid")
    })
}

/// Parse a date of birth in `YYYYMMDD` form.
pub fn parse_date_of_birth(dob: &str) -> Result<NaiveDate, ObservationError> {
    let invalid = || ObservationError::DateParse {
        value: dob.to_string(),
    };

    let caps = dob_pattern().captures(dob.trim()).ok_or_else(invalid)?;
    NaiveDate::parse_from_str(&caps[1], "%Y%m%d").map_err(|_| invalid())
}

fn shift_years(date: NaiveDate, years: i32) -> Option<NaiveDate> {
    let months = Months::new(years.unsigned_abs().checked_mul(12)?);
    if years >= 0 {
        date.checked_add_months(months)
    } else {
        date.checked_sub_months(months)
    }
}

/// Whole years between a date of birth and `reference`.
///
/// The calendar-year difference is decremented when `reference` falls
/// before the birthday in that year. Advancing Feb 29 by a year lands on
/// Feb 28 of a non-leap year.
pub fn compute_age(dob: &str, reference: NaiveDate) -> Result<i32, ObservationError> {
    let born = parse_date_of_birth(dob)?;

    let mut years = reference.year() - born.year();
    if let Some(anniversary) = shift_years(born, years) {
        if reference < anniversary {
            years -= 1;
        }
    }
    Ok(years)
}

/// Demographic context for matching one patient's observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Demographics {
    pub age: i32,
    pub gender: Gender,
}

impl Demographics {
    pub fn derive(
        dob: &str,
        gender_code: Option<&str>,
        reference: NaiveDate,
    ) -> Result<Self, ObservationError> {
        Ok(Self {
            age: compute_age(dob, reference)?,
            gender: Gender::from_code(gender_code),
        })
    }
}
