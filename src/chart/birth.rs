//! Birth records: the sole external input to chart calculation.
//!
//! [`BirthInput`] is what callers send (loose strings and integers);
//! [`BirthInput::validate`] turns it into a [`BirthRecord`] or rejects it
//! with the offending field. Nothing downstream accepts a `BirthInput`.
use std::str::FromStr;

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::symbols::{Branch, Stem, is_sexagenary_pair};
use crate::error::ValidationError;

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl FromStr for Gender {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" | "男" => Ok(Self::Male),
            "female" | "f" | "女" => Ok(Self::Female),
            other => Err(ValidationError::new(
                "gender",
                format!("expected male or female, got {other:?}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarType {
    #[default]
    Lunar,
    Gregorian,
}

impl FromStr for CalendarType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lunar" => Ok(Self::Lunar),
            "gregorian" | "solar" => Ok(Self::Gregorian),
            other => Err(ValidationError::new(
                "calendar",
                format!("expected lunar or gregorian, got {other:?}"),
            )),
        }
    }
}

/// Unvalidated birth data as received from a caller.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BirthInput {
    /// Year (1900-2100), lunar unless `calendar` is gregorian
    pub year: i32,
    /// Month (1-12)
    pub month: u32,
    /// Day (1-30 lunar, 1-31 gregorian)
    pub day: u32,
    /// Birth hour as an earthly branch, e.g. 午
    #[serde(alias = "hour_branch")]
    pub hour_branch: String,
    /// Year heavenly stem, e.g. 庚
    #[serde(alias = "year_stem")]
    pub year_stem: String,
    /// Year earthly branch, e.g. 午
    #[serde(alias = "year_branch")]
    pub year_branch: String,
    /// male | female
    pub gender: String,
    #[serde(default)]
    pub place: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    /// lunar (default) | gregorian
    #[serde(default)]
    pub calendar: Option<String>,
}

/// A birth record that has passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthRecord {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour_branch: Branch,
    pub year_stem: Stem,
    pub year_branch: Branch,
    pub gender: Gender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub calendar: CalendarType,
}

fn field_symbol<T: FromStr<Err = ValidationError>>(raw: &str, field: &str) -> Result<T, ValidationError> {
    raw.parse::<T>()
        .map_err(|e| ValidationError::new(field, e.reason))
}

impl BirthInput {
    pub fn validate(&self) -> Result<BirthRecord, ValidationError> {
        let calendar = match &self.calendar {
            Some(raw) => raw.parse::<CalendarType>()?,
            None => CalendarType::Lunar,
        };

        let month = u8::try_from(self.month)
            .map_err(|_| ValidationError::new("month", "must be 1-12"))?;
        let day =
            u8::try_from(self.day).map_err(|_| ValidationError::new("day", "out of range"))?;

        let record = BirthRecord {
            year: self.year,
            month,
            day,
            hour_branch: field_symbol(&self.hour_branch, "hour_branch")?,
            year_stem: field_symbol(&self.year_stem, "year_stem")?,
            year_branch: field_symbol(&self.year_branch, "year_branch")?,
            gender: self.gender.parse()?,
            place: self.place.clone().filter(|p| !p.trim().is_empty()),
            timezone: self.timezone.clone().filter(|t| !t.trim().is_empty()),
            calendar,
        };
        record.validate()?;
        Ok(record)
    }
}

impl BirthRecord {
    /// Range and consistency checks. Also run on records that arrive
    /// embedded in chart payloads.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&self.year) {
            return Err(ValidationError::new(
                "year",
                format!("must be {MIN_YEAR}-{MAX_YEAR}, got {}", self.year),
            ));
        }
        if !(1..=12).contains(&self.month) {
            return Err(ValidationError::new(
                "month",
                format!("must be 1-12, got {}", self.month),
            ));
        }
        match self.calendar {
            CalendarType::Lunar => {
                if !(1..=30).contains(&self.day) {
                    return Err(ValidationError::new(
                        "day",
                        format!("lunar day must be 1-30, got {}", self.day),
                    ));
                }
            }
            CalendarType::Gregorian => {
                self.gregorian_date()?;
            }
        }

        if !is_sexagenary_pair(self.year_stem, self.year_branch) {
            return Err(ValidationError::new(
                "year_branch",
                format!(
                    "{}{} is not a sexagenary pair",
                    self.year_stem, self.year_branch
                ),
            ));
        }

        // A gregorian date before the lunar new year belongs to the previous
        // lunar year; the exact year is checked after conversion.
        let candidates: &[i32] = match self.calendar {
            CalendarType::Lunar => &[self.year],
            CalendarType::Gregorian => &[self.year, self.year - 1],
        };
        let consistent = candidates
            .iter()
            .any(|y| Stem::of_year(*y) == self.year_stem && Branch::of_year(*y) == self.year_branch);
        if !consistent {
            return Err(ValidationError::new(
                "year_stem",
                format!(
                    "{}{} does not match year {}",
                    self.year_stem, self.year_branch, self.year
                ),
            ));
        }
        Ok(())
    }

    /// The record's date as a gregorian calendar date.
    pub fn gregorian_date(&self) -> Result<NaiveDate, ValidationError> {
        NaiveDate::from_ymd_opt(self.year, u32::from(self.month), u32::from(self.day))
            .ok_or_else(|| {
                ValidationError::new(
                    "day",
                    format!(
                        "{}-{:02}-{:02} is not a calendar date",
                        self.year, self.month, self.day
                    ),
                )
            })
    }
}
