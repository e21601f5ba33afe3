//! Gregorian → lunar conversion.
//!
//! Conversion is an injected dependency of the calculator so that chart
//! placement itself stays pure. [`LunarTable`] is a data-driven converter:
//! each lunar year is described by its new-year date, its month lengths in
//! order, and which month (if any) is followed by a leap month.
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LunarDate {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    #[serde(default)]
    pub is_leap_month: bool,
}

pub trait CalendarConverter: Send + Sync {
    fn to_lunar(&self, date: NaiveDate) -> Result<LunarDate, ValidationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LunarYear {
    pub year: i32,
    /// Gregorian date of the first day of lunar month 1.
    pub new_year: NaiveDate,
    /// 12 lengths, or 13 when `leap_month` is set; each 29 or 30.
    pub month_days: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leap_month: Option<u8>,
}

impl LunarYear {
    /// (month number, is leap) for every month of the year, in order.
    fn months(&self) -> Vec<(u8, bool)> {
        let mut months = Vec::with_capacity(13);
        for m in 1..=12u8 {
            months.push((m, false));
            if self.leap_month == Some(m) {
                months.push((m, true));
            }
        }
        months
    }

    fn check(&self) -> Result<(), ValidationError> {
        let expected = if self.leap_month.is_some() { 13 } else { 12 };
        if self.month_days.len() != expected {
            return Err(ValidationError::new(
                "month_days",
                format!(
                    "lunar year {} needs {expected} month lengths, got {}",
                    self.year,
                    self.month_days.len()
                ),
            ));
        }
        if let Some(leap) = self.leap_month.filter(|m| !(1..=12).contains(m)) {
            return Err(ValidationError::new(
                "leap_month",
                format!("lunar year {}: leap month {leap} out of range", self.year),
            ));
        }
        if let Some(bad) = self.month_days.iter().find(|d| !matches!(d, 29 | 30)) {
            return Err(ValidationError::new(
                "month_days",
                format!("lunar year {}: month length {bad}", self.year),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LunarTable {
    years: Vec<LunarYear>,
}

impl LunarTable {
    pub fn new(mut years: Vec<LunarYear>) -> Result<Self, ValidationError> {
        for year in &years {
            year.check()?;
        }
        years.sort_by_key(|y| y.new_year);
        Ok(Self { years })
    }

    /// Load a JSON array of [`LunarYear`] records.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read calendar table: {}", path.display()))?;
        let years: Vec<LunarYear> =
            serde_json::from_str(&data).context("failed to parse calendar table")?;
        Ok(Self::new(years)?)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.years.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }
}

impl CalendarConverter for LunarTable {
    fn to_lunar(&self, date: NaiveDate) -> Result<LunarDate, ValidationError> {
        let outside = || ValidationError::new("calendar", format!("{date} is outside the lunar table"));

        let year = self
            .years
            .iter()
            .rev()
            .find(|y| y.new_year <= date)
            .ok_or_else(outside)?;

        let mut remaining = (date - year.new_year).num_days();
        for ((month, is_leap), len) in year.months().into_iter().zip(&year.month_days) {
            let len = i64::from(*len);
            if remaining < len {
                return Ok(LunarDate {
                    year: year.year,
                    month,
                    day: (remaining + 1) as u8,
                    is_leap_month: is_leap,
                });
            }
            remaining -= len;
        }
        Err(outside())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // Lunar 1990 (庚午) began on 1990-01-27 with a leap 5th month.
    fn table() -> LunarTable {
        LunarTable::new(vec![LunarYear {
            year: 1990,
            new_year: ymd(1990, 1, 27),
            month_days: vec![29, 30, 29, 30, 29, 30, 29, 29, 30, 29, 30, 30, 30],
            leap_month: Some(5),
        }])
        .unwrap()
    }

    #[test]
    fn test_new_year_is_first_day() {
        let lunar = table().to_lunar(ymd(1990, 1, 27)).unwrap();
        assert_eq!((lunar.year, lunar.month, lunar.day), (1990, 1, 1));
        assert!(!lunar.is_leap_month);
    }

    #[test]
    fn test_month_walk() {
        // 29 + 30 days later lands on the first day of month 3
        let lunar = table().to_lunar(ymd(1990, 3, 27)).unwrap();
        assert_eq!((lunar.month, lunar.day), (3, 1));
    }

    #[test]
    fn test_leap_month_flag() {
        // months 1..=5 total 29+30+29+30+29 = 147 days → leap 5th month starts
        let start = ymd(1990, 1, 27) + chrono::Duration::days(147);
        let lunar = table().to_lunar(start).unwrap();
        assert_eq!(lunar.month, 5);
        assert_eq!(lunar.day, 1);
        assert!(lunar.is_leap_month);
    }

    #[test]
    fn test_outside_table() {
        assert_eq!(
            table().to_lunar(ymd(1989, 12, 31)).unwrap_err().field,
            "calendar"
        );
        assert!(table().to_lunar(ymd(1991, 6, 1)).is_err());
    }

    #[test]
    fn test_rejects_bad_lengths() {
        let err = LunarTable::new(vec![LunarYear {
            year: 2000,
            new_year: ymd(2000, 2, 5),
            month_days: vec![30; 12],
            leap_month: Some(4),
        }])
        .unwrap_err();
        assert_eq!(err.field, "month_days");
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("lunar.json");
        let json = serde_json::to_string(&vec![LunarYear {
            year: 1990,
            new_year: ymd(1990, 1, 27),
            month_days: vec![29, 30, 29, 30, 29, 30, 29, 29, 30, 29, 30, 30, 30],
            leap_month: Some(5),
        }])
        .unwrap();
        std::fs::write(&path, json).unwrap();
        let loaded = LunarTable::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
