//! Heavenly stems and earthly branches.
//!
//! Both cycles are indexed from zero (甲 = 0, 子 = 0). All arithmetic on the
//! twelve-branch ring goes through [`Branch::offset`], which wraps with
//! `rem_euclid`; the only fallible entry point is [`Branch::from_index`].
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CalculationDefect, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stem {
    #[serde(rename = "甲")]
    Jia,
    #[serde(rename = "乙")]
    Yi,
    #[serde(rename = "丙")]
    Bing,
    #[serde(rename = "丁")]
    Ding,
    #[serde(rename = "戊")]
    Wu,
    #[serde(rename = "己")]
    Ji,
    #[serde(rename = "庚")]
    Geng,
    #[serde(rename = "辛")]
    Xin,
    #[serde(rename = "壬")]
    Ren,
    #[serde(rename = "癸")]
    Gui,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Branch {
    #[serde(rename = "子")]
    Zi,
    #[serde(rename = "丑")]
    Chou,
    #[serde(rename = "寅")]
    Yin,
    #[serde(rename = "卯")]
    Mao,
    #[serde(rename = "辰")]
    Chen,
    #[serde(rename = "巳")]
    Si,
    #[serde(rename = "午")]
    Wu,
    #[serde(rename = "未")]
    Wei,
    #[serde(rename = "申")]
    Shen,
    #[serde(rename = "酉")]
    You,
    #[serde(rename = "戌")]
    Xu,
    #[serde(rename = "亥")]
    Hai,
}

const STEM_SYMBOLS: [(&str, &str); 10] = [
    ("甲", "jia"),
    ("乙", "yi"),
    ("丙", "bing"),
    ("丁", "ding"),
    ("戊", "wu"),
    ("己", "ji"),
    ("庚", "geng"),
    ("辛", "xin"),
    ("壬", "ren"),
    ("癸", "gui"),
];

const BRANCH_SYMBOLS: [(&str, &str); 12] = [
    ("子", "zi"),
    ("丑", "chou"),
    ("寅", "yin"),
    ("卯", "mao"),
    ("辰", "chen"),
    ("巳", "si"),
    ("午", "wu"),
    ("未", "wei"),
    ("申", "shen"),
    ("酉", "you"),
    ("戌", "xu"),
    ("亥", "hai"),
];

impl Stem {
    pub const ALL: [Stem; 10] = [
        Stem::Jia,
        Stem::Yi,
        Stem::Bing,
        Stem::Ding,
        Stem::Wu,
        Stem::Ji,
        Stem::Geng,
        Stem::Xin,
        Stem::Ren,
        Stem::Gui,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn from_cycle(index: i32) -> Self {
        Self::ALL[index.rem_euclid(10) as usize]
    }

    /// 甲 丙 戊 庚 壬 are yang.
    #[must_use]
    pub fn is_yang(self) -> bool {
        self.index() % 2 == 0
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        STEM_SYMBOLS[self.index()].0
    }

    /// Stem of a gregorian/lunar year number (甲子 = 1984).
    #[must_use]
    pub fn of_year(year: i32) -> Self {
        Self::from_cycle(year - 4)
    }
}

impl Branch {
    pub const ALL: [Branch; 12] = [
        Branch::Zi,
        Branch::Chou,
        Branch::Yin,
        Branch::Mao,
        Branch::Chen,
        Branch::Si,
        Branch::Wu,
        Branch::Wei,
        Branch::Shen,
        Branch::You,
        Branch::Xu,
        Branch::Hai,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Checked conversion; an index outside the ring is a placement bug.
    pub fn from_index(index: usize) -> Result<Self, CalculationDefect> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or_else(|| CalculationDefect(format!("branch index {index} outside 0..12")))
    }

    /// Move `steps` positions around the ring (negative = counter-clockwise).
    #[must_use]
    pub fn offset(self, steps: i32) -> Self {
        Self::ALL[(self.index() as i32 + steps).rem_euclid(12) as usize]
    }

    #[must_use]
    pub fn opposite(self) -> Self {
        self.offset(6)
    }

    /// The two other corners of this branch's triangle (三合).
    #[must_use]
    pub fn trine(self) -> [Self; 2] {
        [self.offset(4), self.offset(8)]
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        BRANCH_SYMBOLS[self.index()].0
    }

    #[must_use]
    pub fn of_year(year: i32) -> Self {
        Self::ALL[(year - 4).rem_euclid(12) as usize]
    }
}

/// Whether a stem and branch form one of the sixty sexagenary pairs.
#[must_use]
pub fn is_sexagenary_pair(stem: Stem, branch: Branch) -> bool {
    stem.index() % 2 == branch.index() % 2
}

/// Position (0..60) of a stem/branch pair in the sexagenary cycle.
pub fn sexagenary_index(stem: Stem, branch: Branch) -> Result<usize, CalculationDefect> {
    if !is_sexagenary_pair(stem, branch) {
        return Err(CalculationDefect(format!(
            "{}{} is not a sexagenary pair",
            stem.symbol(),
            branch.symbol()
        )));
    }
    let s = stem.index() as i32;
    let b = branch.index() as i32;
    Ok((6 * s - 5 * b).rem_euclid(60) as usize)
}

fn parse_symbol(input: &str, table: &[(&str, &str)], field: &str) -> Result<usize, ValidationError> {
    let needle = input.trim();
    table
        .iter()
        .position(|(han, latin)| *han == needle || latin.eq_ignore_ascii_case(needle))
        .ok_or_else(|| ValidationError::new(field, format!("unrecognized symbol {needle:?}")))
}

impl FromStr for Stem {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_symbol(s, &STEM_SYMBOLS, "stem").map(|i| Self::ALL[i])
    }
}

impl FromStr for Branch {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_symbol(s, &BRANCH_SYMBOLS, "branch").map(|i| Self::ALL[i])
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
