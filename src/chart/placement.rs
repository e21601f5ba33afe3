//! Deterministic palace and star placement.
//!
//! Conventions used throughout (all positions are branches on the ring):
//! - month palace: counted forward from 寅 by lunar month
//! - Life Palace: month palace counted back by the hour branch
//! - Body Palace: month palace counted forward by the hour branch
//! - palace stems: five-tiger rule keyed by the year stem
//! - bureau: nayin element of the Life Palace's stem/branch pair
//! - 紫微: lunar day and bureau; 天府 mirrors 紫微 across the 寅-申 axis
use std::sync::Arc;

use tracing::debug;

use super::birth::{BirthRecord, CalendarType, Gender};
use super::calendar::{CalendarConverter, LunarDate};
use super::stars::{self, brightness, transformations_for};
use super::symbols::{Branch, Stem, sexagenary_index};
use super::{Bureau, Chart, DecadeLimit, Palace, PalaceRole, Star};
use crate::error::{CalculationDefect, EngineError, ValidationError};

/// 紫微 series, counted counter-clockwise from 紫微.
const ZIWEI_SERIES: [(&str, i32); 6] = [
    (stars::ZIWEI, 0),
    (stars::TIANJI, -1),
    (stars::TAIYANG, -3),
    (stars::WUQU, -4),
    (stars::TIANTONG, -5),
    (stars::LIANZHEN, -8),
];

/// 天府 series, counted clockwise from 天府.
const TIANFU_SERIES: [(&str, i32); 8] = [
    (stars::TIANFU, 0),
    (stars::TAIYIN, 1),
    (stars::TANLANG, 2),
    (stars::JUMEN, 3),
    (stars::TIANXIANG, 4),
    (stars::TIANLIANG, 5),
    (stars::QISHA, 6),
    (stars::POJUN, 10),
];

/// 祿存 by year stem.
const LUCUN_BY_STEM: [Branch; 10] = [
    Branch::Yin,
    Branch::Mao,
    Branch::Si,
    Branch::Wu,
    Branch::Si,
    Branch::Wu,
    Branch::Shen,
    Branch::You,
    Branch::Hai,
    Branch::Zi,
];

/// (天魁, 天鉞) by year stem.
const KUI_YUE_BY_STEM: [(Branch, Branch); 10] = [
    (Branch::Chou, Branch::Wei),
    (Branch::Zi, Branch::Shen),
    (Branch::Hai, Branch::You),
    (Branch::Hai, Branch::You),
    (Branch::Chou, Branch::Wei),
    (Branch::Zi, Branch::Shen),
    (Branch::Chou, Branch::Wei),
    (Branch::Wu, Branch::Yin),
    (Branch::Mao, Branch::Si),
    (Branch::Mao, Branch::Si),
];

/// Nayin bureau of each consecutive pair in the sexagenary cycle (甲子乙丑 first).
const NAYIN_BUREAU: [Bureau; 30] = [
    Bureau::Metal4,
    Bureau::Fire6,
    Bureau::Wood3,
    Bureau::Earth5,
    Bureau::Metal4,
    Bureau::Fire6,
    Bureau::Water2,
    Bureau::Earth5,
    Bureau::Metal4,
    Bureau::Wood3,
    Bureau::Water2,
    Bureau::Earth5,
    Bureau::Fire6,
    Bureau::Wood3,
    Bureau::Water2,
    Bureau::Metal4,
    Bureau::Fire6,
    Bureau::Wood3,
    Bureau::Earth5,
    Bureau::Metal4,
    Bureau::Fire6,
    Bureau::Water2,
    Bureau::Earth5,
    Bureau::Metal4,
    Bureau::Wood3,
    Bureau::Water2,
    Bureau::Earth5,
    Bureau::Fire6,
    Bureau::Wood3,
    Bureau::Water2,
];

/// Calculates charts. Holds only the optional calendar converter, so one
/// instance can be shared across concurrent requests.
#[derive(Clone, Default)]
pub struct ChartCalculator {
    converter: Option<Arc<dyn CalendarConverter>>,
}

/// Calculate a chart for a lunar birth record.
pub fn calculate(record: &BirthRecord) -> Result<Chart, EngineError> {
    ChartCalculator::new().calculate(record)
}

impl ChartCalculator {
    #[must_use]
    pub fn new() -> Self {
        Self { converter: None }
    }

    /// Calculator that can also place gregorian birth records.
    #[must_use]
    pub fn with_converter(converter: Arc<dyn CalendarConverter>) -> Self {
        Self {
            converter: Some(converter),
        }
    }

    /// Place a validated birth record.
    ///
    /// A birth in a leap month is placed by [`placement_month`]: the first
    /// half of the leap month counts as the month it repeats, the second
    /// half as the following month. The chart keeps the leap flag in
    /// `lunar` either way.
    pub fn calculate(&self, record: &BirthRecord) -> Result<Chart, EngineError> {
        record.validate()?;
        let lunar = self.resolve_lunar(record)?;

        let month = placement_month(&lunar);
        let hour = record.hour_branch.index() as i32;

        let life_branch = Branch::Yin.offset(month - 1 - hour);
        let body_branch = Branch::Yin.offset(month - 1 + hour);

        let life_stem = palace_stem(record.year_stem, life_branch);
        let bureau = bureau_of(life_stem, life_branch)?;

        let forward = record.year_stem.is_yang() == (record.gender == Gender::Male);

        let mut palaces = Vec::with_capacity(12);
        for (i, role) in PalaceRole::ALL.into_iter().enumerate() {
            let branch = life_branch.offset(-(i as i32));
            let steps = if forward {
                (branch.index() as i32 - life_branch.index() as i32).rem_euclid(12)
            } else {
                (life_branch.index() as i32 - branch.index() as i32).rem_euclid(12)
            };
            let start_age = bureau.number() + 10 * steps as u8;
            palaces.push(Palace {
                role,
                stem: palace_stem(record.year_stem, branch),
                branch,
                stars: Vec::new(),
                is_life_palace: role == PalaceRole::Life,
                is_body_palace: branch == body_branch,
                decade: DecadeLimit {
                    start_age,
                    end_age: start_age + 9,
                },
            });
        }

        for (id, branch) in star_positions(record, &lunar, bureau) {
            let slot = (life_branch.index() as i32 - branch.index() as i32).rem_euclid(12) as usize;
            let palace = palaces.get_mut(slot).ok_or_else(|| {
                CalculationDefect(format!("palace index {slot} out of range for {id}"))
            })?;
            if palace.branch != branch {
                return Err(CalculationDefect(format!(
                    "{id} resolved to {} but palace {slot} is {}",
                    branch, palace.branch
                ))
                .into());
            }
            palace.stars.push(Star {
                id: id.to_string(),
                magnitude: brightness(id, branch),
                transformations: transformations_for(record.year_stem, id),
                palace: palace.role,
            });
        }

        debug!(
            life = %life_branch,
            body = %body_branch,
            bureau = bureau.number(),
            "chart placed"
        );

        Ok(Chart {
            birth: record.clone(),
            lunar,
            bureau,
            life_branch,
            body_branch,
            palaces,
        })
    }

    fn resolve_lunar(&self, record: &BirthRecord) -> Result<LunarDate, EngineError> {
        match record.calendar {
            CalendarType::Lunar => Ok(LunarDate {
                year: record.year,
                month: record.month,
                day: record.day,
                is_leap_month: false,
            }),
            CalendarType::Gregorian => {
                let converter = self.converter.as_ref().ok_or_else(|| {
                    ValidationError::new("calendar", "gregorian records need a calendar table")
                })?;
                let lunar = converter.to_lunar(record.gregorian_date()?)?;
                if Stem::of_year(lunar.year) != record.year_stem
                    || Branch::of_year(lunar.year) != record.year_branch
                {
                    return Err(ValidationError::new(
                        "year_stem",
                        format!(
                            "{}{} does not match lunar year {}",
                            record.year_stem, record.year_branch, lunar.year
                        ),
                    )
                    .into());
                }
                Ok(lunar)
            }
        }
    }
}

/// Five-tiger rule: the year stem fixes the stem of the 寅 palace.
fn palace_stem(year_stem: Stem, branch: Branch) -> Stem {
    let yin_stem = (year_stem.index() % 5) * 2 + 2;
    let steps_from_yin = (branch.index() as i32 - 2).rem_euclid(12);
    Stem::from_cycle(yin_stem as i32 + steps_from_yin)
}

fn bureau_of(stem: Stem, branch: Branch) -> Result<Bureau, CalculationDefect> {
    let cycle = sexagenary_index(stem, branch)?;
    NAYIN_BUREAU
        .get(cycle / 2)
        .copied()
        .ok_or_else(|| CalculationDefect(format!("sexagenary index {cycle} out of range")))
}

/// Branch of 紫微 for a lunar day under a bureau.
fn ziwei_branch(day: u8, bureau: Bureau) -> Branch {
    let n = i32::from(bureau.number());
    let d = i32::from(day);
    let borrowed = (n - d % n) % n;
    let quotient = (d + borrowed) / n;
    let steps = if borrowed % 2 == 1 {
        quotient - borrowed
    } else {
        quotient + borrowed
    };
    Branch::Chou.offset(steps)
}

/// Lunar month used for palace and month-star placement. Leap months
/// split at day 15.
pub fn placement_month(lunar: &LunarDate) -> i32 {
    let month = i32::from(lunar.month);
    if lunar.is_leap_month && lunar.day > 15 {
        month % 12 + 1
    } else {
        month
    }
}

fn star_positions(
    record: &BirthRecord,
    lunar: &LunarDate,
    bureau: Bureau,
) -> Vec<(&'static str, Branch)> {
    let hour = record.hour_branch.index() as i32;
    let month = placement_month(lunar);
    let stem = record.year_stem.index();

    let ziwei = ziwei_branch(lunar.day, bureau);
    let tianfu = Branch::Chen.offset(-(ziwei.index() as i32));

    let mut positions: Vec<(&'static str, Branch)> = Vec::with_capacity(25);
    positions.extend(ZIWEI_SERIES.iter().map(|(id, off)| (*id, ziwei.offset(*off))));
    positions.extend(TIANFU_SERIES.iter().map(|(id, off)| (*id, tianfu.offset(*off))));

    let lucun = LUCUN_BY_STEM[stem];
    let (kui, yue) = KUI_YUE_BY_STEM[stem];
    positions.extend([
        (stars::WENCHANG, Branch::Xu.offset(-hour)),
        (stars::WENQU, Branch::Chen.offset(hour)),
        (stars::ZUOFU, Branch::Chen.offset(month - 1)),
        (stars::YOUBI, Branch::Xu.offset(-(month - 1))),
        (stars::TIANKUI, kui),
        (stars::TIANYUE, yue),
        (stars::LUCUN, lucun),
        (stars::QINGYANG, lucun.offset(1)),
        (stars::TUOLUO, lucun.offset(-1)),
        (stars::DIKONG, Branch::Hai.offset(-hour)),
        (stars::DIJIE, Branch::Hai.offset(hour)),
    ]);
    positions
}
