//! Star vocabulary, brightness, and the four transformations.
//!
//! Star identifiers are open string keys: rules ingested from the corpus may
//! name stars this table has never heard of. [`star_info`] resolves known
//! stars and falls back to a generic record for everything else.
use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use super::symbols::Stem;

pub const ZIWEI: &str = "紫微";
pub const TIANJI: &str = "天機";
pub const TAIYANG: &str = "太陽";
pub const WUQU: &str = "武曲";
pub const TIANTONG: &str = "天同";
pub const LIANZHEN: &str = "廉貞";
pub const TIANFU: &str = "天府";
pub const TAIYIN: &str = "太陰";
pub const TANLANG: &str = "貪狼";
pub const JUMEN: &str = "巨門";
pub const TIANXIANG: &str = "天相";
pub const TIANLIANG: &str = "天梁";
pub const QISHA: &str = "七殺";
pub const POJUN: &str = "破軍";

pub const WENCHANG: &str = "文昌";
pub const WENQU: &str = "文曲";
pub const ZUOFU: &str = "左輔";
pub const YOUBI: &str = "右弼";
pub const TIANKUI: &str = "天魁";
pub const TIANYUE: &str = "天鉞";
pub const LUCUN: &str = "祿存";
pub const QINGYANG: &str = "擎羊";
pub const TUOLUO: &str = "陀羅";
pub const DIKONG: &str = "地空";
pub const DIJIE: &str = "地劫";

/// Ordinal brightness, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Magnitude {
    /// 陷
    Trapped,
    /// 不
    Weak,
    /// 平
    Neutral,
    /// 利
    Beneficial,
    /// 得
    Gained,
    /// 旺
    Prosperous,
    /// 廟
    Temple,
}

impl Magnitude {
    fn from_symbol(c: char) -> Option<Self> {
        match c {
            '陷' => Some(Self::Trapped),
            '不' => Some(Self::Weak),
            '平' => Some(Self::Neutral),
            '利' => Some(Self::Beneficial),
            '得' => Some(Self::Gained),
            '旺' => Some(Self::Prosperous),
            '廟' => Some(Self::Temple),
            _ => None,
        }
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Trapped => "陷",
            Self::Weak => "不",
            Self::Neutral => "平",
            Self::Beneficial => "利",
            Self::Gained => "得",
            Self::Prosperous => "旺",
            Self::Temple => "廟",
        }
    }
}

/// The four transformations (四化).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transformation {
    /// 化祿
    Wealth,
    /// 化權
    Power,
    /// 化科
    Scholarship,
    /// 化忌
    Adversity,
}

impl Transformation {
    pub const ALL: [Transformation; 4] = [
        Transformation::Wealth,
        Transformation::Power,
        Transformation::Scholarship,
        Transformation::Adversity,
    ];

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Wealth => "化祿",
            Self::Power => "化權",
            Self::Scholarship => "化科",
            Self::Adversity => "化忌",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StarKind {
    Primary,
    Auxiliary,
    Malefic,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StarInfo {
    pub id: String,
    pub name_zh: String,
    pub name_en: String,
    pub kind: StarKind,
}

/// (traditional id, simplified spelling, english name, kind)
const STAR_TABLE: &[(&str, &str, &str, StarKind)] = &[
    (ZIWEI, "紫微", "Zi Wei (Emperor)", StarKind::Primary),
    (TIANJI, "天机", "Tian Ji (Strategist)", StarKind::Primary),
    (TAIYANG, "太阳", "Tai Yang (Sun)", StarKind::Primary),
    (WUQU, "武曲", "Wu Qu (General)", StarKind::Primary),
    (TIANTONG, "天同", "Tian Tong (Fortunate)", StarKind::Primary),
    (LIANZHEN, "廉贞", "Lian Zhen (Chastity)", StarKind::Primary),
    (TIANFU, "天府", "Tian Fu (Treasurer)", StarKind::Primary),
    (TAIYIN, "太阴", "Tai Yin (Moon)", StarKind::Primary),
    (TANLANG, "贪狼", "Tan Lang (Wolf)", StarKind::Primary),
    (JUMEN, "巨门", "Ju Men (Great Gate)", StarKind::Primary),
    (TIANXIANG, "天相", "Tian Xiang (Minister)", StarKind::Primary),
    (TIANLIANG, "天梁", "Tian Liang (Sage)", StarKind::Primary),
    (QISHA, "七杀", "Qi Sha (Seven Killings)", StarKind::Primary),
    (POJUN, "破军", "Po Jun (Army Breaker)", StarKind::Primary),
    (WENCHANG, "文昌", "Wen Chang (Literary Talent)", StarKind::Auxiliary),
    (WENQU, "文曲", "Wen Qu (Literary Arts)", StarKind::Auxiliary),
    (ZUOFU, "左辅", "Zuo Fu (Left Assistant)", StarKind::Auxiliary),
    (YOUBI, "右弼", "You Bi (Right Assistant)", StarKind::Auxiliary),
    (TIANKUI, "天魁", "Tian Kui (Heavenly Noble)", StarKind::Auxiliary),
    (TIANYUE, "天钺", "Tian Yue (Heavenly Honour)", StarKind::Auxiliary),
    (LUCUN, "禄存", "Lu Cun (Wealth Keeper)", StarKind::Auxiliary),
    (QINGYANG, "擎羊", "Qing Yang (Ram)", StarKind::Malefic),
    (TUOLUO, "陀罗", "Tuo Luo (Spinning Top)", StarKind::Malefic),
    (DIKONG, "地空", "Di Kong (Void)", StarKind::Malefic),
    (DIJIE, "地劫", "Di Jie (Robbery)", StarKind::Malefic),
];

/// Primary-star brightness, twelve entries starting at 寅.
const BRIGHTNESS_FROM_YIN: &[(&str, &str)] = &[
    (ZIWEI, "旺旺得旺廟廟旺旺得旺平廟"),
    (TIANJI, "得旺利平廟陷得旺利平廟陷"),
    (TAIYANG, "旺廟旺旺旺得得陷不陷陷不"),
    (WUQU, "得利廟平旺廟得利廟平旺廟"),
    (TIANTONG, "利平平廟陷不旺平平廟旺不"),
    (LIANZHEN, "廟平利陷平利廟平利陷平利"),
    (TIANFU, "廟得廟得旺廟得旺廟得廟廟"),
    (TAIYIN, "旺陷陷陷不不利不旺廟廟廟"),
    (TANLANG, "平利廟陷旺廟平利廟陷旺廟"),
    (JUMEN, "廟廟陷旺旺不廟廟旺旺旺不"),
    (TIANXIANG, "廟陷得得廟得廟陷得得廟廟"),
    (TIANLIANG, "廟廟廟陷廟旺陷得廟陷廟旺"),
    (QISHA, "廟旺廟平旺廟廟廟廟平旺廟"),
    (POJUN, "得陷旺平廟旺得陷旺平廟旺"),
];

/// 祿 權 科 忌 by year stem, 甲 first.
const FOUR_TRANSFORMATIONS: [[&str; 4]; 10] = [
    [LIANZHEN, POJUN, WUQU, TAIYANG],
    [TIANJI, TIANLIANG, ZIWEI, TAIYIN],
    [TIANTONG, TIANJI, WENCHANG, LIANZHEN],
    [TAIYIN, TIANTONG, TIANJI, JUMEN],
    [TANLANG, TAIYIN, YOUBI, TIANJI],
    [WUQU, TANLANG, TIANLIANG, WENQU],
    [TAIYANG, WUQU, TAIYIN, TIANTONG],
    [JUMEN, TAIYANG, WENQU, WENCHANG],
    [TIANLIANG, ZIWEI, ZUOFU, WUQU],
    [POJUN, JUMEN, TAIYIN, TANLANG],
];

/// Every star the calculator places, primary stars first.
pub fn all_star_ids() -> impl Iterator<Item = &'static str> {
    STAR_TABLE.iter().map(|(id, ..)| *id)
}

/// Map simplified spellings onto the traditional ids used in charts.
#[must_use]
pub fn canonical_star_id(id: &str) -> Cow<'_, str> {
    let trimmed = id.trim();
    STAR_TABLE
        .iter()
        .find(|(traditional, simplified, _, _)| *traditional == trimmed || *simplified == trimmed)
        .map(|(traditional, ..)| Cow::Borrowed(*traditional))
        .unwrap_or(Cow::Borrowed(trimmed))
}

/// Metadata for any star id; unknown ids get a generic record.
#[must_use]
pub fn star_info(id: &str) -> StarInfo {
    let canonical = canonical_star_id(id);
    match STAR_TABLE.iter().find(|(t, ..)| *t == canonical) {
        Some((traditional, _, english, kind)) => StarInfo {
            id: (*traditional).to_string(),
            name_zh: (*traditional).to_string(),
            name_en: (*english).to_string(),
            kind: *kind,
        },
        None => StarInfo {
            id: canonical.to_string(),
            name_zh: canonical.to_string(),
            name_en: canonical.to_string(),
            kind: StarKind::Unknown,
        },
    }
}

/// Brightness of a primary star in a branch; `None` for unrated stars.
#[must_use]
pub fn brightness(star: &str, branch: super::symbols::Branch) -> Option<Magnitude> {
    let (_, row) = BRIGHTNESS_FROM_YIN.iter().find(|(id, _)| *id == star)?;
    let slot = (branch.index() + 10) % 12;
    row.chars().nth(slot).and_then(Magnitude::from_symbol)
}

/// Transformations the year stem attaches to `star`.
#[must_use]
pub fn transformations_for(stem: Stem, star: &str) -> Vec<Transformation> {
    FOUR_TRANSFORMATIONS[stem.index()]
        .iter()
        .zip(Transformation::ALL)
        .filter(|(target, _)| **target == star)
        .map(|(_, t)| t)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::symbols::Branch;

    #[test]
    fn test_brightness_rows_complete() {
        for (star, row) in BRIGHTNESS_FROM_YIN {
            assert_eq!(row.chars().count(), 12, "row for {star}");
            for branch in Branch::ALL {
                assert!(brightness(star, branch).is_some(), "{star} in {branch}");
            }
        }
    }

    #[test]
    fn test_brightness_lookup() {
        assert_eq!(brightness(ZIWEI, Branch::Wu), Some(Magnitude::Temple));
        assert_eq!(brightness(ZIWEI, Branch::Zi), Some(Magnitude::Neutral));
        assert_eq!(brightness(TAIYANG, Branch::Hai), Some(Magnitude::Trapped));
        assert_eq!(brightness(WENCHANG, Branch::Zi), None);
    }

    #[test]
    fn test_magnitude_ordering() {
        assert!(Magnitude::Temple > Magnitude::Prosperous);
        assert!(Magnitude::Neutral > Magnitude::Trapped);
    }

    #[test]
    fn test_transformations_for_geng() {
        assert_eq!(
            transformations_for(Stem::Geng, TAIYANG),
            vec![Transformation::Wealth]
        );
        assert_eq!(
            transformations_for(Stem::Geng, TIANTONG),
            vec![Transformation::Adversity]
        );
        assert!(transformations_for(Stem::Geng, ZIWEI).is_empty());
    }

    #[test]
    fn test_every_stem_has_four_targets() {
        for stem in Stem::ALL {
            let count: usize = STAR_TABLE
                .iter()
                .map(|(id, ..)| transformations_for(stem, id).len())
                .sum();
            assert_eq!(count, 4, "stem {stem}");
        }
    }

    #[test]
    fn test_star_info_fallback() {
        let known = star_info("贪狼");
        assert_eq!(known.id, TANLANG);
        assert_eq!(known.kind, StarKind::Primary);

        let unknown = star_info("紅鸞");
        assert_eq!(unknown.id, "紅鸞");
        assert_eq!(unknown.name_en, "紅鸞");
        assert_eq!(unknown.kind, StarKind::Unknown);
    }
}
