/// Domain vocabulary used to decide whether a line of text is about
/// Zi Wei Dou Shu at all.
use std::sync::LazyLock;

use regex::Regex;

/// Structural and star terms in traditional and simplified forms.
pub const TERMS_ZH: &[&str] = &[
    // structure
    "紫微斗數", "紫微斗数", "斗數", "斗数", "命盤", "命盘", "命宮", "命宫", "身宮", "身宫",
    "宮位", "宫位", "十二宮", "十二宫", "三方四正", "對宮", "对宫", "大限", "流年", "小限",
    "五行局", "命主", "身主", "格局", "化祿", "化禄", "化權", "化权", "化科", "化忌", "四化",
    "廟旺", "庙旺", "落陷", "天干", "地支",
    // palaces
    "兄弟宮", "兄弟宫", "夫妻宮", "夫妻宫", "子女宮", "子女宫", "財帛宮", "财帛宫",
    "疾厄宮", "疾厄宫", "遷移宮", "迁移宫", "交友宮", "交友宫", "僕役宮", "仆役宫",
    "官祿宮", "官禄宫", "田宅宮", "田宅宫", "福德宮", "福德宫", "父母宮", "父母宫",
    // primary stars
    "紫微", "天機", "天机", "太陽", "太阳", "武曲", "天同", "廉貞", "廉贞", "天府",
    "太陰", "太阴", "貪狼", "贪狼", "巨門", "巨门", "天相", "天梁", "七殺", "七杀",
    "破軍", "破军",
    // auxiliaries commonly discussed alongside them
    "文昌", "文曲", "左輔", "左辅", "右弼", "天魁", "天鉞", "天钺", "祿存", "禄存",
    "擎羊", "陀羅", "陀罗", "地空", "地劫", "火星", "鈴星", "铃星",
];

/// English synonyms, matched as whole words, case-insensitively.
pub const TERMS_EN: &[&str] = &[
    "zi wei",
    "ziwei",
    "zi wei dou shu",
    "purple star",
    "emperor star",
    "natal chart",
    "life palace",
    "body palace",
    "twelve palaces",
    "palace",
    "palaces",
    "major star",
    "main star",
    "minor star",
    "four transformations",
    "hua lu",
    "hua quan",
    "hua ke",
    "hua ji",
    "decade luck",
    "heavenly stem",
    "earthly branch",
    "astrology",
    "horoscope",
];

static EN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = TERMS_EN
        .iter()
        .map(|t| regex::escape(t).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).unwrap()
});

/// True when `line` mentions at least one domain term.
pub fn is_relevant(line: &str) -> bool {
    TERMS_ZH.iter().any(|t| line.contains(t)) || EN_PATTERN.is_match(line)
}
