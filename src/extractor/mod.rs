//! HTML → relevant text.
//!
//! The pipeline runs in fixed order: drop non-content blocks, pick the
//! densest content region, flatten to clean lines, read page metadata,
//! then keep only lines that mention the domain lexicon.
pub mod lexicon;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ExtractConfig;
use crate::error::ExtractionError;

const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "footer", "header", "aside", "iframe", "svg", "form",
    "template", "head",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "tr", "td", "th", "table", "section", "article", "main",
    "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "dd", "dt", "dl", "figcaption",
    "hr",
];

/// Content-region candidates, most specific first.
static REGION_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "main",
        "article",
        "[role=main]",
        "[class*=content]",
        "[class*=post]",
        "[id*=content]",
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});

static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static META_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="description"]"#).unwrap());
static OG_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:description"]"#).unwrap());
static HTML_ROOT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("html").unwrap());
static META_HTTP_EQUIV: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta[http-equiv]").unwrap());

static INLINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\f\v\u{00a0}\u{3000}]+").unwrap());
/// Any whitespace run inside a text node, newlines included.
static NODE_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static MARKUP_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<\s*(?:!doctype|html|head|body|div|p|span|a|main|article)\b").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentStats {
    pub raw_chars: usize,
    pub relevant_chars: usize,
    pub relevant_lines: usize,
    /// `relevant_chars / raw_chars`; low values flag boilerplate pages.
    pub relevance_ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub metadata: PageMetadata,
    pub relevant_text: String,
    pub raw_text: String,
    pub stats: ContentStats,
}

#[derive(Debug, Clone)]
pub struct Extractor {
    min_content_chars: usize,
    min_line_chars: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(&ExtractConfig::default())
    }
}

impl Extractor {
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            min_content_chars: config.min_content_chars,
            min_line_chars: config.min_line_chars,
        }
    }

    pub fn extract(&self, markup: &str) -> Result<Extraction, ExtractionError> {
        if markup.trim().is_empty() {
            return Err(ExtractionError::Empty);
        }
        if !MARKUP_HINT.is_match(markup) {
            return Err(ExtractionError::NotMarkup);
        }

        let doc = Html::parse_document(markup);
        let raw_text = self.content_region(&doc);
        let metadata = metadata(&doc, &raw_text);
        let relevant: Vec<&str> = raw_text
            .lines()
            .filter(|l| l.chars().count() > self.min_line_chars && lexicon::is_relevant(l))
            .collect();
        let relevant_text = relevant.join("\n");

        let raw_chars = raw_text.chars().count();
        let relevant_chars = relevant_text.chars().count();
        let stats = ContentStats {
            raw_chars,
            relevant_chars,
            relevant_lines: relevant.len(),
            relevance_ratio: if raw_chars == 0 {
                0.0
            } else {
                relevant_chars as f64 / raw_chars as f64
            },
        };

        Ok(Extraction {
            metadata,
            relevant_text,
            raw_text,
            stats,
        })
    }

    /// Clean text of the first region above the threshold, else the body.
    fn content_region(&self, doc: &Html) -> String {
        for selector in REGION_SELECTORS.iter() {
            for el in doc.select(selector) {
                let text = visible_text(el);
                if text.chars().count() > self.min_content_chars {
                    debug!(
                        tag = el.value().name(),
                        chars = text.chars().count(),
                        "content region found"
                    );
                    return text;
                }
            }
        }
        debug!("no content region above threshold, using whole page");
        match doc.select(&BODY).next() {
            Some(body) => visible_text(body),
            None => visible_text(doc.root_element()),
        }
    }
}

/// Flatten an element to trimmed, whitespace-collapsed lines. Line breaks
/// come only from block elements, never from source formatting.
pub fn visible_text(el: ElementRef<'_>) -> String {
    let mut buf = String::new();
    collect_text(el, &mut buf);
    buf.lines()
        .map(|l| close_cjk_gaps(INLINE_SPACE.replace_all(l, " ").trim()))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(el: ElementRef<'_>, buf: &mut String) {
    let name = el.value().name();
    if SKIPPED_TAGS.contains(&name) {
        return;
    }
    let block = BLOCK_TAGS.contains(&name);
    if block {
        buf.push('\n');
    }
    for child in el.children() {
        match child.value() {
            Node::Text(text) => buf.push_str(&NODE_SPACE.replace_all(text, " ")),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, buf);
                }
            }
            _ => {}
        }
    }
    if block {
        buf.push('\n');
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3000}'..='\u{303f}' | '\u{3400}'..='\u{4dbf}' | '\u{4e00}'..='\u{9fff}' | '\u{ff00}'..='\u{ffef}')
}

/// Drop single spaces left between two CJK characters by source line wrapping.
fn close_cjk_gaps(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ' '
            && i > 0
            && chars.get(i + 1).is_some_and(|&next| is_cjk(next))
            && is_cjk(chars[i - 1])
        {
            continue;
        }
        out.push(c);
    }
    out
}

fn attr_of(doc: &Html, selector: &Selector, attr: &str) -> Option<String> {
    doc.select(selector)
        .filter_map(|el| el.value().attr(attr))
        .map(|v| INLINE_SPACE.replace_all(v.trim(), " ").into_owned())
        .find(|v| !v.is_empty())
}

fn metadata(doc: &Html, text: &str) -> PageMetadata {
    let title = doc
        .select(&TITLE)
        .next()
        .map(|t| {
            let joined: String = t.text().collect();
            INLINE_SPACE.replace_all(joined.trim(), " ").into_owned()
        })
        .filter(|t| !t.is_empty());

    let description = attr_of(doc, &META_DESCRIPTION, "content")
        .or_else(|| attr_of(doc, &OG_DESCRIPTION, "content"));

    let declared = attr_of(doc, &HTML_ROOT, "lang").or_else(|| {
        doc.select(&META_HTTP_EQUIV)
            .find(|m| {
                m.value()
                    .attr("http-equiv")
                    .is_some_and(|v| v.eq_ignore_ascii_case("content-language"))
            })
            .and_then(|m| m.value().attr("content"))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    });

    PageMetadata {
        title,
        description,
        language: declared.or_else(|| guess_language(text)),
    }
}

const TRADITIONAL_ONLY: &str = "們會與說這來個時為學國氣廟權祿門貞陰陽機軍殺宮盤數財遷僕";
const SIMPLIFIED_ONLY: &str = "们会与说这来个时为学国气庙权禄门贞阴阳机军杀宫盘数财迁仆";

/// Script-based guess when the page declares no language.
fn guess_language(text: &str) -> Option<String> {
    let mut han = 0usize;
    let mut latin = 0usize;
    let mut trad = 0usize;
    let mut simp = 0usize;
    for c in text.chars() {
        if ('\u{4e00}'..='\u{9fff}').contains(&c) {
            han += 1;
            if TRADITIONAL_ONLY.contains(c) {
                trad += 1;
            } else if SIMPLIFIED_ONLY.contains(c) {
                simp += 1;
            }
        } else if c.is_ascii_alphabetic() {
            latin += 1;
        }
    }
    if han == 0 && latin == 0 {
        return None;
    }
    // One Han character carries roughly a word; weigh it against letters.
    if han * 4 >= latin {
        Some(if simp > trad { "zh-Hans" } else { "zh-Hant" }.to_string())
    } else {
        Some("en".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(min_content: usize) -> Extractor {
        Extractor::new(&ExtractConfig {
            min_content_chars: min_content,
            min_line_chars: 10,
            raw_sample_chars: 5000,
        })
    }

    const PAGE: &str = r#"<!DOCTYPE html>
<html lang="zh-TW">
<head>
  <title>  紫微斗數 入門  </title>
  <meta name="description" content="命盤基礎">
  <style>.x { color: red }</style>
</head>
<body>
  <header>網站導覽 紫微斗數首頁</header>
  <nav><a href="/">首頁</a> <a href="/stars">紫微星曜總覽</a></nav>
  <!-- 紫微 comment should vanish -->
  <article>
    <h1>紫微星坐命宮</h1>
    <p>紫微星坐命宮的人，氣度恢宏，喜歡領導他人。</p>
    <p>今天的天氣很好，適合出門走走看看。</p>
    <p>若天府在財帛宮，則理財能力穩健而保守。</p>
    <p>短句紫微</p>
  </article>
  <script>var ziwei = "紫微斗數 should not appear";</script>
  <footer>版權所有 紫微斗數研究社</footer>
</body>
</html>"#;

    #[test]
    fn test_strips_non_content_blocks() {
        let out = extractor(20).extract(PAGE).unwrap();
        assert!(!out.raw_text.contains("should not appear"));
        assert!(!out.raw_text.contains("comment should vanish"));
        assert!(!out.raw_text.contains("網站導覽"));
        assert!(!out.raw_text.contains("版權所有"));
        assert!(!out.raw_text.contains(".x {"));
    }

    #[test]
    fn test_relevant_lines_keep_order() {
        let out = extractor(20).extract(PAGE).unwrap();
        let lines: Vec<&str> = out.relevant_text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "紫微星坐命宮的人，氣度恢宏，喜歡領導他人。",
                "若天府在財帛宮，則理財能力穩健而保守。",
            ]
        );
        assert_eq!(out.stats.relevant_lines, 2);
        assert!(out.stats.relevance_ratio > 0.0 && out.stats.relevance_ratio < 1.0);
    }

    #[test]
    fn test_wrapped_paragraph_stays_one_line() {
        let page = "<html><body><article><p>紫微星坐命宮的人，氣度恢宏，\n        喜歡領導他人，做事有魄力，一生多得貴人相助。</p>\n<p>The emperor star in the life\n   palace brings\tdignity and command.</p></article></body></html>";
        let out = extractor(20).extract(page).unwrap();
        let lines: Vec<&str> = out.relevant_text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "紫微星坐命宮的人，氣度恢宏，喜歡領導他人，做事有魄力，一生多得貴人相助。",
                "The emperor star in the life palace brings dignity and command.",
            ]
        );
        assert_eq!(out.raw_text.lines().count(), 2);
    }

    #[test]
    fn test_metadata() {
        let out = extractor(20).extract(PAGE).unwrap();
        assert_eq!(out.metadata.title.as_deref(), Some("紫微斗數 入門"));
        assert_eq!(out.metadata.description.as_deref(), Some("命盤基礎"));
        assert_eq!(out.metadata.language.as_deref(), Some("zh-TW"));
    }

    #[test]
    fn test_short_region_falls_back_to_body() {
        let html = r#"<html><body>
            <main>紫微</main>
            <div>紫微星坐命宮的人，氣度恢宏，喜歡領導他人，做事有魄力。</div>
        </body></html>"#;
        let out = extractor(30).extract(html).unwrap();
        assert!(out.raw_text.contains("做事有魄力"));
    }

    #[test]
    fn test_class_heuristic_region() {
        let html = r#"<html><body>
            <div class="sidebar">紫微斗數熱門文章排行榜與推薦閱讀清單</div>
            <div class="post-body">太陽化祿在官祿宮，事業發展順利而且名聲響亮。</div>
        </body></html>"#;
        let out = extractor(15).extract(html).unwrap();
        assert!(!out.raw_text.contains("排行榜"));
        assert!(out.relevant_text.contains("太陽化祿"));
    }

    #[test]
    fn test_boilerplate_page_has_low_ratio() {
        let mut body = String::from("<html><body>");
        for i in 0..30 {
            body.push_str(&format!("<p>Shop item number {i} with free shipping today</p>"));
        }
        body.push_str("<p>One note on the Life Palace and its major star placement.</p></body></html>");
        let out = extractor(100_000).extract(&body).unwrap();
        assert_eq!(out.stats.relevant_lines, 1);
        assert!(out.stats.relevance_ratio < 0.1);
        assert_eq!(out.metadata.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_empty_and_non_markup_rejected() {
        assert_eq!(extractor(10).extract("   ").unwrap_err(), ExtractionError::Empty);
        assert_eq!(
            extractor(10).extract("just some plain text").unwrap_err(),
            ExtractionError::NotMarkup
        );
    }

    #[test]
    fn test_language_guess() {
        assert_eq!(guess_language("紫微斗數命盤").as_deref(), Some("zh-Hant"));
        assert_eq!(guess_language("紫微斗数命盘").as_deref(), Some("zh-Hans"));
        assert_eq!(guess_language("12345"), None);
    }

    #[test]
    fn test_extraction_is_stable() {
        let a = extractor(20).extract(PAGE).unwrap();
        let b = extractor(20).extract(PAGE).unwrap();
        assert_eq!(a.stats.relevant_chars, b.stats.relevant_chars);
    }
}
