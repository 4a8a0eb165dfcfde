//! Line matchers used by the two extraction passes.
//!
//! Every matcher takes an already-trimmed line.

use std::sync::OnceLock;

use regex::Regex;

pub(crate) const REQUIREMENT_KEYWORD: &str = "需求";
pub(crate) const TEST_CASE_KEYWORD: &str = "测试用例";

static REQUIREMENT_HEADING: OnceLock<Regex> = OnceLock::new();
static TEST_CASE_HEADING: OnceLock<Regex> = OnceLock::new();
static MARKER_ONLY: OnceLock<Regex> = OnceLock::new();
static CJK_CATEGORY: OnceLock<Regex> = OnceLock::new();
static NUMBERED_CATEGORY: OnceLock<Regex> = OnceLock::new();
static HEADING_CATEGORY: OnceLock<Regex> = OnceLock::new();
static CASE_HEADER: OnceLock<Regex> = OnceLock::new();
static OPERATION_FIELD: OnceLock<Regex> = OnceLock::new();
static EXPECTED_FIELD: OnceLock<Regex> = OnceLock::new();
static INLINE_REQUIREMENT: OnceLock<Regex> = OnceLock::new();
static PREAMBLE_END: OnceLock<Regex> = OnceLock::new();

// The patterns are literals; a failure here is a programming error caught by
// the tests below.
fn compile(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap_or_else(|e| panic!("bad pattern {pattern}: {e}")))
}

fn is_section_start(line: &str, heading: &Regex, keyword: &str) -> bool {
    heading.is_match(line) || line == keyword || line.starts_with(&format!("**{keyword}**"))
}

/// `### 需求`, `需求` or `**需求**`.
pub(crate) fn is_requirement_start(line: &str) -> bool {
    is_section_start(
        line,
        compile(&REQUIREMENT_HEADING, r"^#{1,3}\s*需求"),
        REQUIREMENT_KEYWORD,
    )
}

/// `### 测试用例`, `测试用例` or `**测试用例**`.
pub(crate) fn is_test_case_start(line: &str) -> bool {
    is_section_start(
        line,
        compile(&TEST_CASE_HEADING, r"^#{1,3}\s*测试用例"),
        TEST_CASE_KEYWORD,
    )
}

/// Lines made only of markdown marker characters, such as `---` or `***`.
pub(crate) fn is_marker_only(line: &str) -> bool {
    compile(&MARKER_ONLY, r"^[#*\-=]+$").is_match(line)
}

/// Returns the category name for `一、…`, `1. …` or `## …` lines.
pub(crate) fn category_header(line: &str) -> Option<&str> {
    let patterns = [
        compile(&CJK_CATEGORY, r"^[一二三四五六七八九十]+、(.+)$"),
        compile(&NUMBERED_CATEGORY, r"^\d+\.\s*(.+)$"),
        compile(&HEADING_CATEGORY, r"^#{1,3}\s*(.+)$"),
    ];
    patterns
        .iter()
        .find_map(|re| re.captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Returns the case title for `用例N：…` lines.
pub(crate) fn case_header(line: &str) -> Option<&str> {
    compile(&CASE_HEADER, r"^用例\d+[:：]\s*(.+)$")
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Returns the text of a `* 操作：…` bullet.
pub(crate) fn operation_field(line: &str) -> Option<&str> {
    compile(&OPERATION_FIELD, r"^\*\s*操作[:：]\s*(.+)$")
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Returns the text of a `* 期望：…` bullet.
pub(crate) fn expected_field(line: &str) -> Option<&str> {
    compile(&EXPECTED_FIELD, r"^\*\s*期望[:：]\s*(.+)$")
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Finds `需求：…` anywhere in the text and returns the rest of that line.
pub(crate) fn inline_requirement(text: &str) -> Option<&str> {
    compile(&INLINE_REQUIREMENT, r"需求[：:]\s*([^\n]+)")
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

/// Text before the first `测试用例` keyword or `用例N` header.
pub(crate) fn preamble(text: &str) -> &str {
    match compile(&PREAMBLE_END, r"测试用例|用例\d+").find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    }
}
