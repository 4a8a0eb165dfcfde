//! Requirement and test case extraction from the final response text.
//!
//! Two linear passes over the lines: the first captures the requirement
//! section, the second builds categories of cases once the test case section
//! has started. Nothing here fails; missing structure becomes empty
//! collections or the placeholder requirement.

mod matchers;

use tracing::debug;

use matchers::{
    case_header, category_header, expected_field, inline_requirement, is_marker_only,
    is_requirement_start, is_test_case_start, operation_field, preamble, REQUIREMENT_KEYWORD,
};

/// Requirement used when nothing could be recovered from the text.
pub const REQUIREMENT_PLACEHOLDER: &str = "未能从 AI 响应中提取需求描述，请查看完整文本。";

const CASE_LOOKAHEAD: usize = 10;
const FALLBACK_MIN_CHARS: usize = 10;
const FALLBACK_MAX_LINES: usize = 3;
const FALLBACK_MAX_CHARS: usize = 200;

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TestCase {
    pub title: String,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub expected: String,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TestCaseCategory {
    pub category: String,
    pub cases: Vec<TestCase>,
}

/// Structured view of one model response.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    /// Never empty; falls back to [`REQUIREMENT_PLACEHOLDER`].
    pub requirement: String,
    /// Document order. Categories without cases are never present.
    #[serde(alias = "testCases")]
    pub categories: Vec<TestCaseCategory>,
    /// The input text, unmodified.
    pub raw_text: String,
}

impl ExtractionResult {
    /// Total number of cases across all categories.
    pub fn case_count(&self) -> usize {
        self.categories.iter().map(|c| c.cases.len()).sum()
    }

    /// True when the requirement had to fall back to the placeholder.
    pub fn requirement_missing(&self) -> bool {
        self.requirement == REQUIREMENT_PLACEHOLDER
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Preamble,
    Requirement,
    TestCases,
}

/// Extracts the requirement and the test case tree from `text`.
pub fn extract(text: &str) -> ExtractionResult {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut section = Section::Preamble;
    let mut requirement_lines: Vec<&str> = Vec::new();
    let mut requirement = String::new();
    let mut tree = CategoryTree::default();

    for (idx, raw) in lines.iter().enumerate() {
        let line = raw.trim();

        if is_requirement_start(line) {
            section = Section::Requirement;
            requirement_lines.clear();
            continue;
        }
        if is_test_case_start(line) {
            section = Section::TestCases;
            if !requirement_lines.is_empty() {
                requirement = join_requirement(&requirement_lines);
            }
            continue;
        }

        match section {
            Section::Preamble => {}
            Section::Requirement => {
                if !line.is_empty() && !is_marker_only(line) {
                    requirement_lines.push(line);
                }
            }
            Section::TestCases => {
                if let Some(name) = category_header(line) {
                    tree.open(name);
                    continue;
                }
                if let Some(title) = case_header(line) {
                    tree.push(read_case(title, &lines[idx + 1..]));
                }
            }
        }
    }

    // Requirement lines only count once `测试用例` follows them.
    if requirement.is_empty() && requirement_lines.is_empty() {
        if let Some(inline) = inline_requirement(text) {
            requirement = inline.to_string();
        }
    }
    if requirement.is_empty() {
        requirement = heuristic_requirement(text);
    }
    if requirement.is_empty() {
        debug!(chars = text.chars().count(), "no requirement found, using placeholder");
        requirement = REQUIREMENT_PLACEHOLDER.to_string();
    }

    let categories = tree.finish();
    debug!(
        categories = categories.len(),
        cases = categories.iter().map(|c| c.cases.len()).sum::<usize>(),
        "extraction finished"
    );
    ExtractionResult {
        requirement,
        categories,
        raw_text: text.to_string(),
    }
}

fn join_requirement(lines: &[&str]) -> String {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !is_marker_only(l))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds a case from its header title and the lines that follow it.
fn read_case(title: &str, following: &[&str]) -> TestCase {
    let mut case = TestCase {
        title: title.to_string(),
        ..TestCase::default()
    };
    for next in following.iter().take(CASE_LOOKAHEAD).map(|l| l.trim()) {
        if case_header(next).is_some() || category_header(next).is_some() {
            break;
        }
        if let Some(op) = operation_field(next) {
            case.operation = op.to_string();
        }
        if let Some(exp) = expected_field(next) {
            case.expected = exp.to_string();
        }
    }
    case
}

fn heuristic_requirement(text: &str) -> String {
    let joined = preamble(text)
        .split('\n')
        .map(str::trim)
        .filter(|l| {
            !l.is_empty()
                && !is_marker_only(l)
                && *l != REQUIREMENT_KEYWORD
                && l.chars().count() > FALLBACK_MIN_CHARS
        })
        .take(FALLBACK_MAX_LINES)
        .collect::<Vec<_>>()
        .join(" ");
    joined.chars().take(FALLBACK_MAX_CHARS).collect()
}

/// Ordered categories; a category is kept only once it holds a case.
#[derive(Default)]
struct CategoryTree {
    done: Vec<TestCaseCategory>,
    current: Option<TestCaseCategory>,
}

impl CategoryTree {
    fn open(&mut self, name: &str) {
        self.close();
        self.current = Some(TestCaseCategory {
            category: name.to_string(),
            cases: Vec::new(),
        });
    }

    fn push(&mut self, case: TestCase) {
        match self.current.as_mut() {
            Some(category) => category.cases.push(case),
            None => debug!(title = %case.title, "dropping case outside any category"),
        }
    }

    fn close(&mut self) {
        if let Some(category) = self.current.take()
            && !category.cases.is_empty()
        {
            self.done.push(category);
        }
    }

    fn finish(mut self) -> Vec<TestCaseCategory> {
        self.close();
        self.done
    }
}
