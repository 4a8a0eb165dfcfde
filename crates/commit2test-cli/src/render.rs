//! Plain-text rendering of extraction results and diff metadata.

use commit2test_core::ExtractionResult;

/// Markdown summary of one extraction, in document order.
pub fn markdown_summary(result: &ExtractionResult) -> String {
    let mut out = String::new();
    out.push_str("### 需求\n");
    out.push_str(&result.requirement);
    out.push_str("\n\n### 测试用例\n");
    if result.categories.is_empty() {
        out.push_str("\n(no test cases recognized)\n");
        return out;
    }
    for category in &result.categories {
        out.push('\n');
        out.push_str("#### ");
        out.push_str(&category.category);
        out.push('\n');
        for (idx, case) in category.cases.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", idx + 1, case.title));
            if !case.operation.is_empty() {
                out.push_str(&format!("   - 操作: {}\n", case.operation));
            }
            if !case.expected.is_empty() {
                out.push_str(&format!("   - 期望: {}\n", case.expected));
            }
        }
    }
    out
}

/// File paths touched by a unified diff, taken from `diff --git` headers.
pub fn files_in_diff(diff: &str) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for line in diff.lines() {
        let Some(rest) = line.strip_prefix("diff --git ") else {
            continue;
        };
        let Some((_, target)) = rest.rsplit_once(" b/") else {
            continue;
        };
        if !files.iter().any(|f| f == target) {
            files.push(target.to_string());
        }
    }
    files
}

/// Suffix of `cumulative` not yet printed, or the whole text when the
/// previous snapshot is not a prefix of it.
pub fn unseen_suffix<'a>(printed: &str, cumulative: &'a str) -> &'a str {
    cumulative.strip_prefix(printed).unwrap_or(cumulative)
}
