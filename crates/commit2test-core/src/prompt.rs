//! Instruction text sent to the model.

/// System prompt used when the configuration leaves it blank.
pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一个专业的测试用例生成助手。";

/// Maximum number of diff characters included in the prompt.
pub const MAX_DIFF_CHARS: usize = 8000;

const TRUNCATION_MARKER: &str = "...(已截断)";

const OUTPUT_FORMAT: &str = r#"## 输出格式要求

请严格按照以下格式输出，必须包含"需求"和"测试用例"两个部分：

### 需求
用一句话描述需求。

[请仔细分析代码变更和提交记录，总结本次代码变更的核心需求。要求：
1. 描述实现了什么功能
2. 说明适用的场景和范围
3. 如果涉及权限，说明权限要求
4. 如果是修复bug，说明修复的问题
示例：授权信息删除功能，支持查看待删除授权信息和已删除记录，仅高级管理员和普通管理员可删除操作。微商城店铺、零售单店、零售总部显示此功能。]

### 测试用例

一、[测试分类1，如：Tab页显示控制]
用例1: [具体的测试场景描述]

用例2: [具体的测试场景描述]

二、[测试分类2，如：权限控制]
用例1: [具体的测试场景描述]


## 测试用例要求
1. 覆盖正向流程、异常情况、边界条件
2. 如果涉及权限，必须包含不同角色的测试
3. 测试用例要具体、可执行
4. 测试用例需要结合代码变更和提交记录来设计

输出正常标题和测试用例，不要包含其他内容，和奇怪的格式。

请开始生成："#;

/// Builds the user prompt from the branch diff and its commit summaries.
pub fn build_user_prompt(diff: &str, commits: &[String]) -> String {
    let (diff_excerpt, truncated) = truncate_chars(diff, MAX_DIFF_CHARS);
    let marker = if truncated { TRUNCATION_MARKER } else { "" };
    format!(
        "你是一个专业的测试用例生成专家。请根据以下 Git 提交信息和代码变更，生成详细的测试用例。\n\n\
         ## 提交记录\n{commits}\n\n\
         ## 代码变更\n```diff\n{diff_excerpt} {marker}\n```\n\n\
         {OUTPUT_FORMAT}\n",
        commits = commits.join("\n"),
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}
