//! 模型输出解析 - 业务能力层
//!
//! 从模型返回的自由文本中尽可能多地抢救出 JSON 数组元素：
//! 去掉 markdown 代码块，定位第一个 `[` 与其配对的 `]`，严格解析失败时
//! 逐个解码元素，保留第一个坏元素之前的全部结果。

use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::LazyLock;

use crate::error::ExtractionError;

static RE_FENCE_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^```[A-Za-z0-9_-]*").unwrap());

/// 去掉首尾的 ``` 代码块标记
fn strip_fences(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(m) = RE_FENCE_OPEN.find(text) {
        text = text[m.end()..].trim_start();
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped.trim_end();
    }
    text
}

/// 从 `start`（必须是 `[`）开始寻找配对的 `]`，忽略字符串字面量中的括号
fn find_closing_bracket(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// 逐个解码数组元素，遇到第一个无法解码的位置就停止
fn salvage_items(body: &str) -> Vec<JsonValue> {
    let mut items = Vec::new();
    // 跳过开头的 `[`
    let mut cursor = 1;

    loop {
        let rest = &body[cursor..];
        let skipped = rest.len() - rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',').len();
        cursor += skipped;

        let rest = &body[cursor..];
        if rest.is_empty() || rest.starts_with(']') {
            break;
        }

        let mut values = serde_json::Deserializer::from_str(rest).into_iter::<JsonValue>();
        match values.next() {
            Some(Ok(value)) => {
                items.push(value);
                cursor += values.byte_offset();
            }
            _ => break,
        }
    }

    items
}

/// 从模型输出中提取 JSON 数组
///
/// # 返回
/// - 文本中没有 `[` 时返回 `ExtractionError::NoArray`
/// - 严格解析与逐个解码都得不到任何元素时返回 `ExtractionError::NoItems`
pub fn extract_json_array(text: &str) -> Result<Vec<JsonValue>, ExtractionError> {
    let cleaned = strip_fences(text);
    let start = cleaned.find('[').ok_or(ExtractionError::NoArray)?;

    let body = match find_closing_bracket(cleaned, start) {
        Some(end) => &cleaned[start..=end],
        None => &cleaned[start..],
    };

    if let Ok(items) = serde_json::from_str::<Vec<JsonValue>>(body) {
        return Ok(items);
    }

    let items = salvage_items(body);
    if items.is_empty() {
        return Err(ExtractionError::NoItems);
    }
    tracing::debug!("严格解析失败，逐个解码抢救出 {} 个元素", items.len());
    Ok(items)
}
