//! 题目收集 - 业务能力层
//!
//! 把解析出的 JSON 元素映射为 `CollectedItem`：每个字段按别名顺序取第一个非空值，
//! 再按归一化题干去重。一个 `ItemCollector` 只服务于一个出题任务。

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::models::question::CollectedItem;

const CONTENT_KEYS: &[&str] = &["question_content", "content", "stem", "question", "题干"];
const ANSWER_KEYS: &[&str] = &["question_answer", "answer", "答案"];
const ANALYSIS_KEYS: &[&str] = &[
    "question_analysis",
    "analysis",
    "answer_content",
    "explanation",
    "解析",
];
const SCORE_KEYS: &[&str] = &["question_score", "score", "分值"];
const TYPE_KEYS: &[&str] = &["type_id", "question_type_id"];
const OPTION_KEYS: &[&str] = &["options", "选项"];

static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// 去重键：连续空白折叠为一个空格，去掉首尾空白
pub fn normalize_key(content: &str) -> String {
    RE_WHITESPACE.replace_all(content.trim(), " ").into_owned()
}

fn text_of(value: &JsonValue) -> Option<String> {
    let text = match value {
        JsonValue::String(s) => s.trim().to_string(),
        JsonValue::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn first_text(obj: &Map<String, JsonValue>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| obj.get(*k).and_then(text_of))
}

fn first_number(obj: &Map<String, JsonValue>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
    .filter(|n| n.is_finite())
}

fn option_label(index: usize) -> String {
    char::from_u32('A' as u32 + index as u32)
        .map(String::from)
        .unwrap_or_else(|| (index + 1).to_string())
}

fn has_label(content: &str, label: &str) -> bool {
    ['.', '．', '、', ')', '）']
        .iter()
        .any(|sep| content.contains(&format!("{}{}", label, sep)))
}

/// 把选项整理为 `A. ...` 行；题干里已经写了选项时返回空
fn option_lines(content: &str, options: &JsonValue) -> Vec<String> {
    let labelled: Vec<(String, String)> = match options {
        JsonValue::Object(map) => map
            .iter()
            .filter_map(|(label, v)| text_of(v).map(|t| (label.trim().to_string(), t)))
            .collect(),
        JsonValue::Array(list) => list
            .iter()
            .enumerate()
            .filter_map(|(i, v)| match v {
                JsonValue::Object(o) => {
                    let label = first_text(o, &["label", "key"]).unwrap_or_else(|| option_label(i));
                    first_text(o, &["content", "text", "value"]).map(|t| (label, t))
                }
                other => text_of(other).map(|t| (option_label(i), t)),
            })
            .collect(),
        _ => Vec::new(),
    };

    if labelled.is_empty() || labelled.iter().all(|(label, _)| has_label(content, label)) {
        return Vec::new();
    }

    labelled
        .into_iter()
        .map(|(label, text)| {
            if has_label(&text, &label) && text.starts_with(&label) {
                text
            } else {
                format!("{}. {}", label, text)
            }
        })
        .collect()
}

/// 把一个 JSON 元素映射为题目；不是对象或没有题干时返回 None
pub fn parse_item(value: &JsonValue, default_type_id: i64) -> Option<CollectedItem> {
    let obj = value.as_object()?;
    let mut content = first_text(obj, CONTENT_KEYS)?;

    if let Some(options) = OPTION_KEYS.iter().find_map(|k| obj.get(*k)) {
        let lines = option_lines(&content, options);
        if !lines.is_empty() {
            content = format!("{}\n{}", content, lines.join("\n"));
        }
    }

    let type_id = first_number(obj, TYPE_KEYS)
        .filter(|n| n.fract() == 0.0 && *n > 0.0)
        .map(|n| n as i64)
        .unwrap_or(default_type_id);

    Some(CollectedItem {
        content,
        answer: first_text(obj, ANSWER_KEYS),
        analysis: first_text(obj, ANALYSIS_KEYS),
        score: first_number(obj, SCORE_KEYS),
        type_id,
    })
}

/// 一次解析的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub parsed: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// 单个任务内的题目收集器
#[derive(Debug, Default)]
pub struct ItemCollector {
    seen: HashSet<String>,
    items: Vec<CollectedItem>,
}

impl ItemCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[CollectedItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<CollectedItem> {
        self.items
    }

    /// 已收录的题干，用于提示模型不要重复
    pub fn stems(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.content.as_str())
    }

    /// 收录一批解析结果，收满 `target` 道后不再收录
    pub fn admit_all(&mut self, values: &[JsonValue], default_type_id: i64, target: usize) -> ParseStats {
        let mut stats = ParseStats {
            parsed: values.len(),
            ..ParseStats::default()
        };

        for value in values {
            if self.items.len() >= target {
                break;
            }
            let Some(item) = parse_item(value, default_type_id) else {
                stats.rejected += 1;
                continue;
            };
            let key = normalize_key(&item.content);
            if key.is_empty() || !self.seen.insert(key) {
                stats.duplicates += 1;
                continue;
            }
            self.items.push(item);
            stats.accepted += 1;
        }

        stats
    }
}
