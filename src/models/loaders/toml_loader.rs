use crate::models::chapter::Chapter;
use crate::models::request::GenerationRequest;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

/// 出题计划文件
///
/// ```toml
/// [[chapters]]
/// chapter_id = 1
/// textbook_id = 1
/// chapter_name = "第一章 函数"
///
/// [request]
/// subject_id = 54
/// chapter_weights = [{ chapter_id = 1, ratio = 1.0 }]
///
/// [[request.rules]]
/// type_id = 1
/// difficulty_id = 2
/// count = 5
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationPlan {
    pub request: GenerationRequest,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    /// 已审核通过的题目，作为风格参考
    #[serde(default)]
    pub questions: Vec<SeedQuestion>,
}

/// 计划文件里预置的题目
#[derive(Debug, Clone, Deserialize)]
pub struct SeedQuestion {
    pub chapter_id: i64,
    pub type_id: i64,
    #[serde(default = "default_difficulty")]
    pub difficulty_id: i64,
    pub content: String,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

fn default_difficulty() -> i64 {
    1
}

/// 解析 TOML 文本
pub fn parse_plan(content: &str) -> Result<GenerationPlan> {
    let plan: GenerationPlan = toml::from_str(content).context("无法解析出题计划")?;
    Ok(plan)
}

/// 从 TOML 文件加载出题计划
pub async fn load_plan(toml_file_path: &Path) -> Result<GenerationPlan> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let plan = parse_plan(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    tracing::info!(
        "成功加载计划: {} 个章节, {} 条规则, {} 道参考题",
        plan.chapters.len(),
        plan.request.rules.len(),
        plan.questions.len()
    );

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan() {
        let plan = parse_plan(
            r#"
            [[chapters]]
            chapter_id = 1
            textbook_id = 7
            chapter_name = "第一章"

            [[chapters]]
            chapter_id = 2
            textbook_id = 7
            parent_chapter_id = 1
            chapter_name = "1.1 节"
            summary = "集合的概念"

            [[questions]]
            chapter_id = 2
            type_id = 1
            content = "下列关于集合的说法正确的是"

            [request]
            subject_id = 54
            chapter_weights = [{ chapter_id = 1 }]

            [[request.rules]]
            type_id = 1
            difficulty_id = 2
            count = 5
            "#,
        )
        .unwrap();

        assert_eq!(plan.chapters.len(), 2);
        assert_eq!(plan.chapters[1].parent_chapter_id, Some(1));
        assert_eq!(plan.questions[0].difficulty_id, 1);
        assert_eq!(plan.request.total_count(), 5);
        assert_eq!(plan.request.create_user, "ai");
    }

    #[test]
    fn test_parse_plan_rejects_missing_request() {
        assert!(parse_plan("[[chapters]]\nchapter_id = 1\ntextbook_id = 1\nchapter_name = \"x\"\n").is_err());
    }
}
