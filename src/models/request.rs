//! 出题请求

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ValidationError;

/// 单条规则允许的最大题目数
pub const MAX_RULE_COUNT: u32 = 50;

/// 出题规则：(题型, 难度, 数量)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRule {
    pub type_id: i64,
    pub difficulty_id: i64,
    pub count: u32,
}

/// 章节权重
///
/// `ratio` 省略时按章节数均分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterWeight {
    pub chapter_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
}

impl ChapterWeight {
    pub fn new(chapter_id: i64, ratio: f64) -> Self {
        Self {
            chapter_id,
            ratio: Some(ratio),
        }
    }

    pub fn uniform(chapter_id: i64) -> Self {
        Self {
            chapter_id,
            ratio: None,
        }
    }
}

/// 一次 AI 出题请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub subject_id: i64,
    pub chapter_weights: Vec<ChapterWeight>,
    pub rules: Vec<GenerationRule>,
    #[serde(default = "default_create_user")]
    pub create_user: String,
}

fn default_create_user() -> String {
    "ai".to_string()
}

impl GenerationRequest {
    pub fn new(subject_id: i64, chapter_weights: Vec<ChapterWeight>, rules: Vec<GenerationRule>) -> Self {
        Self {
            subject_id,
            chapter_weights,
            rules,
            create_user: default_create_user(),
        }
    }

    /// 所有规则的目标题数之和
    pub fn total_count(&self) -> u32 {
        self.rules.iter().map(|r| r.count).sum()
    }

    /// 结构校验（不依赖题库）
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.rules.is_empty() {
            return Err(ValidationError::EmptyRules);
        }
        if self.chapter_weights.is_empty() {
            return Err(ValidationError::EmptyChapters);
        }

        for (rule_index, rule) in self.rules.iter().enumerate() {
            if rule.count < 1 || rule.count > MAX_RULE_COUNT {
                return Err(ValidationError::CountOutOfRange {
                    rule_index,
                    count: rule.count,
                });
            }
        }

        let mut seen = HashSet::new();
        for weight in &self.chapter_weights {
            if !seen.insert(weight.chapter_id) {
                return Err(ValidationError::DuplicateChapter {
                    chapter_id: weight.chapter_id,
                });
            }
            if let Some(ratio) = weight.ratio {
                if !ratio.is_finite() || !(0.0..=1.0).contains(&ratio) {
                    return Err(ValidationError::RatioOutOfRange {
                        chapter_id: weight.chapter_id,
                        ratio,
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(count: u32) -> GenerationRule {
        GenerationRule {
            type_id: 1,
            difficulty_id: 1,
            count,
        }
    }

    #[test]
    fn test_validate_accepts_well_formed_request() {
        let request = GenerationRequest::new(
            1,
            vec![ChapterWeight::new(10, 0.7), ChapterWeight::new(11, 0.3)],
            vec![rule(10), rule(5)],
        );
        assert_eq!(request.validate(), Ok(()));
        assert_eq!(request.total_count(), 15);
    }

    #[test]
    fn test_validate_rejects_count_out_of_range() {
        let request = GenerationRequest::new(1, vec![ChapterWeight::uniform(10)], vec![rule(0)]);
        assert_eq!(
            request.validate(),
            Err(ValidationError::CountOutOfRange { rule_index: 0, count: 0 })
        );

        let request = GenerationRequest::new(1, vec![ChapterWeight::uniform(10)], vec![rule(5), rule(51)]);
        assert_eq!(
            request.validate(),
            Err(ValidationError::CountOutOfRange { rule_index: 1, count: 51 })
        );
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let request = GenerationRequest::new(1, vec![ChapterWeight::new(10, 1.5)], vec![rule(1)]);
        assert!(matches!(request.validate(), Err(ValidationError::RatioOutOfRange { .. })));

        let request = GenerationRequest::new(1, vec![ChapterWeight::new(10, f64::NAN)], vec![rule(1)]);
        assert!(matches!(request.validate(), Err(ValidationError::RatioOutOfRange { .. })));

        let request = GenerationRequest::new(
            1,
            vec![ChapterWeight::uniform(10), ChapterWeight::uniform(10)],
            vec![rule(1)],
        );
        assert_eq!(
            request.validate(),
            Err(ValidationError::DuplicateChapter { chapter_id: 10 })
        );
    }

    #[test]
    fn test_validate_rejects_empty_inputs() {
        let request = GenerationRequest::new(1, vec![ChapterWeight::uniform(10)], vec![]);
        assert_eq!(request.validate(), Err(ValidationError::EmptyRules));

        let request = GenerationRequest::new(1, vec![], vec![rule(1)]);
        assert_eq!(request.validate(), Err(ValidationError::EmptyChapters));
    }

    #[test]
    fn test_create_user_defaults_to_ai() {
        let request: GenerationRequest = serde_json::from_str(
            r#"{"subject_id":1,"chapter_weights":[{"chapter_id":3}],"rules":[{"type_id":1,"difficulty_id":2,"count":4}]}"#,
        )
        .unwrap();
        assert_eq!(request.create_user, "ai");
        assert_eq!(request.chapter_weights[0].ratio, None);
    }
}
