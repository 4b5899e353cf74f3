use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// 审核状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// 待审核（AI 生成的题目入库时的状态）
    Pending = 0,
    Approved = 1,
    Rejected = 2,
}

/// 从模型输出中收集到的一道题
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedItem {
    pub content: String,
    pub answer: Option<String>,
    pub analysis: Option<String>,
    pub score: Option<f64>,
    pub type_id: i64,
}

/// 待写入题库的题目
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewQuestion {
    pub subject_id: i64,
    pub chapter_id: i64,
    pub type_id: i64,
    pub difficulty_id: i64,
    pub content: String,
    pub answer: Option<String>,
    pub analysis: Option<String>,
    pub score: Option<f64>,
    pub is_ai_generated: bool,
    pub review_status: ReviewStatus,
    /// 生成时参考的风格题目 ID
    pub source_question_ids: Vec<i64>,
    pub create_user: String,
    pub create_time: DateTime<Local>,
}

/// 题库中已有的题目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredQuestion {
    pub question_id: i64,
    pub chapter_id: i64,
    pub type_id: i64,
    pub difficulty_id: i64,
    pub content: String,
    pub answer: Option<String>,
    pub analysis: Option<String>,
    pub score: Option<f64>,
    pub review_status: ReviewStatus,
}
