//! 出题任务上下文
//!
//! 封装"我正在为哪个任务的哪条规则、哪个叶子章节出题"这一信息

use std::fmt::Display;

/// 出题任务上下文
///
/// 一条规则分配到一个叶子章节即为一个任务
#[derive(Debug, Clone)]
pub struct TaskCtx {
    /// 生成任务 ID
    pub job_id: String,

    /// 规则在请求中的索引（从0开始）
    pub rule_index: usize,

    /// 叶子章节 ID
    pub chapter_id: i64,

    pub type_id: i64,
    pub difficulty_id: i64,

    /// 本任务的目标题数
    pub target: u32,
}

impl TaskCtx {
    pub fn new(
        job_id: impl Into<String>,
        rule_index: usize,
        chapter_id: i64,
        type_id: i64,
        difficulty_id: i64,
        target: u32,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            rule_index,
            chapter_id,
            type_id,
            difficulty_id,
            target,
        }
    }

    /// 日志里使用的短任务 ID
    pub fn short_job_id(&self) -> &str {
        short_id(&self.job_id)
    }
}

/// uuid 的前 8 位
pub fn short_id(job_id: &str) -> &str {
    job_id.get(..8).unwrap_or(job_id)
}

impl Display for TaskCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[任务 {} 规则#{} 章节#{}]",
            self.short_job_id(),
            self.rule_index + 1,
            self.chapter_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_short_id() {
        let ctx = TaskCtx::new("0123456789abcdef", 0, 42, 1, 2, 5);
        assert_eq!(ctx.to_string(), "[任务 01234567 规则#1 章节#42]");
        assert_eq!(short_id("abc"), "abc");
    }
}
