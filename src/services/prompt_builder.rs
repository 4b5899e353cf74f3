//! 出题提示词 - 业务能力层
//!
//! 只负责拼装提示词文本，不关心调用与重试

use crate::models::chapter::Chapter;
use crate::models::question::StoredQuestion;

/// 系统提示词
pub const SYSTEM_PROMPT: &str = "你是出题助理。你必须严格输出 JSON 数组，不要输出任何多余文本。";

/// 一次出题请求的上下文
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub chapter: &'a Chapter,
    pub type_id: i64,
    pub difficulty_id: i64,
    /// 本次需要生成的数量（补题时为缺少的数量）
    pub count: usize,
    /// 第几次尝试，从 1 开始
    pub attempt: u32,
    pub examples: &'a [StoredQuestion],
    /// 本任务已收录的题干
    pub accepted_stems: &'a [String],
}

fn or_placeholder(text: Option<&str>) -> &str {
    match text {
        Some(t) if !t.trim().is_empty() => t,
        _ => "(无)",
    }
}

/// 构建用户提示词
pub fn build_user_prompt(input: &PromptInput<'_>) -> String {
    let summary = input.chapter.summary.trim();
    let summary = if summary.is_empty() { "(暂无概要)" } else { summary };

    let mut prompt = format!(
        r#"请为指定教材章节生成题目，要求：
1) 只生成与章节相关的题
2) 难度与题型遵循要求
3) 输出严格 JSON 数组，每个元素包含字段：question_content, question_answer, question_analysis, question_score
4) question_content 内可包含选项（如A/B/C/D），但仍是纯文本

章节名称：{}
章节概要：{}
目标数量：{}
题型ID：{}
难度ID：{}
"#,
        input.chapter.chapter_name, summary, input.count, input.type_id, input.difficulty_id
    );

    if !input.examples.is_empty() {
        prompt.push_str("\n参考题目（用于风格与覆盖点，不要重复）：\n");
        for (i, q) in input.examples.iter().enumerate() {
            prompt.push_str(&format!(
                "\n{}. 题干：{}\n   答案：{}\n   解析：{}\n",
                i + 1,
                q.content,
                or_placeholder(q.answer.as_deref()),
                or_placeholder(q.analysis.as_deref())
            ));
        }
    }

    if input.attempt > 1 && !input.accepted_stems.is_empty() {
        prompt.push_str(&format!(
            "\n以下 {} 道题已经生成，不要重复这些题目，也不要只改动措辞：\n",
            input.accepted_stems.len()
        ));
        for (i, stem) in input.accepted_stems.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, stem));
        }
    }

    prompt
}
