//! 题库存储 - 基础设施层
//!
//! 生成流程只通过 `QuestionBank` 访问章节与题目，具体的关系型存储在外部实现。
//! `MemoryQuestionBank` 供命令行演示与测试使用。

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::StoreError;
use crate::models::chapter::{Chapter, ChapterNode};
use crate::models::loaders::{GenerationPlan, SeedQuestion};
use crate::models::question::{NewQuestion, ReviewStatus, StoredQuestion};

/// 题库协作方接口（同步调用）
pub trait QuestionBank: Send + Sync {
    fn chapter(&self, chapter_id: i64) -> Result<Option<Chapter>, StoreError>;

    /// 教材内的全部章节节点
    fn chapter_nodes(&self, textbook_id: i64) -> Result<Vec<ChapterNode>, StoreError>;

    /// 最近审核通过的题目（按 id 倒序）
    fn recent_accepted(
        &self,
        chapter_id: i64,
        type_id: i64,
        limit: usize,
    ) -> Result<Vec<StoredQuestion>, StoreError>;

    /// 原子写入一道题，返回题目 id
    fn insert_question(&self, question: NewQuestion) -> Result<i64, StoreError>;
}

#[derive(Default)]
struct MemoryState {
    chapters: BTreeMap<i64, Chapter>,
    questions: Vec<StoredQuestion>,
    inserted: Vec<(i64, NewQuestion)>,
    next_id: i64,
}

/// 内存题库
#[derive(Default)]
pub struct MemoryQuestionBank {
    state: Mutex<MemoryState>,
}

impl MemoryQuestionBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用出题计划里的章节和参考题初始化
    pub fn from_plan(plan: &GenerationPlan) -> Self {
        let bank = Self::new();
        for chapter in &plan.chapters {
            bank.add_chapter(chapter.clone());
        }
        for seed in &plan.questions {
            bank.add_seed(seed);
        }
        bank
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_chapter(&self, chapter: Chapter) {
        self.lock().chapters.insert(chapter.chapter_id, chapter);
    }

    /// 预置一道审核通过的题目，返回 id
    pub fn add_approved(
        &self,
        chapter_id: i64,
        type_id: i64,
        difficulty_id: i64,
        content: &str,
        answer: Option<String>,
        analysis: Option<String>,
    ) -> i64 {
        self.push_approved(StoredQuestion {
            question_id: 0,
            chapter_id,
            type_id,
            difficulty_id,
            content: content.to_string(),
            answer,
            analysis,
            score: None,
            review_status: ReviewStatus::Approved,
        })
    }

    /// 预置计划文件里的参考题（保留分值）
    pub fn add_seed(&self, seed: &SeedQuestion) -> i64 {
        self.push_approved(StoredQuestion {
            question_id: 0,
            chapter_id: seed.chapter_id,
            type_id: seed.type_id,
            difficulty_id: seed.difficulty_id,
            content: seed.content.clone(),
            answer: seed.answer.clone(),
            analysis: seed.analysis.clone(),
            score: seed.score,
            review_status: ReviewStatus::Approved,
        })
    }

    fn push_approved(&self, mut question: StoredQuestion) -> i64 {
        let mut state = self.lock();
        state.next_id += 1;
        question.question_id = state.next_id;
        question.review_status = ReviewStatus::Approved;
        state.questions.push(question);
        state.next_id
    }

    /// 本次运行中写入的题目
    pub fn inserted(&self) -> Vec<(i64, NewQuestion)> {
        self.lock().inserted.clone()
    }
}

impl QuestionBank for MemoryQuestionBank {
    fn chapter(&self, chapter_id: i64) -> Result<Option<Chapter>, StoreError> {
        Ok(self.lock().chapters.get(&chapter_id).cloned())
    }

    fn chapter_nodes(&self, textbook_id: i64) -> Result<Vec<ChapterNode>, StoreError> {
        Ok(self
            .lock()
            .chapters
            .values()
            .filter(|c| c.textbook_id == textbook_id)
            .map(Chapter::node)
            .collect())
    }

    fn recent_accepted(
        &self,
        chapter_id: i64,
        type_id: i64,
        limit: usize,
    ) -> Result<Vec<StoredQuestion>, StoreError> {
        Ok(self
            .lock()
            .questions
            .iter()
            .rev()
            .filter(|q| {
                q.chapter_id == chapter_id
                    && q.type_id == type_id
                    && q.review_status == ReviewStatus::Approved
            })
            .take(limit)
            .cloned()
            .collect())
    }

    fn insert_question(&self, question: NewQuestion) -> Result<i64, StoreError> {
        if question.content.trim().is_empty() {
            return Err(StoreError::InsertFailed {
                message: "题目内容为空".to_string(),
            });
        }

        let mut state = self.lock();
        state.next_id += 1;
        let question_id = state.next_id;
        state.questions.push(StoredQuestion {
            question_id,
            chapter_id: question.chapter_id,
            type_id: question.type_id,
            difficulty_id: question.difficulty_id,
            content: question.content.clone(),
            answer: question.answer.clone(),
            analysis: question.analysis.clone(),
            score: question.score,
            review_status: question.review_status,
        });
        state.inserted.push((question_id, question));
        Ok(question_id)
    }
}
