use serde::{Deserialize, Serialize};

/// 教材章节
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub chapter_id: i64,
    pub textbook_id: i64,
    /// 0 与缺省都视为根章节
    #[serde(default)]
    pub parent_chapter_id: Option<i64>,
    pub chapter_name: String,
    /// 章节概要，用于出题提示词
    #[serde(default)]
    pub summary: String,
}

impl Chapter {
    pub fn node(&self) -> ChapterNode {
        ChapterNode::new(self.chapter_id, self.parent_chapter_id, self.textbook_id)
    }
}

/// 章节层级节点，只用于计算叶子章节
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterNode {
    pub chapter_id: i64,
    pub parent_chapter_id: Option<i64>,
    pub textbook_id: i64,
}

impl ChapterNode {
    pub fn new(chapter_id: i64, parent_chapter_id: Option<i64>, textbook_id: i64) -> Self {
        Self {
            chapter_id,
            parent_chapter_id: parent_chapter_id.filter(|&p| p != 0),
            textbook_id,
        }
    }
}
