use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 请求参数校验错误
    #[error("参数错误: {0}")]
    Validation(#[from] ValidationError),
    /// 任务注册表错误
    #[error("任务错误: {0}")]
    Registry(#[from] RegistryError),
    /// LLM 调用错误
    #[error("LLM错误: {0}")]
    Transport(#[from] TransportError),
    /// 模型输出解析错误
    #[error("解析错误: {0}")]
    Extraction(#[from] ExtractionError),
    /// 题库存储错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 生成任务执行错误
    #[error("生成失败: {0}")]
    Job(#[from] JobError),
    /// 工作池已停止，无法接收新任务
    #[error("工作池已停止")]
    PoolClosed,
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),
}

/// 请求参数校验错误
///
/// 在提交阶段拒绝，不会进入任务注册表
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("出题规则不能为空")]
    EmptyRules,
    #[error("章节列表不能为空")]
    EmptyChapters,
    #[error("第 {rule_index} 条规则的数量 {count} 超出范围 1-50")]
    CountOutOfRange { rule_index: usize, count: u32 },
    #[error("章节 {chapter_id} 的占比 {ratio} 超出范围 0-1")]
    RatioOutOfRange { chapter_id: i64, ratio: f64 },
    #[error("章节 {chapter_id} 重复出现")]
    DuplicateChapter { chapter_id: i64 },
    #[error("章节 {chapter_id} 不存在")]
    UnknownChapter { chapter_id: i64 },
    #[error("章节不属于同一本教材: {first} 与 {other}")]
    MixedTextbooks { first: i64, other: i64 },
}

/// 任务注册表错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("任务不存在: {job_id}")]
    NotFound { job_id: String },
    #[error("任务 {job_id} 状态不能从 {from} 变为 {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },
}

/// LLM 服务调用错误（网络/服务端）
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("LLM API 调用失败 (模型: {model}): {message}")]
    ApiCallFailed { model: String, message: String },
    #[error("LLM 调用超时 (模型: {model}, {timeout_secs} 秒)")]
    Timeout { model: String, timeout_secs: u64 },
    #[error("LLM 返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    #[error("LLM 流式输出中断: {message}")]
    StreamInterrupted { message: String },
    #[error("LLM 请求构建失败: {message}")]
    InvalidRequest { message: String },
}

/// 模型输出无法提取 JSON 数组
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    #[error("AI 返回内容不是 JSON 数组")]
    NoArray,
    #[error("AI 返回的 JSON 数组中没有可解析的元素")]
    NoItems,
}

/// 题库存储错误
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("写入题目失败: {message}")]
    InsertFailed { message: String },
    #[error("查询失败: {message}")]
    QueryFailed { message: String },
}

/// 生成任务执行错误（工作线程内部）
#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("章节 {chapter_id} 题目不足：目标 {target} 道，仅收录 {accepted} 道")]
    InsufficientResults {
        chapter_id: i64,
        target: u32,
        accepted: u32,
    },
    #[error("章节 {chapter_id} 不存在")]
    ChapterMissing { chapter_id: i64 },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

// ========== 便捷构造函数 ==========

impl TransportError {
    /// 创建LLM API调用错误
    pub fn api_call_failed(model: impl Into<String>, source: impl std::fmt::Display) -> Self {
        TransportError::ApiCallFailed {
            model: model.into(),
            message: source.to_string(),
        }
    }

    /// 是否值得在调用点重试
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::InvalidRequest { .. })
    }
}

impl RegistryError {
    pub fn not_found(job_id: impl Into<String>) -> Self {
        RegistryError::NotFound {
            job_id: job_id.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
