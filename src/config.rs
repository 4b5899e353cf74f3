use std::time::Duration;

use crate::orchestrator::ShortfallPolicy;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时运行的生成任务数量（工作池大小）
    pub max_concurrent_jobs: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    /// 单次调用超时（秒）
    pub llm_timeout_secs: u64,
    /// 单次调用的最大重试次数
    pub llm_max_retries: u32,
    /// 线性退避基数（毫秒）
    pub llm_backoff_ms: u64,
    // --- 生成流程配置 ---
    /// 每个章节任务的最大补题轮数
    pub max_attempts: u32,
    /// 风格参考题数量
    pub style_examples: usize,
    /// 单个任务事件日志上限
    pub event_log_cap: usize,
    /// 进度轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// ai_delta 刷新字符阈值
    pub delta_flush_chars: usize,
    /// ai_delta 刷新时间阈值（毫秒）
    pub delta_flush_ms: u64,
    /// 补题耗尽仍不足时的处理策略
    pub shortfall_policy: ShortfallPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.deepseek.com/v1".to_string(),
            llm_model_name: "deepseek-chat".to_string(),
            llm_temperature: 0.7,
            llm_timeout_secs: 60,
            llm_max_retries: 3,
            llm_backoff_ms: 1000,
            max_attempts: 3,
            style_examples: 3,
            event_log_cap: 4000,
            poll_interval_ms: 500,
            delta_flush_chars: 200,
            delta_flush_ms: 800,
            shortfall_policy: ShortfallPolicy::Continue,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS").unwrap_or(default.max_concurrent_jobs).max(1),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            llm_temperature: env_parse("LLM_TEMPERATURE").unwrap_or(default.llm_temperature),
            llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS").unwrap_or(default.llm_timeout_secs),
            llm_max_retries: env_parse("LLM_MAX_RETRIES").unwrap_or(default.llm_max_retries).max(1),
            llm_backoff_ms: env_parse("LLM_BACKOFF_MS").unwrap_or(default.llm_backoff_ms),
            max_attempts: env_parse("MAX_ATTEMPTS").unwrap_or(default.max_attempts).max(1),
            style_examples: env_parse("STYLE_EXAMPLES").unwrap_or(default.style_examples),
            event_log_cap: env_parse("EVENT_LOG_CAP").unwrap_or(default.event_log_cap).max(2),
            poll_interval_ms: env_parse("POLL_INTERVAL_MS").unwrap_or(default.poll_interval_ms),
            delta_flush_chars: env_parse("DELTA_FLUSH_CHARS").unwrap_or(default.delta_flush_chars),
            delta_flush_ms: env_parse("DELTA_FLUSH_MS").unwrap_or(default.delta_flush_ms),
            shortfall_policy: env_parse("SHORTFALL_POLICY").unwrap_or(default.shortfall_policy),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
