//! LLM API 客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的服务（如 DeepSeek, Doubao 等）
//!
//! 每次调用自带超时，失败后线性退避重试；流式调用不可重启，
//! 由上层决定失败后是否回退到阻塞调用。

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::TransportError;

/// 流式输出的文本增量
pub type TextStream = BoxStream<'static, Result<String, TransportError>>;

/// 文本生成服务接口
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// 阻塞式调用，返回完整文本（调用点内部重试）
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String, TransportError>;

    /// 流式调用，返回只能向前读取一次的增量流
    async fn complete_stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<TextStream, TransportError>;
}

/// LLM 调用参数
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub api_base_url: String,
    pub model_name: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
    pub max_tokens: u32,
}

impl LlmSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key: config.llm_api_key.clone(),
            api_base_url: config.llm_api_base_url.clone(),
            model_name: config.llm_model_name.clone(),
            timeout: Duration::from_secs(config.llm_timeout_secs),
            max_retries: config.llm_max_retries,
            backoff: Duration::from_millis(config.llm_backoff_ms),
            max_tokens: 4096,
        }
    }
}

/// LLM 客户端
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    settings: LlmSettings,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(settings: LlmSettings) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&settings.api_key)
            .with_api_base(&settings.api_base_url);

        Self {
            client: Client::with_config(openai_config),
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(LlmSettings::from_config(config))
    }

    fn invalid_request(err: impl std::fmt::Display) -> TransportError {
        TransportError::InvalidRequest {
            message: err.to_string(),
        }
    }

    fn build_request(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<CreateChatCompletionRequest, TransportError> {
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()
            .map_err(Self::invalid_request)?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_prompt)
            .build()
            .map_err(Self::invalid_request)?;

        CreateChatCompletionRequestArgs::default()
            .model(&self.settings.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(temperature)
            .max_tokens(self.settings.max_tokens)
            .build()
            .map_err(Self::invalid_request)
    }

    async fn complete_once(&self, request: CreateChatCompletionRequest) -> Result<String, TransportError> {
        let model = &self.settings.model_name;
        let response = tokio::time::timeout(self.settings.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| TransportError::Timeout {
                model: model.clone(),
                timeout_secs: self.settings.timeout.as_secs(),
            })?
            .map_err(|e| TransportError::api_call_failed(model, e))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| TransportError::EmptyContent {
                model: model.clone(),
            })?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String, TransportError> {
        debug!(
            "调用 LLM API，模型: {}，用户消息长度: {} 字符",
            self.settings.model_name,
            user_prompt.chars().count()
        );
        let request = self.build_request(system_prompt, user_prompt, temperature)?;

        with_retries(self.settings.max_retries, self.settings.backoff, "LLM 调用", || {
            self.complete_once(request.clone())
        })
        .await
    }

    async fn complete_stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<TextStream, TransportError> {
        debug!("调用 LLM 流式 API，模型: {}", self.settings.model_name);
        let request = self.build_request(system_prompt, user_prompt, temperature)?;
        let model = self.settings.model_name.clone();
        let idle_timeout = self.settings.timeout;

        let inner = tokio::time::timeout(idle_timeout, self.client.chat().create_stream(request))
            .await
            .map_err(|_| TransportError::Timeout {
                model: model.clone(),
                timeout_secs: idle_timeout.as_secs(),
            })?
            .map_err(|e| TransportError::api_call_failed(&model, e))?;

        // 每个分片都受同一超时约束，出错后流立即结束
        let deltas = stream::unfold(Some(inner), move |state| {
            let model = model.clone();
            async move {
                let mut inner = state?;
                match tokio::time::timeout(idle_timeout, inner.next()).await {
                    Ok(Some(Ok(chunk))) => {
                        let text: String = chunk
                            .choices
                            .into_iter()
                            .filter_map(|choice| choice.delta.content)
                            .collect();
                        Some((Ok(text), Some(inner)))
                    }
                    Ok(Some(Err(e))) => Some((
                        Err(TransportError::StreamInterrupted {
                            message: e.to_string(),
                        }),
                        None,
                    )),
                    Ok(None) => None,
                    Err(_) => Some((
                        Err(TransportError::Timeout {
                            model,
                            timeout_secs: idle_timeout.as_secs(),
                        }),
                        None,
                    )),
                }
            }
        });

        Ok(deltas.boxed())
    }
}

/// 带线性退避的重试：第 n 次失败后等待 `backoff * n`
pub async fn with_retries<T, F, Fut>(
    max_retries: u32,
    backoff: Duration,
    label: &str,
    mut call: F,
) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let max_retries = max_retries.max(1);
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_retries && e.is_retryable() => {
                warn!("{} 失败 (尝试 {}/{}): {}", label, attempt, max_retries, e);
                tokio::time::sleep(backoff * attempt).await;
                attempt += 1;
            }
            Err(e) => {
                warn!("{} 彻底失败 (已尝试 {} 次): {}", label, attempt, e);
                return Err(e);
            }
        }
    }
}
