//! Model Client
//!
//! チャット補完APIの抽象化（`CompletionClient`）と、OpenAI互換エンドポイント向けの
//! 同期HTTPクライアント実装を提供します。

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::builder::ModelConfig;
use crate::error::ReportError;

/// 1回分の補完リクエスト
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionRequest<'a> {
    /// モデル名
    pub model: &'a str,
    /// サンプリング温度
    pub temperature: f32,
    /// システムメッセージ
    pub system: &'a str,
    /// ユーザーメッセージ（指示文）
    pub user: &'a str,
}

/// チャット補完クライアント
///
/// 構造化ステージはこのトレイト越しにモデルを呼び出します。
/// テストではスタブ実装に差し替えます。
pub trait CompletionClient {
    /// 補完を1回実行し、応答テキストを返す
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, ReportError>;
}

impl<C: CompletionClient + ?Sized> CompletionClient for &C {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, ReportError> {
        (**self).complete(request)
    }
}

/// OpenAI互換のチャット補完クライアント
pub struct OpenAiClient {
    api_base: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    /// 新しいクライアントを生成
    ///
    /// # 引数
    ///
    /// * `api_base` - APIのベースURL（例: `https://api.openai.com/v1`）
    /// * `api_key` - Bearer認証に使用するAPIキー
    /// * `timeout` - リクエスト全体のタイムアウト
    pub fn new(api_base: &str, api_key: String, timeout: Duration) -> Result<Self, ReportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReportError::Http(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    /// モデル設定と環境変数からクライアントを生成
    ///
    /// APIキーは`ModelConfig::api_key_env`で指定された環境変数から読み込みます。
    pub fn from_config(config: &ModelConfig) -> Result<Self, ReportError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ReportError::MissingCredential(config.api_key_env.clone()))?;
        Self::new(&config.api_base, api_key, config.timeout)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

impl CompletionClient for OpenAiClient {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, ReportError> {
        let body = ChatRequest {
            model: request.model,
            temperature: request.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.user,
                },
            ],
        };

        tracing::debug!(endpoint = %self.endpoint(), model = request.model, "sending completion request");
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ReportError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json()?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| {
                ReportError::InvalidModelOutput("response contains no message content".to_string())
            })
    }
}
