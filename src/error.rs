//! Error Types Module
//!
//! パイプライン全体で使用する構造化エラー型を定義するモジュール。
//! `thiserror`を使用して、エラーの自動変換とメッセージフォーマットを実現する。

use thiserror::Error;

/// incident-reportクレート全体で使用するエラー型
///
/// 抽出（Excel → JSON）、構造化（LLM呼び出し）、描画（JSON → HTML）の
/// 各ステージで発生するエラーを統一的に扱うために使用されます。
///
/// # エラーの種類
///
/// - `Io`: ファイルの読み書き失敗
/// - `Parse`: calamineによるワークブック解析の失敗
/// - `Config`: 設定の検証に失敗したエラー
/// - `InvalidModelOutput`: LLMの応答がJSONとして、またはスキーマとして不正
/// - `Schema`: 構造化JSONがレポートスキーマに一致しない
///
/// # 使用例
///
/// ```rust,no_run
/// use incident_report::ReportError;
/// use std::fs::File;
///
/// fn open_workbook(path: &str) -> Result<(), ReportError> {
///     let _file = File::open(path)?; // Ioエラーが自動的に変換される
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum ReportError {
    /// I/O操作中に発生したエラー
    ///
    /// `#[from]`属性により、`std::io::Error`から自動的に変換されます。
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Excelファイルの解析中に発生したエラー（calamine由来）
    #[error("Failed to parse Excel file: {0}")]
    Parse(#[from] calamine::Error),

    /// UTF-8文字列の変換エラー
    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// ZIPアーカイブの解析エラー
    #[error("ZIP archive error: {0}")]
    Zip(String),

    /// 数値の解析エラー
    #[error("Number parse error: {0}")]
    ParseInt(#[from] std::num::ParseIntError),

    /// パッケージ内XMLの解析エラー
    #[error("XML parse error in '{part}': {message}")]
    Xml {
        /// 解析中のパート名（例: `xl/workbook.xml`）
        part: String,
        /// エラーの詳細メッセージ
        message: String,
    },

    /// JSONのシリアライズ・デシリアライズエラー
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// 設定の検証に失敗したエラー
    ///
    /// `PipelineBuilder::build()`時、またはシート選択時に発生します。
    ///
    /// # 例
    ///
    /// ```rust,no_run
    /// use incident_report::{PipelineBuilder, ReportError};
    ///
    /// let result = PipelineBuilder::new().with_incident_id("").build();
    ///
    /// match result {
    ///     Err(ReportError::Config(msg)) => println!("設定エラー: {}", msg),
    ///     _ => {}
    /// }
    /// ```
    #[error("Configuration error: {0}")]
    Config(String),

    /// セキュリティ制限に違反したエラー
    ///
    /// ZIP bomb攻撃、パストラバーサル攻撃、ファイルサイズ制限などの
    /// セキュリティ制限に違反した場合に発生します。
    #[error("Security violation: {0}")]
    SecurityViolation(String),

    /// APIキーが環境変数に設定されていない
    #[error("Missing API credential: environment variable '{0}' is not set")]
    MissingCredential(String),

    /// HTTP通信の失敗（接続失敗、タイムアウトなど）
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// モデルAPIが成功以外のステータスを返した
    #[error("Model API returned status {status}: {body}")]
    Api {
        /// HTTPステータスコード
        status: u16,
        /// レスポンスボディ
        body: String,
    },

    /// LLMの応答がJSONとして解析できない、またはスキーマに一致しない
    ///
    /// このエラーが発生した場合、構造化JSONファイルは書き込まれません。
    #[error("Model output rejected: {0}")]
    InvalidModelOutput(String),

    /// 構造化JSONがレポートスキーマに一致しない（描画ステージ）
    #[error("Structured report does not match schema: {0}")]
    Schema(String),
}

impl From<reqwest::Error> for ReportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ReportError::Http(format!("request timed out: {}", e))
        } else if e.is_connect() {
            ReportError::Http(format!("connection failed: {}", e))
        } else {
            ReportError::Http(e.to_string())
        }
    }
}
