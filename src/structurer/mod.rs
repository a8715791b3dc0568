//! Structurer Module
//!
//! 抽出結果をLLMに渡し、レポートスキーマに沿った構造化JSONを得るステージ。
//! 応答はコードフェンスを除去してからJSONとして解析し、スキーマ検証に通った場合のみ
//! ファイルに保存します。

mod client;
mod prompt;

pub use client::{CompletionClient, CompletionRequest, OpenAiClient};
pub use prompt::{build_prompt, target_schema, SYSTEM_PROMPT};

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::builder::ModelConfig;
use crate::error::ReportError;
use crate::report::StructuredReport;
use crate::types::ExtractionResult;

/// Markdownのコードフェンス記号（` ```json `と` ``` `）をすべて除去する
///
/// 記号の位置に関わらず除去し、前後の空白を取り除きます。
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// モデルの応答を検証する
///
/// # 戻り値
///
/// * `Ok((Value, StructuredReport))` - 解析済みのJSON値と、その型付きビュー
/// * `Err(ReportError::InvalidModelOutput)` - JSONとして不正、またはスキーマ不一致
pub fn parse_model_output(
    raw: &str,
) -> Result<(serde_json::Value, StructuredReport), ReportError> {
    let cleaned = strip_code_fences(raw);
    let value: serde_json::Value = serde_json::from_str(&cleaned)
        .map_err(|e| ReportError::InvalidModelOutput(format!("JSON parse failed: {}", e)))?;
    let report = StructuredReport::from_value(value.clone())
        .map_err(|e| ReportError::InvalidModelOutput(format!("schema mismatch: {}", e)))?;
    Ok((value, report))
}

/// 抽出JSONを読み込む
pub fn load_extraction(path: &Path) -> Result<ExtractionResult, ReportError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// 構造化ステージを実行する
///
/// モデルを1回だけ呼び出します。応答が不正な場合はエラーログを出力し、
/// 出力ファイルを書き込まずに`InvalidModelOutput`を返します。
pub fn structure<C: CompletionClient>(
    client: &C,
    model: &ModelConfig,
    extraction_json: &Path,
    output_json: &Path,
) -> Result<StructuredReport, ReportError> {
    let extraction = load_extraction(extraction_json)?;
    tracing::debug!(
        cells = extraction.text_cells.len(),
        images = extraction.images.len(),
        "loaded extraction result"
    );

    let prompt = build_prompt(&extraction)?;
    let request = CompletionRequest {
        model: &model.model,
        temperature: model.temperature,
        system: SYSTEM_PROMPT,
        user: &prompt,
    };
    let raw = client.complete(&request)?;

    let (value, report) = match parse_model_output(&raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::error!("⚠️ JSONパースに失敗しました: {}", e);
            return Err(e);
        }
    };

    let mut writer = BufWriter::new(File::create(output_json)?);
    serde_json::to_writer_pretty(&mut writer, &value)?;
    writer.flush()?;
    tracing::info!("✅ 構造化結果を {} に保存しました", output_json.display());

    Ok(report)
}
