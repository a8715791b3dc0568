//! Builder Module
//!
//! Fluent Builder APIを提供し、`Pipeline`インスタンスを段階的に構築する。

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::SheetSelector;
use crate::error::ReportError;
use crate::output::HtmlRenderer;
use crate::report::StructuredReport;
use crate::structurer::CompletionClient;
use crate::types::ExtractionResult;

/// 入力ワークブックのデフォルトパス
pub const DEFAULT_INPUT: &str = "Book1.xlsx";
/// 抽出JSONのデフォルトパス
pub const DEFAULT_EXTRACTION_JSON: &str = "excel_analysis.json";
/// 画像出力先（および描画時のフォールバック先）のデフォルトディレクトリ
pub const DEFAULT_IMAGE_DIR: &str = "output_images";
/// デフォルトのトラブル番号
pub const DEFAULT_TROUBLE_ID: u32 = 21;
/// 構造化JSONのデフォルトパス
pub const DEFAULT_STRUCTURED_JSON: &str = "ai_mapped_result.json";
/// 出力HTMLのデフォルトパス
pub const DEFAULT_OUTPUT_HTML: &str = "report.html";
/// デフォルトのモデル名
pub const DEFAULT_MODEL: &str = "gpt-4.1";
/// デフォルトのサンプリング温度
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
/// デフォルトのAPIベースURL
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
/// APIキーを読み込む環境変数
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// リクエストタイムアウト（秒）
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// トラブル番号からインシデントIDを生成（例: 21 → `トラブル21`）
pub fn trouble_incident_id(trouble_id: u32) -> String {
    format!("トラブル{}", trouble_id)
}

/// モデル呼び出しの設定
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// モデル名
    pub model: String,
    /// サンプリング温度（0.0〜2.0）
    pub temperature: f32,
    /// APIベースURL
    pub api_base: String,
    /// APIキーを読み込む環境変数名
    pub api_key_env: String,
    /// リクエストタイムアウト
    pub timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// パイプライン全体の設定
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// 入力ワークブック
    pub input: PathBuf,
    /// 対象シートの選択方式
    pub sheet_selector: SheetSelector,
    /// インシデントID（画像フォルダ名と画像ファイル名の接頭辞）
    pub incident_id: String,
    /// 画像出力先のルートディレクトリ
    pub image_dir: PathBuf,
    /// 抽出JSONのパス
    pub extraction_json: PathBuf,
    /// 構造化JSONのパス
    pub structured_json: PathBuf,
    /// 出力HTMLのパス
    pub output_html: PathBuf,
    /// 描画時に画像が見つからない場合のフォールバックディレクトリ
    pub image_fallback_dir: PathBuf,
    /// モデル設定
    pub model: ModelConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            sheet_selector: SheetSelector::Active,
            incident_id: trouble_incident_id(DEFAULT_TROUBLE_ID),
            image_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
            extraction_json: PathBuf::from(DEFAULT_EXTRACTION_JSON),
            structured_json: PathBuf::from(DEFAULT_STRUCTURED_JSON),
            output_html: PathBuf::from(DEFAULT_OUTPUT_HTML),
            image_fallback_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
            model: ModelConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// このインシデントの画像フォルダ（`<image_dir>/<incident_id>`）
    pub fn image_folder(&self) -> PathBuf {
        self.image_dir.join(&self.incident_id)
    }
}

/// Fluent Builder APIを提供する構造体
///
/// すべての設定項目にデフォルト値が設定されており、必要な設定のみをオーバーライドできます。
///
/// # 使用例
///
/// ```rust,no_run
/// use incident_report::{PipelineBuilder, SheetSelector};
///
/// # fn main() -> Result<(), incident_report::ReportError> {
/// let pipeline = PipelineBuilder::new()
///     .with_input("Book1.xlsx")
///     .with_sheet_selector(SheetSelector::Index(0))
///     .with_trouble_id(21)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    /// 内部設定（構築中）
    config: PipelineConfig,
}

impl PipelineBuilder {
    /// デフォルト設定を持つビルダーインスタンスを生成する
    ///
    /// # デフォルト設定
    ///
    /// - 入力: `Book1.xlsx`（アクティブシート）
    /// - インシデントID: `トラブル21`
    /// - 画像出力先: `output_images/トラブル21/`
    /// - 中間ファイル: `excel_analysis.json`, `ai_mapped_result.json`
    /// - 出力: `report.html`
    /// - モデル: `gpt-4.1`（温度 0.2、タイムアウト 300秒）
    pub fn new() -> Self {
        Self::default()
    }

    /// 入力ワークブックのパスを指定する
    pub fn with_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.input = path.into();
        self
    }

    /// 抽出対象のシートを選択する
    ///
    /// # 使用例
    ///
    /// ```rust,no_run
    /// use incident_report::{PipelineBuilder, SheetSelector};
    ///
    /// let builder = PipelineBuilder::new()
    ///     .with_sheet_selector(SheetSelector::Name("報告書".to_string()));
    /// ```
    pub fn with_sheet_selector(mut self, selector: SheetSelector) -> Self {
        self.config.sheet_selector = selector;
        self
    }

    /// インシデントIDをそのまま指定する
    pub fn with_incident_id(mut self, incident_id: impl Into<String>) -> Self {
        self.config.incident_id = incident_id.into();
        self
    }

    /// トラブル番号からインシデントIDを指定する（`トラブル<n>`）
    pub fn with_trouble_id(mut self, trouble_id: u32) -> Self {
        self.config.incident_id = trouble_incident_id(trouble_id);
        self
    }

    /// 画像出力先のルートディレクトリを指定する
    pub fn with_image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.image_dir = dir.into();
        self
    }

    /// 抽出JSONのパスを指定する
    pub fn with_extraction_json(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.extraction_json = path.into();
        self
    }

    /// 構造化JSONのパスを指定する
    pub fn with_structured_json(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.structured_json = path.into();
        self
    }

    /// 出力HTMLのパスを指定する
    pub fn with_output_html(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_html = path.into();
        self
    }

    /// 描画時の画像フォールバックディレクトリを指定する
    pub fn with_image_fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.image_fallback_dir = dir.into();
        self
    }

    /// モデル名を指定する
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.model.model = model.into();
        self
    }

    /// サンプリング温度を指定する
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.model.temperature = temperature;
        self
    }

    /// APIベースURLを指定する
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.config.model.api_base = api_base.into();
        self
    }

    /// APIキーを読み込む環境変数名を指定する
    pub fn with_api_key_env(mut self, name: impl Into<String>) -> Self {
        self.config.model.api_key_env = name.into();
        self
    }

    /// リクエストタイムアウトを秒単位で指定する
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.config.model.timeout = Duration::from_secs(secs);
        self
    }

    /// 設定を検証し、`Pipeline`インスタンスを生成する
    ///
    /// # 発生し得るエラー
    ///
    /// * `ReportError::Config(String)`: 設定の検証に失敗した場合
    ///   * インシデントIDが空、またはパス区切り文字を含む
    ///   * 温度が0.0〜2.0の範囲外
    ///   * モデル名が空
    ///   * タイムアウトが0
    pub fn build(self) -> Result<Pipeline, ReportError> {
        let config = self.config;

        // 1. インシデントIDの検証（フォルダ名として使用するため）
        let id = config.incident_id.trim();
        if id.is_empty() {
            return Err(ReportError::Config("Incident id must not be empty".to_string()));
        }
        if id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(ReportError::Config(format!(
                "Incident id must not contain path separators: '{}'",
                config.incident_id
            )));
        }

        // 2. モデル設定の検証
        let temperature = config.model.temperature;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ReportError::Config(format!(
                "Temperature must be within 0.0..=2.0: {}",
                temperature
            )));
        }
        if config.model.model.trim().is_empty() {
            return Err(ReportError::Config("Model name must not be empty".to_string()));
        }
        if config.model.timeout.is_zero() {
            return Err(ReportError::Config("Timeout must be greater than zero".to_string()));
        }

        Ok(Pipeline { config })
    }
}

/// 抽出・構造化・描画の3ステージを束ねるファサード
///
/// 各ステージはファイルを介して受け渡しを行い、前のステージの書き込みが
/// 完了してから次のステージを開始します。
///
/// # 使用例
///
/// ```rust,no_run
/// use incident_report::{OpenAiClient, PipelineBuilder};
///
/// # fn main() -> Result<(), incident_report::ReportError> {
/// let pipeline = PipelineBuilder::new().build()?;
/// let client = OpenAiClient::from_config(&pipeline.config().model)?;
/// pipeline.run(&client)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// パイプライン設定
    config: PipelineConfig,
}

impl Pipeline {
    /// 設定を取得
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 抽出ステージ: ワークブックからセルと画像を抽出し、抽出JSONを書き出す
    pub fn extract(&self) -> Result<ExtractionResult, ReportError> {
        tracing::info!("📂 {} を解析します", self.config.input.display());
        let file = File::open(&self.config.input)?;
        self.extract_from_reader(BufReader::new(file))
    }

    /// 抽出ステージ（任意のリーダーから）
    ///
    /// # 処理フロー
    ///
    /// 1. ワークブックとパッケージを開く（セキュリティ検査を含む）
    /// 2. シート選択
    /// 3. テキストセルの抽出（日付シリアル値の正規化を含む）
    /// 4. `xl/media/`配下の画像を書き出し
    /// 5. 描画レイヤーから位置情報を付与
    /// 6. 抽出JSONを書き出し
    pub fn extract_from_reader<R: Read>(&self, input: R) -> Result<ExtractionResult, ReportError> {
        let mut parser = crate::parser::WorkbookParser::open(input)?;

        let (sheet_index, sheet_name) = parser.select_sheet(&self.config.sheet_selector)?;
        tracing::debug!(sheet = %sheet_name, index = sheet_index, "selected sheet");

        let text_cells = parser.text_cells(&sheet_name)?;

        let image_folder = self.config.image_folder();
        let mut images = parser.extract_images(&image_folder, &self.config.incident_id)?;
        parser.attach_positions(sheet_index, &mut images);

        let result = ExtractionResult { text_cells, images };
        write_json(&self.config.extraction_json, &result)?;

        tracing::info!(
            "✅ 抽出完了: セル {} 件, 画像 {} 件 → {}",
            result.text_cells.len(),
            result.images.len(),
            self.config.extraction_json.display()
        );
        Ok(result)
    }

    /// 構造化ステージ: 抽出JSONをモデルに渡し、構造化JSONを書き出す
    pub fn structure<C: CompletionClient>(&self, client: &C) -> Result<StructuredReport, ReportError> {
        tracing::info!("🤖 {} で構造化します", self.config.model.model);
        crate::structurer::structure(
            client,
            &self.config.model,
            &self.config.extraction_json,
            &self.config.structured_json,
        )
    }

    /// 描画ステージ: 構造化JSONを読み込み、HTMLを書き出す
    pub fn render(&self) -> Result<(), ReportError> {
        let report = StructuredReport::load(&self.config.structured_json)?;
        HtmlRenderer::new(&self.config.image_fallback_dir)
            .render_to_file(&report.columns, &self.config.output_html)?;
        tracing::info!("✅ {} を生成しました", self.config.output_html.display());
        Ok(())
    }

    /// 3ステージを順に実行する
    ///
    /// いずれかのステージが失敗した時点で中断し、そのエラーを返します。
    pub fn run<C: CompletionClient>(&self, client: &C) -> Result<(), ReportError> {
        self.extract()?;
        self.structure(client)?;
        self.render()?;
        tracing::info!("🎉 すべて完了しました");
        Ok(())
    }
}

/// 値を2スペースインデントのJSONとして書き出す（非ASCII文字はそのまま）
fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), ReportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}
