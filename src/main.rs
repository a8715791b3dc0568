use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use incident_report::{
    OpenAiClient, Pipeline, PipelineBuilder, ReportError, SheetSelector, DEFAULT_API_BASE,
    DEFAULT_EXTRACTION_JSON, DEFAULT_IMAGE_DIR, DEFAULT_INPUT, DEFAULT_MODEL, DEFAULT_OUTPUT_HTML,
    DEFAULT_STRUCTURED_JSON, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT_SECS, DEFAULT_TROUBLE_ID,
};

#[derive(Parser)]
#[command(
    name = "incident-report",
    version,
    about = "Turn an Excel incident report into structured JSON (via an LLM) and a styled HTML page."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand)]
enum Command {
    /// Extract cells and images from the workbook into the extraction JSON.
    Extract,
    /// Send the extraction JSON to the model and write the structured JSON.
    Structure,
    /// Render the structured JSON as HTML.
    Render,
    /// Run extract, structure and render in sequence.
    Run,
}

#[derive(Args)]
struct Options {
    /// Input workbook.
    #[arg(long, global = true, default_value = DEFAULT_INPUT)]
    input: PathBuf,

    /// Sheet to extract by zero-based index (default: the active sheet).
    #[arg(long, global = true, conflicts_with = "sheet_name")]
    sheet_index: Option<usize>,

    /// Sheet to extract by name (default: the active sheet).
    #[arg(long, global = true)]
    sheet_name: Option<String>,

    /// Trouble number; the incident id becomes `トラブル<n>`.
    #[arg(long, global = true, default_value_t = DEFAULT_TROUBLE_ID, conflicts_with = "incident_id")]
    trouble_id: u32,

    /// Raw incident id used for the image folder and image file names.
    #[arg(long, global = true)]
    incident_id: Option<String>,

    /// Root directory for extracted images.
    #[arg(long, global = true, default_value = DEFAULT_IMAGE_DIR)]
    image_dir: PathBuf,

    /// Directory used in the HTML when an image path does not exist.
    #[arg(long, global = true, default_value = DEFAULT_IMAGE_DIR)]
    image_fallback_dir: PathBuf,

    /// Extraction JSON path.
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_EXTRACTION_JSON)]
    extraction_json: PathBuf,

    /// Structured JSON path.
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_STRUCTURED_JSON)]
    structured_json: PathBuf,

    /// HTML output path.
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_OUTPUT_HTML)]
    output: PathBuf,

    /// Chat-completion model name.
    #[arg(long, global = true, default_value = DEFAULT_MODEL)]
    model: String,

    /// Sampling temperature (0.0..=2.0).
    #[arg(long, global = true, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,

    /// API base URL of an OpenAI-compatible endpoint.
    #[arg(long, global = true, default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Request timeout in seconds.
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
}

impl Options {
    fn into_pipeline(self) -> Result<Pipeline, ReportError> {
        let selector = match (self.sheet_index, self.sheet_name) {
            (Some(index), _) => SheetSelector::Index(index),
            (None, Some(name)) => SheetSelector::Name(name),
            (None, None) => SheetSelector::Active,
        };

        let builder = PipelineBuilder::new()
            .with_input(self.input)
            .with_sheet_selector(selector)
            .with_image_dir(self.image_dir)
            .with_image_fallback_dir(self.image_fallback_dir)
            .with_extraction_json(self.extraction_json)
            .with_structured_json(self.structured_json)
            .with_output_html(self.output)
            .with_model(self.model)
            .with_temperature(self.temperature)
            .with_api_base(self.api_base)
            .with_timeout_secs(self.timeout_secs);

        let builder = match self.incident_id {
            Some(id) => builder.with_incident_id(id),
            None => builder.with_trouble_id(self.trouble_id),
        };

        builder.build()
    }
}

fn run(cli: Cli) -> Result<(), ReportError> {
    let pipeline = cli.options.into_pipeline()?;

    match cli.command {
        Command::Extract => {
            pipeline.extract()?;
        }
        Command::Structure => {
            let client = OpenAiClient::from_config(&pipeline.config().model)?;
            pipeline.structure(&client)?;
        }
        Command::Render => pipeline.render()?,
        Command::Run => {
            // 資格情報は抽出前に確認する
            let client = OpenAiClient::from_config(&pipeline.config().model)?;
            pipeline.run(&client)?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}
