//! incident-report - Excel incident reports to structured JSON and styled HTML
//!
//! This crate turns a free-layout Excel incident report (XLSX) into a single
//! static HTML report in three file-backed stages:
//!
//! 1. **Extract**: every non-empty cell of one sheet (date serials normalized to
//!    `YYYY-MM-DD`) plus every embedded image, with its anchor cell and pixel size,
//!    written to an extraction JSON file.
//! 2. **Structure**: the extraction is sent to a chat-completion model together
//!    with a fixed target schema and placement rules; the validated reply is
//!    written to a structured JSON file.
//! 3. **Render**: the structured report becomes one HTML document with header,
//!    progress and summary cards.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use incident_report::{OpenAiClient, PipelineBuilder};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = PipelineBuilder::new()
//!         .with_input("Book1.xlsx")
//!         .with_trouble_id(21)
//!         .build()?;
//!
//!     // OPENAI_API_KEY is read from the environment
//!     let client = OpenAiClient::from_config(&pipeline.config().model)?;
//!     pipeline.run(&client)?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Running Stages Separately
//!
//! ```rust,no_run
//! use incident_report::{PipelineBuilder, SheetSelector};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = PipelineBuilder::new()
//!         .with_sheet_selector(SheetSelector::Name("報告書".to_string()))
//!         .build()?;
//!
//!     let extraction = pipeline.extract()?;
//!     println!("{} cells, {} images", extraction.text_cells.len(), extraction.images.len());
//!
//!     // Render a structured JSON produced earlier (or written by hand)
//!     pipeline.render()?;
//!
//!     Ok(())
//! }
//! ```

mod api;
mod builder;
mod error;
mod formatter;
mod output;
mod parser;
mod report;
mod security;
mod structurer;
mod types;

// 公開API
pub use api::SheetSelector;
pub use builder::{
    trouble_incident_id, ModelConfig, Pipeline, PipelineBuilder, PipelineConfig,
    DEFAULT_API_BASE, DEFAULT_API_KEY_ENV, DEFAULT_EXTRACTION_JSON, DEFAULT_IMAGE_DIR,
    DEFAULT_INPUT, DEFAULT_MODEL, DEFAULT_OUTPUT_HTML, DEFAULT_STRUCTURED_JSON,
    DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT_SECS, DEFAULT_TROUBLE_ID,
};
pub use error::ReportError;
pub use formatter::normalize_cell_value;
pub use output::{escape_html, render_report, HtmlRenderer};
pub use report::{
    ImageRef, IncidentReport, ProgressGroup, StructuredReport, Summary, TimelineEntry,
    UNKNOWN_DATE,
};
pub use structurer::{
    build_prompt, load_extraction, parse_model_output, strip_code_fences, structure,
    target_schema, CompletionClient, CompletionRequest, OpenAiClient, SYSTEM_PROMPT,
};
pub use types::{CellCoord, CellKind, ExtractionResult, ImageInfo, TextCell};
