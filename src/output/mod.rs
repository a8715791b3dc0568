//! Output Module
//!
//! 構造化レポートを1枚の静的HTMLとして出力するモジュール。
//! ヘッダーカード（件名・発生日・場所・報告者）、進捗カード（日付ごとの時系列）、
//! 要約カード（結果・原因・対策）の3つで構成されます。

mod template;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::ReportError;
use crate::report::{ImageRef, IncidentReport, TimelineEntry};

/// HTMLレンダラー
#[derive(Debug, Clone)]
pub struct HtmlRenderer {
    /// 画像パスが存在しない場合に使用するディレクトリ
    fallback_dir: PathBuf,
}

impl HtmlRenderer {
    /// 新しいレンダラーを生成
    pub fn new(fallback_dir: impl Into<PathBuf>) -> Self {
        Self {
            fallback_dir: fallback_dir.into(),
        }
    }

    /// レポートをHTMLとして書き出す
    ///
    /// # 引数
    ///
    /// * `report` - 描画するレポート
    /// * `writer` - 出力先のライター
    pub fn render<W: Write>(
        &self,
        report: &IncidentReport,
        writer: &mut W,
    ) -> Result<(), ReportError> {
        writeln!(writer, "<!DOCTYPE html>")?;
        writeln!(writer, "<html lang=\"ja\">")?;
        writeln!(writer, "<head>")?;
        writeln!(writer, "<meta charset=\"utf-8\">")?;
        writeln!(writer, "<title>{}</title>", escape_html(&report.title))?;
        writeln!(writer, "<style>\n{}</style>", template::STYLESHEET)?;
        writeln!(writer, "</head>")?;
        writeln!(writer, "<body>")?;

        writeln!(writer, "<div class=\"card\">")?;
        writeln!(writer, "  <h1>📋 {}</h1>", escape_html(&report.title))?;
        writeln!(
            writer,
            "  <p>📅 発生日: {}　📍 {}　👤 {}</p>",
            escape_html(&report.event_date),
            escape_html(&report.location),
            escape_html(&report.reporter)
        )?;
        writeln!(writer, "</div>")?;

        writeln!(writer, "<div class=\"card\">")?;
        writeln!(writer, "  <h2>📆 Progress（進捗）</h2>")?;
        for group in &report.progress {
            writeln!(writer, "  <div class=\"date\">🗓️ {}</div>", escape_html(&group.date))?;
            for entry in &group.timeline {
                self.render_entry(entry, writer)?;
            }
        }
        writeln!(writer, "</div>")?;

        let summary = &report.summary;
        writeln!(writer, "<div class=\"card\">")?;
        writeln!(writer, "  <h2>🧭 Summary（要約）</h2>")?;
        writeln!(
            writer,
            "  <p class=\"summary-item\"><b>結果:</b> {}</p>",
            escape_html(&summary.result)
        )?;
        writeln!(
            writer,
            "  <p class=\"summary-item\"><b>原因:</b> {}</p>",
            escape_html(&summary.cause)
        )?;
        writeln!(
            writer,
            "  <p class=\"summary-item\"><b>対策:</b> {}</p>",
            escape_html(&summary.countermeasure)
        )?;
        writeln!(writer, "</div>")?;

        writeln!(writer, "</body>")?;
        writeln!(writer, "</html>")?;
        writer.flush()?;
        Ok(())
    }

    /// レポートをHTML文字列として返す
    pub fn render_to_string(&self, report: &IncidentReport) -> Result<String, ReportError> {
        let mut buffer = Vec::new();
        self.render(report, &mut buffer)?;
        Ok(String::from_utf8(buffer).map_err(|e| e.utf8_error())?)
    }

    /// レポートをファイルに書き出す（既存ファイルは上書き）
    pub fn render_to_file(&self, report: &IncidentReport, path: &Path) -> Result<(), ReportError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.render(report, &mut writer)
    }

    /// 時系列エントリ1件を出力（内部ヘルパー）
    ///
    /// 時刻行は内容が空でも出力されます。内容が空の場合はイベント本体を出力しません。
    fn render_entry<W: Write>(&self, entry: &TimelineEntry, writer: &mut W) -> Result<(), ReportError> {
        if let Some(time) = entry.display_time() {
            writeln!(writer, "  <div class=\"time\">⏰ {}</div>", escape_html(time))?;
        }

        if entry.description.trim().is_empty() {
            return Ok(());
        }

        let description = escape_html(&entry.description).replace('\n', "<br>");
        write!(writer, "  <div class=\"event\">{}", description)?;

        if !entry.related_images.is_empty() {
            write!(writer, "<div class=\"images\">")?;
            for image in &entry.related_images {
                let Some(src) = self.resolve_image(image) else {
                    tracing::warn!("画像パスが指定されていない参照をスキップします: {:?}", image);
                    continue;
                };
                write!(
                    writer,
                    "<img src=\"{}\" alt=\"{}\">",
                    escape_html(&src),
                    escape_html(basename(&src))
                )?;
            }
            write!(writer, "</div>")?;
        }

        writeln!(writer, "</div>")?;
        Ok(())
    }

    /// 画像参照を表示用のパスに解決する
    ///
    /// ディスク上に存在しないパスは`<fallback_dir>/<ファイル名>`に置き換えます。
    fn resolve_image(&self, image: &ImageRef) -> Option<String> {
        let path = image.path()?;
        if Path::new(path).exists() {
            return Some(path.to_string());
        }
        let fallback = self.fallback_dir.join(basename(path));
        Some(fallback.to_string_lossy().replace('\\', "/"))
    }
}

impl Default for HtmlRenderer {
    fn default() -> Self {
        Self::new(crate::builder::DEFAULT_IMAGE_DIR)
    }
}

/// レポートをHTML文字列に変換する
///
/// `fallback_dir`はディスク上に存在しない画像パスの置き換え先です。
pub fn render_report(report: &IncidentReport, fallback_dir: &Path) -> Result<String, ReportError> {
    HtmlRenderer::new(fallback_dir).render_to_string(report)
}

/// パスの最後の要素（`/`と`\`の両方を区切りとして扱う）
fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// HTML特殊文字をエスケープ
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
