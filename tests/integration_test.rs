//! Integration Tests for incident-report
//!
//! rust_xlsxwriterで生成したワークブックを使い、抽出から描画までを検証します。

use incident_report::{
    CompletionClient, CompletionRequest, ExtractionResult, Pipeline, PipelineBuilder,
    ReportError, SheetSelector,
};
use rust_xlsxwriter::*;
use std::cell::RefCell;
use std::io::{Cursor, Read, Write};
use tempfile::TempDir;

/// 1x1ピクセルの赤いPNG
const PNG_1X1: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0xF8, 0xCF, 0xC0, 0xF0,
    0x1F, 0x00, 0x05, 0x00, 0x01, 0xFF, 0x89, 0x99, 0x3D, 0x1D, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45,
    0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// 2x2ピクセルの青いPNG
const PNG_2X2: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x02, 0x08, 0x06, 0x00, 0x00, 0x00, 0x72, 0xB6, 0x0D,
    0x24, 0x00, 0x00, 0x00, 0x10, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x60, 0x60, 0xF8, 0xFF,
    0x1F, 0x82, 0xA1, 0x0C, 0x00, 0x3F, 0xD2, 0x07, 0xF9, 0xB4, 0x12, 0x4F, 0xCD, 0x00, 0x00, 0x00,
    0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

// Helper module for generating test fixtures
mod fixtures {
    use super::*;

    /// A1に日付シリアル値、B1に要約テキスト、B3に画像を持つ報告書
    pub fn generate_report() -> Result<Vec<u8>, XlsxError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();

        worksheet.write_number(0, 0, 45894.0)?;
        worksheet.write_string(0, 1, "結果: 正常復旧")?;

        let image = Image::new_from_buffer(PNG_1X1)?;
        worksheet.insert_image(2, 1, &image)?;

        Ok(workbook.save_to_buffer()?)
    }

    /// 様々な値の種類を持つシート
    pub fn generate_mixed_values() -> Result<Vec<u8>, XlsxError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();

        worksheet.write_number(0, 0, 73415.0)?;
        worksheet.write_number(0, 1, 73416.0)?;
        worksheet.write_number(0, 2, 1.5)?;
        worksheet.write_boolean(1, 0, true)?;
        worksheet.write_string(1, 1, "  ")?;
        worksheet.write_string(1, 2, "14:17\n再起動")?;
        worksheet.write_string(2, 0, "45894")?;

        Ok(workbook.save_to_buffer()?)
    }

    /// C5から始まるシート（使用範囲の開始位置がA1でない）
    pub fn generate_offset_sheet() -> Result<Vec<u8>, XlsxError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();

        worksheet.write_string(4, 2, "発生日時")?;
        worksheet.write_string(5, 3, "9:30")?;

        Ok(workbook.save_to_buffer()?)
    }

    /// 2シート構成で、各シートに異なる画像を配置
    pub fn generate_two_sheets_with_images() -> Result<Vec<u8>, XlsxError> {
        let mut workbook = Workbook::new();

        let sheet1 = workbook.add_worksheet();
        sheet1.set_name("概要")?;
        sheet1.write_string(0, 0, "概要シート")?;
        sheet1.insert_image(4, 3, &Image::new_from_buffer(PNG_2X2)?)?;

        let sheet2 = workbook.add_worksheet();
        sheet2.set_name("経過")?;
        sheet2.write_string(0, 0, "経過シート")?;
        sheet2.insert_image(2, 1, &Image::new_from_buffer(PNG_1X1)?)?;

        Ok(workbook.save_to_buffer()?)
    }

    /// 画像を含まないシート
    pub fn generate_without_images() -> Result<Vec<u8>, XlsxError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.write_string(0, 0, "画像なし")?;
        Ok(workbook.save_to_buffer()?)
    }
}

/// 一時ディレクトリ配下にすべての出力先を向けたパイプライン
fn pipeline_in(dir: &TempDir, selector: SheetSelector) -> Pipeline {
    PipelineBuilder::new()
        .with_sheet_selector(selector)
        .with_image_dir(dir.path().join("output_images"))
        .with_image_fallback_dir(dir.path().join("output_images"))
        .with_extraction_json(dir.path().join("excel_analysis.json"))
        .with_structured_json(dir.path().join("ai_mapped_result.json"))
        .with_output_html(dir.path().join("report.html"))
        .build()
        .unwrap()
}

fn extract(data: Vec<u8>, selector: SheetSelector) -> (TempDir, Pipeline, ExtractionResult) {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_in(&dir, selector);
    let result = pipeline.extract_from_reader(Cursor::new(data)).unwrap();
    (dir, pipeline, result)
}

fn cell_value<'a>(result: &'a ExtractionResult, cell: &str) -> Option<&'a str> {
    result
        .text_cells
        .iter()
        .find(|c| c.cell == cell)
        .map(|c| c.value.as_str())
}

/// パッケージ内の指定パートを差し替えたXLSXを作り直す
fn replace_parts(data: &[u8], replacements: &[(&str, &[u8])]) -> Vec<u8> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).unwrap();
    let mut out = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(Cursor::new(&mut out));
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).unwrap();
            let name = entry.name().to_string();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            if let Some((_, replacement)) = replacements.iter().find(|(part, _)| *part == name) {
                content = replacement.to_vec();
            }
            writer.start_file(name, options).unwrap();
            writer.write_all(&content).unwrap();
        }
        writer.finish().unwrap();
    }
    out
}

/// 画像は書き出されているが位置情報が付与されていないことを確認
fn assert_image_without_position(dir: &TempDir, result: &ExtractionResult) {
    assert_eq!(result.images.len(), 1);
    let image = &result.images[0];
    assert_eq!(image.image_name, "トラブル21-1.png");
    assert_eq!(image.anchor_cell, None);
    assert_eq!(image.width, None);
    assert_eq!(image.height, None);

    let written = std::fs::read(dir.path().join("output_images/トラブル21/トラブル21-1.png")).unwrap();
    assert_eq!(written, PNG_1X1);

    let raw = std::fs::read_to_string(dir.path().join("excel_analysis.json")).unwrap();
    assert!(!raw.contains("anchor_cell"));
}

/// 固定の応答を返すスタブクライアント
struct StubClient {
    response: String,
    prompts: RefCell<Vec<String>>,
}

impl StubClient {
    fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            prompts: RefCell::new(Vec::new()),
        }
    }
}

impl CompletionClient for StubClient {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, ReportError> {
        self.prompts.borrow_mut().push(request.user.to_string());
        Ok(self.response.clone())
    }
}

// ============================================================================
// 抽出ステージ
// ============================================================================

#[test]
fn test_extract_date_serial_and_text() {
    let data = fixtures::generate_report().unwrap();
    let (_dir, _pipeline, result) = extract(data, SheetSelector::Active);

    assert_eq!(result.text_cells.len(), 2);
    assert_eq!(result.text_cells[0].cell, "A1");
    assert_eq!(result.text_cells[0].value, "2025-08-25");
    assert_eq!(result.text_cells[1].cell, "B1");
    assert_eq!(result.text_cells[1].value, "結果: 正常復旧");
}

#[test]
fn test_extract_images_with_anchor() {
    let data = fixtures::generate_report().unwrap();
    let (dir, _pipeline, result) = extract(data, SheetSelector::Active);

    assert_eq!(result.images.len(), 1);
    let image = &result.images[0];
    assert_eq!(image.image_name, "トラブル21-1.png");
    assert!(image.image_path.ends_with("output_images/トラブル21/トラブル21-1.png"));
    assert!(!image.image_path.contains('\\'));
    assert_eq!(image.anchor_cell.as_deref(), Some("B3"));
    assert_eq!(image.width, Some(1));
    assert_eq!(image.height, Some(1));

    let written = std::fs::read(dir.path().join("output_images/トラブル21/トラブル21-1.png")).unwrap();
    assert_eq!(written, PNG_1X1);
}

#[test]
fn test_extraction_json_file() {
    let data = fixtures::generate_report().unwrap();
    let (dir, _pipeline, result) = extract(data, SheetSelector::Active);

    let raw = std::fs::read_to_string(dir.path().join("excel_analysis.json")).unwrap();
    // 非ASCII文字はエスケープされず、2スペースインデント
    assert!(raw.contains("結果: 正常復旧"));
    assert!(raw.contains("\n  \"text_cells\""));
    assert!(raw.contains("\"type\": \"text\""));
    assert!(!raw.contains("media_part"));

    let reloaded = incident_report::load_extraction(&dir.path().join("excel_analysis.json")).unwrap();
    assert_eq!(reloaded.text_cells, result.text_cells);
    assert_eq!(reloaded.images[0].anchor_cell.as_deref(), Some("B3"));
}

#[test]
fn test_extract_mixed_values() {
    let data = fixtures::generate_mixed_values().unwrap();
    let (_dir, _pipeline, result) = extract(data, SheetSelector::Active);

    assert_eq!(cell_value(&result, "A1"), Some("2100-12-31"));
    assert_eq!(cell_value(&result, "B1"), Some("73416"));
    assert_eq!(cell_value(&result, "C1"), Some("1.5"));
    assert_eq!(cell_value(&result, "A2"), Some("TRUE"));
    // 空白のみの文字列は保持される
    assert_eq!(cell_value(&result, "B2"), Some("  "));
    assert_eq!(cell_value(&result, "C2"), Some("14:17\n再起動"));
    // 数字の文字列は日付に変換しない
    assert_eq!(cell_value(&result, "A3"), Some("45894"));
    assert!(result.images.is_empty());
}

#[test]
fn test_extract_row_major_absolute_coordinates() {
    let data = fixtures::generate_offset_sheet().unwrap();
    let (_dir, _pipeline, result) = extract(data, SheetSelector::Active);

    let cells: Vec<_> = result.text_cells.iter().map(|c| c.cell.as_str()).collect();
    assert_eq!(cells, vec!["C5", "D6"]);
}

#[test]
fn test_extract_sheet_by_name_correlates_by_media_part() {
    let data = fixtures::generate_two_sheets_with_images().unwrap();
    let (_dir, _pipeline, result) = extract(data, SheetSelector::Name("経過".to_string()));

    assert_eq!(cell_value(&result, "A1"), Some("経過シート"));

    // メディアは全シート分を書き出し、位置情報は選択シートの画像にのみ付与
    assert_eq!(result.images.len(), 2);
    let names: Vec<_> = result.images.iter().map(|i| i.image_name.as_str()).collect();
    assert_eq!(names, vec!["トラブル21-1.png", "トラブル21-2.png"]);

    let anchored: Vec<_> = result.images.iter().filter(|i| i.anchor_cell.is_some()).collect();
    assert_eq!(anchored.len(), 1);
    assert_eq!(anchored[0].anchor_cell.as_deref(), Some("B3"));
    assert_eq!(anchored[0].width, Some(1));

    let unanchored = result.images.iter().find(|i| i.anchor_cell.is_none()).unwrap();
    assert_eq!(unanchored.width, None);
    assert_eq!(unanchored.height, None);
}

#[test]
fn test_extract_sheet_by_index() {
    let data = fixtures::generate_two_sheets_with_images().unwrap();
    let (_dir, _pipeline, result) = extract(data, SheetSelector::Index(0));

    assert_eq!(cell_value(&result, "A1"), Some("概要シート"));
    let anchored = result.images.iter().find(|i| i.anchor_cell.is_some()).unwrap();
    assert_eq!(anchored.anchor_cell.as_deref(), Some("D5"));
    assert_eq!(anchored.width, Some(2));
    assert_eq!(anchored.height, Some(2));
}

#[test]
fn test_extract_unknown_sheet() {
    let data = fixtures::generate_report().unwrap();
    let dir = tempfile::tempdir().unwrap();

    let pipeline = pipeline_in(&dir, SheetSelector::Name("存在しない".to_string()));
    let result = pipeline.extract_from_reader(Cursor::new(data.clone()));
    assert!(matches!(result, Err(ReportError::Config(_))));

    let pipeline = pipeline_in(&dir, SheetSelector::Index(5));
    let result = pipeline.extract_from_reader(Cursor::new(data));
    assert!(matches!(result, Err(ReportError::Config(_))));
    assert!(!dir.path().join("excel_analysis.json").exists());
}

#[test]
fn test_extract_without_images_creates_folder() {
    let data = fixtures::generate_without_images().unwrap();
    let (dir, _pipeline, result) = extract(data, SheetSelector::Active);

    assert!(result.images.is_empty());
    assert!(dir.path().join("output_images/トラブル21").is_dir());
}

#[test]
fn test_extract_malformed_drawing_keeps_images() {
    let data = fixtures::generate_report().unwrap();
    let broken: &[u8] = br#"<xdr:wsDr xmlns:xdr="x"><xdr:twoCellAnchor></xdr:wsDr>"#;
    let data = replace_parts(&data, &[("xl/drawings/drawing1.xml", broken)]);

    let (dir, _pipeline, result) = extract(data, SheetSelector::Active);
    assert_eq!(cell_value(&result, "B1"), Some("結果: 正常復旧"));
    assert_image_without_position(&dir, &result);
}

#[test]
fn test_extract_unresolved_image_relationship_keeps_images() {
    let data = fixtures::generate_report().unwrap();
    let empty_rels: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#;
    let data = replace_parts(&data, &[("xl/drawings/_rels/drawing1.xml.rels", empty_rels)]);

    let (dir, _pipeline, result) = extract(data, SheetSelector::Active);
    assert_image_without_position(&dir, &result);
}

#[test]
fn test_extract_anchor_without_from_keeps_images() {
    let data = fixtures::generate_report().unwrap();
    let no_from: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <xdr:twoCellAnchor>
    <xdr:pic>
      <xdr:blipFill><a:blip r:embed="rId1"/></xdr:blipFill>
      <xdr:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="9525" cy="9525"/></a:xfrm></xdr:spPr>
    </xdr:pic>
    <xdr:clientData/>
  </xdr:twoCellAnchor>
</xdr:wsDr>"#;
    let data = replace_parts(&data, &[("xl/drawings/drawing1.xml", no_from)]);

    let (dir, _pipeline, result) = extract(data, SheetSelector::Active);
    assert_image_without_position(&dir, &result);
}

#[test]
fn test_extract_custom_incident_id() {
    let data = fixtures::generate_report().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let pipeline = PipelineBuilder::new()
        .with_incident_id("INC-7")
        .with_image_dir(dir.path())
        .with_extraction_json(dir.path().join("x.json"))
        .build()
        .unwrap();

    let result = pipeline.extract_from_reader(Cursor::new(data)).unwrap();
    assert_eq!(result.images[0].image_name, "INC-7-1.png");
    assert!(dir.path().join("INC-7").join("INC-7-1.png").exists());
}

#[test]
fn test_extract_from_file() {
    let data = fixtures::generate_report().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Book1.xlsx");
    std::fs::write(&input, data).unwrap();

    let pipeline = PipelineBuilder::new()
        .with_input(&input)
        .with_image_dir(dir.path().join("output_images"))
        .with_extraction_json(dir.path().join("excel_analysis.json"))
        .build()
        .unwrap();
    let result = pipeline.extract().unwrap();
    assert_eq!(result.text_cells.len(), 2);
}

#[test]
fn test_extract_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = PipelineBuilder::new()
        .with_input(dir.path().join("nope.xlsx"))
        .build()
        .unwrap();
    assert!(matches!(pipeline.extract(), Err(ReportError::Io(_))));
}

#[test]
fn test_extract_non_xlsx_input() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_in(&dir, SheetSelector::Active);
    let result = pipeline.extract_from_reader(Cursor::new(b"not an excel file".to_vec()));
    assert!(result.is_err());
}

// ============================================================================
// 描画ステージ
// ============================================================================

fn structured_report_json(image_path: &str) -> String {
    serde_json::json!({
        "table": "incident_report",
        "columns": {
            "title": "サーバー停止",
            "event_date": "2025-08-25",
            "location": "本社サーバールーム",
            "reporter": "山田",
            "progress": [
                {
                    "date": "2025-08-25",
                    "timeline": [
                        {"time": "14:17", "description": "障害検知", "related_images": [
                            {"image_name": "トラブル21-1.png", "image_path": image_path, "anchor_cell": "B3"}
                        ]},
                        {"time": "None", "description": "再起動\n確認"}
                    ]
                }
            ],
            "summary": {"result": "正常復旧", "cause": "メモリ不足", "countermeasure": "監視強化"}
        }
    })
    .to_string()
}

fn render_from_json(dir: &TempDir, json: &str) -> String {
    let pipeline = pipeline_in(dir, SheetSelector::Active);
    std::fs::write(&pipeline.config().structured_json, json).unwrap();
    pipeline.render().unwrap();
    std::fs::read_to_string(&pipeline.config().output_html).unwrap()
}

#[test]
fn test_render_hand_written_report() {
    let dir = tempfile::tempdir().unwrap();
    let html = render_from_json(&dir, &structured_report_json("missing/トラブル21-1.png"));

    assert!(html.contains("<html lang=\"ja\">"));
    assert!(html.contains("2025-08-25"));
    assert!(html.contains("正常復旧"));
    assert!(html.contains("⏰ 14:17"));
    assert!(!html.contains("⏰ None"));
    assert!(html.contains("再起動<br>確認"));

    // 存在しない画像はフォールバックディレクトリに置き換わる
    let fallback = format!(
        "{}/トラブル21-1.png",
        dir.path().join("output_images").to_string_lossy().replace('\\', "/")
    );
    assert!(html.contains(&fallback));
}

#[test]
fn test_render_overwrites_existing_output() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("report.html"), "old content").unwrap();
    let html = render_from_json(&dir, &structured_report_json("x.png"));
    assert!(!html.contains("old content"));
}

#[test]
fn test_render_without_structured_json() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_in(&dir, SheetSelector::Active);
    assert!(matches!(pipeline.render(), Err(ReportError::Io(_))));
}

// ============================================================================
// 全ステージ
// ============================================================================

#[test]
fn test_end_to_end_with_stub_client() {
    let data = fixtures::generate_report().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Book1.xlsx");
    std::fs::write(&input, data).unwrap();

    let image_path = format!(
        "{}/トラブル21/トラブル21-1.png",
        dir.path().join("output_images").to_string_lossy().replace('\\', "/")
    );
    let client = StubClient::new(format!("```json\n{}\n```", structured_report_json(&image_path)));

    let pipeline = PipelineBuilder::new()
        .with_input(&input)
        .with_image_dir(dir.path().join("output_images"))
        .with_image_fallback_dir(dir.path().join("fallback"))
        .with_extraction_json(dir.path().join("excel_analysis.json"))
        .with_structured_json(dir.path().join("ai_mapped_result.json"))
        .with_output_html(dir.path().join("report.html"))
        .build()
        .unwrap();
    pipeline.run(&client).unwrap();

    // モデルには抽出結果が渡される
    let prompts = client.prompts.borrow();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("\"value\": \"2025-08-25\""));
    assert!(prompts[0].contains("\"anchor_cell\": \"B3\""));

    let structured = std::fs::read_to_string(dir.path().join("ai_mapped_result.json")).unwrap();
    assert!(structured.contains("\"incident_report\""));

    let html = std::fs::read_to_string(dir.path().join("report.html")).unwrap();
    assert!(html.contains("正常復旧"));
    // 実在する画像のパスはそのまま使われる
    assert!(html.contains(&format!("src=\"{}\"", image_path)));
    assert!(!html.contains("fallback"));
}

#[test]
fn test_run_stops_on_invalid_model_output() {
    let data = fixtures::generate_report().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Book1.xlsx");
    std::fs::write(&input, data).unwrap();

    let pipeline = PipelineBuilder::new()
        .with_input(&input)
        .with_image_dir(dir.path().join("output_images"))
        .with_extraction_json(dir.path().join("excel_analysis.json"))
        .with_structured_json(dir.path().join("ai_mapped_result.json"))
        .with_output_html(dir.path().join("report.html"))
        .build()
        .unwrap();

    let client = StubClient::new("申し訳ありませんが、JSONを生成できませんでした。");
    let result = pipeline.run(&client);

    assert!(matches!(result, Err(ReportError::InvalidModelOutput(_))));
    assert!(dir.path().join("excel_analysis.json").exists());
    assert!(!dir.path().join("ai_mapped_result.json").exists());
    assert!(!dir.path().join("report.html").exists());
}
