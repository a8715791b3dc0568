//! XLSX Package Module
//!
//! XLSXファイル（ZIPアーカイブ）のパート構造を直接読むモジュール。
//! calamineでは取得できない情報（アクティブシート、1904年エポック、
//! 描画パートとメディアパートの対応関係）を提供します。

use std::collections::HashMap;
use std::io::{Read, Seek};

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use crate::error::ReportError;
use crate::parser::drawing::{parse_drawing, DrawingPicture};
use crate::security::SecurityConfig;

/// メディアパートの格納先
pub(crate) const MEDIA_PREFIX: &str = "xl/media/";

/// ワークブックに定義されたシート
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SheetEntry {
    /// シート名
    pub name: String,
    /// ワークシートパート名（例: `xl/worksheets/sheet1.xml`）
    pub part: Option<String>,
}

/// メディアパートに解決済みの描画画像
#[derive(Debug, Clone)]
pub(crate) struct ResolvedPicture {
    /// メディアパート名（例: `xl/media/image1.png`）
    pub media_part: String,
    /// 描画パート上の画像情報
    pub picture: DrawingPicture,
}

/// XLSXパッケージリーダー
pub(crate) struct XlsxPackage<R: Read + Seek> {
    archive: ZipArchive<R>,
    sheets: Vec<SheetEntry>,
    active_tab: usize,
    is_1904: bool,
}

impl<R: Read + Seek> XlsxPackage<R> {
    /// パッケージを開き、`xl/workbook.xml`とそのリレーションシップを解析する
    ///
    /// セキュリティ検査（エントリ数、パス、サイズ）に失敗した場合はエラーを返します。
    pub fn new(reader: R) -> Result<Self, ReportError> {
        let mut archive =
            ZipArchive::new(reader).map_err(|e| ReportError::Zip(format!("{}", e)))?;
        SecurityConfig::default().check_archive(&mut archive)?;

        let workbook_part = "xl/workbook.xml";
        let workbook_xml = read_part_optional(&mut archive, workbook_part)?.ok_or_else(|| {
            ReportError::Zip(format!("Missing required part '{}'", workbook_part))
        })?;
        let info = parse_workbook_xml(&workbook_xml, workbook_part)?;

        let rels_part = rels_path_for(workbook_part);
        let rels = match read_part_optional(&mut archive, &rels_part)? {
            Some(xml) => parse_relationships(&xml, &rels_part)?,
            None => HashMap::new(),
        };

        let sheets = info
            .sheets
            .into_iter()
            .map(|(name, rel_id)| SheetEntry {
                part: rel_id
                    .and_then(|id| rels.get(&id))
                    .map(|target| resolve_target(workbook_part, target)),
                name,
            })
            .collect();

        Ok(Self {
            archive,
            sheets,
            active_tab: info.active_tab,
            is_1904: info.is_1904,
        })
    }

    /// シート名の一覧（ワークブック定義順）
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    /// `workbookView@activeTab`（指定がなければ0）
    pub fn active_tab(&self) -> usize {
        self.active_tab
    }

    /// 1904年エポックを使用するかどうか
    pub fn is_1904(&self) -> bool {
        self.is_1904
    }

    /// `xl/media/`配下のエントリ名（アーカイブ内の順序、ディレクトリは除外）
    pub fn media_parts(&mut self) -> Result<Vec<String>, ReportError> {
        let mut parts = Vec::new();
        for i in 0..self.archive.len() {
            let file = self
                .archive
                .by_index(i)
                .map_err(|e| ReportError::Zip(format!("{}", e)))?;
            if file.name().starts_with(MEDIA_PREFIX) && !file.is_dir() {
                parts.push(file.name().to_string());
            }
        }
        Ok(parts)
    }

    /// パートの内容をバイト列として読み込む
    pub fn read_part(&mut self, name: &str) -> Result<Vec<u8>, ReportError> {
        read_part_optional(&mut self.archive, name)?
            .ok_or_else(|| ReportError::Zip(format!("Missing part '{}'", name)))
    }

    /// シートの描画パートに含まれる画像を、メディアパート名に解決して返す
    ///
    /// 描画パートを持たないシートの場合は空のリストを返します。
    /// リレーションシップを解決できない画像は`Err`要素として返し、
    /// 呼び出し側で警告として扱います。
    pub fn sheet_pictures(
        &mut self,
        sheet_index: usize,
    ) -> Result<Vec<Result<ResolvedPicture, String>>, ReportError> {
        let Some(sheet_part) = self
            .sheets
            .get(sheet_index)
            .and_then(|s| s.part.clone())
        else {
            return Ok(Vec::new());
        };

        let Some(sheet_xml) = read_part_optional(&mut self.archive, &sheet_part)? else {
            return Ok(Vec::new());
        };
        let drawing_ids = parse_sheet_drawing_ids(&sheet_xml, &sheet_part)?;
        if drawing_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sheet_rels_part = rels_path_for(&sheet_part);
        let sheet_rels = match read_part_optional(&mut self.archive, &sheet_rels_part)? {
            Some(xml) => parse_relationships(&xml, &sheet_rels_part)?,
            None => HashMap::new(),
        };

        let mut resolved = Vec::new();
        for drawing_id in drawing_ids {
            let Some(target) = sheet_rels.get(&drawing_id) else {
                resolved.push(Err(format!(
                    "drawing relationship '{}' not found in '{}'",
                    drawing_id, sheet_rels_part
                )));
                continue;
            };
            let drawing_part = resolve_target(&sheet_part, target);
            let Some(drawing_xml) = read_part_optional(&mut self.archive, &drawing_part)? else {
                resolved.push(Err(format!("drawing part '{}' is missing", drawing_part)));
                continue;
            };
            let pictures = parse_drawing(&drawing_xml, &drawing_part)?;

            let drawing_rels_part = rels_path_for(&drawing_part);
            let drawing_rels = match read_part_optional(&mut self.archive, &drawing_rels_part)? {
                Some(xml) => parse_relationships(&xml, &drawing_rels_part)?,
                None => HashMap::new(),
            };

            for picture in pictures {
                match drawing_rels.get(&picture.embed) {
                    Some(target) => resolved.push(Ok(ResolvedPicture {
                        media_part: resolve_target(&drawing_part, target),
                        picture,
                    })),
                    None => resolved.push(Err(format!(
                        "image relationship '{}' not found in '{}'",
                        picture.embed, drawing_rels_part
                    ))),
                }
            }
        }

        Ok(resolved)
    }
}

/// `xl/workbook.xml`から読み取る情報
#[derive(Debug, Default)]
struct WorkbookInfo {
    /// (シート名, r:id)
    sheets: Vec<(String, Option<String>)>,
    active_tab: usize,
    is_1904: bool,
}

fn read_part_optional<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, ReportError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(ReportError::Zip(format!("{}", e))),
    };
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    Ok(Some(content))
}

fn xml_error(part: &str, message: impl std::fmt::Display) -> ReportError {
    ReportError::Xml {
        part: part.to_string(),
        message: message.to_string(),
    }
}

fn is_true(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// `xl/workbook.xml`の解析
///
/// `<sheet name r:id>`、`<workbookView activeTab>`、`<workbookPr date1904>`を読み取ります。
fn parse_workbook_xml(xml: &[u8], part: &str) -> Result<WorkbookInfo, ReportError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut info = WorkbookInfo::default();
    let mut active_tab_seen = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"sheet" => {
                    let mut name = None;
                    let mut rel_id = None;
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| xml_error(part, e))?;
                        match attr.key.local_name().as_ref() {
                            b"name" => {
                                name = Some(
                                    attr.decode_and_unescape_value(&reader)
                                        .map_err(|e| xml_error(part, e))?
                                        .into_owned(),
                                )
                            }
                            b"id" => rel_id = Some(std::str::from_utf8(&attr.value)?.to_string()),
                            _ => {}
                        }
                    }
                    if let Some(name) = name {
                        info.sheets.push((name, rel_id));
                    }
                }
                // 複数のworkbookViewがある場合は最初のものを採用
                b"workbookView" if !active_tab_seen => {
                    active_tab_seen = true;
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| xml_error(part, e))?;
                        if attr.key.as_ref() == b"activeTab" {
                            info.active_tab = std::str::from_utf8(&attr.value)?.trim().parse()?;
                        }
                    }
                }
                b"workbookPr" => {
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| xml_error(part, e))?;
                        if attr.key.as_ref() == b"date1904" {
                            info.is_1904 = is_true(std::str::from_utf8(&attr.value)?);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(part, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(info)
}

/// `.rels`パートの解析（Id → Target）
///
/// `TargetMode="External"`のリレーションシップはパッケージ外を指すため除外します。
pub(crate) fn parse_relationships(
    xml: &[u8],
    part: &str,
) -> Result<HashMap<String, String>, ReportError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut relationships = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            // Event::Emptyは自己終了タグの場合に発生
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let mut id = None;
                    let mut target = None;
                    let mut external = false;

                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| xml_error(part, e))?;
                        match attr.key.as_ref() {
                            b"Id" => id = Some(std::str::from_utf8(&attr.value)?.to_string()),
                            b"Target" => {
                                target = Some(
                                    attr.decode_and_unescape_value(&reader)
                                        .map_err(|e| xml_error(part, e))?
                                        .into_owned(),
                                )
                            }
                            b"TargetMode" => {
                                external = std::str::from_utf8(&attr.value)? == "External"
                            }
                            _ => {}
                        }
                    }

                    if let (Some(id), Some(target), false) = (id, target, external) {
                        relationships.insert(id, target);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(part, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(relationships)
}

/// ワークシートXMLから`<drawing r:id>`を収集
fn parse_sheet_drawing_ids(xml: &[u8], part: &str) -> Result<Vec<String>, ReportError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut ids = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"drawing" {
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| xml_error(part, e))?;
                        if attr.key.local_name().as_ref() == b"id" {
                            ids.push(std::str::from_utf8(&attr.value)?.to_string());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(part, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(ids)
}

/// パートに対応する`.rels`パート名
///
/// 例: `xl/worksheets/sheet1.xml` → `xl/worksheets/_rels/sheet1.xml.rels`
pub(crate) fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// リレーションシップのTargetをパッケージ内の絶対パート名に解決
///
/// 例: (`xl/drawings/drawing1.xml`, `../media/image1.png`) → `xl/media/image1.png`
pub(crate) fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').filter(|s| !s.is_empty()).collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
