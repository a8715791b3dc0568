//! Workbook Parser Module
//!
//! calamineとパッケージリーダーを組み合わせて、選択されたシートから
//! テキストセルと埋め込み画像を抽出します。

use calamine::{open_workbook_auto_from_rs, Reader, Sheets, Xlsx};
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use crate::api::SheetSelector;
use crate::error::ReportError;
use crate::formatter::CellFormatter;
use crate::parser::XlsxPackage;
use crate::security::SecurityConfig;
use crate::types::{CellCoord, ImageInfo, TextCell};

/// ワークブックパーサー
///
/// calamineのワークブック（セル値）と、ZIPパッケージ（描画・メディア）を
/// 同じバイト列から開いて保持します。
pub(crate) struct WorkbookParser {
    /// calamineのワークブック（XLSX形式のみサポート）
    workbook: Xlsx<Cursor<Vec<u8>>>,
    /// パッケージリーダー
    package: XlsxPackage<Cursor<Vec<u8>>>,
}

impl WorkbookParser {
    /// ワークブックを開く
    ///
    /// # 引数
    ///
    /// * `reader` - Excelファイルを読み込むためのリーダー
    ///
    /// # 戻り値
    ///
    /// * `Ok(WorkbookParser)` - ワークブックとパッケージの読み込みに成功した場合
    /// * `Err(ReportError)` - サイズ超過、XLSX以外の形式、破損したファイルの場合
    pub fn open<R: Read>(mut reader: R) -> Result<Self, ReportError> {
        let security_config = SecurityConfig::default();

        let mut buffer = Vec::new();
        let bytes_read = reader.read_to_end(&mut buffer)?;
        security_config.check_input_size(bytes_read as u64)?;

        // パッケージ検査を先に行い、危険なアーカイブをcalamineに渡さない
        let package = XlsxPackage::new(Cursor::new(buffer.clone()))?;

        let sheets = open_workbook_auto_from_rs(Cursor::new(buffer)).map_err(ReportError::Parse)?;
        let workbook = match sheets {
            Sheets::Xlsx(workbook) => workbook,
            _ => {
                return Err(ReportError::Config(
                    "Only XLSX format is supported".to_string(),
                ))
            }
        };

        Ok(WorkbookParser { workbook, package })
    }

    /// シート選択方式に基づいてシートのインデックスと名前を決定
    pub fn select_sheet(&self, selector: &SheetSelector) -> Result<(usize, String), ReportError> {
        let names = self.package.sheet_names();
        let index = selector
            .resolve(&names, self.package.active_tab())
            .map_err(ReportError::Config)?;
        Ok((index, names[index].clone()))
    }

    /// シートの空でないセルを行優先順で抽出
    ///
    /// 座標はシートの使用範囲の開始位置を加算した絶対座標です。
    pub fn text_cells(&mut self, sheet_name: &str) -> Result<Vec<TextCell>, ReportError> {
        let range = self
            .workbook
            .worksheet_range(sheet_name)
            .map_err(|e| ReportError::Parse(e.into()))?;

        let formatter = CellFormatter::new(self.package.is_1904());
        let (start_row, start_col) = range.start().unwrap_or((0, 0));

        let cells = range
            .cells()
            .filter_map(|(row, col, data)| {
                let coord = CellCoord::new(start_row + row as u32, start_col + col as u32);
                formatter.format(data).map(|value| TextCell::new(coord, value))
            })
            .collect();

        Ok(cells)
    }

    /// `xl/media/`配下の全エントリをディスクに書き出す
    ///
    /// ファイル名は`<incident_id>-<n>.png`（nは1始まりの連番）で、
    /// 元の拡張子は引き継ぎません。フォルダが存在しない場合は作成します。
    pub fn extract_images(
        &mut self,
        image_folder: &Path,
        incident_id: &str,
    ) -> Result<Vec<ImageInfo>, ReportError> {
        fs::create_dir_all(image_folder)?;

        let media_parts = self.package.media_parts()?;
        let mut images = Vec::with_capacity(media_parts.len());

        for (index, media_part) in media_parts.into_iter().enumerate() {
            let image_name = format!("{}-{}.png", incident_id, index + 1);
            let path = image_folder.join(&image_name);

            let bytes = self.package.read_part(&media_part)?;
            fs::write(&path, &bytes)?;
            tracing::debug!(part = %media_part, path = %path.display(), "extracted image");

            images.push(ImageInfo {
                image_name,
                image_path: path.to_string_lossy().replace('\\', "/"),
                anchor_cell: None,
                width: None,
                height: None,
                media_part,
            });
        }

        Ok(images)
    }

    /// 描画レイヤーの位置情報を画像に付与する
    ///
    /// 画像とアンカーはメディアパート名で対応付けます。解決できない画像は
    /// 警告を出して位置情報なしのままにします（処理は継続）。
    pub fn attach_positions(&mut self, sheet_index: usize, images: &mut [ImageInfo]) {
        let pictures = match self.package.sheet_pictures(sheet_index) {
            Ok(pictures) => pictures,
            Err(e) => {
                tracing::warn!("画像位置情報の取得エラー: {}", e);
                return;
            }
        };

        // 同じ画像が複数回配置されている場合は最初のアンカーを採用
        let mut by_part = HashMap::new();
        for picture in pictures {
            match picture {
                Ok(resolved) => {
                    by_part.entry(resolved.media_part).or_insert(resolved.picture);
                }
                Err(reason) => tracing::warn!("画像位置情報の取得エラー: {}", reason),
            }
        }

        for image in images.iter_mut() {
            let Some(picture) = by_part.get(&image.media_part) else {
                continue;
            };
            match picture.anchor.anchor_cell() {
                Ok(anchor_cell) => {
                    image.anchor_cell = Some(anchor_cell);
                    if let Some((width, height)) = picture.size {
                        image.width = Some(width);
                        image.height = Some(height);
                    }
                }
                Err(reason) => tracing::warn!(
                    image = %image.image_name,
                    "画像位置情報の取得エラー: {}",
                    reason
                ),
            }
        }
    }
}

// テストは統合テスト（tests/）で実装します。
// 実際のXLSXファイルが必要なため、rust_xlsxwriterで生成したワークブックを使用します。
