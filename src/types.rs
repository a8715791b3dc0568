//! Data Types Module
//!
//! 抽出ステージの中間表現（`ExtractionResult`）と、
//! それを構成するセル座標・テキストセル・画像情報を定義するモジュール。

use serde::{Deserialize, Serialize};

/// セル座標（0始まりのインデックス）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    /// 行番号（0始まり）
    pub row: u32,
    /// 列番号（0始まり）
    pub col: u32,
}

impl CellCoord {
    /// 新しいセル座標を生成
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// A1記法に変換（例: `(0, 0)` → `"A1"`, `(9, 27)` → `"AB10"`）
    pub fn to_a1_notation(&self) -> String {
        format!("{}{}", Self::col_index_to_letter(self.col), self.row + 1)
    }

    /// 列インデックスを文字列に変換（0 -> "A", 25 -> "Z", 26 -> "AA"）
    fn col_index_to_letter(mut col: u32) -> String {
        let mut result = String::new();
        loop {
            let remainder = col % 26;
            result.insert(0, (b'A' + remainder as u8) as char);
            if col < 26 {
                break;
            }
            col = col / 26 - 1;
        }
        result
    }
}

/// テキストセルの種別タグ
///
/// JSONでは常に`"type": "text"`として出力されます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    /// テキストセル
    #[default]
    Text,
}

/// 空でないセル1つ分の抽出結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextCell {
    /// 種別（常に`text`）
    #[serde(rename = "type")]
    pub kind: CellKind,
    /// A1記法のセル座標
    pub cell: String,
    /// 正規化済みのセル値
    pub value: String,
}

impl TextCell {
    /// 座標と値からテキストセルを生成
    pub fn new(coord: CellCoord, value: String) -> Self {
        Self {
            kind: CellKind::Text,
            cell: coord.to_a1_notation(),
            value,
        }
    }
}

/// 埋め込み画像1つ分の抽出結果
///
/// 位置情報（`anchor_cell`, `width`, `height`）は描画レイヤーから
/// 解決できた場合のみ設定され、JSONでも省略されます。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// 出力ファイル名（例: `トラブル21-1.png`）
    pub image_name: String,
    /// 出力先パス（区切り文字は常に`/`）
    pub image_path: String,
    /// 画像がアンカーされているセル（A1記法）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_cell: Option<String>,
    /// 表示幅（ピクセル）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// 表示高さ（ピクセル）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// アーカイブ内のメディアパート名（例: `xl/media/image1.png`）
    ///
    /// 描画レイヤーとの対応付けにのみ使用し、JSONには出力しません。
    #[serde(skip)]
    pub media_part: String,
}

/// 抽出ステージの出力（構造化ステージへの唯一の入力）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExtractionResult {
    /// 空でないセルの一覧（行優先順）
    pub text_cells: Vec<TextCell>,
    /// 埋め込み画像の一覧（アーカイブ内の順序）
    pub images: Vec<ImageInfo>,
}
