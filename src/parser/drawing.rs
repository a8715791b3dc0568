//! Drawing Parser Module
//!
//! ワークシートの描画パート（`xl/drawings/drawingN.xml`）を解析し、
//! 画像ごとのアンカー位置・表示サイズ・画像リレーションシップIDを抽出します。

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ReportError;
use crate::types::CellCoord;

/// 1ピクセルあたりのEMU（96 DPI）
const EMU_PER_PIXEL: i64 = 9525;

/// 画像のアンカー位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AnchorPosition {
    /// セルアンカー（`twoCellAnchor` / `oneCellAnchor`の`from`）
    Cell(CellCoord),
    /// 絶対位置アンカー（EMU）
    Absolute { x: i64, y: i64 },
    /// アンカーは存在するが、期待した構造（`from/col`, `from/row`）が欠けている
    Unresolved(String),
}

impl AnchorPosition {
    /// `anchor_cell`として出力する文字列
    ///
    /// セルアンカー以外は、アンカーの文字列表現にフォールバックします。
    pub fn anchor_cell(&self) -> Result<String, String> {
        match self {
            AnchorPosition::Cell(coord) => Ok(coord.to_a1_notation()),
            AnchorPosition::Absolute { x, y } => Ok(format!("absolute(x={},y={})", x, y)),
            AnchorPosition::Unresolved(reason) => Err(reason.clone()),
        }
    }
}

/// 描画パート内の画像1つ分
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DrawingPicture {
    /// `a:blip@r:embed`のリレーションシップID
    pub embed: String,
    /// アンカー位置
    pub anchor: AnchorPosition,
    /// 表示サイズ（ピクセル）
    pub size: Option<(u32, u32)>,
}

/// アンカー要素の解析中の状態
#[derive(Debug, Default)]
struct AnchorState {
    kind: String,
    from_col: Option<u32>,
    from_row: Option<u32>,
    has_from: bool,
    pos: Option<(i64, i64)>,
    ext: Option<(i64, i64)>,
    /// (embed, xfrmサイズ)
    pictures: Vec<(String, Option<(i64, i64)>)>,
}

impl AnchorState {
    fn position(&self) -> AnchorPosition {
        match self.kind.as_str() {
            "absoluteAnchor" => match self.pos {
                Some((x, y)) => AnchorPosition::Absolute { x, y },
                None => AnchorPosition::Unresolved("absoluteAnchor without <pos>".to_string()),
            },
            _ => match (self.from_col, self.from_row) {
                (Some(col), Some(row)) => AnchorPosition::Cell(CellCoord::new(row, col)),
                _ if !self.has_from => {
                    AnchorPosition::Unresolved(format!("{} without <from>", self.kind))
                }
                _ => AnchorPosition::Unresolved(format!(
                    "{} has incomplete <from> (col={:?}, row={:?})",
                    self.kind, self.from_col, self.from_row
                )),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FromField {
    Col,
    Row,
}

/// 描画パートXMLを解析し、画像の一覧を文書順で返す
///
/// # 引数
///
/// * `xml` - 描画パートの内容
/// * `part` - パート名（エラーメッセージ用）
pub(crate) fn parse_drawing(xml: &[u8], part: &str) -> Result<Vec<DrawingPicture>, ReportError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let xml_err = |message: String| ReportError::Xml {
        part: part.to_string(),
        message,
    };

    let mut buf = Vec::new();
    let mut pictures = Vec::new();
    let mut anchor: Option<AnchorState> = None;
    let mut in_from = false;
    let mut field: Option<FromField> = None;
    let mut in_pic = false;
    let mut in_xfrm = false;
    let mut current_embed: Option<String> = None;
    let mut current_size: Option<(i64, i64)> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"twoCellAnchor" | b"oneCellAnchor" | b"absoluteAnchor" => {
                        anchor = Some(AnchorState {
                            kind: String::from_utf8_lossy(name.as_ref()).into_owned(),
                            ..Default::default()
                        });
                    }
                    b"from" if anchor.is_some() => {
                        in_from = true;
                        if let Some(state) = anchor.as_mut() {
                            state.has_from = true;
                        }
                    }
                    b"col" if in_from => field = Some(FromField::Col),
                    b"row" if in_from => field = Some(FromField::Row),
                    b"pic" if anchor.is_some() => {
                        in_pic = true;
                        current_embed = None;
                        current_size = None;
                    }
                    b"xfrm" if in_pic => in_xfrm = true,
                    _ => handle_leaf(
                        &e,
                        &mut anchor,
                        in_pic,
                        in_xfrm,
                        &mut current_embed,
                        &mut current_size,
                    )
                    .map_err(xml_err)?,
                }
            }
            Ok(Event::Empty(e)) => handle_leaf(
                &e,
                &mut anchor,
                in_pic,
                in_xfrm,
                &mut current_embed,
                &mut current_size,
            )
            .map_err(xml_err)?,
            Ok(Event::Text(e)) => {
                if let (Some(f), Some(state)) = (field, anchor.as_mut()) {
                    let text = e.unescape().map_err(|e| xml_err(e.to_string()))?;
                    let value = text.trim().parse::<u32>().ok();
                    match f {
                        FromField::Col => state.from_col = value,
                        FromField::Row => state.from_row = value,
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"col" | b"row" => field = None,
                b"from" => in_from = false,
                b"xfrm" => in_xfrm = false,
                b"pic" if in_pic => {
                    in_pic = false;
                    if let (Some(embed), Some(state)) = (current_embed.take(), anchor.as_mut()) {
                        state.pictures.push((embed, current_size.take()));
                    }
                }
                b"twoCellAnchor" | b"oneCellAnchor" | b"absoluteAnchor" => {
                    if let Some(state) = anchor.take() {
                        let position = state.position();
                        for (embed, size) in &state.pictures {
                            pictures.push(DrawingPicture {
                                embed: embed.clone(),
                                anchor: position.clone(),
                                size: size.or(state.ext).and_then(emu_to_pixels),
                            });
                        }
                    }
                    in_from = false;
                    field = None;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(pictures)
}

/// 属性のみを持つ要素（`a:blip`, `a:ext`, `xdr:pos`, `xdr:ext`）の処理
fn handle_leaf(
    e: &BytesStart<'_>,
    anchor: &mut Option<AnchorState>,
    in_pic: bool,
    in_xfrm: bool,
    current_embed: &mut Option<String>,
    current_size: &mut Option<(i64, i64)>,
) -> Result<(), String> {
    let Some(state) = anchor.as_mut() else {
        return Ok(());
    };

    match e.local_name().as_ref() {
        b"blip" if in_pic => {
            if let Some(embed) = attr_value(e, b"embed")? {
                *current_embed = Some(embed);
            }
        }
        b"ext" => {
            let cx = attr_value(e, b"cx")?.and_then(|v| v.trim().parse::<i64>().ok());
            let cy = attr_value(e, b"cy")?.and_then(|v| v.trim().parse::<i64>().ok());
            if let (Some(cx), Some(cy)) = (cx, cy) {
                if in_xfrm {
                    *current_size = Some((cx, cy));
                } else if !in_pic {
                    state.ext = Some((cx, cy));
                }
            }
        }
        b"pos" if !in_pic => {
            let x = attr_value(e, b"x")?.and_then(|v| v.trim().parse::<i64>().ok());
            let y = attr_value(e, b"y")?.and_then(|v| v.trim().parse::<i64>().ok());
            if let (Some(x), Some(y)) = (x, y) {
                state.pos = Some((x, y));
            }
        }
        _ => {}
    }

    Ok(())
}

/// 名前空間プレフィックスを無視して属性値を取得
fn attr_value(e: &BytesStart<'_>, local: &[u8]) -> Result<Option<String>, String> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| format!("XML attribute error: {}", e))?;
        if attr.key.local_name().as_ref() == local {
            let value = std::str::from_utf8(&attr.value).map_err(|e| e.to_string())?;
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}

/// EMUをピクセルに変換（u32に収まらないサイズは`None`）
fn emu_to_pixels((cx, cy): (i64, i64)) -> Option<(u32, u32)> {
    let px = |emu: i64| {
        let rounded = emu.max(0).saturating_add(EMU_PER_PIXEL / 2) / EMU_PER_PIXEL;
        u32::try_from(rounded).ok()
    };
    match (px(cx), px(cy)) {
        (Some(width), Some(height)) => Some((width, height)),
        _ => {
            tracing::warn!(cx, cy, "画像サイズが範囲外のため無視します");
            None
        }
    }
}
