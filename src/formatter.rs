//! Formatter Module
//!
//! セル値を抽出JSON用の文字列に正規化するモジュール。
//! 整数値はExcelの日付シリアル値として解釈し、妥当な年の範囲内であれば
//! ISO 8601形式の日付文字列に置き換えます。

use calamine::Data;
use chrono::{Duration, NaiveDate, NaiveDateTime};

/// 日付として扱う年の範囲（両端を含む）
const YEAR_WINDOW: std::ops::RangeInclusive<i32> = 1900..=2100;

/// セルフォーマッター
///
/// ワークブックのエポック設定（1900年/1904年システム）を保持し、
/// calamineのセル値を文字列に変換します。
#[derive(Debug, Clone, Copy)]
pub(crate) struct CellFormatter {
    /// 1904年エポックを使用するかどうか
    is_1904: bool,
}

impl CellFormatter {
    /// 新しいCellFormatterインスタンスを生成
    pub fn new(is_1904: bool) -> Self {
        Self { is_1904 }
    }

    /// セル値を正規化
    ///
    /// # 戻り値
    ///
    /// * `Some(String)` - 正規化済みの値
    /// * `None` - 空セル、または空文字列のセル（出力対象外）
    ///
    /// 変換に失敗した値はエラーにせず、元の値の文字列表現をそのまま返します。
    pub fn format(&self, cell: &Data) -> Option<String> {
        match cell {
            Data::Empty => None,
            Data::String(s) if s.is_empty() => None,
            Data::String(s) => Some(s.clone()),
            Data::Int(i) => Some(self.normalize_serial(*i as f64)),
            Data::Float(f) => Some(self.normalize_serial(*f)),
            Data::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
            Data::Error(e) => Some(e.to_string()),
            Data::DateTime(dt) => {
                if dt.is_duration() {
                    Some(number_text(dt.as_f64()))
                } else {
                    Some(self.format_datetime(dt.as_f64()))
                }
            }
            Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        }
    }

    /// 数値をシリアル値として日付に変換する
    ///
    /// 整数値のみが対象です。小数部を持つ値、範囲外の値、計算がオーバーフロー
    /// する値は、数値の文字列表現をそのまま返します。
    pub fn normalize_serial(&self, value: f64) -> String {
        if value.is_finite() && value.fract() == 0.0 {
            if let Some(date) = self.serial_to_date(value as i64) {
                if YEAR_WINDOW.contains(&chrono::Datelike::year(&date)) {
                    return date.format("%Y-%m-%d").to_string();
                }
            }
        }
        number_text(value)
    }

    /// 日付型セル（書式で日付と判定されたセル）を文字列に変換
    ///
    /// 時刻部分が0時ちょうどの場合は日付のみ、それ以外は日時を出力します。
    fn format_datetime(&self, serial: f64) -> String {
        match self.serial_to_datetime(serial) {
            Some(dt) if dt.time() == chrono::NaiveTime::MIN => dt.format("%Y-%m-%d").to_string(),
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => number_text(serial),
        }
    }

    /// エポック日付
    ///
    /// - 1900年システム: 1899-12-30起算（Excelの1900年うるう年バグ込み）
    /// - 1904年システム: 1904-01-01起算
    fn epoch(&self) -> Option<NaiveDate> {
        if self.is_1904 {
            NaiveDate::from_ymd_opt(1904, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(1899, 12, 30)
        }
    }

    fn serial_to_date(&self, days: i64) -> Option<NaiveDate> {
        self.epoch()?.checked_add_signed(Duration::try_days(days)?)
    }

    fn serial_to_datetime(&self, serial: f64) -> Option<NaiveDateTime> {
        if !serial.is_finite() {
            return None;
        }
        let days = serial.floor();
        let seconds = ((serial - days) * 86_400.0).round() as i64;
        let date = self.serial_to_date(days as i64)?;
        date.and_hms_opt(0, 0, 0)?
            .checked_add_signed(Duration::try_seconds(seconds)?)
    }
}

/// セル値1つを抽出JSON用の文字列に正規化する
///
/// 空セルと空文字列は`None`になります。`is_1904`はワークブックの
/// `date1904`設定です。
///
/// # 使用例
///
/// ```rust
/// use calamine::Data;
/// use incident_report::normalize_cell_value;
///
/// assert_eq!(normalize_cell_value(&Data::Float(45894.0), false).as_deref(), Some("2025-08-25"));
/// assert_eq!(normalize_cell_value(&Data::Float(1.5), false).as_deref(), Some("1.5"));
/// assert_eq!(normalize_cell_value(&Data::Empty, false), None);
/// ```
pub fn normalize_cell_value(cell: &Data, is_1904: bool) -> Option<String> {
    CellFormatter::new(is_1904).format(cell)
}

/// 数値の文字列表現（整数値は小数点なし）
fn number_text(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
