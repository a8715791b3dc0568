//! Incident Report Schema Module
//!
//! 構造化ステージと描画ステージの境界で使用するレポートスキーマ。
//! LLMの出力は型が緩いため、文字列フィールドは数値・真偽値・nullも受け付けます。
//! 必須キー（`title`, `event_date`, `location`, `reporter`, `summary`）が
//! 欠けている場合はデシリアライズエラーになります。

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ReportError;

/// 日付が指定されていない進捗グループの見出し
pub const UNKNOWN_DATE: &str = "（日付不明）";

/// LLMが返す構造化JSONのラッパー（`{"table": ..., "columns": {...}}`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredReport {
    /// テーブル名（任意）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// レポート本体
    pub columns: IncidentReport,
}

impl StructuredReport {
    /// JSON値からレポートを検証して取り出す
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// 構造化JSONファイルを読み込み、スキーマを検証する
    pub fn load(path: &std::path::Path) -> Result<Self, ReportError> {
        let file = std::fs::File::open(path)?;
        let value: serde_json::Value = serde_json::from_reader(std::io::BufReader::new(file))?;
        Self::from_value(value).map_err(|e| ReportError::Schema(e.to_string()))
    }
}

/// インシデント報告書
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentReport {
    /// 件名
    #[serde(deserialize_with = "loose_string")]
    pub title: String,
    /// 発生日
    #[serde(deserialize_with = "loose_string")]
    pub event_date: String,
    /// 発生場所
    #[serde(deserialize_with = "loose_string")]
    pub location: String,
    /// 報告者
    #[serde(deserialize_with = "loose_string")]
    pub reporter: String,
    /// 日付ごとの進捗
    #[serde(default, deserialize_with = "loose_vec")]
    pub progress: Vec<ProgressGroup>,
    /// 要約
    pub summary: Summary,
}

/// 1日分の進捗グループ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressGroup {
    /// 日付（欠落時は`（日付不明）`）
    #[serde(default = "unknown_date", deserialize_with = "loose_string")]
    pub date: String,
    /// その日の出来事（元の順序を保持）
    #[serde(default, deserialize_with = "loose_vec")]
    pub timeline: Vec<TimelineEntry>,
}

/// 時系列の出来事1件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// 時刻（`None`, `null`, 空文字は表示しない）
    #[serde(default, deserialize_with = "loose_option_string")]
    pub time: Option<String>,
    /// 内容
    #[serde(default, deserialize_with = "loose_string")]
    pub description: String,
    /// 関連画像
    #[serde(default, deserialize_with = "loose_vec")]
    pub related_images: Vec<ImageRef>,
}

impl TimelineEntry {
    /// 表示すべき時刻（空やセンチネル値の場合は`None`）
    pub fn display_time(&self) -> Option<&str> {
        let time = self.time.as_deref()?;
        let normalized = time.trim().to_lowercase();
        if matches!(normalized.as_str(), "" | "none" | "null") {
            None
        } else {
            Some(time)
        }
    }
}

/// 関連画像の参照
///
/// LLMは抽出結果の画像オブジェクトをそのまま返すことも、パス文字列だけを
/// 返すこともあるため、両方を受け付けます。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageRef {
    /// パス文字列
    Path(String),
    /// 画像オブジェクト（`image_path`優先、なければ`image_name`）
    Object {
        /// 画像パス
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_path: Option<String>,
        /// 画像ファイル名
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_name: Option<String>,
    },
}

impl ImageRef {
    /// 画像のパス（空文字列は未指定として扱う）
    pub fn path(&self) -> Option<&str> {
        match self {
            ImageRef::Path(path) => Some(path.as_str()),
            ImageRef::Object {
                image_path,
                image_name,
            } => image_path
                .as_deref()
                .filter(|p| !p.is_empty())
                .or_else(|| image_name.as_deref().filter(|n| !n.is_empty())),
        }
    }
}

/// 要約
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Summary {
    /// 結果
    #[serde(default, deserialize_with = "loose_string")]
    pub result: String,
    /// 原因
    #[serde(default, deserialize_with = "loose_string")]
    pub cause: String,
    /// 対策
    #[serde(default, deserialize_with = "loose_string")]
    pub countermeasure: String,
}

fn unknown_date() -> String {
    UNKNOWN_DATE.to_string()
}

fn scalar_to_string(value: serde_json::Value) -> Result<Option<String>, String> {
    use serde_json::Value;
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(format!("expected a string, found {}", other)),
    }
}

/// 文字列・数値・真偽値を文字列として受け付ける（nullは空文字列）
fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    scalar_to_string(value)
        .map(Option::unwrap_or_default)
        .map_err(serde::de::Error::custom)
}

fn loose_option_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    scalar_to_string(value).map_err(serde::de::Error::custom)
}

/// 配列を受け付ける（nullは空配列）
fn loose_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> serde_json::Value {
        json!({
            "table": "incident_report",
            "columns": {
                "title": "サーバー停止",
                "event_date": "2025-08-25",
                "location": "本社",
                "reporter": "山田",
                "summary": {"result": "正常復旧"}
            }
        })
    }

    #[test]
    fn test_minimal_report() {
        let report = StructuredReport::from_value(minimal()).unwrap();
        assert_eq!(report.table.as_deref(), Some("incident_report"));
        assert_eq!(report.columns.title, "サーバー停止");
        assert!(report.columns.progress.is_empty());
        assert_eq!(report.columns.summary.result, "正常復旧");
        assert_eq!(report.columns.summary.cause, "");
    }

    #[test]
    fn test_missing_required_key_is_error() {
        let mut value = minimal();
        value["columns"].as_object_mut().unwrap().remove("reporter");
        let err = StructuredReport::from_value(value).unwrap_err();
        assert!(err.to_string().contains("reporter"));
    }

    #[test]
    fn test_missing_columns_wrapper_is_error() {
        let value = minimal()["columns"].clone();
        assert!(StructuredReport::from_value(value).is_err());
    }

    #[test]
    fn test_loose_scalars() {
        let mut value = minimal();
        value["columns"]["event_date"] = json!(45894);
        value["columns"]["location"] = json!(null);
        let report = StructuredReport::from_value(value).unwrap();
        assert_eq!(report.columns.event_date, "45894");
        assert_eq!(report.columns.location, "");
    }

    #[test]
    fn test_timeline_defaults_and_image_refs() {
        let mut value = minimal();
        value["columns"]["progress"] = json!([
            {"timeline": [
                {"time": null, "description": "一次対応", "related_images": [
                    {"image_name": "トラブル21-1.png", "image_path": "output_images/トラブル21/トラブル21-1.png", "anchor_cell": "B3"},
                    "output_images/トラブル21-2.png"
                ]},
                {"time": "14:17"}
            ]},
            {"date": "2025-08-26", "timeline": null}
        ]);
        let report = StructuredReport::from_value(value).unwrap().columns;
        assert_eq!(report.progress[0].date, UNKNOWN_DATE);
        let first = &report.progress[0].timeline[0];
        assert_eq!(first.time, None);
        assert_eq!(
            first.related_images[0].path(),
            Some("output_images/トラブル21/トラブル21-1.png")
        );
        assert_eq!(
            first.related_images[1].path(),
            Some("output_images/トラブル21-2.png")
        );
        assert_eq!(report.progress[0].timeline[1].description, "");
        assert!(report.progress[1].timeline.is_empty());
    }

    #[test]
    fn test_image_ref_falls_back_to_name() {
        let image: ImageRef =
            serde_json::from_value(json!({"image_path": "", "image_name": "a-1.png"})).unwrap();
        assert_eq!(image.path(), Some("a-1.png"));

        let empty: ImageRef = serde_json::from_value(json!({"anchor_cell": "A1"})).unwrap();
        assert_eq!(empty.path(), None);
    }

    #[test]
    fn test_display_time_sentinels() {
        let entry = |time: Option<&str>| TimelineEntry {
            time: time.map(str::to_string),
            description: "x".to_string(),
            related_images: vec![],
        };
        assert_eq!(entry(None).display_time(), None);
        assert_eq!(entry(Some("None")).display_time(), None);
        assert_eq!(entry(Some(" NULL ")).display_time(), None);
        assert_eq!(entry(Some("")).display_time(), None);
        assert_eq!(entry(Some("   ")).display_time(), None);
        assert_eq!(entry(Some("21時35分")).display_time(), Some("21時35分"));
    }
}
