//! Prompt Construction
//!
//! 抽出結果とターゲットスキーマから、LLMへの指示文を組み立てます。
//! 日付の分類、タイムラインの分割、画像と出来事の対応付けはすべてモデル側の
//! 判断に委ねるため、ここに書かれた配置ルールがモデルに期待する振る舞いのすべてです。

use serde_json::json;

use crate::error::ReportError;
use crate::types::ExtractionResult;

/// システムメッセージ（役割の指定）
pub const SYSTEM_PROMPT: &str =
    "あなたは時系列の報告データを階層的に整理することに長けたアナライザーです。";

/// モデルに要求するターゲットスキーマ
///
/// フィールド名と大まかな型のみを示します。`columns`配下が`IncidentReport`に対応します。
pub fn target_schema() -> serde_json::Value {
    json!({
        "table": "incident_report",
        "columns": {
            "title": "string",
            "event_date": "date",
            "location": "string",
            "reporter": "string",
            "progress": [
                {
                    "date": "date",
                    "timeline": [
                        {
                            "time": "time",
                            "description": "string",
                            "related_images": "list"
                        }
                    ]
                }
            ],
            "summary": {
                "result": "string",
                "cause": "string",
                "countermeasure": "string"
            }
        }
    })
}

/// 配置ルール（番号付き）
const PLACEMENT_RULES: &str = "\
1. 「発生日」「発生日時」など発生の日付・日時を示すセルがあれば、その値を \"event_date\" に入れる。採用するのは1件だけ。
2. 日付に見えるセル（例: \"2025.8.26\", \"8月26日\", \"2025/08/26\", \"45895\"）は progress[].date とし、異なる日付ごとに progress を1つ作る。
   - Excelの日付シリアル値（例: 45894）は 1899-12-30 を0日目として日付に換算する。
3. 各 progress の \"timeline\" には、その日付に属する出来事を入れる。
   - 時刻を含むセル（例: \"14:17\", \"9:30\", \"21時35分\"）を timeline[].time とし、そのセルの右側または下側にあるテキストを timeline[].description とする。
   - セルが物理的に異なる（行または列が違う）場合は、時刻や内容が同じ・似ている・隣接していても別々の timeline にする。縦に連続したセルも統合しない。
   - 1つのセルに「/」「／」「・」「,」「、」「，」や改行で区切られた複数の出来事があれば、それぞれ独立した timeline に分割する。
   - 複数セルの内容を1つの出来事にまとめてはならない。
4. 画像の対応付け:
   - images のすべての画像を対象にする。各画像は必ずいずれか1つの timeline の related_images に入れ、重複させない。
   - 画像の anchor_cell から上方向にたどり、最初に見つかる時刻セルまたは出来事セルに対応付ける。
   - 列が異なる場合は、同じ行または近い行にある最も近い出来事を優先する。
   - 同じ行や隣接する行にある複数の画像は、同じ出来事の related_images にまとめてよい。
5. 「結果」「原因」「対策」「対応」などの語を含むセルは summary に分類し、それぞれ result / cause / countermeasure に入れる（「対応」は countermeasure）。
6. 出力はスキーマに厳密に従った JSON オブジェクト1つだけとし、説明文・コメント・前置きは一切付けない。";

/// 指示文を組み立てる
///
/// スキーマ、配置ルール、セルデータ、画像データを順に埋め込みます。
/// JSONは非ASCII文字をそのまま、2スペースインデントで埋め込みます。
pub fn build_prompt(extraction: &ExtractionResult) -> Result<String, ReportError> {
    let schema = serde_json::to_string_pretty(&target_schema())?;
    let cells = serde_json::to_string_pretty(&extraction.text_cells)?;
    let images = serde_json::to_string_pretty(&extraction.images)?;

    Ok(format!(
        "あなたはExcelで作成された障害報告書を構造化するアシスタントです。
以下のExcel抽出データ（セルごとの内容と画像情報）をもとに、指定スキーマに従ったJSONを生成してください。

# 基本方針
- Excelのレイアウトは報告書ごとに異なり、項目の位置は固定されていません。
- セルの内容と位置関係（上下・左右）から、日付・時刻・出来事・画像の関係を推定してください。
- 項目名の右側または下側に値があることが多いですが、例外もあります。
- スキーマに厳密に従い、欠落や重複のないように階層化してください。

# ルール（重要）
{rules}

# スキーマ
{schema}

# セルデータ
{cells}

# 画像データ
{images}
",
        rules = PLACEMENT_RULES,
        schema = schema,
        cells = cells,
        images = images,
    ))
}
