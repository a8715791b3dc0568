//! Public API Types
//!
//! 公開APIで使用する列挙型を定義するモジュール。

/// シート選択方式
///
/// 抽出対象のシートを選択する方法を指定します。
/// 1回の実行で抽出されるシートは常に1つです。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum SheetSelector {
    /// ワークブックのアクティブシート（デフォルト）
    ///
    /// `xl/workbook.xml`の`workbookView@activeTab`で指定されたシートです。
    /// 指定がない場合は最初のシートになります。
    #[default]
    Active,

    /// インデックス指定（0始まり）
    ///
    /// 例: `SheetSelector::Index(0)` は最初のシートを選択
    Index(usize),

    /// シート名指定
    ///
    /// 例: `SheetSelector::Name("報告書".to_string())`
    Name(String),
}

impl SheetSelector {
    /// シート名の一覧とアクティブタブから対象シートのインデックスを決定する
    ///
    /// # 戻り値
    ///
    /// * `Ok(usize)` - 選択されたシートのインデックス
    /// * `Err(String)` - シートが見つからない、またはインデックスが範囲外の場合
    pub(crate) fn resolve(&self, sheet_names: &[String], active_tab: usize) -> Result<usize, String> {
        if sheet_names.is_empty() {
            return Err("Workbook contains no sheets".to_string());
        }

        match self {
            // activeTabが壊れている場合は最初のシート
            SheetSelector::Active => Ok(if active_tab < sheet_names.len() {
                active_tab
            } else {
                0
            }),
            SheetSelector::Index(index) => {
                if *index >= sheet_names.len() {
                    return Err(format!(
                        "Sheet index {} is out of range (total: {})",
                        index,
                        sheet_names.len()
                    ));
                }
                Ok(*index)
            }
            SheetSelector::Name(name) => sheet_names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| format!("Sheet '{}' not found", name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["表紙".to_string(), "報告書".to_string(), "写真".to_string()]
    }

    #[test]
    fn test_active_uses_active_tab() {
        assert_eq!(SheetSelector::Active.resolve(&names(), 1), Ok(1));
    }

    #[test]
    fn test_active_out_of_range_falls_back_to_first() {
        assert_eq!(SheetSelector::Active.resolve(&names(), 9), Ok(0));
    }

    #[test]
    fn test_index_out_of_range() {
        let err = SheetSelector::Index(3).resolve(&names(), 0).unwrap_err();
        assert!(err.contains("out of range"));
    }

    #[test]
    fn test_name_lookup() {
        assert_eq!(
            SheetSelector::Name("写真".to_string()).resolve(&names(), 0),
            Ok(2)
        );
        assert!(SheetSelector::Name("なし".to_string())
            .resolve(&names(), 0)
            .is_err());
    }

    #[test]
    fn test_empty_workbook() {
        assert!(SheetSelector::Active.resolve(&[], 0).is_err());
    }
}
