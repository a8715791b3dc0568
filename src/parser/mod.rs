//! Parser Module
//!
//! calamineによるセル値の読み込みと、ZIPパッケージの直接解析
//! （ワークブック定義、リレーションシップ、描画パート）を提供します。

mod drawing;
mod package;
mod workbook;

pub(crate) use package::XlsxPackage;
pub(crate) use workbook::WorkbookParser;
