//! Security Module
//!
//! ワークブック（ZIPアーカイブ）を展開する前のセキュリティ検査を提供するモジュール。
//! ZIP bomb攻撃、パストラバーサル攻撃への対策を行います。
//! 抽出ステージはメディアパートをディスクに書き出すため、エントリ名の検証は必須です。

use std::io::{Read, Seek};
use zip::ZipArchive;

use crate::error::ReportError;

/// セキュリティ設定
///
/// ファイル処理時のセキュリティ制限を定義します。
#[derive(Debug, Clone)]
pub(crate) struct SecurityConfig {
    /// 展開後の最大サイズ（バイト）
    /// デフォルト: 1GB (1_073_741_824 bytes)
    pub max_decompressed_size: u64,
    /// ZIPアーカイブ内の最大ファイル数
    /// デフォルト: 10000
    pub max_file_count: usize,
    /// 単一ファイルの最大サイズ（バイト）
    /// デフォルト: 100MB (104_857_600 bytes)
    pub max_file_size: u64,
    /// 入力ファイルの最大サイズ（バイト）
    /// デフォルト: 2GB (2_147_483_648 bytes)
    pub max_input_file_size: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_decompressed_size: 1_073_741_824, // 1GB
            max_file_count: 10_000,
            max_file_size: 104_857_600,         // 100MB
            max_input_file_size: 2_147_483_648, // 2GB
        }
    }
}

impl SecurityConfig {
    /// 入力ファイルサイズの上限チェック
    pub fn check_input_size(&self, size: u64) -> Result<(), ReportError> {
        if size > self.max_input_file_size {
            return Err(ReportError::SecurityViolation(format!(
                "Input file size exceeds maximum: {} bytes (max: {} bytes)",
                size, self.max_input_file_size
            )));
        }
        Ok(())
    }

    /// アーカイブ全体の検査
    ///
    /// エントリ数、各エントリのパスとサイズ、展開後サイズの累計を検証します。
    pub fn check_archive<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
    ) -> Result<(), ReportError> {
        if archive.len() > self.max_file_count {
            return Err(ReportError::SecurityViolation(format!(
                "ZIP archive contains too many files: {} (max: {})",
                archive.len(),
                self.max_file_count
            )));
        }

        let mut total_decompressed_size = 0u64;
        for i in 0..archive.len() {
            let file = archive
                .by_index(i)
                .map_err(|e| ReportError::Zip(format!("{}", e)))?;

            let file_name = file.name();
            validate_zip_path(file_name)
                .map_err(|e| ReportError::SecurityViolation(format!("Invalid ZIP path: {}", e)))?;

            let file_size = file.size();
            if file_size > self.max_file_size {
                return Err(ReportError::SecurityViolation(format!(
                    "File '{}' exceeds maximum size: {} bytes (max: {} bytes)",
                    file_name, file_size, self.max_file_size
                )));
            }

            total_decompressed_size = total_decompressed_size
                .checked_add(file_size)
                .ok_or_else(|| {
                    ReportError::SecurityViolation(
                        "Total decompressed size calculation overflow".to_string(),
                    )
                })?;

            if total_decompressed_size > self.max_decompressed_size {
                return Err(ReportError::SecurityViolation(format!(
                    "Total decompressed size exceeds maximum: {} bytes (max: {} bytes)",
                    total_decompressed_size, self.max_decompressed_size
                )));
            }
        }

        Ok(())
    }
}

/// ファイルパスの検証
///
/// パストラバーサル攻撃を防ぐため、ZIPエントリ名を検証します。
///
/// # 戻り値
///
/// * `Ok(())` - パスが安全な場合
/// * `Err(String)` - パスが危険な場合（`..`や絶対パスを含む）
pub(crate) fn validate_zip_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("Empty path is not allowed".to_string());
    }

    // 絶対パスを拒否（Windows形式の`C:\`やUnix形式の`/`で始まるパス）
    if path.starts_with('/') || path.starts_with("C:\\") || path.starts_with("c:\\") {
        return Err(format!("Absolute path is not allowed: {}", path));
    }

    if path.contains("..") {
        return Err(format!("Path traversal detected: {}", path));
    }

    if path.contains('\\') {
        return Err(format!("Backslash in path is not allowed: {}", path));
    }

    Ok(())
}
