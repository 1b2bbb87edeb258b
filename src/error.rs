//! エラーハンドリング
//!
//! binedit 全体で使用するエラー型を定義する。
//! 不正な位置・長さの引数はエラーではなく無視される（呼び出しは何もしない）。
//! エラーになるのはファイルI/O・設定・キャンセルのみ。

use std::io::ErrorKind;
use thiserror::Error;

/// ライブラリ全体のエラー型
#[derive(Error, Debug, Clone)]
pub enum BinaryError {
    /// ファイル操作エラー
    #[error("File operation failed: {0}")]
    File(#[from] FileError),

    /// 設定エラー
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// ウィンドウ単位の走査が協調的にキャンセルされた
    #[error("Operation cancelled")]
    Cancelled,
}

/// ファイル操作固有のエラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FileError {
    #[error("File not found: {path}")]
    NotFound { path: String },

    #[error("Permission denied: {path}")]
    PermissionDenied { path: String },

    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    #[error("IO error: {message}")]
    Io { message: String },
}

impl FileError {
    /// パス情報付きでI/Oエラーを分類する
    pub fn from_io(error: &std::io::Error, path: &std::path::Path) -> Self {
        let path = path.display().to_string();
        match error.kind() {
            ErrorKind::NotFound => FileError::NotFound { path },
            ErrorKind::PermissionDenied => FileError::PermissionDenied { path },
            _ => FileError::Io {
                message: format!("{}: {}", path, error),
            },
        }
    }
}

/// 設定固有のエラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration file: {path}")]
    InvalidFile { path: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Malformed configuration: {message}")]
    Parse { message: String },
}

/// プロジェクト標準のResult型
pub type Result<T> = std::result::Result<T, BinaryError>;

impl From<serde_json::Error> for BinaryError {
    fn from(error: serde_json::Error) -> Self {
        BinaryError::Config(ConfigError::Parse {
            message: error.to_string(),
        })
    }
}

/// パス情報を付与してI/Oエラーを変換するためのトレイト
pub trait IoResultExt<T> {
    fn with_path(self, path: &std::path::Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| BinaryError::File(FileError::from_io(&e, path)))
    }
}
