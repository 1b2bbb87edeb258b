//! バイナリコンテンツの設定
//!
//! 未指定の項目は既定値で補う。JSON から読み込み、上書き設定とマージできる。

use crate::error::{ConfigError, IoResultExt, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 連続した1バイト編集を1つのアクションにまとめる時間幅
pub const DEFAULT_MERGE_WINDOW_MS: u64 = 1500;

/// エクスポート・ファイル走査で一度に扱うウィンドウサイズ（2MiB）
pub const DEFAULT_WINDOW_SIZE: usize = 2048 * 1024;

/// コンテンツ動作のオプション
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentOptions {
    /// マージウィンドウ（ミリ秒、未指定時は1500）
    pub merge_window_ms: Option<u64>,
    /// ウィンドウサイズ（バイト、未指定時は2MiB）
    pub window_size: Option<usize>,
    /// 編集履歴を記録するか（未指定時は有効）
    pub history_enabled: Option<bool>,
}

impl ContentOptions {
    /// JSON文字列から読み込む
    pub fn from_json_str(text: &str) -> Result<Self> {
        let options: ContentOptions = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    /// JSONファイルから読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            return Err(ConfigError::InvalidFile {
                path: path.display().to_string(),
            }
            .into());
        }
        let text = std::fs::read_to_string(path).with_path(path)?;
        Self::from_json_str(&text)
    }

    /// 値の妥当性を検証
    pub fn validate(&self) -> Result<()> {
        if self.window_size == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "window_size".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// 上書き設定とマージ（上書き側が優先）
    pub fn merged_with(&self, overrides: &ContentOptions) -> ContentOptions {
        ContentOptions {
            merge_window_ms: overrides.merge_window_ms.or(self.merge_window_ms),
            window_size: overrides.window_size.or(self.window_size),
            history_enabled: overrides.history_enabled.or(self.history_enabled),
        }
    }

    pub fn with_merge_window(mut self, window: Duration) -> Self {
        self.merge_window_ms = Some(window.as_millis() as u64);
        self
    }

    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window_size = Some(size);
        self
    }

    pub fn with_history(mut self, enabled: bool) -> Self {
        self.history_enabled = Some(enabled);
        self
    }

    pub fn merge_window(&self) -> Duration {
        Duration::from_millis(self.merge_window_ms.unwrap_or(DEFAULT_MERGE_WINDOW_MS))
    }

    pub fn window_size(&self) -> usize {
        match self.window_size {
            Some(size) if size > 0 => size,
            _ => DEFAULT_WINDOW_SIZE,
        }
    }

    pub fn history_enabled(&self) -> bool {
        self.history_enabled.unwrap_or(true)
    }
}
