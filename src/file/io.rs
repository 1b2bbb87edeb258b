//! ファイル書き出し
//!
//! コンテンツをウィンドウ単位で一時ファイルに書き出し、完了後にリネームする。
//! 書き出し中もメモリ使用量はウィンドウサイズ程度に収まる。

use crate::buffer::BinaryContent;
use crate::error::{BinaryError, FileError, IoResultExt, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 協調的キャンセル用のフラグ
///
/// クローンは同じフラグを共有する。ウィンドウの切れ目ごとに確認される。
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 書き出し先と同じディレクトリの一時ファイル名
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// `[start, start + length)` をファイルへ書き出し、書き込んだバイト数を返す
///
/// 蓄積中のアクションと未確定の編集は先に確定される。
/// 開始位置が範囲外なら何も書かずに 0 を返す。長さは終端までに切り詰める。
pub fn export_range(
    content: &mut BinaryContent,
    path: &Path,
    start: u64,
    length: u64,
    cancel: &CancelFlag,
) -> Result<u64> {
    content.end_action();
    content.commit_changes();

    let total = content.len();
    if start >= total || length == 0 {
        return Ok(0);
    }
    let length = length.min(total - start);

    if path.is_dir() {
        return Err(BinaryError::File(FileError::InvalidPath {
            path: path.display().to_string(),
        }));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
    }

    let temp_path = temp_path_for(path);
    match write_windows(content, &temp_path, start, length, cancel) {
        Ok(written) => {
            if let Err(error) = fs::rename(&temp_path, path).with_path(path) {
                let _ = fs::remove_file(&temp_path);
                return Err(error);
            }
            log::debug!("exported {} bytes to {}", written, path.display());
            Ok(written)
        }
        Err(error) => {
            let _ = fs::remove_file(&temp_path);
            log::warn!("export to {} failed: {}", path.display(), error);
            Err(error)
        }
    }
}

fn write_windows(
    content: &BinaryContent,
    temp_path: &Path,
    start: u64,
    length: u64,
    cancel: &CancelFlag,
) -> Result<u64> {
    let window = (content.options().window_size() as u64).min(length) as usize;
    let mut buffer = vec![0u8; window];
    let mut file = File::create(temp_path).with_path(temp_path)?;
    let mut written = 0u64;

    while written < length {
        if cancel.is_cancelled() {
            return Err(BinaryError::Cancelled);
        }
        let count = (length - written).min(window as u64) as usize;
        let filled = content.get(&mut buffer[..count], start + written)?;
        if filled == 0 {
            return Err(BinaryError::File(FileError::Io {
                message: format!("content ended at {} while exporting", start + written),
            }));
        }
        file.write_all(&buffer[..filled]).with_path(temp_path)?;
        written += filled as u64;
        log::trace!("export window: {}/{} bytes", written, length);
    }

    file.sync_all().with_path(temp_path)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContentOptions;
    use tempfile::tempdir;

    #[test]
    fn test_export_whole_content_in_small_windows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let options = ContentOptions::default().with_window_size(3);
        let mut content = BinaryContent::from_bytes_with_options((0u8..10).collect(), options);
        content.insert(vec![0xEE], 5).unwrap();

        let written = export_range(&mut content, &path, 0, u64::MAX, &CancelFlag::new()).unwrap();
        assert_eq!(written, 11);
        assert_eq!(
            fs::read(&path).unwrap(),
            vec![0, 1, 2, 3, 4, 0xEE, 5, 6, 7, 8, 9]
        );
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_export_commits_pending_edits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out.bin");
        let mut content = BinaryContent::from_bytes(vec![1, 2, 3]);
        content.overwrite(0x09u8, 1).unwrap();
        assert!(content.has_pending_changes());

        export_range(&mut content, &path, 1, 2, &CancelFlag::new()).unwrap();
        assert!(!content.has_pending_changes());
        assert_eq!(fs::read(&path).unwrap(), vec![0x09, 3]);
    }

    #[test]
    fn test_export_out_of_range_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut content = BinaryContent::from_bytes(vec![1, 2, 3]);
        assert_eq!(export_range(&mut content, &path, 3, 1, &CancelFlag::new()).unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_cancelled_export_leaves_no_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut content = BinaryContent::from_bytes(vec![0u8; 64]);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let error = export_range(&mut content, &path, 0, 64, &cancel).unwrap_err();
        assert!(matches!(error, BinaryError::Cancelled));
        assert!(!path.exists());
        assert!(!temp_path_for(&path).exists());

        cancel.reset();
        assert_eq!(export_range(&mut content, &path, 0, 64, &cancel).unwrap(), 64);
    }

    #[test]
    fn test_temp_path_keeps_extension() {
        let path = Path::new("/data/image.bin");
        assert_eq!(temp_path_for(path), PathBuf::from("/data/image.bin.tmp"));
    }
}
