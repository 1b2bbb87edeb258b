//! バッキングソース管理
//!
//! メモリバッファとファイルハンドルを `SourceArena` にまとめて所有する。
//! Range は `SourceId` で参照するだけ。どの Range からも参照されなくなったソースは
//! `sweep` で解放され、スロットは次の追加で再利用される。

use crate::buffer::range::{Range, SourceId};
use crate::error::{BinaryError, FileError, IoResultExt, Result};
use std::cell::Cell;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// 読み取り専用で開いたファイル
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: File,
    length: u64,
    bytes_read: Cell<u64>,
}

impl FileSource {
    /// ファイルを読み取り専用で開く
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            return Err(BinaryError::File(FileError::InvalidPath {
                path: path.display().to_string(),
            }));
        }
        let file = File::open(path).with_path(path)?;
        let length = file.metadata().with_path(path)?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            length,
            bytes_read: Cell::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// 指定オフセットから `dst` を満たすだけ読み込む
    pub fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset)).with_path(&self.path)?;
        file.read_exact(dst).with_path(&self.path)?;
        self.bytes_read.set(self.bytes_read.get() + dst.len() as u64);
        Ok(())
    }

    /// これまでにファイルから読んだバイト数
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.get()
    }
}

/// Range の実データ
#[derive(Debug)]
pub enum Backing {
    Memory(Vec<u8>),
    File(FileSource),
}

impl Backing {
    fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        match self {
            Backing::Memory(bytes) => {
                let start = offset as usize;
                let end = start + dst.len();
                let src = bytes.get(start..end).ok_or_else(|| {
                    BinaryError::File(FileError::Io {
                        message: format!(
                            "memory source read out of bounds: {}..{} of {}",
                            start,
                            end,
                            bytes.len()
                        ),
                    })
                })?;
                dst.copy_from_slice(src);
                Ok(())
            }
            Backing::File(file) => file.read_at(offset, dst),
        }
    }
}

/// ソースのアリーナ
///
/// 解放したスロットは空きリストに積み、次の追加で使い回す。
/// 生きている Range が解放済みの `SourceId` を指すことはない。
#[derive(Debug, Default)]
pub struct SourceArena {
    slots: Vec<Option<Backing>>,
    free: Vec<usize>,
    /// 解放済みファイルソースの読み込みバイト数
    released_bytes_read: u64,
}

impl SourceArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_memory(&mut self, bytes: Vec<u8>) -> SourceId {
        self.push(Backing::Memory(bytes))
    }

    pub fn push_file(&mut self, file: FileSource) -> SourceId {
        self.push(Backing::File(file))
    }

    /// ソースを追加する。解放済みのスロットがあれば再利用する
    pub fn push(&mut self, backing: Backing) -> SourceId {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(backing);
                SourceId(index)
            }
            None => {
                self.slots.push(Some(backing));
                SourceId(self.slots.len() - 1)
            }
        }
    }

    pub fn get(&self, id: SourceId) -> Option<&Backing> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn live(&self) -> impl Iterator<Item = &Backing> + '_ {
        self.slots.iter().flatten()
    }

    /// 生きているソースの数
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 確保済みのスロット数（解放済みを含む）
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Range 先頭から `offset` バイト目以降を `dst` に読み込む
    pub fn read(&self, range: &Range, offset: u64, dst: &mut [u8]) -> Result<()> {
        debug_assert!(offset + dst.len() as u64 <= range.length);
        let backing = self.get(range.source).ok_or_else(|| {
            BinaryError::File(FileError::Io {
                message: format!("unknown source {}", range.source.index()),
            })
        })?;
        backing.read_at(range.data_offset + offset, dst)
    }

    /// ファイルソースから読んだ合計バイト数（解放済みのソース分も含む）
    pub fn file_bytes_read(&self) -> u64 {
        let live: u64 = self
            .live()
            .map(|backing| match backing {
                Backing::File(file) => file.bytes_read(),
                Backing::Memory(_) => 0,
            })
            .sum();
        self.released_bytes_read + live
    }

    pub fn open_file_count(&self) -> usize {
        self.live()
            .filter(|backing| matches!(backing, Backing::File(_)))
            .count()
    }

    /// `referenced[index]` が偽のソースを解放し、解放した数を返す
    ///
    /// `referenced` より後ろのスロットは参照なしとみなす。
    pub fn sweep(&mut self, referenced: &[bool]) -> usize {
        let mut released = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if referenced.get(index).copied().unwrap_or(false) {
                continue;
            }
            if let Some(backing) = slot.take() {
                if let Backing::File(file) = &backing {
                    self.released_bytes_read += file.bytes_read();
                    log::debug!("close unreferenced file source {}", file.path().display());
                }
                self.free.push(index);
                released += 1;
            }
        }
        released
    }

    /// すべてのソースを解放し、閉じたファイルハンドル数を返す
    pub fn close_all(&mut self) -> usize {
        let closed = self.open_file_count();
        self.slots.clear();
        self.free.clear();
        closed
    }
}
