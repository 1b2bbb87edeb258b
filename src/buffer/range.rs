//! Range：論理コンテンツの連続した一区間
//!
//! 実データは `SourceArena` 内のソース（メモリまたはファイル）にあり、
//! Range 自体は位置・長さ・オフセットとソースIDだけを持つ `Copy` な値。
//! 履歴に取り込んだ Range は以後のストア側の分割・移動の影響を受けない。

use std::fmt;

/// バッキングソースの識別子（`SourceArena` 内で安定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub(crate) usize);

impl SourceId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// 論理コンテンツの一区間
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    /// 論理コンテンツ上の開始位置
    pub position: u64,
    /// バイト数（ストア内では常に1以上）
    pub length: u64,
    /// ソース内でこの区間のデータが始まる位置
    pub data_offset: u64,
    /// バッキングソース
    pub source: SourceId,
    /// 編集由来のデータか（元ファイルのままなら false）
    pub dirty: bool,
}

impl Range {
    pub fn new(position: u64, length: u64, source: SourceId, dirty: bool) -> Self {
        Self {
            position,
            length,
            data_offset: 0,
            source,
            dirty,
        }
    }

    pub fn with_data_offset(mut self, data_offset: u64) -> Self {
        self.data_offset = data_offset;
        self
    }

    /// 排他的終端位置
    pub fn exclusive_end(&self) -> u64 {
        self.position + self.length
    }

    pub fn contains(&self, position: u64) -> bool {
        self.position <= position && position < self.exclusive_end()
    }

    /// `[start, end)` と重なるか
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.position < end && start < self.exclusive_end()
    }

    /// `[start, end)` に収まる部分だけを切り出す
    pub fn clipped(&self, start: u64, end: u64) -> Option<Range> {
        if !self.overlaps(start, end) {
            return None;
        }
        let from = self.position.max(start);
        let to = self.exclusive_end().min(end);
        Some(Range {
            position: from,
            length: to - from,
            data_offset: self.data_offset + (from - self.position),
            source: self.source,
            dirty: self.dirty,
        })
    }

    /// 内部の位置で前後に分割する
    ///
    /// `at` は `position < at < exclusive_end()` を満たすこと。
    pub fn split_at(&self, at: u64) -> (Range, Range) {
        debug_assert!(self.position < at && at < self.exclusive_end());
        let delta = at - self.position;
        let head = Range {
            length: delta,
            ..*self
        };
        let tail = Range {
            position: at,
            length: self.length - delta,
            data_offset: self.data_offset + delta,
            ..*self
        };
        (head, tail)
    }

    /// 論理位置だけを変更したコピー
    pub fn moved_to(&self, position: u64) -> Range {
        Range { position, ..*self }
    }

    pub(crate) fn shift(&mut self, delta: i64) {
        self.position = self.position.saturating_add_signed(delta);
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Range {{position:{}, length:{}}}",
            self.position, self.length
        )
    }
}

/// 範囲列の合計バイト数
pub fn total_length(ranges: &[Range]) -> u64 {
    ranges.iter().map(|range| range.length).sum()
}
