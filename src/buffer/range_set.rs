//! Range の区間インデックス
//!
//! 開始位置でソートされた `Vec<Range>` と二分探索で構成する。
//! 公開操作の完了後は常に `[0, len_bytes())` を隙間・重なりなく敷き詰める。

use crate::buffer::range::{total_length, Range};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: Vec<Range>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 単一の Range から作成（長さ0なら空）
    pub fn from_range(range: Range) -> Self {
        let mut set = Self::new();
        if range.length > 0 {
            set.ranges.push(range.moved_to(0));
        }
        set
    }

    pub fn as_slice(&self) -> &[Range] {
        &self.ranges
    }

    pub fn count(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// 敷き詰められた合計バイト数
    pub fn len_bytes(&self) -> u64 {
        self.ranges
            .last()
            .map(|range| range.exclusive_end())
            .unwrap_or(0)
    }

    /// `position` を含む、またはそれ以降で最初の Range のインデックス
    pub fn ceiling_index(&self, position: u64) -> usize {
        self.ranges
            .partition_point(|range| range.exclusive_end() <= position)
    }

    /// `position` を含む Range
    pub fn range_at(&self, position: u64) -> Option<&Range> {
        self.ranges
            .get(self.ceiling_index(position))
            .filter(|range| range.contains(position))
    }

    /// `position` に境界を作り、そこから始まる Range のインデックスを返す
    pub fn split_at(&mut self, position: u64) -> usize {
        let index = self.ceiling_index(position);
        match self.ranges.get(index) {
            Some(range) if range.position < position => {
                let (head, tail) = range.split_at(position);
                self.ranges[index] = head;
                self.ranges.insert(index + 1, tail);
                index + 1
            }
            _ => index,
        }
    }

    /// `index` 以降の Range を `delta` だけ移動
    pub fn shift_from(&mut self, index: usize, delta: i64) {
        if delta == 0 {
            return;
        }
        for range in &mut self.ranges[index..] {
            range.shift(delta);
        }
    }

    /// 新しい Range を挿入し、後続を後ろへずらす
    pub fn insert_range(&mut self, range: Range) {
        self.insert_ranges(&[range]);
    }

    /// 連続した Range 群を `ranges[0].position` に挿入
    pub fn insert_ranges(&mut self, ranges: &[Range]) {
        let Some(first) = ranges.first() else {
            return;
        };
        let total = total_length(ranges);
        if total == 0 || first.position > self.len_bytes() {
            return;
        }
        let index = self.split_at(first.position);
        self.shift_from(index, total as i64);
        self.ranges
            .splice(index..index, ranges.iter().copied().filter(|r| r.length > 0));
        debug_assert!(self.is_tiled());
    }

    /// `[start, end)` を取り除いて（後続は移動しない）取り除いた部分を返す
    fn remove_span(&mut self, start: u64, end: u64) -> (usize, Vec<Range>) {
        let end = end.min(self.len_bytes());
        if start >= end {
            return (self.ceiling_index(start), Vec::new());
        }
        let first = self.split_at(start);
        let last = self.split_at(end);
        let removed = self.ranges.drain(first..last).collect();
        (first, removed)
    }

    /// `[start, start + length)` を削除して後続を前へ詰める
    pub fn delete_and_shift(&mut self, start: u64, length: u64) -> Vec<Range> {
        let (index, removed) = self.remove_span(start, start.saturating_add(length));
        self.shift_from(index, -(total_length(&removed) as i64));
        debug_assert!(self.is_tiled());
        removed
    }

    /// `[start, end)` を `with` で置き換え、元の部分を返す
    ///
    /// `with` は `start` から連続していること。長さが変わる場合は後続を移動する。
    pub fn replace_span(&mut self, start: u64, end: u64, with: &[Range]) -> Vec<Range> {
        if start > self.len_bytes() {
            return Vec::new();
        }
        let (index, removed) = self.remove_span(start, end);
        let removed_len = total_length(&removed) as i64;
        let added_len = total_length(with) as i64;
        self.shift_from(index, added_len - removed_len);
        self.ranges
            .splice(index..index, with.iter().copied().filter(|r| r.length > 0));
        debug_assert!(self.is_tiled());
        removed
    }

    /// `[start, end)` を覆う Range のコピー（端は切り詰め）
    pub fn snapshot(&self, start: u64, end: u64) -> Vec<Range> {
        self.ranges[self.ceiling_index(start)..]
            .iter()
            .take_while(|range| range.position < end)
            .filter_map(|range| range.clipped(start, end))
            .collect()
    }

    /// 敷き詰め不変条件を満たすか
    pub fn is_tiled(&self) -> bool {
        let mut expected = 0u64;
        for range in &self.ranges {
            if range.position != expected || range.length == 0 {
                return false;
            }
            expected = range.exclusive_end();
        }
        true
    }
}
