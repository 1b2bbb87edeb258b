//! バイナリコンテンツ
//!
//! 論理バイト列を Range の集合として表現し、局所的な挿入・削除・上書きと
//! アクション単位のアンドゥ・リドゥを提供する。
//! ファイル由来のデータは必要なウィンドウだけを読み込むため、メモリ使用量はファイルサイズに依存しない。
//!
//! 範囲外の位置・長さの引数はエラーにせず無視する。

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::buffer::pending::{PendingEdits, PendingMode};
use crate::buffer::range::{total_length, Range};
use crate::buffer::range_set::RangeSet;
use crate::buffer::source::{Backing, FileSource, SourceArena};
use crate::config::ContentOptions;
use crate::editor::change_notifier::{ListenerId, ModifyListener, ModifyNotifier};
use crate::editor::history::{Action, ActionBuilder, ActionHistory, ActionKind};
use crate::error::Result;
use crate::file::io::{self, CancelFlag};

/// 編集データ
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditData {
    /// 1バイト（キー入力）
    Byte(u8),
    /// メモリ上のバイト列（コピーせずに所有する）
    Bytes(Vec<u8>),
    /// ファイルの内容（読み込まずに参照する）
    File(PathBuf),
}

impl From<u8> for EditData {
    fn from(byte: u8) -> Self {
        EditData::Byte(byte)
    }
}

impl From<Vec<u8>> for EditData {
    fn from(bytes: Vec<u8>) -> Self {
        EditData::Bytes(bytes)
    }
}

impl From<&[u8]> for EditData {
    fn from(bytes: &[u8]) -> Self {
        EditData::Bytes(bytes.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for EditData {
    fn from(bytes: [u8; N]) -> Self {
        EditData::Bytes(bytes.to_vec())
    }
}

impl From<PathBuf> for EditData {
    fn from(path: PathBuf) -> Self {
        EditData::File(path)
    }
}

impl From<&Path> for EditData {
    fn from(path: &Path) -> Self {
        EditData::File(path.to_path_buf())
    }
}

/// 編集由来データから読み出された区間
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtySpan {
    pub position: u64,
    pub length: u64,
}

fn push_span(spans: &mut Vec<DirtySpan>, position: u64, length: u64) {
    if length == 0 {
        return;
    }
    if let Some(last) = spans.last_mut() {
        if last.position + last.length == position {
            last.length += length;
            return;
        }
    }
    spans.push(DirtySpan { position, length });
}

/// 編集可能なバイナリコンテンツ
pub struct BinaryContent {
    ranges: RangeSet,
    sources: SourceArena,
    pending: Option<PendingEdits>,
    history: Option<ActionHistory>,
    notifier: ModifyNotifier,
    options: ContentOptions,
    dirty: bool,
    /// 直前に上位ニブル入力（または1バイト挿入）した位置
    last_upper_nibble: Option<u64>,
}

impl BinaryContent {
    /// 空のコンテンツを作成
    pub fn new() -> Self {
        Self::with_options(ContentOptions::default())
    }

    pub fn with_options(options: ContentOptions) -> Self {
        let history = options
            .history_enabled()
            .then(|| ActionHistory::new(options.merge_window()));
        Self {
            ranges: RangeSet::new(),
            sources: SourceArena::new(),
            pending: None,
            history,
            notifier: ModifyNotifier::new(),
            options,
            dirty: false,
            last_upper_nibble: None,
        }
    }

    /// ファイルを元データとして開く（内容は読み込まない）
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, ContentOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ContentOptions) -> Result<Self> {
        let file = FileSource::open(path)?;
        let length = file.len();
        log::debug!("open {} ({} bytes)", file.path().display(), length);
        let mut content = Self::with_options(options);
        let source = content.sources.push_file(file);
        // 空ファイルは Range を持たない
        content.ranges = RangeSet::from_range(Range::new(0, length, source, false));
        Ok(content)
    }

    /// メモリ上のバイト列を元データとして作成（未変更扱い）
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::from_bytes_with_options(bytes, ContentOptions::default())
    }

    pub fn from_bytes_with_options(bytes: Vec<u8>, options: ContentOptions) -> Self {
        let mut content = Self::with_options(options);
        let length = bytes.len() as u64;
        let source = content.sources.push_memory(bytes);
        content.ranges = RangeSet::from_range(Range::new(0, length, source, false));
        content
    }

    pub fn options(&self) -> &ContentOptions {
        &self.options
    }

    /// 論理バイト数
    pub fn len(&self) -> u64 {
        let pending = self.pending.as_ref().map(PendingEdits::shift).unwrap_or(0);
        self.ranges.len_bytes() + pending
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 元の内容から変更されたか
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 現在の Range 集合（未確定編集は含まない）
    pub fn ranges(&self) -> &[Range] {
        self.ranges.as_slice()
    }

    pub fn has_pending_changes(&self) -> bool {
        self.pending.is_some()
    }

    /// ファイルソースから読み込んだ合計バイト数
    pub fn file_bytes_read(&self) -> u64 {
        self.sources.file_bytes_read()
    }

    /// 保持しているバッキングソースの数
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    // ========== 変更通知 ==========

    pub fn add_modify_listener<L: ModifyListener + 'static>(&mut self, listener: L) -> ListenerId {
        self.notifier.add_listener(Box::new(listener))
    }

    pub fn remove_modify_listener(&mut self, id: ListenerId) -> bool {
        self.notifier.remove_listener(id)
    }

    fn notify_listeners(&mut self) {
        self.notifier.notify();
    }

    // ========== 読み出し ==========

    /// `position` から `dst` を埋め、読み込んだバイト数を返す
    ///
    /// 未確定の編集も反映される。終端付近では要求より少なくなる。
    pub fn get(&self, dst: &mut [u8], position: u64) -> Result<usize> {
        let mut spans = Vec::new();
        self.read_into(dst, position, &mut spans)
    }

    /// `get` に加えて、編集由来データから読んだ区間を返す
    pub fn get_with_dirty_spans(
        &self,
        dst: &mut [u8],
        position: u64,
    ) -> Result<(usize, Vec<DirtySpan>)> {
        let mut spans = Vec::new();
        let filled = self.read_into(dst, position, &mut spans)?;
        Ok((filled, spans))
    }

    /// 1バイト読み出し
    pub fn byte_at(&self, position: u64) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        let filled = self.get(&mut byte, position)?;
        Ok((filled == 1).then_some(byte[0]))
    }

    fn read_into(&self, dst: &mut [u8], position: u64, spans: &mut Vec<DirtySpan>) -> Result<usize> {
        let total = self.len();
        if position >= total || dst.is_empty() {
            return Ok(0);
        }
        let wanted = (total - position).min(dst.len() as u64) as usize;
        let mut filled = 0usize;

        while filled < wanted {
            let logical = position + filled as u64;
            let chunk = &mut dst[filled..wanted];
            let copied = match &self.pending {
                Some(pending) if pending.contains(logical) => {
                    let copied = pending.copy_to(logical, chunk);
                    push_span(spans, logical, copied as u64);
                    copied
                }
                Some(pending) if logical < pending.origin() => {
                    let limit = ((pending.origin() - logical) as usize).min(chunk.len());
                    self.fill_from_ranges(&mut chunk[..limit], logical, logical, spans)?
                }
                Some(pending) => {
                    self.fill_from_ranges(chunk, logical - pending.shift(), logical, spans)?
                }
                None => self.fill_from_ranges(chunk, logical, logical, spans)?,
            };
            if copied == 0 {
                break;
            }
            filled += copied;
        }

        Ok(filled)
    }

    fn fill_from_ranges(
        &self,
        dst: &mut [u8],
        store_position: u64,
        logical_position: u64,
        spans: &mut Vec<DirtySpan>,
    ) -> Result<usize> {
        let ranges = self.ranges.as_slice();
        let mut index = self.ranges.ceiling_index(store_position);
        let mut copied = 0usize;

        while copied < dst.len() {
            let Some(range) = ranges.get(index) else {
                break;
            };
            let at = store_position + copied as u64;
            let offset = at - range.position;
            let count = (range.length - offset).min((dst.len() - copied) as u64) as usize;
            self.sources
                .read(range, offset, &mut dst[copied..copied + count])?;
            if range.dirty {
                push_span(spans, logical_position + copied as u64, count as u64);
            }
            copied += count;
            index += 1;
        }

        Ok(copied)
    }

    // ========== 編集 ==========

    /// `position` にデータを挿入し、以降を後ろへずらす
    pub fn insert<D: Into<EditData>>(&mut self, data: D, position: u64) -> Result<()> {
        match data.into() {
            EditData::Byte(byte) => self.insert_byte(byte, position),
            EditData::Bytes(bytes) => {
                if bytes.is_empty() || position > self.len() {
                    return Ok(());
                }
                let length = bytes.len() as u64;
                self.insert_source(Backing::Memory(bytes), length, position);
            }
            EditData::File(path) => {
                let file = FileSource::open(&path)?;
                if file.is_empty() || position > self.len() {
                    return Ok(());
                }
                let length = file.len();
                self.insert_source(Backing::File(file), length, position);
            }
        }
        Ok(())
    }

    fn insert_byte(&mut self, byte: u8, position: u64) {
        if position > self.len() {
            return;
        }
        self.dirty = true;
        self.before_edit(ActionKind::Insert, position, true);
        self.stage_insert(position, byte);
        if let Some(history) = self.history.as_mut() {
            history.record_inserted(position, 1);
        }
        self.last_upper_nibble = Some(position);
        self.notify_listeners();
    }

    fn insert_source(&mut self, backing: Backing, length: u64, position: u64) {
        self.dirty = true;
        self.last_upper_nibble = None;
        self.before_edit(ActionKind::Insert, position, false);
        self.commit_changes();
        let source = self.sources.push(backing);
        self.ranges
            .insert_range(Range::new(position, length, source, true));
        if let Some(history) = self.history.as_mut() {
            history.record_inserted(position, length);
        }
        self.end_action();
        self.notify_listeners();
    }

    /// `[position, position + length)` を削除し、以降を前へ詰める
    ///
    /// 終端を越える長さは終端までに切り詰める。
    pub fn delete(&mut self, position: u64, length: u64) {
        let total = self.len();
        if position >= total || length == 0 {
            return;
        }
        let length = length.min(total - position);
        let single = length == 1;
        self.dirty = true;
        self.last_upper_nibble = None;
        self.before_edit(ActionKind::Delete, position, single);

        let from_pending = self
            .pending
            .as_mut()
            .and_then(|pending| pending.remove(position, length));
        let removed = match from_pending {
            Some(bytes) => {
                if self.pending.as_ref().is_some_and(PendingEdits::is_empty) {
                    self.pending = None;
                }
                if self.history.is_some() {
                    let source = self.sources.push_memory(bytes);
                    vec![Range::new(position, length, source, true)]
                } else {
                    Vec::new()
                }
            }
            None => {
                self.commit_changes();
                self.ranges.delete_and_shift(position, length)
            }
        };
        if let Some(history) = self.history.as_mut() {
            history.record_deleted(removed);
        }
        if !single {
            self.end_action();
        }
        self.release_untracked_sources();
        self.notify_listeners();
    }

    /// `position` からデータで上書きする（長さは変わらない。終端を越えた分は伸びる）
    pub fn overwrite<D: Into<EditData>>(&mut self, data: D, position: u64) -> Result<()> {
        match data.into() {
            EditData::Byte(byte) => return self.overwrite_bits(byte, 0, 8, position),
            EditData::Bytes(bytes) => {
                if bytes.is_empty() || position >= self.len() {
                    return Ok(());
                }
                let length = bytes.len() as u64;
                self.overwrite_source(Backing::Memory(bytes), length, position);
            }
            EditData::File(path) => {
                let file = FileSource::open(&path)?;
                if file.is_empty() || position >= self.len() {
                    return Ok(());
                }
                let length = file.len();
                self.overwrite_source(Backing::File(file), length, position);
            }
        }
        Ok(())
    }

    fn overwrite_source(&mut self, backing: Backing, length: u64, position: u64) {
        self.dirty = true;
        self.last_upper_nibble = None;
        self.before_edit(ActionKind::Overwrite, position, false);
        self.commit_changes();
        let source = self.sources.push(backing);
        let range = Range::new(position, length, source, true);
        let lost = self
            .ranges
            .replace_span(position, position + length, &[range]);
        if let Some(history) = self.history.as_mut() {
            history.record_overwritten(lost, position + length);
        }
        self.end_action();
        self.release_untracked_sources();
        self.notify_listeners();
    }

    /// 1バイト内の一部のビットだけを上書きする
    ///
    /// `value` の下位 `bit_length` ビットを、上位から数えて `bit_offset` ビット目以降に書き込む。
    /// * 0000 0000 に 1111 1111, offset 0, length 8 -> 1111 1111
    /// * 0000 0000 に 1111 1111, offset 1, length 2 -> 0110 0000
    /// * 0000 0000 に stuv wxyz, offset 2, length 5 -> 00vw xyz0
    ///
    /// 上位ニブル（offset 0, length 4）の直後に同じ位置へ下位ニブル（offset 4, length 4）を
    /// 書き込んだ場合は、蓄積中のアクションの一部として扱い履歴に別途記録しない。
    /// アクションが確定済みなら通常の上書きとして記録する。
    pub fn overwrite_bits(
        &mut self,
        value: u8,
        bit_offset: u8,
        bit_length: u8,
        position: u64,
    ) -> Result<()> {
        if bit_offset > 7 || position >= self.len() {
            return Ok(());
        }
        let bit_length = bit_length.min(8 - bit_offset);
        if bit_length == 0 {
            return Ok(());
        }
        let previous = match self.byte_at(position)? {
            Some(byte) => byte,
            None => return Ok(()),
        };

        let folded = self
            .history
            .as_ref()
            .is_some_and(ActionHistory::is_accumulating)
            && self.last_upper_nibble == Some(position)
            && bit_offset == 4
            && bit_length == 4;
        self.dirty = true;
        if !folded {
            self.before_edit(ActionKind::Overwrite, position, true);
        }

        let shift = u32::from(8 - bit_offset - bit_length);
        let mask = ((0xFFu32 >> bit_offset) & (0xFFu32 << shift)) as u8;
        let updated = (previous & !mask) | (((u32::from(value) << shift) as u8) & mask);

        if !folded && self.history.is_some() {
            let lost = self.capture_byte(position, previous);
            if let Some(history) = self.history.as_mut() {
                history.record_overwritten(vec![lost], position + 1);
            }
        }
        self.stage_overwrite(position, updated);

        self.last_upper_nibble =
            (self.history.is_some() && bit_offset == 0 && bit_length == 4).then_some(position);
        self.notify_listeners();
        Ok(())
    }

    // ========== 未確定編集 ==========

    fn stage_insert(&mut self, position: u64, byte: u8) {
        if let Some(pending) = self.pending.as_mut() {
            if pending.try_insert(position, byte) {
                log::trace!("extend pending insert at {}", position);
                return;
            }
        }
        self.commit_changes();
        self.pending = Some(PendingEdits::insert(position, byte));
    }

    fn stage_overwrite(&mut self, position: u64, byte: u8) {
        if let Some(pending) = self.pending.as_mut() {
            if pending.try_overwrite(position, byte) {
                log::trace!("extend pending overwrite at {}", position);
                return;
            }
        }
        self.commit_changes();
        self.pending = Some(PendingEdits::overwrite(position, byte));
    }

    /// 上書き前の1バイトを履歴用の Range として取り込む
    fn capture_byte(&mut self, position: u64, previous: u8) -> Range {
        let store_position = match &self.pending {
            Some(pending) if pending.contains(position) => None,
            Some(pending) if position >= pending.end() => Some(position - pending.shift()),
            _ => Some(position),
        };
        let clipped = store_position.and_then(|at| self.ranges.snapshot(at, at + 1).pop());
        match clipped {
            Some(range) => range.moved_to(position),
            None => {
                let source = self.sources.push_memory(vec![previous]);
                Range::new(position, 1, source, true)
            }
        }
    }

    /// 未確定の編集を Range として確定する（何もなければ何もしない）
    pub fn commit_changes(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let (origin, bytes, mode) = pending.into_parts();
        if bytes.is_empty() {
            return;
        }
        let length = bytes.len() as u64;
        let source = self.sources.push_memory(bytes);
        let range = Range::new(origin, length, source, true);
        match mode {
            PendingMode::Insert => self.ranges.insert_range(range),
            PendingMode::Overwrite => {
                self.ranges.replace_span(origin, origin + length, &[range]);
                self.release_untracked_sources();
            }
        }
        log::debug!(
            "commit pending {:?} at {} ({} bytes)",
            mode,
            origin,
            length
        );
    }

    /// 履歴を記録していないとき、置き換えで参照が外れたソースを解放する
    fn release_untracked_sources(&mut self) {
        if self.history.is_none() {
            self.release_unreferenced_sources();
        }
    }

    /// Range 一覧と履歴のどちらからも参照されていないソースを解放する
    fn release_unreferenced_sources(&mut self) {
        let mut referenced = vec![false; self.sources.slot_count()];
        let history_ranges = self
            .history
            .iter()
            .flat_map(|history| history.referenced_ranges());
        for range in self.ranges.as_slice().iter().chain(history_ranges) {
            if let Some(flag) = referenced.get_mut(range.source.index()) {
                *flag = true;
            }
        }
        let released = self.sources.sweep(&referenced);
        if released > 0 {
            log::debug!(
                "released {} unreferenced source(s), {} remain",
                released,
                self.sources.len()
            );
        }
    }

    // ========== 履歴 ==========

    pub fn history(&self) -> Option<&ActionHistory> {
        self.history.as_ref()
    }

    /// 履歴の記録を切り替える
    pub fn set_history_enabled(&mut self, enabled: bool) {
        if enabled {
            if self.history.is_none() {
                self.commit_changes();
                self.history = Some(ActionHistory::new(self.options.merge_window()));
            }
        } else if self.history.take().is_some() {
            self.last_upper_nibble = None;
            self.release_unreferenced_sources();
        }
        self.options.history_enabled = Some(enabled);
    }

    pub fn can_undo(&self) -> bool {
        self.history.as_ref().is_some_and(ActionHistory::can_undo)
    }

    pub fn can_redo(&self) -> bool {
        self.history.as_ref().is_some_and(ActionHistory::can_redo)
    }

    fn before_edit(&mut self, kind: ActionKind, position: u64, single: bool) {
        let now = Instant::now();
        let finished = self
            .history
            .as_mut()
            .and_then(|history| history.event_pre_modify(kind, position, single, now));
        if let Some(builder) = finished {
            self.finalize(builder);
        }
    }

    /// 蓄積中のアクションを確定させる
    ///
    /// 以降の下位ニブル入力は直前の上位ニブルと合流しない。
    pub fn end_action(&mut self) {
        self.last_upper_nibble = None;
        let builder = self.history.as_mut().and_then(ActionHistory::take_current);
        if let Some(builder) = builder {
            self.finalize(builder);
        }
    }

    fn finalize(&mut self, builder: ActionBuilder) {
        self.commit_changes();
        let (start, end) = builder.span();
        let written = match builder.kind() {
            ActionKind::Delete => Vec::new(),
            ActionKind::Insert | ActionKind::Overwrite => self.ranges.snapshot(start, end),
        };
        if let Some(action) = builder.finish(written) {
            log::debug!(
                "finalize {:?} action at {} ({} bytes)",
                action.kind(),
                action.position(),
                action.captured_length()
            );
            let discarded = self
                .history
                .as_mut()
                .map_or(0, |history| history.push_action(action));
            if discarded > 0 {
                log::debug!("discarded {} redo action(s)", discarded);
                self.release_unreferenced_sources();
            }
        }
    }

    /// 直前のアクションを取り消し、影響した範囲 `(開始, 排他的終端)` を返す
    pub fn undo(&mut self) -> Option<(u64, u64)> {
        self.history.as_ref()?;
        self.end_action();
        self.commit_changes();
        let action = self.history.as_mut()?.undo_action()?;
        let span = self.revert(&action);
        log::debug!("undo {:?} -> {:?}", action.kind(), span);
        self.last_upper_nibble = None;
        self.notify_listeners();
        Some(span)
    }

    /// 取り消したアクションをやり直し、影響した範囲を返す
    pub fn redo(&mut self) -> Option<(u64, u64)> {
        self.history.as_ref()?;
        self.commit_changes();
        let action = self.history.as_mut()?.redo_action()?;
        let span = self.replay(&action);
        log::debug!("redo {:?} -> {:?}", action.kind(), span);
        self.last_upper_nibble = None;
        self.notify_listeners();
        Some(span)
    }

    fn revert(&mut self, action: &Action) -> (u64, u64) {
        let start = action.position();
        match action.kind() {
            ActionKind::Delete => {
                self.ranges.insert_ranges(action.ranges());
                (start, start + action.captured_length())
            }
            ActionKind::Insert => {
                self.ranges.delete_and_shift(start, action.captured_length());
                (start, start)
            }
            ActionKind::Overwrite => {
                self.ranges
                    .replace_span(start, start + action.written_length(), action.ranges());
                (start, start + action.captured_length())
            }
        }
    }

    fn replay(&mut self, action: &Action) -> (u64, u64) {
        let start = action.position();
        match action.kind() {
            ActionKind::Delete => {
                self.ranges.delete_and_shift(start, action.captured_length());
                (start, start)
            }
            ActionKind::Insert => {
                self.ranges.insert_ranges(action.ranges());
                (start, start + action.captured_length())
            }
            ActionKind::Overwrite => {
                self.ranges
                    .replace_span(start, start + action.captured_length(), action.written());
                (start, start + total_length(action.written()))
            }
        }
    }

    // ========== 書き出し・破棄 ==========

    /// 全内容をファイルへ書き出す（ウィンドウ単位）
    pub fn export_to_file<P: AsRef<Path>>(&mut self, path: P, cancel: &CancelFlag) -> Result<u64> {
        let length = self.len();
        io::export_range(self, path.as_ref(), 0, length, cancel)
    }

    /// 一部をファイルへ書き出す（範囲外なら何も書かず 0）
    pub fn export_range<P: AsRef<Path>>(
        &mut self,
        path: P,
        start: u64,
        length: u64,
        cancel: &CancelFlag,
    ) -> Result<u64> {
        io::export_range(self, path.as_ref(), start, length, cancel)
    }

    /// すべてのファイルハンドルを閉じて破棄する。閉じたハンドル数を返す
    pub fn dispose(mut self) -> usize {
        self.history = None;
        self.pending = None;
        self.ranges = RangeSet::new();
        let closed = self.sources.close_all();
        log::debug!("dispose: closed {} file handle(s)", closed);
        closed
    }
}

impl Default for BinaryContent {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BinaryContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryContent")
            .field("length", &self.len())
            .field("ranges", &self.ranges.count())
            .field("pending", &self.pending)
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// Range の一覧を表示
impl fmt::Display for BinaryContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BinaryContent: {{length:{}}}", self.len())?;
        for range in self.ranges.as_slice() {
            writeln!(f, "{}", range)?;
        }
        Ok(())
    }
}
