//! 編集履歴（アンドゥ・リドゥ）
//!
//! 細かな編集を「アクション」にまとめて記録する。同種・同方向・マージウィンドウ内の
//! 1バイト編集は1つのアクションに合流し、それ以外の編集で確定する。
//! 記録するのはストアから取り込んだ Range のコピーだけで、ストア本体には依存しない。

use std::time::{Duration, Instant};

use crate::buffer::range::{total_length, Range};

/// アクション種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Delete,
    Insert,
    Overwrite,
}

/// 確定済みのアクション
///
/// * `Delete`: `ranges` は削除されたデータ
/// * `Insert`: `ranges` は挿入されたデータ
/// * `Overwrite`: `ranges` は上書き前のデータ、`written` は上書き後のデータ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    kind: ActionKind,
    ranges: Vec<Range>,
    written: Vec<Range>,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn written(&self) -> &[Range] {
        &self.written
    }

    /// アクションの開始位置
    pub fn position(&self) -> u64 {
        self.ranges.first().map(|range| range.position).unwrap_or(0)
    }

    /// 取り込んだデータのバイト数
    pub fn captured_length(&self) -> u64 {
        total_length(&self.ranges)
    }

    pub fn written_length(&self) -> u64 {
        total_length(&self.written)
    }
}

/// 蓄積中のアクション
#[derive(Debug, Clone)]
pub struct ActionBuilder {
    kind: ActionKind,
    single: bool,
    start: u64,
    end: u64,
    captured: Vec<Range>,
}

impl ActionBuilder {
    fn new(kind: ActionKind, position: u64, single: bool) -> Self {
        Self {
            kind,
            single,
            start: position,
            end: position,
            captured: Vec::new(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// 影響範囲 `[start, end)`（挿入・上書きでは確定時にこの範囲を取り込む）
    pub fn span(&self) -> (u64, u64) {
        (self.start, self.end)
    }

    /// 確定する。`written` は確定時点での `span()` のスナップショット
    ///
    /// 何も記録されていなければ `None`。
    pub fn finish(self, written: Vec<Range>) -> Option<Action> {
        let (ranges, written) = match self.kind {
            ActionKind::Insert => (written, Vec::new()),
            ActionKind::Delete => (self.captured, Vec::new()),
            ActionKind::Overwrite => (self.captured, written),
        };
        if ranges.is_empty() {
            return None;
        }
        Some(Action {
            kind: self.kind,
            ranges,
            written,
        })
    }
}

/// アクション履歴
#[derive(Debug, Clone)]
pub struct ActionHistory {
    actions: Vec<Action>,
    /// 実行済みとアンドゥ済みの境界
    actions_index: usize,
    current: Option<ActionBuilder>,
    merge_window: Duration,
    last_edit: Option<Instant>,
}

impl ActionHistory {
    pub fn new(merge_window: Duration) -> Self {
        Self {
            actions: Vec::new(),
            actions_index: 0,
            current: None,
            merge_window,
            last_edit: None,
        }
    }

    pub fn merge_window(&self) -> Duration {
        self.merge_window
    }

    pub fn can_undo(&self) -> bool {
        self.current.is_some() || self.actions_index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current.is_none() && self.actions_index < self.actions.len()
    }

    pub fn is_accumulating(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&ActionBuilder> {
        self.current.as_ref()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn actions_index(&self) -> usize {
        self.actions_index
    }

    /// 編集直前に呼ぶ
    ///
    /// 現在のアクションに合流できなければ新しいアクションを開始し、
    /// それまで蓄積していたアクションを返す（呼び出し側で確定させる）。
    pub fn event_pre_modify(
        &mut self,
        kind: ActionKind,
        position: u64,
        single: bool,
        now: Instant,
    ) -> Option<ActionBuilder> {
        let finished = if self.extends_current(kind, position, single, now) {
            None
        } else {
            self.current
                .replace(ActionBuilder::new(kind, position, single))
        };
        self.last_edit = Some(now);
        finished
    }

    fn extends_current(&self, kind: ActionKind, position: u64, single: bool, now: Instant) -> bool {
        let Some(current) = &self.current else {
            return false;
        };
        if !single || !current.single || current.kind != kind {
            return false;
        }
        if let Some(last) = self.last_edit {
            if now.saturating_duration_since(last) > self.merge_window {
                return false;
            }
        }
        match kind {
            ActionKind::Insert | ActionKind::Overwrite => current.end == position,
            ActionKind::Delete => {
                current.start == position || current.start.checked_sub(1) == Some(position)
            }
        }
    }

    /// 挿入の範囲を記録（データは確定時にスナップショットする）
    pub fn record_inserted(&mut self, position: u64, length: u64) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        if current.start == current.end {
            current.start = position;
            current.end = position;
        }
        current.end += length;
    }

    /// 削除されたデータを記録
    ///
    /// 取り込んだデータが常に位置の昇順になるよう、バックスペース方向なら先頭に、
    /// 前方削除なら末尾に（位置を付け替えて）追加する。
    pub fn record_deleted(&mut self, removed: Vec<Range>) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        let Some(first) = removed.first() else {
            return;
        };
        let position = first.position;
        let length = total_length(&removed);

        if current.captured.is_empty() {
            current.start = position;
            current.end = position + length;
            current.captured = removed;
        } else if position + length == current.start {
            current.start = position;
            current.captured.splice(0..0, removed);
        } else {
            let base = current.end;
            current
                .captured
                .extend(removed.iter().map(|r| r.moved_to(base + (r.position - position))));
            current.end += length;
        }
    }

    /// 上書き前のデータを記録
    pub fn record_overwritten(&mut self, lost: Vec<Range>, written_end: u64) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        current.captured.extend(lost);
        current.end = current.end.max(written_end);
    }

    /// 蓄積中のアクションを取り出す
    pub fn take_current(&mut self) -> Option<ActionBuilder> {
        self.current.take()
    }

    /// 確定したアクションを追加（リドゥ可能な末尾は破棄）し、破棄した数を返す
    pub fn push_action(&mut self, action: Action) -> usize {
        let discarded = self.actions.len() - self.actions_index;
        self.actions.truncate(self.actions_index);
        self.actions.push(action);
        self.actions_index = self.actions.len();
        discarded
    }

    /// 履歴が保持しているすべての Range（蓄積中のものを含む）
    pub fn referenced_ranges(&self) -> impl Iterator<Item = &Range> + '_ {
        self.actions
            .iter()
            .flat_map(|action| action.ranges.iter().chain(action.written.iter()))
            .chain(self.current.iter().flat_map(|current| current.captured.iter()))
    }

    /// アンドゥ対象のアクション（蓄積中のものは先に確定させておくこと）
    pub fn undo_action(&mut self) -> Option<Action> {
        if self.current.is_some() || self.actions_index == 0 {
            return None;
        }
        self.actions_index -= 1;
        Some(self.actions[self.actions_index].clone())
    }

    pub fn redo_action(&mut self) -> Option<Action> {
        if !self.can_redo() {
            return None;
        }
        let action = self.actions[self.actions_index].clone();
        self.actions_index += 1;
        Some(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::range::SourceId;

    const WINDOW: Duration = Duration::from_millis(1500);

    fn byte(position: u64, source: usize) -> Range {
        Range::new(position, 1, SourceId(source), true)
    }

    fn finish(history: &mut ActionHistory, builder: ActionBuilder) {
        let (start, end) = builder.span();
        let written = vec![Range::new(start, end - start, SourceId(99), true)];
        if let Some(action) = builder.finish(written) {
            history.push_action(action);
        }
    }

    #[test]
    fn test_forward_typing_merges_within_window() {
        let mut history = ActionHistory::new(WINDOW);
        let t0 = Instant::now();
        for i in 0..5u64 {
            let now = t0 + Duration::from_millis(100 * i);
            assert!(history
                .event_pre_modify(ActionKind::Insert, 10 + i, true, now)
                .is_none());
            history.record_inserted(10 + i, 1);
        }
        assert_eq!(history.current().unwrap().span(), (10, 15));
        assert!(history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_pause_longer_than_window_splits() {
        let mut history = ActionHistory::new(WINDOW);
        let t0 = Instant::now();
        history.event_pre_modify(ActionKind::Insert, 0, true, t0);
        history.record_inserted(0, 1);

        let later = t0 + WINDOW + Duration::from_millis(1);
        let finished = history
            .event_pre_modify(ActionKind::Insert, 1, true, later)
            .expect("previous action finalized");
        assert_eq!(finished.span(), (0, 1));
    }

    #[test]
    fn test_kind_change_and_gap_split() {
        let mut history = ActionHistory::new(WINDOW);
        let now = Instant::now();
        history.event_pre_modify(ActionKind::Insert, 0, true, now);
        history.record_inserted(0, 1);
        assert!(history
            .event_pre_modify(ActionKind::Overwrite, 1, true, now)
            .is_some());
        history.record_overwritten(vec![byte(1, 0)], 2);
        assert!(history
            .event_pre_modify(ActionKind::Overwrite, 5, true, now)
            .is_some());
        assert!(history
            .event_pre_modify(ActionKind::Overwrite, 6, false, now)
            .is_some());
    }

    #[test]
    fn test_backspace_prepends_in_position_order() {
        let mut history = ActionHistory::new(WINDOW);
        let now = Instant::now();
        for (position, source) in [(5u64, 0usize), (4, 1), (3, 2)] {
            history.event_pre_modify(ActionKind::Delete, position, true, now);
            history.record_deleted(vec![byte(position, source)]);
        }
        let builder = history.take_current().unwrap();
        assert_eq!(builder.span(), (3, 6));
        let action = builder.finish(Vec::new()).unwrap();
        let layout: Vec<_> = action
            .ranges()
            .iter()
            .map(|r| (r.position, r.source.index()))
            .collect();
        assert_eq!(layout, vec![(3, 2), (4, 1), (5, 0)]);
    }

    #[test]
    fn test_forward_delete_appends_with_new_positions() {
        let mut history = ActionHistory::new(WINDOW);
        let now = Instant::now();
        for source in 0..3usize {
            history.event_pre_modify(ActionKind::Delete, 7, true, now);
            history.record_deleted(vec![byte(7, source)]);
        }
        let action = history.take_current().unwrap().finish(Vec::new()).unwrap();
        let positions: Vec<_> = action.ranges().iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![7, 8, 9]);
        assert_eq!(action.captured_length(), 3);
    }

    #[test]
    fn test_undo_redo_cursor_and_branch_discard() {
        let mut history = ActionHistory::new(WINDOW);
        let now = Instant::now();
        for position in [0u64, 10, 20] {
            if let Some(done) = history.event_pre_modify(ActionKind::Insert, position, false, now) {
                finish(&mut history, done);
            }
            history.record_inserted(position, 2);
            let done = history.take_current().unwrap();
            finish(&mut history, done);
        }
        assert_eq!(history.actions().len(), 3);

        assert_eq!(history.undo_action().unwrap().position(), 20);
        assert_eq!(history.undo_action().unwrap().position(), 10);
        assert!(history.can_redo());
        assert_eq!(history.redo_action().unwrap().position(), 10);

        history.event_pre_modify(ActionKind::Insert, 3, false, now);
        assert!(!history.can_redo());
        history.record_inserted(3, 1);
        let done = history.take_current().unwrap();
        let (start, end) = done.span();
        let action = done
            .finish(vec![Range::new(start, end - start, SourceId(9), true)])
            .unwrap();
        assert_eq!(history.push_action(action), 1);

        assert_eq!(history.actions().len(), 3);
        assert_eq!(history.actions_index(), 3);
        assert!(history.redo_action().is_none());
    }

    #[test]
    fn test_referenced_ranges_cover_actions_and_current() {
        let mut history = ActionHistory::new(WINDOW);
        let now = Instant::now();
        history.event_pre_modify(ActionKind::Overwrite, 4, false, now);
        history.record_overwritten(vec![byte(4, 1)], 5);
        let done = history.take_current().unwrap();
        let action = done.finish(vec![byte(4, 2)]).unwrap();
        assert_eq!(history.push_action(action), 0);

        history.event_pre_modify(ActionKind::Delete, 0, true, now);
        history.record_deleted(vec![byte(0, 3)]);

        let mut sources: Vec<usize> = history
            .referenced_ranges()
            .map(|range| range.source.index())
            .collect();
        sources.sort_unstable();
        assert_eq!(sources, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_history_has_nothing_to_do() {
        let mut history = ActionHistory::new(WINDOW);
        assert!(!history.can_undo());
        assert!(history.undo_action().is_none());
        assert!(history.redo_action().is_none());
    }

    #[test]
    fn test_builder_without_data_is_dropped() {
        let builder = ActionBuilder::new(ActionKind::Delete, 4, true);
        assert!(builder.finish(Vec::new()).is_none());
    }
}
