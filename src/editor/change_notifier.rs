//! 変更通知システム
//!
//! コンテンツが変更されるたびに登録済みリスナーへ同期的に通知する。
//! 通知は「何かが変わった」ことだけを伝え、リスナー側で内容を再取得する。

use std::time::{Duration, Instant};

/// リスナーの一意識別子
pub type ListenerId = usize;

/// 変更リスナー
pub trait ModifyListener {
    /// コンテンツが変更された直後に呼ばれる
    fn modified(&mut self);
}

impl<F: FnMut()> ModifyListener for F {
    fn modified(&mut self) {
        self()
    }
}

/// 変更通知システムの統計情報
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifyNotifierStats {
    /// 登録中のリスナー数
    pub total_listeners: usize,
    /// 配信した通知の数
    pub events_dispatched: usize,
    /// 最大配信時間
    pub max_dispatch_time: Duration,
}

pub struct ModifyNotifier {
    listeners: Vec<(ListenerId, Box<dyn ModifyListener>)>,
    next_listener_id: ListenerId,
    stats: ModifyNotifierStats,
}

impl ModifyNotifier {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_listener_id: 0,
            stats: ModifyNotifierStats::default(),
        }
    }

    /// リスナーを追加（登録順に呼ばれる）
    pub fn add_listener(&mut self, listener: Box<dyn ModifyListener>) -> ListenerId {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        self.listeners.push((id, listener));
        self.stats.total_listeners = self.listeners.len();
        id
    }

    /// リスナーを削除
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.stats.total_listeners = self.listeners.len();
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// 変更を通知
    pub fn notify(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        let start = Instant::now();
        for (_, listener) in &mut self.listeners {
            listener.modified();
        }
        let elapsed = start.elapsed();
        self.stats.events_dispatched += 1;
        if elapsed > self.stats.max_dispatch_time {
            self.stats.max_dispatch_time = elapsed;
        }
    }

    pub fn stats(&self) -> &ModifyNotifierStats {
        &self.stats
    }
}

impl Default for ModifyNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ModifyNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModifyNotifier")
            .field("listeners", &self.listeners.len())
            .field("stats", &self.stats)
            .finish()
    }
}
