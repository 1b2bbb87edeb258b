//! エディタモジュール
//!
//! 編集履歴と変更通知

pub mod change_notifier;
pub mod history;

// 公開API
pub use change_notifier::{ListenerId, ModifyListener, ModifyNotifier, ModifyNotifierStats};
pub use history::{Action, ActionBuilder, ActionHistory, ActionKind};
