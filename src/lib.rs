//! binedit - Range-based editable binary content
//!
//! 巨大なバイナリファイルを全読み込みせずに編集し、アクション単位で取り消せる。

// コアモジュール
pub mod config;
pub mod error;
pub mod logging;

// データ層
pub mod buffer;
pub mod file;

// 編集層
pub mod editor;

// 公開API
pub use buffer::{BinaryContent, DirtySpan, EditData, Range};
pub use config::ContentOptions;
pub use editor::{ActionKind, ListenerId, ModifyListener};
pub use error::{BinaryError, Result};
pub use file::CancelFlag;
