//! バッファモジュール
//!
//! Range によるコンテンツ表現と、その上の編集操作

pub mod content;
pub mod pending;
pub mod range;
pub mod range_set;
pub mod source;

// 公開API
pub use content::{BinaryContent, DirtySpan, EditData};
pub use pending::{PendingEdits, PendingMode};
pub use range::{total_length, Range, SourceId};
pub use range_set::RangeSet;
pub use source::{Backing, FileSource, SourceArena};
