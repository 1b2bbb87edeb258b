//! ファイル操作モジュール

pub mod io;

pub use io::{export_range, CancelFlag};
