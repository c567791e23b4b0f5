// パス: src/repl/mod.rs
// 役割: REPL module facade and re-exports
// 意図: Expose interactive entry points without leaking terminal internals
// 関連ファイル: src/repl/cmd.rs, src/repl/line_editor.rs, src/bin/lunette.rs
//! 対話環境を構成するモジュール群をまとめたファサード。
//!
//! - `cmd`: セッション状態とメインループ
//! - `line_editor`: 端末の行編集・履歴・補完
//! - `printer`: 利用者向けの定型文

pub mod cmd;
pub mod line_editor;
mod printer;

pub use cmd::{run_repl, run_repl_with, Outcome, PromptMode, ReplLineSource, Session};
pub use line_editor::{Completer, LineEditor, ReadResult};
