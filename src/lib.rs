// パス: src/lib.rs
// 役割: Crate root wiring modules and exports
// 意図: Expose the interpreter, formatter, completion and REPL pieces as separate modules
// 関連ファイル: src/interpreter.rs, src/format.rs, src/complete.rs, src/repl/mod.rs
//! Lunette ルートモジュール
//!
//! 目的:
//! - 小さな Lua 風言語の上に、継続入力・整形表示・補完を備えた対話環境を提供する。
//!
//! 構成:
//! - `lexer` / `parser` / `ast` / `interpreter` / `builtins`: 組み込みインタプリタ
//! - `value` / `host`: 実行時の値とホスト値のディレクトリ
//! - `format`: 循環に強い整形表示
//! - `complete`: 名前空間を辿る補完
//! - `continuation`: 入力途中かどうかの判定
//! - `repl`: セッションと行エディタ
//!
//! 方針:
//! - コメント/ドキュメントは日本語、識別子は英語。
#![allow(unexpected_cfgs)]
#![cfg_attr(coverage, feature(coverage_attribute))]

pub mod ast;
pub mod builtins;
pub mod complete;
pub mod config;
pub mod continuation;
pub mod errors;
pub mod format;
pub mod host;
pub mod interpreter;
pub mod lexer;
pub mod logging;
pub mod parser;
pub mod repl;
pub mod value;

pub use crate::errors::{ChunkError, ErrorKind, EvalError, ReplError};
pub use crate::interpreter::Interpreter;
pub use crate::value::Value;
