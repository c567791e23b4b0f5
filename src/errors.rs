// パス: src/errors.rs
// 役割: Shared diagnostic records for the lexer, parser, interpreter and REPL
// 意図: Keep error codes and rendering uniform so the REPL can classify and strip them
// 関連ファイル: src/parser.rs, src/interpreter.rs, src/continuation.rs
//! エラー型の定義（共通フォーマット: \[CODE\] メッセージ）。
//!
//! - 字句・構文・実行時のエラーは `ErrorInfo` を共有する。
//! - チャンク単位で評価した結果は `ChunkError` に包み、発生元タグと行番号を前置する。
//! - 入力途中で終端に達した構文エラーは `ErrorKind::IncompleteInput` として区別する。

use std::fmt::{self, Display, Formatter};

use thiserror::Error;

/// 入力が閉じないまま終端に達したときの診断末尾。
pub const EOF_MARKER: &str = "near '<eof>'";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: &'static str,
    pub msg: String,
    pub line: Option<usize>, // 1-origin（任意）
}

impl ErrorInfo {
    pub fn new(code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            line: None,
        }
    }
    pub fn at(code: &'static str, msg: impl Into<String>, line: usize) -> Self {
        Self {
            code,
            msg: msg.into(),
            line: Some(line),
        }
    }
    /// 行番号が未設定の場合のみ補う。
    pub fn or_line(mut self, line: usize) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.msg)
    }
}

/// エラーの大分類。継続入力の判定に使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lex,
    Syntax,
    IncompleteInput,
    Runtime,
}

#[derive(Debug, Clone, Error)]
#[error("{info}")]
pub struct LexerError {
    pub info: ErrorInfo,
    /// 長括弧が閉じないまま終端に達したかどうか。
    pub at_eof: bool,
}

impl LexerError {
    pub fn at(code: &'static str, msg: impl Into<String>, line: usize) -> Self {
        Self {
            info: ErrorInfo::at(code, msg, line),
            at_eof: false,
        }
    }
    pub fn at_eof(code: &'static str, msg: impl Into<String>, line: usize) -> Self {
        Self {
            info: ErrorInfo::at(code, msg, line),
            at_eof: true,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{info}")]
pub struct ParseError {
    pub info: ErrorInfo,
    /// 終端トークンで失敗したかどうか。
    pub at_eof: bool,
}

impl ParseError {
    pub fn at(code: &'static str, msg: impl Into<String>, line: usize) -> Self {
        Self {
            info: ErrorInfo::at(code, msg, line),
            at_eof: false,
        }
    }
    pub fn at_eof(code: &'static str, msg: impl Into<String>, line: usize) -> Self {
        Self {
            info: ErrorInfo::at(code, msg, line),
            at_eof: true,
        }
    }
}

impl From<LexerError> for ParseError {
    fn from(e: LexerError) -> Self {
        Self {
            info: e.info,
            at_eof: e.at_eof,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct EvalError(pub ErrorInfo);

impl EvalError {
    pub fn new(code: &'static str, msg: impl Into<String>) -> Self {
        Self(ErrorInfo::new(code, msg))
    }
    pub fn message(&self) -> &str {
        &self.0.msg
    }
    /// 行番号が未設定の場合のみ補う（最も内側の文の行が残る）。
    pub fn or_line(self, line: usize) -> Self {
        Self(self.0.or_line(line))
    }
}

/// 1 回の `evaluate` 呼び出しで発生したエラー。発生元タグ付きで表示される。
#[derive(Debug, Clone, Error)]
pub struct ChunkError {
    pub origin: String,
    pub kind: ErrorKind,
    pub info: ErrorInfo,
}

impl ChunkError {
    pub fn from_parse(origin: &str, e: ParseError) -> Self {
        let kind = if e.at_eof {
            ErrorKind::IncompleteInput
        } else if e.info.code.starts_with("LEX") {
            ErrorKind::Lex
        } else {
            ErrorKind::Syntax
        };
        Self {
            origin: origin.to_string(),
            kind,
            info: e.info,
        }
    }
    pub fn from_eval(origin: &str, e: EvalError) -> Self {
        Self {
            origin: origin.to_string(),
            kind: ErrorKind::Runtime,
            info: e.0,
        }
    }
    pub fn is_incomplete(&self) -> bool {
        self.kind == ErrorKind::IncompleteInput
    }
}

impl Display for ChunkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // 発生元タグ: `[chunk "stdin"]:3: ` の形式
        match self.info.line {
            Some(l) => write!(f, "[chunk \"{}\"]:{}: {}", self.origin, l, self.info),
            None => write!(f, "[chunk \"{}\"]: {}", self.origin, self.info),
        }
    }
}

/// REPL セッション全体を止める失敗。評価エラーはここに含まれない。
#[derive(Debug, Error)]
pub enum ReplError {
    /// 名前空間の準備や初期スクリプトの読み込みに失敗した。
    #[error("initial error: {0}")]
    Startup(ChunkError),
    #[error("input error: {0}")]
    Io(#[from] std::io::Error),
    /// ループ内の想定外の失敗（panic）。後始末は済んでいる。
    #[error("runtime error: {0}")]
    Panic(String),
}
