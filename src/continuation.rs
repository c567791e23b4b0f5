// パス: src/continuation.rs
// 役割: Decide whether a failed evaluation needs more input or is a real error
// 意図: Keep the end-of-input convention in one swappable place, away from the REPL loop
// 関連ファイル: src/errors.rs, src/repl/cmd.rs, src/config.rs
//! 継続入力の判定
//!
//! - `Structured`: 構文解析器が付けた `ErrorKind::IncompleteInput` を見る（既定）。
//! - `Suffix`: 表示文字列の末尾が `near '<eof>'` かどうかを見る。
//!   診断文言の慣習に依存するため、構造化された種別が使えない場合の代替。
//!
//! どちらの戦略でも、実行時エラーのメッセージが偶然 `<eof>` を含むだけでは継続扱いしない
//! （`Suffix` は末尾一致なので、メッセージ途中の一致は無視される）。

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::errors::{ChunkError, EOF_MARKER};

/// 判定結果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// 構文が閉じていない。エラーは表示せず続きの行を待つ。
    Incomplete,
    /// 利用者へ報告すべきエラー。
    Real,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    #[default]
    Structured,
    Suffix,
}

impl Strategy {
    /// エラーを分類する。`text` は発生元タグを除いた表示文字列。
    pub fn classify(self, err: &ChunkError, text: &str) -> Classification {
        let c = match self {
            Strategy::Structured => {
                if err.is_incomplete() {
                    Classification::Incomplete
                } else {
                    Classification::Real
                }
            }
            Strategy::Suffix => classify_text(text),
        };
        debug!(strategy = %self, kind = ?err.kind, result = ?c, "classify");
        c
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Structured => "structured",
            Strategy::Suffix => "suffix",
        })
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structured" => Ok(Strategy::Structured),
            "suffix" => Ok(Strategy::Suffix),
            other => Err(format!(
                "unknown continuation strategy '{}' (expected 'structured' or 'suffix')",
                other
            )),
        }
    }
}

/// 文字列だけで判定する（末尾一致）。
pub fn classify_text(text: &str) -> Classification {
    if text.trim_end().ends_with(EOF_MARKER) {
        Classification::Incomplete
    } else {
        Classification::Real
    }
}

const ORIGIN_OPEN: &str = "[chunk \"";

/// 先頭の発生元タグ（`[chunk "stdin"]:3: ` または `[chunk "stdin"]: `）を取り除く。
pub fn strip_origin(text: &str) -> &str {
    let Some(rest) = text.strip_prefix(ORIGIN_OPEN) else {
        return text;
    };
    let Some(close) = rest.find("\"]") else {
        return text;
    };
    let after = &rest[close + 2..];
    let Some(sep) = after.find(": ") else {
        return text;
    };
    let line_part = &after[..sep];
    let is_line = line_part.is_empty()
        || line_part
            .strip_prefix(':')
            .is_some_and(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()));
    if is_line {
        &after[sep + 2..]
    } else {
        text
    }
}
