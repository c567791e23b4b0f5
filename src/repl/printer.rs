// パス: src/repl/printer.rs
// 役割: Banner and fixed user-facing messages of the REPL
// 意図: Keep interactive messaging consistent across the loop and its exit paths
// 関連ファイル: src/repl/cmd.rs, src/format.rs
//! REPL が利用者へ出す定型文をまとめたモジュール。
//! 値そのものの整形は `crate::format` が担い、ここでは扱わない。

use std::io::{self, Write};

pub(crate) const EMPTY_LINE_HINT: &str = "empty line, use exit to quit";

/// 起動時の案内。
pub(crate) fn render_banner<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(
        out,
        "Lunette {} :: =EXPR pretty-prints :: .EXPR prints :: exit quits",
        env!("CARGO_PKG_VERSION")
    )
}

/// 空行に対する案内。
pub(crate) fn render_hint<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "{}", EMPTY_LINE_HINT)
}

/// 評価エラー（発生元タグは除去済み）を 1 行で出す。
pub(crate) fn render_error<W: Write>(out: &mut W, text: &str) -> io::Result<()> {
    writeln!(out, "{}", text)
}
