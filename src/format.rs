// パス: src/format.rs
// 役割: Cycle-safe, token-bounded pretty printer for runtime values
// 意図: Render any value (including cyclic tables and host objects) as one readable line
// 関連ファイル: src/value.rs, src/interpreter.rs, src/builtins.rs
//! 値の整形（pretty printer）
//!
//! - 葉の値は `quote` で 1 トークンにする。文字列は再解析できる形でエスケープする。
//! - テーブル・ホスト値は `{...}` に展開する。配列部は位置のみ、連想部は `key=value`。
//! - 1 回の `format_value` 呼び出しの間、展開済みの合成値は訪問済み集合に入り、
//!   再び現れた箇所には `<cycle>` を出す（同じ値を 2 箇所から参照した場合も同様）。
//! - 出力トークン数が `limit` を超えた時点で `...` を付けて打ち切る。エラーではない。

use std::collections::HashSet;

use crate::errors::EvalError;
use crate::interpreter::Interpreter;
use crate::value::{Introspect, Value};

pub const CYCLE_MARKER: &str = "<cycle>";
pub const TRUNCATION_MARKER: &str = "...";
pub const FUNCTION_PLACEHOLDER: &str = "<fun>";
pub const OPAQUE_PLACEHOLDER: &str = "<udata>";
pub const DEFAULT_LIMIT: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatOptions {
    /// 打ち切りまでに出力できるトークン数。
    pub limit: usize,
    /// 真なら独自の文字列化を無視し、テーブルは生の中身を展開する。
    pub raw: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            raw: false,
        }
    }
}

/// 文字列を二重引用符で囲み、字句解析器が元に戻せる形へエスケープする。
pub fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            // 後続の数字を吸収しないよう常に 3 桁
            c if c.is_ascii_control() => out.push_str(&format!("\\{:03}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// 葉の値の 1 トークン表現。
pub fn quote(v: &Value) -> String {
    match v {
        Value::Str(s) => quote_str(s),
        Value::Function(_) => FUNCTION_PLACEHOLDER.to_string(),
        Value::Host(_) | Value::Opaque(_) => OPAQUE_PLACEHOLDER.to_string(),
        other => other.plain_string(),
    }
}

/// トークン上限に達したことを伝える内部シグナル。
struct Truncated;

struct Dumper<'a, I: Introspect + ?Sized> {
    hooks: &'a mut I,
    opts: FormatOptions,
    tokens: Vec<String>,
    visited: HashSet<usize>,
}

impl<'a, I: Introspect + ?Sized> Dumper<'a, I> {
    fn put(&mut self, tok: impl Into<String>) -> Result<(), Truncated> {
        self.tokens.push(tok.into());
        if self.tokens.len() > self.opts.limit {
            self.tokens.push(TRUNCATION_MARKER.to_string());
            return Err(Truncated);
        }
        Ok(())
    }

    fn value(&mut self, v: &Value) -> Result<(), Truncated> {
        match v {
            Value::Table(_) | Value::Host(_) => {
                let seen = v.identity().is_some_and(|id| self.visited.contains(&id));
                if seen {
                    self.put(CYCLE_MARKER)
                } else {
                    self.composite(v)
                }
            }
            leaf => self.put(quote(leaf)),
        }
    }

    fn composite(&mut self, v: &Value) -> Result<(), Truncated> {
        if !self.opts.raw {
            if let Some(r) = self.hooks.custom_stringify(v) {
                return self.put(hook_text(r));
            }
        }
        let custom = match v {
            Value::Table(_) if self.opts.raw => None,
            _ => self.hooks.custom_enumerate(v),
        };
        let entries = match custom {
            Some(Ok(entries)) => entries,
            Some(Err(e)) => return self.put(hook_text(Err(e))),
            None => match v {
                Value::Table(t) => t.borrow().entries(),
                leaf => return self.put(quote(leaf)),
            },
        };
        if let Some(id) = v.identity() {
            self.visited.insert(id);
        }
        self.put("{")?;
        let mut next_position = 1.0;
        let mut positional = true;
        for (i, (k, val)) in entries.iter().enumerate() {
            if i > 0 {
                self.put(",")?;
            }
            // 先頭から 1, 2, 3... と続く整数キーは位置だけで表す
            if positional && matches!(k, Value::Number(n) if *n == next_position) {
                next_position += 1.0;
            } else {
                positional = false;
                let key = self.key_token(k);
                self.put(format!("{}=", key))?;
            }
            self.value(val)?;
        }
        self.put("}")
    }

    fn key_token(&mut self, k: &Value) -> String {
        match k {
            Value::Str(s) if s.chars().any(char::is_whitespace) => quote_str(s),
            Value::Str(s) => s.to_string(),
            other => {
                let text = match self.hooks.custom_stringify(other) {
                    Some(r) => hook_text(r),
                    None => other.plain_string(),
                };
                format!("[{}]", text)
            }
        }
    }
}

fn hook_text(r: Result<String, EvalError>) -> String {
    match r {
        Ok(s) => s,
        Err(e) => format!("<error: {}>", e.message()),
    }
}

/// 値を 1 行のテキストへ整形する。
///
/// # Examples
/// ```
/// use lunette::format::{format_value, FormatOptions};
/// use lunette::interpreter::Interpreter;
/// use lunette::value::{TableRef, Value};
///
/// let mut interp = Interpreter::with_output(Box::new(std::io::sink()));
/// let t = TableRef::from_array(vec![Value::Number(10.0), Value::Number(20.0)]);
/// let text = format_value(&Value::Table(t), &FormatOptions::default(), &mut interp);
/// assert_eq!(text, "{10,20}");
/// ```
pub fn format_value<I: Introspect + ?Sized>(
    value: &Value,
    opts: &FormatOptions,
    hooks: &mut I,
) -> String {
    let mut d = Dumper {
        hooks,
        opts: *opts,
        tokens: Vec::new(),
        visited: HashSet::new(),
    };
    // 打ち切り時もそこまでのトークンと `...` は残っている
    let _ = d.value(value);
    d.tokens.concat()
}

/// 各値を整形してタブ区切りで出力し、先頭の値を `_` へ束縛する。
pub fn print_values(
    interp: &mut Interpreter,
    values: &[Value],
    opts: &FormatOptions,
) -> Result<(), EvalError> {
    interp.set_global("_", values.first().cloned().unwrap_or_default());
    let parts: Vec<String> = values
        .iter()
        .map(|v| format_value(v, opts, interp))
        .collect();
    interp.write_out(&format!("{}\n", parts.join("\t")))
}
