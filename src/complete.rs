// パス: src/complete.rs
// 役割: Tab-completion over dotted identifier paths in the live global namespace
// 意図: Walk tables, host directories and __index fallbacks without mutating anything
// 関連ファイル: src/value.rs, src/host.rs, src/interpreter.rs, src/repl/line_editor.rs
//! 補完候補の生成
//!
//! 手順:
//! 1. 行末から識別子・区切り（`.` `:`）の連続を探す。無ければ候補なし。
//! 2. 最後の区切りまでを `prefix_path`、残りを `partial_leaf` とする。
//! 3. それより前の部分（`leading`）は各候補の先頭にそのまま付ける。
//! 4. グローバルから `prefix_path` を 1 段ずつ辿る。途中で見つからなければ候補なし。
//! 5. 行き着いたコンテナのキーと、委譲先（`__index`）のキーを集める。
//! 6. `partial_leaf` で始まるキーだけを残す（大文字小文字を区別）。
//!
//! 補完は名前空間を読むだけで変更しない。フックの失敗は候補なしとして扱う。

use tracing::debug;

use crate::errors::EvalError;
use crate::host::Directory;
use crate::value::{Container, EntryView, Introspect, TableRef, Value};

/// 補完の対象になる文字（識別子と区切り）。
fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == ':'
}

fn is_separator(c: char) -> bool {
    c == '.' || c == ':'
}

/// 入力行を `leading` / `prefix_path` / `partial_leaf` に分けたもの。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionQuery<'a> {
    pub leading: &'a str,
    pub prefix_path: &'a str,
    pub partial_leaf: &'a str,
}

impl<'a> CompletionQuery<'a> {
    /// 行末の識別子列を切り出す。該当が無ければ `None`。
    pub fn parse(line: &'a str) -> Option<Self> {
        let start = line
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_path_char(*c))
            .last()
            .map(|(i, _)| i)?;
        let run = &line[start..];
        let split = run.rfind(is_separator).map_or(0, |i| i + 1);
        Some(Self {
            leading: &line[..start],
            prefix_path: &run[..split],
            partial_leaf: &run[split..],
        })
    }

    /// `prefix_path` の各段（末尾の区切りは除く）。
    pub fn segments(&self) -> impl Iterator<Item = &'a str> {
        self.prefix_path
            .split(is_separator)
            .filter(|s| !s.is_empty())
    }
}

/// 値を列挙可能コンテナとして見る。独自列挙があればそれを優先する。
fn as_container<I: Introspect + ?Sized>(
    v: &Value,
    hooks: &mut I,
) -> Result<Option<Box<dyn Container>>, EvalError> {
    if let Some(entries) = hooks.custom_enumerate(v) {
        return Ok(Some(Box::new(EntryView::new(entries?))));
    }
    Ok(match v {
        Value::Table(t) => Some(Box::new(t.clone())),
        Value::Host(h) => Some(Box::new(Directory::of(h))),
        _ => None,
    })
}

/// 1 段分の名前解決。コンテナ自身に無ければ委譲先を見る。
fn lookup<I: Introspect + ?Sized>(
    current: &Value,
    name: &str,
    hooks: &mut I,
) -> Result<Option<Value>, EvalError> {
    if let Some(c) = as_container(current, hooks)? {
        if let Some(v) = c.lookup(name) {
            return Ok(Some(v));
        }
    }
    match hooks.fallback_container(current) {
        Some(fallback) => Ok(as_container(&fallback, hooks)?.and_then(|c| c.lookup(name))),
        None => Ok(None),
    }
}

fn resolve<I: Introspect + ?Sized>(
    query: &CompletionQuery<'_>,
    globals: &TableRef,
    hooks: &mut I,
) -> Result<Vec<String>, EvalError> {
    let mut current = Value::Table(globals.clone());
    for seg in query.segments() {
        match lookup(&current, seg, hooks)? {
            Some(next) => current = next,
            None => return Ok(Vec::new()),
        }
    }

    let mut keys = Vec::new();
    if let Some(c) = as_container(&current, hooks)? {
        keys.extend(c.keys());
    }
    if let Some(fallback) = hooks.fallback_container(&current) {
        if let Some(c) = as_container(&fallback, hooks)? {
            keys.extend(c.keys());
        }
    }

    let head = format!("{}{}", query.leading, query.prefix_path);
    Ok(keys
        .into_iter()
        .filter(|k| k.starts_with(query.partial_leaf))
        .map(|k| format!("{}{}", head, k))
        .collect())
}

/// 入力行に対する補完候補。失敗は空リストに落とす。
///
/// # Examples
/// ```
/// use lunette::complete::complete;
/// use lunette::interpreter::Interpreter;
///
/// let mut interp = Interpreter::with_output(Box::new(std::io::sink()));
/// interp.evaluate("obj = {A = 1, b = 2, Bar = 3}").unwrap();
/// let globals = interp.globals();
/// assert_eq!(complete("x = obj.B", &globals, &mut interp), vec!["x = obj.Bar"]);
/// ```
pub fn complete<I: Introspect + ?Sized>(line: &str, globals: &TableRef, hooks: &mut I) -> Vec<String> {
    let Some(query) = CompletionQuery::parse(line) else {
        return Vec::new();
    };
    match resolve(&query, globals, hooks) {
        Ok(found) => {
            debug!(line, candidates = found.len(), "complete");
            found
        }
        Err(e) => {
            debug!(line, error = %e, "completion degraded to empty");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Interpreter;

    fn setup(src: &str) -> Interpreter {
        let mut it = Interpreter::with_output(Box::new(std::io::sink()));
        it.evaluate(src).unwrap();
        it
    }

    fn run(it: &mut Interpreter, line: &str) -> Vec<String> {
        let g = it.globals();
        complete(line, &g, it)
    }

    #[test]
    fn query_split() {
        let q = CompletionQuery::parse("print(a.b:c").unwrap();
        assert_eq!(q.leading, "print(");
        assert_eq!(q.prefix_path, "a.b:");
        assert_eq!(q.partial_leaf, "c");
        assert_eq!(q.segments().collect::<Vec<_>>(), vec!["a", "b"]);
        let q = CompletionQuery::parse("x").unwrap();
        assert_eq!((q.leading, q.prefix_path, q.partial_leaf), ("", "", "x"));
        assert!(CompletionQuery::parse("f( ").is_none());
        assert!(CompletionQuery::parse("").is_none());
    }

    #[test]
    fn all_keys_when_leaf_is_empty() {
        let mut it = setup("obj = {A = 1, b = 2, Bar = 3}");
        assert_eq!(run(&mut it, "obj."), vec!["obj.A", "obj.b", "obj.Bar"]);
    }

    #[test]
    /// 前方一致は大文字小文字を区別する。
    fn prefix_match_is_case_sensitive() {
        let mut it = setup("obj = {A = 1, b = 2, Bar = 3}");
        assert_eq!(run(&mut it, "obj.B"), vec!["obj.Bar"]);
        assert_eq!(run(&mut it, "obj.b"), vec!["obj.b"]);
    }

    #[test]
    fn broken_chain_yields_nothing() {
        let mut it = setup("obj = {n = 1}");
        assert!(run(&mut it, "xq.").is_empty());
        assert!(run(&mut it, "obj.n.").is_empty());
        assert!(run(&mut it, "obj.zz.y").is_empty());
    }

    #[test]
    fn leading_text_is_preserved() {
        let mut it = setup("config = {verbose = true}");
        assert_eq!(run(&mut it, "print(config.ve"), vec!["print(config.verbose"]);
    }

    #[test]
    /// `__index` の委譲先のキーも候補に入る。
    fn fallback_keys_are_merged() {
        let mut it = setup(
            "Base = {greet = 1} Base.__index = Base obj = setmetatable({own = 1}, Base)",
        );
        assert_eq!(run(&mut it, "obj:"), vec!["obj:own", "obj:greet", "obj:__index"]);
        assert_eq!(run(&mut it, "obj:g"), vec!["obj:greet"]);
        // 途中の段も委譲先から解決される
        assert!(run(&mut it, "obj.greet.").is_empty());
        assert_eq!(run(&mut it, "obj.__index.gr"), vec!["obj.__index.greet"]);
    }

    #[test]
    fn host_directory_hides_private_members() {
        let mut it = setup("");
        crate::builtins::register_demo(&mut it);
        let names = run(&mut it, "ST.");
        assert_eq!(names, vec!["ST.Name", "ST.String", "ST.Greet"]);
        assert!(run(&mut it, "ST.a").is_empty());
        assert_eq!(run(&mut it, "S:G"), vec!["S:Greet"]);
    }

    #[test]
    fn custom_enumerator_controls_visible_keys() {
        let mut it = setup(
            "proxy = setmetatable({hidden = 1}, {__pairs = function() return {shown = 1} end})",
        );
        assert_eq!(run(&mut it, "proxy."), vec!["proxy.shown"]);
        assert!(run(&mut it, "proxy.hidden.").is_empty());
    }

    #[test]
    fn failing_enumerator_degrades_to_empty() {
        let mut it = setup("bad = setmetatable({}, {__pairs = function() error('no') end})");
        assert!(run(&mut it, "bad.").is_empty());
    }

    #[test]
    fn globals_are_completed() {
        let mut it = setup("");
        let found = run(&mut it, "pp");
        assert_eq!(found, vec!["pprint"]);
        let found = run(&mut it, "string.up");
        assert_eq!(found, vec!["string.upper"]);
    }

    #[test]
    /// 文字列の受け手は実行時と同じく `string` ライブラリの名前を補う。
    fn string_receiver_uses_string_library() {
        let mut it = setup("s = 'hello' up = s:upper()");
        assert_eq!(it.get_global("up"), Value::str("HELLO"));
        assert_eq!(run(&mut it, "s:up"), vec!["s:upper"]);
        assert_eq!(run(&mut it, "s.le"), vec!["s.len"]);
        assert!(run(&mut it, "s:upper.").is_empty());
    }
}
