// パス: src/value.rs
// 役割: Runtime value model shared by the interpreter, formatter and completion resolver
// 意図: Give composite values a stable iteration order and a uniform enumerable surface
// 関連ファイル: src/interpreter.rs, src/host.rs, src/format.rs, src/complete.rs
//! 実行時の値表現。
//!
//! - プリミティブ（nil / 真偽 / 数値 / 文字列）は不変。
//! - テーブルは配列部（1..n）と挿入順を保つ連想部を持つ。列挙は配列部→連想部の順で安定。
//! - 関数・不透明ハンドル・ホスト値・テーブルは参照同一性（`identity`）を持ち、
//!   整形器の循環検出に使われる。
//! - `Container` は「名前で引ける・キー一覧を返せる」能力。テーブル・ホストのディレクトリ・
//!   独自列挙の結果がこれを実装し、補完が一様に辿れるようにする。
//! - `Introspect` は値ごとの独自文字列化・独自列挙・委譲先の問い合わせ口。
//!   言語側の関数を呼ぶ必要があるためインタプリタが実装する。

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::ast::FuncBody;
use crate::errors::EvalError;
use crate::host::HostRef;
use crate::interpreter::{Interpreter, Scope};

/// 組み込み関数のシグネチャ。
pub type BuiltinFn = fn(&mut Interpreter, Vec<Value>) -> Result<Vec<Value>, EvalError>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Table(TableRef),
    Function(Function),
    Host(HostRef),
    Opaque(Rc<Opaque>),
}

#[derive(Clone)]
pub enum Function {
    Closure(Rc<Closure>),
    Builtin(Rc<Builtin>),
    /// ホスト値のメソッド。第 1 引数にレシーバを受け取る。
    HostMethod(Rc<str>),
}

pub struct Closure {
    pub body: Rc<FuncBody>,
    pub env: Rc<Scope>,
}

pub struct Builtin {
    pub name: &'static str,
    pub f: BuiltinFn,
}

/// 中身を公開しないホスト側ハンドル（ファイル等）。
#[derive(Debug)]
pub struct Opaque {
    pub type_name: &'static str,
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn builtin(name: &'static str, f: BuiltinFn) -> Self {
        Value::Function(Function::Builtin(Rc::new(Builtin { name, f })))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Host(_) | Value::Opaque(_) => "userdata",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// 参照型の同一性。プリミティブは `None`。
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Table(t) => Some(t.id()),
            Value::Function(Function::Closure(c)) => Some(Rc::as_ptr(c) as *const () as usize),
            Value::Function(Function::Builtin(b)) => Some(Rc::as_ptr(b) as *const () as usize),
            Value::Function(Function::HostMethod(m)) => Some(Rc::as_ptr(m) as *const () as usize),
            Value::Host(h) => Some(h.id()),
            Value::Opaque(o) => Some(Rc::as_ptr(o) as *const () as usize),
            _ => None,
        }
    }

    /// 同一性比較（メタメソッドを介さない等価）。
    pub fn raw_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Function(Function::HostMethod(a)), Value::Function(Function::HostMethod(b))) => {
                a == b
            }
            _ => match (self.identity(), other.identity()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// メタメソッドを考慮しない既定の文字列化。
    pub fn plain_string(&self) -> String {
        match self {
            Value::Nil => "nil".into(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::Str(s) => s.to_string(),
            Value::Table(t) => format!("table: 0x{:08x}", t.id()),
            Value::Function(Function::Builtin(b)) => {
                format!("function: builtin: 0x{:08x}", Rc::as_ptr(b) as *const () as usize)
            }
            Value::Function(_) => format!("function: 0x{:08x}", self.identity().unwrap_or(0)),
            Value::Host(h) => format!("{}: 0x{:08x}", h.type_name(), h.id()),
            Value::Opaque(o) => format!("{} (0x{:08x})", o.type_name, self.identity().unwrap_or(0)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw_equal(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            other => f.write_str(&other.plain_string()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s.as_str()))
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}

/// 数値の既定表記（`%.14g` 相当）。整数値は小数点なしで出る。
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.into();
    }
    format_g(n, 14)
}

/// `%.<precision>g` 相当の書式。有限値のみを想定する。
pub fn format_g(n: f64, precision: usize) -> String {
    let precision = precision.max(1);
    let sci = format!("{:.*e}", precision - 1, n);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if exp < -4 || exp >= precision as i32 {
        let mantissa = trim_fraction(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{}e{}{:02}", mantissa, sign, exp.abs());
    }
    let decimals = (precision as i32 - 1 - exp).max(0) as usize;
    trim_fraction(&format!("{:.*}", decimals, n)).to_string()
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// 整数として扱える数値なら `i64` へ。
pub fn as_integer(n: f64) -> Option<i64> {
    if n == n.trunc() && n.abs() < 9.007_199_254_740_992e15 {
        Some(n as i64)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// テーブル

/// 連想部のキー。数値は正規化し、参照型は同一性で比較する。
#[derive(Clone, Debug)]
pub struct Key(Value);

impl Key {
    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0.raw_equal(&other.0)
    }
}
impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::Nil => 0u8.hash(state),
            Value::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Value::Number(n) => {
                2u8.hash(state);
                // -0.0 と 0.0 を同一視する
                let n = if *n == 0.0 { 0.0 } else { *n };
                n.to_bits().hash(state);
            }
            Value::Str(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Value::Function(Function::HostMethod(m)) => {
                4u8.hash(state);
                m.hash(state);
            }
            other => {
                5u8.hash(state);
                other.identity().hash(state);
            }
        }
    }
}

/// 挿入順を保つ連想配列。
#[derive(Default)]
struct OrderedMap {
    entries: Vec<(Key, Value)>,
    index: HashMap<Key, usize>,
}

impl OrderedMap {
    fn get(&self, key: &Key) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    fn insert(&mut self, key: Key, value: Value) {
        if let Some(&i) = self.index.get(&key) {
            self.entries[i].1 = value;
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
        }
    }

    fn remove(&mut self, key: &Key) -> Option<Value> {
        let i = self.index.remove(key)?;
        let (_, v) = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(v)
    }

    fn position(&self, key: &Key) -> Option<usize> {
        self.index.get(key).copied()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Default)]
pub struct Table {
    array: Vec<Value>,
    hash: OrderedMap,
    meta: Option<TableRef>,
}

impl Table {
    /// 1..=n の範囲にある整数キーなら配列添字（0 起点）を返す。
    fn array_slot(&self, key: &Value) -> Option<usize> {
        match key {
            Value::Number(n) => {
                let i = as_integer(*n)?;
                if i >= 1 && (i as usize) <= self.array.len() {
                    Some(i as usize - 1)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn get(&self, key: &Value) -> Value {
        if let Some(i) = self.array_slot(key) {
            return self.array[i].clone();
        }
        if key.is_nil() {
            return Value::Nil;
        }
        self.hash
            .get(&Key(key.clone()))
            .cloned()
            .unwrap_or(Value::Nil)
    }

    pub fn get_str(&self, key: &str) -> Value {
        self.get(&Value::str(key))
    }

    pub fn set(&mut self, key: Value, value: Value) -> Result<(), String> {
        match &key {
            Value::Nil => return Err("table index is nil".into()),
            Value::Number(n) if n.is_nan() => return Err("table index is NaN".into()),
            _ => {}
        }
        if let Some(i) = self.array_slot(&key) {
            if !value.is_nil() {
                self.array[i] = value;
            } else if i + 1 == self.array.len() {
                self.array.pop();
            } else {
                // 途中に穴を開ける場合、後続要素は連想部へ移す
                let tail: Vec<Value> = self.array.drain(i..).skip(1).collect();
                for (offset, v) in tail.into_iter().enumerate() {
                    let k = (i + 2 + offset) as f64;
                    self.hash.insert(Key(Value::Number(k)), v);
                }
            }
            return Ok(());
        }
        if let Value::Number(n) = key {
            if as_integer(n) == Some(self.array.len() as i64 + 1) && !value.is_nil() {
                self.hash.remove(&Key(key.clone()));
                self.array.push(value);
                self.migrate_from_hash();
                return Ok(());
            }
        }
        let key = Key(key);
        if value.is_nil() {
            self.hash.remove(&key);
        } else {
            self.hash.insert(key, value);
        }
        Ok(())
    }

    /// 配列部の直後に続く整数キーを連想部から配列部へ移す。
    fn migrate_from_hash(&mut self) {
        loop {
            let next = Key(Value::Number((self.array.len() + 1) as f64));
            match self.hash.remove(&next) {
                Some(v) => self.array.push(v),
                None => break,
            }
        }
    }

    /// `#t` の値（配列部の長さ）。
    pub fn border(&self) -> usize {
        self.array.len()
    }

    pub fn array(&self) -> &[Value] {
        &self.array
    }

    /// 配列部→連想部の順で全エントリを返す。
    pub fn entries(&self) -> Vec<(Value, Value)> {
        let mut out: Vec<(Value, Value)> = self
            .array
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::Number((i + 1) as f64), v.clone()))
            .collect();
        out.extend(
            self.hash
                .entries
                .iter()
                .map(|(k, v)| (k.value().clone(), v.clone())),
        );
        out
    }

    /// `next` の意味論。`Err` は列挙中に存在しないキーが渡された場合。
    pub fn next(&self, key: &Value) -> Result<Option<(Value, Value)>, String> {
        let hash_from = |start: usize| {
            self.hash
                .entries
                .get(start)
                .map(|(k, v)| (k.value().clone(), v.clone()))
        };
        if key.is_nil() {
            if let Some(v) = self.array.first() {
                return Ok(Some((Value::Number(1.0), v.clone())));
            }
            return Ok(hash_from(0));
        }
        if let Some(i) = self.array_slot(key) {
            if let Some(v) = self.array.get(i + 1) {
                return Ok(Some((Value::Number((i + 2) as f64), v.clone())));
            }
            return Ok(hash_from(0));
        }
        match self.hash.position(&Key(key.clone())) {
            Some(pos) => Ok(hash_from(pos + 1)),
            None => Err("invalid key to 'next'".into()),
        }
    }

    pub fn len_total(&self) -> usize {
        self.array.len() + self.hash.len()
    }

    pub fn insert_at(&mut self, pos: usize, value: Value) {
        let pos = pos.min(self.array.len());
        self.array.insert(pos, value);
        self.migrate_from_hash();
    }

    pub fn remove_at(&mut self, pos: usize) -> Value {
        if pos < self.array.len() {
            self.array.remove(pos)
        } else {
            Value::Nil
        }
    }
}

/// テーブルへの共有参照。
#[derive(Clone, Default)]
pub struct TableRef(Rc<RefCell<Table>>);

impl TableRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<K: Into<Value>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        let t = Self::new();
        for (k, v) in entries {
            // コンストラクタ用途ではキーは常に有効
            let _ = t.borrow_mut().set(k.into(), v.into());
        }
        t
    }

    pub fn from_array(items: impl IntoIterator<Item = Value>) -> Self {
        let t = Self::new();
        t.borrow_mut().array = items.into_iter().filter(|v| !v.is_nil()).collect();
        t
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn borrow(&self) -> Ref<'_, Table> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Table> {
        self.0.borrow_mut()
    }

    pub fn get(&self, key: &Value) -> Value {
        self.borrow().get(key)
    }

    pub fn get_str(&self, key: &str) -> Value {
        self.borrow().get_str(key)
    }

    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<(), String> {
        self.borrow_mut().set(key.into(), value.into())
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.borrow().meta.clone()
    }

    pub fn set_metatable(&self, meta: Option<TableRef>) {
        self.borrow_mut().meta = meta;
    }

    /// メタテーブル上のフィールドを引く。
    pub fn metafield(&self, name: &str) -> Option<Value> {
        let meta = self.metatable()?;
        let v = meta.get_str(name);
        (!v.is_nil()).then_some(v)
    }

    /// 全エントリを取り除く。インタプリタ終了時の循環参照解除に使う。
    pub fn clear(&self) {
        let mut t = self.borrow_mut();
        t.array.clear();
        t.hash = OrderedMap::default();
        t.meta = None;
    }
}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table: 0x{:08x}", self.id())
    }
}

// ---------------------------------------------------------------------------
// 能力（capability）

/// 名前で引けて、キー一覧を返せる列挙可能コンテナ。
pub trait Container {
    fn lookup(&self, key: &str) -> Option<Value>;
    fn keys(&self) -> Vec<String>;
}

impl Container for TableRef {
    fn lookup(&self, key: &str) -> Option<Value> {
        let v = self.get_str(key);
        (!v.is_nil()).then_some(v)
    }

    fn keys(&self) -> Vec<String> {
        string_keys(&self.borrow().entries())
    }
}

/// 独自列挙が返したエントリ列をコンテナとして扱うビュー。
#[derive(Clone, Debug, Default)]
pub struct EntryView {
    pub entries: Vec<(Value, Value)>,
}

impl EntryView {
    pub fn new(entries: Vec<(Value, Value)>) -> Self {
        Self { entries }
    }
}

impl Container for EntryView {
    fn lookup(&self, key: &str) -> Option<Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v.clone())
    }

    fn keys(&self) -> Vec<String> {
        string_keys(&self.entries)
    }
}

fn string_keys(entries: &[(Value, Value)]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|(k, _)| k.as_str().map(str::to_string))
        .collect()
}

/// 値ごとの独自文字列化・独自列挙・委譲先を問い合わせる口。
///
/// 整形器と補完はまずこれらを確認し、宣言が無ければ構造的な既定動作へ落ちる。
pub trait Introspect {
    /// 独自の文字列化を宣言していればその結果。
    fn custom_stringify(&mut self, value: &Value) -> Option<Result<String, EvalError>>;
    /// 可視エントリを差し替える独自列挙を宣言していればその結果。
    fn custom_enumerate(&mut self, value: &Value) -> Option<Result<Vec<(Value, Value)>, EvalError>>;
    /// 見つからないメンバの委譲先となる列挙可能コンテナ。
    fn fallback_container(&mut self, value: &Value) -> Option<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(x: f64) -> Value {
        Value::Number(x)
    }

    #[test]
    /// `%.14g` 相当の数値表記を確認する。
    fn number_formatting() {
        assert_eq!(number_to_string(10.0), "10");
        assert_eq!(number_to_string(-3.0), "-3");
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(0.1), "0.1");
        assert_eq!(number_to_string(1.0 / 3.0), "0.33333333333333");
        assert_eq!(number_to_string(1e100), "1e+100");
        assert_eq!(number_to_string(2.5e-7), "2.5e-07");
        assert_eq!(number_to_string(f64::INFINITY), "inf");
        assert_eq!(number_to_string(123456.789), "123456.789");
        assert_eq!(number_to_string(-0.0), "-0");
        assert_eq!(format_g(3.14159, 3), "3.14");
        assert_eq!(format_g(1234567.0, 6), "1.23457e+06");
    }

    #[test]
    /// 配列部への追加で連想部の連番キーが取り込まれる。
    fn array_part_absorbs_following_keys() {
        let t = TableRef::new();
        t.set(n(2.0), "b").unwrap();
        t.set(n(3.0), "c").unwrap();
        assert_eq!(t.borrow().border(), 0);
        t.set(n(1.0), "a").unwrap();
        assert_eq!(t.borrow().border(), 3);
        assert_eq!(t.get(&n(3.0)), Value::str("c"));
    }

    #[test]
    fn hole_moves_tail_to_hash_part() {
        let t = TableRef::from_array(vec![n(10.0), n(20.0), n(30.0)]);
        t.set(n(2.0), Value::Nil).unwrap();
        assert_eq!(t.borrow().border(), 1);
        assert_eq!(t.get(&n(3.0)), n(30.0));
        assert!(t.get(&n(2.0)).is_nil());
    }

    #[test]
    /// 列挙順は配列部→連想部（挿入順）で安定している。
    fn entries_order_is_stable() {
        let t = TableRef::from_array(vec![n(1.0), n(2.0)]);
        t.set("y", n(2.0)).unwrap();
        t.set("x", n(1.0)).unwrap();
        t.set("y", n(3.0)).unwrap();
        let keys: Vec<String> = t
            .borrow()
            .entries()
            .iter()
            .map(|(k, _)| k.plain_string())
            .collect();
        assert_eq!(keys, vec!["1", "2", "y", "x"]);
    }

    #[test]
    fn next_walks_all_entries_then_ends() {
        let t = TableRef::from_array(vec![Value::str("a")]);
        t.set("k", true).unwrap();
        let mut key = Value::Nil;
        let mut seen = Vec::new();
        while let Some((k, _)) = t.borrow().next(&key).unwrap() {
            seen.push(k.plain_string());
            key = k;
        }
        assert_eq!(seen, vec!["1", "k"]);
        assert!(t.borrow().next(&Value::str("missing")).is_err());
    }

    #[test]
    fn invalid_keys_are_rejected() {
        let t = TableRef::new();
        assert_eq!(t.set(Value::Nil, 1.0).unwrap_err(), "table index is nil");
        assert_eq!(t.set(f64::NAN, 1.0).unwrap_err(), "table index is NaN");
    }

    #[test]
    /// コンテナとしてのキー一覧は文字列キーのみ。
    fn container_keys_are_string_keys() {
        let t = TableRef::from_array(vec![n(1.0)]);
        t.set("A", 1.0).unwrap();
        t.set("b", 2.0).unwrap();
        t.set(true, 3.0).unwrap();
        assert_eq!(t.keys(), vec!["A", "b"]);
        assert_eq!(t.lookup("b"), Some(n(2.0)));
        assert_eq!(t.lookup("zz"), None);
        let view = EntryView::new(vec![(Value::str("x"), n(1.0)), (n(1.0), n(2.0))]);
        assert_eq!(view.keys(), vec!["x"]);
        assert_eq!(view.lookup("x"), Some(n(1.0)));
    }

    #[test]
    fn raw_equality_uses_identity_for_tables() {
        let a = TableRef::new();
        let b = TableRef::new();
        assert_eq!(Value::Table(a.clone()), Value::Table(a.clone()));
        assert_ne!(Value::Table(a), Value::Table(b));
        assert_eq!(Value::str("s"), Value::str("s"));
        assert_ne!(n(1.0), Value::str("1"));
    }
}
