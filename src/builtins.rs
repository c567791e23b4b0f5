// パス: src/builtins.rs
// 役割: Base library installed into every interpreter's global namespace
// 意図: Provide printing, table/string helpers and the demo host registrations
// 関連ファイル: src/interpreter.rs, src/format.rs, src/host.rs
//! 基本ライブラリ
//!
//! - `install` はグローバル関数と `string` / `table` / `math` / `io` テーブルを登録する。
//! - `register_demo` は起動時に見せるホスト値（`ST`, `S`）と `String` を登録する。
//! - 引数検査の失敗は `bad argument #n to 'f' (...)` の形で `EVAL030` を返す。

use std::rc::Rc;

use crate::errors::EvalError;
use crate::format::{format_value, print_values, quote_str};
use crate::host::{Directory, HostRef, Person};
use crate::interpreter::{to_number, Interpreter};
use crate::value::{as_integer, format_g, number_to_string, BuiltinFn, Introspect, Opaque, TableRef, Value};

type Ret = Result<Vec<Value>, EvalError>;

/// 基本ライブラリをグローバル名前空間へ登録する。
pub fn install(it: &mut Interpreter) {
    let globals: [(&'static str, BuiltinFn); 18] = [
        ("print", lua_print),
        ("pprint", lua_pprint),
        ("dump", lua_dump),
        ("tostring", lua_tostring),
        ("tonumber", lua_tonumber),
        ("type", lua_type),
        ("pairs", lua_pairs),
        ("ipairs", lua_ipairs),
        ("next", lua_next),
        ("select", lua_select),
        ("setmetatable", lua_setmetatable),
        ("getmetatable", lua_getmetatable),
        ("rawget", lua_rawget),
        ("rawset", lua_rawset),
        ("error", lua_error),
        ("assert", lua_assert),
        ("pcall", lua_pcall),
        ("unpack", lua_unpack),
    ];
    for (name, f) in globals {
        it.set_global(name, Value::builtin(name, f));
    }
    it.set_global("_G", Value::Table(it.globals()));
    it.set_global("_VERSION", Value::str(concat!("Lunette ", env!("CARGO_PKG_VERSION"))));

    it.set_global(
        "string",
        library(&[
            ("len", str_len),
            ("sub", str_sub),
            ("upper", str_upper),
            ("lower", str_lower),
            ("rep", str_rep),
            ("format", str_format),
        ]),
    );
    it.set_global(
        "table",
        library(&[
            ("insert", tbl_insert),
            ("remove", tbl_remove),
            ("concat", tbl_concat),
        ]),
    );
    let math = library(&[
        ("floor", math_floor),
        ("ceil", math_ceil),
        ("max", math_max),
        ("min", math_min),
        ("sqrt", math_sqrt),
        ("abs", math_abs),
    ]);
    let _ = math.set("huge", f64::INFINITY);
    let _ = math.set("pi", std::f64::consts::PI);
    it.set_global("math", math);
    let io = library(&[("write", io_write)]);
    let _ = io.set(
        "stdout",
        Value::Opaque(Rc::new(Opaque { type_name: "file" })),
    );
    it.set_global("io", io);
}

/// デモ用のホスト値を登録する。`ST` は参照的、`S` は値的なハンドル。
pub fn register_demo(it: &mut Interpreter) {
    it.set_global("ST", Value::Host(HostRef::by_reference(Person::new("Dolly", 46))));
    it.set_global("S", Value::Host(HostRef::by_value(Person::new("Joe", 32))));
    it.set_global("String", Value::builtin("String", lua_string));
}

fn library(fns: &[(&'static str, BuiltinFn)]) -> TableRef {
    let t = TableRef::new();
    for &(name, f) in fns {
        let _ = t.set(name, Value::builtin(name, f));
    }
    t
}

// ---------------------------------------------------------------------------
// 引数検査

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

fn bad_arg(i: usize, fname: &str, msg: &str) -> EvalError {
    EvalError::new(
        "EVAL030",
        format!("bad argument #{} to '{}' ({})", i + 1, fname, msg),
    )
}

fn expected(i: usize, fname: &str, what: &str, got: &Value) -> EvalError {
    bad_arg(
        i,
        fname,
        &format!("{} expected, got {}", what, got.type_name()),
    )
}

fn check_table(args: &[Value], i: usize, fname: &str) -> Result<TableRef, EvalError> {
    match args.get(i) {
        Some(Value::Table(t)) => Ok(t.clone()),
        other => Err(expected(i, fname, "table", &other.cloned().unwrap_or_default())),
    }
}

fn check_number(args: &[Value], i: usize, fname: &str) -> Result<f64, EvalError> {
    let v = arg(args, i);
    to_number(&v).ok_or_else(|| expected(i, fname, "number", &v))
}

fn opt_number(args: &[Value], i: usize, fname: &str, default: f64) -> Result<f64, EvalError> {
    match args.get(i) {
        None | Some(Value::Nil) => Ok(default),
        Some(_) => check_number(args, i, fname),
    }
}

fn check_string(args: &[Value], i: usize, fname: &str) -> Result<String, EvalError> {
    match arg(args, i) {
        Value::Str(s) => Ok(s.to_string()),
        Value::Number(n) => Ok(number_to_string(n)),
        other => Err(expected(i, fname, "string", &other)),
    }
}

// ---------------------------------------------------------------------------
// 基本関数

fn lua_print(it: &mut Interpreter, args: Vec<Value>) -> Ret {
    let mut parts = Vec::with_capacity(args.len());
    for v in &args {
        parts.push(it.tostring(v)?);
    }
    it.write_out(&format!("{}\n", parts.join("\t")))?;
    Ok(vec![])
}

fn lua_pprint(it: &mut Interpreter, args: Vec<Value>) -> Ret {
    let opts = it.format;
    print_values(it, &args, &opts)?;
    Ok(vec![])
}

/// `dump(v [, {limit = n, raw = true}])`
fn lua_dump(it: &mut Interpreter, args: Vec<Value>) -> Ret {
    let mut opts = it.format;
    if let Some(o) = args.get(1).filter(|v| !v.is_nil()) {
        let o = match o {
            Value::Table(t) => t.clone(),
            other => return Err(expected(1, "dump", "table", other)),
        };
        if let Some(limit) = to_number(&o.get_str("limit")) {
            opts.limit = limit.max(0.0) as usize;
        }
        opts.raw = o.get_str("raw").truthy();
    }
    let text = format_value(&arg(&args, 0), &opts, it);
    Ok(vec![Value::from(text)])
}

fn lua_tostring(it: &mut Interpreter, args: Vec<Value>) -> Ret {
    if args.is_empty() {
        return Err(bad_arg(0, "tostring", "value expected"));
    }
    Ok(vec![Value::from(it.tostring(&args[0])?)])
}

fn lua_tonumber(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    let v = arg(&args, 0);
    let base = opt_number(&args, 1, "tonumber", 10.0)?;
    if base == 10.0 {
        return Ok(vec![to_number(&v).map(Value::Number).unwrap_or_default()]);
    }
    if !(2.0..=36.0).contains(&base) {
        return Err(bad_arg(1, "tonumber", "base out of range"));
    }
    let text = check_string(&args, 0, "tonumber")?;
    let parsed = i64::from_str_radix(text.trim(), base as u32).ok();
    Ok(vec![parsed.map(|n| Value::Number(n as f64)).unwrap_or_default()])
}

fn lua_type(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    match args.first() {
        Some(v) => Ok(vec![Value::str(v.type_name())]),
        None => Err(bad_arg(0, "type", "value expected")),
    }
}

fn lua_next(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    let t = check_table(&args, 0, "next")?;
    let step = t.borrow().next(&arg(&args, 1));
    match step.map_err(|m| EvalError::new("EVAL031", m))? {
        Some((k, v)) => Ok(vec![k, v]),
        None => Ok(vec![Value::Nil]),
    }
}

/// `__pairs` があればそれに従う。ホスト値はディレクトリを辿る。
fn lua_pairs(it: &mut Interpreter, args: Vec<Value>) -> Ret {
    let v = arg(&args, 0);
    let next = Value::builtin("next", lua_next);
    match &v {
        Value::Table(t) => match t.metafield("__pairs") {
            Some(h) => {
                let rs = it.call(&h, vec![v.clone()])?;
                match rs.first() {
                    Some(Value::Function(_)) => Ok(rs),
                    Some(Value::Table(view)) => Ok(vec![next, Value::Table(view.clone()), Value::Nil]),
                    _ => Err(EvalError::new(
                        "EVAL016",
                        "'__pairs' must return a table or a function",
                    )),
                }
            }
            None => Ok(vec![next, v.clone(), Value::Nil]),
        },
        Value::Host(h) => {
            let view = TableRef::from_entries(Directory::of(h).entries());
            Ok(vec![next, Value::Table(view), Value::Nil])
        }
        other => Err(expected(0, "pairs", "table", other)),
    }
}

fn ipairs_step(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    let t = check_table(&args, 0, "ipairs")?;
    let i = check_number(&args, 1, "ipairs")? + 1.0;
    let v = t.get(&Value::Number(i));
    if v.is_nil() {
        Ok(vec![Value::Nil])
    } else {
        Ok(vec![Value::Number(i), v])
    }
}

fn lua_ipairs(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    let t = check_table(&args, 0, "ipairs")?;
    Ok(vec![
        Value::builtin("ipairs_step", ipairs_step),
        Value::Table(t),
        Value::Number(0.0),
    ])
}

fn lua_select(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    let rest = args.len().saturating_sub(1);
    if arg(&args, 0).as_str() == Some("#") {
        return Ok(vec![Value::Number(rest as f64)]);
    }
    let n = check_number(&args, 0, "select")?;
    let n = as_integer(n).ok_or_else(|| bad_arg(0, "select", "number has no integer representation"))?;
    let start = if n < 0 {
        rest as i64 + n
    } else if n == 0 {
        return Err(bad_arg(0, "select", "index out of range"));
    } else {
        n - 1
    };
    if start < 0 {
        return Err(bad_arg(0, "select", "index out of range"));
    }
    Ok(args.into_iter().skip(1 + start as usize).collect())
}

fn lua_setmetatable(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    let t = check_table(&args, 0, "setmetatable")?;
    match arg(&args, 1) {
        Value::Nil => t.set_metatable(None),
        Value::Table(m) => t.set_metatable(Some(m)),
        other => return Err(expected(1, "setmetatable", "nil or table", &other)),
    }
    Ok(vec![Value::Table(t)])
}

fn lua_getmetatable(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    Ok(vec![match arg(&args, 0) {
        Value::Table(t) => t.metatable().map(Value::Table).unwrap_or_default(),
        _ => Value::Nil,
    }])
}

fn lua_rawget(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    let t = check_table(&args, 0, "rawget")?;
    Ok(vec![t.get(&arg(&args, 1))])
}

fn lua_rawset(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    let t = check_table(&args, 0, "rawset")?;
    t.set(arg(&args, 1), arg(&args, 2))
        .map_err(|m| EvalError::new("EVAL007", m))?;
    Ok(vec![Value::Table(t)])
}

fn lua_error(it: &mut Interpreter, args: Vec<Value>) -> Ret {
    let msg = match arg(&args, 0) {
        Value::Nil => "nil".to_string(),
        v => it.tostring(&v)?,
    };
    Err(EvalError::new("EVAL020", msg))
}

fn lua_assert(it: &mut Interpreter, args: Vec<Value>) -> Ret {
    if arg(&args, 0).truthy() {
        return Ok(args);
    }
    let msg = match args.get(1) {
        Some(v) if !v.is_nil() => it.tostring(v)?,
        _ => "assertion failed!".to_string(),
    };
    Err(EvalError::new("EVAL021", msg))
}

fn lua_pcall(it: &mut Interpreter, args: Vec<Value>) -> Ret {
    let mut args = args.into_iter();
    let f = args.next().unwrap_or_default();
    match it.call(&f, args.collect()) {
        Ok(mut vs) => {
            vs.insert(0, Value::Bool(true));
            Ok(vs)
        }
        Err(e) => Ok(vec![Value::Bool(false), Value::str(e.message())]),
    }
}

fn lua_unpack(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    let t = check_table(&args, 0, "unpack")?;
    let border = t.borrow().border() as f64;
    let i = opt_number(&args, 1, "unpack", 1.0)?;
    let j = opt_number(&args, 2, "unpack", border)?;
    let mut out = Vec::new();
    let mut k = i;
    while k <= j {
        out.push(t.get(&Value::Number(k)));
        k += 1.0;
    }
    Ok(out)
}

/// ホスト値の `String` メソッド、またはテーブルの独自文字列化を呼ぶ。
fn lua_string(it: &mut Interpreter, args: Vec<Value>) -> Ret {
    let v = arg(&args, 0);
    if let Value::Host(h) = &v {
        return h
            .call("String", vec![])
            .map_err(|m| bad_arg(0, "String", &m));
    }
    match it.custom_stringify(&v) {
        Some(r) => Ok(vec![Value::from(r?)]),
        None => Err(expected(0, "String", "Stringer", &v)),
    }
}

// ---------------------------------------------------------------------------
// string

/// Lua の 1 起点・負数は末尾から、の添字をバイト位置へ直す。
fn byte_range(len: usize, i: f64, j: f64) -> (usize, usize) {
    let len = len as i64;
    let norm = |p: i64| if p < 0 { (len + p + 1).max(0) } else { p };
    let start = norm(i as i64).max(1);
    let end = norm(j as i64).min(len);
    if start > end {
        (0, 0)
    } else {
        (start as usize - 1, end as usize)
    }
}

fn str_len(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    let s = check_string(&args, 0, "len")?;
    Ok(vec![Value::Number(s.len() as f64)])
}

fn str_sub(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    let s = check_string(&args, 0, "sub")?;
    let i = opt_number(&args, 1, "sub", 1.0)?;
    let j = opt_number(&args, 2, "sub", -1.0)?;
    let (a, b) = byte_range(s.len(), i, j);
    let piece = String::from_utf8_lossy(&s.as_bytes()[a..b]).into_owned();
    Ok(vec![Value::from(piece)])
}

fn str_upper(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    Ok(vec![Value::from(check_string(&args, 0, "upper")?.to_uppercase())])
}

fn str_lower(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    Ok(vec![Value::from(check_string(&args, 0, "lower")?.to_lowercase())])
}

fn str_rep(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    let s = check_string(&args, 0, "rep")?;
    let n = check_number(&args, 1, "rep")?.max(0.0) as usize;
    let sep = match args.get(2) {
        None | Some(Value::Nil) => String::new(),
        Some(_) => check_string(&args, 2, "rep")?,
    };
    Ok(vec![Value::from(vec![s; n].join(&sep))])
}

/// `%[-0+ ][幅][.精度]変換` を 1 つ解釈した結果。
struct Spec {
    left: bool,
    zero: bool,
    plus: bool,
    width: usize,
    precision: Option<usize>,
}

impl Spec {
    fn pad(&self, body: String, numeric: bool) -> String {
        let len = body.chars().count();
        if len >= self.width {
            return body;
        }
        let fill = self.width - len;
        if self.left {
            format!("{}{}", body, " ".repeat(fill))
        } else if self.zero && numeric {
            match body.strip_prefix('-') {
                Some(rest) => format!("-{}{}", "0".repeat(fill), rest),
                None => format!("{}{}", "0".repeat(fill), body),
            }
        } else {
            format!("{}{}", " ".repeat(fill), body)
        }
    }

    fn signed(&self, body: String, n: f64) -> String {
        if self.plus && n >= 0.0 {
            format!("+{}", body)
        } else {
            body
        }
    }
}

fn str_format(it: &mut Interpreter, args: Vec<Value>) -> Ret {
    let fmt = check_string(&args, 0, "format")?;
    let mut out = String::new();
    let mut chars = fmt.chars().peekable();
    let mut argi = 1;
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        let mut spec = Spec {
            left: false,
            zero: false,
            plus: false,
            width: 0,
            precision: None,
        };
        while let Some(&f) = chars.peek() {
            match f {
                '-' => spec.left = true,
                '0' => spec.zero = true,
                '+' => spec.plus = true,
                ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            spec.width = spec.width * 10 + d as usize;
            chars.next();
        }
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = 0;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                p = p * 10 + d as usize;
                chars.next();
            }
            spec.precision = Some(p);
        }
        let conv = chars
            .next()
            .ok_or_else(|| bad_arg(0, "format", "invalid conversion '%' to 'format'"))?;
        let i = argi;
        argi += 1;
        let piece = match conv {
            'd' | 'i' => {
                let n = check_number(&args, i, "format")?;
                let n = as_integer(n.trunc()).ok_or_else(|| {
                    bad_arg(i, "format", "number has no integer representation")
                })?;
                spec.pad(spec.signed(n.to_string(), n as f64), true)
            }
            'x' | 'X' => {
                let n = check_number(&args, i, "format")? as i64;
                let body = if conv == 'x' {
                    format!("{:x}", n)
                } else {
                    format!("{:X}", n)
                };
                spec.pad(body, true)
            }
            'f' => {
                let n = check_number(&args, i, "format")?;
                let body = format!("{:.*}", spec.precision.unwrap_or(6), n);
                spec.pad(spec.signed(body, n), true)
            }
            'g' => {
                let n = check_number(&args, i, "format")?;
                let body = if n.is_finite() {
                    format_g(n, spec.precision.unwrap_or(6))
                } else {
                    number_to_string(n)
                };
                spec.pad(spec.signed(body, n), true)
            }
            'c' => {
                let n = check_number(&args, i, "format")? as u32;
                spec.pad(char::from_u32(n).unwrap_or('\u{fffd}').to_string(), false)
            }
            's' => {
                let mut s = it.tostring(&arg(&args, i))?;
                if let Some(p) = spec.precision {
                    s = s.chars().take(p).collect();
                }
                spec.pad(s, false)
            }
            'q' => quote_str(&check_string(&args, i, "format")?),
            other => {
                return Err(bad_arg(
                    0,
                    "format",
                    &format!("invalid conversion '%{}' to 'format'", other),
                ))
            }
        };
        out.push_str(&piece);
    }
    Ok(vec![Value::from(out)])
}

// ---------------------------------------------------------------------------
// table

fn tbl_insert(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    let t = check_table(&args, 0, "insert")?;
    let border = t.borrow().border();
    match args.len() {
        2 => {
            t.set(Value::Number((border + 1) as f64), arg(&args, 1))
                .map_err(|m| EvalError::new("EVAL007", m))?;
        }
        3 => {
            let pos = check_number(&args, 1, "insert")?;
            let pos = as_integer(pos)
                .filter(|p| *p >= 1 && *p as usize <= border + 1)
                .ok_or_else(|| bad_arg(1, "insert", "position out of bounds"))?;
            let v = arg(&args, 2);
            if !v.is_nil() {
                t.borrow_mut().insert_at(pos as usize - 1, v);
            }
        }
        _ => return Err(EvalError::new("EVAL032", "wrong number of arguments to 'insert'")),
    }
    Ok(vec![])
}

fn tbl_remove(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    let t = check_table(&args, 0, "remove")?;
    let border = t.borrow().border();
    if border == 0 {
        return Ok(vec![Value::Nil]);
    }
    let pos = opt_number(&args, 1, "remove", border as f64)?;
    let pos = as_integer(pos)
        .filter(|p| *p >= 1 && *p as usize <= border)
        .ok_or_else(|| bad_arg(1, "remove", "position out of bounds"))?;
    let removed = t.borrow_mut().remove_at(pos as usize - 1);
    Ok(vec![removed])
}

fn tbl_concat(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    let t = check_table(&args, 0, "concat")?;
    let sep = match args.get(1) {
        None | Some(Value::Nil) => String::new(),
        Some(_) => check_string(&args, 1, "concat")?,
    };
    let border = t.borrow().border() as f64;
    let i = opt_number(&args, 2, "concat", 1.0)?;
    let j = opt_number(&args, 3, "concat", border)?;
    let mut parts = Vec::new();
    let mut k = i;
    while k <= j {
        match t.get(&Value::Number(k)) {
            Value::Str(s) => parts.push(s.to_string()),
            Value::Number(n) => parts.push(number_to_string(n)),
            other => {
                return Err(EvalError::new(
                    "EVAL033",
                    format!(
                        "invalid value (at index {}) in table for 'concat' ({})",
                        number_to_string(k),
                        other.type_name()
                    ),
                ))
            }
        }
        k += 1.0;
    }
    Ok(vec![Value::from(parts.join(&sep))])
}

// ---------------------------------------------------------------------------
// math / io

fn math_floor(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    Ok(vec![Value::Number(check_number(&args, 0, "floor")?.floor())])
}

fn math_ceil(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    Ok(vec![Value::Number(check_number(&args, 0, "ceil")?.ceil())])
}

fn math_sqrt(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    Ok(vec![Value::Number(check_number(&args, 0, "sqrt")?.sqrt())])
}

fn math_abs(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    Ok(vec![Value::Number(check_number(&args, 0, "abs")?.abs())])
}

fn fold_numbers(args: &[Value], fname: &str, pick: fn(f64, f64) -> f64) -> Ret {
    let mut acc = check_number(args, 0, fname)?;
    for i in 1..args.len() {
        acc = pick(acc, check_number(args, i, fname)?);
    }
    Ok(vec![Value::Number(acc)])
}

fn math_max(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    fold_numbers(&args, "max", f64::max)
}

fn math_min(_: &mut Interpreter, args: Vec<Value>) -> Ret {
    fold_numbers(&args, "min", f64::min)
}

fn io_write(it: &mut Interpreter, args: Vec<Value>) -> Ret {
    for (i, v) in args.iter().enumerate() {
        let piece = match v {
            Value::Str(s) => s.to_string(),
            Value::Number(n) => number_to_string(*n),
            other => return Err(expected(i, "write", "string", other)),
        };
        it.write_out(&piece)?;
    }
    Ok(vec![])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::io::Write;

    #[derive(Clone, Default)]
    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn run(src: &str) -> String {
        let cap = Capture::default();
        let mut it = Interpreter::with_output(Box::new(cap.clone()));
        register_demo(&mut it);
        it.evaluate(src).unwrap();
        let out = String::from_utf8(cap.0.borrow().clone()).unwrap();
        out
    }

    #[test]
    fn print_and_pprint() {
        assert_eq!(run("print(1, 'a', nil, true)"), "1\ta\tnil\ttrue\n");
        assert_eq!(run("pprint({1, 2}, 'x')"), "{1,2}\t\"x\"\n");
        assert_eq!(run("pprint(42) print(_)"), "42\n42\n");
    }

    #[test]
    fn dump_with_options() {
        let out = run(
            "local t = setmetatable({1}, {__tostring = function() return 'T' end}) \
             print(dump(t)) print(dump(t, {raw = true})) print(dump({1, 2, 3, 4}, {limit = 4}))",
        );
        assert_eq!(out, "T\n{1}\n{1,2,...\n");
    }

    #[test]
    fn string_library_and_methods() {
        let out = run(
            "local s = 'Hello' print(s:upper(), s:lower(), #s, s:sub(2, 3), s:sub(-3)) \
             print(string.rep('ab', 3, '-'), string.format('%5.1f|%-3d|%03d|%s|%q', 3.14159, 7, 5, 'x', 'a\"b'))",
        );
        assert_eq!(
            out,
            "HELLO\thello\t5\tel\tllo\nab-ab-ab\t  3.1|7  |005|x|\"a\\\"b\"\n"
        );
    }

    #[test]
    fn table_library() {
        let out = run(
            "local t = {1, 2, 3} table.insert(t, 4) table.insert(t, 1, 0) \
             print(table.concat(t, ',')) print(table.remove(t), table.remove(t, 1), #t)",
        );
        assert_eq!(out, "0,1,2,3,4\n4\t0\t3\n");
    }

    #[test]
    fn pcall_error_and_select() {
        let out = run(
            "print(pcall(error, 'boom')) print(pcall(function(a) return a * 2 end, 21)) \
             print(select('#', 1, 2, 3), select(2, 'a', 'b', 'c'))",
        );
        assert_eq!(out, "false\tboom\ntrue\t42\n3\tb\tc\n");
    }

    #[test]
    /// ホスト値の `pairs` は公開メンバだけを辿る。
    fn pairs_over_host_lists_public_members() {
        let out = run("local ks = {} for k in pairs(ST) do ks[#ks + 1] = k end print(table.concat(ks, ' '))");
        assert_eq!(out, "Name String Greet\n");
    }

    #[test]
    fn pairs_honours_custom_enumerator() {
        let out = run(
            "local t = setmetatable({}, {__pairs = function() return {a = 1} end}) \
             for k, v in pairs(t) do print(k, v) end",
        );
        assert_eq!(out, "a\t1\n");
    }

    #[test]
    fn string_builtin_calls_host_method() {
        assert_eq!(run("print(String(ST), String(S))"), "Dolly\tJoe\n");
    }

    #[test]
    fn math_and_tonumber() {
        assert_eq!(
            run("print(math.floor(2.7), math.max(1, 5, 3), math.huge, tonumber('ff', 16), tonumber('z'))"),
            "2\t5\tinf\t255\tnil\n"
        );
    }
}
