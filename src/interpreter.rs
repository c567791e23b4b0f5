// パス: src/interpreter.rs
// 役割: Tree-walking interpreter over the AST with a table-backed global namespace
// 意図: Serve as the Evaluate(code) collaborator of the REPL and answer value hooks
// 関連ファイル: src/parser.rs, src/value.rs, src/builtins.rs, src/format.rs
//! 評価器（interpreter）
//!
//! 目的:
//! - バッファ全体を構文解析してから実行する。構文解析に失敗した入力は一切実行されない。
//! - グローバル名前空間はテーブル 1 つで表現し、整形器と補完はこれを読むだけ。
//!
//! 仕様要点:
//! - ローカル変数は `local` 文ごとに子スコープを作る（同名の再宣言は外側を隠す）。
//! - 実行時エラーは最も内側の文の行番号を持つ。
//! - 呼び出しの深さは `MAX_CALL_DEPTH` で打ち切り、通常の実行時エラーとして返す。
//! - `close` は到達可能なテーブルとスコープを空にして参照循環を断つ。以後の評価はエラー。

use std::cell::RefCell;
use std::collections::HashSet;
use std::io::{self, Write};
use std::rc::Rc;

use tracing::debug;

use crate::ast::{BinOp, Block, Expr, Field, FuncBody, Stat, StatKind, UnOp};
use crate::errors::{ChunkError, EvalError};
use crate::format::FormatOptions;
use crate::host::Directory;
use crate::parser::parse_chunk;
use crate::value::{number_to_string, Closure, Function, Introspect, TableRef, Value};

/// 関数呼び出しのネスト上限。
pub const MAX_CALL_DEPTH: usize = 100;
/// `__index` の連鎖をたどる上限。
const MAX_TAG_LOOP: usize = 100;
/// 関数型の `__pairs` が返す反復子から集める要素数の上限。
const MAX_ENUMERATED: usize = 100_000;

/// 評価済みチャンクの既定の発生元タグ。
pub const DEFAULT_ORIGIN: &str = "stdin";

/// レキシカルスコープ。`local` 文・引数・ループ変数ごとに 1 段作られる。
pub struct Scope {
    vars: RefCell<Vec<(String, Value)>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn root() -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::new(Vec::new()),
            parent: None,
        })
    }

    pub fn child(parent: &Rc<Scope>, vars: Vec<(String, Value)>) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::new(vars),
            parent: Some(parent.clone()),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut cur = Some(self);
        while let Some(s) = cur {
            // 同じスコープ内では後から宣言したものが優先
            if let Some((_, v)) = s.vars.borrow().iter().rev().find(|(n, _)| n == name) {
                return Some(v.clone());
            }
            cur = s.parent.as_deref();
        }
        None
    }

    /// 既存のローカル変数へ代入する。見つからなければ `false`。
    pub fn assign(&self, name: &str, value: Value) -> bool {
        let mut cur = Some(self);
        while let Some(s) = cur {
            if let Some(slot) = s
                .vars
                .borrow_mut()
                .iter_mut()
                .rev()
                .find(|(n, _)| n == name)
            {
                slot.1 = value;
                return true;
            }
            cur = s.parent.as_deref();
        }
        false
    }
}

/// 文の実行結果。
enum Flow {
    Normal,
    Break,
    Return(Vec<Value>),
}

/// 代入先。右辺より先に評価しておく。
enum Place {
    Name(String),
    Index(Value, Value),
}

pub struct Interpreter {
    globals: TableRef,
    out: Box<dyn Write>,
    depth: usize,
    closed: bool,
    /// `pprint` が使う既定の整形オプション。
    pub format: FormatOptions,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// 標準出力へ書き出す、基本ライブラリ登録済みのインタプリタ。
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    pub fn with_output(out: Box<dyn Write>) -> Self {
        let mut interp = Self {
            globals: TableRef::new(),
            out,
            depth: 0,
            closed: false,
            format: FormatOptions::default(),
        };
        crate::builtins::install(&mut interp);
        interp
    }

    pub fn globals(&self) -> TableRef {
        self.globals.clone()
    }

    pub fn get_global(&self, name: &str) -> Value {
        self.globals.get_str(name)
    }

    pub fn set_global(&mut self, name: &str, value: impl Into<Value>) {
        // 文字列キーは常に有効
        let _ = self.globals.set(name, value.into());
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// `stdin` を発生元としてチャンクを評価する。
    pub fn evaluate(&mut self, src: &str) -> Result<(), ChunkError> {
        self.evaluate_named(DEFAULT_ORIGIN, src)
    }

    /// ソース全体を構文解析し、成功した場合のみ実行する。
    pub fn evaluate_named(&mut self, origin: &str, src: &str) -> Result<(), ChunkError> {
        if self.closed {
            return Err(ChunkError::from_eval(
                origin,
                EvalError::new("EVAL011", "interpreter is closed"),
            ));
        }
        let block = parse_chunk(src).map_err(|e| ChunkError::from_parse(origin, e))?;
        debug!(origin, statements = block.len(), "evaluate chunk");
        self.depth = 0;
        let result = self.exec_body(&block, &Scope::root());
        let _ = self.out.flush();
        result
            .map(|_| ())
            .map_err(|e| ChunkError::from_eval(origin, e))
    }

    /// 出力先へ文字列をそのまま書き出す。
    pub fn write_out(&mut self, text: &str) -> Result<(), EvalError> {
        self.out
            .write_all(text.as_bytes())
            .map_err(|e| EvalError::new("EVAL013", format!("write failed: {}", e)))
    }

    /// 名前空間を解放し出力をフラッシュする。2 回目以降は何もしない。
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.out.flush();
        let (tables, scopes) = reachable(&Value::Table(self.globals.clone()));
        debug!(tables = tables.len(), scopes = scopes.len(), "release namespace");
        for t in tables {
            t.clear();
        }
        for s in scopes {
            s.vars.borrow_mut().clear();
        }
    }

    // -----------------------------------------------------------------------
    // 呼び出し・添字・文字列化

    pub fn call(&mut self, f: &Value, args: Vec<Value>) -> Result<Vec<Value>, EvalError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EvalError::new("EVAL008", "stack overflow"));
        }
        self.depth += 1;
        let result = match f {
            Value::Function(Function::Builtin(b)) => (b.f)(self, args),
            Value::Function(Function::Closure(c)) => self.call_closure(c, args),
            Value::Function(Function::HostMethod(name)) => call_host_method(name, args),
            other => Err(EvalError::new(
                "EVAL001",
                format!("attempt to call a {} value", other.type_name()),
            )),
        };
        self.depth -= 1;
        result
    }

    fn call_closure(&mut self, c: &Closure, args: Vec<Value>) -> Result<Vec<Value>, EvalError> {
        let mut args = args.into_iter();
        let vars = c
            .body
            .params
            .iter()
            .map(|p| (p.clone(), args.next().unwrap_or_default()))
            .collect();
        let scope = Scope::child(&c.env, vars);
        self.exec_body(&c.body.body, &scope)
    }

    /// 関数本体（またはチャンク）を実行し、戻り値を返す。
    fn exec_body(&mut self, block: &Block, env: &Rc<Scope>) -> Result<Vec<Value>, EvalError> {
        match self.exec_block(block, env)? {
            Flow::Return(vs) => Ok(vs),
            Flow::Normal => Ok(Vec::new()),
            Flow::Break => Err(EvalError::new("EVAL012", "no loop to break")),
        }
    }

    /// 最初の戻り値だけを取り出す。
    pub fn call1(&mut self, f: &Value, args: Vec<Value>) -> Result<Value, EvalError> {
        Ok(self.call(f, args)?.into_iter().next().unwrap_or_default())
    }

    /// `obj[key]`。テーブルの `__index`、文字列の `string` ライブラリ、ホストの公開メンバを辿る。
    pub fn index(&mut self, obj: &Value, key: &Value) -> Result<Value, EvalError> {
        let mut cur = obj.clone();
        for _ in 0..MAX_TAG_LOOP {
            match &cur {
                Value::Table(t) => {
                    let v = t.get(key);
                    if !v.is_nil() {
                        return Ok(v);
                    }
                    match t.metafield("__index") {
                        None => return Ok(Value::Nil),
                        Some(h @ Value::Function(_)) => {
                            return self.call1(&h, vec![cur.clone(), key.clone()])
                        }
                        Some(next) => cur = next,
                    }
                }
                Value::Str(_) => {
                    let lib = self.get_global("string");
                    return Ok(match lib {
                        Value::Table(t) => t.get(key),
                        _ => Value::Nil,
                    });
                }
                Value::Host(h) => {
                    return Ok(key.as_str().and_then(|k| h.get(k)).unwrap_or_default());
                }
                other => {
                    return Err(EvalError::new(
                        "EVAL002",
                        format!("attempt to index a {} value", other.type_name()),
                    ))
                }
            }
        }
        Err(EvalError::new("EVAL002", "'__index' chain too long; possible loop"))
    }

    /// `obj[key] = value`。テーブルは生の代入、ホストは公開フィールドへの代入。
    pub fn set_index(&mut self, obj: &Value, key: Value, value: Value) -> Result<(), EvalError> {
        match obj {
            Value::Table(t) => t.set(key, value).map_err(|m| EvalError::new("EVAL007", m)),
            Value::Host(h) => {
                let name = key.as_str().ok_or_else(|| {
                    EvalError::new("EVAL009", format!("{} fields are named by strings", h.type_name()))
                })?;
                h.set(name, value).map_err(|m| EvalError::new("EVAL009", m))
            }
            other => Err(EvalError::new(
                "EVAL002",
                format!("attempt to index a {} value", other.type_name()),
            )),
        }
    }

    /// `tostring` の意味論。独自の文字列化があればそれを優先する。
    pub fn tostring(&mut self, v: &Value) -> Result<String, EvalError> {
        match self.custom_stringify(v) {
            Some(r) => r,
            None => Ok(v.plain_string()),
        }
    }

    /// `pairs` が辿るエントリ列。独自列挙があればそれに置き換わる。
    pub fn visible_entries(&mut self, v: &Value) -> Result<Vec<(Value, Value)>, EvalError> {
        if let Some(r) = self.custom_enumerate(v) {
            return r;
        }
        match v {
            Value::Table(t) => Ok(t.borrow().entries()),
            other => Err(EvalError::new(
                "EVAL030",
                format!("bad argument #1 to 'pairs' (table expected, got {})", other.type_name()),
            )),
        }
    }

    // -----------------------------------------------------------------------
    // 文

    fn exec_block(&mut self, block: &Block, env: &Rc<Scope>) -> Result<Flow, EvalError> {
        Ok(self.exec_block_scoped(block, env)?.0)
    }

    /// ブロックを実行し、終了時点のスコープも返す（`repeat ... until` の条件式用）。
    fn exec_block_scoped(
        &mut self,
        block: &Block,
        env: &Rc<Scope>,
    ) -> Result<(Flow, Rc<Scope>), EvalError> {
        let mut env = env.clone();
        for stat in block {
            match self
                .exec_stat(stat, &mut env)
                .map_err(|e| e.or_line(stat.line))?
            {
                Flow::Normal => {}
                flow => return Ok((flow, env)),
            }
        }
        Ok((Flow::Normal, env))
    }

    fn exec_stat(&mut self, stat: &Stat, env: &mut Rc<Scope>) -> Result<Flow, EvalError> {
        match &stat.kind {
            StatKind::Local { names, exprs } => {
                let values = self.eval_list(exprs, env)?;
                *env = Scope::child(env, bind(names, values));
            }
            StatKind::LocalFunction { name, func } => {
                let scope = Scope::child(env, vec![(name.clone(), Value::Nil)]);
                let f = make_closure(func, &scope);
                scope.assign(name, f);
                *env = scope;
            }
            StatKind::Assign { targets, exprs } => {
                let mut places = Vec::with_capacity(targets.len());
                for t in targets {
                    places.push(self.eval_place(t, env)?);
                }
                let mut values = self.eval_list(exprs, env)?.into_iter();
                for place in places {
                    let v = values.next().unwrap_or_default();
                    self.assign(place, v, env)?;
                }
            }
            StatKind::Function { target, func } => {
                let place = self.eval_place(target, env)?;
                let f = make_closure(func, env);
                self.assign(place, f, env)?;
            }
            StatKind::Call(e) => {
                self.eval_multi(e, env)?;
            }
            StatKind::Do(body) => return self.exec_block(body, env),
            StatKind::While { cond, body } => {
                while self.eval_expr(cond, env)?.truthy() {
                    match self.exec_block(body, env)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        ret => return Ok(ret),
                    }
                }
            }
            StatKind::Repeat { body, cond } => loop {
                let (flow, inner) = self.exec_block_scoped(body, env)?;
                match flow {
                    Flow::Normal => {}
                    Flow::Break => break,
                    ret => return Ok(ret),
                }
                if self.eval_expr(cond, &inner)?.truthy() {
                    break;
                }
            },
            StatKind::If { arms, otherwise } => {
                for (cond, body) in arms {
                    if self.eval_expr(cond, env)?.truthy() {
                        return self.exec_block(body, env);
                    }
                }
                if let Some(body) = otherwise {
                    return self.exec_block(body, env);
                }
            }
            StatKind::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => {
                let start = self.for_number(start, env, "initial")?;
                let limit = self.for_number(limit, env, "limit")?;
                let step = match step {
                    Some(e) => self.for_number(e, env, "step")?,
                    None => 1.0,
                };
                if step == 0.0 {
                    return Err(EvalError::new("EVAL010", "'for' step is zero"));
                }
                let mut i = start;
                while (step > 0.0 && i <= limit) || (step < 0.0 && i >= limit) {
                    let scope = Scope::child(env, vec![(var.clone(), Value::Number(i))]);
                    match self.exec_block(body, &scope)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        ret => return Ok(ret),
                    }
                    i += step;
                }
            }
            StatKind::GenericFor { names, exprs, body } => {
                let mut init = self.eval_list(exprs, env)?.into_iter();
                let f = init.next().unwrap_or_default();
                let state = init.next().unwrap_or_default();
                let mut control = init.next().unwrap_or_default();
                loop {
                    let values = self
                        .call(&f, vec![state.clone(), control.clone()])
                        .map_err(|e| describe_call_error(e, "for iterator"))?;
                    let first = values.first().cloned().unwrap_or_default();
                    if first.is_nil() {
                        break;
                    }
                    control = first;
                    let scope = Scope::child(env, bind(names, values));
                    match self.exec_block(body, &scope)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        ret => return Ok(ret),
                    }
                }
            }
            StatKind::Return(exprs) => return Ok(Flow::Return(self.eval_list(exprs, env)?)),
            StatKind::Break => return Ok(Flow::Break),
        }
        Ok(Flow::Normal)
    }

    fn for_number(&mut self, e: &Expr, env: &Rc<Scope>, what: &str) -> Result<f64, EvalError> {
        match to_number(&self.eval_expr(e, env)?) {
            Some(n) => Ok(n),
            None => Err(EvalError::new(
                "EVAL010",
                format!("'for' {} value must be a number", what),
            )),
        }
    }

    fn eval_place(&mut self, target: &Expr, env: &Rc<Scope>) -> Result<Place, EvalError> {
        match target {
            Expr::Name(n) => Ok(Place::Name(n.clone())),
            Expr::Index { obj, key } => {
                let o = self.eval_expr(obj, env)?;
                let k = self.eval_expr(key, env)?;
                if matches!(o, Value::Nil | Value::Bool(_) | Value::Number(_) | Value::Str(_)) {
                    return Err(EvalError::new(
                        "EVAL002",
                        format!(
                            "attempt to index a {} value{}",
                            o.type_name(),
                            describe(obj)
                        ),
                    ));
                }
                Ok(Place::Index(o, k))
            }
            _ => Err(EvalError::new("EVAL014", "cannot assign to this expression")),
        }
    }

    fn assign(&mut self, place: Place, value: Value, env: &Rc<Scope>) -> Result<(), EvalError> {
        match place {
            Place::Name(n) => {
                if !env.assign(&n, value.clone()) {
                    self.set_global(&n, value);
                }
                Ok(())
            }
            Place::Index(obj, key) => self.set_index(&obj, key, value),
        }
    }

    // -----------------------------------------------------------------------
    // 式

    /// 式の並びを評価する。最後の式だけが多値を展開する。
    fn eval_list(&mut self, exprs: &[Expr], env: &Rc<Scope>) -> Result<Vec<Value>, EvalError> {
        let mut out = Vec::with_capacity(exprs.len());
        for (i, e) in exprs.iter().enumerate() {
            if i + 1 == exprs.len() {
                out.extend(self.eval_multi(e, env)?);
            } else {
                out.push(self.eval_expr(e, env)?);
            }
        }
        Ok(out)
    }

    /// 呼び出し式なら全戻り値、それ以外は 1 値。
    fn eval_multi(&mut self, e: &Expr, env: &Rc<Scope>) -> Result<Vec<Value>, EvalError> {
        match e {
            Expr::Call { func, args } => {
                let f = self.eval_expr(func, env)?;
                let args = self.eval_list(args, env)?;
                if !matches!(f, Value::Function(_)) {
                    return Err(EvalError::new(
                        "EVAL001",
                        format!("attempt to call a {} value{}", f.type_name(), describe(func)),
                    ));
                }
                self.call(&f, args)
            }
            Expr::Method { obj, name, args } => {
                let recv = self.eval_expr(obj, env)?;
                let f = self.index(&recv, &Value::str(name))?;
                if !matches!(f, Value::Function(_)) {
                    return Err(EvalError::new(
                        "EVAL001",
                        format!("attempt to call a {} value (method '{}')", f.type_name(), name),
                    ));
                }
                let mut all = vec![recv];
                all.extend(self.eval_list(args, env)?);
                self.call(&f, all)
            }
            other => Ok(vec![self.eval_expr(other, env)?]),
        }
    }

    fn eval_expr(&mut self, e: &Expr, env: &Rc<Scope>) -> Result<Value, EvalError> {
        Ok(match e {
            Expr::Nil => Value::Nil,
            Expr::True => Value::Bool(true),
            Expr::False => Value::Bool(false),
            Expr::Number(n) => Value::Number(*n),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::Name(n) => match env.lookup(n) {
                Some(v) => v,
                None => self.get_global(n),
            },
            Expr::Index { obj, key } => {
                let o = self.eval_expr(obj, env)?;
                let k = self.eval_expr(key, env)?;
                self.index(&o, &k).map_err(|err| {
                    if err.0.code == "EVAL002" && matches!(o, Value::Nil | Value::Bool(_) | Value::Number(_)) {
                        EvalError::new(
                            "EVAL002",
                            format!("attempt to index a {} value{}", o.type_name(), describe(obj)),
                        )
                    } else {
                        err
                    }
                })?
            }
            Expr::Call { .. } | Expr::Method { .. } => {
                self.eval_multi(e, env)?.into_iter().next().unwrap_or_default()
            }
            Expr::Paren(inner) => self.eval_expr(inner, env)?,
            Expr::Function(body) => make_closure(body, env),
            Expr::Table(fields) => self.eval_table(fields, env)?,
            Expr::Unary { op, expr } => {
                let v = self.eval_expr(expr, env)?;
                self.unary(*op, v, expr)?
            }
            Expr::Binary { op, lhs, rhs } => match op {
                BinOp::And => {
                    let l = self.eval_expr(lhs, env)?;
                    if !l.truthy() {
                        l
                    } else {
                        self.eval_expr(rhs, env)?
                    }
                }
                BinOp::Or => {
                    let l = self.eval_expr(lhs, env)?;
                    if l.truthy() {
                        l
                    } else {
                        self.eval_expr(rhs, env)?
                    }
                }
                _ => {
                    let l = self.eval_expr(lhs, env)?;
                    let r = self.eval_expr(rhs, env)?;
                    binary(*op, l, r)?
                }
            },
        })
    }

    fn eval_table(&mut self, fields: &[Field], env: &Rc<Scope>) -> Result<Value, EvalError> {
        let t = TableRef::new();
        let mut next_index = 1.0;
        for (i, field) in fields.iter().enumerate() {
            match field {
                Field::Positional(e) => {
                    let values = if i + 1 == fields.len() {
                        self.eval_multi(e, env)?
                    } else {
                        vec![self.eval_expr(e, env)?]
                    };
                    for v in values {
                        t.set(next_index, v).map_err(|m| EvalError::new("EVAL007", m))?;
                        next_index += 1.0;
                    }
                }
                Field::Named(name, e) => {
                    let v = self.eval_expr(e, env)?;
                    t.set(name.as_str(), v)
                        .map_err(|m| EvalError::new("EVAL007", m))?;
                }
                Field::Keyed(k, e) => {
                    let k = self.eval_expr(k, env)?;
                    let v = self.eval_expr(e, env)?;
                    t.set(k, v).map_err(|m| EvalError::new("EVAL007", m))?;
                }
            }
        }
        Ok(Value::Table(t))
    }

    fn unary(&mut self, op: UnOp, v: Value, src: &Expr) -> Result<Value, EvalError> {
        match op {
            UnOp::Not => Ok(Value::Bool(!v.truthy())),
            UnOp::Neg => match to_number(&v) {
                Some(n) => Ok(Value::Number(-n)),
                None => Err(EvalError::new(
                    "EVAL003",
                    format!(
                        "attempt to perform arithmetic on a {} value{}",
                        v.type_name(),
                        describe(src)
                    ),
                )),
            },
            UnOp::Len => match &v {
                Value::Str(s) => Ok(Value::Number(s.len() as f64)),
                Value::Table(t) => Ok(Value::Number(t.borrow().border() as f64)),
                other => Err(EvalError::new(
                    "EVAL006",
                    format!(
                        "attempt to get length of a {} value{}",
                        other.type_name(),
                        describe(src)
                    ),
                )),
            },
        }
    }
}

impl Introspect for Interpreter {
    /// テーブルの `__tostring`、ホスト型の文字列化。
    fn custom_stringify(&mut self, value: &Value) -> Option<Result<String, EvalError>> {
        match value {
            Value::Table(t) => {
                let h = t.metafield("__tostring")?;
                Some(match self.call1(&h, vec![value.clone()]) {
                    Ok(Value::Str(s)) => Ok(s.to_string()),
                    Ok(Value::Number(n)) => Ok(number_to_string(n)),
                    Ok(_) => Err(EvalError::new("EVAL015", "'__tostring' must return a string")),
                    Err(e) => Err(e),
                })
            }
            Value::Host(h) => h.stringify().map(Ok),
            _ => None,
        }
    }

    /// テーブルの `__pairs`（テーブルまたは反復子を返す）、ホストのディレクトリ。
    fn custom_enumerate(&mut self, value: &Value) -> Option<Result<Vec<(Value, Value)>, EvalError>> {
        match value {
            Value::Table(t) => {
                let h = t.metafield("__pairs")?;
                Some(self.enumerate_pairs(&h, value))
            }
            Value::Host(h) => Some(Ok(Directory::of(h).entries())),
            _ => None,
        }
    }

    fn fallback_container(&mut self, value: &Value) -> Option<Value> {
        match value {
            Value::Table(t) => match t.metafield("__index")? {
                v @ (Value::Table(_) | Value::Host(_)) => Some(v),
                _ => None,
            },
            // 文字列のメソッドは `index` と同じく `string` ライブラリへ委ねる
            Value::Str(_) => match self.get_global("string") {
                lib @ Value::Table(_) => Some(lib),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Interpreter {
    fn enumerate_pairs(&mut self, h: &Value, value: &Value) -> Result<Vec<(Value, Value)>, EvalError> {
        let mut rs = self.call(h, vec![value.clone()])?.into_iter();
        match rs.next().unwrap_or_default() {
            Value::Table(view) => Ok(view.borrow().entries()),
            f @ Value::Function(_) => {
                let state = rs.next().unwrap_or_default();
                let mut control = rs.next().unwrap_or_default();
                let mut out = Vec::new();
                while out.len() < MAX_ENUMERATED {
                    let mut step = self.call(&f, vec![state.clone(), control.clone()])?.into_iter();
                    let k = step.next().unwrap_or_default();
                    if k.is_nil() {
                        break;
                    }
                    let v = step.next().unwrap_or_default();
                    control = k.clone();
                    out.push((k, v));
                }
                Ok(out)
            }
            other => Err(EvalError::new(
                "EVAL016",
                format!("'__pairs' must return a table or a function, got {}", other.type_name()),
            )),
        }
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// 補助関数

fn make_closure(body: &Rc<FuncBody>, env: &Rc<Scope>) -> Value {
    Value::Function(Function::Closure(Rc::new(Closure {
        body: body.clone(),
        env: env.clone(),
    })))
}

/// 名前の並びへ値を割り当てる（不足分は nil）。
fn bind(names: &[String], values: Vec<Value>) -> Vec<(String, Value)> {
    let mut values = values.into_iter();
    names
        .iter()
        .map(|n| (n.clone(), values.next().unwrap_or_default()))
        .collect()
}

fn call_host_method(name: &str, args: Vec<Value>) -> Result<Vec<Value>, EvalError> {
    let mut args = args.into_iter();
    match args.next() {
        Some(Value::Host(h)) => h
            .call(name, args.collect())
            .map_err(|m| EvalError::new("EVAL009", m)),
        other => Err(EvalError::new(
            "EVAL009",
            format!(
                "calling '{}' on bad self (host object expected, got {})",
                name,
                other.map_or("no value", |v| v.type_name())
            ),
        )),
    }
}

fn describe_call_error(e: EvalError, what: &str) -> EvalError {
    if e.0.code == "EVAL001" && !e.message().contains('(') {
        EvalError::new("EVAL001", format!("{} ({})", e.message(), what))
    } else {
        e
    }
}

/// エラーメッセージに添える変数の説明（`(global 'x')` など）。
fn describe(e: &Expr) -> String {
    match e {
        Expr::Name(n) => format!(" (variable '{}')", n),
        Expr::Index { key, .. } => match key.as_ref() {
            Expr::Str(s) => format!(" (field '{}')", s),
            _ => String::new(),
        },
        Expr::Method { name, .. } => format!(" (method '{}')", name),
        _ => String::new(),
    }
}

/// 数値への変換。文字列は数値表記として解釈できれば変換する。
pub fn to_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => Some(*n),
        Value::Str(s) => parse_number(s),
        _ => None,
    }
}

/// `tonumber` と算術の暗黙変換が共有する数値表記の解析。
pub fn parse_number(s: &str) -> Option<f64> {
    let t = s.trim();
    let (sign, body) = match t.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, t),
    };
    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(|v| sign * v as f64);
    }
    let plain = body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if body.is_empty() || !plain || body.starts_with('-') {
        return None;
    }
    body.parse::<f64>().ok().map(|v| sign * v)
}

fn binary(op: BinOp, l: Value, r: Value) -> Result<Value, EvalError> {
    use BinOp::*;
    match op {
        Add | Sub | Mul | Div | Mod | Pow => {
            let (x, y) = match (to_number(&l), to_number(&r)) {
                (Some(x), Some(y)) => (x, y),
                (None, _) => return Err(arith_error(&l)),
                (_, None) => return Err(arith_error(&r)),
            };
            Ok(Value::Number(match op {
                Add => x + y,
                Sub => x - y,
                Mul => x * y,
                Div => x / y,
                Mod => x - (x / y).floor() * y,
                _ => x.powf(y),
            }))
        }
        Concat => {
            let piece = |v: &Value| match v {
                Value::Str(s) => Ok(s.to_string()),
                Value::Number(n) => Ok(number_to_string(*n)),
                other => Err(EvalError::new(
                    "EVAL004",
                    format!("attempt to concatenate a {} value", other.type_name()),
                )),
            };
            Ok(Value::from(piece(&l)? + &piece(&r)?))
        }
        Eq => Ok(Value::Bool(l.raw_equal(&r))),
        Ne => Ok(Value::Bool(!l.raw_equal(&r))),
        Lt => less_than(&l, &r).map(Value::Bool),
        Gt => less_than(&r, &l).map(Value::Bool),
        Le => less_equal(&l, &r).map(Value::Bool),
        Ge => less_equal(&r, &l).map(Value::Bool),
        And | Or => unreachable!("short-circuit operators are evaluated lazily"),
    }
}

fn arith_error(v: &Value) -> EvalError {
    EvalError::new(
        "EVAL003",
        format!("attempt to perform arithmetic on a {} value", v.type_name()),
    )
}

fn compare_error(l: &Value, r: &Value) -> EvalError {
    if l.type_name() == r.type_name() {
        EvalError::new("EVAL005", format!("attempt to compare two {} values", l.type_name()))
    } else {
        EvalError::new(
            "EVAL005",
            format!("attempt to compare {} with {}", l.type_name(), r.type_name()),
        )
    }
}

fn less_than(l: &Value, r: &Value) -> Result<bool, EvalError> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => Ok(a < b),
        (Value::Str(a), Value::Str(b)) => Ok(a < b),
        _ => Err(compare_error(l, r)),
    }
}

fn less_equal(l: &Value, r: &Value) -> Result<bool, EvalError> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => Ok(a <= b),
        (Value::Str(a), Value::Str(b)) => Ok(a <= b),
        _ => Err(compare_error(l, r)),
    }
}

/// 値から到達可能なテーブルとクロージャのスコープを集める。
fn reachable(root: &Value) -> (Vec<TableRef>, Vec<Rc<Scope>>) {
    let mut seen: HashSet<usize> = HashSet::new();
    let mut tables = Vec::new();
    let mut scopes: Vec<Rc<Scope>> = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(v) = stack.pop() {
        match &v {
            Value::Table(t) => {
                if !seen.insert(t.id()) {
                    continue;
                }
                for (k, val) in t.borrow().entries() {
                    stack.push(k);
                    stack.push(val);
                }
                if let Some(m) = t.metatable() {
                    stack.push(Value::Table(m));
                }
                tables.push(t.clone());
            }
            Value::Function(Function::Closure(c)) => {
                let mut scope = Some(c.env.clone());
                while let Some(s) = scope {
                    if !seen.insert(Rc::as_ptr(&s) as *const () as usize) {
                        break;
                    }
                    for (_, val) in s.vars.borrow().iter() {
                        stack.push(val.clone());
                    }
                    scope = s.parent.clone();
                    scopes.push(s);
                }
            }
            _ => {}
        }
    }
    (tables, scopes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Interpreter {
        let mut it = Interpreter::with_output(Box::new(io::sink()));
        it.evaluate(src).unwrap();
        it
    }

    fn num(it: &Interpreter, name: &str) -> f64 {
        match it.get_global(name) {
            Value::Number(n) => n,
            other => panic!("{} is {:?}", name, other),
        }
    }

    #[test]
    fn arithmetic_and_precedence() {
        let it = run("x = 1 + 2 * 3 ^ 2  y = -2 ^ 2  z = 7 % 3  w = -7 % 3  s = '10' + 1");
        assert_eq!(num(&it, "x"), 19.0);
        assert_eq!(num(&it, "y"), -4.0);
        assert_eq!(num(&it, "z"), 1.0);
        assert_eq!(num(&it, "w"), 2.0);
        assert_eq!(num(&it, "s"), 11.0);
    }

    #[test]
    /// 同名の `local` 再宣言はクロージャが捕捉した変数を上書きしない。
    fn local_redeclaration_shadows() {
        let it = run("local x = 1 local f = function() return x end local x = 2 r = f() + x");
        assert_eq!(num(&it, "r"), 3.0);
    }

    #[test]
    fn closures_capture_per_iteration() {
        let it = run(
            "fs = {} for i = 1, 3 do fs[i] = function() return i end end \
             r = fs[1]() + fs[2]() * 10 + fs[3]() * 100",
        );
        assert_eq!(num(&it, "r"), 321.0);
    }

    #[test]
    fn loops_and_break() {
        let it = run(
            "n = 0 while true do n = n + 1 if n == 5 then break end end \
             local i = 0 repeat local j = i i = i + 1 until j >= 3 m = i \
             s = 0 for k = 10, 1, -3 do s = s + k end",
        );
        assert_eq!(num(&it, "n"), 5.0);
        assert_eq!(num(&it, "m"), 4.0);
        assert_eq!(num(&it, "s"), 22.0);
    }

    #[test]
    fn generic_for_over_pairs_and_ipairs() {
        let it = run(
            "t = {10, 20, 30, x = 1} s = 0 for _, v in ipairs(t) do s = s + v end \
             c = 0 for k in pairs(t) do c = c + 1 end",
        );
        assert_eq!(num(&it, "s"), 60.0);
        assert_eq!(num(&it, "c"), 4.0);
    }

    #[test]
    fn methods_and_index_fallback() {
        let it = run(
            "Base = {} Base.__index = Base \
             function Base.new(v) return setmetatable({v = v}, Base) end \
             function Base:get() return self.v end \
             o = Base.new(42) r = o:get()",
        );
        assert_eq!(num(&it, "r"), 42.0);
    }

    #[test]
    fn host_members_through_interpreter() {
        let mut it = Interpreter::with_output(Box::new(io::sink()));
        crate::builtins::register_demo(&mut it);
        it.evaluate("n = ST.Name g = ST:Greet('Ann') ST.Name = 'Molly' m = String(ST) a = ST.age")
            .unwrap();
        assert_eq!(it.get_global("n"), Value::str("Dolly"));
        assert_eq!(it.get_global("g"), Value::str("Hello, Ann! I am Dolly."));
        assert_eq!(it.get_global("m"), Value::str("Molly"));
        assert!(it.get_global("a").is_nil());
        let err = it.evaluate("S.Name = 'x'").unwrap_err();
        assert!(err.to_string().contains("held by value"), "{}", err);
    }

    #[test]
    /// 実行時エラーは最も内側の文の行番号と発生元タグを持つ。
    fn runtime_errors_carry_line() {
        let mut it = Interpreter::with_output(Box::new(io::sink()));
        let err = it.evaluate("local a = 1\nlocal b = nil\nc = a + b").unwrap_err();
        assert_eq!(
            err.to_string(),
            "[chunk \"stdin\"]:3: [EVAL003] attempt to perform arithmetic on a nil value"
        );
        let err = it.evaluate("undefined_fn()").unwrap_err();
        assert_eq!(
            err.to_string(),
            "[chunk \"stdin\"]:1: [EVAL001] attempt to call a nil value (variable 'undefined_fn')"
        );
    }

    #[test]
    /// 構文解析に失敗したバッファは一切実行されない。
    fn parse_failure_has_no_side_effects() {
        let mut it = Interpreter::with_output(Box::new(io::sink()));
        let err = it.evaluate("x = 1\nif x then").unwrap_err();
        assert!(err.is_incomplete());
        assert!(it.get_global("x").is_nil());
    }

    #[test]
    fn deep_recursion_becomes_error() {
        // デバッグビルドでもスタックに余裕を持たせる
        let handle = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let mut it = Interpreter::with_output(Box::new(io::sink()));
                let err = it
                    .evaluate("local function f(n) return f(n + 1) end f(1)")
                    .unwrap_err();
                err.to_string()
            })
            .unwrap();
        let msg = handle.join().unwrap();
        assert!(msg.contains("stack overflow"), "{}", msg);
    }

    #[test]
    /// 長い演算の連鎖は評価に入る前に通常のエラーとして返り、状態も壊さない。
    fn long_operator_chain_is_reported_not_aborted() {
        let mut it = run("x = 7");
        let err = it
            .evaluate(&format!("x = {}1", "1+".repeat(3000)))
            .unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::Syntax);
        assert!(err.to_string().contains("too many syntax levels"), "{}", err);
        assert_eq!(num(&it, "x"), 7.0);
        it.evaluate(&format!("y = {}1", "1+".repeat(99))).unwrap();
        assert_eq!(num(&it, "y"), 100.0);
    }

    #[test]
    fn index_loop_is_bounded() {
        let mut it = Interpreter::with_output(Box::new(io::sink()));
        let err = it
            .evaluate("t = {} setmetatable(t, {__index = t}) x = t.missing")
            .unwrap_err();
        assert!(err.to_string().contains("possible loop"), "{}", err);
    }

    #[test]
    /// close 後の評価はエラーになり、循環テーブルも解放される。
    fn close_releases_namespace() {
        let mut it = run("a = {} a.self = a b = {a = a}");
        let weak = match it.get_global("a") {
            Value::Table(t) => t,
            _ => unreachable!(),
        };
        it.close();
        assert_eq!(weak.borrow().len_total(), 0);
        let err = it.evaluate("x = 1").unwrap_err();
        assert!(err.to_string().contains("closed"));
        it.close();
    }

    #[test]
    fn parse_number_accepts_lua_forms_only() {
        assert_eq!(parse_number(" 12 "), Some(12.0));
        assert_eq!(parse_number("0x1F"), Some(31.0));
        assert_eq!(parse_number("-1.5e2"), Some(-150.0));
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("nan"), None);
        assert_eq!(parse_number("1a"), None);
        assert_eq!(parse_number(""), None);
    }
}
