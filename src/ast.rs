//! 抽象構文木（AST）
//!
//! 目的:
//! - 構文解析結果を評価器へ渡すための中立的な表現。
//!
//! 設計ノート:
//! - 文（`Stat`）は実行時エラーの行番号報告のために `line` を持つ。
//! - 関数本体は `Rc` で共有し、クロージャ生成時に AST を複製しない。

use std::rc::Rc;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Nil,
    True,
    False,
    Number(f64),
    Str(Rc<str>),
    Name(String),
    Index {
        obj: Box<Expr>,
        key: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Method {
        obj: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    Function(Rc<FuncBody>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
    },
    Table(Vec<Field>),
    /// 括弧で囲まれた式。多値を 1 値へ切り詰める。
    Paren(Box<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Lt,
    Gt,
    Le,
    Ge,
    Ne,
    Eq,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
    Len,
}

/// テーブルコンストラクタの 1 要素。
#[derive(Clone, Debug, PartialEq)]
pub enum Field {
    Positional(Expr),
    Named(String, Expr),
    Keyed(Expr, Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FuncBody {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
}

pub type Block = Vec<Stat>;

#[derive(Clone, Debug, PartialEq)]
pub struct Stat {
    pub kind: StatKind,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StatKind {
    Local {
        names: Vec<String>,
        exprs: Vec<Expr>,
    },
    Assign {
        targets: Vec<Expr>,
        exprs: Vec<Expr>,
    },
    /// 関数呼び出し・メソッド呼び出しのみ文として許可される。
    Call(Expr),
    Do(Block),
    While {
        cond: Expr,
        body: Block,
    },
    Repeat {
        body: Block,
        cond: Expr,
    },
    If {
        arms: Vec<(Expr, Block)>,
        otherwise: Option<Block>,
    },
    NumericFor {
        var: String,
        start: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Block,
    },
    GenericFor {
        names: Vec<String>,
        exprs: Vec<Expr>,
        body: Block,
    },
    /// `function a.b:c() end` は `target` への代入として扱う。
    Function {
        target: Expr,
        func: Rc<FuncBody>,
    },
    LocalFunction {
        name: String,
        func: Rc<FuncBody>,
    },
    Return(Vec<Expr>),
    Break,
}
