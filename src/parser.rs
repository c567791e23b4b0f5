// パス: src/parser.rs
// 役割: トークン列から AST を生成する再帰下降パーサを実装する
// 意図: 入力途中で終端に達したのか、本当に誤った構文なのかを区別して報告する
// 関連ファイル: src/lexer.rs, src/ast.rs, src/errors.rs
//! 構文解析モジュール
//!
//! - 文は `block := { stat [';'] } [ laststat [';'] ]` の形で読む。
//! - 二項演算子は左右の優先度表（`binary_priority`）で結合させる。
//! - 終端トークン（`<eof>`）で失敗した場合は `ParseError::at_eof` を返す。
//!   メッセージ末尾は常に `near '<eof>'` となる。

use std::rc::Rc;

use crate::ast::{BinOp, Block, Expr, Field, FuncBody, Stat, StatKind, UnOp};
use crate::errors::ParseError;
use crate::lexer::{lex, Token, TokenKind};

/// 単項演算子の優先度。
const UNARY_PRIORITY: u8 = 8;

/// 入れ子の上限。評価器は木を再帰で辿るため、ここで深さを抑える。
pub const MAX_SYNTAX_LEVELS: usize = 200;

/// 二項演算子の (左優先度, 右優先度)。右が小さいものは右結合。
fn binary_priority(op: BinOp) -> (u8, u8) {
    use BinOp::*;
    match op {
        Add | Sub => (6, 6),
        Mul | Div | Mod => (7, 7),
        Pow => (10, 9),
        Concat => (5, 4),
        Eq | Ne | Lt | Le | Gt | Ge => (3, 3),
        And => (2, 2),
        Or => (1, 1),
    }
}

fn binary_op(kind: &TokenKind) -> Option<BinOp> {
    use TokenKind as T;
    Some(match kind {
        T::PLUS => BinOp::Add,
        T::MINUS => BinOp::Sub,
        T::STAR => BinOp::Mul,
        T::SLASH => BinOp::Div,
        T::PERCENT => BinOp::Mod,
        T::CARET => BinOp::Pow,
        T::CONCAT => BinOp::Concat,
        T::EQ => BinOp::Eq,
        T::NE => BinOp::Ne,
        T::LT => BinOp::Lt,
        T::LE => BinOp::Le,
        T::GT => BinOp::Gt,
        T::GE => BinOp::Ge,
        T::AND => BinOp::And,
        T::OR => BinOp::Or,
        _ => return None,
    })
}

/// 再帰下降パーサの進行状態を保持する構造体。
pub struct Parser {
    ts: Vec<Token>,
    i: usize,
    level: usize,
}

impl Parser {
    /// トークン列から新しいパーサインスタンスを構築する。
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            ts: tokens,
            i: 0,
            level: 0,
        }
    }
    /// 現在位置のトークンを参照する。
    fn peek(&self) -> &Token {
        // EOF は常に末尾にあるため、末尾を越えても EOF を返す
        &self.ts[self.i.min(self.ts.len() - 1)]
    }
    fn peek_kind(&self, offset: usize) -> Option<&TokenKind> {
        self.ts.get(self.i + offset).map(|t| &t.kind)
    }
    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }
    fn line(&self) -> usize {
        self.peek().line
    }
    /// 現在位置のトークンを消費して返す。
    fn pop_any(&mut self) -> Token {
        let t = self.peek().clone();
        if self.i < self.ts.len() - 1 {
            self.i += 1;
        }
        t
    }
    /// 指定した種別が先頭にあれば消費する。
    fn accept(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.pop_any();
            true
        } else {
            false
        }
    }

    /// 現在トークンを `near '...'` として添えたエラーを組み立てる。
    fn error_near(&self, code: &'static str, msg: &str) -> ParseError {
        let tok = self.peek();
        let text = format!("{} near '{}'", msg, tok.value);
        if tok.kind == TokenKind::EOF {
            ParseError::at_eof(code, text, tok.line)
        } else {
            ParseError::at(code, text, tok.line)
        }
    }

    /// 入れ子を 1 段深くする。上限を越えたら通常の構文エラー。
    fn enter_level(&mut self) -> Result<(), ParseError> {
        self.level += 1;
        if self.level > MAX_SYNTAX_LEVELS {
            return Err(ParseError::at(
                "PAR008",
                "chunk has too many syntax levels",
                self.line(),
            ));
        }
        Ok(())
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.check(&kind) {
            Ok(self.pop_any())
        } else {
            Err(self.error_near("PAR001", &format!("'{}' expected", what)))
        }
    }

    /// 開始行と異なる行で閉じ忘れた場合は「どこを閉じるためか」を添える。
    fn expect_match(
        &mut self,
        kind: TokenKind,
        what: &str,
        who: &str,
        line: usize,
    ) -> Result<(), ParseError> {
        if self.accept(&kind) {
            return Ok(());
        }
        if line == self.line() {
            Err(self.error_near("PAR002", &format!("'{}' expected", what)))
        } else {
            Err(self.error_near(
                "PAR002",
                &format!("'{}' expected (to close '{}' at line {})", what, who, line),
            ))
        }
    }

    fn expect_name(&mut self) -> Result<String, ParseError> {
        if self.check(&TokenKind::NAME) {
            Ok(self.pop_any().value)
        } else {
            Err(self.error_near("PAR003", "<name> expected"))
        }
    }

    /// チャンク全体（`chunk := block EOF`）を解析する。
    pub fn parse_chunk(&mut self) -> Result<Block, ParseError> {
        let block = self.parse_block()?;
        if !self.check(&TokenKind::EOF) {
            return Err(self.error_near("PAR090", "'<eof>' expected"));
        }
        Ok(block)
    }

    fn block_follows(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::EOF | TokenKind::END | TokenKind::ELSE | TokenKind::ELSEIF | TokenKind::UNTIL
        )
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.enter_level()?;
        let mut stats = Vec::new();
        while !self.block_follows() {
            if self.accept(&TokenKind::SEMI) {
                continue;
            }
            let line = self.line();
            match self.peek().kind {
                TokenKind::RETURN => {
                    self.pop_any();
                    let exprs = if self.block_follows() || self.check(&TokenKind::SEMI) {
                        Vec::new()
                    } else {
                        self.parse_exprlist()?
                    };
                    self.accept(&TokenKind::SEMI);
                    stats.push(Stat {
                        kind: StatKind::Return(exprs),
                        line,
                    });
                    break;
                }
                TokenKind::BREAK => {
                    self.pop_any();
                    self.accept(&TokenKind::SEMI);
                    stats.push(Stat {
                        kind: StatKind::Break,
                        line,
                    });
                    break;
                }
                _ => {
                    let kind = self.parse_statement()?;
                    stats.push(Stat { kind, line });
                }
            }
        }
        self.level -= 1;
        Ok(stats)
    }

    fn parse_statement(&mut self) -> Result<StatKind, ParseError> {
        let line = self.line();
        match self.peek().kind {
            TokenKind::DO => {
                self.pop_any();
                let body = self.parse_block()?;
                self.expect_match(TokenKind::END, "end", "do", line)?;
                Ok(StatKind::Do(body))
            }
            TokenKind::WHILE => {
                self.pop_any();
                let cond = self.parse_expr()?;
                self.expect(TokenKind::DO, "do")?;
                let body = self.parse_block()?;
                self.expect_match(TokenKind::END, "end", "while", line)?;
                Ok(StatKind::While { cond, body })
            }
            TokenKind::REPEAT => {
                self.pop_any();
                let body = self.parse_block()?;
                self.expect_match(TokenKind::UNTIL, "until", "repeat", line)?;
                let cond = self.parse_expr()?;
                Ok(StatKind::Repeat { body, cond })
            }
            TokenKind::IF => self.parse_if(line),
            TokenKind::FOR => self.parse_for(line),
            TokenKind::FUNCTION => {
                self.pop_any();
                let (target, name, is_method) = self.parse_funcname()?;
                let func = self.parse_funcbody(name, is_method, line)?;
                Ok(StatKind::Function { target, func })
            }
            TokenKind::LOCAL => {
                self.pop_any();
                if self.accept(&TokenKind::FUNCTION) {
                    let name = self.expect_name()?;
                    let func = self.parse_funcbody(name.clone(), false, line)?;
                    return Ok(StatKind::LocalFunction { name, func });
                }
                let mut names = vec![self.expect_name()?];
                while self.accept(&TokenKind::COMMA) {
                    names.push(self.expect_name()?);
                }
                let exprs = if self.accept(&TokenKind::ASSIGN) {
                    self.parse_exprlist()?
                } else {
                    Vec::new()
                };
                Ok(StatKind::Local { names, exprs })
            }
            _ => self.parse_expr_statement(),
        }
    }

    fn parse_if(&mut self, line: usize) -> Result<StatKind, ParseError> {
        self.pop_any();
        let mut arms = Vec::new();
        let cond = self.parse_expr()?;
        self.expect(TokenKind::THEN, "then")?;
        arms.push((cond, self.parse_block()?));
        let mut otherwise = None;
        loop {
            if self.accept(&TokenKind::ELSEIF) {
                let cond = self.parse_expr()?;
                self.expect(TokenKind::THEN, "then")?;
                arms.push((cond, self.parse_block()?));
            } else if self.accept(&TokenKind::ELSE) {
                otherwise = Some(self.parse_block()?);
                self.expect_match(TokenKind::END, "end", "if", line)?;
                break;
            } else {
                self.expect_match(TokenKind::END, "end", "if", line)?;
                break;
            }
        }
        Ok(StatKind::If { arms, otherwise })
    }

    fn parse_for(&mut self, line: usize) -> Result<StatKind, ParseError> {
        self.pop_any();
        let first = self.expect_name()?;
        if self.accept(&TokenKind::ASSIGN) {
            let start = self.parse_expr()?;
            self.expect(TokenKind::COMMA, ",")?;
            let limit = self.parse_expr()?;
            let step = if self.accept(&TokenKind::COMMA) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect(TokenKind::DO, "do")?;
            let body = self.parse_block()?;
            self.expect_match(TokenKind::END, "end", "for", line)?;
            return Ok(StatKind::NumericFor {
                var: first,
                start,
                limit,
                step,
                body,
            });
        }
        let mut names = vec![first];
        while self.accept(&TokenKind::COMMA) {
            names.push(self.expect_name()?);
        }
        if !self.accept(&TokenKind::IN) {
            return Err(self.error_near("PAR004", "'=' or 'in' expected"));
        }
        let exprs = self.parse_exprlist()?;
        self.expect(TokenKind::DO, "do")?;
        let body = self.parse_block()?;
        self.expect_match(TokenKind::END, "end", "for", line)?;
        Ok(StatKind::GenericFor { names, exprs, body })
    }

    /// `a.b.c:m` 形式の関数名を代入先の式へ変換する。
    fn parse_funcname(&mut self) -> Result<(Expr, String, bool), ParseError> {
        let first = self.expect_name()?;
        let mut full = first.clone();
        let mut target = Expr::Name(first);
        while self.accept(&TokenKind::DOT) {
            let key = self.expect_name()?;
            full.push('.');
            full.push_str(&key);
            target = Expr::Index {
                obj: Box::new(target),
                key: Box::new(Expr::Str(Rc::from(key.as_str()))),
            };
        }
        let mut is_method = false;
        if self.accept(&TokenKind::COLON) {
            let key = self.expect_name()?;
            full.push(':');
            full.push_str(&key);
            target = Expr::Index {
                obj: Box::new(target),
                key: Box::new(Expr::Str(Rc::from(key.as_str()))),
            };
            is_method = true;
        }
        Ok((target, full, is_method))
    }

    fn parse_funcbody(
        &mut self,
        name: String,
        is_method: bool,
        line: usize,
    ) -> Result<Rc<FuncBody>, ParseError> {
        let mut params = Vec::new();
        if is_method {
            params.push("self".to_string());
        }
        self.expect(TokenKind::LPAREN, "(")?;
        if !self.check(&TokenKind::RPAREN) {
            loop {
                if self.check(&TokenKind::ELLIPSIS) {
                    return Err(self.error_near("PAR005", "variadic parameters are not supported"));
                }
                params.push(self.expect_name()?);
                if !self.accept(&TokenKind::COMMA) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RPAREN, ")")?;
        let body = self.parse_block()?;
        self.expect_match(TokenKind::END, "end", "function", line)?;
        Ok(Rc::new(FuncBody { name, params, body }))
    }

    /// 代入文または関数呼び出し文を読む。
    fn parse_expr_statement(&mut self) -> Result<StatKind, ParseError> {
        let first = self.parse_suffixed()?;
        if self.check(&TokenKind::ASSIGN) || self.check(&TokenKind::COMMA) {
            let mut targets = vec![first];
            while self.accept(&TokenKind::COMMA) {
                targets.push(self.parse_suffixed()?);
            }
            for t in &targets {
                if !matches!(t, Expr::Name(_) | Expr::Index { .. }) {
                    return Err(self.error_near("PAR006", "syntax error"));
                }
            }
            self.expect(TokenKind::ASSIGN, "=")?;
            let exprs = self.parse_exprlist()?;
            return Ok(StatKind::Assign { targets, exprs });
        }
        match first {
            Expr::Call { .. } | Expr::Method { .. } => Ok(StatKind::Call(first)),
            Expr::Name(_) | Expr::Index { .. } => Err(self.error_near("PAR007", "'=' expected")),
            _ => Err(self.error_near("PAR006", "syntax error")),
        }
    }

    fn parse_exprlist(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut exprs = vec![self.parse_expr()?];
        while self.accept(&TokenKind::COMMA) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    /// 式を解析する。
    ///
    /// # Examples
    /// ```
    /// use lunette::parser::parse_expr;
    /// use lunette::ast::{BinOp, Expr};
    /// let e = parse_expr("1 + 2 * 3").unwrap();
    /// assert!(matches!(e, Expr::Binary { op: BinOp::Add, .. }));
    /// ```
    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_subexpr(0)
    }

    fn parse_subexpr(&mut self, limit: u8) -> Result<Expr, ParseError> {
        self.enter_level()?;
        let base = self.level;
        let unary = match self.peek().kind {
            TokenKind::NOT => Some(UnOp::Not),
            TokenKind::MINUS => Some(UnOp::Neg),
            TokenKind::HASH => Some(UnOp::Len),
            _ => None,
        };
        let mut left = if let Some(op) = unary {
            self.pop_any();
            let expr = self.parse_subexpr(UNARY_PRIORITY)?;
            Expr::Unary {
                op,
                expr: Box::new(expr),
            }
        } else {
            self.parse_simple()?
        };
        while let Some(op) = binary_op(&self.peek().kind) {
            let (lp, rp) = binary_priority(op);
            if lp <= limit {
                break;
            }
            self.pop_any();
            // 左結合の連鎖もループ内で木を 1 段ずつ深くする
            self.enter_level()?;
            let right = self.parse_subexpr(rp)?;
            left = Expr::Binary {
                op,
                lhs: Box::new(left),
                rhs: Box::new(right),
            };
        }
        self.level = base - 1;
        Ok(left)
    }

    fn parse_simple(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        let expr = match self.peek().kind {
            TokenKind::NUMBER(n) => Expr::Number(n),
            TokenKind::STRING => Expr::Str(Rc::from(self.peek().value.as_str())),
            TokenKind::NIL => Expr::Nil,
            TokenKind::TRUE => Expr::True,
            TokenKind::FALSE => Expr::False,
            TokenKind::ELLIPSIS => {
                return Err(self.error_near("PAR005", "cannot use '...' outside a vararg function"))
            }
            TokenKind::LBRACE => return self.parse_table(),
            TokenKind::FUNCTION => {
                self.pop_any();
                let func = self.parse_funcbody("?".to_string(), false, line)?;
                return Ok(Expr::Function(func));
            }
            _ => return self.parse_suffixed(),
        };
        self.pop_any();
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().kind {
            TokenKind::NAME => Ok(Expr::Name(self.pop_any().value)),
            TokenKind::LPAREN => {
                let line = self.line();
                self.pop_any();
                let inner = self.parse_expr()?;
                self.expect_match(TokenKind::RPAREN, ")", "(", line)?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            _ => Err(self.error_near("PAR010", "unexpected symbol")),
        }
    }

    fn parse_suffixed(&mut self) -> Result<Expr, ParseError> {
        let base = self.level;
        let mut expr = self.parse_primary()?;
        while self.at_suffix() {
            // `a.b.c...` や `f()()...` の連鎖も木を深くする
            self.enter_level()?;
            match self.peek().kind {
                TokenKind::DOT => {
                    self.pop_any();
                    let key = self.expect_name()?;
                    expr = Expr::Index {
                        obj: Box::new(expr),
                        key: Box::new(Expr::Str(Rc::from(key.as_str()))),
                    };
                }
                TokenKind::LBRACK => {
                    let line = self.line();
                    self.pop_any();
                    let key = self.parse_expr()?;
                    self.expect_match(TokenKind::RBRACK, "]", "[", line)?;
                    expr = Expr::Index {
                        obj: Box::new(expr),
                        key: Box::new(key),
                    };
                }
                TokenKind::COLON => {
                    self.pop_any();
                    let name = self.expect_name()?;
                    let args = self.parse_args()?;
                    expr = Expr::Method {
                        obj: Box::new(expr),
                        name,
                        args,
                    };
                }
                TokenKind::LPAREN | TokenKind::STRING | TokenKind::LBRACE => {
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                    };
                }
                _ => {}
            }
        }
        self.level = base;
        Ok(expr)
    }

    fn at_suffix(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::DOT
                | TokenKind::LBRACK
                | TokenKind::COLON
                | TokenKind::LPAREN
                | TokenKind::STRING
                | TokenKind::LBRACE
        )
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        match self.peek().kind {
            TokenKind::STRING => {
                let s = self.pop_any().value;
                Ok(vec![Expr::Str(Rc::from(s.as_str()))])
            }
            TokenKind::LBRACE => Ok(vec![self.parse_table()?]),
            TokenKind::LPAREN => {
                let line = self.line();
                self.pop_any();
                if self.accept(&TokenKind::RPAREN) {
                    return Ok(Vec::new());
                }
                let args = self.parse_exprlist()?;
                self.expect_match(TokenKind::RPAREN, ")", "(", line)?;
                Ok(args)
            }
            _ => Err(self.error_near("PAR011", "function arguments expected")),
        }
    }

    fn parse_table(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        self.expect(TokenKind::LBRACE, "{")?;
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBRACE) {
            let field = match self.peek().kind {
                TokenKind::LBRACK => {
                    self.pop_any();
                    let key = self.parse_expr()?;
                    self.expect(TokenKind::RBRACK, "]")?;
                    self.expect(TokenKind::ASSIGN, "=")?;
                    Field::Keyed(key, self.parse_expr()?)
                }
                TokenKind::NAME if self.peek_kind(1) == Some(&TokenKind::ASSIGN) => {
                    let name = self.pop_any().value;
                    self.pop_any();
                    Field::Named(name, self.parse_expr()?)
                }
                _ => Field::Positional(self.parse_expr()?),
            };
            fields.push(field);
            if !(self.accept(&TokenKind::COMMA) || self.accept(&TokenKind::SEMI)) {
                break;
            }
        }
        self.expect_match(TokenKind::RBRACE, "}", "{", line)?;
        Ok(Expr::Table(fields))
    }
}

/// ソース文字列をチャンクとして解析する。
///
/// # Examples
/// ```
/// let block = lunette::parser::parse_chunk("local x = 1\nprint(x)").unwrap();
/// assert_eq!(block.len(), 2);
/// ```
pub fn parse_chunk(src: &str) -> Result<Block, ParseError> {
    let ts = lex(src)?;
    Parser::new(ts).parse_chunk()
}

/// 単独の式を解析する。余分なトークンが残ればエラー。
pub fn parse_expr(src: &str) -> Result<Expr, ParseError> {
    let ts = lex(src)?;
    let mut p = Parser::new(ts);
    let e = p.parse_expr()?;
    if !p.check(&TokenKind::EOF) {
        return Err(p.error_near("PAR090", "'<eof>' expected"));
    }
    Ok(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EOF_MARKER;

    fn err_text(src: &str) -> (String, bool) {
        let e = parse_chunk(src).unwrap_err();
        (e.to_string(), e.at_eof)
    }

    #[test]
    /// 開いたままの構文は終端エラーとして報告される。
    fn unfinished_constructs_fail_at_eof() {
        for src in [
            "if x then",
            "function f(a)",
            "t = {1, 2",
            "print(1,",
            "x = 1 +",
            "while true do print(1)",
            "for i = 1, 3 do",
            "local s = [[abc",
            "repeat x = 1",
            "x",
        ] {
            let (msg, at_eof) = err_text(src);
            assert!(at_eof, "{src:?} should be incomplete: {msg}");
            assert!(msg.ends_with(EOF_MARKER), "{msg}");
        }
    }

    #[test]
    /// 誤った構文は終端エラーとは区別される。
    fn genuine_syntax_errors_are_not_eof() {
        for src in ["x = = 1", "1 + 2", "if then end", "f() )", "local 3 = 4", "end"] {
            let (msg, at_eof) = err_text(src);
            assert!(!at_eof, "{src:?} should be a real error: {msg}");
            assert!(!msg.ends_with(EOF_MARKER), "{msg}");
        }
    }

    #[test]
    fn close_hint_mentions_opening_line() {
        let (msg, _) = err_text("function f()\n  return 1\n");
        assert_eq!(
            msg,
            "[PAR002] 'end' expected (to close 'function' at line 1) near '<eof>'"
        );
    }

    #[test]
    /// 連結とべき乗が右結合で、比較が算術より弱いことを確認する。
    fn precedence_and_associativity() {
        let e = parse_expr("a .. b .. c").unwrap();
        match e {
            Expr::Binary {
                op: BinOp::Concat,
                lhs,
                rhs,
            } => {
                assert_eq!(*lhs, Expr::Name("a".into()));
                assert!(matches!(*rhs, Expr::Binary { op: BinOp::Concat, .. }));
            }
            other => panic!("unexpected: {:?}", other),
        }
        let e = parse_expr("-x ^ 2").unwrap();
        assert!(matches!(e, Expr::Unary { op: UnOp::Neg, .. }));
        let e = parse_expr("1 + 2 < 4 and not done").unwrap();
        assert!(matches!(e, Expr::Binary { op: BinOp::And, .. }));
    }

    #[test]
    fn table_constructor_fields() {
        let e = parse_expr("{10, x = 1, ['y z'] = 2; 30,}").unwrap();
        let Expr::Table(fields) = e else {
            panic!("table expected")
        };
        assert_eq!(fields.len(), 4);
        assert!(matches!(fields[0], Field::Positional(Expr::Number(n)) if n == 10.0));
        assert!(matches!(&fields[1], Field::Named(n, _) if n == "x"));
        assert!(matches!(fields[2], Field::Keyed(Expr::Str(_), _)));
    }

    #[test]
    /// メソッド定義は暗黙の `self` 引数を持つ。
    fn method_definition_adds_self() {
        let block = parse_chunk("function a.b:c(x) return x end").unwrap();
        match &block[0].kind {
            StatKind::Function { func, .. } => {
                assert_eq!(func.params, vec!["self".to_string(), "x".to_string()]);
                assert_eq!(func.name, "a.b:c");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn statements_record_lines() {
        let block = parse_chunk("a = 1\n\nb = 2").unwrap();
        assert_eq!(block[0].line, 1);
        assert_eq!(block[1].line, 3);
    }

    #[test]
    /// 深すぎる入れ子は評価前に通常の構文エラーとして止まる。
    fn deep_nesting_is_a_syntax_error() {
        let chain = format!("x = {}1", "1+".repeat(3000));
        let parens = format!("x = {}1{}", "(".repeat(3000), ")".repeat(3000));
        let blocks = format!("{}x = 1{}", "do ".repeat(3000), " end".repeat(3000));
        let fields = format!("x = t{}", ".a".repeat(3000));
        // 上限まではパーサ自身も再帰するため、デバッグビルド向けに余裕を持たせる
        let handle = std::thread::Builder::new()
            .stack_size(16 * 1024 * 1024)
            .spawn(move || {
                [chain, parens, blocks, fields]
                    .iter()
                    .map(|src| err_text(src))
                    .collect::<Vec<_>>()
            })
            .unwrap();
        for (msg, at_eof) in handle.join().unwrap() {
            assert!(!at_eof, "{msg}");
            assert!(msg.starts_with("[PAR008] chunk has too many syntax levels"), "{msg}");
        }
    }

    #[test]
    /// 上限以内の連鎖は通常どおり読める。
    fn moderate_chains_still_parse() {
        let chain = format!("x = {}1", "1+".repeat(MAX_SYNTAX_LEVELS / 2));
        assert_eq!(parse_chunk(&chain).unwrap().len(), 1);
        let list = format!("t = {{{}}}", "1, ".repeat(5000));
        assert_eq!(parse_chunk(&list).unwrap().len(), 1);
    }
}
