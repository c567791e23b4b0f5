// パス: src/lexer.rs
// 役割: UTF-8 対応の字句解析器とトークン定義を提供する
// 意図: 構文解析に必要な行番号付きトークンを生成する
// 関連ファイル: src/parser.rs, src/errors.rs, src/format.rs
//! 字句解析モジュール
//!
//! - 表言語のソースをトークン列へ変換する。
//! - 正規表現ライブラリを使わず、標準ライブラリのみで走査する。
//! - 文字列リテラルのエスケープ復元は `decode_escapes` として公開し、
//!   整形器の `quote` が再解析可能であることをテストから確認できるようにする。

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::errors::LexerError;

#[derive(Debug, Clone, PartialEq)]
/// 生成されたトークンとその位置情報を保持するレコード。
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
/// 字句解析で識別されるトークンの分類。
pub enum TokenKind {
    EOF,
    NAME,
    NUMBER(f64),
    STRING,
    // 演算子・記号
    PLUS,
    MINUS,
    STAR,
    SLASH,
    PERCENT,
    CARET,
    HASH,
    EQ,
    NE,
    LE,
    GE,
    LT,
    GT,
    ASSIGN,
    LPAREN,
    RPAREN,
    LBRACE,
    RBRACE,
    LBRACK,
    RBRACK,
    SEMI,
    COLON,
    COMMA,
    DOT,
    CONCAT,
    ELLIPSIS,
    // キーワード
    AND,
    BREAK,
    DO,
    ELSE,
    ELSEIF,
    END,
    FALSE,
    FOR,
    FUNCTION,
    IF,
    IN,
    LOCAL,
    NIL,
    NOT,
    OR,
    REPEAT,
    RETURN,
    THEN,
    TRUE,
    UNTIL,
    WHILE,
}

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    use TokenKind::*;
    [
        ("and", AND),
        ("break", BREAK),
        ("do", DO),
        ("else", ELSE),
        ("elseif", ELSEIF),
        ("end", END),
        ("false", FALSE),
        ("for", FOR),
        ("function", FUNCTION),
        ("if", IF),
        ("in", IN),
        ("local", LOCAL),
        ("nil", NIL),
        ("not", NOT),
        ("or", OR),
        ("repeat", REPEAT),
        ("return", RETURN),
        ("then", THEN),
        ("true", TRUE),
        ("until", UNTIL),
        ("while", WHILE),
    ]
    .into_iter()
    .collect()
});

/// 予約語かどうかを判定する。整形器がキーを裸で出せるかの判断にも使う。
pub fn is_keyword(s: &str) -> bool {
    KEYWORDS.contains_key(s)
}

/// 識別子の先頭に使用可能な文字かどうかを判定する。
pub fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}
/// 識別子の後続として許容される文字か判定する。
pub fn is_name_rest(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

struct Lexer<'a> {
    src: &'a str,
    cursor: usize,
    line: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            cursor: 0,
            line: 1,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, LexerError> {
        loop {
            self.consume_trivia()?;
            if self.cursor >= self.src.len() {
                break;
            }
            self.lex_token()?;
        }
        self.push(TokenKind::EOF, "<eof>");
        Ok(self.tokens)
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.cursor..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.src[self.cursor..].chars().nth(n)
    }

    fn advance_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.cursor += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.cursor..].starts_with(s)
    }

    fn push(&mut self, kind: TokenKind, value: impl Into<String>) {
        self.tokens.push(Token {
            kind,
            value: value.into(),
            line: self.line,
        });
    }

    fn consume_trivia(&mut self) -> Result<(), LexerError> {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.advance_char();
                }
                Some('-') if self.starts_with("--") => {
                    self.cursor += 2;
                    if let Some(level) = self.long_bracket_level() {
                        let start_line = self.line;
                        self.read_long_bracket(level).map_err(|_| {
                            LexerError::at_eof("LEX001", "unfinished long comment near '<eof>'", start_line)
                        })?;
                    } else {
                        while let Some(ch) = self.peek_char() {
                            if ch == '\n' {
                                break;
                            }
                            self.advance_char();
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// `[[` / `[==[` の開き括弧であれば `=` の個数を返す（消費はしない）。
    fn long_bracket_level(&self) -> Option<usize> {
        let rest = &self.src[self.cursor..];
        let mut chars = rest.chars();
        if chars.next() != Some('[') {
            return None;
        }
        let mut level = 0;
        for ch in chars {
            match ch {
                '=' => level += 1,
                '[' => return Some(level),
                _ => return None,
            }
        }
        None
    }

    /// 長括弧の本体を読み、内容を返す。閉じ括弧が無ければ `Err(())`。
    fn read_long_bracket(&mut self, level: usize) -> Result<String, ()> {
        self.cursor += level + 2;
        // 開き括弧直後の改行は内容に含めない
        if self.starts_with("\r\n") {
            self.advance_char();
            self.advance_char();
        } else if self.starts_with("\n") {
            self.advance_char();
        }
        let close = format!("]{}]", "=".repeat(level));
        let mut body = String::new();
        loop {
            if self.starts_with(&close) {
                self.cursor += close.len();
                return Ok(body);
            }
            match self.advance_char() {
                Some(ch) => body.push(ch),
                None => return Err(()),
            }
        }
    }

    fn lex_token(&mut self) -> Result<(), LexerError> {
        let Some(ch) = self.peek_char() else {
            return Ok(());
        };
        if is_name_start(ch) {
            let start = self.cursor;
            while matches!(self.peek_char(), Some(c) if is_name_rest(c)) {
                self.advance_char();
            }
            let src = self.src;
            let word = &src[start..self.cursor];
            let kind = KEYWORDS.get(word).cloned().unwrap_or(TokenKind::NAME);
            self.push(kind, word);
            return Ok(());
        }
        if ch.is_ascii_digit() || (ch == '.' && matches!(self.peek_nth(1), Some(d) if d.is_ascii_digit()))
        {
            return self.lex_number();
        }
        if ch == '"' || ch == '\'' {
            return self.lex_string(ch);
        }
        if ch == '[' {
            if let Some(level) = self.long_bracket_level() {
                let start_line = self.line;
                let body = self.read_long_bracket(level).map_err(|_| {
                    LexerError::at_eof("LEX002", "unfinished long string near '<eof>'", start_line)
                })?;
                self.tokens.push(Token {
                    kind: TokenKind::STRING,
                    value: body,
                    line: start_line,
                });
                return Ok(());
            }
        }
        use TokenKind::*;
        const SYMBOLS: &[(&str, TokenKind)] = &[
            ("...", ELLIPSIS),
            ("..", CONCAT),
            ("==", EQ),
            ("~=", NE),
            ("<=", LE),
            (">=", GE),
            ("+", PLUS),
            ("-", MINUS),
            ("*", STAR),
            ("/", SLASH),
            ("%", PERCENT),
            ("^", CARET),
            ("#", HASH),
            ("<", LT),
            (">", GT),
            ("=", ASSIGN),
            ("(", LPAREN),
            (")", RPAREN),
            ("{", LBRACE),
            ("}", RBRACE),
            ("[", LBRACK),
            ("]", RBRACK),
            (";", SEMI),
            (":", COLON),
            (",", COMMA),
            (".", DOT),
        ];
        for (text, kind) in SYMBOLS {
            if self.starts_with(text) {
                self.cursor += text.len();
                self.push(kind.clone(), *text);
                return Ok(());
            }
        }
        Err(LexerError::at(
            "LEX004",
            format!("unexpected symbol near '{}'", ch),
            self.line,
        ))
    }

    fn lex_number(&mut self) -> Result<(), LexerError> {
        let src = self.src;
        let line = self.line;
        let start = self.cursor;
        if self.starts_with("0x") || self.starts_with("0X") {
            self.cursor += 2;
            while matches!(self.peek_char(), Some(c) if c.is_ascii_hexdigit()) {
                self.advance_char();
            }
            let text = &src[start..self.cursor];
            let value = u64::from_str_radix(&text[2..], 16).map_err(|_| {
                LexerError::at("LEX005", format!("malformed number near '{}'", text), line)
            })?;
            self.push(TokenKind::NUMBER(value as f64), text);
            return Ok(());
        }
        while matches!(self.peek_char(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.advance_char();
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            self.advance_char();
            if matches!(self.peek_char(), Some('+' | '-')) {
                self.advance_char();
            }
            while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                self.advance_char();
            }
        }
        // `3x` のように英字が続く場合も不正な数値として扱う
        while matches!(self.peek_char(), Some(c) if is_name_rest(c)) {
            self.advance_char();
        }
        let text = &src[start..self.cursor];
        let value: f64 = text.parse().map_err(|_| {
            LexerError::at("LEX005", format!("malformed number near '{}'", text), line)
        })?;
        self.push(TokenKind::NUMBER(value), text);
        Ok(())
    }

    fn lex_string(&mut self, quote: char) -> Result<(), LexerError> {
        let src = self.src;
        let start = self.cursor;
        let start_line = self.line;
        self.advance_char();
        loop {
            match self.peek_char() {
                None | Some('\n') => {
                    let text = &src[start..self.cursor];
                    return Err(LexerError::at(
                        "LEX003",
                        format!("unfinished string near '{}'", text),
                        start_line,
                    ));
                }
                Some('\\') => {
                    self.advance_char();
                    // エスケープされた改行は文字列内に残る
                    self.advance_char();
                }
                Some(c) if c == quote => {
                    self.advance_char();
                    break;
                }
                Some(_) => {
                    self.advance_char();
                }
            }
        }
        let raw = &src[start + 1..self.cursor - 1];
        let value = decode_escapes(raw).map_err(|msg| LexerError::at("LEX006", msg, start_line))?;
        self.tokens.push(Token {
            kind: TokenKind::STRING,
            value,
            line: start_line,
        });
        Ok(())
    }
}

/// 引用符の内側にあるエスケープ列を復元する。
///
/// 対応: `\n \t \r \a \b \f \v \\ \" \' \<改行> \ddd \xhh`
pub fn decode_escapes(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(esc) = chars.next() else {
            return Err("unfinished escape sequence".into());
        };
        match esc {
            'n' | '\n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{7}'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '\\' | '"' | '\'' => out.push(esc),
            'x' => {
                let mut code = 0u32;
                for _ in 0..2 {
                    let digit = chars
                        .next()
                        .and_then(|c| c.to_digit(16))
                        .ok_or_else(|| "hexadecimal digit expected".to_string())?;
                    code = code * 16 + digit;
                }
                out.push(char::from_u32(code).ok_or("invalid escape sequence")?);
            }
            d if d.is_ascii_digit() => {
                let mut code = d.to_digit(10).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(10)) {
                        Some(n) => {
                            code = code * 10 + n;
                            chars.next();
                        }
                        None => break,
                    }
                }
                if code > 255 {
                    return Err("decimal escape too large".into());
                }
                out.push(char::from_u32(code).ok_or("invalid escape sequence")?);
            }
            other => return Err(format!("invalid escape sequence '\\{}'", other)),
        }
    }
    Ok(out)
}

/// ソース全体をトークン列へ変換する。末尾には必ず `EOF` が付く。
pub fn lex(src: &str) -> Result<Vec<Token>, LexerError> {
    Lexer::new(src).run()
}
