// パス: tests/test_support.rs
// 役割: 統合テスト共通の補助関数と台本入力を提供する
// 意図: 出力の捕捉・評価・REPL ループの駆動を一元化しテストを簡潔に保つ
// 関連ファイル: tests/formatter.rs, tests/completion.rs, tests/continuation.rs, tests/repl_session.rs
#![allow(dead_code)]
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::rc::Rc;

use lunette::repl::{Completer, ReadResult, ReplLineSource};
use lunette::Interpreter;

/// 書き込まれたバイト列を共有バッファへためる出力先。
#[derive(Clone, Default)]
pub struct Capture(pub Rc<RefCell<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).expect("utf-8 output")
    }

    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.0.borrow_mut());
        String::from_utf8(bytes).expect("utf-8 output")
    }
}

/// 出力を捕捉するインタプリタ。
pub fn capturing_interpreter() -> (Interpreter, Capture) {
    let cap = Capture::default();
    (Interpreter::with_output(Box::new(cap.clone())), cap)
}

/// ソースを評価し、失敗したらエラー表示付きで panic する。
pub fn run_ok(interp: &mut Interpreter, src: &str) {
    if let Err(e) = interp.evaluate(src) {
        panic!("evaluation of {:?} failed: {}", src, e);
    }
}

pub enum ScriptEvent {
    Line(&'static str),
    Eof,
    Interrupt,
}

/// 決められた行を順に返す行供給元。
#[derive(Default)]
pub struct ScriptedLineSource {
    pub events: VecDeque<ScriptEvent>,
    pub prompts: Vec<String>,
    pub history: Vec<String>,
    pub saved: usize,
    pub completer: Option<Completer>,
}

impl ScriptedLineSource {
    pub fn new(events: impl IntoIterator<Item = ScriptEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn lines(lines: &[&'static str]) -> Self {
        Self::new(lines.iter().map(|l| ScriptEvent::Line(*l)))
    }
}

impl ReplLineSource for ScriptedLineSource {
    fn read_line(&mut self, prompt: &str) -> io::Result<ReadResult> {
        self.prompts.push(prompt.to_string());
        Ok(match self.events.pop_front().unwrap_or(ScriptEvent::Eof) {
            ScriptEvent::Line(s) => ReadResult::Line(s.to_string()),
            ScriptEvent::Eof => ReadResult::Eof,
            ScriptEvent::Interrupt => ReadResult::Interrupted,
        })
    }

    fn add_history(&mut self, entry: &str) {
        self.history.push(entry.to_string());
    }

    fn save_history(&mut self) -> io::Result<()> {
        self.saved += 1;
        Ok(())
    }

    fn set_completer(&mut self, completer: Completer) {
        self.completer = Some(completer);
    }
}
