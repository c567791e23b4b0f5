// パス: src/repl/cmd.rs
// 役割: REPL session state, line handling and the guarded read-eval-print loop
// 意図: Accumulate multi-line input, route errors through the continuation detector, always tear down once
// 関連ファイル: src/interpreter.rs, src/continuation.rs, src/complete.rs, src/repl/line_editor.rs
//! 対話セッションの本体。
//!
//! 1 行読むたびに入力バッファへ追記し、バッファ全体を評価する。
//! 構文が閉じていなければエラーを出さずに続きを待ち（プロンプト `>> `）、
//! それ以外のエラーは表示してバッファを捨てる。
//!
//! 行頭の書き換え:
//! - `=expr` → `pprint(expr)`（整形表示、`_` に束縛）
//! - `.expr` → `print(expr)`（素の表示）
//!
//! 終了経路（`exit`・入力終端・割り込み・panic）はどれも同じ後始末を 1 回だけ通る。

use std::any::Any;
use std::borrow::Cow;
use std::cell::RefCell;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::builtins::register_demo;
use crate::complete::complete;
use crate::config::ReplConfig;
use crate::continuation::{strip_origin, Classification, Strategy};
use crate::errors::ReplError;
use crate::interpreter::Interpreter;

use super::line_editor::{Completer, LineEditor, ReadResult};
use super::printer::{render_banner, render_error, render_hint};

pub const PRIMARY_PROMPT: &str = "> ";
pub const CONTINUATION_PROMPT: &str = ">> ";
pub const EXIT_COMMAND: &str = "exit";
/// 起動時スクリプトの発生元タグ。
pub const STARTUP_ORIGIN: &str = "init";

/// 起動時に評価する補助定義。
pub const PRELUDE: &str = r#"
-- テーブルやホスト値のキー一覧
function keys(t)
  local ks = {}
  for k in pairs(t) do
    ks[#ks + 1] = k
  end
  return ks
end
println = print
"#;

/// 環境変数の設定で対話セッションを開始する。
///
/// # Examples
/// ```no_run
/// use lunette::config::ReplConfig;
///
/// let config = ReplConfig::from_env();
/// if let Err(e) = lunette::repl::run_repl(&config) {
///     println!("{}", e);
/// }
/// ```
pub fn run_repl(config: &ReplConfig) -> Result<(), ReplError> {
    let mut editor = LineEditor::new(config.history_path.clone());
    let session = Session::start(Interpreter::new(), config)?;
    let mut stdout = io::stdout();
    run_repl_with(&mut editor, session, &mut stdout)
}

/// 行入力の供給元。端末エディタとテスト用の台本で差し替える。
pub trait ReplLineSource {
    fn read_line(&mut self, prompt: &str) -> io::Result<ReadResult>;
    fn add_history(&mut self, entry: &str);
    fn save_history(&mut self) -> io::Result<()>;
    fn set_completer(&mut self, completer: Completer);
}

impl ReplLineSource for LineEditor {
    fn read_line(&mut self, prompt: &str) -> io::Result<ReadResult> {
        LineEditor::read_line(self, prompt)
    }

    fn add_history(&mut self, entry: &str) {
        LineEditor::add_history(self, entry);
    }

    fn save_history(&mut self) -> io::Result<()> {
        LineEditor::save_history(self)
    }

    fn set_completer(&mut self, completer: Completer) {
        LineEditor::set_completer(self, completer);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    Primary,
    Continuation,
}

impl PromptMode {
    pub fn prompt(self) -> &'static str {
        match self {
            PromptMode::Primary => PRIMARY_PROMPT,
            PromptMode::Continuation => CONTINUATION_PROMPT,
        }
    }
}

/// 1 行を処理した結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// バッファ全体を評価し終えた。
    Evaluated,
    /// 構文が閉じていない。続きの行を待つ。
    NeedMore,
    /// 利用者へ見せるエラー（発生元タグは除去済み）。
    Failed(String),
    EmptyLine,
    Exit,
}

/// 行頭の `=` / `.` を表示関数の呼び出しへ書き換える。
pub fn rewrite_line(line: &str) -> Cow<'_, str> {
    if let Some(expr) = line.strip_prefix('=') {
        Cow::Owned(format!("pprint({})", expr))
    } else if let Some(expr) = line.strip_prefix('.') {
        Cow::Owned(format!("print({})", expr))
    } else {
        Cow::Borrowed(line)
    }
}

/// 入力バッファ・プロンプト状態・インタプリタをまとめた対話セッション。
pub struct Session {
    interp: Rc<RefCell<Interpreter>>,
    buffer: String,
    mode: PromptMode,
    strategy: Strategy,
}

impl Session {
    pub fn new(interp: Interpreter, strategy: Strategy) -> Self {
        Self {
            interp: Rc::new(RefCell::new(interp)),
            buffer: String::new(),
            mode: PromptMode::Primary,
            strategy,
        }
    }

    /// デモ用のホスト値を登録し、補助定義を評価してからセッションを作る。
    pub fn start(interp: Interpreter, config: &ReplConfig) -> Result<Self, ReplError> {
        Self::start_with(interp, config, PRELUDE)
    }

    pub fn start_with(
        mut interp: Interpreter,
        config: &ReplConfig,
        prelude: &str,
    ) -> Result<Self, ReplError> {
        interp.format.limit = config.format_limit;
        register_demo(&mut interp);
        interp
            .evaluate_named(STARTUP_ORIGIN, prelude)
            .map_err(ReplError::Startup)?;
        debug!(strategy = %config.continuation, limit = config.format_limit, "session started");
        Ok(Self::new(interp, config.continuation))
    }

    pub fn interpreter(&self) -> Rc<RefCell<Interpreter>> {
        Rc::clone(&self.interp)
    }

    pub fn mode(&self) -> PromptMode {
        self.mode
    }

    pub fn prompt(&self) -> &'static str {
        self.mode.prompt()
    }

    /// 評価待ちの入力（継続中の行を含む）。
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// 1 行を受け取り、必要なら評価する。
    pub fn handle_line(&mut self, line: &str) -> Outcome {
        if line == EXIT_COMMAND {
            return Outcome::Exit;
        }
        if line.is_empty() {
            return Outcome::EmptyLine;
        }
        self.buffer.push_str(&rewrite_line(line));

        let interp = Rc::clone(&self.interp);
        let result = match interp.try_borrow_mut() {
            Ok(mut it) => it.evaluate(&self.buffer),
            Err(_) => {
                self.reset();
                return Outcome::Failed("interpreter is busy".to_string());
            }
        };
        match result {
            Ok(()) => {
                self.reset();
                Outcome::Evaluated
            }
            Err(e) => {
                let full = e.to_string();
                let text = strip_origin(&full);
                match self.strategy.classify(&e, text) {
                    Classification::Incomplete => {
                        self.buffer.push('\n');
                        self.mode = PromptMode::Continuation;
                        Outcome::NeedMore
                    }
                    Classification::Real => {
                        let text = text.to_string();
                        self.reset();
                        Outcome::Failed(text)
                    }
                }
            }
        }
    }

    /// 行エディタへ渡す補完関数。インタプリタを共有する。
    pub fn completer(&self) -> Completer {
        let interp = Rc::clone(&self.interp);
        Box::new(move |line: &str| complete_line(&interp, line))
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.mode = PromptMode::Primary;
    }
}

/// 補完要求を処理する。失敗（フックのエラー、再入、panic）は空の候補になる。
pub fn complete_line(interp: &RefCell<Interpreter>, line: &str) -> Vec<String> {
    let Ok(mut it) = interp.try_borrow_mut() else {
        warn!(line, "completion skipped: interpreter busy");
        return Vec::new();
    };
    if it.is_closed() {
        return Vec::new();
    }
    let globals = it.globals();
    match panic::catch_unwind(AssertUnwindSafe(|| complete(line, &globals, &mut *it))) {
        Ok(found) => found,
        Err(payload) => {
            warn!(line, reason = %panic_message(payload.as_ref()), "completion panicked");
            Vec::new()
        }
    }
}

/// 後始末を 1 回だけ行うガード。どの経路でループを抜けても `Drop` で実行される。
struct Teardown<'a, S: ReplLineSource> {
    editor: &'a mut S,
    interp: Rc<RefCell<Interpreter>>,
    done: bool,
}

impl<'a, S: ReplLineSource> Teardown<'a, S> {
    fn finish(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        match self.interp.try_borrow_mut() {
            Ok(mut it) => it.close(),
            Err(_) => warn!("interpreter still borrowed at teardown"),
        }
        if let Err(e) = self.editor.save_history() {
            warn!(error = %e, "failed to save history");
        }
        debug!("session torn down");
    }
}

impl<'a, S: ReplLineSource> Drop for Teardown<'a, S> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// 任意の行供給元でループを回す。戻った時点で後始末は済んでいる。
pub fn run_repl_with<S, W>(editor: &mut S, mut session: Session, out: &mut W) -> Result<(), ReplError>
where
    S: ReplLineSource,
    W: Write,
{
    editor.set_completer(session.completer());
    render_banner(out)?;

    let mut guard = Teardown {
        editor,
        interp: session.interpreter(),
        done: false,
    };
    let result = panic::catch_unwind(AssertUnwindSafe(|| drive(&mut guard, &mut session, out)));
    guard.finish();
    match result {
        Ok(r) => r,
        Err(payload) => Err(ReplError::Panic(panic_message(payload.as_ref()))),
    }
}

fn drive<S, W>(guard: &mut Teardown<'_, S>, session: &mut Session, out: &mut W) -> Result<(), ReplError>
where
    S: ReplLineSource,
    W: Write,
{
    loop {
        let line = match guard.editor.read_line(session.prompt())? {
            ReadResult::Line(line) => line,
            ReadResult::Eof | ReadResult::Interrupted => {
                debug!("input closed");
                return Ok(());
            }
        };
        if !line.is_empty() && line != EXIT_COMMAND {
            guard.editor.add_history(&line);
        }
        match session.handle_line(&line) {
            Outcome::Exit => return Ok(()),
            Outcome::EmptyLine => render_hint(out)?,
            Outcome::Failed(text) => render_error(out, &text)?,
            Outcome::Evaluated | Outcome::NeedMore => {}
        }
        out.flush()?;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown failure".to_string()
    }
}
