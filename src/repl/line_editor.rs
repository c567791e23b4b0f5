// パス: src/repl/line_editor.rs
// 役割: Terminal line editor with history, cursor movement and Tab completion
// 意図: Provide interactive input for the REPL without pulling in a terminal crate
// 関連ファイル: src/repl/cmd.rs, src/complete.rs, src/config.rs
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// 履歴の既定上限。
pub const MAX_HISTORY: usize = 1000;

/// 補完要求を受け取る関数。入力中の行全体を渡し、置き換え候補を返す。
pub type Completer = Box<dyn FnMut(&str) -> Vec<String>>;

/// 行入力が返す 3 種類の結果を表す列挙体。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    Line(String),
    Eof,
    Interrupted,
}

/// 履歴と補完を備えた簡易ラインエディタ。
pub struct LineEditor {
    history: History,
    completer: Option<Completer>,
}

impl LineEditor {
    /// 履歴ファイルを読み込んでエディタを構築する。`None` なら履歴はメモリ上のみ。
    pub fn new(history_path: Option<PathBuf>) -> Self {
        let mut editor = Self {
            history: History::new(MAX_HISTORY),
            completer: None,
        };
        if let Some(path) = history_path {
            editor.load_history(&path);
        }
        editor
    }

    /// プロンプトを出力し、1 行分の入力または制御シグナルを取得する。
    /// 標準入力が端末でなければ 1 行ずつの素朴な読み取りに切り替える。
    pub fn read_line(&mut self, prompt: &str) -> io::Result<ReadResult> {
        #[cfg(unix)]
        {
            if stdin_is_terminal() {
                return self.read_line_unix(prompt);
            }
        }
        self.read_line_fallback(prompt)
    }

    /// 補完関数を登録する。既存の登録は置き換える。
    pub fn set_completer(&mut self, completer: Completer) {
        self.completer = Some(completer);
    }

    /// 入力文字列を履歴へ追加し、重複や空行を除外する。
    pub fn add_history(&mut self, entry: &str) {
        self.history.add(entry);
    }

    /// 履歴ファイルを読み込み、保存先として記憶する。無いファイルは空扱い。
    pub fn load_history(&mut self, path: &Path) {
        self.history.load_from(path);
    }

    /// 現在の履歴内容を、読み込み元のファイルへ書き出す。
    pub fn save_history(&self) -> io::Result<()> {
        self.history.save()
    }

    /// 任意の場所へ履歴を書き出す。
    pub fn save_history_to(&self, path: &Path) -> io::Result<()> {
        self.history.save_to(path)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Raw モードが利用できない環境向けのフォールバック読み取り。
    fn read_line_fallback(&mut self, prompt: &str) -> io::Result<ReadResult> {
        let mut stdout = io::stdout();
        write!(stdout, "{}", prompt)?;
        stdout.flush()?;
        read_plain_line(&mut io::stdin().lock())
    }
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new(None)
    }
}

/// 改行までを 1 行として読む。入力の終端なら `Eof`。
fn read_plain_line<R: BufRead>(reader: &mut R) -> io::Result<ReadResult> {
    let mut line = String::new();
    let bytes = reader.read_line(&mut line)?;
    if bytes == 0 {
        return Ok(ReadResult::Eof);
    }
    if line.ends_with('\n') {
        line.pop();
    }
    if line.ends_with('\r') {
        line.pop();
    }
    Ok(ReadResult::Line(line))
}

#[cfg(unix)]
fn stdin_is_terminal() -> bool {
    unsafe { isatty(0) == 1 }
}

#[cfg(unix)]
impl LineEditor {
    /// UNIX 端末を Raw モードに切り替えて対話入力を処理する。
    #[allow(unexpected_cfgs)]
    #[cfg_attr(coverage, coverage(off))]
    fn read_line_unix(&mut self, prompt: &str) -> io::Result<ReadResult> {
        let _raw = RawMode::new()?;
        let mut stdout = io::stdout();
        write!(stdout, "{}", prompt)?;
        stdout.flush()?;

        let stdin = io::stdin();
        let mut stdin = stdin.lock();
        let completer = &mut self.completer;
        let mut session = EditorSession::new(&self.history);
        let mut pending: Option<EditAction> = None;
        loop {
            let action = match pending.take() {
                Some(action) => action,
                None => {
                    let mut byte = [0u8; 1];
                    if stdin.read(&mut byte)? == 0 {
                        return Ok(ReadResult::Eof);
                    }
                    interpret_action(byte[0], &mut stdin)?
                }
            };
            match action {
                EditAction::Submit => {
                    write!(stdout, "\r\n")?;
                    stdout.flush()?;
                    return Ok(ReadResult::Line(session.into_string()));
                }
                EditAction::Interrupt => {
                    write!(stdout, "^C\r\n")?;
                    stdout.flush()?;
                    return Ok(ReadResult::Interrupted);
                }
                EditAction::Eof => {
                    if session.is_empty() {
                        write!(stdout, "\r\n")?;
                        stdout.flush()?;
                        return Ok(ReadResult::Eof);
                    }
                }
                EditAction::Complete => {
                    let line = session.as_string();
                    let candidates = match completer.as_mut() {
                        Some(complete) => complete(&line),
                        None => Vec::new(),
                    };
                    if candidates.is_empty() {
                        write!(stdout, "\x07")?;
                        stdout.flush()?;
                        continue;
                    }
                    let mut cycle = CompletionCycle::new(candidates, session.buffer().to_vec());
                    pending = loop {
                        let shown = cycle.current();
                        refresh_line(&mut stdout, prompt, &shown, shown.len())?;
                        let mut byte = [0u8; 1];
                        if stdin.read(&mut byte)? == 0 {
                            session.replace(cycle.original());
                            break Some(EditAction::Eof);
                        }
                        // 補完中の ESC は後続を待たずに取り消しとして扱う
                        let next = if byte[0] == 0x1b {
                            EditAction::Cancel
                        } else {
                            interpret_action(byte[0], &mut stdin)?
                        };
                        match next {
                            EditAction::Complete => {
                                if cycle.advance() {
                                    write!(stdout, "\x07")?;
                                }
                            }
                            EditAction::Cancel => {
                                session.replace(cycle.original());
                                refresh_line(
                                    &mut stdout,
                                    prompt,
                                    session.buffer(),
                                    session.cursor(),
                                )?;
                                break None;
                            }
                            other => {
                                session.replace(cycle.current());
                                break Some(other);
                            }
                        }
                    };
                }
                EditAction::DeleteLeft => {
                    if session.delete_left() {
                        refresh_line(&mut stdout, prompt, session.buffer(), session.cursor())?;
                    }
                }
                EditAction::MoveLeft => {
                    if session.move_left() {
                        refresh_line(&mut stdout, prompt, session.buffer(), session.cursor())?;
                    }
                }
                EditAction::MoveRight => {
                    if session.move_right() {
                        refresh_line(&mut stdout, prompt, session.buffer(), session.cursor())?;
                    }
                }
                EditAction::HistoryPrev => {
                    if session.history_prev() {
                        refresh_line(&mut stdout, prompt, session.buffer(), session.cursor())?;
                    }
                }
                EditAction::HistoryNext => {
                    if session.history_next() {
                        refresh_line(&mut stdout, prompt, session.buffer(), session.cursor())?;
                    }
                }
                EditAction::InsertChar(ch) => {
                    session.insert_char(ch);
                    refresh_line(&mut stdout, prompt, session.buffer(), session.cursor())?;
                }
                EditAction::Cancel | EditAction::Ignore => {}
            }
        }
    }
}

/// Tab を押すたびに候補を順に見せる状態。最後の候補の次は元の行に戻る。
struct CompletionCycle {
    candidates: Vec<String>,
    original: Vec<char>,
    index: usize,
}

impl CompletionCycle {
    fn new(candidates: Vec<String>, original: Vec<char>) -> Self {
        debug!(count = candidates.len(), "completion cycle");
        Self {
            candidates,
            original,
            index: 0,
        }
    }

    /// いま表示すべき行。
    fn current(&self) -> Vec<char> {
        match self.candidates.get(self.index) {
            Some(c) => c.chars().collect(),
            None => self.original.clone(),
        }
    }

    /// 次の候補へ進む。元の行に戻ったときは `true`。
    fn advance(&mut self) -> bool {
        self.index = (self.index + 1) % (self.candidates.len() + 1);
        self.index == self.candidates.len()
    }

    fn original(&self) -> Vec<char> {
        self.original.clone()
    }
}

/// 先頭バイトと後続バイトから UTF-8 の 1 文字を復元する。
fn read_utf8_char<R: Read>(first: u8, reader: &mut R) -> io::Result<Option<char>> {
    let width = match first {
        0x00..=0x7f => 1,
        0xc2..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf4 => 4,
        _ => return Ok(None),
    };
    let mut buf = [0u8; 4];
    buf[0] = first;
    for idx in 1..width {
        reader.read_exact(&mut buf[idx..idx + 1])?;
    }
    match std::str::from_utf8(&buf[..width]) {
        Ok(s) => Ok(s.chars().next()),
        Err(_) => Ok(None),
    }
}

#[cfg(unix)]
/// 読み取った制御シーケンスを内部の編集操作へ写像する。
fn interpret_action<R: Read>(first: u8, reader: &mut R) -> io::Result<EditAction> {
    match first {
        b'\n' | b'\r' => Ok(EditAction::Submit),
        b'\t' => Ok(EditAction::Complete),
        0x03 => Ok(EditAction::Interrupt),
        0x04 => Ok(EditAction::Eof),
        0x7f | 0x08 => Ok(EditAction::DeleteLeft),
        0x1b => {
            let mut seq = [0u8; 2];
            if reader.read_exact(&mut seq[..1]).is_err() {
                return Ok(EditAction::Ignore);
            }
            if seq[0] != b'[' {
                return Ok(EditAction::Ignore);
            }
            if reader.read_exact(&mut seq[1..2]).is_err() {
                return Ok(EditAction::Ignore);
            }
            Ok(match seq[1] {
                b'A' => EditAction::HistoryPrev,
                b'B' => EditAction::HistoryNext,
                b'C' => EditAction::MoveRight,
                b'D' => EditAction::MoveLeft,
                _ => EditAction::Ignore,
            })
        }
        _ => {
            if let Some(ch) = read_utf8_char(first, reader)? {
                if ch.is_control() {
                    Ok(EditAction::Ignore)
                } else {
                    Ok(EditAction::InsertChar(ch))
                }
            } else {
                Ok(EditAction::Ignore)
            }
        }
    }
}

#[cfg(unix)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditAction {
    Submit,
    Interrupt,
    Eof,
    Complete,
    Cancel,
    DeleteLeft,
    MoveLeft,
    MoveRight,
    HistoryPrev,
    HistoryNext,
    InsertChar(char),
    Ignore,
}

#[cfg(unix)]
struct EditorSession<'a> {
    buffer: Vec<char>,
    cursor: usize,
    history_index: usize,
    saved_current: Option<Vec<char>>,
    history: &'a History,
}

#[cfg(unix)]
impl<'a> EditorSession<'a> {
    fn new(history: &'a History) -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
            history_index: history.len(),
            saved_current: None,
            history,
        }
    }

    fn buffer(&self) -> &[char] {
        &self.buffer
    }

    fn cursor(&self) -> usize {
        self.cursor
    }

    fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn as_string(&self) -> String {
        self.buffer.iter().collect()
    }

    /// 行全体を置き換え、カーソルを末尾へ置く。
    fn replace(&mut self, buffer: Vec<char>) {
        self.buffer = buffer;
        self.cursor = self.buffer.len();
        self.reset_history_cursor();
    }

    fn insert_char(&mut self, ch: char) {
        self.buffer.insert(self.cursor, ch);
        self.cursor += 1;
        self.reset_history_cursor();
    }

    fn delete_left(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.buffer.remove(self.cursor);
        self.reset_history_cursor();
        true
    }

    fn move_left(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    fn move_right(&mut self) -> bool {
        if self.cursor >= self.buffer.len() {
            return false;
        }
        self.cursor += 1;
        true
    }

    fn history_prev(&mut self) -> bool {
        if self.history_index == 0 {
            return false;
        }
        if self.history_index == self.history.len() {
            self.saved_current = Some(self.buffer.clone());
        }
        self.history_index -= 1;
        if let Some(entry) = self.history.get(self.history_index) {
            self.buffer = entry.chars().collect();
            self.cursor = self.buffer.len();
            return true;
        }
        false
    }

    fn history_next(&mut self) -> bool {
        if self.history_index >= self.history.len() {
            return false;
        }
        self.history_index += 1;
        if self.history_index == self.history.len() {
            self.buffer = self.saved_current.clone().unwrap_or_default();
        } else if let Some(entry) = self.history.get(self.history_index) {
            self.buffer = entry.chars().collect();
        }
        self.cursor = self.buffer.len();
        true
    }

    fn into_string(self) -> String {
        self.buffer.into_iter().collect()
    }

    fn reset_history_cursor(&mut self) {
        self.history_index = self.history.len();
        self.saved_current = None;
    }
}

#[cfg(unix)]
/// バッファとカーソル位置に合わせて行全体を再描画する。
fn refresh_line<W: Write>(
    writer: &mut W,
    prompt: &str,
    buffer: &[char],
    cursor: usize,
) -> io::Result<()> {
    let rendered: String = buffer.iter().collect();
    write!(writer, "\r{}{}", prompt, rendered)?;
    write!(writer, "\x1b[K")?;
    let total = prompt.chars().count() + buffer.len();
    let target = prompt.chars().count() + cursor;
    if total > target {
        write!(writer, "\x1b[{}D", total - target)?;
    }
    writer.flush()
}

/// 入力履歴の保持と永続化を司る補助構造体。
struct History {
    entries: Vec<String>,
    path: Option<PathBuf>,
    max_entries: usize,
}

impl History {
    fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            path: None,
            max_entries,
        }
    }

    /// ファイルの各行を履歴として取り込む。
    ///
    /// 存在しなければ空のまま保存先だけ覚える。存在するのに読めない場合は
    /// 保存先を覚えない（終了時に既存の履歴を上書きしない）。
    /// UTF-8 として不正なバイトは置換文字にして読み込む。
    fn load_from(&mut self, path: &Path) {
        match fs::read(path) {
            Ok(bytes) => {
                let content = String::from_utf8_lossy(&bytes);
                for line in content.lines() {
                    self.add(line);
                }
                debug!(path = %path.display(), entries = self.entries.len(), "history loaded");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no history yet");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "history not loaded; it will not be saved");
                self.path = None;
                return;
            }
        }
        self.path = Some(path.to_path_buf());
    }

    /// 新しい入力を入力どおりに追加する。空白だけの行と直前の重複はスキップする。
    fn add(&mut self, entry: &str) {
        let entry = entry.trim_end_matches(['\r', '\n']);
        if entry.trim().is_empty() {
            return;
        }
        if self.entries.last().map(|s| s.as_str()) == Some(entry) {
            return;
        }
        if self.entries.len() == self.max_entries {
            self.entries.remove(0);
        }
        self.entries.push(entry.to_string());
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, idx: usize) -> Option<&str> {
        self.entries.get(idx).map(|s| s.as_str())
    }

    fn save(&self) -> io::Result<()> {
        match &self.path {
            Some(path) => self.save_to(path),
            None => Ok(()),
        }
    }

    fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = fs::File::create(path)?;
        for entry in &self.entries {
            writeln!(file, "{}", entry)?;
        }
        debug!(path = %path.display(), entries = self.entries.len(), "history saved");
        Ok(())
    }
}

#[cfg(unix)]
/// Raw モードへの切り替えと復帰を担う RAII ガード。
struct RawMode {
    original: Termios,
}

#[cfg(unix)]
impl RawMode {
    /// 標準入力の termios 設定を Raw モードへ変更する。
    #[allow(unexpected_cfgs)]
    #[cfg_attr(coverage, coverage(off))]
    fn new() -> io::Result<Self> {
        let fd = 0;
        let mut termios = Termios::default();
        if unsafe { tcgetattr(fd, &mut termios as *mut _) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let mut raw = termios;
        unsafe {
            cfmakeraw(&mut raw as *mut _);
        }
        if unsafe { tcsetattr(fd, TCSANOW, &raw as *const _) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { original: termios })
    }
}

#[cfg(unix)]
impl Drop for RawMode {
    #[allow(unexpected_cfgs)]
    #[cfg_attr(coverage, coverage(off))]
    fn drop(&mut self) {
        let fd = 0;
        unsafe {
            let _ = tcsetattr(fd, TCSANOW, &self.original as *const _);
        }
    }
}

#[cfg(unix)]
const TCSANOW: i32 = 0;

#[cfg(unix)]
#[repr(C)]
#[derive(Clone, Copy)]
/// POSIX 端末属性 (`termios`) を Rust 表現に写した構造体。
struct Termios {
    c_iflag: u32,
    c_oflag: u32,
    c_cflag: u32,
    c_lflag: u32,
    c_line: u8,
    c_cc: [u8; NCCS],
    c_ispeed: u32,
    c_ospeed: u32,
}

#[cfg(unix)]
impl Default for Termios {
    fn default() -> Self {
        Self {
            c_iflag: 0,
            c_oflag: 0,
            c_cflag: 0,
            c_lflag: 0,
            c_line: 0,
            c_cc: [0; NCCS],
            c_ispeed: 0,
            c_ospeed: 0,
        }
    }
}

#[cfg(unix)]
#[cfg(any(target_os = "linux", target_os = "android"))]
const NCCS: usize = 32;
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
))]
const NCCS: usize = 20;
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
)))]
const NCCS: usize = 32;

#[cfg(unix)]
extern "C" {
    fn isatty(fd: i32) -> i32;
    fn tcgetattr(fd: i32, termios: *mut Termios) -> i32;
    fn tcsetattr(fd: i32, optional_actions: i32, termios: *const Termios) -> i32;
    fn cfmakeraw(termios: *mut Termios);
}
