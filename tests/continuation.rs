// パス: tests/continuation.rs
// 役割: 複数行に分けた入力が一括入力と同じ結果になることを検証する
// 意図: 継続判定の両戦略が途中行をエラー扱いしないことを保証する
// 関連ファイル: src/continuation.rs, src/repl/cmd.rs, tests/test_support.rs
#[path = "test_support.rs"]
mod support;

use lunette::continuation::Strategy;
use lunette::repl::{Outcome, PromptMode, Session};
use pretty_assertions::assert_eq;
use support::{capturing_interpreter, Capture};

const STRATEGIES: [Strategy; 2] = [Strategy::Structured, Strategy::Suffix];

/// 複数行の文と、その後に評価して結果を確かめる式。
const CASES: &[(&str, &str)] = &[
    (
        "function fib(n)\n  if n < 2 then\n    return n\n  end\n  return fib(n - 1) + fib(n - 2)\nend",
        "=fib(10)",
    ),
    ("t = {\n  1,\n  2,\n  k = 'v'\n}", "=t"),
    ("for i = 1, 3 do\n  io.write(i, ' ')\nend", ".'done'"),
    ("s = 'a' ..\n  'b' ..\n  'c'", "=s"),
    ("x = (\n  1 +\n  2\n)", "=x"),
    ("repeat\n  n = (n or 0) + 1\nuntil n >= 3", "=n"),
    ("long = [[first\nsecond]]", "=long"),
    (
        "Obj = setmetatable({}, {\n  __index = {\n    greet = function(self, who) return 'hi ' .. who end\n  }\n})",
        "=Obj:greet('you')",
    ),
];

fn fresh(strategy: Strategy) -> (Session, Capture) {
    let (interp, out) = capturing_interpreter();
    (Session::new(interp, strategy), out)
}

/// 行を 1 行ずつ渡したときの各結果と出力。
fn submit_split(strategy: Strategy, lines: &[&str], follow: &str) -> (Vec<Outcome>, String) {
    let (mut session, out) = fresh(strategy);
    let mut outcomes: Vec<Outcome> = lines.iter().map(|l| session.handle_line(l)).collect();
    outcomes.push(session.handle_line(follow));
    (outcomes, out.text())
}

/// 文全体を 1 回で渡したときの結果と出力。
fn submit_whole(strategy: Strategy, stmt: &str, follow: &str) -> (Vec<Outcome>, String) {
    let (mut session, out) = fresh(strategy);
    let outcomes = vec![session.handle_line(stmt), session.handle_line(follow)];
    (outcomes, out.text())
}

#[test]
/// 分割入力と一括入力の出力が一致し、途中行はすべて継続扱いになる。
fn split_statements_match_whole_submission() {
    for strategy in STRATEGIES {
        for (stmt, follow) in CASES {
            let lines: Vec<&str> = stmt.split('\n').collect();
            let (split_outcomes, split_out) = submit_split(strategy, &lines, follow);
            let (whole_outcomes, whole_out) = submit_whole(strategy, stmt, follow);

            let n = lines.len();
            for (i, o) in split_outcomes[..n - 1].iter().enumerate() {
                assert_eq!(o, &Outcome::NeedMore, "{} line {} of {:?}", strategy, i + 1, stmt);
            }
            // 文の最終行と後続の式はどちらも評価済み
            assert_eq!(&split_outcomes[n - 1..], &whole_outcomes[..], "{} {:?}", strategy, stmt);
            assert_eq!(split_out, whole_out, "{} {:?}", strategy, stmt);
        }
    }
}

#[test]
fn outputs_of_cases_are_as_expected() {
    let expected = [
        "55\n",
        "{1,2,k=\"v\"}\n",
        "1 2 3 done\n",
        "\"abc\"\n",
        "3\n",
        "3\n",
        "\"first\\nsecond\"\n",
        "\"hi you\"\n",
    ];
    for ((stmt, follow), want) in CASES.iter().zip(expected) {
        let (_, out) = submit_whole(Strategy::Structured, stmt, follow);
        assert_eq!(out, want, "{:?}", stmt);
    }
}

#[test]
/// 途中で実エラーになった場合も、一括入力と同じ文言で報告される。
fn real_error_midway_matches_whole_submission() {
    let stmt = "if flag then\n  y = = 1\nend";
    for strategy in STRATEGIES {
        let (mut session, out) = fresh(strategy);
        assert_eq!(session.handle_line("if flag then"), Outcome::NeedMore);
        let split = session.handle_line("  y = = 1");
        assert_eq!(session.mode(), PromptMode::Primary);
        assert_eq!(session.buffer(), "");

        let (mut whole, _) = fresh(strategy);
        let one_shot = whole.handle_line(stmt);
        assert_eq!(split, one_shot);
        let Outcome::Failed(text) = split else {
            panic!("expected a reported error");
        };
        assert!(!text.starts_with("[chunk"), "{}", text);
        assert!(out.text().is_empty());
    }
}

#[test]
/// 途中行では副作用が起きない（バッファは全体で評価される）。
fn incomplete_prefix_has_no_side_effects() {
    let (mut session, out) = fresh(Strategy::Structured);
    assert_eq!(session.handle_line("print('before')"), Outcome::Evaluated);
    assert_eq!(session.handle_line("do print('inside')"), Outcome::NeedMore);
    assert_eq!(out.take(), "before\n");
    assert_eq!(session.handle_line("end"), Outcome::Evaluated);
    assert_eq!(out.take(), "inside\n");
}
