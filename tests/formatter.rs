// パス: tests/formatter.rs
// 役割: 整形表示の性質（循環・引用・打ち切り）を外部 API から検証する
// 意図: 任意の入力で停止し、引用した文字列が元に戻ることを保証する
// 関連ファイル: src/format.rs, src/lexer.rs, tests/test_support.rs
#[path = "test_support.rs"]
mod support;

use lunette::format::{format_value, quote_str, FormatOptions, CYCLE_MARKER};
use lunette::lexer::decode_escapes;
use lunette::value::{TableRef, Value};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use support::{capturing_interpreter, run_ok};

/// `n` 個のテーブルを `next` で連結し、末尾から `back` 番目へ戻る辺を張る。
fn ring(n: usize, back: usize) -> TableRef {
    let nodes: Vec<TableRef> = (0..n).map(|_| TableRef::new()).collect();
    for (i, node) in nodes.iter().enumerate() {
        node.set("id", Value::Number(i as f64)).unwrap();
        let next = if i + 1 < n { &nodes[i + 1] } else { &nodes[back] };
        node.set("next", Value::Table(next.clone())).unwrap();
    }
    nodes[0].clone()
}

fn unquote(token: &str) -> &str {
    assert!(token.len() >= 2 && token.starts_with('"') && token.ends_with('"'));
    &token[1..token.len() - 1]
}

proptest! {
    #[test]
    /// どの深さの自己参照でも停止し、再帰点にちょうど 1 個の循環マーカーを出す。
    fn cyclic_rings_terminate(n in 1usize..40, back_seed in 0usize..40) {
        let back = back_seed % n;
        let (mut interp, _) = capturing_interpreter();
        let head = ring(n, back);
        let text = format_value(&Value::Table(head.clone()), &FormatOptions::default(), &mut interp);
        prop_assert_eq!(text.matches(CYCLE_MARKER).count(), 1);
        prop_assert_eq!(text.matches("next=").count(), n);
        // 名前空間を壊さないよう後始末
        head.clear();
    }

    #[test]
    /// 引用符と制御文字を含む文字列も、エスケープを戻すと元に一致する。
    fn quoted_strings_decode_back(s in any::<String>()) {
        let token = quote_str(&s);
        let decoded = decode_escapes(unquote(&token)).unwrap();
        prop_assert_eq!(decoded, s);
    }

    #[test]
    /// 引用した文字列はそのまま文字列リテラルとして読み戻せる。
    fn quoted_ascii_reparses(s in "[\\x00-\\x7f]{0,40}") {
        let (mut interp, _) = capturing_interpreter();
        let src = format!("v = {}", quote_str(&s));
        prop_assert!(interp.evaluate(&src).is_ok(), "{}", src);
        prop_assert_eq!(interp.get_global("v"), Value::str(&s));
    }

    #[test]
    /// 上限を超える大きさの配列は上限付近で打ち切られる。
    fn truncation_bounds_output(len in 1usize..300, limit in 1usize..50) {
        let (mut interp, _) = capturing_interpreter();
        let t = TableRef::from_array((0..len).map(|i| Value::Number(i as f64)));
        let opts = FormatOptions { limit, raw: false };
        let text = format_value(&Value::Table(t), &opts, &mut interp);
        let tokens = 2 * len + 1;
        if tokens > limit {
            prop_assert!(text.ends_with("..."));
        } else {
            prop_assert!(text.ends_with('}'), "expected output to end with a closing brace: {}", text);
        }
    }
}

#[test]
/// 配列部は位置だけ、連想部は key=value で出る。
fn arrays_and_records_render_as_documented() {
    let (mut interp, _) = capturing_interpreter();
    run_ok(&mut interp, "a = {10, 20, 30} r = {x = 1, y = 2}");
    let opts = FormatOptions::default();
    let a = interp.get_global("a");
    let r = interp.get_global("r");
    assert_eq!(format_value(&a, &opts, &mut interp), "{10,20,30}");
    assert_eq!(format_value(&r, &opts, &mut interp), "{x=1,y=2}");
}

#[test]
/// 同じテーブルを 2 箇所から参照すると 2 回目は循環マーカーになる。
fn shared_reference_is_marked_once() {
    let (mut interp, _) = capturing_interpreter();
    run_ok(&mut interp, "inner = {1} outer = {a = inner, b = inner}");
    let v = interp.get_global("outer");
    assert_eq!(
        format_value(&v, &FormatOptions::default(), &mut interp),
        "{a={1},b=<cycle>}"
    );
}

#[test]
/// `=` 相当の表示は `_` に先頭の値を束縛し、タブ区切りで出力する。
fn pprint_binds_last_result() {
    let (mut interp, out) = capturing_interpreter();
    run_ok(&mut interp, "pprint({1, 'two'}, nil, print)");
    assert_eq!(out.take(), "{1,\"two\"}\tnil\t<fun>\n");
    run_ok(&mut interp, "pprint(#_)");
    assert_eq!(out.take(), "2\n");
}

#[test]
/// `dump` のオプションで上限と生モードを指定できる。
fn dump_accepts_options() {
    let (mut interp, out) = capturing_interpreter();
    run_ok(
        &mut interp,
        r#"
        p = setmetatable({x = 1}, {__tostring = function() return "P" end})
        print(dump(p))
        print(dump(p, {raw = true}))
        print(dump({1, 2, 3, 4, 5}, {limit = 4}))
        "#,
    );
    assert_eq!(out.take(), "P\n{x=1}\n{1,2,...\n");
}

#[test]
fn host_values_show_public_members_only() {
    let (mut interp, _) = capturing_interpreter();
    lunette::builtins::register_demo(&mut interp);
    let opts = FormatOptions::default();
    let st = interp.get_global("ST");
    let s = interp.get_global("S");
    let st_text = format_value(&st, &opts, &mut interp);
    let s_text = format_value(&s, &opts, &mut interp);
    assert_eq!(st_text, "{Name=\"Dolly\",String=true,Greet=true}");
    assert_eq!(s_text, "{Name=\"Joe\",String=true,Greet=true}");
    assert!(!st_text.contains("age"));
    assert!(!st_text.contains("secret"));
}
