// パス: tests/completion.rs
// 役割: 補完候補の生成を名前空間の実データで検証する
// 意図: 前方一致・経路の途切れ・ホスト値の公開範囲・委譲先の扱いを外部 API で固定する
// 関連ファイル: src/complete.rs, src/host.rs, tests/test_support.rs
#[path = "test_support.rs"]
mod support;

use lunette::complete::{complete, CompletionQuery};
use lunette::host::Directory;
use lunette::value::Value;
use lunette::Interpreter;
use pretty_assertions::assert_eq;
use support::{capturing_interpreter, run_ok};

fn setup(src: &str) -> Interpreter {
    let (mut interp, _) = capturing_interpreter();
    lunette::builtins::register_demo(&mut interp);
    run_ok(&mut interp, src);
    interp
}

fn candidates(interp: &mut Interpreter, line: &str) -> Vec<String> {
    let globals = interp.globals();
    complete(line, &globals, interp)
}

fn sorted(mut v: Vec<String>) -> Vec<String> {
    v.sort();
    v
}

#[test]
/// 末尾の葉が空ならすべてのキーが候補になる。
fn empty_leaf_lists_every_key() {
    let mut interp = setup("obj = {A = 1, b = 2, Bar = 3}");
    assert_eq!(
        sorted(candidates(&mut interp, "obj.")),
        vec!["obj.A", "obj.Bar", "obj.b"]
    );
}

#[test]
fn leaf_prefix_is_case_sensitive() {
    let mut interp = setup("obj = {A = 1, b = 2, Bar = 3}");
    assert_eq!(candidates(&mut interp, "obj.B"), vec!["obj.Bar"]);
}

#[test]
/// 未定義の名前を辿ろうとしたら候補なし（エラーにもならない）。
fn undefined_head_yields_nothing() {
    let mut interp = setup("");
    assert!(candidates(&mut interp, "xq.").is_empty());
    assert!(candidates(&mut interp, "xq.y.z").is_empty());
}

#[test]
/// 候補の順序は呼び出しごとに変わらない。
fn candidate_order_is_deterministic() {
    let mut interp = setup("obj = {zeta = 1, alpha = 2, mid = 3, [1] = 'x'}");
    let first = candidates(&mut interp, "obj.");
    for _ in 0..5 {
        assert_eq!(candidates(&mut interp, "obj."), first);
    }
}

#[test]
/// 非公開のフィールドとメソッドはディレクトリにも候補にも現れない。
fn host_directory_filters_private_members() {
    let mut interp = setup("");
    let st = interp.get_global("ST");
    let Value::Host(host) = &st else {
        panic!("ST should be a host value, got {:?}", st);
    };
    let dir = Directory::of(host);
    let names: Vec<String> = dir.entries().iter().map(|(k, _)| k.plain_string()).collect();
    assert!(names.contains(&"Name".to_string()));
    assert!(!names.contains(&"age".to_string()));
    assert!(!names.contains(&"secret".to_string()));

    let found = candidates(&mut interp, "ST.");
    assert!(found.contains(&"ST.Name".to_string()));
    assert!(!found.iter().any(|c| c == "ST.age" || c == "ST.secret"));
}

#[test]
/// 参照的なハンドルと値的なハンドルで同じ候補が出る。
fn reference_and_value_handles_agree() {
    let mut interp = setup("");
    let by_ref: Vec<String> = candidates(&mut interp, "ST.")
        .into_iter()
        .map(|c| c.trim_start_matches("ST.").to_string())
        .collect();
    let by_val: Vec<String> = candidates(&mut interp, "S.")
        .into_iter()
        .map(|c| c.trim_start_matches("S.").to_string())
        .collect();
    assert_eq!(by_ref, by_val);
}

#[test]
/// ディレクトリは毎回作り直され、現在のフィールド値を映す。
fn directory_reflects_current_field_values() {
    let mut interp = setup("ST.Name = 'Molly'");
    let Value::Host(host) = interp.get_global("ST") else {
        panic!("ST should be a host value");
    };
    let name = Directory::of(&host)
        .entries()
        .into_iter()
        .find(|(k, _)| k.plain_string() == "Name")
        .map(|(_, v)| v);
    assert_eq!(name, Some(Value::str("Molly")));
}

#[test]
/// `__index` の委譲先のキーも候補に含まれる。
fn fallback_container_keys_are_merged() {
    let mut interp = setup(
        r#"
        Animal = {}
        Animal.__index = Animal
        function Animal.new(name) return setmetatable({name = name}, Animal) end
        function Animal:speak() return self.name end
        pet = Animal.new("rex")
        "#,
    );
    assert_eq!(
        sorted(candidates(&mut interp, "pet:")),
        vec!["pet:__index", "pet:name", "pet:new", "pet:speak"]
    );
    assert_eq!(candidates(&mut interp, "pet:sp"), vec!["pet:speak"]);
}

#[test]
/// 行頭の文脈はそのまま各候補の前に付く。
fn leading_text_is_kept_verbatim() {
    let mut interp = setup("config = {verbose = true, version = 2}");
    assert_eq!(
        candidates(&mut interp, "if x then print(config.ver"),
        vec!["if x then print(config.verbose", "if x then print(config.version"]
    );
}

#[test]
fn query_parsing_splits_at_last_separator() {
    let q = CompletionQuery::parse("x = a.b:c").unwrap();
    assert_eq!((q.leading, q.prefix_path, q.partial_leaf), ("x = ", "a.b:", "c"));
    assert!(CompletionQuery::parse("print(").is_none());
}

#[test]
/// 補完は名前空間を書き換えない。
fn completion_does_not_mutate_namespace() {
    let mut interp = setup("obj = {a = 1}");
    let before = interp.globals().borrow().len_total();
    let _ = candidates(&mut interp, "obj.");
    let _ = candidates(&mut interp, "nothing.here.");
    assert_eq!(interp.globals().borrow().len_total(), before);
    assert_eq!(interp.get_global("nothing"), Value::Nil);
}
