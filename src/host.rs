// パス: src/host.rs
// 役割: Host-structured values and the namespace bridge that lists their public surface
// 意図: Let the formatter and completion resolver treat host objects like tables
// 関連ファイル: src/value.rs, src/interpreter.rs, src/complete.rs, src/builtins.rs
//! ホスト構造体と名前空間ブリッジ。
//!
//! - ホスト側の型は `TypeDescriptor` でフィールド・メソッドと公開可否を宣言する。
//! - `HostRef` は参照的ハンドル（フィールド代入可）と値的ハンドル（読み取り専用）の
//!   どちらでも同じ型記述子へ解決されるため、両者のディレクトリは一致する。
//! - `Directory::of` は呼ぶたびに作り直す（キャッシュしない）。フィールドの現在値を映す。

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::value::{Container, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Method,
}

/// 型が宣言するメンバ 1 件。
#[derive(Clone, Copy, Debug)]
pub struct MemberDecl {
    pub name: &'static str,
    pub kind: MemberKind,
    pub public: bool,
}

/// ホスト型の記述子。メンバは宣言順に並ぶ。
#[derive(Debug)]
pub struct TypeDescriptor {
    pub name: &'static str,
    pub members: &'static [MemberDecl],
}

impl TypeDescriptor {
    pub fn member(&self, name: &str) -> Option<&MemberDecl> {
        self.members.iter().find(|m| m.name == name)
    }

    /// 公開メンバのみを返す。
    pub fn public_member(&self, name: &str) -> Option<&MemberDecl> {
        self.member(name).filter(|m| m.public)
    }
}

/// ホスト側で実装される構造化オブジェクト。
pub trait HostObject {
    fn descriptor(&self) -> &'static TypeDescriptor;
    fn field(&self, name: &str) -> Option<Value>;
    fn set_field(&mut self, name: &str, value: Value) -> Result<(), String>;
    fn call_method(&mut self, name: &str, args: Vec<Value>) -> Result<Vec<Value>, String>;
    /// 独自の文字列化。宣言しない型は `None`。
    fn stringify(&self) -> Option<String> {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Indirection {
    /// 参照的ハンドル（ポインタ相当）。
    Reference,
    /// 値的ハンドル（コピー相当）。公開フィールドへの代入を拒否する。
    Value,
}

#[derive(Clone)]
pub struct HostRef {
    obj: Rc<RefCell<dyn HostObject>>,
    indirection: Indirection,
}

impl HostRef {
    pub fn by_reference(obj: impl HostObject + 'static) -> Self {
        Self {
            obj: Rc::new(RefCell::new(obj)),
            indirection: Indirection::Reference,
        }
    }

    pub fn by_value(obj: impl HostObject + 'static) -> Self {
        Self {
            obj: Rc::new(RefCell::new(obj)),
            indirection: Indirection::Value,
        }
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.obj) as *const () as usize
    }

    pub fn indirection(&self) -> Indirection {
        self.indirection
    }

    /// 間接参照を 1 段はがした先の型記述子。
    pub fn descriptor(&self) -> &'static TypeDescriptor {
        self.obj.borrow().descriptor()
    }

    pub fn type_name(&self) -> &'static str {
        self.descriptor().name
    }

    pub fn stringify(&self) -> Option<String> {
        self.obj.borrow().stringify()
    }

    /// 公開メンバの読み出し。メソッドは呼び出し可能な値として返る。
    pub fn get(&self, name: &str) -> Option<Value> {
        let decl = self.descriptor().public_member(name)?;
        match decl.kind {
            MemberKind::Field => self.obj.borrow().field(name),
            MemberKind::Method => Some(Value::Function(crate::value::Function::HostMethod(
                Rc::from(name),
            ))),
        }
    }

    pub fn set(&self, name: &str, value: Value) -> Result<(), String> {
        let ty = self.descriptor();
        match ty.public_member(name) {
            Some(MemberDecl {
                kind: MemberKind::Field,
                ..
            }) => {}
            _ => return Err(format!("no public field '{}' on {}", name, ty.name)),
        }
        if self.indirection == Indirection::Value {
            return Err(format!(
                "cannot assign field '{}' of a {} held by value",
                name, ty.name
            ));
        }
        self.obj.borrow_mut().set_field(name, value)
    }

    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Vec<Value>, String> {
        let ty = self.descriptor();
        match ty.public_member(name) {
            Some(MemberDecl {
                kind: MemberKind::Method,
                ..
            }) => {}
            _ => return Err(format!("no public method '{}' on {}", name, ty.name)),
        }
        let mut obj = self
            .obj
            .try_borrow_mut()
            .map_err(|_| format!("{} is busy", ty.name))?;
        obj.call_method(name, args)
    }
}

impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: 0x{:08x}", self.type_name(), self.id())
    }
}

/// ホスト構造体の公開面を名前→値の対応として合成したビュー。
#[derive(Clone, Debug, Default)]
pub struct Directory {
    entries: Vec<(String, Value)>,
}

impl Directory {
    /// 公開フィールドは現在値、公開メソッドは `true` を対応させる。
    pub fn of(host: &HostRef) -> Self {
        let ty = host.descriptor();
        let obj = host.obj.borrow();
        let mut entries = Vec::new();
        for kind in [MemberKind::Field, MemberKind::Method] {
            for m in ty.members.iter().filter(|m| m.public && m.kind == kind) {
                let value = match kind {
                    MemberKind::Field => obj.field(m.name).unwrap_or_default(),
                    // メソッドは列挙のみで呼び出さない
                    MemberKind::Method => Value::Bool(true),
                };
                entries.push((m.name.to_string(), value));
            }
        }
        Self { entries }
    }

    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.entries
            .iter()
            .map(|(k, v)| (Value::str(k), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Container for Directory {
    fn lookup(&self, key: &str) -> Option<Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// 起動時に登録するデモ用の型

pub static PERSON_TYPE: TypeDescriptor = TypeDescriptor {
    name: "Person",
    members: &[
        MemberDecl {
            name: "Name",
            kind: MemberKind::Field,
            public: true,
        },
        MemberDecl {
            name: "age",
            kind: MemberKind::Field,
            public: false,
        },
        MemberDecl {
            name: "String",
            kind: MemberKind::Method,
            public: true,
        },
        MemberDecl {
            name: "Greet",
            kind: MemberKind::Method,
            public: true,
        },
        MemberDecl {
            name: "secret",
            kind: MemberKind::Method,
            public: false,
        },
    ],
};

#[derive(Clone, Debug)]
pub struct Person {
    pub name: String,
    pub age: u32,
}

impl Person {
    pub fn new(name: &str, age: u32) -> Self {
        Self {
            name: name.to_string(),
            age,
        }
    }
}

impl HostObject for Person {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &PERSON_TYPE
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "Name" => Some(Value::str(&self.name)),
            "age" => Some(Value::Number(self.age as f64)),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<(), String> {
        match (name, value) {
            ("Name", Value::Str(s)) => {
                self.name = s.to_string();
                Ok(())
            }
            ("Name", other) => Err(format!(
                "field 'Name' expects a string, got {}",
                other.type_name()
            )),
            _ => Err(format!("no field '{}'", name)),
        }
    }

    fn call_method(&mut self, name: &str, args: Vec<Value>) -> Result<Vec<Value>, String> {
        match name {
            "String" => Ok(vec![Value::str(&self.name)]),
            "Greet" => {
                let whom = args
                    .first()
                    .and_then(Value::as_str)
                    .unwrap_or("stranger")
                    .to_string();
                Ok(vec![Value::from(format!(
                    "Hello, {}! I am {}.",
                    whom, self.name
                ))])
            }
            "secret" => Ok(vec![Value::Number(self.age as f64)]),
            _ => Err(format!("no method '{}'", name)),
        }
    }
}
