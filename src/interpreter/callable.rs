use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use strum::{EnumIter, IntoStaticStr};

use crate::ast::FnDecl;
use crate::interpreter::environment::Environment;
use crate::types::Type;

/// Something a call expression can invoke.
#[derive(Debug, Clone)]
pub enum Callable {
    Native(NativeFunction),
    User(Rc<UserFunction>),
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Self::Native(n) => n.name(),
            Self::User(u) => &u.name,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Self::Native(n) => n.arity(),
            Self::User(u) => u.declaration.params.len(),
        }
    }

    /// Identity comparison: two user functions are the same only if they
    /// come from the same evaluation of the same declaration.
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Native(a), Self::Native(b)) => a == b,
            (Self::User(a), Self::User(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(n) => write!(f, "<native fn {}>", n.name()),
            Self::User(u) => write!(f, "<fn {}>", u.name),
        }
    }
}

/// A function declared in source, closed over the scope it was declared in.
#[derive(Debug)]
pub struct UserFunction {
    /// The binding name; for `let f = fn(...)` this is `f`, not the
    /// literal's synthetic name.
    pub name: String,
    pub declaration: Rc<FnDecl>,
    pub closure: Rc<RefCell<Environment>>,
}

impl UserFunction {
    pub fn new(
        name: impl Into<String>,
        declaration: Rc<FnDecl>,
        closure: Rc<RefCell<Environment>>,
    ) -> Self {
        Self {
            name: name.into(),
            declaration,
            closure,
        }
    }
}

/// Built-ins installed into the global scope of every interpreter and
/// the root scope of every type checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum NativeFunction {
    Clock,
    Print,
    Println,
}

impl NativeFunction {
    pub fn name(&self) -> &'static str {
        (*self).into()
    }

    pub fn arity(&self) -> usize {
        match self {
            Self::Clock => 0,
            Self::Print | Self::Println => 1,
        }
    }

    /// Static signature. A `none` parameter accepts an argument of any type.
    pub fn signature(&self) -> Type {
        match self {
            Self::Clock => Type::function(vec![], Type::Int),
            Self::Print | Self::Println => Type::function(vec![Type::None], Type::None),
        }
    }

    /// Milliseconds since the Unix epoch, saturating rather than failing on
    /// a clock set before 1970.
    pub(crate) fn clock_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    #[case(NativeFunction::Clock, "clock", 0)]
    #[case(NativeFunction::Print, "print", 1)]
    #[case(NativeFunction::Println, "println", 1)]
    fn native_names_and_arity(
        #[case] native: NativeFunction,
        #[case] name: &str,
        #[case] arity: usize,
    ) {
        assert_eq!(native.name(), name);
        assert_eq!(native.arity(), arity);
    }

    #[test]
    fn signatures_agree_with_arity() {
        for native in NativeFunction::iter() {
            let Type::Function { params, .. } = native.signature() else {
                panic!("{} should have a function type", native.name());
            };
            assert_eq!(params.len(), native.arity());
        }
    }

    #[test]
    fn clock_is_after_2020() {
        assert!(NativeFunction::clock_millis() > 1_577_836_800_000);
    }

    #[test]
    fn natives_compare_by_kind() {
        let a = Callable::Native(NativeFunction::Print);
        let b = Callable::Native(NativeFunction::Print);
        let c = Callable::Native(NativeFunction::Println);
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert_eq!(c.to_string(), "<native fn println>");
    }
}
