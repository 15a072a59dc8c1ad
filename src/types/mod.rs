pub mod checker;

use std::fmt;

use crate::ast::TypeExpr;

pub use checker::{TypeChecker, type_check};

/// Static types. Equality is structural: derived `PartialEq` compares
/// variants, function signatures element-wise, and user types by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    String,
    Bool,
    /// No meaningful value; as a parameter type it means "unconstrained".
    None,
    Function {
        params: Vec<Type>,
        ret: Box<Type>,
    },
    /// A nominal type that is named but never resolved to a structure.
    User(String),
}

impl Type {
    pub fn function(params: Vec<Type>, ret: Type) -> Self {
        Self::Function {
            params,
            ret: Box::new(ret),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    /// Resolve a written annotation. Primitive names map to their types,
    /// anything else becomes a user type.
    pub fn from_annotation(annotation: &TypeExpr) -> Self {
        match annotation {
            TypeExpr::Named { name, .. } => match name.as_str() {
                "int" => Self::Int,
                "float" => Self::Float,
                "string" => Self::String,
                "bool" => Self::Bool,
                "none" => Self::None,
                other => Self::User(other.to_string()),
            },
            TypeExpr::Function { params, ret, .. } => Self::function(
                params.iter().map(Self::from_annotation).collect(),
                ret.as_deref().map_or(Self::None, Self::from_annotation),
            ),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::Bool => write!(f, "bool"),
            Self::None => write!(f, "none"),
            Self::Function { params, ret } => {
                write!(f, "fn(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") -> {ret}")
            }
            Self::User(name) => write!(f, "{name}"),
        }
    }
}
