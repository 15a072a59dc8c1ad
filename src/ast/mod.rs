pub mod printer;

use std::cell::OnceCell;
use std::rc::Rc;

use serde::Serialize;

use crate::scanner::token::Span;
use crate::types::Type;

/// Slot for the type the checker assigns to a node. Written at most once.
pub type TypeSlot = OnceCell<Type>;

/// Top-level program: a list of statements.
#[derive(Debug, Clone, Serialize)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Stmt {
    Expression(ExprStmt),
    Let(LetStmt),
    Block(BlockStmt),
    If(IfStmt),
    While(WhileStmt),
    Fn(Rc<FnDecl>),
    Return(ReturnStmt),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Self::Expression(s) => s.span,
            Self::Let(s) => s.span,
            Self::Block(s) => s.span,
            Self::If(s) => s.span,
            Self::While(s) => s.span,
            Self::Fn(s) => s.span,
            Self::Return(s) => s.span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExprStmt {
    pub expression: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct LetStmt {
    pub name: String,
    pub annotation: Option<TypeExpr>,
    pub initializer: Option<Expr>,
    /// Declared or inferred type of the binding.
    #[serde(skip)]
    pub binding_type: TypeSlot,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockStmt {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct IfStmt {
    pub condition: Expr,
    pub then_branch: BlockStmt,
    /// Either a `Stmt::Block` (`else { }`) or a `Stmt::If` (`else if`).
    pub else_branch: Option<Box<Stmt>>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct WhileStmt {
    pub condition: Expr,
    pub body: BlockStmt,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReturnStmt {
    pub value: Option<Expr>,
    pub span: Span,
}

/// A function declaration, shared between the tree and every closure
/// created from it.
#[derive(Debug, Clone, Serialize)]
pub struct FnDecl {
    pub name: String,
    pub anonymous: bool,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Vec<Stmt>,
    #[serde(skip)]
    pub fn_type: TypeSlot,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct Param {
    pub name: String,
    pub annotation: Option<TypeExpr>,
    pub span: Span,
}

/// A type annotation as written in source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum TypeExpr {
    Named {
        name: String,
        span: Span,
    },
    Function {
        params: Vec<TypeExpr>,
        ret: Option<Box<TypeExpr>>,
        span: Span,
    },
}

impl TypeExpr {
    pub fn span(&self) -> Span {
        match self {
            Self::Named { span, .. } | Self::Function { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Expr {
    Literal(LiteralExpr),
    Binary(BinaryExpr),
    Variable(VariableExpr),
    Assign(AssignExpr),
    Grouping(GroupingExpr),
    Unary(UnaryExpr),
    Call(CallExpr),
    Function(FunctionExpr),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Self::Literal(e) => e.span,
            Self::Binary(e) => e.span,
            Self::Variable(e) => e.span,
            Self::Assign(e) => e.span,
            Self::Grouping(e) => e.span,
            Self::Unary(e) => e.span,
            Self::Call(e) => e.span,
            Self::Function(e) => e.span,
        }
    }

    pub fn type_slot(&self) -> &TypeSlot {
        match self {
            Self::Literal(e) => &e.value_type,
            Self::Binary(e) => &e.value_type,
            Self::Variable(e) => &e.value_type,
            Self::Assign(e) => &e.value_type,
            Self::Grouping(e) => &e.value_type,
            Self::Unary(e) => &e.value_type,
            Self::Call(e) => &e.value_type,
            Self::Function(e) => &e.value_type,
        }
    }

    /// The type assigned by the checker, if it has run over this node.
    pub fn value_type(&self) -> Option<&Type> {
        self.type_slot().get()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LiteralExpr {
    pub value: LiteralValue,
    #[serde(skip)]
    pub value_type: TypeSlot,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LiteralValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl LiteralValue {
    /// Numbers without a fractional part are integers.
    pub fn number(value: f64) -> Self {
        if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 {
            Self::Int(value as i64)
        } else {
            Self::Float(value)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BinaryExpr {
    pub left: Box<Expr>,
    pub operator: BinaryOp,
    pub right: Box<Expr>,
    #[serde(skip)]
    pub value_type: TypeSlot,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "//")]
    FloorDivide,
    #[strum(serialize = "==")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterEqual,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariableExpr {
    pub name: String,
    #[serde(skip)]
    pub value_type: TypeSlot,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignExpr {
    pub name: String,
    pub value: Box<Expr>,
    #[serde(skip)]
    pub value_type: TypeSlot,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupingExpr {
    pub expression: Box<Expr>,
    #[serde(skip)]
    pub value_type: TypeSlot,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnaryExpr {
    pub operator: UnaryOp,
    pub operand: Box<Expr>,
    #[serde(skip)]
    pub value_type: TypeSlot,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum UnaryOp {
    #[strum(serialize = "-")]
    Negate,
    #[strum(serialize = "!")]
    Not,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallExpr {
    pub callee: Box<Expr>,
    pub arguments: Vec<Expr>,
    #[serde(skip)]
    pub value_type: TypeSlot,
    pub span: Span,
}

/// A function literal used as an expression.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionExpr {
    pub decl: Rc<FnDecl>,
    #[serde(skip)]
    pub value_type: TypeSlot,
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(2.0, LiteralValue::Int(2))]
    #[case(0.0, LiteralValue::Int(0))]
    #[case(2.5, LiteralValue::Float(2.5))]
    #[case(1e300, LiteralValue::Float(1e300))]
    fn number_literal_classification(#[case] value: f64, #[case] expected: LiteralValue) {
        assert_eq!(LiteralValue::number(value), expected);
    }

    #[test]
    fn type_slot_is_written_once() {
        let expr = Expr::Variable(VariableExpr {
            name: "x".to_string(),
            value_type: TypeSlot::new(),
            span: Span::new(0, 1, 1),
        });
        assert!(expr.value_type().is_none());
        assert!(expr.type_slot().set(Type::Int).is_ok());
        assert!(expr.type_slot().set(Type::Float).is_err());
        assert_eq!(expr.value_type(), Some(&Type::Int));
    }
}
