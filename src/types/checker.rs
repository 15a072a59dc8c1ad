use std::collections::HashMap;

use strum::IntoEnumIterator;

use crate::ast::*;
use crate::error::CompileError;
use crate::interpreter::callable::NativeFunction;
use crate::scanner::token::Span;
use crate::types::Type;

/// Type-check a program, annotating every expression in place.
pub fn type_check(program: Program) -> Result<Program, CompileError> {
    TypeChecker::new().check(&program)?;
    Ok(program)
}

/// Single-pass checker over a stack of scopes, innermost last. The root
/// scope holds the built-ins' signatures.
#[derive(Debug, Clone)]
pub struct TypeChecker {
    scopes: Vec<HashMap<String, Type>>,
    /// Declared return types of the functions being checked, innermost last.
    returns: Vec<Type>,
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeChecker {
    pub fn new() -> Self {
        let globals = NativeFunction::iter()
            .map(|native| (native.name().to_string(), native.signature()))
            .collect();
        Self {
            scopes: vec![globals],
            returns: Vec::new(),
        }
    }

    pub fn check(&mut self, program: &Program) -> Result<(), CompileError> {
        let result = self.check_stmts(&program.statements);
        match &result {
            Ok(()) => tracing::debug!(count = program.statements.len(), "type check passed"),
            Err(e) => tracing::debug!(error = %e, "type check failed"),
        }
        result
    }

    /// Type bound to `name` in the innermost scope that has it.
    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn declare(&mut self, name: &str, ty: Type) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
    }

    fn check_stmts(&mut self, stmts: &[Stmt]) -> Result<(), CompileError> {
        stmts.iter().try_for_each(|stmt| self.check_stmt(stmt))
    }

    fn check_scoped(&mut self, stmts: &[Stmt]) -> Result<(), CompileError> {
        self.scopes.push(HashMap::new());
        let result = self.check_stmts(stmts);
        self.scopes.pop();
        result
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expression(e) => self.check_expr(&e.expression).map(|_| ()),
            Stmt::Let(l) => self.check_let(l),
            Stmt::Block(b) => self.check_scoped(&b.statements),
            Stmt::If(i) => {
                self.check_expr(&i.condition)?;
                self.check_scoped(&i.then_branch.statements)?;
                match &i.else_branch {
                    Some(else_branch) => self.check_stmt(else_branch),
                    None => Ok(()),
                }
            }
            Stmt::While(w) => {
                self.check_expr(&w.condition)?;
                self.check_scoped(&w.body.statements)
            }
            Stmt::Fn(decl) => self.check_function(decl, FnBinding::Enclosing).map(|_| ()),
            Stmt::Return(r) => self.check_return(r),
        }
    }

    fn check_let(&mut self, l: &LetStmt) -> Result<(), CompileError> {
        let declared = l.annotation.as_ref().map(Type::from_annotation);
        let inferred = match &l.initializer {
            Some(init) => Some(self.check_expr(init)?),
            None => None,
        };

        let ty = match (declared, inferred) {
            (Some(declared), Some(inferred)) => {
                if declared != inferred {
                    return Err(CompileError::type_error(
                        format!(
                            "'{}' is declared as {declared} but initialized with {inferred}",
                            l.name
                        ),
                        l.span,
                    ));
                }
                declared
            }
            (Some(declared), None) => declared,
            (None, Some(inferred)) => inferred,
            (None, None) => {
                return Err(CompileError::type_error(
                    format!(
                        "'{}' must be annotated when its type cannot be inferred",
                        l.name
                    ),
                    l.span,
                ));
            }
        };

        self.declare(&l.name, annotate(&l.binding_type, ty));
        Ok(())
    }

    fn check_return(&mut self, r: &ReturnStmt) -> Result<(), CompileError> {
        let actual = match &r.value {
            Some(value) => self.check_expr(value)?,
            None => Type::None,
        };
        match self.returns.last() {
            Some(expected) if *expected != Type::None && *expected != actual => {
                Err(CompileError::type_error(
                    format!("function returns {expected} but this returns {actual}"),
                    r.span,
                ))
            }
            _ => Ok(()),
        }
    }

    /// Builds the function's type, binds it before checking the body so the
    /// body can call itself, then checks the body in a fresh scope.
    fn check_function(&mut self, decl: &FnDecl, binding: FnBinding) -> Result<Type, CompileError> {
        let mut params = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            let ty = param
                .annotation
                .as_ref()
                .map_or(Type::None, Type::from_annotation);
            if ty == Type::None {
                return Err(CompileError::type_error(
                    format!("parameter '{}' needs a type annotation", param.name),
                    param.span,
                ));
            }
            params.push(ty);
        }
        let ret = decl
            .return_type
            .as_ref()
            .map_or(Type::None, Type::from_annotation);

        let fn_type = annotate(&decl.fn_type, Type::function(params.clone(), ret.clone()));
        let mut scope = HashMap::new();
        match binding {
            FnBinding::Enclosing => self.declare(&decl.name, fn_type.clone()),
            FnBinding::Body if !decl.anonymous => {
                scope.insert(decl.name.clone(), fn_type.clone());
            }
            FnBinding::Body => {}
        }
        for (param, ty) in decl.params.iter().zip(params) {
            scope.insert(param.name.clone(), ty);
        }
        self.scopes.push(scope);
        self.returns.push(ret);
        let result = self.check_stmts(&decl.body);
        self.returns.pop();
        self.scopes.pop();
        result?;

        Ok(fn_type)
    }

    fn check_expr(&mut self, expr: &Expr) -> Result<Type, CompileError> {
        let ty = match expr {
            Expr::Literal(l) => match l.value {
                LiteralValue::Int(_) => Type::Int,
                LiteralValue::Float(_) => Type::Float,
                LiteralValue::Str(_) => Type::String,
                LiteralValue::Bool(_) => Type::Bool,
            },
            Expr::Grouping(g) => self.check_expr(&g.expression)?,
            Expr::Variable(v) => self.lookup(&v.name).cloned().ok_or_else(|| {
                CompileError::type_error(format!("undefined name '{}'", v.name), v.span)
            })?,
            Expr::Assign(a) => {
                let target = self.lookup(&a.name).cloned().ok_or_else(|| {
                    CompileError::type_error(
                        format!("cannot assign to undeclared name '{}'", a.name),
                        a.span,
                    )
                })?;
                let value = self.check_expr(&a.value)?;
                if value != target {
                    return Err(CompileError::type_error(
                        format!("cannot assign {value} to '{}' of type {target}", a.name),
                        a.span,
                    ));
                }
                target
            }
            Expr::Unary(u) => {
                let operand = self.check_expr(&u.operand)?;
                match u.operator {
                    UnaryOp::Negate if operand.is_numeric() => operand,
                    UnaryOp::Negate => {
                        return Err(CompileError::type_error(
                            format!("operator '-' cannot be applied to {operand}"),
                            u.span,
                        ));
                    }
                    UnaryOp::Not => Type::Bool,
                }
            }
            Expr::Binary(b) => {
                let left = self.check_expr(&b.left)?;
                let right = self.check_expr(&b.right)?;
                binary_type(b.operator, &left, &right).ok_or_else(|| {
                    CompileError::type_error(
                        format!(
                            "operator '{}' cannot be applied to {left} and {right}",
                            b.operator
                        ),
                        b.span,
                    )
                })?
            }
            Expr::Call(c) => self.check_call(c)?,
            Expr::Function(f) => self.check_function(&f.decl, FnBinding::Body)?,
        };
        Ok(annotate(expr.type_slot(), ty))
    }

    fn check_call(&mut self, c: &CallExpr) -> Result<Type, CompileError> {
        let callee = self.check_expr(&c.callee)?;
        let Type::Function { params, ret } = &callee else {
            return Err(CompileError::type_error(
                format!("cannot call a value of type {callee}"),
                c.callee.span(),
            ));
        };

        if params.len() != c.arguments.len() {
            return Err(CompileError::type_error(
                format!(
                    "expected {} arguments but got {}",
                    params.len(),
                    c.arguments.len()
                ),
                c.span,
            ));
        }

        for (i, (param, arg)) in params.iter().zip(&c.arguments).enumerate() {
            let actual = self.check_expr(arg)?;
            if *param != Type::None && *param != actual {
                return Err(mismatch(i, param, &actual, arg.span()));
            }
        }
        Ok(ret.as_ref().clone())
    }
}

/// Where a function's own name is visible.
#[derive(Debug, Clone, Copy)]
enum FnBinding {
    /// Declarations: the name joins the surrounding scope.
    Enclosing,
    /// Literals: only the function's body sees the name.
    Body,
}

fn mismatch(index: usize, expected: &Type, actual: &Type, span: Span) -> CompileError {
    CompileError::type_error(
        format!("argument {} expected {expected} but got {actual}", index + 1),
        span,
    )
}

/// Writes the type into the node's slot unless the node was already checked,
/// and returns the type the node ends up with.
fn annotate(slot: &TypeSlot, ty: Type) -> Type {
    slot.get_or_init(|| ty).clone()
}

/// `int op int` is `int`; any other numeric pairing widens to `float`.
fn numeric(left: &Type, right: &Type) -> Option<Type> {
    match (left, right) {
        (Type::Int, Type::Int) => Some(Type::Int),
        (Type::Int | Type::Float, Type::Int | Type::Float) => Some(Type::Float),
        _ => None,
    }
}

fn binary_type(op: BinaryOp, left: &Type, right: &Type) -> Option<Type> {
    match op {
        BinaryOp::Add => match (left, right) {
            (Type::String, Type::String) => Some(Type::String),
            _ => numeric(left, right),
        },
        BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide => numeric(left, right),
        BinaryOp::FloorDivide => numeric(left, right).map(|_| Type::Int),
        BinaryOp::Equal | BinaryOp::NotEqual => {
            (numeric(left, right).is_some() || left == right).then_some(Type::Bool)
        }
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            numeric(left, right).map(|_| Type::Bool)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scanner;
    use rstest::rstest;

    fn parse(source: &str) -> Program {
        let tokens = scanner::scan(source).expect("scan should succeed");
        Parser::new(tokens).parse().expect("parse should succeed")
    }

    fn check_ok(source: &str) -> Program {
        type_check(parse(source)).expect("type check should succeed")
    }

    fn check_err(source: &str) -> CompileError {
        type_check(parse(source)).unwrap_err()
    }

    /// Type of the last top-level expression statement.
    fn last_expr_type(source: &str) -> Type {
        let program = check_ok(source);
        match program.statements.last() {
            Some(Stmt::Expression(e)) => e
                .expression
                .value_type()
                .cloned()
                .expect("expression should be annotated"),
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[rstest]
    #[case("1", Type::Int)]
    #[case("1.5", Type::Float)]
    #[case("2.0", Type::Int)]
    #[case("\"s\"", Type::String)]
    #[case("true", Type::Bool)]
    #[case("1 + 1", Type::Int)]
    #[case("1 + 1.5", Type::Float)]
    #[case("1.5 * 2", Type::Float)]
    #[case("4 // 2", Type::Int)]
    #[case("4.5 // 1.5", Type::Int)]
    #[case("\"a\" + \"b\"", Type::String)]
    #[case("1 < 2.5", Type::Bool)]
    #[case("1 == 1.0", Type::Bool)]
    #[case("\"a\" != \"b\"", Type::Bool)]
    #[case("true == false", Type::Bool)]
    #[case("-1.5", Type::Float)]
    #[case("!1", Type::Bool)]
    #[case("(7)", Type::Int)]
    #[case("clock()", Type::Int)]
    #[case("println(1)", Type::None)]
    fn expression_types(#[case] source: &str, #[case] expected: Type) {
        assert_eq!(last_expr_type(source), expected);
    }

    #[rstest]
    #[case("\"a\" + 1", "operator '+' cannot be applied to string and int")]
    #[case("true - false", "operator '-'")]
    #[case("\"a\" // 2", "operator '//'")]
    #[case("\"a\" < \"b\"", "operator '<'")]
    #[case("1 == \"a\"", "operator '=='")]
    #[case("-\"a\"", "operator '-' cannot be applied to string")]
    fn operator_rejections(#[case] source: &str, #[case] expected: &str) {
        let err = check_err(source);
        assert!(matches!(err, CompileError::Type { .. }));
        assert!(err.to_string().contains(expected), "{err}");
    }

    #[test]
    fn let_annotation_mismatch() {
        let err = check_err("let x: int = \"a\"");
        assert!(err.to_string().contains("declared as int"));
    }

    #[test]
    fn let_without_annotation_or_initializer() {
        let err = check_err("let y");
        assert!(err.to_string().contains("must be annotated"));
    }

    #[test]
    fn let_records_binding_type() {
        let program = check_ok("let x = 1.5 let y: string");
        let types: Vec<Type> = program
            .statements
            .iter()
            .filter_map(|s| match s {
                Stmt::Let(l) => l.binding_type.get().cloned(),
                _ => None,
            })
            .collect();
        assert_eq!(types, vec![Type::Float, Type::String]);
    }

    #[test]
    fn int_does_not_widen_on_assignment() {
        let err = check_err("let x: float = 1");
        assert!(err.to_string().contains("declared as float"));
    }

    #[test]
    fn assignment_must_match_declared_type() {
        check_ok("let x = 1 x = 2");
        let err = check_err("let x = 1 x = \"two\"");
        assert!(err.to_string().contains("cannot assign string"));
    }

    #[test]
    fn assignment_to_undeclared_name() {
        let err = check_err("z = 5");
        assert!(err.to_string().contains("undeclared name 'z'"));
    }

    #[test]
    fn undefined_variable() {
        let err = check_err("println(nope)");
        assert!(err.to_string().contains("undefined name 'nope'"));
    }

    #[test]
    fn block_scope_is_discarded() {
        let err = check_err("{ let inner = 1 } inner");
        assert!(err.to_string().contains("undefined name 'inner'"));
    }

    #[test]
    fn shadowing_in_block_changes_type_locally() {
        assert_eq!(
            last_expr_type("let x = 1 { let x = \"s\" x } x + 1"),
            Type::Int
        );
    }

    #[test]
    fn function_type_and_call() {
        let program = check_ok("fn add(a: int, b: float) -> float { return a + b } add(1, 2.5)");
        match &program.statements[0] {
            Stmt::Fn(decl) => assert_eq!(
                decl.fn_type.get(),
                Some(&Type::function(vec![Type::Int, Type::Float], Type::Float))
            ),
            other => panic!("expected fn, got {other:?}"),
        }
        assert_eq!(
            last_expr_type("fn add(a: int, b: float) -> float { return a + b } add(1, 2.5)"),
            Type::Float
        );
    }

    #[test]
    fn unannotated_parameter() {
        let err = check_err("fn f(a) { }");
        assert!(err.to_string().contains("parameter 'a' needs a type annotation"));
        let err = check_err("fn f(a: none) { }");
        assert!(err.to_string().contains("parameter 'a'"));
    }

    #[test]
    fn recursive_function_sees_itself() {
        check_ok(
            "fn fib(n: int) -> int {
                if n <= 1 { return n }
                return fib(n - 1) + fib(n - 2)
            }
            fib(10)",
        );
    }

    #[test]
    fn call_arity_mismatch() {
        let err = check_err("fn f(a: int, b: int) { } f(1)");
        assert!(err.to_string().contains("expected 2 arguments but got 1"));
    }

    #[test]
    fn call_argument_mismatch() {
        let err = check_err("fn f(a: int) { } f(1.5)");
        assert!(err.to_string().contains("argument 1 expected int but got float"));
    }

    #[test]
    fn builtin_parameters_are_unconstrained() {
        check_ok("println(1) println(\"a\") print(true) println(println)");
    }

    #[test]
    fn calling_non_function() {
        let err = check_err("let x = 1 x()");
        assert!(err.to_string().contains("cannot call a value of type int"));
    }

    #[test]
    fn return_type_is_enforced() {
        let err = check_err("fn f() -> int { return \"s\" }");
        assert!(err.to_string().contains("function returns int but this returns string"));
        let err = check_err("fn f() -> int { return }");
        assert!(err.to_string().contains("this returns none"));
        check_ok("fn g() { return 1 }");
    }

    #[test]
    fn anonymous_function_expression() {
        assert_eq!(
            last_expr_type("(fn(x: int) -> bool { return x > 0 })"),
            Type::function(vec![Type::Int], Type::Bool)
        );
        check_ok("let inc = fn(x: int) -> int { return x + 1 } let y: int = inc(1)");
    }

    #[test]
    fn closures_and_function_typed_values() {
        check_ok(
            "fn make_adder(n: int) -> fn(int) -> int {
                return fn(x: int) -> int { return x + n }
            }
            let add2: fn(int) -> int = make_adder(2)
            add2(3)
            make_adder(1)(2)",
        );
    }

    #[test]
    fn function_parameter_of_function_type() {
        assert_eq!(
            last_expr_type(
                "fn apply(f: fn(int) -> int, x: int) -> int { return f(x) }
                apply(fn(v: int) -> int { return v * 2 }, 4)"
            ),
            Type::Int
        );
        let err = check_err(
            "fn apply(f: fn(int) -> int) -> int { return f(1) }
            apply(fn(v: float) -> int { return 1 })",
        );
        assert!(err.to_string().contains("argument 1 expected fn(int) -> int"));
    }

    #[test]
    fn user_types_are_nominal() {
        let err = check_err("let p: Point = 1");
        assert!(err.to_string().contains("declared as Point but initialized with int"));
    }

    #[test]
    fn checker_state_persists_between_programs() {
        let mut checker = TypeChecker::new();
        checker.check(&parse("let x = 1")).expect("first program");
        checker.check(&parse("x + 1")).expect("second program sees x");
        assert_eq!(checker.lookup("x"), Some(&Type::Int));
    }

    #[test]
    fn if_and_while_bodies_are_checked() {
        let err = check_err("if true { \"a\" - 1 }");
        assert!(err.to_string().contains("operator '-'"));
        let err = check_err("while false { } else_branch");
        assert!(err.to_string().contains("undefined name"));
        let err = check_err("if false { } else if true { } else { -true }");
        assert!(err.to_string().contains("operator '-'"));
    }

    #[test]
    fn named_literal_sees_its_own_name() {
        check_ok(
            "let g = fn h(n: int) -> int {
                if n <= 0 { return 0 }
                return h(n - 1)
            }
            println(g(3))",
        );
        assert_eq!(
            last_expr_type(
                "fn apply(f: fn(int) -> int, x: int) -> int { return f(x) }
                apply(fn down(n: int) -> int {
                    if n <= 0 { return n }
                    return down(n - 1)
                }, 4)"
            ),
            Type::Int
        );
    }

    #[test]
    fn named_literal_name_stays_out_of_enclosing_scope() {
        let err = check_err("let g = fn h() -> int { return 1 }\nprintln(h())");
        assert!(err.to_string().contains("undefined name 'h'"), "{err}");
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn parameter_shadows_literal_name() {
        let err = check_err("let g = fn h(h: int) -> int { return h() }");
        assert!(err.to_string().contains("cannot call a value of type int"), "{err}");
    }

    #[test]
    fn errors_carry_lines() {
        let err = check_err("let a = 1\nlet b = a + \"x\"");
        assert_eq!(err.line(), 2);
    }
}
