use crate::ast::*;

pub fn to_sexp(program: &Program) -> String {
    let mut buf = String::new();
    for stmt in &program.statements {
        sexp_stmt(&mut buf, stmt);
        buf.push('\n');
    }
    buf
}

pub fn to_json(program: &Program) -> serde_json::Result<String> {
    serde_json::to_string_pretty(program)
}

fn sexp_type(buf: &mut String, annotation: &TypeExpr) {
    match annotation {
        TypeExpr::Named { name, .. } => buf.push_str(name),
        TypeExpr::Function { params, ret, .. } => {
            buf.push_str("fn(");
            for (i, param) in params.iter().enumerate() {
                if i > 0 {
                    buf.push_str(", ");
                }
                sexp_type(buf, param);
            }
            buf.push(')');
            if let Some(ret) = ret {
                buf.push_str(" -> ");
                sexp_type(buf, ret);
            }
        }
    }
}

fn sexp_function(buf: &mut String, f: &FnDecl) {
    buf.push_str("(fn ");
    buf.push_str(&f.name);
    buf.push_str(" (");
    for (i, param) in f.params.iter().enumerate() {
        if i > 0 {
            buf.push(' ');
        }
        buf.push_str(&param.name);
        if let Some(ref annotation) = param.annotation {
            buf.push(':');
            sexp_type(buf, annotation);
        }
    }
    buf.push(')');
    if let Some(ref ret) = f.return_type {
        buf.push_str(" -> ");
        sexp_type(buf, ret);
    }
    for stmt in &f.body {
        buf.push(' ');
        sexp_stmt(buf, stmt);
    }
    buf.push(')');
}

fn sexp_block(buf: &mut String, block: &BlockStmt) {
    buf.push_str("(block");
    for stmt in &block.statements {
        buf.push(' ');
        sexp_stmt(buf, stmt);
    }
    buf.push(')');
}

fn sexp_stmt(buf: &mut String, stmt: &Stmt) {
    match stmt {
        Stmt::Expression(e) => sexp_expr(buf, &e.expression),
        Stmt::Let(l) => {
            buf.push_str("(let ");
            buf.push_str(&l.name);
            if let Some(ref annotation) = l.annotation {
                buf.push(':');
                sexp_type(buf, annotation);
            }
            if let Some(ref init) = l.initializer {
                buf.push(' ');
                sexp_expr(buf, init);
            }
            buf.push(')');
        }
        Stmt::Block(b) => sexp_block(buf, b),
        Stmt::If(i) => {
            buf.push_str("(if ");
            sexp_expr(buf, &i.condition);
            buf.push(' ');
            sexp_block(buf, &i.then_branch);
            if let Some(ref else_branch) = i.else_branch {
                buf.push(' ');
                sexp_stmt(buf, else_branch);
            }
            buf.push(')');
        }
        Stmt::While(w) => {
            buf.push_str("(while ");
            sexp_expr(buf, &w.condition);
            buf.push(' ');
            sexp_block(buf, &w.body);
            buf.push(')');
        }
        Stmt::Fn(f) => sexp_function(buf, f),
        Stmt::Return(r) => {
            buf.push_str("(return");
            if let Some(ref val) = r.value {
                buf.push(' ');
                sexp_expr(buf, val);
            }
            buf.push(')');
        }
    }
}

fn sexp_expr(buf: &mut String, expr: &Expr) {
    match expr {
        Expr::Binary(b) => {
            buf.push('(');
            buf.push_str(&b.operator.to_string());
            buf.push(' ');
            sexp_expr(buf, &b.left);
            buf.push(' ');
            sexp_expr(buf, &b.right);
            buf.push(')');
        }
        Expr::Unary(u) => {
            buf.push('(');
            buf.push_str(&u.operator.to_string());
            buf.push(' ');
            sexp_expr(buf, &u.operand);
            buf.push(')');
        }
        Expr::Literal(l) => match &l.value {
            LiteralValue::Int(n) => buf.push_str(&n.to_string()),
            LiteralValue::Float(n) => buf.push_str(&format!("{n:?}")),
            LiteralValue::Str(s) => {
                buf.push('"');
                buf.push_str(s);
                buf.push('"');
            }
            LiteralValue::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
        },
        Expr::Grouping(g) => {
            buf.push_str("(group ");
            sexp_expr(buf, &g.expression);
            buf.push(')');
        }
        Expr::Variable(v) => buf.push_str(&v.name),
        Expr::Assign(a) => {
            buf.push_str("(= ");
            buf.push_str(&a.name);
            buf.push(' ');
            sexp_expr(buf, &a.value);
            buf.push(')');
        }
        Expr::Call(c) => {
            buf.push_str("(call ");
            sexp_expr(buf, &c.callee);
            for arg in &c.arguments {
                buf.push(' ');
                sexp_expr(buf, arg);
            }
            buf.push(')');
        }
        Expr::Function(f) => sexp_function(buf, &f.decl),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::token::Span;

    fn literal(value: LiteralValue, offset: usize) -> Expr {
        Expr::Literal(LiteralExpr {
            value,
            value_type: TypeSlot::new(),
            span: Span::new(offset, 1, 1),
        })
    }

    #[test]
    fn sexp_binary_expression() {
        let program = Program {
            statements: vec![Stmt::Expression(ExprStmt {
                expression: Expr::Binary(BinaryExpr {
                    left: Box::new(literal(LiteralValue::Int(1), 0)),
                    operator: BinaryOp::Add,
                    right: Box::new(Expr::Binary(BinaryExpr {
                        left: Box::new(literal(LiteralValue::Float(2.5), 4)),
                        operator: BinaryOp::FloorDivide,
                        right: Box::new(literal(LiteralValue::Int(3), 9)),
                        value_type: TypeSlot::new(),
                        span: Span::new(4, 6, 1),
                    })),
                    value_type: TypeSlot::new(),
                    span: Span::new(0, 10, 1),
                }),
                span: Span::new(0, 10, 1),
            })],
        };
        let result = to_sexp(&program);
        assert_eq!(result.trim(), "(+ 1 (// 2.5 3))");
    }

    #[test]
    fn json_output_is_valid() {
        let program = Program {
            statements: vec![Stmt::Let(LetStmt {
                name: "x".to_string(),
                annotation: Some(TypeExpr::Named {
                    name: "int".to_string(),
                    span: Span::new(7, 3, 1),
                }),
                initializer: Some(literal(LiteralValue::Int(42), 13)),
                binding_type: TypeSlot::new(),
                span: Span::new(0, 15, 1),
            })],
        };
        let json = to_json(&program).expect("AST should serialize");
        let parsed: serde_json::Value =
            serde_json::from_str(&json).expect("JSON output should be valid");
        assert_eq!(parsed["statements"][0]["type"], "Let");
        assert_eq!(parsed["statements"][0]["name"], "x");
        assert_eq!(parsed["statements"][0]["annotation"]["name"], "int");
    }
}
