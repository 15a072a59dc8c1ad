pub mod callable;
pub mod environment;
pub mod value;

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use strum::IntoEnumIterator;

use crate::ast::*;
use crate::error::RuntimeError;
use crate::interpreter::callable::{Callable, NativeFunction, UserFunction};
use crate::interpreter::environment::Environment;
use crate::interpreter::value::Value;
use crate::scanner::token::Span;

/// How a statement finished. `Return` unwinds to the nearest call boundary.
#[derive(Debug)]
enum Flow {
    Normal(Value),
    Return(Value),
}

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    /// Destination for `print`/`println`.
    writer: Box<dyn Write>,
    /// Copy of everything printed, kept only by capturing interpreters.
    transcript: Option<String>,
    depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_writer(std::io::stdout())
    }

    /// Interpreter whose output goes to `writer`.
    pub fn with_writer(writer: impl Write + 'static) -> Self {
        let globals = Rc::new(RefCell::new(Environment::new()));
        for native in NativeFunction::iter() {
            globals.borrow_mut().define(
                native.name().to_string(),
                Value::Function(Callable::Native(native)),
            );
        }
        Self {
            globals,
            writer: Box::new(writer),
            transcript: None,
            depth: 0,
        }
    }

    /// Interpreter that records its output instead of writing it anywhere;
    /// read it back with [`Interpreter::output`].
    pub fn capturing() -> Self {
        Self {
            transcript: Some(String::new()),
            ..Self::with_writer(std::io::sink())
        }
    }

    /// Everything printed so far by a capturing interpreter.
    pub fn output(&self) -> &str {
        self.transcript.as_deref().unwrap_or_default()
    }

    pub fn globals(&self) -> &Rc<RefCell<Environment>> {
        &self.globals
    }

    /// Run a program in the global scope and return its completion value:
    /// the value of a top-level `return`, otherwise the value of the last
    /// statement. Globals persist across calls.
    pub fn interpret(&mut self, program: &Program) -> Result<Value, RuntimeError> {
        let globals = Rc::clone(&self.globals);
        let result = self
            .execute_block(&program.statements, &globals)
            .map(|flow| match flow {
                Flow::Normal(value) | Flow::Return(value) => value,
            });
        if let Err(ref e) = result {
            tracing::debug!(error = %e, "interpretation aborted");
        }
        result
    }

    fn execute(
        &mut self,
        stmt: &Stmt,
        env: &Rc<RefCell<Environment>>,
    ) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Expression(e) => Ok(Flow::Normal(self.evaluate(&e.expression, env)?)),
            Stmt::Let(l) => {
                let value = match &l.initializer {
                    Some(Expr::Function(f)) => self.make_literal(&l.name, &f.decl, env),
                    Some(init) => self.evaluate(init, env)?,
                    None => Value::None,
                };
                env.borrow_mut().define(l.name.clone(), value);
                Ok(Flow::Normal(Value::None))
            }
            Stmt::Block(b) => self.execute_block(&b.statements, &Environment::child(env)),
            Stmt::If(i) => {
                if self.evaluate(&i.condition, env)?.is_truthy() {
                    self.execute_block(&i.then_branch.statements, &Environment::child(env))
                } else if let Some(ref else_branch) = i.else_branch {
                    self.execute(else_branch, env)
                } else {
                    Ok(Flow::Normal(Value::None))
                }
            }
            Stmt::While(w) => {
                while self.evaluate(&w.condition, env)?.is_truthy() {
                    let flow = self.execute_block(&w.body.statements, &Environment::child(env))?;
                    if let Flow::Return(_) = flow {
                        return Ok(flow);
                    }
                }
                Ok(Flow::Normal(Value::None))
            }
            Stmt::Fn(decl) => {
                let function = self.make_function(&decl.name, decl, env);
                if decl.anonymous {
                    Ok(Flow::Normal(function))
                } else {
                    Ok(Flow::Normal(Value::None))
                }
            }
            Stmt::Return(r) => {
                let value = match &r.value {
                    Some(value) => self.evaluate(value, env)?,
                    None => Value::None,
                };
                Ok(Flow::Return(value))
            }
        }
    }

    /// Runs `statements` in `env`, stopping at the first `return`.
    fn execute_block(
        &mut self,
        statements: &[Stmt],
        env: &Rc<RefCell<Environment>>,
    ) -> Result<Flow, RuntimeError> {
        let mut last = Value::None;
        for stmt in statements {
            match self.execute(stmt, env)? {
                Flow::Normal(value) => last = value,
                returning @ Flow::Return(_) => return Ok(returning),
            }
        }
        Ok(Flow::Normal(last))
    }

    /// Closes `decl` over `env`, binds it under `name` in `env`, and returns
    /// the function value.
    fn make_function(
        &mut self,
        name: &str,
        decl: &Rc<FnDecl>,
        env: &Rc<RefCell<Environment>>,
    ) -> Value {
        let function = UserFunction::new(name, Rc::clone(decl), Rc::clone(env));
        let value = Value::Function(Callable::User(Rc::new(function)));
        env.borrow_mut().define(name.to_string(), value.clone());
        value
    }

    /// Builds a function literal's closure. A named literal sees its own name
    /// through a scope wrapped around `env`; nothing is bound in `env` itself.
    fn make_literal(
        &mut self,
        name: &str,
        decl: &Rc<FnDecl>,
        env: &Rc<RefCell<Environment>>,
    ) -> Value {
        let closure = if decl.anonymous {
            Rc::clone(env)
        } else {
            Environment::child(env)
        };
        let function = UserFunction::new(name, Rc::clone(decl), Rc::clone(&closure));
        let value = Value::Function(Callable::User(Rc::new(function)));
        if !decl.anonymous {
            closure.borrow_mut().define(decl.name.clone(), value.clone());
        }
        value
    }

    fn evaluate(
        &mut self,
        expr: &Expr,
        env: &Rc<RefCell<Environment>>,
    ) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Literal(l) => Ok(match &l.value {
                LiteralValue::Int(n) => Value::Int(*n),
                LiteralValue::Float(n) => Value::Float(*n),
                LiteralValue::Str(s) => Value::Str(s.clone()),
                LiteralValue::Bool(b) => Value::Bool(*b),
            }),
            Expr::Grouping(g) => self.evaluate(&g.expression, env),
            Expr::Variable(v) => env.borrow().get(&v.name).ok_or_else(|| {
                RuntimeError::new(format!("undefined name '{}'", v.name), v.span)
            }),
            Expr::Assign(a) => {
                if !env.borrow().contains(&a.name) {
                    return Err(RuntimeError::new(
                        format!("cannot assign to undeclared name '{}'", a.name),
                        a.span,
                    ));
                }
                let value = self.evaluate(&a.value, env)?;
                if env.borrow_mut().assign(&a.name, value.clone()) {
                    Ok(value)
                } else {
                    Err(RuntimeError::new(
                        format!("cannot assign to undeclared name '{}'", a.name),
                        a.span,
                    ))
                }
            }
            Expr::Unary(u) => {
                let operand = self.evaluate(&u.operand, env)?;
                match (u.operator, operand) {
                    (UnaryOp::Negate, Value::Int(n)) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| RuntimeError::new("integer overflow", u.span)),
                    (UnaryOp::Negate, Value::Float(n)) => Ok(Value::Float(-n)),
                    (UnaryOp::Negate, other) => Err(RuntimeError::new(
                        format!("operator '-' cannot be applied to {}", other.type_name()),
                        u.span,
                    )),
                    (UnaryOp::Not, operand) => Ok(Value::Bool(!operand.is_truthy())),
                }
            }
            Expr::Binary(b) => self.evaluate_binary(b, env),
            Expr::Call(c) => self.evaluate_call(c, env),
            Expr::Function(f) => Ok(self.make_literal(&f.decl.name, &f.decl, env)),
        }
    }

    fn evaluate_binary(
        &mut self,
        b: &BinaryExpr,
        env: &Rc<RefCell<Environment>>,
    ) -> Result<Value, RuntimeError> {
        let left = self.evaluate(&b.left, env)?;
        let right = self.evaluate(&b.right, env)?;

        match b.operator {
            BinaryOp::Add => match (&left, &right) {
                (Value::Str(a), Value::Str(c)) => Ok(Value::Str(format!("{a}{c}"))),
                _ => arithmetic(&left, &right, i64::checked_add, |a, c| a + c, b),
            },
            BinaryOp::Subtract => arithmetic(&left, &right, i64::checked_sub, |a, c| a - c, b),
            BinaryOp::Multiply => arithmetic(&left, &right, i64::checked_mul, |a, c| a * c, b),
            BinaryOp::Divide => {
                if let (Value::Int(_), Value::Int(0)) = (&left, &right) {
                    return Err(RuntimeError::new("division by zero", b.span));
                }
                arithmetic(&left, &right, i64::checked_div, |a, c| a / c, b)
            }
            BinaryOp::FloorDivide => floor_divide(&left, &right, b),
            BinaryOp::Equal => left
                .equals(&right)
                .map(Value::Bool)
                .ok_or_else(|| operand_error(&left, &right, b)),
            BinaryOp::NotEqual => left
                .equals(&right)
                .map(|eq| Value::Bool(!eq))
                .ok_or_else(|| operand_error(&left, &right, b)),
            BinaryOp::Less => compare(&left, &right, |a, c| a < c, |a, c| a < c, b),
            BinaryOp::LessEqual => compare(&left, &right, |a, c| a <= c, |a, c| a <= c, b),
            BinaryOp::Greater => compare(&left, &right, |a, c| a > c, |a, c| a > c, b),
            BinaryOp::GreaterEqual => compare(&left, &right, |a, c| a >= c, |a, c| a >= c, b),
        }
    }

    fn evaluate_call(
        &mut self,
        c: &CallExpr,
        env: &Rc<RefCell<Environment>>,
    ) -> Result<Value, RuntimeError> {
        let callee = self.evaluate(&c.callee, env)?;
        let Value::Function(func) = &callee else {
            return Err(RuntimeError::new(
                format!("can only call functions, not {}", callee.type_name()),
                c.span,
            ));
        };
        let args = c
            .arguments
            .iter()
            .map(|arg| self.evaluate(arg, env))
            .collect::<Result<Vec<_>, _>>()?;

        if args.len() != func.arity() {
            return Err(RuntimeError::new(
                format!("expected {} arguments but got {}", func.arity(), args.len()),
                c.span,
            ));
        }
        self.call(func, args, c.span)
    }

    fn call(
        &mut self,
        func: &Callable,
        args: Vec<Value>,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        match func {
            Callable::Native(native) => self.call_native(*native, &args, span),
            Callable::User(function) => {
                self.depth += 1;
                tracing::trace!(name = %function.name, depth = self.depth, "call");

                // Parented at the closure, not the caller: scoping is lexical.
                let env = Environment::child(&function.closure);
                for (param, arg) in function.declaration.params.iter().zip(args) {
                    env.borrow_mut().define(param.name.clone(), arg);
                }
                let result = self.execute_block(&function.declaration.body, &env);
                self.depth -= 1;

                match result? {
                    Flow::Return(value) => Ok(value),
                    Flow::Normal(_) => Ok(Value::None),
                }
            }
        }
    }

    fn call_native(
        &mut self,
        native: NativeFunction,
        args: &[Value],
        span: Span,
    ) -> Result<Value, RuntimeError> {
        match native {
            NativeFunction::Clock => Ok(Value::Int(NativeFunction::clock_millis())),
            NativeFunction::Print => {
                let text = args.iter().map(Value::to_string).collect::<String>();
                self.emit(&text, span)
            }
            NativeFunction::Println => {
                let mut text = args.iter().map(Value::to_string).collect::<String>();
                text.push('\n');
                self.emit(&text, span)
            }
        }
    }

    fn emit(&mut self, text: &str, span: Span) -> Result<Value, RuntimeError> {
        self.writer
            .write_all(text.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|e| RuntimeError::new(format!("failed to write output: {e}"), span))?;
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.push_str(text);
        }
        Ok(Value::None)
    }
}

fn operand_error(left: &Value, right: &Value, b: &BinaryExpr) -> RuntimeError {
    RuntimeError::new(
        format!(
            "operator '{}' cannot be applied to {} and {}",
            b.operator,
            left.type_name(),
            right.type_name()
        ),
        b.span,
    )
}

/// `int op int` stays an integer and fails on overflow; any other numeric
/// pairing widens to float.
fn arithmetic(
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
    b: &BinaryExpr,
) -> Result<Value, RuntimeError> {
    if let (Value::Int(a), Value::Int(c)) = (left, right) {
        return int_op(*a, *c)
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::new("integer overflow", b.span));
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(c)) => Ok(Value::Float(float_op(a, c))),
        _ => Err(operand_error(left, right, b)),
    }
}

/// Quotient rounded toward negative infinity, always an integer.
fn floor_divide(left: &Value, right: &Value, b: &BinaryExpr) -> Result<Value, RuntimeError> {
    if let (Value::Int(a), Value::Int(c)) = (left, right) {
        if *c == 0 {
            return Err(RuntimeError::new("division by zero", b.span));
        }
        let quotient = a
            .checked_div(*c)
            .ok_or_else(|| RuntimeError::new("integer overflow", b.span))?;
        let adjust = a % c != 0 && (*a < 0) != (*c < 0);
        return Ok(Value::Int(if adjust { quotient - 1 } else { quotient }));
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(_), Some(c)) if c == 0.0 => Err(RuntimeError::new("division by zero", b.span)),
        (Some(a), Some(c)) => {
            let quotient = (a / c).floor();
            if quotient.is_finite() && quotient >= i64::MIN as f64 && quotient < i64::MAX as f64 {
                Ok(Value::Int(quotient as i64))
            } else {
                Err(RuntimeError::new("integer overflow", b.span))
            }
        }
        _ => Err(operand_error(left, right, b)),
    }
}

fn compare(
    left: &Value,
    right: &Value,
    int_op: fn(&i64, &i64) -> bool,
    float_op: fn(&f64, &f64) -> bool,
    b: &BinaryExpr,
) -> Result<Value, RuntimeError> {
    if let (Value::Int(a), Value::Int(c)) = (left, right) {
        return Ok(Value::Bool(int_op(a, c)));
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(c)) => Ok(Value::Bool(float_op(&a, &c))),
        _ => Err(operand_error(left, right, b)),
    }
}
