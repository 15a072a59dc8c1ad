pub mod ast;
pub mod error;
pub mod interpreter;
pub mod parser;
pub mod repl;
pub mod scanner;
pub mod types;

pub use error::{CompileError, Error, RuntimeError};

use crate::ast::Program;
use crate::interpreter::Interpreter;
use crate::interpreter::value::Value;

/// Scan and parse `source` without type checking.
pub fn parse_source(source: &str) -> Result<Program, CompileError> {
    parser::parse(scanner::scan(source)?)
}

/// Scan, parse and type-check `source`.
pub fn compile(source: &str) -> Result<Program, CompileError> {
    types::type_check(parse_source(source)?)
}

/// Compile `source` and run it on `interpreter`, returning the completion
/// value.
pub fn run(source: &str, interpreter: &mut Interpreter) -> Result<Value, Error> {
    let program = compile(source)?;
    Ok(interpreter.interpret(&program)?)
}
