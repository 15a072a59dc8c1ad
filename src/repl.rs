use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::interpreter::value::Value;
use crate::types::TypeChecker;

/// State carried from one REPL line to the next: the checker's scopes and
/// the interpreter's globals.
pub struct Session {
    checker: TypeChecker,
    interpreter: Interpreter,
    check: bool,
}

impl Session {
    pub fn new(interpreter: Interpreter, check: bool) -> Self {
        Self {
            checker: TypeChecker::new(),
            interpreter,
            check,
        }
    }

    /// Run one line. A line that fails type checking leaves the checker as
    /// it was; one that fails at runtime keeps whatever it defined first.
    pub fn eval_line(&mut self, line: &str) -> Result<Value, Error> {
        let program = crate::parse_source(line)?;
        if self.check {
            let mut checker = self.checker.clone();
            checker.check(&program)?;
            self.checker = checker;
        }
        Ok(self.interpreter.interpret(&program)?)
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }
}

/// Run the interactive REPL until end of input.
pub fn run_repl(check: bool) -> rustyline::Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut session = Session::new(Interpreter::new(), check);

    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e),
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        editor.add_history_entry(trimmed)?;

        match session.eval_line(trimmed) {
            Ok(Value::None) => {}
            Ok(value) => println!("{value}"),
            Err(Error::Compile(e)) => eprintln!("{:?}", e.report("<repl>", trimmed)),
            Err(e) => eprintln!("{e}"),
        }
    }
    Ok(())
}
