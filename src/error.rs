use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::scanner::token::Span;

// ============= Compile-time errors (with miette diagnostics) =============

#[derive(Error, Debug, Diagnostic)]
pub enum CompileError {
    #[error("lex error: line {line}, column {column}: {message}")]
    #[diagnostic(code(flyt::lex))]
    Lex {
        message: String,
        line: usize,
        column: usize,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("parse error: line {line}: {message}")]
    #[diagnostic(code(flyt::parse))]
    Parse {
        message: String,
        line: usize,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("type error: line {line}: {message}")]
    #[diagnostic(code(flyt::typecheck))]
    Type {
        message: String,
        line: usize,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },
}

impl CompileError {
    pub fn lex(message: impl Into<String>, span: Span, column: usize) -> Self {
        Self::Lex {
            message: message.into(),
            line: span.line,
            column,
            span: span.into(),
            src: NamedSource::new("input", String::new()),
        }
    }

    pub fn parse(message: impl Into<String>, span: Span) -> Self {
        Self::Parse {
            message: message.into(),
            line: span.line,
            span: span.into(),
            src: NamedSource::new("input", String::new()),
        }
    }

    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        Self::Type {
            message: message.into(),
            line: span.line,
            span: span.into(),
            src: NamedSource::new("input", String::new()),
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Self::Lex { line, .. } | Self::Parse { line, .. } | Self::Type { line, .. } => *line,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Lex { message, .. }
            | Self::Parse { message, .. }
            | Self::Type { message, .. } => message,
        }
    }

    /// Attach source code for fancy miette diagnostics
    pub fn with_source_code(self, name: impl Into<String>, source: impl Into<String>) -> Self {
        let src = NamedSource::new(name.into(), source.into());
        match self {
            Self::Lex {
                message,
                line,
                column,
                span,
                ..
            } => Self::Lex {
                message,
                line,
                column,
                span,
                src,
            },
            Self::Parse {
                message,
                line,
                span,
                ..
            } => Self::Parse {
                message,
                line,
                span,
                src,
            },
            Self::Type {
                message,
                line,
                span,
                ..
            } => Self::Type {
                message,
                line,
                span,
                src,
            },
        }
    }

    /// Renderable report with the offending source excerpt attached.
    pub fn report(self, name: &str, source: &str) -> miette::Report {
        miette::Report::new(self.with_source_code(name, source))
    }
}

// ============= Runtime errors (simple, no miette) =============

#[derive(Error, Debug, Clone, PartialEq)]
#[error("runtime error: line {}: {message}", .span.line)]
pub struct RuntimeError {
    pub message: String,
    pub span: Span,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    pub fn line(&self) -> usize {
        self.span.line
    }
}

/// Any failure of the whole scan-parse-check-run pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

// ============= Tests =============

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_implements_diagnostic() {
        let err = CompileError::lex("test", Span::new(0, 1, 1), 1);
        let diag: &dyn Diagnostic = &err;
        assert!(diag.code().is_some());
    }

    #[test]
    fn compile_error_with_source() {
        let err = CompileError::parse("expected '}'", Span::new(5, 1, 1))
            .with_source_code("test.flyt", "{ let x = 1\n");
        assert!(matches!(err, CompileError::Parse { .. }));
        assert_eq!(err.message(), "expected '}'");
    }

    #[test]
    fn compile_error_display_includes_line() {
        let err = CompileError::type_error("mismatch", Span::new(12, 3, 4));
        assert_eq!(err.to_string(), "type error: line 4: mismatch");
        assert_eq!(err.line(), 4);
    }

    #[test]
    fn lex_error_display_includes_column() {
        let err = CompileError::lex("unexpected character '@'", Span::new(7, 1, 2), 3);
        assert_eq!(
            err.to_string(),
            "lex error: line 2, column 3: unexpected character '@'"
        );
    }

    #[test]
    fn runtime_error_display_includes_line() {
        let err = RuntimeError::new("undefined name 'z'", Span::new(21, 1, 2));
        assert_eq!(err.to_string(), "runtime error: line 2: undefined name 'z'");
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn pipeline_error_is_transparent() {
        let err: Error = RuntimeError::new("boom", Span::new(0, 1, 1)).into();
        assert_eq!(err.to_string(), "runtime error: line 1: boom");
        assert!(matches!(err, Error::Runtime(_)));
    }
}
