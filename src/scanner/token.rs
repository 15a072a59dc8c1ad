use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Colon,
    Minus,
    Plus,
    Slash,
    Star,

    // One or two character tokens
    Arrow,
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    SlashSlash,

    // Literals
    Identifier,
    String,
    Number,

    // Keywords
    Else,
    False,
    Fn,
    If,
    Let,
    Return,
    True,
    While,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeftParen => write!(f, "("),
            Self::RightParen => write!(f, ")"),
            Self::LeftBrace => write!(f, "{{"),
            Self::RightBrace => write!(f, "}}"),
            Self::Comma => write!(f, ","),
            Self::Colon => write!(f, ":"),
            Self::Minus => write!(f, "-"),
            Self::Plus => write!(f, "+"),
            Self::Slash => write!(f, "/"),
            Self::Star => write!(f, "*"),
            Self::Arrow => write!(f, "->"),
            Self::Bang => write!(f, "!"),
            Self::BangEqual => write!(f, "!="),
            Self::Equal => write!(f, "="),
            Self::EqualEqual => write!(f, "=="),
            Self::Greater => write!(f, ">"),
            Self::GreaterEqual => write!(f, ">="),
            Self::Less => write!(f, "<"),
            Self::LessEqual => write!(f, "<="),
            Self::SlashSlash => write!(f, "//"),
            Self::Identifier => write!(f, "IDENTIFIER"),
            Self::String => write!(f, "STRING"),
            Self::Number => write!(f, "NUMBER"),
            Self::Else => write!(f, "else"),
            Self::False => write!(f, "false"),
            Self::Fn => write!(f, "fn"),
            Self::If => write!(f, "if"),
            Self::Let => write!(f, "let"),
            Self::Return => write!(f, "return"),
            Self::True => write!(f, "true"),
            Self::While => write!(f, "while"),
            Self::Eof => write!(f, "EOF"),
        }
    }
}

/// Location of a token or node: byte offset and length into the source,
/// plus the 1-based line the node starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
    pub line: usize,
}

impl Span {
    pub fn new(offset: usize, len: usize, line: usize) -> Self {
        Self { offset, len, line }
    }

    /// Span covering `self` through the end of `end`. Keeps the start line.
    pub fn to(self, end: Span) -> Span {
        let stop = (end.offset + end.len).max(self.offset + self.len);
        Span::new(self.offset, stop - self.offset, self.line)
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        miette::SourceSpan::new(span.offset.into(), span.len)
    }
}

/// Payload carried by literal tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Exact source text of the token.
    pub lexeme: String,
    pub literal: Option<Literal>,
    pub span: Span,
}

impl Token {
    pub fn new(
        kind: TokenKind,
        lexeme: impl Into<String>,
        literal: Option<Literal>,
        span: Span,
    ) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            literal,
            span,
        }
    }

    pub fn line(&self) -> usize {
        self.span.line
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} '{}' @{}:{}",
            self.kind, self.lexeme, self.span.line, self.span.offset
        )
    }
}

pub fn keyword_kind(ident: &str) -> Option<TokenKind> {
    match ident {
        "else" => Some(TokenKind::Else),
        "false" => Some(TokenKind::False),
        "fn" => Some(TokenKind::Fn),
        "if" => Some(TokenKind::If),
        "let" => Some(TokenKind::Let),
        "return" => Some(TokenKind::Return),
        "true" => Some(TokenKind::True),
        "while" => Some(TokenKind::While),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_to_covers_both_ends() {
        let start = Span::new(4, 2, 1);
        let end = Span::new(10, 3, 2);
        assert_eq!(start.to(end), Span::new(4, 9, 1));
    }

    #[test]
    fn span_to_never_shrinks() {
        let outer = Span::new(0, 20, 1);
        let inner = Span::new(5, 1, 1);
        assert_eq!(outer.to(inner), outer);
    }

    #[test]
    fn builtins_are_not_keywords() {
        assert_eq!(keyword_kind("println"), None);
        assert_eq!(keyword_kind("print"), None);
        assert_eq!(keyword_kind("fn"), Some(TokenKind::Fn));
    }
}
