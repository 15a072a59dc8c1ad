use winnow::ascii::digit1;
use winnow::combinator::{alt, delimited, opt};
use winnow::prelude::*;
use winnow::stream::{LocatingSlice, Location};
use winnow::token::{any, take_till, take_while};

use crate::error::CompileError;
use crate::scanner::token::{Literal, Span, Token, TokenKind, keyword_kind};

type Input<'a> = LocatingSlice<&'a str>;

type Scanned = (TokenKind, Option<Literal>);

fn whitespace_and_comments(input: &mut Input<'_>) -> ModalResult<()> {
    loop {
        let before = input.current_token_start();
        take_while(0.., |c: char| {
            c == ' ' || c == '\t' || c == '\r' || c == '\n'
        })
        .void()
        .parse_next(input)?;

        if input.starts_with(";;") {
            take_till(0.., '\n').void().parse_next(input)?;
        } else if input.current_token_start() == before {
            break;
        }
    }
    Ok(())
}

/// Strings are taken verbatim: no escape sequences, may span lines.
fn string_literal(input: &mut Input<'_>) -> ModalResult<Scanned> {
    let body: &str = delimited('"', take_till(0.., '"'), '"').parse_next(input)?;
    Ok((TokenKind::String, Some(Literal::Str(body.to_string()))))
}

fn number_literal(input: &mut Input<'_>) -> ModalResult<Scanned> {
    let value = (digit1, opt(('.', digit1)))
        .take()
        .try_map(|text: &str| text.parse::<f64>())
        .parse_next(input)?;
    Ok((TokenKind::Number, Some(Literal::Number(value))))
}

fn identifier_or_keyword(input: &mut Input<'_>) -> ModalResult<Scanned> {
    let text: &str = (
        any.verify(|c: &char| c.is_ascii_alphabetic() || *c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)?;
    Ok((keyword_kind(text).unwrap_or(TokenKind::Identifier), None))
}

fn two_char_token(input: &mut Input<'_>) -> ModalResult<Scanned> {
    let kind = alt((
        "!=".value(TokenKind::BangEqual),
        "==".value(TokenKind::EqualEqual),
        ">=".value(TokenKind::GreaterEqual),
        "<=".value(TokenKind::LessEqual),
        "//".value(TokenKind::SlashSlash),
        "->".value(TokenKind::Arrow),
    ))
    .parse_next(input)?;
    Ok((kind, None))
}

fn single_char_token(input: &mut Input<'_>) -> ModalResult<Scanned> {
    let c = any
        .verify(|c: &char| "(){},:-+/*!=<>".contains(*c))
        .parse_next(input)?;
    let kind = match c {
        '(' => TokenKind::LeftParen,
        ')' => TokenKind::RightParen,
        '{' => TokenKind::LeftBrace,
        '}' => TokenKind::RightBrace,
        ',' => TokenKind::Comma,
        ':' => TokenKind::Colon,
        '-' => TokenKind::Minus,
        '+' => TokenKind::Plus,
        '/' => TokenKind::Slash,
        '*' => TokenKind::Star,
        '!' => TokenKind::Bang,
        '=' => TokenKind::Equal,
        '<' => TokenKind::Less,
        '>' => TokenKind::Greater,
        _ => unreachable!("verify guarantees valid char"),
    };
    Ok((kind, None))
}

fn scan_token(input: &mut Input<'_>) -> ModalResult<Scanned> {
    alt((
        string_literal,
        number_literal,
        identifier_or_keyword,
        two_char_token,
        single_char_token,
    ))
    .parse_next(input)
}

/// Tracks the current line while the scanner moves forward through the source.
struct LineTracker {
    offset: usize,
    line: usize,
    line_start: usize,
}

impl LineTracker {
    fn new() -> Self {
        Self {
            offset: 0,
            line: 1,
            line_start: 0,
        }
    }

    /// Advance to `offset` (never backwards) and return the line it is on.
    fn line_at(&mut self, source: &str, offset: usize) -> usize {
        if offset > self.offset {
            for (i, b) in source.as_bytes()[self.offset..offset].iter().enumerate() {
                if *b == b'\n' {
                    self.line += 1;
                    self.line_start = self.offset + i + 1;
                }
            }
            self.offset = offset;
        }
        self.line
    }

    fn column_at(&self, offset: usize) -> usize {
        offset - self.line_start + 1
    }
}

fn scan_error(source: &str, offset: usize, lines: &mut LineTracker) -> CompileError {
    let line = lines.line_at(source, offset);
    let column = lines.column_at(offset);
    let rest = &source[offset..];
    let ch = rest.chars().next().unwrap_or('?');
    let (message, len) = match ch {
        '"' => ("unterminated string".to_string(), rest.len()),
        ';' => (
            "unexpected ';' (line comments start with ';;')".to_string(),
            1,
        ),
        other => (format!("unexpected character '{other}'"), other.len_utf8()),
    };
    CompileError::lex(message, Span::new(offset, len, line), column)
}

/// Scan all tokens from source. Stops at the first malformed token.
pub fn scan_all(source: &str) -> Result<Vec<Token>, CompileError> {
    let mut input = LocatingSlice::new(source);
    let mut lines = LineTracker::new();
    let mut tokens = Vec::new();

    loop {
        if whitespace_and_comments(&mut input).is_err() {
            break;
        }
        if input.is_empty() {
            break;
        }
        let start = input.current_token_start();
        match scan_token(&mut input) {
            Ok((kind, literal)) => {
                let end = input.current_token_start();
                let line = lines.line_at(source, start);
                tokens.push(Token::new(
                    kind,
                    &source[start..end],
                    literal,
                    Span::new(start, end - start, line),
                ));
            }
            Err(_) => return Err(scan_error(source, start, &mut lines)),
        }
    }

    let eof_line = lines.line_at(source, source.len());
    tokens.push(Token::new(
        TokenKind::Eof,
        "",
        None,
        Span::new(source.len(), 0, eof_line),
    ));
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn scan_ok(source: &str) -> Vec<Token> {
        scan_all(source).expect("scan should succeed")
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn single_char_tokens() {
        let tokens = scan_ok("(){},:-+/*");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::Comma,
                TokenKind::Colon,
                TokenKind::Minus,
                TokenKind::Plus,
                TokenKind::Slash,
                TokenKind::Star,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn two_char_tokens() {
        let tokens = scan_ok("!= == >= <= // ->");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::BangEqual,
                TokenKind::EqualEqual,
                TokenKind::GreaterEqual,
                TokenKind::LessEqual,
                TokenKind::SlashSlash,
                TokenKind::Arrow,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn single_then_equal() {
        let tokens = scan_ok("! = < > /");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Bang,
                TokenKind::Equal,
                TokenKind::Less,
                TokenKind::Greater,
                TokenKind::Slash,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_literal_is_verbatim() {
        let tokens = scan_ok(r#""hello\n world""#);
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].lexeme, r#""hello\n world""#);
        assert_eq!(
            tokens[0].literal,
            Some(Literal::Str(r"hello\n world".to_string()))
        );
    }

    #[rstest]
    #[case("42", 42.0)]
    #[case("3.14", 3.14)]
    #[case("2.0", 2.0)]
    #[case("007", 7.0)]
    fn number_literals(#[case] source: &str, #[case] expected: f64) {
        let tokens = scan_ok(source);
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].lexeme, source);
        assert_eq!(tokens[0].literal, Some(Literal::Number(expected)));
    }

    #[test]
    fn dot_without_digits_is_not_part_of_number() {
        let err = scan_all("42.foo").unwrap_err();
        assert!(err.to_string().contains("unexpected character '.'"));
    }

    #[test]
    fn identifiers_and_keywords() {
        let tokens = scan_ok("let x = true");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Let,
                TokenKind::Identifier,
                TokenKind::Equal,
                TokenKind::True,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn all_keywords() {
        let tokens = scan_ok("else false fn if let return true while");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Else,
                TokenKind::False,
                TokenKind::Fn,
                TokenKind::If,
                TokenKind::Let,
                TokenKind::Return,
                TokenKind::True,
                TokenKind::While,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn builtin_names_scan_as_identifiers() {
        let tokens = scan_ok("println print clock _under_score");
        assert!(
            tokens[..4]
                .iter()
                .all(|t| t.kind == TokenKind::Identifier)
        );
    }

    #[test]
    fn comments_ignored() {
        let tokens = scan_ok("let x ;; this is a comment\nlet y ;; trailing");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Let,
                TokenKind::Identifier,
                TokenKind::Let,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn spans_and_lines_are_correct() {
        let tokens = scan_ok("let x = 42\n\nx");
        assert_eq!(tokens[0].span, Span::new(0, 3, 1)); // let
        assert_eq!(tokens[1].span, Span::new(4, 1, 1)); // x
        assert_eq!(tokens[2].span, Span::new(6, 1, 1)); // =
        assert_eq!(tokens[3].span, Span::new(8, 2, 1)); // 42
        assert_eq!(tokens[4].span, Span::new(12, 1, 3)); // x
        assert_eq!(tokens[4].line(), 3);
        assert_eq!(tokens[5].kind, TokenKind::Eof);
    }

    #[test]
    fn multiline_string_advances_line_count() {
        let tokens = scan_ok("\"a\nb\" x");
        assert_eq!(tokens[0].line(), 1);
        assert_eq!(tokens[1].line(), 2);
    }

    #[test]
    fn lone_semicolon_is_an_error() {
        let err = scan_all("let x = 1;").unwrap_err();
        assert!(err.to_string().contains("';;'"));
        match err {
            CompileError::Lex { line, column, .. } => {
                assert_eq!(line, 1);
                assert_eq!(column, 10);
            }
            other => panic!("expected lex error, got {other:?}"),
        }
    }

    #[test]
    fn unexpected_character_error() {
        let err = scan_all("let x = 1\nlet y = @").unwrap_err();
        assert!(err.to_string().contains('@'));
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn unterminated_string_error() {
        let err = scan_all("\"unterminated").unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn empty_source_is_just_eof() {
        assert_eq!(kinds(&scan_ok("")), vec![TokenKind::Eof]);
        assert_eq!(kinds(&scan_ok(";; only a comment")), vec![TokenKind::Eof]);
    }
}
