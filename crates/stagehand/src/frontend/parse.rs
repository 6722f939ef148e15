//! Lexer and parser for the language understood by [`Simple`][super::Simple].
//!
//! ```text
//! // Comments run to the end of the line.
//! let { a, b } = import("./other");   // blocking import
//! import("./side-effects");           // fire-and-forget import
//! let x = [1, -2, "three", true];
//! export y = x;
//! ```

use core::fmt;
use core::ops::Range;

/// Error raised while lexing or parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}")]
pub(crate) struct SyntaxError {
    pub(crate) kind: SyntaxErrorKind,
    pub(crate) span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum SyntaxErrorKind {
    #[error("Unexpected character `{0}`")]
    UnexpectedChar(char),
    #[error("Unterminated string literal")]
    UnterminatedString,
    #[error("Unsupported escape sequence `\\{0}`")]
    UnsupportedEscape(char),
    #[error("Integer literal is out of range")]
    IntegerOutOfRange,
    #[error("Expected {expected}, but found {actual}")]
    Expected {
        expected: &'static str,
        actual: TokenKind,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident(Box<str>),
    String(Box<str>),
    /// Integer literals are lexed unsigned, negation is handled by the
    /// parser so that the smallest integer can be written.
    Integer(u64),
    Let,
    Export,
    Import,
    True,
    False,
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    OpenParen,
    CloseParen,
    Comma,
    SemiColon,
    Eq,
    Dash,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(ident) => write!(f, "identifier `{ident}`"),
            TokenKind::String(..) => f.write_str("string literal"),
            TokenKind::Integer(..) => f.write_str("integer literal"),
            TokenKind::Let => f.write_str("`let`"),
            TokenKind::Export => f.write_str("`export`"),
            TokenKind::Import => f.write_str("`import`"),
            TokenKind::True => f.write_str("`true`"),
            TokenKind::False => f.write_str("`false`"),
            TokenKind::OpenBrace => f.write_str("`{`"),
            TokenKind::CloseBrace => f.write_str("`}`"),
            TokenKind::OpenBracket => f.write_str("`[`"),
            TokenKind::CloseBracket => f.write_str("`]`"),
            TokenKind::OpenParen => f.write_str("`(`"),
            TokenKind::CloseParen => f.write_str("`)`"),
            TokenKind::Comma => f.write_str("`,`"),
            TokenKind::SemiColon => f.write_str("`;`"),
            TokenKind::Eq => f.write_str("`=`"),
            TokenKind::Dash => f.write_str("`-`"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) span: Range<usize>,
}

/// Lex `source`, with spans shifted by `offset`.
///
/// Lexing recovers from errors by skipping the offending input, so the
/// returned tokens are always usable. The last token is always
/// [`TokenKind::Eof`].
pub(crate) fn lex(source: &str, offset: usize) -> (Vec<Token>, Vec<SyntaxError>) {
    let mut lexer = Lexer {
        source,
        cursor: 0,
        offset,
        errors: Vec::new(),
    };

    let mut tokens = Vec::new();

    loop {
        let token = lexer.next_token();
        let eof = token.kind == TokenKind::Eof;
        tokens.push(token);

        if eof {
            break;
        }
    }

    (tokens, lexer.errors)
}

struct Lexer<'a> {
    source: &'a str,
    cursor: usize,
    offset: usize,
    errors: Vec<SyntaxError>,
}

impl Lexer<'_> {
    fn peek(&self) -> Option<char> {
        self.source[self.cursor..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.cursor += c.len_utf8();
        Some(c)
    }

    fn span(&self, start: usize) -> Range<usize> {
        self.offset + start..self.offset + self.cursor
    }

    fn error(&mut self, kind: SyntaxErrorKind, start: usize) {
        let span = self.span(start);
        self.errors.push(SyntaxError { kind, span });
    }

    fn next_token(&mut self) -> Token {
        loop {
            let start = self.cursor;

            let Some(c) = self.bump() else {
                return Token {
                    kind: TokenKind::Eof,
                    span: self.span(start),
                };
            };

            let kind = match c {
                c if c.is_whitespace() => continue,
                '/' if self.peek() == Some('/') => {
                    while self.peek().map_or(false, |c| c != '\n') {
                        self.bump();
                    }

                    continue;
                }
                '{' => TokenKind::OpenBrace,
                '}' => TokenKind::CloseBrace,
                '[' => TokenKind::OpenBracket,
                ']' => TokenKind::CloseBracket,
                '(' => TokenKind::OpenParen,
                ')' => TokenKind::CloseParen,
                ',' => TokenKind::Comma,
                ';' => TokenKind::SemiColon,
                '=' => TokenKind::Eq,
                '-' => TokenKind::Dash,
                '"' => match self.string(start) {
                    Some(string) => TokenKind::String(string.into()),
                    None => continue,
                },
                c if c.is_ascii_digit() => match self.integer(start) {
                    Some(n) => TokenKind::Integer(n),
                    None => continue,
                },
                c if c.is_ascii_alphabetic() || c == '_' => self.ident(start),
                c => {
                    self.error(SyntaxErrorKind::UnexpectedChar(c), start);
                    continue;
                }
            };

            return Token {
                kind,
                span: self.span(start),
            };
        }
    }

    fn string(&mut self, start: usize) -> Option<String> {
        let mut out = String::new();

        loop {
            let escape = self.cursor;

            match self.bump() {
                None => {
                    self.error(SyntaxErrorKind::UnterminatedString, start);
                    return None;
                }
                Some('"') => return Some(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some(c) => self.error(SyntaxErrorKind::UnsupportedEscape(c), escape),
                    None => {
                        self.error(SyntaxErrorKind::UnterminatedString, start);
                        return None;
                    }
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn integer(&mut self, start: usize) -> Option<u64> {
        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.bump();
        }

        match self.source[start..self.cursor].parse() {
            Ok(n) => Some(n),
            Err(..) => {
                self.error(SyntaxErrorKind::IntegerOutOfRange, start);
                None
            }
        }
    }

    fn ident(&mut self, start: usize) -> TokenKind {
        while self
            .peek()
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }

        match &self.source[start..self.cursor] {
            "let" => TokenKind::Let,
            "export" => TokenKind::Export,
            "import" => TokenKind::Import,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            ident => TokenKind::Ident(ident.into()),
        }
    }
}

/// A name and where it appears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Name {
    pub(crate) text: Box<str>,
    pub(crate) span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Expr {
    String(Box<str>),
    Integer(i64),
    Bool(bool),
    List(Vec<Expr>),
    Name(Name),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Statement {
    /// `let { names } = import("specifier");` or `import("specifier");`.
    Import {
        /// Names bound by a blocking import, `None` for fire-and-forget.
        names: Option<Vec<Name>>,
        specifier: Box<str>,
        /// The span of the specifier literal.
        span: Range<usize>,
    },
    /// `let name = value;` or `export name = value;`.
    Let {
        name: Name,
        value: Expr,
        export: bool,
    },
}

/// Parse a token stream produced by [`lex`].
///
/// A statement which fails to parse is reported and skipped up to the next
/// `;`.
pub(crate) fn parse(tokens: &[Token]) -> (Vec<Statement>, Vec<SyntaxError>) {
    let mut parser = Parser { tokens, cursor: 0 };
    let mut statements = Vec::new();
    let mut errors = Vec::new();

    while parser.kind() != &TokenKind::Eof {
        if parser.kind() == &TokenKind::SemiColon {
            parser.cursor += 1;
            continue;
        }

        match parser.statement() {
            Ok(statement) => statements.push(statement),
            Err(error) => {
                errors.push(error);
                parser.recover();
            }
        }
    }

    (statements, errors)
}

struct Parser<'a> {
    tokens: &'a [Token],
    cursor: usize,
}

impl Parser<'_> {
    fn token(&self) -> &Token {
        // The last token is always `Eof`, and the parser never moves past it.
        &self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> &TokenKind {
        &self.token().kind
    }

    fn bump(&mut self) -> Token {
        let token = self.token().clone();

        if token.kind != TokenKind::Eof {
            self.cursor += 1;
        }

        token
    }

    fn expected(&self, expected: &'static str) -> SyntaxError {
        let token = self.token();

        SyntaxError {
            kind: SyntaxErrorKind::Expected {
                expected,
                actual: token.kind.clone(),
            },
            span: token.span.clone(),
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<Token, SyntaxError> {
        if *self.kind() != kind {
            return Err(self.expected(expected));
        }

        Ok(self.bump())
    }

    fn recover(&mut self) {
        loop {
            match self.bump().kind {
                TokenKind::SemiColon | TokenKind::Eof => break,
                _ => {}
            }
        }
    }

    fn statement(&mut self) -> Result<Statement, SyntaxError> {
        let statement = match self.kind() {
            TokenKind::Import => {
                let (specifier, span) = self.import()?;

                Statement::Import {
                    names: None,
                    specifier,
                    span,
                }
            }
            TokenKind::Let if self.peek_kind(1) == &TokenKind::OpenBrace => {
                self.bump();
                let names = self.names()?;
                self.expect(TokenKind::Eq, "`=`")?;
                let (specifier, span) = self.import()?;

                Statement::Import {
                    names: Some(names),
                    specifier,
                    span,
                }
            }
            TokenKind::Let | TokenKind::Export => {
                let export = self.bump().kind == TokenKind::Export;
                let name = self.name()?;
                self.expect(TokenKind::Eq, "`=`")?;
                let value = self.expr()?;

                Statement::Let {
                    name,
                    value,
                    export,
                }
            }
            _ => return Err(self.expected("a statement")),
        };

        self.expect(TokenKind::SemiColon, "`;`")?;
        Ok(statement)
    }

    fn peek_kind(&self, n: usize) -> &TokenKind {
        &self.tokens[(self.cursor + n).min(self.tokens.len() - 1)].kind
    }

    /// `import("specifier")`
    fn import(&mut self) -> Result<(Box<str>, Range<usize>), SyntaxError> {
        self.expect(TokenKind::Import, "`import`")?;
        self.expect(TokenKind::OpenParen, "`(`")?;

        let TokenKind::String(specifier) = self.kind().clone() else {
            return Err(self.expected("a specifier string"));
        };

        let span = self.bump().span;
        self.expect(TokenKind::CloseParen, "`)`")?;
        Ok((specifier, span))
    }

    /// `{ a, b, }`
    fn names(&mut self) -> Result<Vec<Name>, SyntaxError> {
        self.expect(TokenKind::OpenBrace, "`{`")?;
        let mut names = Vec::new();

        while *self.kind() != TokenKind::CloseBrace {
            names.push(self.name()?);

            if *self.kind() != TokenKind::Comma {
                break;
            }

            self.bump();
        }

        self.expect(TokenKind::CloseBrace, "`}`")?;
        Ok(names)
    }

    fn name(&mut self) -> Result<Name, SyntaxError> {
        let TokenKind::Ident(text) = self.kind().clone() else {
            return Err(self.expected("a name"));
        };

        let span = self.bump().span;
        Ok(Name { text, span })
    }

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        let expr = match self.kind().clone() {
            TokenKind::String(string) => {
                self.bump();
                Expr::String(string)
            }
            TokenKind::Integer(n) => {
                let span = self.bump().span;
                Expr::Integer(i64::try_from(n).map_err(|_| out_of_range(span))?)
            }
            TokenKind::Dash => {
                let start = self.bump().span.start;

                let TokenKind::Integer(n) = *self.kind() else {
                    return Err(self.expected("an integer literal"));
                };

                let end = self.bump().span.end;
                let n = i64::try_from(-i128::from(n)).map_err(|_| out_of_range(start..end))?;
                Expr::Integer(n)
            }
            TokenKind::True => {
                self.bump();
                Expr::Bool(true)
            }
            TokenKind::False => {
                self.bump();
                Expr::Bool(false)
            }
            TokenKind::OpenBracket => {
                self.bump();
                let mut items = Vec::new();

                while *self.kind() != TokenKind::CloseBracket {
                    items.push(self.expr()?);

                    if *self.kind() != TokenKind::Comma {
                        break;
                    }

                    self.bump();
                }

                self.expect(TokenKind::CloseBracket, "`]`")?;
                Expr::List(items)
            }
            TokenKind::Ident(..) => Expr::Name(self.name()?),
            _ => return Err(self.expected("an expression")),
        };

        Ok(expr)
    }
}

fn out_of_range(span: Range<usize>) -> SyntaxError {
    SyntaxError {
        kind: SyntaxErrorKind::IntegerOutOfRange,
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::{lex, parse, Expr, Statement, SyntaxErrorKind, TokenKind};

    fn statements(source: &str) -> Vec<Statement> {
        let (tokens, errors) = lex(source, 0);
        assert!(errors.is_empty(), "{errors:?}");
        let (statements, errors) = parse(&tokens);
        assert!(errors.is_empty(), "{errors:?}");
        statements
    }

    #[test]
    fn lex_offsets() {
        let (tokens, errors) = lex("let x", 10);
        assert!(errors.is_empty());
        assert_eq!(tokens[0].kind, TokenKind::Let);
        assert_eq!(tokens[1].span, 14..15);
        assert_eq!(tokens[2].kind, TokenKind::Eof);
    }

    #[test]
    fn lex_strings_and_comments() {
        let (tokens, errors) = lex("\"a\\n\\\"b\" // \"not a string\"\n1", 0);
        assert!(errors.is_empty());

        let kinds = tokens.into_iter().map(|t| t.kind).collect::<Vec<_>>();

        assert_eq!(
            kinds,
            [
                TokenKind::String("a\n\"b".into()),
                TokenKind::Integer(1),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn lex_errors_recover() {
        let (tokens, errors) = lex("let # x = \"open", 0);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].kind, SyntaxErrorKind::UnexpectedChar('#'));
        assert_eq!(errors[0].span, 4..5);
        assert_eq!(errors[1].kind, SyntaxErrorKind::UnterminatedString);
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn imports() {
        let parsed = statements("let { a, b, } = import(\"./x\");\nimport(\"std/core\");");

        let Statement::Import {
            names: Some(names),
            specifier,
            span,
        } = &parsed[0]
        else {
            panic!("expected blocking import, got {:?}", parsed[0]);
        };

        assert_eq!(names.iter().map(|n| &*n.text).collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(&**specifier, "./x");
        assert_eq!(*span, 23..28);

        assert!(matches!(
            &parsed[1],
            Statement::Import { names: None, specifier, .. } if &**specifier == "std/core"
        ));
    }

    #[test]
    fn values() {
        let parsed = statements(
            "export a = [1, -2, \"x\", true, []];\nlet m = -9223372036854775808;\nexport b = m;",
        );

        assert_eq!(
            parsed[0],
            Statement::Let {
                name: super::Name {
                    text: "a".into(),
                    span: 7..8,
                },
                value: Expr::List(vec![
                    Expr::Integer(1),
                    Expr::Integer(-2),
                    Expr::String("x".into()),
                    Expr::Bool(true),
                    Expr::List(vec![]),
                ]),
                export: true,
            }
        );

        assert!(matches!(
            &parsed[1],
            Statement::Let { value: Expr::Integer(i64::MIN), export: false, .. }
        ));

        assert!(matches!(&parsed[2], Statement::Let { value: Expr::Name(..), .. }));
    }

    #[test]
    fn out_of_range() {
        let (tokens, _) = lex("export a = 9223372036854775808;", 0);
        let (statements, errors) = parse(&tokens);
        assert!(statements.is_empty());
        assert_eq!(errors[0].kind, SyntaxErrorKind::IntegerOutOfRange);
    }

    #[test]
    fn recovery() {
        let (tokens, _) = lex("let = 1; export ok = 2; let { a } = nope(\"x\");", 0);
        let (statements, errors) = parse(&tokens);

        assert_eq!(errors.len(), 2);
        assert_eq!(statements.len(), 1);
        assert_eq!(errors[0].to_string(), "Expected a name, but found `=`");
    }
}
