//! Lexical analyzer for DSL source text.
//!
//! The lexer converts source text into a stream of [`Token`]s. Whitespace,
//! newlines and comments are kept as trivia tokens so that editor tooling
//! can work from the same stream the parser uses.
//!
//! The public entry point is [`tokenize`], which performs error-recovering
//! lexical analysis and collects all diagnostics in a single pass.

use std::char;

use winnow::{
    Parser as _,
    combinator::{alt, cut_err, delimited, not, peek, preceded, repeat, terminated},
    error::{ContextError, ErrMode},
    stream::{LocatingSlice, Location, Stream},
    token::{literal, none_of, one_of, take_until, take_while},
};

use crate::{
    error::{Diagnostic, DiagnosticCollector, ErrorCode},
    span::Span,
    tokens::{PositionedToken, Token},
};

/// Rich diagnostic information for lexer errors.
///
/// Attached to winnow errors via `.context()` to provide detailed error
/// messages with codes, help text, and precise span information.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LexerDiagnostic {
    pub code: ErrorCode,
    pub message: &'static str,
    pub help: Option<&'static str>,
    /// The error span covers from `start` to the error position.
    pub start: usize,
}

type Input<'a> = LocatingSlice<&'a str>;
type IResult<O> = Result<O, ErrMode<ContextError<LexerDiagnostic>>>;

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_version_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '+'
}

fn is_selector_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | '^' | '~' | '<' | '>' | '=' | '*')
}

/// Consume a run of `is_part` characters where single inner hyphens are
/// allowed, so `orders-topic` is one word but `a->b` is not.
fn hyphenated_tail<'a>(input: &mut Input<'a>, is_part: fn(char) -> bool) -> IResult<()> {
    repeat(
        0..,
        alt((
            take_while(1.., is_part).void(),
            ('-', peek(one_of(|c: char| c.is_ascii_alphanumeric()))).void(),
        )),
    )
    .parse_next(input)
}

/// Parse a unicode escape sequence in a string: `\u{XXXX}` where XXXX is 1-6 hex digits.
///
/// Takes `escape_start` position (before `\`) for error span calculation.
/// Uses `cut_err` after 'u' to commit and preserve diagnostic context.
fn string_escape_unicode<'a>(input: &mut Input<'a>, escape_start: usize) -> IResult<char> {
    preceded(
        'u',
        cut_err(
            delimited(
                '{',
                take_while(1..=6, |c: char| c.is_ascii_hexdigit()).context(LexerDiagnostic {
                    code: ErrorCode::E006,
                    message: "empty unicode escape",
                    help: Some("provide 1-6 hex digits: `\\u{1F602}`"),
                    start: escape_start,
                }),
                '}',
            )
            .context(LexerDiagnostic {
                code: ErrorCode::E004,
                message: "invalid unicode escape",
                help: Some("use format `\\u{XXXX}` with 1-6 hex digits"),
                start: escape_start,
            })
            .verify_map(|hex_str: &str| {
                u32::from_str_radix(hex_str, 16)
                    .ok()
                    .and_then(char::from_u32)
            })
            .context(LexerDiagnostic {
                code: ErrorCode::E005,
                message: "invalid unicode codepoint",
                help: Some("valid range: `0x0000`-`0xD7FF` or `0xE000`-`0x10FFFF`"),
                start: escape_start,
            }),
        ),
    )
    .parse_next(input)
}

/// Parse a standard escape character in a string after the backslash.
fn string_escape_char<'a>(input: &mut Input<'a>) -> IResult<char> {
    one_of(['n', 'r', 't', '\\', '\'', '"', '0'])
        .map(|c| match c {
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            '0' => '\0',
            other => other,
        })
        .parse_next(input)
}

/// Parse an escape sequence in a string starting with backslash.
fn string_escape<'a>(input: &mut Input<'a>) -> IResult<char> {
    let escape_start = input.current_token_start();

    '\\'
        .parse_next(input)
        .map_err(|e: ErrMode<ContextError<LexerDiagnostic>>| e)?;

    match string_escape_unicode(input, escape_start) {
        Ok(ch) => return Ok(ch),
        Err(ErrMode::Backtrack(_)) => {} // Try next alternative
        Err(e) => return Err(e),         // Propagate cut errors (E004, E005, E006)
    }

    if let Ok(ch) = string_escape_char(input) {
        return Ok(ch);
    }

    let mut error = ContextError::new();
    error.push(LexerDiagnostic {
        code: ErrorCode::E003,
        message: "invalid escape sequence",
        help: Some("valid escapes: `\\n`, `\\r`, `\\t`, `\\\\`, `\\'`, `\\\"`, `\\0`, `\\u{}`"),
        start: escape_start,
    });
    Err(ErrMode::Cut(error))
}

/// Parse a double-quoted string literal on a single line.
fn string_literal<'a>(input: &mut Input<'a>) -> IResult<Token<'a>> {
    let string_char = none_of(['"', '\\', '\n', '\r']);
    let string_content = repeat(0.., alt((string_escape, string_char))).fold(
        String::new,
        |mut acc, ch| {
            acc.push(ch);
            acc
        },
    );

    let start_pos = input.current_token_start();

    '"'.parse_next(input)
        .map_err(|e: ErrMode<ContextError<LexerDiagnostic>>| e)?;

    // Commit after the opening quote so the error span covers the literal
    cut_err(terminated(string_content, '"'))
        .context(LexerDiagnostic {
            code: ErrorCode::E001,
            message: "unterminated string literal",
            help: Some("add closing `\"` before the end of the line"),
            start: start_pos,
        })
        .parse_next(input)
        .map(Token::StringLiteral)
}

/// Parse line comment starting with '//'
fn line_comment<'a>(input: &mut Input<'a>) -> IResult<Token<'a>> {
    preceded("//", take_while(0.., |c| c != '\n'))
        .map(Token::LineComment)
        .parse_next(input)
}

/// Parse a block comment; an unterminated one runs to the end of input.
fn block_comment<'a>(input: &mut Input<'a>) -> IResult<Token<'a>> {
    preceded(
        "/*",
        alt((
            terminated(take_until(0.., "*/"), "*/"),
            take_while(0.., |_: char| true),
        )),
    )
    .map(Token::BlockComment)
    .parse_next(input)
}

/// Parse an `@` immediately followed by a version selector.
///
/// `@badge` stays an annotation: only selectors starting with a digit, a
/// range operator, `v<digit>` or the word `latest` qualify.
fn version_selector<'a>(input: &mut Input<'a>) -> IResult<Token<'a>> {
    preceded(
        '@',
        take_while(1.., is_selector_char).verify(|selector: &str| {
            let mut chars = selector.chars();
            match chars.next() {
                Some(c) if c.is_ascii_digit() || matches!(c, '^' | '~' | '<' | '>' | '=' | '*') => {
                    true
                }
                Some('v' | 'V') => chars.next().is_some_and(|c| c.is_ascii_digit()),
                _ => selector.eq_ignore_ascii_case("latest"),
            }
        }),
    )
    .map(Token::VersionSelector)
    .parse_next(input)
}

/// Parse a bare version literal: `1.0.0`, `2`, `1.0.0-rc.1`, `v1.2`
fn version_literal<'a>(input: &mut Input<'a>) -> IResult<Token<'a>> {
    alt((
        (one_of(|c: char| c.is_ascii_digit()), |i: &mut Input<'a>| {
            hyphenated_tail(i, is_version_char)
        })
            .take(),
        (
            one_of(['v', 'V']),
            one_of(|c: char| c.is_ascii_digit()),
            take_while(0.., |c: char| c.is_ascii_digit() || c == '.'),
            peek(not(one_of(|c: char| is_identifier_char(c) || c == '-'))),
        )
            .take(),
    ))
    .map(Token::Version)
    .parse_next(input)
}

/// Parse identifiers, including hyphenated keywords such as `writes-to`
fn identifier<'a>(input: &mut Input<'a>) -> IResult<Token<'a>> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        |i: &mut Input<'a>| hyphenated_tail(i, is_identifier_char),
    )
        .take()
        .map(Token::Identifier)
        .parse_next(input)
}

/// Parse single character tokens
fn punctuation<'a>(input: &mut Input<'a>) -> IResult<Token<'a>> {
    alt((
        literal("->").value(Token::Arrow),
        '@'.value(Token::At),
        alt((
            '{'.value(Token::LeftBrace),
            '}'.value(Token::RightBrace),
            '['.value(Token::LeftBracket),
            ']'.value(Token::RightBracket),
        )),
        alt((
            '('.value(Token::LeftParen),
            ')'.value(Token::RightParen),
            ','.value(Token::Comma),
            ':'.value(Token::Colon),
        )),
    ))
    .parse_next(input)
}

/// Parse whitespace (spaces, tabs, carriage returns but not newlines)
fn whitespace<'a>(input: &mut Input<'a>) -> IResult<Token<'a>> {
    take_while(1.., |c: char| c.is_whitespace() && c != '\n')
        .value(Token::Whitespace)
        .parse_next(input)
}

/// Parse newline
fn newline<'a>(input: &mut Input<'a>) -> IResult<Token<'a>> {
    '\n'.value(Token::Newline).parse_next(input)
}

/// Parse a single token with position tracking
fn positioned_token<'a>(input: &mut Input<'a>) -> IResult<PositionedToken<'a>> {
    let start_pos = input.current_token_start();

    let token = alt((
        line_comment,     // Must come before block comments
        block_comment,    // Must come before punctuation
        string_literal,   // Must come before any single char
        version_selector, // Must come before '@'
        version_literal,  // Must come before identifier (`v1.2`)
        identifier,       // Must come before single chars
        punctuation,      // Single character tokens and `->`
        newline,          // Must come before whitespace
        whitespace,       // General whitespace
    ))
    .parse_next(input)?;

    let end_pos = input.current_token_start();
    let span = Span::new(start_pos..end_pos);

    Ok(PositionedToken::new(token, span))
}

/// Lexer that accumulates tokens and diagnostics during tokenization.
struct Lexer<'a> {
    tokens: Vec<PositionedToken<'a>>,
    diagnostics: DiagnosticCollector,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer.
    fn new() -> Self {
        Self {
            tokens: Vec::new(),
            diagnostics: DiagnosticCollector::new(),
        }
    }

    /// Tokenize the input, collecting tokens and errors.
    fn tokenize(&mut self, mut input: Input<'a>) {
        while !input.is_empty() {
            match positioned_token(&mut input) {
                Ok(token) => {
                    self.tokens.push(token);
                }
                Err(e) => {
                    let error_pos = input.current_token_start();
                    let diagnostic = Self::convert_err_mode(e, error_pos);
                    self.diagnostics.emit(diagnostic);

                    if !input.is_empty() {
                        input.next_token();
                    }
                }
            }
        }
    }

    /// Finish lexing and return tokens with the collected diagnostics.
    fn finish(self) -> (Vec<PositionedToken<'a>>, Vec<Diagnostic>) {
        (self.tokens, self.diagnostics.into_diagnostics())
    }

    /// Convert an ErrMode and error position to a Diagnostic.
    ///
    /// Falls back to E002 (unexpected character) if no diagnostic context
    /// is attached to the error.
    fn convert_err_mode(err: ErrMode<ContextError<LexerDiagnostic>>, error_pos: usize) -> Diagnostic {
        let context_error = match err {
            ErrMode::Backtrack(ctx) | ErrMode::Cut(ctx) => ctx,
            _ => ContextError::new(),
        };

        if let Some(LexerDiagnostic {
            code,
            message,
            help,
            start,
        }) = context_error.context().next()
        {
            let span = Span::new(*start..error_pos);

            let mut diag = Diagnostic::error(*message)
                .with_code(*code)
                .with_label(span, code.description());
            if let Some(h) = help {
                diag = diag.with_help(*h);
            }
            return diag;
        }

        let span = Span::new(error_pos..error_pos.saturating_add(1));
        Diagnostic::error("unexpected character")
            .with_code(ErrorCode::E002)
            .with_label(span, ErrorCode::E002.description())
    }
}

/// Tokenize source text, recovering from errors.
///
/// Every character that does not start a token produces one diagnostic and
/// is skipped, so the returned token stream is always usable.
pub fn tokenize(input: &str) -> (Vec<PositionedToken<'_>>, Vec<Diagnostic>) {
    let located_input = LocatingSlice::new(input);
    let mut lexer = Lexer::new();
    lexer.tokenize(located_input);
    lexer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn significant(input: &str) -> Vec<Token<'_>> {
        let (tokens, diagnostics) = tokenize(input);
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
        tokens
            .into_iter()
            .map(|t| t.token)
            .filter(|t| !t.is_trivia())
            .collect()
    }

    fn test_single_token(input: &str, expected: Token<'_>) {
        let mut located_input = LocatingSlice::new(input);
        let positioned = positioned_token(&mut located_input)
            .unwrap_or_else(|_| panic!("Failed to parse: {input}"));
        assert_eq!(positioned.token, expected);
        assert!(located_input.is_empty(), "trailing input for {input}");
    }

    #[test]
    fn test_identifiers() {
        test_single_token("Orders", Token::Identifier("Orders"));
        test_single_token("_private", Token::Identifier("_private"));
        test_single_token("orders-topic", Token::Identifier("orders-topic"));
        test_single_token("writes-to", Token::Identifier("writes-to"));
        test_single_token("v2Service", Token::Identifier("v2Service"));
    }

    #[test]
    fn test_hyphen_before_arrow_is_not_part_of_identifier() {
        assert_eq!(
            significant("a->b"),
            vec![
                Token::Identifier("a"),
                Token::Arrow,
                Token::Identifier("b")
            ]
        );
    }

    #[test]
    fn test_versions() {
        test_single_token("1.0.0", Token::Version("1.0.0"));
        test_single_token("2", Token::Version("2"));
        test_single_token("1.0.0-beta.1", Token::Version("1.0.0-beta.1"));
        test_single_token("v1.2", Token::Version("v1.2"));
    }

    #[test]
    fn test_version_selectors() {
        assert_eq!(
            significant("OrderCreated@1.0.0"),
            vec![
                Token::Identifier("OrderCreated"),
                Token::VersionSelector("1.0.0")
            ]
        );
        test_single_token("@^1", Token::VersionSelector("^1"));
        test_single_token("@>=2.0.0", Token::VersionSelector(">=2.0.0"));
        test_single_token("@latest", Token::VersionSelector("latest"));
        test_single_token("@1.x", Token::VersionSelector("1.x"));
    }

    #[test]
    fn test_annotation_is_not_a_selector() {
        assert_eq!(
            significant("@badge(\"new\")"),
            vec![
                Token::At,
                Token::Identifier("badge"),
                Token::LeftParen,
                Token::StringLiteral("new".to_string()),
                Token::RightParen,
            ]
        );
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(
            significant("-> @ { } [ ] ( ) , :"),
            vec![
                Token::Arrow,
                Token::At,
                Token::LeftBrace,
                Token::RightBrace,
                Token::LeftBracket,
                Token::RightBracket,
                Token::LeftParen,
                Token::RightParen,
                Token::Comma,
                Token::Colon,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        test_single_token(r#""a\"b""#, Token::StringLiteral("a\"b".to_string()));
        test_single_token(r#""tab\tend""#, Token::StringLiteral("tab\tend".to_string()));
        test_single_token(r#""\u{1F680}""#, Token::StringLiteral("\u{1F680}".to_string()));
    }

    #[test]
    fn test_comments() {
        test_single_token("// note", Token::LineComment(" note"));
        test_single_token("/* a { b */", Token::BlockComment(" a { b "));
        test_single_token("/* open", Token::BlockComment(" open"));
    }

    #[test]
    fn test_statement_stream() {
        assert_eq!(
            significant("sends event OrderCreated to orders-topic { }"),
            vec![
                Token::Identifier("sends"),
                Token::Identifier("event"),
                Token::Identifier("OrderCreated"),
                Token::Identifier("to"),
                Token::Identifier("orders-topic"),
                Token::LeftBrace,
                Token::RightBrace,
            ]
        );
    }

    #[test]
    fn test_spans() {
        let (tokens, _) = tokenize("service Orders");
        assert_eq!(tokens[0].span, Span::new(0..7));
        assert_eq!(tokens[1].token, Token::Whitespace);
        assert_eq!(tokens[2].span, Span::new(8..14));
    }

    #[test]
    fn test_unterminated_string_reports_e001() {
        let (tokens, diagnostics) = tokenize("summary \"open\nservice A");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), Some(ErrorCode::E001));
        assert_eq!(diagnostics[0].primary_span(), Some(Span::new(8..13)));
        assert!(
            tokens
                .iter()
                .any(|t| t.token == Token::Identifier("service"))
        );
    }

    #[test]
    fn test_invalid_escape_reports_e003() {
        let (_, diagnostics) = tokenize(r#""bad \q""#);
        assert_eq!(diagnostics[0].code(), Some(ErrorCode::E003));
    }

    #[test]
    fn test_empty_unicode_escape_reports_e006() {
        let (_, diagnostics) = tokenize(r#""\u{}""#);
        assert_eq!(diagnostics[0].code(), Some(ErrorCode::E006));
    }

    #[test]
    fn test_unexpected_character_recovers() {
        let (tokens, diagnostics) = tokenize("service # Orders");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), Some(ErrorCode::E002));
        assert_eq!(diagnostics[0].primary_span(), Some(Span::new(8..9)));
        assert!(tokens.iter().any(|t| t.token == Token::Identifier("Orders")));
    }
}
