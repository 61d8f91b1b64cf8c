//! Token definitions.
//!
//! Keywords are not separate tokens: every keyword lexes as an
//! [`Token::Identifier`] and the parser decides by context, so any keyword
//! can also be used as a definition name.

use std::fmt;

use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'src> {
    /// Names and keywords: `Orders`, `orders-topic`, `sends`, `data-product`
    Identifier(&'src str),
    /// Double-quoted string with escapes applied
    StringLiteral(String),
    /// Version literal: `1.0.0`, `2`, `v1.2`, `1.0.0-beta.1`
    Version(&'src str),
    /// Selector glued to a reference with `@`, stored without the `@`:
    /// `1.0.0`, `^1`, `>=2.0.0`, `1.x`, `latest`
    VersionSelector(&'src str),

    At,
    Arrow,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    LeftParen,
    RightParen,
    Comma,
    Colon,

    LineComment(&'src str),
    BlockComment(&'src str),
    Whitespace,
    Newline,
}

impl Token<'_> {
    /// Returns `true` for whitespace, newlines and comments.
    pub fn is_trivia(&self) -> bool {
        matches!(
            self,
            Token::Whitespace | Token::Newline | Token::LineComment(_) | Token::BlockComment(_)
        )
    }

    /// Returns the identifier text if this token is an identifier.
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Token::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(name) => write!(f, "`{name}`"),
            Token::StringLiteral(_) => write!(f, "string literal"),
            Token::Version(version) => write!(f, "version `{version}`"),
            Token::VersionSelector(selector) => write!(f, "`@{selector}`"),
            Token::At => write!(f, "`@`"),
            Token::Arrow => write!(f, "`->`"),
            Token::LeftBrace => write!(f, "`{{`"),
            Token::RightBrace => write!(f, "`}}`"),
            Token::LeftBracket => write!(f, "`[`"),
            Token::RightBracket => write!(f, "`]`"),
            Token::LeftParen => write!(f, "`(`"),
            Token::RightParen => write!(f, "`)`"),
            Token::Comma => write!(f, "`,`"),
            Token::Colon => write!(f, "`:`"),
            Token::LineComment(_) | Token::BlockComment(_) => write!(f, "comment"),
            Token::Whitespace => write!(f, "whitespace"),
            Token::Newline => write!(f, "newline"),
        }
    }
}

/// A token together with its location in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionedToken<'src> {
    pub token: Token<'src>,
    pub span: Span,
}

impl<'src> PositionedToken<'src> {
    pub fn new(token: Token<'src>, span: Span) -> Self {
        Self { token, span }
    }
}
