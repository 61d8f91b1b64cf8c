//! Error codes for the diagnostic system.
//!
//! Error codes are organized by phase:
//! - `E0xx` - Lexer errors
//! - `E1xx` - Parser errors
//! - `E2xx` - Scope and import errors
//! - `E3xx` - Validation errors

use std::fmt;

/// Error codes for categorizing diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCode {
    // =========================================================================
    // Lexer Errors (E0xx)
    // =========================================================================
    /// Unterminated string literal.
    ///
    /// A string was opened with a quote but never closed on the same line.
    E001,

    /// Unexpected character.
    ///
    /// A character was encountered that does not start any token.
    E002,

    /// Invalid escape sequence.
    ///
    /// Valid escapes are: `\n`, `\r`, `\t`, `\\`, `\'`, `\"`, `\0`, `\u{...}`.
    E003,

    /// Invalid unicode escape format.
    ///
    /// Unicode escapes must use the format `\u{XXXX}` with 1-6 hexadecimal digits.
    E004,

    /// Invalid unicode codepoint.
    ///
    /// Valid codepoints are 0x0000-0xD7FF and 0xE000-0x10FFFF.
    E005,

    /// Empty unicode escape.
    E006,

    // =========================================================================
    // Parser Errors (E1xx)
    // =========================================================================
    /// Unexpected token.
    E100,

    /// Incomplete input.
    ///
    /// The document ended before a complete construct was parsed,
    /// typically a missing closing brace.
    E101,

    /// Unknown statement.
    ///
    /// The statement keyword is not valid inside the enclosing definition.
    E102,

    // =========================================================================
    // Scope Errors (E2xx)
    // =========================================================================
    /// Unresolved reference.
    ///
    /// No definition with the referenced name is visible. Reported as a
    /// warning; the graph gets a synthetic node instead.
    E200,

    /// Duplicate definition.
    ///
    /// Two definitions in one document share a name and version.
    E201,

    /// Duplicate export.
    ///
    /// Two documents export a definition with the same name and version.
    E202,

    /// Unresolved import.
    ///
    /// The imported document is not part of the workspace and no resolver
    /// could supply it.
    E203,

    /// Imported name not exported.
    E204,

    /// Import resolver failure.
    ///
    /// The host resolver returned an error while fetching an import.
    E205,

    // =========================================================================
    // Validation Errors (E3xx)
    // =========================================================================
    /// Kind mismatch.
    ///
    /// A reference resolved to a definition of a kind the field does not accept.
    E300,

    /// Cyclic containment or ownership.
    E301,

    /// Malformed version.
    E302,

    /// Missing version.
    E303,

    /// No matching version.
    ///
    /// Definitions with the referenced name exist, but none satisfies the
    /// version selector.
    E304,
}

impl ErrorCode {
    /// Returns the code as a string, e.g. `"E001"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            // Lexer errors
            ErrorCode::E001 => "E001",
            ErrorCode::E002 => "E002",
            ErrorCode::E003 => "E003",
            ErrorCode::E004 => "E004",
            ErrorCode::E005 => "E005",
            ErrorCode::E006 => "E006",
            // Parser errors
            ErrorCode::E100 => "E100",
            ErrorCode::E101 => "E101",
            ErrorCode::E102 => "E102",
            // Scope errors
            ErrorCode::E200 => "E200",
            ErrorCode::E201 => "E201",
            ErrorCode::E202 => "E202",
            ErrorCode::E203 => "E203",
            ErrorCode::E204 => "E204",
            ErrorCode::E205 => "E205",
            // Validation errors
            ErrorCode::E300 => "E300",
            ErrorCode::E301 => "E301",
            ErrorCode::E302 => "E302",
            ErrorCode::E303 => "E303",
            ErrorCode::E304 => "E304",
        }
    }

    /// Returns a short description of the code.
    pub fn description(&self) -> &'static str {
        match self {
            // Lexer errors
            ErrorCode::E001 => "unterminated string literal",
            ErrorCode::E002 => "unexpected character",
            ErrorCode::E003 => "invalid escape sequence",
            ErrorCode::E004 => "invalid unicode escape",
            ErrorCode::E005 => "invalid unicode codepoint",
            ErrorCode::E006 => "empty unicode escape",
            // Parser errors
            ErrorCode::E100 => "unexpected token",
            ErrorCode::E101 => "incomplete input",
            ErrorCode::E102 => "unknown statement",
            // Scope errors
            ErrorCode::E200 => "unresolved reference",
            ErrorCode::E201 => "duplicate definition",
            ErrorCode::E202 => "duplicate export",
            ErrorCode::E203 => "unresolved import",
            ErrorCode::E204 => "name not exported",
            ErrorCode::E205 => "import resolver failure",
            // Validation errors
            ErrorCode::E300 => "kind mismatch",
            ErrorCode::E301 => "cyclic containment",
            ErrorCode::E302 => "malformed version",
            ErrorCode::E303 => "missing version",
            ErrorCode::E304 => "no matching version",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::E001.to_string(), "E001");
        assert_eq!(ErrorCode::E102.to_string(), "E102");
        assert_eq!(ErrorCode::E202.to_string(), "E202");
        assert_eq!(ErrorCode::E304.to_string(), "E304");
    }

    #[test]
    fn test_error_code_description() {
        assert_eq!(ErrorCode::E001.description(), "unterminated string literal");
        assert_eq!(ErrorCode::E200.description(), "unresolved reference");
        assert_eq!(ErrorCode::E301.description(), "cyclic containment");
    }

    #[test]
    fn test_codes_order_by_phase() {
        assert!(ErrorCode::E006 < ErrorCode::E100);
        assert!(ErrorCode::E205 < ErrorCode::E300);
    }
}
