//! Configuration types for the compiler.
//!
//! All types implement [`serde::Deserialize`] so hosts can load them from
//! TOML or any other serde format. Every section and field is optional and
//! falls back to its default.
//!
//! # Overview
//!
//! - [`CompilerConfig`] - Top-level configuration combining every section.
//! - [`FormatConfig`] - Formatter settings.
//! - [`ValidationConfig`] - Optional validation rules.
//! - [`ImportConfig`] - Import resolution limits.
//!
//! # Example
//!
//! ```
//! # use ecdsl::config::CompilerConfig;
//! let config = CompilerConfig::default();
//! assert_eq!(config.format().indent_width(), 2);
//! assert!(!config.validation().require_versions());
//! ```

use serde::Deserialize;

/// Top-level compiler configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompilerConfig {
    /// Formatter section.
    #[serde(default)]
    format: FormatConfig,

    /// Validation section.
    #[serde(default)]
    validation: ValidationConfig,

    /// Import resolution section.
    #[serde(default)]
    imports: ImportConfig,
}

impl CompilerConfig {
    /// Creates a new [`CompilerConfig`] from its sections.
    pub fn new(format: FormatConfig, validation: ValidationConfig, imports: ImportConfig) -> Self {
        Self {
            format,
            validation,
            imports,
        }
    }

    /// Returns the formatter configuration.
    pub fn format(&self) -> &FormatConfig {
        &self.format
    }

    /// Returns the validation configuration.
    pub fn validation(&self) -> &ValidationConfig {
        &self.validation
    }

    /// Returns the import configuration.
    pub fn imports(&self) -> &ImportConfig {
        &self.imports
    }
}

/// Formatter settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FormatConfig {
    /// Spaces per nesting level.
    #[serde(default = "default_indent_width")]
    indent_width: usize,
}

fn default_indent_width() -> usize {
    2
}

impl FormatConfig {
    pub fn new(indent_width: usize) -> Self {
        Self { indent_width }
    }

    pub fn indent_width(&self) -> usize {
        self.indent_width
    }
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            indent_width: default_indent_width(),
        }
    }
}

/// Opt-in validation rules.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidationConfig {
    /// Report definitions without a `version` statement. Users and teams are exempt.
    #[serde(default)]
    require_versions: bool,
}

impl ValidationConfig {
    pub fn new(require_versions: bool) -> Self {
        Self { require_versions }
    }

    pub fn require_versions(&self) -> bool {
        self.require_versions
    }
}

/// Import resolution limits.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    /// Maximum number of rounds of fetching documents for missing imports.
    #[serde(default = "default_max_depth")]
    max_depth: usize,
}

fn default_max_depth() -> usize {
    8
}

impl ImportConfig {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: CompilerConfig = toml::from_str("").expect("valid config");
        assert_eq!(config.format().indent_width(), 2);
        assert!(!config.validation().require_versions());
        assert_eq!(config.imports().max_depth(), 8);
    }

    #[test]
    fn test_partial_sections() {
        let config: CompilerConfig = toml::from_str(
            r#"
            [format]
            indent_width = 4

            [validation]
            require_versions = true
            "#,
        )
        .expect("valid config");
        assert_eq!(config.format().indent_width(), 4);
        assert!(config.validation().require_versions());
        assert_eq!(config.imports().max_depth(), 8);
    }

    #[test]
    fn test_empty_section_keeps_field_defaults() {
        let config: CompilerConfig = toml::from_str("[imports]\n").expect("valid config");
        assert_eq!(config.imports().max_depth(), 8);
    }
}
