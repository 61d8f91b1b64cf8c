//! Source formatter.
//!
//! Formatting works on raw text and brace depth only, so it never depends on
//! the document parsing cleanly. Each line is trimmed and re-indented by the
//! number of braces open before it; a line starting with `}` is indented
//! one level less. Braces inside string literals and comments are ignored.
//! Lines continuing a multi-line block comment are copied as they are.
//! Runs of blank lines collapse to one, blank lines at the start and end are
//! dropped and the output ends with a single newline.
//!
//! Formatting is idempotent: formatting formatted text changes nothing.

use crate::config::FormatConfig;

/// Format `source` with the default indent width.
pub fn format_ec(source: &str) -> String {
    format_with(source, &FormatConfig::default())
}

/// Format `source` using `config`.
pub fn format_with(source: &str, config: &FormatConfig) -> String {
    let unit = " ".repeat(config.indent_width());
    let mut out = String::with_capacity(source.len());
    let mut depth = 0usize;
    let mut in_comment = false;
    let mut pending_blank = false;

    for raw in source.lines() {
        if in_comment {
            let line = raw.trim_end();
            out.push_str(line);
            out.push('\n');
            if let Some(end) = line.find("*/") {
                let rest = scan(&line[end + 2..]);
                depth = (depth + rest.opens).saturating_sub(rest.closes);
                in_comment = rest.open_comment;
            }
            continue;
        }

        let line = raw.trim();
        if line.is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if pending_blank {
            out.push('\n');
            pending_blank = false;
        }

        let counts = scan(line);
        let leading = line
            .chars()
            .take_while(|c| *c == '}' || c.is_whitespace())
            .filter(|c| *c == '}')
            .count();

        for _ in 0..depth.saturating_sub(leading) {
            out.push_str(&unit);
        }
        out.push_str(line);
        out.push('\n');

        depth = (depth + counts.opens).saturating_sub(counts.closes);
        in_comment = counts.open_comment;
    }

    let trimmed_len = out.trim_end_matches('\n').len();
    out.truncate(trimmed_len);
    out.push('\n');
    out
}

#[derive(Debug, Default, PartialEq, Eq)]
struct BraceCount {
    opens: usize,
    closes: usize,
    /// The line ends inside a block comment.
    open_comment: bool,
}

/// Count braces in one line outside strings and comments.
fn scan(line: &str) -> BraceCount {
    let mut count = BraceCount::default();
    let mut chars = line.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\\' => {
                    chars.next();
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => count.opens += 1,
            '}' => count.closes += 1,
            '/' if chars.peek() == Some(&'/') => break,
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                let mut closed = false;
                for c in chars.by_ref() {
                    if previous == '*' && c == '/' {
                        closed = true;
                        break;
                    }
                    previous = c;
                }
                if !closed {
                    count.open_comment = true;
                    break;
                }
            }
            _ => {}
        }
    }
    count
}
