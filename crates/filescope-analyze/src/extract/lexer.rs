//! Comment stripping and line bookkeeping shared by the language matchers.

/// How comments and string literals look in a language family.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CommentStyle {
    /// Line comment introducer, if any.
    pub line: Option<&'static str>,
    /// Whether `/* ... */` block comments exist.
    pub block: bool,
    /// Characters that open and close string literals.
    pub quotes: &'static [char],
}

pub(crate) const C_LIKE: CommentStyle = CommentStyle {
    line: Some("//"),
    block: true,
    quotes: &['"', '\'', '`'],
};

// Single quotes are lifetimes as often as they are char literals.
pub(crate) const RUST: CommentStyle = CommentStyle {
    line: Some("//"),
    block: true,
    quotes: &['"'],
};

pub(crate) const HASH: CommentStyle = CommentStyle {
    line: Some("#"),
    block: false,
    quotes: &['"', '\''],
};

pub(crate) const BLOCK_ONLY: CommentStyle = CommentStyle {
    line: None,
    block: true,
    quotes: &['"', '\''],
};

/// Blank out comments while keeping string literals and every newline, so
/// byte offsets of later matches still map onto the original line numbers.
pub(crate) fn strip_comments(content: &str, style: CommentStyle) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.char_indices().peekable();
    let mut in_string: Option<char> = None;

    while let Some((idx, ch)) = chars.next() {
        if let Some(quote) = in_string {
            out.push(ch);
            if ch == '\\' {
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
            } else if ch == quote || (ch == '\n' && quote != '`') {
                in_string = None;
            }
            continue;
        }

        let rest = &content[idx..];
        if let Some(marker) = style.line {
            if rest.starts_with(marker) {
                while let Some(&(_, next)) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
                continue;
            }
        }
        if style.block && rest.starts_with("/*") {
            chars.next();
            let mut prev = ' ';
            for (_, next) in chars.by_ref() {
                if next == '\n' {
                    out.push('\n');
                }
                if prev == '*' && next == '/' {
                    break;
                }
                prev = next;
            }
            continue;
        }
        if style.quotes.contains(&ch) {
            in_string = Some(ch);
        }
        out.push(ch);
    }
    out
}

/// 1-based line number of a byte offset.
pub(crate) fn line_number_for(content: &str, byte_idx: usize) -> usize {
    content[..byte_idx].bytes().filter(|&b| b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_line_and_block_comments() {
        let src = "a // import 'x'\n/* import 'y'\n */ b";
        let out = strip_comments(src, C_LIKE);
        assert!(!out.contains("import"));
        assert_eq!(out.lines().count(), 3);
        assert!(out.ends_with(" b"));
    }

    #[test]
    fn test_keeps_comment_markers_inside_strings() {
        let src = r#"@import url("http://cdn/x.css");"#;
        assert_eq!(strip_comments(src, C_LIKE), src);
    }

    #[test]
    fn test_hash_comments() {
        let src = "import os  # import sys\nx = '#'";
        let out = strip_comments(src, HASH);
        assert!(!out.contains("sys"));
        assert!(out.contains("x = '#'"));
    }

    #[test]
    fn test_rust_lifetimes_do_not_open_strings() {
        let src = "fn f<'a>(x: &'a str) {} // mod hidden;\nmod shown;";
        let out = strip_comments(src, RUST);
        assert!(!out.contains("hidden"));
        assert!(out.contains("mod shown;"));
    }

    #[test]
    fn test_line_numbers() {
        let src = "a\nb\nc";
        assert_eq!(line_number_for(src, 0), 1);
        assert_eq!(line_number_for(src, 2), 2);
        assert_eq!(line_number_for(src, 4), 3);
    }
}
