//! Scanning helpers shared by the text grammars.

/// How a token affects grouping depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nesting {
    /// Opens a group, e.g. `(`.
    Open,
    /// Closes a group, e.g. `)`.
    Close,
    /// Neither.
    Flat,
}

/// Split `items` on separators found at grouping depth zero.
///
/// `is_separator` receives the item's index so callers can protect
/// separators that belong to a larger construct. Separators are dropped;
/// empty segments are kept so callers can report them.
pub fn split_top_level<T>(
    items: &[T],
    nesting: impl Fn(&T) -> Nesting,
    is_separator: impl Fn(usize, &T) -> bool,
) -> Vec<&[T]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, item) in items.iter().enumerate() {
        match nesting(item) {
            Nesting::Open => depth += 1,
            Nesting::Close => depth = depth.saturating_sub(1),
            Nesting::Flat if depth == 0 && is_separator(i, item) => {
                parts.push(&items[start..i]);
                start = i + 1;
            }
            Nesting::Flat => {}
        }
    }
    parts.push(&items[start..]);
    parts
}

/// Index of the item closing the group opened at `open`.
pub fn matching_close<T>(items: &[T], open: usize, nesting: impl Fn(&T) -> Nesting) -> Option<usize> {
    let mut depth = 0usize;
    for (i, item) in items.iter().enumerate().skip(open) {
        match nesting(item) {
            Nesting::Open => depth += 1,
            Nesting::Close => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            Nesting::Flat => {}
        }
    }
    None
}

/// Remove groups that wrap the whole sequence, e.g. `((a and b))`.
pub fn strip_outer_group<T>(mut items: &[T], nesting: impl Fn(&T) -> Nesting) -> &[T] {
    while items.len() >= 2
        && nesting(&items[0]) == Nesting::Open
        && matching_close(items, 0, &nesting) == Some(items.len() - 1)
    {
        items = &items[1..items.len() - 1];
    }
    items
}

/// Convert a byte index into a character offset.
pub fn char_offset(input: &str, byte: usize) -> usize {
    input
        .char_indices()
        .take_while(|(i, _)| *i < byte)
        .count()
}

/// Render a float so it always reads back as a float (`1.0`, not `1`).
pub fn format_float(value: f64) -> String {
    let text = value.to_string();
    if text.contains(['.', 'e', 'E']) || !value.is_finite() {
        text
    } else {
        format!("{text}.0")
    }
}

/// Read a quoted string starting at the first character of `input`.
///
/// The opening character is the quote. `\n`, `\t`, `\\` and an escaped
/// quote are unescaped; any other backslash sequence is kept verbatim so
/// regex patterns survive. Returns the value and the number of bytes
/// consumed, or `None` when the string is unterminated.
pub fn read_quoted(input: &str) -> Option<(String, usize)> {
    let mut chars = input.char_indices();
    let (_, quote) = chars.next()?;
    let mut value = String::new();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                (_, 'n') => value.push('\n'),
                (_, 't') => value.push('\t'),
                (_, '\\') => value.push('\\'),
                (_, escaped) if escaped == quote => value.push(quote),
                (_, other) => {
                    value.push('\\');
                    value.push(other);
                }
            },
            c if c == quote => return Some((value, i + c.len_utf8())),
            c => value.push(c),
        }
    }
    None
}

/// Quote `value` so that [`read_quoted`] reads it back unchanged.
///
/// A backslash is only doubled where it would otherwise start an escape,
/// so `\d+` stays `\d+`.
pub fn quote(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let next = chars.peek().copied();
                let escapes = next.is_none_or(|n| matches!(n, 'n' | 't' | '\\') || n == quote);
                out.push_str(if escapes { "\\\\" } else { "\\" });
            }
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paren(c: &char) -> Nesting {
        match c {
            '(' => Nesting::Open,
            ')' => Nesting::Close,
            _ => Nesting::Flat,
        }
    }

    #[test]
    fn splits_only_at_depth_zero() {
        let items: Vec<char> = "a|(b|c)|d".chars().collect();
        let parts = split_top_level(&items, paren, |_, c| *c == '|');
        let parts: Vec<String> = parts.iter().map(|p| p.iter().collect()).collect();
        assert_eq!(parts, vec!["a", "(b|c)", "d"]);
    }

    #[test]
    fn split_respects_protected_indices() {
        let items: Vec<char> = "a|b|c".chars().collect();
        let parts = split_top_level(&items, paren, |i, c| *c == '|' && i != 1);
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn strips_only_wrapping_groups() {
        let items: Vec<char> = "((ab))".chars().collect();
        assert_eq!(strip_outer_group(&items, paren), &['a', 'b']);

        let items: Vec<char> = "(a)(b)".chars().collect();
        assert_eq!(strip_outer_group(&items, paren).len(), 6);
    }

    #[test]
    fn quoted_strings_read_back() {
        for value in ["plain", r"\d+", "say \"hi\"", "a\\", "tab\there", r"\\d", "line\n"] {
            let quoted = quote(value, '"');
            let (back, used) = read_quoted(&quoted).unwrap();
            assert_eq!(back, value, "quoted as {quoted}");
            assert_eq!(used, quoted.len());
        }
        assert_eq!(quote(r"^\d+$", '"'), r#""^\d+$""#);
        assert_eq!(read_quoted("'it\\'s' rest"), Some(("it's".to_owned(), 7)));
        assert_eq!(read_quoted("\"open"), None);
    }

    #[test]
    fn char_offsets() {
        assert_eq!(char_offset("héllo", 3), 2);
        assert_eq!(char_offset("abc", 10), 3);
    }

    #[test]
    fn floats_keep_decimal_point() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(-3.0), "-3.0");
    }
}
