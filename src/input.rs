//! Raw input cleanup for paths and URLs pasted into a terminal

/// Strips terminal noise from a user-supplied path or URL
///
/// Trailing whitespace, newlines and `+` characters go first, then leading
/// whitespace, then one layer of matching `"` or `'` quotes. Whitespace left
/// just inside the quotes is trimmed too, so a second pass is a no-op.
pub fn normalize_input(raw: &str) -> String {
    let trimmed = trim_noise(raw);
    let unquoted = strip_quotes(trimmed).map(trim_noise).unwrap_or(trimmed);
    unquoted.to_string()
}

fn trim_noise(s: &str) -> &str {
    s.trim_end_matches(|c: char| c.is_whitespace() || c == '+')
        .trim_start()
}

fn strip_quotes(s: &str) -> Option<&str> {
    ['"', '\''].into_iter().find_map(|quote| {
        s.strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
    })
}
