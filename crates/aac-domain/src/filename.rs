//! Filesystem-safe filename sanitation.

const FORBIDDEN: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Replaces forbidden characters and whitespace with `_`, strips leading and
/// trailing `.`/`_`, and truncates to 180 chars. Idempotent: sanitizing an
/// already-sanitized name returns the same string.
pub fn sanitize_filename(name: &str) -> String {
    let name = if name.is_empty() { "file" } else { name };

    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if FORBIDDEN.contains(&c) || c.is_whitespace() {
            out.push('_');
        } else {
            out.push(c);
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    let truncated: String = trimmed.chars().take(180).collect();

    if truncated.is_empty() { "file".to_string() } else { truncated }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_forbidden_chars_and_whitespace() {
        assert_eq!(sanitize_filename("a/b:c*d?e\"f<g>h|i j"), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn strips_leading_trailing_dots_and_underscores() {
        assert_eq!(sanitize_filename("..__apple__.."), "apple");
    }

    #[test]
    fn truncates_to_180_chars() {
        let long = "a".repeat(300);
        assert_eq!(sanitize_filename(&long).len(), 180);
    }

    #[test]
    fn empty_falls_back_to_file() {
        assert_eq!(sanitize_filename(""), "file");
        assert_eq!(sanitize_filename("..."), "file");
    }

    #[test]
    fn is_idempotent() {
        let raw = "Weird / Name:: With *stuff*?.jpg  ";
        let once = sanitize_filename(raw);
        let twice = sanitize_filename(&once);
        assert_eq!(once, twice);
    }
}
