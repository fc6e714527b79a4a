//! Filesystem-safe timeline names.

use std::sync::OnceLock;

use regex::Regex;

/// Longest file stem produced by [`sanitize_filename`]
pub const MAX_FILENAME_CHARS: usize = 200;

/// Stem used when a name sanitizes to nothing
pub const FALLBACK_FILENAME: &str = "timeline";

fn forbidden_chars() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*]"#).ok()).as_ref()
}

/// Turns a timeline name into a file stem that is valid on every platform.
///
/// Forbidden characters become `_`, trailing dots and spaces are trimmed and
/// the result is capped at [`MAX_FILENAME_CHARS`] characters.
pub fn sanitize_filename(name: &str) -> String {
    let replaced = match forbidden_chars() {
        Some(re) => re.replace_all(name, "_").into_owned(),
        None => name
            .chars()
            .map(|c| if "<>:\"/\\|?*".contains(c) { '_' } else { c })
            .collect(),
    };

    let mut cleaned: String = replaced
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILENAME_CHARS)
        .collect();
    let trimmed_len = cleaned.trim_end_matches(['.', ' ']).len();
    cleaned.truncate(trimmed_len);

    if cleaned.trim().is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_characters_replaced() {
        assert_eq!(sanitize_filename(r#"a<b>c:d"e/f\g|h?i*j"#), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn test_trailing_dots_and_spaces_trimmed() {
        assert_eq!(sanitize_filename("Final Cut v2. . "), "Final Cut v2");
    }

    #[test]
    fn test_empty_falls_back() {
        assert_eq!(sanitize_filename(""), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename(" ..."), FALLBACK_FILENAME);
    }

    #[test]
    fn test_length_is_capped() {
        let long = "ä".repeat(300);
        assert_eq!(sanitize_filename(&long).chars().count(), MAX_FILENAME_CHARS);
    }

    #[test]
    fn test_plain_names_unchanged() {
        assert_eq!(sanitize_filename("Interview Day 1"), "Interview Day 1");
    }
}
