//! Download filenames derived from free-form carousel titles.

const MAX_STEM_LEN: usize = 30;

/// Lowercase `title`, replace everything outside `[a-z0-9]` with `_` and
/// keep at most 30 characters.
///
/// Replacement counts UTF-16 code units, the way browser download names are
/// built: a character outside the Basic Multilingual Plane (most emoji)
/// becomes two underscores.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .flat_map(|c| {
            let (ch, count) = if c.is_ascii_alphanumeric() {
                (c.to_ascii_lowercase(), 1)
            } else {
                ('_', c.len_utf16())
            };
            std::iter::repeat_n(ch, count)
        })
        .take(MAX_STEM_LEN)
        .collect()
}

/// `<sanitized-title>-<suffix>.png`
pub fn artifact_name(title: &str, suffix: &str) -> String {
    format!("{}-{}.png", sanitize_title(title), suffix)
}
