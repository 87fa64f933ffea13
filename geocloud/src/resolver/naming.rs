//! Filename normalization and sub-identifier matching.

/// Lower-cases `name` and replaces spaces with underscores.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Returns the first declared sub-identifier found in `file_stem`.
///
/// Both sides are normalized before the substring test, so matching is
/// case-insensitive. When several sub-identifiers occur in the name, the one
/// declared first wins.
pub fn match_sub_id<'a>(file_stem: &str, sub_ids: &'a [String]) -> Option<&'a str> {
    let normalized = normalize_name(file_stem);
    sub_ids
        .iter()
        .find(|sub_id| normalized.contains(&normalize_name(sub_id)))
        .map(String::as_str)
}
