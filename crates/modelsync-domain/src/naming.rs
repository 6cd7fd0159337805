/// Turn a catalog display name into a single filesystem path component.
///
/// Every character that is not an ASCII letter, digit or whitespace (or a
/// `.` when `keep_dots` is set) becomes a space; the result is trimmed and
/// spaces become underscores. Model names drop dots, version names keep
/// them so `v1.5` stays recognisable.
pub fn sanitize_component(raw: &str, keep_dots: bool) -> String {
    let replaced: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch.is_whitespace() || (keep_dots && ch == '.') {
                ch
            } else {
                ' '
            }
        })
        .collect();
    let sanitized = replaced.trim().replace(' ', "_");
    // A component of only dots would walk out of the parent directory.
    if sanitized.chars().all(|ch| ch == '.') {
        return String::new();
    }
    sanitized
}
