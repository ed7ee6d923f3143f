//! Field name normalization

/// Convert an arbitrary column or key name to snake_case
///
/// Characters outside `[A-Za-z0-9]` become `_`, a lower-to-upper case
/// boundary gets a `_` inserted, repeated `_` collapse, and the result is
/// lowercased with leading and trailing `_` removed.
///
/// ```
/// use quarry_ingest::normalizer::snake_case;
///
/// assert_eq!(snake_case("Dataset Title"), "dataset_title");
/// assert_eq!(snake_case("seriesID"), "series_id");
/// ```
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;

    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() { c } else { '_' };

        if c.is_ascii_uppercase() && prev.is_some_and(|p| p.is_ascii_lowercase()) {
            out.push('_');
        }

        if c != '_' || !out.ends_with('_') {
            out.push(c.to_ascii_lowercase());
        }
        prev = Some(c);
    }

    out.trim_matches('_').to_string()
}
