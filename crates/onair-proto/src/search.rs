//! Case-insensitive substring search over the library catalog.

/// Catalog entries whose lowercase form contains the lowercase query, in
/// catalog order.  An empty query matches nothing rather than everything.
pub fn matches<'a>(query: &str, catalog: &'a [String]) -> Vec<&'a str> {
    if query.is_empty() {
        return Vec::new();
    }
    let needle = query.to_lowercase();
    catalog
        .iter()
        .filter(|path| path.to_lowercase().contains(&needle))
        .map(String::as_str)
        .collect()
}

/// `matches` truncated to what fits under the search box.
pub fn bounded_matches<'a>(query: &str, catalog: &'a [String], limit: usize) -> Vec<&'a str> {
    let mut found = matches(query, catalog);
    found.truncate(limit);
    found
}
