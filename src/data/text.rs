//! Text canonicalization for column names and categorical values

/// Strip diacritics, trim, and lower-case.
///
/// `"  Ubicación "` becomes `"ubicacion"`. Applying it twice is a no-op.
pub fn canonicalize(text: &str) -> String {
    deunicode::deunicode(text).trim().to_lowercase()
}
