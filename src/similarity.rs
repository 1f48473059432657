//! String likeness for tag names.

/// Score returned when one name contains the other.
pub const SUBSTRING_SIMILARITY: f64 = 0.85;

/// Scores how alike two tag names are, in `[0, 1]`.
///
/// Comparison is case-sensitive and works on Unicode code points:
///
/// - identical names score `1.0`
/// - a name contained in the other scores [`SUBSTRING_SIMILARITY`]
/// - otherwise `1 - levenshtein / max_len`
///
/// Two empty names score `0.0`.
///
/// # Examples
///
/// ```
/// use marks::similarity::similarity;
///
/// assert_eq!(similarity("rust", "rust"), 1.0);
/// assert_eq!(similarity("golang", "go"), 0.85);
/// assert!(similarity("ml", "machine-learning") < 0.5);
/// ```
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return if a.is_empty() { 0.0 } else { 1.0 };
    }

    let (longer, shorter) = if a.chars().count() >= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    // Comparing code points and bytes is equivalent for valid UTF-8.
    if longer.contains(shorter) {
        return SUBSTRING_SIMILARITY;
    }

    let max_len = longer.chars().count();
    let distance = strsim::levenshtein(a, b);
    1.0 - distance as f64 / max_len as f64
}
