//! Sequential, gap-filling identifiers.
//!
//! Identifiers have the form `<prefix><n>` where `n` is zero-padded to
//! [`ID_WIDTH`] digits, e.g. `categoryId0007`. The next identifier is always
//! the smallest positive `n` not currently in use, so suffixes freed by a
//! delete are handed out again.
//!
//! There is no stored counter: callers pass the identifiers that exist at
//! scan time. Two concurrent allocations can therefore pick the same value;
//! the storage unique index rejects the second insert and the caller
//! re-allocates.

/// Minimum number of digits in the numeric suffix.
pub const ID_WIDTH: usize = 4;

/// Formats a suffix with the given prefix (`categoryId`, 7 -> `categoryId0007`).
///
/// Suffixes wider than [`ID_WIDTH`] are written in full.
pub fn format_id(prefix: &str, suffix: u32) -> String {
    format!("{prefix}{suffix:0width$}", width = ID_WIDTH)
}

/// Extracts the numeric suffix of an identifier issued with `prefix`.
///
/// Returns `None` for values that do not carry the prefix or whose remainder
/// is not a decimal number.
pub fn parse_suffix(prefix: &str, id: &str) -> Option<u32> {
    let digits = id.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Returns the smallest positive integer missing from `suffixes`.
pub fn next_free_suffix(mut suffixes: Vec<u32>) -> u32 {
    suffixes.sort_unstable();
    suffixes.dedup();

    let mut candidate = 1u32;
    for existing in suffixes {
        if candidate < existing {
            break;
        }
        if existing == candidate {
            candidate = candidate.saturating_add(1);
        }
    }
    candidate
}

/// Computes the next identifier for `prefix` given the identifiers in use.
///
/// Values that do not parse as `<prefix><digits>` are ignored.
pub fn allocate_id<'a, I>(prefix: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let suffixes = existing
        .into_iter()
        .filter_map(|id| parse_suffix(prefix, id))
        .collect();
    format_id(prefix, next_free_suffix(suffixes))
}
