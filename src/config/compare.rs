//! Case-insensitive, locale-invariant-ish name ordering for child/item lists
//! (spec §3: "kept in case-insensitive invariant-culture order").
//!
//! There is no portable equivalent of .NET's `InvariantCulture` string
//! comparer in the standard library; this crate resolves that open question
//! by comparing the Unicode case-fold of each name (documented in
//! DESIGN.md).

use std::cmp::Ordering;

/// Orders two names the way the configuration tree keeps its children and
/// items sorted: case-insensitively, comparing the folded form first and
/// falling back to the raw bytes to keep the order total (so e.g. `"a"` and
/// `"A"` don't compare equal and get silently deduplicated by a `BTreeMap`).
pub fn name_cmp(a: &str, b: &str) -> Ordering {
    let fold_a = a.to_lowercase();
    let fold_b = b.to_lowercase();
    fold_a.cmp(&fold_b).then_with(|| a.cmp(b))
}

/// Case-insensitive equality matching [`name_cmp`]'s folding rule.
pub fn name_eq(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folded_form_ties_break_on_raw_bytes() {
        // Same fold, different raw bytes: order must still be total and stable.
        assert_eq!(name_cmp("abc", "abc"), Ordering::Equal);
        assert_ne!(name_cmp("ABC", "abc"), Ordering::Equal);
    }

    #[test]
    fn orders_case_insensitively() {
        assert_eq!(name_cmp("alpha", "Beta"), Ordering::Less);
        assert_eq!(name_cmp("Zeta", "alpha"), Ordering::Greater);
        assert!(name_eq("Foo", "foo"));
        assert!(!name_eq("Foo", "bar"));
    }
}
