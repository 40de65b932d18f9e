//! Alias synthesis for unaliased FROM sources and CTE references.
//!
//! Every source in a query scope is addressed by an alias. When the query text
//! does not provide one, [`create_alias_if_empty`] derives a short token from a
//! seed (usually the source name). Derivation is a pure function of its inputs
//! so the same query always compiles to the same aliases.

use std::collections::HashSet;

/// Number of hash characters appended after the seed's leading letter.
const HASH_LEN: usize = 5;

const ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Returns `existing` unchanged when it is non-empty. Otherwise derives an
/// alias from `seed` that does not collide (case-insensitively) with any entry
/// of `used`.
///
/// On collision the seed is perturbed by appending an attempt counter and the
/// derivation is retried, so regenerating with the previous result added to
/// `used` yields a different alias.
pub fn create_alias_if_empty(existing: &str, used: &HashSet<String>, seed: &str) -> String {
    if !existing.is_empty() {
        return existing.to_string();
    }

    let mut attempt: u32 = 0;
    loop {
        let candidate = if attempt == 0 {
            derive_alias(seed)
        } else {
            derive_alias(&format!("{seed}#{attempt}"))
        };
        if !used.iter().any(|u| u.eq_ignore_ascii_case(&candidate)) {
            return candidate;
        }
        attempt += 1;
    }
}

/// Encodes `seed` as its first letter followed by a base-36 FNV-1a digest.
fn derive_alias(seed: &str) -> String {
    let lead = seed
        .chars()
        .find(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .unwrap_or('s');

    let mut hash = fnv1a(seed.as_bytes());
    let mut alias = String::with_capacity(1 + HASH_LEN);
    alias.push(lead);
    for _ in 0..HASH_LEN {
        alias.push(ALPHABET[(hash % 36) as usize] as char);
        hash /= 36;
    }
    alias
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_alias_is_kept() {
        let used: HashSet<String> = ["p".to_string()].into();
        assert_eq!(create_alias_if_empty("p", &used, "people"), "p");
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let used = HashSet::new();
        let a = create_alias_if_empty("", &used, "people");
        let b = create_alias_if_empty("", &used, "people");
        assert_eq!(a, b);
        assert_eq!(a.len(), 1 + HASH_LEN);
        assert!(a.starts_with('p'));
    }

    #[test]
    fn test_collision_perturbs_seed() {
        let mut used = HashSet::new();
        let first = create_alias_if_empty("", &used, "people");
        used.insert(first.clone());
        let second = create_alias_if_empty("", &used, "people");
        assert_ne!(first, second);
        used.insert(second.clone());
        let third = create_alias_if_empty("", &used, "people");
        assert!(third != first && third != second);
    }

    #[test]
    fn test_collision_is_case_insensitive() {
        let used = HashSet::new();
        let first = create_alias_if_empty("", &used, "orders");
        let used: HashSet<String> = [first.to_ascii_uppercase()].into();
        assert_ne!(create_alias_if_empty("", &used, "orders"), first);
    }

    #[test]
    fn test_seed_without_letters() {
        let alias = create_alias_if_empty("", &HashSet::new(), "#1");
        assert!(alias.starts_with('s'));
    }
}
