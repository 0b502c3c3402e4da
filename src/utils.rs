//! Utility functions for identifiers and item-list comparison

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Stable key for the relationship between two usernames, independent of
/// which side sent the request and of letter case.
pub fn relationship_key(a: &str, b: &str) -> String {
    let mut pair = [a.to_ascii_lowercase(), b.to_ascii_lowercase()];
    pair.sort();
    sha256::digest(format!("{}\u{0}{}", pair[0], pair[1]))
}

/// Every id in `ids` appears in `inventory`.
///
/// The length check short-circuits requests that name more items than the
/// owner holds.
pub fn owns_all(inventory: &[String], ids: &[String]) -> bool {
    if inventory.len() < ids.len() {
        return false;
    }
    ids.iter().all(|id| inventory.contains(id))
}

/// Compares two item lists ignoring order. Neither input is reordered.
pub fn same_items(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn relationship_key_is_symmetric_and_case_blind() {
        assert_eq!(relationship_key("alice", "Bob"), relationship_key("BOB", "Alice"));
        assert_ne!(relationship_key("alice", "bob"), relationship_key("alice", "carol"));
    }

    #[test]
    fn ownership_rejects_oversized_and_foreign_lists() {
        let inventory = ids(&["i1", "i2"]);
        assert!(owns_all(&inventory, &ids(&["i2"])));
        assert!(owns_all(&inventory, &[]));
        assert!(!owns_all(&inventory, &ids(&["i1", "i2", "i3"])));
        assert!(!owns_all(&inventory, &ids(&["j1"])));
    }

    #[test]
    fn same_items_ignores_order_only() {
        assert!(same_items(&ids(&["b", "a"]), &ids(&["a", "b"])));
        assert!(!same_items(&ids(&["a", "a"]), &ids(&["a", "b"])));
        assert!(!same_items(&ids(&["a"]), &ids(&["a", "b"])));
    }
}
