//! Property-based tests for storage namespace isolation

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use armature::staging::StagingStore;
use armature::storage::Storage;

/// Arbitrary key/value pairs written into one namespace round-trip intact
/// and never disturb a sibling namespace in the same document.
#[test]
fn test_namespace_roundtrip_preserves_siblings_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &proptest::collection::btree_map("[a-z]{1,8}", "[ -~]{0,16}", 0..8),
            |entries: BTreeMap<String, String>| {
                let staging = Arc::new(StagingStore::new());
                let path = PathBuf::from("/project/.armature.json");

                let sibling = Storage::new("sibling", Arc::clone(&staging), path.clone());
                sibling.set("anchor", json!("untouched")).unwrap();

                let storage = Storage::new("subject", Arc::clone(&staging), path.clone());
                for (key, value) in &entries {
                    storage.set(key, json!(value)).unwrap();
                }

                // Every write round-trips.
                for (key, value) in &entries {
                    prop_assert_eq!(storage.get(key), Some(json!(value)));
                }

                // The sibling namespace is untouched.
                prop_assert_eq!(sibling.get("anchor"), Some(json!("untouched")));

                // Deleting every key empties the namespace but not the document.
                for key in entries.keys() {
                    storage.delete(key).unwrap();
                    prop_assert_eq!(storage.get(key), None);
                }
                prop_assert_eq!(sibling.get("anchor"), Some(json!("untouched")));

                Ok(())
            },
        )
        .unwrap();
}
