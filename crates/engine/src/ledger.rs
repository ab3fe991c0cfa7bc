//! Guard Ledger: append-only record of transition intents, used for
//! idempotency and replay detection.

use contractgate_storage::{now_timestamp, Attributes, GuardLedgerEntry, SubjectRecord};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::id::random_hex;

/// SHA-256 over the intent of a transition: which subject, which target
/// status, which attributes. Two requests with the same command key are the
/// same request only if their intent hashes match.
pub fn intent_hash(
    subject_type: &str,
    subject_id: &str,
    to_status: &str,
    attributes: &Attributes,
) -> String {
    // serde_json::Map is ordered, so the encoding is canonical.
    let canonical = json!({
        "subject_type": subject_type.trim().to_ascii_lowercase(),
        "subject_id": subject_id,
        "to": to_status.trim().to_ascii_lowercase(),
        "attributes": attributes,
    })
    .to_string();
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

/// Command key for a transition whose caller did not supply one:
/// `auto:<tenant>:<pid>:<proof id>:<random hex>`.
pub fn synthesize_command_key(tenant_id: &str, proof_id: &str) -> String {
    format!(
        "auto:{tenant_id}:{}:{proof_id}:{}",
        std::process::id(),
        random_hex(8)
    )
}

/// Whether an existing entry is a retry of the request described by
/// `subject` and `intent_hash`.
pub fn is_replay_of(entry: &GuardLedgerEntry, subject: &SubjectRecord, intent_hash: &str) -> bool {
    entry.subject_type == subject.subject_type
        && entry.subject_id == subject.id
        && entry.intent_hash == intent_hash
}

/// Ledger entry for the transition `before -> to_status` at `to_version`.
#[allow(clippy::too_many_arguments)]
pub fn build_entry(
    tenant_id: &str,
    user_id: Option<&str>,
    world: &str,
    before: &SubjectRecord,
    to_status: &str,
    to_version: i64,
    command_key: &str,
    intent_hash: &str,
) -> GuardLedgerEntry {
    GuardLedgerEntry {
        tenant_id: tenant_id.to_string(),
        user_id: user_id.map(str::to_string),
        world: Some(world.to_string()),
        subject_type: before.subject_type.clone(),
        subject_id: before.id.clone(),
        command_key: command_key.to_string(),
        from_status: Some(before.status.clone()),
        to_status: to_status.to_string(),
        from_version: before.entity_version,
        to_version,
        intent_hash: intent_hash.to_string(),
        created_at: now_timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, serde_json::Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn intent_hash_ignores_attribute_insertion_order() {
        let a = attrs(&[("a", json!(1)), ("b", json!(2))]);
        let b = attrs(&[("b", json!(2)), ("a", json!(1))]);
        assert_eq!(
            intent_hash("order", "o-1", "paid", &a),
            intent_hash("order", "o-1", "paid", &b)
        );
    }

    #[test]
    fn intent_hash_separates_targets_and_attributes() {
        let empty = Attributes::new();
        let paid = intent_hash("order", "o-1", "paid", &empty);
        assert_eq!(paid.len(), 64);
        assert_eq!(paid, intent_hash("ORDER", "o-1", "Paid", &empty));
        assert_ne!(paid, intent_hash("order", "o-1", "cancelled", &empty));
        assert_ne!(
            paid,
            intent_hash("order", "o-1", "paid", &attrs(&[("x", json!(true))]))
        );
    }

    #[test]
    fn synthesized_keys_are_unique_and_scoped() {
        let a = synthesize_command_key("t-1", "proof-1");
        let b = synthesize_command_key("t-1", "proof-1");
        assert!(a.starts_with("auto:t-1:"));
        assert!(a.contains(":proof-1:"));
        assert_ne!(a, b);
    }

    #[test]
    fn entry_records_versions_and_statuses() {
        let mut before = SubjectRecord::new("order", "o-1", "t-1", "pending");
        before.entity_version = 4;
        let entry = build_entry("t-1", Some("u-1"), "commerce", &before, "paid", 5, "cmd", "h");
        assert_eq!(entry.from_version, 4);
        assert_eq!(entry.to_version, 5);
        assert_eq!(entry.from_status.as_deref(), Some("pending"));
        assert_eq!(entry.world.as_deref(), Some("commerce"));
        assert!(is_replay_of(&entry, &before, "h"));
        assert!(!is_replay_of(&entry, &before, "other"));
    }
}
