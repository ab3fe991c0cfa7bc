//! Proof Recorder: the immutable audit record of a committed status change.

use contractgate_storage::{now_timestamp, ProofRecord, SubjectRecord};

use crate::executor::TransitionMeta;
use crate::id::new_id;

/// Build the proof for moving `subject` (as locked) to `to_status`.
pub fn build_proof(subject: &SubjectRecord, to_status: &str, meta: &TransitionMeta) -> ProofRecord {
    ProofRecord {
        id: new_id("proof"),
        tenant_id: meta.tenant_or(&subject.tenant_id).to_string(),
        actor_id: meta.user_id.clone(),
        source: meta.source.clone(),
        subject_type: subject.subject_type.clone(),
        subject_id: subject.id.clone(),
        from_status: subject.status.clone(),
        to_status: to_status.to_string(),
        note: meta.note.clone(),
        created_at: now_timestamp(),
    }
}
