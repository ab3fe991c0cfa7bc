//! Outbox enqueue: turns a committed transition into the event the external
//! dispatcher delivers to the remote authority.

use contractgate_core::Subject;
use contractgate_storage::{Attributes, OutboxEvent, SubjectRecord};
use serde_json::{json, Value};

use crate::context::RequestContext;
use crate::executor::TransitionMeta;
use crate::id::new_id;

/// Event type of every transition event.
pub const TRANSITION_EVENT: &str = "contract.transition";

/// Pending outbox event for `before -> after`.
///
/// The command key doubles as the outbox idempotency key, so a transition
/// can never be enqueued twice.
pub fn transition_event(
    before: &SubjectRecord,
    after: &SubjectRecord,
    meta: &TransitionMeta,
    attributes: &Attributes,
    command_key: &str,
    world: &str,
    ctx: &RequestContext,
) -> OutboxEvent {
    let mut payload = json!({
        "subject_ref": after.subject_ref(),
        "to": after.status,
        "meta": meta,
        "attrs": Value::Object(attributes.clone()),
        "before": snapshot_of(before),
        "after": snapshot_of(after),
        "idempotency_key": command_key,
        "ctx": {
            "from": before.status,
            "world": world,
        },
    });
    if let (Some(request_id), Some(map)) = (ctx.request_id(), payload.as_object_mut()) {
        map.insert("request_id".to_string(), json!(request_id));
    }

    OutboxEvent::pending(
        &new_id("evt"),
        meta.tenant_or(&before.tenant_id),
        TRANSITION_EVENT,
        command_key,
        payload,
    )
}

fn snapshot_of(subject: &SubjectRecord) -> Value {
    json!({
        "status": subject.status,
        "entity_version": subject.entity_version,
        "attributes": subject.attributes,
    })
}
