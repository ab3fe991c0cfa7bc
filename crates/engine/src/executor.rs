//! Transition Executor.
//!
//! Drives one status change through a `ContractStorage` backend using
//! snapshot (transaction) semantics. The subject row is locked for the whole
//! snapshot, so concurrent transitions on the same subject serialize and
//! each one decides against fresh state. Either the status change, its
//! proof record, its guard ledger entry and (in hybrid mode) its outbox
//! event are committed together, or nothing is.

use std::sync::Arc;

use contractgate_core::rules::{canonical_status, same_status};
use contractgate_core::{AuthorityMode, RuleTable, Subject, WorldRegistry};
use contractgate_storage::{Attributes, ContractStorage, SubjectKey, SubjectRecord};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, EngineConfig};
use crate::context::RequestContext;
use crate::drift::{DriftReporter, TracingDriftReporter};
use crate::error::TransitionError;
use crate::gate::ModeGate;
use crate::remote::{HttpRemoteAuthority, RemoteAuthority};
use crate::{ledger, outbox, proof};

/// Who is asking for a transition, and how it should be recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionMeta {
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Origin of the request (`"system"`, `"api"`, `"panel"`, ...).
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Idempotency token. Synthesized when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_key: Option<String>,
    /// Overrides world resolution for this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world: Option<String>,
}

fn default_source() -> String {
    "system".to_string()
}

impl TransitionMeta {
    pub fn new(tenant_id: &str) -> Self {
        TransitionMeta {
            tenant_id: tenant_id.to_string(),
            user_id: None,
            source: default_source(),
            note: None,
            command_key: None,
            world: None,
        }
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn with_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }

    pub fn with_command_key(mut self, command_key: &str) -> Self {
        self.command_key = Some(command_key.to_string());
        self
    }

    pub fn with_world(mut self, world: &str) -> Self {
        self.world = Some(world.to_string());
        self
    }

    /// The request's tenant, or `fallback` when none was given.
    pub fn tenant_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.tenant_id.trim().is_empty() {
            fallback
        } else {
            &self.tenant_id
        }
    }
}

/// How a snapshot ended when no error occurred.
enum Outcome {
    /// Writes are staged; commit them.
    Apply { from: String, to: String, version: i64 },
    /// Nothing to write; return this row.
    NoOp(SubjectRecord),
}

/// Applies status transitions under the configured authority mode.
pub struct TransitionExecutor<S: ContractStorage> {
    storage: S,
    gate: ModeGate,
    worlds: WorldRegistry,
}

impl<S: ContractStorage> TransitionExecutor<S> {
    pub fn builder(storage: S) -> TransitionExecutorBuilder<S> {
        TransitionExecutorBuilder::new(storage)
    }

    /// Executor wired from configuration: rule table (file or built-in),
    /// HTTP remote authority when a base URL is set, and world registry.
    pub fn from_config(storage: S, config: &EngineConfig) -> Result<Self, ConfigError> {
        let mut builder = TransitionExecutor::builder(storage)
            .mode(config.mode)
            .rules(config.rule_table()?)
            .worlds(config.worlds.clone());
        if config.remote.is_configured() {
            builder = builder.remote(HttpRemoteAuthority::new(config.remote.clone()));
        }
        Ok(builder.build())
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn mode(&self) -> AuthorityMode {
        self.gate.mode()
    }

    pub fn rules(&self) -> &RuleTable {
        self.gate.rules()
    }

    /// Read-only probe against the local rule table. Never calls the remote.
    pub fn can_transition<T: Subject + ?Sized>(&self, subject: &T, to_status: &str) -> bool {
        self.gate
            .rules()
            .can_transition(subject.subject_type(), subject.status(), to_status)
    }

    /// World sent as `ctx.world`: the request's override, then the
    /// registry's mapping for the subject type, then the registry default.
    pub fn resolve_world(&self, subject_type: &str, meta: &TransitionMeta) -> String {
        meta.world
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .unwrap_or_else(|| self.worlds.world_for(subject_type))
            .to_string()
    }

    /// Move `subject` to `to_status`.
    ///
    /// `subject` only identifies the row; the decision is always made
    /// against the row as locked inside the snapshot. `attributes` are
    /// merged over the stored attributes and written with the status.
    ///
    /// `to_status` is written in its canonical spelling (see
    /// [`canonical_status`]), so `" PAID "` stores `"paid"`.
    ///
    /// Returns the subject as committed. A transition to the current status
    /// succeeds without writing anything.
    pub async fn transition<T: Subject + Sync + ?Sized>(
        &self,
        subject: &T,
        to_status: &str,
        meta: &TransitionMeta,
        attributes: Attributes,
        ctx: &RequestContext,
    ) -> Result<SubjectRecord, TransitionError> {
        if ctx.is_cancelled() {
            return Err(TransitionError::Cancelled);
        }
        let key = SubjectKey::of(subject);
        let to_status = canonical_status(to_status);
        let mut snapshot = self.storage.begin_snapshot().await?;

        let outcome = self
            .stage(&mut snapshot, &key, &to_status, meta, attributes, ctx)
            .await;

        match outcome {
            Ok(Outcome::Apply { from, to, version }) => {
                self.storage.commit_snapshot(snapshot).await?;
                tracing::info!(
                    subject = %key,
                    from = %from,
                    to = %to,
                    version,
                    mode = %self.gate.mode(),
                    "transition committed"
                );
                Ok(self.storage.get_subject(&key).await?)
            }
            Ok(Outcome::NoOp(current)) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                Ok(current)
            }
            Err(err) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                tracing::debug!(subject = %key, to = %to_status, error = %err, "transition rejected");
                Err(err)
            }
        }
    }

    /// Everything between `begin_snapshot` and `commit_snapshot`.
    async fn stage(
        &self,
        snapshot: &mut S::Snapshot,
        key: &SubjectKey,
        to_status: &str,
        meta: &TransitionMeta,
        attributes: Attributes,
        ctx: &RequestContext,
    ) -> Result<Outcome, TransitionError> {
        if ctx.is_cancelled() {
            return Err(TransitionError::Cancelled);
        }

        // 1. Lock the row. A cancel that landed while we waited still wins;
        // from here on the request runs to completion.
        let locked = self.storage.get_subject_for_update(snapshot, key).await?;
        if ctx.is_cancelled() {
            return Err(TransitionError::Cancelled);
        }
        let intent = ledger::intent_hash(&locked.subject_type, &locked.id, to_status, &attributes);

        // 2. Replayed command key?
        if let Some(command_key) = meta.command_key.as_deref() {
            if let Some(existing) = self.storage.find_guard_entry(snapshot, command_key).await? {
                if ledger::is_replay_of(&existing, &locked, &intent) {
                    tracing::debug!(subject = %key, command_key, "replayed command key");
                    return Ok(Outcome::NoOp(locked));
                }
                return Err(TransitionError::CommandKeyReused {
                    command_key: command_key.to_string(),
                });
            }
        }

        // 3. Already there.
        if same_status(&locked.status, to_status) {
            tracing::debug!(subject = %key, status = %locked.status, "status unchanged");
            return Ok(Outcome::NoOp(locked));
        }

        // 4. Ask the gate about the locked state.
        let world = self.resolve_world(&locked.subject_type, meta);
        self.gate
            .assert_can_transition(&locked, to_status, &world, ctx)
            .await?;

        // 5. Status, version and attributes in one write.
        let mut merged = locked.attributes.clone();
        merged.extend(attributes.clone());
        let version = self
            .storage
            .update_subject(
                snapshot,
                key,
                locked.entity_version,
                to_status,
                merged.clone(),
            )
            .await?;

        // 6. Proof, then ledger.
        let proof = proof::build_proof(&locked, to_status, meta);
        let tenant_id = meta.tenant_or(&locked.tenant_id).to_string();
        let command_key = meta
            .command_key
            .clone()
            .unwrap_or_else(|| ledger::synthesize_command_key(&tenant_id, &proof.id));
        let entry = ledger::build_entry(
            &tenant_id,
            meta.user_id.as_deref(),
            &world,
            &locked,
            to_status,
            version,
            &command_key,
            &intent,
        );
        self.storage.insert_proof_record(snapshot, proof).await?;
        self.storage.insert_guard_entry(snapshot, entry).await?;

        // 7. Shadow mode ships the transition to the remote authority.
        if self.gate.mode() == AuthorityMode::Hybrid {
            let after = SubjectRecord {
                status: to_status.to_string(),
                entity_version: version,
                attributes: merged,
                ..locked.clone()
            };
            let event = outbox::transition_event(
                &locked,
                &after,
                meta,
                &attributes,
                &command_key,
                &world,
                ctx,
            );
            if let Err(err) = self.storage.enqueue_outbox_event(snapshot, event).await {
                tracing::warn!(subject = %key, command_key, error = %err, "outbox enqueue failed");
            }
        }

        Ok(Outcome::Apply {
            from: locked.status,
            to: to_status.to_string(),
            version,
        })
    }
}

/// Builder for [`TransitionExecutor`]. Defaults: embedded mode, built-in
/// rule table, no remote authority, tracing drift reporter, empty world
/// registry.
pub struct TransitionExecutorBuilder<S: ContractStorage> {
    storage: S,
    mode: AuthorityMode,
    rules: RuleTable,
    remote: Option<Arc<dyn RemoteAuthority>>,
    drift: Arc<dyn DriftReporter>,
    worlds: WorldRegistry,
}

impl<S: ContractStorage> TransitionExecutorBuilder<S> {
    fn new(storage: S) -> Self {
        TransitionExecutorBuilder {
            storage,
            mode: AuthorityMode::default(),
            rules: RuleTable::builtin(),
            remote: None,
            drift: Arc::new(TracingDriftReporter),
            worlds: WorldRegistry::default(),
        }
    }

    pub fn mode(mut self, mode: AuthorityMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn rules(mut self, rules: RuleTable) -> Self {
        self.rules = rules;
        self
    }

    pub fn remote<R: RemoteAuthority + 'static>(self, remote: R) -> Self {
        self.shared_remote(Arc::new(remote))
    }

    pub fn shared_remote(mut self, remote: Arc<dyn RemoteAuthority>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn drift_reporter(mut self, reporter: Arc<dyn DriftReporter>) -> Self {
        self.drift = reporter;
        self
    }

    pub fn worlds(mut self, worlds: WorldRegistry) -> Self {
        self.worlds = worlds;
        self
    }

    pub fn build(self) -> TransitionExecutor<S> {
        TransitionExecutor {
            storage: self.storage,
            gate: ModeGate::new(self.mode, Arc::new(self.rules), self.remote, self.drift),
            worlds: self.worlds,
        }
    }
}
