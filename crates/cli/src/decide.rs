//! `contractgate decide`: one decision request against the remote authority.

use std::process;

use contractgate_core::SubjectRef;
use contractgate_engine::{
    CanTransitionRequest, DecisionContext, EngineConfig, HttpRemoteAuthority, RemoteAuthority,
    RemoteDecision, RequestContext, TransitionError,
};

use crate::{report_error, OutputFormat, EXIT_REJECTED};

pub(crate) struct DecideArgs {
    pub subject_type: String,
    pub id: String,
    pub tenant_id: String,
    pub from: String,
    pub to: String,
    pub world: Option<String>,
    pub request_id: Option<String>,
}

pub(crate) fn cmd_decide(
    config: &EngineConfig,
    args: DecideArgs,
    output: OutputFormat,
    quiet: bool,
) {
    let world = args
        .world
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .unwrap_or_else(|| config.worlds.world_for(&args.subject_type))
        .to_string();

    let request = CanTransitionRequest {
        subject_ref: SubjectRef {
            subject_type: args.subject_type.clone(),
            class: args.subject_type.clone(),
            id: args.id,
            tenant_id: args.tenant_id,
            status: args.from,
        },
        to: args.to,
        ctx: DecisionContext { world },
    };
    let ctx = match args.request_id {
        Some(id) => RequestContext::with_request_id(id),
        None => RequestContext::new(),
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(
                &format!("failed to start async runtime: {}", e),
                output,
                quiet,
            );
            process::exit(1);
        }
    };
    let client = HttpRemoteAuthority::new(config.remote.clone());
    let decision = match rt.block_on(client.decide(&request, &ctx)) {
        Ok(decision) => decision,
        Err(e) => {
            let err = TransitionError::RemoteUnavailable(e);
            report_error(&err.to_string(), output, quiet);
            process::exit(1);
        }
    };

    if !quiet {
        print_decision(&request, &decision, output);
    }
    if !decision.allowed {
        process::exit(EXIT_REJECTED);
    }
}

fn print_decision(request: &CanTransitionRequest, decision: &RemoteDecision, output: OutputFormat) {
    match output {
        OutputFormat::Json => {
            let body = serde_json::json!({
                "subject_ref": request.subject_ref,
                "to": request.to,
                "world": request.ctx.world,
                "allowed": decision.allowed,
                "reason": decision.reason,
                "contract_version": decision.contract_version,
            });
            println!("{}", body);
        }
        OutputFormat::Text => {
            let verdict = if decision.allowed { "allowed" } else { "rejected" };
            let mut line = format!(
                "{}: {} {} -> {} (world {})",
                verdict,
                request.subject_ref.subject_type,
                request.subject_ref.status,
                request.to,
                request.ctx.world
            );
            if !decision.reason.is_empty() {
                line.push_str(&format!(", reason: {}", decision.reason));
            }
            if let Some(version) = &decision.contract_version {
                line.push_str(&format!(", contract {}", version));
            }
            println!("{}", line);
        }
    }
}
