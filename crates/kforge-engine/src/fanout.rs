//! ---
//! kf_section: "04-configuration-orchestration"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Concurrent per-node execution with first-error aggregation."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use std::future::Future;
use std::sync::Arc;

use futures::future;
use kforge_logging::{kf_debug, kf_error, LogContext};
use kforge_node::Node;
use tracing::{info_span, Instrument};

use crate::error::{EngineError, Result};

/// Run `work` once per node as independent tasks and wait for all of them.
///
/// Every unit runs to completion even when another fails. The returned error
/// is the first failure in node order; a panicked unit becomes
/// [`EngineError::Task`].
pub async fn fan_out<F, Fut>(step: &str, nodes: Vec<Arc<dyn Node>>, work: F) -> Result<()>
where
    F: Fn(Arc<dyn Node>) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let mut addresses = Vec::with_capacity(nodes.len());
    let mut handles = Vec::with_capacity(nodes.len());
    for node in nodes {
        let address = node.address().to_owned();
        let span = info_span!("node", node = %address, step = %step);
        handles.push(tokio::spawn(work(node).instrument(span)));
        addresses.push(address);
    }

    let results = future::join_all(handles).await;
    let total = results.len();
    let mut first_error = None;
    let mut failed = 0usize;
    for (address, result) in addresses.iter().zip(results) {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(join_err) => Err(EngineError::Task {
                address: address.clone(),
                reason: join_err.to_string(),
            }),
        };
        if let Err(err) = outcome {
            failed += 1;
            let ctx = LogContext::new().with_step(step).with_node(address);
            kf_error!(context = ctx, "{}", err);
            if first_error.is_none() {
                first_error = Some(err);
            }
        }
    }

    kf_debug!(
        context = LogContext::new().with_step(step),
        "fan-out finished: {} of {} node(s) failed",
        failed,
        total
    );
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
