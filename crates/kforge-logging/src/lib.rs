//! ---
//! kf_section: "03-logging"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Structured logging adapters and sinks."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Structured logging context and helpers shared by the node and engine crates.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Initialize a baseline tracing subscriber suitable for development and tests.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer())
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Pipeline being executed (`deploy` or `update`).
    pub pipeline: Option<&'a str>,
    /// Display label of the current step (e.g. `10` or `2.1`).
    pub step: Option<&'a str>,
    /// Address of the node the event concerns.
    pub node: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a pipeline name.
    pub fn with_pipeline(mut self, pipeline: &'a str) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Attach a step label.
    pub fn with_step(mut self, step: &'a str) -> Self {
        self.step = Some(step);
        self
    }

    /// Attach a node address.
    pub fn with_node(mut self, node: &'a str) -> Self {
        self.node = Some(node);
        self
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// The operation completed successfully.
    Success,
    /// The operation failed or was aborted.
    Fault,
}

impl SystemEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized system event with a success/fault outcome.
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let default = LogContext::default();
    let ctx = context.unwrap_or(&default);
    // `tracing::event!` needs a constant level, so each outcome gets its own arm.
    match outcome {
        SystemEventOutcome::Success => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome.as_str(),
            pipeline = ctx.pipeline.unwrap_or(""),
            step = ctx.step.unwrap_or(""),
            node = ctx.node.unwrap_or(""),
            message = %message
        ),
        SystemEventOutcome::Fault => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome.as_str(),
            pipeline = ctx.pipeline.unwrap_or(""),
            step = ctx.step.unwrap_or(""),
            node = ctx.node.unwrap_or(""),
            message = %message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_emit_without_panic() {
        init();
        let ctx = LogContext::new()
            .with_pipeline("deploy")
            .with_node("10.0.0.1");
        kf_info!(context = ctx.clone(), "node connected");
        kf_debug!("debug message");
        kf_warn!(context = ctx.clone(), "retrying {}", "join");
        kf_error!(context = ctx, "exit status: {}", 42);
    }

    #[test]
    fn init_does_not_panic() {
        init();
        init();
    }

    #[test]
    fn system_event_helper_emits() {
        init();
        let ctx = LogContext::new().with_pipeline("update").with_step("9");
        log_system_event(
            Some(&ctx),
            "step.finished",
            "join node finished",
            SystemEventOutcome::Success,
        );
        log_system_event(
            None,
            "pipeline.finished",
            "pipeline aborted",
            SystemEventOutcome::Fault,
        );
    }
}
