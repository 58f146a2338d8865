//! ---
//! kf_section: "03-logging"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Structured logging adapters and sinks."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
//! Level-specific logging macros that attach a [`LogContext`](crate::LogContext).

#[doc(hidden)]
#[macro_export]
macro_rules! __kf_event {
    ($level:expr, context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            pipeline = ctx.pipeline.unwrap_or(""),
            step = ctx.step.unwrap_or(""),
            node = ctx.node.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
    ($level:expr, $($arg:tt)+) => {{
        $crate::__kf_event!($level, context = $crate::LogContext::default(), $($arg)+)
    }};
}

/// Emit an informational log enriched with kforge context.
#[macro_export]
macro_rules! kf_info {
    ($($arg:tt)+) => { $crate::__kf_event!(tracing::Level::INFO, $($arg)+) };
}

/// Emit a warning enriched with kforge context.
#[macro_export]
macro_rules! kf_warn {
    ($($arg:tt)+) => { $crate::__kf_event!(tracing::Level::WARN, $($arg)+) };
}

/// Emit a debug log enriched with kforge context.
#[macro_export]
macro_rules! kf_debug {
    ($($arg:tt)+) => { $crate::__kf_event!(tracing::Level::DEBUG, $($arg)+) };
}

/// Emit an error log enriched with kforge context.
#[macro_export]
macro_rules! kf_error {
    ($($arg:tt)+) => { $crate::__kf_event!(tracing::Level::ERROR, $($arg)+) };
}
