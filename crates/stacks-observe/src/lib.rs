//! Observability setup for Stacks: one place that installs the global
//! tracing subscriber and tears down the OpenTelemetry pipeline on exit.

pub mod tracing_setup;
