//! Telemetry Sink (spec §4.7): one datum per tool or prompt invocation.

use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
}

impl Outcome {
    fn as_label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Error => "error",
        }
    }
}

/// Implementations record one datum per invocation, from cleanup code that
/// runs on every exit path (success and error alike) — never skipped.
pub trait TelemetrySink: Send + Sync {
    fn record_tool_call(&self, server: &str, tool: &str, outcome: Outcome, elapsed: Duration);
    fn record_prompt_call(&self, server: &str, prompt: &str, outcome: Outcome, elapsed: Duration);
}

/// Always available, per spec §4.7 ("no-op implementation is always
/// available").
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn record_tool_call(&self, server: &str, tool: &str, outcome: Outcome, elapsed: Duration) {
        debug!(server, tool, outcome = outcome.as_label(), elapsed_ms = elapsed.as_millis() as u64, "tool call (noop sink)");
    }

    fn record_prompt_call(&self, server: &str, prompt: &str, outcome: Outcome, elapsed: Duration) {
        debug!(server, prompt, outcome = outcome.as_label(), elapsed_ms = elapsed.as_millis() as u64, "prompt call (noop sink)");
    }
}

/// Real metrics backend (spec §4.7's "a real metrics backend"; supplemented
/// per the ambient-stack expansion so `/metrics` has something to serve).
pub struct PrometheusSink {
    tool_calls: prometheus::CounterVec,
    tool_call_duration: prometheus::HistogramVec,
    prompt_calls: prometheus::CounterVec,
    prompt_call_duration: prometheus::HistogramVec,
}

impl PrometheusSink {
    pub fn new(registry: &prometheus::Registry) -> Result<Self, prometheus::Error> {
        let tool_calls = prometheus::CounterVec::new(
            prometheus::Opts::new("mcp_gateway_tool_calls_total", "Tool invocations by server, tool, and outcome"),
            &["server", "tool", "outcome"],
        )?;
        let tool_call_duration = prometheus::HistogramVec::new(
            prometheus::HistogramOpts::new("mcp_gateway_tool_call_duration_seconds", "Tool invocation latency"),
            &["server", "tool"],
        )?;
        let prompt_calls = prometheus::CounterVec::new(
            prometheus::Opts::new("mcp_gateway_prompt_calls_total", "Prompt invocations by server, prompt, and outcome"),
            &["server", "prompt", "outcome"],
        )?;
        let prompt_call_duration = prometheus::HistogramVec::new(
            prometheus::HistogramOpts::new("mcp_gateway_prompt_call_duration_seconds", "Prompt invocation latency"),
            &["server", "prompt"],
        )?;

        registry.register(Box::new(tool_calls.clone()))?;
        registry.register(Box::new(tool_call_duration.clone()))?;
        registry.register(Box::new(prompt_calls.clone()))?;
        registry.register(Box::new(prompt_call_duration.clone()))?;

        Ok(Self { tool_calls, tool_call_duration, prompt_calls, prompt_call_duration })
    }
}

impl TelemetrySink for PrometheusSink {
    fn record_tool_call(&self, server: &str, tool: &str, outcome: Outcome, elapsed: Duration) {
        self.tool_calls.with_label_values(&[server, tool, outcome.as_label()]).inc();
        self.tool_call_duration.with_label_values(&[server, tool]).observe(elapsed.as_secs_f64());
    }

    fn record_prompt_call(&self, server: &str, prompt: &str, outcome: Outcome, elapsed: Duration) {
        self.prompt_calls.with_label_values(&[server, prompt, outcome.as_label()]).inc();
        self.prompt_call_duration.with_label_values(&[server, prompt]).observe(elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_sink_does_not_panic() {
        let sink = NoopSink;
        sink.record_tool_call("weather", "now", Outcome::Success, Duration::from_millis(5));
        sink.record_prompt_call("weather", "summary", Outcome::Error, Duration::from_millis(1));
    }

    #[test]
    fn prometheus_sink_registers_and_records() {
        let registry = prometheus::Registry::new();
        let sink = PrometheusSink::new(&registry).unwrap();
        sink.record_tool_call("weather", "now", Outcome::Success, Duration::from_millis(12));
        let families = registry.gather();
        assert!(families.iter().any(|f| f.get_name() == "mcp_gateway_tool_calls_total"));
    }
}
