//! # SAR Telemetry - Metrics & Observability
//!
//! Prometheus metrics exporter for the search-and-rescue drone server.
//! Tracks the streaming sessions, the detection pipeline, and the
//! best-effort persistence and adapter-timeout counters.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use tracing::info;

/// Metrics collector for the SAR drone server.
pub struct MetricsCollector {
    registry: Registry,

    // Session metrics
    sessions_active: IntGauge,
    agent_sessions_active: IntGauge,
    deployments_active: IntGauge,

    // Tick loop metrics
    ticks_total: IntCounter,
    frames_missing_total: IntCounter,
    detections_total: IntCounter,
    tick_duration: Histogram,

    // Failure counters (best-effort paths)
    persistence_failures_total: IntCounter,
    adapter_timeouts_total: IntCounter,
    invalid_commands_total: IntCounter,

    // Agent bridge metrics
    agent_queries_total: IntCounter,
    agent_timeouts_total: IntCounter,
}

impl MetricsCollector {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let sessions_active = IntGauge::new(
            "sar_sessions_active",
            "Active streaming socket sessions",
        )?;
        registry.register(Box::new(sessions_active.clone()))?;

        let agent_sessions_active = IntGauge::new(
            "sar_agent_sessions_active",
            "Active agent-bridge socket sessions",
        )?;
        registry.register(Box::new(agent_sessions_active.clone()))?;

        let deployments_active = IntGauge::new(
            "sar_deployments_active",
            "Flight controllers currently deployed",
        )?;
        registry.register(Box::new(deployments_active.clone()))?;

        let ticks_total = IntCounter::new("sar_ticks_total", "Session loop ticks processed")?;
        registry.register(Box::new(ticks_total.clone()))?;

        let frames_missing_total = IntCounter::new(
            "sar_frames_missing_total",
            "Ticks skipped because frame capture yielded no frame",
        )?;
        registry.register(Box::new(frames_missing_total.clone()))?;

        let detections_total =
            IntCounter::new("sar_detections_total", "Detections reported to clients")?;
        registry.register(Box::new(detections_total.clone()))?;

        let tick_duration = Histogram::with_opts(
            HistogramOpts::new("sar_tick_duration_seconds", "Wall time of one session tick")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )?;
        registry.register(Box::new(tick_duration.clone()))?;

        let persistence_failures_total = IntCounter::new(
            "sar_persistence_failures_total",
            "Store writes that failed and were logged",
        )?;
        registry.register(Box::new(persistence_failures_total.clone()))?;

        let adapter_timeouts_total = IntCounter::new(
            "sar_adapter_timeouts_total",
            "External adapter calls that exceeded their bound",
        )?;
        registry.register(Box::new(adapter_timeouts_total.clone()))?;

        let invalid_commands_total = IntCounter::new(
            "sar_invalid_commands_total",
            "Unrecognized or malformed client commands",
        )?;
        registry.register(Box::new(invalid_commands_total.clone()))?;

        let agent_queries_total =
            IntCounter::new("sar_agent_queries_total", "Agent bridge queries handled")?;
        registry.register(Box::new(agent_queries_total.clone()))?;

        let agent_timeouts_total = IntCounter::new(
            "sar_agent_timeouts_total",
            "Idle-timeout notices sent on the agent bridge",
        )?;
        registry.register(Box::new(agent_timeouts_total.clone()))?;

        info!("Metrics collector initialized");

        Ok(Self {
            registry,
            sessions_active,
            agent_sessions_active,
            deployments_active,
            ticks_total,
            frames_missing_total,
            detections_total,
            tick_duration,
            persistence_failures_total,
            adapter_timeouts_total,
            invalid_commands_total,
            agent_queries_total,
            agent_timeouts_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Export metrics in Prometheus text format.
    pub fn export(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    pub fn session_opened(&self) {
        self.sessions_active.inc();
    }

    pub fn session_closed(&self) {
        self.sessions_active.dec();
    }

    pub fn agent_session_opened(&self) {
        self.agent_sessions_active.inc();
    }

    pub fn agent_session_closed(&self) {
        self.agent_sessions_active.dec();
    }

    pub fn deployment_started(&self) {
        self.deployments_active.inc();
    }

    pub fn deployment_ended(&self) {
        self.deployments_active.dec();
    }

    pub fn record_tick(&self, duration_secs: f64, detections: u64) {
        self.ticks_total.inc();
        self.detections_total.inc_by(detections);
        self.tick_duration.observe(duration_secs);
    }

    pub fn record_missing_frame(&self) {
        self.frames_missing_total.inc();
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures_total.inc();
    }

    pub fn record_adapter_timeout(&self) {
        self.adapter_timeouts_total.inc();
    }

    pub fn record_invalid_command(&self) {
        self.invalid_commands_total.inc();
    }

    pub fn record_agent_query(&self) {
        self.agent_queries_total.inc();
    }

    pub fn record_agent_timeout(&self) {
        self.agent_timeouts_total.inc();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create MetricsCollector")
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        assert!(MetricsCollector::new().is_ok());
    }

    #[test]
    fn test_export_contains_counters() {
        let metrics = MetricsCollector::new().unwrap();

        metrics.session_opened();
        metrics.record_tick(0.02, 3);
        metrics.record_persistence_failure();

        let export = metrics.export();
        assert!(export.contains("sar_sessions_active"));
        assert!(export.contains("sar_ticks_total"));
        assert!(export.contains("sar_persistence_failures_total"));
    }

    #[test]
    fn test_session_gauge_balance() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.session_opened();
        metrics.session_opened();
        metrics.session_closed();

        let export = metrics.export();
        assert!(export.contains("sar_sessions_active 1"));
    }
}
