use prometheus::{
    Encoder, GaugeVec, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub assignment_latency_seconds: HistogramVec,
    pub pending_loads: IntGauge,
    pub driver_fatigue: GaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Total assignment attempts by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let assignment_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of assignment processing in seconds",
            ),
            &["outcome"],
        )
        .expect("valid assignment_latency_seconds metric");

        let pending_loads = IntGauge::new("pending_loads", "Loads currently awaiting assignment")
            .expect("valid pending_loads metric");

        let driver_fatigue = GaugeVec::new(
            Opts::new("driver_fatigue", "Last computed fatigue score [0..100]"),
            &["driver_id"],
        )
        .expect("valid driver_fatigue metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(assignment_latency_seconds.clone()))
            .expect("register assignment_latency_seconds");
        registry
            .register(Box::new(pending_loads.clone()))
            .expect("register pending_loads");
        registry
            .register(Box::new(driver_fatigue.clone()))
            .expect("register driver_fatigue");

        Self {
            registry,
            assignments_total,
            assignment_latency_seconds,
            pending_loads,
            driver_fatigue,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
