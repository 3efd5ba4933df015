use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub order_transitions_total: IntCounterVec,
    pub offers_total: IntCounterVec,
    pub accept_conflicts_total: IntCounter,
    pub accept_latency_seconds: HistogramVec,
    pub location_samples_total: IntCounter,
    pub active_chat_threads: IntGauge,
    pub connected_clients: IntGauge,
    pub side_effect_failures_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let order_transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Order state transitions by target state"),
            &["to"],
        )
        .expect("valid order_transitions_total metric");

        let offers_total = IntCounterVec::new(
            Opts::new("offers_total", "Dispatch offers by outcome"),
            &["outcome"],
        )
        .expect("valid offers_total metric");

        let accept_conflicts_total = IntCounter::new(
            "accept_conflicts_total",
            "Accept attempts rejected because the order was already assigned",
        )
        .expect("valid accept_conflicts_total metric");

        let accept_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "accept_latency_seconds",
                "Latency of offer acceptance in seconds",
            ),
            &["outcome"],
        )
        .expect("valid accept_latency_seconds metric");

        let location_samples_total =
            IntCounter::new("location_samples_total", "Driver location samples recorded")
                .expect("valid location_samples_total metric");

        let active_chat_threads =
            IntGauge::new("active_chat_threads", "Chat threads currently open")
                .expect("valid active_chat_threads metric");

        let connected_clients =
            IntGauge::new("connected_clients", "Push connections currently registered")
                .expect("valid connected_clients metric");

        let side_effect_failures_total = IntCounterVec::new(
            Opts::new(
                "side_effect_failures_total",
                "Lifecycle side effects that failed and were queued for retry",
            ),
            &["effect"],
        )
        .expect("valid side_effect_failures_total metric");

        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(offers_total.clone()))
            .expect("register offers_total");
        registry
            .register(Box::new(accept_conflicts_total.clone()))
            .expect("register accept_conflicts_total");
        registry
            .register(Box::new(accept_latency_seconds.clone()))
            .expect("register accept_latency_seconds");
        registry
            .register(Box::new(location_samples_total.clone()))
            .expect("register location_samples_total");
        registry
            .register(Box::new(active_chat_threads.clone()))
            .expect("register active_chat_threads");
        registry
            .register(Box::new(connected_clients.clone()))
            .expect("register connected_clients");
        registry
            .register(Box::new(side_effect_failures_total.clone()))
            .expect("register side_effect_failures_total");

        Self {
            registry,
            order_transitions_total,
            offers_total,
            accept_conflicts_total,
            accept_latency_seconds,
            location_samples_total,
            active_chat_threads,
            connected_clients,
            side_effect_failures_total,
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
