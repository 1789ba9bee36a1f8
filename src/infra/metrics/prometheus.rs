//! Prometheus-backed metrics sink.
//!
//! Every metric lives in the `cron_control_runner` namespace on a registry
//! owned by the sink, so several sinks (one per test, say) never collide.
//!
//! | metric | type | labels |
//! |---|---|---|
//! | `get_sites_latency_seconds` | histogram | `status` |
//! | `get_site_events_latency_seconds` | histogram | `site`, `status` |
//! | `get_site_events_events_received_total` | counter | `site` |
//! | `run_event_latency_seconds` | histogram | `site_url`, `status`, `reason` |
//! | `wpcli_stat_maxrss_mb` | histogram | `status` |
//! | `wpcli_stat_cputime_seconds` | histogram | `cpu_mode`, `status` |
//! | `run_worker_state_count` | gauge | `state` |
//! | `run_worker_busy_pct` | gauge | |
//! | `run_worker_all_busy_hits` | counter | |

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};

use crate::config::MetricsConfig;
use crate::core::event::ExecutionResult;
use crate::core::metrics::{MetricsSink, Observation, Status};
use crate::util::labels::LabelCap;

/// Metric namespace.
const NAMESPACE: &str = "cron_control_runner";

const LISTING_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 60.0];
const RUN_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 60.0, 120.0, 240.0,
];
const MAXRSS_BUCKETS: &[f64] = &[
    100.0, 200.0, 300.0, 400.0, 500.0, 600.0, 700.0, 800.0, 900.0, 1000.0,
];

fn histogram(
    subsystem: &str,
    name: &str,
    help: &str,
    buckets: &[f64],
    labels: &[&str],
) -> prometheus::Result<HistogramVec> {
    HistogramVec::new(
        HistogramOpts::new(name, help)
            .namespace(NAMESPACE)
            .subsystem(subsystem)
            .buckets(buckets.to_vec()),
        labels,
    )
}

fn opts(subsystem: &str, name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace(NAMESPACE).subsystem(subsystem)
}

/// Sink translating observations into Prometheus metrics.
pub struct PrometheusSink {
    registry: Registry,
    get_sites_latency: HistogramVec,
    get_site_events_latency: HistogramVec,
    events_received: CounterVec,
    run_event_latency: HistogramVec,
    maxrss_mb: HistogramVec,
    cputime_seconds: HistogramVec,
    worker_state: GaugeVec,
    worker_busy_pct: Gauge,
    all_busy_hits: Counter,
    site_labels: LabelCap,
    site_url_labels: LabelCap,
    reason_labels: LabelCap,
}

impl PrometheusSink {
    /// Create a sink with its own registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric cannot be created or registered.
    pub fn new(config: &MetricsConfig) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let get_sites_latency = histogram(
            "get_sites",
            "latency_seconds",
            "Histogram of time taken to enumerate sites",
            LISTING_BUCKETS,
            &["status"],
        )?;
        let get_site_events_latency = histogram(
            "get_site_events",
            "latency_seconds",
            "Histogram of time taken to enumerate events for a site",
            LISTING_BUCKETS,
            &["site", "status"],
        )?;
        let events_received = CounterVec::new(
            opts(
                "get_site_events",
                "events_received_total",
                "Number of events retrieved by site",
            ),
            &["site"],
        )?;
        let run_event_latency = histogram(
            "run_event",
            "latency_seconds",
            "Histogram of time taken to run events",
            RUN_BUCKETS,
            &["site_url", "status", "reason"],
        )?;
        let maxrss_mb = histogram(
            "wpcli_stat",
            "maxrss_mb",
            "MaxRSS (in MiB) of invoked management tool commands",
            MAXRSS_BUCKETS,
            &["status"],
        )?;
        let cputime_seconds = histogram(
            "wpcli_stat",
            "cputime_seconds",
            "CPU time (in seconds) of invoked management tool commands",
            RUN_BUCKETS,
            &["cpu_mode", "status"],
        )?;
        let worker_state = GaugeVec::new(
            opts("run_worker", "state_count", "Breakdown of run-workers by state"),
            &["state"],
        )?;
        let worker_busy_pct = Gauge::with_opts(opts(
            "run_worker",
            "busy_pct",
            "Instantaneous fraction of busy workers",
        ))?;
        let all_busy_hits = Counter::with_opts(opts(
            "run_worker",
            "all_busy_hits",
            "Number of dispatch attempts that found every worker busy",
        ))?;

        registry.register(Box::new(get_sites_latency.clone()))?;
        registry.register(Box::new(get_site_events_latency.clone()))?;
        registry.register(Box::new(events_received.clone()))?;
        registry.register(Box::new(run_event_latency.clone()))?;
        registry.register(Box::new(maxrss_mb.clone()))?;
        registry.register(Box::new(cputime_seconds.clone()))?;
        registry.register(Box::new(worker_state.clone()))?;
        registry.register(Box::new(worker_busy_pct.clone()))?;
        registry.register(Box::new(all_busy_hits.clone()))?;

        Ok(Self {
            registry,
            get_sites_latency,
            get_site_events_latency,
            events_received,
            run_event_latency,
            maxrss_mb,
            cputime_seconds,
            worker_state,
            worker_busy_pct,
            all_busy_hits,
            site_labels: LabelCap::new(config.max_site_labels),
            site_url_labels: LabelCap::new(config.max_site_labels),
            reason_labels: LabelCap::new(config.max_reason_labels),
        })
    }

    /// The registry all metrics are registered on.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every metric in the text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    fn record_execution(&self, site_url: &str, result: &ExecutionResult) {
        let status = Status::from(result.outcome.is_success()).as_str();
        let site_url = self.site_url_labels.label(site_url);
        let reason = result.reason_label();
        let reason = self.reason_labels.label(&reason);

        self.run_event_latency
            .with_label_values(&[&*site_url, status, &*reason])
            .observe(result.elapsed.as_secs_f64());

        if let Some(usage) = result.usage {
            self.maxrss_mb
                .with_label_values(&[status])
                .observe(usage.max_rss_mib());
            self.cputime_seconds
                .with_label_values(&["user", status])
                .observe(usage.user_time.as_secs_f64());
            self.cputime_seconds
                .with_label_values(&["system", status])
                .observe(usage.system_time.as_secs_f64());
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_worker_state(&self, capacity: usize, busy: usize) {
        let idle = capacity.saturating_sub(busy);
        self.worker_state
            .with_label_values(&["max"])
            .set(capacity as f64);
        self.worker_state.with_label_values(&["busy"]).set(busy as f64);
        self.worker_state.with_label_values(&["idle"]).set(idle as f64);
        if capacity > 0 {
            self.worker_busy_pct.set(busy as f64 / capacity as f64);
        }
    }
}

impl MetricsSink for PrometheusSink {
    #[allow(clippy::cast_precision_loss)]
    fn record(&self, observation: &Observation) {
        match observation {
            Observation::SiteListing { status, elapsed } => {
                self.get_sites_latency
                    .with_label_values(&[status.as_str()])
                    .observe(elapsed.as_secs_f64());
            }
            Observation::EventListing {
                site,
                status,
                elapsed,
                events,
            } => {
                let site = self.site_labels.label(site);
                self.get_site_events_latency
                    .with_label_values(&[&*site, status.as_str()])
                    .observe(elapsed.as_secs_f64());
                if *events > 0 {
                    self.events_received
                        .with_label_values(&[&*site])
                        .inc_by(*events as f64);
                }
            }
            Observation::Execution { site, result, .. } => {
                self.record_execution(&site.url, result);
            }
            Observation::WorkerState { capacity, busy } => {
                self.record_worker_state(*capacity, *busy);
            }
            Observation::SaturationHit => self.all_busy_hits.inc(),
        }
    }
}
