//! Tests for the in-memory metrics sink

use std::sync::Arc;
use std::time::Duration;

use cron_control_runner::core::{
    ExecutionResult, InMemorySink, MetricsSink, Observation, Outcome, Site, Status,
};

#[test]
fn test_sink_filters_by_kind() {
    let sink = InMemorySink::new(100);
    sink.record(&Observation::SiteListing {
        status: Status::Failure,
        elapsed: Duration::from_millis(5),
    });
    sink.record(&Observation::EventListing {
        site: "a".into(),
        status: Status::Success,
        elapsed: Duration::from_millis(5),
        events: 2,
    });
    sink.record(&Observation::EventListing {
        site: "b".into(),
        status: Status::Failure,
        elapsed: Duration::from_millis(5),
        events: 0,
    });
    sink.record(&Observation::Execution {
        site: Arc::new(Site::new("a", "https://a")),
        hook: "hook".into(),
        result: ExecutionResult::failure(Outcome::Timeout, "timeout", Duration::from_secs(1), None),
    });

    assert_eq!(sink.site_listings(), vec![Status::Failure]);
    assert_eq!(sink.event_listings("a"), vec![(Status::Success, 2)]);
    assert_eq!(sink.event_listings("b"), vec![(Status::Failure, 0)]);
    assert!(sink.event_listings("c").is_empty());

    let executions = sink.executions();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].1, "hook");
    assert_eq!(executions[0].2.reason_label(), "timeout");
}

#[test]
fn test_sink_is_shareable_as_trait_object() {
    let sink = Arc::new(InMemorySink::new(10));
    let shared: Arc<dyn MetricsSink> = sink.clone();
    shared.record(&Observation::SaturationHit);
    assert_eq!(sink.saturation_hits(), 1);
}
