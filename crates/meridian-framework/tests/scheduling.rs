//! End-to-end scheduling cycles with fake plugins.

mod common;

use std::sync::Arc;

use common::{Fake, build, full_profile, nodes};
use meridian_core::{Code, Workload};
use meridian_framework::{ScheduleError, Scheduler};
use meridian_metrics::labels;
use meridian_parallel::CancellationToken;

fn scheduler(fake: Fake) -> (Scheduler, Arc<Fake>) {
    let fake = Arc::new(fake);
    let fw = build(&full_profile(&fake.name, 1), vec![fake.clone()]);
    (Scheduler::new(Arc::new(fw)), fake)
}

fn schedule(s: &Scheduler, node_names: &[&str]) -> Result<meridian_framework::ScheduleResult, ScheduleError> {
    s.schedule_one(&CancellationToken::new(), &Workload::new("api"), &nodes(node_names))
}

#[test]
fn schedules_on_highest_scoring_node() {
    let (s, fake) = scheduler(Fake::scoring("Fake", &[("a", 10), ("b", 90), ("c", 40)]));

    let result = schedule(&s, &["a", "b", "c"]).unwrap();

    assert_eq!(result.suggested_host, "b");
    assert_eq!(result.feasible_nodes, 3);
    assert_eq!(result.evaluated_nodes, 3);
    assert_eq!(result.scores.len(), 3);
    assert_eq!(
        fake.calls(),
        vec!["pre_filter", "pre_score", "reserve:b", "permit:b", "bind:b", "post_bind:b"]
    );
}

#[test]
fn no_nodes_is_an_error() {
    let (s, _) = scheduler(Fake::new("Fake"));
    assert!(matches!(schedule(&s, &[]), Err(ScheduleError::NoNodesAvailable)));
}

#[test]
fn single_feasible_node_skips_scoring() {
    let mut fake = Fake::scoring("Fake", &[("a", 100)]);
    fake.reject_nodes = ["b".to_string(), "c".to_string()].into();
    let (s, fake) = scheduler(fake);

    let result = schedule(&s, &["a", "b", "c"]).unwrap();

    assert_eq!(result.suggested_host, "a");
    assert_eq!(result.feasible_nodes, 1);
    assert!(result.scores.is_empty());
    assert!(!fake.calls().contains(&"pre_score".to_string()));
}

#[test]
fn nothing_fits_runs_post_filter_and_reports_reasons() {
    let mut fake = Fake::new("Fake");
    fake.reject_nodes = ["a".to_string(), "b".to_string()].into();
    let (s, fake) = scheduler(fake);

    let err = schedule(&s, &["a", "b"]).unwrap_err();

    let ScheduleError::Unschedulable(fit) = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(fit.num_all_nodes, 2);
    assert_eq!(fit.diagnosis.len(), 2);
    assert!(fit.diagnosis.unschedulable_plugins.contains("Fake"));
    assert_eq!(
        err.to_string(),
        "0/2 nodes are available: 2 node is fenced. no node can be freed."
    );
    assert!(fake.calls().contains(&"post_filter".to_string()));
}

#[test]
fn post_filter_nomination_is_reported() {
    let mut fake = Fake::new("Fake");
    fake.reject_nodes = ["a".to_string()].into();
    fake.nominate = Some("a".to_string());
    let (s, _) = scheduler(fake);

    let err = schedule(&s, &["a"]).unwrap_err();

    let ScheduleError::Unschedulable(fit) = err else {
        panic!("expected a fit error");
    };
    assert_eq!(fit.nominated_node.as_deref(), Some("a"));
}

#[test]
fn pre_filter_restricts_candidates() {
    let mut fake = Fake::scoring("Fake", &[("a", 100), ("b", 10), ("c", 50)]);
    fake.pre_filter_only = Some(vec!["b".to_string(), "c".to_string()]);
    let (s, _) = scheduler(fake);

    let result = schedule(&s, &["a", "b", "c"]).unwrap();

    assert_eq!(result.suggested_host, "c");
    assert_eq!(result.evaluated_nodes, 2);
}

#[test]
fn empty_pre_filter_result_is_unschedulable() {
    let mut fake = Fake::new("Fake");
    fake.pre_filter_only = Some(vec![]);
    let (s, _) = scheduler(fake);

    let err = schedule(&s, &["a", "b"]).unwrap_err();

    let ScheduleError::Unschedulable(fit) = err else {
        panic!("expected a fit error");
    };
    assert!(fit.diagnosis.pre_filter_msg.is_some());
}

#[test]
fn permit_rejection_unreserves() {
    let mut fake = Fake::scoring("Fake", &[("a", 1)]);
    fake.permit = Some(Code::Unschedulable);
    let (s, fake) = scheduler(fake);

    let err = schedule(&s, &["a"]).unwrap_err();

    assert!(matches!(err, ScheduleError::StageFailed { stage, .. } if stage == labels::PERMIT));
    let calls = fake.calls();
    assert_eq!(calls[calls.len() - 1], "unreserve:a");
    assert!(!calls.iter().any(|c| c.starts_with("bind")));
}

#[test]
fn reserve_failure_unreserves() {
    let mut fake = Fake::new("Fake");
    fake.reserve = Some(Code::Error);
    let (s, fake) = scheduler(fake);

    let err = schedule(&s, &["a"]).unwrap_err();

    assert!(matches!(err, ScheduleError::StageFailed { stage, .. } if stage == labels::RESERVE));
    assert!(fake.calls().contains(&"unreserve:a".to_string()));
}

#[test]
fn all_binders_skipping_is_an_error() {
    let mut fake = Fake::new("Fake");
    fake.bind = Some(Code::Skip);
    let (s, fake) = scheduler(fake);

    let err = schedule(&s, &["a"]).unwrap_err();

    assert!(matches!(err, ScheduleError::StageFailed { stage, .. } if stage == labels::BIND));
    assert!(fake.calls().contains(&"unreserve:a".to_string()));
    assert!(!fake.calls().iter().any(|c| c.starts_with("post_bind")));
}

#[test]
fn pre_score_error_fails_cycle() {
    let mut fake = Fake::new("Fake");
    fake.pre_score = Some(Code::Error);
    let (s, _) = scheduler(fake);

    let err = schedule(&s, &["a", "b"]).unwrap_err();

    assert!(matches!(err, ScheduleError::StageFailed { stage, .. } if stage == labels::PRE_SCORE));
}

#[test]
fn pre_score_skip_drops_plugin_from_scoring() {
    let mut fake = Fake::scoring("Fake", &[("a", 10), ("b", 90)]);
    fake.pre_score = Some(Code::Skip);
    let (s, _) = scheduler(fake);

    let result = schedule(&s, &["a", "b"]).unwrap();

    assert!(result.scores.iter().all(|n| n.scores.is_empty() && n.total_score == 0));
}

#[test]
fn invalid_score_fails_cycle_without_reserving() {
    let (s, fake) = scheduler(Fake::scoring("Fake", &[("a", 10), ("b", 500)]));

    let err = schedule(&s, &["a", "b"]).unwrap_err();

    assert!(err.to_string().contains("invalid score 500"));
    assert!(!fake.calls().iter().any(|c| c.starts_with("reserve")));
}

#[test]
fn cancelled_cycle_is_not_reported_as_unschedulable() {
    let (s, fake) = scheduler(Fake::scoring("Fake", &[("a", 10), ("b", 90)]));
    let ctx = CancellationToken::new();
    ctx.cancel();

    let err = s.schedule_one(&ctx, &Workload::new("api"), &nodes(&["a", "b"])).unwrap_err();

    assert!(
        matches!(err, ScheduleError::Framework(meridian_framework::FrameworkError::Cancelled)),
        "unexpected error: {err}"
    );
    assert!(!fake.calls().contains(&"post_filter".to_string()));
    assert!(!fake.calls().iter().any(|c| c.starts_with("reserve")));
}
