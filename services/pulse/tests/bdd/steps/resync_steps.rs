//! Steps for status changes and incident resynchronization

use cucumber::{given, then, when};
use pulse::correlator::ResyncState;
use pulse::engine::ResyncStep;
use pulse::events::StatusChangeEvent;
use pulse::types::{IncidentSummary, MonitorStatus};
use pulse::PulseError;

use crate::world::{at, snapshot, PulseWorld};

fn send_status_change(world: &mut PulseWorld, monitor_id: String) {
    let step = world
        .engine()
        .apply_status_change(&StatusChangeEvent { monitor_id });
    world.last_step = Some(step);
}

#[given(expr = "the status of {string} changed")]
fn status_changed(world: &mut PulseWorld, monitor_id: String) {
    send_status_change(world, monitor_id);
}

#[when(expr = "the status of {string} changes")]
fn status_changes(world: &mut PulseWorld, monitor_id: String) {
    send_status_change(world, monitor_id);
}

#[when(expr = "the refetch returns {int} ongoing incident(s)")]
fn refetch_with_incidents(world: &mut PulseWorld, count: usize) {
    let monitor_id = world.engine().monitor_id().to_string();
    let incidents = (0..count)
        .map(|i| IncidentSummary {
            id: Some(format!("inc-{}", i)),
            started_at: at(i as i64),
            ended_at: None,
            error: Some("timeout".to_string()),
            ongoing: true,
        })
        .collect();
    let step = world
        .engine()
        .complete_resync(snapshot(&monitor_id, MonitorStatus::Down, 11, 10, incidents));
    world.last_step = Some(step);
}

#[when("the refetch fails")]
fn refetch_fails(world: &mut PulseWorld) {
    let step = world
        .engine()
        .fail_resync(&PulseError::Http("backend returned HTTP 503".to_string()));
    world.last_step = Some(step);
}

#[then("a refetch is started")]
fn refetch_started(world: &mut PulseWorld) {
    assert_eq!(world.last_step, Some(ResyncStep::FetchNow));
}

#[then("no refetch is started")]
fn no_refetch(world: &mut PulseWorld) {
    assert_eq!(world.last_step, Some(ResyncStep::Idle));
}

#[then("a retry is scheduled")]
fn retry_scheduled(world: &mut PulseWorld) {
    assert!(
        matches!(world.last_step, Some(ResyncStep::RetryAfter(_))),
        "got {:?}",
        world.last_step
    );
}

#[then("the view is pending resync")]
fn pending(world: &mut PulseWorld) {
    assert_eq!(world.engine().resync_state(), ResyncState::PendingResync);
}

#[then("the view is stable")]
fn stable(world: &mut PulseWorld) {
    assert_eq!(world.engine().resync_state(), ResyncState::Stable);
}

#[then(expr = "the view lists {int} ongoing incident(s)")]
fn ongoing_incidents(world: &mut PulseWorld, expected: usize) {
    let incidents = world.engine().incidents().expect("no view");
    assert_eq!(incidents.iter().filter(|i| i.ongoing).count(), expected);
}
