//! Steps for pushed check results

use cucumber::{then, when};
use pulse::engine::CheckOutcome;
use pulse::events::CheckEvent;

use crate::world::{at, PulseWorld};

fn send(world: &mut PulseWorld, event: CheckEvent) {
    let outcome = world.engine().apply_check(&event);
    world.last_outcome = Some(outcome);
}

#[when(expr = "a failing check for {string} reports {string}")]
fn failing_check(world: &mut PulseWorld, monitor_id: String, error: String) {
    let checked_at = world.next_time();
    send(
        world,
        CheckEvent {
            monitor_id,
            checked_at,
            success: false,
            response_ms: None,
            error: Some(error),
        },
    );
}

#[when(expr = "a successful check for {string} takes {float} ms")]
fn successful_check(world: &mut PulseWorld, monitor_id: String, response_ms: f64) {
    let checked_at = world.next_time();
    send(
        world,
        CheckEvent {
            monitor_id,
            checked_at,
            success: true,
            response_ms: Some(response_ms),
            error: None,
        },
    );
}

#[when(expr = "{int} successful checks for {string} arrive")]
fn many_checks(world: &mut PulseWorld, count: usize, monitor_id: String) {
    for i in 0..count {
        let checked_at = world.next_time();
        send(
            world,
            CheckEvent {
                monitor_id: monitor_id.clone(),
                checked_at,
                success: true,
                response_ms: Some(100.0 + i as f64),
                error: None,
            },
        );
    }
}

#[when(expr = "a late failing check for {string} from before the baseline arrives")]
fn late_check(world: &mut PulseWorld, monitor_id: String) {
    send(
        world,
        CheckEvent {
            monitor_id,
            checked_at: at(-30),
            success: false,
            response_ms: None,
            error: Some("late".to_string()),
        },
    );
}

#[then("the check is ignored")]
fn check_ignored(world: &mut PulseWorld) {
    assert_eq!(world.last_outcome, Some(CheckOutcome::Ignored));
}

#[then("the check is counted as late")]
fn check_late(world: &mut PulseWorld) {
    assert_eq!(world.last_outcome, Some(CheckOutcome::AppliedLate));
}

#[then(expr = "the chart holds {int} points")]
fn chart_len(world: &mut PulseWorld, expected: usize) {
    assert_eq!(world.engine().chart().expect("no view").len(), expected);
}

#[then("the chart is in time order")]
fn chart_ordered(world: &mut PulseWorld) {
    let chart = world.engine().chart().expect("no view");
    assert!(chart
        .iter()
        .zip(chart.iter().skip(1))
        .all(|(a, b)| a.timestamp <= b.timestamp));
}

#[then(expr = "the newest chart point takes {float} ms")]
fn newest_point(world: &mut PulseWorld, expected: f64) {
    let chart = world.engine().chart().expect("no view");
    assert_eq!(chart.back().and_then(|p| p.response_ms), Some(expected));
}
