//! Steps for loading baselines

use cucumber::{given, then, when};

use crate::world::{parse_status, snapshot, PulseWorld};

#[given(expr = "a chart retention of {int} points")]
fn chart_retention(world: &mut PulseWorld, retention: usize) {
    world.retention = Some(retention);
}

#[given(expr = "a view on monitor {string}")]
fn view_on_monitor(world: &mut PulseWorld, monitor_id: String) {
    world.create_engine(&monitor_id);
}

fn apply_baseline(
    world: &mut PulseWorld,
    monitor_id: String,
    status: String,
    successful: u64,
    total: u64,
) {
    let applied = world.engine().initialize(snapshot(
        &monitor_id,
        parse_status(&status),
        total,
        successful,
        vec![],
    ));
    assert!(applied, "baseline for '{}' was rejected", monitor_id);
}

#[given(expr = "a baseline for {string} that is {word} with {int} of {int} checks successful")]
fn baseline(
    world: &mut PulseWorld,
    monitor_id: String,
    status: String,
    successful: u64,
    total: u64,
) {
    apply_baseline(world, monitor_id, status, successful, total);
}

#[when(expr = "a baseline for {string} that is {word} with {int} of {int} checks successful arrives")]
fn new_baseline(
    world: &mut PulseWorld,
    monitor_id: String,
    status: String,
    successful: u64,
    total: u64,
) {
    apply_baseline(world, monitor_id, status, successful, total);
}

#[then("the view is not initialized")]
fn not_initialized(world: &mut PulseWorld) {
    assert!(!world.engine().is_initialized());
}

#[then(expr = "the status is {word}")]
fn status_is(world: &mut PulseWorld, expected: String) {
    let monitor = world.engine().monitor().expect("no view");
    assert_eq!(monitor.last_status, parse_status(&expected));
}

#[then(expr = "the total check count is {int}")]
fn total_is(world: &mut PulseWorld, expected: u64) {
    assert_eq!(world.engine().stats().expect("no view").total_checks, expected);
}

#[then(expr = "the failed check count is {int}")]
fn failed_is(world: &mut PulseWorld, expected: u64) {
    assert_eq!(world.engine().stats().expect("no view").failed_checks, expected);
}

#[then(expr = "the uptime is about {float} percent")]
fn uptime_is(world: &mut PulseWorld, expected: f64) {
    let uptime = world.engine().stats().expect("no view").uptime_percentage;
    assert!((uptime - expected).abs() < 0.001, "uptime was {}", uptime);
}

#[then(expr = "the last error is {string}")]
fn last_error_is(world: &mut PulseWorld, expected: String) {
    let monitor = world.engine().monitor().expect("no view");
    assert_eq!(monitor.last_error.as_deref(), Some(expected.as_str()));
}
