//! BDD step definitions for pulse

pub mod baseline_steps;
pub mod check_steps;
pub mod resync_steps;
