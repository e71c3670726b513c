//! Periodic autosave.

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::controller::Controller;

/// Autosave timing. `tick` bounds how long a stop request can go unnoticed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveSchedule {
    pub interval: Duration,
    pub tick: Duration,
}

impl AutosaveSchedule {
    pub fn every_minutes(minutes: u64) -> Self {
        Self {
            interval: Duration::from_secs(minutes.saturating_mul(60)),
            tick: Duration::from_secs(1),
        }
    }
}

/// Save every `schedule.interval` until the session stops.
///
/// Returns the number of autosaves that were issued.
pub fn run_autosave(controller: &Controller, schedule: &AutosaveSchedule) -> u32 {
    info!(
        interval_mins = schedule.interval.as_secs() / 60,
        "autosave scheduled"
    );
    let mut issued = 0;
    while wait_interval(controller, schedule) {
        debug!("executing autosave");
        if let Err(err) = controller.save() {
            warn!(err = %format!("{err:#}"), "autosave failed");
        }
        issued += 1;
    }
    debug!(issued, "autosave stopped");
    issued
}

/// Sleep through one interval in `tick` steps.
///
/// Returns `false` as soon as the session should stop.
fn wait_interval(controller: &Controller, schedule: &AutosaveSchedule) -> bool {
    let mut elapsed = Duration::ZERO;
    while elapsed < schedule.interval {
        if controller.should_stop() {
            return false;
        }
        let step = schedule.tick.min(schedule.interval - elapsed);
        thread::sleep(step);
        elapsed += step;
    }
    !controller.should_stop()
}
