//! Dwell countdown: one tick per second, midway correction at a fixed remaining value, expiry hand-off.

use std::time::Duration;

use color_eyre::Result;
use tokio::time::{Instant, interval_at};

use crate::{
	config::Tunables,
	correction::{CorrectionReport, perform_correction},
	portal::{PortalPage, Status, StatusColor},
	visibility::VisibilityMonitor,
};

pub const TICK: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Countdown {
	Running(u32),
	Expired,
}

/// What a single tick asks the driver to do
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tick {
	/// Show `remaining` (the value before decrement); start the correction if `midway`
	Count { remaining: u32, midway: bool },
	/// Stop ticking and hand over to submission
	Expire,
	/// Already expired; nothing happens
	Idle,
}

impl Countdown {
	pub fn start(seconds: u32) -> Self {
		Countdown::Running(seconds)
	}

	pub fn tick(self, midway_at: u32) -> (Self, Tick) {
		match self {
			Countdown::Running(0) => (Countdown::Expired, Tick::Expire),
			Countdown::Running(n) => (Countdown::Running(n - 1), Tick::Count { remaining: n, midway: n == midway_at }),
			Countdown::Expired => (Countdown::Expired, Tick::Idle),
		}
	}

	pub fn is_expired(&self) -> bool {
		matches!(self, Countdown::Expired)
	}
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CountdownReport {
	/// Ticks that decremented
	pub counted: u32,
	pub correction: Option<CorrectionReport>,
}

pub fn countdown_status(remaining: u32, foreground: bool) -> Status {
	if foreground {
		Status::new(
			format!("Filling in like a human... {remaining}s left<br>⚠️ Do not close or switch this window"),
			StatusColor::Orange,
			false,
		)
	} else {
		Status::new(
			format!("Filling in like a human... {remaining}s left<br>(page is in background, timing may drift)<br>⚠️ Do not close or switch this window"),
			StatusColor::Red,
			true,
		)
	}
}

async fn midway<P: PortalPage>(page: &P, tunables: &Tunables, armed: bool) -> Option<Result<CorrectionReport>> {
	if !armed {
		return None;
	}
	Some(perform_correction(page, tunables).await)
}

/// Run the dwell countdown to expiry.
///
/// Ticks never pause: visibility only changes the overlay and whether the correction acts. The correction runs
/// alongside subsequent ticks and is awaited before returning, so nothing edits the form once submission starts.
/// A failed correction write (the form changed shape under it) fails the countdown.
pub async fn run_countdown<P: PortalPage>(page: &P, tunables: &Tunables, monitor: &mut VisibilityMonitor) -> Result<CountdownReport> {
	let mut state = Countdown::start(tunables.base_wait_seconds);
	let mut report = CountdownReport::default();
	let mut ticker = interval_at(Instant::now() + TICK, TICK);

	let correction = midway(page, tunables, false);
	tokio::pin!(correction);
	let mut correcting = false;

	loop {
		tokio::select! {
			_ = ticker.tick() => {
				let foreground = monitor.poll(page).await?;
				let (next, tick) = state.tick(tunables.midway_at_seconds);
				state = next;
				match tick {
					Tick::Count { remaining, midway: at_midway } => {
						tracing::debug!("Countdown: {remaining}s left (foreground: {foreground})");
						if at_midway {
							correction.set(midway(page, tunables, true));
							correcting = true;
						}
						if let Err(e) = page.show_status(&countdown_status(remaining, foreground)).await {
							tracing::warn!("Failed to update status overlay: {e}");
						}
						report.counted += 1;
					}
					Tick::Expire | Tick::Idle => break,
				}
			}
			result = &mut correction, if correcting => {
				correcting = false;
				record_correction(&mut report, result)?;
			}
		}
	}

	if correcting {
		let result = (&mut correction).await;
		record_correction(&mut report, result)?;
	}

	tracing::info!("Dwell of {}s elapsed", tunables.base_wait_seconds);
	Ok(report)
}

fn record_correction(report: &mut CountdownReport, result: Option<Result<CorrectionReport>>) -> Result<()> {
	if let Some(outcome) = result {
		report.correction = Some(outcome.map_err(|e| e.wrap_err("Midway correction failed"))?);
	}
	Ok(())
}
