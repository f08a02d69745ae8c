//! Timed submission of a single evaluation detail page.
//!
//! Fill and countdown start together and race; submission starts only once the countdown has expired (and, with
//! [`FillGate::AwaitFill`], once the fill is done).

use color_eyre::Result;
use rand::Rng;
use tokio::time::{Instant, interval_at};
use v_utils::{elog, log};

use crate::{
	config::{FillGate, Tunables},
	countdown::{CountdownReport, TICK, run_countdown},
	fill::{FillReport, fill_form},
	portal::{PortalPage, Status, StatusColor},
	submit::{ConfirmationPolicy, OutcomeProbe, SubmitOutcome, submit_with_retry},
	visibility::VisibilityMonitor,
};

#[derive(Clone, Debug)]
pub struct Orchestrator<O> {
	pub tunables: Tunables,
	pub probe: O,
	pub policy: ConfirmationPolicy,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RunReport {
	pub fill: FillReport,
	/// False when the dwell ran out while fields were still being filled
	pub filled_before_expiry: bool,
	pub countdown: CountdownReport,
	pub submit: SubmitOutcome,
}

impl<O: OutcomeProbe> Orchestrator<O> {
	pub fn new(tunables: Tunables, probe: O, policy: ConfirmationPolicy) -> Self {
		Self { tunables, probe, policy }
	}

	/// Fill, dwell, submit. Only infrastructure failures (page gone, form changed shape) are errors; a failed
	/// submission is reported through [`RunReport::submit`].
	pub async fn run_detail_page<P: PortalPage, R: Rng>(&self, page: &P, rng: &mut R) -> Result<RunReport> {
		page.show_status(&Status::new(
			"⚠️ Keep this window in front!<br>Switching away may pause the timer.".to_string(),
			StatusColor::Orange,
			false,
		))
		.await?;

		// One monitor for the whole page, so the tab title keeps tracking visibility past the dwell.
		let mut monitor = VisibilityMonitor::new();
		let fill = fill_form(page, &self.tunables, rng);
		tokio::pin!(fill);

		let mut filled: Option<FillReport> = None;
		let countdown_report = {
			let countdown = run_countdown(page, &self.tunables, &mut monitor);
			tokio::pin!(countdown);
			loop {
				tokio::select! {
					result = &mut fill, if filled.is_none() => filled = Some(result?),
					result = &mut countdown => break result?,
				}
			}
		};
		let filled_before_expiry = filled.is_some();

		let (fill_report, submit) = match (filled, self.tunables.fill_gate) {
			(Some(report), _) => (report, submit_with_retry(page, &self.probe, self.policy, &self.tunables, &mut monitor).await?),
			(None, FillGate::AwaitFill) => {
				elog!("Dwell elapsed before the form was filled; holding submission until the fill finishes");
				let report = watch_until(page, &mut monitor, &mut fill).await?;
				(report, submit_with_retry(page, &self.probe, self.policy, &self.tunables, &mut monitor).await?)
			}
			(None, FillGate::SubmitAnyway) => {
				elog!("Dwell elapsed before the form was filled; submitting a partially filled form");
				let (submit, report) = tokio::join!(submit_with_retry(page, &self.probe, self.policy, &self.tunables, &mut monitor), &mut fill);
				(report?, submit?)
			}
		};

		log!("Evaluation finished: {submit:?}");
		Ok(RunReport {
			fill: fill_report,
			filled_before_expiry,
			countdown: countdown_report,
			submit,
		})
	}
}

/// Await `work`, polling visibility once a second in the meantime
async fn watch_until<P: PortalPage, T>(page: &P, monitor: &mut VisibilityMonitor, work: impl Future<Output = T>) -> T {
	tokio::pin!(work);
	let mut ticker = interval_at(Instant::now() + TICK, TICK);
	loop {
		tokio::select! {
			result = &mut work => return result,
			_ = ticker.tick() => {
				if let Err(e) = monitor.poll(page).await {
					tracing::warn!("Failed to read page visibility: {e}");
				}
			}
		}
	}
}
