//! Bounded submit-and-check loop.
//!
//! The portal gives no response to a submission. Success is inferred by an [`OutcomeProbe`]; the default one,
//! [`OverlayUrlProbe`], is a heuristic and can misclassify in both directions. Whatever the probe says, at most
//! `max_attempts` clicks are issued.

use std::time::Duration;

use color_eyre::Result;
use tokio::time::{Instant, sleep_until, timeout};
use v_utils::{elog, log};

use crate::{
	DETAIL_URL_MARKER,
	config::Tunables,
	portal::{PortalPage, Status, StatusColor},
	visibility::VisibilityMonitor,
};

/// Wait between clicking submit and looking for the layer modal
pub const MODAL_DELAY: Duration = Duration::from_millis(500);
/// Longest a single probe, or the page round-trips of a click, may take before the step is abandoned
pub const STEP_TIMEOUT: Duration = Duration::from_secs(2);

/// Classification of the page after a submit
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
	Succeeded,
	Failed,
	/// Probe could not tell; counted as a failed attempt
	Unknown,
}

/// Decides whether the last submission went through
#[allow(async_fn_in_trait)]
pub trait OutcomeProbe {
	async fn probe<P: PortalPage>(&self, page: &P) -> Outcome;
}

/// Still on the detail page with our overlay alive => the submission did not go through.
#[derive(Clone, Debug)]
pub struct OverlayUrlProbe {
	pub detail_marker: String,
}

impl Default for OverlayUrlProbe {
	fn default() -> Self {
		Self {
			detail_marker: DETAIL_URL_MARKER.to_string(),
		}
	}
}

impl OverlayUrlProbe {
	pub fn classify(overlay_present: bool, url: &str, detail_marker: &str) -> Outcome {
		if overlay_present && url.contains(detail_marker) { Outcome::Failed } else { Outcome::Succeeded }
	}
}

impl OutcomeProbe for OverlayUrlProbe {
	async fn probe<P: PortalPage>(&self, page: &P) -> Outcome {
		let url = match page.current_url().await {
			Ok(url) => url,
			Err(e) => {
				tracing::warn!("Outcome probe could not read URL: {e}");
				return Outcome::Unknown;
			}
		};
		match page.overlay_present().await {
			Ok(present) => Self::classify(present, &url, &self.detail_marker),
			Err(e) => {
				tracing::warn!("Outcome probe could not query overlay: {e}");
				Outcome::Unknown
			}
		}
	}
}

/// How JS confirm/alert dialogs are treated once submission starts
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfirmationPolicy {
	/// Accept every dialog for the remaining lifetime of the page
	AutoAccept,
	/// Leave dialogs for the user; a blocking prompt will stall submission
	LeaveToUser,
}

impl ConfirmationPolicy {
	pub async fn install<P: PortalPage>(&self, page: &P) -> Result<()> {
		match self {
			ConfirmationPolicy::AutoAccept => {
				page.accept_dialogs().await?;
				tracing::info!("Auto-accepting dialogs for the rest of this page");
			}
			ConfirmationPolicy::LeaveToUser => {}
		}
		Ok(())
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryState {
	/// `n` checks have failed so far; the (n+1)-th click is in flight
	Attempting(u32),
	Succeeded { attempts: u32 },
	Failed { attempts: u32 },
}

impl RetryState {
	pub fn observe(self, outcome: Outcome, max_attempts: u32) -> Self {
		match self {
			RetryState::Attempting(n) => match outcome {
				Outcome::Succeeded => RetryState::Succeeded { attempts: n + 1 },
				Outcome::Failed | Outcome::Unknown if n + 1 >= max_attempts => RetryState::Failed { attempts: n + 1 },
				Outcome::Failed | Outcome::Unknown => RetryState::Attempting(n + 1),
			},
			terminal => terminal,
		}
	}

	pub fn is_terminal(&self) -> bool {
		!matches!(self, RetryState::Attempting(_))
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitOutcome {
	Succeeded { attempts: u32 },
	/// Cap reached without a success signal. The user may still submit by hand.
	ExhaustedRetries { attempts: u32 },
	/// Nothing to click; no attempt was made
	MissingSubmitControl,
}

async fn attempt<P: PortalPage>(page: &P, n: u32) {
	status(page, Status::new(format!("⏳ Submitting... (attempt {})", n + 1), StatusColor::Green, false)).await;
	match page.click_submit().await {
		Ok(true) => {}
		Ok(false) => elog!("Submit control vanished before attempt {}", n + 1),
		Err(e) => elog!("Failed to click submit: {e}"),
	}
	tokio::time::sleep(MODAL_DELAY).await;
	match page.click_modal_confirm().await {
		Ok(true) => log!("Confirmed submission modal"),
		Ok(false) => {}
		Err(e) => tracing::warn!("Failed to look for submission modal: {e}"),
	}
}

async fn status<P: PortalPage>(page: &P, status: Status) {
	if let Err(e) = page.show_status(&status).await {
		tracing::warn!("Failed to update status overlay: {e}");
	}
}

/// Click submit, then confirm the layer modal if one shows up. Bounded by [`STEP_TIMEOUT`] past the modal delay;
/// a hung click is logged and counts like any other failed attempt.
async fn timed_attempt<P: PortalPage>(page: &P, n: u32) {
	if timeout(MODAL_DELAY + STEP_TIMEOUT, attempt(page, n)).await.is_err() {
		elog!("Submit attempt {} timed out", n + 1);
	}
}

async fn timed_probe<P: PortalPage, O: OutcomeProbe>(page: &P, probe: &O) -> Outcome {
	match timeout(STEP_TIMEOUT, probe.probe(page)).await {
		Ok(outcome) => outcome,
		Err(_) => {
			tracing::warn!("Outcome probe timed out after {STEP_TIMEOUT:?}");
			Outcome::Unknown
		}
	}
}

/// Submit, then check `check_interval` after each click, resubmitting on failure until success or `max_attempts`.
///
/// Every check waits out the full interval since its click, so a slow step pushes the schedule back instead of
/// bunching clicks together. Each step is bounded, so the loop ends within
/// `max_attempts * (check_interval + STEP_TIMEOUT)` plus the last modal delay.
pub async fn submit_with_retry<P: PortalPage, O: OutcomeProbe>(
	page: &P,
	probe: &O,
	policy: ConfirmationPolicy,
	tunables: &Tunables,
	monitor: &mut VisibilityMonitor,
) -> Result<SubmitOutcome> {
	if !page.submit_present().await? {
		elog!("Submit button not found");
		status(page, Status::new("❌ Error: submit button not found".to_string(), StatusColor::Red, false)).await;
		return Ok(SubmitOutcome::MissingSubmitControl);
	}

	policy.install(page).await?;

	let max = tunables.max_attempts.max(1);
	let mut state = RetryState::Attempting(0);
	let mut clicked_at = Instant::now();
	timed_attempt(page, 0).await;

	loop {
		sleep_until(clicked_at + tunables.check_interval).await;
		if let Err(e) = monitor.poll(page).await {
			tracing::warn!("Failed to read page visibility: {e}");
		}
		let outcome = timed_probe(page, probe).await;
		state = state.observe(outcome, max);
		tracing::info!("Submission check: {outcome:?} -> {state:?}");

		match state {
			RetryState::Succeeded { attempts } => {
				log!("Submission went through after {attempts} attempt(s)");
				return Ok(SubmitOutcome::Succeeded { attempts });
			}
			RetryState::Failed { attempts } => {
				elog!("Submission failed {attempts} times, giving up");
				status(
					page,
					Status::new("❌ Submission failed repeatedly!<br>Please click submit manually, or check the network.".to_string(), StatusColor::Red, true),
				)
				.await;
				return Ok(SubmitOutcome::ExhaustedRetries { attempts });
			}
			RetryState::Attempting(n) => {
				clicked_at = Instant::now();
				status(
					page,
					Status::new(
						format!("⚠️ Submission not accepted (dwell may not be over yet), retrying...<br>Retry: {n}/{max}"),
						StatusColor::Orange,
						false,
					),
				)
				.await;
				timed_attempt(page, n).await;
			}
		}
	}
}
