//! Human-paced fill of the evaluation form.

use std::time::Duration;

use color_eyre::Result;
use rand::Rng;
use v_utils::log;

use crate::{config::Tunables, portal::PortalPage};

pub const FOREGROUND_DELAY_MS: (u64, u64) = (500, 1500);
pub const BACKGROUND_DELAY: Duration = Duration::from_millis(2000);
/// Pause between the last score and the comments
pub const COMMENT_PAUSE: Duration = Duration::from_millis(1000);

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FillReport {
	pub scores: usize,
	pub comments: usize,
}

/// Delay before the next score edit. Slower and fixed while nobody is watching.
pub fn field_delay<R: Rng>(foreground: bool, rng: &mut R) -> Duration {
	if foreground {
		let (lo, hi) = FOREGROUND_DELAY_MS;
		Duration::from_millis(rng.random_range(lo..=hi))
	} else {
		BACKGROUND_DELAY
	}
}

pub fn pick_comment<'a, R: Rng>(comments: &'a [String], rng: &mut R) -> Option<&'a str> {
	if comments.is_empty() {
		return None;
	}
	Some(comments[rng.random_range(0..comments.len())].as_str())
}

/// Fill every editable score input with the target score, one at a time, then give every comment area a canned comment.
///
/// Failed writes are not retried here; an error means the page itself went away.
pub async fn fill_form<P: PortalPage, R: Rng>(page: &P, tunables: &Tunables, rng: &mut R) -> Result<FillReport> {
	let snapshot = page.snapshot_form().await?;
	log!("Filling {} score field(s) and {} comment(s)", snapshot.scores.len(), snapshot.comments.len());

	let mut report = FillReport::default();
	for field in &snapshot.scores {
		let foreground = page.is_foreground().await?;
		tokio::time::sleep(field_delay(foreground, rng)).await;
		page.apply_value(field, &tunables.target_score).await?;
		report.scores += 1;
		tracing::debug!("Scored {} ({}/{})", field.tag, report.scores, snapshot.scores.len());
	}

	tokio::time::sleep(COMMENT_PAUSE).await;
	for field in &snapshot.comments {
		let Some(comment) = pick_comment(&tunables.comments, rng) else {
			break;
		};
		page.apply_value(field, comment).await?;
		report.comments += 1;
	}

	log!("Form filled: {} score(s), {} comment(s)", report.scores, report.comments);
	Ok(report)
}
