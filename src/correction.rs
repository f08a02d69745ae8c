//! Midway delete-and-retype pass over the last score and the first comment.

use std::time::Duration;

use color_eyre::Result;

use crate::{config::Tunables, portal::PortalPage};

pub const SCORE_RETYPE_PAUSE: Duration = Duration::from_millis(500);
pub const COMMENT_RETYPE_PAUSE: Duration = Duration::from_millis(600);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CorrectionReport {
	/// Page was backgrounded at invocation; nothing touched
	Skipped,
	Performed { score: bool, comment: bool },
}

/// Text the comment ends up with: unchanged if it already ends with `mark`, otherwise with `mark` appended
pub fn restored_comment(original: &str, mark: char) -> String {
	if original.ends_with(mark) { original.to_string() } else { format!("{original}{mark}") }
}

/// `text` without its last character
pub fn drop_last_char(text: &str) -> &str {
	match text.char_indices().next_back() {
		Some((idx, _)) => &text[..idx],
		None => text,
	}
}

/// Clear and retype the last score, then trim and restore the first comment.
///
/// Only acts in the foreground. A skipped half (no such field, or an empty comment) is silent.
pub async fn perform_correction<P: PortalPage>(page: &P, tunables: &Tunables) -> Result<CorrectionReport> {
	if !page.is_foreground().await? {
		tracing::info!("Page in background, skipping midway correction");
		return Ok(CorrectionReport::Skipped);
	}

	let snapshot = page.snapshot_form().await?;

	let score = match snapshot.scores.last() {
		Some(last) => {
			page.apply_value(last, "").await?;
			tokio::time::sleep(SCORE_RETYPE_PAUSE).await;
			page.apply_value(last, &tunables.target_score).await?;
			true
		}
		None => false,
	};

	let comment = match snapshot.comments.first() {
		Some(first) => {
			let original = page.read_value(first).await?;
			if original.is_empty() {
				false
			} else {
				page.apply_value(first, drop_last_char(&original)).await?;
				tokio::time::sleep(COMMENT_RETYPE_PAUSE).await;
				page.apply_value(first, &restored_comment(&original, tunables.terminal_mark)).await?;
				true
			}
		}
		None => false,
	};

	tracing::info!("Midway correction done (score: {score}, comment: {comment})");
	Ok(CorrectionReport::Performed { score, comment })
}
