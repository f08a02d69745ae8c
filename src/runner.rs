//! Session loop: walk the evaluation list and complete each pending evaluation in turn.

use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use rand::Rng;
use tokio::{
	process::{Child, Command},
	time::Instant,
};
use v_utils::{elog, log};

use crate::{
	PageKind,
	config::AppConfig,
	orchestrator::Orchestrator,
	portal::{EvaluationRow, PortalPage, Status, StatusColor},
	submit::{OutcomeProbe, SubmitOutcome},
};

/// Completion flag of a row that still needs evaluating
pub const NOT_COMPLETED: &str = "否";
/// Settle time after landing on the list view
pub const LIST_ENTRY_DELAY: Duration = Duration::from_millis(2000);
pub const ROW_CLICK_DELAY: Duration = Duration::from_millis(1000);
const URL_POLL: Duration = Duration::from_millis(500);
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScanResult {
	Entered { row: usize },
	AllDone,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionEnd {
	/// No pending rows left
	AllDone { completed: u32 },
	/// An evaluation ended without a success signal
	Stopped { completed: u32, outcome: SubmitOutcome },
	LimitReached { completed: u32 },
}

/// Wrap `s` in single quotes for `sh`. An embedded `'` closes the quote, emits an escaped quote, and reopens.
fn shell_quote(s: &str) -> String {
	format!("'{}'", s.replace('\'', r"'\''"))
}

/// Start the configured stop hook with `message` as its last argument. The hook is not awaited.
fn run_stop_hook(config: &AppConfig, message: &str) -> Option<Child> {
	let hook = config.stop_hook.as_deref()?;
	log!("Running stop hook: {hook} {message:?}");
	match Command::new("sh").arg("-c").arg(format!("{hook} {}", shell_quote(message))).spawn() {
		Ok(child) => Some(child),
		Err(e) => {
			elog!("Failed to start stop hook: {e}");
			None
		}
	}
}

/// Rows that are pending and can be entered, in table order
pub fn pending_rows(rows: &[EvaluationRow]) -> impl Iterator<Item = usize> + '_ {
	rows.iter().enumerate().filter(|(_, r)| r.status == NOT_COMPLETED && r.has_button).map(|(i, _)| i)
}

async fn status<P: PortalPage>(page: &P, status: Status) {
	if let Err(e) = page.show_status(&status).await {
		tracing::warn!("Failed to update status overlay: {e}");
	}
}

/// Find the first pending evaluation and click into it. Rows whose button cannot be clicked are passed over.
pub async fn scan_and_enter<P: PortalPage>(page: &P) -> Result<ScanResult> {
	status(page, Status::new("Scanning for pending evaluations...".to_string(), StatusColor::Yellow, false)).await;
	let rows = page.evaluation_rows().await?;
	tracing::debug!("Evaluation list has {} row(s)", rows.len());

	for row in pending_rows(&rows) {
		status(page, Status::new(format!("Found a pending evaluation (row {}), entering...", row + 1), StatusColor::Green, false)).await;
		tokio::time::sleep(ROW_CLICK_DELAY).await;
		if page.click_row_entry(row).await? {
			log!("Entered evaluation in row {}", row + 1);
			return Ok(ScanResult::Entered { row });
		}
		tracing::warn!("Entry button of row {} went away, skipping", row + 1);
	}

	status(page, Status::new("🎉 All evaluations are complete.".to_string(), StatusColor::Green, false)).await;
	Ok(ScanResult::AllDone)
}

/// Wait for the page URL to move away from `from`. Returns false on timeout.
async fn wait_for_url_change<P: PortalPage>(page: &P, from: &str, timeout: Duration) -> Result<bool> {
	let deadline = Instant::now() + timeout;
	while Instant::now() < deadline {
		tokio::time::sleep(URL_POLL).await;
		if page.current_url().await? != from {
			// Wait a bit for page to fully load
			tokio::time::sleep(Duration::from_secs(1)).await;
			return Ok(true);
		}
	}
	Ok(false)
}

/// Complete pending evaluations until none are left, one fails, or `max_evaluations` is reached.
///
/// `snapshots`: where to dump the detail page's HTML when an evaluation fails.
pub async fn run_session<P: PortalPage, O: OutcomeProbe, R: Rng>(
	page: &P,
	config: &AppConfig,
	orchestrator: &Orchestrator<O>,
	snapshots: Option<&Path>,
	rng: &mut R,
) -> Result<SessionEnd> {
	let mut completed = 0;

	loop {
		if completed >= config.max_evaluations {
			log!("Reached max_evaluations ({}), stopping", config.max_evaluations);
			return Ok(SessionEnd::LimitReached { completed });
		}

		let url = page.current_url().await?;
		match PageKind::detect(&url) {
			PageKind::List => {
				tokio::time::sleep(LIST_ENTRY_DELAY).await;
				match scan_and_enter(page).await? {
					ScanResult::AllDone => {
						log!("All evaluations complete ({completed} done this session)");
						run_stop_hook(config, &format!("All evaluations complete ({completed} done)"));
						return Ok(SessionEnd::AllDone { completed });
					}
					ScanResult::Entered { .. } =>
						if !wait_for_url_change(page, &url, NAVIGATION_TIMEOUT).await? {
							bail!("Clicked into an evaluation, but the page never left {url}");
						},
				}
			}
			PageKind::Detail => {
				let report = orchestrator.run_detail_page(page, rng).await?;
				match report.submit {
					SubmitOutcome::Succeeded { .. } => {
						completed += 1;
						let now = page.current_url().await?;
						if PageKind::detect(&now) != PageKind::List {
							page.navigate(&config.list_url).await?;
						}
					}
					outcome => {
						if let Some(dir) = snapshots {
							if let Err(e) = save_page_html(page, dir).await {
								elog!("Failed to save page HTML: {e}");
							}
						}
						let msg = match outcome {
							SubmitOutcome::MissingSubmitControl => "Evaluation: submit button not found".to_string(),
							_ => format!("Evaluation: submission not accepted after {} attempts", orchestrator.tunables.max_attempts),
						};
						run_stop_hook(config, &msg);
						return Ok(SessionEnd::Stopped { completed, outcome });
					}
				}
			}
		}
	}
}

/// Save the current page's HTML to `dir` for debugging
/// Uses the page URL as the filename label
pub async fn save_page_html<P: PortalPage>(page: &P, dir: &Path) -> Result<PathBuf> {
	std::fs::create_dir_all(dir).map_err(|e| eyre!("Failed to create HTML dir: {}", e))?;

	let url = page.current_url().await.unwrap_or_default();
	let label = url.replace("https://", "").replace("http://", "");
	let html = page.page_html().await?;

	let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
	let safe_label: String = label.chars().map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect();

	let filepath = dir.join(format!("{}_{}.html", timestamp, safe_label));
	std::fs::write(&filepath, html).map_err(|e| eyre!("Failed to write HTML file: {}", e))?;

	log!("Saved page HTML to: {}", filepath.display());
	Ok(filepath)
}
