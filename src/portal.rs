//! The page surface the orchestrator drives.
//!
//! Everything timing-related talks to the evaluation page through [`PortalPage`], so the same code runs against
//! Chromium ([`crate::browser::ChromiumPortal`]) and against the in-memory fake used by the tests.

use color_eyre::Result;
use derive_new::new;
use serde::{Deserialize, Serialize};

/// Which collection a field belongs to
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum FieldKind {
	Score,
	Comment,
}

/// Stable reference to a form field, captured at snapshot time.
///
/// The Chromium side writes `tag` into a data attribute on the element the first time a snapshot sees it, and
/// never renumbers it, so later lookups survive re-renders and re-snapshots that keep the element itself. A tag that
/// no longer resolves means the form changed shape.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct FieldHandle {
	pub kind: FieldKind,
	/// Sequence number within its kind, assigned on first sight. Equals the DOM position until the form changes shape.
	pub ordinal: usize,
	pub tag: String,
}

impl FieldHandle {
	pub fn new(kind: FieldKind, ordinal: usize) -> Self {
		let prefix = match kind {
			FieldKind::Score => "score",
			FieldKind::Comment => "comment",
		};
		Self {
			kind,
			ordinal,
			tag: format!("{prefix}-{ordinal}"),
		}
	}
}

/// Editable score inputs and comment areas present when the snapshot was taken, both in DOM order
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct FormSnapshot {
	pub scores: Vec<FieldHandle>,
	pub comments: Vec<FieldHandle>,
}

/// Overlay text color
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusColor {
	Lime,
	Green,
	Yellow,
	Orange,
	Red,
}

impl StatusColor {
	pub fn css(&self) -> &'static str {
		match self {
			StatusColor::Lime => "lime",
			StatusColor::Green => "#00ff00",
			StatusColor::Yellow => "yellow",
			StatusColor::Orange => "orange",
			StatusColor::Red => "red",
		}
	}
}

/// One frame of the on-page status overlay
#[derive(Clone, Debug, Eq, PartialEq, new)]
pub struct Status {
	pub text: String,
	pub color: StatusColor,
	/// Red border, for states that need the user's attention
	pub blink: bool,
}

/// A row of the evaluation list table
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct EvaluationRow {
	/// Text of the last cell, the completion flag
	pub status: String,
	/// Whether the first cell holds the entry button
	pub has_button: bool,
}

/// Operations on the evaluation portal page.
///
/// Implementations never sleep; every delay is owned by the caller.
#[allow(async_fn_in_trait)]
pub trait PortalPage {
	async fn current_url(&self) -> Result<String>;
	async fn navigate(&self, url: &str) -> Result<()>;

	/// Whether the page is currently in the foreground
	async fn is_foreground(&self) -> Result<bool>;
	async fn set_title(&self, title: &str) -> Result<()>;

	/// Capture the currently editable, enabled, visible text inputs and all text areas, in DOM order.
	/// Fields seen by an earlier snapshot keep their handles; only new ones are tagged.
	async fn snapshot_form(&self) -> Result<FormSnapshot>;
	async fn read_value(&self, field: &FieldHandle) -> Result<String>;
	/// Write `value` as a user edit would: native setter, then `input`, `change` and `blur`
	async fn apply_value(&self, field: &FieldHandle, value: &str) -> Result<()>;

	/// Render the status overlay, creating it on first use
	async fn show_status(&self, status: &Status) -> Result<()>;
	async fn overlay_present(&self) -> Result<bool>;

	async fn submit_present(&self) -> Result<bool>;
	/// Returns false if the submit control was not found
	async fn click_submit(&self) -> Result<bool>;
	/// Click the confirm button of the layer modal, if one is open
	async fn click_modal_confirm(&self) -> Result<bool>;
	/// Accept every JS dialog for the rest of this page's lifetime
	async fn accept_dialogs(&self) -> Result<()>;

	async fn evaluation_rows(&self) -> Result<Vec<EvaluationRow>>;
	async fn click_row_entry(&self, row: usize) -> Result<bool>;

	async fn page_html(&self) -> Result<String>;
}
