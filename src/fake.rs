//! In-memory [`PortalPage`] for tests. Records every edit, click and overlay frame with its virtual timestamp.

use std::{sync::Mutex, time::Duration};

use color_eyre::{Result, eyre::eyre};
use tokio::time::Instant;

use crate::portal::{EvaluationRow, FieldHandle, FieldKind, FormSnapshot, PortalPage, Status};

pub const LIST_URL: &str = "https://portal.test/student/teachingEvaluation/evaluation/index";
pub const DETAIL_URL: &str = "https://portal.test/student/teachingEvaluation/teachingEvaluation/evaluationPage?id=1";

#[derive(Clone, Debug)]
pub struct FakeField {
	pub value: String,
	pub editable: bool,
	/// Sequence number written by the first snapshot that saw this field
	pub tag: Option<usize>,
}

impl FakeField {
	pub fn blank() -> Self {
		Self {
			value: String::new(),
			editable: true,
			tag: None,
		}
	}
}

/// A structural edit the portal makes to the form on its own
#[derive(Clone, Copy, Debug)]
pub enum ShapeChange {
	/// New blank score input at this DOM position
	InsertScore(usize),
	RemoveScore(usize),
}

/// A value write as seen by the page
#[derive(Clone, Debug, PartialEq)]
pub struct Edit {
	pub tag: String,
	pub value: String,
	pub at: Duration,
}

#[derive(Debug)]
struct FakeState {
	started: Instant,
	url: String,
	/// `(from, foreground)` pairs; the last entry whose `from` has passed wins
	visibility: Vec<(Duration, bool)>,
	title: Option<String>,
	scores: Vec<FakeField>,
	comments: Vec<FakeField>,
	form_gone: bool,
	/// Applied lazily once their time has come
	reshapes: Vec<(Duration, ShapeChange)>,
	next_tag: [usize; 2],
	overlay: bool,
	statuses: Vec<(Duration, Status)>,
	submit_present: bool,
	submit_clicks: Vec<Duration>,
	succeed_after: Option<usize>,
	modal_on_submit: bool,
	modal_open: bool,
	modal_clicks: usize,
	dialog_installs: usize,
	probe_broken: bool,
	rows: Vec<EvaluationRow>,
	current_row: Option<usize>,
	row_clicks: Vec<usize>,
	navigations: Vec<String>,
	edits: Vec<Edit>,
	events: Vec<(String, &'static str)>,
}

pub struct FakePortal {
	state: Mutex<FakeState>,
}

impl FakePortal {
	fn with_url(url: &str) -> Self {
		Self {
			state: Mutex::new(FakeState {
				started: Instant::now(),
				url: url.to_string(),
				visibility: vec![(Duration::ZERO, true)],
				title: None,
				scores: Vec::new(),
				comments: Vec::new(),
				form_gone: false,
				reshapes: Vec::new(),
				next_tag: [0, 0],
				overlay: false,
				statuses: Vec::new(),
				submit_present: true,
				submit_clicks: Vec::new(),
				succeed_after: None,
				modal_on_submit: false,
				modal_open: false,
				modal_clicks: 0,
				dialog_installs: 0,
				probe_broken: false,
				rows: Vec::new(),
				current_row: None,
				row_clicks: Vec::new(),
				navigations: Vec::new(),
				edits: Vec::new(),
				events: Vec::new(),
			}),
		}
	}

	/// Detail page with blank score inputs and comment areas
	pub fn detail(scores: usize, comments: usize) -> Self {
		let page = Self::with_url(DETAIL_URL);
		{
			let mut s = page.lock();
			s.scores = vec![FakeField::blank(); scores];
			s.comments = vec![FakeField::blank(); comments];
		}
		page
	}

	/// List page whose rows carry the given completion flags
	pub fn list(statuses: &[&str]) -> Self {
		let page = Self::with_url(LIST_URL);
		page.lock().rows = statuses.iter().map(|s| EvaluationRow { status: s.to_string(), has_button: true }).collect();
		page
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
		let mut s = self.state.lock().unwrap();
		s.apply_due_reshapes();
		s
	}

	// Setup

	pub fn succeed_after(self, clicks: usize) -> Self {
		self.lock().succeed_after = Some(clicks);
		self
	}

	pub fn without_submit(self) -> Self {
		self.lock().submit_present = false;
		self
	}

	pub fn with_modal(self) -> Self {
		self.lock().modal_on_submit = true;
		self
	}

	pub fn with_broken_probe(self) -> Self {
		self.lock().probe_broken = true;
		self
	}

	pub fn with_scores(self, scores: Vec<FakeField>) -> Self {
		self.lock().scores = scores;
		self
	}

	pub fn with_comment_text(self, text: &str) -> Self {
		self.lock().comments = vec![FakeField {
			value: text.to_string(),
			..FakeField::blank()
		}];
		self
	}

	pub fn set_row_has_button(&self, row: usize, has_button: bool) {
		self.lock().rows[row].has_button = has_button;
	}

	pub fn set_foreground(&self, foreground: bool) {
		let mut s = self.lock();
		let now = s.started.elapsed();
		s.visibility.push((now, foreground));
	}

	/// Flip visibility at a virtual time offset from creation
	pub fn foreground_from(self, at: Duration, foreground: bool) -> Self {
		{
			let mut s = self.lock();
			s.visibility.push((at, foreground));
			s.visibility.sort_by_key(|(at, _)| *at);
		}
		self
	}

	pub fn remove_form(&self) {
		self.lock().form_gone = true;
	}

	/// Change the form's structure at a virtual time offset from creation
	pub fn reshape_at(self, at: Duration, change: ShapeChange) -> Self {
		self.lock().reshapes.push((at, change));
		self
	}

	// Inspection

	pub fn title(&self) -> Option<String> {
		self.lock().title.clone()
	}

	pub fn url(&self) -> String {
		self.lock().url.clone()
	}

	pub fn score_values(&self) -> Vec<String> {
		self.lock().scores.iter().map(|f| f.value.clone()).collect()
	}

	pub fn comment_values(&self) -> Vec<String> {
		self.lock().comments.iter().map(|f| f.value.clone()).collect()
	}

	pub fn edits(&self) -> Vec<Edit> {
		self.lock().edits.clone()
	}

	pub fn edits_of(&self, tag: &str) -> Vec<Edit> {
		self.lock().edits.iter().filter(|e| e.tag == tag).cloned().collect()
	}

	pub fn events(&self) -> Vec<(String, &'static str)> {
		self.lock().events.clone()
	}

	pub fn statuses(&self) -> Vec<Status> {
		self.lock().statuses.iter().map(|(_, s)| s.clone()).collect()
	}

	pub fn last_status(&self) -> Option<Status> {
		self.lock().statuses.last().map(|(_, s)| s.clone())
	}

	pub fn submit_clicks(&self) -> Vec<Duration> {
		self.lock().submit_clicks.clone()
	}

	pub fn modal_clicks(&self) -> usize {
		self.lock().modal_clicks
	}

	pub fn dialog_installs(&self) -> usize {
		self.lock().dialog_installs
	}

	pub fn rows(&self) -> Vec<EvaluationRow> {
		self.lock().rows.clone()
	}

	pub fn row_clicks(&self) -> Vec<usize> {
		self.lock().row_clicks.clone()
	}

	pub fn navigations(&self) -> Vec<String> {
		self.lock().navigations.clone()
	}

	pub fn elapsed(&self) -> Duration {
		self.lock().started.elapsed()
	}
}

impl FakeState {
	fn apply_due_reshapes(&mut self) {
		let now = self.started.elapsed();
		let (due, later): (Vec<_>, Vec<_>) = self.reshapes.drain(..).partition(|(at, _)| *at <= now);
		self.reshapes = later;
		for (_, change) in due {
			match change {
				ShapeChange::InsertScore(at) => self.scores.insert(at, FakeField::blank()),
				ShapeChange::RemoveScore(at) => {
					self.scores.remove(at);
				}
			}
		}
	}

	fn resolve(&mut self, field: &FieldHandle) -> Result<&mut FakeField> {
		if self.form_gone {
			return Err(eyre!("FormShapeChanged: field `{}` no longer present", field.tag));
		}
		let pool = match field.kind {
			FieldKind::Score => &mut self.scores,
			FieldKind::Comment => &mut self.comments,
		};
		pool.iter_mut()
			.find(|f| f.tag == Some(field.ordinal))
			.ok_or_else(|| eyre!("FormShapeChanged: field `{}` no longer present", field.tag))
	}

	/// Tag every untagged field of `kind` that passes `include`, then return all included fields' handles in DOM order
	fn tag_fields(&mut self, kind: FieldKind, include: impl Fn(&FakeField) -> bool) -> Vec<FieldHandle> {
		let (pool, next) = match kind {
			FieldKind::Score => (&mut self.scores, &mut self.next_tag[0]),
			FieldKind::Comment => (&mut self.comments, &mut self.next_tag[1]),
		};
		pool.iter_mut()
			.filter(|f| include(f))
			.map(|f| {
				let tag = *f.tag.get_or_insert_with(|| {
					*next += 1;
					*next - 1
				});
				FieldHandle::new(kind, tag)
			})
			.collect()
	}

	fn fresh_detail_page(&mut self) {
		self.url = DETAIL_URL.to_string();
		self.overlay = false;
		self.modal_open = false;
		self.scores = vec![FakeField::blank()];
		self.comments = vec![FakeField::blank()];
		self.next_tag = [0, 0];
	}
}

impl PortalPage for FakePortal {
	async fn current_url(&self) -> Result<String> {
		Ok(self.url())
	}

	async fn navigate(&self, url: &str) -> Result<()> {
		let mut s = self.lock();
		s.navigations.push(url.to_string());
		s.url = url.to_string();
		s.overlay = false;
		Ok(())
	}

	async fn is_foreground(&self) -> Result<bool> {
		let s = self.lock();
		let now = s.started.elapsed();
		Ok(s.visibility.iter().filter(|(from, _)| *from <= now).last().map(|(_, fg)| *fg).unwrap_or(true))
	}

	async fn set_title(&self, title: &str) -> Result<()> {
		self.lock().title = Some(title.to_string());
		Ok(())
	}

	async fn snapshot_form(&self) -> Result<FormSnapshot> {
		let mut s = self.lock();
		if s.form_gone {
			return Ok(FormSnapshot::default());
		}
		Ok(FormSnapshot {
			scores: s.tag_fields(FieldKind::Score, |f| f.editable),
			comments: s.tag_fields(FieldKind::Comment, |_| true),
		})
	}

	async fn read_value(&self, field: &FieldHandle) -> Result<String> {
		let mut s = self.lock();
		Ok(s.resolve(field)?.value.clone())
	}

	async fn apply_value(&self, field: &FieldHandle, value: &str) -> Result<()> {
		let mut s = self.lock();
		s.resolve(field)?.value = value.to_string();
		let at = s.started.elapsed();
		s.edits.push(Edit {
			tag: field.tag.clone(),
			value: value.to_string(),
			at,
		});
		for event in ["input", "change", "blur"] {
			s.events.push((field.tag.clone(), event));
		}
		Ok(())
	}

	async fn show_status(&self, status: &Status) -> Result<()> {
		let mut s = self.lock();
		s.overlay = true;
		let at = s.started.elapsed();
		s.statuses.push((at, status.clone()));
		Ok(())
	}

	async fn overlay_present(&self) -> Result<bool> {
		let s = self.lock();
		if s.probe_broken {
			return Err(eyre!("Failed to query overlay: target closed"));
		}
		Ok(s.overlay)
	}

	async fn submit_present(&self) -> Result<bool> {
		Ok(self.lock().submit_present)
	}

	async fn click_submit(&self) -> Result<bool> {
		let mut s = self.lock();
		if !s.submit_present {
			return Ok(false);
		}
		let at = s.started.elapsed();
		s.submit_clicks.push(at);
		if s.modal_on_submit {
			s.modal_open = true;
		}
		if s.succeed_after.is_some_and(|n| s.submit_clicks.len() >= n) {
			// The portal redirects back to the list, marking the row done.
			if let Some(row) = s.current_row.take() {
				s.rows[row].status = "是".to_string();
			}
			s.url = LIST_URL.to_string();
			s.overlay = false;
			s.modal_open = false;
		}
		Ok(true)
	}

	async fn click_modal_confirm(&self) -> Result<bool> {
		let mut s = self.lock();
		if !s.modal_open {
			return Ok(false);
		}
		s.modal_open = false;
		s.modal_clicks += 1;
		Ok(true)
	}

	async fn accept_dialogs(&self) -> Result<()> {
		self.lock().dialog_installs += 1;
		Ok(())
	}

	async fn evaluation_rows(&self) -> Result<Vec<EvaluationRow>> {
		Ok(self.rows())
	}

	async fn click_row_entry(&self, row: usize) -> Result<bool> {
		let mut s = self.lock();
		if !s.rows.get(row).is_some_and(|r| r.has_button) {
			return Ok(false);
		}
		s.row_clicks.push(row);
		s.current_row = Some(row);
		s.fresh_detail_page();
		Ok(true)
	}

	async fn page_html(&self) -> Result<String> {
		Ok(format!("<html><!-- {} --></html>", self.url()))
	}
}
