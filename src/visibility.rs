use color_eyre::Result;

use crate::portal::PortalPage;

pub const FOREGROUND_TITLE: &str = "自动评教中...";
pub const BACKGROUND_TITLE: &str = "⚠️请切回评教页面！";

/// A flip of page visibility between two polls
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transition {
	ToForeground,
	ToBackground,
}

/// Tracks page visibility across polls and retitles the tab on every flip.
#[derive(Debug, Default)]
pub struct VisibilityMonitor {
	last: Option<bool>,
}

impl VisibilityMonitor {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record an observation, returning the transition it implies (the first observation never is one)
	pub fn observe(&mut self, foreground: bool) -> Option<Transition> {
		let previous = self.last.replace(foreground);
		match previous {
			Some(was) if was != foreground => Some(if foreground { Transition::ToForeground } else { Transition::ToBackground }),
			_ => None,
		}
	}

	/// Read current visibility from the page. Returns true when in the foreground.
	pub async fn poll<P: PortalPage>(&mut self, page: &P) -> Result<bool> {
		let foreground = page.is_foreground().await?;
		if let Some(transition) = self.observe(foreground) {
			tracing::info!("Visibility transition: {transition:?}");
			let title = match transition {
				Transition::ToForeground => FOREGROUND_TITLE,
				Transition::ToBackground => BACKGROUND_TITLE,
			};
			if let Err(e) = page.set_title(title).await {
				tracing::warn!("Failed to retitle page: {e}");
			}
		}
		Ok(foreground)
	}
}
