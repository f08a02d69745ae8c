pub mod browser;
pub mod config;
pub mod correction;
pub mod countdown;
pub mod fill;
pub mod login;
pub mod orchestrator;
pub mod portal;
pub mod runner;
pub mod submit;
pub mod visibility;

#[cfg(test)]
pub(crate) mod fake;

/// URL fragment of the evaluation list view
pub const LIST_URL_MARKER: &str = "evaluation/index";
/// URL fragment of an evaluation detail page
pub const DETAIL_URL_MARKER: &str = "evaluationPage";

/// Which half of the portal a URL belongs to
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PageKind {
	List,
	Detail,
}

impl PageKind {
	/// Anything that isn't the list view is treated as a detail page
	pub fn detect(url: &str) -> Self {
		if url.contains(LIST_URL_MARKER) { PageKind::List } else { PageKind::Detail }
	}
}
