//! [`PortalPage`] over a live Chromium tab.

use std::sync::Mutex;

use chromiumoxide::{
	Page,
	cdp::browser_protocol::page::{EventJavascriptDialogOpening, HandleJavaScriptDialogParams},
};
use color_eyre::{Result, eyre::eyre};
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use v_utils::log;

use crate::portal::{EvaluationRow, FieldHandle, FieldKind, FormSnapshot, PortalPage, Status};

pub const OVERLAY_ID: &str = "evh-status-box";
pub const FIELD_ATTR: &str = "data-evh-field";
pub const SUBMIT_SELECTOR: &str = "#buttonSubmit";
pub const MODAL_CONFIRM_SELECTOR: &str = ".layui-layer-btn0";
pub const LIST_TBODY_ID: &str = "jxpgtbody";

/// Editable, enabled, visible text inputs, in document order
const EDITABLE_INPUTS_JS: &str = r#"
	Array.from(document.querySelectorAll('input[type="text"]')).filter(i => {
		if (i.readOnly || i.disabled || i.style.display === 'none') return false;
		const style = window.getComputedStyle(i);
		return style.display !== 'none' && style.visibility !== 'hidden';
	})
"#;

pub struct ChromiumPortal {
	page: Page,
	dialog_listener: Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumPortal {
	pub fn new(page: Page) -> Self {
		Self {
			page,
			dialog_listener: Mutex::new(None),
		}
	}

	pub fn page(&self) -> &Page {
		&self.page
	}

	async fn eval(&self, script: String, what: &str) -> Result<Value> {
		let result = self.page.evaluate(script).await.map_err(|e| eyre!("Failed to {what}: {e}"))?;
		Ok(result.value().cloned().unwrap_or(Value::Null))
	}

	async fn eval_bool(&self, script: String, what: &str) -> Result<bool> {
		Ok(self.eval(script, what).await?.as_bool() == Some(true))
	}
}

impl Drop for ChromiumPortal {
	fn drop(&mut self) {
		if let Ok(mut guard) = self.dialog_listener.lock() {
			if let Some(handle) = guard.take() {
				handle.abort();
			}
		}
	}
}

/// Quote `s` as a JS string literal
fn js_str(s: &str) -> String {
	serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn field_selector(field: &FieldHandle) -> String {
	js_str(&format!("[{FIELD_ATTR}=\"{}\"]", field.tag))
}

/// Tag sequence numbers of the snapshotted fields, in DOM order
#[derive(serde::Deserialize)]
struct SnapshotTags {
	scores: Vec<usize>,
	comments: Vec<usize>,
}

impl PortalPage for ChromiumPortal {
	async fn current_url(&self) -> Result<String> {
		Ok(self.page.url().await.map_err(|e| eyre!("Failed to get current URL: {e}"))?.unwrap_or_default())
	}

	async fn navigate(&self, url: &str) -> Result<()> {
		self.page.goto(url).await.map_err(|e| eyre!("Failed to navigate to {url}: {e}"))?;
		Ok(())
	}

	async fn is_foreground(&self) -> Result<bool> {
		self.eval_bool("document.visibilityState === 'visible'".to_string(), "read page visibility").await
	}

	async fn set_title(&self, title: &str) -> Result<()> {
		self.eval(format!("document.title = {}", js_str(title)), "set page title").await?;
		Ok(())
	}

	/// Elements keep the tag they got on first sight; only new ones are numbered, so earlier handles stay valid.
	async fn snapshot_form(&self) -> Result<FormSnapshot> {
		let script = format!(
			r#"
			(function() {{
				const next = window.__evhNextTag = window.__evhNextTag || {{ score: 0, comment: 0 }};
				const tag = (el, kind) => {{
					const prefix = kind + '-';
					const existing = el.getAttribute('{FIELD_ATTR}');
					if (existing && existing.startsWith(prefix)) return Number(existing.slice(prefix.length));
					const n = next[kind]++;
					el.setAttribute('{FIELD_ATTR}', prefix + n);
					return n;
				}};
				const inputs = {EDITABLE_INPUTS_JS};
				const areas = Array.from(document.querySelectorAll('textarea'));
				return JSON.stringify({{
					scores: inputs.map(el => tag(el, 'score')),
					comments: areas.map(el => tag(el, 'comment')),
				}});
			}})()
			"#
		);
		let value = self.eval(script, "snapshot form").await?;
		let json_str = value.as_str().ok_or_else(|| eyre!("Failed to snapshot form: browser returned {value}"))?;
		let tags: SnapshotTags = serde_json::from_str(json_str).map_err(|e| eyre!("Failed to parse form snapshot: {e}"))?;

		Ok(FormSnapshot {
			scores: tags.scores.into_iter().map(|n| FieldHandle::new(FieldKind::Score, n)).collect(),
			comments: tags.comments.into_iter().map(|n| FieldHandle::new(FieldKind::Comment, n)).collect(),
		})
	}

	async fn read_value(&self, field: &FieldHandle) -> Result<String> {
		let script = format!(
			r#"
			(function() {{
				const el = document.querySelector({});
				return el ? el.value : null;
			}})()
			"#,
			field_selector(field)
		);
		match self.eval(script, "read field value").await? {
			Value::String(s) => Ok(s),
			_ => Err(eyre!("FormShapeChanged: field `{}` no longer present", field.tag)),
		}
	}

	async fn apply_value(&self, field: &FieldHandle, value: &str) -> Result<()> {
		// Frameworks that shadow `value` only notice writes through the prototype's own setter.
		let script = format!(
			r#"
			(function() {{
				const el = document.querySelector({});
				if (!el) return false;
				el.focus();
				const desc = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value');
				if (desc && desc.set) {{
					desc.set.call(el, {});
				}} else {{
					el.value = {};
				}}
				el.dispatchEvent(new Event('input', {{ bubbles: true }}));
				el.dispatchEvent(new Event('change', {{ bubbles: true }}));
				el.dispatchEvent(new Event('blur', {{ bubbles: true }}));
				return true;
			}})()
			"#,
			field_selector(field),
			js_str(value),
			js_str(value)
		);
		if !self.eval_bool(script, "write field value").await? {
			return Err(eyre!("FormShapeChanged: field `{}` no longer present", field.tag));
		}
		Ok(())
	}

	async fn show_status(&self, status: &Status) -> Result<()> {
		let script = format!(
			r#"
			(function() {{
				let box = document.getElementById('{OVERLAY_ID}');
				if (!box) {{
					box = document.createElement('div');
					box.id = '{OVERLAY_ID}';
					box.style.cssText = `
						position: fixed; top: 10px; right: 10px; z-index: 99999;
						padding: 12px 20px; background-color: rgba(0,0,0,0.85);
						color: white; border-radius: 8px; font-size: 14px;
						font-weight: bold; box-shadow: 0 4px 12px rgba(0,0,0,0.3);
						transition: all 0.3s; max-width: 300px; line-height: 1.5;
					`;
					document.body.appendChild(box);
				}}
				box.style.color = {};
				box.innerHTML = {};
				box.style.border = {};
				return true;
			}})()
			"#,
			js_str(status.color.css()),
			js_str(&status.text),
			js_str(if status.blink { "2px solid red" } else { "1px solid rgba(255,255,255,0.2)" })
		);
		self.eval(script, "render status overlay").await?;
		Ok(())
	}

	async fn overlay_present(&self) -> Result<bool> {
		self.eval_bool(format!("!!document.getElementById('{OVERLAY_ID}')"), "query status overlay").await
	}

	async fn submit_present(&self) -> Result<bool> {
		Ok(self.page.find_element(SUBMIT_SELECTOR).await.is_ok())
	}

	/// Native CDP click, so the portal sees real mouse events
	async fn click_submit(&self) -> Result<bool> {
		let Ok(button) = self.page.find_element(SUBMIT_SELECTOR).await else {
			return Ok(false);
		};
		button.click().await.map_err(|e| eyre!("Failed to click submit: {e}"))?;
		Ok(true)
	}

	async fn click_modal_confirm(&self) -> Result<bool> {
		let script = format!(
			r#"
			(function() {{
				const btn = document.querySelector('{MODAL_CONFIRM_SELECTOR}');
				if (btn) {{ btn.click(); return true; }}
				return false;
			}})()
			"#
		);
		self.eval_bool(script, "click modal confirmation").await
	}

	async fn accept_dialogs(&self) -> Result<()> {
		if self.dialog_listener.lock().map_err(|_| eyre!("Dialog listener lock poisoned"))?.is_some() {
			return Ok(());
		}

		let mut dialogs = self
			.page
			.event_listener::<EventJavascriptDialogOpening>()
			.await
			.map_err(|e| eyre!("Failed to listen for dialogs: {e}"))?;
		let page = self.page.clone();
		let listener = tokio::spawn(async move {
			while let Some(event) = dialogs.next().await {
				log!("Accepting {:?} dialog: {}", event.r#type, event.message);
				if let Err(e) = page.execute(HandleJavaScriptDialogParams::new(true)).await {
					tracing::warn!("Failed to accept dialog: {e}");
				}
			}
		});
		let mut guard = self.dialog_listener.lock().map_err(|_| eyre!("Dialog listener lock poisoned"))?;
		// Lost a race with another install; keep the first listener.
		if guard.is_some() {
			listener.abort();
		} else {
			*guard = Some(listener);
		}
		Ok(())
	}

	async fn evaluation_rows(&self) -> Result<Vec<EvaluationRow>> {
		let script = format!(
			r#"
			(function() {{
				const tbody = document.getElementById('{LIST_TBODY_ID}');
				if (!tbody) return JSON.stringify([]);
				const rows = Array.from(tbody.getElementsByTagName('tr'));
				return JSON.stringify(rows.map(row => {{
					const cells = row.getElementsByTagName('td');
					if (cells.length === 0) return {{ status: '', has_button: false }};
					return {{
						status: cells[cells.length - 1].innerText.trim(),
						has_button: !!cells[0].querySelector('button'),
					}};
				}}));
			}})()
			"#
		);
		let value = self.eval(script, "scan evaluation list").await?;
		let json_str = value.as_str().unwrap_or("[]");
		serde_json::from_str(json_str).map_err(|e| eyre!("Failed to parse evaluation rows: {e}"))
	}

	async fn click_row_entry(&self, row: usize) -> Result<bool> {
		let script = format!(
			r#"
			(function() {{
				const tbody = document.getElementById('{LIST_TBODY_ID}');
				if (!tbody) return false;
				const tr = tbody.getElementsByTagName('tr')[{row}];
				const btn = tr && tr.getElementsByTagName('td')[0]?.querySelector('button');
				if (btn) {{ btn.click(); return true; }}
				return false;
			}})()
			"#
		);
		self.eval_bool(script, "enter evaluation").await
	}

	async fn page_html(&self) -> Result<String> {
		let value = self.eval("document.documentElement.outerHTML".to_string(), "get page HTML").await?;
		Ok(value.as_str().unwrap_or("<html></html>").to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strings_are_quoted_for_js() {
		assert_eq!(js_str("a\"b\n"), r#""a\"b\n""#);
		assert_eq!(js_str("老师。"), "\"老师。\"");
	}

	#[test]
	fn field_selector_targets_tag_attribute() {
		let handle = FieldHandle::new(FieldKind::Comment, 2);
		assert_eq!(field_selector(&handle), r#""[data-evh-field=\"comment-2\"]""#);
	}
}
