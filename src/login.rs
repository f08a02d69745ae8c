use chromiumoxide::Page;
use color_eyre::{Result, eyre::eyre};
use v_utils::log;

use crate::config::AppConfig;

/// URL fragments of the portal's single-sign-on pages
const LOGIN_URL_MARKERS: &[&str] = &["/cas/login", "authserver/login", "/login"];

pub fn is_login_url(url: &str) -> bool {
	LOGIN_URL_MARKERS.iter().any(|m| url.contains(m))
}

/// `url` without its query string
fn base(url: &str) -> &str {
	url.split('?').next().unwrap_or(url)
}

/// Log in if the list page redirected us to SSO, and make sure we end up on the list page.
pub async fn login_and_navigate(page: &Page, config: &AppConfig) -> Result<()> {
	let target_url = config.list_url.as_str();
	page.goto(target_url).await.map_err(|e| eyre!("Failed to navigate to {target_url}: {e}"))?;
	tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

	let current_url = page.url().await.ok().flatten().unwrap_or_default();
	if base(&current_url) == base(target_url) {
		log!("Already logged in, at evaluation list");
		return Ok(());
	}

	if is_login_url(&current_url) {
		log!("On login page, filling form...");
		fill_and_submit_login_form(page, config).await?;
		tokio::time::sleep(tokio::time::Duration::from_secs(3)).await;
	}

	// SSO often lands on the portal home instead of following the original redirect
	let current_url = page.url().await.ok().flatten().unwrap_or_default();
	if base(&current_url) != base(target_url) && !is_login_url(&current_url) {
		page.goto(target_url).await.map_err(|e| eyre!("Failed to navigate to {target_url}: {e}"))?;
		tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
	}

	let final_url = page.url().await.ok().flatten().unwrap_or_default();
	if base(&final_url) != base(target_url) {
		return Err(eyre!("Login failed: expected to be at {}, but at {}", target_url, final_url));
	}
	log!("Login successful, at evaluation list");

	Ok(())
}

/// Fill username/password and submit the login form
async fn fill_and_submit_login_form(page: &Page, config: &AppConfig) -> Result<()> {
	let quote = |s: &str| serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string());
	let fill_script = format!(
		r#"
		(function() {{
			const usernameField = document.querySelector('input[name="username"], input[id="username"]');
			const passwordField = document.querySelector('input[name="password"], input[id="password"], input[type="password"]');
			if (usernameField && passwordField) {{
				usernameField.value = {};
				passwordField.value = {};
				usernameField.dispatchEvent(new Event('input', {{ bubbles: true }}));
				passwordField.dispatchEvent(new Event('input', {{ bubbles: true }}));
				return true;
			}}
			return false;
		}})()
		"#,
		quote(&config.username),
		quote(&config.password)
	);
	let filled = page.evaluate(fill_script).await.map_err(|e| eyre!("Failed to fill login form: {}", e))?;
	if filled.value().and_then(|v| v.as_bool()) != Some(true) {
		return Err(eyre!("Login form not found on {}", page.url().await.ok().flatten().unwrap_or_default()));
	}

	// Submit
	let submit_script = r#"
		(function() {
			const submitButton = document.querySelector('button[type="submit"], input[type="submit"], #login_submit');
			if (submitButton) {
				submitButton.click();
				return true;
			}
			const form = document.querySelector('form');
			if (form) {
				form.submit();
				return true;
			}
			return false;
		})()
	"#;
	page.evaluate(submit_script).await.map_err(|e| eyre!("Failed to submit login form: {}", e))?;

	Ok(())
}
