use chromiumoxide::browser::{Browser, BrowserConfig};
use clap::Parser;
use color_eyre::{Result, eyre::eyre};
use eval_headless::{
	browser::ChromiumPortal,
	config::{AppConfig, SettingsFlags, Tunables},
	login,
	orchestrator::Orchestrator,
	runner::{SessionEnd, run_session},
	submit::{ConfirmationPolicy, OverlayUrlProbe, SubmitOutcome},
};
use futures::StreamExt;
use rand::{SeedableRng, rngs::StdRng};
use v_utils::{elog, log};
#[cfg(feature = "xdg")]
use v_utils::xdg_state_dir;

#[derive(Parser)]
#[command(name = "eval_headless")]
#[command(about = "Automated course evaluation on the university portal", long_about = None)]
struct Cli {
	/// Complete a single evaluation, then exit
	#[arg(long)]
	once: bool,
	#[command(flatten)]
	settings: SettingsFlags,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	let cli = Cli::parse();
	let mut config = AppConfig::try_build(cli.settings).map_err(|e| eyre!("Failed to load config: {e}"))?;
	if cli.once {
		config.max_evaluations = 1;
	}
	let session_id = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();

	log!("Starting evaluation session {session_id} (visible: {})", config.visible);

	// Configure browser based on visibility flag
	let browser_config = if config.visible {
		BrowserConfig::builder().with_head().build()
	} else {
		BrowserConfig::builder().build()
	}
	.map_err(|e| eyre!("Failed to build browser config: {}", e))?;

	let (mut browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| eyre!("Failed to launch browser: {}", e))?;

	// Spawn a task to handle browser events (suppress errors as they're mostly noise)
	let handle = tokio::spawn(async move {
		while let Some(_event) = handler.next().await {
			// Silently consume events to prevent the browser from hanging
		}
	});

	let page = browser.new_page("about:blank").await.map_err(|e| eyre!("Failed to create new page: {}", e))?;
	login::login_and_navigate(&page, &config).await?;
	let portal = ChromiumPortal::new(page);

	let policy = if config.auto_accept_dialogs { ConfirmationPolicy::AutoAccept } else { ConfirmationPolicy::LeaveToUser };
	let orchestrator = Orchestrator::new(Tunables::from_config(&config), OverlayUrlProbe::default(), policy);
	let mut rng = match config.seed {
		Some(seed) => StdRng::seed_from_u64(seed),
		None => StdRng::from_os_rng(),
	};

	#[cfg(feature = "xdg")]
	let snapshots = Some(xdg_state_dir!("persist_htmls").join(&session_id));
	#[cfg(not(feature = "xdg"))]
	let snapshots: Option<std::path::PathBuf> = None;

	let end = run_session(&portal, &config, &orchestrator, snapshots.as_deref(), &mut rng).await;

	let needs_user = match &end {
		Ok(SessionEnd::AllDone { completed }) => {
			log!("✓ All evaluations done ({completed} this session)");
			false
		}
		Ok(SessionEnd::LimitReached { completed }) => {
			log!("✓ Stopped after {completed} evaluation(s)");
			false
		}
		Ok(SessionEnd::Stopped { completed, outcome }) => {
			let reason = match outcome {
				SubmitOutcome::MissingSubmitControl => "submit button not found",
				_ => "submission never accepted",
			};
			elog!("Stopped after {completed} evaluation(s): {reason}");
			true
		}
		Err(e) => {
			elog!("Session failed: {e}");
			true
		}
	};

	// The page is left as-is so the user can finish by hand
	if needs_user && config.visible {
		log!("\nBrowser is visible. Press Ctrl+C to exit...");
		tokio::signal::ctrl_c().await?;
	}

	drop(portal);
	browser.close().await.map_err(|e| eyre!("Failed to close browser: {}", e))?;
	drop(browser);
	handle.abort();

	end.map(|_| ())
}
