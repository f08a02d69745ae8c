use std::time::Duration;

use v_utils::macros::{MyConfigPrimitives, Settings};

/// Score written into every editable score input.
pub const TARGET_SCORE: &str = "10";
/// Dwell before the first submission. The portal rejects anything faster than ~60s.
pub const BASE_WAIT_SECONDS: u32 = 63;
/// Remaining-seconds value at which the midway correction fires.
pub const MIDWAY_AT_SECONDS: u32 = 30;
pub const MAX_SUBMIT_ATTEMPTS: u32 = 10;
pub const CHECK_INTERVAL: Duration = Duration::from_millis(5000);
/// Sentence-terminal mark the correction restores.
pub const TERMINAL_MARK: char = '。';

pub const COMMENTS: &[&str] = &[
	"老师教学认真，课堂气氛活跃，收获很大。",
	"课程内容充实，老师讲解清晰，非常满意。",
	"老师治学严谨，要求严格，能深入浅出地进行教学。",
	"教学内容丰富，理论联系实际，激发了我的学习兴趣。",
	"老师备课充分，讲解精辟，重点突出，善于调动课堂气氛。",
];

#[derive(Clone, Debug, Default, MyConfigPrimitives, Settings)]
pub struct AppConfig {
	pub username: String,
	pub password: String,
	/// Evaluation list page (the one with the `#jxpgtbody` table)
	pub list_url: String,
	/// Run with visible browser window (non-headless mode)
	#[serde(default)]
	pub visible: bool,
	/// Command to run on completion/error (receives message as argument)
	#[serde(default)]
	pub stop_hook: Option<String>,
	/// Accept every JS confirm/alert on the evaluation page (default: true)
	#[serde(default = "default_true")]
	pub auto_accept_dialogs: bool,
	/// Hold submission until the fill pass has finished, even if the dwell ran out (default: true)
	#[serde(default = "default_true")]
	pub gate_submit_on_fill: bool,
	/// Upper bound on evaluations handled in one session (default: 50)
	#[serde(default = "default_max_evaluations")]
	pub max_evaluations: u32,
	/// Fixed RNG seed, for reproducible pacing
	#[serde(default)]
	pub seed: Option<u64>,
}

fn default_true() -> bool {
	true
}

fn default_max_evaluations() -> u32 {
	50
}

/// Whether the dwell expiry waits for the fill pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FillGate {
	AwaitFill,
	/// Submit at expiry even if fields are still being filled; the fill keeps running alongside.
	SubmitAnyway,
}

/// Build-time knobs of a detail-page run. Not read from the config file.
#[derive(Clone, Debug)]
pub struct Tunables {
	pub target_score: String,
	pub base_wait_seconds: u32,
	pub midway_at_seconds: u32,
	pub comments: Vec<String>,
	pub terminal_mark: char,
	pub max_attempts: u32,
	pub check_interval: Duration,
	pub fill_gate: FillGate,
}

impl Default for Tunables {
	fn default() -> Self {
		Self {
			target_score: TARGET_SCORE.to_string(),
			base_wait_seconds: BASE_WAIT_SECONDS,
			midway_at_seconds: MIDWAY_AT_SECONDS,
			comments: COMMENTS.iter().map(|s| s.to_string()).collect(),
			terminal_mark: TERMINAL_MARK,
			max_attempts: MAX_SUBMIT_ATTEMPTS,
			check_interval: CHECK_INTERVAL,
			fill_gate: FillGate::AwaitFill,
		}
	}
}

impl Tunables {
	/// Defaults, with the runtime switches from `config` applied
	pub fn from_config(config: &AppConfig) -> Self {
		Self {
			fill_gate: if config.gate_submit_on_fill { FillGate::AwaitFill } else { FillGate::SubmitAnyway },
			..Self::default()
		}
	}
}
