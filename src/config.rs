use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gestures: GestureConfig,
    #[serde(default)]
    pub stabilizer: StabilizerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub pointer: PointerConfig,
    #[serde(default)]
    pub keyboard: KeyboardConfig,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
}

// ============================================================================
// Gesture Config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct GestureConfig {
    /// Pinch engage threshold in pixels. Assumes a ~640px frame; thresholds
    /// are not resolution-scaled.
    #[serde(default = "default_pinch_start")]
    pub pinch_start_px: f32,

    /// Pinch release threshold in pixels. Must sit above the start
    /// threshold; the gap is the hysteresis band.
    #[serde(default = "default_pinch_release")]
    pub pinch_release_px: f32,

    /// Frames below this detector confidence are skipped outright.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    /// A pinch shorter than this is sensor noise, not a click.
    #[serde(default = "default_click_noise_ms")]
    pub click_noise_ms: u64,

    /// A pinch held past this promotes to a drag session.
    #[serde(default = "default_drag_promote_ms")]
    pub drag_promote_ms: u64,

    /// Sustain time for the hold-to-trigger secondary click.
    #[serde(default = "default_hold_trigger_ms")]
    pub hold_trigger_ms: u64,

    /// Grace period the hold shape must be absent before it can fire again.
    #[serde(default = "default_hold_rearm_ms")]
    pub hold_rearm_ms: u64,

    /// Magnitude of one-shot scroll steps.
    #[serde(default = "default_scroll_step")]
    pub scroll_step: i32,

    /// Vertical movement below this (pixels) is ignored in scroll mode.
    #[serde(default = "default_scroll_deadzone")]
    pub scroll_deadzone_px: f32,

    /// Scroll-mode output per pixel of vertical movement.
    #[serde(default = "default_scroll_gain")]
    pub scroll_gain: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            pinch_start_px: default_pinch_start(),
            pinch_release_px: default_pinch_release(),
            min_confidence: default_min_confidence(),
            click_noise_ms: default_click_noise_ms(),
            drag_promote_ms: default_drag_promote_ms(),
            hold_trigger_ms: default_hold_trigger_ms(),
            hold_rearm_ms: default_hold_rearm_ms(),
            scroll_step: default_scroll_step(),
            scroll_deadzone_px: default_scroll_deadzone(),
            scroll_gain: default_scroll_gain(),
        }
    }
}

fn default_pinch_start() -> f32 {
    65.0
}
fn default_pinch_release() -> f32 {
    95.0
}
fn default_min_confidence() -> f32 {
    0.5
}
fn default_click_noise_ms() -> u64 {
    40
}
fn default_drag_promote_ms() -> u64 {
    300
}
fn default_hold_trigger_ms() -> u64 {
    400
}
fn default_hold_rearm_ms() -> u64 {
    250
}
fn default_scroll_step() -> i32 {
    40
}
fn default_scroll_deadzone() -> f32 {
    10.0
}
fn default_scroll_gain() -> f32 {
    4.0
}

// ============================================================================
// Stabilizer Config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct StabilizerConfig {
    /// Recent-history window for discrete gestures.
    #[serde(default = "default_window")]
    pub window: usize,

    /// How many of the last `window` samples must agree.
    #[serde(default = "default_quorum")]
    pub quorum: usize,

    /// Minimum interval between repeated discrete triggers of one gesture.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            quorum: default_quorum(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

fn default_window() -> usize {
    3
}
fn default_quorum() -> usize {
    2
}
fn default_cooldown_ms() -> u64 {
    300
}

// ============================================================================
// Dispatch Config
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Reject the newest action when the queue is full (default).
    #[default]
    Reject,
    /// Drop the oldest queued action to make room.
    DropOldest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            overflow: OverflowPolicy::default(),
        }
    }
}

fn default_queue_capacity() -> usize {
    64
}

// ============================================================================
// Controller Config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PointerConfig {
    /// Movement smoothing divisor; higher is smoother but laggier.
    #[serde(default = "default_smooth_factor")]
    pub smooth_factor: f32,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            smooth_factor: default_smooth_factor(),
        }
    }
}

fn default_smooth_factor() -> f32 {
    5.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyboardConfig {
    /// Text entry method: "direct" or "clipboard".
    #[serde(default = "default_input_method")]
    pub input_method: String,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            input_method: default_input_method(),
        }
    }
}

fn default_input_method() -> String {
    "direct".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShellConfig {
    /// Upper bound on any spawned command, enforced by the controller.
    #[serde(default = "default_shell_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_shell_timeout(),
            shell: default_shell(),
        }
    }
}

fn default_shell_timeout() -> u64 {
    10
}
fn default_shell() -> String {
    "/bin/sh".into()
}

// ============================================================================
// Profile Config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_profile_path")]
    pub path: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            path: default_profile_path(),
        }
    }
}

fn default_profile_path() -> String {
    "profiles/default.json".into()
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(Path::new("config.toml"))
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            fs::read_to_string(path)
                .ok()
                .and_then(|s| match toml::from_str(&s) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        eprintln!(
                            "[CONFIG] {} is invalid ({}), using defaults",
                            path.display(),
                            e
                        );
                        None
                    }
                })
                .unwrap_or_default()
        } else {
            Config::default()
        }
    }
}
