use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::gesture::{Direction, GesturePattern};
use crate::spell::Rgb;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub gesture: GestureConfig,
    #[serde(default)]
    pub spells: SpellConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default)]
    pub illuminator: IlluminatorConfig,
    #[serde(default)]
    pub light: LightConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Falls back to defaults when the file is missing or malformed.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("config: {e:#}, using defaults");
                Self::default()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Key prefix, lets several lamps share one state server
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// `host:port` of a state server; in-process store when absent
    #[serde(default)]
    pub remote: Option<String>,
}

fn default_namespace() -> String { "potterlamp".to_string() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            remote: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Seconds without a cast before the session ends. Negative never times out.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    #[serde(default = "default_scene_secs")]
    pub scene_secs: f64,
    #[serde(default = "default_reseed_delay_secs")]
    pub reseed_delay_secs: f64,
    /// Point slots per scene (N)
    #[serde(default = "default_max_points")]
    pub max_points: usize,
    /// Slots fed to the gesture classifier each frame (K)
    #[serde(default = "default_max_gesture_points")]
    pub max_gesture_points: usize,
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    #[serde(default = "default_max_capture_failures")]
    pub max_capture_failures: u32,
    #[serde(default = "default_capture_backoff_ms")]
    pub capture_backoff_ms: u64,
    #[serde(default = "default_capture_backoff_max_ms")]
    pub capture_backoff_max_ms: u64,
    #[serde(default)]
    pub watch_on_start: bool,
}

fn default_timeout_secs() -> f64 { 600.0 }
fn default_scene_secs() -> f64 { 3.0 }
fn default_reseed_delay_secs() -> f64 { 3.0 }
fn default_max_points() -> usize { 20 }
fn default_max_gesture_points() -> usize { 15 }
fn default_frame_interval_ms() -> u64 { 33 }
fn default_max_capture_failures() -> u32 { 10 }
fn default_capture_backoff_ms() -> u64 { 50 }
fn default_capture_backoff_max_ms() -> u64 { 1000 }

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            scene_secs: default_scene_secs(),
            reseed_delay_secs: default_reseed_delay_secs(),
            max_points: default_max_points(),
            max_gesture_points: default_max_gesture_points(),
            frame_interval_ms: default_frame_interval_ms(),
            max_capture_failures: default_max_capture_failures(),
            capture_backoff_ms: default_capture_backoff_ms(),
            capture_backoff_max_ms: default_capture_backoff_max_ms(),
            watch_on_start: false,
        }
    }
}

impl SessionConfig {
    pub fn scene_length(&self) -> Duration {
        Duration::from_secs_f64(self.scene_secs.max(0.0))
    }

    pub fn reseed_delay(&self) -> Duration {
        Duration::from_secs_f64(self.reseed_delay_secs.max(0.0))
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Backoff after `failures` consecutive capture errors, doubling up to the cap.
    pub fn capture_backoff(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        let ms = self.capture_backoff_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(ms.min(self.capture_backoff_max_ms))
    }
}

// ---------------------------------------------------------------------------
// Gesture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GestureConfig {
    /// Minimum per-frame displacement (px) that counts as motion
    #[serde(default = "default_movement_threshold")]
    pub movement_threshold: f32,
    /// Dominant axis must exceed the other by this factor
    #[serde(default = "default_dominance_ratio")]
    pub dominance_ratio: f32,
    #[serde(default)]
    pub diagonals: bool,
    /// Max axis ratio still read as a diagonal
    #[serde(default = "default_diagonal_band")]
    pub diagonal_band: f32,
    /// Checked in order, first match wins
    #[serde(default = "default_patterns")]
    pub patterns: Vec<GesturePattern>,
}

fn default_movement_threshold() -> f32 { 5.0 }
fn default_dominance_ratio() -> f32 { 2.0 }
fn default_diagonal_band() -> f32 { 1.5 }

fn default_patterns() -> Vec<GesturePattern> {
    vec![
        GesturePattern::new(Direction::Right, Direction::Up, "lumos"),
        GesturePattern::new(Direction::Right, Direction::Down, "nox"),
        GesturePattern::new(Direction::Left, Direction::Down, "colovaria"),
        GesturePattern::new(Direction::Left, Direction::Up, "incendio"),
    ]
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            movement_threshold: default_movement_threshold(),
            dominance_ratio: default_dominance_ratio(),
            diagonals: false,
            diagonal_band: default_diagonal_band(),
            patterns: default_patterns(),
        }
    }
}

// ---------------------------------------------------------------------------
// Spells
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SpellConfig {
    /// Lumos hold after the ramp
    #[serde(default = "default_lumos_secs")]
    pub lumos_secs: f64,
    #[serde(default = "default_effect_secs")]
    pub incendio_secs: f64,
    #[serde(default = "default_effect_secs")]
    pub colovaria_secs: f64,
    #[serde(default = "default_ramp_secs")]
    pub ramp_secs: f64,
    #[serde(default = "default_ramp_steps")]
    pub ramp_steps: u32,
    #[serde(default = "default_nox_steps")]
    pub nox_steps: u32,
    #[serde(default = "default_nox_step_ms")]
    pub nox_step_ms: u64,
    #[serde(default = "default_flicker_interval_ms")]
    pub flicker_interval_ms: u64,
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,
    #[serde(default = "default_blend_steps")]
    pub blend_steps: u32,
    #[serde(default = "default_blend_step_ms")]
    pub blend_step_ms: u64,
    #[serde(default = "default_hold_poll_ms")]
    pub hold_poll_ms: u64,
    #[serde(default = "default_lumos_color")]
    pub lumos_color: Rgb,
}

fn default_lumos_secs() -> f64 { 180.0 }
fn default_effect_secs() -> f64 { 300.0 }
fn default_ramp_secs() -> f64 { 3.0 }
fn default_ramp_steps() -> u32 { 256 }
fn default_nox_steps() -> u32 { 64 }
fn default_nox_step_ms() -> u64 { 1 }
fn default_flicker_interval_ms() -> u64 { 100 }
fn default_cycle_interval_ms() -> u64 { 200 }
fn default_blend_steps() -> u32 { 10 }
fn default_blend_step_ms() -> u64 { 12 }
fn default_hold_poll_ms() -> u64 { 100 }
fn default_lumos_color() -> Rgb { Rgb::WHITE }

impl Default for SpellConfig {
    fn default() -> Self {
        Self {
            lumos_secs: default_lumos_secs(),
            incendio_secs: default_effect_secs(),
            colovaria_secs: default_effect_secs(),
            ramp_secs: default_ramp_secs(),
            ramp_steps: default_ramp_steps(),
            nox_steps: default_nox_steps(),
            nox_step_ms: default_nox_step_ms(),
            flicker_interval_ms: default_flicker_interval_ms(),
            cycle_interval_ms: default_cycle_interval_ms(),
            blend_steps: default_blend_steps(),
            blend_step_ms: default_blend_step_ms(),
            hold_poll_ms: default_hold_poll_ms(),
            lumos_color: default_lumos_color(),
        }
    }
}

impl SpellConfig {
    pub fn lumos_hold(&self) -> Duration {
        Duration::from_secs_f64(self.lumos_secs.max(0.0))
    }

    pub fn ramp_step(&self) -> Duration {
        Duration::from_secs_f64(self.ramp_secs.max(0.0) / self.ramp_steps.max(1) as f64)
    }
}

// ---------------------------------------------------------------------------
// Camera / debug / illuminator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub index: i32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Mirror horizontally so motion reads from the caster's side
    #[serde(default = "default_mirror")]
    pub mirror: bool,
    /// "cw90", "ccw90" or "180"
    #[serde(default)]
    pub rotate: Option<String>,
}

fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_mirror() -> bool { true }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: default_width(),
            height: default_height(),
            mirror: default_mirror(),
            rotate: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugConfig {
    /// Publish annotated frames to the `debug_image` key
    #[serde(default)]
    pub image: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IlluminatorConfig {
    /// BCM pin driving the infrared emitters
    #[serde(default = "default_pin")]
    pub pin: Option<u8>,
}

fn default_pin() -> Option<u8> { Some(17) }

impl Default for IlluminatorConfig {
    fn default() -> Self {
        Self { pin: default_pin() }
    }
}

/// WS2812 strip fed from an SPI bus. The data line goes to the bus's MOSI
/// pin (BCM 10 on bus 0).
#[derive(Debug, Clone, Deserialize)]
pub struct LightConfig {
    /// Pixels on the strip
    #[serde(default = "default_count")]
    pub count: usize,
    /// Unset: no strip attached
    #[serde(default = "default_spi_bus")]
    pub spi_bus: Option<u8>,
}

fn default_count() -> usize { 60 }
fn default_spi_bus() -> Option<u8> { Some(0) }

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            count: default_count(),
            spi_bus: default_spi_bus(),
        }
    }
}
