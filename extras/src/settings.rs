//! Settings for the `wav_stream` tool.
//!
//! Layered lowest to highest: built-in defaults, an optional TOML file,
//! `PCMSTREAM_*` environment variables, then command-line arguments.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pcmstream_sdk::config::DEFAULT_MAX_BUFFER_SIZE;
use serde::{Deserialize, Serialize};

/// Shortest timer period handed to the runtime.
const MIN_PERIOD: Duration = Duration::from_micros(10);

/// Config file read from the working directory when `PCMSTREAM_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "wav_stream.toml";

pub const ENV_CONFIG: &str = "PCMSTREAM_CONFIG";
pub const ENV_CHUNK_BYTES: &str = "PCMSTREAM_CHUNK_BYTES";
pub const ENV_PREBUFFER: &str = "PCMSTREAM_PREBUFFER";
pub const ENV_TICK_FRAMES: &str = "PCMSTREAM_TICK_FRAMES";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Bytes handed to the stream per push.
    pub chunk_bytes: usize,
    /// Seconds that must accumulate past a starvation point before resuming.
    pub pre_buffer_seconds: f64,
    /// Frames rendered per mixer tick.
    pub tick_frames: usize,
    pub max_buffer_bytes: usize,
    /// Audio seconds fed per second of playback. Below 1.0 the player starves.
    pub feed_rate: f64,
    /// Wall-clock speedup of the whole run.
    pub speed: f64,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            chunk_bytes: 4096,
            pre_buffer_seconds: 0.5,
            tick_frames: 1024,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_SIZE,
            feed_rate: 1.0,
            speed: 1.0,
            input: None,
            output: None,
        }
    }
}

impl StreamSettings {
    /// Load every layer from the process environment and arguments.
    pub fn load(args: &[String]) -> Result<Self, String> {
        let path = std::env::var(ENV_CONFIG)
            .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from);

        let mut settings = if path.exists() {
            tracing::info!("Loading settings from {:?}", path);
            Self::from_file(&path)?
        } else {
            Self::default()
        };

        settings.apply_env(|key| std::env::var(key).ok());
        settings.apply_args(args)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let contents =
            fs::read_to_string(path).map_err(|e| format!("Failed to read settings: {}", e))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, String> {
        toml::from_str(contents).map_err(|e| format!("Failed to parse settings: {}", e))
    }

    /// Override fields from environment variables. Unparseable values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup(ENV_CHUNK_BYTES).and_then(|v| v.parse().ok()) {
            self.chunk_bytes = v;
        }
        if let Some(v) = lookup(ENV_PREBUFFER).and_then(|v| v.parse().ok()) {
            self.pre_buffer_seconds = v;
        }
        if let Some(v) = lookup(ENV_TICK_FRAMES).and_then(|v| v.parse().ok()) {
            self.tick_frames = v;
        }
    }

    /// Apply `<input.wav> [output.wav]`, excluding the program name.
    pub fn apply_args(&mut self, args: &[String]) -> Result<(), String> {
        match args {
            [] => {}
            [input] => self.input = Some(PathBuf::from(input)),
            [input, output] => {
                self.input = Some(PathBuf::from(input));
                self.output = Some(PathBuf::from(output));
            }
            _ => return Err("Usage: wav_stream <input.wav> [output.wav]".to_string()),
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_bytes == 0 {
            return Err("chunk_bytes must be positive".to_string());
        }
        if self.tick_frames == 0 {
            return Err("tick_frames must be positive".to_string());
        }
        if !(self.pre_buffer_seconds >= 0.0 && self.pre_buffer_seconds.is_finite()) {
            return Err(format!("invalid pre_buffer_seconds {}", self.pre_buffer_seconds));
        }
        if !(self.feed_rate > 0.0 && self.speed > 0.0) {
            return Err("feed_rate and speed must be positive".to_string());
        }
        if self.input.is_none() {
            return Err("Usage: wav_stream <input.wav> [output.wav]".to_string());
        }
        Ok(())
    }

    pub fn pre_buffer(&self) -> Duration {
        Duration::from_secs_f64(self.pre_buffer_seconds)
    }

    /// Output path, defaulting to `<input>.mix.wav`.
    pub fn output_path(&self) -> Option<PathBuf> {
        self.output.clone().or_else(|| {
            self.input
                .as_ref()
                .map(|input| input.with_extension("mix.wav"))
        })
    }

    /// Wall-clock period between mixer ticks.
    pub fn tick_period(&self, sample_rate: u32) -> Duration {
        Duration::from_secs_f64(self.tick_frames as f64 / f64::from(sample_rate) / self.speed)
            .max(MIN_PERIOD)
    }

    /// Wall-clock period between pushes of `chunk_bytes`.
    pub fn feed_period(&self, bytes_per_second: usize) -> Duration {
        let chunk_seconds = self.chunk_bytes as f64 / bytes_per_second.max(1) as f64;
        Duration::from_secs_f64(chunk_seconds / self.feed_rate / self.speed).max(MIN_PERIOD)
    }
}
