//! Construction-time configuration
//!
//! Everything here is validated once, before any component touches a frame.
//! Sources are layered: built-in defaults, an optional TOML file, then
//! `ADSWAP__SECTION__KEY` environment variables.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::PixelFormat;
use crate::error::ConfigError;
use crate::pipeline::strategy::AdResponseStrategy;

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub display: DisplayConfig,
    pub pipeline: PipelineConfig,
    pub detector: DetectorConfig,
    pub compositor: CompositorConfig,
    pub content: ContentConfig,
    pub strategy: StrategyConfig,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("ADSWAP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capture.validate()?;
        self.pipeline.validate()?;
        self.detector.validate()?;
        self.compositor.validate()?;
        self.content.validate()?;
        self.strategy.validate()?;

        if self.capture.width != self.pipeline.mode.width
            || self.capture.height != self.pipeline.mode.height
        {
            return Err(ConfigError::invalid(format!(
                "capture {}x{} differs from output mode {}",
                self.capture.width, self.capture.height, self.pipeline.mode
            )));
        }
        if self.compositor.canvas_width != self.pipeline.mode.width
            || self.compositor.canvas_height != self.pipeline.mode.height
        {
            return Err(ConfigError::invalid(format!(
                "compositor canvas {}x{} differs from output mode {}",
                self.compositor.canvas_width, self.compositor.canvas_height, self.pipeline.mode
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    TestPattern,
    V4l2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: SourceKind,
    /// Device path; empty means auto-detect
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::TestPattern,
            device: "/dev/video0".into(),
            width: 1280,
            height: 720,
            fps: 30,
            format: PixelFormat::Mjpeg,
            buffer_count: 4,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 || self.fps == 0 {
            return Err(ConfigError::invalid("capture width, height and fps must be positive"));
        }
        if self.buffer_count == 0 {
            return Err(ConfigError::invalid("capture needs at least one buffer"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Null,
    Sdl2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub sink: SinkKind,
    /// Pace output to the mode's frame rate
    pub paced: bool,
    pub vsync: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Null,
            paced: true,
            vsync: true,
        }
    }
}

/// Output resolution and frame rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMode {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl VideoMode {
    pub const HD_30: VideoMode = VideoMode::new(1280, 720, 30);
    pub const FHD_30: VideoMode = VideoMode::new(1920, 1080, 30);
    pub const FHD_60: VideoMode = VideoMode::new(1920, 1080, 60);
    pub const UHD_30: VideoMode = VideoMode::new(3840, 2160, 30);

    pub const fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

impl fmt::Display for VideoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.fps)
    }
}

impl FromStr for VideoMode {
    type Err = ConfigError;

    /// Accepts presets such as `1080p60` or explicit `1920x1080@60`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ConfigError::invalid(format!("unrecognised video mode '{}'", s));

        if let Some((lines, fps)) = s.split_once('p') {
            let fps: u32 = fps.parse().map_err(|_| bad())?;
            let (width, height) = match lines {
                "720" => (1280, 720),
                "1080" => (1920, 1080),
                "1440" => (2560, 1440),
                "2160" => (3840, 2160),
                _ => return Err(bad()),
            };
            return Ok(VideoMode::new(width, height, fps));
        }

        let (size, fps) = s.split_once('@').ok_or_else(bad)?;
        let (w, h) = size.split_once('x').ok_or_else(bad)?;
        Ok(VideoMode::new(
            w.parse().map_err(|_| bad())?,
            h.parse().map_err(|_| bad())?,
            fps.parse().map_err(|_| bad())?,
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub mode: VideoMode,
    pub stats_enabled: bool,
    pub stats_interval_secs: u64,
    /// Per-frame capture-to-display budget
    pub max_latency_ms: u64,
    /// Run the classifier on every n-th frame
    pub detect_every_n: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: VideoMode::HD_30,
            stats_enabled: true,
            stats_interval_secs: 10,
            max_latency_ms: 50,
            detect_every_n: 1,
        }
    }
}

impl PipelineConfig {
    pub fn new(mode: VideoMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    pub fn max_latency(&self) -> Duration {
        Duration::from_millis(self.max_latency_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode.width == 0 || self.mode.height == 0 || self.mode.fps == 0 {
            return Err(ConfigError::invalid(format!(
                "output mode {} must have positive dimensions and rate",
                self.mode
            )));
        }
        if self.max_latency_ms == 0 {
            return Err(ConfigError::invalid("max_latency_ms must be positive"));
        }
        if self.detect_every_n == 0 {
            return Err(ConfigError::invalid("detect_every_n must be at least 1"));
        }
        if self.stats_enabled && self.stats_interval_secs == 0 {
            return Err(ConfigError::invalid("stats_interval_secs must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// ONNX model to classify with; without one the scripted scores are replayed
    pub model_path: Option<PathBuf>,
    /// Square input edge the model expects
    pub input_size: u32,
    /// Raw score at or above which a frame counts as an ad
    pub confidence_threshold: f32,
    /// Number of recent raw decisions considered
    pub temporal_window: usize,
    /// Share of the window that must agree before the state flips
    pub temporal_threshold: f32,
    /// Scores replayed by the scripted classifier when no model is configured
    pub scripted_scores: Vec<f32>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            input_size: 224,
            confidence_threshold: 0.5,
            temporal_window: 5,
            temporal_threshold: 0.6,
            scripted_scores: Vec::new(),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::invalid(format!(
                "confidence_threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if self.input_size == 0 {
            return Err(ConfigError::invalid("input_size must be positive"));
        }
        if self.temporal_window == 0 {
            return Err(ConfigError::invalid("temporal_window must be at least 1"));
        }
        if !(self.temporal_threshold > 0.0 && self.temporal_threshold <= 1.0) {
            return Err(ConfigError::invalid(format!(
                "temporal_threshold {} outside (0, 1]",
                self.temporal_threshold
            )));
        }
        Ok(())
    }
}

/// Where the inset sits on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsetPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
    Custom { x: u32, y: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsetConfig {
    pub position: InsetPosition,
    pub width: u32,
    pub height: u32,
    pub margin: u32,
    pub border_width: u32,
    pub border_color: [u8; 3],
    /// 1.0 overwrites, anything lower blends with what is underneath
    pub opacity: f32,
}

impl Default for InsetConfig {
    fn default() -> Self {
        Self {
            position: InsetPosition::BottomRight,
            width: 480,
            height: 270,
            margin: 20,
            border_width: 2,
            border_color: [255, 255, 255],
            opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    pub enabled: bool,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub inset: InsetConfig,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            canvas_width: 1280,
            canvas_height: 720,
            inset: InsetConfig {
                width: 320,
                height: 180,
                ..Default::default()
            },
        }
    }
}

impl CompositorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let inset = &self.inset;
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err(ConfigError::invalid("canvas dimensions must be positive"));
        }
        if inset.width == 0 || inset.height == 0 {
            return Err(ConfigError::invalid("inset dimensions must be positive"));
        }
        if !(0.0..=1.0).contains(&inset.opacity) {
            return Err(ConfigError::invalid(format!(
                "inset opacity {} outside [0, 1]",
                inset.opacity
            )));
        }

        let (need_w, need_h) = match inset.position {
            InsetPosition::Custom { x, y } => (x as u64 + inset.width as u64, y as u64 + inset.height as u64),
            InsetPosition::Center => (inset.width as u64, inset.height as u64),
            _ => (
                inset.width as u64 + 2 * inset.margin as u64,
                inset.height as u64 + 2 * inset.margin as u64,
            ),
        };
        if need_w > self.canvas_width as u64 || need_h > self.canvas_height as u64 {
            return Err(ConfigError::invalid(format!(
                "inset {}x{} at {:?} (margin {}) does not fit a {}x{} canvas",
                inset.width,
                inset.height,
                inset.position,
                inset.margin,
                self.canvas_width,
                self.canvas_height
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Pattern,
    Slideshow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub kind: ContentKind,
    /// Directory of still images for the slideshow
    pub path: Option<PathBuf>,
    /// Frames each slide stays on screen
    pub frames_per_slide: u32,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            kind: ContentKind::Pattern,
            path: None,
            frames_per_slide: 150,
        }
    }
}

impl ContentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kind == ContentKind::Slideshow && self.path.is_none() {
            return Err(ConfigError::invalid("slideshow content needs a path"));
        }
        if self.frames_per_slide == 0 {
            return Err(ConfigError::invalid("frames_per_slide must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub strategy: AdResponseStrategy,
    pub original_channel: Option<String>,
    pub alternate_channel: Option<String>,
    pub original_input: Option<String>,
    pub alternate_input: Option<String>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            strategy: AdResponseStrategy::PipOnly,
            original_channel: None,
            alternate_channel: None,
            original_input: None,
            alternate_input: None,
        }
    }
}

impl StrategyConfig {
    pub fn new(strategy: AdResponseStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    pub fn channel_change(original: impl Into<String>, alternate: impl Into<String>) -> Self {
        Self {
            strategy: AdResponseStrategy::ChannelChange,
            original_channel: Some(original.into()),
            alternate_channel: Some(alternate.into()),
            ..Default::default()
        }
    }

    pub fn input_switch(original: impl Into<String>, alternate: impl Into<String>) -> Self {
        Self {
            strategy: AdResponseStrategy::InputSwitch,
            original_input: Some(original.into()),
            alternate_input: Some(alternate.into()),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        match self.strategy {
            AdResponseStrategy::ChannelChange
                if !(present(&self.original_channel) && present(&self.alternate_channel)) =>
            {
                Err(ConfigError::invalid(
                    "channel_change needs both original_channel and alternate_channel",
                ))
            }
            AdResponseStrategy::InputSwitch
                if !(present(&self.original_input) && present(&self.alternate_input)) =>
            {
                Err(ConfigError::invalid(
                    "input_switch needs both original_input and alternate_input",
                ))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn parses_mode_presets() {
        assert_eq!("1080p60".parse::<VideoMode>().unwrap(), VideoMode::FHD_60);
        assert_eq!("720p30".parse::<VideoMode>().unwrap(), VideoMode::HD_30);
        assert_eq!(
            "640x480@25".parse::<VideoMode>().unwrap(),
            VideoMode::new(640, 480, 25)
        );
        assert!("480i".parse::<VideoMode>().is_err());
        assert!("1080p".parse::<VideoMode>().is_err());
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        let mut detector = DetectorConfig::default();
        detector.confidence_threshold = 1.2;
        assert!(detector.validate().is_err());

        let mut detector = DetectorConfig::default();
        detector.temporal_threshold = 0.0;
        assert!(detector.validate().is_err());

        let mut detector = DetectorConfig::default();
        detector.temporal_window = 0;
        assert!(detector.validate().is_err());

        let mut detector = DetectorConfig::default();
        detector.input_size = 0;
        assert!(detector.validate().is_err());
    }

    #[test]
    fn rejects_inset_larger_than_canvas() {
        let mut config = CompositorConfig::default();
        config.inset.width = 1270; // 1270 + 2*20 > 1280
        assert!(config.validate().is_err());

        let mut config = CompositorConfig::default();
        config.inset.position = InsetPosition::Custom { x: 1000, y: 0 };
        assert!(config.validate().is_err());

        let mut config = CompositorConfig::default();
        config.inset.opacity = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_sized_modes() {
        let config = PipelineConfig::new(VideoMode::new(0, 720, 30));
        assert!(config.validate().is_err());
    }

    #[test]
    fn channel_change_requires_both_channels() {
        let mut config = StrategyConfig::new(AdResponseStrategy::ChannelChange);
        config.alternate_channel = Some("5-2".into());
        assert!(config.validate().is_err());

        StrategyConfig::channel_change("5-1", "5-2").validate().unwrap();
        assert!(StrategyConfig::input_switch("", "hdmi2").validate().is_err());
    }

    #[test]
    fn canvas_must_match_output_mode() {
        let mut config = Config::default();
        config.pipeline.mode = VideoMode::FHD_30;
        config.capture.width = 1920;
        config.capture.height = 1080;
        assert!(config.validate().is_err());

        config.compositor.canvas_width = 1920;
        config.compositor.canvas_height = 1080;
        config.validate().unwrap();
    }

    #[test]
    fn capture_must_match_output_mode() {
        let mut config = Config::default();
        config.capture.width = 640;
        config.capture.height = 480;
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[capture]
width = 1920
height = 1080

[pipeline]
mode = {{ width = 1920, height = 1080, fps = 60 }}
max_latency_ms = 33

[compositor]
canvas_width = 1920
canvas_height = 1080

[compositor.inset]
position = "top_left"
width = 480
height = 270

[strategy]
strategy = "channel_change"
original_channel = "5-1"
alternate_channel = "5-2"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.pipeline.mode, VideoMode::FHD_60);
        assert_eq!(config.pipeline.max_latency_ms, 33);
        assert_eq!(config.compositor.inset.position, InsetPosition::TopLeft);
        assert_eq!(config.strategy.strategy, AdResponseStrategy::ChannelChange);
        assert_eq!(config.strategy.alternate_channel.as_deref(), Some("5-2"));
        // Untouched sections keep their defaults
        assert_eq!(config.detector.temporal_window, 5);
        assert_eq!(config.detector.input_size, 224);
    }
}
