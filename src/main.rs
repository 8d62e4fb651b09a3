//! adswap: watch a live feed and replace ad breaks with alternate content

use std::path::{Path, PathBuf};
use std::sync::Arc;

use adswap::capture::{FrameSource, TestPatternSource};
use adswap::compose::Compositor;
use adswap::config::{Config, ContentKind, SinkKind, SourceKind};
use adswap::content::{AlternateContentSource, Pattern, PatternContent, SlideshowContent};
use adswap::control::LoggingController;
use adswap::detect::{Classifier, Detector, ScriptedClassifier, TensorShape};
use adswap::display::{FrameSink, NullSink};
use adswap::pipeline::{
    BasePipeline, DetectionPipeline, IntegratedPipeline, MetricsTelemetry, Pipeline, PipPipeline,
    StrategyExecutor,
};
use color_eyre::{eyre::eyre, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Scores replayed when no model is configured: ~3s of programme, ~5s of ads
fn demo_scores() -> Vec<f32> {
    let programme = std::iter::repeat(0.1).take(90);
    let ads = std::iter::repeat(0.92).take(150);
    programme.chain(ads).collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("adswap=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("adswap starting...");

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(path.as_deref())?;
    info!(
        "Output {} | strategy {:?}",
        config.pipeline.mode, config.strategy.strategy
    );

    let base = BasePipeline::new(
        config.pipeline.clone(),
        build_source(&config)?,
        build_sink(&config)?,
    )?;

    let detector = Detector::new(config.detector.clone(), build_classifier(&config)?)?;

    let pip = PipPipeline::new(
        DetectionPipeline::new(base, detector),
        Compositor::new(config.compositor.clone())?,
        build_content(&config)?,
    );
    let mut pipeline = IntegratedPipeline::new(
        pip,
        Box::new(LoggingController::new()),
        StrategyExecutor::new(config.strategy.clone())?,
    )
    .with_telemetry(Arc::new(MetricsTelemetry));

    pipeline.on_ad_start(|d| {
        info!(
            frame = d.frame_number,
            bucket = ?d.confidence_bucket(),
            "Ad break on screen"
        );
        Ok(())
    });

    let stop = pipeline.stop_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping");
                stop.stop();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    pipeline.initialize().await?;
    let run = pipeline.run().await;
    let closed = pipeline.close().await;

    let stats = pipeline.get_stats();
    let detection = pipeline.pip().detection().detection_stats().get();
    info!(
        "Displayed {} of {} frames ({} dropped, {:.1} fps); {} classified, {:.1}% ads, {:.2} ms avg inference",
        stats.frames_displayed,
        stats.frames_captured,
        stats.frames_dropped,
        stats.fps,
        detection.total_frames,
        detection.ad_ratio() * 100.0,
        detection.avg_inference_ms
    );

    run?;
    closed?;
    info!("adswap shutting down");
    Ok(())
}

fn build_source(config: &Config) -> Result<Box<dyn FrameSource>> {
    let capture = &config.capture;
    match capture.source {
        SourceKind::TestPattern => Ok(Box::new(
            TestPatternSource::new(capture.width, capture.height).with_fps(capture.fps),
        )),
        SourceKind::V4l2 => v4l2_source(config),
    }
}

#[cfg(feature = "v4l2")]
fn v4l2_source(config: &Config) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(adswap::capture::V4l2Source::new(
        config.capture.clone(),
    )))
}

#[cfg(not(feature = "v4l2"))]
fn v4l2_source(_: &Config) -> Result<Box<dyn FrameSource>> {
    Err(eyre!("V4L2 capture requested but built without the `v4l2` feature"))
}

fn build_sink(config: &Config) -> Result<Box<dyn FrameSink>> {
    let mode = config.pipeline.mode;
    match config.display.sink {
        SinkKind::Null => {
            let fps = if config.display.paced { mode.fps } else { 0 };
            Ok(Box::new(NullSink::new(mode.width, mode.height).paced(fps)))
        }
        SinkKind::Sdl2 => sdl2_sink(config),
    }
}

#[cfg(feature = "sdl2-display")]
fn sdl2_sink(config: &Config) -> Result<Box<dyn FrameSink>> {
    let mode = config.pipeline.mode;
    Ok(Box::new(adswap::display::Sdl2Sink::new(
        mode.width,
        mode.height,
        config.display.vsync,
    )))
}

#[cfg(not(feature = "sdl2-display"))]
fn sdl2_sink(_: &Config) -> Result<Box<dyn FrameSink>> {
    Err(eyre!("SDL2 output requested but built without the `sdl2-display` feature"))
}

fn build_classifier(config: &Config) -> Result<Box<dyn Classifier>> {
    let detector = &config.detector;
    let edge = detector.input_size as usize;
    let shape = TensorShape::image(edge, edge);
    match &detector.model_path {
        Some(path) => onnx_classifier(path, shape),
        None => {
            let scores = if detector.scripted_scores.is_empty() {
                demo_scores()
            } else {
                detector.scripted_scores.clone()
            };
            Ok(Box::new(
                ScriptedClassifier::new(scores).with_input_shape(shape).cycle(),
            ))
        }
    }
}

#[cfg(feature = "onnx")]
fn onnx_classifier(path: &Path, shape: TensorShape) -> Result<Box<dyn Classifier>> {
    Ok(Box::new(adswap::detect::OnnxClassifier::new(path, shape)))
}

#[cfg(not(feature = "onnx"))]
fn onnx_classifier(path: &Path, _: TensorShape) -> Result<Box<dyn Classifier>> {
    Err(eyre!(
        "detector.model_path is {} but built without the `onnx` feature",
        path.display()
    ))
}

fn build_content(config: &Config) -> Result<Box<dyn AlternateContentSource>> {
    let mode = config.pipeline.mode;
    let content = &config.content;
    let source: Box<dyn AlternateContentSource> = match content.kind {
        ContentKind::Pattern => Box::new(PatternContent::new(
            mode.width,
            mode.height,
            Pattern::ColorBars,
        )),
        ContentKind::Slideshow => {
            let dir = content
                .path
                .clone()
                .ok_or_else(|| eyre!("slideshow content needs content.path"))?;
            Box::new(SlideshowContent::new(
                dir,
                mode.width,
                mode.height,
                content.frames_per_slide,
            ))
        }
    };
    Ok(source)
}
