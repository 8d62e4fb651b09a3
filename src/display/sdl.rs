//! SDL2 window sink
//! SDL2 objects are not Send, so the window lives on its own thread and
//! frames reach it over a bounded flume channel.

use std::thread::JoinHandle;

use async_trait::async_trait;
use flume::{bounded, Receiver, Sender};
use sdl2::event::Event;
use sdl2::pixels::PixelFormatEnum;
use tracing::{error, info};

use super::sink::{check_dimensions, FrameSink};
use crate::capture::Frame;
use crate::error::DisplayError;

pub struct Sdl2Sink {
    width: u32,
    height: u32,
    vsync: bool,
    tx: Option<Sender<Frame>>,
    thread: Option<JoinHandle<()>>,
}

impl Sdl2Sink {
    pub fn new(width: u32, height: u32, vsync: bool) -> Self {
        Self {
            width,
            height,
            vsync,
            tx: None,
            thread: None,
        }
    }
}

fn window_loop(width: u32, height: u32, vsync: bool, rx: Receiver<Frame>) -> Result<(), String> {
    let sdl_context = sdl2::init()?;
    let video_subsystem = sdl_context.video()?;
    let window = video_subsystem
        .window("adswap", width, height)
        .position_centered()
        .build()
        .map_err(|e| e.to_string())?;

    let mut builder = window.into_canvas();
    if vsync {
        builder = builder.present_vsync();
    }
    let mut canvas = builder.build().map_err(|e| e.to_string())?;
    let texture_creator = canvas.texture_creator();
    let mut texture = texture_creator
        .create_texture_streaming(PixelFormatEnum::RGB24, width, height)
        .map_err(|e| e.to_string())?;
    let mut event_pump = sdl_context.event_pump()?;

    'running: loop {
        for event in event_pump.poll_iter() {
            if let Event::Quit { .. } = event {
                info!("Quit event received");
                break 'running;
            }
        }

        let Ok(frame) = rx.recv() else {
            break 'running;
        };
        texture
            .update(None, &frame.data, (width * 3) as usize)
            .map_err(|e| e.to_string())?;
        canvas.clear();
        canvas.copy(&texture, None, None)?;
        canvas.present();
    }

    Ok(())
}

#[async_trait]
impl FrameSink for Sdl2Sink {
    async fn initialize(&mut self) -> Result<(), DisplayError> {
        let (tx, rx) = bounded::<Frame>(2);
        let (width, height, vsync) = (self.width, self.height, self.vsync);

        let thread = std::thread::Builder::new()
            .name("sdl2-display".into())
            .spawn(move || {
                if let Err(e) = window_loop(width, height, vsync, rx) {
                    error!("SDL2 display failed: {}", e);
                }
            })
            .map_err(|e| DisplayError::Hardware(e.to_string()))?;

        self.tx = Some(tx);
        self.thread = Some(thread);
        Ok(())
    }

    async fn display_frame(&mut self, frame: Frame) -> Result<(), DisplayError> {
        check_dimensions(&frame, self.width, self.height)?;
        let tx = self.tx.as_ref().ok_or(DisplayError::NotInitialized)?;
        tx.send_async(frame)
            .await
            .map_err(|_| DisplayError::Hardware("display window closed".into()))
    }

    fn is_available(&self) -> bool {
        self.tx.is_some() && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    async fn close(&mut self) -> Result<(), DisplayError> {
        // Dropping the sender ends the window loop
        self.tx = None;
        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .map_err(|e| DisplayError::Hardware(e.to_string()))?
                .map_err(|_| DisplayError::Hardware("display thread panicked".into()))?;
        }
        Ok(())
    }
}
