//! Hardware audio through `cpal`
//!
//! Only built with the `device` feature. The output driver moves the
//! `Renderer` into the stream callback; the input capture hands interleaved
//! microphone blocks to a sink closure (normally the recorder's input port).

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{info, warn};

use crate::engine::driver::OutputDriver;
use crate::engine::renderer::Renderer;
use crate::engine::telemetry::Telemetry;
use crate::error::{FourTrackError, Result};

fn unavailable(reason: impl Into<String>) -> FourTrackError {
    FourTrackError::EngineUnavailable {
        reason: reason.into(),
    }
}

// ============================================================================
// Output
// ============================================================================

/// Default output device of the default host
pub struct CpalOutputDriver {
    device: cpal::Device,
    config: cpal::StreamConfig,
    name: String,
    stream: Option<cpal::Stream>,
    route: Option<Arc<Telemetry>>,
}

impl CpalOutputDriver {
    pub fn open_default() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| unavailable("no audio output device found"))?;
        let config = device
            .default_output_config()
            .map_err(|e| unavailable(format!("failed to get output config: {}", e)))?;
        let name = device.name().unwrap_or_else(|_| "output".to_string());
        info!(device = %name, sample_rate = config.sample_rate().0, channels = config.channels(), "Output device selected");
        Ok(Self {
            device,
            config: config.into(),
            name,
            stream: None,
            route: None,
        })
    }
}

impl OutputDriver for CpalOutputDriver {
    fn open(&mut self, mut renderer: Renderer) -> Result<()> {
        if self.stream.is_some() {
            return Err(unavailable("output route already open"));
        }
        let channels = self.config.channels as usize;
        let telemetry = renderer.telemetry().clone();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    renderer.render_interleaved(data, channels);
                    for sample in data.iter_mut() {
                        *sample = sample.clamp(-1.0, 1.0);
                    }
                },
                |err| warn!(error = %err, "Output stream error"),
                None,
            )
            .map_err(|e| unavailable(format!("failed to build output stream: {}", e)))?;
        stream
            .play()
            .map_err(|e| unavailable(format!("failed to start output stream: {}", e)))?;

        telemetry.set_route_active(true);
        self.route = Some(telemetry);
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the stream joins the callback
        self.stream = None;
        if let Some(telemetry) = self.route.take() {
            telemetry.set_route_active(false);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn sample_rate(&self) -> Option<u32> {
        Some(self.config.sample_rate.0)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Input
// ============================================================================

/// Running microphone stream; capture stops when dropped
pub struct CpalInputCapture {
    _stream: cpal::Stream,
    channels: usize,
}

impl CpalInputCapture {
    /// Open the default input at `sample_rate`
    ///
    /// `sink` receives interleaved blocks and the channel count. The device
    /// must support the engine rate; takes are never resampled.
    pub fn open<F>(sample_rate: u32, mut sink: F) -> Result<Self>
    where
        F: FnMut(&[f32], usize) + Send + 'static,
    {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| unavailable("no audio input device found"))?;
        let supported = device
            .supported_input_configs()
            .map_err(|e| unavailable(format!("failed to query input configs: {}", e)))?
            .filter(|range| range.sample_format() == cpal::SampleFormat::F32)
            .find(|range| {
                range.min_sample_rate().0 <= sample_rate && sample_rate <= range.max_sample_rate().0
            })
            .ok_or_else(|| unavailable(format!("input device cannot run at {} Hz", sample_rate)))?
            .with_sample_rate(cpal::SampleRate(sample_rate));

        let config: cpal::StreamConfig = supported.into();
        let channels = config.channels as usize;
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| sink(data, channels),
                |err| warn!(error = %err, "Input stream error"),
                None,
            )
            .map_err(|e| unavailable(format!("failed to build input stream: {}", e)))?;
        stream
            .play()
            .map_err(|e| unavailable(format!("failed to start input stream: {}", e)))?;

        info!(sample_rate, channels, "Input capture started");
        Ok(Self {
            _stream: stream,
            channels,
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}
