//! Output drivers
//!
//! A driver owns the route between a `Renderer` and whatever consumes its
//! output. `ManualDriver` hands rendering to a `ManualClock` that any thread
//! can pull from; it is what tests and headless hosts use. The `device`
//! feature adds a `cpal` driver.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::renderer::Renderer;
use crate::error::{FourTrackError, Result};

/// Route between the render domain and an output
///
/// Drivers are owned by the control domain and are not required to be
/// `Send`; device streams usually are not.
pub trait OutputDriver {
    /// Hand the renderer to the output and start pulling audio
    ///
    /// A driver that is already open refuses a second route.
    fn open(&mut self, renderer: Renderer) -> Result<()>;

    /// Stop pulling audio and release the renderer
    ///
    /// Returns once the output no longer references the renderer.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Rate the output runs at, if the driver dictates one
    fn sample_rate(&self) -> Option<u32>;

    fn name(&self) -> &str;
}

type SharedRenderer = Arc<Mutex<Option<Renderer>>>;

// ============================================================================
// Manual driver
// ============================================================================

/// Driver whose output is pulled explicitly through a `ManualClock`
pub struct ManualDriver {
    slot: SharedRenderer,
    sample_rate: Option<u32>,
}

impl ManualDriver {
    /// Driver that adopts the engine's configured sample rate
    pub fn new() -> (Self, ManualClock) {
        Self::build(None)
    }

    /// Driver that reports a fixed output rate, like a device would
    pub fn with_sample_rate(sample_rate: u32) -> (Self, ManualClock) {
        Self::build(Some(sample_rate))
    }

    fn build(sample_rate: Option<u32>) -> (Self, ManualClock) {
        let slot: SharedRenderer = Arc::new(Mutex::new(None));
        let clock = ManualClock {
            slot: slot.clone(),
            left: Vec::new(),
            right: Vec::new(),
        };
        (Self { slot, sample_rate }, clock)
    }
}

impl OutputDriver for ManualDriver {
    fn open(&mut self, renderer: Renderer) -> Result<()> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(FourTrackError::EngineUnavailable {
                reason: "output route already open".to_string(),
            });
        }
        renderer.telemetry().set_route_active(true);
        *slot = Some(renderer);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(renderer) = self.slot.lock().take() {
            renderer.telemetry().set_route_active(false);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.slot.lock().is_some()
    }

    fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    fn name(&self) -> &str {
        "manual"
    }
}

/// Pull side of a `ManualDriver`
///
/// Pulling while the route is closed yields silence and renders nothing,
/// like a suspended device.
pub struct ManualClock {
    slot: SharedRenderer,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl ManualClock {
    /// Render `frames` frames and discard them; returns frames rendered
    pub fn pull(&mut self, frames: usize) -> usize {
        self.left.resize(frames, 0.0);
        self.right.resize(frames, 0.0);
        match self.slot.lock().as_mut() {
            Some(renderer) => {
                renderer.render(&mut self.left, &mut self.right);
                frames
            }
            None => 0,
        }
    }

    /// Render into caller buffers; returns frames rendered
    pub fn pull_into(&mut self, left: &mut [f32], right: &mut [f32]) -> usize {
        match self.slot.lock().as_mut() {
            Some(renderer) => {
                renderer.render(left, right);
                left.len().min(right.len())
            }
            None => {
                left.fill(0.0);
                right.fill(0.0);
                0
            }
        }
    }

    /// Render `frames` frames in blocks of `block`
    pub fn run(&mut self, frames: usize, block: usize) -> usize {
        let block = block.max(1);
        let mut done = 0;
        while done < frames {
            let len = (frames - done).min(block);
            if self.pull(len) == 0 {
                break;
            }
            done += len;
        }
        done
    }

    /// Left and right output of the last `pull`
    pub fn last_output(&self) -> (&[f32], &[f32]) {
        (&self.left, &self.right)
    }

    pub fn is_connected(&self) -> bool {
        self.slot.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_open_is_refused() {
        let (mut driver, _clock) = ManualDriver::new();
        driver.open(Renderer::offline(1000, 64, 0)).unwrap();
        let err = driver.open(Renderer::offline(1000, 64, 0)).unwrap_err();
        assert_eq!(err.error_code(), "ENGINE_UNAVAILABLE");
        assert!(driver.is_open());
    }

    #[test]
    fn test_closed_clock_renders_nothing() {
        let (mut driver, mut clock) = ManualDriver::new();
        assert_eq!(clock.pull(64), 0);

        let renderer = Renderer::offline(1000, 64, 0);
        let telemetry = renderer.telemetry().clone();
        driver.open(renderer).unwrap();
        assert!(telemetry.route_active());
        assert_eq!(clock.run(200, 64), 200);
        assert_eq!(telemetry.snapshot().frames_rendered, 200);

        driver.close().unwrap();
        driver.close().unwrap();
        assert!(!telemetry.route_active());
        assert!(!clock.is_connected());
        assert_eq!(clock.pull(64), 0);
    }
}
