//! Parameter smoothing
//!
//! Every continuous control the render domain reads is a `SmoothedParam`.
//! A new target starts a linear ramp from the current value; the ramp length
//! is fixed in frames, so a change always lands in the same time regardless
//! of how far the value moves.

/// Linearly ramped parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
    ramp_frames: u32,
}

impl SmoothedParam {
    /// Create a parameter resting at `value` with no ramp configured
    pub fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
            step: 0.0,
            remaining: 0,
            ramp_frames: 0,
        }
    }

    /// Set how many frames a change takes; 0 makes changes immediate
    pub fn set_ramp_frames(&mut self, frames: usize) {
        self.ramp_frames = frames.min(u32::MAX as usize) as u32;
    }

    pub fn ramp_frames(&self) -> usize {
        self.ramp_frames as usize
    }

    /// Start a ramp towards `target`
    pub fn set_target(&mut self, target: f32) {
        if !target.is_finite() || target == self.target {
            return;
        }
        self.target = target;
        if self.ramp_frames == 0 {
            self.current = target;
            self.remaining = 0;
            self.step = 0.0;
        } else {
            self.remaining = self.ramp_frames;
            self.step = (target - self.current) / self.ramp_frames as f32;
        }
    }

    /// Jump to `value` without ramping
    pub fn snap(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.step = 0.0;
        self.remaining = 0;
    }

    /// Advance one frame and return the value for that frame
    #[inline]
    pub fn next_value(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.current = self.target;
            } else {
                self.current += self.step;
            }
        }
        self.current
    }

    /// Advance `frames` at once (used when a block is skipped)
    pub fn skip(&mut self, frames: usize) {
        if frames as u64 >= self.remaining as u64 {
            self.current = self.target;
            self.remaining = 0;
        } else {
            self.remaining -= frames as u32;
            self.current += self.step * frames as f32;
        }
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn is_smoothing(&self) -> bool {
        self.remaining > 0
    }
}

impl Default for SmoothedParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_immediate_without_ramp() {
        let mut p = SmoothedParam::new(0.0);
        p.set_target(1.0);
        assert_eq!(p.next_value(), 1.0);
        assert!(!p.is_smoothing());
    }

    #[test]
    fn test_linear_ramp_lands_exactly() {
        let mut p = SmoothedParam::new(0.0);
        p.set_ramp_frames(4);
        p.set_target(1.0);
        let values: Vec<f32> = (0..6).map(|_| p.next_value()).collect();
        assert_relative_eq!(values[0], 0.25);
        assert_relative_eq!(values[1], 0.5);
        assert_relative_eq!(values[2], 0.75);
        assert_eq!(values[3], 1.0);
        assert_eq!(values[5], 1.0);
    }

    #[test]
    fn test_retarget_mid_ramp_starts_from_current() {
        let mut p = SmoothedParam::new(0.0);
        p.set_ramp_frames(10);
        p.set_target(1.0);
        for _ in 0..5 {
            p.next_value();
        }
        p.set_target(0.0);
        let first = p.next_value();
        assert!(first < 0.5 && first > 0.4);
    }

    #[test]
    fn test_skip() {
        let mut p = SmoothedParam::new(0.0);
        p.set_ramp_frames(100);
        p.set_target(1.0);
        p.skip(50);
        assert_relative_eq!(p.current(), 0.5, epsilon = 1e-5);
        p.skip(1000);
        assert_eq!(p.current(), 1.0);
    }

    #[test]
    fn test_nan_target_ignored() {
        let mut p = SmoothedParam::new(0.3);
        p.set_target(f32::NAN);
        assert_eq!(p.target(), 0.3);
    }
}
