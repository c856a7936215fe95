//! Frame timing.
//!
//! The sheet is stiff, so a frame usually advances the simulation by a small
//! fixed *virtual* frame time rather than by the wall-clock time between
//! frames. [`Time`] tracks both and knows which one drives the model.
//!
//! # Example
//!
//! ```ignore
//! use trampoline::time::Time;
//!
//! let mut time = Time::new(Some(0.00004));
//!
//! // Once per frame:
//! let dt = time.update();
//!
//! println!("Simulated: {:.5}s", time.virtual_elapsed());
//! println!("FPS: {:.1}", time.fps());
//! ```

use std::time::{Duration, Instant};

/// Frame clock with an optional fixed virtual frame time.
#[derive(Debug)]
pub struct Time {
    last_frame: Instant,
    /// Wall-clock seconds since the last frame.
    real_delta: f32,
    /// Seconds the simulation advances this frame.
    delta: f32,
    /// Configured virtual frame time, kept while real time is active.
    frame_time: Option<f32>,
    use_virtual: bool,
    virtual_elapsed: f64,
    frame_count: u64,
    fps: f32,
    fps_frame_count: u64,
    fps_update_time: Instant,
    fps_update_interval: Duration,
    paused: bool,
}

impl Time {
    /// A clock advancing by `frame_time` per frame, or by real time if `None`.
    pub fn new(frame_time: Option<f32>) -> Self {
        let now = Instant::now();
        Self {
            last_frame: now,
            real_delta: 0.0,
            delta: 0.0,
            frame_time,
            use_virtual: frame_time.is_some(),
            virtual_elapsed: 0.0,
            frame_count: 0,
            fps: 0.0,
            fps_frame_count: 0,
            fps_update_time: now,
            fps_update_interval: Duration::from_millis(500),
            paused: false,
        }
    }

    /// Advances the clock. Call once per frame.
    ///
    /// Returns the simulation delta for this frame, zero while paused.
    pub fn update(&mut self) -> f32 {
        let now = Instant::now();
        self.real_delta = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.frame_count += 1;

        let fps_elapsed = now.duration_since(self.fps_update_time);
        if fps_elapsed >= self.fps_update_interval {
            let frames_since = self.frame_count - self.fps_frame_count;
            self.fps = frames_since as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = self.frame_count;
            self.fps_update_time = now;
        }

        self.delta = match (self.paused, self.virtual_frame_time()) {
            (true, _) => 0.0,
            (false, Some(frame_time)) => frame_time,
            (false, None) => self.real_delta,
        };
        self.virtual_elapsed += self.delta as f64;
        self.delta
    }

    /// Simulation seconds of the current frame.
    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta
    }

    /// Wall-clock seconds of the current frame.
    #[inline]
    pub fn real_delta(&self) -> f32 {
        self.real_delta
    }

    /// Simulated seconds since start or the last [`Time::reset_virtual`].
    #[inline]
    pub fn virtual_elapsed(&self) -> f64 {
        self.virtual_elapsed
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// The fixed frame time in effect, `None` when running on real time.
    pub fn virtual_frame_time(&self) -> Option<f32> {
        self.frame_time.filter(|_| self.use_virtual)
    }

    /// Changes the fixed frame time. `None` switches to real time.
    pub fn set_frame_time(&mut self, frame_time: Option<f32>) {
        self.frame_time = frame_time;
        self.use_virtual = frame_time.is_some();
    }

    /// Switches between the fixed frame time and real time.
    ///
    /// Without a configured frame time this stays on real time.
    pub fn toggle_virtual(&mut self) -> bool {
        self.use_virtual = !self.use_virtual && self.frame_time.is_some();
        log::info!(
            "Simulation time: {}",
            if self.use_virtual { "virtual" } else { "real" }
        );
        self.use_virtual
    }

    pub fn reset_virtual(&mut self) {
        self.virtual_elapsed = 0.0;
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new(None)
    }
}
