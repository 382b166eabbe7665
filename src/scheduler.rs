//! Decides, per render tick, whether a fetch pass and/or a placement pass is
//! due. Holds no timers of its own: every decision is made against the
//! `now` the caller passes in.

use crate::core::config::SchedulerConfig;
use instant::Instant;
use std::time::Duration;

/// What the engine should do this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameTick {
    pub fetch: bool,
    pub place: bool,
    /// Wall-clock time since the previous tick, zero on the first
    pub frame_dt: Duration,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    config: SchedulerConfig,
    fetch_due: Option<Instant>,
    fetch_now: bool,
    last_height: Option<f64>,
    last_placement: Option<Instant>,
    last_frame: Option<Instant>,
}

fn since(now: Instant, earlier: Instant) -> Duration {
    if now > earlier {
        now - earlier
    } else {
        Duration::ZERO
    }
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            fetch_due: None,
            fetch_now: false,
            last_height: None,
            last_placement: None,
            last_frame: None,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Restart the quiescence window; the fetch fires once the camera has
    /// been still for the debounce interval.
    pub fn camera_changed(&mut self, now: Instant) {
        self.fetch_due = Some(now + self.config.debounce());
    }

    /// Skip the debounce, e.g. on first show or when labels are re-enabled.
    pub fn request_fetch(&mut self) {
        self.fetch_now = true;
    }

    pub fn fetch_scheduled(&self) -> bool {
        self.fetch_now || self.fetch_due.is_some()
    }

    /// Compare the camera height with the one seen last tick. Drift beyond
    /// the threshold arms the debounce window if it is not already running,
    /// so continuous motion without discrete events still fetches.
    pub fn observe_height(&mut self, height: f64, now: Instant) -> bool {
        let drifted = match self.last_height {
            Some(last) => (height - last).abs() > self.config.idle_height_threshold_m,
            None => false,
        };
        self.last_height = Some(height);
        if drifted && self.fetch_due.is_none() {
            log::debug!("camera height drift to {:.0} m, scheduling fetch", height);
            self.fetch_due = Some(now + self.config.debounce());
        }
        drifted
    }

    /// Placement ran out of band (e.g. right after new tiles landed)
    pub fn placement_ran(&mut self, now: Instant) {
        self.last_placement = Some(now);
    }

    pub fn tick(&mut self, now: Instant, camera_height: f64) -> FrameTick {
        let frame_dt = self.last_frame.map_or(Duration::ZERO, |t| since(now, t));
        self.last_frame = Some(now);

        self.observe_height(camera_height, now);

        let debounced = self.fetch_due.map_or(false, |due| now >= due);
        let fetch = self.fetch_now || debounced;
        if fetch {
            self.fetch_now = false;
            self.fetch_due = None;
        }

        let throttle_elapsed = self
            .last_placement
            .map_or(true, |t| since(now, t) >= self.config.placement_interval());
        let place = fetch || throttle_elapsed;
        if place {
            self.last_placement = Some(now);
        }

        FrameTick {
            fetch,
            place,
            frame_dt,
        }
    }

    pub fn reset(&mut self) {
        self.fetch_due = None;
        self.fetch_now = false;
        self.last_height = None;
        self.last_placement = None;
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_camera_changes_are_debounced() {
        let mut s = Scheduler::default();
        let t0 = Instant::now();
        s.tick(t0, 1_000_000.0);

        s.camera_changed(t0);
        assert!(!s.tick(t0 + ms(50), 1_000_000.0).fetch);
        s.camera_changed(t0 + ms(60));
        assert!(!s.tick(t0 + ms(150), 1_000_000.0).fetch);
        assert!(s.tick(t0 + ms(180), 1_000_000.0).fetch);
        assert!(!s.tick(t0 + ms(400), 1_000_000.0).fetch);
    }

    #[test]
    fn test_height_drift_schedules_fetch() {
        let mut s = Scheduler::default();
        let t0 = Instant::now();
        s.tick(t0, 500_000.0);
        s.tick(t0 + ms(16), 500_000.5);
        assert!(!s.fetch_scheduled());

        s.tick(t0 + ms(32), 499_000.0);
        assert!(s.fetch_scheduled());
        // continuous drift does not postpone the pending fetch
        let mut fired = false;
        for i in 3..20u64 {
            fired |= s.tick(t0 + ms(16 * i), 499_000.0 - 100.0 * i as f64).fetch;
        }
        assert!(fired);
    }

    #[test]
    fn test_placement_is_throttled() {
        let mut s = Scheduler::default();
        let t0 = Instant::now();
        assert!(s.tick(t0, 1.0e6).place);
        assert!(!s.tick(t0 + ms(40), 1.0e6).place);
        assert!(!s.tick(t0 + ms(90), 1.0e6).place);
        assert!(s.tick(t0 + ms(100), 1.0e6).place);
    }

    #[test]
    fn test_frame_dt_measures_wall_clock() {
        let mut s = Scheduler::default();
        let t0 = Instant::now();
        assert_eq!(s.tick(t0, 1.0e6).frame_dt, Duration::ZERO);
        assert_eq!(s.tick(t0 + ms(33), 1.0e6).frame_dt, ms(33));
        assert_eq!(s.tick(t0 + ms(41), 1.0e6).frame_dt, ms(8));
    }

    #[test]
    fn test_requested_fetch_skips_debounce() {
        let mut s = Scheduler::default();
        let t0 = Instant::now();
        s.request_fetch();
        let tick = s.tick(t0, 1.0e6);
        assert!(tick.fetch && tick.place);
        assert!(!s.fetch_scheduled());
    }
}
