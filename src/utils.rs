use std::time::{Duration, Instant};

/// Limits rendering to a target frame rate and reports the achieved rate.
pub struct FramePacer {
    frame_duration: Duration,
    last_frame: Option<Instant>,
    frame_count: u32,
    report_start: Instant,
    interval: Duration,
}

impl FramePacer {
    pub fn new(fps: u32, now: Instant) -> Self {
        Self {
            frame_duration: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            last_frame: None,
            frame_count: 0,
            report_start: now,
            interval: Duration::from_secs(1),
        }
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    /// Whether a new frame is due at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.last_frame
            .map(|last| now.duration_since(last) >= self.frame_duration)
            .unwrap_or(true)
    }

    /// Records a rendered frame.
    /// Returns Some(fps) if the reporting interval has passed, otherwise None.
    pub fn record(&mut self, now: Instant) -> Option<f32> {
        self.last_frame = Some(now);
        self.frame_count += 1;

        let elapsed = now.duration_since(self.report_start);
        if elapsed >= self.interval {
            let fps = self.frame_count as f32 / elapsed.as_secs_f32();
            self.frame_count = 0;
            self.report_start = now;
            Some(fps)
        } else {
            None
        }
    }
}

/// Playback time that can be paused and moved.
pub struct PlaybackClock {
    start: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
    /// Seconds added by seeking. May be negative.
    offset: f32,
}

impl PlaybackClock {
    pub fn new(now: Instant) -> Self {
        Self {
            start: now,
            paused_at: None,
            paused_total: Duration::ZERO,
            offset: 0.0,
        }
    }

    /// Seconds of unpaused time since the clock started, plus seeks.
    pub fn time(&self, now: Instant) -> f32 {
        (self.elapsed(now) + self.offset).max(0.0)
    }

    /// Moves playback by `delta` seconds, never before 0. Returns the new time.
    pub fn seek(&mut self, now: Instant, delta: f32) -> f32 {
        let target = (self.time(now) + delta).max(0.0);
        self.offset = target - self.elapsed(now);
        target
    }

    fn elapsed(&self, now: Instant) -> f32 {
        let end = self.paused_at.unwrap_or(now);
        end.duration_since(self.start)
            .saturating_sub(self.paused_total)
            .as_secs_f32()
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Pauses or resumes. Returns true if the clock is now paused.
    pub fn toggle(&mut self, now: Instant) -> bool {
        match self.paused_at.take() {
            Some(paused_at) => {
                self.paused_total += now.duration_since(paused_at);
                false
            }
            None => {
                self.paused_at = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_pacer_waits_for_the_frame_duration() {
        let t0 = Instant::now();
        let mut pacer = FramePacer::new(25, t0);
        assert!(pacer.is_due(t0));

        pacer.record(t0);
        assert!(!pacer.is_due(t0 + ms(20)));
        assert!(pacer.is_due(t0 + ms(40)));
    }

    #[test]
    fn test_pacer_reports_once_per_interval() {
        let t0 = Instant::now();
        let mut pacer = FramePacer::new(10, t0);
        for i in 1..10 {
            assert_eq!(pacer.record(t0 + ms(100 * i)), None);
        }
        let fps = pacer.record(t0 + ms(1000)).unwrap();
        assert!((fps - 10.0).abs() < 0.01);
        assert_eq!(pacer.record(t0 + ms(1100)), None);
    }

    #[test]
    fn test_clock_excludes_paused_time() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::new(t0);
        assert!(clock.toggle(t0 + ms(1000)));
        assert_eq!(clock.time(t0 + ms(5000)), 1.0);

        assert!(!clock.toggle(t0 + ms(3000)));
        assert_eq!(clock.time(t0 + ms(4000)), 2.0);
        assert!(!clock.is_paused());
    }

    #[test]
    fn test_seek_moves_time_and_stops_at_zero() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::new(t0);
        assert_eq!(clock.seek(t0 + ms(2000), 10.0), 12.0);
        assert_eq!(clock.time(t0 + ms(3000)), 13.0);

        assert_eq!(clock.seek(t0 + ms(3000), -20.0), 0.0);
        assert_eq!(clock.time(t0 + ms(4000)), 1.0);
    }

    #[test]
    fn test_seek_while_paused_keeps_the_clock_paused() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::new(t0);
        clock.toggle(t0 + ms(1000));
        assert_eq!(clock.seek(t0 + ms(2000), 10.0), 11.0);
        assert_eq!(clock.time(t0 + ms(9000)), 11.0);
        assert!(clock.is_paused());
    }
}
