/// Tracks how long the vehicle has been continuously below a crawl-speed threshold. The streak
/// carries over from tick to tick and ends as soon as one sample is at or above the threshold.
#[derive(Debug, Clone)]
pub struct LowSpeedTimer {
    threshold: f32,
    streak_start: Option<u32>,
}

impl LowSpeedTimer {
    pub fn new(threshold: f32) -> Self {
        LowSpeedTimer {
            threshold,
            streak_start: None,
        }
    }

    pub fn update(&mut self, now: u32, speed: f32) {
        if speed < self.threshold {
            self.streak_start.get_or_insert(now);
        } else {
            self.streak_start = None;
        }
    }

    /// Whether the current streak is strictly longer than `limit` seconds. A streak of exactly
    /// `limit` seconds does not count as stuck.
    pub fn is_stuck(&self, now: u32, limit: u32) -> bool {
        self.streak_start
            .map_or(false, |start| now.saturating_sub(start) > limit)
    }

    pub fn reset(&mut self) {
        self.streak_start = None;
    }
}

#[cfg(test)]
mod tests {
    use super::LowSpeedTimer;

    #[test]
    fn streak_of_exactly_the_limit_does_not_trigger() {
        let mut timer = LowSpeedTimer::new(1.39);
        for now in 0..=10 {
            timer.update(now, 0.5);
        }
        // the streak started at 0 and now is 10, which is not strictly greater
        assert!(!timer.is_stuck(10, 10));
        timer.update(11, 0.5);
        assert!(timer.is_stuck(11, 10));
    }

    #[test]
    fn fast_sample_ends_the_streak() {
        let mut timer = LowSpeedTimer::new(1.39);
        timer.update(0, 0.5);
        timer.update(5, 0.5);
        timer.update(6, 5.0);
        timer.update(7, 0.5);
        assert!(!timer.is_stuck(15, 10));
        assert!(timer.is_stuck(18, 10));
    }

    #[test]
    fn threshold_is_exclusive() {
        let mut timer = LowSpeedTimer::new(1.39);
        timer.update(0, 1.39);
        assert!(!timer.is_stuck(100, 10));
        timer.update(1, 1.38);
        assert!(timer.is_stuck(100, 10));
    }

    #[test]
    fn reset_clears_the_streak() {
        let mut timer = LowSpeedTimer::new(1.39);
        timer.update(0, 0.0);
        timer.reset();
        assert!(!timer.is_stuck(100, 10));
    }
}
