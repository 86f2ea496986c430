/// Drains wall-clock frame time into whole fixed steps, so the number of physics
/// steps a shot takes never depends on the host frame rate.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    tick_rate: u32,
    dt: f32,
    accumulator: f32,
    max_frame: f32,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            tick_rate,
            dt: 1.0 / tick_rate as f32,
            accumulator: 0.0,
            max_frame: 0.25,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn accumulate(&mut self, delta: f32) {
        if delta.is_finite() && delta > 0.0 {
            self.accumulator += delta.min(self.max_frame);
        }
    }

    pub fn should_tick(&self) -> bool {
        self.accumulator >= self.dt
    }

    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_timestep_accumulation() {
        let mut ts = FixedTimestep::new(120);

        ts.accumulate(1.0 / 60.0 + 1e-4);
        assert!(ts.should_tick());
        assert!(ts.consume_tick());
        assert!(ts.consume_tick());
        assert!(!ts.consume_tick());
    }

    #[test]
    fn step_count_independent_of_frame_rate() {
        let count = |frame: f32, frames: usize| {
            let mut ts = FixedTimestep::new(120);
            let mut steps = 0;
            for _ in 0..frames {
                ts.accumulate(frame);
                while ts.consume_tick() {
                    steps += 1;
                }
            }
            steps
        };
        // One second of wall time at 30, 60 and 144 fps, with slack for float error.
        let at_30 = count(1.0 / 30.0, 30);
        let at_60 = count(1.0 / 60.0, 60);
        let at_144 = count(1.0 / 144.0, 144);
        assert!((119..=120).contains(&at_30));
        assert!((119..=120).contains(&at_60));
        assert!((119..=120).contains(&at_144));
    }

    #[test]
    fn long_frames_are_clamped() {
        let mut ts = FixedTimestep::new(120);
        ts.accumulate(5.0);
        let mut steps = 0;
        while ts.consume_tick() {
            steps += 1;
        }
        assert!((29..=30).contains(&steps));
        ts.accumulate(f32::NAN);
        assert!(!ts.should_tick());
    }
}
