#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub protocol_errors: u64,
    pub rtt_ms: f32,
    pub rtt_variance: f32,
    pub rtt_samples: u64,
}

impl NetworkStats {
    /// Folds one ping round trip into the smoothed estimate.
    pub fn record_rtt(&mut self, rtt: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        if self.rtt_samples == 0 {
            self.rtt_ms = rtt;
            self.rtt_variance = rtt / 2.0;
        } else {
            let diff = (rtt - self.rtt_ms).abs();
            self.rtt_variance = (1.0 - BETA) * self.rtt_variance + BETA * diff;
            self.rtt_ms = (1.0 - ALPHA) * self.rtt_ms + ALPHA * rtt;
        }
        self.rtt_samples += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_seeds_estimate() {
        let mut stats = NetworkStats::default();
        stats.record_rtt(80.0);
        assert_eq!(stats.rtt_ms, 80.0);
        assert_eq!(stats.rtt_variance, 40.0);
    }

    #[test]
    fn smoothing_moves_toward_samples() {
        let mut stats = NetworkStats::default();
        stats.record_rtt(100.0);
        stats.record_rtt(20.0);
        assert!(stats.rtt_ms < 100.0 && stats.rtt_ms > 20.0);
        assert_eq!(stats.rtt_samples, 2);
    }
}
