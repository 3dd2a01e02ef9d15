// Wheel speed estimation from free-running pulse counters

use crate::config::{PPR, SAMPLE_TIME_MS};
use crate::messages::WheelRates;

/// One wrapping hardware counter of a given native width
#[derive(Debug, Clone, Copy)]
struct CounterChannel {
    bits: u32,
    last: u32,
}

impl CounterChannel {
    fn new(bits: u32) -> Self {
        assert!((1..=32).contains(&bits), "counter width must be 1..=32 bits");
        Self { bits, last: 0 }
    }

    fn mask(&self) -> u32 {
        if self.bits == 32 { u32::MAX } else { (1u32 << self.bits) - 1 }
    }

    /// Signed pulse delta since the previous sample, tolerant of counter wraparound
    fn delta(&mut self, now: u32) -> i64 {
        let mask = self.mask();
        let raw = (now.wrapping_sub(self.last) & mask) as i64;
        self.last = now & mask;

        let modulus = mask as i64 + 1;
        if raw >= modulus / 2 { raw - modulus } else { raw }
    }
}

/// Convert a pulse delta over one sample period to revolutions per minute
pub fn pulses_to_rpm(delta: i64, sample_ms: u32) -> f32 {
    // delta / PPR * (60 / (sample_ms / 1000))
    (delta as f32 * 60_000.0) / (PPR as f32 * sample_ms as f32)
}

/// Samples both wheel counters once per control period
#[derive(Debug, Clone)]
pub struct WheelSpeedEstimator {
    a: CounterChannel,
    b: CounterChannel,
    sample_ms: u32,
    latest: WheelRates,
}

impl WheelSpeedEstimator {
    pub fn new(bits_a: u32, bits_b: u32) -> Self {
        Self {
            a: CounterChannel::new(bits_a),
            b: CounterChannel::new(bits_b),
            sample_ms: SAMPLE_TIME_MS,
            latest: WheelRates::default(),
        }
    }

    /// Seed the previous readings so the first sample is not a jump from zero
    pub fn prime(&mut self, counts: [u32; 2]) {
        self.a.last = counts[0] & self.a.mask();
        self.b.last = counts[1] & self.b.mask();
    }

    pub fn sample(&mut self, counts: [u32; 2]) -> WheelRates {
        let da = self.a.delta(counts[0]);
        let db = self.b.delta(counts[1]);
        self.latest = WheelRates {
            a: pulses_to_rpm(da, self.sample_ms),
            b: pulses_to_rpm(db, self.sample_ms),
        };
        self.latest
    }

    pub fn latest(&self) -> WheelRates {
        self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eighteen_pulses_is_thirty_rpm() {
        assert_eq!(pulses_to_rpm(18, 100), 30.0);

        let mut est = WheelSpeedEstimator::new(32, 16);
        let rates = est.sample([18, 18]);
        assert_eq!(rates.a, 30.0);
        assert_eq!(rates.b, 30.0);
    }

    #[test]
    fn test_reverse_rotation_is_negative() {
        let mut est = WheelSpeedEstimator::new(32, 16);
        est.prime([100, 100]);
        let rates = est.sample([82, 82]);
        assert_eq!(rates.a, -30.0);
        assert_eq!(rates.b, -30.0);
    }

    #[test]
    fn test_sixteen_bit_wraparound() {
        let mut est = WheelSpeedEstimator::new(32, 16);
        est.prime([0, 0xFFF8]);
        // 0xFFF8 -> 0x000A is +18 pulses across the wrap
        let rates = est.sample([0, 0x000A]);
        assert_eq!(rates.b, 30.0);

        // and back again
        est.prime([0, 0x0004]);
        let rates = est.sample([0, 0xFFF2]);
        assert_eq!(rates.b, -30.0);
    }

    #[test]
    fn test_thirty_two_bit_wraparound() {
        let mut est = WheelSpeedEstimator::new(32, 16);
        est.prime([u32::MAX - 5, 0]);
        let rates = est.sample([12, 0]);
        assert_eq!(rates.a, 30.0);
        assert_eq!(est.latest().a, 30.0);
    }
}
