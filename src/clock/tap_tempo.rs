//! Tap tempo: a ring buffer of up to five tap timestamps, averaged into a
//! BPM estimate once enough consistent intervals have accumulated.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const CAPACITY: usize = 5;
const GAP_DISCARD: Duration = Duration::from_secs(3);

pub struct TapTempo {
    taps: VecDeque<Instant>,
}

impl TapTempo {
    pub fn new() -> Self {
        TapTempo {
            taps: VecDeque::with_capacity(CAPACITY),
        }
    }

    /// Records a tap at `now` and, if enough recent taps are present,
    /// returns the estimated BPM. Requires at least three taps overall and
    /// at least two kept (sub-3s) pairwise intervals among them.
    pub fn tap(&mut self, now: Instant) -> Option<f64> {
        self.taps.push_back(now);
        while self.taps.len() > CAPACITY {
            self.taps.pop_front();
        }
        if self.taps.len() < 3 {
            return None;
        }

        let intervals: Vec<Duration> = self
            .taps
            .iter()
            .zip(self.taps.iter().skip(1))
            .map(|(a, b)| *b - *a)
            .filter(|d| *d <= GAP_DISCARD)
            .collect();

        if intervals.len() < 2 {
            return None;
        }

        let total: Duration = intervals.iter().sum();
        let avg = total / intervals.len() as u32;
        let bpm = 60.0 / avg.as_secs_f64();
        Some(bpm)
    }

    pub fn reset(&mut self) {
        self.taps.clear();
    }
}

impl Default for TapTempo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_op_until_third_tap() {
        let mut tap = TapTempo::new();
        let t0 = Instant::now();
        assert_eq!(tap.tap(t0), None);
        assert_eq!(tap.tap(t0 + Duration::from_millis(500)), None);
        assert!(tap.tap(t0 + Duration::from_millis(1000)).is_some());
    }

    #[test]
    fn gap_over_three_seconds_is_discarded() {
        let mut tap = TapTempo::new();
        let t0 = Instant::now();
        tap.tap(t0);
        tap.tap(t0 + Duration::from_millis(500));
        // Big gap before the third tap: only one interval under 3s remains
        // kept alongside it, so two total intervals still average fine
        // once a fourth close tap arrives.
        let result = tap.tap(t0 + Duration::from_secs(10));
        assert_eq!(result, None);
        let result = tap.tap(t0 + Duration::from_millis(10500));
        assert!(result.is_some());
    }

    #[test]
    fn steady_taps_converge_on_bpm() {
        let mut tap = TapTempo::new();
        let t0 = Instant::now();
        // 500ms between taps => 120 BPM.
        for i in 0..5u32 {
            tap.tap(t0 + Duration::from_millis(500 * i as u64));
        }
        let bpm = tap.tap(t0 + Duration::from_millis(2500)).unwrap();
        assert!((bpm - 120.0).abs() < 0.5);
    }

    #[test]
    fn four_taps_at_500ms_yield_120_bpm() {
        let mut tap = TapTempo::new();
        let t0 = Instant::now();
        assert_eq!(tap.tap(t0), None);
        assert_eq!(tap.tap(t0 + Duration::from_millis(500)), None);
        let third = tap.tap(t0 + Duration::from_millis(1000)).unwrap();
        assert!((third - 120.0).abs() < 0.01);
        let fourth = tap.tap(t0 + Duration::from_millis(1500)).unwrap();
        assert!((fourth - 120.0).abs() < 0.01);
    }
}
