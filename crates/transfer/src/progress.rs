use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default sliding window for speed calculation.
const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Default cap on retained samples.
const DEFAULT_MAX_SAMPLES: usize = 100;

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
///
/// The caller supplies the timestamp of every sample, so the calculator
/// follows whatever clock the session runs on.
pub struct SpeedCalculator {
    samples: VecDeque<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            samples: VecDeque::new(),
            max_samples: max_samples.unwrap_or(DEFAULT_MAX_SAMPLES).max(2),
            window_size: window_size.unwrap_or(DEFAULT_WINDOW),
        }
    }

    /// Records `bytes` transferred at `now`.
    pub fn add_sample(&mut self, bytes: u64, now: Instant) {
        self.samples.push_back(SpeedSample {
            bytes,
            timestamp: now,
        });

        // Prune samples outside the window.
        if let Some(cutoff) = now.checked_sub(self.window_size) {
            while self
                .samples
                .front()
                .is_some_and(|sample| sample.timestamp < cutoff)
            {
                self.samples.pop_front();
            }
        }

        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Average speed in bytes/second within the window.
    ///
    /// Returns 0.0 with fewer than 2 samples. The first sample only anchors
    /// the window start; its bytes are not counted.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        if self.samples.len() < 2 {
            return 0.0;
        }

        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        let total: u64 = self.samples.iter().skip(1).map(|s| s.bytes).sum();
        total as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    /// Human-readable speed, or `None` until two samples exist.
    pub fn display(&self) -> Option<String> {
        let speed = self.bytes_per_second();
        (speed > 0.0).then(|| format_speed(speed))
    }

    /// Clears all recorded samples.
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

/// Formats a byte rate as e.g. `"2.5 MB/s"`.
pub fn format_speed(bytes_per_second: f64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KB/s", "MB/s", "GB/s"];
    let mut value = bytes_per_second.max(0.0);
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_samples() {
        let calc = SpeedCalculator::default();
        assert_eq!(calc.bytes_per_second(), 0.0);
        assert!(calc.eta(1000).is_none());
        assert!(calc.display().is_none());
    }

    #[test]
    fn single_sample() {
        let mut calc = SpeedCalculator::default();
        calc.add_sample(100, Instant::now());
        assert_eq!(calc.bytes_per_second(), 0.0);
    }

    #[test]
    fn steady_rate() {
        let mut calc = SpeedCalculator::new(Some(Duration::from_secs(10)), None);
        let start = Instant::now();
        calc.add_sample(0, start);
        calc.add_sample(500, start + Duration::from_millis(500));
        calc.add_sample(500, start + Duration::from_secs(1));

        assert!((calc.bytes_per_second() - 1000.0).abs() < 1e-6);
        let eta = calc.eta(10_000).unwrap();
        assert!((eta.as_secs_f64() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn old_samples_leave_the_window() {
        let mut calc = SpeedCalculator::new(Some(Duration::from_secs(1)), None);
        let start = Instant::now();
        calc.add_sample(1_000_000, start);
        calc.add_sample(10, start + Duration::from_secs(5));
        calc.add_sample(10, start + Duration::from_secs(6));

        // Only the last two samples survive: 10 bytes over 1 s.
        assert!((calc.bytes_per_second() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn max_samples() {
        let mut calc = SpeedCalculator::new(Some(Duration::from_secs(60)), Some(5));
        let start = Instant::now();
        for i in 0..20u64 {
            calc.add_sample(i * 10, start + Duration::from_millis(i * 10));
        }
        assert!(calc.samples.len() <= 5);
    }

    #[test]
    fn reset_clears() {
        let mut calc = SpeedCalculator::default();
        let start = Instant::now();
        calc.add_sample(100, start);
        calc.add_sample(200, start + Duration::from_millis(100));
        calc.reset();
        assert_eq!(calc.bytes_per_second(), 0.0);
    }

    #[test]
    fn format_speed_units() {
        assert_eq!(format_speed(512.0), "512 B/s");
        assert_eq!(format_speed(2048.0), "2.0 KB/s");
        assert_eq!(format_speed(2.5 * 1024.0 * 1024.0), "2.5 MB/s");
        assert_eq!(format_speed(3.0 * 1024.0 * 1024.0 * 1024.0), "3.0 GB/s");
    }
}
