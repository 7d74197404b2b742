use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Local};
use wattwise_sources::Reading;

const MIN_CAPACITY: usize = 2;

/// Bounded ring buffer of readings for the chart view.
#[derive(Debug, Clone)]
pub struct History {
    points: VecDeque<Reading>,
    capacity: usize,
}

/// Summary of the readings inside a trend window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub samples: usize,
}

impl TrendStats {
    /// Energy used in one hour at the average draw.
    pub fn kwh_per_hour(&self) -> f64 {
        self.avg / 1000.0
    }

    pub fn kwh_per_day(&self) -> f64 {
        self.kwh_per_hour() * 24.0
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, reading: Reading) {
        if self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(reading);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.points.back()
    }

    /// Seconds since the oldest point, paired with watts.
    pub fn chart_points(&self) -> Vec<(f64, f64)> {
        let Some(first) = self.points.front() else {
            return Vec::new();
        };
        self.points
            .iter()
            .map(|p| {
                let offset = (p.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0;
                (offset.max(0.0), p.watts)
            })
            .collect()
    }

    /// Time covered by the buffer, in seconds.
    pub fn span_secs(&self) -> f64 {
        match (self.points.front(), self.points.back()) {
            (Some(first), Some(last)) => {
                ((last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0).max(0.0)
            }
            _ => 0.0,
        }
    }

    /// Y-axis bounds with some headroom above the peak.
    pub fn value_range(&self) -> (f64, f64) {
        let max = self.points.iter().map(|p| p.watts).fold(10.0_f64, f64::max);
        (0.0, max * 1.2)
    }

    /// Min, max and mean over readings no older than `window` before `now`.
    pub fn trend(&self, window: Duration, now: DateTime<Local>) -> Option<TrendStats> {
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(window);

        let mut stats: Option<TrendStats> = None;
        let mut sum = 0.0;
        for point in self
            .points
            .iter()
            .filter(|p| cutoff.is_none_or(|cutoff| p.timestamp >= cutoff))
        {
            sum += point.watts;
            stats = Some(match stats {
                None => TrendStats {
                    min: point.watts,
                    max: point.watts,
                    avg: 0.0,
                    samples: 1,
                },
                Some(s) => TrendStats {
                    min: s.min.min(point.watts),
                    max: s.max.max(point.watts),
                    avg: 0.0,
                    samples: s.samples + 1,
                },
            });
        }

        stats.map(|s| TrendStats {
            avg: sum / s.samples as f64,
            ..s
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64, watts: f64) -> Reading {
        let base = Local.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Reading::at(watts, None, base + chrono::Duration::seconds(secs)).unwrap()
    }

    #[test]
    fn test_evicts_oldest() {
        let mut history = History::new(3);
        for (i, w) in [10.0, 20.0, 30.0, 40.0].into_iter().enumerate() {
            history.record(at(i as i64, w));
        }

        assert_eq!(history.len(), 3);
        let watts: Vec<f64> = history.chart_points().iter().map(|p| p.1).collect();
        assert_eq!(watts, vec![20.0, 30.0, 40.0]);
        assert_eq!(history.chart_points()[0].0, 0.0);
        assert_eq!(history.span_secs(), 2.0);
    }

    #[test]
    fn test_capacity_floor() {
        assert_eq!(History::new(0).capacity(), 2);
    }

    #[test]
    fn test_trend_window() {
        let mut history = History::new(100);
        history.record(at(0, 1000.0));
        history.record(at(400, 100.0));
        history.record(at(500, 300.0));

        let now = at(600, 0.0).timestamp;
        let stats = history.trend(Duration::from_secs(300), now).unwrap();

        assert_eq!(stats.samples, 2);
        assert_eq!(stats.min, 100.0);
        assert_eq!(stats.max, 300.0);
        assert_eq!(stats.avg, 200.0);
        assert!((stats.kwh_per_hour() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_trend_empty() {
        let history = History::new(10);
        assert!(history.trend(Duration::from_secs(60), Local::now()).is_none());
    }

    #[test]
    fn test_value_range_headroom() {
        let mut history = History::new(10);
        let (low, high) = history.value_range();
        assert_eq!(low, 0.0);
        assert!((high - 12.0).abs() < 1e-9);

        history.record(at(0, 500.0));
        assert!((history.value_range().1 - 600.0).abs() < 1e-9);
    }
}
