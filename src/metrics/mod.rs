//! Metrics store (component F): named, typed time series with bounded
//! history, summary statistics, trend analysis, and threshold alerts.
//!
//! Each series is identified by name and holds at most 1000 points; once
//! full, the oldest point is dropped as a new one arrives (a ring, not a
//! growing log). Alerts are derived from threshold crossings on a series
//! and deduplicated so at most one alert is active per (metric, severity).

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Upper bound on the number of points retained per series.
const MAX_POINTS: usize = 1000;

/// The kind of thing a series measures; purely informational, used for
/// grouping on export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Timing,
    Memory,
    Render,
    Cache,
    Network,
    User,
    System,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricType::Timing => "timing",
            MetricType::Memory => "memory",
            MetricType::Render => "render",
            MetricType::Cache => "cache",
            MetricType::Network => "network",
            MetricType::User => "user",
            MetricType::System => "system",
        };
        f.write_str(s)
    }
}

/// A single sample in a metric series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Point {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub labels: HashMap<String, String>,
}

/// Severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// A threshold crossing on a metric series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub metric_name: String,
    pub severity: Severity,
    pub value: f64,
    pub threshold: f64,
    pub fire_time: DateTime<Utc>,
    pub resolve_time: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.resolve_time.is_none()
    }
}

/// A threshold rule watched against a series: fires when the series value
/// crosses `threshold` in `direction`, resolves when it crosses back.
#[derive(Debug, Clone)]
pub struct ThresholdRule {
    pub severity: Severity,
    pub threshold: f64,
    pub direction: ThresholdDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdDirection {
    Above,
    Below,
}

impl ThresholdRule {
    fn crossed(&self, value: f64) -> bool {
        match self.direction {
            ThresholdDirection::Above => value >= self.threshold,
            ThresholdDirection::Below => value <= self.threshold,
        }
    }
}

/// Summary statistics computed over a window of points.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub stddev: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Direction and strength of a series' trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Stable,
    Increasing,
    Decreasing,
}

/// Least-squares trend over a window of points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    /// Slope in value-per-second.
    pub slope: f64,
    /// Correlation-style fit quality in `[0, 1]`; 1.0 is a perfect line.
    pub strength: f64,
}

struct Series {
    metric_type: MetricType,
    unit: String,
    points: std::collections::VecDeque<Point>,
    rules: Vec<ThresholdRule>,
    active_alerts: HashMap<Severity, Alert>,
}

/// Thread-safe named time-series store with bounded history per series.
#[derive(Debug)]
pub struct MetricsStore {
    series: Mutex<HashMap<String, Series>>,
    resolved_alerts: Mutex<Vec<Alert>>,
}

impl std::fmt::Debug for Series {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Series")
            .field("metric_type", &self.metric_type)
            .field("unit", &self.unit)
            .field("points", &self.points.len())
            .finish()
    }
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsStore {
    pub fn new() -> Self {
        Self {
            series: Mutex::new(HashMap::new()),
            resolved_alerts: Mutex::new(Vec::new()),
        }
    }

    /// Registers a series' type and unit if it does not already exist.
    /// Re-registering an existing series is a no-op.
    pub fn register(&self, name: &str, metric_type: MetricType, unit: &str) {
        let mut series = self.series.lock();
        series.entry(name.to_string()).or_insert_with(|| Series {
            metric_type,
            unit: unit.to_string(),
            points: std::collections::VecDeque::new(),
            rules: Vec::new(),
            active_alerts: HashMap::new(),
        });
    }

    /// Attaches a threshold rule to a series (the series must already be
    /// registered).
    pub fn add_rule(&self, name: &str, rule: ThresholdRule) {
        if let Some(series) = self.series.lock().get_mut(name) {
            series.rules.push(rule);
        }
    }

    /// Records one sample, evaluates threshold rules, and evicts the oldest
    /// point if the series is at capacity.
    pub fn record(&self, name: &str, value: f64, labels: HashMap<String, String>) {
        let mut series_map = self.series.lock();
        let series = series_map
            .entry(name.to_string())
            .or_insert_with(|| Series {
                metric_type: MetricType::System,
                unit: String::new(),
                points: std::collections::VecDeque::new(),
                rules: Vec::new(),
                active_alerts: HashMap::new(),
            });

        let now = Utc::now();
        series.points.push_back(Point {
            timestamp: now,
            value,
            labels,
        });
        while series.points.len() > MAX_POINTS {
            series.points.pop_front();
        }

        let mut resolved = Vec::new();
        for rule in &series.rules {
            let crossed = rule.crossed(value);
            let existing = series.active_alerts.get(&rule.severity).cloned();
            match (crossed, existing) {
                (true, None) => {
                    series.active_alerts.insert(
                        rule.severity,
                        Alert {
                            metric_name: name.to_string(),
                            severity: rule.severity,
                            value,
                            threshold: rule.threshold,
                            fire_time: now,
                            resolve_time: None,
                        },
                    );
                }
                (false, Some(mut alert)) => {
                    alert.resolve_time = Some(now);
                    resolved.push(alert);
                    series.active_alerts.remove(&rule.severity);
                }
                _ => {}
            }
        }
        drop(series_map);
        if !resolved.is_empty() {
            self.resolved_alerts.lock().extend(resolved);
        }
    }

    /// Currently active alerts across all series.
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.series
            .lock()
            .values()
            .flat_map(|s| s.active_alerts.values().cloned())
            .collect()
    }

    /// Alerts that have fired and since resolved, most recent last.
    pub fn resolved_alerts(&self) -> Vec<Alert> {
        self.resolved_alerts.lock().clone()
    }

    /// Computes [`Statistics`] over the points in `name`, optionally
    /// restricted to the trailing `window` duration.
    pub fn statistics(&self, name: &str, window: Option<chrono::Duration>) -> Option<Statistics> {
        let series_map = self.series.lock();
        let series = series_map.get(name)?;
        let values = Self::windowed_values(series, window);
        if values.is_empty() {
            return None;
        }
        Some(compute_statistics(&values))
    }

    /// Computes a least-squares [`Trend`] over the points in `name`,
    /// optionally restricted to the trailing `window` duration.
    pub fn trend(&self, name: &str, window: Option<chrono::Duration>) -> Option<Trend> {
        let series_map = self.series.lock();
        let series = series_map.get(name)?;
        let points: Vec<&Point> = match window {
            Some(w) => {
                let cutoff = Utc::now() - w;
                series.points.iter().filter(|p| p.timestamp >= cutoff).collect()
            }
            None => series.points.iter().collect(),
        };
        if points.len() < 2 {
            return None;
        }
        Some(compute_trend(&points))
    }

    fn windowed_values(series: &Series, window: Option<chrono::Duration>) -> Vec<f64> {
        match window {
            Some(w) => {
                let cutoff = Utc::now() - w;
                series
                    .points
                    .iter()
                    .filter(|p| p.timestamp >= cutoff)
                    .map(|p| p.value)
                    .collect()
            }
            None => series.points.iter().map(|p| p.value).collect(),
        }
    }

    /// Names of every registered series.
    pub fn series_names(&self) -> Vec<String> {
        self.series.lock().keys().cloned().collect()
    }

    /// Exports every series as line-delimited text with a CSV-style header.
    pub fn export_text(&self) -> String {
        let mut out = String::from("timestamp,metric,value,unit,type\n");
        let series_map = self.series.lock();
        let mut names: Vec<&String> = series_map.keys().collect();
        names.sort();
        for name in names {
            let series = &series_map[name];
            for point in &series.points {
                out.push_str(&format!(
                    "{},{},{},{},{}\n",
                    point.timestamp.to_rfc3339(),
                    name,
                    point.value,
                    series.unit,
                    series.metric_type
                ));
            }
        }
        out
    }

    /// Exports a nested structured view: metric name -> type/unit/points.
    pub fn export_structured(&self) -> HashMap<String, ExportedSeries> {
        let series_map = self.series.lock();
        series_map
            .iter()
            .map(|(name, series)| {
                (
                    name.clone(),
                    ExportedSeries {
                        metric_type: series.metric_type,
                        unit: series.unit.clone(),
                        points: series.points.iter().cloned().collect(),
                    },
                )
            })
            .collect()
    }
}

/// A series as returned by [`MetricsStore::export_structured`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedSeries {
    pub metric_type: MetricType,
    pub unit: String,
    pub points: Vec<Point>,
}

fn compute_statistics(values: &[f64]) -> Statistics {
    let count = values.len();
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let min = sorted[0];
    let max = sorted[count - 1];
    let mean = sorted.iter().sum::<f64>() / count as f64;
    let median = percentile(&sorted, 0.5);
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
    let stddev = variance.sqrt();
    let p95 = percentile(&sorted, 0.95);
    let p99 = percentile(&sorted, 0.99);

    Statistics {
        count,
        min,
        max,
        mean,
        median,
        stddev,
        p95,
        p99,
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn compute_trend(points: &[&Point]) -> Trend {
    let n = points.len() as f64;
    let t0 = points[0].timestamp;
    let xs: Vec<f64> = points
        .iter()
        .map(|p| (p.timestamp - t0).num_milliseconds() as f64 / 1000.0)
        .collect();
    let ys: Vec<f64> = points.iter().map(|p| p.value).collect();

    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..xs.len() {
        let dx = xs[i] - x_mean;
        let dy = ys[i] - y_mean;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let slope = if var_x > 0.0 { cov / var_x } else { 0.0 };
    let strength = if var_x > 0.0 && var_y > 0.0 {
        (cov / (var_x.sqrt() * var_y.sqrt())).abs()
    } else {
        0.0
    };

    // A slope is only considered meaningful relative to the series' own
    // scale; a flat series with floating-point noise should read as stable.
    let relative_slope = if y_mean.abs() > 1e-9 {
        slope * n / y_mean.abs()
    } else {
        slope * n
    };
    let direction = if relative_slope.abs() < 0.05 {
        TrendDirection::Stable
    } else if relative_slope > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    };

    Trend {
        direction,
        slope,
        strength: strength.clamp(0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_respects_the_1000_point_ring() {
        let store = MetricsStore::new();
        store.register("latency_ms", MetricType::Timing, "ms");
        for i in 0..1500 {
            store.record("latency_ms", i as f64, HashMap::new());
        }
        let stats = store.statistics("latency_ms", None).unwrap();
        assert_eq!(stats.count, MAX_POINTS);
        // oldest 500 values were evicted, so min should be 500.0
        assert_eq!(stats.min, 500.0);
    }

    #[test]
    fn statistics_on_known_values() {
        let store = MetricsStore::new();
        store.register("x", MetricType::System, "count");
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            store.record("x", v, HashMap::new());
        }
        let stats = store.statistics("x", None).unwrap();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 5.0);
        assert_eq!(stats.mean, 3.0);
        assert_eq!(stats.median, 3.0);
    }

    #[test]
    fn trend_detects_increasing_series() {
        let store = MetricsStore::new();
        store.register("y", MetricType::Render, "ms");
        for v in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0] {
            store.record("y", v, HashMap::new());
        }
        let trend = store.trend("y", None).unwrap();
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!(trend.strength > 0.9);
    }

    #[test]
    fn trend_detects_stable_series() {
        let store = MetricsStore::new();
        store.register("z", MetricType::Memory, "mb");
        for _ in 0..10 {
            store.record("z", 42.0, HashMap::new());
        }
        let trend = store.trend("z", None).unwrap();
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn threshold_crossing_fires_and_resolves_an_alert() {
        let store = MetricsStore::new();
        store.register("pressure", MetricType::Memory, "ratio");
        store.add_rule(
            "pressure",
            ThresholdRule {
                severity: Severity::Warning,
                threshold: 0.8,
                direction: ThresholdDirection::Above,
            },
        );
        store.record("pressure", 0.5, HashMap::new());
        assert!(store.active_alerts().is_empty());

        store.record("pressure", 0.9, HashMap::new());
        assert_eq!(store.active_alerts().len(), 1);

        store.record("pressure", 0.4, HashMap::new());
        assert!(store.active_alerts().is_empty());
        assert_eq!(store.resolved_alerts().len(), 1);
    }

    #[test]
    fn at_most_one_active_alert_per_metric_and_severity() {
        let store = MetricsStore::new();
        store.register("cpu", MetricType::System, "ratio");
        store.add_rule(
            "cpu",
            ThresholdRule {
                severity: Severity::Critical,
                threshold: 0.9,
                direction: ThresholdDirection::Above,
            },
        );
        store.record("cpu", 0.95, HashMap::new());
        store.record("cpu", 0.99, HashMap::new());
        let alerts: Vec<_> = store
            .active_alerts()
            .into_iter()
            .filter(|a| a.metric_name == "cpu" && a.severity == Severity::Critical)
            .collect();
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn export_text_has_the_expected_header_and_rows() {
        let store = MetricsStore::new();
        store.register("q", MetricType::Cache, "hits");
        store.record("q", 1.0, HashMap::new());
        let text = store.export_text();
        assert!(text.starts_with("timestamp,metric,value,unit,type\n"));
        assert!(text.contains(",q,1,hits,cache\n"));
    }
}
