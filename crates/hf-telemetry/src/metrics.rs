use ahash::AHashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Metric names emitted by the client crates.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";
    pub const TOKEN_RENEWALS_TOTAL: &str = "token_renewals_total";
    pub const TOKEN_RENEWAL_DURATION: &str = "token_renewal_duration_seconds";
    pub const SESSION_EXPIRED_TOTAL: &str = "session_expired_total";
    pub const STREAM_FRAMES_TOTAL: &str = "stream_frames_total";
    pub const STREAM_OPEN_SOCKETS: &str = "stream_open_sockets";
}

// ---------------------------------------------------------------------------
// Histogram
// ---------------------------------------------------------------------------

/// Bucketed distribution of observed values. Bucket counts are cumulative
/// only at export time; each observation lands in every bucket it fits.
#[derive(Debug)]
pub struct Histogram {
    pub buckets: Vec<f64>,
    pub counts: Vec<AtomicU64>,
    sum_bits: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum_bits: AtomicU64::new(0f64.to_bits()),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        // f64 has no atomic add; CAS on the bit pattern instead.
        let _ = self
            .sum_bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
        for (slot, upper) in self.counts.iter().zip(&self.buckets) {
            if value <= *upper {
                slot.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Latency buckets in seconds, tuned for API round trips.
fn latency_buckets() -> Vec<f64> {
    vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Sorted `key=value` pairs distinguishing series of one counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let mut v: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        v.sort();
        Self(v)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// `{key="value",...}`, or the empty string when there are no labels.
    pub fn prometheus_str(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let inner = self
            .0
            .iter()
            .map(|(k, v)| format!("{k}=\"{v}\""))
            .collect::<Vec<_>>()
            .join(",");
        format!("{{{inner}}}")
    }
}

// ---------------------------------------------------------------------------
// MetricsCollector
// ---------------------------------------------------------------------------

type CounterMap = AHashMap<(String, Labels), AtomicU64>;

/// Process-local metrics registry.
///
/// Series are registered lazily on first use; values are atomics so the hot
/// path only takes a read lock.
#[derive(Debug)]
pub struct MetricsCollector {
    counters: RwLock<CounterMap>,
    gauges: RwLock<AHashMap<String, AtomicI64>>,
    histograms: RwLock<AHashMap<String, Histogram>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(AHashMap::new()),
            gauges: RwLock::new(AHashMap::new()),
            histograms: RwLock::new(AHashMap::new()),
        }
    }

    /// Collector with the client's latency histograms pre-registered, so they
    /// show up in exports even before the first request.
    pub fn with_defaults() -> Self {
        let collector = Self::new();
        {
            let mut h = write(&collector.histograms);
            for name in [names::HTTP_REQUEST_DURATION, names::TOKEN_RENEWAL_DURATION] {
                h.insert(name.to_string(), Histogram::new(latency_buckets()));
            }
        }
        collector
    }

    // -- Counters -----------------------------------------------------------

    pub fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment_counter_by(name, labels, 1);
    }

    pub fn increment_counter_by(&self, name: &str, labels: &[(&str, &str)], amount: u64) {
        let key = (name.to_string(), Labels::new(labels));
        if let Some(c) = read(&self.counters).get(&key) {
            c.fetch_add(amount, Ordering::Relaxed);
            return;
        }
        write(&self.counters)
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(amount, Ordering::Relaxed);
    }

    pub fn get_counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = (name.to_string(), Labels::new(labels));
        read(&self.counters)
            .get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    // -- Gauges -------------------------------------------------------------

    pub fn set_gauge(&self, name: &str, value: i64) {
        if let Some(g) = read(&self.gauges).get(name) {
            g.store(value, Ordering::Relaxed);
            return;
        }
        write(&self.gauges)
            .entry(name.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::Relaxed);
    }

    /// Add `delta` (possibly negative) to a gauge.
    pub fn add_gauge(&self, name: &str, delta: i64) {
        if let Some(g) = read(&self.gauges).get(name) {
            g.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        write(&self.gauges)
            .entry(name.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get_gauge(&self, name: &str) -> i64 {
        read(&self.gauges)
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    // -- Histograms ---------------------------------------------------------

    /// Record into a histogram, creating it with latency buckets if needed.
    pub fn record_histogram(&self, name: &str, value: f64) {
        if let Some(h) = read(&self.histograms).get(name) {
            h.observe(value);
            return;
        }
        write(&self.histograms)
            .entry(name.to_string())
            .or_insert_with(|| Histogram::new(latency_buckets()))
            .observe(value);
    }

    pub fn histogram_count(&self, name: &str) -> u64 {
        read(&self.histograms)
            .get(name)
            .map(Histogram::count)
            .unwrap_or(0)
    }

    // -- Export --------------------------------------------------------------

    /// Prometheus text exposition format, series sorted by name.
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();

        {
            let counters = read(&self.counters);
            let mut series: Vec<(&String, &Labels, u64)> = counters
                .iter()
                .map(|((name, labels), v)| (name, labels, v.load(Ordering::Relaxed)))
                .collect();
            series.sort_by(|a, b| (a.0, &a.1 .0).cmp(&(b.0, &b.1 .0)));

            let mut last: Option<&String> = None;
            for (name, labels, value) in series {
                if last != Some(name) {
                    out.push_str(&format!("# TYPE {name} counter\n"));
                    last = Some(name);
                }
                out.push_str(&format!("{name}{} {value}\n", labels.prometheus_str()));
            }
        }

        {
            let gauges = read(&self.gauges);
            let mut names: Vec<&String> = gauges.keys().collect();
            names.sort();
            for name in names {
                let value = gauges[name].load(Ordering::Relaxed);
                out.push_str(&format!("# TYPE {name} gauge\n{name} {value}\n"));
            }
        }

        {
            let histograms = read(&self.histograms);
            let mut names: Vec<&String> = histograms.keys().collect();
            names.sort();
            for name in names {
                let h = &histograms[name];
                out.push_str(&format!("# TYPE {name} histogram\n"));
                for (upper, count) in h.buckets.iter().zip(&h.counts) {
                    out.push_str(&format!(
                        "{name}_bucket{{le=\"{upper}\"}} {}\n",
                        count.load(Ordering::Relaxed)
                    ));
                }
                out.push_str(&format!("{name}_bucket{{le=\"+Inf\"}} {}\n", h.count()));
                out.push_str(&format!("{name}_sum {}\n", h.sum()));
                out.push_str(&format!("{name}_count {}\n", h.count()));
            }
        }

        out
    }

    /// Same data as [`export_prometheus`](Self::export_prometheus) as JSON.
    pub fn export_json(&self) -> serde_json::Value {
        let counters: serde_json::Map<String, serde_json::Value> = read(&self.counters)
            .iter()
            .map(|((name, labels), v)| {
                (
                    format!("{name}{}", labels.prometheus_str()),
                    serde_json::json!(v.load(Ordering::Relaxed)),
                )
            })
            .collect();

        let gauges: serde_json::Map<String, serde_json::Value> = read(&self.gauges)
            .iter()
            .map(|(name, g)| (name.clone(), serde_json::json!(g.load(Ordering::Relaxed))))
            .collect();

        let histograms: serde_json::Map<String, serde_json::Value> = read(&self.histograms)
            .iter()
            .map(|(name, h)| {
                let buckets: Vec<serde_json::Value> = h
                    .buckets
                    .iter()
                    .zip(&h.counts)
                    .map(|(le, c)| serde_json::json!({"le": le, "count": c.load(Ordering::Relaxed)}))
                    .collect();
                (
                    name.clone(),
                    serde_json::json!({"buckets": buckets, "sum": h.sum(), "count": h.count()}),
                )
            })
            .collect();

        serde_json::json!({
            "counters": counters,
            "gauges": gauges,
            "histograms": histograms,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ---------------------------------------------------------------------------
// Global singleton + recording helpers
// ---------------------------------------------------------------------------

/// The process-wide collector.
pub fn global_metrics() -> &'static MetricsCollector {
    static INSTANCE: OnceLock<MetricsCollector> = OnceLock::new();
    INSTANCE.get_or_init(MetricsCollector::with_defaults)
}

/// One completed HTTP round trip. `status` is "error" when no response came back.
pub fn record_http_request(method: &str, status: &str, seconds: f64) {
    let m = global_metrics();
    m.increment_counter(
        names::HTTP_REQUESTS_TOTAL,
        &[("method", method), ("status", status)],
    );
    m.record_histogram(names::HTTP_REQUEST_DURATION, seconds);
}

/// One settled token renewal (`outcome` is "success" or "failure").
pub fn record_renewal(outcome: &str, seconds: f64) {
    let m = global_metrics();
    m.increment_counter(names::TOKEN_RENEWALS_TOTAL, &[("outcome", outcome)]);
    m.record_histogram(names::TOKEN_RENEWAL_DURATION, seconds);
}

/// One inbound stream frame and what happened to it.
pub fn record_stream_frame(outcome: &str) {
    global_metrics().increment_counter(names::STREAM_FRAMES_TOTAL, &[("outcome", outcome)]);
}
