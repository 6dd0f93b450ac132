use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

use crate::cache::FileCache;
use crate::shutdown::RunFlag;

#[derive(Default)]
struct Counters {
    total_requests: u64,
    cache_hits: u64,
    cache_misses: u64,
    total_response_time: f64,
}

// Traffic counters shared by every worker. Writers and readers take the same
// lock, so a snapshot is always pairwise consistent and total_requests equals
// cache_hits + cache_misses.
pub struct Metrics {
    state: Mutex<Counters>,
}

#[derive(Clone, Copy, Debug)]
pub struct Snapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_response_time: f64,
}

impl Snapshot {
    // Hits as a percentage of all requests, 0 when nothing was served yet.
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / self.total_requests as f64 * 100.0
    }

    // Mean response time in milliseconds, 0 when nothing was served yet.
    pub fn avg_response_ms(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.total_response_time / self.total_requests as f64 * 1000.0
    }
}

impl Metrics {
    pub fn new() -> Metrics {
        Metrics {
            state: Mutex::new(Counters::default()),
        }
    }

    pub fn record(&self, hit: bool, seconds: f64) {
        let mut counters = self.state.lock();
        counters.total_requests += 1;
        counters.total_response_time += seconds;
        if hit {
            counters.cache_hits += 1;
        } else {
            counters.cache_misses += 1;
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let counters = self.state.lock();
        Snapshot {
            total_requests: counters.total_requests,
            cache_hits: counters.cache_hits,
            cache_misses: counters.cache_misses,
            total_response_time: counters.total_response_time,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub fn print_report(snapshot: &Snapshot, cache_len: usize) {
    println!("\n=== SERVER METRICS ===");
    println!("Total Requests: {}", snapshot.total_requests);
    println!("Cache Hits: {}", snapshot.cache_hits);
    println!("Cache Misses: {}", snapshot.cache_misses);
    println!("Cache Hit Rate: {:.2}%", snapshot.hit_rate());
    println!("Average Response Time: {:.2} ms", snapshot.avg_response_ms());
    println!("Cache Size: {} entries", cache_len);
    println!("=======================\n");
}

// The /metrics page: the same snapshot embedded in a self-refreshing HTML
// document.
pub fn render_metrics_page(snapshot: &Snapshot, cache_len: usize) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html><head><title>Server Metrics</title></head><body>\n\
         <h1>Server Performance Metrics</h1>\n\
         <p><strong>Total Requests:</strong> {}</p>\n\
         <p><strong>Cache Hits:</strong> {}</p>\n\
         <p><strong>Cache Misses:</strong> {}</p>\n\
         <p><strong>Cache Hit Rate:</strong> {:.2}%</p>\n\
         <p><strong>Average Response Time:</strong> {:.2} ms</p>\n\
         <p><strong>Cache Size:</strong> {} entries</p>\n\
         <p><em>Snapshot taken {}</em></p>\n\
         <p><em>Auto-refresh every 5 seconds</em></p>\n\
         <script>setTimeout(function(){{location.reload();}}, 5000);</script>\n\
         </body></html>",
        snapshot.total_requests,
        snapshot.cache_hits,
        snapshot.cache_misses,
        snapshot.hit_rate(),
        snapshot.avg_response_ms(),
        cache_len,
        httpdate::fmt_http_date(SystemTime::now()),
    )
}

// Periodic reporter. Prints the metrics block every `interval`; the print is
// skipped on the iteration in which shutdown is observed.
pub fn spawn_reporter(
    metrics: Arc<Metrics>,
    cache: Arc<FileCache>,
    running: RunFlag,
    interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        println!("Metrics thread started");
        while running.sleep_while_running(interval) {
            print_report(&metrics.snapshot(), cache.len());
        }
        println!("Metrics thread stopping");
    })
}
