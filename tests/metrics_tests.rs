use std::sync::Arc;
use std::thread;

use strata::metrics::{render_metrics_page, Metrics};

#[cfg(test)]
mod counter_tests {
    use super::*;

    #[test]
    fn test_totals_split_into_hits_and_misses() {
        let metrics = Metrics::new();
        for i in 0..20 {
            metrics.record(i % 3 == 0, 0.001);
            let snapshot = metrics.snapshot();
            assert_eq!(
                snapshot.total_requests,
                snapshot.cache_hits + snapshot.cache_misses,
                "totals must balance after every record"
            );
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 20);
        assert_eq!(snapshot.cache_hits, 7);
        assert_eq!(snapshot.cache_misses, 13);
    }

    #[test]
    fn test_hit_rate_is_a_percentage() {
        let metrics = Metrics::new();
        metrics.record(true, 0.001);
        metrics.record(false, 0.001);

        assert_eq!(metrics.snapshot().hit_rate(), 50.0);
    }

    #[test]
    fn test_empty_snapshot_reports_zero_rates() {
        let metrics = Metrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.hit_rate(), 0.0);
        assert_eq!(snapshot.avg_response_ms(), 0.0);
    }

    #[test]
    fn test_average_response_time_in_milliseconds() {
        let metrics = Metrics::new();
        metrics.record(true, 0.010);
        metrics.record(false, 0.030);

        let average = metrics.snapshot().avg_response_ms();
        assert!(
            (average - 20.0).abs() < 1e-9,
            "10ms and 30ms must average to 20ms, got {}",
            average
        );
    }

    #[test]
    fn test_concurrent_recorders_lose_nothing() {
        let metrics = Arc::new(Metrics::new());
        let mut recorders = Vec::new();

        for _ in 0..8 {
            let metrics = Arc::clone(&metrics);
            recorders.push(thread::spawn(move || {
                for i in 0..100 {
                    metrics.record(i % 2 == 0, 0.001);
                }
            }));
        }
        for recorder in recorders {
            recorder.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 800);
        assert_eq!(snapshot.cache_hits, 400);
        assert_eq!(snapshot.cache_misses, 400);
    }
}

#[cfg(test)]
mod page_tests {
    use super::*;

    #[test]
    fn test_page_embeds_the_snapshot() {
        let metrics = Metrics::new();
        metrics.record(true, 0.002);
        metrics.record(false, 0.004);

        let page = render_metrics_page(&metrics.snapshot(), 5);
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<strong>Total Requests:</strong> 2"));
        assert!(page.contains("<strong>Cache Hits:</strong> 1"));
        assert!(page.contains("<strong>Cache Misses:</strong> 1"));
        assert!(page.contains("<strong>Cache Hit Rate:</strong> 50.00%"));
        assert!(page.contains("<strong>Cache Size:</strong> 5 entries"));
    }

    #[test]
    fn test_page_refreshes_itself() {
        let metrics = Metrics::new();
        let page = render_metrics_page(&metrics.snapshot(), 0);
        assert!(
            page.contains("setTimeout(function(){location.reload();}, 5000);"),
            "the page must reload itself every 5 seconds"
        );
    }
}
