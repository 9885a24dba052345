//! Metrics module
//!
//! Prometheus counters for uploads, downloads and API traffic. Metrics are
//! registered in the default registry; [`render`] returns the text exposition.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "simhub_uploads_total",
        "Total number of uploads",
        &["mode", "status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "simhub_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "simhub_upload_duration_seconds",
        "Upload duration in seconds",
        &["mode"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    ).unwrap();

    // Multipart metrics
    pub static ref MULTIPART_PARTS: Histogram = register_histogram!(
        "simhub_multipart_parts",
        "Number of parts per multipart upload",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 10000.0]
    ).unwrap();

    pub static ref PART_UPLOADS: CounterVec = register_counter_vec!(
        "simhub_part_uploads_total",
        "Part uploads by outcome",
        &["status"]
    ).unwrap();

    // Download metrics
    pub static ref DOWNLOAD_BYTES_TOTAL: Counter = register_counter!(
        "simhub_download_bytes_total",
        "Total bytes downloaded"
    ).unwrap();

    // Transport metrics
    pub static ref API_REQUESTS: CounterVec = register_counter_vec!(
        "simhub_http_requests_total",
        "HTTP requests issued",
        &["method", "status"]  // "2xx", "4xx", "5xx" or "error"
    ).unwrap();
}

fn status_class(status: Option<u16>) -> &'static str {
    match status {
        Some(200..=299) => "2xx",
        Some(300..=399) => "3xx",
        Some(400..=499) => "4xx",
        Some(_) => "5xx",
        None => "error",
    }
}

/// Record an HTTP request; `None` means no response was received
pub fn record_api_request(method: &str, status: Option<u16>) {
    API_REQUESTS
        .with_label_values(&[method, status_class(status)])
        .inc();
}

/// Record a successful upload
pub fn record_upload_success(mode: &str, bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&[mode, "success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload
pub fn record_upload_failure(mode: &str) {
    UPLOADS_TOTAL.with_label_values(&[mode, "failure"]).inc();
}

/// Record upload duration
pub fn record_upload_duration(mode: &str, duration_secs: f64) {
    UPLOAD_DURATION
        .with_label_values(&[mode])
        .observe(duration_secs);
}

/// Record the part count of a multipart upload
pub fn record_multipart_parts(parts_count: u64) {
    MULTIPART_PARTS.observe(parts_count as f64);
}

/// Record the outcome of a single part upload
pub fn record_part_upload(success: bool) {
    let status = if success { "success" } else { "failure" };
    PART_UPLOADS.with_label_values(&[status]).inc();
}

/// Record downloaded bytes
pub fn record_download_bytes(bytes: u64) {
    DOWNLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Text exposition of all registered metrics
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(Some(204)), "2xx");
        assert_eq!(status_class(Some(404)), "4xx");
        assert_eq!(status_class(Some(503)), "5xx");
        assert_eq!(status_class(None), "error");
    }

    #[test]
    fn test_record_upload_success() {
        record_upload_success("simple", 1024);
        // Just verify it doesn't panic
    }

    #[test]
    fn test_render_contains_recorded_metric() {
        record_part_upload(true);
        let text = render();
        assert!(text.contains("simhub_part_uploads_total"));
    }
}
