use std::sync::LazyLock;

use prometheus::*;

static METRIC_PENDING_MATCHES: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!("dm_pending_matches", "number of matches currently in flight").unwrap()
});

static METRIC_MATCH_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("dm_match_failed_count", "count of the failed matches").unwrap()
});

static METRIC_MATCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "dm_match_duration",
        "duration of the per-image match in seconds",
        vec![0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0]
    )
    .unwrap()
});

static METRIC_MATCH_CONFIDENCE: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "dm_match_confidence",
        "confidence of the best match",
        (1..=20).map(|x| x as f64 * 0.05).collect()
    )
    .unwrap()
});

/// 更新正在进行的匹配数量
pub fn set_pending_matches(n: usize) {
    METRIC_PENDING_MATCHES.set(n as i64);
}

pub fn inc_match_failed() {
    METRIC_MATCH_FAILED.inc();
}

/// 记录一次成功匹配的耗时与置信度
pub fn observe_match(duration: f32, confidence: f32) {
    METRIC_MATCH_DURATION.observe(duration as f64);
    METRIC_MATCH_CONFIDENCE.observe(confidence as f64);
}

/// 以文本格式导出所有指标
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    encoder.encode_to_string(&prometheus::gather()).unwrap_or_default()
}
