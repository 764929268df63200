use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and describe the engine metrics
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    init_metric_descriptions();

    Ok(handle)
}

fn init_metric_descriptions() {
    describe_counter!(
        "log_engine_jobs_total",
        "Total number of database jobs executed"
    );
    describe_counter!(
        "log_engine_job_errors_total",
        "Total number of database jobs that failed"
    );
    describe_counter!(
        "log_engine_flood_discards_total",
        "Queued log entries discarded by flood control"
    );
    describe_gauge!(
        "log_engine_queue_length",
        "Jobs waiting for the database"
    );
    describe_gauge!(
        "log_engine_entry_count",
        "Entries currently stored in the log database"
    );
    describe_histogram!(
        "log_engine_job_duration_seconds",
        "Database job execution time in seconds"
    );
    describe_gauge!(
        "log_engine_info",
        "Log engine version information"
    );

    gauge!("log_engine_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record a finished job
pub fn record_job(kind: &'static str, duration: Duration) {
    counter!("log_engine_jobs_total", "kind" => kind).increment(1);
    histogram!("log_engine_job_duration_seconds", "kind" => kind).record(duration.as_secs_f64());
}

pub fn record_job_error(kind: &'static str) {
    counter!("log_engine_job_errors_total", "kind" => kind).increment(1);
}

pub fn record_flood_discard() {
    counter!("log_engine_flood_discards_total").increment(1);
}

pub fn set_queue_length(length: usize) {
    gauge!("log_engine_queue_length").set(length as f64);
}

pub fn set_entry_count(count: u64) {
    gauge!("log_engine_entry_count").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_job("append", Duration::from_millis(3));
        record_job_error("trim");
        record_flood_discard();
        set_queue_length(4);
        set_entry_count(10);
    }
}
