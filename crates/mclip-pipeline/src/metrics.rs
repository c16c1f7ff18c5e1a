//! Pipeline metrics.

use metrics::counter;

pub const WEBHOOKS_TOTAL: &str = "mclip_webhooks_total";
pub const CLIPS_TERMINAL_TOTAL: &str = "mclip_clips_terminal_total";
pub const JOBS_FINISHED_TOTAL: &str = "mclip_jobs_finished_total";
pub const ANALYZER_RUNS_TOTAL: &str = "mclip_analyzer_runs_total";

/// Record a webhook delivery by step and outcome.
pub fn record_webhook(step: &str, outcome: &'static str) {
    counter!(WEBHOOKS_TOTAL, "step" => step.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_clip_terminal(status: &'static str) {
    counter!(CLIPS_TERMINAL_TOTAL, "status" => status).increment(1);
}

pub fn record_job_finished(status: &'static str) {
    counter!(JOBS_FINISHED_TOTAL, "status" => status).increment(1);
}

pub fn record_analyzer_run(analyzer: &str, outcome: &'static str) {
    counter!(ANALYZER_RUNS_TOTAL, "analyzer" => analyzer.to_string(), "outcome" => outcome)
        .increment(1);
}
