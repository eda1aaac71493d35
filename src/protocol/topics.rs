//! Well-known topics published by the PulseJob server

/// Executor online/offline/status updates
pub const EXECUTOR_STATUS: &str = "executor.status";

/// Task trigger/completion/failure updates
pub const TASK_STATUS: &str = "task.status";

/// Alert notifications
pub const ALERT: &str = "alert";

/// Dashboard statistics
pub const STATS: &str = "stats";

const JOB_LOG_PREFIX: &str = "job.log.";

/// Log stream topic for one job instance
pub fn job_log(instance_id: impl std::fmt::Display) -> String {
    format!("{}{}", JOB_LOG_PREFIX, instance_id)
}

/// Extract the job instance id from a log stream topic
pub fn job_log_instance(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(JOB_LOG_PREFIX)
        .filter(|id| !id.is_empty())
}
