//! Logging utilities for erosivity.
//!
//! Structured `tracing` events for the long-running passes (sampling a
//! raster, searching hyperparameters) so runs can be followed and compared.

use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Initialize the tracing subscriber with the given log level.
///
/// `RUST_LOG` wins over `log_level` when set.
pub fn init_tracing(log_level: &str) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(val) => val,
        Err(_) => log_level.to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Log a start message for a significant operation
pub fn log_operation_start(operation: &str, details: Option<&str>) {
    if let Some(details) = details {
        info!(
            operation = operation,
            details = details,
            "Starting operation"
        );
    } else {
        info!(operation = operation, "Starting operation");
    }
}

/// Log the completion of a significant operation
pub fn log_operation_end(operation: &str, start_time: Instant, success: bool) {
    let duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;

    if success {
        info!(
            operation = operation,
            duration_ms = duration_ms,
            "Operation completed successfully"
        );
    } else {
        warn!(
            operation = operation,
            duration_ms = duration_ms,
            "Operation completed with warnings"
        );
    }
}

/// Run `f`, logging its duration under a fresh run id
pub fn log_timed_operation<F, R>(operation: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    let start = Instant::now();
    let run_id = generate_run_id();

    debug!(
        operation = operation,
        run_id = %run_id,
        "Starting operation"
    );

    let result = f();

    info!(
        operation = operation,
        run_id = %run_id,
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Operation completed"
    );

    result
}

/// Log the outcome of sampling one raster into a column
pub fn log_sample_stats(
    raster: &str,
    column: &str,
    rows: usize,
    cols: usize,
    points: usize,
    missing: usize,
) {
    info!(
        operation = "sample",
        raster = raster,
        column = column,
        grid = %format!("{}x{}", rows, cols),
        points = points,
        missing = missing,
        "Raster sampled"
    );
}

/// Log one objective evaluation of the hyperparameter search
pub fn log_evaluation(index: usize, length_scale: f64, alpha: f64, score: Option<f64>) {
    match score {
        Some(score) => debug!(
            operation = "search",
            index = index,
            length_scale = length_scale,
            alpha = alpha,
            score = score,
            "Evaluated hyperparameters"
        ),
        None => warn!(
            operation = "search",
            index = index,
            length_scale = length_scale,
            alpha = alpha,
            "Hyperparameter evaluation failed"
        ),
    }
}

/// Log an error with context
pub fn log_error(error: &crate::error::ErosivityError, context: &str) {
    error!(
        error = %error,
        context = context,
        error_type = std::any::type_name_of_val(error),
        "Error occurred"
    );
}

/// Generate a unique run ID
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_generate_run_id() {
        let id1 = generate_run_id();
        let id2 = generate_run_id();

        assert!(!id1.is_empty());
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_log_timed_operation() {
        let result = log_timed_operation("test_operation", || {
            std::thread::sleep(Duration::from_millis(1));
            42
        });

        assert_eq!(result, 42);
    }

    #[test]
    fn test_log_helpers_do_not_panic() {
        log_operation_start("sample", Some("raster=x"));
        log_operation_end("sample", Instant::now(), false);
        log_sample_stats("x", "col", 3, 3, 10, 1);
        log_evaluation(0, 1.0, 0.1, None);
        log_error(&crate::error::ErosivityError::NotFitted, "test");
    }
}
