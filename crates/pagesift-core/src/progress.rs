//! Progress reporting for per-item loops

/// Receives `(current, total, message)` after each processed item
pub trait ProgressSink {
    fn report(&mut self, current: usize, total: usize, message: &str);
}

/// Discards progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _current: usize, _total: usize, _message: &str) {}
}

impl<F> ProgressSink for F
where
    F: FnMut(usize, usize, &str),
{
    fn report(&mut self, current: usize, total: usize, message: &str) {
        self(current, total, message)
    }
}

/// "Processed 3 of 4: 75.00%"
pub fn progress_message(current: usize, total: usize) -> String {
    let percentage = if total == 0 {
        100.0
    } else {
        current as f64 / total as f64 * 100.0
    };
    format!("Processed {} of {}: {:.2}%", current, total, percentage)
}
