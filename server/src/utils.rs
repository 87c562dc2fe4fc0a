use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

// Duration as fractional milliseconds, used by the tick statistics
pub fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
