use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

const SUFFIX_LEN: usize = 9;

static LAST_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Millisecond timestamp that never repeats or goes backwards within this process.
fn monotonic_millis() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = if now > last { now } else { last + 1 };
        match LAST_MILLIS.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Produces `{PREFIX}-{millis}-{9 random chars}` in uppercase.
///
/// Uniqueness is probabilistic; the storage layer has the final word.
pub fn generate_certificate_code(prefix: &str) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(SUFFIX_LEN)
        .collect();

    format!("{}-{}-{}", prefix, monotonic_millis(), suffix).to_uppercase()
}
