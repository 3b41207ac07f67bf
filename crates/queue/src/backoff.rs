use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;

/// Exponential backoff with jitter: base 30s, doubling each retry, ceiling
/// 10 min.
pub fn next_retry_at(
    retry_count: i32,
    base_seconds: u64,
    max_seconds: u64,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let exponent = retry_count.max(1) as u32 - 1;
    let raw = base_seconds.saturating_mul(1u64 << exponent.min(20));
    let capped = raw.min(max_seconds);
    let jitter_frac: f64 = rand::thread_rng().gen_range(0.0..0.25);
    let jittered = (capped as f64) * (1.0 + jitter_frac);
    now + ChronoDuration::milliseconds((jittered * 1000.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_and_respects_ceiling() {
        let now = Utc::now();
        let first = next_retry_at(1, 30, 600, now);
        let second = next_retry_at(2, 30, 600, now);
        let tenth = next_retry_at(10, 30, 600, now);

        assert!(first - now >= ChronoDuration::seconds(30));
        assert!(first - now < ChronoDuration::seconds(38));
        assert!(second - now >= ChronoDuration::seconds(60));
        assert!(tenth - now <= ChronoDuration::seconds(750)); // 600s ceiling + jitter headroom
    }
}
