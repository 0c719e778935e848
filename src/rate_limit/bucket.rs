// ============================================================================
// Token Bucket
// ============================================================================
//
// Refill-on-access token bucket. There is no background timer: tokens are
// added lazily when the bucket is consulted, so an idle bucket costs nothing.
//
// The bucket itself is not synchronized. Callers share it behind a mutex
// (see `registry::SharedBucket`) so a refill + consume pair is one atomic step.
//
// ============================================================================

use std::time::{Duration, Instant};

/// Capacity and refill cadence for one sensitivity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLimit {
    /// Maximum number of tokens the bucket can hold.
    pub capacity: u64,
    /// Tokens added per elapsed `period`.
    pub refill_per_period: u64,
    pub period: Duration,
}

impl BucketLimit {
    pub const fn per_minute(capacity: u64) -> Self {
        Self {
            capacity,
            refill_per_period: capacity,
            period: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
pub struct TokenBucket {
    limit: BucketLimit,
    tokens: u64,
    last_refill_at: Instant,
    last_seen_at: Instant,
    retired: bool,
}

impl TokenBucket {
    /// New buckets start full.
    pub fn new(limit: BucketLimit, now: Instant) -> Self {
        Self {
            limit,
            tokens: limit.capacity,
            last_refill_at: now,
            last_seen_at: now,
            retired: false,
        }
    }

    pub fn limit(&self) -> BucketLimit {
        self.limit
    }

    /// Tokens currently held, without applying a refill.
    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    pub fn last_seen_at(&self) -> Instant {
        self.last_seen_at
    }

    /// Set once the bucket has been dropped from its registry.
    pub(crate) fn is_retired(&self) -> bool {
        self.retired
    }

    pub(crate) fn retire(&mut self) {
        self.retired = true;
    }

    /// Applies the lazy refill for the time elapsed since the last refill.
    ///
    /// Only whole tokens are added. `last_refill_at` moves forward only when
    /// at least one token was added, so short bursts of calls never starve
    /// the refill.
    pub fn refill(&mut self, now: Instant) {
        let to_add = self.tokens_due(now);
        if to_add > 0 {
            self.tokens = self.limit.capacity.min(self.tokens.saturating_add(to_add));
            self.last_refill_at = now;
        }
    }

    /// Refills, then debits `cost` tokens if enough are available.
    ///
    /// A rejected call leaves the token count exactly as the refill left it.
    pub fn try_consume(&mut self, cost: u64, now: Instant) -> bool {
        self.refill(now);
        self.last_seen_at = self.last_seen_at.max(now);

        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Whether the bucket would be back at capacity if refilled at `now`.
    pub fn is_full_at(&self, now: Instant) -> bool {
        self.tokens.saturating_add(self.tokens_due(now)) >= self.limit.capacity
    }

    fn tokens_due(&self, now: Instant) -> u64 {
        let period_nanos = self.limit.period.as_nanos();
        if period_nanos == 0 {
            return self.limit.capacity;
        }

        // `now` earlier than the last refill (clock handed in out of order)
        // yields zero elapsed time rather than a panic.
        let elapsed = now.saturating_duration_since(self.last_refill_at).as_nanos();
        let due = elapsed * u128::from(self.limit.refill_per_period) / period_nanos;
        u64::try_from(due).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    fn bucket(capacity: u64, now: Instant) -> TokenBucket {
        TokenBucket::new(BucketLimit::per_minute(capacity), now)
    }

    #[test]
    fn test_admits_exactly_capacity_within_one_period() {
        let start = Instant::now();
        let mut b = bucket(10, start);

        for i in 0..10 {
            assert!(b.try_consume(1, start + Duration::from_millis(i)), "request {} should pass", i + 1);
        }
        // Less than the 6s it takes to earn one token back.
        assert!(!b.try_consume(1, start + Duration::from_secs(5)));
        assert_eq!(b.tokens(), 0);
    }

    #[test]
    fn test_refill_is_capped_at_capacity() {
        let start = Instant::now();
        let mut b = bucket(100, start);

        assert!(b.try_consume(40, start));
        b.refill(start + MINUTE * 5);
        assert_eq!(b.tokens(), 100);
    }

    #[test]
    fn test_partial_period_adds_proportional_whole_tokens() {
        let start = Instant::now();
        let mut b = bucket(10, start);
        assert!(b.try_consume(10, start));

        // 10 per minute => one token every 6s.
        b.refill(start + Duration::from_secs(13));
        assert_eq!(b.tokens(), 2);
    }

    #[test]
    fn test_refill_below_one_token_keeps_progress() {
        let start = Instant::now();
        let mut b = bucket(10, start);
        assert!(b.try_consume(10, start));

        // Neither call alone crosses 6s, but together they do: the refill
        // clock must not be reset by calls that added nothing.
        assert!(!b.try_consume(1, start + Duration::from_secs(4)));
        assert!(b.try_consume(1, start + Duration::from_secs(7)));
    }

    #[test]
    fn test_rejected_consume_leaves_tokens_untouched() {
        let start = Instant::now();
        let mut b = bucket(5, start);
        assert!(b.try_consume(3, start));
        assert!(!b.try_consume(3, start));
        assert_eq!(b.tokens(), 2);
    }

    #[test]
    fn test_out_of_order_clock_does_not_panic() {
        let start = Instant::now() + Duration::from_secs(10);
        let mut b = bucket(2, start);
        assert!(b.try_consume(1, start - Duration::from_secs(5)));
        assert_eq!(b.tokens(), 1);
    }

    #[test]
    fn test_is_full_at() {
        let start = Instant::now();
        let mut b = bucket(10, start);
        assert!(b.is_full_at(start));
        assert!(b.try_consume(10, start));
        assert!(!b.is_full_at(start + Duration::from_secs(30)));
        assert!(b.is_full_at(start + MINUTE));
    }
}
