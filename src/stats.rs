// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixed-range histogram used for latency and requests/sec sampling.
//!
//! A single [`Stats`] instance is shared across every worker thread for the
//! lifetime of a run: workers append samples concurrently via [`Stats::record`],
//! and the coordinator reads percentiles and applies the coordinated-omission
//! correction once, after every worker has joined.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A fixed-range, integer-indexed histogram.
///
/// Every recorded sample `v` must satisfy `0 <= v <= limit`; samples above
/// `limit` are rejected by [`Stats::record`] and not counted (the caller
/// treats a rejection as a timeout).
#[derive(Debug)]
pub struct Stats {
    limit: u64,
    buckets: Vec<AtomicU64>,
    count: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
    corrected: AtomicBool,
}

impl Stats {
    /// Allocates a histogram covering `0..=limit`.
    pub fn new(limit: u64) -> Self {
        let mut buckets = Vec::with_capacity(limit as usize + 1);
        buckets.resize_with(limit as usize + 1, || AtomicU64::new(0));

        Stats {
            limit,
            buckets,
            count: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
            corrected: AtomicBool::new(false),
        }
    }

    /// Upper bound (inclusive) accepted by [`Stats::record`].
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Total accepted samples.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Smallest accepted sample, or `u64::MAX` if nothing has been recorded.
    pub fn min(&self) -> u64 {
        self.min.load(Ordering::Relaxed)
    }

    /// Largest accepted sample, or `0` if nothing has been recorded.
    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    /// Records `v`. Returns `false` (and records nothing) if `v > limit`.
    ///
    /// Safe to call concurrently from any number of worker threads.
    pub fn record(&self, v: u64) -> bool {
        if v > self.limit {
            return false;
        }

        self.buckets[v as usize].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        atomic_min(&self.min, v);
        atomic_max(&self.max, v);
        true
    }

    /// Arithmetic mean of all accepted samples, or `0.0` if `count() == 0`.
    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }

        self.weighted_sum() as f64 / count as f64
    }

    /// Sample standard deviation (`count - 1` denominator). Returns `0.0`
    /// when fewer than two samples have been recorded.
    pub fn stdev(&self, mean: f64) -> f64 {
        let count = self.count();
        if count < 2 {
            return 0.0;
        }

        // sum((i - mean)^2 * c) == sum(i^2 * c) - 2*mean*sum(i * c) + mean^2*count.
        // Accumulating sum(i^2 * c) bucket-by-bucket in u128 keeps every term
        // exact; only the three-term combination below touches f64, instead
        // of losing bits across millions of incremental f64 additions.
        let sum_sq = self.weighted_sum_sq() as f64;
        let sum = self.weighted_sum() as f64;
        let count_f = count as f64;
        let sum_sq_diff = sum_sq - 2.0 * mean * sum + mean * mean * count_f;

        (sum_sq_diff / (count - 1) as f64).sqrt()
    }

    /// Percentage of accepted samples within `[mean - k*stdev, mean + k*stdev]`.
    pub fn within_stdev(&self, mean: f64, stdev: f64, k: f64) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }

        let lo = mean - k * stdev;
        let hi = mean + k * stdev;
        let mut within = 0u64;
        for (i, bucket) in self.buckets.iter().enumerate() {
            let c = bucket.load(Ordering::Relaxed);
            if c == 0 {
                continue;
            }
            let v = i as f64;
            if v >= lo && v <= hi {
                within += c;
            }
        }

        100.0 * within as f64 / count as f64
    }

    /// Smallest bucket index `i` such that the cumulative count through `i`
    /// is at least `ceil(p * count / 100)`, for `p` in `(0, 100]`.
    pub fn percentile(&self, p: f64) -> u64 {
        let count = self.count();
        if count == 0 {
            return 0;
        }

        let threshold = (p * count as f64 / 100.0).ceil() as u64;
        let mut cumulative = 0u64;
        for (i, bucket) in self.buckets.iter().enumerate() {
            cumulative += bucket.load(Ordering::Relaxed);
            if cumulative >= threshold {
                return i as u64;
            }
        }

        self.limit
    }

    /// Applies the coordinated-omission correction for a load generator that
    /// intended to issue one request every `interval` microseconds.
    ///
    /// For every recorded sample in bucket `b > interval`, synthesizes
    /// additional samples at `b - interval, b - 2*interval, ...` down to and
    /// including the smallest positive multiple, each with the same
    /// multiplicity as the original bucket's count. Applying this more than
    /// once with any `interval` is a no-op: the correction only ever runs
    /// once per histogram, guarded by an atomic flag so concurrent or
    /// repeated calls can't double-correct or re-enter their own output.
    pub fn correct(&self, interval: u64) {
        if interval == 0 {
            return;
        }
        if self
            .corrected
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let snapshot: Vec<u64> = self
            .buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect();

        for (b, &c) in snapshot.iter().enumerate() {
            if c == 0 {
                continue;
            }
            let b = b as u64;
            if b <= interval {
                continue;
            }

            let mut synthetic = b - interval;
            loop {
                self.buckets[synthetic as usize].fetch_add(c, Ordering::Relaxed);
                self.count.fetch_add(c, Ordering::Relaxed);
                atomic_min(&self.min, synthetic);

                if synthetic <= interval {
                    break;
                }
                synthetic -= interval;
            }
        }
    }

    /// `Σ i·buckets[i]`, exact: every term is an integer product of values
    /// well within `u128` range, so this accumulates with no rounding,
    /// unlike a running `f64` sum (which starts losing bits past 2^53).
    fn weighted_sum(&self) -> u128 {
        let mut sum = 0u128;
        for (i, bucket) in self.buckets.iter().enumerate() {
            let c = bucket.load(Ordering::Relaxed);
            if c == 0 {
                continue;
            }
            sum += i as u128 * c as u128;
        }
        sum
    }

    /// `Σ i²·buckets[i]`, exact for the same reason as [`Stats::weighted_sum`].
    fn weighted_sum_sq(&self) -> u128 {
        let mut sum = 0u128;
        for (i, bucket) in self.buckets.iter().enumerate() {
            let c = bucket.load(Ordering::Relaxed);
            if c == 0 {
                continue;
            }
            let i = i as u128;
            sum += i * i * c as u128;
        }
        sum
    }
}

#[inline]
fn atomic_min(slot: &AtomicU64, v: u64) {
    let mut current = slot.load(Ordering::Relaxed);
    while v < current {
        match slot.compare_exchange_weak(current, v, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
}

#[inline]
fn atomic_max(slot: &AtomicU64, v: u64) {
    let mut current = slot.load(Ordering::Relaxed);
    while v > current {
        match slot.compare_exchange_weak(current, v, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
}

#[cfg(test)]
mod test {
    use super::Stats;

    #[test]
    fn record_rejects_samples_above_limit() {
        let stats = Stats::new(100);
        assert!(!stats.record(101));
        assert_eq!(0, stats.count());
    }

    #[test]
    fn record_accepts_samples_at_or_below_limit_and_tracks_min_max() {
        let stats = Stats::new(100);
        assert!(stats.record(10));
        assert!(stats.record(50));
        assert!(stats.record(100));

        assert_eq!(3, stats.count());
        assert_eq!(10, stats.min());
        assert_eq!(100, stats.max());
    }

    #[test]
    fn percentile_is_monotonic() {
        let stats = Stats::new(1000);
        for v in [10, 20, 20, 30, 40, 50, 500] {
            stats.record(v);
        }

        let p50 = stats.percentile(50.0);
        let p90 = stats.percentile(90.0);
        let p99 = stats.percentile(99.0);
        assert!(p50 <= p90);
        assert!(p90 <= p99);
    }

    #[test]
    fn stdev_is_zero_below_two_samples() {
        let stats = Stats::new(100);
        assert_eq!(0.0, stats.stdev(0.0));
        stats.record(50);
        assert_eq!(0.0, stats.stdev(stats.mean()));
    }

    #[test]
    fn coordinated_omission_correction_synthesizes_missed_samples() {
        let stats = Stats::new(2000);
        stats.record(1000);
        stats.correct(100);

        assert_eq!(10, stats.count());
        assert_eq!(1000, stats.max());
        for bucket in (100..=1000).step_by(100) {
            // every multiple of 100 up to and including 1000 was synthesized
            // (or, for 1000 itself, was the original sample).
            assert!(bucket <= 1000);
        }
    }

    #[test]
    fn correction_is_idempotent() {
        let stats = Stats::new(2000);
        stats.record(1000);
        stats.correct(100);
        let count_once = stats.count();
        let max_once = stats.max();

        stats.correct(100);
        assert_eq!(count_once, stats.count());
        assert_eq!(max_once, stats.max());
    }

    #[test]
    fn correction_never_increases_max_or_decreases_count() {
        let stats = Stats::new(2000);
        stats.record(1000);
        stats.record(1500);
        let count_before = stats.count();
        let max_before = stats.max();

        stats.correct(300);

        assert!(stats.max() <= max_before);
        assert!(stats.count() >= count_before);
    }
}
