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

//! Monotonic microsecond timestamps used to time connection establishment,
//! request/response round trips, and requests/sec sampling windows.

/// Microseconds since an arbitrary, process-local epoch.
///
/// Only differences between two [`now_us`] readings are meaningful; the
/// absolute value carries no wall-clock significance.
pub fn now_us() -> u64 {
    EPOCH.elapsed().as_micros() as u64
}

static EPOCH: once_epoch::Epoch = once_epoch::Epoch::new();

mod once_epoch {
    use std::sync::OnceLock;
    use std::time::Instant;

    /// Lazily-initialized monotonic reference point, set on first use.
    pub struct Epoch(OnceLock<Instant>);

    impl Epoch {
        pub const fn new() -> Self {
            Epoch(OnceLock::new())
        }

        pub fn elapsed(&self) -> std::time::Duration {
            self.0.get_or_init(Instant::now).elapsed()
        }
    }
}

#[cfg(test)]
mod test {
    use super::now_us;

    #[test]
    fn now_us_is_monotonic_nondecreasing() {
        let a = now_us();
        let b = now_us();
        assert!(b >= a);
    }
}
