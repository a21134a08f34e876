//! A thin readiness multiplexer built on `mio::Poll`.
//!
//! Handler dispatch itself lives with the caller (see [`crate::worker`])
//! rather than being stored here as boxed closures: a timer or file handler
//! invariably needs mutable access to the worker's connection table and
//! counters, and a closure captured inside the very struct it would need to
//! borrow can't express that in safe Rust. Per the arena+index ownership
//! note for breaking connection/worker/loop cycles, [`EventLoop::poll`]
//! hands back stable [`mio::Token`]s and timer ids; the caller looks up what
//! they mean in its own connection table.

use std::io;
use std::time::Duration;

use mio::{Events, Poll, Registry, Token};

use crate::clock::now_us;

/// Identifies one registered timer, returned by [`EventLoop::add_timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(usize);

/// An owned snapshot of one `mio` readiness notification.
#[derive(Debug, Clone, Copy)]
pub struct ReadyEvent {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
}

struct Timer {
    id: TimerId,
    next_fire_us: u64,
    interval_us: u64,
    active: bool,
}

/// A per-worker readiness multiplexer: `mio::Poll` plus a small timer wheel.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    timers: Vec<Timer>,
    next_timer_id: usize,
}

/// One iteration's worth of due work, in firing order: file events first,
/// then timers whose deadline has passed.
pub struct Ready {
    pub events: Vec<ReadyEvent>,
    pub due_timers: Vec<TimerId>,
}

impl EventLoop {
    /// Creates an event loop with room for `max_events` readiness
    /// notifications per [`EventLoop::poll`] call.
    pub fn create(max_events: usize) -> io::Result<Self> {
        Ok(EventLoop {
            poll: Poll::new()?,
            events: Events::with_capacity(max_events),
            timers: Vec::new(),
            next_timer_id: 0,
        })
    }

    /// The `mio::Registry` connections register/reregister/deregister
    /// themselves against.
    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    /// Registers a recurring (or one-shot, if `interval_ms == 0`) timer
    /// firing first after `delay_ms`. Idempotent re-registration is the
    /// caller's responsibility; each call allocates a fresh id.
    pub fn add_timer(&mut self, delay_ms: u64, interval_ms: u64) -> TimerId {
        let id = TimerId(self.next_timer_id);
        self.next_timer_id += 1;

        self.timers.push(Timer {
            id,
            next_fire_us: now_us() + delay_ms * 1000,
            interval_us: interval_ms * 1000,
            active: true,
        });

        id
    }

    /// Blocks until a file descriptor becomes ready or the nearest timer
    /// deadline passes, then returns the ready tokens and due timer ids.
    /// File-descriptor readiness is always returned before timers that
    /// happened to become due in the same call.
    pub fn poll(&mut self) -> io::Result<Ready> {
        self.timers.retain(|t| t.active);

        let timeout = self
            .timers
            .iter()
            .map(|t| t.next_fire_us)
            .min()
            .map(|deadline| {
                let now = now_us();
                if deadline <= now {
                    Duration::ZERO
                } else {
                    Duration::from_micros(deadline - now)
                }
            });

        self.events.clear();
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }

        let now = now_us();
        let mut due_timers = Vec::new();
        for t in self.timers.iter_mut() {
            if t.active && t.next_fire_us <= now {
                due_timers.push(t.id);
                t.next_fire_us = now + t.interval_us;
                if t.interval_us == 0 {
                    t.active = false;
                }
            }
        }

        let events = self
            .events
            .iter()
            .map(|e| ReadyEvent {
                token: e.token(),
                readable: e.is_readable(),
                writable: e.is_writable(),
                error: e.is_error() || e.is_read_closed() || e.is_write_closed(),
            })
            .collect();

        Ok(Ready { events, due_timers })
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("timers", &self.timers.len())
            .finish()
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
