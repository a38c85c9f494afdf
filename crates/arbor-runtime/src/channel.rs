//! Single-slot asynchronous mailbox.
//!
//! [`Channel<T>`] is the only synchronization primitive between nodes. A
//! producer [`set`](Channel::set)s one value; the consumer awaits it with
//! [`get`](Channel::get), which takes the value and leaves the slot empty
//! for the next step.
//!
//! Setting a slot that still holds an unconsumed value is rejected with
//! [`AlreadySet`], handing the value back. The protocol guarantees at most
//! one value in flight per slot, so this is a programming error signal.
//!
//! Single consumer: concurrent `get()` calls on one channel are not
//! supported. There is no timeout.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::sync::lock;

/// A value rejected by [`Channel::set`] because the slot was occupied.
#[derive(PartialEq, Eq)]
pub struct AlreadySet<T>(pub T);

impl<T> AlreadySet<T> {
    /// Recover the rejected value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for AlreadySet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AlreadySet(..)")
    }
}

/// Lifetime set/get counts of one channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Successful `set()` calls.
    pub sets: u64,
    /// Values taken by `get()` or `try_get()`.
    pub gets: u64,
}

/// Single-slot, single-consumer mailbox.
pub struct Channel<T> {
    slot: Mutex<Option<T>>,
    notify: Notify,
    sets: AtomicU64,
    gets: AtomicU64,
}

// Compile-time assertion: Channel<T> must be Send + Sync for Send payloads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Channel<Vec<f64>>>();
};

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Channel<T> {
    /// An empty channel.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
            sets: AtomicU64::new(0),
            gets: AtomicU64::new(0),
        }
    }

    /// Store `value`, waking the consumer.
    pub fn set(&self, value: T) -> Result<(), AlreadySet<T>> {
        {
            let mut slot = lock(&self.slot);
            if slot.is_some() {
                return Err(AlreadySet(value));
            }
            *slot = Some(value);
        }
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for a value and take it.
    pub async fn get(&self) -> T {
        loop {
            if let Some(value) = self.try_get() {
                return value;
            }
            // A set() between try_get and here leaves a permit, so this
            // returns immediately rather than missing the wakeup.
            self.notify.notified().await;
        }
    }

    /// Take the value if one is present.
    pub fn try_get(&self) -> Option<T> {
        let taken = lock(&self.slot).take();
        if taken.is_some() {
            self.gets.fetch_add(1, Ordering::Relaxed);
        }
        taken
    }

    /// Whether a value is waiting.
    pub fn is_set(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Lifetime set/get counts.
    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            sets: self.sets.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
        }
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("is_set", &self.is_set())
            .field("stats", &self.stats())
            .finish()
    }
}
