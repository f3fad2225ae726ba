use super::Timestamp;
use core::sync::atomic::{AtomicU64, Ordering};

/// Lamport logical clock, shared by everything on a node that sends or receives messages.
///
/// The value never decreases: a local event moves it forward by one, a received timestamp `r`
/// moves it to `max(time, r) + 1`. Both are single atomic updates so concurrent callers can't
/// interleave a read and a write.
///
/// The clock stops at `Timestamp::MAX`. A remote timestamp of `Timestamp::MAX` can't be moved past
/// and counts as malformed.
#[derive(Debug, Default)]
pub struct LamportClock {
    time: AtomicU64,
}

impl LamportClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local event (a send): increment and return the new time.
    pub fn tick(&self) -> Timestamp {
        let advance = |time: Timestamp| time.saturating_add(1);
        match self
            .time
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |time| Some(advance(time)))
        {
            Ok(previous) | Err(previous) => advance(previous),
        }
    }

    /// Receive event. A missing or out of range remote timestamp is treated as a bare local event.
    pub fn update(&self, remote: Option<Timestamp>) -> Timestamp {
        let remote = match remote {
            Some(remote) if remote < Timestamp::MAX => remote,
            _ => return self.tick(),
        };
        let advance = |time: Timestamp| time.max(remote).saturating_add(1);
        match self
            .time
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |time| Some(advance(time)))
        {
            Ok(previous) | Err(previous) => advance(previous),
        }
    }

    pub fn get(&self) -> Timestamp {
        self.time.load(Ordering::SeqCst)
    }
}
