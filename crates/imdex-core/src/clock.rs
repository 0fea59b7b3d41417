use chrono::{DateTime, Utc};

/// Time source for op timestamps.
///
/// Injected rather than read ambiently so tests can pin time and so
/// consolidation ordering is reproducible.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time source.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
