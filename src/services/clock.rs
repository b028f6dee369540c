use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Source of the current time, always expressed in one fixed reference
/// timezone so the add path and the scan path can never disagree.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Tz>;

    fn timezone(&self) -> Tz;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}
