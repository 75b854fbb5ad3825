//! Monotonic time source for every protocol deadline.
use embassy_time::Instant;

/// Clock abstraction; must be cheap to clone and shareable across tasks.
pub trait MilcanClock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Host monotonic clock through the `embassy-time` std driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl MilcanClock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
