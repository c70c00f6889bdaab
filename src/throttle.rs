use std::time::Duration;

use tokio::time::Instant;

/// Minimum spacing between consecutive outbound calls of one kind.
///
/// The first call goes out immediately; every later call waits until
/// `spacing` has passed since the previous one.
#[derive(Debug)]
pub(crate) struct Throttle {
    spacing: Duration,
    last_call: Option<Instant>,
}

impl Throttle {
    pub(crate) fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last_call: None,
        }
    }

    /// A throttle whose first call also waits `spacing`, counted from now.
    /// Used when the previous call of the cycle was made by someone else.
    pub(crate) fn primed(spacing: Duration) -> Self {
        Self {
            spacing,
            last_call: Some(Instant::now()),
        }
    }

    pub(crate) async fn ready(&mut self) {
        if let Some(last_call) = self.last_call {
            let next_allowed = last_call + self.spacing;
            if Instant::now() < next_allowed {
                tokio::time::sleep_until(next_allowed).await;
            }
        }
        self.last_call = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate_then_spaced() {
        let mut throttle = Throttle::new(Duration::from_millis(300));
        let start = Instant::now();

        throttle.ready().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        throttle.ready().await;
        assert_eq!(start.elapsed(), Duration::from_millis(300));

        throttle.ready().await;
        assert_eq!(start.elapsed(), Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn primed_throttle_delays_the_first_call() {
        let mut throttle = Throttle::primed(Duration::from_millis(500));
        let start = Instant::now();

        throttle.ready().await;
        assert_eq!(start.elapsed(), Duration::from_millis(500));

        throttle.ready().await;
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_callers_are_not_delayed_further() {
        let mut throttle = Throttle::new(Duration::from_millis(300));
        throttle.ready().await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        let before = Instant::now();
        throttle.ready().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
