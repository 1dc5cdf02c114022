use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Slack added to every wait so the freed slot has really expired.
const WAIT_SLACK: Duration = Duration::from_millis(50);

/// Send times inside the current window, oldest first.
#[derive(Debug, Default)]
struct Window {
    sent: VecDeque<Instant>,
}

impl Window {
    /// Record a send at `now` if a slot is free, otherwise report how long
    /// until the oldest send leaves the window.
    fn reserve(&mut self, now: Instant, capacity: usize, span: Duration) -> Result<(), Duration> {
        while self
            .sent
            .front()
            .is_some_and(|&sent| now.duration_since(sent) >= span)
        {
            self.sent.pop_front();
        }

        match self.sent.front() {
            Some(&oldest) if self.sent.len() >= capacity => {
                Err((oldest + span).saturating_duration_since(now) + WAIT_SLACK)
            }
            _ => {
                self.sent.push_back(now);
                Ok(())
            }
        }
    }
}

/// At most `capacity` requests in any `span`, shared by every clone.
#[derive(Clone)]
pub(crate) struct RateLimiter {
    window: Arc<Mutex<Window>>,
    capacity: usize,
    span: Duration,
}

impl RateLimiter {
    pub(crate) fn new(capacity: usize, span: Duration) -> Self {
        Self {
            window: Arc::new(Mutex::new(Window::default())),
            capacity: capacity.max(1),
            span,
        }
    }

    pub(crate) async fn acquire(&self) {
        loop {
            let reserved = self
                .window
                .lock()
                .await
                .reserve(Instant::now(), self.capacity, self.span);

            match reserved {
                Ok(()) => return,
                Err(wait) => {
                    tracing::debug!("Yahoo request budget spent, waiting {:.1}s", wait.as_secs_f64());
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_frees_slot_after_span() {
        let span = Duration::from_secs(60);
        let start = Instant::now();
        let mut window = Window::default();

        assert!(window.reserve(start, 2, span).is_ok());
        assert!(window.reserve(start + Duration::from_secs(10), 2, span).is_ok());

        let wait = window
            .reserve(start + Duration::from_secs(20), 2, span)
            .unwrap_err();
        assert_eq!(wait, Duration::from_secs(40) + WAIT_SLACK);

        assert!(window.reserve(start + span, 2, span).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_blocks_once_budget_is_spent() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }
}
