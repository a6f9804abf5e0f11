//! Client-side request budget tracking.
//!
//! The remote API enforces a hard requests-per-minute budget and answers 429
//! once it is blown, so every network-issuing code path consults this gate
//! before touching the wire.

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);
const BUDGET: usize = 3;

/// Sliding-window request budget: at most 3 requests per rolling minute.
///
/// `can_request` couples the check with the reservation: a `true` result has
/// already spent a slot. The check-and-append step is not safe under
/// concurrent access; callers that share a limiter wrap it in a `Mutex`.
#[derive(Debug, Default)]
pub struct RateLimiter {
  requests: VecDeque<Instant>,
}

impl RateLimiter {
  pub fn new() -> Self {
    Self {
      requests: VecDeque::new(),
    }
  }

  /// Check whether a request is allowed right now, reserving a slot if so.
  pub fn can_request(&mut self) -> bool {
    self.can_request_at(Instant::now())
  }

  /// Block the calling thread until the oldest tracked request ages out of
  /// the window. Returns immediately when a slot is free (keeping that
  /// reservation). Does not re-check afterwards: with a single caller the
  /// wait itself is sufficient, anyone needing a guaranteed slot re-checks.
  pub fn sleep_until_allowed(&mut self) {
    if let Some(wait) = self.wait_at(Instant::now()) {
      thread::sleep(wait);
    }
  }

  fn can_request_at(&mut self, now: Instant) -> bool {
    while self
      .requests
      .front()
      .is_some_and(|&first| now.duration_since(first) > WINDOW)
    {
      self.requests.pop_front();
    }
    if self.requests.len() >= BUDGET {
      return false;
    }
    self.requests.push_back(now);
    true
  }

  fn wait_at(&mut self, now: Instant) -> Option<Duration> {
    if self.can_request_at(now) {
      return None;
    }
    let first = *self.requests.front()?;
    Some((first + WINDOW).saturating_duration_since(now))
  }
}
