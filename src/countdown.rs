//! Per-question countdown: a tokio task that sends one tick per second to
//! the owning session until it is dropped.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::exam::TickToken;
use crate::session::SessionEvent;

const TICK_PERIOD: Duration = Duration::from_secs(1);

pub struct Countdown {
  token: TickToken,
  handle: JoinHandle<()>,
}

impl Countdown {
  /// First tick arrives one period after start.
  pub fn start(token: TickToken, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
    let handle = tokio::spawn(async move {
      let mut ticks = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
      ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticks.tick().await;
        if events.send(SessionEvent::Tick(token)).is_err() {
          break;
        }
      }
    });
    Self { token, handle }
  }

  pub fn token(&self) -> TickToken {
    self.token
  }
}

impl Drop for Countdown {
  fn drop(&mut self) {
    self.handle.abort();
  }
}
