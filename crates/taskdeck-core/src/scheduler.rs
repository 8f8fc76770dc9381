//! Background timers that keep the clock
//! line and the due-date labels current.
//!
//! Both timers only emit [`Tick`]s on a
//! channel; the consumer owns the store
//! and recomputes views on its own turn.

use std::sync::Arc;
use std::time::Duration;

use chrono::{
  DateTime,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{
  debug,
  info
};

use crate::clock::Clock;
use crate::datetime::{
  today_in,
  until_next_midnight
};

pub const CLOCK_PERIOD: Duration =
  Duration::from_secs(1);
pub const DUE_REFRESH_PERIOD: Duration =
  Duration::from_secs(60);

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Tick {
  Clock(DateTime<Utc>),
  DueRefresh(NaiveDate)
}

pub struct RefreshScheduler {
  cancel:  CancellationToken,
  handles: Vec<JoinHandle<()>>
}

impl RefreshScheduler {
  /// Spawns both timers on the current
  /// tokio runtime.
  pub fn start(
    clock: Arc<dyn Clock>,
    tz: Tz,
    tx: UnboundedSender<Tick>
  ) -> Self {
    let cancel = CancellationToken::new();
    info!(
      tz = tz.name(),
      "starting refresh scheduler"
    );

    let clock_task = tokio::spawn(
      run_clock_ticks(
        clock.clone(),
        tx.clone(),
        cancel.clone()
      )
    );
    let due_task =
      tokio::spawn(run_due_refresh(
        clock,
        tz,
        tx,
        cancel.clone()
      ));

    Self {
      cancel,
      handles: vec![
        clock_task, due_task,
      ]
    }
  }

  /// Cancels both timers. Safe to call
  /// more than once.
  pub fn stop(&mut self) {
    if !self.cancel.is_cancelled() {
      info!("stopping refresh scheduler");
      self.cancel.cancel();
    }
  }

  pub fn is_running(&self) -> bool {
    !self.cancel.is_cancelled()
      && self
        .handles
        .iter()
        .any(|h| !h.is_finished())
  }

  /// Stops the timers and waits for both
  /// tasks to exit.
  pub async fn join(mut self) {
    self.stop();
    for handle in
      std::mem::take(&mut self.handles)
    {
      if let Err(err) = handle.await {
        debug!(error = %err, "timer task ended abnormally");
      }
    }
  }
}

impl Drop for RefreshScheduler {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

async fn run_clock_ticks(
  clock: Arc<dyn Clock>,
  tx: UnboundedSender<Tick>,
  cancel: CancellationToken
) {
  let mut interval =
    tokio::time::interval(CLOCK_PERIOD);
  interval.set_missed_tick_behavior(
    MissedTickBehavior::Skip
  );

  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = interval.tick() => {
        if tx.send(Tick::Clock(clock.now())).is_err() {
          debug!("clock tick receiver dropped");
          break;
        }
      }
    }
  }
  debug!("clock ticks stopped");
}

async fn run_due_refresh(
  clock: Arc<dyn Clock>,
  tz: Tz,
  tx: UnboundedSender<Tick>,
  cancel: CancellationToken
) {
  loop {
    let wait = DUE_REFRESH_PERIOD.min(
      until_next_midnight(
        clock.now(),
        &tz
      )
    );

    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = tokio::time::sleep(wait) => {
        let today = today_in(clock.now(), &tz);
        if tx.send(Tick::DueRefresh(today)).is_err() {
          debug!("due refresh receiver dropped");
          break;
        }
      }
    }
  }
  debug!("due refresh stopped");
}
