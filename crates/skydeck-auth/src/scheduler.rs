//! Expiry-driven refresh scheduling.
//!
//! The scheduler is a two-state timer: Idle (no task) or Scheduled (task
//! armed). It sleeps until shortly before the recorded access-token expiry
//! and then runs the session's shared refresh. When the server reports no
//! expiry, it falls back to a fixed interval.

use crate::session::Session;
use std::sync::{Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Timing parameters for the refresh schedule.
#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    /// How long before the recorded expiry a refresh runs.
    pub lead: Duration,
    /// Interval between refreshes when the server reports no expiry.
    pub fallback_interval: Duration,
    /// Lower bound on the computed delay.
    pub min_delay: Duration,
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self {
            lead: Duration::from_secs(30),
            fallback_interval: Duration::from_secs(120),
            min_delay: Duration::from_secs(1),
        }
    }
}

/// Idle/Scheduled timer driving periodic refreshes.
pub(crate) struct RefreshScheduler {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub(crate) fn new() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    /// Arm the schedule, replacing any previous timer.
    pub(crate) fn arm(&self, session: Weak<Session>) {
        let mut slot = self.handle.lock().unwrap();
        if let Some(old) = slot.take() {
            old.abort();
        }
        *slot = Some(tokio::spawn(run(session)));
        tracing::debug!("Refresh schedule armed");
    }

    /// Cancel the schedule.
    pub(crate) fn disarm(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
            tracing::debug!("Refresh schedule disarmed");
        }
    }

    /// True while a timer task is armed and running.
    pub(crate) fn is_scheduled(&self) -> bool {
        self.handle
            .lock()
            .unwrap()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

async fn run(session: Weak<Session>) {
    loop {
        let delay = match session.upgrade() {
            Some(session) => session.next_refresh_delay(),
            None => return,
        };

        tokio::time::sleep(delay).await;

        let Some(session) = session.upgrade() else {
            return;
        };

        match session.refresh_token() {
            Ok(Some(_)) => {}
            // Tokens gone (or unreadable): nothing left to refresh
            Ok(None) | Err(_) => {
                tracing::debug!("No refresh token at tick time, schedule going idle");
                return;
            }
        }

        match session.refresh().await {
            Ok(()) => {
                tracing::trace!("Scheduled refresh complete, re-arming");
            }
            Err(error) => {
                // The refresh path has already cleared the session
                tracing::warn!("Scheduled refresh failed, schedule going idle: {}", error);
                return;
            }
        }
    }
}
