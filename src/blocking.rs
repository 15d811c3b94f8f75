//! Extended read timeouts for commands whose remote completion time is unbounded.

use std::ops::{Deref, DerefMut};
use std::thread;
use std::time::{Duration, Instant};

use crate::commands::IS_BUSY;
use crate::error::RobolinkError;
use crate::model::Handle;
use crate::request::{Request, Response};
use crate::session::Session;
use crate::transport::Transport;

pub const DEFAULT_EXTENDED_TIMEOUT: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Widens a session's read timeout and puts `restore` back when dropped.
///
/// Restoration happens on every exit path, including early returns and
/// unwinding, so a failed blocking call never leaves the session with the
/// extended timeout.
#[derive(Debug)]
pub struct TimeoutGuard<'s, T: Transport> {
    session: &'s mut Session<T>,
    restore: Duration,
}

impl<'s, T: Transport> TimeoutGuard<'s, T> {
    pub fn extend(
        session: &'s mut Session<T>,
        extended: Duration,
        restore: Duration,
    ) -> Result<Self, RobolinkError> {
        debug!(?extended, ?restore, "extending read timeout");
        if let Err(err) = session.set_timeout(extended) {
            let _ = session.set_timeout(restore);
            return Err(err);
        }
        Ok(Self { session, restore })
    }
}

impl<T: Transport> Deref for TimeoutGuard<'_, T> {
    type Target = Session<T>;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl<T: Transport> DerefMut for TimeoutGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl<T: Transport> Drop for TimeoutGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.session.set_timeout(self.restore) {
            warn!(error = %err, "failed to restore read timeout on socket");
        }
    }
}

/// Runs `request` with `extended_timeout`, then restores `default_timeout`.
pub fn call_blocking<T: Transport>(
    session: &mut Session<T>,
    request: &Request,
    default_timeout: Duration,
    extended_timeout: Duration,
) -> Result<Response, RobolinkError> {
    let mut guard = TimeoutGuard::extend(session, extended_timeout, default_timeout)?;
    guard.call(request)
}

/// Polls the busy query for `handle` until it reports idle or `timeout` elapses.
///
/// Each poll runs under `extended_timeout`; the session's timeout is back to
/// `default_timeout` when this returns. Elapsing is reported as
/// [`RobolinkError::WaitTimeout`].
pub fn wait_until_idle<T: Transport>(
    session: &mut Session<T>,
    handle: Handle,
    timeout: Duration,
    poll_interval: Duration,
    default_timeout: Duration,
    extended_timeout: Duration,
) -> Result<(), RobolinkError> {
    let mut guard = TimeoutGuard::extend(session, extended_timeout, default_timeout)?;
    let request = Request::for_command(&IS_BUSY).arg(handle);
    let deadline = Instant::now() + timeout;

    loop {
        let busy = guard.call(&request)?.take_int()?;
        if busy == 0 {
            return Ok(());
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!(%handle, ?timeout, "item still busy at deadline");
            return Err(RobolinkError::WaitTimeout { timeout });
        }
        thread::sleep(poll_interval.min(remaining));
    }
}
