use log::{info, warn};
use thiserror::Error;

use crate::{
    clock::{Delay, Interval, Millis},
    types::ConnectionState,
};

pub trait BrokerSession {
    /// Attempts a connection. Zero means connected, anything else is a [`ConnectError`] code.
    fn connect(&mut self) -> i8;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    fn ping(&mut self) -> bool;
    fn publish(&mut self, topic: &str, payload: &[u8]) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("The Server does not support the level of the MQTT protocol requested")]
    WrongProtocol,
    #[error("The Client identifier is correct UTF-8 but not allowed by the Server")]
    IdRejected,
    #[error("The MQTT service is unavailable")]
    ServerUnavailable,
    #[error("The data in the user name or password is malformed")]
    BadCredentials,
    #[error("Not authorized to connect")]
    NotAuthorized,
    #[error("Exceeded reconnect rate limit. Please try again later.")]
    RateLimited,
    #[error("You have been banned from connecting. Please contact the MQTT server administrator for more details.")]
    Banned,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Failed to subscribe")]
    SubscribeFailed,
    #[error("Unknown error ({0})")]
    Unknown(i8),
}

impl ConnectError {
    /// Maps a non-zero connect status. Zero is success and has no error.
    pub fn from_code(code: i8) -> Option<Self> {
        let err = match code {
            0 => return None,
            1 => Self::WrongProtocol,
            2 => Self::IdRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadCredentials,
            5 => Self::NotAuthorized,
            6 => Self::RateLimited,
            7 => Self::Banned,
            -1 => Self::ConnectionFailed,
            -2 => Self::SubscribeFailed,
            other => Self::Unknown(other),
        };
        Some(err)
    }

    pub fn code(self) -> i8 {
        match self {
            Self::WrongProtocol => 1,
            Self::IdRejected => 2,
            Self::ServerUnavailable => 3,
            Self::BadCredentials => 4,
            Self::NotAuthorized => 5,
            Self::RateLimited => 6,
            Self::Banned => 7,
            Self::ConnectionFailed => -1,
            Self::SubscribeFailed => -2,
            Self::Unknown(code) => code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heartbeat {
    NotDue,
    Alive,
    Lost,
}

/// Owns the broker session and its connect/keepalive state machine.
///
/// Reconnection blocks the caller: every failed attempt is followed by a
/// fixed backoff sleep and there is no retry ceiling, so an unreachable
/// broker keeps the device in [`ConnectionManager::ensure_connected`]
/// forever.
pub struct ConnectionManager<S, D> {
    session: S,
    delay: D,
    state: ConnectionState,
    keepalive: Interval,
    backoff_ms: u32,
}

impl<S: BrokerSession, D: Delay> ConnectionManager<S, D> {
    pub fn new(session: S, delay: D, keepalive_interval_ms: Millis, backoff_ms: u32) -> Self {
        Self {
            session,
            delay,
            state: ConnectionState::Disconnected,
            keepalive: Interval::new(keepalive_interval_ms, 0),
            backoff_ms,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn delay_mut(&mut self) -> &mut D {
        &mut self.delay
    }

    pub fn last_ping_ms(&self) -> Millis {
        self.keepalive.start_ms()
    }

    /// Re-reads transport health. A gone transport is torn down and the
    /// state drops to `Disconnected`.
    pub fn is_healthy(&mut self) -> bool {
        if self.state == ConnectionState::Connected && !self.session.is_connected() {
            warn!("broker session lost");
            self.session.disconnect();
            self.state = ConnectionState::Disconnected;
        }
        self.state == ConnectionState::Connected
    }

    pub fn connect_step(&mut self) -> Result<(), ConnectError> {
        match ConnectError::from_code(self.session.connect()) {
            None => {
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Some(err) => {
                self.session.disconnect();
                self.state = ConnectionState::Disconnected;
                Err(err)
            }
        }
    }

    /// Blocks until connected. Returns the number of failed attempts.
    pub fn ensure_connected(&mut self) -> u32 {
        if self.is_healthy() {
            return 0;
        }

        info!("connecting to broker");
        let mut failures = 0_u32;
        while let Err(err) = self.connect_step() {
            failures = failures.saturating_add(1);
            warn!("broker connect failed (code {}): {err}", err.code());
            warn!(
                "retrying broker connection in {} seconds",
                self.backoff_ms / 1000
            );
            self.delay.delay_ms(self.backoff_ms);
        }
        info!("broker connected after {failures} failed attempt(s)");
        failures
    }

    pub fn heartbeat(&mut self, now: Millis) -> Heartbeat {
        if !self.keepalive.is_due(now) {
            return Heartbeat::NotDue;
        }
        self.keepalive.restart(now);

        info!("pinging broker");
        if self.session.ping() {
            Heartbeat::Alive
        } else {
            warn!("broker ping failed; disconnecting");
            self.session.disconnect();
            self.state = ConnectionState::Disconnected;
            Heartbeat::Lost
        }
    }

    /// Tears down any live session and clears connection and keepalive state.
    pub fn reset(&mut self, now: Millis) {
        if self.state == ConnectionState::Connected || self.session.is_connected() {
            self.session.disconnect();
        }
        self.state = ConnectionState::Disconnected;
        self.keepalive.restart(now);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;

    use super::*;

    /// Scripted broker: connect results are consumed in order, then 0 forever.
    #[derive(Debug, Default)]
    pub struct ScriptedSession {
        pub connect_results: VecDeque<i8>,
        pub ping_results: VecDeque<bool>,
        pub connected: bool,
        pub connect_calls: u32,
        pub disconnect_calls: u32,
        pub ping_calls: u32,
        pub published: Vec<(String, String)>,
        pub refuse_publish: bool,
    }

    impl ScriptedSession {
        pub fn failing_then_ok(failures: &[i8]) -> Self {
            Self {
                connect_results: failures.iter().copied().collect(),
                ..Self::default()
            }
        }
    }

    impl BrokerSession for ScriptedSession {
        fn connect(&mut self) -> i8 {
            self.connect_calls += 1;
            let code = self.connect_results.pop_front().unwrap_or(0);
            self.connected = code == 0;
            code
        }

        fn disconnect(&mut self) {
            self.disconnect_calls += 1;
            self.connected = false;
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn ping(&mut self) -> bool {
            self.ping_calls += 1;
            self.ping_results.pop_front().unwrap_or(true)
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) -> bool {
            if self.refuse_publish {
                return false;
            }
            self.published.push((
                topic.to_string(),
                String::from_utf8_lossy(payload).into_owned(),
            ));
            true
        }
    }

    #[derive(Debug, Default)]
    pub struct RecordingDelay {
        pub sleeps: Vec<u32>,
    }

    impl Delay for RecordingDelay {
        fn delay_ms(&mut self, ms: u32) {
            self.sleeps.push(ms);
        }
    }
}
