//! Session state machine
//!
//! Tracks one relay session from the first connect to the final close.
//! Every method here is synchronous and takes the current time as an
//! argument; the worker owns the sockets and timers and turns the returned
//! [`Step`] into I/O.
//!
//! ```text
//!            start            connected           200 / silence
//!   Idle ──────────► Connecting ──────► Handshaking ─────────────► Streaming
//!                      ▲    │               │  │                      │
//!                      │    │ error         │  │ 404: next mount      │ write error,
//!                      │    ▼               │  └──────► Connecting    │ server close
//!                      └─ Retrying ◄────────┘ error                   │
//!               retry due    ▲                                        │
//!                            └────────────────────────────────────────┘
//!
//!   401/403, no mounts left, retry budget spent ──► Rejected(reason)
//!   stop (any phase) ─────────────────────────────► Closed
//! ```

use std::time::Duration;

use tokio::time::Instant;

use super::event::StatusEvent;
use super::SessionId;
use crate::client::{BackoffPolicy, MountResolver};
use crate::error::RelayError;
use crate::protocol::response::ResponseClass;

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Created, nothing attempted yet
    Idle,
    /// TCP connect in progress
    Connecting,
    /// Request sent, waiting for the server's verdict
    Handshaking,
    /// Accepted; audio flows to the server
    Streaming,
    /// Waiting out a backoff delay
    Retrying,
    /// Ended by the server or by the retry budget
    Rejected(RejectReason),
    /// Ended by the producer
    Closed,
}

impl SessionPhase {
    /// Whether the session has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Rejected(_) | SessionPhase::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Connecting => "connecting",
            SessionPhase::Handshaking => "handshaking",
            SessionPhase::Streaming => "streaming",
            SessionPhase::Retrying => "retrying",
            SessionPhase::Rejected(RejectReason::Authentication) => "rejected-auth",
            SessionPhase::Rejected(RejectReason::MountsExhausted) => "rejected-mounts",
            SessionPhase::Rejected(RejectReason::BackoffExceeded) => "rejected-backoff",
            SessionPhase::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Authentication,
    MountsExhausted,
    BackoffExceeded,
}

/// What the worker must do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Nothing changes on the wire
    Stay,
    /// Drop any connection and connect to the current mount
    Connect,
    /// Handshake complete; start writing audio
    Stream,
    /// Drop the connection and wait until the deadline
    Wait(Instant),
    /// Drop the connection and end the session
    Finish,
}

/// Complete state of one relay session
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: SessionId,

    phase: SessionPhase,
    mounts: MountResolver,
    backoff: BackoffPolicy,

    /// Consecutive failures since the last time streaming was reached
    retry_count: u32,
    next_retry_at: Option<Instant>,

    /// Connections opened over the session's lifetime
    connect_attempts: u32,
    /// Times the session went back to retrying
    reconnects: u32,

    bytes_forwarded: u64,
    chunks_forwarded: u64,

    pub created_at: Instant,
    last_activity: Instant,
    streaming_since: Option<Instant>,
    streaming_total: Duration,
    last_error: Option<RelayError>,

    events: Vec<StatusEvent>,
}

impl SessionState {
    pub fn new(id: SessionId, mounts: MountResolver, backoff: BackoffPolicy, now: Instant) -> Self {
        Self {
            id,
            phase: SessionPhase::Idle,
            mounts,
            backoff,
            retry_count: 0,
            next_retry_at: None,
            connect_attempts: 0,
            reconnects: 0,
            bytes_forwarded: 0,
            chunks_forwarded: 0,
            created_at: now,
            last_activity: now,
            streaming_since: None,
            streaming_total: Duration::ZERO,
            last_error: None,
            events: Vec::new(),
        }
    }

    /// Leave `Idle` and connect to the first mount
    pub fn start(&mut self, now: Instant) -> Step {
        if self.phase != SessionPhase::Idle {
            return Step::Stay;
        }
        self.last_activity = now;
        self.enter_connecting()
    }

    /// The socket connected and the request went out
    pub fn on_connected(&mut self) -> Step {
        if self.phase == SessionPhase::Connecting {
            self.phase = SessionPhase::Handshaking;
            self.events.push(StatusEvent::Handshaking {
                mount: self.mount().to_string(),
            });
        }
        Step::Stay
    }

    /// Apply a classified handshake response
    pub fn on_response(&mut self, class: ResponseClass, status_line: &str, now: Instant) -> Step {
        if self.phase != SessionPhase::Handshaking {
            return Step::Stay;
        }

        match class {
            ResponseClass::Incomplete => Step::Stay,
            ResponseClass::Accepted => self.enter_streaming(now),
            ResponseClass::AuthRejected => self.reject(
                RejectReason::Authentication,
                RelayError::Authentication {
                    status_line: status_line.to_string(),
                },
            ),
            ResponseClass::MountUnavailable => {
                let rejected = self.mount().to_string();
                self.last_error = Some(RelayError::MountUnavailable {
                    mount: rejected.clone(),
                });
                self.events
                    .push(StatusEvent::MountRejected { mount: rejected });

                match self.mounts.advance() {
                    Ok(_) => self.enter_connecting(),
                    Err(e) => self.reject(RejectReason::MountsExhausted, e),
                }
            }
            ResponseClass::Unrecognized => self.on_failure(
                now,
                RelayError::Protocol(format!("unrecognized response: {:?}", status_line)),
            ),
        }
    }

    /// No verdict arrived before the acceptance timeout: silence means yes
    pub fn on_acceptance_timeout(&mut self, now: Instant) -> Step {
        if self.phase != SessionPhase::Handshaking {
            return Step::Stay;
        }
        self.enter_streaming(now)
    }

    /// A retryable failure: schedule a reconnect or give up
    pub fn on_failure(&mut self, now: Instant, err: RelayError) -> Step {
        if self.phase.is_terminal() {
            return Step::Finish;
        }
        if err.is_terminal() {
            let reason = match err {
                RelayError::Authentication { .. } => RejectReason::Authentication,
                RelayError::MountsExhausted { .. } => RejectReason::MountsExhausted,
                _ => RejectReason::BackoffExceeded,
            };
            return self.reject(reason, err);
        }

        self.leave_streaming(now);
        self.retry_count += 1;

        if !self.backoff.allows(self.retry_count + 1) {
            self.last_error = Some(err);
            return self.reject(
                RejectReason::BackoffExceeded,
                RelayError::BackoffExceeded {
                    attempts: self.retry_count,
                },
            );
        }

        let delay = self.backoff.delay(self.retry_count);
        let at = now + delay;
        self.phase = SessionPhase::Retrying;
        self.next_retry_at = Some(at);
        self.reconnects += 1;
        self.events.push(StatusEvent::Reconnecting {
            attempt: self.retry_count,
            delay,
            reason: err.to_string(),
        });
        self.last_error = Some(err);

        Step::Wait(at)
    }

    /// The server closed the socket while audio was flowing
    pub fn on_upstream_closed(&mut self, now: Instant, reconnect: bool) -> Step {
        if self.phase == SessionPhase::Streaming && !reconnect {
            self.leave_streaming(now);
            self.phase = SessionPhase::Closed;
            self.events.push(StatusEvent::Disconnected);
            return Step::Finish;
        }
        self.on_failure(
            now,
            RelayError::Connect("server closed the connection".to_string()),
        )
    }

    /// The backoff delay elapsed
    pub fn on_retry_due(&mut self, now: Instant) -> Step {
        match self.next_retry_at {
            Some(at) if self.phase == SessionPhase::Retrying && now >= at => {
                self.next_retry_at = None;
                self.enter_connecting()
            }
            _ => Step::Stay,
        }
    }

    /// The producer ended the session
    pub fn stop(&mut self, now: Instant) -> Step {
        if !self.phase.is_terminal() {
            self.leave_streaming(now);
            self.phase = SessionPhase::Closed;
            self.next_retry_at = None;
            self.events.push(StatusEvent::Disconnected);
        }
        Step::Finish
    }

    /// Count bytes that reached the server
    pub fn record_forwarded(&mut self, bytes: usize, chunk_complete: bool, now: Instant) {
        self.bytes_forwarded += bytes as u64;
        if chunk_complete {
            self.chunks_forwarded += 1;
        }
        self.last_activity = now;
    }

    /// Note producer activity
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Drain the status events produced by transitions so far
    pub fn take_events(&mut self) -> Vec<StatusEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Mount currently targeted
    pub fn mount(&self) -> &str {
        self.mounts.current()
    }

    pub fn mount_index(&self) -> usize {
        self.mounts.index()
    }

    pub fn mounts(&self) -> &MountResolver {
        &self.mounts
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn next_retry_at(&self) -> Option<Instant> {
        self.next_retry_at
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts
    }

    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    pub fn bytes_forwarded(&self) -> u64 {
        self.bytes_forwarded
    }

    pub fn chunks_forwarded(&self) -> u64 {
        self.chunks_forwarded
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn last_error(&self) -> Option<&RelayError> {
        self.last_error.as_ref()
    }

    /// Total time spent streaming, including the current run
    pub fn streaming_time(&self, now: Instant) -> Duration {
        let current = self
            .streaming_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        self.streaming_total + current
    }

    fn enter_connecting(&mut self) -> Step {
        self.phase = SessionPhase::Connecting;
        self.connect_attempts += 1;
        self.events.push(StatusEvent::Connecting {
            mount: self.mount().to_string(),
            attempt: self.retry_count + 1,
        });
        Step::Connect
    }

    fn enter_streaming(&mut self, now: Instant) -> Step {
        self.phase = SessionPhase::Streaming;
        self.retry_count = 0;
        self.next_retry_at = None;
        self.streaming_since = Some(now);
        self.events.push(StatusEvent::Connected {
            mount: self.mount().to_string(),
        });
        Step::Stream
    }

    fn leave_streaming(&mut self, now: Instant) {
        if let Some(since) = self.streaming_since.take() {
            self.streaming_total += now.saturating_duration_since(since);
        }
    }

    fn reject(&mut self, reason: RejectReason, err: RelayError) -> Step {
        self.phase = SessionPhase::Rejected(reason);
        self.next_retry_at = None;
        self.events.push(StatusEvent::Failed(err.clone()));
        self.last_error = Some(err);
        Step::Finish
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(mounts: &[&str], max_attempts: u32) -> SessionState {
        let backoff = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(30), max_attempts);
        SessionState::new(1, MountResolver::new(mounts), backoff, Instant::now())
    }

    fn handshaking(state: &mut SessionState) {
        assert_eq!(state.start(Instant::now()), Step::Connect);
        assert_eq!(state.on_connected(), Step::Stay);
        assert_eq!(state.phase(), SessionPhase::Handshaking);
    }

    #[test]
    fn test_accepted_reaches_streaming() {
        let mut s = state(&["/live"], 5);
        handshaking(&mut s);

        let step = s.on_response(ResponseClass::Accepted, "HTTP/1.0 200 OK", Instant::now());
        assert_eq!(step, Step::Stream);
        assert_eq!(s.phase(), SessionPhase::Streaming);

        let events = s.take_events();
        assert!(matches!(events[0], StatusEvent::Connecting { attempt: 1, .. }));
        assert!(matches!(events[1], StatusEvent::Handshaking { .. }));
        assert_eq!(events[2], StatusEvent::Connected { mount: "/live".into() });
    }

    #[test]
    fn test_silence_reaches_streaming() {
        let mut s = state(&["/"], 5);
        handshaking(&mut s);

        assert_eq!(s.on_acceptance_timeout(Instant::now()), Step::Stream);
        assert_eq!(s.phase(), SessionPhase::Streaming);
    }

    #[test]
    fn test_not_found_advances_exactly_once() {
        let mut s = state(&["/", "/live"], 5);
        handshaking(&mut s);

        let step = s.on_response(
            ResponseClass::MountUnavailable,
            "HTTP/1.0 404 File Not Found",
            Instant::now(),
        );
        assert_eq!(step, Step::Connect);
        assert_eq!(s.mount_index(), 1);
        assert_eq!(s.mount(), "/live");
        assert_eq!(s.phase(), SessionPhase::Connecting);
        // A rejected mount is not a failure
        assert_eq!(s.retry_count(), 0);

        s.on_connected();
        s.on_response(ResponseClass::Accepted, "HTTP/1.0 200 OK", Instant::now());
        assert_eq!(s.phase(), SessionPhase::Streaming);
        assert_eq!(s.mount_index(), 1);
    }

    #[test]
    fn test_not_found_on_last_mount_exhausts() {
        let mut s = state(&["/", "/live"], 5);
        for _ in 0..2 {
            if s.phase() == SessionPhase::Idle {
                handshaking(&mut s);
            } else {
                s.on_connected();
            }
            s.on_response(ResponseClass::MountUnavailable, "HTTP/1.0 404", Instant::now());
        }

        assert_eq!(
            s.phase(),
            SessionPhase::Rejected(RejectReason::MountsExhausted)
        );
        let events = s.take_events();
        assert_eq!(
            events.last(),
            Some(&StatusEvent::Failed(RelayError::MountsExhausted {
                tried: vec!["/".into(), "/live".into()]
            }))
        );
    }

    #[test]
    fn test_auth_rejection_is_terminal() {
        let mut s = state(&["/", "/live"], 5);
        handshaking(&mut s);

        let step = s.on_response(
            ResponseClass::AuthRejected,
            "HTTP/1.0 401 Unauthorized",
            Instant::now(),
        );
        assert_eq!(step, Step::Finish);
        assert_eq!(s.phase(), SessionPhase::Rejected(RejectReason::Authentication));
        // No mount retry and nothing scheduled
        assert_eq!(s.mount_index(), 0);
        assert_eq!(s.next_retry_at(), None);
        assert_eq!(s.on_retry_due(Instant::now()), Step::Stay);
        assert_eq!(s.connect_attempts(), 1);
    }

    #[test]
    fn test_failures_back_off_until_budget_spent() {
        let mut s = state(&["/"], 4);
        let start = Instant::now();
        assert_eq!(s.start(start), Step::Connect);

        let mut delays = Vec::new();
        let mut now = start;
        loop {
            match s.on_failure(now, RelayError::Connect("refused".into())) {
                Step::Wait(at) => {
                    delays.push(at - now);
                    now = at;
                    assert_eq!(s.on_retry_due(now), Step::Connect);
                }
                Step::Finish => break,
                other => panic!("unexpected step {:?}", other),
            }
        }

        // Four attempts in total: the first plus three retries
        assert_eq!(s.connect_attempts(), 4);
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(s.phase(), SessionPhase::Rejected(RejectReason::BackoffExceeded));
        assert_eq!(
            s.take_events().last(),
            Some(&StatusEvent::Failed(RelayError::BackoffExceeded { attempts: 4 }))
        );
    }

    #[test]
    fn test_retry_not_due_early() {
        let mut s = state(&["/"], 5);
        let now = Instant::now();
        s.start(now);
        let Step::Wait(at) = s.on_failure(now, RelayError::Connect("refused".into())) else {
            panic!("expected wait");
        };

        assert_eq!(s.on_retry_due(at - Duration::from_millis(1)), Step::Stay);
        assert_eq!(s.on_retry_due(at), Step::Connect);
    }

    #[test]
    fn test_streaming_resets_retry_count() {
        let mut s = state(&["/"], 5);
        let now = Instant::now();
        s.start(now);
        s.on_failure(now, RelayError::Connect("refused".into()));
        s.on_failure(now, RelayError::Connect("refused".into()));
        assert_eq!(s.retry_count(), 2);

        s.phase = SessionPhase::Handshaking;
        s.on_acceptance_timeout(now);
        assert_eq!(s.retry_count(), 0);

        // A later write error starts over at the base delay
        let Step::Wait(at) = s.on_failure(now, RelayError::Connect("broken pipe".into())) else {
            panic!("expected wait");
        };
        assert_eq!(at - now, Duration::from_secs(1));
        assert_eq!(s.mount(), "/");
    }

    #[test]
    fn test_upstream_close_respects_reconnect_flag() {
        let mut s = state(&["/"], 5);
        handshaking(&mut s);
        s.on_acceptance_timeout(Instant::now());
        assert!(matches!(
            s.on_upstream_closed(Instant::now(), true),
            Step::Wait(_)
        ));

        let mut s = state(&["/"], 5);
        handshaking(&mut s);
        s.on_acceptance_timeout(Instant::now());
        assert_eq!(s.on_upstream_closed(Instant::now(), false), Step::Finish);
        assert_eq!(s.phase(), SessionPhase::Closed);
    }

    #[test]
    fn test_unrecognized_response_is_retryable() {
        let mut s = state(&["/"], 5);
        handshaking(&mut s);

        let step = s.on_response(
            ResponseClass::Unrecognized,
            "HTTP/1.0 500 Internal Server Error",
            Instant::now(),
        );
        assert!(matches!(step, Step::Wait(_)));
        assert!(matches!(s.last_error(), Some(RelayError::Protocol(_))));
    }

    #[test]
    fn test_stop_from_retrying() {
        let mut s = state(&["/"], 5);
        let now = Instant::now();
        s.start(now);
        s.on_failure(now, RelayError::Connect("refused".into()));
        s.take_events();

        assert_eq!(s.stop(now), Step::Finish);
        assert_eq!(s.phase(), SessionPhase::Closed);
        assert_eq!(s.next_retry_at(), None);
        assert_eq!(s.take_events(), vec![StatusEvent::Disconnected]);

        // Stopping twice reports nothing new
        assert_eq!(s.stop(now), Step::Finish);
        assert!(s.take_events().is_empty());
    }

    #[test]
    fn test_streaming_time_accumulates() {
        let mut s = state(&["/"], 5);
        let t0 = Instant::now();
        handshaking(&mut s);
        s.on_acceptance_timeout(t0);
        s.on_failure(t0 + Duration::from_secs(3), RelayError::Connect("eof".into()));
        assert_eq!(
            s.streaming_time(t0 + Duration::from_secs(10)),
            Duration::from_secs(3)
        );
    }
}
