//! Push-stream subscription for one session.
//!
//! Frames are decoded in wire order into [`DebateEvent`]s. Problems never
//! surface as `Err`; they become [`DebateEvent::StreamError`] with a
//! [`FailureKind`]:
//!
//! | Condition | Kind | Fatal |
//! |-----------|------|-------|
//! | undecodable payload / unknown event | `Malformed` | at the configured run length |
//! | transport read error | `Transport` | yes |
//! | stream ended | `Closed` | yes |
//! | no bytes within the idle window | `IdleTimeout` | yes |

use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, trace, warn};

use debate_core::events::{DebateEvent, FailureKind, StreamFailure};
use debate_core::ids::SessionId;
use debate_core::stream::EventStream;
use debate_settings::StreamSettings;

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_MAX_CONSECUTIVE_MALFORMED: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// `None` disables the idle watchdog.
    pub idle_timeout: Option<Duration>,
    /// Consecutive malformed payloads that turn into a fatal failure.
    pub max_consecutive_malformed: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            max_consecutive_malformed: DEFAULT_MAX_CONSECUTIVE_MALFORMED,
        }
    }
}

impl StreamConfig {
    pub fn from_settings(settings: &StreamSettings) -> Self {
        Self {
            idle_timeout: settings.idle_timeout(),
            max_consecutive_malformed: settings.max_consecutive_malformed.max(1),
        }
    }
}

pub struct Dispatcher {
    session_id: SessionId,
    stream: Option<EventStream>,
    config: StreamConfig,
    consecutive_malformed: u32,
}

impl Dispatcher {
    pub fn new(session_id: SessionId, stream: EventStream, config: StreamConfig) -> Self {
        debug!(session_id = %session_id, "subscription opened");
        Self {
            session_id,
            stream: Some(stream),
            config,
            consecutive_malformed: 0,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Release the underlying stream. Only the first call does anything;
    /// returns whether this call closed it.
    pub fn close(&mut self) -> bool {
        match self.stream.take() {
            Some(stream) => {
                drop(stream);
                debug!(session_id = %self.session_id, "subscription closed");
                true
            }
            None => false,
        }
    }

    /// Wait for the next event. `None` once closed.
    ///
    /// Heartbeat frames restart the idle window and are not surfaced.
    /// Cancel-safe: dropping the future loses no frame.
    pub async fn next(&mut self) -> Option<DebateEvent> {
        let frame = loop {
            let stream = self.stream.as_mut()?;
            let item = match self.config.idle_timeout {
                Some(window) => match tokio::time::timeout(window, stream.next()).await {
                    Ok(item) => item,
                    Err(_) => {
                        return Some(fatal(
                            FailureKind::IdleTimeout,
                            format!("no stream activity for {}s", window.as_secs()),
                        ));
                    }
                },
                None => stream.next().await,
            };

            match item {
                Some(Ok(frame)) if frame.is_heartbeat() => {
                    trace!(session_id = %self.session_id, "stream heartbeat");
                }
                Some(Ok(frame)) => break frame,
                Some(Err(e)) => return Some(fatal(FailureKind::Transport, e.to_string())),
                None => {
                    return Some(fatal(
                        FailureKind::Closed,
                        "stream closed before the debate completed".to_string(),
                    ));
                }
            }
        };

        match DebateEvent::decode(&frame) {
            Ok(event) => {
                self.consecutive_malformed = 0;
                debug!(session_id = %self.session_id, event = event.name(), "stream event");
                Some(event)
            }
            Err(e) => {
                self.consecutive_malformed += 1;
                let consecutive = self.consecutive_malformed;
                let fatal = consecutive >= self.config.max_consecutive_malformed;
                warn!(
                    session_id = %self.session_id,
                    event = %frame.event,
                    consecutive,
                    fatal,
                    error = %e,
                    "malformed stream payload"
                );
                let message = if fatal {
                    format!("{consecutive} consecutive malformed stream events, last: {e}")
                } else {
                    e.to_string()
                };
                Some(DebateEvent::StreamError(StreamFailure {
                    kind: FailureKind::Malformed { consecutive },
                    message,
                    fatal,
                }))
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if self.close() {
            debug!(session_id = %self.session_id, "subscription released on teardown");
        }
    }
}

fn fatal(kind: FailureKind, message: String) -> DebateEvent {
    DebateEvent::StreamError(StreamFailure {
        kind,
        message,
        fatal: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use debate_core::errors::ApiError;
    use debate_core::stream::SseFrame;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn frames(items: Vec<Result<SseFrame, ApiError>>) -> EventStream {
        Box::pin(futures::stream::iter(items))
    }

    fn good(event: &str, data: &str) -> Result<SseFrame, ApiError> {
        Ok(SseFrame::new(event, data))
    }

    fn no_watchdog() -> StreamConfig {
        StreamConfig {
            idle_timeout: None,
            ..StreamConfig::default()
        }
    }

    fn failure(event: Option<DebateEvent>) -> StreamFailure {
        match event {
            Some(DebateEvent::StreamError(f)) => f,
            other => panic!("expected stream error, got {other:?}"),
        }
    }

    #[test]
    fn config_from_settings() {
        let settings = StreamSettings {
            idle_timeout_ms: 0,
            max_consecutive_malformed: 5,
        };
        let config = StreamConfig::from_settings(&settings);
        assert_eq!(config.idle_timeout, None);
        assert_eq!(config.max_consecutive_malformed, 5);
        assert_eq!(
            StreamConfig::from_settings(&StreamSettings::default()),
            StreamConfig::default()
        );
    }

    #[tokio::test]
    async fn decodes_in_wire_order() {
        let mut d = Dispatcher::new(
            SessionId::from("s"),
            frames(vec![
                good("debate_started", "{}"),
                good("round_complete", r#"{"round":1}"#),
                good("debate_complete", r#"{"total_rounds":1}"#),
            ]),
            no_watchdog(),
        );
        assert!(matches!(d.next().await, Some(DebateEvent::DebateStarted(_))));
        assert!(matches!(d.next().await, Some(DebateEvent::RoundComplete(_))));
        assert!(matches!(d.next().await, Some(DebateEvent::DebateComplete(_))));
    }

    #[tokio::test]
    async fn malformed_run_escalates_at_limit() {
        let mut d = Dispatcher::new(
            SessionId::from("s"),
            frames(vec![
                good("message", "not json"),
                good("round_complete", "{}"),
                good("surprise", "{}"),
            ]),
            no_watchdog(),
        );
        let first = failure(d.next().await);
        assert_eq!(first.kind, FailureKind::Malformed { consecutive: 1 });
        assert!(!first.fatal);
        let second = failure(d.next().await);
        assert!(!second.fatal);
        let third = failure(d.next().await);
        assert_eq!(third.kind, FailureKind::Malformed { consecutive: 3 });
        assert!(third.fatal);
    }

    #[tokio::test]
    async fn good_event_resets_malformed_run() {
        let mut d = Dispatcher::new(
            SessionId::from("s"),
            frames(vec![
                good("message", "{"),
                good("message", "{"),
                good("debate_started", "{}"),
                good("message", "{"),
            ]),
            no_watchdog(),
        );
        let _ = d.next().await;
        let _ = d.next().await;
        assert!(matches!(d.next().await, Some(DebateEvent::DebateStarted(_))));
        let after = failure(d.next().await);
        assert_eq!(after.kind, FailureKind::Malformed { consecutive: 1 });
        assert!(!after.fatal);
    }

    #[tokio::test]
    async fn end_of_stream_is_fatal_close() {
        let mut d = Dispatcher::new(SessionId::from("s"), frames(vec![]), no_watchdog());
        let f = failure(d.next().await);
        assert_eq!(f.kind, FailureKind::Closed);
        assert!(f.fatal);
    }

    #[tokio::test]
    async fn transport_error_is_fatal() {
        let mut d = Dispatcher::new(
            SessionId::from("s"),
            frames(vec![Err(ApiError::StreamInterrupted("reset".into()))]),
            no_watchdog(),
        );
        let f = failure(d.next().await);
        assert_eq!(f.kind, FailureKind::Transport);
        assert!(f.message.contains("reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_watchdog_fires() {
        let config = StreamConfig {
            idle_timeout: Some(Duration::from_secs(30)),
            ..StreamConfig::default()
        };
        let mut d = Dispatcher::new(
            SessionId::from("s"),
            Box::pin(futures::stream::pending()),
            config,
        );
        let started = tokio::time::Instant::now();
        let f = failure(d.next().await);
        assert_eq!(f.kind, FailureKind::IdleTimeout);
        assert!(f.fatal);
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn keep_alive_comments_hold_off_the_watchdog() {
        use bytes::Bytes;

        let config = StreamConfig {
            idle_timeout: Some(Duration::from_secs(120)),
            ..StreamConfig::default()
        };
        let mut chunks: Vec<&'static str> = vec![": ping\n\n"; 7];
        chunks.push("event: debate_started\ndata: {\"models\":[\"A\"]}\n\n");
        let body = futures::stream::iter(chunks).then(|chunk| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes()))
        });

        let mut d = Dispatcher::new(
            SessionId::from("s"),
            debate_client::sse::frame_stream(body),
            config,
        );
        let started = tokio::time::Instant::now();
        assert!(matches!(d.next().await, Some(DebateEvent::DebateStarted(_))));
        assert!(started.elapsed() >= Duration::from_secs(240));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_alone_do_not_reach_the_controller() {
        let config = StreamConfig {
            idle_timeout: Some(Duration::from_secs(30)),
            ..StreamConfig::default()
        };
        let stream = futures::stream::iter(vec![
            Ok(SseFrame::heartbeat()),
            Ok(SseFrame::heartbeat()),
        ])
        .chain(futures::stream::pending());
        let mut d = Dispatcher::new(SessionId::from("s"), Box::pin(stream), config);
        let f = failure(d.next().await);
        assert_eq!(f.kind, FailureKind::IdleTimeout);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dropped = Arc::new(AtomicBool::new(false));
        struct Flag(Arc<AtomicBool>);
        impl Drop for Flag {
            fn drop(&mut self) {
                assert!(!self.0.swap(true, Ordering::SeqCst), "released twice");
            }
        }
        let flag = Flag(Arc::clone(&dropped));
        let stream = futures::stream::pending::<Result<SseFrame, ApiError>>().map(move |item| {
            let _held = &flag;
            item
        });

        let mut d = Dispatcher::new(SessionId::from("s"), Box::pin(stream), no_watchdog());
        assert!(d.close());
        assert!(dropped.load(Ordering::SeqCst));
        assert!(!d.close());
        assert!(d.is_closed());
        assert!(d.next().await.is_none());
        drop(d);
    }

    #[tokio::test]
    async fn drop_releases_open_stream() {
        let dropped = Arc::new(AtomicBool::new(false));
        struct Flag(Arc<AtomicBool>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        let flag = Flag(Arc::clone(&dropped));
        let stream = futures::stream::pending::<Result<SseFrame, ApiError>>().map(move |item| {
            let _held = &flag;
            item
        });

        let d = Dispatcher::new(SessionId::from("s"), Box::pin(stream), no_watchdog());
        drop(d);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
