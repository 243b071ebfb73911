//! Notification cues for the surrounding UI (sounds, badges, ...).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Message,
    Error,
    Success,
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, kind: NotificationKind);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn notify(&self, _kind: NotificationKind) {}
}

/// Records cues as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, kind: NotificationKind) {
        info!(?kind, "notification");
    }
}

/// Wraps a sink with an on/off switch; cues are dropped while disabled.
#[derive(Debug)]
pub struct ToggleSink<S> {
    inner: S,
    enabled: AtomicBool,
}

impl<S: NotificationSink> ToggleSink<S> {
    pub fn new(inner: S, enabled: bool) -> Self {
        Self {
            inner,
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Flip the switch and return the new state.
    pub fn toggle(&self) -> bool {
        !self.enabled.fetch_xor(true, Ordering::Relaxed)
    }
}

impl<S: NotificationSink> NotificationSink for ToggleSink<S> {
    fn notify(&self, kind: NotificationKind) {
        if self.is_enabled() {
            self.inner.notify(kind);
        }
    }
}

impl<T: NotificationSink + ?Sized> NotificationSink for std::sync::Arc<T> {
    fn notify(&self, kind: NotificationKind) {
        (**self).notify(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<NotificationKind>>);

    impl NotificationSink for Recorder {
        fn notify(&self, kind: NotificationKind) {
            self.0.lock().unwrap().push(kind);
        }
    }

    #[test]
    fn test_toggle_sink_drops_when_disabled() {
        let recorder = Arc::new(Recorder::default());
        let sink = ToggleSink::new(recorder.clone(), true);
        sink.notify(NotificationKind::Message);
        assert!(!sink.toggle());
        sink.notify(NotificationKind::Error);
        assert!(sink.toggle());
        sink.notify(NotificationKind::Success);
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![NotificationKind::Message, NotificationKind::Success]
        );
    }

    #[test]
    fn test_starts_disabled() {
        let sink = ToggleSink::new(NoopSink, false);
        assert!(!sink.is_enabled());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_log_sink_visible_at_info() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            ToggleSink::new(LogSink, true).notify(NotificationKind::Success);
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("INFO"), "{}", output);
        assert!(output.contains("notification"), "{}", output);
        assert!(output.contains("Success"), "{}", output);
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&NotificationKind::Error).unwrap(),
            "\"error\""
        );
    }
}
