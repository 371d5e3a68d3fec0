//! Non-fatal failures the dispatcher recovers from
//!
//! Log decoding mismatches and observability relay failures never fail a
//! dispatch. They are logged at `warn` and, when a channel is attached,
//! forwarded so the application can surface them.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A log matched a known event by topic but did not decode
    EventDecode,
    /// The observability relay did not accept a submission record
    RelayRecord,
    /// The observability relay status lookup failed
    RelayStatus,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Destination for [`Diagnostic`]s
#[derive(Debug, Clone, Default)]
pub struct DiagnosticSink {
    tx: Option<mpsc::UnboundedSender<Diagnostic>>,
}

impl DiagnosticSink {
    /// Log-only sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that also forwards to the returned receiver
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Diagnostic>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn report(&self, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{:?}: {}", kind, message);

        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is listening any more
            let _ = tx.send(Diagnostic {
                kind,
                message,
                at: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_receives_reports() {
        let (sink, mut rx) = DiagnosticSink::channel();
        sink.report(DiagnosticKind::EventDecode, "bad data");

        let diag = rx.try_recv().unwrap();
        assert_eq!(diag.kind, DiagnosticKind::EventDecode);
        assert_eq!(diag.message, "bad data");
    }

    #[test]
    fn test_report_survives_dropped_receiver() {
        let (sink, rx) = DiagnosticSink::channel();
        drop(rx);
        sink.report(DiagnosticKind::RelayRecord, "unreachable");
        DiagnosticSink::new().report(DiagnosticKind::RelayStatus, "log only");
    }
}
