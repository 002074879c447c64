use crossbeam_channel::{Receiver, Sender, unbounded};

/// Severity attached to a textual status message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Routine progress information.
    Info,
    /// Something degraded but the job continues (stall warnings, fallbacks).
    Warning,
    /// The job (or one attempt) failed.
    Error,
}

/// One message on the unidirectional status/progress channel.
///
/// The UI layer (out of scope here) consumes these in order. Producers must
/// never block on the consumer, which is why the provided channel sink is
/// unbounded.
#[derive(Clone, Debug, PartialEq)]
pub enum StatusEvent {
    /// Human-readable status line.
    Status {
        /// Message text, already prefixed with the job label.
        text: String,
        /// Message severity.
        severity: Severity,
    },
    /// Fractional progress of the current render stage, in `[0, 1]`.
    Progress(f64),
    /// Fractional progress across a multi-job batch, in `[0, 1]`.
    BatchProgress(f64),
    /// Terminal signal: the job finished, successfully or not.
    ///
    /// Exactly one `Finished` is emitted per job, on every path.
    Finished(bool),
}

/// Consumer-facing half of the status channel.
///
/// Implementations swap freely between a UI channel, a test spy, or nothing
/// at all; pipeline components only ever see the trait.
pub trait StatusSink: Send + Sync {
    /// Deliver one event. Must not block.
    fn emit(&self, event: StatusEvent);

    /// Emit a status line.
    fn status(&self, text: &str, severity: Severity) {
        self.emit(StatusEvent::Status {
            text: text.to_owned(),
            severity,
        });
    }

    /// Emit a fractional progress update.
    fn progress(&self, fraction: f64) {
        self.emit(StatusEvent::Progress(fraction));
    }

    /// Emit the terminal job-finished signal.
    fn finished(&self, success: bool) {
        self.emit(StatusEvent::Finished(success));
    }
}

/// Sink that forwards events into an unbounded crossbeam channel.
pub struct ChannelSink {
    tx: Sender<StatusEvent>,
}

impl ChannelSink {
    /// Create a channel sink plus the receiver the UI thread reads from.
    pub fn new() -> (Self, Receiver<StatusEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl StatusSink for ChannelSink {
    fn emit(&self, event: StatusEvent) {
        // The receiver may be gone (UI torn down mid-job); rendering continues.
        let _ = self.tx.send(event);
    }
}

/// Sink that drops every event. Useful for headless callers and tests.
pub struct NullSink;

impl StatusSink for NullSink {
    fn emit(&self, _event: StatusEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_preserves_order() {
        let (sink, rx) = ChannelSink::new();
        sink.status("starting", Severity::Info);
        sink.progress(0.5);
        sink.finished(true);

        assert_eq!(
            rx.recv().unwrap(),
            StatusEvent::Status {
                text: "starting".into(),
                severity: Severity::Info
            }
        );
        assert_eq!(rx.recv().unwrap(), StatusEvent::Progress(0.5));
        assert_eq!(rx.recv().unwrap(), StatusEvent::Finished(true));
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.progress(1.0);
    }
}
