//! Ringing/feedback controller.
//!
//! A pure observer of the call machine's state watch: it drives the local
//! audible/haptic cue and never touches session state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use pulse_core::config::call::CallConfig;

use crate::call::state::{CallRole, CallState};

/// What the cue should sound like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingCue {
    /// Caller-side dial tone.
    Outgoing,
    /// Callee-side ring tone (with haptics where available).
    Incoming,
}

/// Plays and stops one cue burst; the platform audio/haptic layer.
pub trait CueSink: Send + Sync + std::fmt::Debug + 'static {
    /// Plays one cue burst.
    fn play(&self, cue: RingCue);

    /// Cancels any sounding cue.
    fn stop(&self);
}

/// Repeats the ring cue while the observed call state warrants it.
///
/// The repeat loop is one task guarded by a cancellation token; every start
/// cancels the previous token first, so rapid state flapping never leaks
/// repeating timers.
#[derive(Debug)]
pub struct RingController {
    sink: Arc<dyn CueSink>,
    interval: Duration,
    repeat: Mutex<Option<CancellationToken>>,
}

impl RingController {
    /// Creates a controller over a cue sink.
    pub fn new(sink: Arc<dyn CueSink>, config: &CallConfig) -> Arc<Self> {
        Arc::new(Self {
            sink,
            interval: Duration::from_millis(config.cue_interval_ms),
            repeat: Mutex::new(None),
        })
    }

    /// Follows a call machine's state changes until the session ends.
    ///
    /// Rings while `Dialing`/`Ringing` on the caller side or `Ringing` on
    /// the callee side; any other state stops the cue immediately.
    pub fn attach(self: Arc<Self>, role: CallRole, mut states: watch::Receiver<CallState>) {
        let controller = self;
        tokio::spawn(async move {
            loop {
                let state = *states.borrow_and_update();
                controller.apply(role, state);
                if state == CallState::Ended {
                    return;
                }
                if states.changed().await.is_err() {
                    controller.stop_repeat();
                    return;
                }
            }
        });
    }

    /// Applies one observed state.
    pub fn apply(&self, role: CallRole, state: CallState) {
        let cue = match (role, state) {
            (CallRole::Caller, CallState::Dialing | CallState::Ringing) => Some(RingCue::Outgoing),
            (CallRole::Callee, CallState::Ringing) => Some(RingCue::Incoming),
            _ => None,
        };
        match cue {
            Some(cue) => self.start_repeat(cue),
            None => self.stop_repeat(),
        }
    }

    /// Starts the repeat loop, cancelling any prior one first.
    fn start_repeat(&self, cue: RingCue) {
        let token = CancellationToken::new();
        let previous = {
            let mut slot = self.repeat.lock().expect("ring token lock");
            slot.replace(token.clone())
        };
        if let Some(previous) = previous {
            previous.cancel();
        }

        let sink = self.sink.clone();
        let interval = self.interval;
        tokio::spawn(async move {
            debug!(?cue, "Ring cue started");
            loop {
                sink.play(cue);
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = token.cancelled() => {
                        sink.stop();
                        debug!(?cue, "Ring cue stopped");
                        return;
                    }
                }
            }
        });
    }

    /// Stops the repeat loop, if any.
    fn stop_repeat(&self) {
        let token = {
            let mut slot = self.repeat.lock().expect("ring token lock");
            slot.take()
        };
        if let Some(token) = token {
            token.cancel();
        } else {
            self.sink.stop();
        }
    }
}
