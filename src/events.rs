// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Player state events emitted to the UI collaborator.
//!
//! Events carry value snapshots, never live references into the player.
//! Emission goes through a minimum-interval gate so that bursts (e.g. a
//! flood of program changes at track start) coalesce: within the window
//! only the last snapshot fires, once the window elapses. Terminal
//! (`is_stopped = true`) snapshots bypass the gate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// Player lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PlayerState {
    /// No track has been loaded yet.
    #[default]
    Idle,
    /// A load is in flight; assets are being staged.
    Loading,
    /// The engine is producing samples.
    Playing,
    /// Playback is held; the render callback emits silence.
    Paused,
    /// Playback has ended or was stopped.
    Stopped,
}

/// Track metadata, derived from embedded track data or from filepath
/// heuristics when absent. Replaced wholesale on every load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    /// The track title.
    pub title: String,
    /// A secondary line, typically the collection or system name.
    pub subtitle: String,
    /// Free-text info embedded in the track, if any.
    pub info_texts: Vec<String>,
}

/// A snapshot of the player state, emitted on every state transition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StateSnapshot {
    /// True once playback has reached a terminal state.
    pub is_stopped: bool,
    /// The lifecycle state the snapshot was taken in.
    pub state: PlayerState,
    /// Current position in milliseconds.
    pub position_ms: u32,
    /// Track duration in milliseconds.
    pub duration_ms: u32,
    /// Current tempo multiplier.
    pub tempo: f64,
    /// Metadata for the loaded track.
    pub metadata: Metadata,
}

/// The receiving end handed to the UI collaborator.
pub type PlayerEvents = mpsc::UnboundedReceiver<StateSnapshot>;

struct GateInner {
    last_emit: Option<Instant>,
    pending: Option<StateSnapshot>,
    flush_scheduled: bool,
}

/// Emits state snapshots through a timestamp-based minimum-interval gate.
#[derive(Clone)]
pub struct EventGate {
    tx: mpsc::UnboundedSender<StateSnapshot>,
    min_interval: Duration,
    inner: Arc<Mutex<GateInner>>,
}

impl EventGate {
    /// The default coalescing window.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

    /// Creates a gate and the event receiver it feeds.
    pub fn new(min_interval: Duration) -> (EventGate, PlayerEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            EventGate {
                tx,
                min_interval,
                inner: Arc::new(Mutex::new(GateInner {
                    last_emit: None,
                    pending: None,
                    flush_scheduled: false,
                })),
            },
            rx,
        )
    }

    /// Emits a snapshot. Terminal snapshots fire immediately and drop any
    /// pending coalesced snapshot; others are subject to the gate.
    ///
    /// Coalescing needs a tokio runtime to defer the flush onto. Called
    /// from a plain thread, an in-window snapshot is sent immediately
    /// instead of replacing the pending one, so off-runtime callers get
    /// every snapshot rather than last-call-wins.
    pub fn emit(&self, snapshot: StateSnapshot) {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if snapshot.is_stopped {
            inner.pending = None;
            inner.last_emit = Some(now);
            drop(inner);
            self.send(snapshot);
            return;
        }

        let window_open = match inner.last_emit {
            Some(last) => now.duration_since(last) >= self.min_interval,
            None => true,
        };

        if window_open {
            inner.last_emit = Some(now);
            drop(inner);
            self.send(snapshot);
            return;
        }

        // Inside the window: replace the pending snapshot and make sure a
        // flush will fire once the window elapses.
        inner.pending = Some(snapshot);
        if inner.flush_scheduled {
            return;
        }

        let delay = match inner.last_emit {
            Some(last) => (last + self.min_interval).saturating_duration_since(now),
            None => Duration::ZERO,
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                inner.flush_scheduled = true;
                drop(inner);
                let gate = self.clone();
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    gate.flush_pending();
                });
            }
            // Without a runtime there is nothing to defer onto; fall back
            // to emitting right away rather than dropping the event.
            Err(_) => {
                let snapshot = inner.pending.take();
                inner.last_emit = Some(now);
                drop(inner);
                if let Some(snapshot) = snapshot {
                    self.send(snapshot);
                }
            }
        }
    }

    fn flush_pending(&self) {
        let mut inner = self.inner.lock();
        inner.flush_scheduled = false;
        if let Some(snapshot) = inner.pending.take() {
            inner.last_emit = Some(Instant::now());
            drop(inner);
            self.send(snapshot);
        }
    }

    fn send(&self, snapshot: StateSnapshot) {
        // A closed receiver just means no UI is listening.
        if self.tx.send(snapshot).is_err() {
            debug!("No event listener; dropping state update.");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn snapshot(position_ms: u32, is_stopped: bool) -> StateSnapshot {
        StateSnapshot {
            is_stopped,
            position_ms,
            ..StateSnapshot::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_first_emit_passes_immediately() {
        let (gate, mut rx) = EventGate::new(Duration::from_millis(100));
        gate.emit(snapshot(1, false));
        let got = rx.recv().await.expect("event");
        assert_eq!(1, got.position_ms);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_burst_coalesces_to_last() {
        let (gate, mut rx) = EventGate::new(Duration::from_millis(250));
        gate.emit(snapshot(1, false));
        gate.emit(snapshot(2, false));
        gate.emit(snapshot(3, false));

        let first = rx.recv().await.expect("event");
        assert_eq!(1, first.position_ms);

        // Only the last snapshot of the burst fires, after the window.
        let second = rx.recv().await.expect("event");
        assert_eq!(3, second.position_ms);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_terminal_bypasses_gate() {
        let (gate, mut rx) = EventGate::new(Duration::from_secs(10));
        gate.emit(snapshot(1, false));
        gate.emit(snapshot(2, false));
        gate.emit(snapshot(3, true));

        let first = rx.recv().await.expect("event");
        assert_eq!(1, first.position_ms);
        let second = rx.recv().await.expect("event");
        assert!(second.is_stopped);
        assert_eq!(3, second.position_ms);

        // The pending coalesced snapshot was dropped by the terminal one.
        assert!(rx.try_recv().is_err());
    }
}
