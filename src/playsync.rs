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

//! Synchronization primitives between the control side and the render
//! callback.
//!
//! The render callback runs on the audio thread with a hard deadline and
//! must never block, so both primitives here are built on atomics only.

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

/// A mute gate is shared between the render callback and control
/// operations. Any control operation that could produce an audible
/// artifact while a render call is in flight (seek, engine re-open,
/// soundfont swap) takes a guard for its duration; the render callback
/// checks `is_muted` and emits silence while any guard is held.
///
/// Guards nest: the gate is open again once the last guard drops.
#[derive(Clone, Default)]
pub struct MuteGate {
    holders: Arc<AtomicUsize>,
}

impl MuteGate {
    /// Creates a new, open gate.
    pub fn new() -> MuteGate {
        MuteGate::default()
    }

    /// Returns true if any guard is currently held.
    pub fn is_muted(&self) -> bool {
        self.holders.load(Ordering::Acquire) > 0
    }

    /// Silences output for the scope of the returned guard.
    pub fn guard(&self) -> MuteGuard {
        self.holders.fetch_add(1, Ordering::AcqRel);
        MuteGuard {
            holders: self.holders.clone(),
        }
    }
}

/// RAII guard for a [`MuteGate`]. Dropping it un-silences the output
/// once no other guard is held.
pub struct MuteGuard {
    holders: Arc<AtomicUsize>,
}

impl Drop for MuteGuard {
    fn drop(&mut self) {
        self.holders.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Tracks load generations so that a `load_data` superseded by a newer
/// one can detect it and discard its result. There is no cancellation:
/// a superseded load's staging is allowed to finish, but it must check
/// its token after every await point before applying anything.
#[derive(Clone, Default)]
pub struct LoadTracker {
    generation: Arc<AtomicU64>,
}

impl LoadTracker {
    /// Creates a new tracker.
    pub fn new() -> LoadTracker {
        LoadTracker::default()
    }

    /// Begins a new load, superseding any load currently in flight.
    pub fn begin(&self) -> LoadToken {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        LoadToken {
            tracker: self.clone(),
            generation,
        }
    }
}

/// A token identifying one `load_data` call. Last load wins.
pub struct LoadToken {
    tracker: LoadTracker,
    generation: u64,
}

impl LoadToken {
    /// Returns true if no newer load has begun since this token was
    /// issued.
    pub fn is_current(&self) -> bool {
        self.tracker.generation.load(Ordering::Acquire) == self.generation
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mute_gate_guards_nest() {
        let gate = MuteGate::new();
        assert!(!gate.is_muted());

        let outer = gate.guard();
        assert!(gate.is_muted());
        {
            let _inner = gate.guard();
            assert!(gate.is_muted());
        }
        assert!(gate.is_muted());

        drop(outer);
        assert!(!gate.is_muted());
    }

    #[test]
    fn test_mute_gate_shared_across_clones() {
        let gate = MuteGate::new();
        let view = gate.clone();
        let _guard = gate.guard();
        assert!(view.is_muted());
    }

    #[test]
    fn test_last_load_wins() {
        let tracker = LoadTracker::new();
        let first = tracker.begin();
        assert!(first.is_current());

        let second = tracker.begin();
        assert!(!first.is_current());
        assert!(second.is_current());
    }
}
