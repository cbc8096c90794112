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

//! The decoding-engine boundary.
//!
//! Decoding engines are precompiled native codec modules exposing a
//! C-style function table (create context, open, render, transport and
//! mask accessors). This module models that table as an injected trait so
//! players never touch a global library handle, and tests can substitute
//! an in-memory fake.

use std::sync::Arc;

use crate::vfs::Vfs;

pub mod mock;

/// Errors raised across the engine boundary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The native open call returned a nonzero status.
    #[error("engine open failed with status {code}")]
    OpenFailed {
        /// The native status code.
        code: i32,
    },
}

/// One open decode session. Instances map one-to-one to loaded tracks:
/// created on load, destroyed on stop or before re-opening.
///
/// `render` is called from the audio render callback and must never
/// block, allocate, or panic.
pub trait Engine: Send {
    /// Opens the track at the given virtual filesystem path. The
    /// optional secondary path is format-specific (unused by current
    /// formats, part of the native ABI).
    fn open(&mut self, path: &str, secondary: Option<&str>) -> Result<(), EngineError>;

    /// Closes the session. Idempotent.
    fn close(&mut self);

    /// Renders up to `frames` interleaved stereo frames of signed 16-bit
    /// samples into `buffer`. Returns the number of frames produced;
    /// 0 means end of stream.
    fn render(&mut self, buffer: &mut [i16], frames: usize) -> usize;

    /// Current transport position in milliseconds.
    fn position_ms(&self) -> u32;

    /// Repositions the transport. May produce a transient burst of noise;
    /// callers wrap this in a mute guard.
    fn set_position_ms(&mut self, ms: u32);

    /// Current speed multiplier.
    fn speed(&self) -> f64;

    /// Sets the speed multiplier. Takes effect without a resync.
    fn set_speed(&mut self, speed: f64);

    /// Track length in milliseconds.
    fn length_ms(&self) -> u32;

    /// Number of tracks (voices/channels) in the open session.
    fn track_count(&self) -> usize;

    /// Engine-native name of the given track.
    fn track_name(&self, index: usize) -> Option<String>;

    /// The per-track mute mask. Engine-native polarity: a set bit means
    /// the track is muted.
    fn track_mask(&self) -> u32;

    /// Sets the per-track mute mask (engine-native polarity).
    fn set_track_mask(&mut self, mask: u32);

    /// The embedded track title, already transcoded by the native
    /// binding.
    fn title(&self) -> Option<String>;

    /// Reads the dependent sample-archive member name from the file's
    /// header without opening the session (MDX-specific probe).
    fn pdx_filename(&self, path: &str) -> Option<String>;
}

/// Creates engine contexts. One provider instance is injected per player;
/// there is no process-wide engine singleton.
pub trait EngineProvider: Send + Sync {
    /// Creates a fresh engine context at the given output sample rate,
    /// reading files from the given virtual filesystem.
    fn create(&self, sample_rate: u32, vfs: Arc<Vfs>) -> Box<dyn Engine>;
}
