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

//! Software synthesizer abstraction.
//!
//! The two synthesis backends (a SoundFont renderer and an OPL3 FM
//! renderer) are external engines reached through this trait. The crate
//! ships a null implementation and a scripted mock; real backends
//! register an implementation at startup.

pub mod mock;

use thiserror::Error;

/// Errors from synthesizer configuration calls.
#[derive(Debug, Error)]
pub enum SynthError {
    /// The SoundFont could not be loaded.
    #[error("failed to load soundfont {path}: {reason}")]
    SoundFontLoadFailed {
        /// The virtual path of the SoundFont.
        path: String,
        /// Engine-reported reason.
        reason: String,
    },
    /// The requested bank index is out of range.
    #[error("bank index {0} out of range")]
    BankOutOfRange(usize),
}

/// A realtime software synthesizer.
///
/// Event methods and `render` are called from the audio callback and
/// must not block or allocate. Configuration methods (`load_soundfont`,
/// `set_bank`, effect setters) mutate non-atomically; callers wrap them
/// in a mute guard.
pub trait Synth: Send {
    /// Note on.
    fn note_on(&mut self, channel: u8, key: u8, vel: u8);

    /// Note off.
    fn note_off(&mut self, channel: u8, key: u8);

    /// Control change.
    fn control_change(&mut self, channel: u8, controller: u8, value: u8);

    /// Program change.
    fn program_change(&mut self, channel: u8, program: u8);

    /// Channel aftertouch.
    fn channel_aftertouch(&mut self, channel: u8, vel: u8);

    /// Pitch bend, 0..16383 with 8192 centered.
    fn pitch_bend(&mut self, channel: u8, value: u16);

    /// Renders interleaved stereo f32 frames. Returns the number of
    /// frames written.
    fn render(&mut self, out: &mut [f32], frames: usize) -> usize;

    /// Silences all voices immediately.
    fn panic(&mut self);

    /// Silences all voices on one channel.
    fn panic_channel(&mut self, channel: u8);

    /// Resets all channel state to General MIDI defaults.
    fn reset(&mut self);

    /// Loads a SoundFont from the virtual filesystem, replacing the
    /// current one.
    fn load_soundfont(&mut self, path: &str) -> Result<(), SynthError> {
        let _ = path;
        Ok(())
    }

    /// Selects a patch bank by index, for bank-based backends.
    fn set_bank(&mut self, bank: usize) -> Result<(), SynthError> {
        let _ = bank;
        Ok(())
    }

    /// Bank names offered by this backend, in index order.
    fn bank_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Sets the reverb send level, 0.0 to 1.0.
    fn set_reverb(&mut self, level: f32) {
        let _ = level;
    }

    /// Sets the chorus send level, 0.0 to 1.0.
    fn set_chorus(&mut self, level: f32) {
        let _ = level;
    }

    /// Sets the maximum polyphony.
    fn set_polyphony(&mut self, voices: u32) {
        let _ = voices;
    }

    /// The current maximum polyphony.
    fn polyphony(&self) -> u32 {
        0
    }
}

/// A synthesizer that consumes events and renders silence. Used when no
/// backend is registered.
pub struct NullSynth;

impl Synth for NullSynth {
    fn note_on(&mut self, _channel: u8, _key: u8, _vel: u8) {}
    fn note_off(&mut self, _channel: u8, _key: u8) {}
    fn control_change(&mut self, _channel: u8, _controller: u8, _value: u8) {}
    fn program_change(&mut self, _channel: u8, _program: u8) {}
    fn channel_aftertouch(&mut self, _channel: u8, _vel: u8) {}
    fn pitch_bend(&mut self, _channel: u8, _value: u16) {}

    fn render(&mut self, out: &mut [f32], frames: usize) -> usize {
        let samples = frames * 2;
        out[..samples].fill(0.0);
        frames
    }

    fn panic(&mut self) {}
    fn panic_channel(&mut self, _channel: u8) {}
    fn reset(&mut self) {}
}
