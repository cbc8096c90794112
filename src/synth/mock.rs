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

//! A mock synthesizer that records everything it is told.

use std::sync::{Arc, Mutex};

use super::{Synth, SynthError};

/// One recorded call against the mock synthesizer.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Call {
    NoteOn { channel: u8, key: u8, vel: u8 },
    NoteOff { channel: u8, key: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelAftertouch { channel: u8, vel: u8 },
    PitchBend { channel: u8, value: u16 },
    Panic,
    PanicChannel { channel: u8 },
    Reset,
    LoadSoundFont { path: String },
    SetBank { bank: usize },
}

#[derive(Default)]
struct Inner {
    calls: Vec<Call>,
    sample_value: f32,
    polyphony: u32,
    banks: Vec<String>,
    fail_soundfont: bool,
}

/// A mock synthesizer. Clones share the recorded call log, so a test can
/// hold one handle while the player owns another.
#[derive(Clone)]
pub struct MockSynth {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MockSynth {
    fn default() -> MockSynth {
        MockSynth::new()
    }
}

impl MockSynth {
    /// Creates a mock rendering silence with default polyphony 64.
    pub fn new() -> MockSynth {
        MockSynth {
            inner: Arc::new(Mutex::new(Inner {
                polyphony: 64,
                ..Inner::default()
            })),
        }
    }

    /// Sets the constant sample value `render` writes.
    pub fn set_sample_value(&self, value: f32) {
        self.inner.lock().unwrap().sample_value = value;
    }

    /// Makes subsequent `load_soundfont` calls fail.
    pub fn fail_soundfont(&self) {
        self.inner.lock().unwrap().fail_soundfont = true;
    }

    /// Sets the bank names `bank_names` reports.
    pub fn set_banks(&self, banks: Vec<String>) {
        self.inner.lock().unwrap().banks = banks;
    }

    /// The recorded calls so far.
    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Clears the recorded calls.
    pub fn clear(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    fn record(&self, call: Call) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

impl Synth for MockSynth {
    fn note_on(&mut self, channel: u8, key: u8, vel: u8) {
        self.record(Call::NoteOn { channel, key, vel });
    }

    fn note_off(&mut self, channel: u8, key: u8) {
        self.record(Call::NoteOff { channel, key });
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) {
        self.record(Call::ControlChange {
            channel,
            controller,
            value,
        });
    }

    fn program_change(&mut self, channel: u8, program: u8) {
        self.record(Call::ProgramChange { channel, program });
    }

    fn channel_aftertouch(&mut self, channel: u8, vel: u8) {
        self.record(Call::ChannelAftertouch { channel, vel });
    }

    fn pitch_bend(&mut self, channel: u8, value: u16) {
        self.record(Call::PitchBend { channel, value });
    }

    fn render(&mut self, out: &mut [f32], frames: usize) -> usize {
        let value = self.inner.lock().unwrap().sample_value;
        out[..frames * 2].fill(value);
        frames
    }

    fn panic(&mut self) {
        self.record(Call::Panic);
    }

    fn panic_channel(&mut self, channel: u8) {
        self.record(Call::PanicChannel { channel });
    }

    fn reset(&mut self) {
        self.record(Call::Reset);
    }

    fn load_soundfont(&mut self, path: &str) -> Result<(), SynthError> {
        if self.inner.lock().unwrap().fail_soundfont {
            return Err(SynthError::SoundFontLoadFailed {
                path: path.to_string(),
                reason: "mock failure".to_string(),
            });
        }
        self.record(Call::LoadSoundFont {
            path: path.to_string(),
        });
        Ok(())
    }

    fn set_bank(&mut self, bank: usize) -> Result<(), SynthError> {
        let banks = self.inner.lock().unwrap().banks.len();
        if banks > 0 && bank >= banks {
            return Err(SynthError::BankOutOfRange(bank));
        }
        self.record(Call::SetBank { bank });
        Ok(())
    }

    fn bank_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().banks.clone()
    }

    fn set_polyphony(&mut self, voices: u32) {
        self.inner.lock().unwrap().polyphony = voices;
    }

    fn polyphony(&self) -> u32 {
        self.inner.lock().unwrap().polyphony
    }
}
