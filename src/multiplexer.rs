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

//! Routing of the sequencer event stream to one of several backends.
//!
//! Exactly one backend is active at a time: the SoundFont synth, the
//! OPL3 synth, or an external MIDI device. In device mode the
//! multiplexer renders silence and relays events verbatim.

use std::sync::Arc;

use crate::midi::Sink;
use crate::sequencer::{ChannelEvent, EventSink};
use crate::synth::Synth;

/// The selectable backends. The discriminants are the wire values of
/// the `synthengine` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthKind {
    /// SoundFont sample synthesis.
    SoundFont = 0,
    /// OPL3 FM synthesis.
    Opl3 = 1,
    /// External MIDI device pass-through.
    Device = 2,
}

impl SynthKind {
    /// Maps the `synthengine` parameter value. Unknown values fall back
    /// to SoundFont.
    pub fn from_param(value: i64) -> SynthKind {
        match value {
            1 => SynthKind::Opl3,
            2 => SynthKind::Device,
            _ => SynthKind::SoundFont,
        }
    }
}

/// Fans the event stream out to the active backend.
pub struct EngineMultiplexer {
    soundfont: Box<dyn Synth>,
    opl3: Box<dyn Synth>,
    sink: Arc<dyn Sink>,
    active: SynthKind,
}

impl EngineMultiplexer {
    /// Creates a multiplexer with the SoundFont synth active.
    pub fn new(
        soundfont: Box<dyn Synth>,
        opl3: Box<dyn Synth>,
        sink: Arc<dyn Sink>,
    ) -> EngineMultiplexer {
        EngineMultiplexer {
            soundfont,
            opl3,
            sink,
            active: SynthKind::SoundFont,
        }
    }

    /// The active backend.
    pub fn active(&self) -> SynthKind {
        self.active
    }

    /// Switches the active backend. The outgoing backend is panicked
    /// first so no notes ring across the switch.
    pub fn set_active(&mut self, kind: SynthKind) {
        if kind == self.active {
            return;
        }
        self.panic_active();
        self.active = kind;
    }

    /// Replaces the external device sink. The old sink is panicked so
    /// hardware does not hold notes.
    pub fn set_sink(&mut self, sink: Arc<dyn Sink>) {
        self.sink.panic();
        self.sink = sink;
    }

    /// The external device sink.
    pub fn sink(&self) -> Arc<dyn Sink> {
        self.sink.clone()
    }

    /// The SoundFont synth, for configuration calls.
    pub fn soundfont_mut(&mut self) -> &mut dyn Synth {
        self.soundfont.as_mut()
    }

    /// The SoundFont synth.
    pub fn soundfont(&self) -> &dyn Synth {
        self.soundfont.as_ref()
    }

    /// The OPL3 synth, for configuration calls.
    pub fn opl3_mut(&mut self) -> &mut dyn Synth {
        self.opl3.as_mut()
    }

    /// The OPL3 synth.
    pub fn opl3(&self) -> &dyn Synth {
        self.opl3.as_ref()
    }

    fn active_synth(&mut self) -> Option<&mut dyn Synth> {
        match self.active {
            SynthKind::SoundFont => Some(self.soundfont.as_mut()),
            SynthKind::Opl3 => Some(self.opl3.as_mut()),
            SynthKind::Device => None,
        }
    }

    /// Silences the active backend.
    pub fn panic_active(&mut self) {
        match self.active {
            SynthKind::SoundFont => self.soundfont.panic(),
            SynthKind::Opl3 => self.opl3.panic(),
            SynthKind::Device => self.sink.panic(),
        }
    }

    /// Silences one channel on the active backend.
    pub fn panic_channel(&mut self, channel: u8) {
        match self.active {
            SynthKind::SoundFont => self.soundfont.panic_channel(channel),
            SynthKind::Opl3 => self.opl3.panic_channel(channel),
            SynthKind::Device => {
                for message in [[0xb0 | channel, 120, 0], [0xb0 | channel, 123, 0]] {
                    self.sink.send(&message);
                }
            }
        }
    }

    /// Renders interleaved stereo frames from the active backend.
    /// Device mode contributes silence.
    pub fn render(&mut self, out: &mut [f32], frames: usize) -> usize {
        match self.active_synth() {
            Some(synth) => synth.render(out, frames),
            None => {
                out[..frames * 2].fill(0.0);
                frames
            }
        }
    }
}

impl EventSink for EngineMultiplexer {
    fn channel_event(&mut self, channel: u8, event: &ChannelEvent) {
        if self.active == SynthKind::Device {
            let mut buf = [0u8; 3];
            let len = event.write_raw(channel, &mut buf);
            self.sink.send(&buf[..len]);
            return;
        }
        let synth = match self.active_synth() {
            Some(synth) => synth,
            None => return,
        };
        match *event {
            ChannelEvent::NoteOn { key, vel } => synth.note_on(channel, key, vel),
            ChannelEvent::NoteOff { key, .. } => synth.note_off(channel, key),
            ChannelEvent::Aftertouch { .. } => {}
            ChannelEvent::ControlChange { controller, value } => {
                synth.control_change(channel, controller, value)
            }
            ChannelEvent::ProgramChange { program } => synth.program_change(channel, program),
            ChannelEvent::ChannelAftertouch { vel } => synth.channel_aftertouch(channel, vel),
            ChannelEvent::PitchBend { value } => synth.pitch_bend(channel, value),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::midi::mock::Sink as MockSink;
    use crate::synth::mock::{Call, MockSynth};

    use super::*;

    fn multiplexer() -> (EngineMultiplexer, MockSynth, MockSynth, MockSink) {
        let soundfont = MockSynth::new();
        let opl3 = MockSynth::new();
        let sink = MockSink::new("mock-port");
        let mux = EngineMultiplexer::new(
            Box::new(soundfont.clone()),
            Box::new(opl3.clone()),
            Arc::new(sink.clone()),
        );
        (mux, soundfont, opl3, sink)
    }

    #[test]
    fn test_events_route_to_active_synth() {
        let (mut mux, soundfont, opl3, _) = multiplexer();

        mux.channel_event(
            0,
            &ChannelEvent::NoteOn {
                key: 60,
                vel: 100,
            },
        );
        assert_eq!(
            vec![Call::NoteOn {
                channel: 0,
                key: 60,
                vel: 100
            }],
            soundfont.calls()
        );
        assert!(opl3.calls().is_empty());
    }

    #[test]
    fn test_switch_panics_outgoing_backend() {
        let (mut mux, soundfont, opl3, _) = multiplexer();

        mux.set_active(SynthKind::Opl3);
        assert_eq!(vec![Call::Panic], soundfont.calls());

        mux.channel_event(
            1,
            &ChannelEvent::NoteOn {
                key: 40,
                vel: 90,
            },
        );
        assert_eq!(
            vec![Call::NoteOn {
                channel: 1,
                key: 40,
                vel: 90
            }],
            opl3.calls()
        );
    }

    #[test]
    fn test_device_mode_relays_raw_and_renders_silence() {
        let (mut mux, _, _, sink) = multiplexer();
        mux.set_active(SynthKind::Device);

        mux.channel_event(
            2,
            &ChannelEvent::NoteOn {
                key: 64,
                vel: 127,
            },
        );
        mux.channel_event(2, &ChannelEvent::ProgramChange { program: 5 });
        assert_eq!(
            vec![vec![0x92, 64, 127], vec![0xc2, 5]],
            sink.messages()
        );

        let mut out = vec![1.0f32; 64];
        assert_eq!(32, mux.render(&mut out, 32));
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_set_active_same_kind_no_panic() {
        let (mut mux, soundfont, _, _) = multiplexer();
        mux.set_active(SynthKind::SoundFont);
        assert!(soundfont.calls().is_empty());
    }
}
