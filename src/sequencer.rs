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

//! A sample-clocked Standard MIDI File sequencer.
//!
//! Tracks are flattened to a single absolute-sample event list at load
//! (tempo map applied once), so the render callback only advances a
//! counter and delivers due events. The sequencer never sleeps and never
//! allocates during playback; it is clocked purely by the frame counts
//! the render callback pulls.

use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

/// Default tempo when a file carries no tempo meta event.
const DEFAULT_US_PER_QN: f64 = 500_000.0;

/// A channel voice event, decoupled from midly's borrowed types so the
/// event list owns its data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelEvent {
    /// Note off.
    NoteOff {
        /// MIDI key number.
        key: u8,
        /// Release velocity.
        vel: u8,
    },
    /// Note on. Velocity 0 is a note off in disguise; it is relayed
    /// verbatim.
    NoteOn {
        /// MIDI key number.
        key: u8,
        /// Attack velocity.
        vel: u8,
    },
    /// Polyphonic aftertouch.
    Aftertouch {
        /// MIDI key number.
        key: u8,
        /// Pressure.
        vel: u8,
    },
    /// Control change.
    ControlChange {
        /// Controller number.
        controller: u8,
        /// Controller value.
        value: u8,
    },
    /// Program change.
    ProgramChange {
        /// Program number.
        program: u8,
    },
    /// Channel aftertouch.
    ChannelAftertouch {
        /// Pressure.
        vel: u8,
    },
    /// Pitch bend, 0..16383 with 8192 centered.
    PitchBend {
        /// The 14-bit bend value.
        value: u16,
    },
}

impl ChannelEvent {
    /// Encodes the event as a raw MIDI message into `buf` and returns
    /// the encoded length. Stack-only; safe to call from the render
    /// callback.
    pub fn write_raw(&self, channel: u8, buf: &mut [u8; 3]) -> usize {
        let ch = channel & 0x0f;
        match *self {
            ChannelEvent::NoteOff { key, vel } => {
                *buf = [0x80 | ch, key & 0x7f, vel & 0x7f];
                3
            }
            ChannelEvent::NoteOn { key, vel } => {
                *buf = [0x90 | ch, key & 0x7f, vel & 0x7f];
                3
            }
            ChannelEvent::Aftertouch { key, vel } => {
                *buf = [0xa0 | ch, key & 0x7f, vel & 0x7f];
                3
            }
            ChannelEvent::ControlChange { controller, value } => {
                *buf = [0xb0 | ch, controller & 0x7f, value & 0x7f];
                3
            }
            ChannelEvent::ProgramChange { program } => {
                buf[0] = 0xc0 | ch;
                buf[1] = program & 0x7f;
                2
            }
            ChannelEvent::ChannelAftertouch { vel } => {
                buf[0] = 0xd0 | ch;
                buf[1] = vel & 0x7f;
                2
            }
            ChannelEvent::PitchBend { value } => {
                *buf = [0xe0 | ch, (value & 0x7f) as u8, ((value >> 7) & 0x7f) as u8];
                3
            }
        }
    }

    fn is_note(&self) -> bool {
        matches!(
            self,
            ChannelEvent::NoteOn { .. } | ChannelEvent::NoteOff { .. }
        )
    }
}

/// Receives the event stream during playback. Implemented by the engine
/// multiplexer, which routes to a synthesizer or an external device.
pub trait EventSink {
    /// Delivers one channel voice event.
    fn channel_event(&mut self, channel: u8, event: &ChannelEvent);
}

#[derive(Debug, Clone, Copy)]
struct TimedEvent {
    sample: u64,
    channel: u8,
    event: ChannelEvent,
}

/// The flattened, sample-clocked sequencer state for one loaded file.
pub struct Sequencer {
    events: Vec<TimedEvent>,
    next: usize,
    clock: f64,
    sample_rate: u32,
    speed: f64,
    channel_audible: [bool; 16],
    channels_in_use: [bool; 16],
    programs: [u8; 16],
    duration_samples: u64,
    text_info: Vec<String>,
}

impl Sequencer {
    /// Parses an SMF and flattens it into a sequencer clocked at the
    /// given sample rate. Leading silence is skipped so playback starts
    /// at the first event.
    pub fn parse(data: &[u8], sample_rate: u32) -> Result<Sequencer, midly::Error> {
        let smf = Smf::parse(data)?;
        Ok(Sequencer::from_smf(&smf, sample_rate))
    }

    /// Builds a sequencer from an already-parsed SMF.
    pub fn from_smf(smf: &Smf, sample_rate: u32) -> Sequencer {
        // Merge all tracks into (absolute tick, order) pairs. Sequential
        // files place each track after the previous one.
        let sequential = matches!(smf.header.format, Format::Sequential);
        let mut raw: Vec<(u64, usize, &TrackEventKind)> = Vec::new();
        let mut track_offset: u64 = 0;
        let mut order = 0usize;
        for track in &smf.tracks {
            let mut tick = track_offset;
            for event in track {
                tick += u64::from(event.delta.as_int());
                raw.push((tick, order, &event.kind));
                order += 1;
            }
            if sequential {
                track_offset = tick;
            }
        }
        raw.sort_by_key(|(tick, order, _)| (*tick, *order));

        // Samples per tick for timecode files is fixed; for metrical
        // files it follows the tempo map.
        let metrical_ppq = match smf.header.timing {
            Timing::Metrical(ppq) => Some(f64::from(ppq.as_int())),
            Timing::Timecode(..) => None,
        };
        let timecode_samples_per_tick = match smf.header.timing {
            Timing::Timecode(fps, subframe) => {
                f64::from(sample_rate) / (f64::from(fps.as_f32()) * f64::from(subframe))
            }
            Timing::Metrical(_) => 0.0,
        };

        let mut events = Vec::new();
        let mut text_info = Vec::new();
        let mut channels_in_use = [false; 16];
        let mut programs = [0u8; 16];
        let mut program_seen = [false; 16];

        let mut us_per_qn = DEFAULT_US_PER_QN;
        let mut last_tick: u64 = 0;
        let mut sample_pos: f64 = 0.0;

        for (tick, _, kind) in raw {
            let delta_ticks = (tick - last_tick) as f64;
            last_tick = tick;
            sample_pos += match metrical_ppq {
                Some(ppq) => {
                    delta_ticks * (us_per_qn / ppq) * f64::from(sample_rate) / 1_000_000.0
                }
                None => delta_ticks * timecode_samples_per_tick,
            };

            match kind {
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    let event = match message {
                        MidiMessage::NoteOff { key, vel } => ChannelEvent::NoteOff {
                            key: key.as_int(),
                            vel: vel.as_int(),
                        },
                        MidiMessage::NoteOn { key, vel } => {
                            if vel.as_int() > 0 {
                                channels_in_use[channel as usize] = true;
                            }
                            ChannelEvent::NoteOn {
                                key: key.as_int(),
                                vel: vel.as_int(),
                            }
                        }
                        MidiMessage::Aftertouch { key, vel } => ChannelEvent::Aftertouch {
                            key: key.as_int(),
                            vel: vel.as_int(),
                        },
                        MidiMessage::Controller { controller, value } => {
                            ChannelEvent::ControlChange {
                                controller: controller.as_int(),
                                value: value.as_int(),
                            }
                        }
                        MidiMessage::ProgramChange { program } => {
                            if !program_seen[channel as usize] {
                                program_seen[channel as usize] = true;
                                programs[channel as usize] = program.as_int();
                            }
                            ChannelEvent::ProgramChange {
                                program: program.as_int(),
                            }
                        }
                        MidiMessage::ChannelAftertouch { vel } => {
                            ChannelEvent::ChannelAftertouch { vel: vel.as_int() }
                        }
                        MidiMessage::PitchBend { bend } => ChannelEvent::PitchBend {
                            value: bend.0.as_int(),
                        },
                    };
                    events.push(TimedEvent {
                        sample: sample_pos as u64,
                        channel,
                        event,
                    });
                }
                TrackEventKind::Meta(meta) => match meta {
                    MetaMessage::Tempo(tempo) => {
                        us_per_qn = f64::from(tempo.as_int());
                    }
                    MetaMessage::Text(text)
                    | MetaMessage::Copyright(text)
                    | MetaMessage::TrackName(text)
                    | MetaMessage::Lyric(text)
                    | MetaMessage::Marker(text) => {
                        let text = String::from_utf8_lossy(text).trim().to_string();
                        if !text.is_empty() && !text_info.contains(&text) {
                            text_info.push(text);
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        // Skip leading silence: shift everything so the first event
        // lands at sample 0.
        if let Some(lead) = events.first().map(|e| e.sample) {
            if lead > 0 {
                for event in &mut events {
                    event.sample -= lead;
                }
            }
        }
        let duration_samples = events.last().map(|e| e.sample).unwrap_or(0);

        Sequencer {
            events,
            next: 0,
            clock: 0.0,
            sample_rate,
            speed: 1.0,
            channel_audible: [true; 16],
            channels_in_use,
            programs,
            duration_samples,
            text_info,
        }
    }

    /// Advances the clock by one render block and delivers due events to
    /// the sink. Returns false once every event has been delivered (end
    /// of stream).
    pub fn process_block(&mut self, frames: usize, sink: &mut dyn EventSink) -> bool {
        if self.next >= self.events.len() {
            return false;
        }
        self.clock += frames as f64 * self.speed;
        while let Some(timed) = self.events.get(self.next) {
            if timed.sample as f64 > self.clock {
                break;
            }
            self.deliver(self.next, sink);
            self.next += 1;
        }
        self.next < self.events.len()
    }

    fn deliver(&mut self, index: usize, sink: &mut dyn EventSink) {
        let timed = self.events[index];
        if let ChannelEvent::ProgramChange { program } = timed.event {
            self.programs[timed.channel as usize] = program;
        }
        if matches!(timed.event, ChannelEvent::NoteOn { vel, .. } if vel > 0)
            && !self.channel_audible[timed.channel as usize]
        {
            return;
        }
        sink.channel_event(timed.channel, &timed.event);
    }

    /// Repositions the sequencer. Rewinds if needed, then chases
    /// non-note events (programs, controllers, pitch bends) up to the
    /// target so the synth state is consistent; notes are suppressed
    /// during the chase. Callers should panic the active engine first.
    pub fn seek_ms(&mut self, ms: u32, sink: &mut dyn EventSink) {
        let target = f64::from(ms) / 1000.0 * f64::from(self.sample_rate);
        if target < self.clock {
            self.next = 0;
        }
        self.clock = target;
        while let Some(timed) = self.events.get(self.next).copied() {
            if timed.sample as f64 > self.clock {
                break;
            }
            if !timed.event.is_note() {
                if let ChannelEvent::ProgramChange { program } = timed.event {
                    self.programs[timed.channel as usize] = program;
                }
                sink.channel_event(timed.channel, &timed.event);
            }
            self.next += 1;
        }
    }

    /// Current position in milliseconds.
    pub fn position_ms(&self) -> u32 {
        (self.clock / f64::from(self.sample_rate) * 1000.0) as u32
    }

    /// Total duration in milliseconds.
    pub fn duration_ms(&self) -> u32 {
        (self.duration_samples as f64 / f64::from(self.sample_rate) * 1000.0) as u32
    }

    /// The tempo multiplier.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Sets the tempo multiplier. Purely a clock-rate change; no resync.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    /// Whether a channel had any note-ons in the file.
    pub fn channel_in_use(&self, channel: usize) -> bool {
        self.channels_in_use[channel]
    }

    /// The channels with notes, in index order.
    pub fn active_channels(&self) -> Vec<u8> {
        (0u8..16)
            .filter(|ch| self.channels_in_use[*ch as usize])
            .collect()
    }

    /// Whether a channel is audible.
    pub fn channel_audible(&self, channel: usize) -> bool {
        self.channel_audible[channel]
    }

    /// Mutes or unmutes a channel. Suppression applies to future note
    /// ons; callers panic the channel to cut sounding notes.
    pub fn set_channel_mute(&mut self, channel: usize, mute: bool) {
        self.channel_audible[channel] = !mute;
    }

    /// The last program number seen on a channel.
    pub fn channel_program(&self, channel: usize) -> u8 {
        self.programs[channel]
    }

    /// Free-text events collected from the file.
    pub fn text_info(&self) -> &[String] {
        &self.text_info
    }

    /// True once all events have been delivered.
    pub fn finished(&self) -> bool {
        self.next >= self.events.len()
    }
}
