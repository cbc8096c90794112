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

//! The MIDI driver.
//!
//! Unlike the MDX driver, decoding happens in-process: the file is
//! flattened into a sample-clocked [`Sequencer`] and its events are
//! routed through the [`EngineMultiplexer`] to a SoundFont synth, an
//! OPL3 synth, or an external MIDI device. This driver also carries the
//! whole parameter surface (engine selection, soundfont, effects, banks,
//! devices).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, info, span, warn, Instrument, Level};

use crate::assets::{AssetFetcher, AssetSource, AssetStager};
use crate::events::{EventGate, Metadata, PlayerEvents, PlayerState, StateSnapshot};
use crate::heuristics;
use crate::midi::OutputDeviceRegistry;
use crate::multiplexer::{EngineMultiplexer, SynthKind};
use crate::params::{
    ParamDef, ParamKind, ParamOption, ParamOptionGroup, ParamValue, ParameterStore,
};
use crate::player::{self, BlockSource, Control, LoadFuture, Player, PlayerError};
use crate::playsync::{LoadTracker, MuteGate};
use crate::sequencer::Sequencer;
use crate::synth::Synth;
use crate::util;
use crate::vfs::Vfs;

/// Where staged soundfonts live in the virtual filesystem.
const SF_MOUNT: &str = "/sf2";

/// GM System On, sent to external devices in place of a synth reset.
const GM_RESET_SYSEX: [u8; 6] = [0xf0, 0x7e, 0x7f, 0x09, 0x01, 0xf7];

fn base_defs(default_soundfont: &str) -> Vec<ParamDef> {
    vec![
        ParamDef {
            default: Some(ParamValue::Int(0)),
            ..ParamDef::new("synthengine", "Synth engine", ParamKind::Enum)
        },
        ParamDef {
            default: Some(ParamValue::Str(default_soundfont.to_string())),
            depends_on: Some(crate::params::DependsOn {
                param: "synthengine",
                value: ParamValue::Int(0),
            }),
            ..ParamDef::new("soundfont", "SoundFont", ParamKind::Enum)
        },
        ParamDef {
            min: Some(0.0),
            max: Some(1.0),
            step: Some(0.01),
            default: Some(ParamValue::Float(0.5)),
            depends_on: Some(crate::params::DependsOn {
                param: "synthengine",
                value: ParamValue::Int(0),
            }),
            ..ParamDef::new("reverb", "Reverb", ParamKind::Number)
        },
        ParamDef {
            min: Some(0.0),
            max: Some(1.0),
            step: Some(0.01),
            default: Some(ParamValue::Float(0.0)),
            depends_on: Some(crate::params::DependsOn {
                param: "synthengine",
                value: ParamValue::Int(0),
            }),
            ..ParamDef::new("chorus", "Chorus", ParamKind::Number)
        },
        ParamDef {
            min: Some(16.0),
            max: Some(1024.0),
            step: Some(16.0),
            default: Some(ParamValue::Int(256)),
            depends_on: Some(crate::params::DependsOn {
                param: "synthengine",
                value: ParamValue::Int(0),
            }),
            ..ParamDef::new("fluidpoly", "Polyphony", ParamKind::Number)
        },
        ParamDef {
            default: Some(ParamValue::Int(0)),
            depends_on: Some(crate::params::DependsOn {
                param: "synthengine",
                value: ParamValue::Int(1),
            }),
            ..ParamDef::new("opl3bank", "OPL3 bank", ParamKind::Enum)
        },
        ParamDef {
            default: Some(ParamValue::Int(0)),
            depends_on: Some(crate::params::DependsOn {
                param: "synthengine",
                value: ParamValue::Int(2),
            }),
            ..ParamDef::new("mididevice", "MIDI device", ParamKind::Enum)
        },
        ParamDef {
            hint: Some("Pick the synth engine from the file name.".to_string()),
            default: Some(ParamValue::Bool(true)),
            ..ParamDef::new("autoengine", "Auto engine", ParamKind::Toggle)
        },
        ParamDef {
            hint: Some("Send a General MIDI reset.".to_string()),
            ..ParamDef::new("gmreset", "GM reset", ParamKind::Button)
        },
    ]
}

struct Inner {
    vfs: Arc<Vfs>,
    stager: AssetStager,
    soundfont_url: String,
    sample_rate: u32,

    mux: Mutex<EngineMultiplexer>,
    seq: Mutex<Option<Sequencer>>,
    params: Mutex<ParameterStore>,
    registry: Mutex<OutputDeviceRegistry>,
    loaded_soundfont: Mutex<Option<String>>,

    state: Mutex<PlayerState>,
    metadata: Mutex<Metadata>,
    speed: Mutex<f64>,
    paused: AtomicBool,
    terminal_emitted: AtomicBool,
    eos_sent: AtomicBool,

    mute: MuteGate,
    loads: LoadTracker,
    events: EventGate,
    control_tx: Sender<Control>,
}

/// Plays Standard MIDI Files through the engine multiplexer.
pub struct MidiPlayer {
    inner: Arc<Inner>,
}

/// The audio-thread half of the MIDI player.
pub struct MidiRender {
    inner: Arc<Inner>,
}

impl MidiPlayer {
    /// Creates a MIDI player and its render handle. Soundfonts are
    /// fetched from `soundfont_url` through the given fetcher.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vfs: Arc<Vfs>,
        fetcher: Arc<dyn AssetFetcher>,
        soundfont_synth: Box<dyn Synth>,
        opl3_synth: Box<dyn Synth>,
        registry: OutputDeviceRegistry,
        soundfont_url: &str,
        default_soundfont: &str,
        sample_rate: u32,
    ) -> (MidiPlayer, MidiRender, PlayerEvents) {
        MidiPlayer::with_event_interval(
            vfs,
            fetcher,
            soundfont_synth,
            opl3_synth,
            registry,
            soundfont_url,
            default_soundfont,
            sample_rate,
            EventGate::DEFAULT_INTERVAL,
        )
    }

    /// As [`MidiPlayer::new`], with an explicit event coalescing window.
    #[allow(clippy::too_many_arguments)]
    pub fn with_event_interval(
        vfs: Arc<Vfs>,
        fetcher: Arc<dyn AssetFetcher>,
        soundfont_synth: Box<dyn Synth>,
        opl3_synth: Box<dyn Synth>,
        registry: OutputDeviceRegistry,
        soundfont_url: &str,
        default_soundfont: &str,
        sample_rate: u32,
        event_interval: Duration,
    ) -> (MidiPlayer, MidiRender, PlayerEvents) {
        vfs.mount(SF_MOUNT);
        let (events, receiver) = EventGate::new(event_interval);
        let (control_tx, control_rx) = player::control_channel();
        let sink = registry.get(0);

        let inner = Arc::new(Inner {
            vfs: vfs.clone(),
            stager: AssetStager::new(vfs, fetcher),
            soundfont_url: soundfont_url.trim_end_matches('/').to_string(),
            sample_rate,
            mux: Mutex::new(EngineMultiplexer::new(soundfont_synth, opl3_synth, sink)),
            seq: Mutex::new(None),
            params: Mutex::new(ParameterStore::new(base_defs(default_soundfont))),
            registry: Mutex::new(registry),
            loaded_soundfont: Mutex::new(None),
            state: Mutex::new(PlayerState::Idle),
            metadata: Mutex::new(Metadata::default()),
            speed: Mutex::new(1.0),
            paused: AtomicBool::new(false),
            terminal_emitted: AtomicBool::new(false),
            eos_sent: AtomicBool::new(false),
            mute: MuteGate::new(),
            loads: LoadTracker::new(),
            events,
            control_tx,
        });

        let weak = Arc::downgrade(&inner);
        player::spawn_control_loop(control_rx, move |control| {
            if let Some(inner) = weak.upgrade() {
                match control {
                    Control::EndOfStream => inner.stop(),
                }
            }
        });

        let render = MidiRender {
            inner: inner.clone(),
        };
        (MidiPlayer { inner }, render, receiver)
    }
}

impl Inner {
    fn snapshot(&self, is_stopped: bool) -> StateSnapshot {
        let seq = self.seq.lock();
        StateSnapshot {
            is_stopped,
            state: *self.state.lock(),
            position_ms: seq.as_ref().map(|s| s.position_ms()).unwrap_or(0),
            duration_ms: seq.as_ref().map(|s| s.duration_ms()).unwrap_or(0),
            tempo: *self.speed.lock(),
            metadata: self.metadata.lock().clone(),
        }
    }

    fn emit(&self) {
        self.events.emit(self.snapshot(false));
    }

    fn stop(&self) {
        self.loads.begin();
        *self.state.lock() = PlayerState::Stopped;
        self.paused.store(false, Ordering::SeqCst);
        {
            let _guard = self.mute.guard();
            let mut mux = self.mux.lock();
            mux.panic_active();
            *self.seq.lock() = None;
        }
        if !self.terminal_emitted.swap(true, Ordering::SeqCst) {
            info!("MIDI playback stopped.");
            self.events.emit(self.snapshot(true));
        }
    }

    fn fail_load(&self) {
        *self.state.lock() = PlayerState::Stopped;
        if !self.terminal_emitted.swap(true, Ordering::SeqCst) {
            self.events.emit(self.snapshot(true));
        }
    }

    fn param(&self, id: &str) -> Option<ParamValue> {
        self.params.lock().get(id)
    }

    async fn load(self: &Arc<Self>, data: Vec<u8>, path: &str) -> Result<(), PlayerError> {
        let token = self.loads.begin();
        *self.state.lock() = PlayerState::Loading;
        // A fresh load gets a fresh terminal event, even after a stop.
        self.terminal_emitted.store(false, Ordering::SeqCst);
        *self.metadata.lock() = heuristics::metadata_from_filepath(path, "MIDI");
        self.emit();

        self.params.lock().reset_transient();

        // Filename heuristics only ever set transient values, so the
        // user's persistent choices survive the next load.
        let auto = self
            .param("autoengine")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if auto {
            if let Some(kind) = heuristics::engine_for_filename(path) {
                debug!(path = path, "Filename suggests the OPL3 engine.");
                let banks = self.mux.lock().opl3().bank_names();
                let mut params = self.params.lock();
                let _ = params.set("synthengine", ParamValue::Int(kind as i64), true);
                if let Some(bank) = heuristics::opl3_bank_for_filename(path, &banks) {
                    let _ = params.set("opl3bank", ParamValue::Int(bank), true);
                }
            }
        }

        let kind = SynthKind::from_param(
            self.param("synthengine")
                .and_then(|v| v.as_int())
                .unwrap_or(0),
        );
        {
            let _guard = self.mute.guard();
            let mut mux = self.mux.lock();
            mux.set_active(kind);
            if let Some(bank) = self.param("opl3bank").and_then(|v| v.as_int()) {
                if let Err(e) = mux.opl3_mut().set_bank(bank as usize) {
                    warn!(bank, err = e.to_string(), "Unable to select OPL3 bank.");
                }
            }
        }

        if kind == SynthKind::SoundFont {
            let name = self
                .param("soundfont")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            if !name.is_empty() {
                if let Err(e) = self.ensure_soundfont(&name).await {
                    if token.is_current() {
                        self.fail_load();
                    }
                    return Err(e);
                }
                if !token.is_current() {
                    debug!(path = path, "Load superseded during soundfont staging.");
                    return Ok(());
                }
            }
        }

        let mut sequencer = match Sequencer::parse(&data, self.sample_rate) {
            Ok(sequencer) => sequencer,
            Err(e) => {
                if token.is_current() {
                    self.fail_load();
                }
                return Err(PlayerError::Parse(e.to_string()));
            }
        };
        sequencer.set_speed(*self.speed.lock());
        self.metadata.lock().info_texts = sequencer.text_info().to_vec();

        {
            let _guard = self.mute.guard();
            let mut mux = self.mux.lock();
            mux.panic_active();
            *self.seq.lock() = Some(sequencer);
        }
        self.paused.store(false, Ordering::SeqCst);
        self.eos_sent.store(false, Ordering::SeqCst);
        *self.state.lock() = PlayerState::Playing;
        info!(path = path, engine = ?kind, "MIDI track playing.");
        self.emit();
        Ok(())
    }

    /// Stages a soundfont and hands it to the synth, unless it is the
    /// one already loaded.
    async fn ensure_soundfont(&self, name: &str) -> Result<(), PlayerError> {
        if self.loaded_soundfont.lock().as_deref() == Some(name) {
            return Ok(());
        }
        let dest = util::join(&[SF_MOUNT, name]);
        let url = format!("{}/{}", self.soundfont_url, name);
        self.stager.stage(&dest, AssetSource::Url(url)).await?;
        {
            let _guard = self.mute.guard();
            self.mux.lock().soundfont_mut().load_soundfont(&dest)?;
        }
        *self.loaded_soundfont.lock() = Some(name.to_string());
        info!(soundfont = name, "SoundFont loaded.");
        Ok(())
    }

    /// Applies the side effect of a parameter change.
    fn apply_param(self: &Arc<Self>, id: &str, value: &ParamValue) {
        match id {
            "synthengine" => {
                let kind = SynthKind::from_param(value.as_int().unwrap_or(0));
                let _guard = self.mute.guard();
                self.mux.lock().set_active(kind);
            }
            "soundfont" => {
                let name = match value.as_str() {
                    Some(name) if !name.is_empty() => name.to_string(),
                    _ => return,
                };
                // Staging needs the runtime; parameter sets arrive from
                // async UI handlers, so one is normally present.
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        let inner = self.clone();
                        handle.spawn(async move {
                            if let Err(e) = inner.ensure_soundfont(&name).await {
                                warn!(
                                    soundfont = name,
                                    err = e.to_string(),
                                    "Unable to switch soundfont."
                                );
                            }
                        });
                    }
                    Err(_) => {
                        warn!(soundfont = name, "No async runtime; soundfont not switched.");
                    }
                }
            }
            "reverb" => {
                if let Some(level) = value.as_float() {
                    self.mux.lock().soundfont_mut().set_reverb(level as f32);
                }
            }
            "chorus" => {
                if let Some(level) = value.as_float() {
                    self.mux.lock().soundfont_mut().set_chorus(level as f32);
                }
            }
            "fluidpoly" => {
                if let Some(voices) = value.as_int() {
                    self.mux.lock().soundfont_mut().set_polyphony(voices as u32);
                }
            }
            "opl3bank" => {
                if let Some(bank) = value.as_int() {
                    let _guard = self.mute.guard();
                    if let Err(e) = self.mux.lock().opl3_mut().set_bank(bank as usize) {
                        warn!(bank, err = e.to_string(), "Unable to select OPL3 bank.");
                    }
                }
            }
            "mididevice" => {
                if let Some(index) = value.as_int() {
                    let sink = self.registry.lock().get(index as usize);
                    let _guard = self.mute.guard();
                    self.mux.lock().set_sink(sink);
                }
            }
            "autoengine" => {}
            "gmreset" => {
                let _guard = self.mute.guard();
                let mut mux = self.mux.lock();
                match mux.active() {
                    SynthKind::SoundFont => mux.soundfont_mut().reset(),
                    SynthKind::Opl3 => mux.opl3_mut().reset(),
                    SynthKind::Device => mux.sink().send(&GM_RESET_SYSEX),
                }
            }
            _ => {}
        }
    }
}

impl Player for MidiPlayer {
    fn load_data<'a>(&'a self, data: Vec<u8>, path: &'a str) -> LoadFuture<'a> {
        Box::pin(
            self.inner
                .load(data, path)
                .instrument(span!(Level::INFO, "load MIDI")),
        )
    }

    fn play(&self) {
        let mut state = self.inner.state.lock();
        if *state == PlayerState::Paused {
            *state = PlayerState::Playing;
            drop(state);
            self.inner.paused.store(false, Ordering::SeqCst);
            self.inner.emit();
        }
    }

    fn pause(&self) {
        let mut state = self.inner.state.lock();
        if *state == PlayerState::Playing {
            *state = PlayerState::Paused;
            drop(state);
            self.inner.paused.store(true, Ordering::SeqCst);
            // Cut sounding notes; the sequencer clock is already held.
            self.inner.mux.lock().panic_active();
            self.inner.emit();
        }
    }

    fn toggle_pause(&self) {
        if self.inner.paused.load(Ordering::SeqCst) {
            self.play();
        } else {
            self.pause();
        }
    }

    fn stop(&self) {
        self.inner.stop();
    }

    fn state(&self) -> PlayerState {
        *self.inner.state.lock()
    }

    fn seek_ms(&self, ms: u32) {
        {
            let _guard = self.inner.mute.guard();
            let mut mux = self.inner.mux.lock();
            mux.panic_active();
            if let Some(seq) = self.inner.seq.lock().as_mut() {
                seq.seek_ms(ms, &mut *mux);
            }
        }
        self.inner.emit();
    }

    fn position_ms(&self) -> u32 {
        self.inner
            .seq
            .lock()
            .as_ref()
            .map(|s| s.position_ms())
            .unwrap_or(0)
    }

    fn duration_ms(&self) -> u32 {
        self.inner
            .seq
            .lock()
            .as_ref()
            .map(|s| s.duration_ms())
            .unwrap_or(0)
    }

    fn speed(&self) -> f64 {
        *self.inner.speed.lock()
    }

    fn set_speed(&self, speed: f64) {
        *self.inner.speed.lock() = speed;
        if let Some(seq) = self.inner.seq.lock().as_mut() {
            seq.set_speed(speed);
        }
        self.inner.emit();
    }

    fn voice_count(&self) -> usize {
        self.inner
            .seq
            .lock()
            .as_ref()
            .map(|s| s.active_channels().len())
            .unwrap_or(0)
    }

    fn voice_name(&self, voice: usize) -> String {
        let seq = self.inner.seq.lock();
        let channel = match seq.as_ref().and_then(|s| s.active_channels().get(voice).copied()) {
            Some(channel) => channel,
            None => return format!("Voice {}", voice + 1),
        };
        if channel == 9 {
            return "Drums".to_string();
        }
        let program = seq
            .as_ref()
            .map(|s| s.channel_program(channel as usize))
            .unwrap_or(0);
        format!("Channel {} (program {})", channel + 1, program)
    }

    fn voice_audible(&self, voice: usize) -> bool {
        let seq = self.inner.seq.lock();
        match seq.as_ref() {
            Some(seq) => seq
                .active_channels()
                .get(voice)
                .map(|ch| seq.channel_audible(*ch as usize))
                .unwrap_or(true),
            None => true,
        }
    }

    fn set_voice_audible(&self, voice: usize, audible: bool) {
        let channel = {
            let mut seq = self.inner.seq.lock();
            let seq = match seq.as_mut() {
                Some(seq) => seq,
                None => return,
            };
            let channel = match seq.active_channels().get(voice).copied() {
                Some(channel) => channel,
                None => return,
            };
            seq.set_channel_mute(channel as usize, !audible);
            channel
        };
        if !audible {
            // Cut what is already sounding on that channel.
            self.inner.mux.lock().panic_channel(channel);
        }
    }

    fn metadata(&self) -> Metadata {
        self.inner.metadata.lock().clone()
    }

    fn param_defs(&self) -> Vec<ParamDef> {
        let mut defs: Vec<ParamDef> = self.inner.params.lock().defs().to_vec();
        for def in defs.iter_mut() {
            match def.id {
                "synthengine" => {
                    def.options = vec![ParamOptionGroup {
                        label: "Engine".to_string(),
                        items: vec![
                            ParamOption {
                                label: "SoundFont".to_string(),
                                value: ParamValue::Int(0),
                            },
                            ParamOption {
                                label: "OPL3 FM".to_string(),
                                value: ParamValue::Int(1),
                            },
                            ParamOption {
                                label: "External device".to_string(),
                                value: ParamValue::Int(2),
                            },
                        ],
                    }];
                }
                "soundfont" => {
                    let items = self
                        .inner
                        .vfs
                        .readdir(SF_MOUNT)
                        .into_iter()
                        .filter(|name| name.to_ascii_lowercase().ends_with(".sf2"))
                        .map(|name| ParamOption {
                            label: util::file_stem(&name).to_string(),
                            value: ParamValue::Str(name),
                        })
                        .collect();
                    def.options = vec![ParamOptionGroup {
                        label: "SoundFonts".to_string(),
                        items,
                    }];
                }
                "opl3bank" => {
                    let items = self
                        .inner
                        .mux
                        .lock()
                        .opl3()
                        .bank_names()
                        .into_iter()
                        .enumerate()
                        .map(|(i, name)| ParamOption {
                            label: name,
                            value: ParamValue::Int(i as i64),
                        })
                        .collect();
                    def.options = vec![ParamOptionGroup {
                        label: "Banks".to_string(),
                        items,
                    }];
                }
                "mididevice" => {
                    let items = self
                        .inner
                        .registry
                        .lock()
                        .names()
                        .into_iter()
                        .enumerate()
                        .map(|(i, name)| ParamOption {
                            label: name,
                            value: ParamValue::Int(i as i64),
                        })
                        .collect();
                    def.options = vec![ParamOptionGroup {
                        label: "Devices".to_string(),
                        items,
                    }];
                }
                _ => {}
            }
        }
        defs
    }

    fn set_parameter(
        &self,
        id: &str,
        value: ParamValue,
        transient: bool,
    ) -> Result<(), PlayerError> {
        self.inner.params.lock().set(id, value.clone(), transient)?;
        self.inner.apply_param(id, &value);
        Ok(())
    }

    fn get_parameter(&self, id: &str) -> Option<ParamValue> {
        // Polyphony is read back from the synth so the reported value
        // reflects what the engine actually accepted.
        if id == "fluidpoly" {
            return Some(ParamValue::Int(i64::from(
                self.inner.mux.lock().soundfont().polyphony(),
            )));
        }
        self.inner.param(id)
    }
}

impl BlockSource for MidiRender {
    fn render_block(&mut self, out: &mut [f32], frames: usize) {
        let samples = frames * 2;
        out[..samples].fill(0.0);

        if *self.inner.state.lock() != PlayerState::Playing
            || self.inner.paused.load(Ordering::SeqCst)
            || self.inner.mute.is_muted()
        {
            return;
        }

        // Lock order everywhere: multiplexer, then sequencer.
        let mut mux = match self.inner.mux.try_lock() {
            Some(mux) => mux,
            None => return,
        };
        let mut seq = match self.inner.seq.try_lock() {
            Some(seq) => seq,
            None => return,
        };
        let seq = match seq.as_mut() {
            Some(seq) => seq,
            None => return,
        };

        let more = seq.process_block(frames, &mut *mux);
        mux.render(out, frames);
        if !more && !self.inner.eos_sent.swap(true, Ordering::SeqCst) {
            let _ = self.inner.control_tx.send(Control::EndOfStream);
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::assets::mock::Fetcher;
    use crate::midi::mock::Sink as MockSink;
    use crate::synth::mock::{Call, MockSynth};
    use crate::test::eventually;

    use super::*;

    const RATE: u32 = 44_100;
    const BLOCK: usize = 512;

    struct Fixture {
        player: MidiPlayer,
        render: MidiRender,
        events: PlayerEvents,
        soundfont: MockSynth,
        opl3: MockSynth,
        sink: MockSink,
        fetcher: Arc<Fetcher>,
    }

    fn fixture(default_soundfont: &str) -> Fixture {
        let soundfont = MockSynth::new();
        let opl3 = MockSynth::new();
        opl3.set_banks(vec!["Standard".to_string(), "Apogee IMF".to_string()]);
        let sink = MockSink::new("mock-port");
        let mut registry = OutputDeviceRegistry::new();
        registry.register(Arc::new(sink.clone()));
        let fetcher = Arc::new(Fetcher::new());
        let (player, render, events) = MidiPlayer::with_event_interval(
            Arc::new(Vfs::new()),
            fetcher.clone(),
            Box::new(soundfont.clone()),
            Box::new(opl3.clone()),
            registry,
            "https://example.org/sf",
            default_soundfont,
            RATE,
            Duration::ZERO,
        );
        Fixture {
            player,
            render,
            events,
            soundfont,
            opl3,
            sink,
            fetcher,
        }
    }

    // Format 0, 96 ppq, one track: note on ch0, a quarter note, note
    // off, end of track.
    fn smf_bytes() -> Vec<u8> {
        vec![
            b'M', b'T', b'h', b'd', 0, 0, 0, 6, 0, 0, 0, 1, 0, 96, // header
            b'M', b'T', b'r', b'k', 0, 0, 0, 12, // track header
            0x00, 0x90, 0x3c, 0x64, // note on
            0x60, 0x80, 0x3c, 0x00, // note off after 96 ticks
            0x00, 0xff, 0x2f, 0x00, // end of track
        ]
    }

    fn drain(events: &mut PlayerEvents) -> Vec<StateSnapshot> {
        let mut snapshots = Vec::new();
        while let Ok(snapshot) = events.try_recv() {
            snapshots.push(snapshot);
        }
        snapshots
    }

    #[tokio::test]
    async fn test_load_starts_playing() {
        let mut f = fixture("");
        f.player
            .load_data(smf_bytes(), "Doom/E1M1/At Doom's Gate.mid")
            .await
            .expect("load failed");

        assert_eq!(PlayerState::Playing, f.player.state());
        assert_eq!(500, f.player.duration_ms());
        let snapshots = drain(&mut f.events);
        let last = snapshots.last().expect("no snapshots");
        assert!(!last.is_stopped);
        assert_eq!("E1M1 - At Doom's Gate", last.metadata.title);
        assert_eq!("Doom", last.metadata.subtitle);
    }

    #[tokio::test]
    async fn test_unparseable_file_fails_with_terminal_event() {
        let mut f = fixture("");
        let result = f.player.load_data(vec![1, 2, 3, 4], "bad.mid").await;

        assert!(matches!(result, Err(PlayerError::Parse(_))));
        assert_eq!(PlayerState::Stopped, f.player.state());
        assert!(drain(&mut f.events).last().expect("no snapshots").is_stopped);
    }

    #[tokio::test]
    async fn test_failed_load_after_stop_emits_terminal_event() {
        let mut f = fixture("");
        f.player
            .load_data(smf_bytes(), "good.mid")
            .await
            .expect("load failed");
        f.player.stop();
        drain(&mut f.events);

        let result = f.player.load_data(vec![1, 2, 3, 4], "bad.mid").await;
        assert!(matches!(result, Err(PlayerError::Parse(_))));
        assert_eq!(PlayerState::Stopped, f.player.state());
        let snapshots = drain(&mut f.events);
        assert_eq!(1, snapshots.iter().filter(|s| s.is_stopped).count());
    }

    #[tokio::test]
    async fn test_render_routes_events_to_soundfont_synth() {
        let mut f = fixture("");
        f.player
            .load_data(smf_bytes(), "song.mid")
            .await
            .expect("load failed");

        let mut out = vec![0.0f32; BLOCK * 2];
        f.render.render_block(&mut out, BLOCK);
        assert!(f.soundfont.calls().contains(&Call::NoteOn {
            channel: 0,
            key: 60,
            vel: 100
        }));
        assert!(f.opl3.calls().is_empty());
    }

    #[tokio::test]
    async fn test_device_mode_relays_and_renders_silence() {
        let mut f = fixture("");
        f.player
            .set_parameter("mididevice", ParamValue::Int(1), false)
            .expect("set failed");
        f.player
            .set_parameter("synthengine", ParamValue::Int(2), false)
            .expect("set failed");
        f.player
            .load_data(smf_bytes(), "song.mid")
            .await
            .expect("load failed");

        let mut out = vec![1.0f32; BLOCK * 2];
        f.render.render_block(&mut out, BLOCK);
        assert!(out.iter().all(|s| *s == 0.0));
        assert!(f.sink.messages().contains(&vec![0x90, 0x3c, 0x64]));
    }

    #[tokio::test]
    async fn test_soundfont_staged_once_and_loaded() {
        let f = fixture("GeneralUser.sf2");
        f.fetcher
            .insert("https://example.org/sf/GeneralUser.sf2", vec![0u8; 8]);

        f.player
            .load_data(smf_bytes(), "a.mid")
            .await
            .expect("load failed");
        f.player
            .load_data(smf_bytes(), "b.mid")
            .await
            .expect("load failed");

        assert_eq!(1, f.fetcher.fetch_count());
        assert!(f.soundfont.calls().contains(&Call::LoadSoundFont {
            path: "/sf2/GeneralUser.sf2".to_string()
        }));
    }

    #[tokio::test]
    async fn test_autoengine_heuristics_set_transients_only() {
        let f = fixture("");
        f.player
            .load_data(smf_bytes(), "Wacky Wheels/track01 (FM).mid")
            .await
            .expect("load failed");

        assert_eq!(
            Some(ParamValue::Int(1)),
            f.player.get_parameter("synthengine")
        );
        assert_eq!(Some(ParamValue::Int(1)), f.player.get_parameter("opl3bank"));
        assert_eq!(SynthKind::Opl3, f.player.inner.mux.lock().active());

        // A plain file on the next load goes back to the persistent
        // default.
        f.player
            .load_data(smf_bytes(), "Zelda/overworld.mid")
            .await
            .expect("load failed");
        assert_eq!(
            Some(ParamValue::Int(0)),
            f.player.get_parameter("synthengine")
        );
        assert_eq!(SynthKind::SoundFont, f.player.inner.mux.lock().active());
    }

    #[tokio::test]
    async fn test_persistent_engine_choice_survives_load() {
        let f = fixture("");
        f.player
            .set_parameter("autoengine", ParamValue::Bool(false), false)
            .expect("set failed");
        f.player
            .set_parameter("synthengine", ParamValue::Int(1), false)
            .expect("set failed");

        f.player
            .load_data(smf_bytes(), "Zelda/overworld.mid")
            .await
            .expect("load failed");
        assert_eq!(
            Some(ParamValue::Int(1)),
            f.player.get_parameter("synthengine")
        );
        assert_eq!(SynthKind::Opl3, f.player.inner.mux.lock().active());
    }

    #[tokio::test]
    async fn test_fluidpoly_read_back_from_synth() {
        let f = fixture("");
        f.player
            .set_parameter("fluidpoly", ParamValue::Int(128), false)
            .expect("set failed");
        assert!(f.soundfont.calls().is_empty()); // set_polyphony is not an event
        assert_eq!(Some(ParamValue::Int(128)), f.player.get_parameter("fluidpoly"));
    }

    #[tokio::test]
    async fn test_gmreset_resets_active_engine() {
        let f = fixture("");
        f.player
            .set_parameter("gmreset", ParamValue::Bool(true), false)
            .expect("set failed");
        assert_eq!(vec![Call::Reset], f.soundfont.calls());
    }

    #[tokio::test]
    async fn test_unknown_parameter_rejected() {
        let f = fixture("");
        assert!(f
            .player
            .set_parameter("nosuch", ParamValue::Int(1), false)
            .is_err());
    }

    #[tokio::test]
    async fn test_voice_mute_suppresses_and_panics_channel() {
        let mut f = fixture("");
        f.player
            .load_data(smf_bytes(), "song.mid")
            .await
            .expect("load failed");

        assert_eq!(1, f.player.voice_count());
        assert!(f.player.voice_audible(0));
        f.player.set_voice_audible(0, false);
        assert!(!f.player.voice_audible(0));
        assert!(f.soundfont.calls().contains(&Call::PanicChannel { channel: 0 }));

        let mut out = vec![0.0f32; BLOCK * 2];
        f.render.render_block(&mut out, BLOCK);
        assert!(!f
            .soundfont
            .calls()
            .iter()
            .any(|c| matches!(c, Call::NoteOn { .. })));
    }

    #[tokio::test]
    async fn test_end_of_stream_stops_once() {
        let mut f = fixture("");
        f.player
            .load_data(smf_bytes(), "song.mid")
            .await
            .expect("load failed");
        drain(&mut f.events);

        // The file is 500 ms; drain it and hit end of stream.
        let mut out = vec![0.0f32; BLOCK * 2];
        for _ in 0..60 {
            f.render.render_block(&mut out, BLOCK);
        }
        eventually(
            || f.player.state() == PlayerState::Stopped,
            "player never stopped after end of stream",
        );
        let snapshots = drain(&mut f.events);
        assert_eq!(1, snapshots.iter().filter(|s| s.is_stopped).count());

        f.player.stop();
        assert!(drain(&mut f.events).iter().all(|s| !s.is_stopped));
    }

    #[tokio::test]
    async fn test_param_defs_carry_discovered_options() {
        let f = fixture("GeneralUser.sf2");
        f.player
            .inner
            .vfs
            .write("/sf2/GeneralUser.sf2", vec![0u8; 8]);
        f.player.inner.vfs.write("/sf2/readme.txt", vec![0u8; 8]);

        let defs = f.player.param_defs();
        let soundfont = defs.iter().find(|d| d.id == "soundfont").expect("missing");
        assert_eq!(1, soundfont.options[0].items.len());
        assert_eq!("GeneralUser", soundfont.options[0].items[0].label);

        let banks = defs.iter().find(|d| d.id == "opl3bank").expect("missing");
        assert_eq!(2, banks.options[0].items.len());

        let devices = defs.iter().find(|d| d.id == "mididevice").expect("missing");
        assert_eq!(2, devices.options[0].items.len()); // null device + mock
    }
}
