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

//! The MDX driver, wrapping a native Sharp X68000 decoding engine.
//!
//! The engine renders signed 16-bit stereo; the driver stages files into
//! the virtual filesystem, resolves the companion PDX sample archive,
//! and normalizes samples for the audio output. All engine mutations
//! outside the render path happen under the mute gate so the callback
//! never observes a half-open session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, info, span, warn, Instrument, Level};

use crate::assets::{AssetFetcher, AssetSource, AssetStager};
use crate::engine::{Engine, EngineProvider};
use crate::events::{EventGate, Metadata, PlayerEvents, PlayerState, StateSnapshot};
use crate::heuristics;
use crate::params::{ParamDef, ParamError, ParamValue};
use crate::player::{self, BlockSource, Control, LoadFuture, Player, PlayerError};
use crate::playsync::{LoadTracker, MuteGate};
use crate::util;
use crate::vfs::Vfs;

/// Where staged MDX and PDX files live in the virtual filesystem.
const MOUNT: &str = "/mdx";

/// 16-bit normalization divisor. Full-scale negative lands slightly
/// below -1.0; the output stage tolerates it and changing the divisor
/// would change loudness for every track.
const I16_DIVISOR: f32 = 32767.0;

struct Inner {
    vfs: Arc<Vfs>,
    stager: AssetStager,
    provider: Arc<dyn EngineProvider>,
    catalog_url: String,
    sample_rate: u32,

    engine: Mutex<Option<Box<dyn Engine>>>,
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

/// Plays MDX files through a native decoding engine.
pub struct MdxPlayer {
    inner: Arc<Inner>,
}

/// The audio-thread half of the MDX player. Owns the only buffer the
/// render path touches, preallocated so rendering never allocates.
pub struct MdxRender {
    inner: Arc<Inner>,
    scratch: Vec<i16>,
}

impl MdxPlayer {
    /// Creates an MDX player and its render handle. PDX archives are
    /// fetched from `catalog_url` through the given fetcher.
    pub fn new(
        vfs: Arc<Vfs>,
        fetcher: Arc<dyn AssetFetcher>,
        provider: Arc<dyn EngineProvider>,
        catalog_url: &str,
        sample_rate: u32,
        max_block_frames: usize,
    ) -> (MdxPlayer, MdxRender, PlayerEvents) {
        MdxPlayer::with_event_interval(
            vfs,
            fetcher,
            provider,
            catalog_url,
            sample_rate,
            max_block_frames,
            EventGate::DEFAULT_INTERVAL,
        )
    }

    /// As [`MdxPlayer::new`], with an explicit event coalescing window.
    #[allow(clippy::too_many_arguments)]
    pub fn with_event_interval(
        vfs: Arc<Vfs>,
        fetcher: Arc<dyn AssetFetcher>,
        provider: Arc<dyn EngineProvider>,
        catalog_url: &str,
        sample_rate: u32,
        max_block_frames: usize,
        event_interval: Duration,
    ) -> (MdxPlayer, MdxRender, PlayerEvents) {
        vfs.mount(MOUNT);
        let (events, receiver) = EventGate::new(event_interval);
        let (control_tx, control_rx) = player::control_channel();

        let inner = Arc::new(Inner {
            vfs: vfs.clone(),
            stager: AssetStager::new(vfs, fetcher),
            provider,
            catalog_url: catalog_url.trim_end_matches('/').to_string(),
            sample_rate,
            engine: Mutex::new(None),
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

        // End of stream is detected on the render thread but stop must
        // not happen there.
        let weak = Arc::downgrade(&inner);
        player::spawn_control_loop(control_rx, move |control| {
            if let Some(inner) = weak.upgrade() {
                match control {
                    Control::EndOfStream => inner.stop(),
                }
            }
        });

        let render = MdxRender {
            inner: inner.clone(),
            scratch: vec![0i16; max_block_frames * 2],
        };
        (MdxPlayer { inner }, render, receiver)
    }
}

impl Inner {
    fn snapshot(&self, is_stopped: bool) -> StateSnapshot {
        let engine = self.engine.lock();
        StateSnapshot {
            is_stopped,
            state: *self.state.lock(),
            position_ms: engine.as_ref().map(|e| e.position_ms()).unwrap_or(0),
            duration_ms: engine.as_ref().map(|e| e.length_ms()).unwrap_or(0),
            tempo: *self.speed.lock(),
            metadata: self.metadata.lock().clone(),
        }
    }

    fn emit(&self) {
        self.events.emit(self.snapshot(false));
    }

    /// Moves to Stopped and emits the terminal snapshot at most once per
    /// load.
    fn stop(&self) {
        // Invalidate any in-flight load.
        self.loads.begin();
        *self.state.lock() = PlayerState::Stopped;
        self.paused.store(false, Ordering::SeqCst);
        {
            let _guard = self.mute.guard();
            if let Some(mut engine) = self.engine.lock().take() {
                engine.close();
            }
        }
        if !self.terminal_emitted.swap(true, Ordering::SeqCst) {
            info!("MDX playback stopped.");
            self.events.emit(self.snapshot(true));
        }
    }

    async fn load(&self, data: Vec<u8>, path: &str) -> Result<(), PlayerError> {
        let token = self.loads.begin();
        *self.state.lock() = PlayerState::Loading;
        // A fresh load gets a fresh terminal event, even after a stop.
        self.terminal_emitted.store(false, Ordering::SeqCst);
        *self.metadata.lock() = heuristics::metadata_from_filepath(path, "MDX");
        self.emit();

        let vfs_path = util::join(&[MOUNT, path]);
        let staged = self.stager.stage(&vfs_path, AssetSource::Bytes(data)).await;
        if !token.is_current() {
            debug!(path = path, "Load superseded during staging.");
            return Ok(());
        }
        if let Err(e) = staged {
            self.fail_load();
            return Err(e.into());
        }

        let mut engine = self.provider.create(self.sample_rate, self.vfs.clone());

        // MDX files can depend on a PDX sample archive staged next to the
        // track. The catalog stores those members uppercased, but the
        // engine opens the archive by the name the MDX header carries.
        if let Some(pdx) = engine.pdx_filename(&vfs_path) {
            let dir = util::dirname(path);
            let dest = util::join(&[MOUNT, dir, &pdx]);
            let url = format!(
                "{}/{}",
                self.catalog_url,
                util::join(&[dir, &pdx.to_uppercase()])
            );
            if let Err(e) = self.stager.stage(&dest, AssetSource::Url(url)).await {
                // Playable without samples; FM channels still sound.
                warn!(
                    pdx = pdx,
                    err = e.to_string(),
                    "Unable to stage PDX archive."
                );
            }
            if !token.is_current() {
                debug!(path = path, "Load superseded during PDX staging.");
                return Ok(());
            }
        }

        let opened = {
            let _guard = self.mute.guard();
            engine.open(&vfs_path, None)
        };
        if let Err(e) = opened {
            engine.close();
            if token.is_current() {
                self.fail_load();
            }
            return Err(e.into());
        }
        if !token.is_current() {
            debug!(path = path, "Load superseded after open.");
            engine.close();
            return Ok(());
        }

        engine.set_speed(*self.speed.lock());
        if let Some(title) = engine.title() {
            if !title.trim().is_empty() {
                self.metadata.lock().title = title.trim().to_string();
            }
        }

        {
            let _guard = self.mute.guard();
            let mut slot = self.engine.lock();
            if let Some(mut old) = slot.take() {
                old.close();
            }
            *slot = Some(engine);
        }
        self.paused.store(false, Ordering::SeqCst);
        self.eos_sent.store(false, Ordering::SeqCst);
        *self.state.lock() = PlayerState::Playing;
        info!(path = path, "MDX track playing.");
        self.emit();
        Ok(())
    }

    fn fail_load(&self) {
        *self.state.lock() = PlayerState::Stopped;
        if !self.terminal_emitted.swap(true, Ordering::SeqCst) {
            self.events.emit(self.snapshot(true));
        }
    }
}

impl Player for MdxPlayer {
    fn load_data<'a>(&'a self, data: Vec<u8>, path: &'a str) -> LoadFuture<'a> {
        Box::pin(
            self.inner
                .load(data, path)
                .instrument(span!(Level::INFO, "load MDX")),
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
            if let Some(engine) = self.inner.engine.lock().as_mut() {
                engine.set_position_ms(ms);
            }
        }
        self.inner.emit();
    }

    fn position_ms(&self) -> u32 {
        self.inner
            .engine
            .lock()
            .as_ref()
            .map(|e| e.position_ms())
            .unwrap_or(0)
    }

    fn duration_ms(&self) -> u32 {
        self.inner
            .engine
            .lock()
            .as_ref()
            .map(|e| e.length_ms())
            .unwrap_or(0)
    }

    fn speed(&self) -> f64 {
        *self.inner.speed.lock()
    }

    fn set_speed(&self, speed: f64) {
        *self.inner.speed.lock() = speed;
        if let Some(engine) = self.inner.engine.lock().as_mut() {
            engine.set_speed(speed);
        }
        self.inner.emit();
    }

    fn voice_count(&self) -> usize {
        self.inner
            .engine
            .lock()
            .as_ref()
            .map(|e| e.track_count())
            .unwrap_or(0)
    }

    fn voice_name(&self, voice: usize) -> String {
        self.inner
            .engine
            .lock()
            .as_ref()
            .and_then(|e| e.track_name(voice))
            .unwrap_or_else(|| format!("Track {}", voice + 1))
    }

    fn voice_audible(&self, voice: usize) -> bool {
        // Engine polarity: a set bit means muted.
        self.inner
            .engine
            .lock()
            .as_ref()
            .map(|e| (e.track_mask() >> voice) & 1 == 0)
            .unwrap_or(true)
    }

    fn set_voice_audible(&self, voice: usize, audible: bool) {
        if let Some(engine) = self.inner.engine.lock().as_mut() {
            let mut mask = engine.track_mask();
            if audible {
                mask &= !(1 << voice);
            } else {
                mask |= 1 << voice;
            }
            engine.set_track_mask(mask);
        }
    }

    fn metadata(&self) -> Metadata {
        self.inner.metadata.lock().clone()
    }

    fn param_defs(&self) -> Vec<ParamDef> {
        Vec::new()
    }

    fn set_parameter(
        &self,
        id: &str,
        _value: ParamValue,
        _transient: bool,
    ) -> Result<(), PlayerError> {
        Err(ParamError::UnknownParameter(id.to_string()).into())
    }

    fn get_parameter(&self, _id: &str) -> Option<ParamValue> {
        None
    }
}

impl BlockSource for MdxRender {
    fn render_block(&mut self, out: &mut [f32], frames: usize) {
        let samples = frames * 2;
        out[..samples].fill(0.0);

        if *self.inner.state.lock() != PlayerState::Playing
            || self.inner.paused.load(Ordering::SeqCst)
            || self.inner.mute.is_muted()
        {
            return;
        }

        // The cooperative side holds this lock only under the mute gate,
        // so contention here means a mutation is in progress and silence
        // is the correct output.
        let mut engine = match self.inner.engine.try_lock() {
            Some(engine) => engine,
            None => return,
        };
        let engine = match engine.as_mut() {
            Some(engine) => engine,
            None => return,
        };

        let produced = engine.render(&mut self.scratch[..samples], frames);
        if produced == 0 {
            if !self.inner.eos_sent.swap(true, Ordering::SeqCst) {
                let _ = self.inner.control_tx.send(Control::EndOfStream);
            }
            return;
        }
        for (slot, sample) in out[..produced * 2]
            .iter_mut()
            .zip(self.scratch[..produced * 2].iter())
        {
            *slot = f32::from(*sample) / I16_DIVISOR;
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::assets::mock::Fetcher;
    use crate::engine::mock::Provider;
    use crate::test::eventually;

    use super::*;

    const RATE: u32 = 44_100;
    const BLOCK: usize = 512;

    fn make_player(
        provider: Provider,
        fetcher: Arc<Fetcher>,
    ) -> (MdxPlayer, MdxRender, PlayerEvents) {
        MdxPlayer::with_event_interval(
            Arc::new(Vfs::new()),
            fetcher,
            Arc::new(provider),
            "https://example.org/catalog",
            RATE,
            BLOCK,
            Duration::ZERO,
        )
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
        let (player, _render, mut events) = make_player(Provider::new(), Arc::new(Fetcher::new()));

        player
            .load_data(vec![0u8; 16], "X68000/Game/TITLE.MDX")
            .await
            .expect("load failed");

        assert_eq!(PlayerState::Playing, player.state());
        let snapshots = drain(&mut events);
        let last = snapshots.last().expect("no snapshots");
        assert!(!last.is_stopped);
        assert_eq!(PlayerState::Playing, last.state);
        // Engine title wins over the filepath heuristic.
        assert_eq!("Mock Title", last.metadata.title);
        assert_eq!(60_000, last.duration_ms);
    }

    #[tokio::test]
    async fn test_pdx_staged_in_track_dir_with_uppercased_url() {
        let provider = Provider::new();
        provider.update(|script| script.pdx = Some("bosconia.pdx".to_string()));
        let fetcher = Arc::new(Fetcher::new());
        // The catalog uppercases member names; the staged copy keeps the
        // name the MDX header carries.
        fetcher.insert(
            "https://example.org/catalog/X68000/Namco/BOSCONIA.PDX",
            vec![1, 2, 3],
        );
        let vfs = Arc::new(Vfs::new());
        let (player, _render, _events) = MdxPlayer::with_event_interval(
            vfs.clone(),
            fetcher.clone(),
            Arc::new(provider),
            "https://example.org/catalog",
            RATE,
            BLOCK,
            Duration::ZERO,
        );

        player
            .load_data(vec![0u8; 16], "X68000/Namco/song.mdx")
            .await
            .expect("load failed");

        assert_eq!(1, fetcher.fetch_count());
        assert!(vfs.exists("/mdx/X68000/Namco/bosconia.pdx"));
        assert!(vfs.exists("/mdx/X68000/Namco/song.mdx"));
        assert_eq!(PlayerState::Playing, player.state());
    }

    #[tokio::test]
    async fn test_missing_pdx_still_plays() {
        let provider = Provider::new();
        provider.update(|script| script.pdx = Some("MISSING".to_string()));
        let (player, _render, _events) = make_player(provider, Arc::new(Fetcher::new()));

        player
            .load_data(vec![0u8; 16], "TITLE.MDX")
            .await
            .expect("load failed");
        assert_eq!(PlayerState::Playing, player.state());
    }

    #[tokio::test]
    async fn test_failed_open_stops_with_terminal_event() {
        let provider = Provider::new();
        provider.update(|script| script.fail_open = Some(-1));
        let (player, _render, mut events) = make_player(provider, Arc::new(Fetcher::new()));

        let result = player.load_data(vec![0u8; 16], "BAD.MDX").await;
        assert!(result.is_err());
        assert_eq!(PlayerState::Stopped, player.state());
        let snapshots = drain(&mut events);
        assert!(snapshots.last().expect("no snapshots").is_stopped);
    }

    #[tokio::test]
    async fn test_failed_load_after_stop_emits_terminal_event() {
        let provider = Provider::new();
        let (player, _render, mut events) =
            make_player(provider.clone(), Arc::new(Fetcher::new()));
        player
            .load_data(vec![0u8; 16], "GOOD.MDX")
            .await
            .expect("load failed");
        player.stop();
        drain(&mut events);

        provider.update(|script| script.fail_open = Some(-1));
        let result = player.load_data(vec![0u8; 16], "BAD.MDX").await;
        assert!(result.is_err());
        assert_eq!(PlayerState::Stopped, player.state());
        let snapshots = drain(&mut events);
        assert_eq!(1, snapshots.iter().filter(|s| s.is_stopped).count());
    }

    #[tokio::test]
    async fn test_render_normalizes_samples() {
        let provider = Provider::new();
        provider.update(|script| script.sample_value = 32767);
        let (player, mut render, _events) = make_player(provider, Arc::new(Fetcher::new()));

        player
            .load_data(vec![0u8; 16], "TITLE.MDX")
            .await
            .expect("load failed");

        let mut out = vec![0.0f32; BLOCK * 2];
        render.render_block(&mut out, BLOCK);
        assert!((out[0] - 1.0).abs() < 1e-6);

        // Full-scale negative overshoots -1.0 slightly.
        let provider = Provider::new();
        provider.update(|script| script.sample_value = -32768);
        let (player, mut render, _events) = make_player(provider, Arc::new(Fetcher::new()));
        player
            .load_data(vec![0u8; 16], "TITLE2.MDX")
            .await
            .expect("load failed");
        render.render_block(&mut out, BLOCK);
        assert!(out[0] < -1.0);
        assert!((out[0] + 1.00003).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_pause_renders_silence() {
        let (player, mut render, _events) = make_player(Provider::new(), Arc::new(Fetcher::new()));
        player
            .load_data(vec![0u8; 16], "TITLE.MDX")
            .await
            .expect("load failed");

        player.pause();
        assert_eq!(PlayerState::Paused, player.state());
        let mut out = vec![1.0f32; BLOCK * 2];
        render.render_block(&mut out, BLOCK);
        assert!(out.iter().all(|s| *s == 0.0));

        player.play();
        assert_eq!(PlayerState::Playing, player.state());
        render.render_block(&mut out, BLOCK);
        assert!(out[0] > 0.0);
    }

    #[tokio::test]
    async fn test_end_of_stream_stops_cooperatively() {
        let provider = Provider::new();
        provider.update(|script| script.total_frames = BLOCK);
        let (player, mut render, mut events) = make_player(provider, Arc::new(Fetcher::new()));
        player
            .load_data(vec![0u8; 16], "TITLE.MDX")
            .await
            .expect("load failed");

        let mut out = vec![0.0f32; BLOCK * 2];
        render.render_block(&mut out, BLOCK); // drains the engine
        render.render_block(&mut out, BLOCK); // hits end of stream

        eventually(
            || player.state() == PlayerState::Stopped,
            "player never stopped after end of stream",
        );
        let snapshots = drain(&mut events);
        let terminals = snapshots.iter().filter(|s| s.is_stopped).count();
        assert_eq!(1, terminals);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (player, _render, mut events) = make_player(Provider::new(), Arc::new(Fetcher::new()));
        player
            .load_data(vec![0u8; 16], "TITLE.MDX")
            .await
            .expect("load failed");
        drain(&mut events);

        player.stop();
        player.stop();
        player.stop();

        let snapshots = drain(&mut events);
        assert_eq!(1, snapshots.iter().filter(|s| s.is_stopped).count());
    }

    #[tokio::test]
    async fn test_voice_mask_polarity() {
        let (player, _render, _events) = make_player(Provider::new(), Arc::new(Fetcher::new()));
        player
            .load_data(vec![0u8; 16], "TITLE.MDX")
            .await
            .expect("load failed");

        assert_eq!(3, player.voice_count());
        assert_eq!("FM1", player.voice_name(0));
        assert!(player.voice_audible(1));

        player.set_voice_audible(1, false);
        assert!(!player.voice_audible(1));
        assert!(player.voice_audible(0));
        assert!(player.voice_audible(2));

        player.set_voice_audible(1, true);
        assert!(player.voice_audible(1));
    }

    #[tokio::test]
    async fn test_superseded_load_is_quiet() {
        let (player, _render, mut events) = make_player(Provider::new(), Arc::new(Fetcher::new()));

        // However the two loads interleave, both must complete without
        // error and neither may emit a terminal snapshot.
        let first = player.load_data(vec![0u8; 16], "FIRST.MDX");
        let second = player.load_data(vec![0u8; 16], "SECOND.MDX");
        let (r1, r2) = tokio::join!(first, second);
        assert!(r1.is_ok());
        assert!(r2.is_ok());

        assert_eq!(PlayerState::Playing, player.state());
        let snapshots = drain(&mut events);
        assert!(snapshots.iter().all(|s| !s.is_stopped));
    }

    #[tokio::test]
    async fn test_mdx_has_no_parameters() {
        let (player, _render, _events) = make_player(Provider::new(), Arc::new(Fetcher::new()));
        assert!(player.param_defs().is_empty());
        assert!(player.get_parameter("synthengine").is_none());
        assert!(player
            .set_parameter("synthengine", ParamValue::Int(1), false)
            .is_err());
    }
}
