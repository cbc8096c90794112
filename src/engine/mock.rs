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
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Engine, EngineError, EngineProvider};
use crate::vfs::Vfs;

/// Behavior shared by every engine the provider creates, adjustable from
/// tests while sessions are live.
#[derive(Clone)]
pub struct Script {
    /// Frames the engine will produce before reporting end of stream.
    pub total_frames: usize,
    /// The constant sample value rendered into every slot.
    pub sample_value: i16,
    /// Force `open` to fail with this status code.
    pub fail_open: Option<i32>,
    /// The dependent sample-archive member name reported by the header
    /// probe.
    pub pdx: Option<String>,
    /// Track names, also defining the track count.
    pub tracks: Vec<String>,
    /// The embedded title.
    pub title: Option<String>,
    /// Track length in milliseconds.
    pub length_ms: u32,
}

impl Default for Script {
    fn default() -> Script {
        Script {
            total_frames: 4096,
            sample_value: 16384,
            fail_open: None,
            pdx: None,
            tracks: vec!["FM1".into(), "FM2".into(), "PCM".into()],
            title: Some("Mock Title".into()),
            length_ms: 60_000,
        }
    }
}

/// A mock decoding engine driven by a [`Script`].
pub struct MockEngine {
    script: Arc<Mutex<Script>>,
    vfs: Arc<Vfs>,
    opened: bool,
    rendered_frames: usize,
    position_ms: u32,
    speed: f64,
    mask: u32,
}

impl Engine for MockEngine {
    fn open(&mut self, path: &str, _secondary: Option<&str>) -> Result<(), EngineError> {
        if let Some(code) = self.script.lock().fail_open {
            return Err(EngineError::OpenFailed { code });
        }
        if !self.vfs.exists(path) {
            return Err(EngineError::OpenFailed { code: -2 });
        }
        self.opened = true;
        self.rendered_frames = 0;
        self.position_ms = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.opened = false;
    }

    fn render(&mut self, buffer: &mut [i16], frames: usize) -> usize {
        if !self.opened {
            return 0;
        }
        let script = self.script.lock();
        let remaining = script.total_frames.saturating_sub(self.rendered_frames);
        let produced = remaining.min(frames);
        for sample in buffer.iter_mut().take(produced * 2) {
            *sample = script.sample_value;
        }
        self.rendered_frames += produced;
        produced
    }

    fn position_ms(&self) -> u32 {
        self.position_ms
    }

    fn set_position_ms(&mut self, ms: u32) {
        self.position_ms = ms;
    }

    fn speed(&self) -> f64 {
        self.speed
    }

    fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    fn length_ms(&self) -> u32 {
        self.script.lock().length_ms
    }

    fn track_count(&self) -> usize {
        self.script.lock().tracks.len()
    }

    fn track_name(&self, index: usize) -> Option<String> {
        self.script.lock().tracks.get(index).cloned()
    }

    fn track_mask(&self) -> u32 {
        self.mask
    }

    fn set_track_mask(&mut self, mask: u32) {
        self.mask = mask;
    }

    fn title(&self) -> Option<String> {
        self.script.lock().title.clone()
    }

    fn pdx_filename(&self, _path: &str) -> Option<String> {
        self.script.lock().pdx.clone()
    }
}

/// An [`EngineProvider`] handing out [`MockEngine`]s that all follow one
/// shared, mutable script.
#[derive(Clone, Default)]
pub struct Provider {
    script: Arc<Mutex<Script>>,
}

impl Provider {
    /// Creates a provider with the default script.
    pub fn new() -> Provider {
        Provider::default()
    }

    /// Creates a provider with the given script.
    pub fn with_script(script: Script) -> Provider {
        Provider {
            script: Arc::new(Mutex::new(script)),
        }
    }

    /// Mutates the shared script. Applies to engines already created.
    pub fn update<F: FnOnce(&mut Script)>(&self, f: F) {
        f(&mut self.script.lock());
    }
}

impl EngineProvider for Provider {
    fn create(&self, _sample_rate: u32, vfs: Arc<Vfs>) -> Box<dyn Engine> {
        Box::new(MockEngine {
            script: self.script.clone(),
            vfs,
            opened: false,
            rendered_frames: 0,
            position_ms: 0,
            speed: 1.0,
            mask: 0,
        })
    }
}
