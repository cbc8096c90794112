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

//! A mock audio output. Pulls blocks on a thread at roughly realtime
//! pace and discards them.

use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{info, span, Level};

use crate::player::BlockSource;

/// A mock device. Doesn't produce any sound.
#[derive(Clone)]
pub struct Device {
    name: String,
    sample_rate: u32,
    block_frames: usize,
    stop: Arc<AtomicBool>,
    frames_pulled: Arc<AtomicU64>,
    handle: Arc<Mutex<Option<thread::JoinHandle<()>>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str, sample_rate: u32, block_frames: usize) -> Device {
        Device {
            name: name.to_string(),
            sample_rate,
            block_frames,
            stop: Arc::new(AtomicBool::new(false)),
            frames_pulled: Arc::new(AtomicU64::new(0)),
            handle: Arc::new(Mutex::new(None)),
        }
    }

    /// The number of frames pulled so far.
    pub fn frames_pulled(&self) -> u64 {
        self.frames_pulled.load(Ordering::Relaxed)
    }
}

impl crate::audio::Device for Device {
    fn start(&self, mut source: Box<dyn BlockSource>) -> Result<(), Box<dyn Error>> {
        info!(device = self.name, "Starting audio output (mock).");

        let stop = self.stop.clone();
        let frames_pulled = self.frames_pulled.clone();
        let frames = self.block_frames;
        let interval =
            Duration::from_micros(frames as u64 * 1_000_000 / u64::from(self.sample_rate));
        let handle = thread::spawn(move || {
            let stream_span = span!(Level::INFO, "audio output stream (mock)");
            let _enter = stream_span.enter();

            let mut block = vec![0.0f32; frames * 2];
            while !stop.load(Ordering::Relaxed) {
                source.render_block(&mut block, frames);
                frames_pulled.fetch_add(frames as u64, Ordering::Relaxed);
                thread::sleep(interval);
            }
        });
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (mock)", self.name)
    }
}
