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

//! An audio output backed by cpal.

use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{error, info, span, Level};

use crate::player::BlockSource;

/// Bridges cpal's arbitrary callback sizes to the fixed block size the
/// drivers render. Carries leftover samples between callbacks so block
/// boundaries never depend on the host buffer size.
struct BlockAdapter {
    source: Box<dyn BlockSource>,
    block: Vec<f32>,
    filled: usize,
    consumed: usize,
    frames: usize,
}

impl BlockAdapter {
    fn new(source: Box<dyn BlockSource>, frames: usize) -> BlockAdapter {
        BlockAdapter {
            source,
            block: vec![0.0; frames * 2],
            filled: 0,
            consumed: 0,
            frames,
        }
    }

    fn fill(&mut self, out: &mut [f32]) {
        let mut written = 0;
        while written < out.len() {
            if self.consumed == self.filled {
                self.source.render_block(&mut self.block, self.frames);
                self.filled = self.frames * 2;
                self.consumed = 0;
            }
            let n = (out.len() - written).min(self.filled - self.consumed);
            out[written..written + n]
                .copy_from_slice(&self.block[self.consumed..self.consumed + n]);
            self.consumed += n;
            written += n;
        }
    }
}

/// A cpal-backed audio output. The stream is created and owned by a
/// dedicated thread, since cpal streams cannot move across threads.
pub struct Device {
    name: String,
    sample_rate: u32,
    block_frames: usize,
    stop: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Device {
    /// Gets the device with the given name. An empty name selects the
    /// default output.
    pub fn get(name: &str, sample_rate: u32, block_frames: usize) -> Device {
        Device {
            name: name.to_string(),
            sample_rate,
            block_frames,
            stop: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Lists the output device names of the default host.
    pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
        let host = cpal::default_host();
        let mut names = Vec::new();
        for device in host.output_devices()? {
            names.push(device.name()?);
        }
        Ok(names)
    }

    fn open_device(&self) -> Result<cpal::Device, Box<dyn Error>> {
        let host = cpal::default_host();
        if self.name.is_empty() || self.name == "default" {
            return host
                .default_output_device()
                .ok_or_else(|| "no default output device".into());
        }
        for device in host.output_devices()? {
            if device.name()? == self.name {
                return Ok(device);
            }
        }
        Err(format!("no output device named {}", self.name).into())
    }
}

impl crate::audio::Device for Device {
    fn start(&self, source: Box<dyn BlockSource>) -> Result<(), Box<dyn Error>> {
        let device = self.open_device()?;
        let config = cpal::StreamConfig {
            channels: 2,
            sample_rate: self.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };
        info!(
            device = device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate = self.sample_rate,
            "Starting audio output."
        );

        let stop = self.stop.clone();
        let mut adapter = BlockAdapter::new(source, self.block_frames);
        let handle = thread::spawn(move || {
            let stream_span = span!(Level::INFO, "audio output stream");
            let _enter = stream_span.enter();

            let stream = device.build_output_stream(
                &config,
                move |data: &mut [f32], _| adapter.fill(data),
                |e| error!(err = e.to_string(), "Audio stream error."),
                None,
            );
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    error!(err = e.to_string(), "Unable to build audio stream.");
                    return;
                }
            };
            if let Err(e) = stream.play() {
                error!(err = e.to_string(), "Unable to start audio stream.");
                return;
            }
            while !stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(50));
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
        write!(f, "{} (cpal)", self.name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Ramp {
        next: f32,
    }

    impl BlockSource for Ramp {
        fn render_block(&mut self, out: &mut [f32], frames: usize) {
            for sample in out[..frames * 2].iter_mut() {
                *sample = self.next;
                self.next += 1.0;
            }
        }
    }

    #[test]
    fn test_block_adapter_spans_callback_sizes() {
        let mut adapter = BlockAdapter::new(Box::new(Ramp { next: 0.0 }), 4);

        // 8-sample blocks pulled through odd callback sizes stay
        // contiguous.
        let mut first = vec![0.0f32; 5];
        let mut second = vec![0.0f32; 7];
        let mut third = vec![0.0f32; 4];
        adapter.fill(&mut first);
        adapter.fill(&mut second);
        adapter.fill(&mut third);

        let all: Vec<f32> = first
            .into_iter()
            .chain(second.into_iter())
            .chain(third.into_iter())
            .collect();
        let expected: Vec<f32> = (0..16).map(|i| i as f32).collect();
        assert_eq!(expected, all);
    }
}
