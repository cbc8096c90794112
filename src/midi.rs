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

//! External MIDI output devices.

pub mod midir;
pub mod mock;

use std::fmt;
use std::sync::Arc;

use tracing::warn;

/// The registry slot for "no device".
pub const NULL_DEVICE_NAME: &str = "(none)";

/// All-notes-off plus all-sound-off for one channel.
fn panic_messages(channel: u8) -> [[u8; 3]; 2] {
    [
        [0xb0 | channel, 120, 0], // all sound off
        [0xb0 | channel, 123, 0], // all notes off
    ]
}

/// An external MIDI output. Send is fire-and-forget; delivery failures
/// are logged, not surfaced, since the render path cannot handle them.
pub trait Sink: fmt::Display + Send + Sync {
    /// The device name as enumerated.
    fn name(&self) -> String;

    /// Sends one raw MIDI message.
    fn send(&self, message: &[u8]);

    /// Cuts all sound on every channel.
    fn panic(&self) {
        for channel in 0..16u8 {
            for message in panic_messages(channel) {
                self.send(&message);
            }
        }
    }
}

/// A sink that discards everything. Registry slot 0, so pass-through
/// mode is always selectable even with no hardware attached.
pub struct NullSink;

impl Sink for NullSink {
    fn name(&self) -> String {
        NULL_DEVICE_NAME.to_string()
    }

    fn send(&self, _message: &[u8]) {}

    fn panic(&self) {}
}

impl fmt::Display for NullSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", NULL_DEVICE_NAME)
    }
}

/// The enumerated MIDI outputs, addressed by index. Index 0 is always
/// the null device.
pub struct OutputDeviceRegistry {
    sinks: Vec<Arc<dyn Sink>>,
}

impl Default for OutputDeviceRegistry {
    fn default() -> OutputDeviceRegistry {
        OutputDeviceRegistry::new()
    }
}

impl OutputDeviceRegistry {
    /// Creates a registry holding only the null device.
    pub fn new() -> OutputDeviceRegistry {
        OutputDeviceRegistry {
            sinks: vec![Arc::new(NullSink)],
        }
    }

    /// Creates a registry populated from the system's MIDI outputs. An
    /// enumeration failure leaves only the null device.
    pub fn discover() -> OutputDeviceRegistry {
        let mut registry = OutputDeviceRegistry::new();
        match midir::list() {
            Ok(sinks) => {
                for sink in sinks {
                    registry.sinks.push(sink);
                }
            }
            Err(e) => {
                warn!(err = e.to_string(), "unable to enumerate MIDI outputs");
            }
        }
        registry
    }

    /// Adds a sink, returning its index. Tests use this to install
    /// mocks.
    pub fn register(&mut self, sink: Arc<dyn Sink>) -> usize {
        self.sinks.push(sink);
        self.sinks.len() - 1
    }

    /// The device names in index order.
    pub fn names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// The sink at an index. An out-of-range index falls back to the
    /// null device with a warning.
    pub fn get(&self, index: usize) -> Arc<dyn Sink> {
        match self.sinks.get(index) {
            Some(sink) => sink.clone(),
            None => {
                warn!(index, "MIDI device index out of range, using null device");
                self.sinks[0].clone()
            }
        }
    }

    /// The number of registered devices, null device included.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Always false; the null device is always present.
    pub fn is_empty(&self) -> bool {
        false
    }
}
