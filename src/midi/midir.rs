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

//! MIDI output sinks backed by midir.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use midir::{MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use tracing::warn;

use super::Sink;

const CLIENT_NAME: &str = "chipdeck";

/// Enumerates the system MIDI outputs as sinks.
pub fn list() -> Result<Vec<Arc<dyn Sink>>, Box<dyn Error>> {
    let output = MidiOutput::new(CLIENT_NAME)?;
    let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();
    for port in output.ports() {
        let name = output.port_name(&port)?;
        sinks.push(Arc::new(MidirSink {
            name,
            connection: Mutex::new(None),
        }));
    }
    Ok(sinks)
}

/// A system MIDI output. The port is connected lazily on first send and
/// held open for the life of the sink.
pub struct MidirSink {
    name: String,
    connection: Mutex<Option<MidiOutputConnection>>,
}

impl MidirSink {
    fn connect(&self) -> Result<MidiOutputConnection, Box<dyn Error>> {
        let output = MidiOutput::new(CLIENT_NAME)?;
        let mut found = None;
        for port in output.ports() {
            if output.port_name(&port)? == self.name {
                found = Some(port);
                break;
            }
        }
        let port = found.ok_or_else(|| format!("MIDI output {} no longer present", self.name))?;
        output
            .connect(&port, CLIENT_NAME)
            .map_err(|e| format!("unable to connect to {}: {}", self.name, e).into())
    }
}

impl Sink for MidirSink {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn send(&self, message: &[u8]) {
        let mut connection = self.connection.lock();
        if connection.is_none() {
            match self.connect() {
                Ok(c) => *connection = Some(c),
                Err(e) => {
                    warn!(
                        device = self.name,
                        err = e.to_string(),
                        "unable to connect MIDI output"
                    );
                    return;
                }
            }
        }
        if let Some(c) = connection.as_mut() {
            if let Err(e) = c.send(message) {
                warn!(
                    device = self.name,
                    err = e.to_string(),
                    "error sending to MIDI output"
                );
            }
        }
    }
}

impl fmt::Display for MidirSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
