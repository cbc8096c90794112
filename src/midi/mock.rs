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

//! A mock MIDI output that records sent messages.

use std::fmt;
use std::sync::{Arc, Mutex};

/// A mock sink. Clones share the message log.
#[derive(Clone)]
pub struct Sink {
    name: String,
    messages: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Sink {
    /// Creates a mock sink with the given device name.
    pub fn new(name: &str) -> Sink {
        Sink {
            name: name.to_string(),
            messages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The messages sent so far.
    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.messages.lock().unwrap().clone()
    }

    /// Clears the message log.
    pub fn clear(&self) {
        self.messages.lock().unwrap().clear();
    }
}

impl super::Sink for Sink {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn send(&self, message: &[u8]) {
        self.messages.lock().unwrap().push(message.to_vec());
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
