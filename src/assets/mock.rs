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
use std::collections::HashMap;
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

/// A mock fetcher serving from an in-memory map and counting fetches.
#[derive(Default)]
pub struct Fetcher {
    responses: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl Fetcher {
    /// Creates an empty mock fetcher.
    pub fn new() -> Fetcher {
        Fetcher::default()
    }

    /// Registers a response for a URL.
    pub fn insert(&self, url: &str, data: Vec<u8>) {
        self.responses.lock().insert(url.to_string(), data);
    }

    /// Returns how many fetches were attempted.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Resets registered responses and the fetch counter.
    pub fn clear(&self) {
        self.responses.lock().clear();
        self.fetches.store(0, Ordering::Relaxed);
    }
}

impl super::AssetFetcher for Fetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, Box<dyn Error + Send + Sync>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.responses
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| format!("no response registered for {}", url).into())
    }
}
