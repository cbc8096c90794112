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

//! Audio output devices.

use std::{error::Error, fmt};

use crate::player::BlockSource;

pub mod cpal;
pub mod mock;

/// An audio output. Once started, the device pulls fixed-size blocks
/// from the source until stopped; the source is expected to hand out
/// silence whenever it has nothing to play.
pub trait Device: fmt::Display + Send + Sync {
    /// Starts the output stream. Returns once the stream is running.
    fn start(&self, source: Box<dyn BlockSource>) -> Result<(), Box<dyn Error>>;

    /// Stops the output stream.
    fn stop(&self);
}

/// Lists output device names known to cpal.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets a device with the given name. Names starting with "mock" yield
/// a mock device.
pub fn get_device(
    name: &str,
    sample_rate: u32,
    block_frames: usize,
) -> Result<Box<dyn Device>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(Box::new(mock::Device::get(name, sample_rate, block_frames)));
    }

    Ok(Box::new(cpal::Device::get(name, sample_rate, block_frames)))
}
