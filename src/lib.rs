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

//! A playback-control layer for chiptune-era music formats.
//!
//! The format drivers ([`drivers::mdx`], [`drivers::midi`]) implement a
//! uniform [`player::Player`] contract on top of pluggable decoding
//! engines and synthesizers. Audio is pulled in fixed blocks by an
//! output device; everything the render path touches is preallocated
//! and guarded so the callback never blocks.

pub mod assets;
pub mod audio;
pub mod config;
pub mod drivers;
pub mod engine;
pub mod events;
pub mod heuristics;
pub mod midi;
pub mod multiplexer;
pub mod params;
pub mod player;
pub mod playsync;
pub mod sequencer;
pub mod synth;
#[cfg(test)]
pub mod test;
pub mod util;
pub mod vfs;
