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

//! Player configuration, read from a YAML file.

use std::{error::Error, fs, path::Path, path::PathBuf};

use serde::Deserialize;

fn default_catalog_url() -> String {
    "https://gifx.co/chip".to_string()
}

fn default_soundfont_url() -> String {
    "https://gifx.co/sf2".to_string()
}

fn default_soundfont() -> String {
    "GeneralUser GS.sf2".to_string()
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_block_frames() -> usize {
    1024
}

fn default_audio_device() -> String {
    "default".to_string()
}

/// The player configuration. Every field has a default, so an empty
/// file (or none at all) is a valid configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Base URL of the track catalog, used for dependent assets such as
    /// PDX sample archives.
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,
    /// Optional local directory mirroring the catalog; when set, assets
    /// are read from disk instead of fetched.
    #[serde(default)]
    pub catalog_dir: Option<PathBuf>,
    /// Base URL for soundfont downloads.
    #[serde(default = "default_soundfont_url")]
    pub soundfont_url: String,
    /// The soundfont loaded before the user picks one.
    #[serde(default = "default_soundfont")]
    pub default_soundfont: String,
    /// Output sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Frames per render block.
    #[serde(default = "default_block_frames")]
    pub block_frames: usize,
    /// Audio output device name. "default" selects the system default;
    /// a "mock" prefix selects the mock output.
    #[serde(default = "default_audio_device")]
    pub audio_device: String,
    /// Index of the external MIDI output selected at startup. 0 is the
    /// null device.
    #[serde(default)]
    pub midi_device: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            catalog_url: default_catalog_url(),
            catalog_dir: None,
            soundfont_url: default_soundfont_url(),
            default_soundfont: default_soundfont(),
            sample_rate: default_sample_rate(),
            block_frames: default_block_frames(),
            audio_device: default_audio_device(),
            midi_device: 0,
        }
    }
}

impl Config {
    /// Parses a config from YAML.
    pub fn parse(contents: &str) -> Result<Config, Box<dyn Error>> {
        Ok(serde_yml::from_str(contents)?)
    }

    /// Reads a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Config, Box<dyn Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }
        Config::parse(&fs::read_to_string(path)?)
    }
}
