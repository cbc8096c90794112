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
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use tracing::warn;

use chipdeck::assets::DirFetcher;
use chipdeck::audio;
use chipdeck::config::Config;
use chipdeck::drivers::{self, Format};
use chipdeck::midi::OutputDeviceRegistry;
use chipdeck::params::ParamValue;
use chipdeck::player::Player;
use chipdeck::synth::NullSynth;
use chipdeck::util;
use chipdeck::vfs::Vfs;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A chiptune playback controller."
)]
struct Cli {
    /// The path to the player config.
    #[arg(short, long, default_value = "chipdeck.yaml")]
    config: PathBuf,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available MIDI output devices.
    MidiDevices {},
    /// Prints the parameter definitions of the MIDI driver as JSON.
    Params {},
    /// Plays a file. MIDI files play through the configured external
    /// MIDI device.
    Play {
        /// The path of the file to play.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::MidiDevices {} => {
            let registry = OutputDeviceRegistry::discover();

            println!("Devices:");
            for name in registry.names() {
                println!("- {}", name);
            }
        }
        Commands::Params {} => {
            let (player, _render, _events) = midi_player(&config);
            println!("{}", serde_json::to_string_pretty(&player.param_defs())?);
        }
        Commands::Play { file } => {
            let path = file.to_string_lossy().to_string();
            match Format::for_path(&path) {
                Some(Format::Midi) => {}
                Some(Format::Mdx) => {
                    return Err("no MDX decoding engine is linked into this build".into());
                }
                None => return Err(format!("unsupported file: {}", path).into()),
            }

            let (player, render, mut events) = midi_player(&config);

            // No software synths are linked into the CLI build, so
            // playback goes through the external device.
            player.set_parameter("autoengine", ParamValue::Bool(false), false)?;
            player.set_parameter(
                "mididevice",
                ParamValue::Int(config.midi_device as i64),
                false,
            )?;
            player.set_parameter("synthengine", ParamValue::Int(2), false)?;

            let device =
                audio::get_device(&config.audio_device, config.sample_rate, config.block_frames)?;
            device.start(Box::new(render))?;

            let data = fs::read(&file)?;
            player.load_data(data, &path).await?;

            let metadata = player.metadata();
            println!("Playing: {}", metadata.title);
            if !metadata.subtitle.is_empty() {
                println!("         {}", metadata.subtitle);
            }

            loop {
                tokio::select! {
                    snapshot = events.recv() => {
                        match snapshot {
                            Some(snapshot) if snapshot.is_stopped => break,
                            Some(snapshot) => {
                                println!(
                                    "  {} / {}",
                                    util::position_minutes_seconds(snapshot.position_ms),
                                    util::position_minutes_seconds(snapshot.duration_ms),
                                );
                            }
                            None => break,
                        }
                    }
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            warn!(err = e.to_string(), "Unable to listen for ctrl-c.");
                        }
                        player.stop();
                        break;
                    }
                }
            }
            device.stop();
        }
    }

    Ok(())
}

fn midi_player(
    config: &Config,
) -> (
    chipdeck::drivers::midi::MidiPlayer,
    chipdeck::drivers::midi::MidiRender,
    chipdeck::events::PlayerEvents,
) {
    let vfs = Arc::new(Vfs::new());
    let catalog_dir = config
        .catalog_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let fetcher = Arc::new(DirFetcher::new(&config.soundfont_url, catalog_dir));

    drivers::midi::MidiPlayer::new(
        vfs,
        fetcher,
        Box::new(NullSynth),
        Box::new(NullSynth),
        OutputDeviceRegistry::discover(),
        &config.soundfont_url,
        &config.default_soundfont,
        config.sample_rate,
    )
}
