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

//! The uniform player contract implemented by every format driver.

use std::future::Future;
use std::pin::Pin;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use thiserror::Error;
use tracing::{span, Level};

use crate::assets::AssetError;
use crate::engine::EngineError;
use crate::events::{Metadata, PlayerState};
use crate::params::{ParamDef, ParamError, ParamValue};
use crate::synth::SynthError;

/// Errors surfaced by player operations.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// A required asset could not be staged.
    #[error(transparent)]
    Asset(#[from] AssetError),
    /// The decoding engine rejected the file.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// The file could not be parsed.
    #[error("unable to parse file: {0}")]
    Parse(String),
    /// A synthesizer configuration call failed.
    #[error(transparent)]
    Synth(#[from] SynthError),
    /// An unknown parameter was referenced.
    #[error(transparent)]
    Param(#[from] ParamError),
}

/// The boxed future returned by `load_data`, since async trait methods
/// are not object safe.
pub type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PlayerError>> + Send + 'a>>;

/// A format driver. All methods other than `load_data` are synchronous
/// and safe to call from UI code while audio runs.
pub trait Player: Send + Sync {
    /// Loads a file from bytes and starts playback. A load superseded
    /// by a newer one finishes quietly without touching player state.
    fn load_data<'a>(&'a self, data: Vec<u8>, path: &'a str) -> LoadFuture<'a>;

    /// Resumes playback.
    fn play(&self);

    /// Pauses playback. Audio continues to be pulled but renders
    /// silence.
    fn pause(&self);

    /// Toggles between playing and paused.
    fn toggle_pause(&self);

    /// Stops playback and emits the terminal snapshot. Idempotent;
    /// only the first stop emits.
    fn stop(&self);

    /// The lifecycle state.
    fn state(&self) -> PlayerState;

    /// Seeks to a position in milliseconds.
    fn seek_ms(&self, ms: u32);

    /// The playback position in milliseconds.
    fn position_ms(&self) -> u32;

    /// The duration in milliseconds, 0 if unknown.
    fn duration_ms(&self) -> u32;

    /// The tempo multiplier.
    fn speed(&self) -> f64;

    /// Sets the tempo multiplier.
    fn set_speed(&self, speed: f64);

    /// The number of voices in the loaded file.
    fn voice_count(&self) -> usize;

    /// A display name for one voice.
    fn voice_name(&self, voice: usize) -> String;

    /// Whether a voice is audible.
    fn voice_audible(&self, voice: usize) -> bool;

    /// Mutes or unmutes one voice.
    fn set_voice_audible(&self, voice: usize, audible: bool);

    /// Metadata for the loaded file.
    fn metadata(&self) -> Metadata;

    /// The parameter definitions this driver exposes.
    fn param_defs(&self) -> Vec<ParamDef>;

    /// Sets a parameter and applies its side effects. Transient values
    /// are cleared by the next load.
    fn set_parameter(&self, id: &str, value: ParamValue, transient: bool)
        -> Result<(), PlayerError>;

    /// Reads a parameter through the transient/persistent/default
    /// chain.
    fn get_parameter(&self, id: &str) -> Option<ParamValue>;
}

/// Pulls interleaved stereo f32 blocks. Implemented by each driver's
/// render handle and driven by the audio output.
pub trait BlockSource: Send {
    /// Fills `out` with `frames` frames. Always writes the full block;
    /// silence stands in for anything unavailable.
    fn render_block(&mut self, out: &mut [f32], frames: usize);
}

/// Messages from the render path to the cooperative side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// The engine ran out of frames; stop must happen off the render
    /// thread.
    EndOfStream,
}

/// Creates the control channel a driver shares with its render handle.
pub fn control_channel() -> (Sender<Control>, Receiver<Control>) {
    unbounded()
}

/// Runs the driver's control loop on a dedicated thread. The loop ends
/// when every sender is dropped.
pub fn spawn_control_loop<F>(receiver: Receiver<Control>, handler: F)
where
    F: Fn(Control) + Send + 'static,
{
    thread::spawn(move || {
        let span = span!(Level::INFO, "player control loop");
        let _enter = span.enter();

        while let Ok(control) = receiver.recv() {
            handler(control);
        }
    });
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::test::eventually;

    use super::*;

    #[test]
    fn test_control_loop_handles_end_of_stream() {
        let (tx, rx) = control_channel();
        let handled = Arc::new(AtomicUsize::new(0));
        let loop_handled = handled.clone();
        spawn_control_loop(rx, move |control| {
            assert_eq!(Control::EndOfStream, control);
            loop_handled.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(Control::EndOfStream).expect("send failed");
        tx.send(Control::EndOfStream).expect("send failed");

        eventually(
            || handled.load(Ordering::SeqCst) == 2,
            "control loop never handled both messages",
        );
    }
}
