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

//! Filename-driven policies: pure functions from a filepath to parameter
//! overrides or guessed metadata. They only ever produce transient
//! values and are replaceable wholesale.

use crate::events::Metadata;
use crate::multiplexer::SynthKind;
use crate::util;

/// Picks a synth engine from the filename. Files whose name carries an
/// "fm" word (start or end of a token) play through the OPL3 engine.
pub fn engine_for_filename(filepath: &str) -> Option<SynthKind> {
    let lowered = filepath.to_lowercase().replace('_', " ");
    let has_fm_word = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| !token.is_empty() && (token.starts_with("fm") || token.ends_with("fm")));
    if has_fm_word {
        Some(SynthKind::Opl3)
    } else {
        None
    }
}

/// Crude OPL3 bank matching for a few specific games. Returns an index
/// into `bank_names`.
pub fn opl3_bank_for_filename(filepath: &str, bank_names: &[String]) -> Option<i64> {
    let lowered = filepath.to_lowercase().replace('_', " ");
    let find_bank = |needle: &str| {
        bank_names
            .iter()
            .position(|name| name.contains(needle))
            .map(|idx| idx as i64)
    };

    let needle = if lowered.contains("[rick]") {
        "Descent:: Rick"
    } else if lowered.contains("[ham]") {
        "Descent:: Ham"
    } else if lowered.contains("[int]") {
        "Descent:: Int"
    } else if lowered.contains("descent 2") {
        "Descent 2"
    } else if lowered.contains("magic carpet") {
        "Magic Carpet"
    } else if lowered.contains("wacky wheels") {
        "Apogee IMF"
    } else if lowered.contains("warcraft 2") {
        "Warcraft 2"
    } else if lowered.contains("warcraft") {
        "Warcraft"
    } else if lowered.contains("system shock") {
        "System Shock"
    } else {
        return None;
    };

    find_bank(needle)
}

/// Guesses display metadata from the catalog directory structure when a
/// file embeds none: `System/Game/.../Track` becomes
/// "Game - Track" with the system as subtitle.
pub fn metadata_from_filepath(filepath: &str, format: &str) -> Metadata {
    let parts: Vec<&str> = filepath.split('/').collect();
    let (title, subtitle) = match parts.as_slice() {
        [only] => (util::file_stem(only).to_string(), format.to_string()),
        [first, second] => (util::file_stem(second).to_string(), first.to_string()),
        [first, second, .., last] => (
            format!("{} - {}", second, util::file_stem(last)),
            first.to_string(),
        ),
        [] => (String::new(), format.to_string()),
    };
    Metadata {
        title,
        subtitle,
        info_texts: Vec::new(),
    }
}
