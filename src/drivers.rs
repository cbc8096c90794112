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

//! Format drivers. Each driver implements the [`Player`](crate::player::Player)
//! contract for one family of file formats.

pub mod mdx;
pub mod midi;

use crate::util;

/// The file format families the drivers cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Sharp X68000 MDX, with optional companion PDX sample archives.
    Mdx,
    /// Standard MIDI files and close relatives.
    Midi,
}

impl Format {
    /// Picks the driver family for a file path by extension. Unknown
    /// extensions get no driver.
    pub fn for_path(path: &str) -> Option<Format> {
        let name = util::basename(path).to_ascii_lowercase();
        let ext = name.rsplit_once('.').map(|(_, ext)| ext)?;
        match ext {
            "mdx" => Some(Format::Mdx),
            "mid" | "midi" | "smf" | "kar" | "rmi" => Some(Format::Midi),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_format_for_path() {
        assert_eq!(Some(Format::Mdx), Format::for_path("music/x68k/TITLE.MDX"));
        assert_eq!(Some(Format::Midi), Format::for_path("doom/d_e1m1.mid"));
        assert_eq!(Some(Format::Midi), Format::for_path("song.KAR"));
        assert_eq!(None, Format::for_path("archive.zip"));
        assert_eq!(None, Format::for_path("noextension"));
    }
}
