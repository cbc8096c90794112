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

//! Helpers for the logical, slash-separated paths used by the virtual
//! filesystem and catalog URLs. These are not OS paths.

/// Returns the final component of a logical path.
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Returns everything before the final component, without a trailing slash.
/// Returns an empty string if the path has a single component.
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Returns the final component with its extension removed.
pub fn file_stem(path: &str) -> &str {
    let base = basename(path);
    match base.rfind('.') {
        Some(0) | None => base,
        Some(idx) => &base[..idx],
    }
}

/// Joins logical path segments, skipping empty segments and collapsing
/// the joining slashes. An absolute first segment keeps the path absolute.
pub fn join(segments: &[&str]) -> String {
    let mut out = String::new();
    for segment in segments {
        let trimmed = segment.trim_matches('/');
        if trimmed.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(trimmed);
    }
    if segments.first().is_some_and(|s| s.starts_with('/')) {
        out.insert(0, '/');
    }
    out
}

/// Outputs the given millisecond position in a minutes:seconds format.
pub fn position_minutes_seconds(ms: u32) -> String {
    let total_secs = ms / 1000;
    let minutes = total_secs / 60;
    let secs = total_secs - minutes * 60;
    format!("{}:{:02}", minutes, secs)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_basename_dirname() {
        assert_eq!("song.mdx", basename("Composer/Game/song.mdx"));
        assert_eq!("Composer/Game", dirname("Composer/Game/song.mdx"));
        assert_eq!("song.mdx", basename("song.mdx"));
        assert_eq!("", dirname("song.mdx"));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!("song", file_stem("Composer/song.mdx"));
        assert_eq!("song", file_stem("song"));
        assert_eq!(".hidden", file_stem(".hidden"));
    }

    #[test]
    fn test_join() {
        assert_eq!("/mdx/dir/file.pdx", join(&["/mdx", "dir", "file.pdx"]));
        assert_eq!("/mdx/file.mdx", join(&["/mdx/", "/file.mdx"]));
        assert_eq!("a/b", join(&["a", "", "b"]));
        assert_eq!("/sf2/user/gm.sf2", join(&["/sf2", "user/gm.sf2"]));
    }

    #[test]
    fn test_position_minutes_seconds() {
        assert_eq!("0:00", position_minutes_seconds(0));
        assert_eq!("0:05", position_minutes_seconds(5_000));
        assert_eq!("1:00", position_minutes_seconds(60_000));
        assert_eq!("2:05", position_minutes_seconds(125_400));
        assert_eq!("60:06", position_minutes_seconds(3_606_000));
    }
}
