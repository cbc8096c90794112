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

//! The virtual filesystem shared by the asset stager and the decoding
//! engines. Paths are absolute, slash-separated and case-sensitive.
//!
//! Decoding engines only ever read files the stager has written, so a
//! flat in-memory map with a directory index is enough. File contents are
//! handed out as `Arc<Vec<u8>>` so an engine can hold a file open without
//! blocking writers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::util;

/// An in-memory virtual filesystem.
#[derive(Default)]
pub struct Vfs {
    files: RwLock<HashMap<String, Arc<Vec<u8>>>>,
    dirs: RwLock<HashSet<String>>,
}

impl Vfs {
    /// Creates an empty filesystem.
    pub fn new() -> Vfs {
        Vfs::default()
    }

    /// Mounts a store at the given point. Equivalent to creating the
    /// directory tree; kept as a separate name to match the consuming
    /// engines' expectations.
    pub fn mount(&self, point: &str) {
        self.mkdir_tree(point);
    }

    /// Creates a directory and all of its parents.
    pub fn mkdir_tree(&self, path: &str) {
        let mut dirs = self.dirs.write();
        let mut current = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current.push('/');
            current.push_str(component);
            dirs.insert(current.clone());
        }
    }

    /// Returns true if a file or directory exists at the given path.
    pub fn exists(&self, path: &str) -> bool {
        self.files.read().contains_key(path) || self.dirs.read().contains(path)
    }

    /// Writes a file, creating parent directories as needed. Overwrites
    /// any existing file at the path.
    pub fn write(&self, path: &str, data: Vec<u8>) {
        let dir = util::dirname(path);
        if !dir.is_empty() {
            self.mkdir_tree(dir);
        }
        self.files.write().insert(path.to_string(), Arc::new(data));
    }

    /// Reads a file, if present.
    pub fn read(&self, path: &str) -> Option<Arc<Vec<u8>>> {
        self.files.read().get(path).cloned()
    }

    /// Lists the names of files directly under the given directory,
    /// sorted. Names are returned without the directory prefix.
    pub fn readdir(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let mut names: Vec<String> = self
            .files
            .read()
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(|rest| rest.to_string())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod test {
    use super::Vfs;

    #[test]
    fn test_mount_and_exists() {
        let vfs = Vfs::new();
        vfs.mount("/mdx");
        assert!(vfs.exists("/mdx"));
        assert!(!vfs.exists("/sf2"));
    }

    #[test]
    fn test_write_creates_parents() {
        let vfs = Vfs::new();
        vfs.write("/mdx/Composer/song.mdx", vec![1, 2, 3]);
        assert!(vfs.exists("/mdx"));
        assert!(vfs.exists("/mdx/Composer"));
        assert_eq!(
            vec![1, 2, 3],
            *vfs.read("/mdx/Composer/song.mdx").expect("file present")
        );
    }

    #[test]
    fn test_readdir_direct_children_only() {
        let vfs = Vfs::new();
        vfs.write("/sf2/user/b.sf2", vec![]);
        vfs.write("/sf2/user/a.sf2", vec![]);
        vfs.write("/sf2/user/deeper/c.sf2", vec![]);
        vfs.write("/sf2/gm.sf2", vec![]);
        assert_eq!(vec!["a.sf2", "b.sf2"], vfs.readdir("/sf2/user"));
    }

    #[test]
    fn test_read_missing() {
        let vfs = Vfs::new();
        assert!(vfs.read("/nope").is_none());
    }
}
