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

//! Staging of auxiliary assets (dependent sample archives, soundfonts)
//! into the virtual filesystem before playback can start.
//!
//! Staging is idempotent: a path that is already present is never fetched
//! or written again. Concurrent stages of the same path coalesce onto a
//! single fetch.

use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::vfs::Vfs;

pub mod mock;

/// Where the bytes for a staged asset come from.
pub enum AssetSource {
    /// Raw bytes already in memory (e.g. a dropped file).
    Bytes(Vec<u8>),
    /// A catalog URL to fetch.
    Url(String),
}

/// Errors raised by asset staging.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    /// The asset could not be fetched or written; the caller must not
    /// proceed to open the track.
    #[error("asset unavailable: {path}: {reason}")]
    AssetUnavailable {
        /// The virtual filesystem path that failed to stage.
        path: String,
        /// What went wrong.
        reason: String,
    },
}

/// Fetches raw bytes for a URL. HTTP mechanics are out of scope; the
/// production implementation maps catalog URLs onto a local directory.
pub trait AssetFetcher: Send + Sync {
    /// Fetches the asset at the given URL.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, Box<dyn Error + Send + Sync>>;
}

/// An [`AssetFetcher`] backed by a local catalog directory: the URL is
/// expected to start with `prefix`, and the remainder is resolved under
/// `root`.
pub struct DirFetcher {
    prefix: String,
    root: PathBuf,
}

impl DirFetcher {
    /// Creates a fetcher resolving `prefix`-URLs under `root`.
    pub fn new(prefix: &str, root: PathBuf) -> DirFetcher {
        DirFetcher {
            prefix: prefix.to_string(),
            root,
        }
    }
}

impl AssetFetcher for DirFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, Box<dyn Error + Send + Sync>> {
        let rest = url
            .strip_prefix(&self.prefix)
            .ok_or_else(|| format!("url {} is outside catalog {}", url, self.prefix))?;
        let path = self.root.join(rest.trim_start_matches('/'));
        Ok(fs::read(path)?)
    }
}

/// Stages named assets into the virtual filesystem.
#[derive(Clone)]
pub struct AssetStager {
    vfs: Arc<Vfs>,
    fetcher: Arc<dyn AssetFetcher>,
    in_flight: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl AssetStager {
    /// Creates a stager writing into the given filesystem.
    pub fn new(vfs: Arc<Vfs>, fetcher: Arc<dyn AssetFetcher>) -> AssetStager {
        AssetStager {
            vfs,
            fetcher,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Ensures the given path is readable in the virtual filesystem.
    /// A no-op when the file is already present. Concurrent calls for the
    /// same path serialize on a per-path lock, so the loser observes the
    /// winner's file instead of fetching again.
    pub async fn stage(&self, path: &str, source: AssetSource) -> Result<(), AssetError> {
        if self.vfs.exists(path) {
            debug!(path = path, "Asset already staged.");
            return Ok(());
        }

        let path_lock = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(path.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let result = {
            let _staging = path_lock.lock().await;
            self.stage_locked(path, source).await
        };

        // Clear the slot once the stage is over so the table tracks only
        // in-flight paths. A successor may already have replaced it.
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.get(path).is_some_and(|l| Arc::ptr_eq(l, &path_lock)) {
            in_flight.remove(path);
        }
        result
    }

    async fn stage_locked(&self, path: &str, source: AssetSource) -> Result<(), AssetError> {
        // A concurrent stage may have completed while we waited.
        if self.vfs.exists(path) {
            debug!(path = path, "Asset staged by concurrent call.");
            return Ok(());
        }

        let data = match source {
            AssetSource::Bytes(data) => data,
            AssetSource::Url(url) => {
                info!(path = path, url = url, "Fetching asset.");
                let fetcher = self.fetcher.clone();
                let fetch_url = url.clone();
                tokio::task::spawn_blocking(move || fetcher.fetch(&fetch_url))
                    .await
                    .map_err(|e| AssetError::AssetUnavailable {
                        path: path.to_string(),
                        reason: e.to_string(),
                    })?
                    .map_err(|e| AssetError::AssetUnavailable {
                        path: path.to_string(),
                        reason: e.to_string(),
                    })?
            }
        };

        self.vfs.write(path, data);
        info!(path = path, "Asset staged.");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::sync::Arc;

    use super::{mock, AssetSource, AssetStager, DirFetcher};
    use crate::vfs::Vfs;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stage_bytes_then_idempotent() {
        let vfs = Arc::new(Vfs::new());
        let fetcher = Arc::new(mock::Fetcher::new());
        let stager = AssetStager::new(vfs.clone(), fetcher.clone());

        stager
            .stage("/mdx/song.mdx", AssetSource::Bytes(vec![1, 2]))
            .await
            .expect("stage");
        assert_eq!(vec![1, 2], *vfs.read("/mdx/song.mdx").expect("present"));

        // Second stage with different bytes must not rewrite.
        stager
            .stage("/mdx/song.mdx", AssetSource::Bytes(vec![9]))
            .await
            .expect("stage");
        assert_eq!(vec![1, 2], *vfs.read("/mdx/song.mdx").expect("present"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stage_url_fetches_once() {
        let vfs = Arc::new(Vfs::new());
        let fetcher = Arc::new(mock::Fetcher::new());
        fetcher.insert("https://catalog/DIR/NAME.PDX", vec![7]);
        let stager = AssetStager::new(vfs.clone(), fetcher.clone());

        stager
            .stage(
                "/mdx/dir/name.pdx",
                AssetSource::Url("https://catalog/DIR/NAME.PDX".to_string()),
            )
            .await
            .expect("stage");
        stager
            .stage(
                "/mdx/dir/name.pdx",
                AssetSource::Url("https://catalog/DIR/NAME.PDX".to_string()),
            )
            .await
            .expect("stage");

        assert_eq!(1, fetcher.fetch_count());
        assert_eq!(vec![7], *vfs.read("/mdx/dir/name.pdx").expect("present"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_stage_coalesces() {
        let vfs = Arc::new(Vfs::new());
        let fetcher = Arc::new(mock::Fetcher::new());
        fetcher.insert("https://catalog/BIG.PDX", vec![1; 16]);
        let stager = AssetStager::new(vfs.clone(), fetcher.clone());

        let a = {
            let stager = stager.clone();
            tokio::spawn(async move {
                stager
                    .stage(
                        "/mdx/big.pdx",
                        AssetSource::Url("https://catalog/BIG.PDX".to_string()),
                    )
                    .await
            })
        };
        let b = {
            let stager = stager.clone();
            tokio::spawn(async move {
                stager
                    .stage(
                        "/mdx/big.pdx",
                        AssetSource::Url("https://catalog/BIG.PDX".to_string()),
                    )
                    .await
            })
        };

        a.await.expect("join").expect("stage");
        b.await.expect("join").expect("stage");
        assert_eq!(1, fetcher.fetch_count());
        assert!(stager.in_flight.lock().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_path_locks_released_after_stage() {
        let vfs = Arc::new(Vfs::new());
        let fetcher = Arc::new(mock::Fetcher::new());
        fetcher.insert("https://catalog/A.PDX", vec![1]);
        let stager = AssetStager::new(vfs.clone(), fetcher);

        stager
            .stage(
                "/mdx/a.pdx",
                AssetSource::Url("https://catalog/A.PDX".to_string()),
            )
            .await
            .expect("stage");
        stager
            .stage(
                "/mdx/missing.pdx",
                AssetSource::Url("https://catalog/MISSING.PDX".to_string()),
            )
            .await
            .expect_err("must fail");

        // Both the completed and the failed stage clear their slots.
        assert!(stager.in_flight.lock().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_failure_is_unavailable() {
        let vfs = Arc::new(Vfs::new());
        let fetcher = Arc::new(mock::Fetcher::new());
        let stager = AssetStager::new(vfs.clone(), fetcher);

        let err = stager
            .stage(
                "/mdx/missing.pdx",
                AssetSource::Url("https://catalog/MISSING.PDX".to_string()),
            )
            .await
            .expect_err("must fail");
        assert!(err.to_string().contains("/mdx/missing.pdx"));
        assert!(!vfs.exists("/mdx/missing.pdx"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dir_fetcher_maps_urls() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("SONG.PDX"), [3, 4]).expect("write");

        let vfs = Arc::new(Vfs::new());
        let fetcher = Arc::new(DirFetcher::new(
            "https://catalog",
            dir.path().to_path_buf(),
        ));
        let stager = AssetStager::new(vfs.clone(), fetcher);

        stager
            .stage(
                "/mdx/song.pdx",
                AssetSource::Url("https://catalog/SONG.PDX".to_string()),
            )
            .await
            .expect("stage");
        assert_eq!(vec![3, 4], *vfs.read("/mdx/song.pdx").expect("present"));
    }
}
