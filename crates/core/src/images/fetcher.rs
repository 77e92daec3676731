use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::error::Result;
use crate::images::ImageCleaner;

/// Downloads a rewrite call's images under their content-hash filenames.
///
/// Failures are logged and skipped rather than failing the page: a missing
/// image degrades the page, a failed page loses it. Retry policy belongs to
/// whoever re-adds the page.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: Client,
    cleaner: ImageCleaner,
    max_procs: usize,
}

impl ImageFetcher {
    /// Build a fetcher that runs at most `max_procs` downloads at once.
    pub fn new(cleaner: ImageCleaner, max_procs: usize) -> Result<ImageFetcher> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(ImageFetcher { client, cleaner, max_procs: max_procs.max(1) })
    }

    /// Download every image in `urls` (filename to remote URL) into `dir`,
    /// cleaning each file after it lands. Returns the total bytes written.
    pub async fn download_all(&self, urls: &HashMap<String, String>, dir: &Path) -> u64 {
        let semaphore = Arc::new(Semaphore::new(self.max_procs));
        let mut tasks = JoinSet::new();

        for (filename, url) in urls {
            let client = self.client.clone();
            let cleaner = self.cleaner.clone();
            let semaphore = Arc::clone(&semaphore);
            let path = dir.join(filename);
            let url = url.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                let bytes = match download_one(&client, &url, &path).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(%url, error = %e, "failed to download image");
                        return None;
                    }
                };
                clean_in_place(cleaner, path, &url).await;
                Some(bytes)
            });
        }

        let mut total = 0;
        while let Some(finished) = tasks.join_next().await {
            if let Ok(Some(bytes)) = finished {
                total += bytes;
            }
        }
        total
    }
}

async fn download_one(client: &Client, url: &str, path: &Path) -> Result<u64> {
    let response = client.get(url).send().await?.error_for_status()?;
    let body = response.bytes().await?;
    tokio::fs::write(path, &body).await?;
    Ok(body.len() as u64)
}

/// Decoding and re-encoding are CPU-bound; run them off the async workers.
async fn clean_in_place(cleaner: ImageCleaner, path: PathBuf, url: &str) {
    match tokio::task::spawn_blocking(move || cleaner.clean(&path)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(%url, error = %e, "unable to clean image"),
        Err(e) => warn!(%url, error = %e, "image cleaner task failed"),
    }
}
