//! Bulk download: fetch files, pack them into one archive, stream it back.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;

use bclient::{DownloadedFile, FileSource};
use futures::future::join_all;
use tracing::{error, info, instrument, warn};
use zip::result::ZipResult;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::logger::warn_if_slow;
use crate::metrics::counters::Counters;
use crate::port::Outbox;
use crate::protocol::DownloadResponse;
use crate::time::date_stamp;
use crate::transport::send_chunks;

const SLOW_FILE: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct ZipDownloader {
    files: Arc<dyn FileSource>,
    batch_size: usize,
    chunk_bytes: usize,
    counters: Counters,
}

impl ZipDownloader {
    pub fn new(
        files: Arc<dyn FileSource>,
        batch_size: usize,
        chunk_bytes: usize,
        counters: Counters,
    ) -> Self {
        Self {
            files,
            batch_size: batch_size.max(1),
            chunk_bytes,
            counters,
        }
    }

    /// Handles one `downloadZip` request end to end. Every outcome, including
    /// failure, ends with a single `downloadComplete`.
    #[instrument(skip_all, fields(total = urls.len()))]
    pub async fn handle(&self, urls: Vec<String>, outbox: &Outbox<DownloadResponse>) {
        let total = urls.len();
        let mut completed = 0;
        let mut failed = 0;
        let mut files = Vec::new();

        info!(component = "download", total, "Starting download");
        outbox
            .send(progress(completed, failed, total, format!("Starting download of {total} files...")))
            .await;

        for batch in urls.chunks(self.batch_size) {
            let results = join_all(
                batch
                    .iter()
                    .map(|url| warn_if_slow("fetch_file", SLOW_FILE, self.files.fetch_file(url))),
            )
            .await;

            for (url, result) in batch.iter().zip(results) {
                match result {
                    Ok(file) => {
                        completed += 1;
                        files.push(file);
                    }
                    Err(e) => {
                        failed += 1;
                        warn!(component = "download", %url, error = %e, "File download failed");
                    }
                }
                outbox
                    .send(progress(
                        completed,
                        failed,
                        total,
                        format!("Downloaded {completed} of {total} files ({failed} failed)"),
                    ))
                    .await;
            }
        }

        if files.is_empty() {
            Counters::bump(&self.counters.downloads_failed);
            outbox.send(complete(false, "No files could be downloaded".into(), None)).await;
            return;
        }

        outbox
            .send(progress(completed, failed, total, "Creating zip file...".into()))
            .await;

        let filename = format!("bandcamp_{}.zip", date_stamp());
        let archive = match build_zip(files) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(component = "download", error = %e, "Zip creation failed");
                self.fail(outbox).await;
                return;
            }
        };

        info!(component = "download", %filename, size = archive.len(), "Zip archive built");

        match send_chunks(outbox, &archive, &filename, self.chunk_bytes).await {
            Ok(sent) => {
                Counters::add(&self.counters.chunks_sent, sent as u64);
                Counters::bump(&self.counters.downloads_completed);
                info!(component = "download", chunks = sent, "All chunks sent");

                let message = if failed == 0 {
                    format!("Successfully downloaded {completed} files as {filename}")
                } else {
                    format!(
                        "Downloaded {completed} files as {filename}. {failed} files failed to download."
                    )
                };
                outbox.send(complete(true, message, Some(filename))).await;
            }
            Err(e) => {
                error!(component = "download", error = %e, "Sending archive failed");
                self.fail(outbox).await;
            }
        }
    }

    async fn fail(&self, outbox: &Outbox<DownloadResponse>) {
        Counters::bump(&self.counters.downloads_failed);
        outbox
            .send(complete(false, "Failed to create or download zip file".into(), None))
            .await;
    }
}

fn progress(completed: usize, failed: usize, total: usize, message: String) -> DownloadResponse {
    DownloadResponse::DownloadProgress {
        completed,
        failed,
        total,
        message,
    }
}

fn complete(success: bool, message: String, filename: Option<String>) -> DownloadResponse {
    DownloadResponse::DownloadComplete {
        success,
        message,
        filename,
    }
}

/// Packs files into an uncompressed zip. Audio does not compress further.
pub fn build_zip(files: Vec<DownloadedFile>) -> ZipResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut used = HashSet::new();

    for file in files {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(file.bytes.len() as u64 >= u64::from(u32::MAX));

        writer.start_file(unique_name(&mut used, &file.name), options)?;
        writer.write_all(&file.bytes)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// `name`, or `stem (n).ext` for the n-th repeat.
fn unique_name(used: &mut HashSet<String>, name: &str) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };

    let mut n = 2;
    loop {
        let candidate = format!("{stem} ({n}){ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
