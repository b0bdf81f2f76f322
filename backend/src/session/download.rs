use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use serde_json::Value;
use tokio::sync::mpsc::{Receiver, Sender};
use tracing::{Instrument, info, info_span, warn};

use crate::batch::BatchClaim;
use crate::download::ZipDownloader;
use crate::error::AppError;
use crate::port::Outbox;
use crate::protocol::{DownloadRequest, DownloadResponse};
use crate::router::Services;

/// Serves the `bes-download` port. One download at a time.
pub struct DownloadSession {
    downloader: ZipDownloader,
    outbox: Outbox<DownloadResponse>,
    busy: Arc<AtomicBool>,
}

impl DownloadSession {
    pub fn new(services: &Services, outbound: Sender<Value>) -> Self {
        Self {
            downloader: ZipDownloader::new(
                services.files.clone(),
                services.config.download_batch_size,
                services.config.zip_chunk_bytes,
                services.counters.clone(),
            ),
            outbox: Outbox::new(outbound),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn run(self, mut inbound: Receiver<Value>) {
        info!(component = "session", event = "startup", "Download session started");

        while let Some(raw) = inbound.recv().await {
            match serde_json::from_value::<DownloadRequest>(raw) {
                Ok(DownloadRequest::DownloadZip { urls }) => self.start(urls).await,
                Err(e) => {
                    warn!(component = "session", error = %AppError::from(e), "Ignoring message");
                }
            }
        }

        info!(component = "session", event = "shutdown", "Download session ended");
    }

    async fn start(&self, urls: Vec<String>) {
        let Some(claim) = BatchClaim::acquire(&self.busy) else {
            warn!(component = "session", "Download already running; request rejected");
            self.outbox
                .send(DownloadResponse::DownloadComplete {
                    success: false,
                    message: AppError::DownloadInProgress.to_string(),
                    filename: None,
                })
                .await;
            return;
        };

        let downloader = self.downloader.clone();
        let outbox = self.outbox.clone();

        tokio::spawn(
            async move {
                let _claim = claim;
                downloader.handle(urls, &outbox).await;
            }
            .instrument(info_span!("download")),
        );
    }
}
