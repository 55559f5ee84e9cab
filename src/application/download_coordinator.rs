use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{stream::BoxStream, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::{
    api::{ApiClient, ApiError},
    application::unpacker::{unpack, ArchiveKind, UnpackOutcome},
    domain::{policy::CONFIG_EXTENSION, AppError, Category, DownloadOutcome, PendingDownload},
    utils::resolve_filename,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// About to start item `current` (0-based) of `total`.
    Progress {
        label: String,
        current: usize,
        total: usize,
    },
    Finished(DownloadOutcome),
    /// Emitted exactly once, last.
    AllDone { cancelled: bool },
}

/// Shared stop flag between the controller and the running sequence.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fetches pending downloads one at a time and installs them.
#[derive(Clone)]
pub struct DownloadCoordinator {
    api_client: ApiClient,
    missions_dir: PathBuf,
    cancel: CancelHandle,
}

impl DownloadCoordinator {
    pub fn new(api_client: ApiClient, missions_dir: PathBuf) -> Self {
        Self {
            api_client,
            missions_dir,
            cancel: CancelHandle::default(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run `items` in order as a lazily driven event stream.
    ///
    /// Nothing happens until the stream is polled, and the sequence only moves
    /// to the next item when the consumer asks for the next event.
    pub fn download_stream(&self, items: Vec<PendingDownload>) -> BoxStream<'static, DownloadEvent> {
        futures::stream::unfold(
            SequenceState::Announce {
                coordinator: self.clone(),
                items,
                index: 0,
            },
            |state| async move {
                match state {
                    SequenceState::Announce {
                        coordinator,
                        items,
                        index,
                    } => {
                        let cancelled = coordinator.cancel.is_cancelled();
                        let total = items.len();
                        if cancelled || index >= total {
                            info!(processed = index, total, cancelled, "download sequence finished");
                            return Some((
                                DownloadEvent::AllDone { cancelled },
                                SequenceState::Finished,
                            ));
                        }

                        Some((
                            DownloadEvent::Progress {
                                label: format!("Downloading {}/{}", index + 1, total),
                                current: index,
                                total,
                            },
                            SequenceState::Fetch {
                                coordinator,
                                items,
                                index,
                            },
                        ))
                    }
                    SequenceState::Fetch {
                        coordinator,
                        items,
                        index,
                    } => {
                        let item = &items[index];
                        let outcome = match coordinator.fetch(item).await {
                            Ok(message) => {
                                info!(url = %item.url, %message, "download finished");
                                DownloadOutcome {
                                    url: item.url.clone(),
                                    category: item.category,
                                    success: true,
                                    message,
                                }
                            }
                            Err(e) => {
                                warn!(url = %item.url, error = %e, "download failed");
                                DownloadOutcome {
                                    url: item.url.clone(),
                                    category: item.category,
                                    success: false,
                                    message: e.to_string(),
                                }
                            }
                        };

                        Some((
                            DownloadEvent::Finished(outcome),
                            SequenceState::Announce {
                                coordinator,
                                items,
                                index: index + 1,
                            },
                        ))
                    }
                    SequenceState::Finished => None,
                }
            },
        )
        .boxed()
    }

    async fn fetch(&self, item: &PendingDownload) -> Result<String, AppError> {
        debug!(url = %item.url, category = %item.category, dest = %item.destination.display(), "fetching");

        let response = self
            .api_client
            .download_file_stream(&item.url)
            .await
            .map_err(|e| AppError::Api(e.to_string()))?;

        let filename = resolve_filename(
            response.content_disposition.as_deref(),
            &item.url,
            Some(&response.final_url),
        );

        tokio::fs::create_dir_all(&item.destination)
            .await
            .map_err(|e| AppError::Io(format!("Failed to create {}: {}", item.destination.display(), e)))?;
        let path = item.destination.join(&filename);

        let expected = response.total_size;
        let written = self.write_body(response.stream, &path).await?;
        debug!(path = %path.display(), bytes = written, ?expected, "body written");

        if ArchiveKind::from_path(&path).is_some() {
            let archive = path.clone();
            let destination = item.destination.clone();
            let category = item.category;
            let unpacked = tokio::task::spawn_blocking(move || unpack(&archive, &destination, category))
                .await
                .map_err(|e| AppError::Unpack(format!("unpack task failed: {}", e)))?;

            return match unpacked {
                Ok(UnpackOutcome::Extracted { destination, files }) => Ok(format!(
                    "Installed {}: {} file(s) into {}",
                    filename,
                    files.len(),
                    destination.display()
                )),
                Ok(UnpackOutcome::Unsupported(kind)) => Ok(format!(
                    "Downloaded: {} ({:?} archives are not unpacked)",
                    filename, kind
                )),
                Err(e) => Err(AppError::Unpack(format!(
                    "{}; archive kept at {}",
                    e,
                    path.display()
                ))),
            };
        }

        if item.category == Category::Mission && is_config_file(&path) {
            let moved = self.relocate_mission(&path).await?;
            return Ok(format!("Downloaded: {} -> {}", filename, moved.display()));
        }

        Ok(format!("Downloaded: {}", filename))
    }

    /// Stream the body to `path`. A cancelled or failed write leaves no file behind.
    async fn write_body(
        &self,
        stream: BoxStream<'static, crate::api::Result<bytes::Bytes>>,
        path: &Path,
    ) -> Result<u64, AppError> {
        let result = self.copy_chunks(stream, path).await;
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "failed to remove partial download");
            }
        }
        result
    }

    async fn copy_chunks(
        &self,
        mut stream: BoxStream<'static, crate::api::Result<bytes::Bytes>>,
        path: &Path,
    ) -> Result<u64, AppError> {
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| AppError::Io(format!("Failed to create file: {}", e)))?;
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            if self.cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            let chunk = chunk.map_err(|e: ApiError| AppError::Api(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| AppError::Io(format!("Write error: {}", e)))?;
            downloaded += chunk.len() as u64;
        }

        file.sync_all()
            .await
            .map_err(|e| AppError::Io(format!("Failed to sync file: {}", e)))?;
        Ok(downloaded)
    }

    /// Missions must end up in the missions folder whatever folder they were fetched into.
    async fn relocate_mission(&self, path: &Path) -> Result<PathBuf, AppError> {
        if path.parent() == Some(self.missions_dir.as_path()) {
            return Ok(path.to_path_buf());
        }

        tokio::fs::create_dir_all(&self.missions_dir).await?;
        let file_name = path
            .file_name()
            .ok_or_else(|| AppError::Io(format!("{} has no file name", path.display())))?;
        let target = self.missions_dir.join(file_name);

        if tokio::fs::rename(path, &target).await.is_err() {
            // Different filesystem: copy then remove.
            tokio::fs::copy(path, &target).await?;
            tokio::fs::remove_file(path).await?;
        }

        info!(from = %path.display(), to = %target.display(), "relocated mission file");
        Ok(target)
    }
}

fn is_config_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(CONFIG_EXTENSION))
        .unwrap_or(false)
}

enum SequenceState {
    Announce {
        coordinator: DownloadCoordinator,
        items: Vec<PendingDownload>,
        index: usize,
    },
    Fetch {
        coordinator: DownloadCoordinator,
        items: Vec<PendingDownload>,
        index: usize,
    },
    Finished,
}
