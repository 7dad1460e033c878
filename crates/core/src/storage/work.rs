use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::error::StorageError;
use super::lease::FileLease;
use crate::config::StorageConfig;
use crate::job::JobId;

const SOURCE_FILE: &str = "source.pdf";

/// A job's allocated working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDir {
    job_id: JobId,
    path: PathBuf,
}

impl JobDir {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the fetched document is written.
    pub fn source_path(&self) -> PathBuf {
        self.path.join(SOURCE_FILE)
    }

    /// Where the transformed document is written.
    pub fn output_path(&self, filename: &str) -> PathBuf {
        self.path.join(filename)
    }
}

#[derive(Debug, Default)]
struct DirState {
    leases: usize,
    reclaim_pending: bool,
    reclaimed: bool,
}

/// Arena of per-job directories under a common root.
#[derive(Debug)]
pub struct WorkStorage {
    root: PathBuf,
    remove_after_download: bool,
    dirs: Mutex<HashMap<JobId, DirState>>,
}

impl WorkStorage {
    pub fn new(root: impl Into<PathBuf>, remove_after_download: bool) -> Self {
        Self {
            root: root.into(),
            remove_after_download,
            dirs: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.work_dir.clone(), config.remove_after_download)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dirs(&self) -> MutexGuard<'_, HashMap<JobId, DirState>> {
        self.dirs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates the root and removes directories left over from a previous run.
    pub async fn prepare(&self) -> Result<usize, StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(entry.path()).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(root = %self.root.display(), removed, "Removed stale job directories");
        }
        Ok(removed)
    }

    /// Path of a job's directory, whether or not it exists.
    pub fn job_dir(&self, id: &JobId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Creates the directory for a new job.
    pub async fn allocate(&self, id: &JobId) -> Result<JobDir, StorageError> {
        let path = self.job_dir(id);
        tokio::fs::create_dir_all(&path).await?;
        self.dirs().insert(id.clone(), DirState::default());
        debug!(job_id = %id, path = %path.display(), "Allocated job directory");
        Ok(JobDir {
            job_id: id.clone(),
            path,
        })
    }

    /// Takes a read lease on a job's directory.
    pub fn lease(self: &Arc<Self>, id: &JobId) -> Result<FileLease, StorageError> {
        let mut dirs = self.dirs();
        let state = dirs
            .get_mut(id)
            .ok_or_else(|| StorageError::Unknown(id.clone()))?;
        if state.reclaimed || state.reclaim_pending {
            return Err(StorageError::Reclaimed(id.clone()));
        }
        state.leases += 1;
        Ok(FileLease::new(Arc::clone(self), id.clone()))
    }

    /// Deletes a job's directory, or defers the deletion while leases are held.
    ///
    /// Returns `true` once the directory is gone.
    pub async fn reclaim(&self, id: &JobId) -> bool {
        {
            let mut dirs = self.dirs();
            if let Some(state) = dirs.get_mut(id) {
                if state.reclaimed {
                    return true;
                }
                if state.leases > 0 {
                    state.reclaim_pending = true;
                    debug!(job_id = %id, leases = state.leases, "Deferring reclaim");
                    return false;
                }
                state.reclaimed = true;
            }
        }
        remove_dir(id, &self.job_dir(id)).await;
        true
    }

    pub fn is_reclaimed(&self, id: &JobId) -> bool {
        self.dirs().get(id).map_or(true, |s| s.reclaimed)
    }

    pub fn active_leases(&self, id: &JobId) -> usize {
        self.dirs().get(id).map_or(0, |s| s.leases)
    }

    /// Drops the bookkeeping for a reclaimed job.
    pub fn forget(&self, id: &JobId) {
        let mut dirs = self.dirs();
        if dirs.get(id).is_some_and(|s| s.reclaimed) {
            dirs.remove(id);
        }
    }

    pub(super) fn release(&self, id: &JobId, consumed: bool) {
        let remove = {
            let mut dirs = self.dirs();
            let Some(state) = dirs.get_mut(id) else {
                return;
            };
            state.leases = state.leases.saturating_sub(1);
            if consumed && self.remove_after_download {
                state.reclaim_pending = true;
            }
            if state.leases == 0 && state.reclaim_pending && !state.reclaimed {
                state.reclaimed = true;
                true
            } else {
                false
            }
        };
        if !remove {
            return;
        }

        // Called from `Drop`, usually while a response body is polled.
        let id = id.clone();
        let path = self.job_dir(&id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { remove_dir(&id, &path).await });
            }
            Err(_) => log_removal(&id, std::fs::remove_dir_all(&path)),
        }
    }
}

async fn remove_dir(id: &JobId, path: &Path) {
    log_removal(id, tokio::fs::remove_dir_all(path).await);
}

fn log_removal(id: &JobId, result: std::io::Result<()>) {
    match result {
        Ok(()) => debug!(job_id = %id, "Reclaimed job directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(job_id = %id, error = %e, "Failed to remove job directory"),
    }
}
