//! Per-job working storage.
//!
//! Each job owns a directory `<work_dir>/<job_id>/` holding the fetched
//! source and the transformed output. Readers of a finished result take a
//! [`FileLease`]; reclaiming a directory that still has leases only marks it,
//! and the last lease to drop performs the deletion.

mod error;
mod lease;
mod work;

pub use error::StorageError;
pub use lease::FileLease;
pub use work::{JobDir, WorkStorage};

/// Polls until a directory removed in the background is gone.
#[cfg(test)]
pub(crate) async fn wait_removed(path: &std::path::Path) -> bool {
    for _ in 0..200 {
        if !path.exists() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    false
}
