//! Chunked streaming of a finished result to a client.

use futures::stream::{self, BoxStream};
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::storage::FileLease;

/// A byte stream suitable for an HTTP response body.
pub type ServeStream = BoxStream<'static, io::Result<Vec<u8>>>;

/// Opens `path` and streams it in `chunk_size` pieces.
///
/// The lease travels with the stream. It is marked complete when the reader
/// reaches end of file; a stream dropped early releases it untouched.
pub async fn serve(path: &Path, lease: FileLease, chunk_size: usize) -> io::Result<ServeStream> {
    let file = File::open(path).await?;
    let chunk_size = chunk_size.max(1);

    let body = stream::try_unfold(
        (file, Some(lease)),
        move |(mut file, mut lease)| async move {
            let mut buf = vec![0u8; chunk_size];
            let read = file.read(&mut buf).await?;
            if read == 0 {
                if let Some(lease) = lease.take() {
                    lease.complete();
                }
                return Ok::<_, io::Error>(None);
            }
            buf.truncate(read);
            Ok::<_, io::Error>(Some((buf, (file, lease))))
        },
    );
    Ok(Box::pin(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;
    use crate::storage::{wait_removed, WorkStorage};
    use futures::TryStreamExt;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn setup(remove: bool) -> (TempDir, Arc<WorkStorage>, JobId, std::path::PathBuf) {
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(WorkStorage::new(tmp.path(), remove));
        let id = JobId::from("job-1");
        let dir = storage.allocate(&id).await.unwrap();
        let path = dir.output_path("out.pdf");
        tokio::fs::write(&path, vec![7u8; 10]).await.unwrap();
        (tmp, storage, id, path)
    }

    #[tokio::test]
    async fn test_streams_in_chunks() {
        let (_tmp, storage, id, path) = setup(false).await;
        let lease = storage.lease(&id).unwrap();

        let chunks: Vec<Vec<u8>> = serve(&path, lease, 4)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(storage.active_leases(&id), 0);
    }

    #[tokio::test]
    async fn test_full_read_reclaims() {
        let (_tmp, storage, id, path) = setup(true).await;
        let lease = storage.lease(&id).unwrap();

        let body: Vec<Vec<u8>> = serve(&path, lease, 64)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(body.concat().len(), 10);
        assert!(storage.is_reclaimed(&id));
        assert!(wait_removed(&path).await);
    }

    #[tokio::test]
    async fn test_partial_read_keeps_files() {
        let (_tmp, storage, id, path) = setup(true).await;
        let lease = storage.lease(&id).unwrap();

        let mut body = serve(&path, lease, 4).await.unwrap();
        let first = body.try_next().await.unwrap().unwrap();
        assert_eq!(first.len(), 4);
        drop(body);

        assert!(path.exists());
        assert_eq!(storage.active_leases(&id), 0);
    }
}
