use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::sync::Arc;

use tracing::debug;

use crate::*;

const READ_CHUNK: usize = 64 * 1024;

/// A loader which is backed by a given root directory, reading each file on its own background thread.
///
/// This handles the rather tricky path cases around Windows and Linux differences, and makes it so that you can and
/// should use keys like `b/c` (behavior with `\` is undefined).  Additionally, it refuses relative paths which escape
/// the root directory, primarily as a measure to detect bugs.
#[derive(Debug)]
pub struct FilesystemLoader {
    root_path: PathBuf,
}

impl FilesystemLoader {
    pub fn new(root_path: &Path) -> FilesystemLoader {
        FilesystemLoader {
            root_path: root_path.to_path_buf(),
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Map a key to a path under the root, so that this can be reused for normal file access at the same time.
    pub fn resolve(&self, key: &str) -> Result<PathBuf, LoadError> {
        let unsupported = |reason: &str| LoadError::Unsupported {
            path: key.to_string(),
            reason: reason.to_string(),
        };

        // On Windows, canonicalize is currently very broken when relative path segments appear in the middle of a
        // path, and stdlib doesn't help us out. Go via `RelativePathBuf` to clean it up.
        let relative = relative_path::RelativePathBuf::from_path(key).map_err(|_| unsupported("invalid path"))?;
        let absolute = relative.to_logical_path(&self.root_path);
        if !absolute.starts_with(&self.root_path) {
            return Err(unsupported("path is outside the loader root directory"));
        }
        Ok(absolute)
    }
}

struct FileLoad {
    progress: Arc<AtomicU64>,
    cancelled: Arc<AtomicBool>,
    result: Receiver<std::io::Result<Vec<u8>>>,
}

fn read_file(path: &Path, progress: &AtomicU64, cancelled: &AtomicBool) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut out = match file.metadata() {
        Ok(m) => Vec::with_capacity(m.len() as usize),
        Err(_) => vec![],
    };
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        if cancelled.load(Ordering::Relaxed) {
            return Err(std::io::Error::new(ErrorKind::Interrupted, "load abandoned"));
        }
        let got = match file.read(&mut chunk) {
            Ok(0) => return Ok(out),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        out.extend_from_slice(&chunk[..got]);
        progress.fetch_add(got as u64, Ordering::Relaxed);
    }
}

impl Loader for FilesystemLoader {
    fn start(&self, request: &LoadRequest<'_>) -> Result<Box<dyn LoadHandle>, LoadError> {
        let path = self.resolve(request.path)?;
        let progress = Arc::new(AtomicU64::new(0));
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = channel();

        let thread_progress = progress.clone();
        let thread_cancelled = cancelled.clone();
        std::thread::Builder::new()
            .name(format!("asset-load:{}", request.path))
            .spawn(move || {
                let res = read_file(&path, &thread_progress, &thread_cancelled);
                // The receiver is gone if the load was abandoned.
                let _ = tx.send(res);
            })?;
        debug!(path = %request.path, "file read started");

        Ok(Box::new(FileLoad {
            progress,
            cancelled,
            result: rx,
        }))
    }
}

impl LoadHandle for FileLoad {
    fn poll(&mut self) -> LoadPoll {
        match self.result.try_recv() {
            Ok(Ok(bytes)) => LoadPoll::Fetched(bytes),
            Ok(Err(e)) => LoadPoll::Failed(e.into()),
            Err(TryRecvError::Empty) => LoadPoll::Pending {
                progress: self.progress.load(Ordering::Relaxed),
            },
            Err(TryRecvError::Disconnected) => {
                LoadPoll::Failed(LoadError::Transport("reader thread exited without a result".into()))
            }
        }
    }
}

impl Drop for FileLoad {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}
