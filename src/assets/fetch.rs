use std::{
    collections::HashMap,
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use anyhow::Context;

use crate::{
    assets::layout::normalize_rel_path,
    foundation::config::{FetchSettings, Settings},
    foundation::error::{MosculpError, MosculpResult},
};

const COPY_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Progress of one download. `elapsed` is measured from the start of that download.
pub struct FetchProgress {
    /// Bytes received so far.
    pub bytes: u64,
    /// Announced size, when the transport knows it.
    pub total: Option<u64>,
    /// Time since the transfer started.
    pub elapsed: Duration,
}

impl FetchProgress {
    /// Completion percentage, when the size is known.
    pub fn percent(&self) -> Option<u64> {
        match self.total {
            Some(0) => Some(100),
            Some(t) => Some((self.bytes.saturating_mul(100) / t).min(100)),
            None => None,
        }
    }

    /// Average transfer rate in KiB/s.
    pub fn kib_per_sec(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0;
        }
        (self.bytes as f64 / 1024.0 / secs) as u64
    }
}

/// Callback receiving the relative asset path and the progress of its download.
pub type ProgressFn = Arc<dyn Fn(&str, &FetchProgress) + Send + Sync>;

#[derive(Debug)]
/// Failure of a single transfer attempt.
pub enum TransportError {
    /// The remote store has no such resource. Never retried.
    NotFound(String),
    /// Network or IO failure; may succeed on retry.
    Transfer(String),
}

/// Byte source mirroring the remote asset layout.
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Human-readable location of `rel` (URL or path), for messages.
    fn locate(&self, rel: &str) -> String;

    /// Stream `rel` into `out`, reporting `(bytes_so_far, total)` as data arrives.
    fn download(
        &self,
        rel: &str,
        out: &mut dyn Write,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<u64, TransportError>;
}

#[derive(Debug)]
/// HTTP(S) transport backed by a `ureq` agent with a global timeout.
pub struct HttpTransport {
    base: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    /// Transport for URLs below `base`.
    pub fn new(base: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        let agent: ureq::Agent = config.into();
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            agent,
        }
    }
}

impl Transport for HttpTransport {
    fn locate(&self, rel: &str) -> String {
        format!("{}/{rel}", self.base)
    }

    fn download(
        &self,
        rel: &str,
        out: &mut dyn Write,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<u64, TransportError> {
        let url = self.locate(rel);
        let mut response = match self.agent.get(&url).call() {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(code)) if code == 404 || code == 410 => {
                return Err(TransportError::NotFound(url));
            }
            Err(e) => return Err(TransportError::Transfer(format!("{url}: {e}"))),
        };

        let total = response
            .headers()
            .get("content-length")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        let mut reader = response.body_mut().as_reader();
        copy_with_progress(&mut reader, out, total, progress)
            .map_err(|e| TransportError::Transfer(format!("{url}: {e}")))
    }
}

#[derive(Debug)]
/// Transport reading from a local directory laid out like the server (offline mirrors, tests).
pub struct DirTransport {
    root: PathBuf,
}

impl DirTransport {
    /// Transport for files below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Transport for DirTransport {
    fn locate(&self, rel: &str) -> String {
        self.root.join(rel).display().to_string()
    }

    fn download(
        &self,
        rel: &str,
        out: &mut dyn Write,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<u64, TransportError> {
        let path = self.root.join(rel);
        let mut file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransportError::NotFound(path.display().to_string()));
            }
            Err(e) => {
                return Err(TransportError::Transfer(format!("{}: {e}", path.display())));
            }
        };
        let total = file.metadata().ok().map(|m| m.len());
        copy_with_progress(&mut file, out, total, progress)
            .map_err(|e| TransportError::Transfer(format!("{}: {e}", path.display())))
    }
}

/// Pick the transport for a configured remote root: `http(s)://` URLs go over HTTP, `file://`
/// URLs and plain paths are read from disk.
pub fn transport_for_root(web_root: &str, timeout: Duration) -> Arc<dyn Transport> {
    if web_root.starts_with("http://") || web_root.starts_with("https://") {
        Arc::new(HttpTransport::new(web_root, timeout))
    } else {
        let dir = web_root.strip_prefix("file://").unwrap_or(web_root);
        Arc::new(DirTransport::new(dir))
    }
}

/// Fetch-or-reuse primitive: makes sure a remote asset exists below the local root.
///
/// A file already present locally is never downloaded again. Concurrent fetches of the same path
/// in this process serialize on a per-path lock; the download is written to a temporary file in
/// the target directory and renamed into place, so other processes never observe partial files.
pub struct AssetFetcher {
    transport: Arc<dyn Transport>,
    local_root: PathBuf,
    policy: FetchSettings,
    progress: Option<ProgressFn>,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    downloads: AtomicU64,
}

impl std::fmt::Debug for AssetFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetFetcher")
            .field("transport", &self.transport)
            .field("local_root", &self.local_root)
            .field("policy", &self.policy)
            .field("downloads", &self.downloads.load(Ordering::Relaxed))
            .finish()
    }
}

impl AssetFetcher {
    /// Fetcher mirroring `transport` into `local_root`.
    pub fn new(
        transport: Arc<dyn Transport>,
        local_root: impl Into<PathBuf>,
        policy: FetchSettings,
    ) -> Self {
        Self {
            transport,
            local_root: local_root.into(),
            policy,
            progress: None,
            locks: Mutex::new(HashMap::new()),
            downloads: AtomicU64::new(0),
        }
    }

    /// Fetcher configured from [`Settings`].
    pub fn from_settings(settings: &Settings) -> Self {
        let transport = transport_for_root(&settings.web_root, settings.fetch.timeout());
        Self::new(transport, settings.local_root.clone(), settings.fetch.clone())
    }

    /// Report download progress to `f`.
    pub fn with_progress(mut self, f: ProgressFn) -> Self {
        self.progress = Some(f);
        self
    }

    /// Local mirror root.
    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    /// Number of completed downloads since construction.
    pub fn downloads(&self) -> u64 {
        self.downloads.load(Ordering::Relaxed)
    }

    /// Local path `rel` is (or will be) mirrored to.
    pub fn local_path(&self, rel: &str) -> MosculpResult<PathBuf> {
        let norm = normalize_rel_path(rel)?;
        Ok(self.local_root.join(norm))
    }

    /// Ensure `rel` exists locally, downloading it if absent, and return its local path.
    pub fn fetch(&self, rel: &str) -> MosculpResult<PathBuf> {
        let rel = normalize_rel_path(rel)?;
        let local = self.local_root.join(&rel);
        if local.is_file() {
            tracing::debug!(path = %local.display(), "already exists, download skipped");
            return Ok(local);
        }

        let lock = self.path_lock(&local);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.fetch_locked(&rel, &local)
        };
        self.release_path_lock(&local, lock);
        result
    }

    /// Fetch `rel` and read its bytes.
    pub fn read(&self, rel: &str) -> MosculpResult<Vec<u8>> {
        let path = self.fetch(rel)?;
        std::fs::read(&path)
            .with_context(|| format!("read asset '{}'", path.display()))
            .map_err(MosculpError::from)
    }

    /// Remove the local copy of `rel` so the next fetch downloads it again.
    ///
    /// Returns whether a file was removed.
    pub fn evict(&self, rel: &str) -> MosculpResult<bool> {
        let local = self.local_path(rel)?;
        match std::fs::remove_file(&local) {
            Ok(()) => {
                tracing::warn!(path = %local.display(), "local asset evicted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("evict asset '{}'", local.display()))
                .into()),
        }
    }

    fn fetch_locked(&self, rel: &str, local: &Path) -> MosculpResult<PathBuf> {
        if local.is_file() {
            tracing::debug!(path = %local.display(), "fetched concurrently, download skipped");
            return Ok(local.to_path_buf());
        }

        let parent = local
            .parent()
            .ok_or_else(|| MosculpError::invalid_request(format!("asset path '{rel}' has no parent")))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create asset dir '{}'", parent.display()))?;

        let mut attempt = 0u32;
        loop {
            match self.download_once(rel, parent, local) {
                Ok(bytes) => {
                    self.downloads.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(path = %local.display(), bytes, "downloaded");
                    return Ok(local.to_path_buf());
                }
                Err(TransportError::NotFound(what)) => {
                    return Err(MosculpError::asset_unavailable(format!("{what} not found")));
                }
                Err(TransportError::Transfer(msg)) if attempt < self.policy.retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %msg, "download failed, retrying");
                    std::thread::sleep(self.policy.backoff(attempt));
                }
                Err(TransportError::Transfer(msg)) => {
                    return Err(MosculpError::asset_unavailable(msg));
                }
            }
        }
    }

    fn download_once(&self, rel: &str, dir: &Path, local: &Path) -> Result<u64, TransportError> {
        let io_err = |e: std::io::Error| TransportError::Transfer(format!("{}: {e}", local.display()));

        let mut tmp = tempfile::Builder::new()
            .prefix(".fetch-")
            .tempfile_in(dir)
            .map_err(io_err)?;

        let start = Instant::now();
        let mut report = |bytes: u64, total: Option<u64>| {
            if let Some(cb) = &self.progress {
                cb(
                    rel,
                    &FetchProgress {
                        bytes,
                        total,
                        elapsed: start.elapsed(),
                    },
                );
            }
        };
        let bytes = self
            .transport
            .download(rel, tmp.as_file_mut(), &mut report)?;

        match tmp.persist(local) {
            Ok(_) => Ok(bytes),
            // Another process renamed the same asset into place first.
            Err(_) if local.is_file() => Ok(bytes),
            Err(e) => Err(io_err(e.error)),
        }
    }

    /// Drop the lock entry of `local` once no other caller holds or waits on it.
    fn release_path_lock(&self, local: &Path, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one in `lock`.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(local);
        }
    }

    fn path_lock(&self, local: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(local.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn copy_with_progress(
    reader: &mut dyn Read,
    out: &mut dyn Write,
    total: Option<u64>,
    progress: &mut dyn FnMut(u64, Option<u64>),
) -> std::io::Result<u64> {
    let mut buf = vec![0u8; COPY_CHUNK_BYTES];
    let mut done = 0u64;
    progress(0, total);
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        out.write_all(&buf[..n])?;
        done += n as u64;
        progress(done, total);
    }
    out.flush()?;
    Ok(done)
}

#[cfg(test)]
#[path = "../../tests/unit/assets/fetch.rs"]
mod tests;
