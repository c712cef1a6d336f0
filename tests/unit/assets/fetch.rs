use std::sync::atomic::AtomicU32;

use super::*;

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "mosculp_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn quick_policy(retries: u32) -> FetchSettings {
    FetchSettings {
        timeout_secs: 1,
        retries,
        retry_backoff_ms: 0,
    }
}

fn remote_with(name: &str, rel: &str, bytes: &[u8]) -> PathBuf {
    let remote = temp_dir(name);
    let path = remote.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, bytes).unwrap();
    remote
}

#[derive(Debug)]
struct FlakyTransport {
    failures_left: AtomicU32,
    calls: AtomicU32,
    missing: bool,
}

impl Transport for FlakyTransport {
    fn locate(&self, rel: &str) -> String {
        format!("flaky://{rel}")
    }

    fn download(
        &self,
        rel: &str,
        out: &mut dyn Write,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<u64, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.missing {
            return Err(TransportError::NotFound(self.locate(rel)));
        }
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TransportError::Transfer("connection reset".to_string()));
        }
        out.write_all(b"payload").unwrap();
        progress(7, Some(7));
        Ok(7)
    }
}

#[test]
fn fetch_downloads_once_then_reuses() {
    let remote = remote_with("fetch_once_remote", "clip/frames_for-ui-resp/1.jpg", b"jpeg");
    let local = temp_dir("fetch_once_local");
    let fetcher = AssetFetcher::new(
        Arc::new(DirTransport::new(&remote)),
        &local,
        quick_policy(0),
    );

    let a = fetcher.fetch("clip/frames_for-ui-resp/1.jpg").unwrap();
    let b = fetcher.fetch("clip/frames_for-ui-resp/1.jpg").unwrap();
    assert_eq!(a, b);
    assert_eq!(a, local.join("clip/frames_for-ui-resp/1.jpg"));
    assert_eq!(std::fs::read(&a).unwrap(), b"jpeg");
    assert_eq!(fetcher.downloads(), 1);
    assert!(fetcher.locks.lock().unwrap().is_empty());

    std::fs::remove_dir_all(&remote).ok();
    std::fs::remove_dir_all(&local).ok();
}

#[test]
fn missing_remote_is_asset_unavailable_and_leaves_nothing() {
    let remote = temp_dir("fetch_missing_remote");
    std::fs::create_dir_all(&remote).unwrap();
    let local = temp_dir("fetch_missing_local");
    let fetcher = AssetFetcher::new(
        Arc::new(DirTransport::new(&remote)),
        &local,
        quick_policy(3),
    );

    let err = fetcher.fetch("clip/obj/sculpture.obj").unwrap_err();
    assert!(err.is_asset_unavailable());
    assert!(!local.join("clip/obj/sculpture.obj").exists());
    let leftovers = std::fs::read_dir(local.join("clip/obj")).unwrap().count();
    assert_eq!(leftovers, 0);

    std::fs::remove_dir_all(&remote).ok();
    std::fs::remove_dir_all(&local).ok();
}

#[test]
fn transfer_failures_are_retried_within_policy() {
    let local = temp_dir("fetch_retry_local");
    let transport = Arc::new(FlakyTransport {
        failures_left: AtomicU32::new(2),
        calls: AtomicU32::new(0),
        missing: false,
    });
    let fetcher = AssetFetcher::new(transport.clone(), &local, quick_policy(2));

    let path = fetcher.fetch("a/b.bin").unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"payload");
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);

    std::fs::remove_dir_all(&local).ok();
}

#[test]
fn retries_are_bounded() {
    let local = temp_dir("fetch_retry_bounded_local");
    let transport = Arc::new(FlakyTransport {
        failures_left: AtomicU32::new(10),
        calls: AtomicU32::new(0),
        missing: false,
    });
    let fetcher = AssetFetcher::new(transport.clone(), &local, quick_policy(1));

    let err = fetcher.fetch("a/b.bin").unwrap_err();
    assert!(err.is_asset_unavailable());
    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);

    std::fs::remove_dir_all(&local).ok();
}

#[test]
fn not_found_is_never_retried() {
    let local = temp_dir("fetch_not_found_local");
    let transport = Arc::new(FlakyTransport {
        failures_left: AtomicU32::new(0),
        calls: AtomicU32::new(0),
        missing: true,
    });
    let fetcher = AssetFetcher::new(transport.clone(), &local, quick_policy(5));

    assert!(fetcher.fetch("a/b.bin").unwrap_err().is_asset_unavailable());
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

    std::fs::remove_dir_all(&local).ok();
}

#[test]
fn concurrent_fetches_of_one_path_download_once() {
    let remote = remote_with("fetch_dedup_remote", "c/x.jpg", &[7u8; 300_000]);
    let local = temp_dir("fetch_dedup_local");
    let fetcher = Arc::new(AssetFetcher::new(
        Arc::new(DirTransport::new(&remote)),
        &local,
        quick_policy(0),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let f = fetcher.clone();
            std::thread::spawn(move || f.fetch("c/x.jpg").unwrap())
        })
        .collect();
    for h in handles {
        let path = h.join().unwrap();
        assert_eq!(std::fs::metadata(path).unwrap().len(), 300_000);
    }
    assert_eq!(fetcher.downloads(), 1);

    std::fs::remove_dir_all(&remote).ok();
    std::fs::remove_dir_all(&local).ok();
}

#[test]
fn progress_reports_start_and_completion() {
    let remote = remote_with("fetch_progress_remote", "c/p.bin", &[1u8; 1000]);
    let local = temp_dir("fetch_progress_local");
    let seen = Arc::new(Mutex::new(Vec::<FetchProgress>::new()));
    let sink = seen.clone();
    let fetcher = AssetFetcher::new(
        Arc::new(DirTransport::new(&remote)),
        &local,
        quick_policy(0),
    )
    .with_progress(Arc::new(move |rel: &str, p: &FetchProgress| {
        assert_eq!(rel, "c/p.bin");
        sink.lock().unwrap().push(*p);
    }));

    fetcher.fetch("c/p.bin").unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(seen.first().unwrap().bytes, 0);
    let last = seen.last().unwrap();
    assert_eq!(last.bytes, 1000);
    assert_eq!(last.total, Some(1000));
    assert_eq!(last.percent(), Some(100));

    std::fs::remove_dir_all(&remote).ok();
    std::fs::remove_dir_all(&local).ok();
}

#[test]
fn traversal_paths_are_rejected() {
    let fetcher = AssetFetcher::new(
        Arc::new(DirTransport::new("/nonexistent")),
        "/tmp/unused",
        quick_policy(0),
    );
    assert!(matches!(
        fetcher.fetch("../etc/passwd"),
        Err(MosculpError::InvalidRequest(_))
    ));
}

#[test]
fn roots_pick_transport_by_scheme() {
    let http = transport_for_root("http://example.com/data/", Duration::from_secs(1));
    assert_eq!(http.locate("a/b.jpg"), "http://example.com/data/a/b.jpg");

    let file = transport_for_root("file:///srv/data", Duration::from_secs(1));
    assert_eq!(
        file.locate("a/b.jpg"),
        Path::new("/srv/data").join("a/b.jpg").display().to_string()
    );
}

#[test]
fn progress_rates() {
    let p = FetchProgress {
        bytes: 2048,
        total: None,
        elapsed: Duration::from_secs(1),
    };
    assert_eq!(p.percent(), None);
    assert_eq!(p.kib_per_sec(), 2);
}

#[test]
fn path_locks_are_released_after_each_fetch() {
    let remote = remote_with("fetch_locks_remote", "c/1.jpg", b"one");
    std::fs::write(remote.join("c/2.jpg"), b"two").unwrap();
    let local = temp_dir("fetch_locks_local");
    let fetcher = AssetFetcher::new(Arc::new(DirTransport::new(&remote)), &local, quick_policy(0));

    fetcher.fetch("c/1.jpg").unwrap();
    fetcher.fetch("c/2.jpg").unwrap();
    assert!(fetcher.fetch("c/3.jpg").unwrap_err().is_asset_unavailable());
    assert!(fetcher.locks.lock().unwrap().is_empty());

    std::fs::remove_dir_all(&remote).ok();
    std::fs::remove_dir_all(&local).ok();
}

#[test]
fn evicted_assets_are_downloaded_again() {
    let remote = remote_with("fetch_evict_remote", "c/e.jpg", b"fresh");
    let local = temp_dir("fetch_evict_local");
    let fetcher = AssetFetcher::new(Arc::new(DirTransport::new(&remote)), &local, quick_policy(0));

    let path = fetcher.fetch("c/e.jpg").unwrap();
    std::fs::write(&path, b"stale").unwrap();
    assert!(fetcher.evict("c/e.jpg").unwrap());
    assert!(!path.exists());
    assert!(!fetcher.evict("c/e.jpg").unwrap());

    assert_eq!(fetcher.read("c/e.jpg").unwrap(), b"fresh");
    assert_eq!(fetcher.downloads(), 2);
    assert!(fetcher.evict("../outside").is_err());

    std::fs::remove_dir_all(&remote).ok();
    std::fs::remove_dir_all(&local).ok();
}
