// Remote results persisted to a cache directory outlive the service.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use lumenfe::ai::transport::{InputPart, NormalizedResponse, RemoteRequest, Transport, TransportError};
use lumenfe::ai::{RemoteEditService, ResultSource};
use lumenfe::cache::{CachePolicy, CacheStore};

struct Counting(AtomicUsize);

#[async_trait]
impl Transport for Counting {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn send(&self, _request: &RemoteRequest) -> Result<NormalizedResponse, TransportError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(NormalizedResponse::image("image/png", vec![0x89, b'P', b'N', b'G']))
    }
}

fn request(text: &str) -> RemoteRequest {
    RemoteRequest::new("m", vec![InputPart::text(text)])
}

#[tokio::test]
async fn second_session_reads_first_sessions_result() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(Counting(AtomicUsize::new(0)));

    let first = {
        let cache = Arc::new(CacheStore::open(dir.path(), CachePolicy::default()).unwrap());
        let service = RemoteEditService::new(transport.clone(), Some(cache), Default::default());
        service.invoke(request("x")).await.unwrap()
    };
    assert_eq!(first.source, ResultSource::Remote);

    let cache = Arc::new(CacheStore::open(dir.path(), CachePolicy::default()).unwrap());
    assert_eq!(cache.len(), 1);
    let service = RemoteEditService::new(transport.clone(), Some(cache), Default::default());
    let second = service.invoke(request("x")).await.unwrap();

    assert_eq!(second.source, ResultSource::Cache);
    assert_eq!(second.artifact.bytes(), first.artifact.bytes());
    assert_eq!(second.artifact.mime_type(), "image/png");
    assert_eq!(transport.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn capacity_evicts_least_recently_used_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(Counting(AtomicUsize::new(0)));
    let policy = CachePolicy {
        max_entries: 2,
        ttl: None,
    };
    let cache = Arc::new(CacheStore::open(dir.path(), policy).unwrap());
    let service = RemoteEditService::new(transport.clone(), Some(cache.clone()), Default::default());

    let a = service.invoke(request("a")).await.unwrap();
    service.invoke(request("b")).await.unwrap();
    // Touch `a` so `b` is the oldest
    assert_eq!(service.invoke(request("a")).await.unwrap().source, ResultSource::Cache);
    let c = service.invoke(request("c")).await.unwrap();

    assert_eq!(cache.len(), 2);
    assert!(cache.contains(&a.fingerprint));
    assert!(cache.contains(&c.fingerprint));
    assert_eq!(service.invoke(request("b")).await.unwrap().source, ResultSource::Remote);
    assert_eq!(transport.0.load(Ordering::SeqCst), 4);

    let files = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(files, 2);
}
