use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use wview::pdf::{Backend, CacheKey, DocumentId, PageCache, RenderError};
use wview::test_utils::{SyntheticBackend, SyntheticDocument};

/// Many contexts asking for the same page at once share one render
#[test]
fn test_concurrent_callers_share_one_render() {
    let backend = SyntheticBackend::new().with_document(
        "book.pdf",
        SyntheticDocument::uniform(8, 60.0, 90.0).with_delay(Duration::from_millis(30)),
    );
    let log = backend.log();
    let cache = Arc::new(PageCache::new(16, 4));
    let key = CacheKey::new(DocumentId(1), 4);
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let backend = backend.clone();
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                // Each context opens its own source, as prefetch workers do
                let source = backend.open(Path::new("book.pdf")).unwrap();
                barrier.wait();
                cache
                    .fetch_or_render(key, || source.render_page(4, 1.0))
                    .unwrap()
            })
        })
        .collect();

    let images: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(log.renders_of(4), 1);
    assert_eq!(log.overlaps(), 0);
    assert!(images.iter().all(|image| Arc::ptr_eq(image, &images[0])));
    assert_eq!(cache.waiters(&key), 0);
}

#[test]
fn test_concurrent_waiters_see_same_failure() {
    let backend = SyntheticBackend::new().with_document(
        "book.pdf",
        SyntheticDocument::uniform(3, 10.0, 10.0)
            .failing(1)
            .with_delay(Duration::from_millis(100)),
    );
    let log = backend.log();
    let cache = Arc::new(PageCache::new(16, 4));
    let key = CacheKey::new(DocumentId(1), 1);
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let backend = backend.clone();
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let source = backend.open(Path::new("book.pdf")).unwrap();
                barrier.wait();
                cache.fetch_or_render(key, || source.render_page(1, 1.0))
            })
        })
        .collect();

    for handle in handles {
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(RenderError::Backend { page: 1, .. })));
    }
    assert_eq!(log.renders_of(1), 1);
}

#[test]
fn test_invalidated_document_rejects_completion() {
    let cache = PageCache::new(16, 4);
    let key = CacheKey::new(DocumentId(9), 0);

    cache.invalidate(DocumentId(9));
    let result = cache.fetch_or_render(key, || unreachable!("retired documents never render"));

    assert!(matches!(result, Err(RenderError::DocumentClosed { page: 0 })));
    assert!(cache.is_empty());
}
