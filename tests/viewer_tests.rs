use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use wview::pdf::{
    CacheKey, OpenError, PageGeometry, PageStatus, ReadingDirection, RenderError, RenderedBitmap,
    Side, Step, Viewer, ViewerConfig, ViewerError, ViewerObserver,
};
use wview::test_utils::{SyntheticBackend, SyntheticDocument};

#[derive(Clone, Debug, PartialEq)]
enum Event {
    Ready(usize),
    Failed(usize),
    Busy(bool),
    Layout,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Event>>>);

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    fn busy_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == Event::Busy(true))
            .count()
    }

    fn count(&self, event: &Event) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

impl ViewerObserver for Recorder {
    fn page_ready(&self, index: usize, _image: &Arc<RenderedBitmap>) {
        self.0.lock().unwrap().push(Event::Ready(index));
    }

    fn page_failed(&self, index: usize, _error: &RenderError) {
        self.0.lock().unwrap().push(Event::Failed(index));
    }

    fn busy(&self, busy: bool) {
        self.0.lock().unwrap().push(Event::Busy(busy));
    }

    fn layout_changed(&self) {
        self.0.lock().unwrap().push(Event::Layout);
    }
}

fn config(window: usize) -> ViewerConfig {
    ViewerConfig {
        render_scale: 1.0,
        prefetch_window: window,
        ..ViewerConfig::default()
    }
}

fn ten_pages() -> SyntheticDocument {
    SyntheticDocument::with_sizes(
        (0..10)
            .map(|i| PageGeometry::new(100.0 + i as f32, 150.0))
            .collect(),
    )
}

fn viewer(backend: &SyntheticBackend, window: usize) -> (Viewer, Recorder) {
    let recorder = Recorder::default();
    let viewer = Viewer::with_backend(Arc::new(backend.clone()), config(window))
        .with_observer(Box::new(recorder.clone()));
    (viewer, recorder)
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn test_no_document_has_no_pages() {
    let backend = SyntheticBackend::new();
    let (mut viewer, _) = viewer(&backend, 2);

    assert_eq!(viewer.page_count(), 0);
    assert!(viewer.document().is_none());
    assert!(matches!(
        viewer.request_page(0),
        Err(ViewerError::IndexOutOfRange {
            index: 0,
            page_count: 0
        })
    ));
}

#[test]
fn test_request_page_is_idempotent() {
    let backend = SyntheticBackend::new().with_document("ten.pdf", ten_pages());
    let log = backend.log();
    let (mut viewer, _) = viewer(&backend, 1);
    viewer.open_document("ten.pdf").unwrap();

    let first = viewer.request_page(3).unwrap();
    let second = viewer.request_page(3).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.page, 3);
    assert_eq!(log.renders_of(3), 1);
}

#[test]
fn test_prefetched_page_survives_jump_to_failing_page() {
    let backend = SyntheticBackend::new()
        .with_document("long.pdf", SyntheticDocument::uniform(60, 10.0, 10.0).failing(50));
    let log = backend.log();
    let config = ViewerConfig {
        render_scale: 1.0,
        prefetch_window: 1,
        cache_capacity: 4,
        eviction_window: 1,
        workers: 1,
        ..ViewerConfig::default()
    };
    let mut viewer = Viewer::with_backend(Arc::new(backend.clone()), config);
    viewer.open_document("long.pdf").unwrap();

    for index in 0..=5 {
        viewer.request_page(index).unwrap();
    }
    assert!(viewer.request_page(50).is_err());

    // The lookahead queued from page 50 is kept even though 50 failed
    assert!(wait_for(|| viewer.page_status(51) == PageStatus::Ready));
    viewer.request_page(51).unwrap();

    assert_eq!(log.renders_of(51), 1);
}

#[test]
fn test_page_size_past_end_is_out_of_range() {
    let backend = SyntheticBackend::new().with_document("ten.pdf", ten_pages());
    let (mut viewer, _) = viewer(&backend, 2);
    viewer.open_document("ten.pdf").unwrap();

    assert_eq!(viewer.page_size(9).unwrap(), PageGeometry::new(109.0, 150.0));
    assert!(matches!(
        viewer.page_size(10),
        Err(ViewerError::IndexOutOfRange {
            index: 10,
            page_count: 10
        })
    ));
    assert!(matches!(
        viewer.request_page(10),
        Err(ViewerError::IndexOutOfRange { index: 10, .. })
    ));
}

/// Page 0 is rendered in the foreground; 1, 2 and 3 come from prefetch
#[test]
fn test_forward_navigation_is_served_from_prefetch() {
    let backend = SyntheticBackend::new()
        .with_document("ten.pdf", ten_pages().with_delay(Duration::from_millis(5)));
    let log = backend.log();
    let (mut viewer, recorder) = viewer(&backend, 3);
    viewer.open_document("ten.pdf").unwrap();

    viewer.request_page(0).unwrap();
    assert_eq!(recorder.busy_count(), 1);
    assert!(wait_for(|| (1..=3).all(|i| viewer.page_status(i) == PageStatus::Ready)));

    for index in 1..=3 {
        let image = viewer.request_page(index).unwrap();
        assert_eq!(image.page, index);
    }

    assert_eq!(recorder.busy_count(), 1);
    for page in 0..=3 {
        assert_eq!(log.renders_of(page), 1, "page {page} rendered more than once");
    }
    assert_eq!(recorder.count(&Event::Ready(3)), 1);
}

#[test]
fn test_foreground_waits_for_inflight_prefetch() {
    let backend = SyntheticBackend::new()
        .with_document("ten.pdf", ten_pages().with_delay(Duration::from_millis(60)));
    let log = backend.log();
    let (mut viewer, _) = viewer(&backend, 2);
    viewer.open_document("ten.pdf").unwrap();

    viewer.request_page(0).unwrap();
    // Page 1 is being prefetched; asking for it must not start a second render
    let image = viewer.request_page(1).unwrap();

    assert_eq!(image.page, 1);
    assert_eq!(log.renders_of(1), 1);
    assert_eq!(log.overlaps(), 0);
}

#[test]
fn test_backward_navigation_prefetches_previous_pages() {
    let backend = SyntheticBackend::new().with_document("ten.pdf", ten_pages());
    let (mut viewer, _) = viewer(&backend, 2);
    viewer.open_document("ten.pdf").unwrap();

    viewer.request_page(9).unwrap();
    viewer.request_page(8).unwrap();

    assert!(wait_for(|| {
        viewer.page_status(7) == PageStatus::Ready && viewer.page_status(6) == PageStatus::Ready
    }));
}

#[test]
fn test_close_and_reopen_never_serves_old_pages() {
    let backend = SyntheticBackend::new()
        .with_document("a.pdf", SyntheticDocument::uniform(4, 100.0, 100.0))
        .with_document("b.pdf", SyntheticDocument::uniform(4, 50.0, 80.0));
    let (mut viewer, _) = viewer(&backend, 2);

    let a = viewer.open_document("a.pdf").unwrap();
    viewer.request_page(0).unwrap();

    let b = viewer.open_document("b.pdf").unwrap();
    assert_ne!(a.id, b.id);
    assert!(viewer.cache().get(&CacheKey::new(a.id, 0)).is_none());

    let image = viewer.request_page(0).unwrap();
    assert_eq!((image.width_px, image.height_px), (50, 80));

    assert_eq!(viewer.close_document(), Some(b));
    assert_eq!(viewer.page_count(), 0);
    assert!(viewer.cache().is_empty());
}

#[test]
fn test_late_prefetch_results_are_discarded_after_close() {
    let backend = SyntheticBackend::new()
        .with_document("slow.pdf", ten_pages().with_delay(Duration::from_millis(40)));
    let log = backend.log();
    let (mut viewer, _) = viewer(&backend, 3);
    viewer.open_document("slow.pdf").unwrap();

    viewer.request_page(0).unwrap();
    assert!(wait_for(|| log.render_count() > 1));
    viewer.close_document();

    thread::sleep(Duration::from_millis(150));
    assert!(viewer.cache().is_empty());
}

#[test]
fn test_reopening_same_path_mints_new_identity() {
    let backend = SyntheticBackend::new().with_document("ten.pdf", ten_pages());
    let (mut viewer, _) = viewer(&backend, 1);

    let first = viewer.open_document("ten.pdf").unwrap();
    viewer.request_page(2).unwrap();
    let second = viewer.open_document("ten.pdf").unwrap();

    assert_ne!(first.id, second.id);
    assert!(matches!(
        viewer.page_count_for(&first),
        Err(ViewerError::InvalidHandle(id)) if id == first.id
    ));
    assert_eq!(viewer.page_count_for(&second).unwrap(), 10);
    assert_eq!(viewer.page_status(2), PageStatus::Absent);
}

#[test]
fn test_failed_open_keeps_current_document() {
    let backend = SyntheticBackend::new().with_document("ten.pdf", ten_pages());
    let (mut viewer, _) = viewer(&backend, 2);
    let handle = viewer.open_document("ten.pdf").unwrap();

    let err = viewer.open_document("missing.pdf").unwrap_err();
    assert!(matches!(err, ViewerError::Open(OpenError::NotFound(_))));
    assert_eq!(viewer.document(), Some(&handle));
    assert!(viewer.request_page(1).is_ok());
}

#[test]
fn test_render_failure_keeps_document_open() {
    let backend = SyntheticBackend::new().with_document("ten.pdf", ten_pages().failing(2));
    let (mut viewer, recorder) = viewer(&backend, 1);
    viewer.open_document("ten.pdf").unwrap();

    let err = viewer.request_page(2).unwrap_err();
    assert!(matches!(
        err,
        ViewerError::Render(RenderError::Backend { page: 2, .. })
    ));
    assert_eq!(recorder.count(&Event::Failed(2)), 1);

    assert!(viewer.document().is_some());
    assert_eq!(viewer.request_page(3).unwrap().page, 3);
}

#[test]
fn test_cover_offset_round_trip() {
    let backend = SyntheticBackend::new().with_document("ten.pdf", ten_pages());
    let log = backend.log();
    let (mut viewer, recorder) = viewer(&backend, 1);
    viewer.open_document("ten.pdf").unwrap();

    let plain: Vec<_> = (0..10).map(|i| viewer.page_size(i).unwrap()).collect();

    viewer.set_cover_offset(true);
    assert_eq!(viewer.page_count(), 9);
    assert_eq!(viewer.page_size(0).unwrap(), plain[1]);
    assert_eq!(viewer.request_page(0).unwrap().page, 1);

    viewer.toggle_cover_offset();
    let restored: Vec<_> = (0..10).map(|i| viewer.page_size(i).unwrap()).collect();
    assert_eq!(restored, plain);
    assert_eq!(recorder.count(&Event::Layout), 3);

    // Backend page 1 stays cached across the toggle
    assert_eq!(viewer.request_page(1).unwrap().page, 1);
    assert_eq!(log.renders_of(1), 1);
}

#[test]
fn test_aspect_ratio_scales_widths() {
    let backend = SyntheticBackend::new().with_document("ten.pdf", ten_pages());
    let (mut viewer, _) = viewer(&backend, 1);
    viewer.open_document("ten.pdf").unwrap();

    viewer.set_aspect_ratio(0.5);
    assert_eq!(viewer.page_size(0).unwrap(), PageGeometry::new(50.0, 150.0));

    viewer.set_aspect_ratio(f32::NAN);
    assert_eq!(viewer.parameters().aspect_ratio, 1.0);
    assert_eq!(viewer.page_size(0).unwrap(), PageGeometry::new(100.0, 150.0));
}

#[test]
fn test_turn_follows_reading_direction() {
    let backend = SyntheticBackend::new().with_document("ten.pdf", ten_pages());
    let (mut viewer, _) = viewer(&backend, 1);
    viewer.open_document("ten.pdf").unwrap();
    viewer.request_page(3).unwrap();

    assert_eq!(viewer.turn(Side::Right).unwrap().page, 4);
    assert_eq!(viewer.turn(Side::Left).unwrap().page, 3);

    viewer.set_reading_direction(ReadingDirection::RightToLeft);
    assert_eq!(viewer.turn(Side::Left).unwrap().page, 4);
    assert_eq!(viewer.turn(Side::Right).unwrap().page, 3);

    viewer.toggle_reading_direction();
    assert_eq!(viewer.parameters().reading_direction, ReadingDirection::LeftToRight);
}

#[test]
fn test_advance_stops_at_document_ends() {
    let backend = SyntheticBackend::new()
        .with_document("three.pdf", SyntheticDocument::uniform(3, 10.0, 10.0));
    let (mut viewer, _) = viewer(&backend, 1);
    viewer.open_document("three.pdf").unwrap();

    assert_eq!(viewer.advance(Step::Previous).unwrap().page, 0);
    assert_eq!(viewer.advance(Step::Next).unwrap().page, 1);
    assert_eq!(viewer.advance(Step::Next).unwrap().page, 2);
    assert_eq!(viewer.advance(Step::Next).unwrap().page, 2);
    assert_eq!(viewer.current_page(), 2);
}

#[test]
fn test_reload_keeps_position_under_new_identity() {
    let backend = SyntheticBackend::new().with_document("ten.pdf", ten_pages());
    let (mut viewer, _) = viewer(&backend, 1);
    let first = viewer.open_document("ten.pdf").unwrap();
    viewer.request_page(5).unwrap();

    let reloaded = viewer.reload().unwrap().unwrap();

    assert_ne!(reloaded.id, first.id);
    assert_eq!(viewer.current_page(), 5);
    assert_eq!(viewer.page_status(5), PageStatus::Absent);
    assert_eq!(viewer.advance(Step::Next).unwrap().page, 6);
}

#[test]
fn test_reload_without_document_is_noop() {
    let backend = SyntheticBackend::new();
    let (mut viewer, _) = viewer(&backend, 1);

    assert!(viewer.reload().unwrap().is_none());
}
