use super::fetcher::{DiagnosticSink, ImageSource};
use super::{FetchError, ImageProfile, MediaError};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::{
    collections::HashMap,
    io::Cursor,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::time::sleep;

pub(crate) fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([12, 120, 200]));
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .expect("encode fixture");
    buffer
}

#[derive(Clone)]
pub(crate) enum Behavior {
    Image { width: u32, height: u32 },
    Status(u16),
    Body(Vec<u8>),
    Hang,
    Panic,
}

/// In-memory source that records call counts and peak concurrency.
pub(crate) struct MockSource {
    routes: HashMap<String, Behavior>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSource {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            routes: HashMap::new(),
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn route(mut self, url: &str, behavior: Behavior) -> Self {
        self.routes.insert(url.to_string(), behavior);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImageSource for MockSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        sleep(self.delay).await;
        match self.routes.get(url).cloned() {
            Some(Behavior::Image { width, height }) => Ok(png_fixture(width, height)),
            Some(Behavior::Status(code)) => Err(FetchError::Status(code)),
            Some(Behavior::Body(bytes)) => Ok(bytes),
            Some(Behavior::Hang) => std::future::pending().await,
            Some(Behavior::Panic) => panic!("mock source panicked for {url}"),
            None => Err(FetchError::Status(404)),
        }
    }
}

/// Sink that keeps every recorded absence for assertions.
#[derive(Default)]
pub(crate) struct CollectingSink {
    entries: Mutex<Vec<(String, String)>>,
}

impl CollectingSink {
    pub(crate) fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl DiagnosticSink for CollectingSink {
    fn record(&self, _profile: &ImageProfile, reference: Option<&str>, error: &MediaError) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.push((reference.unwrap_or_default().to_string(), error.code().to_string()));
        }
    }
}
