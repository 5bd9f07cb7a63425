use super::{FetchError, FetchResult, ImageProfile, MediaError, ProcessedImage, transform};
use async_trait::async_trait;
use reqwest::{Client, Url, header::USER_AGENT};
use std::{sync::Arc, time::Duration};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, warn};

// Some image hosts reject requests without a browser-looking agent.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Where raw image bytes come from.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Receives the cause of every image that ends up absent.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, profile: &ImageProfile, reference: Option<&str>, error: &MediaError);
}

/// Default sink: one structured warning per absent image.
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, profile: &ImageProfile, reference: Option<&str>, error: &MediaError) {
        warn!(
            target = "quotation.media",
            profile = profile.name,
            reference = reference.unwrap_or_default(),
            cause = error.code(),
            error = %error,
            "image_absent"
        );
        crate::metrics::image_absent(profile.name, error.code());
    }
}

/// Counting gate for in-flight network fetches.
#[derive(Debug, Clone)]
pub struct FetchPermits {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl FetchPermits {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>, FetchError> {
        self.semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::PoolClosed)
    }
}

/// `reqwest`-backed source with a per-request timeout and a body size cap.
#[derive(Debug, Clone)]
pub struct HttpImageSource {
    http: Client,
    timeout: Duration,
    max_bytes: usize,
}

impl HttpImageSource {
    pub fn new(http: Client, timeout: Duration, max_bytes: usize) -> Self {
        Self {
            http,
            timeout,
            max_bytes,
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut response = self
            .http
            .get(url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        let limit = self.max_bytes;
        if response
            .content_length()
            .is_some_and(|length| length > limit as u64)
        {
            return Err(FetchError::TooLarge { limit });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| self.transport_error(err))?
        {
            if body.len() + chunk.len() > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

/// Fetches one image reference under the shared permit pool.
///
/// Every failure collapses into [`FetchResult::Absent`]; the cause goes to the
/// diagnostic sink and never propagates to the caller.
#[derive(Clone)]
pub struct ImageFetcher {
    source: Arc<dyn ImageSource>,
    permits: FetchPermits,
    timeout: Duration,
    sink: Arc<dyn DiagnosticSink>,
}

impl ImageFetcher {
    pub fn new(source: Arc<dyn ImageSource>, permits: FetchPermits, timeout: Duration) -> Self {
        Self {
            source,
            permits,
            timeout,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn permits(&self) -> &FetchPermits {
        &self.permits
    }

    pub async fn fetch(&self, reference: Option<&str>, profile: &ImageProfile) -> FetchResult {
        match self.try_fetch(reference, profile).await {
            Ok(Some(image)) => {
                crate::metrics::image_embedded(profile.name);
                FetchResult::Image(image)
            }
            Ok(None) => FetchResult::Absent(None),
            Err(err) => {
                self.report(profile, reference, &err);
                FetchResult::Absent(Some(err))
            }
        }
    }

    /// Hand an absence cause to the diagnostic sink.
    pub fn report(&self, profile: &ImageProfile, reference: Option<&str>, error: &MediaError) {
        self.sink.record(profile, reference, error);
    }

    async fn try_fetch(
        &self,
        reference: Option<&str>,
        profile: &ImageProfile,
    ) -> Result<Option<ProcessedImage>, MediaError> {
        let Some(raw) = reference.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Ok(None);
        };
        let url = parse_http_reference(raw)?;
        let bytes = self.download(url.as_str()).await?;
        debug!(
            target = "quotation.media",
            url = %url,
            bytes = bytes.len(),
            "image_downloaded"
        );

        let profile = *profile;
        tokio::task::spawn_blocking(move || transform::fit_to_box(&bytes, &profile))
            .await
            .map_err(|err| MediaError::Encode(format!("resize worker failed: {err}")))?
            .map(Some)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        // The permit covers the network call only; resizing runs outside it.
        let _permit = self.permits.acquire().await?;
        match tokio::time::timeout(self.timeout, self.source.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        }
    }
}

/// Accepts only absolute `http`/`https` URLs with a host.
pub fn parse_http_reference(raw: &str) -> Result<Url, MediaError> {
    let invalid = || MediaError::InvalidReference(raw.to_string());
    let url = Url::parse(raw).map_err(|_| invalid())?;
    let scheme_ok = matches!(url.scheme(), "http" | "https");
    if !scheme_ok || url.host_str().is_none_or(str::is_empty) {
        return Err(invalid());
    }
    Ok(url)
}
