use super::{FetchError, FetchResult, ImageFetcher, ImageProfile, MediaError, MediaSlot};
use futures::future::join_all;
use std::time::Instant;
use tracing::{error, info};

/// Fans one fetch task out per reference and gathers the results in input order.
#[derive(Clone)]
pub struct FetchOrchestrator {
    fetcher: ImageFetcher,
}

impl FetchOrchestrator {
    pub fn new(fetcher: ImageFetcher) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &ImageFetcher {
        &self.fetcher
    }

    /// Fetch the image of every item, reading the reference through `image_ref`.
    ///
    /// The output has exactly one slot per item, at the item's index.
    pub async fn fetch_all<T, F>(
        &self,
        items: &[T],
        image_ref: F,
        profile: &ImageProfile,
    ) -> Vec<MediaSlot>
    where
        F: Fn(&T) -> Option<&str>,
    {
        let references = items
            .iter()
            .map(|item| image_ref(item).map(str::to_owned))
            .collect();
        self.fetch_references(references, profile).await
    }

    pub async fn fetch_one(&self, reference: Option<&str>, profile: &ImageProfile) -> MediaSlot {
        let mut slots = self
            .fetch_references(vec![reference.map(str::to_owned)], profile)
            .await;
        slots.pop().unwrap_or_else(|| MediaSlot::absent(None))
    }

    pub async fn fetch_references(
        &self,
        references: Vec<Option<String>>,
        profile: &ImageProfile,
    ) -> Vec<MediaSlot> {
        let started = Instant::now();
        let requested = references.iter().filter(|r| r.is_some()).count();

        let handles: Vec<_> = references
            .iter()
            .map(|reference| {
                let fetcher = self.fetcher.clone();
                let reference = reference.clone();
                let profile = *profile;
                tokio::spawn(async move { fetcher.fetch(reference.as_deref(), &profile).await })
            })
            .collect();

        // join_all yields in spawn order, so index i always belongs to item i.
        let slots: Vec<MediaSlot> = join_all(handles)
            .await
            .into_iter()
            .zip(&references)
            .enumerate()
            .map(|(index, (joined, reference))| match joined {
                Ok(result) => MediaSlot::new(result, profile.cell),
                Err(err) => {
                    error!(
                        target = "quotation.media",
                        profile = profile.name,
                        index,
                        error = %err,
                        "image_task_aborted"
                    );
                    let cause = MediaError::Fetch(FetchError::Transport(format!(
                        "fetch task aborted: {err}"
                    )));
                    self.fetcher.report(profile, reference.as_deref(), &cause);
                    MediaSlot::absent(Some(cause))
                }
            })
            .collect();

        let embedded = slots
            .iter()
            .filter(|slot| matches!(slot.result, FetchResult::Image(_)))
            .count();
        info!(
            target = "quotation.media",
            profile = profile.name,
            total = slots.len(),
            requested,
            embedded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "image_batch_complete"
        );
        slots
    }
}
