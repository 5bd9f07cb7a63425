use crate::config::ExportConfig;
use crate::document::{self, QuotationDocument};
use crate::http::build_client;
use crate::media::{
    FetchOrchestrator, FetchPermits, HttpImageSource, ImageFetcher, LOGO_PROFILE, MediaSlot,
    PRODUCT_PROFILE,
};
use crate::models::{CatalogRecord, QuotationRequest, StageReport};
use serde_json::{Value, json};
use std::{future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct ExportPipeline {
    pub config: Arc<ExportConfig>,
    orchestrator: FetchOrchestrator,
}

/// A finished workbook plus the transcript of how it was produced.
#[derive(Debug)]
pub struct ExportArtifact {
    pub export_id: Uuid,
    pub bytes: Vec<u8>,
    pub stages: Vec<StageReport>,
    pub requested_images: usize,
    pub embedded_images: usize,
}

impl ExportPipeline {
    pub fn new(config: ExportConfig, orchestrator: FetchOrchestrator) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator,
        }
    }

    /// Wire the network-backed pipeline. Only client construction can fail here.
    pub fn from_config(config: ExportConfig) -> Result<Self, PipelineError> {
        let http = build_client(&config)
            .map_err(|err| PipelineError::internal("http_client", err.to_string()))?;
        let source = HttpImageSource::new(http, config.fetch_timeout, config.max_image_bytes);
        let fetcher = ImageFetcher::new(
            Arc::new(source),
            FetchPermits::new(config.fetch_concurrency),
            config.fetch_timeout,
        );
        Ok(Self::new(config, FetchOrchestrator::new(fetcher)))
    }

    pub fn orchestrator(&self) -> &FetchOrchestrator {
        &self.orchestrator
    }

    pub async fn run<T>(&self, request: QuotationRequest<T>) -> Result<ExportArtifact, PipelineError>
    where
        T: CatalogRecord + Send + Sync + 'static,
    {
        let export_id = Uuid::new_v4();
        let mut stages = Vec::new();

        let logo_ref = request
            .logo_url
            .clone()
            .or_else(|| self.config.logo_url.clone());
        let logo = self
            .capture_stage("fetch_logo", &mut stages, async {
                let slot = self
                    .orchestrator
                    .fetch_one(logo_ref.as_deref(), &LOGO_PROFILE)
                    .await;
                let output = json!({
                    "requested": logo_ref.is_some(),
                    "embedded": slot.result.is_image(),
                    "cause": slot.result.cause().map(|c| c.code()),
                });
                Ok(StageOutcome::new(slot, output))
            })
            .await?;

        let images = self
            .capture_stage("fetch_images", &mut stages, async {
                let slots = self
                    .orchestrator
                    .fetch_all(&request.items, T::image_ref, &PRODUCT_PROFILE)
                    .await;
                let output = coverage_summary(&request.items, &slots);
                Ok(StageOutcome::new(slots, output))
            })
            .await?;

        let requested_images = request
            .items
            .iter()
            .filter(|item| item.image_ref().is_some())
            .count();
        let embedded_images = images.iter().filter(|slot| slot.result.is_image()).count();

        let branding = self.config.branding.clone();
        let bytes = self
            .capture_stage("assemble_document", &mut stages, async move {
                let line_count = request.items.len();
                let bytes = tokio::task::spawn_blocking(move || {
                    document::build_workbook(&QuotationDocument {
                        branding: &branding,
                        logo: &logo,
                        lines: request.items.iter().map(|item| item.line()).collect(),
                        images: &images,
                        total: request.total,
                    })
                })
                .await
                .map_err(|err| PipelineError::internal("assemble_document", err.to_string()))?
                .map_err(|err| PipelineError::internal("assemble_document", err.to_string()))?;
                let output = json!({ "rows": line_count, "bytes": bytes.len() });
                Ok::<_, PipelineError>(StageOutcome::new(bytes, output))
            })
            .await?;

        info!(
            target = "quotation.pipeline",
            export_id = %export_id,
            requested_images,
            embedded_images,
            stages = stages.len(),
            "export_complete"
        );

        Ok(ExportArtifact {
            export_id,
            bytes,
            stages,
            requested_images,
            embedded_images,
        })
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

fn coverage_summary<T: CatalogRecord>(items: &[T], slots: &[MediaSlot]) -> Value {
    let missing: Vec<Value> = items
        .iter()
        .zip(slots)
        .filter(|(_, slot)| !slot.result.is_image())
        .map(|(item, slot)| {
            json!({
                "id": item.line().id,
                "cause": slot.result.cause().map(|c| c.code()),
            })
        })
        .collect();
    json!({
        "count": slots.len(),
        "embedded": slots.len() - missing.len(),
        "missing": missing,
    })
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    Internal,
}

impl PipelineError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::InvalidInput,
        }
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Internal,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}
