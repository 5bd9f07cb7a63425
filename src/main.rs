mod config;
mod document;
mod http;
mod media;
mod metrics;
mod models;
mod pipeline;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use config::SETTINGS;
use media::{FetchResult, ImageProfile, MediaSlot, PRODUCT_PROFILE};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{
    ApiError, CatalogProduct, ExportQuery, FetchImagesRequest, FetchImagesResponse, ImageReport,
    ItemSchema, QuotationProduct, QuotationRequest,
};
use pipeline::{ExportArtifact, ExportPipeline, PipelineError, PipelineErrorKind};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const DEFAULT_FILENAME: &str = "quotation.xlsx";

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "quotation.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let pipeline = ExportPipeline::from_config(SETTINGS.clone())?;
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    let openapi: serde_json::Value = serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or(json!({"openapi":"3.0.3"}));
    let state = AppState {
        pipeline,
        openapi: Arc::new(openapi),
        prometheus_handle,
    };

    let port: u16 = config::parse_env("PORT").unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(
        target = "quotation.api",
        concurrency = SETTINGS.fetch_concurrency,
        timeout_secs = SETTINGS.fetch_timeout.as_secs(),
        "listening on {addr}"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, build_router(state).into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: ExportPipeline,
    openapi: Arc<serde_json::Value>,
    prometheus_handle: PrometheusHandle,
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any)
        .expose_headers([
            header::CONTENT_DISPOSITION,
            HeaderName::from_static("x-export-id"),
            HeaderName::from_static("x-image-coverage"),
        ]);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .route("/generate-excel", post(generate_excel))
        .nest(
            "/stages",
            Router::new().route("/fetch_images", post(stage_fetch_images)),
        )
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()))
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
///
/// Returns a small JSON payload with `status`, `service` and the fetch pool size.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let permits = state.pipeline.orchestrator().fetcher().permits();
    Json(json!({
        "status": "ok",
        "service": "quotation-api-rs",
        "fetch_concurrency": permits.capacity(),
        "fetch_permits_available": permits.available(),
    }))
}

async fn openapi_json(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Ok(key) = std::env::var("OPENAPI_KEY") {
        let presented = headers
            .get("X-Docs-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != key {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    Json((*state.openapi).clone()).into_response()
}

async fn swagger_ui() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Quotation API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#,
    )
}

fn body_limit_from_env() -> usize {
    config::parse_env::<usize>("REQUEST_MAX_BYTES")
        .filter(|v| *v > 0)
        .unwrap_or(1024 * 1024)
}

fn max_stage_references() -> usize {
    config::parse_env::<usize>("MAX_STAGE_REFERENCES")
        .filter(|v| *v >= 1)
        .unwrap_or(50)
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

/// Build the quotation workbook.
///
/// - Method: `POST`
/// - Path: `/generate-excel`
/// - Query: `schema=quotation|catalog` (which field carries the image), `filename`
/// - Body: `{ "items": [...], "Total": number, "logo_url"?: string }`
/// - Response: the `.xlsx` file as an attachment
async fn generate_excel(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
    body: Bytes,
) -> Result<Response, AppError> {
    crate::metrics::inc_requests("/generate-excel");
    let artifact = match query.schema {
        ItemSchema::Quotation => {
            let request = parse_body::<QuotationProduct>(&body)?;
            state.pipeline.run(request).await?
        }
        ItemSchema::Catalog => {
            let request = parse_body::<CatalogProduct>(&body)?;
            state.pipeline.run(request).await?
        }
    };
    info!(
        target = "quotation.api",
        export_id = %artifact.export_id,
        schema = ?query.schema,
        bytes = artifact.bytes.len(),
        "quotation exported"
    );
    Ok(xlsx_response(artifact, query.filename.as_deref()))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<QuotationRequest<T>, PipelineError> {
    serde_json::from_slice(body)
        .map_err(|err| PipelineError::invalid_input("parse_request", err.to_string()))
}

fn xlsx_response(artifact: ExportArtifact, filename: Option<&str>) -> Response {
    let disposition = HeaderValue::from_str(&content_disposition(filename)).unwrap_or_else(|_| {
        HeaderValue::from_static("attachment; filename=quotation.xlsx")
    });
    let coverage = format!(
        "{}/{}",
        artifact.embedded_images, artifact.requested_images
    );
    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static(XLSX_CONTENT_TYPE),
        ),
        (header::CONTENT_DISPOSITION, disposition),
        (
            HeaderName::from_static("x-export-id"),
            HeaderValue::from_str(&artifact.export_id.to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown")),
        ),
        (
            HeaderName::from_static("x-image-coverage"),
            HeaderValue::from_str(&coverage).unwrap_or_else(|_| HeaderValue::from_static("0/0")),
        ),
    ];
    (headers, artifact.bytes).into_response()
}

fn content_disposition(filename: Option<&str>) -> String {
    let Some(name) = filename.map(str::trim).filter(|name| !name.is_empty()) else {
        return format!("attachment; filename={DEFAULT_FILENAME}");
    };
    let name = if name.to_lowercase().ends_with(".xlsx") {
        name.to_string()
    } else {
        format!("{name}.xlsx")
    };
    let ascii: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{ascii}\"; filename*=UTF-8''{}",
        urlencoding::encode(&name)
    )
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Pipeline(err) => {
                let status = match err.kind() {
                    PipelineErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    PipelineErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    error!(target = "quotation.api", stage = err.stage(), error = %err, "request failed");
                }
                let payload = ApiError {
                    error: err.stage().to_string(),
                    detail: Some(err.detail().to_string()),
                };
                (status, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}

// -------- Stage endpoints (media pipeline only) --------

/// Run the fetch/resize/placement pipeline without building a workbook.
///
/// - Method: `POST`
/// - Path: `/stages/fetch_images`
/// - Body: `{ "references": [string|null], "profile"?: "product"|"logo", "include_data"?: bool }`
async fn stage_fetch_images(
    State(state): State<AppState>,
    Json(req): Json<FetchImagesRequest>,
) -> Result<Json<FetchImagesResponse>, AppError> {
    crate::metrics::inc_requests("/stages/fetch_images");
    let profile = match req.profile.as_deref() {
        None => PRODUCT_PROFILE,
        Some(name) => ImageProfile::from_name(name).ok_or_else(|| {
            PipelineError::invalid_input("fetch_images", format!("unknown_profile: {name}"))
        })?,
    };
    if req.references.len() > max_stage_references() {
        return Err(PipelineError::invalid_input("fetch_images", "too_many_references").into());
    }

    let include_data = req.include_data;
    let slots = state
        .pipeline
        .orchestrator()
        .fetch_references(req.references, &profile)
        .await;
    let results = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| image_report(index, slot, include_data))
        .collect();
    Ok(Json(FetchImagesResponse {
        profile: profile.name,
        results,
    }))
}

fn image_report(index: usize, slot: MediaSlot, include_data: bool) -> ImageReport {
    match slot.result {
        FetchResult::Image(image) => ImageReport {
            index,
            status: "image",
            width: Some(image.width),
            height: Some(image.height),
            placement: slot.placement,
            cause: None,
            detail: None,
            png_base64: include_data.then(|| BASE64.encode(&image.png)),
        },
        FetchResult::Absent(cause) => ImageReport {
            index,
            status: "absent",
            width: None,
            height: None,
            placement: None,
            cause: cause.as_ref().map(|c| c.code()),
            detail: cause.map(|c| c.to_string()),
            png_base64: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportConfig;
    use crate::media::{
        FetchOrchestrator, FetchPermits, ImageFetcher,
        testing::{Behavior, MockSource},
    };
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_router(source: MockSource) -> Router {
        let config = ExportConfig {
            logo_url: None,
            ..ExportConfig::default()
        };
        let fetcher = ImageFetcher::new(
            Arc::new(source),
            FetchPermits::new(config.fetch_concurrency),
            Duration::from_millis(300),
        );
        let state = AppState {
            pipeline: ExportPipeline::new(config, FetchOrchestrator::new(fetcher)),
            openapi: Arc::new(json!({"openapi": "3.0.3"})),
            prometheus_handle: PrometheusBuilder::new().build_recorder().handle(),
        };
        build_router(state)
    }

    fn image_source() -> MockSource {
        MockSource::new(Duration::ZERO).route(
            "https://img.test/a.png",
            Behavior::Image {
                width: 900,
                height: 300,
            },
        )
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn body_bytes(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body")
    }

    #[tokio::test]
    async fn health_reports_pool() {
        let app = test_router(MockSource::new(Duration::ZERO));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).expect("json");
        assert_eq!(body["fetch_concurrency"], json!(5));
    }

    #[tokio::test]
    async fn generate_excel_returns_workbook() {
        let app = test_router(image_source());
        let body = json!({
            "items": [
                {"image_product": "https://img.test/a.png", "id_product": "KK-1",
                 "product_description": "Ride-on car", "quantity": 4,
                 "unit_price": 55.0, "subtotal": 220.0},
                {"image_product": null, "id_product": "KK-2",
                 "product_description": "Puzzle", "quantity": 10,
                 "unit_price": 2.5, "subtotal": 25.0}
            ],
            "Total": 245.0
        });
        let response = app
            .oneshot(post_json("/generate-excel", body))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers().clone();
        assert_eq!(headers[header::CONTENT_TYPE], XLSX_CONTENT_TYPE);
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=quotation.xlsx"
        );
        assert_eq!(headers["x-image-coverage"], "1/1");
        assert!(headers.contains_key("x-export-id"));
        assert!(body_bytes(response).await.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn catalog_schema_is_selected_by_query() {
        let app = test_router(image_source());
        let body = json!({
            "items": [{"url_image": "https://img.test/a.png", "id_product": "C-1",
                       "product_description": "Kite", "quantity": 1,
                       "unit_price": 9.0, "subtotal": 9.0}],
            "Total": 9.0
        });
        let response = app
            .oneshot(post_json(
                "/generate-excel?schema=catalog&filename=Cotizaci%C3%B3n",
                body,
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-image-coverage"], "1/1");
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .expect("ascii");
        assert!(disposition.contains("filename*=UTF-8''Cotizaci%C3%B3n.xlsx"));
    }

    #[tokio::test]
    async fn malformed_body_is_a_client_error() {
        let app = test_router(MockSource::new(Duration::ZERO));
        let response = app
            .oneshot(post_json("/generate-excel", json!({"items": "nope"})))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).expect("json");
        assert_eq!(body["error"], json!("parse_request"));
    }

    #[tokio::test]
    async fn stage_endpoint_reports_each_reference() {
        let app = test_router(image_source());
        let body = json!({
            "references": ["https://img.test/a.png", null, "ftp://img.test/b.png"],
            "include_data": true
        });
        let response = app
            .oneshot(post_json("/stages/fetch_images", body))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).expect("json");
        assert_eq!(body["profile"], json!("product"));
        let results = body["results"].as_array().expect("results");
        assert_eq!(results.len(), 3);
        assert_eq!(results[0]["status"], json!("image"));
        assert_eq!(results[0]["width"], json!(180));
        assert_eq!(results[0]["height"], json!(60));
        assert_eq!(results[0]["placement"]["x_offset"], json!(15));
        assert_eq!(results[0]["placement"]["y_offset"], json!(50));
        assert!(results[0]["png_base64"].as_str().is_some());
        assert_eq!(results[1]["status"], json!("absent"));
        assert!(results[1].get("cause").is_none());
        assert_eq!(results[2]["cause"], json!("invalid_reference"));
    }

    #[tokio::test]
    async fn stage_endpoint_rejects_unknown_profile() {
        let app = test_router(MockSource::new(Duration::ZERO));
        let response = app
            .oneshot(post_json(
                "/stages/fetch_images",
                json!({"references": [], "profile": "banner"}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn content_disposition_variants() {
        assert_eq!(
            content_disposition(None),
            "attachment; filename=quotation.xlsx"
        );
        assert_eq!(
            content_disposition(Some("  ")),
            "attachment; filename=quotation.xlsx"
        );
        assert_eq!(
            content_disposition(Some("order 42.XLSX")),
            "attachment; filename=\"order_42.XLSX\"; filename*=UTF-8''order%2042.XLSX"
        );
    }
}
