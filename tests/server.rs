use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use design_match::engine::{MatchEngine, MatchParams};
use design_match::extract::NpyExtractor;
use design_match::metadata::{DesignInfo, MetadataStore};
use design_match::refine::ConfidenceBounds;
use design_match::search::CoarseSearch;
use design_match::server::{AppState, create_app};
use design_match::thumbnail::ThumbnailStore;
use design_match::{Corpus, DescriptorSet, MatchService};
use http_body_util::BodyExt;
use ndarray_npy::WriteNpyExt;
use rstest::*;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const DIM: usize = 16;
const BOUNDARY: &str = "design-match-boundary";

/// 1x1 像素的 PNG
const PNG_1X1: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

fn basis(i: usize, scale: f32) -> Vec<f32> {
    let mut v = vec![0.; DIM];
    v[i] = scale;
    v
}

fn set(rows: impl Iterator<Item = Vec<f32>>) -> DescriptorSet {
    let mut set = DescriptorSet::new(DIM);
    rows.for_each(|row| set.push(&row));
    set
}

fn npy(set: &DescriptorSet) -> Vec<u8> {
    let mut buf = vec![];
    set.to_array().write_npy(&mut buf).unwrap();
    buf
}

struct Fixture {
    state: Arc<AppState>,
    query: Vec<u8>,
    _thumbnails: TempDir,
}

fn fixture(healthy_threshold: usize) -> Fixture {
    let query = set((0..DIM).map(|i| basis(i, 10.)));

    let mut designs = vec![DescriptorSet::default(); 10];
    designs[3] = set((0..DIM).map(|i| basis(i, 100.)));
    designs[7] = query.clone();
    designs[9] = set((0..DIM).map(|i| basis(DIM - 1 - i, -50.)));
    let corpus = Arc::new(Corpus::new(designs).unwrap());

    let params = MatchParams {
        coarse_features: 12,
        refine_features: DIM,
        bounds: ConfidenceBounds::new(0., 2.).unwrap(),
        ..Default::default()
    };
    let engine =
        MatchEngine::new(corpus, Arc::new(NpyExtractor), CoarseSearch::single_threaded(), params);

    let metadata = MetadataStore::from_map(HashMap::from([(
        7,
        DesignInfo {
            artist: "ann".to_string(),
            title: "Tide".to_string(),
            ..Default::default()
        },
    )]));

    let thumbnails = TempDir::new().unwrap();
    fs::write(thumbnails.path().join("7.png"), PNG_1X1).unwrap();

    let service = MatchService::new(
        engine,
        metadata,
        ThumbnailStore::new(thumbnails.path(), "png"),
        "http://designs/".to_string(),
        healthy_threshold,
    );

    Fixture { state: AppState::new(service), query: npy(&query), _thumbnails: thumbnails }
}

fn multipart(file: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"query.npy\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(file);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/match")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

#[rstest]
#[case::idle(2, StatusCode::OK)]
#[case::zero_threshold(0, StatusCode::NOT_FOUND)]
#[tokio::test]
async fn health(#[case] threshold: usize, #[case] status: StatusCode) -> Result<()> {
    let fixture = fixture(threshold);
    let app = create_app(fixture.state.clone());

    let response = app.oneshot(Request::get("/health").body(Body::empty())?).await?;
    assert_eq!(response.status(), status);
    Ok(())
}

#[tokio::test]
async fn match_upload() -> Result<()> {
    let fixture = fixture(2);
    let app = create_app(fixture.state.clone());

    let response = app.oneshot(multipart(&fixture.query)).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await?.to_bytes();
    let json: Value = serde_json::from_slice(&body)?;
    assert_eq!(json["id"], 7);
    assert_eq!(json["design_url"], "http://designs/7");
    assert_eq!(json["title"], "Tide");
    assert_eq!(json["artist"], "ann");
    assert_eq!(json["match_count"], DIM);
    assert_eq!(json["width"], 1);
    assert_eq!(json["height"], 1);
    assert!(json["thumbnail"].is_string());
    assert!(json["confidence"].as_f64().unwrap() > 0.5);
    assert!(json["elapsed"].is_number());

    assert_eq!(fixture.state.service.pending(), 0);
    Ok(())
}

#[tokio::test]
async fn garbage_upload_is_bad_request() -> Result<()> {
    let fixture = fixture(2);
    let app = create_app(fixture.state.clone());

    let response = app.oneshot(multipart(b"definitely not an image")).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(fixture.state.service.pending(), 0);
    assert!(fixture.state.service.is_healthy());
    Ok(())
}

#[tokio::test]
async fn missing_file_field_is_rejected() -> Result<()> {
    let fixture = fixture(2);
    let app = create_app(fixture.state.clone());

    let request = Request::post("/match")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(format!("--{BOUNDARY}--\r\n")))?;
    let response = app.oneshot(request).await?;
    assert!(response.status().is_client_error());
    Ok(())
}

#[tokio::test]
async fn metrics_and_api_docs() -> Result<()> {
    let fixture = fixture(2);

    let app = create_app(fixture.state.clone());
    app.oneshot(multipart(&fixture.query)).await?;

    let app = create_app(fixture.state.clone());
    let response = app.oneshot(Request::get("/metrics").body(Body::empty())?).await?;
    let body = response.into_body().collect().await?.to_bytes();
    assert!(String::from_utf8_lossy(&body).contains("dm_match_duration"));

    let app = create_app(fixture.state.clone());
    let response = app.oneshot(Request::get("/api-docs/openapi.json").body(Body::empty())?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await?.to_bytes();
    let json: Value = serde_json::from_slice(&body)?;
    assert!(json["paths"]["/match"].is_object());
    Ok(())
}
