use axum::body::Body;
use axum::http::{Request, StatusCode};
use media_exporter::collectors::{tally, MetricSet};
use media_exporter::exporter::{Exporter, MetricRegistry};
use media_exporter::server::router;
use tower::ServiceExt;

async fn get(app: axum::Router, uri: &str) -> (StatusCode, String, Option<String>) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap(), content_type)
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = router(MetricRegistry::new().handle());
    let (status, body, _) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_metrics_reflect_latest_export() {
    let registry = MetricRegistry::new();
    let app = router(registry.handle());
    let mut exporter = Exporter::new(registry);

    let mut metrics = MetricSet::new();
    metrics.scalar("movies_total", 3.0);
    metrics.scalar("radarr_movies_missing", 1.0);
    metrics.breakdown("video_codecs", tally(["HEVC", "H.264", "HEVC"]));
    exporter.export(&metrics, "radarr");

    let (status, body, content_type) = get(app.clone(), "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/plain"));
    assert!(body.contains("# TYPE radarr_movies_total gauge"));
    assert!(body.contains("radarr_movies_total 3"));
    assert!(body.contains("radarr_movies_missing 1"));
    assert!(!body.contains("radarr_radarr_"));
    assert!(body.contains("radarr_video_codecs{label=\"HEVC\"} 2"));

    let mut next = MetricSet::new();
    next.scalar("movies_total", 4.0);
    exporter.export(&next, "radarr");

    let (_, body, _) = get(app, "/metrics").await;
    assert!(body.contains("radarr_movies_total 4"));
    // not reported this cycle, still exposed with the previous value
    assert!(body.contains("radarr_movies_missing 1"));
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let app = router(MetricRegistry::new().handle());
    let (status, _, _) = get(app, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
