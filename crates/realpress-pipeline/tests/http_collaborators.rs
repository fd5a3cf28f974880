//! `HttpExtractor` and `HttpScorer` against a local `wiremock` server.

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use realpress_pipeline::{
    Classification, ExtractionError, Extractor, HttpExtractor, HttpScorer, ScoreInput, Scorer,
    ScoringError,
};

fn extractor() -> HttpExtractor {
    HttpExtractor::new(5, "realpress-test/0.1").expect("failed to build test extractor")
}

fn scorer(server: &MockServer) -> HttpScorer {
    HttpScorer::new(&format!("{}/", server.uri()), 5, "realpress-test/0.1")
        .expect("failed to build test scorer")
}

fn article_html() -> String {
    let paragraph = "Reporters confirmed the figures with three independent sources. ".repeat(5);
    format!(
        r#"<html><head><title>Fallback</title>
        <meta property="og:title" content="Council approves budget">
        <meta name="description" content="The vote passed 7-2."></head>
        <body><nav>Home</nav><p>{paragraph}</p><p>{paragraph}</p></body></html>"#
    )
}

#[tokio::test]
async fn extracts_title_description_and_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/news/budget"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_html()))
        .expect(1)
        .mount(&server)
        .await;

    let page = extractor()
        .extract(&format!("{}/news/budget", server.uri()))
        .await
        .unwrap();

    assert_eq!(page.title.as_deref(), Some("Council approves budget"));
    assert_eq!(page.description.as_deref(), Some("The vote passed 7-2."));
    assert!(page.text.contains("independent sources"));
    assert!(!page.text.contains("Home"));
    assert_eq!(page.domain, "127.0.0.1");
    assert_eq!(page.content_hash.len(), 64);
}

#[tokio::test]
async fn not_found_and_gone_are_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    for (route, status) in [("/missing", 404), ("/gone", 410)] {
        let err = extractor()
            .extract(&format!("{}{route}", server.uri()))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ExtractionError::Permanent { status: s, .. } if s == status),
            "unexpected error for {route}: {err:?}"
        );
    }
}

#[tokio::test]
async fn server_errors_are_retryable_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = extractor().extract(&server.uri()).await.unwrap_err();
    assert!(matches!(err, ExtractionError::Failed { ref reason, .. } if reason == "HTTP 503"));
    assert!(!err.is_permanent());
}

#[tokio::test]
async fn thin_pages_are_too_short() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body><p>Just a line.</p></body></html>"),
        )
        .mount(&server)
        .await;

    let err = extractor().extract(&server.uri()).await.unwrap_err();
    assert!(matches!(err, ExtractionError::TooShort { len: 12, .. }));
}

#[tokio::test]
async fn scores_text_through_the_text_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/detect/text"))
        .and(body_json(json!({"text": "some article text"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "score": 0.12,
            "confidence": 0.91,
            "model": "detector-v2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let score = scorer(&server)
        .score(ScoreInput::Text {
            text: "some article text".to_string(),
        })
        .await
        .unwrap();

    assert!((score.composite_score - 0.12).abs() < f64::EPSILON);
    assert_eq!(score.classification, Classification::Human);
    assert_eq!(score.provider_details["model"], "detector-v2");
}

#[tokio::test]
async fn scores_images_through_the_image_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/detect/image"))
        .and(body_json(json!({"image_url": "https://cdn.example.com/a.png"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "score": 0.5,
            "confidence": 0.6,
            "model": "image-detector"
        })))
        .mount(&server)
        .await;

    let score = scorer(&server)
        .score(ScoreInput::Image {
            image_url: "https://cdn.example.com/a.png".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(score.classification, Classification::Mixed);
}

#[tokio::test]
async fn scorer_surfaces_status_and_malformed_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/detect/text"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/detect/image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"score": "high"})))
        .mount(&server)
        .await;

    let client = scorer(&server);
    let status_err = client
        .score(ScoreInput::Text {
            text: "x".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(status_err, ScoringError::Status(500));

    let body_err = client
        .score(ScoreInput::Image {
            image_url: "https://cdn.example.com/a.png".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(body_err, ScoringError::InvalidResponse(_)));
}
