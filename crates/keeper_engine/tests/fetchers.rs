mod common;

use std::collections::BTreeSet;

use common::{test_config, FakeRenderer, Harness, PNG_BYTES};
use keeper_core::{ArchiveFormat, FailureKind, JobResult};
use keeper_engine::ReadableDocument;
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn only(format: ArchiveFormat) -> BTreeSet<ArchiveFormat> {
    BTreeSet::from([format])
}

async fn serve(server: &MockServer, at: &str, body: impl Into<Vec<u8>>, content_type: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.into(), content_type))
        .mount(server)
        .await;
}

#[tokio::test]
async fn five_mib_pdf_is_stored_and_referenced() {
    let server = MockServer::start().await;
    let body = vec![b'%'; 5 * 1024 * 1024];
    serve(&server, "/paper.pdf", body.clone(), "application/pdf").await;

    let harness = Harness::new().await;
    let link = harness
        .add_link(&format!("{}/paper.pdf", server.uri()))
        .await;

    let report = harness
        .preserver
        .preserve(link.id, &only(ArchiveFormat::Pdf))
        .await;
    assert_eq!(report.result(), JobResult::Success);

    let expected = format!("archives/7/{}.pdf", link.id);
    let stored = harness.reload(&link).await.unwrap();
    assert_eq!(stored.pdf.as_deref(), Some(expected.as_str()));
    assert_eq!(stored.monolith, None);
    assert_eq!(stored.screenshot, None);
    assert_eq!(stored.readable, None);
    assert_eq!(std::fs::read(harness.file(&expected)).unwrap(), body);
}

#[tokio::test]
async fn oversized_pdf_is_rejected_without_writing() {
    let server = MockServer::start().await;
    serve(&server, "/big.pdf", vec![0u8; 4096], "application/pdf").await;

    let mut config = test_config();
    config.max_pdf_buffer_bytes = 1024;
    let harness = Harness::with(config, FakeRenderer::Fails).await;
    let link = harness.add_link(&format!("{}/big.pdf", server.uri())).await;

    let report = harness
        .preserver
        .preserve(link.id, &only(ArchiveFormat::Pdf))
        .await;

    let err = report.outcome(ArchiveFormat::Pdf).unwrap().clone().unwrap_err();
    assert_eq!(
        err.kind,
        FailureKind::SizeExceeded {
            max_bytes: 1024,
            actual: Some(4096)
        }
    );
    assert!(!err.kind.is_retryable());
    assert_eq!(harness.reload(&link).await.unwrap().pdf, None);
    assert!(harness.stored().is_empty());
}

#[tokio::test]
async fn pdf_with_html_content_type_is_unsupported() {
    let server = MockServer::start().await;
    serve(&server, "/login.pdf", "<html>sign in</html>", "text/html").await;

    let harness = Harness::new().await;
    let link = harness.add_link(&format!("{}/login.pdf", server.uri())).await;
    let report = harness
        .preserver
        .preserve(link.id, &only(ArchiveFormat::Pdf))
        .await;

    let err = report.outcome(ArchiveFormat::Pdf).unwrap().clone().unwrap_err();
    assert_eq!(
        err.kind,
        FailureKind::UnsupportedContent {
            content_type: "text/html".to_string()
        }
    );
    assert!(harness.stored().is_empty());
}

#[tokio::test]
async fn server_errors_are_retryable_and_client_errors_are_not() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky.pdf"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let harness = Harness::new().await;
    let flaky = harness.add_link(&format!("{}/flaky.pdf", server.uri())).await;
    let gone = harness.add_link(&format!("{}/gone.pdf", server.uri())).await;

    let flaky_report = harness
        .preserver
        .preserve(flaky.id, &only(ArchiveFormat::Pdf))
        .await;
    let gone_report = harness
        .preserver
        .preserve(gone.id, &only(ArchiveFormat::Pdf))
        .await;

    assert_eq!(flaky_report.retryable(), only(ArchiveFormat::Pdf));
    assert!(gone_report.retryable().is_empty());
    let err = gone_report.outcome(ArchiveFormat::Pdf).unwrap().clone().unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(404));
}

#[tokio::test]
async fn monolith_inlines_subresources_and_skips_broken_ones() {
    let server = MockServer::start().await;
    let page = r#"<!DOCTYPE html><html><head><title>Post</title>
        <link rel="stylesheet" href="/site.css">
        <script src="/missing.js"></script>
        </head><body><p>Hello</p><img src="/logo.png" alt="logo"><img src="/broken.png"></body></html>"#;
    serve(&server, "/post", page, "text/html; charset=utf-8").await;
    serve(&server, "/site.css", "body { margin: 0 }", "text/css").await;
    serve(&server, "/logo.png", vec![1u8, 2, 3], "image/png").await;
    Mock::given(method("GET"))
        .and(path("/missing.js"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken.png"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let harness = Harness::new().await;
    let link = harness.add_link(&format!("{}/post", server.uri())).await;
    let report = harness
        .preserver
        .preserve(link.id, &only(ArchiveFormat::Monolith))
        .await;
    assert_eq!(report.result(), JobResult::Success);

    let expected = format!("archives/7/{}.html", link.id);
    let html = std::fs::read_to_string(harness.file(&expected)).unwrap();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<meta charset=\"utf-8\">"));
    assert!(html.contains("<style>body { margin: 0 }</style>"));
    assert!(html.contains(r#"<img src="data:image/png;base64,AQID" alt="logo">"#));
    assert!(html.contains(r#"<img src="/broken.png">"#));
    assert!(!html.contains("missing.js"));
    assert!(!html.contains("site.css"));
}

#[tokio::test]
async fn readability_stores_a_json_document() {
    let server = MockServer::start().await;
    let page = r#"<html><head><title>Fallback</title>
        <meta property="og:title" content="The Story">
        <meta name="author" content="A. Writer"></head>
        <body><nav>Home | About</nav>
        <article><h1>The Story</h1><p>First paragraph.</p><p>Second paragraph.</p></article>
        <footer>Copyright</footer></body></html>"#;
    serve(&server, "/story", page, "text/html").await;

    let harness = Harness::new().await;
    let url = format!("{}/story", server.uri());
    let link = harness.add_link(&url).await;
    harness
        .preserver
        .preserve(link.id, &only(ArchiveFormat::Readability))
        .await;

    let stored = harness.reload(&link).await.unwrap();
    let path = stored.readable.unwrap();
    assert_eq!(path, format!("archives/7/{}.json", link.id));

    let document: ReadableDocument =
        serde_json::from_slice(&std::fs::read(harness.file(&path)).unwrap()).unwrap();
    assert_eq!(document.url, url);
    assert_eq!(document.title.as_deref(), Some("The Story"));
    assert_eq!(document.byline.as_deref(), Some("A. Writer"));
    assert_eq!(
        document.text_content,
        "The Story\n\nFirst paragraph.\n\nSecond paragraph."
    );
    assert_eq!(document.length, document.text_content.chars().count());
    assert!(!document.text_content.contains("Copyright"));
}

#[tokio::test]
async fn page_without_text_fails_readability_only() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/app",
        "<html><body><script>boot()</script></body></html>",
        "text/html",
    )
    .await;

    let harness = Harness::new().await;
    let link = harness.add_link(&format!("{}/app", server.uri())).await;
    let report = harness
        .preserver
        .preserve(link.id, &only(ArchiveFormat::Readability))
        .await;

    let err = report
        .outcome(ArchiveFormat::Readability)
        .unwrap()
        .clone()
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::ExtractionEmpty);
    assert_eq!(harness.reload(&link).await.unwrap().readable, None);
}

#[tokio::test]
async fn screenshot_is_rendered_to_the_configured_format() {
    let mut config = test_config();
    config.screenshot_format = keeper_core::ScreenshotFormat::Jpeg;
    let harness = Harness::with(config, FakeRenderer::Image(PNG_BYTES.to_vec())).await;
    let link = harness.add_link("https://example.test/page").await;

    let report = harness
        .preserver
        .preserve(link.id, &only(ArchiveFormat::Screenshot))
        .await;
    assert_eq!(report.result(), JobResult::Success);

    let expected = format!("archives/7/{}.jpeg", link.id);
    assert_eq!(
        harness.reload(&link).await.unwrap().screenshot.as_deref(),
        Some(expected.as_str())
    );
    assert_eq!(std::fs::read(harness.file(&expected)).unwrap(), PNG_BYTES);
}

#[tokio::test]
async fn render_failure_is_reported_as_render() {
    let harness = Harness::with(test_config(), FakeRenderer::Fails).await;
    let link = harness.add_link("https://example.test/page").await;

    let report = harness
        .preserver
        .preserve(link.id, &only(ArchiveFormat::Screenshot))
        .await;
    let err = report
        .outcome(ArchiveFormat::Screenshot)
        .unwrap()
        .clone()
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Render);
    assert!(err.kind.is_retryable());
}
