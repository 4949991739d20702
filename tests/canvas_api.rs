//! Canvas-style provider against a mocked REST API.

use mockito::Matcher;

use coursefetch::providers::CanvasProvider;
use coursefetch::{Provider, ProviderConfig, ProviderError, ProviderKind};

fn provider(base: &str) -> CanvasProvider {
    CanvasProvider::new(
        "canvas",
        ProviderConfig::new(ProviderKind::Canvas, base).with_token("secret-token"),
    )
}

#[tokio::test]
async fn test_courses_follow_link_pagination_with_bearer() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    let first = server
        .mock("GET", "/api/v1/courses")
        .match_header("authorization", "Bearer secret-token")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("per_page".into(), "100".into()),
            Matcher::UrlEncoded("include[]".into(), "term".into()),
        ]))
        .with_header("content-type", "application/json")
        .with_header(
            "link",
            &format!("<{}/api/v1/courses?page=2&per_page=100>; rel=\"next\"", base),
        )
        .with_body(r#"[{"id": 1, "name": "Calculus I", "course_code": "MAT101", "term": {"name": "2024-1"}}]"#)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/api/v1/courses")
        .match_header("authorization", "Bearer secret-token")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .with_header("content-type", "application/json")
        .with_body(r#"[{"id": 2, "course_code": "PHY200"}]"#)
        .create_async()
        .await;

    let courses = provider(&base).list_courses().await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(courses.len(), 2);
    assert_eq!(courses[0].external_id, "1");
    assert_eq!(courses[0].title, "Calculus I");
    assert_eq!(courses[0].code.as_deref(), Some("MAT101"));
    assert_eq!(courses[0].term.as_deref(), Some("2024-1"));
    assert_eq!(courses[1].title, "PHY200");
}

#[tokio::test]
async fn test_unauthorized_token_maps_to_error() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/api/v1/courses/5/files")
        .match_query(Matcher::Any)
        .with_status(401)
        .create_async()
        .await;

    let err = provider(&server.url()).list_materials("5").await.unwrap_err();
    assert!(matches!(err, ProviderError::Unauthorized(_)));
}

#[tokio::test]
async fn test_zero_length_download_is_empty() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _meta = server
        .mock("GET", "/api/v1/files/55")
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"id": 55, "display_name": "Syllabus", "filename": "syllabus.pdf",
                "content-type": "application/pdf", "size": 0,
                "url": "{}/files/55/download"}}"#,
            base
        ))
        .create_async()
        .await;
    let _bytes = server
        .mock("GET", "/files/55/download")
        .with_header("content-type", "application/pdf")
        .with_body("")
        .create_async()
        .await;

    let err = provider(&base).download_material("55").await.unwrap_err();
    assert!(matches!(err, ProviderError::Empty(_)));
}

#[tokio::test]
async fn test_download_returns_bytes_and_metadata() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _meta = server
        .mock("GET", "/api/v1/files/56")
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"id": 56, "display_name": "Week 2", "filename": "week2.pdf",
                "content-type": "application/octet-stream",
                "url": "{}/files/56/download"}}"#,
            base
        ))
        .create_async()
        .await;
    let _bytes = server
        .mock("GET", "/files/56/download")
        .with_header("content-type", "application/octet-stream")
        .with_body("%PDF-1.7 week two")
        .create_async()
        .await;

    let (bytes, material) = provider(&base).download_material("56").await.unwrap();
    assert_eq!(bytes, b"%PDF-1.7 week two");
    assert_eq!(material.title, "Week 2");
    assert_eq!(material.filename, "week2.pdf");
    assert_eq!(material.content_type, "application/pdf");
    assert_eq!(material.size_bytes, 17);
}

#[tokio::test]
async fn test_token_is_not_sent_to_file_storage_host() {
    let mut server = mockito::Server::new_async().await;
    let mut storage = mockito::Server::new_async().await;
    let meta = server
        .mock("GET", "/api/v1/files/57")
        .match_header("authorization", "Bearer secret-token")
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"id": 57, "display_name": "Week 3", "filename": "week3.pdf",
                "url": "{}/bucket/week3.pdf?signature=abc"}}"#,
            storage.url()
        ))
        .create_async()
        .await;
    let object = storage
        .mock("GET", "/bucket/week3.pdf")
        .match_query(Matcher::UrlEncoded("signature".into(), "abc".into()))
        .match_header("authorization", Matcher::Missing)
        .with_header("content-type", "application/pdf")
        .with_body("%PDF-1.7 week three")
        .expect(1)
        .create_async()
        .await;

    let (bytes, material) = provider(&server.url()).download_material("57").await.unwrap();

    meta.assert_async().await;
    object.assert_async().await;
    assert_eq!(bytes, b"%PDF-1.7 week three");
    assert_eq!(material.filename, "week3.pdf");
}

#[tokio::test]
async fn test_missing_token_never_touches_network() {
    let provider = CanvasProvider::new(
        "canvas",
        ProviderConfig::new(ProviderKind::Canvas, "http://127.0.0.1:9"),
    );
    assert!(!provider.is_configured());
    let err = provider.list_courses().await.unwrap_err();
    assert!(matches!(err, ProviderError::NotConfigured(_)));
}
