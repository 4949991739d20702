//! Identification, resolution and dedup over hand-built snapshots.

use mockito::Matcher;

use coursefetch::config::LlmConfig;
use coursefetch::dedup::{dedup_materials, rank_materials};
use coursefetch::identify::{identify_snapshot, LlmIdentifier, MaterialIdentifier, RuleBasedIdentifier};
use coursefetch::snapshot::{ingest_exchanges, FileButton, FileItem, NetworkExchange, PageLink, PageSnapshot};
use coursefetch::{ExtractedMaterial, MaterialSource};

fn lecture_page() -> PageSnapshot {
    let mut snapshot = PageSnapshot::new("https://p.edu/course/12");
    snapshot.iframes = vec!["https://p.edu/static/doc.pdf".to_string()];
    snapshot.file_items = vec![FileItem {
        data_id: Some("7".to_string()),
        text: "Lecture 1".to_string(),
        class_name: "file-item".to_string(),
        links: Vec::new(),
        buttons: vec![FileButton {
            action: "openPreview('7')".to_string(),
            id: None,
            text: "Preview".to_string(),
        }],
    }];
    snapshot.network_requests = vec![NetworkExchange {
        url: "https://p.edu/api/materials?course=12".to_string(),
        mime_type: "application/json".to_string(),
        status: 200,
        body: Some(r#"{"items":[{"id":"7","fileUrl":"/books/lec1.pdf","title":"Lecture 1 Slides"}]}"#.to_string()),
    }];
    ingest_exchanges(
        &snapshot.network_requests,
        &mut snapshot.file_url_map,
        &mut snapshot.file_title_map,
    );
    snapshot
}

#[tokio::test]
async fn test_iframe_and_intercepted_row_yield_two_materials() {
    let snapshot = lecture_page();
    let materials = rank_materials(identify_snapshot(&RuleBasedIdentifier::default(), &snapshot).await);

    assert_eq!(materials.len(), 2);

    let row = &materials[0];
    assert_eq!(row.url, "https://p.edu/books/lec1.pdf");
    assert_eq!(row.title, "Lecture 1 Slides");
    assert_eq!(row.source, MaterialSource::PreviewExtract);
    assert!((row.confidence - 0.95).abs() < f32::EPSILON);
    assert_eq!(row.file_type, "pdf");

    let frame = &materials[1];
    assert_eq!(frame.url, "https://p.edu/static/doc.pdf");
    assert_eq!(frame.source, MaterialSource::Iframe);
    assert!((frame.confidence - 0.9).abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_templated_urls_are_never_candidates() {
    let mut snapshot = PageSnapshot::new("https://p.edu/course/12");
    snapshot.links = vec![
        PageLink {
            href: "https://p.edu/download/${fileId}".to_string(),
            text: "Descargar".to_string(),
            ..Default::default()
        },
        PageLink {
            href: "https://p.edu/files/notes.pdf".to_string(),
            text: "Notes".to_string(),
            ..Default::default()
        },
    ];
    snapshot.iframes = vec!["https://p.edu/viewer.html?file=' + id + '".to_string()];

    let materials = identify_snapshot(&RuleBasedIdentifier::default(), &snapshot).await;
    assert_eq!(materials.len(), 1);
    assert_eq!(materials[0].url, "https://p.edu/files/notes.pdf");
    assert_eq!(materials[0].source, MaterialSource::Link);
}

#[tokio::test]
async fn test_unresolvable_row_is_dropped() {
    let mut snapshot = PageSnapshot::new("https://p.edu/course/12");
    snapshot.file_items = vec![FileItem {
        data_id: Some("99".to_string()),
        text: "Mystery".to_string(),
        ..Default::default()
    }];
    let materials = identify_snapshot(&RuleBasedIdentifier::new(false), &snapshot).await;
    assert!(materials.is_empty());
}

#[test]
fn test_cross_page_dedup_prefers_descriptive_title() {
    let materials = vec![
        ExtractedMaterial::new("https://p.edu/files/guia1.pdf", "guia1.pdf", "pdf", 0.8, MaterialSource::Link),
        ExtractedMaterial::new("https://p.edu/files/guia1.pdf/", "Guía 1: Vectores", "pdf", 0.8, MaterialSource::Link),
        ExtractedMaterial::new("https://p.edu/files/guia2.pdf", "guia2.pdf", "pdf", 0.8, MaterialSource::Link),
    ];
    let deduped = dedup_materials(materials);
    assert_eq!(deduped.len(), 2);
    assert_eq!(deduped[0].title, "Guía 1: Vectores");
    assert_eq!(deduped[1].title, "guia2.pdf");
}

#[tokio::test]
async fn test_model_answer_becomes_materials() {
    let mut server = mockito::Server::new_async().await;
    let generate = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "model": "qwen2.5:7b",
            "stream": false,
        })))
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "response": "[{\"url\": \"/files/guia2.pdf\", \"title\": \"Guía 2\"}]"
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let config = LlmConfig::default()
        .with_endpoint(&server.url())
        .with_model("qwen2.5:7b");
    let identifier = LlmIdentifier::new(config, RuleBasedIdentifier::default());
    let snapshot = PageSnapshot::new("https://p.edu/course/12");

    let materials = identifier.identify(&snapshot).await;
    generate.assert_async().await;
    assert_eq!(materials.len(), 1);
    assert_eq!(materials[0].url, "https://p.edu/files/guia2.pdf");
    assert_eq!(materials[0].title, "Guía 2");
    assert_eq!(materials[0].source, MaterialSource::Llm);
}
