//! Scrape-backed provider over plain HTTP pages (no browser).

use std::sync::Arc;

use mockito::Matcher;

use coursefetch::ids::{decode_material_url, encode_course_url, encode_material_url};
use coursefetch::providers::PortalProvider;
use coursefetch::{DiscoveryEngine, EngineConfig, Provider, ProviderConfig, ProviderError, ProviderKind};

const COURSE_PAGE: &str = r#"<html><head><title>Física I</title></head><body>
<nav><a href="/Inicio.asp">Inicio</a> <a href="/Salir.asp">Salir</a></nav>
<a href="/Materiales.asp?idCurso=1">Material de estudio</a>
<iframe src="/docs/syllabus.pdf"></iframe>
</body></html>"#;

const MATERIALS_PAGE: &str = r#"<html><body>
<ul>
  <li><a href="/files/guia1.pdf">guia1.pdf</a></li>
  <li><a href="/files/guia1.pdf">Guía 1: Vectores</a></li>
  <li><a href="/Curso.asp?idCurso=1">Volver</a></li>
</ul>
</body></html>"#;

fn provider(base: &str) -> PortalProvider {
    let mut config = ProviderConfig::new(ProviderKind::Portal, base).with_token("session-token");
    config.use_browser = false;
    PortalProvider::new(
        "campus",
        config,
        Arc::new(DiscoveryEngine::new(EngineConfig::default())),
    )
}

#[tokio::test]
async fn test_materials_from_course_page_and_sections() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    let course = server
        .mock("GET", "/Curso.asp")
        .match_query(Matcher::UrlEncoded("idCurso".into(), "1".into()))
        .match_header("authorization", "Bearer session-token")
        .with_header("content-type", "text/html")
        .with_body(COURSE_PAGE)
        .expect(1)
        .create_async()
        .await;
    let section = server
        .mock("GET", "/Materiales.asp")
        .match_query(Matcher::UrlEncoded("idCurso".into(), "1".into()))
        .with_header("content-type", "text/html")
        .with_body(MATERIALS_PAGE)
        .expect(1)
        .create_async()
        .await;

    let course_id = encode_course_url(&format!("{}/Curso.asp?idCurso=1", base));
    let materials = provider(&base).list_materials(&course_id).await.unwrap();

    course.assert_async().await;
    section.assert_async().await;
    assert_eq!(materials.len(), 2);

    assert_eq!(materials[0].filename, "syllabus.pdf");
    assert_eq!(materials[0].content_type, "application/pdf");
    assert_eq!(materials[0].course_external_id, course_id);
    assert_eq!(
        decode_material_url(&materials[0].external_id).as_deref(),
        Some(format!("{}/docs/syllabus.pdf", base).as_str())
    );

    assert_eq!(materials[1].title, "Guía 1: Vectores");
    assert_eq!(materials[1].filename, "guia1.pdf");
    assert_eq!(materials[1].size_bytes, 0);
}

#[tokio::test]
async fn test_unreachable_course_page_is_discovery_failure() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _m = server
        .mock("GET", "/Curso.asp")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let course_id = encode_course_url(&format!("{}/Curso.asp?idCurso=9", base));
    let err = provider(&base).list_materials(&course_id).await.unwrap_err();
    assert!(matches!(err, ProviderError::DiscoveryFailed(_)));
}

#[tokio::test]
async fn test_download_by_synthesized_id() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _m = server
        .mock("GET", "/Descarga.asp")
        .match_query(Matcher::UrlEncoded("id".into(), "4".into()))
        .with_header("content-type", "application/octet-stream")
        .with_header("content-disposition", "attachment; filename=\"Guia 4.pdf\"")
        .with_body("%PDF-1.4 guia")
        .create_async()
        .await;

    let id = encode_material_url(&format!("{}/Descarga.asp?id=4", base));
    let (bytes, material) = provider(&base).download_material(&id).await.unwrap();

    assert_eq!(bytes, b"%PDF-1.4 guia");
    assert_eq!(material.external_id, id);
    assert_eq!(material.filename, "Guia 4.pdf");
    assert_eq!(material.content_type, "application/pdf");
    assert_eq!(material.size_bytes, 13);
}

#[tokio::test]
async fn test_native_id_without_template_is_not_found() {
    let p = provider("http://127.0.0.1:9");
    let err = p.download_material("4").await.unwrap_err();
    assert!(matches!(err, ProviderError::NotFound(_)));
}
