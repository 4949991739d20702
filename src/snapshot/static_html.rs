//! Snapshot from fetched HTML, without running page scripts.
//!
//! Mirrors the in-page extraction: the same link, iframe, file-row and
//! name-label rules, plus templates from inline scripts. There is no
//! network log and no click resolution on this path.

use std::collections::{HashMap, HashSet};

use scraper::{ElementRef, Html, Selector};

use super::{
    extract_url_templates, is_file_row_class, is_material_name_class, FileButton, FileItem,
    PageLink, PageSnapshot,
};
use crate::utils::text::truncate;
use crate::utils::{collapse_whitespace, resolve_url};

const LEAF_TAGS: &[&str] = &[
    "a", "button", "input", "img", "i", "svg", "script", "style", "option",
];

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn text_of(el: &ElementRef, max: usize) -> String {
    let text = collapse_whitespace(&el.text().collect::<String>());
    truncate(&text, max).to_string()
}

fn href_of(el: &ElementRef, page_url: &str) -> Option<String> {
    let raw = el.value().attr("href")?.trim();
    if raw.to_lowercase().starts_with("javascript:") {
        return Some(raw.to_string());
    }
    Some(resolve_url(page_url, raw))
}

fn link_of(el: &ElementRef, page_url: &str) -> Option<PageLink> {
    let href = match href_of(el, page_url) {
        Some(h) => h,
        None if el.value().attr("onclick").is_some() => String::new(),
        None => return None,
    };

    let data_id = el.value().attr("data-id").map(str::to_string).or_else(|| {
        el.ancestors()
            .filter_map(ElementRef::wrap)
            .find_map(|a| a.value().attr("data-id").map(str::to_string))
    });
    let context = el
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| matches!(a.value().name(), "li" | "tr" | "p" | "div"))
        .map(|block| text_of(&block, 200))
        .unwrap_or_default();

    let mut text = text_of(el, 200);
    if text.is_empty() {
        text = el.value().attr("title").unwrap_or_default().trim().to_string();
    }

    Some(PageLink {
        href,
        text,
        context,
        onclick: el.value().attr("onclick").map(str::to_string),
        data_id,
    })
}

fn is_row_candidate(el: &ElementRef) -> bool {
    if LEAF_TAGS.contains(&el.value().name()) {
        return false;
    }
    el.value().attr("data-id").is_some()
        || el.value().attr("class").is_some_and(is_file_row_class)
}

/// Pick file rows: candidates whose nested candidates form a single chain
/// (a row with sub-parts), keeping the outermost of those.
fn select_rows<'a>(document: &'a Html) -> Vec<ElementRef<'a>> {
    let Some(all) = selector("[class], [data-id]") else {
        return Vec::new();
    };
    let candidates: Vec<ElementRef> = document
        .select(&all)
        .filter(is_row_candidate)
        .take(3000)
        .collect();
    let candidate_ids: HashSet<_> = candidates.iter().map(|c| c.id()).collect();

    // Candidate ancestors of each candidate, nearest first.
    let candidate_ancestors: Vec<Vec<_>> = candidates
        .iter()
        .map(|c| {
            c.ancestors()
                .map(|a| a.id())
                .filter(|id| candidate_ids.contains(id))
                .collect()
        })
        .collect();

    // Parent candidate -> number of directly nested candidates.
    let mut branching: HashMap<_, usize> = HashMap::new();
    for ancestors in &candidate_ancestors {
        if let Some(parent) = ancestors.first() {
            *branching.entry(*parent).or_default() += 1;
        }
    }
    let branches = |id| branching.get(&id).copied().unwrap_or(0);

    // A candidate is row-ish when it and every candidate below it branch at most once.
    let mut blocked = HashSet::new();
    for (c, ancestors) in candidates.iter().zip(&candidate_ancestors) {
        if branches(c.id()) > 1 {
            blocked.insert(c.id());
            blocked.extend(ancestors.iter().copied());
        }
    }

    candidates
        .iter()
        .zip(&candidate_ancestors)
        .filter(|(c, _)| !blocked.contains(&c.id()))
        .filter(|(_, ancestors)| ancestors.iter().all(|a| blocked.contains(a)))
        .map(|(c, _)| *c)
        .collect()
}

fn file_item_of(el: &ElementRef, page_url: &str) -> FileItem {
    let data_id = el.value().attr("data-id").map(str::to_string).or_else(|| {
        selector("[data-id]").and_then(|s| {
            el.select(&s)
                .next()
                .and_then(|d| d.value().attr("data-id").map(str::to_string))
        })
    });

    let links = selector("a[href]")
        .map(|s| {
            el.select(&s)
                .filter(|a| !a.value().attr("href").unwrap_or_default().trim().starts_with('#'))
                .filter_map(|a| link_of(&a, page_url))
                .collect()
        })
        .unwrap_or_default();

    let buttons = selector("button, [onclick], [data-action], .btn")
        .map(|s| {
            el.select(&s)
                .filter(|b| {
                    let href = b.value().attr("href").unwrap_or_default().trim().to_lowercase();
                    b.value().name() != "a"
                        || href.is_empty()
                        || href.starts_with('#')
                        || href.starts_with("javascript:")
                })
                .map(|b| FileButton {
                    action: b
                        .value()
                        .attr("onclick")
                        .or_else(|| b.value().attr("data-action"))
                        .unwrap_or_default()
                        .to_string(),
                    id: b
                        .value()
                        .attr("data-id")
                        .or_else(|| b.value().attr("id"))
                        .map(str::to_string),
                    text: {
                        let t = text_of(&b, 100);
                        if t.is_empty() {
                            b.value()
                                .attr("title")
                                .or_else(|| b.value().attr("aria-label"))
                                .unwrap_or_default()
                                .to_string()
                        } else {
                            t
                        }
                    },
                })
                .collect()
        })
        .unwrap_or_default();

    FileItem {
        data_id,
        text: text_of(el, 300),
        class_name: el.value().attr("class").unwrap_or_default().to_string(),
        links,
        buttons,
    }
}

fn material_names(document: &Html) -> Vec<String> {
    let Some(all) = selector("[class]") else {
        return Vec::new();
    };
    let name_els: Vec<ElementRef> = document
        .select(&all)
        .filter(|el| el.value().attr("class").is_some_and(is_material_name_class))
        .collect();
    let ids: HashSet<_> = name_els.iter().map(|e| e.id()).collect();
    // Innermost labels only.
    let containers: HashSet<_> = name_els
        .iter()
        .flat_map(|e| e.ancestors().map(|a| a.id()))
        .filter(|id| ids.contains(id))
        .collect();

    name_els
        .iter()
        .filter(|e| !containers.contains(&e.id()))
        .map(|e| text_of(e, 200))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Build a snapshot from page HTML. `page_url` is the URL after redirects.
pub fn snapshot_from_html(html: &str, page_url: &str) -> PageSnapshot {
    let document = Html::parse_document(html);
    let mut snapshot = PageSnapshot::new(page_url);

    if let Some(sel) = selector("title") {
        if let Some(title) = document.select(&sel).next() {
            snapshot.title = text_of(&title, 300);
        }
    }

    if let Some(sel) = selector("a[href], a[onclick]") {
        snapshot.links = document
            .select(&sel)
            .filter_map(|a| link_of(&a, page_url))
            .collect();
    }

    if let Some(sel) = selector("iframe[src], embed[src], object[data]") {
        snapshot.iframes = document
            .select(&sel)
            .filter_map(|f| f.value().attr("src").or_else(|| f.value().attr("data")))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| resolve_url(page_url, s))
            .collect();
    }

    snapshot.file_items = select_rows(&document)
        .iter()
        .take(500)
        .map(|row| file_item_of(row, page_url))
        .collect();

    snapshot.material_names = material_names(&document);

    if let Some(sel) = selector("script:not([src])") {
        let scripts: Vec<String> = document
            .select(&sel)
            .map(|s| s.text().collect::<String>())
            .filter(|t| !t.trim().is_empty())
            .take(50)
            .collect();
        snapshot.download_url_patterns = extract_url_templates(&scripts);
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    const COURSE_PAGE: &str = r#"
        <html><head><title>Cálculo I</title>
        <script>function bajar(id){ location.href = '/Descarga.asp?idArchivo=' + id; }</script>
        </head><body>
          <iframe src="/viewer/doc.pdf"></iframe>
          <ul class="file-list">
            <li class="file-item" data-id="7">
              <span class="file-icon"></span>
              <span class="file-name">Lecture 1</span>
              <button onclick="preview(7)">Ver</button>
            </li>
            <li class="file-item" data-id="8">
              <span class="file-name">Guía 2</span>
              <a href="/files/guia2.pdf">Descargar</a>
            </li>
          </ul>
          <a href="/Inicio.asp">Inicio</a>
        </body></html>
    "#;

    #[test]
    fn test_static_snapshot_matches_browser_shape() {
        let snap = snapshot_from_html(COURSE_PAGE, "https://p.edu/Curso.asp?idCurso=1");

        assert_eq!(snap.title, "Cálculo I");
        assert_eq!(snap.iframes, vec!["https://p.edu/viewer/doc.pdf".to_string()]);
        assert_eq!(snap.material_names, vec!["Lecture 1".to_string(), "Guía 2".to_string()]);
        assert_eq!(
            snap.download_url_patterns,
            vec!["/Descarga.asp?idArchivo=".to_string()]
        );

        assert_eq!(snap.file_items.len(), 2);
        let first = &snap.file_items[0];
        assert_eq!(first.data_id.as_deref(), Some("7"));
        assert!(first.links.is_empty());
        assert_eq!(first.buttons.len(), 1);
        assert_eq!(first.buttons[0].action, "preview(7)");

        let second = &snap.file_items[1];
        assert_eq!(second.links[0].href, "https://p.edu/files/guia2.pdf");
        assert_eq!(second.links[0].data_id.as_deref(), Some("8"));

        assert!(snap.links.iter().any(|l| l.href == "https://p.edu/Inicio.asp"));
        assert!(snap.network_requests.is_empty());
    }
}
