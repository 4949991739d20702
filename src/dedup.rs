//! Merging candidates that point at the same resource.

use std::collections::HashMap;

use crate::identify::heuristics::looks_like_filename;
use crate::models::ExtractedMaterial;
use crate::utils::normalize_url_key;

/// How descriptive a title is: empty, then `name.ext`, then a real label.
fn title_rank(title: &str) -> u8 {
    let title = title.trim();
    if title.is_empty() {
        0
    } else if looks_like_filename(title) {
        1
    } else {
        2
    }
}

/// Whether `candidate` should replace `current`. A more descriptive title
/// wins outright; between equally descriptive titles the more confident
/// candidate wins, then the longer title.
fn prefer(candidate: &ExtractedMaterial, current: &ExtractedMaterial) -> bool {
    let by_title = title_rank(&candidate.title).cmp(&title_rank(&current.title));
    let ordering = by_title
        .then(candidate.confidence.total_cmp(&current.confidence))
        .then(
            candidate
                .title
                .trim()
                .chars()
                .count()
                .cmp(&current.title.trim().chars().count()),
        );
    ordering.is_gt()
}

/// Keep one candidate per normalized URL, at the position it was first seen.
///
/// The survivor is a whole candidate, never a blend of several.
pub fn dedup_materials(materials: Vec<ExtractedMaterial>) -> Vec<ExtractedMaterial> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<ExtractedMaterial> = Vec::new();

    for material in materials {
        let key = normalize_url_key(&material.url);
        match index.get(&key) {
            Some(&i) => {
                if prefer(&material, &merged[i]) {
                    merged[i] = material;
                }
            }
            None => {
                index.insert(key, merged.len());
                merged.push(material);
            }
        }
    }
    merged
}

/// Dedup, then order by confidence (stable for ties).
pub fn rank_materials(materials: Vec<ExtractedMaterial>) -> Vec<ExtractedMaterial> {
    let mut merged = dedup_materials(materials);
    merged.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MaterialSource;

    fn m(url: &str, title: &str, confidence: f32, source: MaterialSource) -> ExtractedMaterial {
        ExtractedMaterial::new(url, title, "pdf", confidence, source)
    }

    #[test]
    fn test_prefers_non_filename_title() {
        let merged = dedup_materials(vec![
            m("https://p.edu/f/guia.pdf", "guia.pdf", 0.9, MaterialSource::Iframe),
            m("https://p.edu/f/guia.pdf/", "Guía 1", 0.8, MaterialSource::Link),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "Guía 1");
        assert_eq!(merged[0].url, "https://p.edu/f/guia.pdf/");
        assert_eq!(merged[0].source, MaterialSource::Link);
        assert!((merged[0].confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_confidence_decides_between_equal_titles() {
        let merged = dedup_materials(vec![
            m("https://p.edu/f/guia.pdf", "guia.pdf", 0.8, MaterialSource::Link),
            m("https://p.edu/f/guia.pdf", "guia.pdf", 0.9, MaterialSource::Iframe),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source, MaterialSource::Iframe);
        assert!((merged[0].confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_longer_title_breaks_ties() {
        let merged = dedup_materials(vec![
            m("https://p.edu/a.pdf", "Guía", 0.8, MaterialSource::Link),
            m("https://p.edu/a.pdf#page=2", "Guía de ejercicios", 0.8, MaterialSource::Link),
            m("https://p.edu/a.pdf", "a.pdf", 0.8, MaterialSource::Link),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "Guía de ejercicios");
    }

    #[test]
    fn test_keeps_distinct_queries_and_order() {
        let merged = dedup_materials(vec![
            m("https://p.edu/d.asp?id=1", "Uno", 0.75, MaterialSource::DataId),
            m("https://p.edu/d.asp?id=2", "Dos", 0.75, MaterialSource::DataId),
            m("https://p.edu/d.asp?id=1", "Uno", 0.95, MaterialSource::PreviewExtract),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].title, "Uno");
        assert_eq!(merged[0].source, MaterialSource::PreviewExtract);
        assert_eq!(merged[1].title, "Dos");
    }

    #[test]
    fn test_rank_orders_by_confidence() {
        let ranked = rank_materials(vec![
            m("https://p.edu/a.pdf", "A", 0.6, MaterialSource::DataId),
            m("https://p.edu/b.pdf", "B", 0.95, MaterialSource::PreviewExtract),
            m("https://p.edu/c.pdf", "C", 0.6, MaterialSource::DataId),
        ]);
        let titles: Vec<&str> = ranked.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "A", "C"]);
    }
}
