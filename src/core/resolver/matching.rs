// ─── Fuzzy name matching ───
// Maps a human-entered mod name onto a registry slug by scoring
// candidate hits. Exact beats normalized beats prefix beats substring.

use crate::core::registry::SearchHit;

/// Scores at or above this are accepted without surfacing alternatives.
pub const CONFIDENT_SCORE: u32 = 60;

/// Normalize a term for fuzzy comparison: lowercase, then keep only
/// ASCII alphanumerics ("Dynamic FPS" -> "dynamicfps").
pub fn normalize(term: &str) -> String {
    term.chars()
        .filter_map(|c| {
            let c = c.to_ascii_lowercase();
            c.is_ascii_alphanumeric().then_some(c)
        })
        .collect()
}

/// Match score between a search term and one candidate; higher is
/// better, 0 means no relation. The first rule that fires controls:
///
///   100  exact slug
///    90  exact title (case-insensitive)
///    80  normalized slug
///    70  normalized title
///    60  slug prefix
///    50  title prefix
///    40  slug substring
///    30  title substring
///    20  normalized slug substring
///    10  normalized title substring
pub fn match_score(term: &str, slug: &str, title: &str) -> u32 {
    let term_lower = term.to_lowercase();
    let term_norm = normalize(term);

    let slug_lower = slug.to_lowercase();
    let slug_norm = normalize(slug);

    let title_lower = title.to_lowercase();
    let title_norm = normalize(title);

    if term == slug {
        return 100;
    }
    if !title_lower.is_empty() && term_lower == title_lower {
        return 90;
    }
    if term_norm == slug_norm {
        return 80;
    }
    if !title_norm.is_empty() && term_norm == title_norm {
        return 70;
    }
    if slug_lower.starts_with(&term_lower) {
        return 60;
    }
    if !title_lower.is_empty() && title_lower.starts_with(&term_lower) {
        return 50;
    }
    if slug_lower.contains(&term_lower) {
        return 40;
    }
    if !title_lower.is_empty() && title_lower.contains(&term_lower) {
        return 30;
    }
    if slug_norm.contains(&term_norm) {
        return 20;
    }
    if !title_norm.is_empty() && title_norm.contains(&term_norm) {
        return 10;
    }

    0
}

/// Pick the best-scoring hit. Ties keep the earlier (higher-ranked)
/// hit; a result is only produced when some hit scores above 0.
pub fn best_match<'a>(term: &str, hits: &'a [SearchHit]) -> Option<(&'a SearchHit, u32)> {
    let mut best: Option<(&SearchHit, u32)> = None;

    for hit in hits {
        let score = match_score(term, &hit.slug, &hit.title);
        if score > best.map_or(0, |(_, s)| s) {
            best = Some((hit, score));
        }
    }

    best
}
