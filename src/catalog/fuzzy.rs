// src/catalog/fuzzy.rs
//
// Fuzzy ranking for catalog lookups that missed.
//
// Score(query, candidate) blends name similarity with category, package
// and pattern signals, weighted {40, 20, 15, 25}. Candidates scoring
// >= 50 of 100 survive; auto-fix suggestions additionally require a
// normalized score >= 0.9.

/// Edit-distance computations bail out past this distance.
pub const MAX_EDIT_DISTANCE: usize = 5;

/// Minimum blended score (of 100) for a fuzzy hit to be reported.
pub const MIN_FUZZY_SCORE: f64 = 50.0;

/// Normalized score an auto-fix suggestion must reach.
pub const AUTOFIX_SUGGESTION_THRESHOLD: f64 = 0.9;

const W_NAME: f64 = 40.0;
const W_CATEGORY: f64 = 20.0;
const W_PACKAGE: f64 = 15.0;
const W_PATTERN: f64 = 25.0;

/// A catalog row projected to the fields fuzzy matching needs.
#[derive(Debug, Clone)]
pub struct FuzzyCandidate {
    pub node_type: String,
    pub display_name: String,
    pub category: String,
    pub package: String,
}

impl FuzzyCandidate {
    /// The short name after the package prefix ("httpRequest").
    pub fn short_name(&self) -> &str {
        self.node_type
            .rsplit('.')
            .next()
            .unwrap_or(&self.node_type)
    }
}

/// Levenshtein distance with an early exit: returns None as soon as the
/// minimum achievable distance exceeds `max`. Classic two-row DP.
pub fn levenshtein_bounded(a: &str, b: &str, max: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.len().abs_diff(b.len()) > max {
        return None;
    }
    if a.is_empty() {
        return (b.len() <= max).then_some(b.len());
    }
    if b.is_empty() {
        return (a.len() <= max).then_some(a.len());
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        let mut row_min = cur[0];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
            row_min = row_min.min(cur[j + 1]);
        }
        if row_min > max {
            return None;
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    (prev[b.len()] <= max).then_some(prev[b.len()])
}

/// 1 - dist/max(len), case-insensitive; 0 when the bounded distance bails.
pub fn name_similarity(query: &str, candidate: &str) -> f64 {
    let q = query.to_lowercase();
    let c = candidate.to_lowercase();
    if q == c {
        return 1.0;
    }
    let max_len = q.chars().count().max(c.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    match levenshtein_bounded(&q, &c, MAX_EDIT_DISTANCE) {
        Some(dist) => 1.0 - dist as f64 / max_len as f64,
        None => 0.0,
    }
}

/// Blended 0..100 score of a candidate against a raw user query.
pub fn score(query: &str, candidate: &FuzzyCandidate) -> f64 {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return 0.0;
    }
    let short = candidate.short_name().to_lowercase();
    let display = candidate.display_name.to_lowercase();

    // Short queries are dominated by edit distance against common
    // trigrams; require a substring relationship before scoring at all.
    if q.chars().count() <= 5 && !short.contains(&q) && !display.contains(&q) {
        return 0.0;
    }

    // When the query carries a package prefix ("nodes-base.htpRequest"),
    // match its segments separately.
    let (q_package, q_name) = match q.rsplit_once('.') {
        Some((pkg, name)) => (Some(pkg.to_string()), name.to_string()),
        None => (None, q.clone()),
    };

    let name_sim = name_similarity(&q_name, &short).max(name_similarity(&q_name, &display));

    let category = candidate.category.to_lowercase();
    let category_match = if !category.is_empty() && (category.contains(&q) || q.contains(&category))
    {
        1.0
    } else {
        0.0
    };

    let package = candidate.package.to_lowercase();
    let package_match = if package.is_empty() {
        0.0
    } else {
        match &q_package {
            Some(qp) => {
                if package.contains(qp.as_str()) || qp.contains(&package) {
                    1.0
                } else {
                    0.0
                }
            }
            None => {
                if q.contains(&package) {
                    1.0
                } else {
                    0.0
                }
            }
        }
    };

    // Graded: exact containment beats a shared prefix beats nothing.
    let pattern_match = if short.contains(&q_name) || q_name.contains(&short) {
        1.0
    } else {
        common_prefix_ratio(&q_name, &short)
    };

    W_NAME * name_sim
        + W_CATEGORY * category_match
        + W_PACKAGE * package_match
        + W_PATTERN * pattern_match
}

/// Shared-prefix length over the longer name, 0..1.
fn common_prefix_ratio(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    let shared = a
        .chars()
        .zip(b.chars())
        .take_while(|(ca, cb)| ca == cb)
        .count();
    shared as f64 / max_len as f64
}

/// The similarity an auto-fix suggestion is judged by: plain edit-distance
/// similarity of the short names (or display name, whichever is closer),
/// normalized 0..1. Suggestions need >= 0.9 here before the auto-fix
/// engine will act on them.
pub fn suggestion_similarity(query: &str, candidate: &FuzzyCandidate) -> f64 {
    let q = query
        .rsplit('.')
        .next()
        .unwrap_or(query)
        .trim()
        .to_lowercase();
    if q.is_empty() {
        return 0.0;
    }
    name_similarity(&q, candidate.short_name())
        .max(name_similarity(&q, &candidate.display_name))
}
