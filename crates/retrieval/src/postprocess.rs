//! Result post-processing
//!
//! Session aggregation (round-robin diversity across sessions) and
//! deduplication by id and content fingerprint.

use std::collections::{HashMap, HashSet};

use memsearch_core::{sort_results, SearchResultItem};

/// Limit how many results any single session contributes.
///
/// Results are grouped by `session_id`, each group is sorted by score, and
/// groups are drained round-robin up to the effective per-session limit.
/// When fewer than `min_sessions` distinct sessions are present the limit is
/// doubled. Results without a session are appended at the end. The final
/// list is sorted by score descending.
pub fn aggregate_by_session(
    results: Vec<SearchResultItem>,
    max_per_session: usize,
    min_sessions: usize,
) -> Vec<SearchResultItem> {
    if results.is_empty() {
        return Vec::new();
    }

    let mut session_results: HashMap<String, Vec<SearchResultItem>> = HashMap::new();
    let mut session_order: Vec<String> = Vec::new();
    let mut no_session: Vec<SearchResultItem> = Vec::new();

    for result in results {
        match result.session_id().map(str::to_string) {
            Some(session_id) => {
                let entry = session_results.entry(session_id.clone()).or_default();
                if entry.is_empty() {
                    session_order.push(session_id);
                }
                entry.push(result);
            }
            None => no_session.push(result),
        }
    }

    for bucket in session_results.values_mut() {
        sort_results(bucket);
    }

    let num_sessions = session_results.len();
    let effective_limit = if num_sessions < min_sessions {
        max_per_session * 2
    } else {
        max_per_session
    };

    let mut aggregated: Vec<SearchResultItem> = Vec::new();
    let mut indices: HashMap<&str, usize> =
        session_order.iter().map(|s| (s.as_str(), 0)).collect();

    loop {
        let mut added_any = false;
        for session_id in &session_order {
            let bucket = &session_results[session_id];
            let idx = indices[session_id.as_str()];
            if idx < bucket.len().min(effective_limit) {
                aggregated.push(bucket[idx].clone());
                if let Some(next) = indices.get_mut(session_id.as_str()) {
                    *next += 1;
                }
                added_any = true;
            }
        }
        if !added_any {
            break;
        }
    }

    aggregated.extend(no_session);
    sort_results(&mut aggregated);

    tracing::debug!(
        sessions = num_sessions,
        effective_limit,
        aggregated = aggregated.len(),
        "Aggregated results by session"
    );

    aggregated
}

/// Drop duplicate results by id and by content fingerprint.
///
/// Results are sorted by score first so the highest-scored duplicate
/// survives. The fingerprint is the lowercased, stripped first 100
/// characters of the content joined with its full length.
pub fn deduplicate_results(results: Vec<SearchResultItem>) -> Vec<SearchResultItem> {
    if results.is_empty() {
        return Vec::new();
    }

    let mut sorted = results;
    sort_results(&mut sorted);

    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_fingerprints: HashSet<String> = HashSet::new();
    let mut deduplicated = Vec::with_capacity(sorted.len());

    for result in sorted {
        if seen_ids.contains(&result.id) {
            continue;
        }

        let content = result.content();
        if !content.is_empty() {
            let fingerprint = content_fingerprint(content);
            if seen_fingerprints.contains(&fingerprint) {
                continue;
            }
            seen_fingerprints.insert(fingerprint);
        }

        seen_ids.insert(result.id.clone());
        deduplicated.push(result);
    }

    deduplicated
}

fn content_fingerprint(content: &str) -> String {
    let head: String = content.chars().take(100).collect();
    format!("{}_{}", head.trim().to_lowercase(), content.chars().count())
}
