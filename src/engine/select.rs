use std::collections::HashMap;

use tracing::debug;

use crate::models::CandidateMatch;

/// Pick the pending candidate with the strictly highest score.
///
/// Ties keep the first one seen. Candidates that are not pending play no part,
/// not even in ties. Returns `None` when nothing is pending.
pub fn best_match(candidates: &[CandidateMatch]) -> Option<&CandidateMatch> {
    let mut best: Option<&CandidateMatch> = None;

    for candidate in candidates {
        debug!(
            path = %candidate.file_path,
            component = %candidate.component_id,
            score = candidate.score,
            status = ?candidate.status,
            "evaluating code match"
        );

        if !candidate.is_pending() {
            continue;
        }
        if best.map_or(true, |b| candidate.score > b.score) {
            best = Some(candidate);
        }
    }

    best
}

/// Group candidates by file path, keeping each group in input order.
pub fn group_by_path(candidates: Vec<CandidateMatch>) -> HashMap<String, Vec<CandidateMatch>> {
    let mut groups: HashMap<String, Vec<CandidateMatch>> = HashMap::new();
    for candidate in candidates {
        groups
            .entry(candidate.file_path.clone())
            .or_default()
            .push(candidate);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highest_pending_score_wins() {
        let candidates = vec![
            CandidateMatch::new("/a.c", "zlib", 40),
            CandidateMatch::new("/a.c", "openssl", 85),
            CandidateMatch::new("/a.c", "libpng", 60),
        ];
        assert_eq!(best_match(&candidates).unwrap().component_id, "openssl");
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let candidates = vec![
            CandidateMatch::new("/a.c", "zlib", 30),
            CandidateMatch::new("/a.c", "openssl", 70),
            CandidateMatch::new("/a.c", "libpng", 70),
        ];
        assert_eq!(best_match(&candidates).unwrap().component_id, "openssl");
    }

    #[test]
    fn test_identified_candidates_ignored_even_for_ties() {
        let candidates = vec![
            CandidateMatch::new("/a.c", "zlib", 90).identified(),
            CandidateMatch::new("/a.c", "openssl", 50),
            CandidateMatch::new("/a.c", "libpng", 50),
        ];
        assert_eq!(best_match(&candidates).unwrap().component_id, "openssl");
    }

    #[test]
    fn test_no_pending_means_no_selection() {
        let candidates = vec![
            CandidateMatch::new("/a.c", "zlib", 90).identified(),
            CandidateMatch::new("/a.c", "openssl", 50).identified(),
        ];
        assert!(best_match(&candidates).is_none());
        assert!(best_match(&[]).is_none());
    }

    #[test]
    fn test_zero_score_pending_is_still_selected() {
        let candidates = vec![CandidateMatch::new("/a.c", "zlib", 0)];
        assert_eq!(best_match(&candidates).unwrap().component_id, "zlib");
    }

    #[test]
    fn test_group_by_path_keeps_order_within_group() {
        let groups = group_by_path(vec![
            CandidateMatch::new("/a.c", "zlib", 10),
            CandidateMatch::new("/b.c", "zlib", 20),
            CandidateMatch::new("/a.c", "openssl", 30),
        ]);
        let a: Vec<_> = groups["/a.c"].iter().map(|c| c.component_id.as_str()).collect();
        assert_eq!(a, vec!["zlib", "openssl"]);
        assert_eq!(groups["/b.c"].len(), 1);
    }
}
