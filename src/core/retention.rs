use super::models::Candidate;

/// A snapshot group split by the force-keep policy.
#[derive(Debug, Default)]
pub struct Retained {
    /// The newest candidates, exempt from validation and deletion
    pub kept: Vec<Candidate>,
    /// Everything older, to be validated
    pub eligible: Vec<Candidate>,
}

/// Exempt the `force_keep` lexicographically greatest candidates of one group.
///
/// Apply this per snapshot group, never across groups.
pub fn apply(mut candidates: Vec<Candidate>, force_keep: usize) -> Retained {
    candidates.sort_by(|a, b| a.name.cmp(&b.name));

    let keep = force_keep.min(candidates.len());
    let kept = candidates.split_off(candidates.len() - keep);

    Retained {
        kept,
        eligible: candidates,
    }
}
