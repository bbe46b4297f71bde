//! Helpers shared by the voting-style operators.

/// Normalize an answer for equivalence grouping: trim, collapse whitespace
/// runs to single spaces, lowercase.
pub fn normalize_answer(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Pick the representative of the largest equivalence class under
/// [`normalize_answer`]. Candidates are expected in arrival order; ties
/// between classes go to the class seen first, and the representative is
/// the earliest member of the winning class.
pub fn majority_vote(candidates: &[String]) -> Option<String> {
    // key, count, index of first member
    let mut classes: Vec<(String, usize, usize)> = Vec::new();
    for (idx, candidate) in candidates.iter().enumerate() {
        let key = normalize_answer(candidate);
        match classes.iter_mut().find(|(k, _, _)| *k == key) {
            Some(entry) => entry.1 += 1,
            None => classes.push((key, 1, idx)),
        }
    }
    classes
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)))
        .map(|(_, _, idx)| candidates[idx].clone())
}
