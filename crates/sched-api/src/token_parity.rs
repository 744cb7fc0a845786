//! Deterministic token-parity comparison between two decoding backends.
//! Grounded on the Python runtime's token-parity checker; the subprocess
//! orchestration that actually drives two model backends is out of scope
//! here (no model execution in this crate) — this module only covers the
//! comparison and signing of already-produced token-id sequences.

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FirstMismatch {
    pub index: usize,
    pub len_a: usize,
    pub len_b: usize,
    pub preview_a: Vec<i32>,
    pub preview_b: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SetResult {
    pub name: String,
    pub backend_a: String,
    pub backend_b: String,
    #[serde(rename = "match")]
    pub is_match: bool,
    pub mismatch_count: usize,
    pub signature_a: String,
    pub signature_b: String,
    pub duration_a_s: f64,
    pub duration_b_s: f64,
    pub first_mismatch: Option<FirstMismatch>,
}

/// Order- and length-sensitive signature over a batch of token-id
/// sequences: each sequence contributes its length (4 little-endian bytes)
/// followed by each token id (4 little-endian bytes, twos-complement).
pub fn token_list_signature(token_lists: &[Vec<i32>]) -> String {
    let mut hasher = Sha256::new();
    for ids in token_lists {
        hasher.update((ids.len() as u32).to_le_bytes());
        for token in ids {
            hasher.update(token.to_le_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

pub fn compare_token_sets(
    name: &str,
    backend_a: &str,
    backend_b: &str,
    out_a: &[Vec<i32>],
    out_b: &[Vec<i32>],
    duration_a_s: f64,
    duration_b_s: f64,
) -> SetResult {
    let mut mismatch_count = 0;
    let mut first_mismatch = None;
    for (idx, (a, b)) in out_a.iter().zip(out_b.iter()).enumerate() {
        if a != b {
            mismatch_count += 1;
            if first_mismatch.is_none() {
                first_mismatch = Some(FirstMismatch {
                    index: idx,
                    len_a: a.len(),
                    len_b: b.len(),
                    preview_a: a.iter().take(16).copied().collect(),
                    preview_b: b.iter().take(16).copied().collect(),
                });
            }
        }
    }
    SetResult {
        name: name.to_string(),
        backend_a: backend_a.to_string(),
        backend_b: backend_b.to_string(),
        is_match: mismatch_count == 0,
        mismatch_count,
        signature_a: token_list_signature(out_a),
        signature_b: token_list_signature(out_b),
        duration_a_s,
        duration_b_s,
        first_mismatch,
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TokenParityReport {
    pub timestamp_utc: String,
    pub backend_a: String,
    pub backend_b: String,
    pub sets: Vec<SetResult>,
    pub parity_passed: bool,
}

pub fn build_report(backend_a: &str, backend_b: &str, sets: Vec<SetResult>, now: chrono::DateTime<chrono::Utc>) -> TokenParityReport {
    let parity_passed = sets.iter().all(|s| s.is_match);
    TokenParityReport {
        timestamp_utc: now.to_rfc3339(),
        backend_a: backend_a.to_string(),
        backend_b: backend_b.to_string(),
        sets,
        parity_passed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_token_lists_match_with_zero_mismatches() {
        let a = vec![vec![1, 2, 3], vec![4, 5]];
        let b = a.clone();
        let result = compare_token_sets("text_prompts", "python", "rust_hotpath", &a, &b, 1.0, 0.8);
        assert!(result.is_match);
        assert_eq!(result.mismatch_count, 0);
        assert_eq!(result.signature_a, result.signature_b);
        assert!(result.first_mismatch.is_none());
    }

    #[test]
    fn divergent_token_lists_record_first_mismatch_index_and_preview() {
        let a = vec![vec![1, 2, 3], vec![4, 5]];
        let b = vec![vec![1, 2, 3], vec![4, 9]];
        let result = compare_token_sets("token_prompts", "python", "rust_hotpath", &a, &b, 1.0, 1.0);
        assert!(!result.is_match);
        assert_eq!(result.mismatch_count, 1);
        let mismatch = result.first_mismatch.unwrap();
        assert_eq!(mismatch.index, 1);
        assert_eq!(mismatch.preview_a, vec![4, 5]);
        assert_eq!(mismatch.preview_b, vec![4, 9]);
    }

    #[test]
    fn signature_is_sensitive_to_sequence_length_not_just_contents() {
        let a = token_list_signature(&[vec![1, 2]]);
        let b = token_list_signature(&[vec![1], vec![2]]);
        assert_ne!(a, b);
    }

    #[test]
    fn report_passes_only_when_every_set_matches() {
        let matching = SetResult {
            name: "a".into(), backend_a: "x".into(), backend_b: "y".into(), is_match: true,
            mismatch_count: 0, signature_a: "s".into(), signature_b: "s".into(),
            duration_a_s: 1.0, duration_b_s: 1.0, first_mismatch: None,
        };
        let mut failing = matching.clone();
        failing.is_match = false;
        let now = chrono::Utc::now();
        assert!(build_report("x", "y", vec![matching.clone()], now).parity_passed);
        assert!(!build_report("x", "y", vec![matching, failing], now).parity_passed);
    }
}
