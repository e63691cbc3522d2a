/// Weighted min-max fusion of the lexical and semantic legs
///
/// Pure and deterministic: no I/O, no shared state.

use std::collections::HashMap;

/// A fused candidate before hydration. Leg scores are the raw (unnormalized) values.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedScore {
    pub chunk_id: String,
    pub fused_score: f64,
    pub semantic_score: Option<f64>,
    pub lexical_score: Option<f64>,
}

/// Min-max normalize values to [0, 1].
///
/// When every value is equal the list is treated as "all equally relevant" and
/// each member normalizes to 1.0.
pub fn normalize(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return vec![1.0; values.len()];
    }
    values.iter().map(|&v| (v - min) / (max - min)).collect()
}

#[derive(Default)]
struct Entry {
    semantic_norm: f64,
    lexical_norm: f64,
    semantic_raw: Option<f64>,
    lexical_raw: Option<f64>,
}

/// Fuse two `(chunk_id, score)` lists into at most `top_k` candidates.
///
/// Each list is normalized independently. A chunk missing from one list gets 0 for
/// that dimension. `fused = alpha * semantic + (1 - alpha) * lexical`. Output is
/// sorted by fused score descending; ties keep first-seen order (semantic list first).
pub fn fuse_scores(
    semantic: &[(String, f64)],
    lexical: &[(String, f64)],
    alpha: f64,
    top_k: usize,
) -> Vec<FusedScore> {
    let semantic_norm = normalize(&semantic.iter().map(|(_, s)| *s).collect::<Vec<_>>());
    let lexical_norm = normalize(&lexical.iter().map(|(_, s)| *s).collect::<Vec<_>>());

    let mut order: Vec<String> = Vec::new();
    let mut entries: HashMap<String, Entry> = HashMap::new();

    for ((id, raw), norm) in semantic.iter().zip(semantic_norm) {
        let entry = entries.entry(id.clone()).or_insert_with(|| {
            order.push(id.clone());
            Entry::default()
        });
        // Duplicate ids within a leg keep the best score.
        if entry.semantic_raw.map_or(true, |prev| *raw > prev) {
            entry.semantic_raw = Some(*raw);
            entry.semantic_norm = norm;
        }
    }
    for ((id, raw), norm) in lexical.iter().zip(lexical_norm) {
        let entry = entries.entry(id.clone()).or_insert_with(|| {
            order.push(id.clone());
            Entry::default()
        });
        if entry.lexical_raw.map_or(true, |prev| *raw > prev) {
            entry.lexical_raw = Some(*raw);
            entry.lexical_norm = norm;
        }
    }

    let mut fused: Vec<FusedScore> = order
        .into_iter()
        .filter_map(|id| {
            let entry = entries.remove(&id)?;
            Some(FusedScore {
                fused_score: alpha * entry.semantic_norm + (1.0 - alpha) * entry.lexical_norm,
                semantic_score: entry.semantic_raw,
                lexical_score: entry.lexical_raw,
                chunk_id: id,
            })
        })
        .collect();

    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(top_k);
    fused
}
