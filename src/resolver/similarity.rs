//! Name normalisation and fuzzy similarity scoring.
//!
//! Sheet headers and cells are typed by hand, so entity names arrive with
//! case drift, stray punctuation, doubled spaces and the occasional emoji.
//! Every comparison in the resolver goes through [`normalize_name`] first;
//! [`similarity`] then scores two normalised names, and only scores strictly
//! above [`MATCH_THRESHOLD`] count as a fuzzy match.

/// A fuzzy candidate is accepted only when its score is strictly above this.
pub const MATCH_THRESHOLD: f64 = 0.7;

/// A word pair counts toward word overlap when its character similarity is
/// above this. Keeps "Woodall"/"Woodbell" together while "John"/"Jane"
/// stay apart.
const WORD_MATCH_THRESHOLD: f64 = 0.6;

/// Lowercase, strip punctuation and emoji, collapse internal whitespace.
pub fn normalize_name(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    kept.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Positional character similarity between two words:
/// `1 - (mismatches at shared positions + length delta) / max length`.
fn char_similarity(a: &str, b: &str) -> f64 {
    let av: Vec<char> = a.chars().collect();
    let bv: Vec<char> = b.chars().collect();
    let max_len = av.len().max(bv.len());
    if max_len == 0 {
        return 0.0;
    }
    let mismatches = av
        .iter()
        .zip(bv.iter())
        .filter(|(x, y)| x != y)
        .count();
    let delta = av.len().abs_diff(bv.len());
    let penalty = (mismatches + delta) as f64 / max_len as f64;
    (1.0 - penalty).max(0.0)
}

/// Score two raw names. 1.0 for equality after normalisation, 0.9 for
/// substring containment, otherwise a blend of word overlap (0.6) and the
/// best per-word character similarity (0.4). Character comparison only
/// applies to word pairs where both words have at least 3 characters.
pub fn similarity(a: &str, b: &str) -> f64 {
    let na = normalize_name(a);
    let nb = normalize_name(b);
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na == nb {
        return 1.0;
    }
    if na.contains(&nb) || nb.contains(&na) {
        return 0.9;
    }

    let wa: Vec<&str> = na.split(' ').collect();
    let wb: Vec<&str> = nb.split(' ').collect();

    let mut matched_words = 0usize;
    let mut best_char_sim = 0.0f64;

    for w1 in &wa {
        let mut word_best = 0.0f64;
        for w2 in &wb {
            let score = if w1 == w2 {
                1.0
            } else if w1.chars().count() >= 3 && w2.chars().count() >= 3 {
                char_similarity(w1, w2)
            } else {
                0.0
            };
            if score > word_best {
                word_best = score;
            }
        }
        if word_best > WORD_MATCH_THRESHOLD {
            matched_words += 1;
        }
        if word_best > best_char_sim {
            best_char_sim = word_best;
        }
    }

    let overlap = matched_words as f64 / wa.len().max(wb.len()) as f64;
    0.6 * overlap + 0.4 * best_char_sim
}
