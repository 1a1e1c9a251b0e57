//! Normalized-Levenshtein fuzzy title matching shared by the iTunes (C6) and
//! Archive (C8) scoring passes.

use std::collections::HashMap;
use std::sync::Mutex;

const MEMO_CAP: usize = 1_000;
const LONG_STRING_CUTOFF: usize = 50;

static MEMO: Mutex<Option<HashMap<(String, String), f64>>> = Mutex::new(None);

/// Case-fold, strip accents and punctuation, collapse whitespace.
pub fn normalize(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_was_space = false;
    for ch in title.chars() {
        let folded = strip_accent(ch.to_ascii_lowercase());
        if folded.is_alphanumeric() {
            out.push(folded);
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim().to_string()
}

fn strip_accent(ch: char) -> char {
    match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

/// Normalized Levenshtein similarity in `[0, 1]`, per §4.6: exact-normalized
/// equality is 1.0, substring containment is 0.85, and strings longer than
/// [`LONG_STRING_CUTOFF`] chars fall back to a flat 0.5 to bound the edit-
/// distance cost. Results are memoized in a small bounded cache.
pub fn fuzzy_match(a: &str, b: &str) -> f64 {
    let na = normalize(a);
    let nb = normalize(b);
    if na == nb {
        return 1.0;
    }
    if na.contains(&nb) || nb.contains(&na) {
        return 0.85;
    }
    if na.len() > LONG_STRING_CUTOFF || nb.len() > LONG_STRING_CUTOFF {
        return 0.5;
    }

    let key = if na <= nb { (na, nb) } else { (nb, na) };
    if let Some(score) = memo_get(&key) {
        return score;
    }
    let score = strsim::normalized_levenshtein(&key.0, &key.1);
    memo_put(key, score);
    score
}

fn memo_get(key: &(String, String)) -> Option<f64> {
    let guard = MEMO.lock().unwrap();
    guard.as_ref()?.get(key).copied()
}

fn memo_put(key: (String, String), score: f64) {
    let mut guard = MEMO.lock().unwrap();
    let map = guard.get_or_insert_with(HashMap::new);
    if map.len() >= MEMO_CAP {
        map.clear();
    }
    map.insert(key, score);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_normalized_match_is_one() {
        assert_eq!(fuzzy_match("The Matrix", "the   matrix!"), 1.0);
    }

    #[test]
    fn substring_containment_is_85() {
        assert_eq!(fuzzy_match("Matrix", "The Matrix Reloaded"), 0.85);
    }

    #[test]
    fn dissimilar_strings_score_low() {
        let score = fuzzy_match("Inception", "Paddington");
        assert!(score < 0.5, "expected low similarity, got {score}");
    }

    #[test]
    fn long_strings_fall_back_to_half() {
        let long = "a".repeat(60);
        let other = "b".repeat(60);
        assert_eq!(fuzzy_match(&long, &other), 0.5);
    }
}
