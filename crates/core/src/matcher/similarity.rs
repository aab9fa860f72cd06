//! String similarity primitives.

use std::collections::HashSet;

/// Ratcliff/Obershelp similarity of two strings in `[0.0, 1.0]`.
///
/// `2 * M / (|a| + |b|)` where `M` counts the characters of the matching
/// blocks found by repeatedly taking the longest common substring (earliest
/// on ties) and recursing on both sides of it. Two empty strings are
/// identical.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(&a, &b) as f64 / total as f64
}

fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_match(a, b, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }

    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, size)`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut best = (alo, blo, 0);
    // prev[k] holds the length of the common suffix ending at a[i-1], b[blo+k-1]
    let mut prev = vec![0usize; bhi - blo + 1];

    for i in alo..ahi {
        let mut current = vec![0usize; bhi - blo + 1];
        for j in blo..bhi {
            if a[i] == b[j] {
                let k = prev[j - blo] + 1;
                current[j - blo + 1] = k;
                if k > best.2 {
                    best = (i + 1 - k, j + 1 - k, k);
                }
            }
        }
        prev = current;
    }

    best
}

/// Jaccard similarity of the whitespace-separated word sets.
pub fn word_jaccard(a: &str, b: &str) -> f64 {
    let a: HashSet<&str> = a.split_whitespace().collect();
    let b: HashSet<&str> = b.split_whitespace().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_identical_strings() {
        assert!(approx(similarity_ratio("dune", "dune"), 1.0));
        assert!(approx(similarity_ratio("", ""), 1.0));
    }

    #[test]
    fn test_disjoint_strings() {
        assert!(approx(similarity_ratio("abc", "xyz"), 0.0));
        assert!(approx(similarity_ratio("abc", ""), 0.0));
    }

    #[test]
    fn test_known_ratios() {
        // One block "bcd": 2 * 3 / 8
        assert!(approx(similarity_ratio("abcd", "bcde"), 0.75));
        // Blocks "a" and "c": 2 * 2 / 6
        assert!(approx(similarity_ratio("abc", "axc"), 2.0 * 2.0 / 6.0));
        // Blocks "dune" and ".epub"
        assert!(approx(
            similarity_ratio("dune.epub", "dune-x.epub"),
            2.0 * 9.0 / 20.0
        ));
    }

    #[test]
    fn test_ratio_is_symmetric_for_simple_inputs() {
        let a = "frank herbert dune";
        let b = "dune frank herbert";
        assert!(approx(similarity_ratio(a, b), similarity_ratio(b, a)));
    }

    #[test]
    fn test_unicode_characters_count_once() {
        assert!(approx(similarity_ratio("café", "café"), 1.0));
        assert!(approx(similarity_ratio("é", "e"), 0.0));
    }

    #[test]
    fn test_word_jaccard() {
        assert!(approx(word_jaccard("the left hand", "the left hand"), 1.0));
        assert!(approx(word_jaccard("a b", "b c"), 1.0 / 3.0));
        assert!(approx(word_jaccard("", ""), 0.0));
    }
}
