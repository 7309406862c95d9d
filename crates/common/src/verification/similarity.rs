//! Approximate substring similarity
//!
//! Scores how closely a quote matches its best-aligned span of a source
//! text, so minor drift (a dropped word, a typo, a truncation) can be told
//! apart from invented text.

/// `1 - d / len(needle)` where `d` is the minimum edit distance between
/// `needle` and any substring of `haystack`. Exact substrings score 1.0.
///
/// Semi-global alignment: the haystack may be entered and left at any
/// position for free, so only the edits inside the aligned span count.
pub fn approximate_substring_score(needle: &str, haystack: &str) -> f64 {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() {
        return 0.0;
    }
    let n = needle.len();

    // prev[i]: best distance of needle[..i] against a span ending at the previous haystack char
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut cur: Vec<usize> = vec![0; n + 1];
    let mut best = prev[n];

    for hc in haystack.chars() {
        cur[0] = 0;
        for i in 1..=n {
            let substitution = prev[i - 1] + usize::from(needle[i - 1] != hc);
            let deletion = prev[i] + 1;
            let insertion = cur[i - 1] + 1;
            cur[i] = substitution.min(deletion).min(insertion);
        }
        best = best.min(cur[n]);
        if best == 0 {
            break;
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    (1.0 - best as f64 / n as f64).clamp(0.0, 1.0)
}

/// Whether every segment occurs in `haystack`, in order and without overlap
pub fn segments_in_order<'a, I>(segments: I, haystack: &str) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    let mut cursor = 0;
    for segment in segments {
        match haystack[cursor..].find(segment) {
            Some(offset) => cursor += offset + segment.len(),
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_substring_scores_one() {
        assert_eq!(approximate_substring_score("crashes daily", "the app crashes daily"), 1.0);
        assert_eq!(approximate_substring_score("abc", "abc"), 1.0);
    }

    #[test]
    fn test_small_drift_scores_high() {
        // one substituted character out of 22
        let score = approximate_substring_score("the app crashes dailz", "the app crashes daily.");
        assert!(score > 0.9 && score < 1.0, "score = {}", score);

        // one dropped word
        let score = approximate_substring_score(
            "login takes forever on android",
            "login takes forever on my android phone",
        );
        assert!(score > 0.85, "score = {}", score);
    }

    #[test]
    fn test_fabrication_scores_low() {
        let score = approximate_substring_score(
            "pricing is far too expensive for students",
            "the app crashes daily",
        );
        assert!(score < 0.5, "score = {}", score);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(approximate_substring_score("", "anything"), 0.0);
        assert_eq!(approximate_substring_score("abc", ""), 0.0);
    }

    #[test]
    fn test_score_is_bounded() {
        let score = approximate_substring_score("completely different", "xyz");
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_segments_in_order() {
        let text = "the app is slow. after the update it crashes daily";
        assert!(segments_in_order(["the app is slow", "crashes daily"], text));
        assert!(!segments_in_order(["crashes daily", "the app is slow"], text));
        assert!(!segments_in_order(["the app is slow", "never"], text));
    }
}
