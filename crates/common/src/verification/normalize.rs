//! Text normalization applied to quotes and source text before matching
//!
//! Quote variants fold to ASCII, case folds, whitespace runs collapse to a
//! single space, and leading/trailing punctuation is stripped. The output
//! is a fixed point: normalizing it again returns it unchanged.

/// Normalize a quote or source text for comparison
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars() {
        let ch = fold_quote(ch);
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.extend(ch.to_lowercase());
    }

    out.trim_matches(|c: char| c.is_whitespace() || is_edge_punctuation(c))
        .to_string()
}

/// Fold straight/curly single and double quote variants to `'` and `"`
pub fn fold_quote(ch: char) -> char {
    match ch {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' | '\u{0060}' | '\u{00B4}' => '\'',
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' | '\u{00AB}' | '\u{00BB}' => '"',
        other => other,
    }
}

fn is_edge_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(
            c,
            '\u{2026}' // …
                | '\u{2014}' // —
                | '\u{2013}' // –
                | '\u{00A1}' // ¡
                | '\u{00BF}' // ¿
                | '\u{2039}' // ‹
                | '\u{203A}' // ›
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folds_quotes_and_case() {
        assert_eq!(normalize("It\u{2019}s \u{201C}Broken\u{201D}"), "it's \"broken");
        assert_eq!(normalize("Don't"), normalize("Don\u{2019}t"));
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(normalize("the   app\n\tcrashes"), "the app crashes");
        assert_eq!(normalize("  padded\u{00A0}text  "), "padded text");
    }

    #[test]
    fn test_strips_edge_punctuation() {
        assert_eq!(normalize("\"The app crashes daily.\""), "the app crashes daily");
        assert_eq!(normalize("...and then it froze\u{2026}"), "and then it froze");
        assert_eq!(normalize("wait, what?! "), "wait, what");
    }

    #[test]
    fn test_keeps_inner_punctuation() {
        assert_eq!(normalize("slow... really slow"), "slow... really slow");
    }

    #[test]
    fn test_empty_and_punctuation_only() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \n "), "");
        assert_eq!(normalize("!!! ..."), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "  \u{201C}The App\u{2019}s   login\tis SLOW!!\u{201D} ",
            "...trailing ellipsis\u{2026}",
            "- leading dash \u{2014} and em-dash \u{2014}",
            "\u{0130}stanbul users say \"meh\"",
            "mixed ' \" \u{2018} quotes '",
            "",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", sample);
        }
    }
}
