//! Line classifier and quote-line tokenizer
//!
//! A quote line looks like `> "verbatim span" — record_id`.
//! Tokens: marker, quoted span, separator, then free words.

pub(crate) const QUOTE_MARKER: char = '>';

const OPEN_QUOTES: [char; 2] = ['"', '\u{201C}'];
const CLOSE_QUOTES: [char; 2] = ['"', '\u{201D}'];
const SEPARATORS: [char; 3] = ['\u{2014}', '\u{2013}', '-'];

/// Line classification for the block grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Line<'a> {
    Blank,
    /// Starts with the quote marker; carries the text after the marker
    Quote(&'a str),
    Text(&'a str),
}

pub(crate) fn classify(line: &str) -> Line<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        Line::Blank
    } else if let Some(rest) = trimmed.strip_prefix(QUOTE_MARKER) {
        Line::Quote(rest.trim_start_matches(QUOTE_MARKER))
    } else {
        Line::Text(trimmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    /// Text between the opening quote and its closing quote
    Quoted(&'a str),
    /// Opening quote with no closing quote after it
    Unterminated(&'a str),
    Separator,
    Word(&'a str),
}

/// Tokenize the body of a quote line (text after the marker)
pub(crate) fn tokenize(body: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = body.trim_start();

    if let Some(open) = rest.chars().next().filter(|c| OPEN_QUOTES.contains(c)) {
        let inner = &rest[open.len_utf8()..];
        match closing_quote(inner) {
            Some(close) => {
                tokens.push(Token::Quoted(&inner[..close]));
                let close_len = inner[close..].chars().next().map_or(1, char::len_utf8);
                rest = inner[close + close_len..].trim_start();
            }
            None => {
                tokens.push(Token::Unterminated(inner));
                return tokens;
            }
        }

        let after_separator = rest.trim_start_matches(|c: char| SEPARATORS.contains(&c));
        if after_separator.len() != rest.len() {
            tokens.push(Token::Separator);
            rest = after_separator.trim_start();
        }
    }

    tokens.extend(rest.split_whitespace().map(Token::Word));
    tokens
}

/// First closing quote followed by a separator, else the last closing quote
fn closing_quote(inner: &str) -> Option<usize> {
    let is_close = |c: char| CLOSE_QUOTES.contains(&c);
    inner
        .match_indices(is_close)
        .find(|&(at, quote)| {
            inner[at + quote.len()..]
                .trim_start()
                .starts_with(|c: char| SEPARATORS.contains(&c))
        })
        .map(|(at, _)| at)
        .or_else(|| inner.rfind(is_close))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_lines() {
        assert_eq!(classify("   "), Line::Blank);
        assert_eq!(classify("> \"a\" \u{2014} r1"), Line::Quote(" \"a\" \u{2014} r1"));
        assert_eq!(classify(">> nested"), Line::Quote(" nested"));
        assert_eq!(classify("  Users say things. "), Line::Text("Users say things."));
    }

    #[test]
    fn test_tokenize_well_formed_line() {
        let tokens = tokenize(" \"The app crashes daily.\" \u{2014} r1");
        assert_eq!(
            tokens,
            vec![Token::Quoted("The app crashes daily."), Token::Separator, Token::Word("r1")]
        );
    }

    #[test]
    fn test_tokenize_curly_quotes_and_ascii_dashes() {
        let tokens = tokenize(" \u{201C}too slow\u{201D} -- rec_9 (app store)");
        assert_eq!(
            tokens,
            vec![
                Token::Quoted("too slow"),
                Token::Separator,
                Token::Word("rec_9"),
                Token::Word("(app"),
                Token::Word("store)"),
            ]
        );
    }

    #[test]
    fn test_inner_dash_and_quote_kept_in_span() {
        let tokens = tokenize(" \"it's fine \u{2014} mostly \"ok\"\" \u{2014} r2");
        assert_eq!(tokens[0], Token::Quoted("it's fine \u{2014} mostly \"ok\""));
        assert_eq!(tokens[2], Token::Word("r2"));
    }

    #[test]
    fn test_trailing_quoted_note_after_citation() {
        let tokens = tokenize(" \"The app crashes daily.\" \u{2014} r1 (user said \"daily\")");
        assert_eq!(tokens[0], Token::Quoted("The app crashes daily."));
        assert_eq!(tokens[1], Token::Separator);
        assert_eq!(tokens[2], Token::Word("r1"));
    }

    #[test]
    fn test_no_separator_falls_back_to_last_quote() {
        let tokens = tokenize(" \"a \"b\" c\" r1");
        assert_eq!(tokens, vec![Token::Quoted("a \"b\" c"), Token::Word("r1")]);
    }

    #[test]
    fn test_unterminated_and_bare_lines() {
        assert_eq!(tokenize(" \"never closed"), vec![Token::Unterminated("never closed")]);
        assert_eq!(tokenize(" just a note"), vec![Token::Word("just"), Token::Word("a"), Token::Word("note")]);
        assert!(tokenize("").is_empty());
    }
}
