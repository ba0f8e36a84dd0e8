//! Label normalization and fuzzy text comparison used by the resolver.

/// Shortest token allowed to match a longer token by prefix ("bachelor" ~ "bachelors").
const MIN_PREFIX_TOKEN: usize = 4;

/// Credit for a token that only matches by prefix ("niger" ~ "nigeria").
const PREFIX_TOKEN_CREDIT: f64 = 0.75;

/// Highest score anything short of normalized equality can reach.
const INEXACT_CEILING: f64 = 0.95;

/// Lowercase, drop apostrophes, turn other punctuation into spaces and
/// collapse runs of whitespace.
pub fn normalize(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            cleaned.extend(ch.to_lowercase());
        } else if ch == '\'' || ch == '\u{2019}' {
            continue;
        } else {
            cleaned.push(' ');
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when `phrase` equals `label` or occurs in it on word boundaries.
/// Both sides must already be normalized.
pub fn contains_phrase(label: &str, phrase: &str) -> bool {
    if phrase.is_empty() || label.is_empty() {
        return false;
    }
    format!(" {label} ").contains(&format!(" {phrase} "))
}

/// Similarity in `[0, 1]` between two normalized strings: the better of a
/// prefix-tolerant token overlap and a Levenshtein ratio. Only equal strings
/// score 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    token_overlap(a, b)
        .max(levenshtein_ratio(a, b))
        .min(INEXACT_CEILING)
}

/// Overlap coefficient over whitespace tokens: credit for the tokens of the
/// smaller set found in the larger one, divided by its size. Equal tokens
/// earn full credit, prefix matches partial credit.
fn token_overlap(a: &str, b: &str) -> f64 {
    let a_tokens: Vec<&str> = a.split(' ').collect();
    let b_tokens: Vec<&str> = b.split(' ').collect();
    let (small, large) = if a_tokens.len() <= b_tokens.len() {
        (a_tokens, b_tokens)
    } else {
        (b_tokens, a_tokens)
    };

    let credit: f64 = small
        .iter()
        .map(|t| large.iter().map(|u| token_credit(t, u)).fold(0.0, f64::max))
        .sum();
    credit / small.len() as f64
}

fn token_credit(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if shorter.chars().count() >= MIN_PREFIX_TOKEN && longer.starts_with(shorter) {
        PREFIX_TOKEN_CREDIT
    } else {
        0.0
    }
}

/// `1 - distance / longest`; used to break ties between equally similar options.
pub fn levenshtein_ratio(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(a, b) as f64 / longest as f64
}

/// Edit distance with a single rolling row.
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut row: Vec<usize> = (0..=b_chars.len()).collect();
    for (i, ca) in a_chars.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            let next = (row[j] + 1).min(row[j + 1] + 1).min(diagonal + cost);
            diagonal = row[j + 1];
            row[j + 1] = next;
        }
    }
    row[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("  E-mail   Address: "), "e mail address");
        assert_eq!(normalize("Master's Degree"), "masters degree");
        assert_eq!(normalize("What is your greatest strength?"), "what is your greatest strength");
        assert_eq!(normalize("***"), "");
    }

    #[test]
    fn phrase_matching_respects_word_boundaries() {
        assert!(contains_phrase("email address", "email"));
        assert!(contains_phrase("your first name", "first name"));
        assert!(!contains_phrase("username", "name"));
        assert!(!contains_phrase("", "name"));
        assert!(!contains_phrase("name", ""));
    }

    #[test]
    fn levenshtein_distance_basics() {
        assert_eq!(levenshtein_distance("test", "test"), 0);
        assert_eq!(levenshtein_distance("test", "tests"), 1);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
    }

    #[test]
    fn similarity_prefers_shared_tokens() {
        let masters = similarity("masters degree", "masters");
        let phd = similarity("masters degree", "phd");
        let bachelors = similarity("masters degree", "bachelors");
        assert_eq!(masters, INEXACT_CEILING);
        assert!(phd < 0.3, "phd scored {phd}");
        assert!(bachelors < 0.6, "bachelors scored {bachelors}");
    }

    #[test]
    fn similarity_tolerates_plural_prefixes() {
        let bachelors = similarity("bachelor of science", "bachelors");
        assert!((0.6..1.0).contains(&bachelors), "bachelors scored {bachelors}");
        assert_eq!(similarity("", "anything"), 0.0);
        assert!(similarity("united states", "united kingdom") < 0.6);
    }

    #[test]
    fn only_equal_strings_score_full_marks() {
        assert_eq!(similarity("nigeria", "nigeria"), 1.0);
        assert!(similarity("nigeria", "niger") < 1.0);
        assert!(similarity("java", "javascript") < 1.0);
        assert!(similarity("west virginia", "virginia") < 1.0);
        assert!(similarity("nigeria", "niger") < similarity("nigeria", "nigeria"));
    }
}
