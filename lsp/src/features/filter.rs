//! Fuzzy completion filter.
//!
//! Scores each item's filter text against the typed prefix: a prefix match at
//! the start of the word scores highest, then matches at camel-case word
//! starts, then loose subsequence matches. Case-insensitive matches earn half.

use std::cmp::Ordering;

use lsp_types::CompletionItem;

/// Score for an item whose filter text equals the prefix exactly.
const EXACT_SCORE: f64 = 64.0;

/// Items matching `prefix`, best first; ties keep `sortText` order.
///
/// An empty prefix keeps every item.
pub(crate) fn filter_items(prefix: &str, items: Vec<CompletionItem>) -> Vec<CompletionItem> {
    let input: Vec<char> = prefix.chars().collect();

    let mut scored: Vec<(f64, CompletionItem)> = Vec::with_capacity(items.len());
    for item in items {
        let filter_text = item.filter_text.as_deref().unwrap_or(&item.label);
        if filter_text.chars().count() < input.len() {
            continue;
        }

        let mut score = 0.0;
        if !input.is_empty() {
            score = if item.kind.is_some() && filter_text == prefix {
                EXACT_SCORE
            } else {
                match_score(filter_text, &input).unwrap_or(0.0)
            };
            if score <= 0.0 {
                continue;
            }
        }
        scored.push((score, item));
    }

    scored.sort_by(|(score_a, a), (score_b, b)| {
        score_b
            .total_cmp(score_a)
            .then_with(|| by_sort_text(a.sort_text.as_deref(), b.sort_text.as_deref()))
    });
    scored.into_iter().map(|(_, item)| item).collect()
}

fn by_sort_text(a: Option<&str>, b: Option<&str>) -> Ordering {
    a.is_none().cmp(&b.is_none()).then(a.cmp(&b))
}

fn match_score(word: &str, input: &[char]) -> Option<f64> {
    let codes: Vec<char> = word.chars().collect();
    if input.is_empty() || codes.len() < input.len() {
        return None;
    }
    next_score(&codes, 0, input, &[])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaseMatch {
    Exact,
    /// Lowercase input against an uppercase letter.
    Folded,
}

fn case_match(input: char, curr: char) -> Option<CaseMatch> {
    if input == curr {
        Some(CaseMatch::Exact)
    } else if curr.is_ascii_uppercase() && curr.to_ascii_lowercase() == input {
        Some(CaseMatch::Folded)
    } else {
        None
    }
}

fn case_score(input: char, curr: char, divide: f64) -> f64 {
    match case_match(input, curr) {
        Some(CaseMatch::Exact) => 1.0 / divide,
        Some(CaseMatch::Folded) => 0.5 / divide,
        None => 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LetterCase {
    Other,
    Lower,
    Upper,
}

fn letter_case(c: char) -> LetterCase {
    if c.is_ascii_lowercase() {
        LetterCase::Lower
    } else if c.is_ascii_uppercase() {
        LetterCase::Upper
    } else {
        LetterCase::Other
    }
}

/// Start of the next word at or after `index`: the first letter whose case
/// differs from the character before it.
fn next_word(codes: &[char], index: usize) -> Option<(usize, char)> {
    let mut previous = match index {
        0 => LetterCase::Other,
        i => codes.get(i - 1).copied().map_or(LetterCase::Other, letter_case),
    };
    for (i, &c) in codes.iter().enumerate().skip(index) {
        let current = letter_case(c);
        if current != LetterCase::Other && current != previous {
            return Some((i, c));
        }
        previous = current;
    }
    None
}

fn with_position(positions: &[usize], position: usize) -> Vec<usize> {
    let mut next = positions.to_vec();
    next.push(position);
    next
}

fn next_score(codes: &[char], index: usize, input: &[char], positions: &[usize]) -> Option<f64> {
    let Some((&first, rest)) = input.split_first() else {
        return Some(0.0);
    };
    if index >= codes.len() {
        return None;
    }

    if !first.is_ascii_alphabetic() {
        let found = codes[index..].iter().position(|&c| c == first)? + index;
        let score = if found == 0 { 5.0 } else { 1.0 };
        return next_score(codes, found + 1, rest, &with_position(positions, found))
            .map(|next| score + next);
    }

    let is_start = positions.is_empty();
    let score = case_score(first, codes[index], if is_start { 0.2 } else { 1.0 });
    if score > 0.0 {
        return next_score(codes, index + 1, rest, &with_position(positions, index))
            .map(|next| score + next);
    }

    let mut best: Option<f64> = None;
    let mut consider = |candidate: f64| {
        best = Some(best.map_or(candidate, |b| b.max(candidate)));
    };

    if let Some((word_start, word_char)) = next_word(codes, index + 1)
        && let Some(kind) = case_match(first, word_char)
    {
        let score = match (kind, is_start) {
            (CaseMatch::Exact, true) => 2.0,
            (CaseMatch::Folded, true) | (CaseMatch::Exact, false) => 1.0,
            (CaseMatch::Folded, false) => 0.75,
        };
        if let Some(next) = next_score(
            codes,
            word_start + 1,
            rest,
            &with_position(positions, word_start),
        ) {
            consider(score + next);
        }
    }

    for (i, &c) in codes.iter().enumerate().skip(index + 1) {
        let score = case_score(first, c, if is_start { 1.0 } else { 10.0 });
        if score > 0.0 {
            if let Some(next) = next_score(codes, i + 1, rest, &with_position(positions, i)) {
                consider(score + next);
            }
            break;
        }
    }

    if best.is_none() {
        // Retry with the previous character when it matches the input instead.
        if let Some(&last) = positions.last()
            && last > 0
            && codes[last] != first
            && codes[last - 1] == first
        {
            let mut shifted = positions.to_vec();
            shifted.insert(shifted.len() - 1, last - 1);
            return next_score(codes, last + 1, rest, &shifted).map(|next| 0.5 + next);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use lsp_types::CompletionItemKind;

    use super::*;

    fn item(label: &str) -> CompletionItem {
        CompletionItem {
            label: label.to_string(),
            ..Default::default()
        }
    }

    fn labels(items: &[CompletionItem]) -> Vec<&str> {
        items.iter().map(|i| i.label.as_str()).collect()
    }

    #[test]
    fn empty_prefix_keeps_everything_in_sort_text_order() {
        let mut b = item("b");
        b.sort_text = Some("2".into());
        let mut a = item("a");
        a.sort_text = Some("1".into());
        let filtered = filter_items("", vec![b, a, item("c")]);
        assert_eq!(labels(&filtered), vec!["a", "b", "c"]);
    }

    #[test]
    fn non_matching_items_are_dropped() {
        let filtered = filter_items("xyz", vec![item("getElementById"), item("xylophoneZ")]);
        assert_eq!(labels(&filtered), vec!["xylophoneZ"]);
    }

    #[test]
    fn camel_case_word_starts_match() {
        let filtered = filter_items("gEB", vec![item("getElementById"), item("gap")]);
        assert_eq!(labels(&filtered), vec!["getElementById"]);
        assert!(match_score("getElementById", &['g', 'E', 'B']).is_some());
    }

    #[test]
    fn lowercase_prefix_matches_uppercase_letters() {
        assert!(match_score("Foo", &['f']).is_some());
        assert!(match_score("foo", &['F']).is_none());
    }

    #[test]
    fn exact_filter_text_with_kind_ranks_first() {
        let mut exact = item("map");
        exact.kind = Some(CompletionItemKind::FUNCTION);
        let filtered = filter_items("map", vec![item("mapEntries"), exact]);
        assert_eq!(labels(&filtered), vec!["map", "mapEntries"]);
    }

    #[test]
    fn prefix_at_start_beats_loose_match() {
        let filtered = filter_items("con", vec![item("iconify"), item("console")]);
        assert_eq!(labels(&filtered), vec!["console", "iconify"]);
    }

    #[test]
    fn filter_text_is_preferred_over_label() {
        let mut it = item("• useState");
        it.filter_text = Some("useState".into());
        let filtered = filter_items("use", vec![it]);
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn items_shorter_than_prefix_are_dropped() {
        assert!(filter_items("long", vec![item("lo")]).is_empty());
    }
}
