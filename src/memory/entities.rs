//! Rule-based entity extraction.
//!
//! An [`EntityExtractor`] runs a list of matchers over the text and unions
//! their hits. The default matchers find capitalized multi-word names
//! ("Alice Chen"), acronyms ("API") and compound identifiers ("GraphQL",
//! "iPhone"). Extraction is deterministic: hits are ordered by first
//! occurrence, deduplicated case-insensitively (the first surface form wins)
//! and capped.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Default cap on entities kept per record.
pub const DEFAULT_MAX_ENTITIES: usize = 20;

/// A matcher returns `(byte offset, surface form)` for each hit.
pub type Matcher = fn(&str) -> Vec<(usize, String)>;

static MULTI_WORD_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+)+\b").expect("multi-word pattern is valid")
});

static ACRONYM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][A-Z0-9]+\b").expect("acronym pattern is valid"));

static COMPOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z]*[a-z][A-Z][A-Za-z0-9]*\b").expect("compound pattern is valid")
});

fn find_all(pattern: &Regex, text: &str) -> Vec<(usize, String)> {
    pattern
        .find_iter(text)
        .map(|m| (m.start(), m.as_str().to_string()))
        .collect()
}

/// Capitalized word runs: "Alice Chen", "New York City".
pub fn multi_word_names(text: &str) -> Vec<(usize, String)> {
    find_all(&MULTI_WORD_NAME, text)
}

/// Upper-case tokens of two or more characters: "API", "HTTP2".
pub fn acronyms(text: &str) -> Vec<(usize, String)> {
    find_all(&ACRONYM, text)
}

/// Mixed-case identifiers with an inner capital: "GraphQL", "iPhone", "TypeScript".
pub fn compound_identifiers(text: &str) -> Vec<(usize, String)> {
    find_all(&COMPOUND, text)
}

/// Case-folded, whitespace-collapsed key used for comparison and indexing.
pub fn normalize_entity(entity: &str) -> String {
    entity.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[derive(Clone)]
pub struct EntityExtractor {
    matchers: Vec<Matcher>,
    max_entities: usize,
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self {
            matchers: vec![multi_word_names, acronyms, compound_identifiers],
            max_entities: DEFAULT_MAX_ENTITIES,
        }
    }
}

impl EntityExtractor {
    /// An extractor with no matchers; add them with [`Self::with_matcher`].
    pub fn empty() -> Self {
        Self {
            matchers: Vec::new(),
            max_entities: DEFAULT_MAX_ENTITIES,
        }
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    pub fn with_max_entities(mut self, max: usize) -> Self {
        self.max_entities = max;
        self
    }

    pub fn extract(&self, text: &str) -> Vec<String> {
        let mut hits: Vec<(usize, String)> = self.matchers.iter().flat_map(|m| m(text)).collect();
        // stable: on equal offsets the earlier matcher wins
        hits.sort_by_key(|(offset, _)| *offset);

        let mut seen = HashSet::new();
        hits.into_iter()
            .map(|(_, surface)| surface)
            .filter(|surface| seen.insert(normalize_entity(surface)))
            .take(self.max_entities)
            .collect()
    }
}

/// Extract with the default matchers.
pub fn extract_entities(text: &str) -> Vec<String> {
    EntityExtractor::default().extract(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_names_acronyms_and_compounds() {
        let entities = extract_entities("Alice Chen said the API now speaks GraphQL on her iPhone");
        assert_eq!(entities, vec!["Alice Chen", "API", "GraphQL", "iPhone"]);
    }

    #[test]
    fn single_capitalized_words_are_not_names() {
        assert!(extract_entities("Alice leads the team").is_empty());
    }

    #[test]
    fn deduplicates_case_insensitively_keeping_first_form() {
        let entities = extract_entities("The SQL layer. More sql? The SQL again, and Sql.");
        assert_eq!(entities, vec!["SQL"]);
    }

    #[test]
    fn acronym_inside_compound_is_not_split_out() {
        assert_eq!(extract_entities("We adopted GraphQL"), vec!["GraphQL"]);
    }

    #[test]
    fn caps_the_number_of_entities() {
        let text = (0..30).map(|i| format!("ID{i}")).collect::<Vec<_>>().join(" ");
        assert_eq!(extract_entities(&text).len(), DEFAULT_MAX_ENTITIES);
        assert_eq!(EntityExtractor::default().with_max_entities(3).extract(&text).len(), 3);
    }

    #[test]
    fn extraction_is_deterministic() {
        let text = "Signal outage hit the EU region; Bob Smith paged PagerDuty";
        assert_eq!(extract_entities(text), extract_entities(text));
    }

    #[test]
    fn custom_matchers_plug_in() {
        fn hashtags(text: &str) -> Vec<(usize, String)> {
            text.match_indices('#')
                .filter_map(|(i, _)| {
                    let tag: String = text[i + 1..]
                        .chars()
                        .take_while(|c| c.is_alphanumeric())
                        .collect();
                    (!tag.is_empty()).then(|| (i, tag))
                })
                .collect()
        }
        let extractor = EntityExtractor::empty().with_matcher(hashtags);
        assert_eq!(extractor.extract("ship #release then #retro"), vec!["release", "retro"]);
    }

    #[test]
    fn normalization_collapses_case_and_spacing() {
        assert_eq!(normalize_entity("  Alice \t Chen "), "alice chen");
    }
}
