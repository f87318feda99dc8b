//! Property-based tests for decoding, normalization and context building.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use paper_insight::chat::build_grounding_context;
use paper_insight::decoder::{decode_abstract, decode_inverted_index, RawAbstract};
use paper_insight::models::{DocumentType, Paper, SearchResult};
use paper_insight::normalizer::{normalize, FilterConfig, RawAuthorship, RawRecord};

fn inverted_index(words: &[String]) -> BTreeMap<String, Vec<i64>> {
    let mut index: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    for (position, word) in words.iter().enumerate() {
        index.entry(word.clone()).or_default().push(position as i64);
    }
    index
}

fn raw_record() -> impl Strategy<Value = RawRecord> {
    (
        "W[0-9]{1,4}",
        prop::option::of(-5i32..2100),
        prop::option::of(-10i64..10_000),
        prop::sample::select(vec!["article", "proceedings-article", "book", "book-chapter", "dataset"]),
        prop::collection::vec(prop::sample::select(vec!["US", "fr", "DE", "ZZ", ""]), 0..4),
        prop::collection::vec("[a-z]{1,6}", 0..12),
    )
        .prop_map(|(id, year, citations, kind, countries, words)| RawRecord {
            id,
            title: Some(format!("Title {}", words.join(" "))),
            raw_abstract: Some(RawAbstract::InvertedIndex(inverted_index(&words))),
            publication_year: year,
            citation_count: citations,
            document_type: Some(kind.to_string()),
            venue_name: None,
            authorships: vec![RawAuthorship {
                author_id: Some("A1".to_string()),
                author_name: Some("Ada".to_string()),
                country_codes: countries.into_iter().map(str::to_string).collect(),
                institutions: vec![],
            }],
            keywords: vec![],
        })
}

fn paper(id: usize, abstract_len: usize) -> Paper {
    Paper {
        id: format!("W{id}"),
        title: format!("Paper {id}"),
        abstract_text: "x".repeat(abstract_len),
        publication_year: 2020,
        citation_count: 0,
        document_type: DocumentType::JournalArticle,
        venue_name: "Venue".to_string(),
        authors: vec![],
        countries: BTreeSet::new(),
        institutions: BTreeSet::new(),
        keywords: vec![],
    }
}

// --- Decoder properties ---

proptest! {
    #[test]
    fn decode_rebuilds_the_encoded_text(words in prop::collection::vec("[a-z]{1,8}", 0..40)) {
        let decoded = decode_inverted_index(&inverted_index(&words));
        prop_assert!(decoded.is_clean());
        prop_assert_eq!(decoded.text, words.join(" "));
    }

    #[test]
    fn decoding_decoded_text_is_a_no_op(words in prop::collection::vec("[a-z]{1,8}", 0..40)) {
        let first = decode_abstract(Some(&RawAbstract::InvertedIndex(inverted_index(&words))));
        let second = decode_abstract(Some(&RawAbstract::Plain(first.text.clone())));
        prop_assert!(second.is_clean());
        prop_assert_eq!(first.text, second.text);
    }
}

// --- Normalizer properties ---

proptest! {
    #[test]
    fn normalization_is_deterministic(
        raw in raw_record(),
        start in 1990i32..2030,
        span in 0i32..20,
        conference in any::<bool>(),
        books in any::<bool>(),
    ) {
        let filter = FilterConfig::from_flags(start, start + span, conference, books);
        prop_assert_eq!(normalize(&raw, &filter), normalize(&raw, &filter));
    }

    #[test]
    fn accepted_papers_satisfy_the_filter(
        raw in raw_record(),
        start in 1990i32..2030,
        span in 0i32..20,
        conference in any::<bool>(),
        books in any::<bool>(),
    ) {
        let filter = FilterConfig::from_flags(start, start + span, conference, books);
        if let Ok(normalized) = normalize(&raw, &filter) {
            let paper = normalized.paper;
            prop_assert!(filter.year_range.contains(paper.publication_year));
            prop_assert!(filter.allows(paper.document_type));
            prop_assert!(paper.countries.iter().all(|name| !name.is_empty()));
        }
    }
}

// --- Grounding context properties ---

proptest! {
    #[test]
    fn context_fits_budget_and_cites_a_rank_prefix(
        abstract_lens in prop::collection::vec(0usize..400, 0..8),
        budget in 0usize..2000,
    ) {
        let results: Vec<SearchResult> = abstract_lens
            .iter()
            .enumerate()
            .map(|(i, &len)| SearchResult::new(paper(i, len), 1.0 / (i as f32 + 1.0)))
            .collect();

        let context = build_grounding_context(&results, budget);

        prop_assert!(context.text.chars().count() <= budget);
        prop_assert_eq!(context.is_grounded(), !context.citations.is_empty());
        for (i, citation) in context.citations.iter().enumerate() {
            prop_assert_eq!(citation.number, i + 1);
            prop_assert_eq!(&citation.id, &results[i].paper.id);
            prop_assert!(context.text.contains(&results[i].paper.abstract_text));
        }
    }
}
