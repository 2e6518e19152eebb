use ngram_search::config::ExpansionConfig;
use ngram_search::search::canonicalize::chunk_text;
use ngram_search::search::expansion::QueryExpander;
use ngram_search::search::hash_embedder::{HashEmbedder, TokenCache};
use ngram_search::search::ranker::rank_by_dot;
use ngram_search::search::tokenize::{is_stopword, is_token_char, tokenize};
use ngram_search::search::vector::{dot_product, is_zero, l2_norm};
use ngram_search::search::vocabulary::{Vocabulary, build_vocabulary, count_document_frequencies};
use proptest::prelude::*;

/// Latin, extended Latin and Greek words mixed with punctuation and digits.
fn text_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Zäöüßéèαβγδεζηθικλμνξοπρστυφχψωἀἁὁῦ0-9 .,;!-]{0,80}"
}

fn word_strategy() -> impl Strategy<Value = String> {
    "[a-zαβγδεικλμνοπρστω]{3,9}"
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn embedding_is_deterministic_and_unit_or_zero(text in text_strategy(), dim in 8usize..300) {
        let embedder = HashEmbedder::new(dim, 3, 5);
        let a = embedder.embed_text(&text);
        let b = embedder.embed_text(&text);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.len(), dim);

        if tokenize(&text).next().is_none() {
            prop_assert!(is_zero(&a));
        } else if !is_zero(&a) {
            prop_assert!((l2_norm(&a) - 1.0).abs() < 1e-6);
            prop_assert!((dot_product(&a, &a) - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn tokens_are_normalized(text in text_strategy()) {
        for token in tokenize(&text) {
            prop_assert!(token.chars().count() >= 2);
            prop_assert!(token.chars().all(is_token_char));
            prop_assert_eq!(token.to_lowercase(), token.clone());
            prop_assert!(!is_stopword(&token));
        }
    }

    #[test]
    fn cached_embedding_matches_direct(words in prop::collection::vec(word_strategy(), 1..12)) {
        let embedder = HashEmbedder::default();
        let cache = TokenCache::build(&embedder, &words);
        let cached = embedder.embed_tokens(&words, Some(&cache));
        let direct = embedder.embed_tokens(&words, None);
        prop_assert_eq!(cached, direct);
    }

    #[test]
    fn ranking_is_sorted_stable_and_truncated(
        scores in prop::collection::vec(-4i8..4, 0..40),
        top_n in 0usize..50,
    ) {
        let vectors: Vec<Vec<f32>> = scores.iter().map(|s| vec![f32::from(*s) / 4.0]).collect();
        let ranked = rank_by_dot(&[1.0], &vectors, top_n);
        prop_assert_eq!(ranked.len(), top_n.min(vectors.len()));
        for pair in ranked.windows(2) {
            prop_assert!(pair[0].1 >= pair[1].1);
            if pair[0].1 == pair[1].1 {
                prop_assert!(pair[0].0 < pair[1].0);
            }
        }
    }

    #[test]
    fn expansion_respects_bounds(
        docs in prop::collection::vec(prop::collection::vec(word_strategy(), 1..6), 1..12),
        query in word_strategy(),
        top_k in 0usize..6,
        min_sim in 0.0f32..0.9,
    ) {
        let embedder = HashEmbedder::default();
        let df = count_document_frequencies(&docs);
        let distinct: Vec<String> = df.keys().cloned().collect();
        let cache = TokenCache::build(&embedder, &distinct);
        let vocab = Vocabulary::new(build_vocabulary(&df, &embedder, &cache, 1, 6));
        let expander = QueryExpander::new(&vocab, &embedder, &ExpansionConfig { top_k, min_sim });

        let neighbors = expander.neighbors(&query);
        prop_assert!(neighbors.len() <= top_k);
        for n in &neighbors {
            prop_assert_ne!(&n.token, &query);
            prop_assert!(n.similarity >= min_sim);
            prop_assert!(vocab.contains(&n.token));
        }
        for pair in neighbors.windows(2) {
            prop_assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[test]
    fn chunks_fit_window_and_keep_content(text in text_strategy(), max_chars in 1usize..30) {
        let chunks = chunk_text(&text, max_chars);
        for chunk in &chunks {
            prop_assert!(!chunk.is_empty());
            prop_assert!(chunk.chars().count() <= max_chars);
        }
        let joined: String = chunks.concat().split_whitespace().collect();
        let original: String = text.split_whitespace().collect();
        prop_assert_eq!(joined, original);
    }
}
