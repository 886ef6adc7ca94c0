use super::estimate_token_count as estimate_token_count_impl;
use super::*;
use proptest::prelude::*;

fn texts(passages: &[Passage]) -> Vec<&str> {
    passages.iter().map(|p| p.text.as_str()).collect()
}

fn chunk_text(text: &str, max_chunk_size: usize, overlap: usize) -> Vec<Passage> {
    let chunker = Chunker::new(max_chunk_size, overlap).expect("valid chunker");
    chunker.chunk(&Document::from_plain_text("PHB", text)).collect()
}

#[test]
fn estimate_token_count() {
    assert_eq!(estimate_token_count_impl("hello world"), 2);
    assert_eq!(estimate_token_count_impl("This is a test."), 5);
    assert_eq!(estimate_token_count_impl(""), 0);
}

#[test]
fn default_config() {
    let config = ChunkingConfig::default();
    assert_eq!(config.max_chunk_size, 2048);
    assert_eq!(config.overlap, 200);
    assert!(Chunker::from_config(&config).is_ok());
}

#[test]
fn rejects_invalid_parameters() {
    assert!(matches!(
        Chunker::new(100, 100),
        Err(RagError::Configuration(_))
    ));
    assert!(matches!(
        Chunker::new(100, 150),
        Err(RagError::Configuration(_))
    ));
    assert!(matches!(Chunker::new(0, 0), Err(RagError::Configuration(_))));
    assert!(Chunker::new(1, 0).is_ok());
}

#[test]
fn short_document_is_single_passage() {
    let passages = chunk_text("Opportunity attacks provoke.", 500, 50);

    assert_eq!(passages.len(), 1);
    assert_eq!(passages[0].id.to_string(), "PHB-0");
    assert_eq!(passages[0].text, "Opportunity attacks provoke.");
    assert_eq!(passages[0].start_offset, 0);
    assert_eq!(passages[0].char_len, 28);
    assert_eq!(passages[0].page, None);
}

#[test]
fn empty_document_has_no_passages() {
    assert!(chunk_text("", 100, 10).is_empty());
    assert!(chunk_text(" \n\n\t ", 100, 10).is_empty());
}

#[test]
fn prefers_paragraph_break() {
    let passages = chunk_text(
        "First paragraph sentence.\n\nSecond paragraph continues here.",
        32,
        5,
    );

    assert_eq!(passages[0].text, "First paragraph sentence.");
    assert!(passages[1].text.starts_with("Second paragraph"));
}

#[test]
fn prefers_line_break_over_whitespace() {
    let passages = chunk_text("Alpha beta gamma\nDo it now", 22, 0);
    assert_eq!(texts(&passages), vec!["Alpha beta gamma", "Do it now"]);
}

#[test]
fn prefers_sentence_end_over_whitespace() {
    let passages = chunk_text("Alpha beta gamma. Do it now", 22, 0);
    assert_eq!(texts(&passages), vec!["Alpha beta gamma.", "Do it now"]);
}

#[test]
fn overlap_restarts_at_word_boundary() {
    let passages = chunk_text("one two three four five six seven eight nine ten", 20, 8);

    assert_eq!(
        texts(&passages),
        vec![
            "one two three four",
            "four five six seven",
            "seven eight nine ten"
        ]
    );
    assert_eq!(passages[1].start_offset, 14);
    assert_eq!(passages[2].start_offset, 28);
}

#[test]
fn hard_cut_when_no_whitespace() {
    let passages = chunk_text("abcdefghijklmnopqrstuvwxyz", 10, 3);
    assert_eq!(
        texts(&passages),
        vec!["abcdefghij", "klmnopqrst", "uvwxyz"]
    );
}

#[test]
fn zero_overlap_is_disjoint() {
    let text = "Roll initiative. Each combatant acts in turn order until the fight ends.";
    let passages = chunk_text(text, 24, 0);

    for pair in passages.windows(2) {
        assert!(pair[0].start_offset + pair[0].char_len <= pair[1].start_offset);
    }
    let rejoined: String = passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    assert_eq!(rejoined, text);
}

#[test]
fn passages_carry_page_numbers() {
    let document = Document::new("PHB", "Page one text.\x0cPage two text.");
    let chunker = Chunker::new(16, 0).expect("valid chunker");
    let passages: Vec<Passage> = chunker.chunk(&document).collect();

    assert_eq!(texts(&passages), vec!["Page one text.", "Page two text."]);
    assert_eq!(passages[0].page, Some(1));
    assert_eq!(passages[1].page, Some(2));
}

#[test]
fn iterator_is_restartable() {
    let document = Document::from_plain_text("DMG", "word ".repeat(200));
    let chunker = Chunker::new(60, 10).expect("valid chunker");

    let chunks = chunker.chunk(&document);
    let first: Vec<Passage> = chunks.clone().collect();
    let second: Vec<Passage> = chunks.collect();

    assert!(first.len() > 1);
    assert_eq!(first, second);
}

#[test]
fn chunk_all_numbers_each_document_from_zero() {
    let documents = vec![
        Document::from_plain_text("MM", "Goblins are small. ".repeat(10)),
        Document::from_plain_text("PHB", "Elves live long. ".repeat(10)),
    ];
    let chunker = Chunker::new(50, 5).expect("valid chunker");
    let passages = chunker.chunk_all(&documents);

    let mm: Vec<u32> = passages
        .iter()
        .filter(|p| p.id.document_id == "MM")
        .map(|p| p.id.sequence)
        .collect();
    let phb: Vec<u32> = passages
        .iter()
        .filter(|p| p.id.document_id == "PHB")
        .map(|p| p.id.sequence)
        .collect();

    assert_eq!(mm, (0..mm.len() as u32).collect::<Vec<_>>());
    assert_eq!(phb, (0..phb.len() as u32).collect::<Vec<_>>());
    assert_eq!(passages.first().map(|p| p.id.document_id.as_str()), Some("MM"));
}

#[test]
fn passage_id_display_and_parse() {
    let id = PassageId::new("PHB", 7);
    assert_eq!(id.to_string(), "PHB-7");
    assert_eq!("PHB-7".parse::<PassageId>().expect("parses"), id);

    let hyphenated: PassageId = "Xanathars-Guide-12".parse().expect("parses");
    assert_eq!(hyphenated.document_id, "Xanathars-Guide");
    assert_eq!(hyphenated.sequence, 12);

    assert!("PHB".parse::<PassageId>().is_err());
    assert!("-3".parse::<PassageId>().is_err());
    assert!("PHB-x".parse::<PassageId>().is_err());
}

#[test]
fn passage_id_ordering() {
    let mut ids = vec![
        PassageId::new("PHB", 10),
        PassageId::new("PHB", 2),
        PassageId::new("DMG", 5),
    ];
    ids.sort();
    let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, vec!["DMG-5", "PHB-2", "PHB-10"]);
}

#[test]
fn passage_id_serializes_as_string() {
    let id = PassageId::new("MM", 3);
    let json = serde_json::to_string(&id).expect("serializes");
    assert_eq!(json, "\"MM-3\"");
    let back: PassageId = serde_json::from_str(&json).expect("deserializes");
    assert_eq!(back, id);
    assert!(serde_json::from_str::<PassageId>("\"MM\"").is_err());
}

fn arb_text() -> impl Strategy<Value = String> {
    let separator = prop_oneof![Just(" "), Just("\n"), Just("\n\n"), Just(". "), Just("  ")];
    proptest::collection::vec(("[a-zA-Z]{1,14}", separator), 0..120).prop_map(|parts| {
        let mut text = String::new();
        for (word, sep) in parts {
            text.push_str(&word);
            text.push_str(sep);
        }
        text
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn passages_respect_bounds_and_cover_text(
        text in arb_text(),
        max_chunk_size in 8usize..160,
        overlap_seed in 0usize..1000,
    ) {
        let overlap = overlap_seed % max_chunk_size;
        let passages = chunk_text(&text, max_chunk_size, overlap);
        let chars: Vec<char> = text.chars().collect();

        let mut covered = vec![false; chars.len()];
        for (i, passage) in passages.iter().enumerate() {
            prop_assert!(passage.char_len >= 1);
            prop_assert!(passage.char_len <= max_chunk_size);
            prop_assert_eq!(passage.id.sequence as usize, i);

            let slice: String = chars[passage.start_offset..passage.start_offset + passage.char_len]
                .iter()
                .collect();
            prop_assert_eq!(&slice, &passage.text);

            for flag in &mut covered[passage.start_offset..passage.start_offset + passage.char_len] {
                *flag = true;
            }
        }

        for pair in passages.windows(2) {
            prop_assert!(pair[1].start_offset > pair[0].start_offset);
            let shared = (pair[0].start_offset + pair[0].char_len).saturating_sub(pair[1].start_offset);
            prop_assert!(shared <= overlap);
        }

        for (c, is_covered) in chars.iter().zip(&covered) {
            prop_assert!(c.is_whitespace() || *is_covered);
        }
    }

    #[test]
    fn chunking_is_deterministic(
        text in arb_text(),
        max_chunk_size in 8usize..160,
        overlap_seed in 0usize..1000,
    ) {
        let overlap = overlap_seed % max_chunk_size;
        prop_assert_eq!(
            chunk_text(&text, max_chunk_size, overlap),
            chunk_text(&text, max_chunk_size, overlap)
        );
    }
}
