use super::*;
use std::fs;
use tempfile::TempDir;

fn passage(document_id: &str, sequence: u32, text: &str) -> Passage {
    Passage {
        id: PassageId::new(document_id, sequence),
        start_offset: sequence as usize * 100,
        text: text.to_string(),
        char_len: text.chars().count(),
        token_count: 1,
        page: Some(sequence + 1),
    }
}

fn builder(dimension: usize) -> IndexBuilder {
    IndexBuilder::new("test-model", dimension, ChunkingConfig::default())
}

fn sample_index() -> Index {
    let passages = vec![
        passage("PHB", 1, "Opportunity attacks"),
        passage("DMG", 0, "Traps and hazards"),
        passage("PHB", 0, "Grappling rules"),
    ];
    let vectors = vec![vec![0.0, 2.0, 0.0], vec![0.0, 0.0, 1.0], vec![3.0, 0.0, 0.0]];
    builder(3).build(&passages, vectors).expect("should build")
}

fn ids(hits: &[SearchHit]) -> Vec<String> {
    hits.iter().map(|h| h.id.to_string()).collect()
}

#[test]
fn build_sorts_records_and_normalizes_vectors() {
    let index = sample_index();

    let record_ids: Vec<String> = index.records().iter().map(|r| r.id.to_string()).collect();
    assert_eq!(record_ids, vec!["DMG-0", "PHB-0", "PHB-1"]);

    for record in index.records() {
        let norm = dot(&record.vector, &record.vector).sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    let header = index.header();
    assert_eq!(header.format_version, FORMAT_VERSION);
    assert_eq!(header.model, "test-model");
    assert_eq!(header.dimension, 3);
    assert_eq!(header.passage_count, 3);
    assert_eq!(header.document_count, 2);
    assert_eq!(header.content_hash.len(), 64);
}

#[test]
fn build_rejects_length_mismatch() {
    let passages = vec![passage("PHB", 0, "one"), passage("PHB", 1, "two")];
    let result = builder(2).build(&passages, vec![vec![1.0, 0.0]]);
    assert!(matches!(result, Err(RagError::Configuration(_))));
}

#[test]
fn build_rejects_wrong_dimension() {
    let passages = vec![passage("PHB", 0, "one")];
    let result = builder(3).build(&passages, vec![vec![1.0, 0.0]]);
    assert!(matches!(result, Err(RagError::Configuration(_))));
}

#[test]
fn build_rejects_degenerate_vectors() {
    let passages = vec![passage("PHB", 0, "one")];

    let zero = builder(2).build(&passages, vec![vec![0.0, 0.0]]);
    assert!(matches!(zero, Err(RagError::Embedding(_))));

    let nan = builder(2).build(&passages, vec![vec![f32::NAN, 1.0]]);
    assert!(matches!(nan, Err(RagError::Embedding(_))));
}

#[test]
fn empty_index_is_valid() {
    let index = builder(4).build(&[], Vec::new()).expect("should build");
    assert!(index.is_empty());
    assert_eq!(index.header().passage_count, 0);
    assert_eq!(index.header().document_count, 0);

    let hits = index.search(&[1.0, 0.0, 0.0, 0.0], 5).expect("should search");
    assert!(hits.is_empty());
}

#[test]
fn search_orders_by_score() {
    let index = sample_index();
    let hits = index.search(&[1.0, 0.5, 0.0], 3).expect("should search");

    assert_eq!(ids(&hits), vec!["PHB-0", "PHB-1", "DMG-0"]);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(hits[0].text, "Grappling rules");
    assert_eq!(hits[0].document_id, "PHB");
    assert_eq!(hits[0].page, Some(1));
}

#[test]
fn search_breaks_ties_by_id() {
    let passages = vec![
        passage("PHB", 2, "b"),
        passage("MM", 0, "a"),
        passage("PHB", 10, "c"),
    ];
    let vectors = vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.0]];
    let index = builder(2).build(&passages, vectors).expect("should build");

    let hits = index.search(&[1.0, 0.0], 3).expect("should search");
    assert_eq!(ids(&hits), vec!["MM-0", "PHB-2", "PHB-10"]);
}

#[test]
fn search_clamps_k_to_index_size() {
    let index = sample_index();
    assert_eq!(index.search(&[1.0, 0.0, 0.0], 10).expect("search").len(), 3);
    assert_eq!(index.search(&[1.0, 0.0, 0.0], 2).expect("search").len(), 2);
}

#[test]
fn search_scores_are_cosine() {
    let index = sample_index();
    let hits = index.search(&[-5.0, 0.0, 0.0], 3).expect("should search");

    let grappling = hits.iter().find(|h| h.id.to_string() == "PHB-0").expect("hit");
    assert!((grappling.score + 1.0).abs() < 1e-6);
    assert!(hits.iter().all(|h| (-1.0..=1.0).contains(&h.score)));
}

#[test]
fn search_rejects_invalid_arguments() {
    let index = sample_index();

    assert!(matches!(
        index.search(&[1.0, 0.0, 0.0], 0),
        Err(RagError::Configuration(_))
    ));
    assert!(matches!(
        index.search(&[1.0, 0.0], 3),
        Err(RagError::Embedding(_))
    ));
    assert!(matches!(
        index.search(&[0.0, 0.0, 0.0], 3),
        Err(RagError::Embedding(_))
    ));
}

#[test]
fn check_compatible_gates_dimension_and_model() {
    let passages = vec![passage("PHB", 0, "one")];
    let index = IndexBuilder::new("minilm", 384, ChunkingConfig::default())
        .build(&passages, vec![vec![1.0; 384]])
        .expect("should build");

    assert!(index.check_compatible("minilm", 384).is_ok());
    assert!(matches!(
        index.check_compatible("minilm", 768),
        Err(RagError::IndexVersionMismatch { .. })
    ));
    assert!(matches!(
        index.check_compatible("nomic", 384),
        Err(RagError::IndexVersionMismatch { .. })
    ));
}

#[test]
fn content_hash_ignores_vectors() {
    let passages = vec![passage("PHB", 0, "one"), passage("PHB", 1, "two")];
    let a = builder(2)
        .build(&passages, vec![vec![1.0, 0.0], vec![0.0, 1.0]])
        .expect("should build");
    let b = builder(2)
        .build(&passages, vec![vec![0.3, 0.7], vec![0.9, 0.1]])
        .expect("should build");
    assert_eq!(a.header().content_hash, b.header().content_hash);

    let changed = vec![passage("PHB", 0, "one"), passage("PHB", 1, "three")];
    let c = builder(2)
        .build(&changed, vec![vec![1.0, 0.0], vec![0.0, 1.0]])
        .expect("should build");
    assert_ne!(a.header().content_hash, c.header().content_hash);
}

mod persistence_tests {
    use super::*;

    fn saved_index(temp_dir: &TempDir) -> (Index, std::path::PathBuf) {
        let index = sample_index();
        let path = temp_dir.path().join("index").join("books.index.json");
        index.save(&path).expect("should save");
        (index, path)
    }

    fn rewrite_json(path: &std::path::Path, edit: impl FnOnce(&mut serde_json::Value)) {
        let mut value: serde_json::Value =
            serde_json::from_slice(&fs::read(path).expect("should read")).expect("valid json");
        edit(&mut value);
        fs::write(path, serde_json::to_vec(&value).expect("serializes")).expect("should write");
    }

    #[test]
    fn save_and_load_round_trip() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let (index, path) = saved_index(&temp_dir);

        let loaded = Index::load(&path).expect("should load");
        assert_eq!(loaded, index);
        assert!(!temp_path_exists(&path));
    }

    #[test]
    fn save_is_byte_identical_for_identical_index() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let (_, first) = saved_index(&temp_dir);
        let second = temp_dir.path().join("again.json");
        sample_index().save(&second).expect("should save");

        assert_eq!(
            fs::read(&first).expect("should read"),
            fs::read(&second).expect("should read")
        );
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let result = Index::load(&temp_dir.path().join("missing.json"));
        assert!(matches!(result, Err(RagError::Io(_))));
    }

    #[test]
    fn load_rejects_truncated_file() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let (_, path) = saved_index(&temp_dir);

        let bytes = fs::read(&path).expect("should read");
        fs::write(&path, &bytes[..bytes.len() / 2]).expect("should write");

        assert!(matches!(Index::load(&path), Err(RagError::IndexCorrupt(_))));
    }

    #[test]
    fn load_rejects_tampered_records() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let (_, path) = saved_index(&temp_dir);

        rewrite_json(&path, |value| {
            value["records"][0]["text"] = serde_json::json!("Tampered");
        });

        assert!(matches!(
            Index::load(&path),
            Err(RagError::IndexCorrupt(message)) if message.contains("checksum")
        ));
    }

    #[test]
    fn load_rejects_foreign_format() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let (_, path) = saved_index(&temp_dir);

        rewrite_json(&path, |value| {
            value["format"] = serde_json::json!("something-else");
        });

        assert!(matches!(Index::load(&path), Err(RagError::IndexCorrupt(_))));
    }

    #[test]
    fn load_rejects_unknown_format_version() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let (_, path) = saved_index(&temp_dir);

        rewrite_json(&path, |value| {
            value["header"]["format_version"] = serde_json::json!(FORMAT_VERSION + 1);
        });

        assert!(matches!(
            Index::load(&path),
            Err(RagError::IndexVersionMismatch { .. })
        ));
    }

    fn temp_path_exists(path: &std::path::Path) -> bool {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        path.with_file_name(name).exists()
    }
}
