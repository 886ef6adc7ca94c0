use super::*;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.embedding.provider, EmbeddingProvider::Ollama);
    assert_eq!(config.embedding.protocol, "http");
    assert_eq!(config.embedding.host, "localhost");
    assert_eq!(config.embedding.port, 11434);
    assert_eq!(config.embedding.model, "nomic-embed-text:latest");
    assert_eq!(config.embedding.batch_size, 16);
    assert_eq!(config.embedding.dimension, 768);
    assert_eq!(config.embedding.retry_attempts, 1);
    assert_eq!(config.chunking.max_chunk_size, 2048);
    assert_eq!(config.chunking.overlap, 200);
    assert_eq!(config.retrieval.top_k, 5);
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.embedding.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.batch_size = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.dimension = 4;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.top_k = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.embedding.retry_attempts = 0;
    assert!(invalid_config.validate().is_err());
}

#[test]
fn hash_provider_skips_ollama_checks() {
    let mut config = Config::default();
    config.embedding.provider = EmbeddingProvider::Hash;
    config.embedding.model = String::new();
    config.embedding.port = 0;

    assert!(config.validate().is_ok());
}

#[test]
fn chunking_validation() {
    let mut config = Config::default();
    config.chunking.max_chunk_size = 50;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidMaxChunkSize(50))
    ));

    let mut config = Config::default();
    config.chunking.max_chunk_size = 500;
    config.chunking.overlap = 500;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::OverlapTooLarge(500, 500))
    ));

    config.chunking.overlap = 0;
    assert!(config.validate().is_ok());

    let mut config = Config::default();
    config.chunking.max_chunk_size = 12000;
    config.chunking.overlap = 100;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ChunkExceedsInputLimit(12000, 2048))
    ));

    config.embedding.max_input_tokens = 4096;
    assert!(config.validate().is_ok());

    let mut config = Config::default();
    config.chunking.max_chunk_size = 16384;
    assert!(config.validate().is_err());
    assert!(check_chunk_fits_input(8192, 2048).is_ok());
    assert!(check_chunk_fits_input(8196, 2048).is_err());
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let toml_str = r#"
        [embedding]
        provider = "hash"
        dimension = 384

        [chunking]
        max_chunk_size = 500
    "#;

    let config: Config = toml::from_str(toml_str).expect("should parse partial toml");
    assert_eq!(config.embedding.provider, EmbeddingProvider::Hash);
    assert_eq!(config.embedding.dimension, 384);
    assert_eq!(config.embedding.host, "localhost");
    assert_eq!(config.chunking.max_chunk_size, 500);
    assert_eq!(config.chunking.overlap, 200);
    assert_eq!(config.retrieval.top_k, 5);
}

#[test]
fn setter_validation() {
    let mut config = EmbeddingConfig::default();

    assert!(config.set_protocol("https".to_string()).is_ok());
    assert!(config.set_host("example.com".to_string()).is_ok());
    assert!(config.set_port(8080).is_ok());
    assert!(config.set_model("new-model".to_string()).is_ok());
    assert!(config.set_batch_size(128).is_ok());
    assert!(config.set_dimension(384).is_ok());

    assert!(config.set_protocol("ftp".to_string()).is_err());
    assert!(config.set_protocol("HTTP".to_string()).is_err());
    assert!(config.set_port(0).is_err());
    assert!(config.set_model(String::new()).is_err());
    assert!(config.set_batch_size(0).is_err());
    assert!(config.set_batch_size(1001).is_err());
    assert!(config.set_dimension(0).is_err());

    assert_eq!(config.protocol, "https");
    assert_eq!(config.host, "example.com");
    assert_eq!(config.dimension, 384);
}

#[test]
fn derived_paths() {
    let config = Config::with_base_dir("/tmp/dnd");
    assert_eq!(config.corpus_dir(), PathBuf::from("/tmp/dnd/books"));
    assert_eq!(
        config.index_path(),
        PathBuf::from("/tmp/dnd/index/books.index.json")
    );
    assert_eq!(
        config.config_file_path(),
        PathBuf::from("/tmp/dnd/config.toml")
    );

    let mut config = config;
    config.retrieval.index_path = Some(PathBuf::from("/srv/books.json"));
    assert_eq!(config.index_path(), PathBuf::from("/srv/books.json"));
}

#[test]
fn load_missing_config() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("should load defaults");
    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(config.embedding, EmbeddingConfig::default());
}

#[test]
fn save_and_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let mut config = Config::with_base_dir(temp_dir.path().join("nested"));
    config.embedding.provider = EmbeddingProvider::Hash;
    config.chunking.max_chunk_size = 500;
    config.chunking.overlap = 50;
    config.retrieval.top_k = 3;
    config.save().expect("should save config");

    let loaded = Config::load(temp_dir.path().join("nested")).expect("should load config");
    assert_eq!(config, loaded);
}

#[test]
fn load_rejects_invalid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[chunking]\nmax_chunk_size = 500\noverlap = 800\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
#[serial]
fn default_dir_honours_env_override() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    // SAFETY: serialised with the other env-touching tests
    unsafe { std::env::set_var(HOME_ENV_VAR, temp_dir.path()) };
    let dir = Config::default_dir();
    // SAFETY: as above
    unsafe { std::env::remove_var(HOME_ENV_VAR) };

    assert_eq!(dir.expect("should resolve dir"), temp_dir.path());
}
