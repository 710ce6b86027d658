use super::*;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::with_base_dir("/tmp/rag-qa");
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.embedding_model, "nomic-embed-text");
    assert_eq!(config.ollama.generation_model, "llama3");
    assert_eq!(config.chunking.chunk_size, 1000);
    assert_eq!(config.chunking.chunk_overlap, 200);
    assert_eq!(config.retrieval.top_k, 4);
    assert!(config.validate().is_ok());
}

#[test]
fn config_validation() {
    let config = Config::with_base_dir("/tmp/rag-qa");

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.embedding_model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.generation_model = "   ".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.timeout_seconds = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.top_k = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.session.max_sessions = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.server.max_upload_bytes = 10;
    assert!(invalid_config.validate().is_err());
}

#[test]
fn chunking_bounds() {
    let mut config = Config::with_base_dir("/tmp/rag-qa");

    config.chunking.chunk_size = 50;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidChunkSize(50))
    ));

    config.chunking.chunk_size = 1000;
    config.chunking.chunk_overlap = 501;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::OverlapTooLarge(501, 1000))
    ));

    config.chunking.chunk_overlap = 500;
    assert!(config.validate().is_ok());

    config.chunking.chunk_overlap = 0;
    assert!(config.validate().is_ok());
}

#[test]
fn prompt_template_placeholders() {
    let mut config = Config::with_base_dir("/tmp/rag-qa");

    config.prompt.template = "Question: {question}".to_string();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::MissingPlaceholder("{context}"))
    ));

    config.prompt.template = "Context: {context}".to_string();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::MissingPlaceholder("{question}"))
    ));
}

#[test]
fn ollama_url_generation() {
    let config = Config::with_base_dir("/tmp/rag-qa");
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn derived_paths() {
    let config = Config::with_base_dir("/data/rag");
    assert_eq!(config.config_file_path(), Path::new("/data/rag/config.toml"));
    assert_eq!(config.index_path(), Path::new("/data/rag/faiss_index"));
    assert_eq!(config.upload_dir(), Path::new("/data/rag/uploads"));
}

#[test]
fn toml_serialization() {
    let config = Config::with_base_dir("");
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let toml_str = r#"
[ollama]
generation_model = "mistral"

[retrieval]
top_k = 8
"#;
    let config: Config = toml::from_str(toml_str).expect("should parse partial toml");
    assert_eq!(config.ollama.generation_model, "mistral");
    assert_eq!(config.ollama.embedding_model, "nomic-embed-text");
    assert_eq!(config.retrieval.top_k, 8);
    assert_eq!(config.chunking, ChunkingConfig::default());
}

#[test]
fn load_missing_file_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load defaults");
    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.ollama, OllamaConfig::default());
}

#[test]
fn save_and_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::with_base_dir(temp_dir.path().join("nested"));
    config.ollama.host = "gpu-box".to_string();
    config.session.ttl_seconds = 0;

    config.save().expect("should save config");
    assert!(config.config_file_path().exists());

    let loaded = Config::load(temp_dir.path().join("nested")).expect("should load config");
    assert_eq!(loaded, config);
}

#[test]
fn load_rejects_invalid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[retrieval]\ntop_k = 0\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}
