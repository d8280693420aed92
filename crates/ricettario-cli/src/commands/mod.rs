//! Command implementations.

mod history;
mod plan;
mod run;

pub use history::execute_history;
pub use plan::execute_plan;
pub use run::execute_run;

use crate::config::Config;
use crate::error::{CliError, Result};
use ricettario_domain::CaptionUnit;
use ricettario_extractor::Engine;
use ricettario_llm::OpenAiProvider;
use ricettario_store::SqliteStore;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Read a JSON array of captions, keeping at most `limit` of them.
pub fn load_captions(path: &Path, limit: Option<usize>) -> Result<Vec<CaptionUnit>> {
    let contents = fs::read_to_string(path).map_err(|e| {
        CliError::InvalidInput(format!("Cannot read captions file '{}': {}", path.display(), e))
    })?;
    let mut captions: Vec<CaptionUnit> = serde_json::from_str(&contents)?;
    if let Some(limit) = limit {
        captions.truncate(limit);
    }
    Ok(captions)
}

/// Open the SQLite store named by the configuration.
pub fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let path = config.database_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(Arc::new(SqliteStore::new(&path)?))
}

/// Build an engine backed by the OpenAI provider for both immediate and batch calls.
pub fn build_engine(config: &Config, api_key: Option<&str>) -> Result<Engine<SqliteStore>> {
    let api_key = api_key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| CliError::Config("OPENAI_API_KEY is not set".to_string()))?;

    let mut provider = OpenAiProvider::new(api_key, config.provider.model.clone())?
        .with_temperature(config.provider.temperature);
    if let Some(url) = &config.provider.base_url {
        provider = provider.with_base_url(url.clone());
    }
    let provider = Arc::new(provider);

    let store = open_store(config)?;
    let engine = Engine::new(provider.clone(), store, config.engine.clone())?
        .with_batch_service(provider);
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_captions_with_aliases_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("captions.json");
        fs::write(
            &path,
            r#"[
                {"id": "a", "caption": "Pasta al pomodoro", "thumbnail_url": "https://x/a.jpg"},
                {"id": "b", "caption_text": "Risotto"},
                {"id": "c", "raw_text": "Happy birthday"}
            ]"#,
        )
        .unwrap();

        let all = load_captions(&path, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].media_ref.as_deref(), Some("https://x/a.jpg"));
        assert_eq!(all[1].raw_text, "Risotto");

        let some = load_captions(&path, Some(2)).unwrap();
        assert_eq!(some.len(), 2);
        assert_eq!(some[1].id.to_string(), "b");
    }

    #[test]
    fn test_load_captions_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_captions(&dir.path().join("absent.json"), None);
        assert!(matches!(result, Err(CliError::InvalidInput(_))));
    }

    #[test]
    fn test_load_captions_not_an_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("captions.json");
        fs::write(&path, r#"{"id": "a"}"#).unwrap();
        assert!(matches!(
            load_captions(&path, None),
            Err(CliError::Serialization(_))
        ));
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database = Some(dir.path().join("r.db"));

        assert!(matches!(build_engine(&config, None), Err(CliError::Config(_))));
        assert!(matches!(build_engine(&config, Some("  ")), Err(CliError::Config(_))));
    }

    #[test]
    fn test_open_store_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database = Some(dir.path().join("nested").join("r.db"));

        open_store(&config).unwrap();
        assert!(dir.path().join("nested").exists());
    }
}
