use anyhow::Context;

/// Runtime configuration, loaded once from the environment in `main` and
/// passed down. Nothing in the pipeline reads ambient globals.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Maximum statements per atomic write batch.
    pub batch_size: usize,
    /// Reserved for a fuzzy name-matching extension; the resolver's match
    /// path is exact-only today.
    pub name_similarity_threshold: u8,
    pub classifier_api_key: Option<String>,
    pub classifier_model: String,
    pub classifier_endpoint: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;

        let batch_size = parse_env("WRITE_BATCH_SIZE", 500usize)?;
        let name_similarity_threshold = parse_env("NAME_SIMILARITY_THRESHOLD", 80u8)?;

        let classifier_api_key = std::env::var("CLASSIFIER_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        let classifier_model = std::env::var("CLASSIFIER_MODEL")
            .unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string());
        let classifier_endpoint = std::env::var("CLASSIFIER_ENDPOINT")
            .unwrap_or_else(|_| "https://api.groq.com/openai/v1/chat/completions".to_string());

        Ok(Config {
            database_url,
            batch_size,
            name_similarity_threshold,
            classifier_api_key,
            classifier_model,
            classifier_endpoint,
        })
    }
}

fn parse_env<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{name} must be a valid number, got {value:?}")),
        Err(_) => Ok(default),
    }
}
