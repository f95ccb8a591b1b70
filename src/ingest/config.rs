// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ingest::providers::gnews::{DEFAULT_QUERY, GNEWS_SEARCH_URL};
use crate::ingest::providers::{FeedProvider, GNewsProvider};
use crate::ingest::types::SourceProvider;

pub const ENV_SOURCES_PATH: &str = "SOURCES_CONFIG_PATH";

/// Company blogs polled when no sources file is present.
const BUILTIN_FEEDS: &[(&str, &str)] = &[
    ("OpenAI", "https://openai.com/blog/rss.xml"),
    ("Anthropic", "https://www.anthropic.com/news/rss"),
    ("Google AI", "https://blog.google/technology/ai/rss/"),
    ("DeepMind", "https://deepmind.google/blog/rss.xml"),
    ("Hugging Face", "https://huggingface.co/blog/feed.xml"),
    ("Meta AI", "https://ai.meta.com/blog/rss/"),
    ("Mistral AI", "https://mistral.ai/feed.xml"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySource {
    pub name: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_query")]
    pub query: String,
    /// Name of the env var holding the API key (the key itself never lives in config).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_endpoint() -> String {
    GNEWS_SEARCH_URL.to_string()
}
fn default_query() -> String {
    DEFAULT_QUERY.to_string()
}
fn default_api_key_env() -> String {
    "GNEWS_API_KEY".to_string()
}
fn default_max_results() -> u32 {
    10
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default, rename = "feed")]
    pub feeds: Vec<FeedSource>,
    #[serde(default, rename = "query")]
    pub queries: Vec<QuerySource>,
}

impl SourcesConfig {
    pub fn builtin() -> Self {
        Self {
            feeds: BUILTIN_FEEDS
                .iter()
                .map(|(name, url)| FeedSource {
                    name: name.to_string(),
                    url: url.to_string(),
                })
                .collect(),
            queries: vec![QuerySource {
                name: "GNews".to_string(),
                endpoint: default_endpoint(),
                query: default_query(),
                api_key_env: default_api_key_env(),
                max_results: default_max_results(),
            }],
        }
    }

    pub fn len(&self) -> usize {
        self.feeds.len() + self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build providers. Query keys are resolved through `lookup` (normally the env).
    pub fn into_providers<F>(self, client: reqwest::Client, lookup: F) -> Vec<Arc<dyn SourceProvider>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out: Vec<Arc<dyn SourceProvider>> = Vec::with_capacity(self.len());
        for f in self.feeds {
            out.push(Arc::new(FeedProvider::from_url(f.name, f.url, client.clone())));
        }
        for q in self.queries {
            let key = lookup(&q.api_key_env);
            if key.is_none() {
                tracing::warn!(target: "ingest", source = %q.name, env = %q.api_key_env, "query source has no api key; it will fail every fetch");
            }
            out.push(Arc::new(GNewsProvider::new(
                q.name,
                q.endpoint,
                q.query,
                key,
                q.max_results,
                client.clone(),
            )));
        }
        out
    }
}

/// Load sources from an explicit path. Supports TOML or JSON formats.
pub fn load_sources_from(path: &Path) -> Result<SourcesConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
}

/// Load sources using env var + fallbacks:
/// 1) $SOURCES_CONFIG_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
/// 4) built-in list
pub fn load_sources_default() -> Result<SourcesConfig> {
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        } else {
            return Err(anyhow!("{ENV_SOURCES_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    let json_p = PathBuf::from("config/sources.json");
    if json_p.exists() {
        return load_sources_from(&json_p);
    }
    Ok(SourcesConfig::builtin())
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<SourcesConfig> {
    let parsed = if hint_ext == "json" {
        serde_json::from_str::<SourcesConfig>(s).context("parsing sources json")?
    } else {
        toml::from_str::<SourcesConfig>(s)
            .or_else(|toml_err| {
                serde_json::from_str::<SourcesConfig>(s)
                    .map_err(|_| anyhow!("unsupported sources format: {toml_err}"))
            })?
    };
    let cleaned = clean(parsed);
    if cleaned.is_empty() {
        return Err(anyhow!("sources config lists no usable sources"));
    }
    Ok(cleaned)
}

/// Trim names/urls, drop empty entries and repeated names (first wins).
fn clean(cfg: SourcesConfig) -> SourcesConfig {
    let mut names = BTreeSet::new();
    let feeds = cfg
        .feeds
        .into_iter()
        .map(|f| FeedSource {
            name: f.name.trim().to_string(),
            url: f.url.trim().to_string(),
        })
        .filter(|f| !f.name.is_empty() && !f.url.is_empty())
        .filter(|f| names.insert(f.name.clone()))
        .collect();
    let queries = cfg
        .queries
        .into_iter()
        .map(|mut q| {
            q.name = q.name.trim().to_string();
            q
        })
        .filter(|q| !q.name.is_empty())
        .filter(|q| names.insert(q.name.clone()))
        .collect();
    SourcesConfig { feeds, queries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn toml_and_json_parse_with_defaults_and_cleanup() {
        let toml = r#"
[[feed]]
name = " OpenAI "
url = "https://openai.com/blog/rss.xml"

[[feed]]
name = "OpenAI"
url = "https://duplicate.example/rss"

[[feed]]
name = ""
url = "https://nameless.example/rss"

[[query]]
name = "GNews"
query = "LLM"
"#;
        let cfg = parse_sources(toml, "toml").unwrap();
        assert_eq!(cfg.feeds.len(), 1);
        assert_eq!(cfg.feeds[0].name, "OpenAI");
        assert_eq!(cfg.queries[0].endpoint, GNEWS_SEARCH_URL);
        assert_eq!(cfg.queries[0].api_key_env, "GNEWS_API_KEY");
        assert_eq!(cfg.queries[0].max_results, 10);

        let json = r#"{"feed":[{"name":"HF","url":"https://huggingface.co/blog/feed.xml"}]}"#;
        let cfg = parse_sources(json, "json").unwrap();
        assert_eq!(cfg.len(), 1);
        assert!(cfg.queries.is_empty());
    }

    #[test]
    fn empty_config_is_rejected() {
        assert!(parse_sources("", "toml").is_err());
    }

    #[test]
    fn builtin_covers_blogs_and_query_api() {
        let b = SourcesConfig::builtin();
        assert_eq!(b.feeds.len(), 7);
        assert_eq!(b.queries.len(), 1);
        let providers = b.into_providers(reqwest::Client::new(), |_| None);
        assert_eq!(providers.len(), 8);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        // Isolate CWD so a real config/ dir in the repo does not interfere
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        env::remove_var(ENV_SOURCES_PATH);

        // No files → built-in list
        let v = load_sources_default().unwrap();
        assert_eq!(v, SourcesConfig::builtin());

        // Env wins
        let p_json = tmp.path().join("sources.json");
        fs::write(&p_json, r#"{"feed":[{"name":"X","url":"https://x.example/rss"}]}"#).unwrap();
        env::set_var(ENV_SOURCES_PATH, p_json.display().to_string());
        let v2 = load_sources_default().unwrap();
        assert_eq!(v2.feeds[0].name, "X");
        env::remove_var(ENV_SOURCES_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
