use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use ollqd_core::tasks::DEFAULT_MAX_FINISHED;

/// Gateway configuration.
///
/// Layers, lowest precedence first: built-in defaults, a TOML or JSON file,
/// environment variables, then CLI flags (applied by the binary).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub worker: WorkerConfig,
    pub ollama: OllamaConfig,
    pub tasks: TasksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Empty means any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_allowed_origins: Vec::new(),
        }
    }
}

/// Worker that runs indexing and chat streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub url: String,
    /// Connect timeout in seconds. Streams themselves are never timed out.
    pub connect_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:50051".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub url: String,
    /// Connect timeout in seconds. Pulls themselves run unbounded.
    pub connect_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    /// Finished records kept before the oldest are evicted. 0 keeps all.
    pub max_finished: usize,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            max_finished: DEFAULT_MAX_FINISHED,
        }
    }
}

impl Config {
    /// Load configuration. Evaluation order for the file layer:
    /// 1) `explicit` (the `--config` flag),
    /// 2) `$OLLQD_CONFIG_PATH`,
    /// 3) `ollqd.toml`, `ollqd.json`, `config/ollqd.toml`, `config/ollqd.json`,
    /// 4) defaults if none exist.
    ///
    /// Environment variables are applied on top.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var("OLLQD_CONFIG_PATH").ok().map(PathBuf::from))
            .or_else(Self::find_default_file);

        let mut config = match path {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from `lookup`, which maps an environment variable name
    /// to its value.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("SERVER_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("invalid SERVER_PORT {port:?}"))?;
        }
        if let Some(origins) = lookup("CORS_ALLOWED_ORIGINS") {
            self.server.cors_allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(url) = lookup("WORKER_URL") {
            self.worker.url = url;
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.ollama.url = url;
        }
        if let Some(max) = lookup("TASKS_MAX_FINISHED") {
            self.tasks.max_finished = max
                .trim()
                .parse()
                .with_context(|| format!("invalid TASKS_MAX_FINISHED {max:?}"))?;
        }
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)
                .with_context(|| format!("invalid config {}", path.display())),
            Some("toml") | Some("tml") => toml::from_str(&contents)
                .map_err(|err| anyhow!("invalid config {}: {}", path.display(), err)),
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Self> {
        // Try TOML first, then JSON for convenience.
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })
    }

    fn find_default_file() -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &[
            "ollqd.toml",
            "ollqd.json",
            "config/ollqd.toml",
            "config/ollqd.json",
        ];

        CANDIDATES
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(|path| path.to_path_buf())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_match_local_deployment() {
        let config = Config::default();
        assert_eq!(config.listen_addr(), "0.0.0.0:8000");
        assert_eq!(config.worker.url, "http://localhost:50051");
        assert_eq!(config.ollama.url, "http://localhost:11434");
        assert_eq!(config.ollama.connect_timeout_secs, 10);
        assert_eq!(config.tasks.max_finished, 100);
    }

    #[test]
    fn toml_file_overrides_defaults_partially() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 9100\n\n[worker]\nurl = \"http://worker:8080\"\n\n[ollama]\nconnect_timeout_secs = 3\n"
        )
        .unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.worker.url, "http://worker:8080");
        assert_eq!(config.ollama.url, "http://localhost:11434");
        assert_eq!(config.ollama.connect_timeout_secs, 3);
    }

    #[test]
    fn extensionless_file_falls_back_to_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tasks": {{"max_finished": 5}}}}"#).unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.tasks.max_finished, 5);
    }

    #[test]
    fn env_layer_wins_over_file_values() {
        let vars: HashMap<&str, &str> = [
            ("SERVER_PORT", "7000"),
            ("OLLAMA_URL", "http://gpu-box:11434"),
            ("CORS_ALLOWED_ORIGINS", "http://a.test, ,http://b.test"),
            ("TASKS_MAX_FINISHED", "0"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.ollama.url, "http://gpu-box:11434");
        assert_eq!(
            config.server.cors_allowed_origins,
            vec!["http://a.test", "http://b.test"]
        );
        assert_eq!(config.tasks.max_finished, 0);
    }

    #[test]
    fn malformed_env_port_is_reported() {
        let mut config = Config::default();
        let err = config
            .apply_env(|key| (key == "SERVER_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("SERVER_PORT"));
    }
}
