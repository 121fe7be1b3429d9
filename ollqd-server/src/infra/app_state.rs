use std::{fmt, sync::Arc};

use anyhow::Context;
use ollqd_core::{ChatBackend, ChatBridge, IndexingBackend, TaskRegistry, TaskService};

use crate::infra::{
    config::Config, connections::ChatConnections, ollama::OllamaClient, worker::WorkerClient,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tasks: TaskService,
    pub chat: ChatBridge,
    pub chat_connections: ChatConnections,
    pub ollama: OllamaClient,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    /// State wired to the configured worker and Ollama endpoints.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let worker = Arc::new(WorkerClient::new(&config.worker)?);
        let ollama = OllamaClient::new(&config.ollama).context("invalid Ollama settings")?;
        Ok(Self::with_backends(config, worker.clone(), worker, ollama))
    }

    /// State with explicit backends; tests plug in-memory ones here.
    pub fn with_backends(
        config: Config,
        indexing: Arc<dyn IndexingBackend>,
        chat: Arc<dyn ChatBackend>,
        ollama: OllamaClient,
    ) -> Self {
        let registry = Arc::new(TaskRegistry::with_retention(config.tasks.max_finished));
        Self {
            config: Arc::new(config),
            tasks: TaskService::new(registry, indexing),
            chat: ChatBridge::new(chat),
            chat_connections: ChatConnections::new(),
            ollama,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Cancel running tasks and drop chat connections.
    pub fn shutdown(&self) {
        self.tasks.shutdown();
        self.chat_connections.close_all();
    }
}
