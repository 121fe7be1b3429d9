pub mod app_state;
pub mod config;
pub mod connections;
pub mod errors;
pub mod ollama;
pub mod worker;
