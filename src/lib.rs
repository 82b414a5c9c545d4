pub mod config;
pub mod llm_client;
pub mod log_store;
pub mod pipeline;
pub mod prompt;
pub mod scaffolding;
pub mod server;
pub mod session;
pub mod tools;
pub mod users;
