pub mod auth;
pub mod chat;
pub mod config;
pub mod context;
pub mod conversations;
pub mod credentials;
pub mod error;
pub mod llm;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod state;
