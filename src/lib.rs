pub mod auth;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod expiry;
pub mod handlers;
pub mod id;
pub mod middleware;
pub mod models;
pub mod reader;
pub mod server;
pub mod state;
pub mod storage;
pub mod sweeper;
pub mod upload;
pub mod utils;
