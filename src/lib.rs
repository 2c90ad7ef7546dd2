pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod model;
pub mod server;
pub mod storage;
