//! Client module - backend, storage, feeds and the interactive loop

pub mod app;
pub mod config;
pub mod http;
pub mod logging;
pub mod poller;
pub mod push;
pub mod storage;

pub use config::Config;
pub use http::HttpApi;
pub use storage::FileStore;
