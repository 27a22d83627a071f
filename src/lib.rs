pub mod assemble;
pub mod auth;
pub mod config;
pub mod draft;
pub mod export;
pub mod fallback;
pub mod http_client;
pub mod media;
pub mod model;
pub mod narrative;
pub mod rest_store;
pub mod sanitize;
pub mod sqlite_store;
pub mod state;
pub mod store;
pub mod sync;
pub mod views;
