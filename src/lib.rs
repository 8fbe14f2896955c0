pub mod annotation;
pub mod app;
pub mod clock;
pub mod config;
pub mod connectors;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod output;
pub mod rate_limit;
pub mod response_cache;
pub mod shared_cache;
pub mod store;
pub mod terms;
