pub mod cache_manager;
pub mod cli;
pub mod cmds;
pub mod config;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod metadata;
pub mod network;
pub mod operation;
pub mod persistence;
pub mod request;
pub mod response;
pub mod serialisation;
pub mod statistics;
pub mod status;
pub mod time;
pub mod token;
pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
pub mod logging;

#[macro_use]
extern crate log;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate derive_builder;

pub use cache_manager::{CacheManager, Cacheable};
pub use interceptor::{CacheInterceptor, CacheInterceptorBuilder};
pub use operation::{CacheOperation, CachePriority, Operation};
pub use response::CacheResult;
pub use status::CacheStatus;
