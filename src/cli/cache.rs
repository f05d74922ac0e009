use clap::Parser;

use crate::error::CacheError;
use crate::operation::{CachePriority, Operation};
use crate::time::Seconds;

#[derive(Parser)]
pub enum CacheCommand {
    #[clap(name = "info", about = "Get local cache size and location")]
    Info,
    #[clap(name = "stats", about = "Show cached entries per response type")]
    Stats,
    #[clap(name = "clear", about = "Clear the cache")]
    Clear(ClearArgs),
    #[clap(name = "invalidate", about = "Mark a cached response as stale")]
    Invalidate(InvalidateArgs),
    #[clap(name = "get", about = "Fetch a URL through the cache")]
    Get(GetArgs),
}

#[derive(Parser)]
pub struct ClearArgs {
    /// Only remove entries that have expired
    #[clap(long)]
    stale_only: bool,
}

#[derive(Parser)]
pub struct InvalidateArgs {
    /// URL of the cached request
    #[clap()]
    url: String,
    /// Response type the entry was cached as
    #[clap(long = "type", default_value = "String")]
    response_type: String,
}

#[derive(Parser)]
pub struct GetArgs {
    /// URL to fetch
    #[clap()]
    url: String,
    /// Cache priority, for instance cached-or-network or fresh-only
    #[arg(long, value_parser = parse_priority, group = "explicit_operation")]
    priority: Option<CachePriority>,
    /// Time to live of the cached response (e.g. 30s, 10m, 1h, 2d)
    #[arg(long, value_parser = parse_seconds, value_name = "DURATION")]
    ttl: Option<Seconds>,
    /// How long to wait for connectivity before giving up (e.g. 5s)
    #[arg(long, value_parser = parse_seconds, value_name = "DURATION")]
    timeout: Option<Seconds>,
    /// Encrypt the cached response
    #[clap(long)]
    encrypt: bool,
    /// Compress the cached response
    #[clap(long)]
    compress: bool,
    /// Full operation in its text form, e.g. CACHE:FRESH_ONLY:3600:::
    #[arg(long, value_parser = parse_operation, group = "explicit_operation")]
    operation: Option<Operation>,
    /// Send a POST request with this body
    #[clap(long)]
    body: Option<String>,
}

fn parse_priority(value: &str) -> Result<CachePriority, String> {
    value.parse().map_err(|err: CacheError| err.to_string())
}

fn parse_seconds(value: &str) -> Result<Seconds, String> {
    Seconds::try_from(value).map_err(|err| err.to_string())
}

fn parse_operation(value: &str) -> Result<Operation, String> {
    value.parse().map_err(|err: CacheError| err.to_string())
}

pub enum CacheOptions {
    Info,
    Stats,
    Clear { stale_only: bool },
    Invalidate { url: String, response_type: String },
    Get(GetOptions),
}

#[derive(Clone, Debug, PartialEq)]
pub struct GetOptions {
    pub url: String,
    pub priority: Option<CachePriority>,
    pub ttl: Option<Seconds>,
    pub timeout: Option<Seconds>,
    pub encrypt: bool,
    pub compress: bool,
    pub operation: Option<Operation>,
    pub body: Option<String>,
}

impl From<GetArgs> for GetOptions {
    fn from(args: GetArgs) -> Self {
        GetOptions {
            url: args.url,
            priority: args.priority,
            ttl: args.ttl,
            timeout: args.timeout,
            encrypt: args.encrypt,
            compress: args.compress,
            operation: args.operation,
            body: args.body,
        }
    }
}

impl From<CacheCommand> for CacheOptions {
    fn from(command: CacheCommand) -> Self {
        match command {
            CacheCommand::Info => CacheOptions::Info,
            CacheCommand::Stats => CacheOptions::Stats,
            CacheCommand::Clear(args) => CacheOptions::Clear {
                stale_only: args.stale_only,
            },
            CacheCommand::Invalidate(args) => CacheOptions::Invalidate {
                url: args.url,
                response_type: args.response_type,
            },
            CacheCommand::Get(args) => CacheOptions::Get(args.into()),
        }
    }
}
