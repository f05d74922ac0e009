use crate::cli::cache::{CacheOptions, GetOptions};
use crate::config::{Config, ConfigProperties};
use crate::error;
use crate::http::{HttpSource, Method};
use crate::interceptor::CacheInterceptor;
use crate::operation::{CacheOperation, CachePriority, Operation};
use crate::persistence::FileStore;
use crate::request::PlainRequestMetadata;
use crate::response::CacheResult;
use crate::serialisation::StoreType;
use crate::time::Seconds;
use crate::Result;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

/// Response type under which `rc get` caches bodies.
const RESPONSE_TYPE: &str = "String";

pub fn execute(options: CacheOptions, config: Arc<Config>) -> Result<()> {
    let mut stdout = std::io::stdout();
    match options {
        CacheOptions::Info => info(&mut stdout, config),
        CacheOptions::Stats => {
            let interceptor = CacheInterceptor::builder(config).build()?;
            write!(stdout, "{}", interceptor.statistics()?)?;
            Ok(())
        }
        CacheOptions::Clear { stale_only } => {
            let interceptor = CacheInterceptor::builder(config).build()?;
            interceptor.clear_all(stale_only)?;
            if stale_only {
                writeln!(stdout, "Stale entries cleared")?;
            } else {
                writeln!(stdout, "Cache cleared")?;
            }
            Ok(())
        }
        CacheOptions::Invalidate { url, response_type } => {
            let interceptor = CacheInterceptor::builder(config).build()?;
            let mut offline =
                |_: Option<Seconds>| -> Result<String> { Err(error::gen("Network not used")) };
            let results = interceptor.execute(
                Some(Operation::Invalidate),
                PlainRequestMetadata::new(response_type, url),
                &mut offline,
            );
            print_results(&mut stdout, &results)
        }
        CacheOptions::Get(options) => {
            let operation = get_operation(&options, config.as_ref());
            let interceptor = CacheInterceptor::builder(config).build()?;
            let mut source = http_source(options)?;
            let request = source.request_metadata(RESPONSE_TYPE);
            let results = interceptor.execute(Some(operation), request, &mut source);
            print_results(&mut stdout, &results)
        }
    }
}

fn info<W: Write>(writer: &mut W, config: Arc<Config>) -> Result<()> {
    match config.store_type() {
        StoreType::File => {
            let store = FileStore::new(config)?;
            let size = store.size()?;
            writeln!(writer, "Location: {}", store.location().display())?;
            writeln!(writer, "Size: {}", BytesToHumanReadable::from(size))?;
        }
        StoreType::Memory => {
            writeln!(
                writer,
                "Location: in memory, up to {} entries",
                config.memory_capacity()
            )?;
        }
    }
    Ok(())
}

/// An explicit `--operation` wins. Otherwise the call is cached with the
/// given priority, or `CACHED_OR_NETWORK`, for the given time to live, or the
/// configured default duration.
fn get_operation<C: ConfigProperties + ?Sized>(options: &GetOptions, config: &C) -> Operation {
    if let Some(operation) = &options.operation {
        return operation.clone();
    }
    Operation::Cache(CacheOperation {
        priority: options.priority.unwrap_or(CachePriority::CACHED_OR_NETWORK),
        duration: options.ttl.unwrap_or_else(|| config.default_cache_duration()),
        connectivity_timeout: options.timeout,
        encrypt: options.encrypt.then_some(true),
        compress: options.compress.then_some(true),
    })
}

fn http_source(options: GetOptions) -> Result<HttpSource> {
    let mut builder = HttpSource::builder();
    builder.url(options.url);
    if let Some(body) = options.body {
        builder.method(Method::Post).body(body);
    }
    Ok(builder.build()?)
}

fn print_results<W: Write>(writer: &mut W, results: &[CacheResult<String>]) -> Result<()> {
    for result in results {
        let token = &result.metadata().token;
        writeln!(writer, "Status: {}", result.status())?;
        if let Some(cache_date) = token.cache_date {
            writeln!(writer, "Cached: {}", cache_date.to_local_date())?;
        }
        if let Some(expiry_date) = token.expiry_date {
            writeln!(writer, "Expires: {}", expiry_date.to_local_date())?;
        }
        if let Some(exception) = result.exception() {
            writeln!(writer, "Error: {exception}")?;
        }
        if let Some(body) = result.payload() {
            writeln!(writer)?;
            writeln!(writer, "{body}")?;
        }
    }
    Ok(())
}

struct BytesToHumanReadable(u64);

impl From<u64> for BytesToHumanReadable {
    fn from(size: u64) -> Self {
        BytesToHumanReadable(size)
    }
}

impl fmt::Display for BytesToHumanReadable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let suffixes = ["B", "KB", "MB", "GB"];
        let mut size = self.0 as f64;
        let mut i = 0;
        while size >= 1024.0 && i < suffixes.len() - 1 {
            size /= 1024.0;
            i += 1;
        }
        write!(f, "{:.2} {}", size, suffixes[i])
    }
}
