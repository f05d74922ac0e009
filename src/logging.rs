//! Logging macros. All records go under the `rcache` target so they can be
//! filtered with `RUST_LOG=rcache=debug` independently of the host program.

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => (
        {
            info!(target: "rcache", $($arg)*);
        }
    );
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => (
        {
            debug!(target: "rcache", $($arg)*);
        }
    );
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => (
        {
            warn!(target: "rcache", $($arg)*);
        }
    );
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => (
        {
            error!(target: "rcache", $($arg)*);
        }
    );
}
