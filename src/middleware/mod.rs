//! Request middleware, in the order the router stacks them.

pub mod headers;
pub mod jwt;
pub mod logging;
pub mod metrics;
pub mod translations;

pub use headers::{no_cache, options, secure};
pub use jwt::require_jwt;
pub use logging::access_log;
pub use metrics::Metrics;
pub use translations::{translations, Locale};
