pub mod domain;
pub mod env;
pub mod error;
pub mod logging;
pub mod rate_limit;

pub use domain::*;
pub use error::{CoreError, Result};
pub use rate_limit::RateLimiter;
