pub mod evaluator;
pub mod rate_limiter;

pub use evaluator::PermissionEvaluator;
pub use rate_limiter::{
    Admission, RateLimitError, RateLimitKey, RateLimitStatus, RateLimiter,
    DEFAULT_MAX_QUEUE_DEPTH,
};
