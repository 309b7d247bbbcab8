//! Retry classification and backoff timing.

pub mod backoff;
pub mod sleeper;

pub use backoff::{
    BackoffPolicy, RETRYABLE_STATUS_CODES, backoff_center, delay_for, is_retryable,
    is_retryable_message,
};
pub use sleeper::{Sleeper, ThreadSleeper};
