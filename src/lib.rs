//! Throttling - Distributed Rate Limiting
//!
//! This crate decides, for a named key, whether the next unit of work may
//! proceed under a quota of N events per window. Limits are enforced either
//! in process or across any number of processes that share an atomic counter
//! store such as Redis.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;

pub use error::{Result, ThrottleError};
pub use ratelimit::{CheckContext, Decision, Limiter, Mode, Options, Quota};
