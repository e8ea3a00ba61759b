//! wttr-gate - a rate-limited, cache-backed weather proxy
//!
//! Every inbound request passes a blacklist check and a multi-window rate
//! limiter, is located through an ordered chain of IP geolocation providers,
//! and is answered from an on-disk cache or a single upstream weather fetch.
//!
//! # Architecture
//! - `api`: HTTP handlers and status mapping
//! - `cache`: purpose-partitioned on-disk cache (TTL and LRU)
//! - `config`: configuration loading, validation and credentials
//! - `services`: blacklist, rate limiter, geolocation, weather backends, request log
//! - `runtime`: startup assembly, maintenance task and server loop
//! - `system`: logging and panic reporting

pub mod api;
pub mod cache;
pub mod config;
pub mod errors;
pub mod runtime;
pub mod services;
pub mod system;
pub mod utils;
