//! HTTP 接口

pub mod constants;
pub mod services;
