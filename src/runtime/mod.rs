//! Application lifecycle: startup assembly, background maintenance, server loop, shutdown

pub mod lifetime;
pub mod modes;
