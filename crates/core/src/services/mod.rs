//! Services that coordinate the core model with external toolchains.

pub mod languages;
