//! This module contains the core logic of the padpin sticky-session proxy.
//!
//! It defines the main modules for configuration, affinity routing, and the
//! proxy service.

pub mod config;
pub mod proxy;
pub mod service;
