//! roomwatch - streams chat room messages into a local processing inbox
//!
//! This library crate exposes internal modules for integration testing.

pub mod config;
pub mod data;
pub mod inbox;
pub mod integrations;
pub mod lifecycle;
pub mod supervisor;
