//! The classroom server: storage and AI adapters behind the core ports, plus
//! the HTTP and WebSocket surface.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;

#[cfg(test)]
mod test_support;
