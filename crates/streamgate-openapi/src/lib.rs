//! OpenAPI ingestion and the semantic tool registry.
//!
//! This crate turns one or more `OpenAPI` 3.0 documents into a compact
//! (action, resource) registry:
//!
//! - [`spec`] loads and parses specs, resolves internal one-hop `$ref`s and
//!   answers security-scheme lookups per (method, path).
//! - [`resource`] derives resource names from path templates.
//! - [`action`] classifies (method, path) pairs into semantic actions.
//! - [`registry`] builds endpoint mappings and generates the semantic tools
//!   advertised over MCP.
//!
//! It intentionally contains **no** credential handling and **no** invocation
//! logic; those live in the server crate.

pub mod action;
pub mod error;
pub mod registry;
pub mod resource;
pub mod spec;
