//! # Shopdesk Core
//!
//! Runtime-agnostic logic for Shopdesk: catalog and order models, the
//! record store gateway abstraction, the semantic index, the hybrid
//! product retriever, and the bounded conversation window.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! Concrete gateways, embedding providers, and index persistence live in
//! the `shopdesk` app crate.

pub mod conversation;
pub mod embedding;
pub mod index;
pub mod models;
pub mod retrieval;
pub mod store;
