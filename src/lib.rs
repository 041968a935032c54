//! # Shopdesk
//!
//! A customer-service assistant for an online shop. Customers ask about
//! their orders and the catalog in plain language; a reasoning engine picks
//! capability tools, and the tools answer from the relational store.
//!
//! Free-text product questions go through hybrid retrieval: a semantic
//! index proposes product ids, and the live database supplies every field
//! shown to the customer.
//!
//! ## Architecture
//!
//! ```text
//!  question ──▶ ┌──────────────┐   action   ┌──────────────┐
//!               │ Orchestrator │ ─────────▶ │ ToolRegistry │
//!  answer  ◀─── │  (sessions)  │ ◀───────── │              │
//!               └──────┬───────┘ observation└──┬────────┬──┘
//!                      │                       │        │
//!                      ▼                       ▼        ▼
//!              ReasoningEngine          RecordStore  HybridRetriever
//!              (chat completions)       (SQLite)     (index + SQLite)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! shopdesk init                 # create database
//! shopdesk seed                 # load the sample catalog and orders
//! shopdesk index build          # embed products into the semantic index
//! shopdesk search "适合夏天穿的纯棉衣服"
//! shopdesk serve                # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`seed`] | Sample catalog and orders |
//! | [`sqlite_store`] | SQLite record store |
//! | [`embedding`] | Embedding providers |
//! | [`index_store`] | Semantic index build and persistence |
//! | [`search`] | Retrieval from the command line |
//! | [`tools`] | Capability tools |
//! | [`reasoning`] | Reasoning engine and action protocol |
//! | [`orchestrator`] | Turn loop and conversation sessions |
//! | [`chat`] | Terminal conversations |
//! | [`server`] | HTTP server |
//! | [`runtime`] | Startup wiring |
//! | [`logging`] | Tracing subscriber setup |

pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod index_store;
pub mod logging;
pub mod migrate;
pub mod orchestrator;
pub mod reasoning;
pub mod runtime;
pub mod search;
pub mod seed;
pub mod server;
pub mod sqlite_store;
pub mod tools;
