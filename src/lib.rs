//! # RAG Concierge
//!
//! A chat backend that answers questions from a local knowledge base and
//! runs a scripted lead-capture dialogue when a visitor asks about pricing,
//! quotes, or getting in touch.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌───────────┐
//! │ knowledge_   │──▶│  Chunk +     │──▶│  SQLite    │
//! │ base/*.txt   │   │  Embed       │   │  vectors   │
//! └──────────────┘   └─────────────┘   └─────┬─────┘
//!                                            │ search
//!   POST /chat ──▶ SessionStore ──▶ ConversationController
//!                                   │          │          │
//!                                   ▼          ▼          ▼
//!                              intent      generator    notify
//!                              detector    (Ollama)     (SMTP)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! concierge index                   # build the knowledge index
//! concierge search "automation"     # check retrieval
//! concierge serve                   # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with environment overrides |
//! | [`models`] | Core data types |
//! | [`connector_fs`] | Knowledge base file discovery |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`ingest`] | Index build |
//! | [`knowledge`] | Top-k retrieval |
//! | [`search`] | `concierge search` command |
//! | [`generator`] | Answer generation |
//! | [`greeting`] | Greeting prefixes |
//! | [`intent`] | Lead-intent detection |
//! | [`notify`] | Lead notification email |
//! | [`session`] | Sessions and the session store |
//! | [`controller`] | Conversation state machine |
//! | [`server`] | HTTP API |
//! | [`error`] | Domain error types |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod connector_fs;
pub mod controller;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod greeting;
pub mod ingest;
pub mod intent;
pub mod knowledge;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod search;
pub mod server;
pub mod session;
