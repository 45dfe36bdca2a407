//! # parro
//!
//! Backend for a parish information app: authentication, daily
//! liturgical content, calendar events, push notifications, and an AI
//! chat assistant grounded in parish documents through a
//! retrieval-augmented-generation pipeline.
//!
//! Everything heavy is delegated to hosted services over their public
//! HTTP APIs — Supabase (auth, tables), Pinecone (vector index), OpenAI
//! (embeddings, chat, moderation), Firebase Cloud Messaging (push),
//! Resend (email), Redis (rate limiting, response cache). This crate is
//! the glue: validation, configuration wiring, the ingestion pipeline,
//! and response shaping.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────┐   ┌───────────┐
//! │ Documents   │──▶│ Ingest pipeline   │──▶│ Pinecone  │
//! │ md/txt/pdf  │   │ chunk+meta+embed │   │ (vectors) │
//! └────────────┘   └──────────────────┘   └─────┬─────┘
//!                      local catalog (SQLite)    │
//!                      ┌─────────────────────────┤
//!                      ▼                         ▼
//!                 ┌──────────┐            ┌────────────┐
//!                 │   CLI    │            │  HTTP API  │
//!                 │ (parro)  │            │ auth/chat/…│
//!                 └──────────┘            └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`connector_fs`] | Filesystem document connector |
//! | [`chunk`] | Markdown-aware chunking |
//! | [`metadata`] | Pastoral metadata enrichment |
//! | [`embedding`] | OpenAI embedding provider |
//! | [`index`] | Pinecone vector index client |
//! | [`retrieval`] | Query expansion, RRF, threshold filtering |
//! | [`chat`] | Assistant engine and guardrails |
//! | [`calendar`] | ICS feed parsing and filters |
//! | [`supabase`] | Auth and table adapter |
//! | [`daily`] | Saint and gospel of the day |
//! | [`notify`] | FCM push notifications |
//! | [`mail`] | Resend transactional email |
//! | [`ratelimit`] | Fail-open fixed-window rate limiter |
//! | [`cache`] | Chat response cache |
//! | [`server`] | App HTTP API |

pub mod cache;
pub mod calendar;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod connector_fs;
pub mod daily;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod extract;
pub mod get;
pub mod index;
pub mod ingest;
pub mod mail;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod ratelimit;
pub mod resources;
pub mod retrieval;
pub mod server;
pub mod sources;
pub mod stats;
pub mod supabase;
pub mod tz;
