//! # Concierge
//!
//! Conversational link routing and appointment scheduling for a customer
//! chat assistant.
//!
//! Two subsystems sit between the chat front end and the outside world:
//!
//! - the **query router** attaches at most one authoritative link to a
//!   reply, preferring a vector-similarity match and falling back to
//!   keyword rules;
//! - the **appointment orchestrator** pulls contact details out of the
//!   conversation, picks one of four calendars, and books through a remote
//!   scheduling gateway, degrading to a customer-facing message on any
//!   failure.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐   ┌──────────────────┐
//!   user turn ──▶ │ QueryRouter  │──▶│ Semantic │Pattern│──▶ MatchResult
//!                 └──────────────┘   └──────────────────┘
//!                 ┌──────────────┐   ┌──────────────────┐
//!   history  ──▶  │ Orchestrator │──▶│  GatewayClient   │──▶ SchedulingOutcome
//!                 └──────────────┘   └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding providers (OpenAI, Ollama) |
//! | [`index`] | Index loading and offline building |
//! | [`router`] | Resolver chain and link assembly |
//! | [`gateway`] | Scheduling gateway client |
//! | [`orchestrator`] | Scheduling state machine |
//! | [`session`] | Per-session turn history |
//! | [`server`] | HTTP API |
//!
//! Pure logic (models, contact extraction, calendar selection, pattern
//! rules, similarity search) lives in the `concierge-core` crate.

pub mod config;
pub mod embedding;
pub mod gateway;
pub mod index;
pub mod orchestrator;
pub mod router;
pub mod server;
pub mod session;
