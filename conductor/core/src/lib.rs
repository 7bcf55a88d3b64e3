//! MARK Core - Headless Assistant Orchestration
//!
//! This crate provides the core logic of the MARK terminal assistant,
//! completely independent of any terminal library. A surface (the `mark` CLI,
//! or a test harness) feeds it user input and renders what it produces.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Surface (mark CLI)                         │
//! │   stdin loop ─ Ctrl-C handler ─ TerminalSink ─ file-backed stores  │
//! └───────────────┬───────────────────────────────▲──────────────────┘
//!                 │ handle_input(line)             │ DisplaySink
//! ┌───────────────┼───────────────────────────────┼──────────────────┐
//! │               ▼        MARK CORE               │                  │
//! │  ┌───────────────────────────────────────────────────────────┐   │
//! │  │                        Conductor                           │   │
//! │  │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌────────────┐  │   │
//! │  │  │ Commands │  │ Context  │  │  Kleos   │  │   Config   │  │   │
//! │  │  └──────────┘  └──────────┘  └──────────┘  └────────────┘  │   │
//! │  └─────────────────────────┬─────────────────────────────────┘   │
//! │                            │ StreamOrchestrator                   │
//! │  ┌─────────────────────────▼─────────────────────────────────┐   │
//! │  │     Provider: Gemini │ Groq │ Ollama │ Local GGUF          │   │
//! │  └───────────────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Conductor`]: owns provider, context and configuration; dispatches input
//! - [`Provider`]: capability contract implemented by every backend adapter
//! - [`StreamOrchestrator`]: drives a fragment stream into a [`DisplaySink`]
//! - [`KleosPipeline`]: multi-stage prompt refinement
//! - [`ConversationContext`]: bounded history owned by the conductor
//!
//! # Quick Start
//!
//! ```ignore
//! use mark_core::{backend::create_provider, config::load_config, CancelToken, Conductor};
//!
//! let config = load_config()?;
//! let provider = create_provider(&config.default_provider, key.as_deref(),
//!     &config.default_model, &config.provider_settings())?;
//! let mut conductor = Conductor::new(config, Some(provider), memory, log);
//!
//! let outcome = conductor
//!     .handle_input("Hello!", &mut sink, &mut prompter, &CancelToken::new())
//!     .await;
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: provider contract, adapters, usage accounting, factory
//! - [`commands`]: slash command parsing
//! - [`conductor`]: main Conductor struct and the send path
//! - [`config`]: TOML configuration and system prompts
//! - [`kleos`]: the Kleos refinement pipeline
//! - [`memory`]: persistence collaborator traits and memory commands
//! - [`messages`]: conversation and display value types
//! - [`session`]: conversation context
//! - [`streaming`]: stream orchestrator and cancellation
//!
//! # No Terminal Dependencies
//!
//! This crate has **zero** dependencies on crossterm, ratatui, or any other
//! terminal library. It's pure business logic that can be used anywhere.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod commands;
pub mod conductor;
pub mod config;
pub mod kleos;
pub mod memory;
pub mod messages;
pub mod session;
pub mod streaming;

// Re-exports for convenience
pub use backend::{
    create_provider, ChatRequest, Provider, ProviderError, ProviderKind, ProviderSettings,
    StreamingToken, UsageStats,
};
pub use commands::{MemoryAction, SlashCommand};
pub use conductor::{
    CommandOutcome, Conductor, InputOutcome, ResponseStats, SendOutcome,
};
pub use messages::{DisplayStyle, Message, MessageRole, NotifyLevel, ResponseMetadata};
pub use session::ConversationContext;

// Kleos exports
pub use kleos::{
    KleosConfig, KleosOutcome, KleosPhase, KleosPipeline, KleosState, Language, UserPrompter,
};

// Memory exports
pub use memory::{ConversationLog, CredentialStore, MemoryRecord, MemoryService};

// Streaming exports
pub use streaming::{
    CancelToken, DisplayMode, DisplaySink, OrchestratorConfig, StreamOrchestrator, StreamOutcome,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, mark_home, save_config, ConfigError,
    ConfigOverrides, ConfigSource, MarkConfig, MarkToml,
};
