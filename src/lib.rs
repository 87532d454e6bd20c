//! Nirava - a wellness companion
//!
//! A terminal companion built around the six pillars of preventative health:
//! sleep, hydration, movement, mental health, social connection and toxin
//! avoidance.
//!
//! # Overview
//!
//! A conversation moves through two phases:
//! - **Intake**: pick a journey, classify the concern and collect a daily
//!   check-in (and a profile when building a plan)
//! - **Analysis**: a sequential pipeline of specialist agents (metrics,
//!   research, planner, nutrition, coach) turns the collected data into a
//!   personal reply
//!
//! Every model-backed agent has a deterministic fallback, so the system runs
//! end to end without an API key.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use nirava::{NiravaConfig, NiravaSystem, SessionStore};
//!
//! # async fn example() -> nirava::NiravaResult<()> {
//! let config = NiravaConfig::default();
//! let mut system = NiravaSystem::new(config, None, SessionStore::in_memory(), "demo", None)?;
//!
//! println!("{}", system.greeting());
//! let reply = system.process("I can't focus at work, my brain feels foggy").await;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluation;
pub mod health;
pub mod llm;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod session;
pub mod testing;

pub use config::NiravaConfig;
pub use error::{NiravaError, NiravaResult};
pub use orchestrator::NiravaSystem;
pub use session::{Session, SessionStore};
