//! capstan: a hot-reloading catalog of agents and skills driven through a
//! bounded tool-calling conversation loop.
//!
//! Agents (YAML/JSON files) and skills (`SKILL.md` directories) are parsed,
//! validated and registered by one generic pipeline
//! ([`loader`], [`registry`], [`watcher`]). The [`router`] picks an agent
//! for a request, the [`matcher`] ranks skills for a task, and
//! [`conversation`] runs the model/tool exchange through the
//! [`tools`] executor.

pub mod capability;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod injector;
pub mod loader;
pub mod manager;
pub mod matcher;
pub mod models;
pub mod policy;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod skills;
pub mod tools;
pub mod watcher;

pub use error::{CapabilityError, Result};
