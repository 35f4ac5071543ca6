//! Built-in tool implementations.
//!
//! Each sub-module exposes a `definition()` and an async `run` that takes
//! the parsed arguments, the base path and the conversation's cancel
//! token. [`register_all`] wires them into a [`ToolRegistryBuilder`].

use std::time::Duration;

use super::{handler, ToolRegistry, ToolRegistryBuilder};

pub mod count_lines;
pub mod execute_bash;
pub mod read_file;
pub mod search_files;
pub mod search_text;

#[derive(Debug, Clone)]
pub struct BuiltinOptions {
    /// Default timeout for `execute_bash` when the call gives none.
    pub command_timeout: Duration,
}

impl Default for BuiltinOptions {
    fn default() -> Self {
        Self {
            command_timeout: execute_bash::DEFAULT_TIMEOUT,
        }
    }
}

pub fn register_all(builder: &mut ToolRegistryBuilder, opts: &BuiltinOptions) {
    builder.register(read_file::definition(), handler(read_file::run));
    builder.register(search_files::definition(), handler(search_files::run));
    builder.register(search_text::definition(), handler(search_text::run));
    builder.register(count_lines::definition(), handler(count_lines::run));

    let timeout = opts.command_timeout;
    builder.register(
        execute_bash::definition(),
        handler(move |args, base, cancel| execute_bash::run(args, base, cancel, timeout)),
    );
}

/// A registry holding only the builtin tools.
pub fn default_registry(opts: &BuiltinOptions) -> ToolRegistry {
    let mut builder = ToolRegistry::builder();
    register_all(&mut builder, opts);
    builder.build()
}
