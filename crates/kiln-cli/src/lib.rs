//! Command-line flags and validation for the kiln bootstrap binary.
//!
//! The clap-backed [`Cli`] is shared by the binary and the adapters in
//! `kiln-provider` that convert CLI enums into their domain counterparts.

pub mod cli_args;
pub mod cli_types;
pub mod validation;

pub use cli_args::Cli;
pub use cli_types::*;
pub use validation::*;
