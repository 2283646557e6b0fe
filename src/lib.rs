//! Relief is a terminal client for the Relief chat service: a remote REST
//! backend that meters conversations with per-account chat credits sold as
//! one-time purchases.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`api`] defines the request/response payloads for every backend endpoint
//!   and the [`api::client::ChatBackend`] trait, with the `reqwest`-based
//!   implementation used at runtime.
//! - [`core`] owns the protocol logic: the quota tracker that mirrors the
//!   backend's credit ledger, the purchase reconciler that submits each
//!   billing token to verification at most once, and the persisted profile
//!   that survives restarts.
//! - [`cli`] parses command-line arguments and drives the interactive chat
//!   loop and the account, history, and redemption commands.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`cli::run_cli`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
