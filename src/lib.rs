//! Aigate - metered billing gateway for OpenAI-compatible LLM APIs.
//!
//! Authenticates API keys against a billing store, estimates and admits
//! requests against per-account balances in tenge, proxies completions to a
//! configured upstream, and debits the actual cost in one locked transaction.

pub mod api;
pub mod auth;
pub mod billing;
pub mod cli;
pub mod config;
pub mod logging;
pub mod store;
pub mod upstream;
