//! Web-grounded chat assistant.
//!
//! A user turn optionally runs a web search, folds the results into a
//! completion request together with the conversation so far, and records the
//! reply. The `web` module serves this over HTTP with one conversation per
//! session.

pub mod chat;
pub mod config;
pub mod model;
pub mod prompt;
pub mod search;
pub mod web;

#[cfg(test)]
mod test_support;
