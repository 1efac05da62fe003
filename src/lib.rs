// Portal administrators and their passwords
pub mod admin;

// HTTP API
pub mod api;

// Basic credential extraction
pub mod auth;

// File and environment configuration
pub mod config;

// Encrypted integration settings and OAuth tokens
pub mod credentials;

pub mod error;
pub mod integration;
pub mod models;

// OAuth authorization flow and token lifecycle
pub mod oauth;

// Service wiring
pub mod portal;

// Authenticated QuickBooks and Gmail clients
pub mod remote;

// Invoice lookup and inquiry sync
pub mod sync;

#[cfg(test)]
mod test_support;
