//! Nudge is a session-scoped hint cache for coding agents.
//!
//! # Overview
//! Hints live in an in-memory store indexed by a two-level
//! `(component, key)` namespace. Each entry carries metadata (scope
//! predicates, priority, confidence, tags, TTL, frecency counters) and is
//! retrieved through context-aware scoring that returns the best match for
//! the caller's current environment. This crate holds the core:
//!
//! - Typed data model and snapshot schema
//! - CRUD store with optimistic concurrency, quotas and TTL eviction
//! - Scope predicate matching against a runtime context
//! - Weighted scoring with human-readable match explanations
//! - Secret/path safety guard consulted before writes
//! - The RPC schema shared by the server, the proxy and the client

/// Error types and the wire error taxonomy
pub mod error;

/// Hints, metadata, scopes, contexts and the snapshot tree
pub mod model;

/// Scope predicate evaluation and glob matching
pub mod matching;

/// The RPC surface: method names, parameter/result schemas, dispatch
pub mod rpc;

/// Secret detection and path/glob validation
pub mod safety;

/// Frecency/priority/confidence/specificity/recency blending and ranking
pub mod scoring;

/// The in-memory `(component, key)` store
pub mod store;

pub use error::{ErrorCode, NudgeError};
pub use model::{Context, Hint, HintMeta, HintValue, MatchExplanation, RankedHint, Scope};
pub use store::Store;
