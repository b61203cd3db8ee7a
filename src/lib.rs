//! Purpose: Native library resolution and extraction shared by the `nativeload` CLI and embedders.
//! Exports: `api` (resolver, resources, configuration, errors, process-wide entry points).
//! Role: Library crate root; everything callers need is re-exported through `api`.
//! Invariants: `core` stays crate-private; `api` is the only supported path into it.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
mod core;
