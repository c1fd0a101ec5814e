//! Core runtime of a clustered filesystem client/server.
//!
//! The running process hosts a [`graph`] of stackable **translators**, each
//! implementing the same filesystem operation vocabulary through the
//! [`xlator`] module's `Xlator` trait. A call enters at the graph's top
//! translator, *winds* down through children via the [`frame`] machinery,
//! and *unwinds* a correlated reply back up. One leaf translator,
//! [`kv`], terminates the graph on an embedded key/value store layered
//! over a host directory tree. [`bootstrap`] wires a parsed volume
//! specification, an optional [`specfetch`] round-trip to a remote spec
//! server, and a FUSE mountpoint into a running [`bootstrap::Context`].

pub mod bootstrap;
pub mod context;
pub mod dict;
pub mod frame;
pub mod graph;
pub mod kv;
pub mod specfetch;
pub mod types;
pub mod unix_fs;
pub mod xlator;

pub use context::Context;
pub use types::errors::{ErrorKind, FuseResult, PosixError};
