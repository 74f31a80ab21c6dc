//! Core library for programmatic gRPC server introspection and invocation.
//!
//! This crate is the engine behind the `grpcurl` CLI but has no dependency on
//! any particular CLI framework: it exposes a polymorphic descriptor source,
//! a dynamic (reflection-based) message transcoder, and an RPC driver that
//! implements all four gRPC streaming shapes over a uniform event interface.

pub mod codec;
pub mod commands;
pub mod connection;
pub mod descriptor;
pub mod descriptor_text;
pub mod error;
pub mod format;
pub mod metadata;
pub mod reflection;
