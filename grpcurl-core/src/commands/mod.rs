//! CLI-facing command implementations, built on top of the descriptor source,
//! transcoder, and RPC driver. Each submodule corresponds to one CLI verb.

pub mod describe;
pub mod invoke;
pub mod list;
