//! The sagaflow facade crate: wires the coordination engine (C1-C7, C9) to
//! the query & command surface (C8) and hosts the CLI binary.

pub mod commands;
pub mod runtime;

pub use commands::Commands;
pub use runtime::Runtime;
