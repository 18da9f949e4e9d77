//! WASM bindings for graphkit.
//!
//! [`WasmPlot`] wraps a plot surface over an in-memory display list that the
//! page paints onto a `<canvas>`. [`WasmGraphRunner`] advances one graph a
//! batch of steps at a time so long runs can report progress between frames.

mod plot;
mod runner;
mod shared;

pub use plot::WasmPlot;
pub use runner::WasmGraphRunner;
