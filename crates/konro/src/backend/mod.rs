//! # Execution Engine Backends
//!
//! The orchestration layer never touches kernels. It talks to an opaque
//! execution capability through two traits:
//!
//! * [`ExecutionEngine`] — loads one compiled graph into a session
//! * [`ExecutionSession`] — runs one graph over named input tensors
//!
//! A session is stateless between calls apart from backend-internal scratch
//! buffers; anything a caller needs carried across calls (key/value caches,
//! encoder state) must be passed explicitly as named tensors each call.
//!
//! The [`mock`] module provides a closure-programmable engine used by the
//! test suite and the demos. The `candle` feature adds interop with
//! [candle](https://github.com/huggingface/candle) tensors so in-process
//! candle models can stand in as sessions.

mod core_trait;
pub mod mock;

#[cfg(feature = "candle")]
pub mod candle;

pub use core_trait::{ExecutionEngine, ExecutionSession, TensorSpec, validate_named_tensors};
