//! # Sequence-to-Sequence Orchestration
//!
//! A module composing three compiled graphs — encoder, decoder, and
//! decoder-with-past — into a single autoregressive generation contract.
//!
//! ## Overview
//!
//! Recomputing a full decoder graph from scratch each step is quadratic in
//! sequence length. Splitting the decoder into a "no past" graph (run once)
//! and a "with past" graph (run per step over exactly one new token plus
//! the cached key/value state) keeps each step's compiled graph small and
//! fast, at the cost of managing two decoder graphs and the cache between
//! them. This module owns that cache lifecycle and hides the decomposition
//! behind one generation call.
//!
//! ## Key Components
//!
//! * [`Seq2SeqModel`] - the model seam the state machine drives
//! * [`KvCache`] - append-only per-layer key/value state, one per in-flight
//!   generation
//! * [`Seq2SeqOrchestrator`] - queued submission, one generation in flight,
//!   tokens streamed back as they are produced
//! * [`Sampler`] - token selection seam, [`Greedy`] built in
//!
//! ## Generation state machine
//!
//! ```text
//! Init ──► Encoding ──► Decoding(0) ──► Decoding(n) ──► Done
//! ```
//!
//! The encoder runs once over the full input; the decoder-without-past run
//! produces the first logits and the initial cache; every later step feeds
//! the single newly selected token plus the cache into the with-past graph.
//! The cache's sequence length grows by exactly one per step and the
//! encoder hidden state is never recomputed. Generation stops at the
//! configured maximum, on the end token, or when the sampler says stop.
//!
//! ## Concurrency
//!
//! One orchestrator instance owns at most one in-flight generation. Extra
//! submissions queue behind it and are served strictly in order; they are
//! never interleaved, because the cache is append-only and not isolated
//! between calls. Dropping the returned stream cancels the generation at
//! the next step; the cache is discarded with it.

mod cache;
mod core_trait;
mod decoding;
mod generation;
mod queue_item;
mod sampler;
mod stream;

pub use cache::{KvCache, LayerKv};
pub use core_trait::Seq2SeqModel;
pub use decoding::GenerationConfig;
pub use generation::Seq2SeqOrchestrator;
pub use sampler::{Greedy, Sampler, Selection};
pub use stream::{OutputStream, TokenStream};
