//! Conditional distribution modeling over mode-encoded tabular data.
//!
//! This crate sits between a data-transformation stage that packs mixed
//! continuous/categorical rows into a dense numeric matrix and a
//! generative-model training loop that needs conditioning vectors per
//! minibatch. [`sampler::CondSampler`] is built once from the transformed
//! matrix and its column-encoding layout, then queried concurrently:
//! balanced draws condition the generator on rare and common categories
//! alike, while empirical draws hand the discriminator conditioning that
//! matches the real data's marginals.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod common;
pub mod sampler;

#[cfg(feature = "python")]
mod python;
