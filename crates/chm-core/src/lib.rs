#![deny(missing_docs)]
#![doc = "Core types shared by the character-history MCMC crates: the structured error taxonomy, deterministic RNG handles and rooted phylogenetic trees."]

pub mod errors;
pub mod rng;
pub mod tree;

pub use errors::{ChmError, ErrorInfo};
pub use rng::{derive_substream_seed, RngHandle};
pub use tree::Tree;
