use chm_core::derive_substream_seed;

/// Derives the deterministic seed used by the chain at `chain_index`.
pub fn chain_seed(master_seed: u64, chain_index: usize) -> u64 {
    derive_substream_seed(master_seed, chain_index as u64)
}

/// Derives the seed of the scheduler's swap stream.
pub fn swap_seed(master_seed: u64) -> u64 {
    derive_substream_seed(master_seed ^ 0xA5A5_A5A5_A5A5_A5A5, 0)
}

/// Derives the seed used to initialise the latent histories of a chain.
pub fn init_seed(master_seed: u64, chain_index: usize) -> u64 {
    derive_substream_seed(master_seed ^ 0x5A5A_5A5A_5A5A_5A5A, chain_index as u64)
}

/// Derives the seed used by forward simulation outside of a run.
pub fn simulation_seed(master_seed: u64) -> u64 {
    derive_substream_seed(master_seed ^ 0x0F0F_0F0F_0F0F_0F0F, 0)
}
