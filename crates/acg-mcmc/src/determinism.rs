use acg_core::derive_substream_seed;

/// Seed of the random stream that selects the operator for `step` and draws
/// its acceptance.
pub fn step_seed(master_seed: u64, step: usize) -> u64 {
    derive_substream_seed(master_seed, step as u64)
}

/// Seed handed to the operator registered in `slot` when it proposes at `step`.
pub fn operator_seed(master_seed: u64, step: usize, slot: usize) -> u64 {
    let intermediate = derive_substream_seed(master_seed ^ 0x0FE5_0000_0000_0000, step as u64);
    derive_substream_seed(intermediate, slot as u64)
}

/// Seed of an independent simulation replicate.
pub fn replicate_seed(master_seed: u64, replicate: usize) -> u64 {
    derive_substream_seed(master_seed ^ 0xA5A5_A5A5_A5A5_A5A5, replicate as u64)
}
