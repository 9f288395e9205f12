/// # Constants with reserved meanings in Konro

/// In a given tensor shape, Konro reserves the `0th` dimension for batching
pub const BATCH_DIM: usize = 0;

/// In a given tensor shape, Konro reserves the `1st` dimension for sequence
pub const SEQ_DIM: usize = 1;

/// In a cached key/value tensor of shape `(batch, heads, seq, head_dim)`,
/// the `2nd` dimension is the sequence dimension that grows per step
pub const KV_SEQ_DIM: usize = 2;

/// In an image or latent tensor of shape `(batch, channels, height, width)`,
/// the channel dimension
pub const CHANNEL_DIM: usize = 1;

/// Height dimension of an image or latent tensor
pub const HEIGHT_DIM: usize = 2;

/// Width dimension of an image or latent tensor
pub const WIDTH_DIM: usize = 3;
