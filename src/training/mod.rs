//! Helpers for feeding padded batches to a Tacotron/WaveNet trainer
//!
//! - Batch padding of inputs and targets
//! - Sequence masks and masked losses (candle tensors)
//! - Running averages of training metrics

pub mod mask;
pub mod padding;
mod window;

pub use mask::{masked_mse, masked_sigmoid_cross_entropy, sequence_mask};
pub use padding::{
    pad_array, pad_input, prepare_inputs, prepare_targets, round_up, split_columns, TARGET_PAD,
};
pub use window::{ValueWindow, DEFAULT_WINDOW_SIZE};
