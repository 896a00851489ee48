//! Protocol building blocks shared by every wire version.

pub mod aggregator;
pub mod frame;
pub mod mask;
pub mod opcode;
pub mod utf8;

pub use aggregator::FrameAggregator;
pub use frame::{Frame, MAX_CONTROL_FRAME_PAYLOAD};
pub use mask::{apply_mask, apply_mask_fast};
pub use opcode::OpCode;
pub use utf8::{Utf8FrameValidator, Utf8Validator, validate_utf8};
