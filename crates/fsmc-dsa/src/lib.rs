#![no_std]
extern crate alloc;

pub mod window;
pub mod transitions;
pub mod varint;

pub use window::{SlidingWindow, WindowSlot, START_CONTEXT};
pub use transitions::TransitionTable;
