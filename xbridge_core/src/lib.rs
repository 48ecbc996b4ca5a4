//! # xbridge_core
//!
//! Realtime-safe primitives shared by the rest of the `xbridge` workspace:
//! a lock-free SPSC ring buffer, a stack-allocated fixed-capacity vector,
//! and a spinlock for O(1) critical sections. None of these know anything
//! about USB or MIDI; they are the same kind of foundation a DSP graph
//! would reach for on its hot path.

pub mod spinlock;
pub mod spsc;
pub mod stack_vec;

pub use spinlock::{Spinlock, SpinlockGuard};
pub use spsc::{Consumer, Producer, SpscRingBuffer};
pub use stack_vec::StackVec;
