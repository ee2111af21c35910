//! Memory management for thread stacks.
//!
//! The scheduler never allocates. Stacks are handed to it as [`Stack`]
//! handles, either carved from a static [`StackPool`] or built from a
//! caller-owned region.

pub mod stack_pool;

pub use stack_pool::{Stack, StackPool};
