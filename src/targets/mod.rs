//! Minimal built-in `Target` implementations, the same role `dm-linear.c`
//! and `dm-error.c` play alongside the core in the kernel: the target
//! plugin *interface* is a boundary the real loader (out of scope) would
//! satisfy, but the scenario suite in spec §8 (S1, S4, S5) needs concrete
//! targets to dispatch against.

pub mod error;
pub mod linear;
