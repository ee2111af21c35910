//! Host-side test suites.
//!
//! Everything runs against [`HostArch`](crate::arch::HostArch): tests play
//! the part of the context-switch trap by calling `select_next` themselves.

pub(crate) mod helpers;
mod property;
