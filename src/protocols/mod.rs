//! The input protocols that siphon must parse. These modules are used by the
//! sources to do their work.

pub mod wire;
