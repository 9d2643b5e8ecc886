//! # slotcache-harness
//!
//! Test infrastructure for the slotcache engine, kept out of the engine
//! crate on purpose:
//!
//! - [`ops`] - a deterministic operation generator that decodes an
//!   arbitrary byte stream into a bounded op sequence. The encoding is a
//!   harness-internal convention, not part of the engine.
//! - [`validator`] - a raw file-format checker that reads the file with
//!   plain `std::fs` and re-derives every invariant from its own offset
//!   math, sharing no parsing code with the engine.
//! - [`exec`] - a differential executor that applies an op sequence to a
//!   real file and to the in-memory oracle in lockstep, asserting that
//!   values, iteration order, and error kinds agree, and that the file
//!   validates after every commit and reopen.
//!
//! Both the property suites and the fuzz targets drive the same three
//! pieces.

pub mod exec;
pub mod ops;
pub mod validator;
