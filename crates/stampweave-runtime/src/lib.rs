//! Stampweave runtime surface
//!
//! The consuming side of woven modules: culture-invariant formatting and
//! exact parsing of timestamps with offset, and an [`Evaluator`] that runs
//! woven accessor and constructor bodies so their behavior can be checked.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod eval;
mod format;

pub use error::{ConversionError, EvalError};
pub use eval::{Evaluator, Location, NativeSurface, ObjRef, Value};
pub use format::{format, parse_exact, Pattern};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
