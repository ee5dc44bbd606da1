#![forbid(unsafe_code)]

//! Larmor Model
//!
//! Pure value types for the Larmor data layer: the hierarchical project
//! identifier ([`Pid`]) and the attribute value carrier ([`AttrValue`]).
//!
//! This crate has no knowledge of the lifecycle framework. It exists so the
//! runtime, importers, and scripting layers can all share one identifier
//! vocabulary without dragging in the wrapper machinery.

pub mod pid;
pub mod value;

pub use pid::{Pid, PidParseError, TypeCode};
pub use value::AttrValue;
