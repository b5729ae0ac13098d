//! Registry-driven JSON serialization for object graphs.
//!
//! Domain types are described declaratively in a [`Registry`] (classes,
//! inheritance, members, construction, post-hooks); an [`Engine`] then reads
//! and writes whole graphs — trees, shared subgraphs and cycles — through a
//! small family of JSON dialects. Shared nodes are written once and
//! referenced by `"@N"`, polymorphic fields carry an `@class` marker, and
//! errors are structured and position-stamped.

#[cfg(test)]
mod tests;

pub mod de;
pub mod engine;
pub mod error;
mod macros;
pub mod registry;
pub mod ser;
pub mod value;

pub use crate::{
    de::{Reader, Token},
    engine::{Engine, Indent, Syntax},
    error::{Error, ErrorHandler, ErrorKind, Op, Result},
    registry::{Class, ClassBuilder, Registry},
    ser::Writer,
    value::{ArraySink, CreateFn, Dyn, DynObj, JsonValue, Obj},
};
