//! Read and verify JVM classes
//!
//! The pieces here mirror the layers of a class file:
//!
//!   - [`class_file`] is the raw binary structure (constant pool, methods, attributes)
//!   - [`bytecode`] decodes the instructions inside a `Code` attribute
//!   - [`class_graph`] tracks classes and their members so that subtyping can be queried
//!   - [`verifier`] checks that a method's bytecode is type-safe
//!
//! Names and descriptors (eg. `java/lang/String` or `(IJ)V`) are shared by all of them.

mod access_flags;
mod binary_format;
pub mod bytecode;
pub mod class_file;
pub mod class_graph;
mod descriptors;
mod errors;
mod names;
pub mod verifier;

pub use access_flags::*;
pub use binary_format::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
