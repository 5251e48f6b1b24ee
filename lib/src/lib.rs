//! Type-checking verifier for the bytecode of JVM methods
//!
//! The heart of the crate is [`jvm::verifier`], which abstractly interprets the instructions of a
//! single method and rejects it if any instruction could observe a value of the wrong kind. The
//! rest of [`jvm`] provides what the verifier needs to get there: a class file reader, a bytecode
//! decoder, and a class graph for answering subtyping questions.
//!
//! ```
//! use jverify::jvm::class_graph::{ClassGraph, ClassGraphArenas};
//! use jverify::jvm::verifier::{verify, VerifiableMethod};
//!
//! # fn check(class_file: &jverify::jvm::class_file::ClassFile) -> Result<(), Box<dyn std::error::Error>> {
//! let arenas = ClassGraphArenas::new();
//! let class_graph = ClassGraph::new(&arenas);
//! class_graph.insert_java_library_types();
//! let class = class_graph.add_class_file(class_file)?;
//! for method in VerifiableMethod::all_in(class_file, class)? {
//!     verify(&class_graph, &method)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod jvm;
mod util;
