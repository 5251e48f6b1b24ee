//! Binary structure of class files
//!
//! Everything here is a fairly direct reading of the [`class` file format][0]. The only part that
//! gets decoded beyond raw bytes and indices is what the verifier needs: the constant pool, the
//! `Code` attribute, and its `StackMapTable`.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html

mod attribute;
mod class;
mod constants;
mod field;
mod method;
mod version;

pub use attribute::*;
pub use class::*;
pub use constants::*;
pub use field::*;
pub use method::*;
pub use version::*;
