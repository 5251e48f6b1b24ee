mod offset_vec;
mod ref_id;

pub use offset_vec::*;
pub use ref_id::*;
