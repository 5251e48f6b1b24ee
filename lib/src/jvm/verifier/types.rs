use crate::jvm::class_file::{AttributeLike, StackMapTable};
use crate::jvm::{Error, Parse};
use byteorder::ReadBytesExt;

/// Types that stack map frames are written in, from [this hierarchy][0]
///
/// The verifier itself works with the richer [`super::Operand`], which also tracks array element
/// types and return addresses.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    /// Unusable slot (eg. a local that has not been assigned yet)
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// `this` inside a constructor, before the superclass constructor has run
    UninitializedThis,

    /// Class, interface or array type (in a class file, a `Class` constant)
    Object(Cls),

    /// Result of a `new` whose constructor has not run yet
    ///
    /// In a class file, `U` is the offset of the `new` instruction from the start of the code.
    Uninitialized(U),
}

impl<Cls: Parse, U: Parse> Parse for VerificationType<Cls, U> {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let vtype = match u8::parse(reader)? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(Cls::parse(reader)?),
            8 => VerificationType::Uninitialized(U::parse(reader)?),
            tag => {
                return Err(Error::MalformedAttribute {
                    name: StackMapTable::NAME,
                    message: format!("unknown verification type tag {}", tag),
                })
            }
        };
        Ok(vtype)
    }
}
