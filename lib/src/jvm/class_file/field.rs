use crate::jvm::class_file::{Attribute, ConstantIndex, ConstantsPool};
use crate::jvm::{
    BinaryName, Error, FieldAccessFlags, FieldType, Name, Parse, ParseDescriptor, UnqualifiedName,
};
use byteorder::ReadBytesExt;

/// Field declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.5
#[derive(Debug)]
pub struct Field {
    pub access_flags: FieldAccessFlags,
    pub name_index: ConstantIndex,
    pub descriptor_index: ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Field {
    pub fn name(&self, constants: &ConstantsPool) -> Result<UnqualifiedName, Error> {
        let name = constants.utf8(self.name_index)?;
        UnqualifiedName::from_string(name.to_owned()).map_err(Error::BadName)
    }

    pub fn descriptor(&self, constants: &ConstantsPool) -> Result<FieldType<BinaryName>, Error> {
        let descriptor = constants.utf8(self.descriptor_index)?;
        FieldType::parse(descriptor).map_err(|err| Error::BadDescriptor(err.to_string()))
    }
}

impl Parse for Field {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Field {
            access_flags: FieldAccessFlags::parse(reader)?,
            name_index: ConstantIndex::parse(reader)?,
            descriptor_index: ConstantIndex::parse(reader)?,
            attributes: Vec::<Attribute>::parse(reader)?,
        })
    }
}
