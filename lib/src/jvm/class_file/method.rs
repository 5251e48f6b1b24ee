use crate::jvm::class_file::{Attribute, Code, ConstantIndex, ConstantsPool};
use crate::jvm::{
    BinaryName, Error, MethodAccessFlags, MethodDescriptor, Name, Parse, ParseDescriptor,
    UnqualifiedName,
};
use byteorder::ReadBytesExt;

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: ConstantIndex,
    pub descriptor_index: ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Method {
    pub fn name(&self, constants: &ConstantsPool) -> Result<UnqualifiedName, Error> {
        let name = constants.utf8(self.name_index)?;
        UnqualifiedName::check_valid_method(name).map_err(Error::BadName)?;
        if name == UnqualifiedName::INIT.as_str() {
            Ok(UnqualifiedName::INIT)
        } else if name == UnqualifiedName::CLINIT.as_str() {
            Ok(UnqualifiedName::CLINIT)
        } else {
            UnqualifiedName::from_string(name.to_owned()).map_err(Error::BadName)
        }
    }

    pub fn descriptor(
        &self,
        constants: &ConstantsPool,
    ) -> Result<MethodDescriptor<BinaryName>, Error> {
        let descriptor = constants.utf8(self.descriptor_index)?;
        MethodDescriptor::parse(descriptor).map_err(|err| Error::BadDescriptor(err.to_string()))
    }

    /// Decode the `Code` attribute, if there is one
    pub fn code(&self, constants: &ConstantsPool) -> Result<Option<Code>, Error> {
        Attribute::find::<Code>(&self.attributes, constants)
    }
}

impl Parse for Method {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Method {
            access_flags: MethodAccessFlags::parse(reader)?,
            name_index: ConstantIndex::parse(reader)?,
            descriptor_index: ConstantIndex::parse(reader)?,
            attributes: Vec::<Attribute>::parse(reader)?,
        })
    }
}
