use crate::jvm::class_file::{Attribute, ConstantIndex, ConstantsPool, Field, Method, Version};
use crate::jvm::{BinaryName, ClassAccessFlags, Error, Parse, RefType};
use byteorder::ReadBytesExt;
use std::fs;
use std::path::Path;

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantsPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ConstantIndex,

    /// Index `0` is only valid for `java/lang/Object`
    pub super_class: ConstantIndex,
    pub interfaces: Vec<ConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the class file
    pub const MAGIC: u32 = 0xCAFEBABE;

    /// Read a class file from disk
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<ClassFile, Error> {
        let bytes = fs::read(path)?;
        ClassFile::parse(&mut bytes.as_slice())
    }

    /// Name of the class being defined
    pub fn this_class_name(&self) -> Result<BinaryName, Error> {
        self.object_class_name(self.this_class)
    }

    /// Name of the superclass, if there is one
    pub fn super_class_name(&self) -> Result<Option<BinaryName>, Error> {
        if self.super_class.0 == 0 {
            Ok(None)
        } else {
            self.object_class_name(self.super_class).map(Some)
        }
    }

    pub fn interface_names(&self) -> Result<Vec<BinaryName>, Error> {
        self.interfaces
            .iter()
            .map(|interface| self.object_class_name(*interface))
            .collect()
    }

    fn object_class_name(&self, index: ConstantIndex) -> Result<BinaryName, Error> {
        match self.constants.class_name(index)? {
            RefType::Object(name) => Ok(name),
            _ => Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "non-array Class",
            }),
        }
    }
}

impl Parse for ClassFile {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let magic = u32::parse(reader)?;
        if magic != ClassFile::MAGIC {
            return Err(Error::BadMagic(magic));
        }
        Ok(ClassFile {
            version: Version::parse(reader)?,
            constants: ConstantsPool::parse(reader)?,
            access_flags: ClassAccessFlags::parse(reader)?,
            this_class: ConstantIndex::parse(reader)?,
            super_class: ConstantIndex::parse(reader)?,
            interfaces: Vec::<ConstantIndex>::parse(reader)?,
            fields: Vec::<Field>::parse(reader)?,
            methods: Vec::<Method>::parse(reader)?,
            attributes: Vec::<Attribute>::parse(reader)?,
        })
    }
}
