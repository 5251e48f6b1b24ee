use crate::jvm::{
    BinaryName, Error, FieldType, MethodDescriptor, Name, Parse, ParseDescriptor, RefType,
    UnqualifiedName,
};
use crate::util::{Offset, OffsetResult, OffsetVec, Width};
use byteorder::ReadBytesExt;

/// Index into the constant pool
///
/// Indices start at 1. Entries for `long` and `double` constants also claim the following index,
/// which then can't be used to refer to anything.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ConstantIndex(pub u16);

impl Parse for ConstantIndex {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ConstantIndex(u16::parse(reader)?))
    }
}

/// Constants as in the constant pool
///
/// References to other constants are left as raw indices: nothing about them has been checked
/// until [`ConstantsPool::validate_constant_at`] is called.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Class or an interface
    Class(ConstantIndex),

    /// Field
    FieldRef {
        class: ConstantIndex,
        name_and_type: ConstantIndex,
    },

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ConstantIndex,
        name_and_type: ConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: ConstantIndex,
        descriptor: ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// Depending on the method kind, this points to different things:
        ///
        ///   - `FieldRef` for `GetField`, `GetStatic`, `PutField`, `PutStatic`
        ///   - `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: ConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: ConstantIndex,
    },

    Module(ConstantIndex),
    Package(ConstantIndex),
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVM specification:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
/// >
/// > In retrospect, making 8-byte constants take two constant pool entries was a poor choice.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Tag of a constant pool entry
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ConstantTag {
    Utf8,
    Integer,
    Float,
    Long,
    Double,
    Class,
    String,
    FieldRef,
    MethodRef,
    InterfaceMethodRef,
    NameAndType,
    MethodHandle,
    MethodType,
    Dynamic,
    InvokeDynamic,
    Module,
    Package,
}

impl Constant {
    pub fn tag(&self) -> ConstantTag {
        match self {
            Constant::Utf8(_) => ConstantTag::Utf8,
            Constant::Integer(_) => ConstantTag::Integer,
            Constant::Float(_) => ConstantTag::Float,
            Constant::Long(_) => ConstantTag::Long,
            Constant::Double(_) => ConstantTag::Double,
            Constant::Class(_) => ConstantTag::Class,
            Constant::String(_) => ConstantTag::String,
            Constant::FieldRef { .. } => ConstantTag::FieldRef,
            Constant::MethodRef {
                is_interface: false,
                ..
            } => ConstantTag::MethodRef,
            Constant::MethodRef {
                is_interface: true, ..
            } => ConstantTag::InterfaceMethodRef,
            Constant::NameAndType { .. } => ConstantTag::NameAndType,
            Constant::MethodHandle { .. } => ConstantTag::MethodHandle,
            Constant::MethodType { .. } => ConstantTag::MethodType,
            Constant::Dynamic { .. } => ConstantTag::Dynamic,
            Constant::InvokeDynamic { .. } => ConstantTag::InvokeDynamic,
            Constant::Module(_) => ConstantTag::Module,
            Constant::Package(_) => ConstantTag::Package,
        }
    }
}

impl Parse for Constant {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        // Index is unknown at this point, so errors are tagged with `0` and fixed up by the pool
        let tag = u8::parse(reader)?;
        let constant = match tag {
            1 => {
                let len = u16::parse(reader)?;
                let bytes = crate::jvm::parse_bytes(reader, len as usize)?;
                let string =
                    decode_modified_utf8(&bytes).ok_or(Error::MalformedUtf8 { index: 0 })?;
                Constant::Utf8(string)
            }
            3 => Constant::Integer(i32::parse(reader)?),
            4 => Constant::Float(f32::parse(reader)?),
            5 => Constant::Long(i64::parse(reader)?),
            6 => Constant::Double(f64::parse(reader)?),
            7 => Constant::Class(ConstantIndex::parse(reader)?),
            8 => Constant::String(ConstantIndex::parse(reader)?),
            9 => Constant::FieldRef {
                class: ConstantIndex::parse(reader)?,
                name_and_type: ConstantIndex::parse(reader)?,
            },
            10 | 11 => Constant::MethodRef {
                class: ConstantIndex::parse(reader)?,
                name_and_type: ConstantIndex::parse(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: ConstantIndex::parse(reader)?,
                descriptor: ConstantIndex::parse(reader)?,
            },
            15 => {
                let kind = u8::parse(reader)?;
                let handle_kind =
                    HandleKind::from_u8(kind).ok_or(Error::UnknownConstantTag { index: 0, tag })?;
                Constant::MethodHandle {
                    handle_kind,
                    member: ConstantIndex::parse(reader)?,
                }
            }
            16 => Constant::MethodType {
                descriptor: ConstantIndex::parse(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::parse(reader)?,
                name_and_type: ConstantIndex::parse(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::parse(reader)?,
                name_and_type: ConstantIndex::parse(reader)?,
            },
            19 => Constant::Module(ConstantIndex::parse(reader)?),
            20 => Constant::Package(ConstantIndex::parse(reader)?),
            _ => return Err(Error::UnknownConstantTag { index: 0, tag }),
        };
        Ok(constant)
    }
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl HandleKind {
    pub fn from_u8(byte: u8) -> Option<HandleKind> {
        let kind = match byte {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            _ => return None,
        };
        Some(kind)
    }
}

/// Class file constants pool
///
/// Lookups are all format-checked: asking for an index which is out of range, zero, the second
/// half of a wide constant, or of the wrong kind is an error rather than a panic.
#[derive(Debug)]
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
        }
    }

    /// Add a constant to the end of the pool, returning its index
    pub fn push(&mut self, constant: Constant) -> ConstantIndex {
        ConstantIndex(self.constants.push(constant).0 as u16)
    }

    /// Number of indices used, plus one (this is what the class file stores)
    pub fn count(&self) -> u16 {
        self.constants.offset_len().0 as u16
    }

    /// Look up a constant
    pub fn get(&self, index: ConstantIndex) -> Result<&Constant, Error> {
        match self.constants.get_offset(Offset(index.0 as usize)) {
            OffsetResult::Ok(_, constant) => Ok(constant),
            OffsetResult::InvalidOffset(_) | OffsetResult::TooSmall | OffsetResult::TooLarge => {
                Err(Error::BadConstantIndex(index.0))
            }
        }
    }

    /// Tag of the constant at the given index
    pub fn tag_at(&self, index: ConstantIndex) -> Result<ConstantTag, Error> {
        self.get(index).map(Constant::tag)
    }

    /// Get the string in a `CONSTANT_Utf8` entry
    pub fn utf8(&self, index: ConstantIndex) -> Result<&str, Error> {
        match self.get(index)? {
            Constant::Utf8(string) => Ok(string),
            _ => Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "Utf8",
            }),
        }
    }

    /// Get the type named by a `CONSTANT_Class` entry
    pub fn class_name(&self, index: ConstantIndex) -> Result<RefType<BinaryName>, Error> {
        match self.get(index)? {
            Constant::Class(name) => {
                let name = self.utf8(*name)?;
                RefType::parse_class_name(name).map_err(|err| Error::BadName(err.to_string()))
            }
            _ => Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "Class",
            }),
        }
    }

    /// Get the class and name-and-type of a field or method reference
    fn member_ref(&self, index: ConstantIndex) -> Result<(ConstantIndex, ConstantIndex), Error> {
        match self.get(index)? {
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => Ok((*class, *name_and_type)),
            _ => Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "FieldRef, MethodRef, or InterfaceMethodRef",
            }),
        }
    }

    /// Get the name and descriptor strings of a `CONSTANT_NameAndType` entry
    pub fn name_and_type(&self, index: ConstantIndex) -> Result<(&str, &str), Error> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "NameAndType",
            }),
        }
    }

    /// Name and type of a dynamic constant or call site
    fn dynamic_name_and_type(&self, index: ConstantIndex) -> Result<(&str, &str), Error> {
        match self.get(index)? {
            Constant::Dynamic { name_and_type, .. }
            | Constant::InvokeDynamic { name_and_type, .. } => self.name_and_type(*name_and_type),
            _ => Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "Dynamic or InvokeDynamic",
            }),
        }
    }

    /// Owning class of a field or method reference
    pub fn member_class_name(&self, index: ConstantIndex) -> Result<RefType<BinaryName>, Error> {
        let (class, _) = self.member_ref(index)?;
        self.class_name(class)
    }

    pub fn field_name(&self, index: ConstantIndex) -> Result<UnqualifiedName, Error> {
        let (_, name_and_type) = self.member_ref(index)?;
        let (name, _) = self.name_and_type(name_and_type)?;
        UnqualifiedName::from_string(name.to_owned()).map_err(Error::BadName)
    }

    pub fn field_type(&self, index: ConstantIndex) -> Result<FieldType<BinaryName>, Error> {
        let (_, name_and_type) = self.member_ref(index)?;
        let (_, descriptor) = self.name_and_type(name_and_type)?;
        parse_field_type(descriptor)
    }

    pub fn method_name(&self, index: ConstantIndex) -> Result<UnqualifiedName, Error> {
        let (_, name_and_type) = self.member_ref(index)?;
        let (name, _) = self.name_and_type(name_and_type)?;
        parse_method_name(name)
    }

    pub fn method_descriptor(
        &self,
        index: ConstantIndex,
    ) -> Result<MethodDescriptor<BinaryName>, Error> {
        let (_, name_and_type) = self.member_ref(index)?;
        let (_, descriptor) = self.name_and_type(name_and_type)?;
        parse_method_descriptor(descriptor)
    }

    pub fn invoke_dynamic_name(&self, index: ConstantIndex) -> Result<UnqualifiedName, Error> {
        let (name, _) = self.dynamic_name_and_type(index)?;
        parse_method_name(name)
    }

    pub fn invoke_dynamic_descriptor(
        &self,
        index: ConstantIndex,
    ) -> Result<MethodDescriptor<BinaryName>, Error> {
        let (_, descriptor) = self.dynamic_name_and_type(index)?;
        parse_method_descriptor(descriptor)
    }

    /// Type of a dynamically-computed constant
    pub fn dynamic_type(&self, index: ConstantIndex) -> Result<FieldType<BinaryName>, Error> {
        let (_, descriptor) = self.dynamic_name_and_type(index)?;
        parse_field_type(descriptor)
    }

    /// Check that the entry at this index (and everything it refers to) is well-formed
    ///
    /// This covers the structural rules of the constant pool: references point at entries of the
    /// right kind, names and descriptors parse, and method handles refer to the right sort of
    /// member for their kind.
    pub fn validate_constant_at(&self, index: ConstantIndex) -> Result<(), Error> {
        match self.get(index)? {
            Constant::Utf8(_)
            | Constant::Integer(_)
            | Constant::Float(_)
            | Constant::Long(_)
            | Constant::Double(_) => Ok(()),
            Constant::Class(_) => self.class_name(index).map(|_| ()),
            Constant::String(utf8) | Constant::Module(utf8) | Constant::Package(utf8) => {
                self.utf8(*utf8).map(|_| ())
            }
            Constant::NameAndType { .. } => self.name_and_type(index).map(|_| ()),
            Constant::FieldRef { class, .. } => {
                self.class_name(*class)?;
                self.field_name(index)?;
                self.field_type(index)?;
                Ok(())
            }
            Constant::MethodRef { class, .. } => {
                self.class_name(*class)?;
                let name = self.method_name(index)?;
                let descriptor = self.method_descriptor(index)?;
                if name == UnqualifiedName::INIT && descriptor.return_type.is_some() {
                    return Err(Error::BadDescriptor(format!(
                        "Constant #{} names <init> but does not return void",
                        index.0
                    )));
                }
                Ok(())
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                let expected = match handle_kind {
                    HandleKind::GetField
                    | HandleKind::GetStatic
                    | HandleKind::PutField
                    | HandleKind::PutStatic => &[ConstantTag::FieldRef][..],
                    HandleKind::InvokeVirtual | HandleKind::NewInvokeSpecial => {
                        &[ConstantTag::MethodRef][..]
                    }
                    HandleKind::InvokeStatic | HandleKind::InvokeSpecial => {
                        &[ConstantTag::MethodRef, ConstantTag::InterfaceMethodRef][..]
                    }
                    HandleKind::InvokeInterface => &[ConstantTag::InterfaceMethodRef][..],
                };
                if !expected.contains(&self.tag_at(*member)?) {
                    return Err(Error::UnexpectedConstant {
                        index: member.0,
                        expected: "member reference matching the method handle kind",
                    });
                }
                self.validate_constant_at(*member)
            }
            Constant::MethodType { descriptor } => {
                parse_method_descriptor(self.utf8(*descriptor)?).map(|_| ())
            }
            Constant::Dynamic { name_and_type, .. } => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                UnqualifiedName::check_valid(name).map_err(Error::BadName)?;
                parse_field_type(descriptor).map(|_| ())
            }
            Constant::InvokeDynamic { name_and_type, .. } => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                parse_method_name(name)?;
                parse_method_descriptor(descriptor).map(|_| ())
            }
        }
    }

    /// What sort of value loading this constant (with `ldc`, `ldc_w`, or `ldc2_w`) produces
    pub fn loadable_kind(&self, index: ConstantIndex) -> Result<LoadableKind, Error> {
        let kind = match self.get(index)? {
            Constant::Integer(_) => LoadableKind::Integer,
            Constant::Float(_) => LoadableKind::Float,
            Constant::Long(_) => LoadableKind::Long,
            Constant::Double(_) => LoadableKind::Double,
            Constant::String(_) => LoadableKind::String,
            Constant::Class(_) => LoadableKind::Class,
            Constant::MethodHandle { .. } => LoadableKind::MethodHandle,
            Constant::MethodType { .. } => LoadableKind::MethodType,
            Constant::Dynamic { .. } => LoadableKind::Dynamic(self.dynamic_type(index)?),
            _ => {
                return Err(Error::UnexpectedConstant {
                    index: index.0,
                    expected: "loadable constant",
                })
            }
        };
        Ok(kind)
    }
}

/// Kinds of constants which can be pushed onto the stack with `ldc` and friends
#[derive(Clone, Debug, PartialEq)]
pub enum LoadableKind {
    Integer,
    Float,
    Long,
    Double,
    String,
    Class,
    MethodHandle,
    MethodType,

    /// Dynamically-computed constant of the given type
    Dynamic(FieldType<BinaryName>),
}

impl Default for ConstantsPool {
    fn default() -> Self {
        ConstantsPool::new()
    }
}

/// The pool is prefixed by its count, which is one more than the largest index
impl Parse for ConstantsPool {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let count = u16::parse(reader)?;
        let mut pool = ConstantsPool::new();
        while pool.count() < count {
            let index = pool.count();
            let constant = Constant::parse(reader).map_err(|err| match err {
                Error::MalformedUtf8 { .. } => Error::MalformedUtf8 { index },
                Error::UnknownConstantTag { tag, .. } => Error::UnknownConstantTag { index, tag },
                other => other,
            })?;
            pool.push(constant);
        }
        if pool.count() != count {
            return Err(Error::BadConstantIndex(count));
        }
        Ok(pool)
    }
}

fn parse_field_type(descriptor: &str) -> Result<FieldType<BinaryName>, Error> {
    FieldType::parse(descriptor).map_err(|err| Error::BadDescriptor(err.to_string()))
}

fn parse_method_descriptor(descriptor: &str) -> Result<MethodDescriptor<BinaryName>, Error> {
    MethodDescriptor::parse(descriptor).map_err(|err| Error::BadDescriptor(err.to_string()))
}

fn parse_method_name(name: &str) -> Result<UnqualifiedName, Error> {
    UnqualifiedName::check_valid_method(name).map_err(Error::BadName)?;
    if name == UnqualifiedName::INIT.as_str() {
        Ok(UnqualifiedName::INIT)
    } else if name == UnqualifiedName::CLINIT.as_str() {
        Ok(UnqualifiedName::CLINIT)
    } else {
        UnqualifiedName::from_string(name.to_owned()).map_err(Error::BadName)
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// Unpaired surrogates have no representation in a Rust `String`, so they are rejected.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    // First decode into UTF-16 code units, then let the standard library pair up surrogates
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();
    let continuation = |b: Option<u8>| match b {
        Some(b) if b & 0b1100_0000 == 0b1000_0000 => Some((b & 0x3F) as u16),
        _ => None,
    };
    while let Some(b1) = iter.next() {
        let unit = if b1 & 0b1000_0000 == 0 {
            if b1 == 0 {
                return None;
            }
            b1 as u16
        } else if b1 & 0b1110_0000 == 0b1100_0000 {
            let b2 = continuation(iter.next())?;
            ((b1 & 0x1F) as u16) << 6 | b2
        } else if b1 & 0b1111_0000 == 0b1110_0000 {
            let b2 = continuation(iter.next())?;
            let b3 = continuation(iter.next())?;
            ((b1 & 0x0F) as u16) << 12 | b2 << 6 | b3
        } else {
            return None;
        };
        units.push(unit);
    }
    String::from_utf16(&units).ok()
}

#[cfg(test)]
mod decode_modified_utf8_tests {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(
            decode_modified_utf8(&[97, 192, 128, 97]).as_deref(),
            Some("a\x00a")
        );
        assert_eq!(
            decode_modified_utf8(&[97, 0, 97]),
            None,
            "raw null bytes are not allowed"
        );
    }

    #[test]
    fn two_and_three_byte_encodings() {
        assert_eq!(
            decode_modified_utf8(&[
                196, 132, 199, 141, 199, 158, 199, 160, 199, 186, 200, 128, 200, 130, 200, 166,
                200, 186, 211, 144, 211, 146
            ])
            .as_deref(),
            Some("ĄǍǞǠǺȀȂȦȺӐӒ")
        );
        assert_eq!(
            decode_modified_utf8(&[224, 164, 132, 224, 164, 133]).as_deref(),
            Some("ऄअ")
        );
    }

    #[test]
    fn supplementary_characters() {
        assert_eq!(
            decode_modified_utf8(&[
                237, 160, 128, 237, 176, 128, 237, 172, 191, 237, 191, 191, 237, 175, 191, 237,
                191, 191
            ])
            .as_deref(),
            Some("\u{10000}\u{dffff}\u{10FFFF}")
        );
        assert_eq!(
            decode_modified_utf8(&[237, 160, 128]),
            None,
            "unpaired high surrogate"
        );
    }

    #[test]
    fn truncated_sequences() {
        assert_eq!(decode_modified_utf8(&[196]), None);
        assert_eq!(decode_modified_utf8(&[224, 164]), None);
    }
}
