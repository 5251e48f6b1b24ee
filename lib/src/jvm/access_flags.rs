use super::{Error, Parse};
use bitflags::bitflags;
use byteorder::ReadBytesExt;

bitflags! {
    /// `access_flags` of a `ClassFile` structure (JVMS 4.1, table 4.1-B)
    pub struct ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

bitflags! {
    /// `access_flags` of a `method_info` structure (JVMS 4.6, table 4.6-A)
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    /// `access_flags` of a `field_info` structure (JVMS 4.5, table 4.5-A)
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

/// Bits that are not yet assigned a meaning are silently dropped
macro_rules! parse_access_flags {
    ($($flags:ty),*) => {
        $(
            impl Parse for $flags {
                fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                    u16::parse(reader).map(<$flags>::from_bits_truncate)
                }
            }
        )*
    };
}

parse_access_flags!(ClassAccessFlags, MethodAccessFlags, FieldAccessFlags);
