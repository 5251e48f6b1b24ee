use std::fmt;

/// Errors that come up while reading a class file or adding it to a class graph
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// Class file didn't start with `0xCAFEBABE`
    BadMagic(u32),

    /// Constant pool entry has a tag we don't know about
    UnknownConstantTag { index: u16, tag: u8 },

    /// Constant pool index is zero, out of range, or the unusable second half of a `long` or
    /// `double` constant
    BadConstantIndex(u16),

    /// Constant pool entry is of the wrong kind
    UnexpectedConstant { index: u16, expected: &'static str },

    /// Bytes of a `CONSTANT_Utf8` entry don't decode as modified UTF-8
    MalformedUtf8 { index: u16 },

    BadDescriptor(String),
    BadName(String),

    /// Attribute contents don't match its declared structure
    MalformedAttribute { name: &'static str, message: String },

    /// Class can't be added to the graph because one of its supertypes is unknown
    MissingClass(String),

    /// Instruction operands run past the end of the code array
    IncompleteBytecode { bci: usize },

    /// Byte at an instruction start is not an opcode
    InvalidOpcode { bci: usize, opcode: u8 },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::BadMagic(magic) => write!(f, "Bad magic number {:#010x}", magic),
            Error::UnknownConstantTag { index, tag } => {
                write!(f, "Unknown tag {} for constant #{}", tag, index)
            }
            Error::BadConstantIndex(index) => write!(f, "Bad constant pool index #{}", index),
            Error::UnexpectedConstant { index, expected } => {
                write!(f, "Constant #{} should be {}", index, expected)
            }
            Error::MalformedUtf8 { index } => write!(f, "Constant #{} is not modified UTF-8", index),
            Error::BadDescriptor(msg) => write!(f, "Bad descriptor: {}", msg),
            Error::BadName(msg) => write!(f, "Bad name: {}", msg),
            Error::MalformedAttribute { name, message } => {
                write!(f, "Malformed {} attribute: {}", name, message)
            }
            Error::MissingClass(name) => write!(f, "Missing class {}", name),
            Error::IncompleteBytecode { bci } => write!(f, "Incomplete bytecode at bci {}", bci),
            Error::InvalidOpcode { bci, opcode } => {
                write!(f, "Invalid opcode {:#04x} at bci {}", opcode, bci)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}
