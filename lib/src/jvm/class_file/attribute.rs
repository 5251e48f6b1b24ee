use crate::jvm::class_file::{ConstantIndex, ConstantsPool};
use crate::jvm::verifier::VerificationType;
use crate::jvm::{parse_bytes, Error, Parse};
use byteorder::ReadBytesExt;

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// Attributes are kept undecoded until something asks for them, since most of them are of no
/// interest to verification. Decoding happens through [`AttributeLike`].
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug)]
pub struct Attribute {
    pub name_index: ConstantIndex,
    pub info: Vec<u8>,
}

impl Parse for Attribute {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let name_index = ConstantIndex::parse(reader)?;

        // Attribute info length is 4 bytes
        let len = u32::parse(reader)?;
        let info = parse_bytes(reader, len as usize)?;

        Ok(Attribute { name_index, info })
    }
}

impl Attribute {
    /// Is this the attribute with the given name?
    pub fn is<A: AttributeLike>(&self, constants: &ConstantsPool) -> bool {
        matches!(constants.utf8(self.name_index), Ok(name) if name == A::NAME)
    }

    /// Decode the attribute contents, requiring that all of the bytes are consumed
    pub fn decode<A: AttributeLike>(&self, constants: &ConstantsPool) -> Result<A, Error> {
        let mut info: &[u8] = &self.info;
        let decoded = A::decode(&mut info, constants).map_err(|err| match err {
            Error::IoError(io_err) => Error::MalformedAttribute {
                name: A::NAME,
                message: io_err.to_string(),
            },
            other => other,
        })?;
        if !info.is_empty() {
            return Err(Error::MalformedAttribute {
                name: A::NAME,
                message: format!("{} trailing bytes", info.len()),
            });
        }
        Ok(decoded)
    }

    /// Find and decode the first attribute with the given name
    pub fn find<A: AttributeLike>(
        attributes: &[Attribute],
        constants: &ConstantsPool,
    ) -> Result<Option<A>, Error> {
        attributes
            .iter()
            .find(|attribute| attribute.is::<A>(constants))
            .map(|attribute| attribute.decode::<A>(constants))
            .transpose()
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally
/// they represent very different things. This trait is implemented by things
/// which can be decoded from attributes.
pub trait AttributeLike: Sized {
    /// Name of the attribute
    const NAME: &'static str;

    /// Decode the attribute from its info bytes
    fn decode(info: &mut &[u8], constants: &ConstantsPool) -> Result<Self, Error>;
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,

    /// Nested `StackMapTable` attribute, decoded eagerly
    pub stack_map_table: Option<StackMapTable>,

    /// All of the nested attributes (including the stack map table)
    pub attributes: Vec<Attribute>,
}

impl AttributeLike for Code {
    const NAME: &'static str = "Code";

    fn decode(info: &mut &[u8], constants: &ConstantsPool) -> Result<Self, Error> {
        let max_stack = u16::parse(info)?;
        let max_locals = u16::parse(info)?;
        let code_len = u32::parse(info)?;
        let code_array = parse_bytes(info, code_len as usize)?;
        let exception_table = Vec::<ExceptionHandler>::parse(info)?;
        let attributes = Vec::<Attribute>::parse(info)?;
        let stack_map_table = Attribute::find::<StackMapTable>(&attributes, constants)?;
        Ok(Code {
            max_stack,
            max_locals,
            code_array,
            exception_table,
            stack_map_table,
            attributes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: u16,

    /// End of exception handler range (exclusive)
    pub end_pc: u16,

    /// Start of the exception handler
    pub handler_pc: u16,

    /// Class of exceptions caught, or `0` to catch everything
    pub catch_type: ConstantIndex,
}

impl ExceptionHandler {
    /// Is the given offset inside the protected range?
    pub fn covers(&self, bci: usize) -> bool {
        self.start_pc as usize <= bci && bci < self.end_pc as usize
    }
}

impl Parse for ExceptionHandler {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ExceptionHandler {
            start_pc: u16::parse(reader)?,
            end_pc: u16::parse(reader)?,
            handler_pc: u16::parse(reader)?,
            catch_type: ConstantIndex::parse(reader)?,
        })
    }
}

/// Verification type as it appears in the class file
pub type StackMapType = VerificationType<ConstantIndex, u16>;

/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.7.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapTable(pub Vec<StackMapFrame>);

impl AttributeLike for StackMapTable {
    const NAME: &'static str = "StackMapTable";

    fn decode(info: &mut &[u8], _constants: &ConstantsPool) -> Result<Self, Error> {
        Ok(StackMapTable(Vec::<StackMapFrame>::parse(info)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    SameLocalsNoStack { offset_delta: u16 },

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack {
        offset_delta: u16,
        stack: StackMapType,
    },

    /// Frame is like the previous frame, but without the last `chopped_k` locals
    ///
    /// Note: `chopped_k` must be in the range 1 to 3 inclusive
    /// Tags: 248-250
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Frame is like the previous frame, but with extra locals
    /// Tags: 252-254
    AppendLocalsNoStack {
        offset_delta: u16,
        locals: Vec<StackMapType>,
    },

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<StackMapType>,
        stack: Vec<StackMapType>,
    },
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta }
            | StackMapFrame::SameLocalsOneStack { offset_delta, .. }
            | StackMapFrame::ChopLocalsNoStack { offset_delta, .. }
            | StackMapFrame::AppendLocalsNoStack { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }
}

impl Parse for StackMapFrame {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let frame_type = u8::parse(reader)?;
        let frame = match frame_type {
            // `same_frame`
            0..=63 => StackMapFrame::SameLocalsNoStack {
                offset_delta: frame_type as u16,
            },

            // `same_locals_1_stack_item_frame`
            64..=127 => StackMapFrame::SameLocalsOneStack {
                offset_delta: (frame_type - 64) as u16,
                stack: StackMapType::parse(reader)?,
            },

            // `same_locals_1_stack_item_frame_extended`
            247 => StackMapFrame::SameLocalsOneStack {
                offset_delta: u16::parse(reader)?,
                stack: StackMapType::parse(reader)?,
            },

            // `chop_frame`
            248..=250 => StackMapFrame::ChopLocalsNoStack {
                offset_delta: u16::parse(reader)?,
                chopped_k: 251 - frame_type,
            },

            // `same_frame_extended`
            251 => StackMapFrame::SameLocalsNoStack {
                offset_delta: u16::parse(reader)?,
            },

            // `append_frame`
            252..=254 => {
                let offset_delta = u16::parse(reader)?;
                let mut locals = vec![];
                for _ in 0..(frame_type - 251) {
                    locals.push(StackMapType::parse(reader)?);
                }
                StackMapFrame::AppendLocalsNoStack {
                    offset_delta,
                    locals,
                }
            }

            // `full_frame`
            255 => StackMapFrame::Full {
                offset_delta: u16::parse(reader)?,
                locals: Vec::<StackMapType>::parse(reader)?,
                stack: Vec::<StackMapType>::parse(reader)?,
            },

            _ => {
                return Err(Error::MalformedAttribute {
                    name: StackMapTable::NAME,
                    message: format!("reserved frame type {}", frame_type),
                })
            }
        };
        Ok(frame)
    }
}
