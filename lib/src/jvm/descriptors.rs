use super::{BinaryName, Name};
use crate::util::Width;
use std::fmt::Display;
use std::iter::Peekable;
use std::str::CharIndices;

/// Most dimensions an array type may have
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

/// Most local variable slots the parameters of a method may use
pub const MAX_PARAMETER_SLOTS: usize = 255;

/// Convert a descriptor back into its class file string form
pub trait RenderDescriptor {
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    fn render_to(&self, write_to: &mut String);
}

/// Read a descriptor from its class file string form
pub trait ParseDescriptor: Sized {
    /// Parse a complete descriptor (trailing input is an error)
    fn parse(source: &str) -> Result<Self, String> {
        let mut reader = DescriptorReader::new(source);
        let parsed = Self::read(&mut reader)?;
        reader.finish()?;
        Ok(parsed)
    }

    /// Read a descriptor from the front of the reader
    fn read(reader: &mut DescriptorReader<'_>) -> Result<Self, String>;
}

/// Cursor over a descriptor string
///
/// Errors mention the offset at which parsing went wrong.
pub struct DescriptorReader<'s> {
    source: &'s str,
    chars: Peekable<CharIndices<'s>>,
}

impl<'s> DescriptorReader<'s> {
    pub fn new(source: &'s str) -> DescriptorReader<'s> {
        DescriptorReader {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    pub fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    pub fn next(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn position(&mut self) -> usize {
        match self.chars.peek() {
            Some((offset, _)) => *offset,
            None => self.source.len(),
        }
    }

    pub fn error(&mut self, message: impl Display) -> String {
        let position = self.position();
        format!("{} at offset {} of '{}'", message, position, self.source)
    }

    pub fn expect(&mut self, expected: char) -> Result<(), String> {
        match self.peek() {
            Some(c) if c == expected => {
                self.next();
                Ok(())
            }
            Some(c) => Err(self.error(format_args!("Expected '{}' but found '{}'", expected, c))),
            None => Err(self.error(format_args!("Expected '{}' but input ended", expected))),
        }
    }

    /// Consume input up to and including `terminator`, returning what came before it
    pub fn take_until(&mut self, terminator: char) -> Result<&'s str, String> {
        let start = self.position();
        while let Some((offset, c)) = self.chars.next() {
            if c == terminator {
                return Ok(&self.source[start..offset]);
            }
        }
        Err(self.error(format_args!("Missing '{}'", terminator)))
    }

    /// Consume a run of `[`, returning how many there were
    fn array_dimensions(&mut self) -> Result<usize, String> {
        let mut dimensions = 0;
        while self.chars.next_if(|(_, c)| *c == '[').is_some() {
            dimensions += 1;
        }
        if dimensions > MAX_ARRAY_DIMENSIONS {
            return Err(self.error(format_args!(
                "Array type has {} dimensions (at most {} are allowed)",
                dimensions, MAX_ARRAY_DIMENSIONS
            )));
        }
        Ok(dimensions)
    }

    pub fn finish(mut self) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(c) => Err(self.error(format_args!("Unexpected leftover input '{}'", c))),
        }
    }
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    pub fn from_descriptor_char(c: char) -> Option<BaseType> {
        Some(match c {
            'B' => BaseType::Byte,
            'C' => BaseType::Char,
            'D' => BaseType::Double,
            'F' => BaseType::Float,
            'I' => BaseType::Int,
            'J' => BaseType::Long,
            'S' => BaseType::Short,
            'Z' => BaseType::Boolean,
            _ => return None,
        })
    }

    pub fn descriptor_char(self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        write_to.push(self.descriptor_char());
    }
}

impl ParseDescriptor for BaseType {
    fn read(reader: &mut DescriptorReader<'_>) -> Result<Self, String> {
        match reader.peek() {
            Some(c) => match BaseType::from_descriptor_char(c) {
                Some(base_type) => {
                    reader.next();
                    Ok(base_type)
                }
                None => Err(reader.error(format_args!("Invalid base type character '{}'", c))),
            },
            None => Err(reader.error("Missing base type")),
        }
    }
}

/// Reference type
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType<Class> {
    Object(Class),
    ObjectArray(ArrayType<Class>),
    PrimitiveArray(ArrayType<BaseType>),
}

/// Array type, split into its innermost element type and dimensions
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Dimensions beyond the first (`A[]` has 0, `A[][][]` has 2)
    pub additional_dimensions: usize,

    /// Innermost element type (`A` for `A[][]`)
    pub element_type: T,
}

impl<T> ArrayType<T> {
    pub const fn dimensions(&self) -> usize {
        self.additional_dimensions + 1
    }
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, write_to: &mut String) {
        write_to.extend(std::iter::repeat('[').take(self.dimensions()));
        self.element_type.render_to(write_to);
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn read(reader: &mut DescriptorReader<'_>) -> Result<Self, String> {
        reader.expect('L')?;
        let name = reader.take_until(';')?;
        BinaryName::from_string(name.to_owned())
    }
}

impl<C: RenderDescriptor> RenderDescriptor for RefType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(class) => class.render_to(write_to),
            RefType::ObjectArray(array) => array.render_to(write_to),
            RefType::PrimitiveArray(array) => array.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for RefType<C> {
    fn read(reader: &mut DescriptorReader<'_>) -> Result<Self, String> {
        match reader.peek() {
            Some('L') => C::read(reader).map(RefType::Object),
            Some('[') => {
                let additional_dimensions = reader.array_dimensions()? - 1;
                if reader.peek() == Some('L') {
                    Ok(RefType::ObjectArray(ArrayType {
                        additional_dimensions,
                        element_type: C::read(reader)?,
                    }))
                } else {
                    Ok(RefType::PrimitiveArray(ArrayType {
                        additional_dimensions,
                        element_type: BaseType::read(reader)?,
                    }))
                }
            }
            Some(c) => Err(reader.error(format_args!("Invalid reference type character '{}'", c))),
            None => Err(reader.error("Missing reference type")),
        }
    }
}

impl RefType<BinaryName> {
    /// Parse the name held in a `CONSTANT_Class` entry
    ///
    /// These are either binary names (`java/lang/String`) or array descriptors
    /// (`[Ljava/lang/String;`), but never object descriptors.
    pub fn parse_class_name(source: &str) -> Result<Self, String> {
        if source.starts_with('[') {
            RefType::parse(source)
        } else {
            BinaryName::from_string(source.to_owned()).map(RefType::Object)
        }
    }
}

impl<C> RefType<C> {
    /// Number of array dimensions (0 for a plain object type)
    pub fn dimensions(&self) -> usize {
        match self {
            RefType::Object(_) => 0,
            RefType::ObjectArray(array) => array.dimensions(),
            RefType::PrimitiveArray(array) => array.dimensions(),
        }
    }
}

/// Type of a field, parameter, or return value
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType<Class> {
    Base(BaseType),
    Ref(RefType<Class>),
}

impl<C> Width for FieldType<C> {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl<C> FieldType<C> {
    pub const fn object(class_name: C) -> FieldType<C> {
        FieldType::Ref(RefType::Object(class_name))
    }

    pub const fn int() -> FieldType<C> {
        FieldType::Base(BaseType::Int)
    }

    pub const fn boolean() -> FieldType<C> {
        FieldType::Base(BaseType::Boolean)
    }
}

impl<C: RenderDescriptor> RenderDescriptor for FieldType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Ref(ref_type) => ref_type.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for FieldType<C> {
    fn read(reader: &mut DescriptorReader<'_>) -> Result<Self, String> {
        match reader.peek() {
            Some('L' | '[') => RefType::read(reader).map(FieldType::Ref),
            _ => BaseType::read(reader).map(FieldType::Base),
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor<Class> {
    pub parameters: Vec<FieldType<Class>>,

    /// `None` for `void`
    pub return_type: Option<FieldType<Class>>,
}

impl<C> MethodDescriptor<C> {
    /// Local variable slots taken up by the parameters (and the receiver, if there is one)
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let receiver = if has_this_param { 1 } else { 0 };
        receiver + self.parameters.iter().map(Width::width).sum::<usize>()
    }
}

impl<C: RenderDescriptor> RenderDescriptor for MethodDescriptor<C> {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(return_type) => return_type.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for MethodDescriptor<C> {
    fn read(reader: &mut DescriptorReader<'_>) -> Result<Self, String> {
        reader.expect('(')?;
        let mut parameters = vec![];
        loop {
            match reader.peek() {
                Some(')') => break,
                None => return Err(reader.error("Missing ')'")),
                _ => parameters.push(FieldType::read(reader)?),
            }
        }
        reader.expect(')')?;

        let return_type = if reader.peek() == Some('V') {
            reader.next();
            None
        } else {
            Some(FieldType::read(reader)?)
        };

        let descriptor = MethodDescriptor {
            parameters,
            return_type,
        };
        let slots = descriptor.parameter_length(false);
        if slots > MAX_PARAMETER_SLOTS {
            return Err(reader.error(format_args!(
                "Method parameters take {} slots (at most {} are allowed)",
                slots, MAX_PARAMETER_SLOTS
            )));
        }
        Ok(descriptor)
    }
}
