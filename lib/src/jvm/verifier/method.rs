use crate::jvm::class_file::{ClassFile, Code, ConstantsPool, Version};
use crate::jvm::class_graph::ClassData;
use crate::jvm::{
    BinaryName, Error, MethodAccessFlags, MethodDescriptor, RenderDescriptor, UnqualifiedName,
};
use std::fmt;

/// Everything the verifier needs to know about one method
pub struct VerifiableMethod<'a, 'g> {
    /// Class declaring the method
    pub class: &'g ClassData<'g>,

    /// Constant pool of the declaring class file
    pub constants: &'a ConstantsPool,

    /// Version of the declaring class file
    pub version: Version,

    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    pub access_flags: MethodAccessFlags,

    /// `Code` attribute (only missing for abstract and native methods)
    pub code: Option<Code>,
}

impl<'a, 'g> VerifiableMethod<'a, 'g> {
    /// Decode every method of a class file
    ///
    /// `class` is the class graph entry for the same class file.
    pub fn all_in(
        class_file: &'a ClassFile,
        class: &'g ClassData<'g>,
    ) -> Result<Vec<VerifiableMethod<'a, 'g>>, Error> {
        let constants = &class_file.constants;
        class_file
            .methods
            .iter()
            .map(|method| {
                Ok(VerifiableMethod {
                    class,
                    constants,
                    version: class_file.version,
                    name: method.name(constants)?,
                    descriptor: method.descriptor(constants)?,
                    access_flags: method.access_flags,
                    code: method.code(constants)?,
                })
            })
            .collect()
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Methods which are allowed to have no code
    pub fn is_abstract_or_native(&self) -> bool {
        self.access_flags
            .intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT
    }
}

/// Renders as `pkg/Class.method(I)V`
impl<'a, 'g> fmt::Display for VerifiableMethod<'a, 'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}{}",
            self.class.name,
            self.name,
            self.descriptor.render()
        )
    }
}
