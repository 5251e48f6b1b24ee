use super::class_file::ClassFile;
use super::{
    BinaryName, ClassAccessFlags, Error, FieldAccessFlags, FieldType, MethodAccessFlags,
    MethodDescriptor, Name, RenderDescriptor, UnqualifiedName,
};
use crate::util::RefId;
use elsa::map::FrozenMap;
use elsa::FrozenVec;
use std::collections::HashSet;
use std::fmt;
use std::fmt::Debug;
use typed_arena::Arena;

mod assignable;
mod java_classes;

pub use assignable::*;
pub use java_classes::*;

/// Classes are compared by identity, since the graph holds at most one class per name
pub type ClassId<'g> = RefId<'g, ClassData<'g>>;

/// Backing storage for everything in a `ClassGraph`
///
/// Kept separate from the graph so that graph entries can borrow from it for `'g`.
pub struct ClassGraphArenas<'g> {
    classes: Arena<ClassData<'g>>,
    methods: Arena<MethodData<'g>>,
    fields: Arena<FieldData<'g>>,
}

impl<'g> ClassGraphArenas<'g> {
    pub fn new() -> Self {
        ClassGraphArenas {
            classes: Arena::new(),
            methods: Arena::new(),
            fields: Arena::new(),
        }
    }
}

impl<'g> Default for ClassGraphArenas<'g> {
    fn default() -> Self {
        Self::new()
    }
}

/// Classes and interfaces known to the verifier, along with their members
///
/// The verifier only ever asks questions of the graph: subtyping, superclasses, and whether a
/// member is protected. Classes can still be added at any point, including halfway through
/// verifying a method, since referenced classes may be loaded lazily.
pub struct ClassGraph<'g> {
    arenas: &'g ClassGraphArenas<'g>,
    by_name: FrozenMap<&'g BinaryName, &'g ClassData<'g>>,
}

impl<'g> ClassGraph<'g> {
    pub fn new(arenas: &'g ClassGraphArenas<'g>) -> Self {
        ClassGraph {
            arenas,
            by_name: FrozenMap::new(),
        }
    }

    pub fn lookup_class(&self, name: &BinaryName) -> Option<&'g ClassData<'g>> {
        self.by_name.map_get(name, |class| *class)
    }

    /// Insert a class, unless one of the same name is already present (in which case that one is
    /// returned and `data` is dropped)
    pub fn add_class(&self, data: ClassData<'g>) -> &'g ClassData<'g> {
        match self.lookup_class(&data.name) {
            Some(existing) => existing,
            None => {
                let class: &'g ClassData<'g> = self.arenas.classes.alloc(data);
                self.by_name.insert(&class.name, class);
                class
            }
        }
    }

    /// Attach a field to its class (fields are unique by name and descriptor)
    pub fn add_field(&self, field: FieldData<'g>) -> &'g FieldData<'g> {
        let class = field.class;
        let existing = class
            .fields
            .iter()
            .find(|other| (&other.name, &other.descriptor) == (&field.name, &field.descriptor));
        existing.unwrap_or_else(|| {
            let field: &'g FieldData<'g> = self.arenas.fields.alloc(field);
            class.fields.push(field);
            field
        })
    }

    /// Attach a method to its class (methods are unique by name and descriptor)
    pub fn add_method(&self, method: MethodData<'g>) -> &'g MethodData<'g> {
        let class = method.class;
        let existing = class
            .methods
            .iter()
            .find(|other| (&other.name, &other.descriptor) == (&method.name, &method.descriptor));
        existing.unwrap_or_else(|| {
            let method: &'g MethodData<'g> = self.arenas.methods.alloc(method);
            class.methods.push(method);
            method
        })
    }

    /// Add a class (and its members) from a parsed class file
    ///
    /// The superclass and interfaces must already be in the graph. Nothing is added if any part
    /// of the class file fails to decode.
    pub fn add_class_file(&self, class_file: &ClassFile) -> Result<&'g ClassData<'g>, Error> {
        let name = class_file.this_class_name()?;
        if let Some(existing) = self.lookup_class(&name) {
            return Ok(existing);
        }

        let superclass = match class_file.super_class_name()? {
            None => None,
            Some(superclass) => Some(self.require_class(&superclass)?),
        };
        let interfaces = class_file
            .interface_names()?
            .iter()
            .map(|interface| self.require_class(interface))
            .collect::<Result<Vec<_>, Error>>()?;

        let constants = &class_file.constants;
        let methods = class_file
            .methods
            .iter()
            .map(|method| {
                Ok((
                    method.name(constants)?,
                    method.descriptor(constants)?,
                    method.access_flags,
                ))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let fields = class_file
            .fields
            .iter()
            .map(|field| {
                Ok((
                    field.name(constants)?,
                    field.descriptor(constants)?,
                    field.access_flags,
                ))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let class = self.add_class(ClassData {
            name,
            superclass,
            interfaces: FrozenVec::new(),
            access_flags: class_file.access_flags,
            methods: FrozenVec::new(),
            fields: FrozenVec::new(),
            host_class: None,
            is_magic_accessor: false,
        });
        for interface in interfaces {
            class.interfaces.push(interface);
        }
        for (name, descriptor, access_flags) in methods {
            self.add_method(MethodData {
                class,
                name,
                descriptor,
                access_flags,
            });
        }
        for (name, descriptor, access_flags) in fields {
            self.add_field(FieldData {
                class,
                name,
                descriptor,
                access_flags,
            });
        }

        Ok(class)
    }

    fn require_class(&self, name: &BinaryName) -> Result<&'g ClassData<'g>, Error> {
        self.lookup_class(name)
            .ok_or_else(|| Error::MissingClass(name.to_string()))
    }

    /// Add the `java.*` classes the verifier relies on
    pub fn insert_java_library_types(&self) -> JavaClasses<'g> {
        JavaClasses::add_to_graph(self)
    }
}

/// Class or interface in the graph
pub struct ClassData<'g> {
    pub name: BinaryName,

    /// `None` for `java/lang/Object` only
    pub superclass: Option<&'g ClassData<'g>>,

    /// Directly implemented interfaces (for an interface: the interfaces it extends)
    pub interfaces: FrozenVec<&'g ClassData<'g>>,

    pub access_flags: ClassAccessFlags,

    /// Declared methods, not including inherited ones
    pub methods: FrozenVec<&'g MethodData<'g>>,

    /// Declared fields, not including inherited ones
    pub fields: FrozenVec<&'g FieldData<'g>>,

    /// Class on whose behalf this runtime-generated class was defined
    pub host_class: Option<&'g ClassData<'g>>,

    /// Reflection accessor classes get to skip `invokespecial` restrictions
    pub is_magic_accessor: bool,
}

impl<'g> ClassData<'g> {
    pub fn new(
        name: BinaryName,
        superclass: &'g ClassData<'g>,
        access_flags: ClassAccessFlags,
    ) -> ClassData<'g> {
        ClassData {
            name,
            superclass: Some(superclass),
            interfaces: FrozenVec::new(),
            access_flags,
            methods: FrozenVec::new(),
            fields: FrozenVec::new(),
            host_class: None,
            is_magic_accessor: false,
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    pub fn id(&'g self) -> ClassId<'g> {
        RefId(self)
    }

    /// Superclass chain, starting with this class and ending at `java/lang/Object`
    pub fn superclasses(&'g self) -> impl Iterator<Item = &'g ClassData<'g>> {
        std::iter::successors(Some(self), |class| class.superclass)
    }

    /// Is this class a subclass of `java/lang/Throwable`?
    pub fn is_throwable(&'g self) -> bool {
        self.superclasses()
            .any(|class| class.name == BinaryName::THROWABLE)
    }

    /// Is this a proper subclass of the other class?
    pub fn is_strict_subclass_of(&'g self, other: &'g ClassData<'g>) -> bool {
        self.superclasses()
            .skip(1)
            .any(|class| class.id() == other.id())
    }

    /// Closest class that both classes extend
    ///
    /// Interfaces have no place in the superclass hierarchy, so anything involving an interface
    /// ends up at the root class.
    pub fn common_superclass(&'g self, other: &'g ClassData<'g>) -> &'g ClassData<'g> {
        let root = self.superclasses().last().unwrap_or(self);
        if self.is_interface() || other.is_interface() {
            return root;
        }
        let ours: HashSet<ClassId<'g>> = self.superclasses().map(ClassData::id).collect();
        other
            .superclasses()
            .find(|class| ours.contains(&class.id()))
            .unwrap_or(root)
    }

    /// Find a method declared in this class or one of its superclasses
    pub fn lookup_method(
        &'g self,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Option<&'g MethodData<'g>> {
        self.superclasses().find_map(|class| {
            class
                .methods
                .iter()
                .find(|m| &m.name == name && &m.descriptor == descriptor)
        })
    }

    /// Find a field declared in this class or one of its superclasses
    pub fn lookup_field(
        &'g self,
        name: &UnqualifiedName,
        descriptor: &FieldType<BinaryName>,
    ) -> Option<&'g FieldData<'g>> {
        self.superclasses().find_map(|class| {
            class
                .fields
                .iter()
                .find(|f| &f.name == name && &f.descriptor == descriptor)
        })
    }

    /// Classes with the same runtime package can see each other's protected and package-private
    /// members
    ///
    /// Every class in the graph is treated as coming from the same class loader.
    pub fn runtime_package(&self) -> &str {
        self.name.package()
    }
}

impl<'g> PartialEq for ClassData<'g> {
    fn eq(&self, other: &ClassData<'g>) -> bool {
        self.name == other.name
    }
}

impl<'g> Eq for ClassData<'g> {}

impl<'g> Debug for ClassData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}

/// Method declared on a class in the graph
pub struct MethodData<'g> {
    /// Declaring class
    pub class: &'g ClassData<'g>,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    pub access_flags: MethodAccessFlags,
}

/// Field declared on a class in the graph
pub struct FieldData<'g> {
    /// Declaring class (a back-pointer, hence the manual `Debug`)
    pub class: &'g ClassData<'g>,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
    pub access_flags: FieldAccessFlags,
}

impl<'g> MethodData<'g> {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_protected(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::PROTECTED)
    }
}

impl<'g> FieldData<'g> {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }

    pub fn is_protected(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::PROTECTED)
    }
}

/// Members print as `pkg/Class.name:descriptor`
fn fmt_member(
    f: &mut fmt::Formatter<'_>,
    class: &ClassData<'_>,
    name: &UnqualifiedName,
    descriptor: &impl RenderDescriptor,
) -> fmt::Result {
    write!(f, "{}.{}:", class.name, name)?;
    f.write_str(&descriptor.render())
}

impl<'g> Debug for MethodData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_member(f, self.class, &self.name, &self.descriptor)
    }
}

impl<'g> Debug for FieldData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_member(f, self.class, &self.name, &self.descriptor)
    }
}
