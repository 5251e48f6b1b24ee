use crate::jvm::class_graph::{ClassData, ClassId};
use crate::jvm::BinaryName;
use std::collections::HashSet;

/// Subtyping relationship between types
pub trait Assignable {
    /// Can a value of this type be stored where the other type is expected?
    fn is_assignable(&self, super_type: &Self) -> bool;
}

impl<'g> Assignable for ClassId<'g> {
    fn is_assignable(&self, super_type: &ClassId<'g>) -> bool {
        let target: &'g ClassData<'g> = super_type.0;

        // Classes are only ever reached through the superclass chain
        if !target.is_interface() {
            return self.0.superclasses().any(|class| class.id() == *super_type);
        }

        // Interfaces can be reached from any class or interface in the supertype closure
        let mut seen: HashSet<ClassId<'g>> = HashSet::new();
        let mut pending: Vec<&'g ClassData<'g>> = self.0.superclasses().collect();
        while let Some(class) = pending.pop() {
            if class.id() == *super_type {
                return true;
            }
            if seen.insert(class.id()) {
                pending.extend(class.interfaces.iter());
            }
        }
        false
    }
}

/// Is every array assignable to this class?
///
/// Arrays extend `java/lang/Object` and implement `Cloneable` and `Serializable`, nothing else.
pub fn is_array_type_assignable(super_type: &BinaryName) -> bool {
    [
        BinaryName::OBJECT,
        BinaryName::CLONEABLE,
        BinaryName::SERIALIZABLE,
    ]
    .contains(super_type)
}
