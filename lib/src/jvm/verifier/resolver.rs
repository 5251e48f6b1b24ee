use super::VerificationFailure;
use crate::jvm::class_graph::{ClassData, ClassGraph};
use crate::jvm::BinaryName;
use std::cell::RefCell;
use std::collections::HashMap;

/// Access to the classes of the surrounding runtime
///
/// The verifier only ever needs to look classes up by name, but it may do so halfway through a
/// method (eg. to find the common superclass of two types at a join point). Implementations are
/// free to load classes lazily when they are first asked for.
pub trait RuntimeAccess<'g> {
    /// Find (or load) a class by name
    fn lookup_class(&self, name: &BinaryName) -> Option<&'g ClassData<'g>>;
}

impl<'g> RuntimeAccess<'g> for ClassGraph<'g> {
    fn lookup_class(&self, name: &BinaryName) -> Option<&'g ClassData<'g>> {
        ClassGraph::lookup_class(self, name)
    }
}

/// Memoizing class resolution for a single verification run
///
/// Operands only carry class names. Whenever a join or an assignability check actually needs the
/// class hierarchy, the class is looked up here and remembered, so that the runtime is asked
/// about each name at most once per method.
pub struct TypeResolver<'a, 'g> {
    runtime: &'a dyn RuntimeAccess<'g>,
    resolved: RefCell<HashMap<BinaryName, &'g ClassData<'g>>>,
}

impl<'a, 'g> TypeResolver<'a, 'g> {
    pub fn new(runtime: &'a dyn RuntimeAccess<'g>) -> TypeResolver<'a, 'g> {
        TypeResolver {
            runtime,
            resolved: RefCell::new(HashMap::new()),
        }
    }

    /// Resolve a class, failing verification if it does not exist
    pub fn resolve(&self, name: &BinaryName) -> Result<&'g ClassData<'g>, VerificationFailure> {
        if let Some(class) = self.resolved.borrow().get(name) {
            return Ok(*class);
        }
        let class = self.runtime.lookup_class(name).ok_or_else(|| {
            VerificationFailure::verify(format!("Could not resolve class {}", name))
        })?;
        self.resolved.borrow_mut().insert(name.clone(), class);
        Ok(class)
    }

    pub fn is_interface(&self, name: &BinaryName) -> Result<bool, VerificationFailure> {
        Ok(self.resolve(name)?.is_interface())
    }

    /// Is `sub` the same class as `sup` or one of its subclasses?
    ///
    /// Only the superclass chain is walked: interface targets are handled by callers.
    pub fn is_subclass(
        &self,
        sub: &BinaryName,
        sup: &BinaryName,
    ) -> Result<bool, VerificationFailure> {
        if sub == sup || sup == &BinaryName::OBJECT {
            return Ok(true);
        }
        Ok(self
            .resolve(sub)?
            .superclasses()
            .any(|class| &class.name == sup))
    }

    /// Nearest class that both classes extend (`java/lang/Object` if either is an interface)
    pub fn common_superclass(
        &self,
        left: &BinaryName,
        right: &BinaryName,
    ) -> Result<BinaryName, VerificationFailure> {
        if left == right {
            return Ok(left.clone());
        }
        if left == &BinaryName::OBJECT || right == &BinaryName::OBJECT {
            return Ok(BinaryName::OBJECT);
        }
        let left = self.resolve(left)?;
        let right = self.resolve(right)?;
        Ok(left.common_superclass(right).name.clone())
    }
}
