use super::{verify_guarantee, MethodVerifier, Operand, VerificationFailure};
use crate::jvm::{BinaryName, FieldType, MethodDescriptor, RefType, UnqualifiedName};

/// Member being accessed through a constant pool reference
#[derive(Copy, Clone)]
pub enum Member<'m> {
    Field(&'m UnqualifiedName, &'m FieldType<BinaryName>),
    Method(&'m UnqualifiedName, &'m MethodDescriptor<BinaryName>),
}

impl<'a, 'g> MethodVerifier<'a, 'g> {
    /// Protected members of a superclass in another package can only be accessed through
    /// receivers that are instances of the current class
    pub(super) fn check_protected_member(
        &self,
        receiver: &Operand,
        holder: &RefType<BinaryName>,
        member: Member,
    ) -> Result<(), VerificationFailure> {
        if receiver == &self.this_operand || receiver.is_uninitialized() {
            return Ok(());
        }
        let holder = match holder {
            RefType::Object(name) => name,
            _ => return Ok(()),
        };

        // Only superclasses of the current class have relevant protected members
        let ancestor = match self
            .method
            .class
            .superclasses()
            .skip(1)
            .find(|class| &class.name == holder)
        {
            Some(ancestor) => ancestor,
            None => return Ok(()),
        };

        let (declaring_class, is_clone) = match member {
            Member::Field(name, descriptor) => match ancestor.lookup_field(name, descriptor) {
                Some(field) if field.is_protected() => (field.class, false),
                _ => return Ok(()),
            },
            Member::Method(name, descriptor) => match ancestor.lookup_method(name, descriptor) {
                Some(method) if method.is_protected() => {
                    (method.class, name == &UnqualifiedName::CLONE)
                }
                _ => return Ok(()),
            },
        };
        if declaring_class.runtime_package() == self.method.class.runtime_package() {
            return Ok(());
        }

        // Arrays override `Object.clone` with a public method
        if is_clone && declaring_class.name == BinaryName::OBJECT && receiver.is_array() {
            return Ok(());
        }

        let allowed = receiver.complies_with(&self.this_operand, &self.resolver)?;
        verify_guarantee(allowed, || match member {
            Member::Field(..) => format!("Illegal protected field access in {}", self.description),
            Member::Method(..) => {
                format!("Illegal protected method access in {}", self.description)
            }
        })
    }

    /// `invokespecial` of anything but a constructor must target the current class or one of its
    /// superclasses, through a receiver that is an instance of the current class
    pub(super) fn check_invokespecial_access(
        &self,
        holder: &Operand,
        receiver: &Operand,
    ) -> Result<(), VerificationFailure> {
        let class = self.method.class;
        let host = class
            .host_class
            .map(|host| Operand::Reference(host.name.clone()));

        let holder_ok = self.this_operand.complies_with(holder, &self.resolver)?
            || class.is_magic_accessor
            || match &host {
                Some(host) => host.complies_with(holder, &self.resolver)?,
                None => false,
            };
        verify_guarantee(holder_ok, || {
            String::from("Bad invokespecial instruction: current class isn't assignable to reference class.")
        })?;

        let receiver_ok = receiver.complies_with(&self.this_operand, &self.resolver)?
            || class.is_magic_accessor
            || match &host {
                Some(host) => receiver.complies_with(host, &self.resolver)?,
                None => false,
            };
        verify_guarantee(receiver_ok, || {
            format!("Bad type on operand stack for invokespecial: {}", receiver)
        })
    }

    /// Fields can be accessed on an uninitialized `this` only while the current constructor is
    /// setting up the fields of its own class
    pub(super) fn check_uninitialized_field_access(
        &self,
        receiver: &Operand,
        holder: &BinaryName,
    ) -> Result<(), VerificationFailure> {
        let allowed = match receiver {
            Operand::UninitializedThis(_) => {
                self.method.is_constructor() && holder == self.this_class_name()
            }
            Operand::UninitializedNew { .. } => false,
            _ => true,
        };
        verify_guarantee(allowed, || {
            format!("Bad access to field of uninitialized object {}", receiver)
        })
    }
}
