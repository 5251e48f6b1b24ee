//! Bytecode verification
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other words:
//! although the values on the stack and in the locals may obviously be different, the types and
//! order of the stack and local variables cannot. This information is referred to as the _frame_
//! (represented using [`Frame`]) and the "types" tracked in it are [`Operand`]s, which are
//! slightly augmented JVM types that also capture initialization, `null`, and return addresses.
//!
//! Knowing the frame at a point in the code makes it possible to verify that the next instruction
//! makes sense (eg. `dadd` only makes sense if the top two elements on the stack are of type
//! `double`). Things get more complicated when an instruction can be reached from multiple
//! locations (eg. it is the target of jumps or the start of an exception handler). In those cases,
//! the frames from the different source locations need to be unified. This ends up being a
//! fix-point algorithm which converges towards the right answer (if there is one).
//!
//! Since version 50, class files can carry a [`crate::jvm::class_file::StackMapTable`] which
//! declares the frame at every jump target upfront. When it is present, unifying frames turns into
//! checking that the incoming frame fits the declared one. Version 50 classes whose stack map
//! table doesn't check out get a second chance without it, the same way the JVM falls back to its
//! type-inferring verifier for them.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod access;
mod failure;
mod frame;
mod instructions;
mod method;
mod method_verifier;
mod operand;
mod resolver;
mod settings;
mod stack_map;
mod subroutine;
mod types;
mod worklist;

pub use access::*;
pub use failure::*;
pub use frame::*;
pub use method::*;
pub use method_verifier::*;
pub use operand::*;
pub use resolver::*;
pub use settings::*;
pub use stack_map::*;
pub use subroutine::*;
pub use types::*;
pub use worklist::*;

use crate::jvm::class_file::Version;
use log::debug;

/// Verify a method with the default [`Settings`]
///
/// Classes referred to by the method are looked up through `runtime`, which may load them lazily.
pub fn verify<'g>(
    runtime: &dyn RuntimeAccess<'g>,
    method: &VerifiableMethod<'_, 'g>,
) -> Result<(), VerificationFailure> {
    verify_with_settings(runtime, method, &Settings::default())
}

/// Verify a method
///
/// Methods without code are fine as long as they are `abstract` or `native`.
pub fn verify_with_settings<'g>(
    runtime: &dyn RuntimeAccess<'g>,
    method: &VerifiableMethod<'_, 'g>,
    settings: &Settings,
) -> Result<(), VerificationFailure> {
    let code = match &method.code {
        Some(code) => code,
        None if method.is_abstract_or_native() => return Ok(()),
        None => {
            return Err(VerificationFailure::format_no_fallback(format!(
                "Missing Code attribute in {}",
                method
            )))
        }
    };

    debug!("verifying {}", method);
    let use_stack_maps = method.version >= Version::JAVA6;
    let mut verifier =
        MethodVerifier::new(TypeResolver::new(runtime), method, code, settings, use_stack_maps);
    let failure = match verifier.verify() {
        Ok(()) => return Ok(()),
        Err(failure) => failure,
    };

    let retry = settings.allow_fallback
        && failure.allow_fallback
        && method.version.major_version == Version::JAVA6.major_version
        && !verifier.stack_map_initialized();
    if !retry {
        return Err(failure);
    }

    debug!(
        "retrying {} without its stack map table after: {}",
        method, failure
    );
    MethodVerifier::new(TypeResolver::new(runtime), method, code, settings, false).verify()
}
