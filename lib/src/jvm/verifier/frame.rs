use super::{
    verify_guarantee, Operand, PrimitiveKind, SubroutineModifications, TypeResolver,
    VerificationFailure,
};
use crate::util::Width;

/// Snapshot of the stack and local variables at a point in the bytecode
///
/// This is what gets stored for jump targets and exception handlers. Control flow reaching such a
/// point has its own state merged into the stored frame (or checked against it, when frames come
/// from a stack map table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Values on the stack, bottom first (a `long` or `double` is a single entry)
    pub stack: Vec<Operand>,

    /// Local variables, one entry per slot (the second slot of a `long` or `double` is `Top`)
    pub locals: Vec<Operand>,

    pub subroutines: SubroutineModifications,
}

impl Frame {
    /// Number of stack slots used
    pub fn stack_size(&self) -> usize {
        self.stack.iter().map(Width::width).sum()
    }
}

/// Operand stack of the method being verified
///
/// Values are stored one entry per value, while the maximum is enforced in slots.
#[derive(Debug, Clone)]
pub struct OperandStack {
    values: Vec<Operand>,
    size: usize,
    max_size: usize,
}

impl OperandStack {
    pub fn new(max_size: usize) -> OperandStack {
        OperandStack {
            values: vec![],
            size: 0,
            max_size,
        }
    }

    /// Stack holding the given values
    pub fn with_values(
        values: Vec<Operand>,
        max_size: usize,
    ) -> Result<OperandStack, VerificationFailure> {
        let size = values.iter().map(Width::width).sum();
        verify_guarantee(size <= max_size, || String::from("Operand stack overflow"))?;
        Ok(OperandStack {
            values,
            size,
            max_size,
        })
    }

    pub fn values(&self) -> &[Operand] {
        &self.values
    }

    /// Number of slots used
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.size = 0;
    }

    pub fn push(&mut self, operand: Operand) -> Result<(), VerificationFailure> {
        let operand = operand.to_stack();
        verify_guarantee(operand != Operand::VOID, || {
            String::from("Pushing void onto the stack")
        })?;
        let size = self.size + operand.width();
        verify_guarantee(size <= self.max_size, || {
            String::from("Operand stack overflow")
        })?;
        self.size = size;
        self.values.push(operand);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Operand, VerificationFailure> {
        let operand = self
            .values
            .pop()
            .ok_or_else(|| VerificationFailure::verify("Stack underflow"))?;
        self.size -= operand.width();
        Ok(operand)
    }

    pub fn peek(&self) -> Result<&Operand, VerificationFailure> {
        self.values
            .last()
            .ok_or_else(|| VerificationFailure::verify("Stack underflow"))
    }

    /// Pop a value that must comply with `expected`
    pub fn pop_expecting(
        &mut self,
        expected: &Operand,
        resolver: &TypeResolver,
    ) -> Result<Operand, VerificationFailure> {
        let expected = expected.to_stack();
        if expected.is_reference() {
            return self.pop_ref_of(&expected, resolver);
        }
        let operand = self.pop()?;
        verify_guarantee(operand.complies_with(&expected, resolver)?, || {
            format!("Type check error: {} cannot be merged into {}", operand, expected)
        })?;
        Ok(operand)
    }

    pub fn pop_primitive(&mut self, kind: PrimitiveKind) -> Result<(), VerificationFailure> {
        let expected = Operand::Primitive(kind.to_stack());
        let operand = self.pop()?;
        verify_guarantee(operand == expected, || {
            format!("Type check error: {} cannot be merged into {}", operand, expected)
        })
    }

    pub fn pop_int(&mut self) -> Result<(), VerificationFailure> {
        self.pop_primitive(PrimitiveKind::Int)
    }

    pub fn pop_float(&mut self) -> Result<(), VerificationFailure> {
        self.pop_primitive(PrimitiveKind::Float)
    }

    /// Pop any reference (including uninitialized ones)
    pub fn pop_ref(&mut self) -> Result<Operand, VerificationFailure> {
        let operand = self.pop()?;
        verify_guarantee(operand.is_reference(), || {
            format!("Invalid operand on the stack: expected a reference, found {}", operand)
        })?;
        Ok(operand)
    }

    /// Pop a reference that must comply with `expected`
    ///
    /// Uninitialized values are checked as if they had already been initialized: callers decide
    /// whether an uninitialized value is acceptable.
    pub fn pop_ref_of(
        &mut self,
        expected: &Operand,
        resolver: &TypeResolver,
    ) -> Result<Operand, VerificationFailure> {
        let operand = self.pop_ref()?;
        verify_guarantee(operand.initialized().complies_with(expected, resolver)?, || {
            format!("Type check error: {} cannot be merged into {}", operand, expected)
        })?;
        Ok(operand)
    }

    pub fn pop_uninitialized(&mut self) -> Result<Operand, VerificationFailure> {
        let operand = self.pop()?;
        verify_guarantee(operand.is_uninitialized(), || {
            format!("Calling initialization method on already initialized object {}", operand)
        })?;
        Ok(operand)
    }

    /// Pop an array or `null`
    pub fn pop_array(&mut self) -> Result<Operand, VerificationFailure> {
        let operand = self.pop()?;
        verify_guarantee(
            matches!(operand, Operand::Array { .. } | Operand::Null),
            || format!("Expected an array on the stack, found {}", operand),
        )?;
        Ok(operand)
    }

    /// Pop what `astore` accepts: a reference or a return address
    pub fn pop_ref_or_return_address(&mut self) -> Result<Operand, VerificationFailure> {
        let operand = self.pop()?;
        verify_guarantee(
            operand.is_reference() || matches!(operand, Operand::ReturnAddress { .. }),
            || format!("Expected a reference or return address, found {}", operand),
        )?;
        Ok(operand)
    }

    /// Replace every copy of an uninitialized value once its constructor has run
    pub fn init_uninitialized(&mut self, uninitialized: &Operand, initialized: &Operand) {
        for value in &mut self.values {
            if value == uninitialized {
                *value = initialized.clone();
            }
        }
    }

    fn pop_category1(&mut self) -> Result<Operand, VerificationFailure> {
        let operand = self.pop()?;
        verify_guarantee(!operand.is_type2(), || {
            format!("Category 2 value {} used where category 1 is required", operand)
        })?;
        Ok(operand)
    }

    fn push_all(&mut self, operands: Vec<Operand>) -> Result<(), VerificationFailure> {
        for operand in operands {
            self.push(operand)?;
        }
        Ok(())
    }

    pub fn pop1(&mut self) -> Result<(), VerificationFailure> {
        self.pop_category1().map(|_| ())
    }

    pub fn pop2(&mut self) -> Result<(), VerificationFailure> {
        if !self.pop()?.is_type2() {
            self.pop_category1()?;
        }
        Ok(())
    }

    pub fn dup(&mut self) -> Result<(), VerificationFailure> {
        let v1 = self.pop_category1()?;
        self.push_all(vec![v1.clone(), v1])
    }

    pub fn dup_x1(&mut self) -> Result<(), VerificationFailure> {
        let v1 = self.pop_category1()?;
        let v2 = self.pop_category1()?;
        self.push_all(vec![v1.clone(), v2, v1])
    }

    pub fn dup_x2(&mut self) -> Result<(), VerificationFailure> {
        let v1 = self.pop_category1()?;
        let v2 = self.pop()?;
        if v2.is_type2() {
            self.push_all(vec![v1.clone(), v2, v1])
        } else {
            let v3 = self.pop_category1()?;
            self.push_all(vec![v1.clone(), v3, v2, v1])
        }
    }

    pub fn dup2(&mut self) -> Result<(), VerificationFailure> {
        let v1 = self.pop()?;
        if v1.is_type2() {
            self.push_all(vec![v1.clone(), v1])
        } else {
            let v2 = self.pop_category1()?;
            self.push_all(vec![v2.clone(), v1.clone(), v2, v1])
        }
    }

    pub fn dup2_x1(&mut self) -> Result<(), VerificationFailure> {
        let v1 = self.pop()?;
        if v1.is_type2() {
            let v2 = self.pop_category1()?;
            self.push_all(vec![v1.clone(), v2, v1])
        } else {
            let v2 = self.pop_category1()?;
            let v3 = self.pop_category1()?;
            self.push_all(vec![v2.clone(), v1.clone(), v3, v2, v1])
        }
    }

    pub fn dup2_x2(&mut self) -> Result<(), VerificationFailure> {
        let v1 = self.pop()?;
        if v1.is_type2() {
            let v2 = self.pop()?;
            if v2.is_type2() {
                self.push_all(vec![v1.clone(), v2, v1])
            } else {
                let v3 = self.pop_category1()?;
                self.push_all(vec![v1.clone(), v3, v2, v1])
            }
        } else {
            let v2 = self.pop_category1()?;
            let v3 = self.pop()?;
            if v3.is_type2() {
                self.push_all(vec![v2.clone(), v1.clone(), v3, v2, v1])
            } else {
                let v4 = self.pop_category1()?;
                self.push_all(vec![v2.clone(), v1.clone(), v4, v3, v2, v1])
            }
        }
    }

    pub fn swap(&mut self) -> Result<(), VerificationFailure> {
        let v1 = self.pop_category1()?;
        let v2 = self.pop_category1()?;
        self.push_all(vec![v1, v2])
    }
}

/// Local variables of the method being verified
#[derive(Debug, Clone)]
pub struct Locals {
    slots: Vec<Operand>,

    /// Writes are recorded here while inside subroutines
    pub subroutines: SubroutineModifications,
}

impl Locals {
    pub fn new(slots: Vec<Operand>, subroutines: SubroutineModifications) -> Locals {
        Locals { slots, subroutines }
    }

    pub fn slots(&self) -> &[Operand] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    fn get(&self, index: usize) -> Result<&Operand, VerificationFailure> {
        self.slots
            .get(index)
            .ok_or_else(|| VerificationFailure::verify(format!("Invalid local index {}", index)))
    }

    /// Load a primitive of the given kind
    pub fn load(&self, index: usize, expected: &Operand) -> Result<Operand, VerificationFailure> {
        let expected = expected.to_stack();
        let operand = self.get(index)?;
        verify_guarantee(operand == &expected, || {
            format!(
                "Incompatible local variable {}: expected {}, found {}",
                index, expected, operand
            )
        })?;
        if expected.is_type2() {
            self.get(index + 1)?;
        }
        Ok(expected)
    }

    /// Load a reference (possibly uninitialized) for `aload`
    pub fn load_ref(&self, index: usize) -> Result<Operand, VerificationFailure> {
        let operand = self.get(index)?;
        verify_guarantee(operand.is_reference(), || {
            format!(
                "Incompatible local variable {}: expected a reference, found {}",
                index, operand
            )
        })?;
        Ok(operand.clone())
    }

    pub fn load_return_address(&self, index: usize) -> Result<Operand, VerificationFailure> {
        let operand = self.get(index)?;
        verify_guarantee(matches!(operand, Operand::ReturnAddress { .. }), || {
            format!(
                "Incompatible local variable {}: expected a return address, found {}",
                index, operand
            )
        })?;
        Ok(operand.clone())
    }

    pub fn store(&mut self, index: usize, operand: Operand) -> Result<(), VerificationFailure> {
        let width = operand.width();
        verify_guarantee(index + width <= self.slots.len(), || {
            format!("Invalid local index {}", index)
        })?;

        // Overwriting the second half of a `long` or `double` invalidates the first half
        if index > 0 && self.slots[index - 1].is_type2() {
            self.slots[index - 1] = Operand::Top;
            self.subroutines.mark_dirty(index - 1);
        }

        self.slots[index] = operand;
        self.subroutines.mark_dirty(index);
        if width == 2 {
            self.slots[index + 1] = Operand::Top;
            self.subroutines.mark_dirty(index + 1);
        }
        Ok(())
    }

    pub fn init_uninitialized(&mut self, uninitialized: &Operand, initialized: &Operand) {
        for slot in &mut self.slots {
            if slot == uninitialized {
                *slot = initialized.clone();
            }
        }
    }
}
