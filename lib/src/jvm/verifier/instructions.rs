use super::{
    format_guarantee, subroutine_return_locals, verify_guarantee, Frame, Locals, Member,
    MethodVerifier, Operand, OperandStack, PrimitiveKind, VerificationFailure,
};
use crate::jvm::bytecode::*;
use crate::jvm::class_file::{ConstantIndex, ConstantTag, LoadableKind, Version};
use crate::jvm::{BaseType, BinaryName, RefType, UnqualifiedName};

const LOADABLE_TAGS: [ConstantTag; 9] = [
    ConstantTag::Integer,
    ConstantTag::Float,
    ConstantTag::Long,
    ConstantTag::Double,
    ConstantTag::Class,
    ConstantTag::String,
    ConstantTag::MethodHandle,
    ConstantTag::MethodType,
    ConstantTag::Dynamic,
];

impl<'a, 'g> MethodVerifier<'a, 'g> {
    /// Apply the effect of the instruction at `bci` on the stack and locals
    ///
    /// Branch targets get merged along the way. Returns the offset at which verification should
    /// continue, or `bci` itself if control never falls through.
    pub(super) fn execute(
        &mut self,
        bci: usize,
        stack: &mut OperandStack,
        locals: &mut Locals,
    ) -> Result<usize, VerificationFailure> {
        if self.code.is_wide(bci)? {
            let modified = self.code.read_u1(bci + 1)?;
            verify_guarantee(is_widenable(modified), || {
                format!("Bad wide instruction: {} at {}", modified, bci)
            })?;
        }
        let opcode = self.code.current_bc(bci)?;
        let next = self.code.next_bci(bci)?;

        match opcode {
            NOP => (),

            // Constants
            ACONST_NULL => stack.push(Operand::Null)?,
            ICONST_M1..=ICONST_5 | BIPUSH | SIPUSH => stack.push(Operand::INT)?,
            LCONST_0 | LCONST_1 => stack.push(Operand::LONG)?,
            FCONST_0..=FCONST_2 => stack.push(Operand::FLOAT)?,
            DCONST_0 | DCONST_1 => stack.push(Operand::DOUBLE)?,
            LDC | LDC_W | LDC2_W => self.verify_ldc(bci, opcode, stack)?,

            // Locals
            ILOAD => self.load(stack, locals, self.code.read_local_index(bci)?, Operand::INT)?,
            LLOAD => self.load(stack, locals, self.code.read_local_index(bci)?, Operand::LONG)?,
            FLOAD => self.load(stack, locals, self.code.read_local_index(bci)?, Operand::FLOAT)?,
            DLOAD => self.load(stack, locals, self.code.read_local_index(bci)?, Operand::DOUBLE)?,
            ALOAD => stack.push(locals.load_ref(self.code.read_local_index(bci)?)?)?,
            ILOAD_0..=ILOAD_3 => {
                self.load(stack, locals, (opcode - ILOAD_0) as usize, Operand::INT)?
            }
            LLOAD_0..=LLOAD_3 => {
                self.load(stack, locals, (opcode - LLOAD_0) as usize, Operand::LONG)?
            }
            FLOAD_0..=FLOAD_3 => {
                self.load(stack, locals, (opcode - FLOAD_0) as usize, Operand::FLOAT)?
            }
            DLOAD_0..=DLOAD_3 => {
                self.load(stack, locals, (opcode - DLOAD_0) as usize, Operand::DOUBLE)?
            }
            ALOAD_0..=ALOAD_3 => stack.push(locals.load_ref((opcode - ALOAD_0) as usize)?)?,

            ISTORE => self.store(stack, locals, self.code.read_local_index(bci)?, Operand::INT)?,
            LSTORE => self.store(stack, locals, self.code.read_local_index(bci)?, Operand::LONG)?,
            FSTORE => self.store(stack, locals, self.code.read_local_index(bci)?, Operand::FLOAT)?,
            DSTORE => {
                self.store(stack, locals, self.code.read_local_index(bci)?, Operand::DOUBLE)?
            }
            ASTORE => {
                let value = stack.pop_ref_or_return_address()?;
                locals.store(self.code.read_local_index(bci)?, value)?;
            }
            ISTORE_0..=ISTORE_3 => {
                self.store(stack, locals, (opcode - ISTORE_0) as usize, Operand::INT)?
            }
            LSTORE_0..=LSTORE_3 => {
                self.store(stack, locals, (opcode - LSTORE_0) as usize, Operand::LONG)?
            }
            FSTORE_0..=FSTORE_3 => {
                self.store(stack, locals, (opcode - FSTORE_0) as usize, Operand::FLOAT)?
            }
            DSTORE_0..=DSTORE_3 => {
                self.store(stack, locals, (opcode - DSTORE_0) as usize, Operand::DOUBLE)?
            }
            ASTORE_0..=ASTORE_3 => {
                let value = stack.pop_ref_or_return_address()?;
                locals.store((opcode - ASTORE_0) as usize, value)?;
            }
            IINC => {
                let index = self.code.read_local_index(bci)?;
                locals.load(index, &Operand::INT)?;
                locals.store(index, Operand::INT)?;
            }

            // Arrays
            IALOAD => self.array_load(stack, &[PrimitiveKind::Int])?,
            LALOAD => self.array_load(stack, &[PrimitiveKind::Long])?,
            FALOAD => self.array_load(stack, &[PrimitiveKind::Float])?,
            DALOAD => self.array_load(stack, &[PrimitiveKind::Double])?,
            BALOAD => self.array_load(stack, &[PrimitiveKind::Byte, PrimitiveKind::Boolean])?,
            CALOAD => self.array_load(stack, &[PrimitiveKind::Char])?,
            SALOAD => self.array_load(stack, &[PrimitiveKind::Short])?,
            AALOAD => {
                stack.pop_int()?;
                let array = stack.pop_array()?;
                let component = self.reference_component(&array)?;
                stack.push(component)?;
            }
            IASTORE => self.array_store(stack, &[PrimitiveKind::Int])?,
            LASTORE => self.array_store(stack, &[PrimitiveKind::Long])?,
            FASTORE => self.array_store(stack, &[PrimitiveKind::Float])?,
            DASTORE => self.array_store(stack, &[PrimitiveKind::Double])?,
            BASTORE => self.array_store(stack, &[PrimitiveKind::Byte, PrimitiveKind::Boolean])?,
            CASTORE => self.array_store(stack, &[PrimitiveKind::Char])?,
            SASTORE => self.array_store(stack, &[PrimitiveKind::Short])?,
            AASTORE => {
                // The element type itself is checked at runtime
                let value = stack.pop_ref()?;
                verify_guarantee(!value.is_uninitialized(), || {
                    format!("Storing uninitialized object {} into an array", value)
                })?;
                stack.pop_int()?;
                let array = stack.pop_array()?;
                self.reference_component(&array)?;
            }
            ARRAYLENGTH => {
                stack.pop_array()?;
                stack.push(Operand::INT)?;
            }

            // Stack manipulation
            POP => stack.pop1()?,
            POP2 => stack.pop2()?,
            DUP => stack.dup()?,
            DUP_X1 => stack.dup_x1()?,
            DUP_X2 => stack.dup_x2()?,
            DUP2 => stack.dup2()?,
            DUP2_X1 => stack.dup2_x1()?,
            DUP2_X2 => stack.dup2_x2()?,
            SWAP => stack.swap()?,

            // Arithmetic
            IADD | ISUB | IMUL | IDIV | IREM | ISHL | ISHR | IUSHR | IAND | IOR | IXOR => {
                self.binary(stack, PrimitiveKind::Int, PrimitiveKind::Int)?
            }
            LADD | LSUB | LMUL | LDIV | LREM | LAND | LOR | LXOR => {
                self.binary(stack, PrimitiveKind::Long, PrimitiveKind::Long)?
            }
            LSHL | LSHR | LUSHR => self.binary(stack, PrimitiveKind::Long, PrimitiveKind::Int)?,
            FADD | FSUB | FMUL | FDIV | FREM => {
                self.binary(stack, PrimitiveKind::Float, PrimitiveKind::Float)?
            }
            DADD | DSUB | DMUL | DDIV | DREM => {
                self.binary(stack, PrimitiveKind::Double, PrimitiveKind::Double)?
            }
            INEG | I2B | I2C | I2S => self.convert(stack, PrimitiveKind::Int, PrimitiveKind::Int)?,
            LNEG => self.convert(stack, PrimitiveKind::Long, PrimitiveKind::Long)?,
            FNEG => self.convert(stack, PrimitiveKind::Float, PrimitiveKind::Float)?,
            DNEG => self.convert(stack, PrimitiveKind::Double, PrimitiveKind::Double)?,

            // Conversions
            I2L => self.convert(stack, PrimitiveKind::Int, PrimitiveKind::Long)?,
            I2F => self.convert(stack, PrimitiveKind::Int, PrimitiveKind::Float)?,
            I2D => self.convert(stack, PrimitiveKind::Int, PrimitiveKind::Double)?,
            L2I => self.convert(stack, PrimitiveKind::Long, PrimitiveKind::Int)?,
            L2F => self.convert(stack, PrimitiveKind::Long, PrimitiveKind::Float)?,
            L2D => self.convert(stack, PrimitiveKind::Long, PrimitiveKind::Double)?,
            F2I => self.convert(stack, PrimitiveKind::Float, PrimitiveKind::Int)?,
            F2L => self.convert(stack, PrimitiveKind::Float, PrimitiveKind::Long)?,
            F2D => self.convert(stack, PrimitiveKind::Float, PrimitiveKind::Double)?,
            D2I => self.convert(stack, PrimitiveKind::Double, PrimitiveKind::Int)?,
            D2L => self.convert(stack, PrimitiveKind::Double, PrimitiveKind::Long)?,
            D2F => self.convert(stack, PrimitiveKind::Double, PrimitiveKind::Float)?,

            // Comparisons
            LCMP => self.compare(stack, PrimitiveKind::Long)?,
            FCMPL | FCMPG => self.compare(stack, PrimitiveKind::Float)?,
            DCMPL | DCMPG => self.compare(stack, PrimitiveKind::Double)?,

            // Control flow
            IFEQ..=IFLE => {
                stack.pop_int()?;
                self.branch(self.code.read_branch_dest(bci)?, stack, locals)?;
            }
            IF_ICMPEQ..=IF_ICMPLE => {
                stack.pop_int()?;
                stack.pop_int()?;
                self.branch(self.code.read_branch_dest(bci)?, stack, locals)?;
            }
            IF_ACMPEQ | IF_ACMPNE => {
                stack.pop_ref()?;
                stack.pop_ref()?;
                self.branch(self.code.read_branch_dest(bci)?, stack, locals)?;
            }
            IFNULL | IFNONNULL => {
                stack.pop_ref()?;
                self.branch(self.code.read_branch_dest(bci)?, stack, locals)?;
            }
            GOTO | GOTO_W => {
                self.branch(self.code.read_branch_dest(bci)?, stack, locals)?;
                return Ok(bci);
            }
            JSR | JSR_W => {
                self.check_subroutines_allowed()?;
                return self.verify_jsr(bci, stack, locals);
            }
            RET => {
                self.check_subroutines_allowed()?;
                return self.verify_ret(bci, stack, locals);
            }
            TABLESWITCH | LOOKUPSWITCH => {
                stack.pop_int()?;
                self.verify_switch(bci, opcode, stack, locals)?;
                return Ok(bci);
            }

            // Returns
            IRETURN => return self.verify_return(bci, stack, Some(PrimitiveKind::Int)),
            LRETURN => return self.verify_return(bci, stack, Some(PrimitiveKind::Long)),
            FRETURN => return self.verify_return(bci, stack, Some(PrimitiveKind::Float)),
            DRETURN => return self.verify_return(bci, stack, Some(PrimitiveKind::Double)),
            ARETURN => {
                verify_guarantee(self.return_operand.is_reference(), || {
                    format!("Method {} does not return a reference", self.description)
                })?;
                let value = stack.pop_ref_of(&self.return_operand, &self.resolver)?;
                verify_guarantee(!value.is_uninitialized(), || {
                    format!("Returning uninitialized object {}", value)
                })?;
                return Ok(bci);
            }
            RETURN => {
                verify_guarantee(self.return_operand == Operand::VOID, || {
                    format!("Method {} expects a return value", self.description)
                })?;
                verify_guarantee(!self.method.is_constructor() || self.constructor_called, || {
                    String::from("Constructor must call super() or this() before return")
                })?;
                return Ok(bci);
            }
            ATHROW => {
                let thrown = stack.pop_ref_of(&Operand::THROWABLE, &self.resolver)?;
                verify_guarantee(!thrown.is_uninitialized(), || {
                    format!("Throwing uninitialized object {}", thrown)
                })?;
                return Ok(bci);
            }

            // Fields and methods
            GETSTATIC | PUTSTATIC | GETFIELD | PUTFIELD => {
                self.verify_field(bci, opcode, stack)?
            }
            INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE => {
                self.verify_invoke(bci, opcode, stack, locals)?
            }
            INVOKEDYNAMIC => self.verify_invokedynamic(bci, stack)?,

            // Objects
            NEW => {
                let class = match self.class_operand(bci)? {
                    RefType::Object(class) => class,
                    other => {
                        return Err(VerificationFailure::verify(format!(
                            "Illegal new instruction for array type {:?}",
                            other
                        )))
                    }
                };
                stack.push(Operand::UninitializedNew {
                    class,
                    new_bci: bci,
                })?;
            }
            NEWARRAY => {
                let kind = match self.code.read_u1(bci + 1)? {
                    4 => PrimitiveKind::from_base_type(
                        BaseType::Boolean,
                        self.settings.boolean_arrays_distinct,
                    ),
                    5 => PrimitiveKind::Char,
                    6 => PrimitiveKind::Float,
                    7 => PrimitiveKind::Double,
                    8 => PrimitiveKind::Byte,
                    9 => PrimitiveKind::Short,
                    10 => PrimitiveKind::Int,
                    11 => PrimitiveKind::Long,
                    other => {
                        return Err(VerificationFailure::verify(format!(
                            "Illegal newarray instruction type {}",
                            other
                        )))
                    }
                };
                stack.pop_int()?;
                stack.push(Operand::array_of_primitive(kind))?;
            }
            ANEWARRAY => {
                let component = Operand::from_ref_type(
                    &self.class_operand(bci)?,
                    self.settings.boolean_arrays_distinct,
                );
                let array = component
                    .array_of()
                    .ok_or_else(|| VerificationFailure::verify("Illegal anewarray instruction"))?;
                if let Operand::Array { dimensions, .. } = &array {
                    verify_guarantee(*dimensions <= 255, || {
                        String::from("Array with too many dimensions")
                    })?;
                }
                stack.pop_int()?;
                stack.push(array)?;
            }
            MULTIANEWARRAY => {
                let array = Operand::from_ref_type(
                    &self.class_operand(bci)?,
                    self.settings.boolean_arrays_distinct,
                );
                let requested = self.code.read_u1(bci + 3)? as usize;
                let available = match &array {
                    Operand::Array { dimensions, .. } => *dimensions,
                    _ => 0,
                };
                verify_guarantee(requested > 0 && requested <= available, || {
                    format!(
                        "Illegal dimension {} in multianewarray of {}",
                        requested, array
                    )
                })?;
                for _ in 0..requested {
                    stack.pop_int()?;
                }
                stack.push(array)?;
            }
            CHECKCAST => {
                let target = Operand::from_ref_type(
                    &self.class_operand(bci)?,
                    self.settings.boolean_arrays_distinct,
                );
                let value = stack.pop_ref()?;
                if value.is_uninitialized() && !target.is_array() {
                    stack.push(value)?;
                } else {
                    stack.push(target)?;
                }
            }
            INSTANCEOF => {
                self.class_operand(bci)?;
                stack.pop_ref()?;
                stack.push(Operand::INT)?;
            }
            MONITORENTER | MONITOREXIT => {
                stack.pop_ref()?;
            }

            other => {
                return Err(VerificationFailure::format(format!(
                    "Bad instruction: {} at {}",
                    other, bci
                )))
            }
        }

        Ok(next)
    }

    fn load(
        &self,
        stack: &mut OperandStack,
        locals: &Locals,
        index: usize,
        expected: Operand,
    ) -> Result<(), VerificationFailure> {
        stack.push(locals.load(index, &expected)?)
    }

    fn store(
        &self,
        stack: &mut OperandStack,
        locals: &mut Locals,
        index: usize,
        operand: Operand,
    ) -> Result<(), VerificationFailure> {
        let value = stack.pop_expecting(&operand, &self.resolver)?;
        locals.store(index, value)
    }

    fn binary(
        &self,
        stack: &mut OperandStack,
        kind: PrimitiveKind,
        rhs: PrimitiveKind,
    ) -> Result<(), VerificationFailure> {
        stack.pop_primitive(rhs)?;
        stack.pop_primitive(kind)?;
        stack.push(Operand::Primitive(kind))
    }

    fn convert(
        &self,
        stack: &mut OperandStack,
        from: PrimitiveKind,
        to: PrimitiveKind,
    ) -> Result<(), VerificationFailure> {
        stack.pop_primitive(from)?;
        stack.push(Operand::Primitive(to))
    }

    fn compare(
        &self,
        stack: &mut OperandStack,
        kind: PrimitiveKind,
    ) -> Result<(), VerificationFailure> {
        stack.pop_primitive(kind)?;
        stack.pop_primitive(kind)?;
        stack.push(Operand::INT)
    }

    /// Element type of a primitive array whose element is one of `kinds`
    fn primitive_component(
        &self,
        array: &Operand,
        kinds: &[PrimitiveKind],
    ) -> Result<PrimitiveKind, VerificationFailure> {
        match array.component() {
            Some(Operand::Null) => Ok(kinds[0]),
            Some(Operand::Primitive(kind)) if kinds.contains(&kind) => Ok(kind),
            _ => Err(VerificationFailure::verify(format!(
                "Bad type on operand stack in array access: {}",
                array
            ))),
        }
    }

    /// Element type of an array of references
    fn reference_component(&self, array: &Operand) -> Result<Operand, VerificationFailure> {
        match array.component() {
            Some(component) if component.is_reference() => Ok(component),
            _ => Err(VerificationFailure::verify(format!(
                "Bad type on operand stack in aaload or aastore: {}",
                array
            ))),
        }
    }

    fn array_load(
        &self,
        stack: &mut OperandStack,
        kinds: &[PrimitiveKind],
    ) -> Result<(), VerificationFailure> {
        stack.pop_int()?;
        let array = stack.pop_array()?;
        let kind = self.primitive_component(&array, kinds)?;
        stack.push(Operand::Primitive(kind))
    }

    fn array_store(
        &self,
        stack: &mut OperandStack,
        kinds: &[PrimitiveKind],
    ) -> Result<(), VerificationFailure> {
        stack.pop_primitive(kinds[0])?;
        stack.pop_int()?;
        let array = stack.pop_array()?;
        self.primitive_component(&array, kinds)?;
        Ok(())
    }

    fn verify_return(
        &self,
        bci: usize,
        stack: &mut OperandStack,
        kind: Option<PrimitiveKind>,
    ) -> Result<usize, VerificationFailure> {
        if let Some(kind) = kind {
            let expected = Operand::Primitive(kind);
            verify_guarantee(self.return_operand.to_stack() == expected, || {
                format!(
                    "Method {} returns {}, not {}",
                    self.description, self.return_operand, expected
                )
            })?;
            stack.pop_primitive(kind)?;
        }
        Ok(bci)
    }

    fn check_subroutines_allowed(&self) -> Result<(), VerificationFailure> {
        verify_guarantee(!self.version_at_least(Version::JAVA7), || {
            format!(
                "jsr and ret are not allowed in class files of version {}",
                self.method.version.major_version
            )
        })
    }

    fn verify_switch(
        &mut self,
        bci: usize,
        opcode: Opcode,
        stack: &OperandStack,
        locals: &Locals,
    ) -> Result<(), VerificationFailure> {
        let strict_padding = !self.version_at_least(Version::JAVA8);
        let targets: Vec<i64> = if opcode == TABLESWITCH {
            let switch = self.code.table_switch(bci)?;
            verify_guarantee(!strict_padding || switch.zero_padding, || {
                String::from("Nonzero padding byte in tableswitch")
            })?;
            format_guarantee(switch.low_key() <= switch.high_key(), || {
                String::from("tableswitch low is greater than high")
            })?;
            switch.targets(bci).collect()
        } else {
            let switch = self.code.lookup_switch(bci)?;
            verify_guarantee(!strict_padding || switch.zero_padding, || {
                String::from("Nonzero padding byte in lookupswitch")
            })?;
            format_guarantee(switch.keys_sorted(), || {
                String::from("Bad lookupswitch instruction: keys not sorted")
            })?;
            switch.targets(bci).collect()
        };
        for target in targets {
            self.branch(target, stack, locals)?;
        }
        Ok(())
    }

    /// Enter the subroutine, remembering the frame of the call site for when it returns
    fn verify_jsr(
        &mut self,
        bci: usize,
        stack: &mut OperandStack,
        locals: &mut Locals,
    ) -> Result<usize, VerificationFailure> {
        let target = self.code.read_branch_dest(bci)?;
        let subroutine = self.validate_bci(target)?;

        if self.frames[bci].is_none() {
            self.frames[bci] = Some(Frame {
                stack: stack.values().to_vec(),
                locals: locals.slots().to_vec(),
                subroutines: locals.subroutines.clone(),
            });
        }

        stack.push(Operand::ReturnAddress {
            targets: vec![bci],
            subroutine,
        })?;
        locals.subroutines = locals.subroutines.enter(bci, self.max_locals);
        self.branch(target, stack, locals)?;
        Ok(bci)
    }

    /// Return to the instruction after every `jsr` the return address could have come from
    fn verify_ret(
        &mut self,
        bci: usize,
        stack: &OperandStack,
        locals: &Locals,
    ) -> Result<usize, VerificationFailure> {
        let index = self.code.read_local_index(bci)?;
        let targets = match locals.load_return_address(index)? {
            Operand::ReturnAddress { targets, .. } => targets,
            _ => vec![],
        };

        for jsr_bci in targets {
            self.check_and_set_returned_to(jsr_bci, bci)?;
            let at_jsr = self.frames[jsr_bci].clone().ok_or_else(|| {
                VerificationFailure::verify(format!("No frame for jsr at {}", jsr_bci))
            })?;
            let (slots, subroutines) = subroutine_return_locals(
                locals.slots(),
                &locals.subroutines,
                &at_jsr.locals,
                &at_jsr.subroutines,
            )?;
            let return_locals = Locals::new(slots, subroutines);
            let return_bci = self.code.next_bci(jsr_bci)?;
            self.branch(return_bci as i64, stack, &return_locals)?;
        }
        Ok(bci)
    }

    fn check_and_set_returned_to(
        &mut self,
        jsr_bci: usize,
        ret_bci: usize,
    ) -> Result<(), VerificationFailure> {
        match self.returned_to[jsr_bci] {
            None => {
                self.returned_to[jsr_bci] = Some(ret_bci);
                Ok(())
            }
            Some(existing) if existing == ret_bci => Ok(()),
            Some(_) => Err(VerificationFailure::verify("Multiple returns to single jsr")),
        }
    }

    /// Check that the constant at `index` has one of the given tags and is well-formed
    fn check_constant(
        &self,
        index: ConstantIndex,
        tags: &[ConstantTag],
    ) -> Result<ConstantTag, VerificationFailure> {
        let tag = self.constants.tag_at(index)?;
        verify_guarantee(tags.contains(&tag), || {
            format!(
                "Illegal constant pool index {} in {}: expected one of {:?}, found {:?}",
                index.0, self.description, tags, tag
            )
        })?;
        self.validate_constant(index)?;
        Ok(tag)
    }

    /// Malformed entries behind an otherwise acceptable tag fail verification, not parsing
    fn validate_constant(&self, index: ConstantIndex) -> Result<(), VerificationFailure> {
        self.constants
            .validate_constant_at(index)
            .map_err(|err| VerificationFailure::verify(err.to_string()))
    }

    /// Class named by the constant pool index following the opcode at `bci`
    fn class_operand(&self, bci: usize) -> Result<RefType<BinaryName>, VerificationFailure> {
        let index = ConstantIndex(self.code.read_cpi(bci)?);
        self.check_constant(index, &[ConstantTag::Class])?;
        Ok(self.constants.class_name(index)?)
    }

    fn verify_ldc(
        &self,
        bci: usize,
        opcode: Opcode,
        stack: &mut OperandStack,
    ) -> Result<(), VerificationFailure> {
        let index = ConstantIndex(self.code.read_cpi(bci)?);
        let tag = self.constants.tag_at(index)?;
        verify_guarantee(LOADABLE_TAGS.contains(&tag), || {
            format!("Invalid constant pool load of {:?} at {}", tag, bci)
        })?;
        self.validate_constant(index)?;
        let kind = self.constants.loadable_kind(index)?;

        let operand = match kind {
            LoadableKind::Integer => Operand::INT,
            LoadableKind::Float => Operand::FLOAT,
            LoadableKind::Long => Operand::LONG,
            LoadableKind::Double => Operand::DOUBLE,
            LoadableKind::String => Operand::Reference(BinaryName::STRING),
            LoadableKind::Class => Operand::Reference(BinaryName::CLASS),
            LoadableKind::MethodHandle => Operand::Reference(BinaryName::METHODHANDLE),
            LoadableKind::MethodType => Operand::Reference(BinaryName::METHODTYPE),
            LoadableKind::Dynamic(ref field_type) => {
                Operand::from_field_type(field_type, self.settings.boolean_arrays_distinct)
                    .to_stack()
            }
        };

        match kind {
            LoadableKind::Integer | LoadableKind::Float | LoadableKind::String => (),
            LoadableKind::Long | LoadableKind::Double => (),
            LoadableKind::Class => verify_guarantee(self.version_at_least(Version::JAVA5), || {
                String::from("ldc of a class constant needs class file version 49")
            })?,
            LoadableKind::MethodHandle | LoadableKind::MethodType => {
                format_guarantee(self.version_at_least(Version::JAVA7), || {
                    String::from("ldc of a method handle or method type needs class file version 51")
                })?
            }
            LoadableKind::Dynamic(_) => {
                format_guarantee(self.version_at_least(Version::JAVA11), || {
                    String::from("ldc of a dynamic constant needs class file version 55")
                })?
            }
        }

        let wide_value = operand.is_type2();
        verify_guarantee(wide_value == (opcode == LDC2_W), || {
            format!("Illegal type {} for constant loaded at {}", operand, bci)
        })?;
        stack.push(operand)
    }

    fn verify_field(
        &self,
        bci: usize,
        opcode: Opcode,
        stack: &mut OperandStack,
    ) -> Result<(), VerificationFailure> {
        let index = ConstantIndex(self.code.read_cpi(bci)?);
        self.check_constant(index, &[ConstantTag::FieldRef])?;
        let holder = self.constants.member_class_name(index)?;
        let name = self.constants.field_name(index)?;
        let field_type = self.constants.field_type(index)?;
        let field = Operand::from_field_type(&field_type, self.settings.boolean_arrays_distinct);

        let holder_name = match &holder {
            RefType::Object(class) => class,
            _ => {
                return Err(VerificationFailure::verify(format!(
                    "Field access on array type {:?}",
                    holder
                )))
            }
        };
        let holder_operand = Operand::Reference(holder_name.clone());

        match opcode {
            GETSTATIC => stack.push(field)?,
            PUTSTATIC => {
                self.pop_argument(stack, &field)?;
            }
            GETFIELD => {
                let receiver = stack.pop_ref_of(&holder_operand, &self.resolver)?;
                self.check_uninitialized_field_access(&receiver, holder_name)?;
                self.check_protected_member(
                    &receiver,
                    &holder,
                    Member::Field(&name, &field_type),
                )?;
                stack.push(field)?;
            }
            _ => {
                self.pop_argument(stack, &field)?;
                let receiver = stack.pop_ref_of(&holder_operand, &self.resolver)?;
                self.check_uninitialized_field_access(&receiver, holder_name)?;
                self.check_protected_member(
                    &receiver,
                    &holder,
                    Member::Field(&name, &field_type),
                )?;
            }
        }
        Ok(())
    }

    /// Pop a value passed to a method or stored in a field
    fn pop_argument(
        &self,
        stack: &mut OperandStack,
        expected: &Operand,
    ) -> Result<Operand, VerificationFailure> {
        let value = stack.pop_expecting(expected, &self.resolver)?;
        verify_guarantee(!value.is_uninitialized(), || {
            format!("Passing uninitialized object {} where {} is expected", value, expected)
        })?;
        Ok(value)
    }

    fn verify_invoke(
        &mut self,
        bci: usize,
        opcode: Opcode,
        stack: &mut OperandStack,
        locals: &mut Locals,
    ) -> Result<(), VerificationFailure> {
        let index = ConstantIndex(self.code.read_cpi(bci)?);
        let interface_refs_allowed = self.version_at_least(Version::JAVA8);
        let tags: &[ConstantTag] = match opcode {
            INVOKEVIRTUAL => &[ConstantTag::MethodRef],
            INVOKEINTERFACE => &[ConstantTag::InterfaceMethodRef],
            _ if interface_refs_allowed => {
                &[ConstantTag::MethodRef, ConstantTag::InterfaceMethodRef]
            }
            _ => &[ConstantTag::MethodRef],
        };
        self.check_constant(index, tags)?;

        let holder = self.constants.member_class_name(index)?;
        let name = self.constants.method_name(index)?;
        let descriptor = self.constants.method_descriptor(index)?;

        verify_guarantee(name != UnqualifiedName::CLINIT, || {
            String::from("Illegal call to internal method <clinit>")
        })?;
        verify_guarantee(name != UnqualifiedName::INIT || opcode == INVOKESPECIAL, || {
            String::from("Illegal call to <init> outside of invokespecial")
        })?;

        if opcode == INVOKEINTERFACE {
            let count = self.code.read_u1(bci + 3)? as usize;
            verify_guarantee(count == descriptor.parameter_length(true), || {
                String::from("Inconsistent args count operand in invokeinterface")
            })?;
            verify_guarantee(self.code.read_u1(bci + 4)? == 0, || {
                String::from("Fourth operand byte of invokeinterface must be zero")
            })?;
        }

        let boolean_arrays_distinct = self.settings.boolean_arrays_distinct;
        for parameter in descriptor.parameters.iter().rev() {
            self.pop_argument(
                stack,
                &Operand::from_field_type(parameter, boolean_arrays_distinct),
            )?;
        }

        let holder_operand = Operand::from_ref_type(&holder, boolean_arrays_distinct);
        match opcode {
            INVOKESTATIC => (),
            INVOKESPECIAL if name == UnqualifiedName::INIT => {
                let receiver = stack.pop_uninitialized()?;
                self.check_initializer_call(&receiver, &holder)?;
                let initialized = receiver.initialized();
                stack.init_uninitialized(&receiver, &initialized);
                locals.init_uninitialized(&receiver, &initialized);
                if let Operand::UninitializedThis(_) = receiver {
                    self.constructor_called = true;
                }
            }
            INVOKESPECIAL => {
                let receiver = self.pop_receiver(stack, &holder_operand)?;
                self.check_invokespecial_access(&holder_operand, &receiver)?;
            }
            INVOKEVIRTUAL => {
                let receiver = self.pop_receiver(stack, &holder_operand)?;
                self.check_protected_member(
                    &receiver,
                    &holder,
                    Member::Method(&name, &descriptor),
                )?;
            }
            _ => {
                self.pop_receiver(stack, &holder_operand)?;
            }
        }

        if let Some(return_type) = &descriptor.return_type {
            stack.push(Operand::from_field_type(return_type, boolean_arrays_distinct))?;
        }
        Ok(())
    }

    fn pop_receiver(
        &self,
        stack: &mut OperandStack,
        holder: &Operand,
    ) -> Result<Operand, VerificationFailure> {
        let receiver = stack.pop_ref_of(holder, &self.resolver)?;
        verify_guarantee(!receiver.is_uninitialized(), || {
            format!("Method call on uninitialized object {}", receiver)
        })?;
        Ok(receiver)
    }

    /// Check which constructor an uninitialized value is allowed to be initialized with
    fn check_initializer_call(
        &self,
        receiver: &Operand,
        holder: &RefType<BinaryName>,
    ) -> Result<(), VerificationFailure> {
        let holder = match holder {
            RefType::Object(holder) => holder,
            _ => return Err(VerificationFailure::verify("Call to <init> on an array type")),
        };
        match receiver {
            Operand::UninitializedThis(class) => {
                let superclass = self.method.class.superclass.map(|superclass| &superclass.name);
                verify_guarantee(self.method.is_constructor(), || {
                    String::from("Calling <init> on uninitialized this outside of a constructor")
                })?;
                verify_guarantee(holder == class || Some(holder) == superclass, || {
                    format!(
                        "Bad <init> method call: {} is not {} or its superclass",
                        holder, class
                    )
                })
            }
            Operand::UninitializedNew { class, new_bci } => {
                let new_class = match self.code.opcode(*new_bci)? {
                    NEW => {
                        let index = ConstantIndex(self.code.read_u2(new_bci + 1)?);
                        Some(self.constants.class_name(index)?)
                    }
                    _ => None,
                };
                let matches = new_class == Some(RefType::Object(holder.clone()));
                verify_guarantee(matches && holder == class, || {
                    format!(
                        "Call to wrong <init> method: {} for new {} at {}",
                        holder, class, new_bci
                    )
                })
            }
            _ => Err(VerificationFailure::verify(format!(
                "Calling initialization method on already initialized object {}",
                receiver
            ))),
        }
    }

    fn verify_invokedynamic(
        &self,
        bci: usize,
        stack: &mut OperandStack,
    ) -> Result<(), VerificationFailure> {
        let index = ConstantIndex(self.code.read_cpi(bci)?);
        self.check_constant(index, &[ConstantTag::InvokeDynamic])?;
        verify_guarantee(
            self.code.read_u1(bci + 3)? == 0 && self.code.read_u1(bci + 4)? == 0,
            || String::from("Third and fourth operand bytes of invokedynamic must be zero"),
        )?;

        let name = self.constants.invoke_dynamic_name(index)?;
        verify_guarantee(
            name != UnqualifiedName::INIT && name != UnqualifiedName::CLINIT,
            || format!("Illegal invokedynamic method name {}", name),
        )?;

        let descriptor = self.constants.invoke_dynamic_descriptor(index)?;
        let boolean_arrays_distinct = self.settings.boolean_arrays_distinct;
        for parameter in descriptor.parameters.iter().rev() {
            self.pop_argument(
                stack,
                &Operand::from_field_type(parameter, boolean_arrays_distinct),
            )?;
        }
        if let Some(return_type) = &descriptor.return_type {
            stack.push(Operand::from_field_type(return_type, boolean_arrays_distinct))?;
        }
        Ok(())
    }
}
