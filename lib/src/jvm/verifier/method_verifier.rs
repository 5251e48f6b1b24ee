use super::{
    format_guarantee, ingest_stack_map_table, verify_guarantee, FailureKind, Frame, Locals,
    Operand, OperandStack, Settings, SubroutineModifications, TypeResolver, VerifiableMethod,
    VerificationFailure, VerifierFrameBuilder, Worklist, WorklistItem,
};
use crate::jvm::bytecode::*;
use crate::jvm::class_file::{Code, ConstantTag, ConstantsPool, ExceptionHandler, Version};
use crate::jvm::class_graph::Assignable;
use crate::jvm::{BinaryName, RefType};
use crate::util::Width;
use bitflags::bitflags;
use log::trace;

/// What is known about the offset of a byte in the code array
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BciState {
    /// Not the start of an instruction
    Unreachable,

    /// Start of an instruction that hasn't been verified yet
    Unseen,

    /// Start of an instruction that has been verified at least once
    Done,

    /// Start of an instruction which control flow merges into, so it has a stored frame
    JumpTarget,
}

bitflags! {
    /// Verification status of an exception handler
    pub struct HandlerStatus: u8 {
        /// No instruction covered by the handler has been reached yet
        const UNENCOUNTERED = 1;

        /// Handler frame changed since the handler was last verified
        const NONVERIFIED = 2;
        const VERIFIED = 4;

        /// A covered instruction was reached after the superclass constructor was called
        const CALLED_CONSTRUCTOR = 8;

        /// A covered instruction was reached before the superclass constructor was called
        const NO_CONSTRUCTOR_CALLED = 16;
    }
}

/// State of the verification of a single method
///
/// Frames are stored for every offset control flow merges into. Verification proceeds by
/// abstractly executing straight-line code from some starting frame, merging into stored frames
/// along the way. Branches to targets whose frame changed get queued in the worklist, so the whole
/// thing is a fixpoint computation which ends when no stored frame changes anymore.
///
/// When the method has a stack map table, the frames are given upfront and merging turns into
/// checking that incoming states fit the declared frames.
pub struct MethodVerifier<'a, 'g> {
    pub(super) method: &'a VerifiableMethod<'a, 'g>,
    pub(super) settings: &'a Settings,
    pub(super) resolver: TypeResolver<'a, 'g>,
    pub(super) constants: &'a ConstantsPool,
    pub(super) code: BytecodeStream<'a>,
    pub(super) max_stack: usize,
    pub(super) max_locals: usize,

    /// Initialized type of `this`
    pub(super) this_operand: Operand,

    /// Type of returned values (`void` for methods returning nothing)
    pub(super) return_operand: Operand,

    use_stack_maps: bool,
    stack_map_table: Option<&'a crate::jvm::class_file::StackMapTable>,

    /// Set once a non-empty stack map table has been ingested without problems
    pub(super) stack_map_initialized: bool,

    pub(super) states: Vec<BciState>,
    pub(super) frames: Vec<Option<Frame>>,

    /// For each `jsr`, the `ret` which returns to it
    pub(super) returned_to: Vec<Option<usize>>,

    handlers: &'a [ExceptionHandler],
    handler_status: Vec<HandlerStatus>,
    catch_types: Vec<Operand>,

    worklist: Worklist,

    /// Has the superclass constructor been called along the path being verified?
    pub(super) constructor_called: bool,

    /// Whether every path that reached each offset had called the superclass constructor
    constructor_called_at: Vec<bool>,

    /// Rendered method, for messages
    pub(super) description: String,
}

impl<'a, 'g> MethodVerifier<'a, 'g> {
    pub fn new(
        resolver: TypeResolver<'a, 'g>,
        method: &'a VerifiableMethod<'a, 'g>,
        code: &'a Code,
        settings: &'a Settings,
        use_stack_maps: bool,
    ) -> MethodVerifier<'a, 'g> {
        let end = code.code_array.len();
        let return_operand = match &method.descriptor.return_type {
            None => Operand::VOID,
            Some(return_type) => {
                Operand::from_field_type(return_type, settings.boolean_arrays_distinct)
            }
        };
        MethodVerifier {
            method,
            settings,
            resolver,
            constants: method.constants,
            code: BytecodeStream::new(&code.code_array),
            max_stack: code.max_stack as usize,
            max_locals: code.max_locals as usize,
            this_operand: Operand::Reference(method.class.name.clone()),
            return_operand,
            use_stack_maps,
            stack_map_table: code.stack_map_table.as_ref(),
            stack_map_initialized: false,
            states: vec![BciState::Unreachable; end],
            frames: vec![None; end],
            returned_to: vec![None; end],
            handlers: &code.exception_table,
            handler_status: vec![HandlerStatus::UNENCOUNTERED; code.exception_table.len()],
            catch_types: vec![],
            worklist: Worklist::new(),
            constructor_called: true,
            constructor_called_at: vec![true; end],
            description: method.to_string(),
        }
    }

    pub fn stack_map_initialized(&self) -> bool {
        self.stack_map_initialized
    }

    pub(super) fn this_class_name(&self) -> &BinaryName {
        &self.method.class.name
    }

    /// Verify the whole method
    pub fn verify(&mut self) -> Result<(), VerificationFailure> {
        format_guarantee(self.code.end_bci() > 0, || {
            format!("Empty code array in {}", self.description)
        })?;
        self.prepass()?;

        let (initial, parameter_slots) = self.initial_frame()?;
        self.constructor_called =
            !self.method.is_constructor() || self.this_class_name() == &BinaryName::OBJECT;

        if self.use_stack_maps {
            if let Some(table) = self.stack_map_table {
                let mut builder = VerifierFrameBuilder {
                    constants: self.constants,
                    code: self.code,
                    states: &self.states,
                    frames: &mut self.frames,
                    this_class: &self.method.class.name,
                    max_stack: self.max_stack,
                    max_locals: self.max_locals,
                    boolean_arrays_distinct: self.settings.boolean_arrays_distinct,
                    method: self.description.clone(),
                };
                ingest_stack_map_table(&mut builder, table, initial.clone(), parameter_slots)?;
                self.stack_map_initialized = !table.0.is_empty();
            }
        }

        self.initialize_exception_handlers()?;
        if self.use_stack_maps {
            self.check_frames_after_unconditional_jumps()?;
        }

        let stack = OperandStack::with_values(initial.stack, self.max_stack)?;
        let locals = Locals::new(initial.locals, initial.subroutines);
        self.visit(0, stack, locals, self.constructor_called)?;
        self.run_to_fixpoint()?;

        // Stack map frames nothing jumps to still have to describe valid code
        if self.use_stack_maps {
            for bci in 0..self.code.end_bci() {
                if self.states[bci] != BciState::Unseen {
                    continue;
                }
                if let Some(frame) = &self.frames[bci] {
                    self.worklist.push(WorklistItem {
                        bci,
                        frame: frame.clone(),
                        constructor_called: true,
                    });
                }
            }
            self.run_to_fixpoint()?;
        }

        Ok(())
    }

    fn run_to_fixpoint(&mut self) -> Result<(), VerificationFailure> {
        loop {
            self.process_queue()?;
            self.verify_exception_handlers()?;
            if self.worklist.is_empty() {
                return Ok(());
            }
        }
    }

    /// Find instruction boundaries and, without a stack map table, jump targets
    fn prepass(&mut self) -> Result<(), VerificationFailure> {
        let end = self.code.end_bci();
        let mut bci = 0;
        while bci < end {
            let opcode = self.code.opcode(bci)?;
            format_guarantee(is_defined(opcode), || {
                format!("invalid bytecode: {} at {}", opcode, bci)
            })?;
            match opcode {
                TABLESWITCH => format_guarantee(BytecodeStream::aligned_bci(bci) + 12 < end, || {
                    String::from("Incomplete bytecode")
                })?,
                LOOKUPSWITCH => format_guarantee(BytecodeStream::aligned_bci(bci) + 8 < end, || {
                    String::from("Incomplete bytecode")
                })?,
                WIDE => format_guarantee(bci + 1 < end, || String::from("Incomplete bytecode"))?,
                _ => (),
            }
            self.states[bci] = BciState::Unseen;
            let next = self.code.next_bci(bci)?;
            format_guarantee(next <= end, || String::from("Incomplete bytecode"))?;
            bci = next;
        }

        if self.use_stack_maps {
            return Ok(());
        }

        let mut bci = 0;
        while bci < end {
            match self.code.opcode(bci)? {
                IFEQ..=GOTO | IFNULL | IFNONNULL | GOTO_W => {
                    self.mark_jump_target(self.code.read_branch_dest(bci)?)?;
                }
                JSR | JSR_W => {
                    self.mark_jump_target(self.code.read_branch_dest(bci)?)?;
                    self.mark_jump_target(self.code.next_bci(bci)? as i64)?;
                }
                TABLESWITCH => {
                    let switch = self.code.table_switch(bci)?;
                    format_guarantee(switch.low_key() <= switch.high_key(), || {
                        String::from("tableswitch low is greater than high")
                    })?;
                    for target in switch.targets(bci) {
                        self.mark_jump_target(target)?;
                    }
                }
                LOOKUPSWITCH => {
                    let switch = self.code.lookup_switch(bci)?;
                    format_guarantee(switch.keys_sorted(), || {
                        String::from("Bad lookupswitch instruction: keys not sorted")
                    })?;
                    for target in switch.targets(bci) {
                        self.mark_jump_target(target)?;
                    }
                }
                _ => (),
            }
            bci = self.code.next_bci(bci)?;
        }
        Ok(())
    }

    fn mark_jump_target(&mut self, target: i64) -> Result<(), VerificationFailure> {
        let target = self.validate_format_bci(target)?;
        self.states[target] = BciState::JumpTarget;
        Ok(())
    }

    /// Frame on entry to the method, along with the number of local slots parameters use
    fn initial_frame(&self) -> Result<(Frame, usize), VerificationFailure> {
        let mut locals = vec![Operand::Top; self.max_locals];
        let mut next = 0;
        let too_many = || String::from("Too many method arguments for the number of locals");

        if !self.method.is_static() {
            verify_guarantee(self.max_locals >= 1, too_many)?;
            let this_class = self.this_class_name();
            locals[0] = if self.method.is_constructor() && this_class != &BinaryName::OBJECT {
                Operand::UninitializedThis(this_class.clone())
            } else {
                self.this_operand.clone()
            };
            next = 1;
        }

        for parameter in &self.method.descriptor.parameters {
            let operand =
                Operand::from_field_type(parameter, self.settings.boolean_arrays_distinct)
                    .to_stack();
            let width = operand.width();
            verify_guarantee(next + width <= self.max_locals, too_many)?;
            locals[next] = operand;
            next += width;
        }

        let frame = Frame {
            stack: vec![],
            locals,
            subroutines: SubroutineModifications::default(),
        };
        Ok((frame, next))
    }

    /// Check the exception table and resolve the type each handler catches
    fn initialize_exception_handlers(&mut self) -> Result<(), VerificationFailure> {
        let end = self.code.end_bci();
        let mut catch_types = Vec::with_capacity(self.handlers.len());
        for handler in self.handlers {
            verify_guarantee(self.max_stack >= 1, || {
                String::from("Method with exception handlers has a max_stack of 0")
            })?;
            self.validate_format_bci(handler.handler_pc as i64)?;
            self.validate_format_bci(handler.start_pc as i64)?;
            let end_pc = handler.end_pc as usize;
            format_guarantee(end_pc > handler.start_pc as usize, || {
                String::from("Exception handler range is empty")
            })?;
            format_guarantee(end_pc <= end, || {
                String::from("Exception handler end is past the end of the code")
            })?;
            if end_pc < end {
                format_guarantee(self.states[end_pc] != BciState::Unreachable, || {
                    String::from("Exception handler end is in the middle of an instruction")
                })?;
            }

            let catch_type = if handler.catch_type.0 == 0 {
                Operand::THROWABLE
            } else {
                format_guarantee(
                    self.constants.tag_at(handler.catch_type)? == ConstantTag::Class,
                    || String::from("Exception handler catch type is not a class"),
                )?;
                match self.constants.class_name(handler.catch_type)? {
                    RefType::Object(name) => {
                        let class = self.resolver.resolve(&name)?;
                        let throwable = self.resolver.resolve(&BinaryName::THROWABLE)?;
                        verify_guarantee(class.id().is_assignable(&throwable.id()), || {
                            format!("Illegal exception handler catch type {}", name)
                        })?;
                        Operand::Reference(name)
                    }
                    _ => {
                        return Err(VerificationFailure::verify(
                            "Illegal exception handler catch type",
                        ))
                    }
                }
            };
            catch_types.push(catch_type);
        }
        self.catch_types = catch_types;
        Ok(())
    }

    /// Code following an unconditional jump can only be reached by jumping to it
    fn check_frames_after_unconditional_jumps(&self) -> Result<(), VerificationFailure> {
        let end = self.code.end_bci();
        let mut bci = 0;
        while bci < end {
            let next = self.code.next_bci(bci)?;
            let unconditional = matches!(
                self.code.current_bc(bci)?,
                GOTO | GOTO_W
                    | IRETURN..=RETURN
                    | ATHROW
                    | RET
                    | JSR
                    | JSR_W
                    | TABLESWITCH
                    | LOOKUPSWITCH
            );
            if unconditional && next < end {
                verify_guarantee(self.frames[next].is_some(), || {
                    format!("Expected a stack map frame at {} after an unconditional jump", next)
                })?;
            }
            bci = next;
        }
        Ok(())
    }

    fn check_bci(&self, target: i64, kind: FailureKind) -> Result<usize, VerificationFailure> {
        let fail = |message: &str| VerificationFailure {
            kind,
            message: message.to_owned(),
            allow_fallback: true,
        };
        if target < 0 {
            return Err(fail("negative branch target"));
        }
        let target = target as usize;
        if target >= self.code.end_bci() {
            return Err(fail("Control flow falls through code end"));
        }
        if self.states[target] == BciState::Unreachable {
            return Err(fail("Jump to the middle of an instruction"));
        }
        Ok(target)
    }

    /// Check a control flow target found while verifying
    pub(super) fn validate_bci(&self, target: i64) -> Result<usize, VerificationFailure> {
        self.check_bci(target, FailureKind::Verify)
    }

    /// Check an offset found while reading the method's structure
    pub(super) fn validate_format_bci(&self, target: i64) -> Result<usize, VerificationFailure> {
        self.check_bci(target, FailureKind::ClassFormat)
    }

    fn process_queue(&mut self) -> Result<(), VerificationFailure> {
        while let Some(item) = self.worklist.pop() {
            trace!("{}: verifying from {}", self.description, item.bci);
            let stack = OperandStack::with_values(item.frame.stack, self.max_stack)?;
            let locals = Locals::new(item.frame.locals, item.frame.subroutines);
            self.visit(item.bci, stack, locals, item.constructor_called)?;
        }
        Ok(())
    }

    /// Verify straight-line code starting at `bci`
    fn visit(
        &mut self,
        bci: usize,
        stack: OperandStack,
        locals: Locals,
        constructor_called: bool,
    ) -> Result<(), VerificationFailure> {
        let saved = self.constructor_called;
        self.constructor_called = constructor_called;
        let result = self.visit_from(bci, stack, locals);
        self.constructor_called = saved;
        result
    }

    fn visit_from(
        &mut self,
        mut bci: usize,
        mut stack: OperandStack,
        mut locals: Locals,
    ) -> Result<(), VerificationFailure> {
        loop {
            if self.frames[bci].is_some() || self.states[bci] == BciState::JumpTarget {
                let (frame, changed) = self.merge_frames(bci, &stack, &locals)?;
                if changed {
                    self.states[bci] = BciState::JumpTarget;
                    self.frames[bci] = Some(frame.clone());
                } else if self.states[bci] == BciState::Done
                    && !self.weakens_constructor_flag(bci)
                {
                    return Ok(());
                }
                stack = OperandStack::with_values(frame.stack, self.max_stack)?;
                locals = Locals::new(frame.locals, frame.subroutines);
            }

            self.check_exception_handlers(bci, &locals)?;
            self.states[bci] = BciState::Done;
            self.constructor_called_at[bci] &= self.constructor_called;
            let next = self.execute(bci, &mut stack, &mut locals)?;
            if next == bci {
                return Ok(());
            }
            bci = self.validate_bci(next as i64)?;
        }
    }

    /// Merge the current state into the frame stored at `bci`
    ///
    /// Returns the merged frame and whether it differs from what was stored.
    pub(super) fn merge_frames(
        &self,
        bci: usize,
        stack: &OperandStack,
        locals: &Locals,
    ) -> Result<(Frame, bool), VerificationFailure> {
        let stored = match &self.frames[bci] {
            Some(stored) => stored,
            None => {
                verify_guarantee(!self.use_stack_maps, || {
                    format!("No stack frame on jump target {} in {}", bci, self.description)
                })?;
                let frame = Frame {
                    stack: stack.values().to_vec(),
                    locals: locals.slots().to_vec(),
                    subroutines: locals.subroutines.clone(),
                };
                return Ok((frame, true));
            }
        };

        let mut merged = stored.clone();
        let mut changed = false;

        verify_guarantee(stack.values().len() == stored.stack.len(), || {
            format!(
                "Inconsistent stack height at {}: {} != {}",
                bci,
                stack.size(),
                stored.stack_size()
            )
        })?;
        for (index, incoming) in stack.values().iter().enumerate() {
            let existing = &stored.stack[index];
            if incoming.complies_with(existing, &self.resolver)? {
                continue;
            }
            verify_guarantee(!self.use_stack_maps, || {
                String::from("Wrong stack map frames in class file.")
            })?;
            match existing.merge_with(incoming, &self.resolver)? {
                Some(result) => {
                    changed |= &result != existing;
                    merged.stack[index] = result;
                }
                None => {
                    return Err(VerificationFailure::verify(format!(
                        "Cannot merge {} with {} on the stack at {}",
                        incoming, existing, bci
                    )))
                }
            }
        }

        for (index, incoming) in locals.slots().iter().enumerate() {
            let existing = &stored.locals[index];
            if incoming.complies_with(existing, &self.resolver)? {
                continue;
            }
            verify_guarantee(!self.use_stack_maps, || {
                format!("Wrong local map frames in class file: {}", self.description)
            })?;
            let result = existing
                .merge_with(incoming, &self.resolver)?
                .unwrap_or(Operand::Top);
            changed |= &result != existing;
            merged.locals[index] = result;
        }

        changed |= merged.subroutines.merge(&locals.subroutines);

        if changed {
            trace!("{}: frame at {} is now {:?}", self.description, bci, merged);
        }
        Ok((merged, changed))
    }

    /// Would the current path reach `bci` without having called the superclass constructor, when
    /// all paths verified there so far had called it?
    fn weakens_constructor_flag(&self, bci: usize) -> bool {
        self.constructor_called_at[bci] && !self.constructor_called
    }

    /// Merge the current state into a branch target, queueing it if there is anything new
    pub(super) fn branch(
        &mut self,
        target: i64,
        stack: &OperandStack,
        locals: &Locals,
    ) -> Result<(), VerificationFailure> {
        let target = self.validate_bci(target)?;
        let (frame, changed) = self.merge_frames(target, stack, locals)?;
        if changed
            || self.states[target] != BciState::Done
            || self.weakens_constructor_flag(target)
        {
            self.states[target] = BciState::JumpTarget;
            self.frames[target] = Some(frame.clone());
            self.worklist.push(WorklistItem {
                bci: target,
                frame,
                constructor_called: self.constructor_called,
            });
        }
        Ok(())
    }

    /// Merge the locals into the frames of every handler covering `bci`
    fn check_exception_handlers(
        &mut self,
        bci: usize,
        locals: &Locals,
    ) -> Result<(), VerificationFailure> {
        let handlers = self.handlers;
        for (index, handler) in handlers.iter().enumerate() {
            if !handler.covers(bci) {
                continue;
            }
            let handler_pc = handler.handler_pc as usize;
            let stack =
                OperandStack::with_values(vec![self.catch_types[index].clone()], self.max_stack)?;
            let (frame, changed) = self.merge_frames(handler_pc, &stack, locals)?;
            if changed {
                self.frames[handler_pc] = Some(frame);
                self.states[handler_pc] = BciState::JumpTarget;
            }

            let status = &mut self.handler_status[index];
            if status.contains(HandlerStatus::UNENCOUNTERED) || changed {
                status.remove(HandlerStatus::UNENCOUNTERED | HandlerStatus::VERIFIED);
                status.insert(HandlerStatus::NONVERIFIED);
            }
            status.insert(if self.constructor_called {
                HandlerStatus::CALLED_CONSTRUCTOR
            } else {
                HandlerStatus::NO_CONSTRUCTOR_CALLED
            });
        }
        Ok(())
    }

    /// Verify handlers until none of their frames change anymore
    fn verify_exception_handlers(&mut self) -> Result<(), VerificationFailure> {
        loop {
            let mut updated = false;
            for index in 0..self.handlers.len() {
                let status = self.handler_status[index];
                if status.contains(HandlerStatus::NONVERIFIED) {
                    updated = true;
                    self.handler_status[index].remove(HandlerStatus::NONVERIFIED);
                    self.handler_status[index].insert(HandlerStatus::VERIFIED);
                    self.verify_handler(index)?;
                }
            }
            if !updated {
                return Ok(());
            }
        }
    }

    fn verify_handler(&mut self, index: usize) -> Result<(), VerificationFailure> {
        let handler_pc = self.handlers[index].handler_pc as usize;
        let frame = match &self.frames[handler_pc] {
            Some(frame) => frame.clone(),
            None => Frame {
                stack: vec![self.catch_types[index].clone()],
                locals: vec![Operand::Top; self.max_locals],
                subroutines: SubroutineModifications::default(),
            },
        };
        let status = self.handler_status[index];
        let constructor_called = status.contains(HandlerStatus::CALLED_CONSTRUCTOR)
            && !status.contains(HandlerStatus::NO_CONSTRUCTOR_CALLED);

        trace!("{}: verifying handler at {}", self.description, handler_pc);
        let stack = OperandStack::with_values(frame.stack, self.max_stack)?;
        let locals = Locals::new(frame.locals, frame.subroutines);
        self.visit(handler_pc, stack, locals, constructor_called)
    }

    /// Is the method's class file at least this version?
    pub(super) fn version_at_least(&self, version: Version) -> bool {
        self.method.version >= version
    }
}
