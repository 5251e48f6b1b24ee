use super::{
    format_guarantee, verify_guarantee, BciState, Frame, Operand, SubroutineModifications,
    VerificationFailure, VerificationType,
};
use crate::jvm::bytecode::{BytecodeStream, NEW};
use crate::jvm::class_file::{ConstantIndex, ConstantsPool, StackMapFrame, StackMapTable, StackMapType};
use crate::jvm::{BinaryName, RefType};
use crate::util::Width;
use log::debug;

/// Frame produced by one stack map entry, along with how many local slots are now declared
///
/// The declared extent is what the next `chop` or `append` entry is relative to. It counts slots,
/// so a `long` local counts twice.
#[derive(Debug, Clone)]
pub struct FrameAndLocalEffect<F> {
    pub frame: F,
    pub local_effect: usize,
}

/// Materializes stack map entries into frames
///
/// The table only stores differences between consecutive frames, so [`ingest_stack_map_table`]
/// walks the entries in order and asks the builder to apply each one to the previous frame.
pub trait FrameBuilder {
    type Frame: Clone;

    /// Turn a verification type from the table into an operand
    fn to_operand(&self, vtype: &StackMapType) -> Result<Operand, VerificationFailure>;

    /// Previous locals, with an entirely new stack
    fn same_locals_with_stack(
        &self,
        previous: &Self::Frame,
        stack: Vec<Operand>,
    ) -> Result<Self::Frame, VerificationFailure>;

    /// Previous locals minus the last `chopped` declared ones, with an empty stack
    fn chop(
        &self,
        previous: &Self::Frame,
        chopped: usize,
        last_local: usize,
    ) -> Result<FrameAndLocalEffect<Self::Frame>, VerificationFailure>;

    /// Previous locals plus some new ones, with an empty stack
    fn append(
        &self,
        previous: &Self::Frame,
        locals: Vec<Operand>,
        last_local: usize,
    ) -> Result<FrameAndLocalEffect<Self::Frame>, VerificationFailure>;

    /// Completely specified frame
    fn full(
        &self,
        locals: Vec<Operand>,
        stack: Vec<Operand>,
    ) -> Result<FrameAndLocalEffect<Self::Frame>, VerificationFailure>;

    fn register_frame(&mut self, bci: usize, frame: &Self::Frame) -> Result<(), VerificationFailure>;

    /// What is being verified, for messages
    fn describe(&self) -> String;
}

/// Apply every entry of a stack map table, registering the frame each one describes
///
/// `initial` is the frame implied by the method signature and `initial_last_local` the number of
/// slots its parameters use.
pub fn ingest_stack_map_table<B: FrameBuilder>(
    builder: &mut B,
    table: &StackMapTable,
    initial: B::Frame,
    initial_last_local: usize,
) -> Result<(), VerificationFailure> {
    let mut previous = initial;
    let mut last_local = initial_last_local;
    let mut previous_bci: Option<usize> = None;

    for entry in &table.0 {
        let offset_delta = entry.offset_delta() as usize;
        let bci = match previous_bci {
            None => offset_delta,
            Some(previous_bci) => previous_bci + offset_delta + 1,
        };

        let frame = match entry {
            StackMapFrame::SameLocalsNoStack { .. } => {
                builder.same_locals_with_stack(&previous, vec![])?
            }
            StackMapFrame::SameLocalsOneStack { stack, .. } => {
                let stack = vec![builder.to_operand(stack)?];
                builder.same_locals_with_stack(&previous, stack)?
            }
            StackMapFrame::ChopLocalsNoStack { chopped_k, .. } => {
                let effect = builder.chop(&previous, *chopped_k as usize, last_local)?;
                last_local = effect.local_effect;
                effect.frame
            }
            StackMapFrame::AppendLocalsNoStack { locals, .. } => {
                let locals = locals
                    .iter()
                    .map(|local| builder.to_operand(local))
                    .collect::<Result<Vec<_>, _>>()?;
                let effect = builder.append(&previous, locals, last_local)?;
                last_local = effect.local_effect;
                effect.frame
            }
            StackMapFrame::Full { locals, stack, .. } => {
                let locals = locals
                    .iter()
                    .map(|local| builder.to_operand(local))
                    .collect::<Result<Vec<_>, _>>()?;
                let stack = stack
                    .iter()
                    .map(|value| builder.to_operand(value))
                    .collect::<Result<Vec<_>, _>>()?;
                let effect = builder.full(locals, stack)?;
                last_local = effect.local_effect;
                effect.frame
            }
        };

        builder.register_frame(bci, &frame)?;
        previous = frame;
        previous_bci = Some(bci);
    }

    Ok(())
}

/// Builds the verifier's own frames out of a stack map table
pub struct VerifierFrameBuilder<'a> {
    pub constants: &'a ConstantsPool,
    pub code: BytecodeStream<'a>,
    pub states: &'a [BciState],
    pub frames: &'a mut [Option<Frame>],
    pub this_class: &'a BinaryName,
    pub max_stack: usize,
    pub max_locals: usize,
    pub boolean_arrays_distinct: bool,
    pub method: String,
}

impl<'a> VerifierFrameBuilder<'a> {
    /// Write locals starting at slot `start`, returning the slot after the last one written
    fn write_locals(
        &self,
        slots: &mut [Operand],
        start: usize,
        locals: Vec<Operand>,
    ) -> Result<usize, VerificationFailure> {
        let mut next = start;
        for local in locals {
            let width = local.width();
            format_guarantee(next + width <= self.max_locals, || {
                format!(
                    "Stack map frame has more locals than max_locals in {}",
                    self.describe()
                )
            })?;
            slots[next] = local;
            if width == 2 {
                slots[next + 1] = Operand::Top;
            }
            next += width;
        }
        Ok(next)
    }

    fn check_stack_size(&self, stack: &[Operand]) -> Result<(), VerificationFailure> {
        let size: usize = stack.iter().map(Width::width).sum();
        format_guarantee(size <= self.max_stack, || {
            String::from("Full frame entry has a bigger stack than maxStack.")
        })
    }
}

impl<'a> FrameBuilder for VerifierFrameBuilder<'a> {
    type Frame = Frame;

    fn to_operand(&self, vtype: &StackMapType) -> Result<Operand, VerificationFailure> {
        let operand = match vtype {
            VerificationType::Top => Operand::Top,
            VerificationType::Integer => Operand::INT,
            VerificationType::Float => Operand::FLOAT,
            VerificationType::Long => Operand::LONG,
            VerificationType::Double => Operand::DOUBLE,
            VerificationType::Null => Operand::Null,
            VerificationType::UninitializedThis => {
                Operand::UninitializedThis(self.this_class.clone())
            }
            VerificationType::Object(class) => Operand::from_ref_type(
                &self.constants.class_name(*class)?,
                self.boolean_arrays_distinct,
            ),
            VerificationType::Uninitialized(new_bci) => {
                let new_bci = *new_bci as usize;
                format_guarantee(
                    new_bci < self.code.end_bci()
                        && self.states.get(new_bci) != Some(&BciState::Unreachable),
                    || format!("Uninitialized type at bad offset {} in stack map", new_bci),
                )?;
                format_guarantee(self.code.opcode(new_bci)? == NEW, || {
                    String::from("NewObject in stack map not referencing a NEW instruction!")
                })?;
                let class_index = ConstantIndex(self.code.read_cpi(new_bci)?);
                match self.constants.class_name(class_index)? {
                    RefType::Object(class) => Operand::UninitializedNew { class, new_bci },
                    _ => {
                        return Err(VerificationFailure::format(
                            "NewObject in stack map references an array type",
                        ))
                    }
                }
            }
        };
        Ok(operand)
    }

    fn same_locals_with_stack(
        &self,
        previous: &Frame,
        stack: Vec<Operand>,
    ) -> Result<Frame, VerificationFailure> {
        self.check_stack_size(&stack)?;
        Ok(Frame {
            stack,
            locals: previous.locals.clone(),
            subroutines: SubroutineModifications::default(),
        })
    }

    fn chop(
        &self,
        previous: &Frame,
        chopped: usize,
        last_local: usize,
    ) -> Result<FrameAndLocalEffect<Frame>, VerificationFailure> {
        let mut locals = previous.locals.clone();
        let mut last = last_local;
        for _ in 0..chopped {
            format_guarantee(last > 0, || {
                format!("Chopping too many locals from stack map in {}", self.describe())
            })?;
            last -= 1;

            // Second half of a two-slot local goes along with its first half
            if last > 0 && locals[last].is_top() && locals[last - 1].is_type2() {
                last -= 1;
            }
        }
        for local in &mut locals[last..] {
            *local = Operand::Top;
        }
        Ok(FrameAndLocalEffect {
            frame: Frame {
                stack: vec![],
                locals,
                subroutines: SubroutineModifications::default(),
            },
            local_effect: last,
        })
    }

    fn append(
        &self,
        previous: &Frame,
        locals: Vec<Operand>,
        last_local: usize,
    ) -> Result<FrameAndLocalEffect<Frame>, VerificationFailure> {
        let mut slots = previous.locals.clone();
        let last = self.write_locals(&mut slots, last_local, locals)?;
        Ok(FrameAndLocalEffect {
            frame: Frame {
                stack: vec![],
                locals: slots,
                subroutines: SubroutineModifications::default(),
            },
            local_effect: last,
        })
    }

    fn full(
        &self,
        locals: Vec<Operand>,
        stack: Vec<Operand>,
    ) -> Result<FrameAndLocalEffect<Frame>, VerificationFailure> {
        self.check_stack_size(&stack)?;
        let mut slots = vec![Operand::Top; self.max_locals];
        let last = self.write_locals(&mut slots, 0, locals)?;
        Ok(FrameAndLocalEffect {
            frame: Frame {
                stack,
                locals: slots,
                subroutines: SubroutineModifications::default(),
            },
            local_effect: last,
        })
    }

    fn register_frame(&mut self, bci: usize, frame: &Frame) -> Result<(), VerificationFailure> {
        verify_guarantee(bci < self.code.end_bci(), || {
            String::from("StackFrame offset falls outside of method")
        })?;
        verify_guarantee(self.states[bci] != BciState::Unreachable, || {
            format!("Stack map frame at {} is in the middle of an instruction", bci)
        })?;
        debug!("{}: stack map frame at {}", self.method, bci);
        self.frames[bci] = Some(frame.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        self.method.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::bytecode::{ICONST_0, NOP, POP, RETURN};
    use crate::jvm::class_file::Constant;
    use crate::jvm::Name;

    struct Fixture {
        constants: ConstantsPool,
        code: Vec<u8>,
        states: Vec<BciState>,
        this_class: BinaryName,
    }

    impl Fixture {
        fn new() -> Fixture {
            let mut constants = ConstantsPool::new();
            let utf8 = constants.push(Constant::Utf8(String::from("java/lang/String")));
            let class = constants.push(Constant::Class(utf8));
            assert_eq!(class, ConstantIndex(2));

            // new #2; nop; iconst_0; pop; nop; nop; return
            let code = vec![NEW, 0, 2, NOP, ICONST_0, POP, NOP, NOP, RETURN];
            let mut states = vec![BciState::Unseen; code.len()];
            states[1] = BciState::Unreachable;
            states[2] = BciState::Unreachable;
            Fixture {
                constants,
                code,
                states,
                this_class: BinaryName::from_string(String::from("pkg/Main")).unwrap(),
            }
        }

        fn ingest(
            &self,
            entries: Vec<StackMapFrame>,
            initial: Frame,
            initial_last_local: usize,
        ) -> Result<Vec<Option<Frame>>, VerificationFailure> {
            let mut frames = vec![None; self.code.len()];
            let mut builder = VerifierFrameBuilder {
                constants: &self.constants,
                code: BytecodeStream::new(&self.code),
                states: &self.states,
                frames: &mut frames,
                this_class: &self.this_class,
                max_stack: 2,
                max_locals: 4,
                boolean_arrays_distinct: true,
                method: String::from("pkg/Main.run()V"),
            };
            ingest_stack_map_table(
                &mut builder,
                &StackMapTable(entries),
                initial,
                initial_last_local,
            )?;
            Ok(frames)
        }
    }

    fn frame(locals: Vec<Operand>, stack: Vec<Operand>) -> Frame {
        Frame {
            stack,
            locals,
            subroutines: SubroutineModifications::default(),
        }
    }

    #[test]
    fn deltas_accumulate() {
        let fixture = Fixture::new();
        let initial = frame(vec![Operand::INT, Operand::Top, Operand::Top, Operand::Top], vec![]);
        let frames = fixture
            .ingest(
                vec![
                    StackMapFrame::AppendLocalsNoStack {
                        offset_delta: 3,
                        locals: vec![VerificationType::Long],
                    },
                    StackMapFrame::SameLocalsOneStack {
                        offset_delta: 0,
                        stack: VerificationType::Uninitialized(0),
                    },
                    StackMapFrame::ChopLocalsNoStack {
                        offset_delta: 1,
                        chopped_k: 1,
                    },
                    StackMapFrame::SameLocalsNoStack { offset_delta: 1 },
                ],
                initial,
                1,
            )
            .unwrap();

        let string = BinaryName::from_string(String::from("java/lang/String")).unwrap();
        assert_eq!(
            frames[3],
            Some(frame(
                vec![Operand::INT, Operand::LONG, Operand::Top, Operand::Top],
                vec![]
            )),
            "first frame is at its offset delta"
        );
        assert_eq!(
            frames[4],
            Some(frame(
                vec![Operand::INT, Operand::LONG, Operand::Top, Operand::Top],
                vec![Operand::UninitializedNew {
                    class: string,
                    new_bci: 0
                }]
            )),
            "later frames are one past the delta"
        );
        assert_eq!(
            frames[6],
            Some(frame(
                vec![Operand::INT, Operand::Top, Operand::Top, Operand::Top],
                vec![]
            )),
            "chopping a long removes both of its slots"
        );
        assert!(frames[8].is_some());
        assert!(frames[5].is_none());
    }

    #[test]
    fn malformed_tables() {
        let fixture = Fixture::new();
        let initial = frame(vec![Operand::Top; 4], vec![]);

        let failure = fixture
            .ingest(
                vec![StackMapFrame::ChopLocalsNoStack {
                    offset_delta: 3,
                    chopped_k: 1,
                }],
                initial.clone(),
                0,
            )
            .unwrap_err();
        assert!(failure.is_format(), "chopping past the first local");

        let failure = fixture
            .ingest(
                vec![StackMapFrame::Full {
                    offset_delta: 3,
                    locals: vec![],
                    stack: vec![VerificationType::Long, VerificationType::Integer],
                }],
                initial.clone(),
                0,
            )
            .unwrap_err();
        assert_eq!(
            failure,
            VerificationFailure::format("Full frame entry has a bigger stack than maxStack.")
        );

        let failure = fixture
            .ingest(
                vec![StackMapFrame::AppendLocalsNoStack {
                    offset_delta: 3,
                    locals: vec![VerificationType::Integer, VerificationType::Double],
                }],
                initial.clone(),
                2,
            )
            .unwrap_err();
        assert!(failure.is_format(), "appending past max_locals");

        let failure = fixture
            .ingest(
                vec![StackMapFrame::SameLocalsOneStack {
                    offset_delta: 3,
                    stack: VerificationType::Uninitialized(3),
                }],
                initial.clone(),
                0,
            )
            .unwrap_err();
        assert_eq!(
            failure.message,
            "NewObject in stack map not referencing a NEW instruction!"
        );

        let failure = fixture
            .ingest(vec![StackMapFrame::SameLocalsNoStack { offset_delta: 1 }], initial.clone(), 0)
            .unwrap_err();
        assert!(!failure.is_format(), "frame inside an instruction");

        let failure = fixture
            .ingest(vec![StackMapFrame::SameLocalsNoStack { offset_delta: 20 }], initial, 0)
            .unwrap_err();
        assert_eq!(failure.message, "StackFrame offset falls outside of method");
    }
}
