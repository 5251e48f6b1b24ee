#![allow(dead_code)]

use jverify::jvm::bytecode::*;
use jverify::jvm::class_file::{
    Code, Constant, ConstantIndex, ConstantsPool, ExceptionHandler, HandleKind, StackMapFrame,
    StackMapTable, Version,
};
use jverify::jvm::class_graph::{ClassData, ClassGraph, FieldData, MethodData};
use jverify::jvm::verifier::VerifiableMethod;
use jverify::jvm::{
    BinaryName, ClassAccessFlags, FieldAccessFlags, FieldType, MethodAccessFlags,
    MethodDescriptor, Name, ParseDescriptor, UnqualifiedName,
};
use std::collections::HashMap;

/// Tiny bytecode assembler with named labels
///
/// Jumps and switches can refer to labels placed later: offsets get patched in `finish`.
pub struct Assembler {
    code: Vec<u8>,
    labels: HashMap<&'static str, usize>,

    /// `(instruction offset, operand offset, label, 4-byte operand?)`
    fixups: Vec<(usize, usize, &'static str, bool)>,
}

impl Assembler {
    pub fn new() -> Assembler {
        Assembler {
            code: vec![],
            labels: HashMap::new(),
            fixups: vec![],
        }
    }

    /// Offset of the next instruction
    pub fn bci(&self) -> usize {
        self.code.len()
    }

    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.code.push(opcode);
        self
    }

    pub fn op_u1(&mut self, opcode: Opcode, operand: u8) -> &mut Self {
        self.code.push(opcode);
        self.code.push(operand);
        self
    }

    pub fn op_u2(&mut self, opcode: Opcode, operand: u16) -> &mut Self {
        self.code.push(opcode);
        self.code.extend_from_slice(&operand.to_be_bytes());
        self
    }

    pub fn op_cpi(&mut self, opcode: Opcode, index: ConstantIndex) -> &mut Self {
        self.op_u2(opcode, index.0)
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    pub fn label(&mut self, name: &'static str) -> &mut Self {
        let previous = self.labels.insert(name, self.code.len());
        assert!(previous.is_none(), "label {} placed twice", name);
        self
    }

    /// Branch with a 2-byte offset (or a 4-byte one for `goto_w` and `jsr_w`)
    pub fn jump(&mut self, opcode: Opcode, label: &'static str) -> &mut Self {
        let bci = self.bci();
        let wide = matches!(opcode, GOTO_W | JSR_W);
        self.code.push(opcode);
        self.fixups.push((bci, bci + 1, label, wide));
        let width = if wide { 4 } else { 2 };
        self.code.extend(std::iter::repeat(0).take(width));
        self
    }

    fn switch_header(&mut self, opcode: Opcode, default: &'static str) -> usize {
        let bci = self.bci();
        self.code.push(opcode);
        while self.code.len() % 4 != 0 {
            self.code.push(0);
        }
        self.fixups.push((bci, self.code.len(), default, true));
        self.code.extend_from_slice(&[0; 4]);
        bci
    }

    pub fn tableswitch(
        &mut self,
        default: &'static str,
        low: i32,
        targets: &[&'static str],
    ) -> &mut Self {
        let bci = self.switch_header(TABLESWITCH, default);
        let high = low + targets.len() as i32 - 1;
        self.code.extend_from_slice(&low.to_be_bytes());
        self.code.extend_from_slice(&high.to_be_bytes());
        for target in targets {
            self.fixups.push((bci, self.code.len(), target, true));
            self.code.extend_from_slice(&[0; 4]);
        }
        self
    }

    /// Keys are emitted in the given order, sorted or not
    pub fn lookupswitch(
        &mut self,
        default: &'static str,
        pairs: &[(i32, &'static str)],
    ) -> &mut Self {
        let bci = self.switch_header(LOOKUPSWITCH, default);
        self.code
            .extend_from_slice(&(pairs.len() as i32).to_be_bytes());
        for (key, target) in pairs {
            self.code.extend_from_slice(&key.to_be_bytes());
            self.fixups.push((bci, self.code.len(), target, true));
            self.code.extend_from_slice(&[0; 4]);
        }
        self
    }

    pub fn label_bci(&self, name: &str) -> usize {
        self.labels[name]
    }

    pub fn finish(&mut self) -> Vec<u8> {
        for (bci, at, label, wide) in &self.fixups {
            let target = self.labels[label] as i64;
            let offset = target - *bci as i64;
            if *wide {
                self.code[*at..*at + 4].copy_from_slice(&(offset as i32).to_be_bytes());
            } else {
                self.code[*at..*at + 2].copy_from_slice(&(offset as i16).to_be_bytes());
            }
        }
        self.code.clone()
    }
}

/// Constant pool builder
pub struct Pool {
    pub constants: ConstantsPool,
}

impl Pool {
    pub fn new() -> Pool {
        Pool {
            constants: ConstantsPool::new(),
        }
    }

    pub fn utf8(&mut self, value: &str) -> ConstantIndex {
        self.constants.push(Constant::Utf8(value.to_owned()))
    }

    pub fn class(&mut self, name: &str) -> ConstantIndex {
        let name = self.utf8(name);
        self.constants.push(Constant::Class(name))
    }

    pub fn string(&mut self, value: &str) -> ConstantIndex {
        let value = self.utf8(value);
        self.constants.push(Constant::String(value))
    }

    pub fn integer(&mut self, value: i32) -> ConstantIndex {
        self.constants.push(Constant::Integer(value))
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> ConstantIndex {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.constants
            .push(Constant::NameAndType { name, descriptor })
    }

    pub fn field(&mut self, class: &str, name: &str, descriptor: &str) -> ConstantIndex {
        let class = self.class(class);
        let name_and_type = self.name_and_type(name, descriptor);
        self.constants.push(Constant::FieldRef {
            class,
            name_and_type,
        })
    }

    pub fn method(&mut self, class: &str, name: &str, descriptor: &str) -> ConstantIndex {
        self.method_ref(class, name, descriptor, false)
    }

    pub fn interface_method(&mut self, class: &str, name: &str, descriptor: &str) -> ConstantIndex {
        self.method_ref(class, name, descriptor, true)
    }

    fn method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> ConstantIndex {
        let class = self.class(class);
        let name_and_type = self.name_and_type(name, descriptor);
        self.constants.push(Constant::MethodRef {
            class,
            name_and_type,
            is_interface,
        })
    }

    /// `REF_invokeStatic` handle to a method of a class
    pub fn static_method_handle(&mut self, class: &str, name: &str, descriptor: &str) -> ConstantIndex {
        let member = self.method(class, name, descriptor);
        self.constants.push(Constant::MethodHandle {
            handle_kind: HandleKind::InvokeStatic,
            member,
        })
    }

    pub fn method_type(&mut self, descriptor: &str) -> ConstantIndex {
        let descriptor = self.utf8(descriptor);
        self.constants.push(Constant::MethodType { descriptor })
    }

    /// Dynamically-computed constant (bootstrap method 0)
    pub fn dynamic(&mut self, name: &str, descriptor: &str) -> ConstantIndex {
        let name_and_type = self.name_and_type(name, descriptor);
        self.constants.push(Constant::Dynamic {
            bootstrap_method: 0,
            name_and_type,
        })
    }

    /// Dynamically-computed call site (bootstrap method 0)
    pub fn invoke_dynamic(&mut self, name: &str, descriptor: &str) -> ConstantIndex {
        let name_and_type = self.name_and_type(name, descriptor);
        self.constants.push(Constant::InvokeDynamic {
            bootstrap_method: 0,
            name_and_type,
        })
    }
}

pub fn binary_name(name: &str) -> BinaryName {
    BinaryName::from_string(name.to_owned()).expect("valid binary name")
}

/// Add a class extending `superclass` to the graph
pub fn add_class<'g>(
    graph: &ClassGraph<'g>,
    name: &str,
    superclass: &'g ClassData<'g>,
) -> &'g ClassData<'g> {
    graph.add_class(ClassData::new(
        binary_name(name),
        superclass,
        ClassAccessFlags::PUBLIC,
    ))
}

pub fn add_field<'g>(
    graph: &ClassGraph<'g>,
    class: &'g ClassData<'g>,
    name: &str,
    descriptor: &str,
    access_flags: FieldAccessFlags,
) {
    graph.add_field(FieldData {
        class,
        name: UnqualifiedName::from_string(name.to_owned()).expect("valid field name"),
        descriptor: FieldType::parse(descriptor).expect("valid field descriptor"),
        access_flags,
    });
}

/// Add an interface extending nothing but `java/lang/Object` to the graph
pub fn add_interface<'g>(
    graph: &ClassGraph<'g>,
    name: &str,
    object: &'g ClassData<'g>,
) -> &'g ClassData<'g> {
    graph.add_class(ClassData::new(
        binary_name(name),
        object,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
    ))
}

pub fn add_method<'g>(
    graph: &ClassGraph<'g>,
    class: &'g ClassData<'g>,
    name: &str,
    descriptor: &str,
    access_flags: MethodAccessFlags,
) {
    graph.add_method(MethodData {
        class,
        name: UnqualifiedName::from_string(name.to_owned()).expect("valid method name"),
        descriptor: MethodDescriptor::parse(descriptor).expect("valid method descriptor"),
        access_flags,
    });
}

/// Everything about a method that isn't its class or constant pool
pub struct MethodSpec {
    pub name: &'static str,
    pub descriptor: &'static str,
    pub access_flags: MethodAccessFlags,
    pub version: Version,
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub stack_map: Option<Vec<StackMapFrame>>,
}

impl MethodSpec {
    /// `public static` method in a version 49 class file (so no stack maps)
    pub fn new(descriptor: &'static str, max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        MethodSpec {
            name: "test",
            descriptor,
            access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            version: Version::JAVA5,
            max_stack,
            max_locals,
            code,
            exception_table: vec![],
            stack_map: None,
        }
    }

    pub fn constructor(descriptor: &'static str, max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        MethodSpec {
            name: "<init>",
            access_flags: MethodAccessFlags::PUBLIC,
            ..MethodSpec::new(descriptor, max_stack, max_locals, code)
        }
    }

    /// Drop `static`, so that local 0 holds `this`
    pub fn instance(mut self) -> Self {
        self.access_flags.remove(MethodAccessFlags::STATIC);
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn stack_map(mut self, frames: Vec<StackMapFrame>) -> Self {
        self.stack_map = Some(frames);
        self
    }

    pub fn handler(mut self, start_pc: u16, end_pc: u16, handler_pc: u16, catch_type: u16) -> Self {
        self.exception_table.push(ExceptionHandler {
            start_pc,
            end_pc,
            handler_pc,
            catch_type: ConstantIndex(catch_type),
        });
        self
    }

    pub fn build<'a, 'g>(
        self,
        class: &'g ClassData<'g>,
        pool: &'a ConstantsPool,
    ) -> VerifiableMethod<'a, 'g> {
        VerifiableMethod {
            class,
            constants: pool,
            version: self.version,
            name: UnqualifiedName::from_string(self.name.to_owned()).expect("valid method name"),
            descriptor: MethodDescriptor::parse(self.descriptor).expect("valid method descriptor"),
            access_flags: self.access_flags,
            code: Some(Code {
                max_stack: self.max_stack,
                max_locals: self.max_locals,
                code_array: self.code,
                exception_table: self.exception_table,
                stack_map_table: self.stack_map.map(StackMapTable),
                attributes: vec![],
            }),
        }
    }
}
