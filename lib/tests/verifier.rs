mod common;

use common::*;
use jverify::jvm::bytecode::*;
use jverify::jvm::class_file::{ConstantIndex, StackMapFrame, StackMapType, Version};
use jverify::jvm::class_graph::{ClassData, ClassGraph, ClassGraphArenas};
use jverify::jvm::verifier::{
    verify, verify_with_settings, FailureKind, Settings, VerifiableMethod, VerificationFailure,
};
use jverify::jvm::{
    ClassAccessFlags, FieldAccessFlags, MethodAccessFlags, MethodDescriptor, Name,
    ParseDescriptor, UnqualifiedName,
};

/// Verify a method declared in a fresh `pkg/Test` class
fn check(pool: &Pool, method: MethodSpec) -> Result<(), VerificationFailure> {
    check_with(pool, method, &Settings::default())
}

fn check_with(
    pool: &Pool,
    method: MethodSpec,
    settings: &Settings,
) -> Result<(), VerificationFailure> {
    let arenas = ClassGraphArenas::new();
    let graph = ClassGraph::new(&arenas);
    let java = graph.insert_java_library_types();
    let class = add_class(&graph, "pkg/Test", java.lang.object);
    verify_with_settings(&graph, &method.build(class, &pool.constants), settings)
}

fn expect_failure(result: Result<(), VerificationFailure>, kind: FailureKind) -> String {
    match result {
        Ok(()) => panic!("expected a {:?} failure, but the method verified", kind),
        Err(failure) => {
            assert_eq!(failure.kind, kind, "unexpected failure: {}", failure);
            failure.message
        }
    }
}

#[test]
fn stack_underflow() {
    let pool = Pool::new();
    let code = Assembler::new().op(ICONST_0).op(POP).op(POP).op(RETURN).finish();
    let message = expect_failure(
        check(&pool, MethodSpec::new("()V", 1, 0, code)),
        FailureKind::Verify,
    );
    assert_eq!(message, "Stack underflow");
}

#[test]
fn jump_into_middle_of_instruction() {
    let pool = Pool::new();
    let mut asm = Assembler::new();
    asm.raw(&[GOTO, 0, 4]) // lands on the second byte of `sipush`
        .op_u2(SIPUSH, 1)
        .op(POP)
        .op(RETURN);
    expect_failure(
        check(&pool, MethodSpec::new("()V", 1, 0, asm.finish())),
        FailureKind::ClassFormat,
    );
}

#[test]
fn truncated_instruction() {
    let pool = Pool::new();
    let code = vec![ICONST_0, SIPUSH, 0];
    expect_failure(
        check(&pool, MethodSpec::new("()V", 2, 0, code)),
        FailureKind::ClassFormat,
    );
}

#[test]
fn empty_code() {
    let pool = Pool::new();
    expect_failure(
        check(&pool, MethodSpec::new("()V", 0, 0, vec![])),
        FailureKind::ClassFormat,
    );
}

#[test]
fn falling_off_the_end() {
    let pool = Pool::new();
    let code = Assembler::new().op(ICONST_0).op(POP).finish();
    expect_failure(
        check(&pool, MethodSpec::new("()V", 1, 0, code)),
        FailureKind::Verify,
    );
}

#[test]
fn wrong_return_kind() {
    let pool = Pool::new();
    let code = Assembler::new().op(FCONST_0).op(IRETURN).finish();
    expect_failure(
        check(&pool, MethodSpec::new("()I", 1, 0, code)),
        FailureKind::Verify,
    );

    let code = Assembler::new().op(ICONST_0).op(IRETURN).finish();
    assert_eq!(check(&pool, MethodSpec::new("()I", 1, 0, code)), Ok(()));
}

#[test]
fn max_stack_is_enforced() {
    let pool = Pool::new();
    let code = Assembler::new()
        .op(ICONST_0)
        .op(ICONST_1)
        .op(POP2)
        .op(RETURN)
        .finish();
    expect_failure(
        check(&pool, MethodSpec::new("()V", 1, 0, code)),
        FailureKind::Verify,
    );
}

#[test]
fn too_many_arguments_for_locals() {
    let pool = Pool::new();
    let code = Assembler::new().op(RETURN).finish();
    expect_failure(
        check(&pool, MethodSpec::new("(JI)V", 0, 2, code)),
        FailureKind::Verify,
    );
}

#[test]
fn constructor_must_call_super() {
    let mut pool = Pool::new();
    let object_init = pool.method("java/lang/Object", "<init>", "()V");

    let code = Assembler::new().op(RETURN).finish();
    let message = expect_failure(
        check(&pool, MethodSpec::constructor("()V", 1, 1, code)),
        FailureKind::Verify,
    );
    assert!(message.starts_with("Constructor must call super()"), "{}", message);

    let code = Assembler::new()
        .op(ALOAD_0)
        .op_cpi(INVOKESPECIAL, object_init)
        .op(RETURN)
        .finish();
    assert_eq!(check(&pool, MethodSpec::constructor("()V", 1, 1, code)), Ok(()));
}

#[test]
fn constructor_must_call_super_on_every_path() {
    let mut pool = Pool::new();
    let object_init = pool.method("java/lang/Object", "<init>", "()V");

    let mut asm = Assembler::new();
    asm.op(ILOAD_1)
        .jump(IFEQ, "done")
        .op(ALOAD_0)
        .op_cpi(INVOKESPECIAL, object_init)
        .label("done")
        .op(RETURN);
    expect_failure(
        check(&pool, MethodSpec::constructor("(I)V", 1, 2, asm.finish())),
        FailureKind::Verify,
    );

    let mut asm = Assembler::new();
    asm.op(ILOAD_1)
        .jump(IFEQ, "other")
        .op(ALOAD_0)
        .op_cpi(INVOKESPECIAL, object_init)
        .op(RETURN)
        .label("other")
        .op(ALOAD_0)
        .op_cpi(INVOKESPECIAL, object_init)
        .op(RETURN);
    assert_eq!(
        check(&pool, MethodSpec::constructor("(I)V", 1, 2, asm.finish())),
        Ok(())
    );
}

#[test]
fn constructor_cannot_skip_to_unrelated_class() {
    let mut pool = Pool::new();
    let string_init = pool.method("java/lang/String", "<init>", "()V");
    let code = Assembler::new()
        .op(ALOAD_0)
        .op_cpi(INVOKESPECIAL, string_init)
        .op(RETURN)
        .finish();
    expect_failure(
        check(&pool, MethodSpec::constructor("()V", 1, 1, code)),
        FailureKind::Verify,
    );
}

#[test]
fn unsorted_lookupswitch() {
    let pool = Pool::new();
    let mut asm = Assembler::new();
    asm.op(ICONST_0)
        .lookupswitch("end", &[(2, "end"), (1, "end")])
        .label("end")
        .op(RETURN);
    let message = expect_failure(
        check(&pool, MethodSpec::new("()V", 1, 0, asm.finish())),
        FailureKind::ClassFormat,
    );
    assert!(message.contains("not sorted"), "{}", message);
}

#[test]
fn switches() {
    let pool = Pool::new();
    let mut asm = Assembler::new();
    asm.op(ILOAD_0)
        .lookupswitch("end", &[(-1, "a"), (1, "b")])
        .label("a")
        .op(ILOAD_0)
        .tableswitch("end", 3, &["b", "end"])
        .label("b")
        .op(ICONST_1)
        .op(IRETURN)
        .label("end")
        .op(ICONST_0)
        .op(IRETURN);
    assert_eq!(check(&pool, MethodSpec::new("(I)I", 1, 1, asm.finish())), Ok(()));
}

#[test]
fn nested_subroutines_keep_call_site_locals() {
    let pool = Pool::new();
    let mut asm = Assembler::new();
    asm.jump(JSR, "outer")
        .op(ILOAD_1)
        .op(ILOAD_2)
        .op(IADD)
        .op(IRETURN)
        // outer subroutine: owns slot 1, calls the inner one
        .label("outer")
        .op(ASTORE_3)
        .op(ICONST_1)
        .op(ISTORE_1)
        .jump(JSR, "inner")
        .op(ILOAD_1)
        .op(ILOAD_2)
        .op(IADD)
        .op(POP)
        .op_u1(RET, 3)
        // inner subroutine: only writes slot 2
        .label("inner")
        .op_u1(ASTORE, 4)
        .op(ICONST_2)
        .op(ISTORE_2)
        .op_u1(RET, 4);
    assert_eq!(check(&pool, MethodSpec::new("()I", 2, 5, asm.finish())), Ok(()));
}

#[test]
fn subroutine_returns_to_each_call_site_separately() {
    let pool = Pool::new();
    let subroutine_callers = |second_load: Opcode| {
        let mut asm = Assembler::new();
        asm.op(ICONST_0)
            .op(ISTORE_1)
            .jump(JSR, "sub")
            .op(ILOAD_1)
            .op(POP)
            .op(FCONST_0)
            .op(FSTORE_1)
            .jump(JSR, "sub")
            .op(second_load)
            .op(POP)
            .op(RETURN)
            .label("sub")
            .op(ASTORE_3)
            .op(ICONST_1)
            .op(ISTORE_2)
            .op_u1(RET, 3);
        asm.finish()
    };

    // Slot 1 holds an `int` at the first call and a `float` at the second
    assert_eq!(
        check(&pool, MethodSpec::new("()V", 1, 4, subroutine_callers(FLOAD_1))),
        Ok(())
    );
    expect_failure(
        check(&pool, MethodSpec::new("()V", 1, 4, subroutine_callers(ILOAD_1))),
        FailureKind::Verify,
    );
}

#[test]
fn subroutines_rejected_in_java7_classes() {
    let pool = Pool::new();
    let mut asm = Assembler::new();
    asm.jump(JSR, "sub")
        .op(RETURN)
        .label("sub")
        .op(ASTORE_0)
        .op_u1(RET, 0);
    let method = MethodSpec::new("()V", 1, 1, asm.finish()).version(Version::JAVA7);
    expect_failure(check(&pool, method), FailureKind::Verify);
}

#[test]
fn ret_without_return_address() {
    let pool = Pool::new();
    let code = Assembler::new().op(ICONST_0).op(ISTORE_0).op_u1(RET, 0).finish();
    expect_failure(
        check(&pool, MethodSpec::new("()V", 1, 1, code)),
        FailureKind::Verify,
    );
}

/// `(int, Left, Right)` returning one of the two references
fn pick_one(left: &'static str, right: &'static str, returned: &'static str) -> MethodSpec {
    let descriptor: &'static str =
        Box::leak(format!("(IL{};L{};)L{};", left, right, returned).into_boxed_str());
    let mut asm = Assembler::new();
    asm.op(ILOAD_0)
        .jump(IFEQ, "right")
        .op(ALOAD_1)
        .jump(GOTO, "join")
        .label("right")
        .op(ALOAD_2)
        .label("join")
        .op(ARETURN);
    MethodSpec::new(descriptor, 1, 3, asm.finish())
}

#[test]
fn disjoint_references_join_at_common_ancestor() {
    let pool = Pool::new();
    let arenas = ClassGraphArenas::new();
    let graph = ClassGraph::new(&arenas);
    let java = graph.insert_java_library_types();
    let test = add_class(&graph, "pkg/Test", java.lang.object);
    let animal = add_class(&graph, "pkg/Animal", java.lang.object);
    add_class(&graph, "pkg/Cat", animal);
    add_class(&graph, "pkg/Dog", animal);
    add_class(&graph, "pkg/Rock", java.lang.object);

    let run = |method: MethodSpec| verify(&graph, &method.build(test, &pool.constants));

    assert_eq!(run(pick_one("pkg/Cat", "pkg/Dog", "pkg/Animal")), Ok(()));
    expect_failure(
        run(pick_one("pkg/Cat", "pkg/Dog", "pkg/Cat")),
        FailureKind::Verify,
    );

    // The only thing a cat and a rock have in common is being objects
    assert_eq!(run(pick_one("pkg/Cat", "pkg/Rock", "java/lang/Object")), Ok(()));
    expect_failure(
        run(pick_one("pkg/Cat", "pkg/Rock", "pkg/Animal")),
        FailureKind::Verify,
    );
}

#[test]
fn unresolvable_class_at_join() {
    let pool = Pool::new();
    expect_failure(
        check(&pool, pick_one("pkg/Missing", "pkg/Gone", "java/lang/Object")),
        FailureKind::Verify,
    );
}

#[test]
fn verification_is_deterministic() {
    let mut pool = Pool::new();
    let object_init = pool.method("java/lang/Object", "<init>", "()V");
    let mut asm = Assembler::new();
    asm.op(ILOAD_1)
        .jump(IFNE, "skip")
        .op(ALOAD_0)
        .op_cpi(INVOKESPECIAL, object_init)
        .label("skip")
        .op(RETURN);
    let code = asm.finish();

    let first = check(&pool, MethodSpec::constructor("(I)V", 1, 2, code.clone()));
    let second = check(&pool, MethodSpec::constructor("(I)V", 1, 2, code));
    assert!(first.is_err());
    assert_eq!(first, second);
}

/// Count up to 10 in local 0
fn counting_loop() -> Vec<u8> {
    let mut asm = Assembler::new();
    asm.op(ICONST_0)
        .op(ISTORE_0)
        .label("loop")
        .op(ILOAD_0)
        .op_u1(BIPUSH, 10)
        .jump(IF_ICMPGE, "end")
        .raw(&[IINC, 0, 1])
        .jump(GOTO, "loop")
        .label("end")
        .op(RETURN);
    assert_eq!(asm.label_bci("loop"), 2);
    assert_eq!(asm.label_bci("end"), 14);
    asm.finish()
}

#[test]
fn stack_map_frames() {
    let pool = Pool::new();
    let frames = vec![
        StackMapFrame::AppendLocalsNoStack {
            offset_delta: 2,
            locals: vec![StackMapType::Integer],
        },
        StackMapFrame::SameLocalsNoStack { offset_delta: 11 },
    ];
    let method = MethodSpec::new("()V", 2, 1, counting_loop())
        .version(Version::JAVA8)
        .stack_map(frames);
    assert_eq!(check(&pool, method), Ok(()));
}

#[test]
fn wrong_stack_map_frame() {
    let pool = Pool::new();
    let frames = vec![
        StackMapFrame::AppendLocalsNoStack {
            offset_delta: 2,
            locals: vec![StackMapType::Float],
        },
        StackMapFrame::SameLocalsNoStack { offset_delta: 11 },
    ];
    let method = MethodSpec::new("()V", 2, 1, counting_loop())
        .version(Version::JAVA8)
        .stack_map(frames);
    expect_failure(check(&pool, method), FailureKind::Verify);
}

#[test]
fn missing_stack_map_frame() {
    let pool = Pool::new();
    let frames = || {
        vec![StackMapFrame::AppendLocalsNoStack {
            offset_delta: 2,
            locals: vec![StackMapType::Integer],
        }]
    };

    let method = MethodSpec::new("()V", 2, 1, counting_loop())
        .version(Version::JAVA8)
        .stack_map(frames());
    expect_failure(check(&pool, method), FailureKind::Verify);

    // A frame was ingested, so version 50 doesn't get a second chance either
    let method = MethodSpec::new("()V", 2, 1, counting_loop())
        .version(Version::JAVA6)
        .stack_map(frames());
    expect_failure(check(&pool, method), FailureKind::Verify);
}

#[test]
fn version_50_without_frames_falls_back_to_inference() {
    let pool = Pool::new();
    let method = MethodSpec::new("()V", 2, 1, counting_loop()).version(Version::JAVA6);
    assert_eq!(check(&pool, method), Ok(()));

    let method = MethodSpec::new("()V", 2, 1, counting_loop())
        .version(Version::JAVA6)
        .stack_map(vec![]);
    assert_eq!(check(&pool, method), Ok(()));

    let no_fallback = Settings {
        allow_fallback: false,
        ..Settings::default()
    };
    let method = MethodSpec::new("()V", 2, 1, counting_loop()).version(Version::JAVA6);
    expect_failure(check_with(&pool, method, &no_fallback), FailureKind::Verify);

    // Only version 50 is eligible
    let method = MethodSpec::new("()V", 2, 1, counting_loop()).version(Version::JAVA7);
    expect_failure(check(&pool, method), FailureKind::Verify);
}

#[test]
fn ingested_frames_are_final_at_version_50() {
    let pool = Pool::new();
    let frames = || {
        vec![
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 2,
                locals: vec![StackMapType::Float],
            },
            StackMapFrame::SameLocalsNoStack { offset_delta: 11 },
        ]
    };
    for version in [Version::JAVA6, Version::JAVA8] {
        let method = MethodSpec::new("()V", 2, 1, counting_loop())
            .version(version)
            .stack_map(frames());
        let message = expect_failure(check(&pool, method), FailureKind::Verify);
        assert!(message.contains("Wrong local map frames"), "{}", message);
    }
}

#[test]
fn stack_map_frame_inside_instruction() {
    let pool = Pool::new();
    let frames = vec![
        StackMapFrame::AppendLocalsNoStack {
            offset_delta: 4,
            locals: vec![StackMapType::Integer],
        },
        StackMapFrame::SameLocalsNoStack { offset_delta: 9 },
    ];
    let method = MethodSpec::new("()V", 2, 1, counting_loop())
        .version(Version::JAVA8)
        .stack_map(frames);
    let message = expect_failure(check(&pool, method), FailureKind::Verify);
    assert!(message.contains("middle of an instruction"), "{}", message);
}

#[test]
fn exception_handlers() {
    let mut pool = Pool::new();
    let code = Assembler::new()
        .op(ICONST_0)
        .op(POP)
        .op(RETURN)
        .op(POP)
        .op(RETURN)
        .finish();
    let method = MethodSpec::new("()V", 1, 0, code.clone()).handler(0, 2, 3, 0);
    assert_eq!(check(&pool, method), Ok(()));

    let exception = pool.class("java/lang/RuntimeException");
    let method = MethodSpec::new("()V", 1, 0, code.clone()).handler(0, 2, 3, exception.0);
    assert_eq!(check(&pool, method), Ok(()));

    let string = pool.class("java/lang/String");
    let method = MethodSpec::new("()V", 1, 0, code.clone()).handler(0, 2, 3, string.0);
    let message = expect_failure(check(&pool, method), FailureKind::Verify);
    assert!(message.starts_with("Illegal exception handler catch type"), "{}", message);

    let method = MethodSpec::new("()V", 1, 0, code).handler(2, 2, 3, 0);
    expect_failure(check(&pool, method), FailureKind::ClassFormat);
}

#[test]
fn handler_sees_locals_of_whole_try_range() {
    let pool = Pool::new();
    let code = Assembler::new()
        .op(ICONST_1)
        .op(ISTORE_0)
        .op(FCONST_1) // 2: try
        .op(FSTORE_0)
        .op(FCONST_1) // 4: local 0 is now a float
        .op(FSTORE_0)
        .op(ICONST_0)
        .op(IRETURN)
        .op(POP) // 8: handler
        .op(ILOAD_0)
        .op(IRETURN)
        .finish();

    let method = MethodSpec::new("()I", 1, 1, code.clone()).handler(2, 6, 8, 0);
    expect_failure(check(&pool, method), FailureKind::Verify);

    let method = MethodSpec::new("()I", 1, 1, code).handler(2, 4, 8, 0);
    assert_eq!(check(&pool, method), Ok(()));
}

#[test]
fn protected_field_from_another_package() {
    let mut pool = Pool::new();
    let count = pool.field("other/Base", "count", "I");

    let arenas = ClassGraphArenas::new();
    let graph = ClassGraph::new(&arenas);
    let java = graph.insert_java_library_types();
    let base = add_class(&graph, "other/Base", java.lang.object);
    add_field(&graph, base, "count", "I", FieldAccessFlags::PROTECTED);
    let sub = add_class(&graph, "pkg/Sub", base);

    let read_count = |receiver: Opcode| {
        let code = Assembler::new()
            .op(receiver)
            .op_cpi(GETFIELD, count)
            .op(IRETURN)
            .finish();
        let mut method = MethodSpec::new("(Lother/Base;)I", 1, 2, code);
        method.access_flags = MethodAccessFlags::PUBLIC;
        verify(&graph, &method.build(sub, &pool.constants))
    };

    assert_eq!(read_count(ALOAD_0), Ok(()));
    let message = expect_failure(read_count(ALOAD_1), FailureKind::Verify);
    assert!(message.starts_with("Illegal protected field access"), "{}", message);
}

#[test]
fn new_then_initialize() {
    let mut pool = Pool::new();
    let widget = pool.class("pkg/Widget");
    let widget_init = pool.method("pkg/Widget", "<init>", "()V");
    let object_init = pool.method("java/lang/Object", "<init>", "()V");

    let arenas = ClassGraphArenas::new();
    let graph = ClassGraph::new(&arenas);
    let java = graph.insert_java_library_types();
    let test = add_class(&graph, "pkg/Test", java.lang.object);
    add_class(&graph, "pkg/Widget", java.lang.object);

    let make = |init| {
        let code = Assembler::new()
            .op_cpi(NEW, widget)
            .op(DUP)
            .op_cpi(INVOKESPECIAL, init)
            .op(ARETURN)
            .finish();
        let method = MethodSpec::new("()Lpkg/Widget;", 2, 0, code);
        verify(&graph, &method.build(test, &pool.constants))
    };

    assert_eq!(make(widget_init), Ok(()));
    let message = expect_failure(make(object_init), FailureKind::Verify);
    assert!(message.starts_with("Call to wrong <init> method"), "{}", message);

    // Returning the object before it is initialized
    let code = Assembler::new().op_cpi(NEW, widget).op(ARETURN).finish();
    let method = MethodSpec::new("()Lpkg/Widget;", 1, 0, code);
    expect_failure(
        verify(&graph, &method.build(test, &pool.constants)),
        FailureKind::Verify,
    );
}

#[test]
fn boolean_arrays() {
    let mut pool = Pool::new();
    let takes_bytes = pool.method("pkg/Util", "bytes", "([B)V");
    let code = Assembler::new()
        .op(ICONST_1)
        .op_u1(NEWARRAY, 4)
        .op_cpi(INVOKESTATIC, takes_bytes)
        .op(RETURN)
        .finish();

    expect_failure(
        check(&pool, MethodSpec::new("()V", 1, 0, code.clone())),
        FailureKind::Verify,
    );

    let merged = Settings {
        boolean_arrays_distinct: false,
        ..Settings::default()
    };
    assert_eq!(
        check_with(&pool, MethodSpec::new("()V", 1, 0, code), &merged),
        Ok(())
    );
}

#[test]
fn ldc_of_strings_and_ints() {
    let mut pool = Pool::new();
    let string = pool.string("hello");
    let int = pool.integer(42);
    let code = Assembler::new()
        .op_u1(LDC, string.0 as u8)
        .op(POP)
        .op_cpi(LDC_W, int)
        .op(IRETURN)
        .finish();
    assert_eq!(check(&pool, MethodSpec::new("()I", 1, 0, code)), Ok(()));

    let code = Assembler::new().op_cpi(LDC2_W, int).op(POP2).op(RETURN).finish();
    expect_failure(
        check(&pool, MethodSpec::new("()V", 2, 0, code)),
        FailureKind::Verify,
    );
}

#[test]
fn methods_without_code() {
    let arenas = ClassGraphArenas::new();
    let graph = ClassGraph::new(&arenas);
    let java = graph.insert_java_library_types();
    let class = add_class(&graph, "pkg/Test", java.lang.object);
    let pool = Pool::new();

    let mut method = VerifiableMethod {
        class,
        constants: &pool.constants,
        version: Version::JAVA8,
        name: UnqualifiedName::from_string(String::from("run")).unwrap(),
        descriptor: MethodDescriptor::parse("()V").unwrap(),
        access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        code: None,
    };
    assert_eq!(verify(&graph, &method), Ok(()));

    method.access_flags = MethodAccessFlags::PUBLIC;
    let failure = verify(&graph, &method).unwrap_err();
    assert_eq!(failure.kind, FailureKind::ClassFormat);
    assert!(!failure.allow_fallback);
}

/// `aload_1; invokespecial <method>; return` in an instance method of `class`
fn call_special<'g>(
    graph: &ClassGraph<'g>,
    class: &'g ClassData<'g>,
    pool: &Pool,
    method: ConstantIndex,
    parameter: &'static str,
) -> Result<(), VerificationFailure> {
    let code = Assembler::new()
        .op(ALOAD_1)
        .op_cpi(INVOKESPECIAL, method)
        .op(RETURN)
        .finish();
    let spec = MethodSpec::new(parameter, 1, 2, code).instance();
    verify(graph, &spec.build(class, &pool.constants))
}

#[test]
fn invokespecial_targets_current_class_or_ancestor() {
    let mut pool = Pool::new();
    let base_helper = pool.method("other/Base", "helper", "()V");
    let unrelated_helper = pool.method("other/Unrelated", "helper", "()V");

    let arenas = ClassGraphArenas::new();
    let graph = ClassGraph::new(&arenas);
    let java = graph.insert_java_library_types();
    let base = add_class(&graph, "other/Base", java.lang.object);
    add_method(&graph, base, "helper", "()V", MethodAccessFlags::PUBLIC);
    let unrelated = add_class(&graph, "other/Unrelated", java.lang.object);
    add_method(&graph, unrelated, "helper", "()V", MethodAccessFlags::PUBLIC);
    let sub = add_class(&graph, "pkg/Sub", base);

    // Superclass method called on an instance of the current class
    let code = Assembler::new()
        .op(ALOAD_0)
        .op_cpi(INVOKESPECIAL, base_helper)
        .op(RETURN)
        .finish();
    let method = MethodSpec::new("()V", 1, 1, code).instance();
    assert_eq!(verify(&graph, &method.build(sub, &pool.constants)), Ok(()));
    assert_eq!(call_special(&graph, sub, &pool, base_helper, "(Lpkg/Sub;)V"), Ok(()));

    // Receiver is only known to be a `Base`
    let message = expect_failure(
        call_special(&graph, sub, &pool, base_helper, "(Lother/Base;)V"),
        FailureKind::Verify,
    );
    assert!(message.starts_with("Bad type on operand stack for invokespecial"), "{}", message);

    // Named class isn't an ancestor
    let message = expect_failure(
        call_special(&graph, sub, &pool, unrelated_helper, "(Lother/Unrelated;)V"),
        FailureKind::Verify,
    );
    assert!(message.contains("current class isn't assignable"), "{}", message);
}

#[test]
fn invokespecial_exemptions() {
    let mut pool = Pool::new();
    let helper = pool.method("other/Base", "helper", "()V");

    let arenas = ClassGraphArenas::new();
    let graph = ClassGraph::new(&arenas);
    let java = graph.insert_java_library_types();
    let base = add_class(&graph, "other/Base", java.lang.object);
    add_method(&graph, base, "helper", "()V", MethodAccessFlags::PUBLIC);
    let host = add_class(&graph, "pkg/Host", base);

    let plain = add_class(&graph, "pkg/Plain", java.lang.object);
    expect_failure(
        call_special(&graph, plain, &pool, helper, "(Lother/Base;)V"),
        FailureKind::Verify,
    );

    let accessor = graph.add_class(ClassData {
        is_magic_accessor: true,
        ..ClassData::new(binary_name("pkg/Accessor"), java.lang.object, ClassAccessFlags::PUBLIC)
    });
    assert_eq!(call_special(&graph, accessor, &pool, helper, "(Lother/Base;)V"), Ok(()));

    // Defined on behalf of `Host`, so it gets `Host`'s view of the hierarchy
    let hosted = graph.add_class(ClassData {
        host_class: Some(host),
        ..ClassData::new(binary_name("pkg/Hosted"), java.lang.object, ClassAccessFlags::PUBLIC)
    });
    assert_eq!(call_special(&graph, hosted, &pool, helper, "(Lpkg/Host;)V"), Ok(()));
    let message = expect_failure(
        call_special(&graph, hosted, &pool, helper, "(Lother/Base;)V"),
        FailureKind::Verify,
    );
    assert!(message.starts_with("Bad type on operand stack for invokespecial"), "{}", message);
}

#[test]
fn clone_of_arrays_from_another_package() {
    let mut pool = Pool::new();
    let clone = pool.method("java/lang/Object", "clone", "()Ljava/lang/Object;");
    let code = Assembler::new()
        .op(ALOAD_0)
        .op_cpi(INVOKEVIRTUAL, clone)
        .op(ARETURN)
        .finish();

    let method = MethodSpec::new("([I)Ljava/lang/Object;", 1, 1, code.clone());
    assert_eq!(check(&pool, method), Ok(()));

    let method = MethodSpec::new("(Ljava/lang/Object;)Ljava/lang/Object;", 1, 1, code);
    let message = expect_failure(check(&pool, method), FailureKind::Verify);
    assert!(message.starts_with("Illegal protected method access"), "{}", message);
}

#[test]
fn protected_method_from_another_package() {
    let mut pool = Pool::new();
    let touch = pool.method("other/Base", "touch", "()V");

    let arenas = ClassGraphArenas::new();
    let graph = ClassGraph::new(&arenas);
    let java = graph.insert_java_library_types();
    let base = add_class(&graph, "other/Base", java.lang.object);
    add_method(&graph, base, "touch", "()V", MethodAccessFlags::PROTECTED);
    let sub = add_class(&graph, "pkg/Sub", base);
    add_class(&graph, "pkg/SubSub", sub);
    let neighbour = add_class(&graph, "other/Neighbour", base);

    let call_touch = |class, receiver: &'static str| {
        let code = Assembler::new()
            .op(ALOAD_1)
            .op_cpi(INVOKEVIRTUAL, touch)
            .op(RETURN)
            .finish();
        let method = MethodSpec::new(receiver, 1, 2, code).instance();
        verify(&graph, &method.build(class, &pool.constants))
    };

    assert_eq!(call_touch(sub, "(Lpkg/SubSub;)V"), Ok(()));
    let message = expect_failure(call_touch(sub, "(Lother/Base;)V"), FailureKind::Verify);
    assert!(message.starts_with("Illegal protected method access"), "{}", message);

    // Same runtime package as the declaring class
    assert_eq!(call_touch(neighbour, "(Lother/Base;)V"), Ok(()));
}

#[test]
fn invokeinterface_operand_bytes() {
    let mut pool = Pool::new();
    let area = pool.interface_method("pkg/Shape", "area", "(I)I");
    let call_area = |count: u8, zero: u8| {
        let code = Assembler::new()
            .op(ALOAD_0)
            .op(ICONST_1)
            .op_cpi(INVOKEINTERFACE, area)
            .raw(&[count, zero])
            .op(IRETURN)
            .finish();
        check(&pool, MethodSpec::new("(Lpkg/Shape;)I", 2, 1, code))
    };

    assert_eq!(call_area(2, 0), Ok(()));
    let message = expect_failure(call_area(3, 0), FailureKind::Verify);
    assert!(message.starts_with("Inconsistent args count"), "{}", message);
    let message = expect_failure(call_area(2, 1), FailureKind::Verify);
    assert!(message.starts_with("Fourth operand byte"), "{}", message);
}

#[test]
fn invokedynamic_call_sites() {
    let mut pool = Pool::new();
    let apply = pool.invoke_dynamic("apply", "(I)Ljava/lang/Object;");
    let init = pool.invoke_dynamic("<init>", "(I)V");
    let call_site = |index, padding: [u8; 2]| {
        let code = Assembler::new()
            .op(ICONST_1)
            .op_cpi(INVOKEDYNAMIC, index)
            .raw(&padding)
            .op(ARETURN)
            .finish();
        let method = MethodSpec::new("()Ljava/lang/Object;", 1, 0, code).version(Version::JAVA8);
        check(&pool, method)
    };

    assert_eq!(call_site(apply, [0, 0]), Ok(()));
    let message = expect_failure(call_site(apply, [0, 1]), FailureKind::Verify);
    assert!(message.contains("must be zero"), "{}", message);
    let message = expect_failure(call_site(init, [0, 0]), FailureKind::Verify);
    assert!(message.starts_with("Illegal invokedynamic method name"), "{}", message);
}

#[test]
fn ldc_version_gates() {
    let mut pool = Pool::new();
    let handle = pool.static_method_handle("pkg/Util", "run", "()V");
    let method_type = pool.method_type("()V");
    let dynamic = pool.dynamic("value", "I");
    let load = |index: ConstantIndex, descriptor: &'static str, ret: Opcode, version: Version| {
        let code = Assembler::new().op_cpi(LDC_W, index).op(ret).finish();
        check(&pool, MethodSpec::new(descriptor, 1, 0, code).version(version))
    };

    let handle_type = "()Ljava/lang/invoke/MethodHandle;";
    let type_type = "()Ljava/lang/invoke/MethodType;";
    assert_eq!(load(handle, handle_type, ARETURN, Version::JAVA7), Ok(()));
    assert_eq!(load(method_type, type_type, ARETURN, Version::JAVA7), Ok(()));
    assert_eq!(load(dynamic, "()I", IRETURN, Version::JAVA11), Ok(()));

    let message = expect_failure(
        load(handle, handle_type, ARETURN, Version::JAVA6),
        FailureKind::ClassFormat,
    );
    assert!(message.contains("version 51"), "{}", message);
    expect_failure(
        load(method_type, type_type, ARETURN, Version::JAVA6),
        FailureKind::ClassFormat,
    );
    let message = expect_failure(
        load(dynamic, "()I", IRETURN, Version::major(54)),
        FailureKind::ClassFormat,
    );
    assert!(message.contains("version 55"), "{}", message);
}

#[test]
fn constant_pool_entries_of_the_wrong_kind() {
    let mut pool = Pool::new();
    let field = pool.field("pkg/Test", "count", "I");
    let method = pool.method("pkg/Test", "count", "()I");

    let code = Assembler::new().op_cpi(LDC_W, field).op(IRETURN).finish();
    let message = expect_failure(
        check(&pool, MethodSpec::new("()I", 1, 0, code)),
        FailureKind::Verify,
    );
    assert!(message.starts_with("Invalid constant pool load"), "{}", message);

    let code = Assembler::new().op_cpi(GETSTATIC, method).op(IRETURN).finish();
    let message = expect_failure(
        check(&pool, MethodSpec::new("()I", 1, 0, code)),
        FailureKind::Verify,
    );
    assert!(message.starts_with("Illegal constant pool index"), "{}", message);
}

#[test]
fn interface_method_refs_need_version_52() {
    let mut pool = Pool::new();
    let twice = pool.interface_method("pkg/Util", "twice", "(I)I");
    let hello = pool.interface_method("pkg/Greeter", "hello", "()V");

    let code = Assembler::new()
        .op(ICONST_1)
        .op_cpi(INVOKESTATIC, twice)
        .op(IRETURN)
        .finish();
    let static_call = |version| {
        let method = MethodSpec::new("()I", 1, 0, code.clone()).version(version);
        check(&pool, method)
    };
    assert_eq!(static_call(Version::JAVA8), Ok(()));
    let message = expect_failure(static_call(Version::JAVA7), FailureKind::Verify);
    assert!(message.starts_with("Illegal constant pool index"), "{}", message);

    let arenas = ClassGraphArenas::new();
    let graph = ClassGraph::new(&arenas);
    let java = graph.insert_java_library_types();
    let greeter = add_interface(&graph, "pkg/Greeter", java.lang.object);
    let test = add_class(&graph, "pkg/Test", java.lang.object);
    test.interfaces.push(greeter);

    let code = Assembler::new()
        .op(ALOAD_0)
        .op_cpi(INVOKESPECIAL, hello)
        .op(RETURN)
        .finish();
    let special_call = |version| {
        let method = MethodSpec::new("()V", 1, 1, code.clone())
            .instance()
            .version(version);
        verify(&graph, &method.build(test, &pool.constants))
    };
    assert_eq!(special_call(Version::JAVA8), Ok(()));
    expect_failure(special_call(Version::JAVA7), FailureKind::Verify);
}

/// `iconst_0; <switch> to end; end: return`, with the frame at `end` declared
fn single_case_switch(tableswitch: bool) -> (Vec<u8>, Vec<StackMapFrame>) {
    let mut asm = Assembler::new();
    asm.op(ICONST_0);
    if tableswitch {
        asm.tableswitch("end", 0, &["end"]);
    } else {
        asm.lookupswitch("end", &[(1, "end")]);
    }
    asm.label("end").op(RETURN);
    let frames = vec![StackMapFrame::SameLocalsNoStack {
        offset_delta: asm.label_bci("end") as u16,
    }];
    (asm.finish(), frames)
}

#[test]
fn switch_padding_is_checked_before_version_52() {
    let pool = Pool::new();
    for tableswitch in [true, false] {
        let (mut code, frames) = single_case_switch(tableswitch);
        let run = |code: &Vec<u8>, version| {
            let method = MethodSpec::new("()V", 1, 0, code.clone())
                .version(version)
                .stack_map(frames.clone());
            check(&pool, method)
        };
        assert_eq!(run(&code, Version::JAVA7), Ok(()));

        // Switch is at offset 1, so offsets 2 and 3 are padding
        code[2] = 0xFF;
        assert_eq!(run(&code, Version::JAVA8), Ok(()));
        let message = expect_failure(run(&code, Version::JAVA7), FailureKind::Verify);
        assert!(message.starts_with("Nonzero padding byte"), "{}", message);
    }
}

#[test]
fn switch_keys_must_be_ordered() {
    let pool = Pool::new();
    let lookupswitch = |pairs: &[(i32, &'static str)]| {
        let mut asm = Assembler::new();
        asm.op(ICONST_0).lookupswitch("end", pairs).label("end").op(RETURN);
        let frames = vec![StackMapFrame::SameLocalsNoStack {
            offset_delta: asm.label_bci("end") as u16,
        }];
        let method = MethodSpec::new("()V", 1, 0, asm.finish())
            .version(Version::JAVA8)
            .stack_map(frames);
        check(&pool, method)
    };
    assert_eq!(lookupswitch(&[(1, "end"), (2, "end")]), Ok(()));
    let message = expect_failure(lookupswitch(&[(2, "end"), (2, "end")]), FailureKind::ClassFormat);
    assert!(message.contains("not sorted"), "{}", message);

    // No targets at all, so `high` ends up below `low`
    let mut asm = Assembler::new();
    asm.op(ICONST_0).tableswitch("end", 5, &[]).label("end").op(RETURN);
    let message = expect_failure(
        check(&pool, MethodSpec::new("()V", 1, 0, asm.finish())),
        FailureKind::ClassFormat,
    );
    assert!(message.contains("low is greater than high"), "{}", message);
}
