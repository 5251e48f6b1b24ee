use super::{ClassData, ClassGraph, MethodData};
use crate::jvm::{
    BinaryName, ClassAccessFlags, FieldType, MethodAccessFlags, MethodDescriptor, UnqualifiedName,
};
use elsa::FrozenVec;

/// Library classes every verification can rely on, whatever the class path contains
///
/// These are the classes the verifier itself mentions (constant types, array supertypes, the
/// throwable root) plus a handful of common members so that tests can call into something.
pub struct JavaClasses<'g> {
    pub lang: LangClasses<'g>,
    pub io: IoClasses<'g>,
}

/// `java.lang.*`
pub struct LangClasses<'g> {
    pub object: &'g ClassData<'g>,
    pub cloneable: &'g ClassData<'g>,
    pub comparable: &'g ClassData<'g>,
    pub char_sequence: &'g ClassData<'g>,
    pub string: &'g ClassData<'g>,
    pub class: &'g ClassData<'g>,
    pub number: &'g ClassData<'g>,
    pub integer: &'g ClassData<'g>,
    pub throwable: &'g ClassData<'g>,
    pub error: &'g ClassData<'g>,
    pub exception: &'g ClassData<'g>,
    pub runtime_exception: &'g ClassData<'g>,
    pub invoke: InvokeClasses<'g>,
}

/// `java.lang.invoke.*`
pub struct InvokeClasses<'g> {
    pub method_type: &'g ClassData<'g>,
    pub method_handle: &'g ClassData<'g>,
}

/// `java.io.*`
pub struct IoClasses<'g> {
    pub serializable: &'g ClassData<'g>,
}

const INTERFACE: ClassAccessFlags = ClassAccessFlags::from_bits_truncate(
    ClassAccessFlags::PUBLIC.bits()
        | ClassAccessFlags::INTERFACE.bits()
        | ClassAccessFlags::ABSTRACT.bits(),
);
const OPEN_CLASS: ClassAccessFlags = ClassAccessFlags::from_bits_truncate(
    ClassAccessFlags::PUBLIC.bits() | ClassAccessFlags::SUPER.bits(),
);
const FINAL_CLASS: ClassAccessFlags = ClassAccessFlags::from_bits_truncate(
    OPEN_CLASS.bits() | ClassAccessFlags::FINAL.bits(),
);
const ABSTRACT_CLASS: ClassAccessFlags = ClassAccessFlags::from_bits_truncate(
    OPEN_CLASS.bits() | ClassAccessFlags::ABSTRACT.bits(),
);

/// Helper for declaring library classes and their members
struct Declarer<'a, 'g> {
    class_graph: &'a ClassGraph<'g>,
}

impl<'a, 'g> Declarer<'a, 'g> {
    fn class(
        &self,
        name: BinaryName,
        superclass: &'g ClassData<'g>,
        access_flags: ClassAccessFlags,
        interfaces: &[&'g ClassData<'g>],
    ) -> &'g ClassData<'g> {
        let class = self
            .class_graph
            .add_class(ClassData::new(name, superclass, access_flags));
        for interface in interfaces {
            class.interfaces.push(*interface);
        }
        class
    }

    fn method(
        &self,
        class: &'g ClassData<'g>,
        name: &'static str,
        descriptor: (Vec<FieldType<BinaryName>>, Option<FieldType<BinaryName>>),
        access_flags: MethodAccessFlags,
    ) -> &'g MethodData<'g> {
        let (parameters, return_type) = descriptor;
        self.class_graph.add_method(MethodData {
            class,
            name: UnqualifiedName::name(name),
            descriptor: MethodDescriptor {
                parameters,
                return_type,
            },
            access_flags,
        })
    }

    /// Public `<init>` taking these parameters
    fn constructor(&self, class: &'g ClassData<'g>, parameters: Vec<FieldType<BinaryName>>) {
        self.method(class, "<init>", (parameters, None), MethodAccessFlags::PUBLIC);
    }
}

impl<'g> JavaClasses<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>) -> JavaClasses<'g> {
        let declare = Declarer { class_graph };

        let object = class_graph.add_class(ClassData {
            name: BinaryName::OBJECT,
            superclass: None,
            interfaces: FrozenVec::new(),
            access_flags: OPEN_CLASS,
            methods: FrozenVec::new(),
            fields: FrozenVec::new(),
            host_class: None,
            is_magic_accessor: false,
        });
        let io = IoClasses {
            serializable: declare.class(BinaryName::SERIALIZABLE, object, INTERFACE, &[]),
        };
        let lang = LangClasses::declare(&declare, object, &io);

        JavaClasses { lang, io }
    }
}

impl<'g> LangClasses<'g> {
    fn declare(
        declare: &Declarer<'_, 'g>,
        object: &'g ClassData<'g>,
        io: &IoClasses<'g>,
    ) -> LangClasses<'g> {
        let serializable = io.serializable;
        let cloneable = declare.class(BinaryName::CLONEABLE, object, INTERFACE, &[]);
        let comparable = declare.class(BinaryName::COMPARABLE, object, INTERFACE, &[]);
        let char_sequence = declare.class(BinaryName::CHARSEQUENCE, object, INTERFACE, &[]);
        let string = declare.class(
            BinaryName::STRING,
            object,
            FINAL_CLASS,
            &[serializable, comparable, char_sequence],
        );
        let class = declare.class(BinaryName::CLASS, object, FINAL_CLASS, &[serializable]);
        let number = declare.class(BinaryName::NUMBER, object, ABSTRACT_CLASS, &[serializable]);
        let integer = declare.class(BinaryName::INTEGER, number, FINAL_CLASS, &[comparable]);
        let throwable = declare.class(BinaryName::THROWABLE, object, OPEN_CLASS, &[serializable]);
        let error = declare.class(BinaryName::ERROR, throwable, OPEN_CLASS, &[]);
        let exception = declare.class(BinaryName::EXCEPTION, throwable, OPEN_CLASS, &[]);
        let runtime_exception =
            declare.class(BinaryName::RUNTIMEEXCEPTION, exception, OPEN_CLASS, &[]);
        let invoke = InvokeClasses {
            method_type: declare.class(BinaryName::METHODTYPE, object, FINAL_CLASS, &[]),
            method_handle: declare.class(BinaryName::METHODHANDLE, object, ABSTRACT_CLASS, &[]),
        };

        let public = MethodAccessFlags::PUBLIC;
        let protected = MethodAccessFlags::PROTECTED;
        let object_type = || FieldType::object(BinaryName::OBJECT);
        let string_type = || FieldType::object(BinaryName::STRING);

        declare.constructor(object, vec![]);
        declare.method(
            object,
            "clone",
            (vec![], Some(object_type())),
            protected | MethodAccessFlags::NATIVE,
        );
        declare.method(object, "finalize", (vec![], None), protected);
        declare.method(object, "equals", (vec![object_type()], Some(FieldType::boolean())), public);
        declare.method(object, "hashCode", (vec![], Some(FieldType::int())), public);
        declare.method(object, "toString", (vec![], Some(string_type())), public);

        declare.constructor(string, vec![]);
        declare.method(string, "length", (vec![], Some(FieldType::int())), public);

        declare.constructor(number, vec![]);
        declare.method(
            number,
            "intValue",
            (vec![], Some(FieldType::int())),
            public | MethodAccessFlags::ABSTRACT,
        );
        declare.method(
            integer,
            "valueOf",
            (vec![FieldType::int()], Some(FieldType::object(BinaryName::INTEGER))),
            public | MethodAccessFlags::STATIC,
        );

        for throwable_class in [throwable, error, exception, runtime_exception] {
            declare.constructor(throwable_class, vec![]);
            declare.constructor(throwable_class, vec![string_type()]);
        }
        declare.method(throwable, "getMessage", (vec![], Some(string_type())), public);

        LangClasses {
            object,
            cloneable,
            comparable,
            char_sequence,
            string,
            class,
            number,
            integer,
            throwable,
            error,
            exception,
            runtime_exception,
            invoke,
        }
    }
}
