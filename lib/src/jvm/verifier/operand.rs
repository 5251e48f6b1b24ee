use super::{TypeResolver, VerificationFailure};
use crate::jvm::class_graph::is_array_type_assignable;
use crate::jvm::{BaseType, BinaryName, FieldType, RefType};
use crate::util::Width;
use std::fmt;

/// Kinds of primitive values
///
/// `Byte`, `Short`, `Char`, and `Boolean` only ever show up as array elements and in
/// descriptors: on the operand stack and in locals they are all plain `Int`s.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Int,
    Float,
    Long,
    Double,
    Byte,
    Short,
    Char,
    Boolean,

    /// Return "value" of a method returning `void`
    Void,
}

impl PrimitiveKind {
    pub fn is_type2(self) -> bool {
        matches!(self, PrimitiveKind::Long | PrimitiveKind::Double)
    }

    /// Representation of the value once it is on the operand stack
    pub fn to_stack(self) -> PrimitiveKind {
        match self {
            PrimitiveKind::Byte
            | PrimitiveKind::Short
            | PrimitiveKind::Char
            | PrimitiveKind::Boolean => PrimitiveKind::Int,
            other => other,
        }
    }

    pub fn from_base_type(base_type: BaseType, boolean_arrays_distinct: bool) -> PrimitiveKind {
        match base_type {
            BaseType::Int => PrimitiveKind::Int,
            BaseType::Float => PrimitiveKind::Float,
            BaseType::Long => PrimitiveKind::Long,
            BaseType::Double => PrimitiveKind::Double,
            BaseType::Byte => PrimitiveKind::Byte,
            BaseType::Short => PrimitiveKind::Short,
            BaseType::Char => PrimitiveKind::Char,
            BaseType::Boolean if boolean_arrays_distinct => PrimitiveKind::Boolean,
            BaseType::Boolean => PrimitiveKind::Byte,
        }
    }

    fn descriptor(self) -> char {
        match self {
            PrimitiveKind::Int => 'I',
            PrimitiveKind::Float => 'F',
            PrimitiveKind::Long => 'J',
            PrimitiveKind::Double => 'D',
            PrimitiveKind::Byte => 'B',
            PrimitiveKind::Short => 'S',
            PrimitiveKind::Char => 'C',
            PrimitiveKind::Boolean => 'Z',
            PrimitiveKind::Void => 'V',
        }
    }
}

/// Innermost element type of an array
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Elemental {
    Primitive(PrimitiveKind),
    Reference(BinaryName),
}

/// Abstract value tracked on the operand stack and in local variables
///
/// Operands form a join semilattice: [`Operand::complies_with`] is the order and
/// [`Operand::merge_with`] is the join. `Top` is the greatest element, which is what a local
/// variable turns into when the values flowing into it can't be reconciled.
///
/// Reference types only carry class names. The class hierarchy is consulted (through a
/// [`TypeResolver`]) only when two different classes need to be related.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Primitive(PrimitiveKind),

    /// Initialized instance of a class or interface
    Reference(BinaryName),

    /// Array with at least one dimension
    Array {
        elemental: Elemental,
        dimensions: usize,
    },

    /// The `null` reference, which fits in any reference type
    Null,

    /// Result of the `new` at `new_bci`, before its `<init>` has been called
    UninitializedNew { class: BinaryName, new_bci: usize },

    /// `this` inside a constructor, before the superclass constructor has been called
    UninitializedThis(BinaryName),

    /// Pushed by `jsr`/`jsr_w` calling the subroutine at `subroutine`
    ///
    /// `targets` are the (sorted) offsets of the `jsr` instructions this address can return to.
    ReturnAddress {
        targets: Vec<usize>,
        subroutine: usize,
    },

    /// Unusable value (also the second slot of a `long` or `double`)
    Top,
}

impl Operand {
    pub const INT: Operand = Operand::Primitive(PrimitiveKind::Int);
    pub const FLOAT: Operand = Operand::Primitive(PrimitiveKind::Float);
    pub const LONG: Operand = Operand::Primitive(PrimitiveKind::Long);
    pub const DOUBLE: Operand = Operand::Primitive(PrimitiveKind::Double);
    pub const VOID: Operand = Operand::Primitive(PrimitiveKind::Void);
    pub const OBJECT: Operand = Operand::Reference(BinaryName::OBJECT);
    pub const THROWABLE: Operand = Operand::Reference(BinaryName::THROWABLE);

    pub fn from_field_type(field_type: &FieldType<BinaryName>, boolean_arrays_distinct: bool) -> Operand {
        match field_type {
            FieldType::Base(base_type) => {
                Operand::Primitive(PrimitiveKind::from_base_type(*base_type, boolean_arrays_distinct))
            }
            FieldType::Ref(ref_type) => Operand::from_ref_type(ref_type, boolean_arrays_distinct),
        }
    }

    pub fn from_ref_type(ref_type: &RefType<BinaryName>, boolean_arrays_distinct: bool) -> Operand {
        match ref_type {
            RefType::Object(name) => Operand::Reference(name.clone()),
            RefType::ObjectArray(array) => Operand::Array {
                elemental: Elemental::Reference(array.element_type.clone()),
                dimensions: array.dimensions(),
            },
            RefType::PrimitiveArray(array) => Operand::Array {
                elemental: Elemental::Primitive(PrimitiveKind::from_base_type(
                    array.element_type,
                    boolean_arrays_distinct,
                )),
                dimensions: array.dimensions(),
            },
        }
    }

    /// One-dimensional array of the given element
    pub fn array_of_primitive(kind: PrimitiveKind) -> Operand {
        Operand::Array {
            elemental: Elemental::Primitive(kind),
            dimensions: 1,
        }
    }

    /// Array type with one more dimension than this type
    pub fn array_of(&self) -> Option<Operand> {
        match self {
            Operand::Primitive(kind) if *kind != PrimitiveKind::Void => {
                Some(Operand::array_of_primitive(*kind))
            }
            Operand::Reference(name) => Some(Operand::Array {
                elemental: Elemental::Reference(name.clone()),
                dimensions: 1,
            }),
            Operand::Array {
                elemental,
                dimensions,
            } => Some(Operand::Array {
                elemental: elemental.clone(),
                dimensions: dimensions + 1,
            }),
            _ => None,
        }
    }

    /// Array of `java/lang/Object` with `dimensions` dimensions (`Object` itself for zero)
    fn object_array(dimensions: usize) -> Operand {
        if dimensions == 0 {
            Operand::OBJECT
        } else {
            Operand::Array {
                elemental: Elemental::Reference(BinaryName::OBJECT),
                dimensions,
            }
        }
    }

    pub fn is_type2(&self) -> bool {
        matches!(self, Operand::Primitive(kind) if kind.is_type2())
    }

    /// Can this be stored in an object slot? Uninitialized objects count
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Operand::Reference(_)
                | Operand::Array { .. }
                | Operand::Null
                | Operand::UninitializedNew { .. }
                | Operand::UninitializedThis(_)
        )
    }

    pub fn is_uninitialized(&self) -> bool {
        matches!(
            self,
            Operand::UninitializedNew { .. } | Operand::UninitializedThis(_)
        )
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Operand::Array { .. })
    }

    pub fn is_top(&self) -> bool {
        matches!(self, Operand::Top)
    }

    /// Class named by a plain or uninitialized reference
    pub fn class_name(&self) -> Option<&BinaryName> {
        match self {
            Operand::Reference(name)
            | Operand::UninitializedNew { class: name, .. }
            | Operand::UninitializedThis(name) => Some(name),
            _ => None,
        }
    }

    /// Element type of an array (`null` is its own component type)
    pub fn component(&self) -> Option<Operand> {
        match self {
            Operand::Null => Some(Operand::Null),
            Operand::Array {
                elemental,
                dimensions: 1,
            } => Some(match elemental {
                Elemental::Primitive(kind) => Operand::Primitive(*kind),
                Elemental::Reference(name) => Operand::Reference(name.clone()),
            }),
            Operand::Array {
                elemental,
                dimensions,
            } => Some(Operand::Array {
                elemental: elemental.clone(),
                dimensions: dimensions - 1,
            }),
            _ => None,
        }
    }

    /// Representation of this value once it is on the operand stack
    pub fn to_stack(&self) -> Operand {
        match self {
            Operand::Primitive(kind) => Operand::Primitive(kind.to_stack()),
            other => other.clone(),
        }
    }

    /// Type of the value after its constructor has been called
    pub fn initialized(&self) -> Operand {
        match self {
            Operand::UninitializedNew { class, .. } | Operand::UninitializedThis(class) => {
                Operand::Reference(class.clone())
            }
            other => other.clone(),
        }
    }

    /// Can a value of this type be used where `other` is expected?
    pub fn complies_with(
        &self,
        other: &Operand,
        resolver: &TypeResolver,
    ) -> Result<bool, VerificationFailure> {
        if self == other {
            return Ok(true);
        }
        let complies = match (self, other) {
            (_, Operand::Top) => true,
            (Operand::Null, Operand::Reference(_) | Operand::Array { .. }) => true,
            (Operand::Reference(sub), Operand::Reference(sup)) => {
                reference_complies(sub, sup, resolver)?
            }
            (Operand::Array { .. }, Operand::Reference(sup)) => is_array_type_assignable(sup),
            (
                Operand::Array {
                    elemental: sub_elem,
                    dimensions: sub_dims,
                },
                Operand::Array {
                    elemental: sup_elem,
                    dimensions: sup_dims,
                },
            ) => {
                if sub_dims == sup_dims {
                    match (sub_elem, sup_elem) {
                        (Elemental::Reference(sub), Elemental::Reference(sup)) => {
                            reference_complies(sub, sup, resolver)?
                        }
                        _ => false,
                    }
                } else if sub_dims > sup_dims {
                    // The elements of `sub` at depth `sup_dims` are themselves arrays
                    matches!(sup_elem, Elemental::Reference(sup) if is_array_type_assignable(sup))
                } else {
                    false
                }
            }
            (
                Operand::ReturnAddress {
                    targets: sub_targets,
                    subroutine: sub_routine,
                },
                Operand::ReturnAddress {
                    targets: sup_targets,
                    subroutine: sup_routine,
                },
            ) => {
                sub_routine == sup_routine
                    && sub_targets.iter().all(|target| sup_targets.contains(target))
            }
            _ => false,
        };
        Ok(complies)
    }

    /// Least upper bound of the two types, if there is one other than `Top`
    ///
    /// Primitives never unify with anything but themselves and uninitialized values only unify
    /// with the identical uninitialized value.
    pub fn merge_with(
        &self,
        other: &Operand,
        resolver: &TypeResolver,
    ) -> Result<Option<Operand>, VerificationFailure> {
        if self == other {
            return Ok(Some(self.clone()));
        }
        let merged = match (self, other) {
            (Operand::Null, typ) | (typ, Operand::Null)
                if matches!(typ, Operand::Reference(_) | Operand::Array { .. }) =>
            {
                Some(typ.clone())
            }
            (Operand::Reference(left), Operand::Reference(right)) => {
                Some(Operand::Reference(resolver.common_superclass(left, right)?))
            }
            (Operand::Array { .. }, Operand::Reference(name))
            | (Operand::Reference(name), Operand::Array { .. }) => {
                if is_array_type_assignable(name) {
                    Some(Operand::Reference(name.clone()))
                } else {
                    Some(Operand::OBJECT)
                }
            }
            (
                Operand::Array {
                    elemental: left_elem,
                    dimensions: left_dims,
                },
                Operand::Array {
                    elemental: right_elem,
                    dimensions: right_dims,
                },
            ) => Some(merge_arrays(
                (left_elem, *left_dims),
                (right_elem, *right_dims),
                resolver,
            )?),
            (
                Operand::ReturnAddress {
                    targets: left_targets,
                    subroutine: left_routine,
                },
                Operand::ReturnAddress {
                    targets: right_targets,
                    subroutine: right_routine,
                },
            ) if left_routine == right_routine => {
                let mut targets = left_targets.clone();
                targets.extend(right_targets.iter().copied());
                targets.sort_unstable();
                targets.dedup();
                Some(Operand::ReturnAddress {
                    targets,
                    subroutine: *left_routine,
                })
            }
            _ => None,
        };
        Ok(merged)
    }
}

fn reference_complies(
    sub: &BinaryName,
    sup: &BinaryName,
    resolver: &TypeResolver,
) -> Result<bool, VerificationFailure> {
    if sub == sup || sup == &BinaryName::OBJECT {
        return Ok(true);
    }

    // Interfaces are treated like `java/lang/Object`: the check happens at runtime instead
    if resolver.is_interface(sup)? {
        return Ok(true);
    }
    resolver.is_subclass(sub, sup)
}

fn merge_arrays(
    left: (&Elemental, usize),
    right: (&Elemental, usize),
    resolver: &TypeResolver,
) -> Result<Operand, VerificationFailure> {
    let (left_elem, left_dims) = left;
    let (right_elem, right_dims) = right;
    if left_dims == right_dims {
        return Ok(match (left_elem, right_elem) {
            (Elemental::Reference(l), Elemental::Reference(r)) => Operand::Array {
                elemental: Elemental::Reference(resolver.common_superclass(l, r)?),
                dimensions: left_dims,
            },
            _ => Operand::object_array(left_dims - 1),
        });
    }

    // Both are arrays of arrays down to the depth of the shallower one
    let (shallow_elem, shallow_dims) = if left_dims < right_dims {
        (left_elem, left_dims)
    } else {
        (right_elem, right_dims)
    };
    Ok(match shallow_elem {
        Elemental::Reference(_) => Operand::object_array(shallow_dims),
        Elemental::Primitive(_) => Operand::object_array(shallow_dims - 1),
    })
}

impl Width for Operand {
    fn width(&self) -> usize {
        if self.is_type2() {
            2
        } else {
            1
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Primitive(kind) => {
                let name = match kind {
                    PrimitiveKind::Int => "int",
                    PrimitiveKind::Float => "float",
                    PrimitiveKind::Long => "long",
                    PrimitiveKind::Double => "double",
                    PrimitiveKind::Byte => "byte",
                    PrimitiveKind::Short => "short",
                    PrimitiveKind::Char => "char",
                    PrimitiveKind::Boolean => "boolean",
                    PrimitiveKind::Void => "void",
                };
                f.write_str(name)
            }
            Operand::Reference(name) => write!(f, "{}", name),
            Operand::Array {
                elemental,
                dimensions,
            } => {
                for _ in 0..*dimensions {
                    f.write_str("[")?;
                }
                match elemental {
                    Elemental::Primitive(kind) => write!(f, "{}", kind.descriptor()),
                    Elemental::Reference(name) => write!(f, "L{};", name),
                }
            }
            Operand::Null => f.write_str("null"),
            Operand::UninitializedNew { class, new_bci } => {
                write!(f, "uninitialized {} (new at {})", class, new_bci)
            }
            Operand::UninitializedThis(class) => write!(f, "uninitializedThis {}", class),
            Operand::ReturnAddress {
                targets,
                subroutine,
            } => write!(f, "returnAddress {:?} of subroutine {}", targets, subroutine),
            Operand::Top => f.write_str("top"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::{ClassData, ClassGraph, ClassGraphArenas};
    use crate::jvm::{ClassAccessFlags, Name, ParseDescriptor};

    fn named(name: &str) -> BinaryName {
        BinaryName::from_string(name.to_owned()).unwrap()
    }

    fn parse(descriptor: &str) -> Operand {
        Operand::from_field_type(&FieldType::parse(descriptor).unwrap(), true)
    }

    #[test]
    fn descriptors_to_operands() {
        assert_eq!(parse("I"), Operand::INT);
        assert_eq!(parse("Z"), Operand::Primitive(PrimitiveKind::Boolean));
        assert_eq!(
            Operand::from_field_type(&FieldType::boolean(), false),
            Operand::Primitive(PrimitiveKind::Byte),
            "booleans are bytes on old runtimes"
        );
        assert_eq!(parse("Ljava/lang/String;"), Operand::Reference(BinaryName::STRING));
        assert_eq!(
            parse("[[J"),
            Operand::Array {
                elemental: Elemental::Primitive(PrimitiveKind::Long),
                dimensions: 2
            }
        );
        assert_eq!(parse("[[J").to_string(), "[[J");
        assert_eq!(parse("[Ljava/lang/Object;").to_string(), "[Ljava/lang/Object;");
        assert_eq!(parse("[[J").component(), Some(parse("[J")));
        assert_eq!(parse("[J").component(), Some(Operand::LONG));
        assert_eq!(Operand::Null.component(), Some(Operand::Null));
        assert_eq!(parse("[I").array_of(), Some(parse("[[I")));
        assert_eq!(parse("B").to_stack(), Operand::INT);
        assert_eq!(parse("D").width(), 2);
    }

    #[test]
    fn lattice_order() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();
        let resolver = TypeResolver::new(&class_graph);
        let complies = |sub: &Operand, sup: &Operand| sub.complies_with(sup, &resolver).unwrap();

        let string = Operand::Reference(BinaryName::STRING);
        let number = Operand::Reference(BinaryName::NUMBER);
        let integer = Operand::Reference(BinaryName::INTEGER);
        let char_sequence = Operand::Reference(BinaryName::CHARSEQUENCE);

        assert!(complies(&Operand::INT, &Operand::Top), "everything fits in top");
        assert!(!complies(&Operand::Top, &Operand::INT));
        assert!(!complies(&Operand::INT, &Operand::FLOAT));
        assert!(complies(&Operand::Null, &string), "null <: java/lang/String");
        assert!(complies(&Operand::Null, &parse("[I")), "null <: [I");
        assert!(!complies(&string, &Operand::Null));
        assert!(complies(&integer, &number), "java/lang/Integer <: java/lang/Number");
        assert!(!complies(&number, &integer), "java/lang/Number </: java/lang/Integer");
        assert!(complies(&integer, &char_sequence), "interfaces accept anything");
        assert!(complies(&parse("[I"), &Operand::OBJECT));
        assert!(complies(&parse("[I"), &Operand::Reference(BinaryName::CLONEABLE)));
        assert!(!complies(&parse("[I"), &string));
        assert!(!complies(&parse("[I"), &parse("[J")));
        assert!(complies(&parse("[Ljava/lang/Integer;"), &parse("[Ljava/lang/Number;")));
        assert!(complies(&parse("[[I"), &parse("[Ljava/lang/Object;")));
        assert!(!complies(&parse("[I"), &parse("[Ljava/lang/Object;")));

        let uninit = Operand::UninitializedNew {
            class: BinaryName::STRING,
            new_bci: 3,
        };
        assert!(!complies(&uninit, &string), "uninitialized values don't escape");
        assert!(!complies(
            &uninit,
            &Operand::UninitializedNew {
                class: BinaryName::STRING,
                new_bci: 4
            }
        ));
        assert!(complies(&uninit, &Operand::Top));

        let ra = |targets: Vec<usize>, subroutine| Operand::ReturnAddress {
            targets,
            subroutine,
        };
        assert!(complies(&ra(vec![2], 10), &ra(vec![2, 7], 10)), "subset of targets");
        assert!(!complies(&ra(vec![2, 7], 10), &ra(vec![2], 10)));
        assert!(!complies(&ra(vec![2], 10), &ra(vec![2], 11)), "different subroutine");
    }

    #[test]
    fn joins_are_symmetric_upper_bounds() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types();
        class_graph.add_class(ClassData::new(
            named("pkg/Left"),
            java.lang.runtime_exception,
            ClassAccessFlags::PUBLIC,
        ));
        class_graph.add_class(ClassData::new(
            named("pkg/Right"),
            java.lang.error,
            ClassAccessFlags::PUBLIC,
        ));
        let resolver = TypeResolver::new(&class_graph);

        let operands = vec![
            Operand::Null,
            Operand::OBJECT,
            Operand::Reference(BinaryName::STRING),
            Operand::Reference(BinaryName::INTEGER),
            Operand::Reference(BinaryName::CLONEABLE),
            Operand::Reference(named("pkg/Left")),
            Operand::Reference(named("pkg/Right")),
            parse("[I"),
            parse("[J"),
            parse("[[I"),
            parse("[Ljava/lang/String;"),
            parse("[Ljava/lang/Integer;"),
            parse("[[Ljava/lang/String;"),
        ];

        for a in &operands {
            for b in &operands {
                if a.complies_with(b, &resolver).unwrap() || b.complies_with(a, &resolver).unwrap() {
                    continue;
                }
                let ab = a.merge_with(b, &resolver).unwrap();
                let ba = b.merge_with(a, &resolver).unwrap();
                assert_eq!(ab, ba, "{} join {} is symmetric", a, b);
                let joined = ab.expect("references always join");
                assert!(
                    a.complies_with(&joined, &resolver).unwrap(),
                    "{} <: {} join {}",
                    a,
                    a,
                    b
                );
                assert!(
                    b.complies_with(&joined, &resolver).unwrap(),
                    "{} <: {} join {}",
                    b,
                    a,
                    b
                );
            }
        }

        assert_eq!(
            Operand::Reference(named("pkg/Left"))
                .merge_with(&Operand::Reference(named("pkg/Right")), &resolver)
                .unwrap(),
            Some(Operand::THROWABLE),
            "nearest common ancestor"
        );
        assert_eq!(
            parse("[I").merge_with(&parse("[Ljava/lang/String;"), &resolver).unwrap(),
            Some(Operand::OBJECT)
        );
        assert_eq!(
            parse("[[I").merge_with(&parse("[Ljava/lang/String;"), &resolver).unwrap(),
            Some(parse("[Ljava/lang/Object;"))
        );
    }

    #[test]
    fn failed_joins() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();
        let resolver = TypeResolver::new(&class_graph);

        let uninit = Operand::UninitializedThis(BinaryName::OBJECT);
        assert_eq!(Operand::INT.merge_with(&Operand::FLOAT, &resolver).unwrap(), None);
        assert_eq!(Operand::INT.merge_with(&Operand::OBJECT, &resolver).unwrap(), None);
        assert_eq!(uninit.merge_with(&Operand::OBJECT, &resolver).unwrap(), None);
        assert_eq!(Operand::Null.merge_with(&uninit, &resolver).unwrap(), None);
        assert_eq!(
            Operand::ReturnAddress {
                targets: vec![4],
                subroutine: 9
            }
            .merge_with(
                &Operand::ReturnAddress {
                    targets: vec![1],
                    subroutine: 9
                },
                &resolver
            )
            .unwrap(),
            Some(Operand::ReturnAddress {
                targets: vec![1, 4],
                subroutine: 9
            }),
            "return addresses of one subroutine collect their targets"
        );
    }
}
