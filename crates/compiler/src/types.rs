//! The type model.
//!
//! Types are value types: every payload is either plain data or an arena
//! reference, so [`AnyType`] is `Copy` and freely embedded in constants, job
//! payloads and scope entries. Equality is structural — tags must match and
//! payloads compare recursively; aggregate types additionally require
//! identity of their originating definition node.

use crate::ast::{EnumDefinition, StructDefinition};
use crate::constant::ConstantScope;

/// Width of an integer or float register slot, in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RegisterSize {
    Size8,
    Size16,
    Size32,
    Size64,
}

impl RegisterSize {
    pub fn byte_size(self) -> u64 {
        match self {
            RegisterSize::Size8 => 1,
            RegisterSize::Size16 => 2,
            RegisterSize::Size32 => 4,
            RegisterSize::Size64 => 8,
        }
    }

    pub fn bit_size(self) -> u64 {
        self.byte_size() * 8
    }
}

/// Target-dependent size configuration, fixed at startup.
#[derive(Debug, Clone, Copy)]
pub struct ArchitectureSizes {
    pub address_size: RegisterSize,
    pub default_integer_size: RegisterSize,
    pub default_float_size: RegisterSize,
    pub boolean_size: RegisterSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingConvention {
    Default,
    StdCall,
}

impl std::fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallingConvention::Default => write!(f, "default"),
            CallingConvention::StdCall => write!(f, "stdcall"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Integer {
    pub size: RegisterSize,
    pub is_signed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatType {
    pub size: RegisterSize,
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionTypeType<'a> {
    pub parameters: &'a [AnyType<'a>],
    pub return_type: &'a AnyType<'a>,
    pub calling_convention: CallingConvention,
}

#[derive(Debug, Clone, Copy)]
pub struct StructTypeMember<'a> {
    pub name: &'a str,
    pub member_type: AnyType<'a>,
}

#[derive(Debug, Clone, Copy)]
pub struct StructType<'a> {
    pub definition: &'a StructDefinition<'a>,
    pub members: &'a [StructTypeMember<'a>],
}

/// The transient type of a struct literal before coercion to a concrete
/// struct, array, or union.
#[derive(Debug, Clone, Copy)]
pub struct UndeterminedStruct<'a> {
    pub members: &'a [StructTypeMember<'a>],
}

#[derive(Debug, Clone, Copy)]
pub struct PolymorphicStruct<'a> {
    pub definition: &'a StructDefinition<'a>,
    pub parameter_types: &'a [AnyType<'a>],
    pub parent: &'a ConstantScope<'a>,
}

#[derive(Debug, Clone, Copy)]
pub struct EnumTypeVariant<'a> {
    pub name: &'a str,
    pub value: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct EnumType<'a> {
    pub definition: &'a EnumDefinition<'a>,
    pub backing: Integer,
    pub variants: &'a [EnumTypeVariant<'a>],
}

#[derive(Debug, Clone, Copy)]
pub enum AnyType<'a> {
    FunctionType(FunctionTypeType<'a>),
    PolymorphicFunction,
    BuiltinFunction,
    Integer(Integer),
    UndeterminedInteger,
    Boolean,
    FloatType(FloatType),
    UndeterminedFloat,
    /// First-class types (the type of type expressions).
    Type,
    Void,
    Undef,
    Pointer(&'a AnyType<'a>),
    /// Runtime-length array: two words, pointer then length.
    ArrayType(&'a AnyType<'a>),
    StaticArray {
        length: u64,
        element_type: &'a AnyType<'a>,
    },
    StructType(StructType<'a>),
    PolymorphicStruct(PolymorphicStruct<'a>),
    UndeterminedStruct(UndeterminedStruct<'a>),
    Enum(EnumType<'a>),
    /// The value produced by an import.
    FileModule,
}

impl<'a> PartialEq for AnyType<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (*self, *other) {
            (AnyType::FunctionType(a), AnyType::FunctionType(b)) => {
                a.parameters == b.parameters
                    && *a.return_type == *b.return_type
                    && a.calling_convention == b.calling_convention
            }
            (AnyType::PolymorphicFunction, AnyType::PolymorphicFunction) => true,
            (AnyType::BuiltinFunction, AnyType::BuiltinFunction) => true,
            (AnyType::Integer(a), AnyType::Integer(b)) => a == b,
            (AnyType::UndeterminedInteger, AnyType::UndeterminedInteger) => true,
            (AnyType::Boolean, AnyType::Boolean) => true,
            (AnyType::FloatType(a), AnyType::FloatType(b)) => a == b,
            (AnyType::UndeterminedFloat, AnyType::UndeterminedFloat) => true,
            (AnyType::Type, AnyType::Type) => true,
            (AnyType::Void, AnyType::Void) => true,
            (AnyType::Undef, AnyType::Undef) => true,
            (AnyType::Pointer(a), AnyType::Pointer(b)) => *a == *b,
            (AnyType::ArrayType(a), AnyType::ArrayType(b)) => *a == *b,
            (
                AnyType::StaticArray {
                    length: a_length,
                    element_type: a_element,
                },
                AnyType::StaticArray {
                    length: b_length,
                    element_type: b_element,
                },
            ) => a_length == b_length && *a_element == *b_element,
            (AnyType::StructType(a), AnyType::StructType(b)) => {
                std::ptr::eq(a.definition, b.definition) && a.members == b.members
            }
            (AnyType::PolymorphicStruct(a), AnyType::PolymorphicStruct(b)) => {
                std::ptr::eq(a.definition, b.definition)
            }
            (AnyType::UndeterminedStruct(a), AnyType::UndeterminedStruct(b)) => {
                a.members == b.members
            }
            (AnyType::Enum(a), AnyType::Enum(b)) => std::ptr::eq(a.definition, b.definition),
            (AnyType::FileModule, AnyType::FileModule) => true,
            _ => false,
        }
    }
}

impl<'a> Eq for AnyType<'a> {}

impl<'a> PartialEq for StructTypeMember<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.member_type == other.member_type
    }
}

impl<'a> AnyType<'a> {
    /// Whether values of this type can exist at runtime. False for the
    /// undetermined family, first-class types, modules, polymorphic values,
    /// function types used as values, and void.
    pub fn is_runtime_type(&self) -> bool {
        matches!(
            self,
            AnyType::Integer(_)
                | AnyType::Boolean
                | AnyType::FloatType(_)
                | AnyType::Pointer(_)
                | AnyType::ArrayType(_)
                | AnyType::StaticArray { .. }
                | AnyType::StructType(_)
                | AnyType::Enum(_)
        )
    }

    /// Byte size on the given target. Panics for non-runtime types; callers
    /// guard with [`AnyType::is_runtime_type`].
    pub fn size(&self, sizes: ArchitectureSizes) -> u64 {
        match *self {
            AnyType::Integer(integer) => integer.size.byte_size(),
            AnyType::Boolean => sizes.boolean_size.byte_size(),
            AnyType::FloatType(float_type) => float_type.size.byte_size(),
            AnyType::Pointer(_) => sizes.address_size.byte_size(),
            AnyType::ArrayType(_) => 2 * sizes.address_size.byte_size(),
            AnyType::StaticArray {
                length,
                element_type,
            } => length * element_type.size(sizes),
            AnyType::StructType(struct_type) => struct_type.size(sizes),
            AnyType::Enum(enum_type) => enum_type.backing.size.byte_size(),
            _ => panic!("type '{self}' has no runtime size"),
        }
    }

    /// Byte alignment on the given target. Panics for non-runtime types.
    pub fn alignment(&self, sizes: ArchitectureSizes) -> u64 {
        match *self {
            AnyType::Integer(integer) => integer.size.byte_size(),
            AnyType::Boolean => sizes.boolean_size.byte_size(),
            AnyType::FloatType(float_type) => float_type.size.byte_size(),
            AnyType::Pointer(_) => sizes.address_size.byte_size(),
            AnyType::ArrayType(_) => sizes.address_size.byte_size(),
            AnyType::StaticArray { element_type, .. } => element_type.alignment(sizes),
            AnyType::StructType(struct_type) => struct_type.alignment(sizes),
            AnyType::Enum(enum_type) => enum_type.backing.size.byte_size(),
            _ => panic!("type '{self}' has no runtime alignment"),
        }
    }
}

fn align_to(offset: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return offset;
    }
    offset.div_ceil(alignment) * alignment
}

impl<'a> StructType<'a> {
    pub fn is_union(&self) -> bool {
        self.definition.is_union
    }

    /// Byte offset of member `index`: the running size aligned to each
    /// member's alignment. All offsets are 0 under union layout.
    pub fn member_offset(&self, sizes: ArchitectureSizes, index: usize) -> u64 {
        if self.is_union() {
            return 0;
        }

        let mut offset = 0;
        for (i, member) in self.members.iter().enumerate() {
            offset = align_to(offset, member.member_type.alignment(sizes));
            if i == index {
                return offset;
            }
            offset += member.member_type.size(sizes);
        }

        panic!("struct member index {index} out of bounds");
    }

    pub fn alignment(&self, sizes: ArchitectureSizes) -> u64 {
        self.members
            .iter()
            .map(|member| member.member_type.alignment(sizes))
            .max()
            .unwrap_or(1)
    }

    pub fn size(&self, sizes: ArchitectureSizes) -> u64 {
        let unpadded = if self.is_union() {
            self.members
                .iter()
                .map(|member| member.member_type.size(sizes))
                .max()
                .unwrap_or(0)
        } else {
            match self.members.len().checked_sub(1) {
                Some(last) => {
                    self.member_offset(sizes, last) + self.members[last].member_type.size(sizes)
                }
                None => 0,
            }
        };

        align_to(unpadded, self.alignment(sizes))
    }
}

impl<'a> EnumType<'a> {
    pub fn variant_value(&self, name: &str) -> Option<u64> {
        self.variants
            .iter()
            .find(|variant| variant.name == name)
            .map(|variant| variant.value)
    }
}

impl<'a> std::fmt::Display for AnyType<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            AnyType::FunctionType(function_type) => {
                write!(f, "(")?;
                for (i, parameter) in function_type.parameters.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{parameter}")?;
                }
                write!(f, ") -> {}", function_type.return_type)
            }
            AnyType::PolymorphicFunction => write!(f, "{{polymorphic function}}"),
            AnyType::BuiltinFunction => write!(f, "{{builtin function}}"),
            AnyType::Integer(integer) => {
                let prefix = if integer.is_signed { 'i' } else { 'u' };
                write!(f, "{}{}", prefix, integer.size.bit_size())
            }
            AnyType::UndeterminedInteger => write!(f, "{{integer}}"),
            AnyType::Boolean => write!(f, "bool"),
            AnyType::FloatType(float_type) => write!(f, "f{}", float_type.size.bit_size()),
            AnyType::UndeterminedFloat => write!(f, "{{float}}"),
            AnyType::Type => write!(f, "type"),
            AnyType::Void => write!(f, "void"),
            AnyType::Undef => write!(f, "undef"),
            AnyType::Pointer(pointed) => write!(f, "*{pointed}"),
            AnyType::ArrayType(element) => write!(f, "[]{element}"),
            AnyType::StaticArray {
                length,
                element_type,
            } => write!(f, "[{length}]{element_type}"),
            AnyType::StructType(struct_type) => write!(f, "{}", struct_type.definition.name.text),
            AnyType::PolymorphicStruct(polymorphic) => {
                write!(f, "{}", polymorphic.definition.name.text)
            }
            AnyType::UndeterminedStruct(_) => write!(f, "{{struct}}"),
            AnyType::Enum(enum_type) => write!(f, "{}", enum_type.definition.name.text),
            AnyType::FileModule => write!(f, "{{module}}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FileRange, Identifier, StructDefinition};
    use bumpalo::Bump;

    pub(crate) const TEST_SIZES: ArchitectureSizes = ArchitectureSizes {
        address_size: RegisterSize::Size64,
        default_integer_size: RegisterSize::Size64,
        default_float_size: RegisterSize::Size32,
        boolean_size: RegisterSize::Size8,
    };

    fn integer(size: RegisterSize, is_signed: bool) -> AnyType<'static> {
        AnyType::Integer(Integer { size, is_signed })
    }

    fn test_struct<'a>(
        arena: &'a Bump,
        is_union: bool,
        members: &[(&'a str, AnyType<'a>)],
    ) -> AnyType<'a> {
        let definition = arena.alloc(StructDefinition {
            name: Identifier {
                text: "Test",
                range: FileRange::default(),
            },
            is_union,
            parameters: &[],
            members: &[],
            range: FileRange::default(),
        });

        let members = arena.alloc_slice_copy(
            &members
                .iter()
                .map(|&(name, member_type)| StructTypeMember { name, member_type })
                .collect::<Vec<_>>(),
        );

        AnyType::StructType(StructType {
            definition,
            members,
        })
    }

    #[test]
    fn equality_is_an_equivalence_on_sample_types() {
        let arena = Bump::new();
        let u8_type = integer(RegisterSize::Size8, false);
        let samples = [
            u8_type,
            integer(RegisterSize::Size8, true),
            integer(RegisterSize::Size64, false),
            AnyType::Boolean,
            AnyType::Void,
            AnyType::UndeterminedInteger,
            AnyType::Pointer(arena.alloc(u8_type)),
            AnyType::Pointer(arena.alloc(AnyType::Boolean)),
            AnyType::ArrayType(arena.alloc(u8_type)),
            AnyType::StaticArray {
                length: 4,
                element_type: arena.alloc(u8_type),
            },
        ];

        for a in &samples {
            assert_eq!(a, a, "reflexivity failed for {a}");
            for b in &samples {
                assert_eq!(a == b, b == a, "symmetry failed for {a} / {b}");
                for c in &samples {
                    if a == b && b == c {
                        assert_eq!(a, c, "transitivity failed for {a} / {b} / {c}");
                    }
                }
            }
        }
    }

    #[test]
    fn pointer_equality_follows_pointee() {
        let arena = Bump::new();
        let a = AnyType::Pointer(arena.alloc(integer(RegisterSize::Size8, false)));
        let b = AnyType::Pointer(arena.alloc(integer(RegisterSize::Size8, false)));
        let c = AnyType::Pointer(arena.alloc(integer(RegisterSize::Size16, false)));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn struct_layout_inserts_padding() {
        let arena = Bump::new();
        let ty = test_struct(
            &arena,
            false,
            &[
                ("a", integer(RegisterSize::Size8, false)),
                ("b", integer(RegisterSize::Size32, false)),
                ("c", integer(RegisterSize::Size8, false)),
            ],
        );

        let AnyType::StructType(struct_type) = ty else {
            unreachable!();
        };
        assert_eq!(struct_type.member_offset(TEST_SIZES, 0), 0);
        assert_eq!(struct_type.member_offset(TEST_SIZES, 1), 4);
        assert_eq!(struct_type.member_offset(TEST_SIZES, 2), 8);
        assert_eq!(ty.size(TEST_SIZES), 12);
        assert_eq!(ty.alignment(TEST_SIZES), 4);
    }

    #[test]
    fn union_layout_overlays_members() {
        let arena = Bump::new();
        let ty = test_struct(
            &arena,
            true,
            &[
                ("a", integer(RegisterSize::Size64, true)),
                ("b", integer(RegisterSize::Size8, false)),
            ],
        );

        let AnyType::StructType(struct_type) = ty else {
            unreachable!();
        };
        assert_eq!(struct_type.member_offset(TEST_SIZES, 0), 0);
        assert_eq!(struct_type.member_offset(TEST_SIZES, 1), 0);
        assert_eq!(ty.size(TEST_SIZES), 8);
    }

    #[test]
    fn array_types_are_two_words() {
        let arena = Bump::new();
        let ty = AnyType::ArrayType(arena.alloc(integer(RegisterSize::Size8, false)));
        assert_eq!(ty.size(TEST_SIZES), 16);
        assert_eq!(ty.alignment(TEST_SIZES), 8);
    }

    #[test]
    fn descriptions() {
        let arena = Bump::new();
        assert_eq!(integer(RegisterSize::Size32, true).to_string(), "i32");
        assert_eq!(integer(RegisterSize::Size8, false).to_string(), "u8");
        assert_eq!(AnyType::UndeterminedInteger.to_string(), "{integer}");
        assert_eq!(
            AnyType::Pointer(arena.alloc(AnyType::Boolean)).to_string(),
            "*bool"
        );
        assert_eq!(
            AnyType::StaticArray {
                length: 3,
                element_type: arena.alloc(integer(RegisterSize::Size8, false)),
            }
            .to_string(),
            "[3]u8"
        );
    }
}
