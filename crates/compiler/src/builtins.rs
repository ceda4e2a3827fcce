//! Driver-injected global constants.
//!
//! Primitive type names, `true`/`false`, builtin functions and the target
//! flags live in a flat list that declaration search falls through to after
//! the scope chain is exhausted.

use bumpalo::Bump;

use crate::config::{Architecture, BuildConfig, Os, Target, Toolchain};
use crate::constant::{AnyConstantValue, GlobalConstant};
use crate::types::{AnyType, FloatType, Integer, RegisterSize};

fn constant<'a>(name: &'a str, ty: AnyType<'a>, value: AnyConstantValue<'a>) -> GlobalConstant<'a> {
    GlobalConstant { name, ty, value }
}

fn type_constant<'a>(name: &'a str, ty: AnyType<'a>) -> GlobalConstant<'a> {
    constant(name, AnyType::Type, AnyConstantValue::Type(ty))
}

fn integer_type<'a>(name: &'a str, size: RegisterSize, is_signed: bool) -> GlobalConstant<'a> {
    type_constant(name, AnyType::Integer(Integer { size, is_signed }))
}

fn boolean_flag<'a>(name: &'a str, value: bool) -> GlobalConstant<'a> {
    constant(name, AnyType::Boolean, AnyConstantValue::Boolean(value))
}

fn builtin_function<'a>(name: &'a str) -> GlobalConstant<'a> {
    constant(
        name,
        AnyType::BuiltinFunction,
        AnyConstantValue::BuiltinFunction(name),
    )
}

/// Build the global-constant table for a target.
pub fn build_global_constants<'a>(arena: &'a Bump, target: Target) -> &'a [GlobalConstant<'a>] {
    let sizes = target.architecture_sizes();

    let constants = vec![
        integer_type("u8", RegisterSize::Size8, false),
        integer_type("u16", RegisterSize::Size16, false),
        integer_type("u32", RegisterSize::Size32, false),
        integer_type("u64", RegisterSize::Size64, false),
        integer_type("i8", RegisterSize::Size8, true),
        integer_type("i16", RegisterSize::Size16, true),
        integer_type("i32", RegisterSize::Size32, true),
        integer_type("i64", RegisterSize::Size64, true),
        integer_type("usize", sizes.address_size, false),
        integer_type("isize", sizes.address_size, true),
        integer_type("uint", sizes.default_integer_size, false),
        integer_type("int", sizes.default_integer_size, true),
        type_constant("bool", AnyType::Boolean),
        type_constant("void", AnyType::Void),
        type_constant(
            "f32",
            AnyType::FloatType(FloatType {
                size: RegisterSize::Size32,
            }),
        ),
        type_constant(
            "f64",
            AnyType::FloatType(FloatType {
                size: RegisterSize::Size64,
            }),
        ),
        type_constant(
            "float",
            AnyType::FloatType(FloatType {
                size: sizes.default_float_size,
            }),
        ),
        constant("true", AnyType::Boolean, AnyConstantValue::Boolean(true)),
        constant("false", AnyType::Boolean, AnyConstantValue::Boolean(false)),
        type_constant("type", AnyType::Type),
        constant("undef", AnyType::Undef, AnyConstantValue::Undef),
        builtin_function("size_of"),
        builtin_function("type_of"),
        builtin_function("memcpy"),
        boolean_flag("X86", target.architecture == Architecture::X86),
        boolean_flag("X64", target.architecture == Architecture::X64),
        boolean_flag("WASM32", target.architecture == Architecture::Wasm32),
        boolean_flag("WINDOWS", target.os == Os::Windows),
        boolean_flag("LINUX", target.os == Os::Linux),
        boolean_flag("EMSCRIPTEN", target.os == Os::Emscripten),
        boolean_flag("GNU", target.toolchain == Toolchain::Gnu),
        boolean_flag("MSVC", target.toolchain == Toolchain::Msvc),
        boolean_flag("DEBUG", target.build_config == BuildConfig::Debug),
        boolean_flag("RELEASE", target.build_config == BuildConfig::Release),
    ];

    arena.alloc_slice_copy(&constants)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_target() -> Target {
        Target {
            architecture: Architecture::X64,
            os: Os::Linux,
            toolchain: Toolchain::Gnu,
            build_config: BuildConfig::Debug,
        }
    }

    fn lookup<'a>(
        constants: &'a [GlobalConstant<'a>],
        name: &str,
    ) -> Option<&'a GlobalConstant<'a>> {
        constants.iter().find(|constant| constant.name == name)
    }

    #[test]
    fn primitive_types_are_registered() {
        let arena = Bump::new();
        let constants = build_global_constants(&arena, test_target());

        let u8_constant = lookup(constants, "u8").unwrap();
        assert_eq!(u8_constant.ty, AnyType::Type);
        assert_eq!(
            u8_constant.value.unwrap_type(),
            AnyType::Integer(Integer {
                size: RegisterSize::Size8,
                is_signed: false,
            })
        );

        // usize follows the target's address size.
        let usize_constant = lookup(constants, "usize").unwrap();
        assert_eq!(
            usize_constant.value.unwrap_type(),
            AnyType::Integer(Integer {
                size: RegisterSize::Size64,
                is_signed: false,
            })
        );
    }

    #[test]
    fn target_flags_reflect_the_target() {
        let arena = Bump::new();
        let constants = build_global_constants(&arena, test_target());

        assert!(lookup(constants, "LINUX").unwrap().value.unwrap_boolean());
        assert!(!lookup(constants, "WINDOWS").unwrap().value.unwrap_boolean());
        assert!(lookup(constants, "X64").unwrap().value.unwrap_boolean());
        assert!(!lookup(constants, "WASM32").unwrap().value.unwrap_boolean());
        assert!(lookup(constants, "DEBUG").unwrap().value.unwrap_boolean());
        assert!(!lookup(constants, "RELEASE").unwrap().value.unwrap_boolean());
    }

    #[test]
    fn builtins_are_registered() {
        let arena = Bump::new();
        let constants = build_global_constants(&arena, test_target());

        for name in ["size_of", "type_of", "memcpy"] {
            let builtin = lookup(constants, name).unwrap();
            assert_eq!(builtin.ty, AnyType::BuiltinFunction);
        }
    }
}
