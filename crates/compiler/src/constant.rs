//! Constant values, scopes, coercion and the constant evaluator.
//!
//! One expression-evaluation engine serves every compile-time context:
//! constant definitions, static-if conditions, type expressions, polymorphic
//! parameters and tag arguments. It shares its coercion rules with the IR
//! generator's runtime path so the two cannot drift on what converts to what.
//!
//! The original design's `probing` flag (suppress the diagnostic, keep the
//! failure) is subsumed here by error-as-value: probing callers simply discard
//! the returned error.

use bumpalo::Bump;

use crate::ast::{
    BinaryOperator, EnumDefinition, Expression, FileRange, FunctionDeclaration, Statement,
    StaticIf, StructDefinition, UnaryOperator,
};
use crate::error::{done, error, wait, CompileError, DelayedResult};
use crate::jobs::{JobKind, JobList, JobState, PolymorphicFunctionMatch, PolymorphicStructMatch};
use crate::ready;
use crate::types::{
    AnyType, CallingConvention, EnumType, EnumTypeVariant, FloatType, FunctionTypeType, Integer,
    PolymorphicStruct, RegisterSize, StructType, StructTypeMember, UndeterminedStruct,
};

// ---------------------------------------------------------------------------
// Constant values

#[derive(Debug, Clone, Copy)]
pub struct FunctionConstant<'a> {
    pub declaration: &'a FunctionDeclaration<'a>,
    pub body_scope: &'a ConstantScope<'a>,
    pub child_scopes: &'a [&'a ConstantScope<'a>],
    pub is_external: bool,
    pub external_libraries: &'a [&'a str],
    pub is_no_mangle: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PolymorphicFunctionConstant<'a> {
    pub declaration: &'a FunctionDeclaration<'a>,
    pub scope: &'a ConstantScope<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayConstant {
    pub pointer: u64,
    pub length: u64,
}

#[derive(Debug, Clone, Copy)]
pub enum AnyConstantValue<'a> {
    Function(FunctionConstant<'a>),
    BuiltinFunction(&'a str),
    PolymorphicFunction(PolymorphicFunctionConstant<'a>),
    Integer(u64),
    Float(f64),
    Boolean(bool),
    Void,
    Undef,
    Pointer(u64),
    Array(ArrayConstant),
    StaticArray(&'a [AnyConstantValue<'a>]),
    /// Members in the same order as the type's member list.
    Struct(&'a [AnyConstantValue<'a>]),
    FileModule(&'a ConstantScope<'a>),
    Type(AnyType<'a>),
}

impl<'a> AnyConstantValue<'a> {
    pub fn unwrap_integer(self) -> u64 {
        match self {
            AnyConstantValue::Integer(value) => value,
            _ => panic!("expected an integer constant"),
        }
    }

    pub fn unwrap_float(self) -> f64 {
        match self {
            AnyConstantValue::Float(value) => value,
            _ => panic!("expected a float constant"),
        }
    }

    pub fn unwrap_boolean(self) -> bool {
        match self {
            AnyConstantValue::Boolean(value) => value,
            _ => panic!("expected a boolean constant"),
        }
    }

    pub fn unwrap_pointer(self) -> u64 {
        match self {
            AnyConstantValue::Pointer(value) => value,
            _ => panic!("expected a pointer constant"),
        }
    }

    pub fn unwrap_array(self) -> ArrayConstant {
        match self {
            AnyConstantValue::Array(value) => value,
            _ => panic!("expected an array constant"),
        }
    }

    pub fn unwrap_static_array(self) -> &'a [AnyConstantValue<'a>] {
        match self {
            AnyConstantValue::StaticArray(elements) => elements,
            _ => panic!("expected a static array constant"),
        }
    }

    pub fn unwrap_struct(self) -> &'a [AnyConstantValue<'a>] {
        match self {
            AnyConstantValue::Struct(members) => members,
            _ => panic!("expected a struct constant"),
        }
    }

    pub fn unwrap_function(self) -> FunctionConstant<'a> {
        match self {
            AnyConstantValue::Function(value) => value,
            _ => panic!("expected a function constant"),
        }
    }

    pub fn unwrap_polymorphic_function(self) -> PolymorphicFunctionConstant<'a> {
        match self {
            AnyConstantValue::PolymorphicFunction(value) => value,
            _ => panic!("expected a polymorphic function constant"),
        }
    }

    pub fn unwrap_builtin_function(self) -> &'a str {
        match self {
            AnyConstantValue::BuiltinFunction(name) => name,
            _ => panic!("expected a builtin function constant"),
        }
    }

    pub fn unwrap_file_module(self) -> &'a ConstantScope<'a> {
        match self {
            AnyConstantValue::FileModule(scope) => scope,
            _ => panic!("expected a file module constant"),
        }
    }

    pub fn unwrap_type(self) -> AnyType<'a> {
        match self {
            AnyConstantValue::Type(ty) => ty,
            _ => panic!("expected a type constant"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TypedConstantValue<'a> {
    pub ty: AnyType<'a>,
    pub value: AnyConstantValue<'a>,
}

/// Structural equality on constant values. Function-like values compare by
/// declaration identity; aggregates compare element-wise.
pub fn constant_values_equal<'a>(a: AnyConstantValue<'a>, b: AnyConstantValue<'a>) -> bool {
    match (a, b) {
        (AnyConstantValue::Function(a), AnyConstantValue::Function(b)) => {
            std::ptr::eq(a.declaration, b.declaration)
        }
        (AnyConstantValue::PolymorphicFunction(a), AnyConstantValue::PolymorphicFunction(b)) => {
            std::ptr::eq(a.declaration, b.declaration)
        }
        (AnyConstantValue::BuiltinFunction(a), AnyConstantValue::BuiltinFunction(b)) => a == b,
        (AnyConstantValue::Integer(a), AnyConstantValue::Integer(b)) => a == b,
        (AnyConstantValue::Float(a), AnyConstantValue::Float(b)) => a == b,
        (AnyConstantValue::Boolean(a), AnyConstantValue::Boolean(b)) => a == b,
        (AnyConstantValue::Void, AnyConstantValue::Void) => true,
        (AnyConstantValue::Undef, AnyConstantValue::Undef) => true,
        (AnyConstantValue::Pointer(a), AnyConstantValue::Pointer(b)) => a == b,
        (AnyConstantValue::Array(a), AnyConstantValue::Array(b)) => a == b,
        (AnyConstantValue::StaticArray(a), AnyConstantValue::StaticArray(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(&a, &b)| constant_values_equal(a, b))
        }
        (AnyConstantValue::Struct(a), AnyConstantValue::Struct(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(&a, &b)| constant_values_equal(a, b))
        }
        (AnyConstantValue::FileModule(a), AnyConstantValue::FileModule(b)) => std::ptr::eq(a, b),
        (AnyConstantValue::Type(a), AnyConstantValue::Type(b)) => a == b,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Scopes

pub const DECLARATION_HASH_TABLE_SIZE: usize = 32;

pub fn calculate_string_hash(name: &str) -> u32 {
    let mut hash = 0u32;
    for byte in name.bytes() {
        hash = (byte as u32)
            .wrapping_add(hash << 6)
            .wrapping_add(hash << 16)
            .wrapping_sub(hash);
    }
    hash
}

/// Open-chained hash table over a statement list's named declarations.
#[derive(Debug, Clone, Copy)]
pub struct DeclarationTable<'a> {
    pub buckets: &'a [&'a [&'a Statement<'a>]],
}

impl<'a> DeclarationTable<'a> {
    pub fn empty() -> Self {
        DeclarationTable { buckets: &[] }
    }

    pub fn build(arena: &'a Bump, statements: &[&'a Statement<'a>]) -> Self {
        let mut buckets: Vec<Vec<&'a Statement<'a>>> =
            vec![Vec::new(); DECLARATION_HASH_TABLE_SIZE];

        for &statement in statements {
            if let Some(name) = declaration_name(statement) {
                let hash = calculate_string_hash(name);
                buckets[hash as usize % DECLARATION_HASH_TABLE_SIZE].push(statement);
            }
        }

        let buckets = arena.alloc_slice_fill_iter(
            buckets
                .into_iter()
                .map(|bucket| &*arena.alloc_slice_copy(&bucket)),
        );

        DeclarationTable { buckets }
    }

    pub fn search(&self, hash: u32, name: &str) -> Option<&'a Statement<'a>> {
        if self.buckets.is_empty() {
            return None;
        }

        let bucket = self.buckets[hash as usize % DECLARATION_HASH_TABLE_SIZE];
        bucket
            .iter()
            .copied()
            .find(|statement| declaration_name(statement) == Some(name))
    }
}

/// The name a statement binds at declaration-search time, if any.
pub fn declaration_name<'a>(statement: &'a Statement<'a>) -> Option<&'a str> {
    match statement {
        Statement::FunctionDeclaration(declaration) => Some(declaration.name.text),
        Statement::ConstantDefinition(definition) => Some(definition.name.text),
        Statement::StructDefinition(definition) => Some(definition.name.text),
        Statement::EnumDefinition(definition) => Some(definition.name.text),
        Statement::Import { name, .. } => Some(name),
        _ => None,
    }
}

/// Declarations visible from other files through an import.
pub fn is_declaration_public(statement: &Statement) -> bool {
    matches!(
        statement,
        Statement::FunctionDeclaration(_)
            | Statement::ConstantDefinition(_)
            | Statement::StructDefinition(_)
            | Statement::EnumDefinition(_)
    )
}

pub fn match_public_declaration(statement: &Statement, name: &str) -> bool {
    is_declaration_public(statement) && declaration_name(statement) == Some(name)
}

pub fn match_declaration(statement: &Statement, name: &str) -> bool {
    declaration_name(statement) == Some(name)
}

#[derive(Debug, Clone, Copy)]
pub struct ScopeConstant<'a> {
    pub name: &'a str,
    pub ty: AnyType<'a>,
    pub value: AnyConstantValue<'a>,
}

#[derive(Debug, Clone, Copy)]
pub struct ConstantScope<'a> {
    pub statements: &'a [&'a Statement<'a>],
    pub declarations: DeclarationTable<'a>,
    pub scope_constants: &'a [ScopeConstant<'a>],
    pub is_top_level: bool,
    pub parent: Option<&'a ConstantScope<'a>>,
    /// Set on top-level (file) scopes only; inner scopes inherit it.
    pub source_file_path: Option<&'a str>,
}

impl<'a> ConstantScope<'a> {
    pub fn file_path(&self) -> &'a str {
        let mut scope = self;
        loop {
            if let Some(path) = scope.source_file_path {
                return path;
            }
            match scope.parent {
                Some(parent) => scope = parent,
                None => return "<unknown>",
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GlobalConstant<'a> {
    pub name: &'a str,
    pub ty: AnyType<'a>,
    pub value: AnyConstantValue<'a>,
}

/// Process-wide configuration: driver-injected global constants plus target
/// architecture sizes. Immutable after initialization.
#[derive(Debug, Clone, Copy)]
pub struct GlobalInfo<'a> {
    pub global_constants: &'a [GlobalConstant<'a>],
    pub architecture_sizes: crate::types::ArchitectureSizes,
}

// ---------------------------------------------------------------------------
// Integer helpers

/// Truncate to the low bytes of the given size.
pub fn truncate_integer(value: u64, size: RegisterSize) -> u64 {
    match size {
        RegisterSize::Size8 => value as u8 as u64,
        RegisterSize::Size16 => value as u16 as u64,
        RegisterSize::Size32 => value as u32 as u64,
        RegisterSize::Size64 => value,
    }
}

/// Sign-extend the low bytes of the given size to 64 bits.
pub fn sign_extend_integer(value: u64, size: RegisterSize) -> u64 {
    match size {
        RegisterSize::Size8 => value as u8 as i8 as i64 as u64,
        RegisterSize::Size16 => value as u16 as i16 as i64 as u64,
        RegisterSize::Size32 => value as u32 as i32 as i64 as u64,
        RegisterSize::Size64 => value,
    }
}

/// Range-check a literal-like integer against a concrete integer type.
pub fn check_undetermined_integer_to_integer_coercion(
    scope: &ConstantScope,
    range: FileRange,
    target_type: Integer,
    value: i64,
) -> Result<(), CompileError> {
    let in_range = if target_type.is_signed {
        let (min, max): (i64, i64) = match target_type.size {
            RegisterSize::Size8 => (i8::MIN as i64, i8::MAX as i64),
            RegisterSize::Size16 => (i16::MIN as i64, i16::MAX as i64),
            RegisterSize::Size32 => (i32::MIN as i64, i32::MAX as i64),
            RegisterSize::Size64 => (i64::MIN, i64::MAX),
        };
        value >= min && value <= max
    } else if value < 0 {
        false
    } else {
        let max: u64 = match target_type.size {
            RegisterSize::Size8 => u8::MAX as u64,
            RegisterSize::Size16 => u16::MAX as u64,
            RegisterSize::Size32 => u32::MAX as u64,
            RegisterSize::Size64 => u64::MAX,
        };
        value as u64 <= max
    };

    if !in_range {
        return Err(error(
            scope,
            range,
            format!(
                "Constant '{}' cannot fit in '{}'. You must cast explicitly",
                value,
                AnyType::Integer(target_type)
            ),
        ));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Constant coercion

pub fn coerce_constant_to_integer_type<'a>(
    scope: &ConstantScope<'a>,
    range: FileRange,
    ty: AnyType<'a>,
    value: AnyConstantValue<'a>,
    target_type: Integer,
) -> Result<u64, CompileError> {
    match ty {
        AnyType::Integer(integer) => {
            if integer != target_type {
                return Err(error(
                    scope,
                    range,
                    format!(
                        "Cannot implicitly convert '{}' to '{}'",
                        AnyType::Integer(integer),
                        AnyType::Integer(target_type)
                    ),
                ));
            }
            Ok(value.unwrap_integer())
        }
        AnyType::UndeterminedInteger => {
            let integer_value = value.unwrap_integer();
            check_undetermined_integer_to_integer_coercion(
                scope,
                range,
                target_type,
                integer_value as i64,
            )?;
            Ok(integer_value)
        }
        _ => Err(error(
            scope,
            range,
            format!(
                "Cannot implicitly convert '{}' to '{}'",
                ty,
                AnyType::Integer(target_type)
            ),
        )),
    }
}

fn coerce_constant_to_undetermined_integer<'a>(
    scope: &ConstantScope<'a>,
    range: FileRange,
    ty: AnyType<'a>,
    value: AnyConstantValue<'a>,
) -> Result<u64, CompileError> {
    match ty {
        AnyType::Integer(integer) => Ok(truncate_integer(value.unwrap_integer(), integer.size)),
        AnyType::UndeterminedInteger => Ok(value.unwrap_integer()),
        _ => Err(error(
            scope,
            range,
            format!("Cannot implicitly convert '{ty}' to '{{integer}}'"),
        )),
    }
}

fn coerce_constant_to_pointer_type<'a>(
    scope: &ConstantScope<'a>,
    range: FileRange,
    ty: AnyType<'a>,
    value: AnyConstantValue<'a>,
    target_pointed: &'a AnyType<'a>,
) -> Result<u64, CompileError> {
    match ty {
        AnyType::UndeterminedInteger => Ok(value.unwrap_integer()),
        AnyType::Pointer(pointed) if *pointed == *target_pointed => Ok(value.unwrap_pointer()),
        _ => Err(error(
            scope,
            range,
            format!(
                "Cannot implicitly convert '{}' to '{}'",
                ty,
                AnyType::Pointer(target_pointed)
            ),
        )),
    }
}

/// Implicit coercion between constant values. Target kinds are tried in a
/// fixed precedence order; anything not explicitly convertible falls back to
/// exact type equality.
pub fn coerce_constant_to_type<'a>(
    info: GlobalInfo<'a>,
    arena: &'a Bump,
    scope: &ConstantScope<'a>,
    range: FileRange,
    ty: AnyType<'a>,
    value: AnyConstantValue<'a>,
    target_type: AnyType<'a>,
) -> Result<AnyConstantValue<'a>, CompileError> {
    let mismatch = || {
        Err(error(
            scope,
            range,
            format!("Cannot implicitly convert '{ty}' to '{target_type}'"),
        ))
    };

    match target_type {
        AnyType::Integer(integer) => {
            let integer_value =
                coerce_constant_to_integer_type(scope, range, ty, value, integer)?;
            Ok(AnyConstantValue::Integer(integer_value))
        }
        AnyType::UndeterminedInteger => {
            let integer_value = coerce_constant_to_undetermined_integer(scope, range, ty, value)?;
            Ok(AnyConstantValue::Integer(integer_value))
        }
        AnyType::FloatType(target_float) => match ty {
            AnyType::UndeterminedInteger => {
                Ok(AnyConstantValue::Float(value.unwrap_integer() as i64 as f64))
            }
            AnyType::FloatType(float_type) if float_type.size == target_float.size => {
                Ok(AnyConstantValue::Float(value.unwrap_float()))
            }
            AnyType::UndeterminedFloat => Ok(AnyConstantValue::Float(value.unwrap_float())),
            _ => mismatch(),
        },
        AnyType::UndeterminedFloat => match ty {
            AnyType::FloatType(float_type) => {
                let float_value = value.unwrap_float();
                let widened = match float_type.size {
                    RegisterSize::Size32 => float_value as f32 as f64,
                    RegisterSize::Size64 => float_value,
                    _ => panic!("invalid float size"),
                };
                Ok(AnyConstantValue::Float(widened))
            }
            AnyType::UndeterminedFloat => Ok(AnyConstantValue::Float(value.unwrap_float())),
            _ => mismatch(),
        },
        AnyType::Pointer(target_pointed) => {
            let pointer_value =
                coerce_constant_to_pointer_type(scope, range, ty, value, target_pointed)?;
            Ok(AnyConstantValue::Pointer(pointer_value))
        }
        AnyType::ArrayType(target_element) => match ty {
            AnyType::ArrayType(element) if *element == *target_element => Ok(value),
            AnyType::StaticArray { element_type, .. } => {
                if *element_type != *target_element {
                    return mismatch();
                }
                Ok(value)
            }
            AnyType::UndeterminedStruct(undetermined) => {
                if undetermined.members.len() == 2
                    && undetermined.members[0].name == "pointer"
                    && undetermined.members[1].name == "length"
                {
                    let members = value.unwrap_struct();

                    let pointer = coerce_constant_to_pointer_type(
                        scope,
                        range,
                        undetermined.members[0].member_type,
                        members[0],
                        target_element,
                    );

                    if let Ok(pointer) = pointer {
                        let length = coerce_constant_to_integer_type(
                            scope,
                            range,
                            undetermined.members[1].member_type,
                            members[1],
                            Integer {
                                size: info.architecture_sizes.address_size,
                                is_signed: false,
                            },
                        );

                        if let Ok(length) = length {
                            return Ok(AnyConstantValue::Array(ArrayConstant { pointer, length }));
                        }
                    }
                }

                mismatch()
            }
            _ => mismatch(),
        },
        AnyType::StructType(target_struct) => {
            if let AnyType::UndeterminedStruct(undetermined) = ty {
                if target_struct.is_union() {
                    // Constant-context union coercion has no value
                    // representation; only the runtime path supports it.
                    return mismatch();
                }

                if undetermined.members.len() != target_struct.members.len() {
                    return mismatch();
                }

                let names_match = undetermined
                    .members
                    .iter()
                    .zip(target_struct.members.iter())
                    .all(|(a, b)| a.name == b.name);
                if !names_match {
                    return mismatch();
                }

                let member_values = value.unwrap_struct();
                let mut coerced = Vec::with_capacity(member_values.len());
                for (i, &member_value) in member_values.iter().enumerate() {
                    coerced.push(coerce_constant_to_type(
                        info,
                        arena,
                        scope,
                        range,
                        undetermined.members[i].member_type,
                        member_value,
                        target_struct.members[i].member_type,
                    )?);
                }

                return Ok(AnyConstantValue::Struct(arena.alloc_slice_copy(&coerced)));
            }

            if ty == target_type {
                return Ok(value);
            }

            mismatch()
        }
        _ => {
            if ty == target_type {
                return Ok(value);
            }

            mismatch()
        }
    }
}

/// Default a transient literal type to its concrete runtime type.
pub fn coerce_to_default_type<'a>(
    info: GlobalInfo<'a>,
    scope: &ConstantScope<'a>,
    range: FileRange,
    ty: AnyType<'a>,
) -> Result<AnyType<'a>, CompileError> {
    match ty {
        AnyType::UndeterminedInteger => Ok(AnyType::Integer(Integer {
            size: info.architecture_sizes.default_integer_size,
            is_signed: true,
        })),
        AnyType::UndeterminedFloat => Ok(AnyType::FloatType(FloatType {
            size: info.architecture_sizes.default_float_size,
        })),
        AnyType::UndeterminedStruct(_) => Err(error(
            scope,
            range,
            "Undetermined struct types cannot exist at runtime",
        )),
        _ => Ok(ty),
    }
}

// ---------------------------------------------------------------------------
// Constant operations

pub fn evaluate_constant_index<'a>(
    info: GlobalInfo<'a>,
    scope: &ConstantScope<'a>,
    ty: AnyType<'a>,
    value: AnyConstantValue<'a>,
    range: FileRange,
    index_ty: AnyType<'a>,
    index_value: AnyConstantValue<'a>,
    index_range: FileRange,
) -> Result<TypedConstantValue<'a>, CompileError> {
    let index = coerce_constant_to_integer_type(
        scope,
        index_range,
        index_ty,
        index_value,
        Integer {
            size: info.architecture_sizes.address_size,
            is_signed: false,
        },
    )?;

    match ty {
        AnyType::ArrayType(element_type) => match value {
            AnyConstantValue::StaticArray(elements) => {
                if index >= elements.len() as u64 {
                    return Err(error(
                        scope,
                        index_range,
                        format!("Array index {index} out of bounds"),
                    ));
                }

                Ok(TypedConstantValue {
                    ty: *element_type,
                    value: elements[index as usize],
                })
            }
            _ => Err(error(
                scope,
                range,
                "Cannot index an array with non-constant elements in a constant context",
            )),
        },
        AnyType::StaticArray {
            length,
            element_type,
        } => {
            if index >= length {
                return Err(error(
                    scope,
                    index_range,
                    format!("Array index {index} out of bounds"),
                ));
            }

            let elements = value.unwrap_static_array();
            debug_assert_eq!(elements.len() as u64, length);

            Ok(TypedConstantValue {
                ty: *element_type,
                value: elements[index as usize],
            })
        }
        _ => Err(error(scope, range, format!("Cannot index {ty}"))),
    }
}

/// The combined operand type of a binary operation, before defaulting.
pub fn determine_binary_operation_type<'a>(
    scope: &ConstantScope<'a>,
    range: FileRange,
    left: AnyType<'a>,
    right: AnyType<'a>,
) -> Result<AnyType<'a>, CompileError> {
    let mismatch = || {
        Err(error(
            scope,
            range,
            format!("Mismatched types '{left}' and '{right}'"),
        ))
    };

    if matches!(left, AnyType::Enum(_)) || matches!(right, AnyType::Enum(_)) {
        if left == right {
            return Ok(left);
        }
        return mismatch();
    }

    if matches!(left, AnyType::Boolean) || matches!(right, AnyType::Boolean) {
        return Ok(left);
    }

    if matches!(left, AnyType::Pointer(_)) {
        return Ok(left);
    }
    if matches!(right, AnyType::Pointer(_)) {
        return Ok(right);
    }

    if let (AnyType::Integer(left_integer), AnyType::Integer(right_integer)) = (left, right) {
        return Ok(AnyType::Integer(Integer {
            size: left_integer.size.max(right_integer.size),
            is_signed: left_integer.is_signed || right_integer.is_signed,
        }));
    }

    if let (AnyType::FloatType(left_float), AnyType::FloatType(right_float)) = (left, right) {
        return Ok(AnyType::FloatType(FloatType {
            size: left_float.size.max(right_float.size),
        }));
    }

    if matches!(left, AnyType::FloatType(_)) {
        return Ok(left);
    }
    if matches!(right, AnyType::FloatType(_)) {
        return Ok(right);
    }
    if matches!(left, AnyType::UndeterminedFloat) || matches!(right, AnyType::UndeterminedFloat) {
        return Ok(left);
    }
    if matches!(left, AnyType::Integer(_)) {
        return Ok(left);
    }
    if matches!(right, AnyType::Integer(_)) {
        return Ok(right);
    }
    if matches!(left, AnyType::UndeterminedInteger)
        || matches!(right, AnyType::UndeterminedInteger)
    {
        return Ok(left);
    }

    mismatch()
}

pub fn evaluate_constant_binary_operation<'a>(
    info: GlobalInfo<'a>,
    arena: &'a Bump,
    scope: &ConstantScope<'a>,
    range: FileRange,
    operator: BinaryOperator,
    left_range: FileRange,
    left_ty: AnyType<'a>,
    left_value: AnyConstantValue<'a>,
    right_range: FileRange,
    right_ty: AnyType<'a>,
    right_value: AnyConstantValue<'a>,
) -> Result<TypedConstantValue<'a>, CompileError> {
    let ty = determine_binary_operation_type(scope, range, left_ty, right_ty)?;

    let left = coerce_constant_to_type(info, arena, scope, left_range, left_ty, left_value, ty)?;
    let right =
        coerce_constant_to_type(info, arena, scope, right_range, right_ty, right_value, ty)?;

    let boolean = |value: bool| TypedConstantValue {
        ty: AnyType::Boolean,
        value: AnyConstantValue::Boolean(value),
    };

    match ty {
        AnyType::Integer(integer) => {
            let left = left.unwrap_integer();
            let right = right.unwrap_integer();

            let arithmetic = |value: u64| TypedConstantValue {
                ty: AnyType::Integer(integer),
                value: AnyConstantValue::Integer(value),
            };

            match operator {
                BinaryOperator::Addition => Ok(arithmetic(left.wrapping_add(right))),
                BinaryOperator::Subtraction => Ok(arithmetic(left.wrapping_sub(right))),
                BinaryOperator::Multiplication => {
                    let value = if integer.is_signed {
                        (left as i64).wrapping_mul(right as i64) as u64
                    } else {
                        left.wrapping_mul(right)
                    };
                    Ok(arithmetic(value))
                }
                BinaryOperator::Division => {
                    if right == 0 {
                        return Err(error(scope, range, "Division by zero"));
                    }
                    let value = if integer.is_signed {
                        (left as i64).wrapping_div(right as i64) as u64
                    } else {
                        left / right
                    };
                    Ok(arithmetic(value))
                }
                BinaryOperator::Modulo => {
                    if right == 0 {
                        return Err(error(scope, range, "Division by zero"));
                    }
                    let value = if integer.is_signed {
                        (left as i64).wrapping_rem(right as i64) as u64
                    } else {
                        left % right
                    };
                    Ok(arithmetic(value))
                }
                BinaryOperator::BitwiseAnd => Ok(arithmetic(left & right)),
                BinaryOperator::BitwiseOr => Ok(arithmetic(left | right)),
                BinaryOperator::Equal => Ok(boolean(left == right)),
                BinaryOperator::NotEqual => Ok(boolean(left != right)),
                BinaryOperator::LessThan => {
                    let value = if integer.is_signed {
                        (left as i64) < right as i64
                    } else {
                        left < right
                    };
                    Ok(boolean(value))
                }
                BinaryOperator::GreaterThan => {
                    let value = if integer.is_signed {
                        left as i64 > right as i64
                    } else {
                        left > right
                    };
                    Ok(boolean(value))
                }
                _ => Err(error(
                    scope,
                    range,
                    "Cannot perform that operation on integers",
                )),
            }
        }
        AnyType::UndeterminedInteger => {
            let left = left.unwrap_integer();
            let right = right.unwrap_integer();

            let arithmetic = |value: u64| TypedConstantValue {
                ty: AnyType::UndeterminedInteger,
                value: AnyConstantValue::Integer(value),
            };

            match operator {
                BinaryOperator::Addition => Ok(arithmetic(left.wrapping_add(right))),
                BinaryOperator::Subtraction => Ok(arithmetic(left.wrapping_sub(right))),
                BinaryOperator::Multiplication => {
                    Ok(arithmetic((left as i64).wrapping_mul(right as i64) as u64))
                }
                BinaryOperator::Division => {
                    if right == 0 {
                        return Err(error(scope, range, "Division by zero"));
                    }
                    Ok(arithmetic((left as i64).wrapping_div(right as i64) as u64))
                }
                BinaryOperator::Modulo => {
                    if right == 0 {
                        return Err(error(scope, range, "Division by zero"));
                    }
                    Ok(arithmetic((left as i64).wrapping_rem(right as i64) as u64))
                }
                BinaryOperator::BitwiseAnd => Ok(arithmetic(left & right)),
                BinaryOperator::BitwiseOr => Ok(arithmetic(left | right)),
                BinaryOperator::Equal => Ok(boolean(left == right)),
                BinaryOperator::NotEqual => Ok(boolean(left != right)),
                BinaryOperator::LessThan => Ok(boolean((left as i64) < right as i64)),
                BinaryOperator::GreaterThan => Ok(boolean(left as i64 > right as i64)),
                _ => Err(error(
                    scope,
                    range,
                    "Cannot perform that operation on integers",
                )),
            }
        }
        AnyType::Boolean => {
            let left = left.unwrap_boolean();
            let right = right.unwrap_boolean();

            match operator {
                BinaryOperator::BooleanAnd => Ok(boolean(left && right)),
                BinaryOperator::BooleanOr => Ok(boolean(left || right)),
                BinaryOperator::Equal => Ok(boolean(left == right)),
                BinaryOperator::NotEqual => Ok(boolean(left != right)),
                _ => Err(error(
                    scope,
                    range,
                    "Cannot perform that operation on booleans",
                )),
            }
        }
        AnyType::FloatType(_) | AnyType::UndeterminedFloat => {
            let left = left.unwrap_float();
            let right = right.unwrap_float();

            let arithmetic = |value: f64| TypedConstantValue {
                ty,
                value: AnyConstantValue::Float(value),
            };

            match operator {
                BinaryOperator::Addition => Ok(arithmetic(left + right)),
                BinaryOperator::Subtraction => Ok(arithmetic(left - right)),
                BinaryOperator::Multiplication => Ok(arithmetic(left * right)),
                BinaryOperator::Division => Ok(arithmetic(left / right)),
                BinaryOperator::Modulo => Ok(arithmetic(left % right)),
                BinaryOperator::Equal => Ok(boolean(left == right)),
                BinaryOperator::NotEqual => Ok(boolean(left != right)),
                _ => Err(error(
                    scope,
                    range,
                    "Cannot perform that operation on floats",
                )),
            }
        }
        AnyType::Pointer(_) => {
            let left = left.unwrap_pointer();
            let right = right.unwrap_pointer();

            match operator {
                BinaryOperator::Equal => Ok(boolean(left == right)),
                BinaryOperator::NotEqual => Ok(boolean(left != right)),
                _ => Err(error(
                    scope,
                    range,
                    "Cannot perform that operation on pointers",
                )),
            }
        }
        AnyType::Enum(enum_type) => {
            let left = left.unwrap_integer();
            let right = right.unwrap_integer();

            match operator {
                BinaryOperator::Equal => Ok(boolean(left == right)),
                BinaryOperator::NotEqual => Ok(boolean(left != right)),
                _ => Err(error(
                    scope,
                    range,
                    format!(
                        "Cannot perform that operation on '{}'",
                        AnyType::Enum(enum_type)
                    ),
                )),
            }
        }
        _ => panic!("binary operation on unexpected type {ty}"),
    }
}

/// Explicit casts: everything implicit coercion allows, plus lossy numeric
/// conversions and pointer reinterpretation.
pub fn evaluate_constant_cast<'a>(
    info: GlobalInfo<'a>,
    arena: &'a Bump,
    scope: &ConstantScope<'a>,
    ty: AnyType<'a>,
    value: AnyConstantValue<'a>,
    value_range: FileRange,
    target_type: AnyType<'a>,
) -> Result<AnyConstantValue<'a>, CompileError> {
    if let Ok(coerced) =
        coerce_constant_to_type(info, arena, scope, value_range, ty, value, target_type)
    {
        return Ok(coerced);
    }

    let invalid = || {
        Err(error(
            scope,
            value_range,
            format!("Cannot cast from '{ty}' to '{target_type}'"),
        ))
    };

    match target_type {
        AnyType::Integer(target_integer) => {
            let result = match ty {
                AnyType::Integer(integer) => {
                    let integer_value = value.unwrap_integer();
                    if integer.is_signed {
                        sign_extend_integer(integer_value, integer.size)
                    } else {
                        truncate_integer(integer_value, integer.size)
                    }
                }
                AnyType::Enum(enum_type) => {
                    let integer_value = value.unwrap_integer();
                    if enum_type.backing.is_signed {
                        sign_extend_integer(integer_value, enum_type.backing.size)
                    } else {
                        truncate_integer(integer_value, enum_type.backing.size)
                    }
                }
                AnyType::UndeterminedInteger => value.unwrap_integer(),
                AnyType::FloatType(float_type) => {
                    let float_value = match float_type.size {
                        RegisterSize::Size32 => value.unwrap_float() as f32 as f64,
                        _ => value.unwrap_float(),
                    };
                    if target_integer.is_signed {
                        match target_integer.size {
                            RegisterSize::Size8 => float_value as i8 as u64,
                            RegisterSize::Size16 => float_value as i16 as u64,
                            RegisterSize::Size32 => float_value as i32 as u64,
                            RegisterSize::Size64 => float_value as i64 as u64,
                        }
                    } else {
                        match target_integer.size {
                            RegisterSize::Size8 => float_value as u8 as u64,
                            RegisterSize::Size16 => float_value as u16 as u64,
                            RegisterSize::Size32 => float_value as u32 as u64,
                            RegisterSize::Size64 => float_value as u64,
                        }
                    }
                }
                AnyType::UndeterminedFloat => {
                    let float_value = value.unwrap_float();
                    if target_integer.is_signed {
                        float_value as i64 as u64
                    } else {
                        float_value as u64
                    }
                }
                AnyType::Pointer(_) => {
                    if target_integer.size == info.architecture_sizes.address_size
                        && !target_integer.is_signed
                    {
                        value.unwrap_pointer()
                    } else {
                        return invalid();
                    }
                }
                _ => return invalid(),
            };

            Ok(AnyConstantValue::Integer(result))
        }
        AnyType::FloatType(target_float) => {
            let widened = match ty {
                AnyType::Integer(integer) => {
                    let integer_value = value.unwrap_integer();
                    if integer.is_signed {
                        sign_extend_integer(integer_value, integer.size) as i64 as f64
                    } else {
                        truncate_integer(integer_value, integer.size) as f64
                    }
                }
                AnyType::UndeterminedInteger => value.unwrap_integer() as i64 as f64,
                AnyType::FloatType(float_type) => match float_type.size {
                    RegisterSize::Size32 => value.unwrap_float() as f32 as f64,
                    _ => value.unwrap_float(),
                },
                AnyType::UndeterminedFloat => value.unwrap_float(),
                _ => return invalid(),
            };

            let result = match target_float.size {
                RegisterSize::Size32 => widened as f32 as f64,
                _ => widened,
            };

            Ok(AnyConstantValue::Float(result))
        }
        AnyType::Pointer(_) => match ty {
            AnyType::Integer(integer) => {
                if integer.size == info.architecture_sizes.address_size && !integer.is_signed {
                    Ok(AnyConstantValue::Pointer(value.unwrap_integer()))
                } else {
                    invalid()
                }
            }
            AnyType::UndeterminedInteger => Ok(AnyConstantValue::Pointer(value.unwrap_integer())),
            AnyType::Pointer(_) => Ok(AnyConstantValue::Pointer(value.unwrap_pointer())),
            _ => invalid(),
        },
        AnyType::Enum(enum_type) => match ty {
            AnyType::Integer(_) | AnyType::UndeterminedInteger | AnyType::Enum(_) => {
                let integer_value = value.unwrap_integer();
                Ok(AnyConstantValue::Integer(truncate_integer(
                    integer_value,
                    enum_type.backing.size,
                )))
            }
            _ => invalid(),
        },
        _ => invalid(),
    }
}

/// Render a `[]u8` / `[N]u8` constant as a string (library names, calling
/// convention names).
pub fn static_array_to_string<'a>(
    scope: &ConstantScope<'a>,
    range: FileRange,
    ty: AnyType<'a>,
    value: AnyConstantValue<'a>,
) -> Result<String, CompileError> {
    let expected = || {
        Err(error(
            scope,
            range,
            format!("Expected a string ([]u8), got '{ty}'"),
        ))
    };

    let (element_type, elements) = match ty {
        AnyType::StaticArray { element_type, .. } => (*element_type, value.unwrap_static_array()),
        AnyType::ArrayType(element_type) => match value {
            AnyConstantValue::StaticArray(elements) => (*element_type, elements),
            _ => {
                return Err(error(
                    scope,
                    range,
                    "Cannot use an array with non-constant elements in this context",
                ));
            }
        },
        _ => return expected(),
    };

    match element_type {
        AnyType::Integer(integer) if integer.size == RegisterSize::Size8 => {}
        _ => return expected(),
    }

    let bytes: Vec<u8> = elements
        .iter()
        .map(|element| element.unwrap_integer() as u8)
        .collect();

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// ---------------------------------------------------------------------------
// Declaration search

fn is_ignored(statement: &Statement, ignore: Option<&Statement>) -> bool {
    match ignore {
        Some(ignore) => std::ptr::eq(statement, ignore),
        None => false,
    }
}

/// Join the job that resolves a declaration statement, waiting if it has not
/// finished.
pub fn get_simple_resolved_declaration<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    scope: &'a ConstantScope<'a>,
    declaration: &'a Statement<'a>,
) -> DelayedResult<TypedConstantValue<'a>> {
    let _ = info;

    match declaration {
        Statement::FunctionDeclaration(function_declaration) => {
            if function_declaration.is_polymorphic() {
                return done(TypedConstantValue {
                    ty: AnyType::PolymorphicFunction,
                    value: AnyConstantValue::PolymorphicFunction(PolymorphicFunctionConstant {
                        declaration: function_declaration,
                        scope,
                    }),
                });
            }

            for (index, job) in jobs.jobs.iter().enumerate() {
                if let JobKind::TypeFunctionDeclaration {
                    declaration: job_declaration,
                    resolved,
                    ..
                } = &job.kind
                {
                    if std::ptr::eq(*job_declaration, function_declaration) {
                        return match (job.state, resolved) {
                            (JobState::Done, Some(resolved)) => done(*resolved),
                            _ => wait(index),
                        };
                    }
                }
            }

            unreachable!("function declaration was never scheduled")
        }
        Statement::ConstantDefinition(constant_definition) => {
            for (index, job) in jobs.jobs.iter().enumerate() {
                if let JobKind::TypeConstantDefinition {
                    definition: job_definition,
                    resolved,
                    ..
                } = &job.kind
                {
                    if std::ptr::eq(*job_definition, constant_definition) {
                        return match (job.state, resolved) {
                            (JobState::Done, Some(resolved)) => done(*resolved),
                            _ => wait(index),
                        };
                    }
                }
            }

            unreachable!("constant definition was never scheduled")
        }
        Statement::StructDefinition(struct_definition) => {
            for (index, job) in jobs.jobs.iter().enumerate() {
                if let JobKind::TypeStructDefinition {
                    definition: job_definition,
                    resolved,
                    ..
                } = &job.kind
                {
                    if std::ptr::eq(*job_definition, struct_definition) {
                        return match (job.state, resolved) {
                            (JobState::Done, Some(resolved)) => done(TypedConstantValue {
                                ty: AnyType::Type,
                                value: AnyConstantValue::Type(*resolved),
                            }),
                            _ => wait(index),
                        };
                    }
                }
            }

            unreachable!("struct definition was never scheduled")
        }
        Statement::EnumDefinition(enum_definition) => {
            for (index, job) in jobs.jobs.iter().enumerate() {
                if let JobKind::TypeEnumDefinition {
                    definition: job_definition,
                    resolved,
                    ..
                } = &job.kind
                {
                    if std::ptr::eq(*job_definition, enum_definition) {
                        return match (job.state, resolved) {
                            (JobState::Done, Some(resolved)) => done(TypedConstantValue {
                                ty: AnyType::Type,
                                value: AnyConstantValue::Type(*resolved),
                            }),
                            _ => wait(index),
                        };
                    }
                }
            }

            unreachable!("enum definition was never scheduled")
        }
        Statement::Import { absolute_path, .. } => {
            for (index, job) in jobs.jobs.iter().enumerate() {
                if let JobKind::ParseFile {
                    path,
                    scope: parsed_scope,
                } = &job.kind
                {
                    if path == absolute_path {
                        return match (job.state, parsed_scope) {
                            (JobState::Done, Some(parsed_scope)) => done(TypedConstantValue {
                                ty: AnyType::FileModule,
                                value: AnyConstantValue::FileModule(*parsed_scope),
                            }),
                            _ => wait(index),
                        };
                    }
                }
            }

            unreachable!("import was never scheduled")
        }
        _ => unreachable!("statement is not a declaration"),
    }
}

/// Search one scope level for a named declaration.
///
/// Looks through the declaration hash table, then `using` imports and
/// static-ifs (suspending on any unresolved static-if that might declare the
/// name), then scope-local constants. Returns `None` when the name is simply
/// absent at this level.
pub fn search_for_declaration<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    name: &str,
    name_hash: u32,
    scope: &'a ConstantScope<'a>,
    statements: &'a [&'a Statement<'a>],
    declarations: DeclarationTable<'a>,
    external: bool,
    ignore: Option<&'a Statement<'a>>,
) -> DelayedResult<Option<TypedConstantValue<'a>>> {
    if let Some(declaration) = declarations.search(name_hash, name) {
        if !is_ignored(declaration, ignore) {
            if external && !is_declaration_public(declaration) {
                return done(None);
            }

            let value = ready!(get_simple_resolved_declaration(info, jobs, scope, declaration));
            return done(Some(value));
        }
    }

    for &statement in statements {
        if is_ignored(statement, ignore) {
            continue;
        }

        match statement {
            Statement::UsingStatement { module, .. } => {
                if external {
                    continue;
                }

                let expression_value = ready!(evaluate_constant_expression(
                    info,
                    jobs,
                    arena,
                    scope,
                    Some(statement),
                    module
                ));

                if expression_value.ty != AnyType::FileModule {
                    return Err(error(
                        scope,
                        statement.range(),
                        format!("Expected a module, got '{}'", expression_value.ty),
                    ));
                }

                let module_scope = expression_value.value.unwrap_file_module();

                let search_value = ready!(search_for_declaration(
                    info,
                    jobs,
                    arena,
                    name,
                    name_hash,
                    module_scope,
                    module_scope.statements,
                    module_scope.declarations,
                    true,
                    None
                ));

                if let Some(value) = search_value {
                    return done(Some(value));
                }
            }
            Statement::StaticIf(static_if) => {
                let mut matched = None;
                for (index, job) in jobs.jobs.iter().enumerate() {
                    if let JobKind::TypeStaticIf {
                        static_if: job_static_if,
                        scope: job_scope,
                        condition,
                        declarations,
                        ..
                    } = &job.kind
                    {
                        if std::ptr::eq(*job_static_if, static_if)
                            && std::ptr::eq(*job_scope, scope)
                        {
                            matched = Some((index, job.state, *condition, *declarations));
                            break;
                        }
                    }
                }

                let Some((index, state, condition, branch_declarations)) = matched else {
                    unreachable!("static if was never scheduled")
                };

                if state == JobState::Done {
                    if condition == Some(true) {
                        let branch_declarations =
                            branch_declarations.unwrap_or_else(DeclarationTable::empty);

                        let search_value = ready!(search_for_declaration(
                            info,
                            jobs,
                            arena,
                            name,
                            name_hash,
                            scope,
                            static_if.statements,
                            branch_declarations,
                            false,
                            None
                        ));

                        if let Some(value) = search_value {
                            return done(Some(value));
                        }
                    }
                } else {
                    let have_to_wait = static_if.statements.iter().any(|&branch_statement| {
                        let matching = if external {
                            match_public_declaration(branch_statement, name)
                        } else {
                            match_declaration(branch_statement, name)
                        };

                        matching
                            || (!external
                                && matches!(branch_statement, Statement::UsingStatement { .. }))
                            || matches!(branch_statement, Statement::StaticIf(_))
                    });

                    if have_to_wait {
                        return wait(index);
                    }
                }
            }
            _ => {}
        }
    }

    for scope_constant in scope.scope_constants {
        if scope_constant.name == name {
            return done(Some(TypedConstantValue {
                ty: scope_constant.ty,
                value: scope_constant.value,
            }));
        }
    }

    done(None)
}

// ---------------------------------------------------------------------------
// The constant expression evaluator

pub fn evaluate_constant_expression<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    scope: &'a ConstantScope<'a>,
    ignore_statement: Option<&'a Statement<'a>>,
    expression: &'a Expression<'a>,
) -> DelayedResult<TypedConstantValue<'a>> {
    match expression {
        Expression::NamedReference(identifier) => {
            let name_hash = calculate_string_hash(identifier.text);

            let mut current_scope = scope;
            loop {
                let search_value = ready!(search_for_declaration(
                    info,
                    jobs,
                    arena,
                    identifier.text,
                    name_hash,
                    current_scope,
                    current_scope.statements,
                    current_scope.declarations,
                    false,
                    ignore_statement
                ));

                if let Some(value) = search_value {
                    return done(value);
                }

                if current_scope.is_top_level {
                    break;
                }
                current_scope = match current_scope.parent {
                    Some(parent) => parent,
                    None => break,
                };
            }

            for global_constant in info.global_constants {
                if identifier.text == global_constant.name {
                    return done(TypedConstantValue {
                        ty: global_constant.ty,
                        value: global_constant.value,
                    });
                }
            }

            Err(error(
                scope,
                identifier.range,
                format!("Cannot find named reference {}", identifier.text),
            ))
        }
        Expression::MemberReference {
            expression: inner,
            name,
            ..
        } => {
            let expression_value = ready!(evaluate_constant_expression(
                info,
                jobs,
                arena,
                scope,
                ignore_statement,
                inner
            ));

            let no_member = || {
                Err(error(
                    scope,
                    name.range,
                    format!("No member with name '{}'", name.text),
                ))
            };

            match expression_value.ty {
                AnyType::ArrayType(element_type) => match expression_value.value {
                    AnyConstantValue::Array(array_value) => match name.text {
                        "length" => done(TypedConstantValue {
                            ty: AnyType::Integer(Integer {
                                size: info.architecture_sizes.address_size,
                                is_signed: false,
                            }),
                            value: AnyConstantValue::Integer(array_value.length),
                        }),
                        "pointer" => done(TypedConstantValue {
                            ty: AnyType::Pointer(element_type),
                            value: AnyConstantValue::Pointer(array_value.pointer),
                        }),
                        _ => no_member(),
                    },
                    _ => {
                        let elements = expression_value.value.unwrap_static_array();
                        match name.text {
                            "length" => done(TypedConstantValue {
                                ty: AnyType::Integer(Integer {
                                    size: info.architecture_sizes.address_size,
                                    is_signed: false,
                                }),
                                value: AnyConstantValue::Integer(elements.len() as u64),
                            }),
                            "pointer" => Err(error(
                                scope,
                                name.range,
                                "Cannot take pointer to array with constant elements in constant context",
                            )),
                            _ => no_member(),
                        }
                    }
                },
                AnyType::StaticArray { length, .. } => match name.text {
                    "length" => done(TypedConstantValue {
                        ty: AnyType::Integer(Integer {
                            size: info.architecture_sizes.address_size,
                            is_signed: false,
                        }),
                        value: AnyConstantValue::Integer(length),
                    }),
                    "pointer" => Err(error(
                        scope,
                        name.range,
                        "Cannot take pointer to static array in constant context",
                    )),
                    _ => no_member(),
                },
                AnyType::StructType(struct_type) => {
                    let members = expression_value.value.unwrap_struct();

                    for (index, member) in struct_type.members.iter().enumerate() {
                        if member.name == name.text {
                            return done(TypedConstantValue {
                                ty: member.member_type,
                                value: members[index],
                            });
                        }
                    }

                    no_member()
                }
                AnyType::UndeterminedStruct(undetermined) => {
                    let members = expression_value.value.unwrap_struct();

                    for (index, member) in undetermined.members.iter().enumerate() {
                        if member.name == name.text {
                            return done(TypedConstantValue {
                                ty: member.member_type,
                                value: members[index],
                            });
                        }
                    }

                    no_member()
                }
                AnyType::FileModule => {
                    let module_scope = expression_value.value.unwrap_file_module();

                    let search_value = ready!(search_for_declaration(
                        info,
                        jobs,
                        arena,
                        name.text,
                        calculate_string_hash(name.text),
                        module_scope,
                        module_scope.statements,
                        module_scope.declarations,
                        true,
                        None
                    ));

                    match search_value {
                        Some(value) => done(value),
                        None => no_member(),
                    }
                }
                AnyType::Type => {
                    let ty = expression_value.value.unwrap_type();

                    if let AnyType::Enum(enum_type) = ty {
                        match enum_type.variant_value(name.text) {
                            Some(value) => done(TypedConstantValue {
                                ty: AnyType::Enum(enum_type),
                                value: AnyConstantValue::Integer(value),
                            }),
                            None => no_member(),
                        }
                    } else {
                        Err(error(
                            scope,
                            inner.range(),
                            format!("Type '{ty}' has no members"),
                        ))
                    }
                }
                other => Err(error(
                    scope,
                    inner.range(),
                    format!("Type '{other}' has no members"),
                )),
            }
        }
        Expression::IndexReference {
            expression: inner,
            index,
            ..
        } => {
            let expression_value = ready!(evaluate_constant_expression(
                info,
                jobs,
                arena,
                scope,
                ignore_statement,
                inner
            ));

            let index_value = ready!(evaluate_constant_expression(
                info,
                jobs,
                arena,
                scope,
                ignore_statement,
                index
            ));

            let value = evaluate_constant_index(
                info,
                scope,
                expression_value.ty,
                expression_value.value,
                inner.range(),
                index_value.ty,
                index_value.value,
                index.range(),
            )?;

            done(value)
        }
        Expression::IntegerLiteral { value, .. } => done(TypedConstantValue {
            ty: AnyType::UndeterminedInteger,
            value: AnyConstantValue::Integer(*value),
        }),
        Expression::FloatLiteral { value, .. } => done(TypedConstantValue {
            ty: AnyType::UndeterminedFloat,
            value: AnyConstantValue::Float(*value),
        }),
        Expression::StringLiteral { characters, .. } => done(string_literal_value(arena, characters)),
        Expression::ArrayLiteral { elements, range } => {
            if elements.is_empty() {
                return Err(error(scope, *range, "Empty array literal"));
            }

            let first_element = ready!(evaluate_constant_expression(
                info,
                jobs,
                arena,
                scope,
                ignore_statement,
                elements[0]
            ));

            let element_type =
                coerce_to_default_type(info, scope, elements[0].range(), first_element.ty)?;

            if !element_type.is_runtime_type() {
                return Err(error(
                    scope,
                    *range,
                    format!("Arrays cannot be of type '{element_type}'"),
                ));
            }

            let mut element_values = Vec::with_capacity(elements.len());
            element_values.push(coerce_constant_to_type(
                info,
                arena,
                scope,
                elements[0].range(),
                first_element.ty,
                first_element.value,
                element_type,
            )?);

            for &element in &elements[1..] {
                let element_value = ready!(evaluate_constant_expression(
                    info,
                    jobs,
                    arena,
                    scope,
                    ignore_statement,
                    element
                ));

                element_values.push(coerce_constant_to_type(
                    info,
                    arena,
                    scope,
                    element.range(),
                    element_value.ty,
                    element_value.value,
                    element_type,
                )?);
            }

            done(TypedConstantValue {
                ty: AnyType::StaticArray {
                    length: elements.len() as u64,
                    element_type: arena.alloc(element_type),
                },
                value: AnyConstantValue::StaticArray(arena.alloc_slice_copy(&element_values)),
            })
        }
        Expression::StructLiteral { members, range } => {
            if members.is_empty() {
                return Err(error(scope, *range, "Empty struct literal"));
            }

            let mut type_members = Vec::with_capacity(members.len());
            let mut member_values = Vec::with_capacity(members.len());

            for (i, member) in members.iter().enumerate() {
                for other in &members[..i] {
                    if other.name.text == member.name.text {
                        return Err(error(
                            scope,
                            member.name.range,
                            format!("Duplicate struct member {}", member.name.text),
                        ));
                    }
                }

                let member_value = ready!(evaluate_constant_expression(
                    info,
                    jobs,
                    arena,
                    scope,
                    ignore_statement,
                    member.value
                ));

                type_members.push(StructTypeMember {
                    name: member.name.text,
                    member_type: member_value.ty,
                });
                member_values.push(member_value.value);
            }

            done(TypedConstantValue {
                ty: AnyType::UndeterminedStruct(UndeterminedStruct {
                    members: arena.alloc_slice_copy(&type_members),
                }),
                value: AnyConstantValue::Struct(arena.alloc_slice_copy(&member_values)),
            })
        }
        Expression::FunctionCall {
            expression: callee,
            parameters,
            range,
        } => {
            let expression_value = ready!(evaluate_constant_expression(
                info,
                jobs,
                arena,
                scope,
                ignore_statement,
                callee
            ));

            match expression_value.ty {
                AnyType::FunctionType(_) => Err(error(
                    scope,
                    *range,
                    "Function calls not allowed in global context",
                )),
                AnyType::BuiltinFunction => {
                    let builtin_name = expression_value.value.unwrap_builtin_function();

                    match builtin_name {
                        "size_of" => {
                            if parameters.len() != 1 {
                                return Err(error(
                                    scope,
                                    *range,
                                    format!(
                                        "Incorrect parameter count. Expected 1 got {}",
                                        parameters.len()
                                    ),
                                ));
                            }

                            let parameter_value = ready!(evaluate_constant_expression(
                                info,
                                jobs,
                                arena,
                                scope,
                                ignore_statement,
                                parameters[0]
                            ));

                            let ty = match parameter_value.ty {
                                AnyType::Type => parameter_value.value.unwrap_type(),
                                other => other,
                            };

                            if !ty.is_runtime_type() {
                                return Err(error(
                                    scope,
                                    parameters[0].range(),
                                    format!("'{}' has no size", parameter_value.ty),
                                ));
                            }

                            done(TypedConstantValue {
                                ty: AnyType::Integer(Integer {
                                    size: info.architecture_sizes.address_size,
                                    is_signed: false,
                                }),
                                value: AnyConstantValue::Integer(
                                    ty.size(info.architecture_sizes),
                                ),
                            })
                        }
                        "type_of" => {
                            if parameters.len() != 1 {
                                return Err(error(
                                    scope,
                                    *range,
                                    format!(
                                        "Incorrect parameter count. Expected 1 got {}",
                                        parameters.len()
                                    ),
                                ));
                            }

                            let parameter_value = ready!(evaluate_constant_expression(
                                info,
                                jobs,
                                arena,
                                scope,
                                ignore_statement,
                                parameters[0]
                            ));

                            done(TypedConstantValue {
                                ty: AnyType::Type,
                                value: AnyConstantValue::Type(parameter_value.ty),
                            })
                        }
                        "memcpy" => Err(error(
                            scope,
                            *range,
                            "'memcpy' cannot be called in a constant context",
                        )),
                        _ => unreachable!("unknown builtin function {builtin_name}"),
                    }
                }
                AnyType::Type => {
                    let ty = expression_value.value.unwrap_type();

                    let AnyType::PolymorphicStruct(polymorphic_struct) = ty else {
                        return Err(error(
                            scope,
                            callee.range(),
                            format!("Type '{ty}' is not polymorphic"),
                        ));
                    };

                    let definition = polymorphic_struct.definition;

                    if parameters.len() != definition.parameters.len() {
                        return Err(error(
                            scope,
                            *range,
                            format!(
                                "Incorrect struct parameter count: expected {}, got {}",
                                definition.parameters.len(),
                                parameters.len()
                            ),
                        ));
                    }

                    let mut parameter_values = Vec::with_capacity(parameters.len());
                    for (i, &parameter) in parameters.iter().enumerate() {
                        let value = ready!(evaluate_constant_expression(
                            info,
                            jobs,
                            arena,
                            scope,
                            ignore_statement,
                            parameter
                        ));

                        parameter_values.push(coerce_constant_to_type(
                            info,
                            arena,
                            scope,
                            parameter.range(),
                            value.ty,
                            value.value,
                            polymorphic_struct.parameter_types[i],
                        )?);
                    }

                    match jobs.find_polymorphic_struct(definition, &parameter_values) {
                        PolymorphicStructMatch::Resolved(resolved) => done(TypedConstantValue {
                            ty: AnyType::Type,
                            value: AnyConstantValue::Type(resolved),
                        }),
                        PolymorphicStructMatch::InProgress(index) => wait(index),
                        PolymorphicStructMatch::NotFound => {
                            let index = jobs.spawn_polymorphic_struct(
                                definition,
                                arena.alloc_slice_copy(&parameter_values),
                                polymorphic_struct.parent,
                            );
                            wait(index)
                        }
                    }
                }
                other => Err(error(
                    scope,
                    callee.range(),
                    format!("Cannot call non-function '{other}'"),
                )),
            }
        }
        Expression::BinaryOperation {
            operator,
            left,
            right,
            range,
        } => {
            let left_value = ready!(evaluate_constant_expression(
                info,
                jobs,
                arena,
                scope,
                ignore_statement,
                left
            ));

            let right_value = ready!(evaluate_constant_expression(
                info,
                jobs,
                arena,
                scope,
                ignore_statement,
                right
            ));

            let value = evaluate_constant_binary_operation(
                info,
                arena,
                scope,
                *range,
                *operator,
                left.range(),
                left_value.ty,
                left_value.value,
                right.range(),
                right_value.ty,
                right_value.value,
            )?;

            done(value)
        }
        Expression::UnaryOperation {
            operator,
            expression: inner,
            range,
        } => {
            let expression_value = ready!(evaluate_constant_expression(
                info,
                jobs,
                arena,
                scope,
                ignore_statement,
                inner
            ));

            match operator {
                UnaryOperator::Pointer => {
                    if expression_value.ty == AnyType::Type {
                        let ty = expression_value.value.unwrap_type();

                        if !ty.is_runtime_type()
                            && ty != AnyType::Void
                            && !matches!(ty, AnyType::FunctionType(_))
                        {
                            return Err(error(
                                scope,
                                inner.range(),
                                format!("Cannot create pointers to type '{ty}'"),
                            ));
                        }

                        done(TypedConstantValue {
                            ty: AnyType::Type,
                            value: AnyConstantValue::Type(AnyType::Pointer(arena.alloc(ty))),
                        })
                    } else {
                        Err(error(scope, *range, "Cannot take pointers at constant time"))
                    }
                }
                UnaryOperator::BooleanInvert => {
                    if expression_value.ty != AnyType::Boolean {
                        return Err(error(
                            scope,
                            inner.range(),
                            format!("Expected a boolean, got '{}'", expression_value.ty),
                        ));
                    }

                    done(TypedConstantValue {
                        ty: AnyType::Boolean,
                        value: AnyConstantValue::Boolean(!expression_value.value.unwrap_boolean()),
                    })
                }
                UnaryOperator::Negation => match expression_value.ty {
                    AnyType::Integer(_) | AnyType::UndeterminedInteger => done(TypedConstantValue {
                        ty: expression_value.ty,
                        value: AnyConstantValue::Integer(
                            (expression_value.value.unwrap_integer() as i64).wrapping_neg() as u64,
                        ),
                    }),
                    AnyType::FloatType(_) | AnyType::UndeterminedFloat => done(TypedConstantValue {
                        ty: expression_value.ty,
                        value: AnyConstantValue::Float(-expression_value.value.unwrap_float()),
                    }),
                    other => Err(error(
                        scope,
                        inner.range(),
                        format!("Cannot negate '{other}'"),
                    )),
                },
            }
        }
        Expression::Cast {
            expression: inner,
            target,
            ..
        } => {
            let expression_value = ready!(evaluate_constant_expression(
                info,
                jobs,
                arena,
                scope,
                ignore_statement,
                inner
            ));

            let target_type = ready!(evaluate_type_expression(
                info,
                jobs,
                arena,
                scope,
                ignore_statement,
                target
            ));

            let value = evaluate_constant_cast(
                info,
                arena,
                scope,
                expression_value.ty,
                expression_value.value,
                inner.range(),
                target_type,
            )?;

            done(TypedConstantValue {
                ty: target_type,
                value,
            })
        }
        Expression::Bake { call, range } => {
            let Expression::FunctionCall {
                expression: callee,
                parameters,
                ..
            } = call
            else {
                return Err(error(scope, *range, "Expected a function call"));
            };

            let expression_value = ready!(evaluate_constant_expression(
                info,
                jobs,
                arena,
                scope,
                ignore_statement,
                callee
            ));

            let mut call_parameters = Vec::with_capacity(parameters.len());
            for &parameter in parameters.iter() {
                let parameter_value = ready!(evaluate_constant_expression(
                    info,
                    jobs,
                    arena,
                    scope,
                    ignore_statement,
                    parameter
                ));

                call_parameters.push(parameter_value);
            }

            match expression_value.ty {
                AnyType::PolymorphicFunction => {
                    let polymorphic_function =
                        expression_value.value.unwrap_polymorphic_function();
                    let declaration = polymorphic_function.declaration;

                    if call_parameters.len() != declaration.parameters.len() {
                        return Err(error(
                            scope,
                            *range,
                            format!(
                                "Incorrect number of parameters. Expected {}, got {}",
                                declaration.parameters.len(),
                                call_parameters.len()
                            ),
                        ));
                    }

                    match jobs.find_polymorphic_function(
                        declaration,
                        polymorphic_function.scope,
                        &call_parameters,
                    ) {
                        PolymorphicFunctionMatch::Resolved(ty, value) => {
                            done(TypedConstantValue {
                                ty: AnyType::FunctionType(ty),
                                value: AnyConstantValue::Function(value),
                            })
                        }
                        PolymorphicFunctionMatch::InProgress(index) => wait(index),
                        PolymorphicFunctionMatch::NotFound => {
                            let ranges: Vec<FileRange> =
                                parameters.iter().map(|p| p.range()).collect();
                            let index = jobs.spawn_polymorphic_function(
                                declaration,
                                arena.alloc_slice_copy(&call_parameters),
                                polymorphic_function.scope,
                                scope,
                                arena.alloc_slice_copy(&ranges),
                            );
                            wait(index)
                        }
                    }
                }
                AnyType::FunctionType(function_type) => {
                    let function_value = expression_value.value.unwrap_function();

                    if call_parameters.len() != function_type.parameters.len() {
                        return Err(error(
                            scope,
                            *range,
                            format!(
                                "Incorrect number of parameters. Expected {}, got {}",
                                function_type.parameters.len(),
                                call_parameters.len()
                            ),
                        ));
                    }

                    done(TypedConstantValue {
                        ty: AnyType::FunctionType(function_type),
                        value: AnyConstantValue::Function(function_value),
                    })
                }
                other => Err(error(
                    scope,
                    callee.range(),
                    format!("Expected a function, got '{other}'"),
                )),
            }
        }
        Expression::ArrayType {
            element, length, ..
        } => {
            let element_type = ready!(evaluate_type_expression(
                info,
                jobs,
                arena,
                scope,
                ignore_statement,
                element
            ));

            if !element_type.is_runtime_type() {
                return Err(error(
                    scope,
                    element.range(),
                    format!("Cannot have arrays of type '{element_type}'"),
                ));
            }

            match length {
                Some(length_expression) => {
                    let index_value = ready!(evaluate_constant_expression(
                        info,
                        jobs,
                        arena,
                        scope,
                        ignore_statement,
                        length_expression
                    ));

                    let length = coerce_constant_to_integer_type(
                        scope,
                        length_expression.range(),
                        index_value.ty,
                        index_value.value,
                        Integer {
                            size: info.architecture_sizes.address_size,
                            is_signed: false,
                        },
                    )?;

                    done(TypedConstantValue {
                        ty: AnyType::Type,
                        value: AnyConstantValue::Type(AnyType::StaticArray {
                            length,
                            element_type: arena.alloc(element_type),
                        }),
                    })
                }
                None => done(TypedConstantValue {
                    ty: AnyType::Type,
                    value: AnyConstantValue::Type(AnyType::ArrayType(arena.alloc(element_type))),
                }),
            }
        }
        Expression::FunctionType {
            parameters,
            return_type,
            tags,
            ..
        } => {
            let mut parameter_types = Vec::with_capacity(parameters.len());

            for parameter in parameters.iter() {
                if let Some(determiner) = parameter.polymorphic_determiner {
                    return Err(error(
                        scope,
                        determiner.range,
                        "Function types cannot be polymorphic",
                    ));
                }

                let parameter_type = ready!(evaluate_type_expression(
                    info,
                    jobs,
                    arena,
                    scope,
                    ignore_statement,
                    parameter.ty.expect("parameter without determiner has a type")
                ));

                if !parameter_type.is_runtime_type() {
                    return Err(error(
                        scope,
                        parameter.name.range,
                        format!("Function parameters cannot be of type '{parameter_type}'"),
                    ));
                }

                parameter_types.push(parameter_type);
            }

            let mut calling_convention = CallingConvention::Default;
            let mut is_calling_convention_specified = false;
            for tag in tags.iter() {
                match tag.name.text {
                    "extern" => {
                        return Err(error(scope, tag.range, "Function types cannot be external"));
                    }
                    "no_mangle" => {
                        return Err(error(
                            scope,
                            tag.range,
                            "Function types cannot be no_mangle",
                        ));
                    }
                    "call_conv" => {
                        if is_calling_convention_specified {
                            return Err(error(scope, tag.range, "Duplicate 'call_conv' tag"));
                        }

                        calling_convention = ready!(resolve_calling_convention_tag(
                            info, jobs, arena, scope, tag
                        ));
                        is_calling_convention_specified = true;
                    }
                    other => {
                        return Err(error(
                            scope,
                            tag.name.range,
                            format!("Unknown tag '{other}'"),
                        ));
                    }
                }
            }

            let return_type = match return_type {
                Some(return_expression) => {
                    let return_type = ready!(evaluate_type_expression(
                        info,
                        jobs,
                        arena,
                        scope,
                        ignore_statement,
                        return_expression
                    ));

                    if !return_type.is_runtime_type() {
                        return Err(error(
                            scope,
                            return_expression.range(),
                            format!("Function returns cannot be of type '{return_type}'"),
                        ));
                    }

                    return_type
                }
                None => AnyType::Void,
            };

            done(TypedConstantValue {
                ty: AnyType::Type,
                value: AnyConstantValue::Type(AnyType::FunctionType(FunctionTypeType {
                    parameters: arena.alloc_slice_copy(&parameter_types),
                    return_type: arena.alloc(return_type),
                    calling_convention,
                })),
            })
        }
    }
}

pub fn string_literal_value<'a>(arena: &'a Bump, characters: &str) -> TypedConstantValue<'a> {
    let elements = arena.alloc_slice_fill_iter(
        characters
            .bytes()
            .map(|byte| AnyConstantValue::Integer(byte as u64)),
    );

    TypedConstantValue {
        ty: AnyType::StaticArray {
            length: elements.len() as u64,
            element_type: arena.alloc(AnyType::Integer(Integer {
                size: RegisterSize::Size8,
                is_signed: false,
            })),
        },
        value: AnyConstantValue::StaticArray(elements),
    }
}

/// Evaluate an expression that must denote a type.
pub fn evaluate_type_expression<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    scope: &'a ConstantScope<'a>,
    ignore_statement: Option<&'a Statement<'a>>,
    expression: &'a Expression<'a>,
) -> DelayedResult<AnyType<'a>> {
    let expression_value = ready!(evaluate_constant_expression(
        info,
        jobs,
        arena,
        scope,
        ignore_statement,
        expression
    ));

    if expression_value.ty == AnyType::Type {
        done(expression_value.value.unwrap_type())
    } else {
        Err(error(
            scope,
            expression.range(),
            format!("Expected a type, got {}", expression_value.ty),
        ))
    }
}

/// Evaluate a `#call_conv("...")` tag's parameter.
fn resolve_calling_convention_tag<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    scope: &'a ConstantScope<'a>,
    tag: &crate::ast::Tag<'a>,
) -> DelayedResult<CallingConvention> {
    if tag.parameters.len() != 1 {
        return Err(error(
            scope,
            tag.range,
            format!("Expected 1 parameter, got {}", tag.parameters.len()),
        ));
    }

    let parameter = ready!(evaluate_constant_expression(
        info,
        jobs,
        arena,
        scope,
        None,
        tag.parameters[0]
    ));

    let name = static_array_to_string(
        scope,
        tag.parameters[0].range(),
        parameter.ty,
        parameter.value,
    )?;

    match name.as_str() {
        "default" => done(CallingConvention::Default),
        "stdcall" => done(CallingConvention::StdCall),
        other => Err(error(
            scope,
            tag.parameters[0].range(),
            format!("Unknown calling convention '{other}'"),
        )),
    }
}

// ---------------------------------------------------------------------------
// Declaration resolvers

#[derive(Debug, Clone, Copy)]
pub struct StaticIfResolution<'a> {
    pub condition: bool,
    pub declarations: DeclarationTable<'a>,
}

pub fn do_resolve_static_if<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    static_if: &'a StaticIf<'a>,
    scope: &'a ConstantScope<'a>,
    ignore: &'a Statement<'a>,
) -> DelayedResult<StaticIfResolution<'a>> {
    let condition = ready!(evaluate_constant_expression(
        info,
        jobs,
        arena,
        scope,
        Some(ignore),
        static_if.condition
    ));

    if condition.ty != AnyType::Boolean {
        return Err(error(
            scope,
            static_if.condition.range(),
            format!("Expected a boolean, got '{}'", condition.ty),
        ));
    }

    if condition.value.unwrap_boolean() {
        let mut scratch_child_scopes = Vec::new();
        process_scope(
            jobs,
            arena,
            scope,
            static_if.statements,
            &mut scratch_child_scopes,
            true,
        )?;

        let declarations = DeclarationTable::build(arena, static_if.statements);

        done(StaticIfResolution {
            condition: true,
            declarations,
        })
    } else {
        done(StaticIfResolution {
            condition: false,
            declarations: DeclarationTable::empty(),
        })
    }
}

pub fn do_resolve_function_declaration<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    declaration: &'a FunctionDeclaration<'a>,
    scope: &'a ConstantScope<'a>,
) -> DelayedResult<TypedConstantValue<'a>> {
    let mut parameter_types = Vec::with_capacity(declaration.parameters.len());
    for parameter in declaration.parameters.iter() {
        debug_assert!(!parameter.is_constant && !parameter.is_polymorphic_determiner());

        let ty = ready!(evaluate_type_expression(
            info,
            jobs,
            arena,
            scope,
            None,
            parameter.ty.expect("non-polymorphic parameter has a type")
        ));

        if !ty.is_runtime_type() {
            return Err(error(
                scope,
                parameter.name.range,
                format!("Function parameters cannot be of type '{ty}'"),
            ));
        }

        parameter_types.push(ty);
    }

    let mut is_external = false;
    let mut external_libraries: Vec<String> = Vec::new();
    let mut is_no_mangle = false;
    let mut is_calling_convention_specified = false;
    let mut calling_convention = CallingConvention::Default;

    for tag in declaration.tags.iter() {
        match tag.name.text {
            "extern" => {
                if is_external {
                    return Err(error(scope, tag.range, "Duplicate 'extern' tag"));
                }

                for &parameter_expression in tag.parameters.iter() {
                    let parameter = ready!(evaluate_constant_expression(
                        info,
                        jobs,
                        arena,
                        scope,
                        None,
                        parameter_expression
                    ));

                    append_library_parameter(
                        scope,
                        parameter_expression.range(),
                        parameter.ty,
                        parameter.value,
                        &mut external_libraries,
                    )?;
                }

                is_external = true;
            }
            "no_mangle" => {
                if is_no_mangle {
                    return Err(error(scope, tag.range, "Duplicate 'no_mangle' tag"));
                }

                is_no_mangle = true;
            }
            "call_conv" => {
                if is_calling_convention_specified {
                    return Err(error(scope, tag.range, "Duplicate 'call_conv' tag"));
                }

                calling_convention =
                    ready!(resolve_calling_convention_tag(info, jobs, arena, scope, tag));
                is_calling_convention_specified = true;
            }
            other => {
                return Err(error(
                    scope,
                    tag.name.range,
                    format!("Unknown tag '{other}'"),
                ));
            }
        }
    }

    let return_type = match declaration.return_type {
        Some(return_expression) => {
            let return_type = ready!(evaluate_type_expression(
                info,
                jobs,
                arena,
                scope,
                None,
                return_expression
            ));

            if !return_type.is_runtime_type() {
                return Err(error(
                    scope,
                    return_expression.range(),
                    format!("Function returns cannot be of type '{return_type}'"),
                ));
            }

            return_type
        }
        None => AnyType::Void,
    };

    if is_external && is_no_mangle {
        return Err(error(
            scope,
            declaration.range,
            "External functions cannot be no_mangle",
        ));
    }

    let function_type = FunctionTypeType {
        parameters: arena.alloc_slice_copy(&parameter_types),
        return_type: arena.alloc(return_type),
        calling_convention,
    };

    if !is_external && !declaration.has_body {
        // A signature with no body and no extern tag denotes a function type.
        if is_no_mangle {
            return Err(error(
                scope,
                declaration.range,
                "Function types cannot be no_mangle",
            ));
        }

        return done(TypedConstantValue {
            ty: AnyType::Type,
            value: AnyConstantValue::Type(AnyType::FunctionType(function_type)),
        });
    }

    let mut child_scopes = Vec::new();

    let body_scope: &'a ConstantScope<'a> = if is_external {
        if declaration.has_body {
            return Err(error(
                scope,
                declaration.range,
                "External functions cannot have a body",
            ));
        }

        arena.alloc(ConstantScope {
            statements: &[],
            declarations: DeclarationTable::empty(),
            scope_constants: &[],
            is_top_level: false,
            parent: Some(scope),
            source_file_path: None,
        })
    } else {
        let body_scope = arena.alloc(ConstantScope {
            statements: declaration.statements,
            declarations: DeclarationTable::build(arena, declaration.statements),
            scope_constants: &[],
            is_top_level: false,
            parent: Some(scope),
            source_file_path: None,
        });

        process_scope(
            jobs,
            arena,
            body_scope,
            declaration.statements,
            &mut child_scopes,
            false,
        )?;

        body_scope
    };

    let libraries =
        arena.alloc_slice_fill_iter(external_libraries.iter().map(|s| &*arena.alloc_str(s)));

    let function_constant = FunctionConstant {
        declaration,
        body_scope,
        child_scopes: arena.alloc_slice_copy(&child_scopes),
        is_external,
        external_libraries: libraries,
        is_no_mangle,
    };

    done(TypedConstantValue {
        ty: AnyType::FunctionType(function_type),
        value: AnyConstantValue::Function(function_constant),
    })
}

/// Collect `#extern(...)` parameters: strings or arrays of strings.
fn append_library_parameter<'a>(
    scope: &ConstantScope<'a>,
    range: FileRange,
    ty: AnyType<'a>,
    value: AnyConstantValue<'a>,
    libraries: &mut Vec<String>,
) -> Result<(), CompileError> {
    let element_is_string = |element: &AnyType<'a>| {
        matches!(
            element,
            AnyType::ArrayType(_) | AnyType::StaticArray { .. }
        )
    };

    match ty {
        AnyType::ArrayType(element_type) if element_is_string(element_type) => match value {
            AnyConstantValue::StaticArray(elements) => {
                for &element in elements {
                    libraries.push(static_array_to_string(scope, range, *element_type, element)?);
                }
                Ok(())
            }
            _ => Err(error(
                scope,
                range,
                "Cannot use an array with non-constant elements in a constant context",
            )),
        },
        AnyType::StaticArray { element_type, .. } if element_is_string(element_type) => {
            let elements = value.unwrap_static_array();
            for &element in elements {
                libraries.push(static_array_to_string(scope, range, *element_type, element)?);
            }
            Ok(())
        }
        AnyType::ArrayType(_) | AnyType::StaticArray { .. } => {
            libraries.push(static_array_to_string(scope, range, ty, value)?);
            Ok(())
        }
        _ => Err(error(
            scope,
            range,
            format!("Expected a string or array of strings, got '{ty}'"),
        )),
    }
}

pub fn do_resolve_polymorphic_function<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    declaration: &'a FunctionDeclaration<'a>,
    parameters: &'a [TypedConstantValue<'a>],
    scope: &'a ConstantScope<'a>,
    call_scope: &'a ConstantScope<'a>,
    call_parameter_ranges: &'a [FileRange],
) -> DelayedResult<(FunctionTypeType<'a>, FunctionConstant<'a>)> {
    let parameter_count = declaration.parameters.len();

    for tag in declaration.tags.iter() {
        match tag.name.text {
            "extern" => {
                return Err(error(
                    scope,
                    tag.range,
                    "Polymorphic functions cannot be external",
                ));
            }
            "no_mangle" => {
                return Err(error(
                    scope,
                    tag.range,
                    "Polymorphic functions cannot be no_mangle",
                ));
            }
            "call_conv" => {
                return Err(error(
                    scope,
                    tag.range,
                    "Polymorphic functions cannot have their calling convention specified",
                ));
            }
            other => {
                return Err(error(
                    scope,
                    tag.name.range,
                    format!("Unknown tag '{other}'"),
                ));
            }
        }
    }

    if !declaration.has_body {
        return Err(error(
            scope,
            declaration.range,
            "Polymorphic function missing a body",
        ));
    }

    // Bind each `$T` determiner to the (defaulted) type of its argument.
    let mut parameter_types: Vec<Option<AnyType<'a>>> = vec![None; parameter_count];
    let mut polymorphic_determiners = Vec::new();

    for (i, declaration_parameter) in declaration.parameters.iter().enumerate() {
        if let Some(determiner) = declaration_parameter.polymorphic_determiner {
            let ty = if declaration_parameter.is_constant {
                parameters[i].ty
            } else {
                coerce_to_default_type(info, call_scope, call_parameter_ranges[i], parameters[i].ty)?
            };

            parameter_types[i] = Some(ty);

            polymorphic_determiners.push(ScopeConstant {
                name: determiner.text,
                ty: AnyType::Type,
                value: AnyConstantValue::Type(ty),
            });
        }
    }

    let determiner_scope: &'a ConstantScope<'a> = arena.alloc(ConstantScope {
        statements: &[],
        declarations: DeclarationTable::empty(),
        scope_constants: arena.alloc_slice_copy(&polymorphic_determiners),
        is_top_level: false,
        parent: Some(scope),
        source_file_path: None,
    });

    // Resolve constant parameters' declared types under the determiners and
    // coerce the call-site constants to them.
    let mut scope_constants = polymorphic_determiners.clone();

    for (i, declaration_parameter) in declaration.parameters.iter().enumerate() {
        if declaration_parameter.is_constant {
            if !declaration_parameter.is_polymorphic_determiner() {
                let ty = ready!(evaluate_type_expression(
                    info,
                    jobs,
                    arena,
                    determiner_scope,
                    None,
                    declaration_parameter
                        .ty
                        .expect("constant parameter has a type")
                ));

                parameter_types[i] = Some(ty);
            }

            let parameter_type =
                parameter_types[i].expect("constant parameter type was resolved");

            let coerced_value = coerce_constant_to_type(
                info,
                arena,
                call_scope,
                call_parameter_ranges[i],
                parameters[i].ty,
                parameters[i].value,
                parameter_type,
            )?;

            scope_constants.push(ScopeConstant {
                name: declaration_parameter.name.text,
                ty: parameter_type,
                value: coerced_value,
            });
        }
    }

    let signature_scope: &'a ConstantScope<'a> = arena.alloc(ConstantScope {
        statements: &[],
        declarations: DeclarationTable::empty(),
        scope_constants: arena.alloc_slice_copy(&scope_constants),
        is_top_level: false,
        parent: Some(scope),
        source_file_path: None,
    });

    // Runtime parameters' declared types resolve under the full signature
    // scope.
    let mut runtime_parameter_types = Vec::new();
    for (i, declaration_parameter) in declaration.parameters.iter().enumerate() {
        if !declaration_parameter.is_constant {
            if !declaration_parameter.is_polymorphic_determiner() {
                let ty = ready!(evaluate_type_expression(
                    info,
                    jobs,
                    arena,
                    signature_scope,
                    None,
                    declaration_parameter
                        .ty
                        .expect("runtime parameter has a type")
                ));

                if !ty.is_runtime_type() {
                    return Err(error(
                        scope,
                        declaration_parameter.name.range,
                        format!("Non-constant function parameters cannot be of type '{ty}'"),
                    )
                    .with_note(
                        call_scope.file_path(),
                        call_parameter_ranges[i],
                        "Polymorphic function parameter here",
                    ));
                }

                parameter_types[i] = Some(ty);
            }

            runtime_parameter_types
                .push(parameter_types[i].expect("runtime parameter type was resolved"));
        }
    }

    let return_type = match declaration.return_type {
        Some(return_expression) => {
            let return_type = ready!(evaluate_type_expression(
                info,
                jobs,
                arena,
                signature_scope,
                None,
                return_expression
            ));

            if !return_type.is_runtime_type() {
                return Err(error(
                    scope,
                    return_expression.range(),
                    format!("Function returns cannot be of type '{return_type}'"),
                ));
            }

            return_type
        }
        None => AnyType::Void,
    };

    let body_scope: &'a ConstantScope<'a> = arena.alloc(ConstantScope {
        statements: declaration.statements,
        declarations: DeclarationTable::build(arena, declaration.statements),
        scope_constants: signature_scope.scope_constants,
        is_top_level: false,
        parent: Some(scope),
        source_file_path: None,
    });

    let mut child_scopes = Vec::new();
    process_scope(
        jobs,
        arena,
        body_scope,
        declaration.statements,
        &mut child_scopes,
        false,
    )?;

    let function_type = FunctionTypeType {
        parameters: arena.alloc_slice_copy(&runtime_parameter_types),
        return_type: arena.alloc(return_type),
        calling_convention: CallingConvention::Default,
    };

    let function_constant = FunctionConstant {
        declaration,
        body_scope,
        child_scopes: arena.alloc_slice_copy(&child_scopes),
        is_external: false,
        external_libraries: &[],
        is_no_mangle: false,
    };

    done((function_type, function_constant))
}

pub fn do_resolve_struct_definition<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    definition: &'a StructDefinition<'a>,
    scope: &'a ConstantScope<'a>,
) -> DelayedResult<AnyType<'a>> {
    if !definition.parameters.is_empty() {
        let mut parameter_types = Vec::with_capacity(definition.parameters.len());
        for parameter in definition.parameters.iter() {
            let ty = ready!(evaluate_type_expression(
                info,
                jobs,
                arena,
                scope,
                None,
                parameter.ty
            ));

            parameter_types.push(ty);
        }

        return done(AnyType::PolymorphicStruct(PolymorphicStruct {
            definition,
            parameter_types: arena.alloc_slice_copy(&parameter_types),
            parent: scope,
        }));
    }

    let member_scope: &'a ConstantScope<'a> = arena.alloc(ConstantScope {
        statements: &[],
        declarations: DeclarationTable::empty(),
        scope_constants: &[],
        is_top_level: false,
        parent: Some(scope),
        source_file_path: None,
    });

    let members = ready!(resolve_aggregate_members(
        info,
        jobs,
        arena,
        definition,
        member_scope
    ));

    done(AnyType::StructType(StructType {
        definition,
        members,
    }))
}

pub fn do_resolve_polymorphic_struct<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    definition: &'a StructDefinition<'a>,
    parameters: &'a [AnyConstantValue<'a>],
    scope: &'a ConstantScope<'a>,
) -> DelayedResult<AnyType<'a>> {
    debug_assert!(!definition.parameters.is_empty());

    let mut constant_parameters = Vec::with_capacity(definition.parameters.len());
    for (i, parameter) in definition.parameters.iter().enumerate() {
        let parameter_type = ready!(evaluate_type_expression(
            info,
            jobs,
            arena,
            scope,
            None,
            parameter.ty
        ));

        constant_parameters.push(ScopeConstant {
            name: parameter.name.text,
            ty: parameter_type,
            value: parameters[i],
        });
    }

    let member_scope: &'a ConstantScope<'a> = arena.alloc(ConstantScope {
        statements: &[],
        declarations: DeclarationTable::empty(),
        scope_constants: arena.alloc_slice_copy(&constant_parameters),
        is_top_level: false,
        parent: Some(scope),
        source_file_path: None,
    });

    let members = ready!(resolve_aggregate_members(
        info,
        jobs,
        arena,
        definition,
        member_scope
    ));

    done(AnyType::StructType(StructType {
        definition,
        members,
    }))
}

fn resolve_aggregate_members<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    definition: &'a StructDefinition<'a>,
    member_scope: &'a ConstantScope<'a>,
) -> DelayedResult<&'a [StructTypeMember<'a>]> {
    let mut members = Vec::with_capacity(definition.members.len());

    for member in definition.members.iter() {
        let member_type = ready!(evaluate_type_expression(
            info,
            jobs,
            arena,
            member_scope,
            None,
            member.ty
        ));

        let member_type =
            coerce_to_default_type(info, member_scope, member.ty.range(), member_type)?;

        if !member_type.is_runtime_type() {
            return Err(error(
                member_scope,
                member.ty.range(),
                format!("Struct members cannot be of type '{member_type}'"),
            ));
        }

        members.push(StructTypeMember {
            name: member.name.text,
            member_type,
        });
    }

    done(arena.alloc_slice_copy(&members))
}

pub fn do_resolve_enum_definition<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    definition: &'a EnumDefinition<'a>,
    scope: &'a ConstantScope<'a>,
) -> DelayedResult<AnyType<'a>> {
    let backing = match definition.backing_type {
        Some(backing_expression) => {
            let backing_type = ready!(evaluate_type_expression(
                info,
                jobs,
                arena,
                scope,
                None,
                backing_expression
            ));

            match backing_type {
                AnyType::Integer(integer) => integer,
                other => {
                    return Err(error(
                        scope,
                        backing_expression.range(),
                        format!("Enum backing type must be an integer type, got '{other}'"),
                    ));
                }
            }
        }
        None => Integer {
            size: info.architecture_sizes.default_integer_size,
            is_signed: true,
        },
    };

    let mut variants: Vec<EnumTypeVariant<'a>> = Vec::with_capacity(definition.variants.len());
    let mut next_value = 0u64;

    for variant in definition.variants.iter() {
        if variants.iter().any(|v| v.name == variant.name.text) {
            return Err(error(
                scope,
                variant.name.range,
                format!("Duplicate enum variant {}", variant.name.text),
            ));
        }

        let value = match variant.value {
            Some(value_expression) => {
                let value = ready!(evaluate_constant_expression(
                    info,
                    jobs,
                    arena,
                    scope,
                    None,
                    value_expression
                ));

                coerce_constant_to_integer_type(
                    scope,
                    value_expression.range(),
                    value.ty,
                    value.value,
                    backing,
                )?
            }
            None => {
                check_undetermined_integer_to_integer_coercion(
                    scope,
                    variant.name.range,
                    backing,
                    next_value as i64,
                )?;
                next_value
            }
        };

        variants.push(EnumTypeVariant {
            name: variant.name.text,
            value,
        });
        next_value = value.wrapping_add(1);
    }

    done(AnyType::Enum(EnumType {
        definition,
        backing,
        variants: arena.alloc_slice_copy(&variants),
    }))
}

// ---------------------------------------------------------------------------
// Scope processing

/// Walk a statement list and spawn resolution jobs for every declaration it
/// contains, recursing into block statements to pre-create their scopes (in
/// the order the IR generator will consume them).
pub fn process_scope<'a>(
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    scope: &'a ConstantScope<'a>,
    statements: &'a [&'a Statement<'a>],
    child_scopes: &mut Vec<&'a ConstantScope<'a>>,
    is_top_level: bool,
) -> Result<(), CompileError> {
    for &statement in statements {
        match statement {
            Statement::FunctionDeclaration(declaration) => {
                if !declaration.is_polymorphic() {
                    jobs.spawn_function_declaration(declaration, scope);
                }
            }
            Statement::ConstantDefinition(definition) => {
                jobs.spawn_constant_definition(definition, scope);
            }
            Statement::StructDefinition(definition) => {
                jobs.spawn_struct_definition(definition, scope);
            }
            Statement::EnumDefinition(definition) => {
                jobs.spawn_enum_definition(definition, scope);
            }
            Statement::VariableDeclaration(declaration) => {
                if is_top_level {
                    jobs.spawn_static_variable(declaration, scope);
                }
            }
            Statement::IfStatement {
                statements: then_statements,
                else_ifs,
                else_statements,
                ..
            } => {
                if is_top_level {
                    return Err(error(
                        scope,
                        statement.range(),
                        "This kind of statement cannot be top-level",
                    ));
                }

                let if_scope = new_block_scope(arena, scope, then_statements);
                child_scopes.push(if_scope);
                process_scope(jobs, arena, if_scope, then_statements, child_scopes, false)?;

                for else_if in else_ifs.iter() {
                    let else_if_scope = new_block_scope(arena, scope, else_if.statements);
                    child_scopes.push(else_if_scope);
                    process_scope(
                        jobs,
                        arena,
                        else_if_scope,
                        else_if.statements,
                        child_scopes,
                        false,
                    )?;
                }

                if !else_statements.is_empty() {
                    let else_scope = new_block_scope(arena, scope, else_statements);
                    child_scopes.push(else_scope);
                    process_scope(jobs, arena, else_scope, else_statements, child_scopes, false)?;
                }
            }
            Statement::WhileLoop {
                statements: body, ..
            } => {
                if is_top_level {
                    return Err(error(
                        scope,
                        statement.range(),
                        "This kind of statement cannot be top-level",
                    ));
                }

                let while_scope = new_block_scope(arena, scope, body);
                child_scopes.push(while_scope);
                process_scope(jobs, arena, while_scope, body, child_scopes, false)?;
            }
            Statement::ForLoop {
                statements: body, ..
            } => {
                if is_top_level {
                    return Err(error(
                        scope,
                        statement.range(),
                        "This kind of statement cannot be top-level",
                    ));
                }

                let for_scope = new_block_scope(arena, scope, body);
                child_scopes.push(for_scope);
                process_scope(jobs, arena, for_scope, body, child_scopes, false)?;
            }
            Statement::Import { absolute_path, .. } => {
                jobs.spawn_parse_file(absolute_path);
            }
            Statement::UsingStatement { .. } => {}
            Statement::StaticIf(static_if) => {
                jobs.spawn_static_if(static_if, scope, statement);
            }
            _ => {
                if is_top_level {
                    return Err(error(
                        scope,
                        statement.range(),
                        "This kind of statement cannot be top-level",
                    ));
                }
            }
        }
    }

    Ok(())
}

fn new_block_scope<'a>(
    arena: &'a Bump,
    parent: &'a ConstantScope<'a>,
    statements: &'a [&'a Statement<'a>],
) -> &'a ConstantScope<'a> {
    arena.alloc(ConstantScope {
        statements,
        declarations: DeclarationTable::build(arena, statements),
        scope_constants: &[],
        is_top_level: false,
        parent: Some(parent),
        source_file_path: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ArchitectureSizes;

    const SIZES: ArchitectureSizes = ArchitectureSizes {
        address_size: RegisterSize::Size64,
        default_integer_size: RegisterSize::Size64,
        default_float_size: RegisterSize::Size32,
        boolean_size: RegisterSize::Size8,
    };

    fn test_scope() -> ConstantScope<'static> {
        ConstantScope {
            statements: &[],
            declarations: DeclarationTable::empty(),
            scope_constants: &[],
            is_top_level: true,
            parent: None,
            source_file_path: Some("test.mica"),
        }
    }

    fn test_info() -> GlobalInfo<'static> {
        GlobalInfo {
            global_constants: &[],
            architecture_sizes: SIZES,
        }
    }

    #[test]
    fn undetermined_integer_range_checks() {
        let scope = test_scope();
        let target = Integer {
            size: RegisterSize::Size8,
            is_signed: false,
        };

        assert!(check_undetermined_integer_to_integer_coercion(
            &scope,
            FileRange::default(),
            target,
            255
        )
        .is_ok());

        let too_big = check_undetermined_integer_to_integer_coercion(
            &scope,
            FileRange::default(),
            target,
            256,
        )
        .unwrap_err();
        assert!(too_big.mentions("cannot fit in 'u8'"));

        let negative = check_undetermined_integer_to_integer_coercion(
            &scope,
            FileRange::default(),
            target,
            -1,
        )
        .unwrap_err();
        assert!(negative.mentions("cannot fit"));

        let signed = Integer {
            size: RegisterSize::Size8,
            is_signed: true,
        };
        assert!(check_undetermined_integer_to_integer_coercion(
            &scope,
            FileRange::default(),
            signed,
            -128
        )
        .is_ok());
        assert!(check_undetermined_integer_to_integer_coercion(
            &scope,
            FileRange::default(),
            signed,
            128
        )
        .is_err());
    }

    #[test]
    fn integer_coercion_requires_exact_match() {
        let scope = test_scope();

        let u16_type = Integer {
            size: RegisterSize::Size16,
            is_signed: false,
        };

        // Same size and signedness passes through.
        let value = coerce_constant_to_integer_type(
            &scope,
            FileRange::default(),
            AnyType::Integer(u16_type),
            AnyConstantValue::Integer(7),
            u16_type,
        )
        .unwrap();
        assert_eq!(value, 7);

        // Different signedness fails even at the same size.
        let error = coerce_constant_to_integer_type(
            &scope,
            FileRange::default(),
            AnyType::Integer(Integer {
                size: RegisterSize::Size16,
                is_signed: true,
            }),
            AnyConstantValue::Integer(7),
            u16_type,
        )
        .unwrap_err();
        assert!(error.mentions("Cannot implicitly convert 'i16' to 'u16'"));
    }

    #[test]
    fn coercion_to_same_type_is_identity() {
        let arena = Bump::new();
        let scope = test_scope();
        let info = test_info();

        let ty = AnyType::Boolean;
        let value = AnyConstantValue::Boolean(true);
        let coerced = coerce_constant_to_type(
            info,
            &arena,
            &scope,
            FileRange::default(),
            ty,
            value,
            ty,
        )
        .unwrap();
        assert!(constant_values_equal(value, coerced));
    }

    #[test]
    fn binary_operation_promotes_to_wider_signed() {
        let scope = test_scope();

        let ty = determine_binary_operation_type(
            &scope,
            FileRange::default(),
            AnyType::Integer(Integer {
                size: RegisterSize::Size16,
                is_signed: true,
            }),
            AnyType::Integer(Integer {
                size: RegisterSize::Size32,
                is_signed: false,
            }),
        )
        .unwrap();

        assert_eq!(
            ty,
            AnyType::Integer(Integer {
                size: RegisterSize::Size32,
                is_signed: true,
            })
        );
    }

    #[test]
    fn constant_arithmetic_wraps() {
        let arena = Bump::new();
        let scope = test_scope();
        let info = test_info();

        let u8_type = AnyType::Integer(Integer {
            size: RegisterSize::Size8,
            is_signed: false,
        });

        let result = evaluate_constant_binary_operation(
            info,
            &arena,
            &scope,
            FileRange::default(),
            BinaryOperator::Addition,
            FileRange::default(),
            u8_type,
            AnyConstantValue::Integer(200),
            FileRange::default(),
            u8_type,
            AnyConstantValue::Integer(100),
        )
        .unwrap();

        // Wrapping is modulo 2^64 on the stored representation; the low byte
        // is what reaches memory for a u8.
        assert_eq!(result.value.unwrap_integer(), 300);
        assert_eq!(truncate_integer(result.value.unwrap_integer(), RegisterSize::Size8), 44);
    }

    #[test]
    fn division_by_zero_is_reported() {
        let arena = Bump::new();
        let scope = test_scope();
        let info = test_info();

        let error = evaluate_constant_binary_operation(
            info,
            &arena,
            &scope,
            FileRange::default(),
            BinaryOperator::Division,
            FileRange::default(),
            AnyType::UndeterminedInteger,
            AnyConstantValue::Integer(1),
            FileRange::default(),
            AnyType::UndeterminedInteger,
            AnyConstantValue::Integer(0),
        )
        .unwrap_err();

        assert!(error.mentions("Division by zero"));
    }

    #[test]
    fn constant_cast_sign_extends_from_source() {
        let arena = Bump::new();
        let scope = test_scope();
        let info = test_info();

        // (i8)-1 cast to u64 keeps the sign-extended representation.
        let value = evaluate_constant_cast(
            info,
            &arena,
            &scope,
            AnyType::Integer(Integer {
                size: RegisterSize::Size8,
                is_signed: true,
            }),
            AnyConstantValue::Integer(0xFF),
            FileRange::default(),
            AnyType::Integer(Integer {
                size: RegisterSize::Size64,
                is_signed: false,
            }),
        )
        .unwrap();

        assert_eq!(value.unwrap_integer(), u64::MAX);
    }

    #[test]
    fn pointer_casts_require_unsigned_address_size(){
        let arena = Bump::new();
        let scope = test_scope();
        let info = test_info();

        let u8_pointer = AnyType::Pointer(arena.alloc(AnyType::Integer(Integer {
            size: RegisterSize::Size8,
            is_signed: false,
        })));

        let ok = evaluate_constant_cast(
            info,
            &arena,
            &scope,
            AnyType::Integer(Integer {
                size: RegisterSize::Size64,
                is_signed: false,
            }),
            AnyConstantValue::Integer(0x1000),
            FileRange::default(),
            u8_pointer,
        )
        .unwrap();
        assert_eq!(ok.unwrap_pointer(), 0x1000);

        let error = evaluate_constant_cast(
            info,
            &arena,
            &scope,
            AnyType::Integer(Integer {
                size: RegisterSize::Size32,
                is_signed: false,
            }),
            AnyConstantValue::Integer(0x1000),
            FileRange::default(),
            u8_pointer,
        )
        .unwrap_err();
        assert!(error.mentions("Cannot cast"));
    }

    #[test]
    fn undetermined_struct_coerces_to_array_constant() {
        let arena = Bump::new();
        let scope = test_scope();
        let info = test_info();

        let u8_type: &AnyType = arena.alloc(AnyType::Integer(Integer {
            size: RegisterSize::Size8,
            is_signed: false,
        }));

        let members = arena.alloc_slice_copy(&[
            StructTypeMember {
                name: "pointer",
                member_type: AnyType::UndeterminedInteger,
            },
            StructTypeMember {
                name: "length",
                member_type: AnyType::UndeterminedInteger,
            },
        ]);
        let values = arena.alloc_slice_copy(&[
            AnyConstantValue::Integer(0x2000),
            AnyConstantValue::Integer(5),
        ]);

        let coerced = coerce_constant_to_type(
            info,
            &arena,
            &scope,
            FileRange::default(),
            AnyType::UndeterminedStruct(UndeterminedStruct { members }),
            AnyConstantValue::Struct(values),
            AnyType::ArrayType(u8_type),
        )
        .unwrap();

        let array = coerced.unwrap_array();
        assert_eq!(array.pointer, 0x2000);
        assert_eq!(array.length, 5);
    }

    #[test]
    fn string_constants_render_back() {
        let arena = Bump::new();
        let scope = test_scope();

        let value = string_literal_value(&arena, "kernel32");
        let rendered =
            static_array_to_string(&scope, FileRange::default(), value.ty, value.value).unwrap();
        assert_eq!(rendered, "kernel32");
    }

    #[test]
    fn hash_table_finds_names_deterministically() {
        assert_eq!(calculate_string_hash("main"), calculate_string_hash("main"));
        assert_ne!(calculate_string_hash("main"), calculate_string_hash("mian"));
    }
}
