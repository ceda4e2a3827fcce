//! The IR generator.
//!
//! Lowers typed function bodies and static-variable initializers into the
//! flat instruction list of `ir.rs`. Submodules:
//!
//! - `coerce.rs` — runtime implicit coercion, into a register or through a
//!   store to a caller-provided address
//! - `expressions.rs` — expression lowering and runtime declaration search
//! - `statements.rs` — statement lowering and control-flow fixups
//! - `statics.rs` — typed little-endian byte images and literal interning
//!
//! Generation restarts from scratch whenever it suspends on another job, so
//! everything here builds local state and commits only on completion.

mod coerce;
mod expressions;
mod statements;
mod statics;

pub use coerce::{coerce_to_type_register, coerce_to_type_write};
pub use expressions::generate_expression;
pub use statements::generate_statement;
pub use statics::write_value;

use bumpalo::Bump;

use crate::ast::{FileRange, Identifier, Statement, VariableDeclaration};
use crate::constant::{
    coerce_constant_to_type, coerce_to_default_type, evaluate_constant_expression,
    evaluate_type_expression, static_array_to_string, AnyConstantValue, ConstantScope,
    FunctionConstant, GlobalInfo,
};
use crate::error::{done, error, CompileError, DelayedResult};
use crate::ir::{
    FloatArithmeticOperation, FloatComparisonOperation, Function, Instruction,
    IntegerArithmeticOperation, IntegerComparisonOperation, IrParameter, Register, StaticConstant,
    StaticVariable,
};
use crate::jobs::JobList;
use crate::ready;
use crate::types::{AnyType, FunctionTypeType, Integer, RegisterSize};

// ---------------------------------------------------------------------------
// Runtime values

/// What an expression lowered to: a still-foldable constant, a value in a
/// register, the address of a value in memory (aggregates and l-values), or
/// a struct literal whose members have not been coerced yet.
#[derive(Debug, Clone, Copy)]
pub enum AnyRuntimeValue<'a> {
    Constant(AnyConstantValue<'a>),
    Register(Register),
    Address(Register),
    UndeterminedStruct(&'a [AnyRuntimeValue<'a>]),
}

impl<'a> AnyRuntimeValue<'a> {
    pub fn unwrap_constant(self) -> AnyConstantValue<'a> {
        match self {
            AnyRuntimeValue::Constant(value) => value,
            _ => panic!("expected a constant runtime value"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TypedRuntimeValue<'a> {
    pub ty: AnyType<'a>,
    pub value: AnyRuntimeValue<'a>,
}

/// How a type travels through a call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterRepresentation {
    InRegister { size: RegisterSize, is_float: bool },
    Memory,
}

impl RegisterRepresentation {
    pub fn is_in_register(self) -> bool {
        matches!(self, RegisterRepresentation::InRegister { .. })
    }
}

pub fn get_type_representation(info: GlobalInfo, ty: AnyType) -> RegisterRepresentation {
    match ty {
        AnyType::Integer(integer) => RegisterRepresentation::InRegister {
            size: integer.size,
            is_float: false,
        },
        AnyType::Boolean => RegisterRepresentation::InRegister {
            size: info.architecture_sizes.boolean_size,
            is_float: false,
        },
        AnyType::FloatType(float_type) => RegisterRepresentation::InRegister {
            size: float_type.size,
            is_float: true,
        },
        AnyType::Pointer(_) => RegisterRepresentation::InRegister {
            size: info.architecture_sizes.address_size,
            is_float: false,
        },
        AnyType::Enum(enum_type) => RegisterRepresentation::InRegister {
            size: enum_type.backing.size,
            is_float: false,
        },
        AnyType::ArrayType(_) | AnyType::StaticArray { .. } | AnyType::StructType(_) => {
            RegisterRepresentation::Memory
        }
        _ => panic!("type '{ty}' has no register representation"),
    }
}

// ---------------------------------------------------------------------------
// Per-function generation state

#[derive(Debug, Clone)]
pub struct Variable<'a> {
    pub name: Identifier<'a>,
    pub ty: AnyType<'a>,
    pub address_register: Register,
}

#[derive(Debug)]
pub struct VariableScope<'a> {
    pub constant_scope: &'a ConstantScope<'a>,
    pub variables: Vec<Variable<'a>>,
}

#[derive(Debug)]
pub struct GenerationContext<'a> {
    pub return_type: AnyType<'a>,
    /// The trailing address parameter used when the return is by memory.
    pub return_parameter_register: Option<Register>,

    pub child_scopes: &'a [&'a ConstantScope<'a>],
    pub next_child_scope_index: usize,

    pub in_breakable_scope: bool,
    /// Instruction indices of pending break jumps awaiting their target.
    pub break_jumps: Vec<usize>,

    pub variable_scope_stack: Vec<VariableScope<'a>>,

    pub next_register: Register,

    /// Literal data interned while generating this function.
    pub static_constants: Vec<StaticConstant>,
    pub function_symbol: &'a str,
    pub function_path: &'a str,
    next_constant_index: usize,
}

impl<'a> GenerationContext<'a> {
    /// Deterministic name for the next interned literal.
    pub fn next_constant_name(&mut self) -> String {
        let name = format!("{}.const.{}", self.function_symbol, self.next_constant_index);
        self.next_constant_index += 1;
        name
    }
}

pub fn allocate_register(context: &mut GenerationContext) -> Register {
    let register = context.next_register;
    context.next_register += 1;
    register
}

pub fn add_new_variable<'a>(
    context: &mut GenerationContext<'a>,
    name: Identifier<'a>,
    address_register: Register,
    ty: AnyType<'a>,
) -> Result<(), CompileError> {
    let variable_scope = context
        .variable_scope_stack
        .last_mut()
        .expect("generation context has a variable scope");

    for variable in &variable_scope.variables {
        if variable.name.text == name.text {
            return Err(error(
                variable_scope.constant_scope,
                name.range,
                format!("Duplicate variable name {}", name.text),
            )
            .with_note(
                variable_scope.constant_scope.file_path(),
                variable.name.range,
                "Original declared here",
            ));
        }
    }

    variable_scope.variables.push(Variable {
        name,
        ty,
        address_register,
    });

    Ok(())
}

// ---------------------------------------------------------------------------
// Instruction append helpers

pub fn append_integer_arithmetic(
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    operation: IntegerArithmeticOperation,
    size: RegisterSize,
    source_a: Register,
    source_b: Register,
) -> Register {
    let destination = allocate_register(context);
    instructions.push(Instruction::IntegerArithmetic {
        operation,
        size,
        source_a,
        source_b,
        destination,
    });
    destination
}

pub fn append_integer_comparison(
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    operation: IntegerComparisonOperation,
    size: RegisterSize,
    source_a: Register,
    source_b: Register,
) -> Register {
    let destination = allocate_register(context);
    instructions.push(Instruction::IntegerComparison {
        operation,
        size,
        source_a,
        source_b,
        destination,
    });
    destination
}

pub fn append_integer_extension(
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    is_signed: bool,
    source_size: RegisterSize,
    destination_size: RegisterSize,
    source: Register,
) -> Register {
    let destination = allocate_register(context);
    instructions.push(Instruction::IntegerExtension {
        is_signed,
        source_size,
        destination_size,
        source,
        destination,
    });
    destination
}

pub fn append_integer_truncation(
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    source_size: RegisterSize,
    destination_size: RegisterSize,
    source: Register,
) -> Register {
    let destination = allocate_register(context);
    instructions.push(Instruction::IntegerTruncation {
        source_size,
        destination_size,
        source,
        destination,
    });
    destination
}

pub fn append_integer_constant(
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    size: RegisterSize,
    value: u64,
) -> Register {
    let destination = allocate_register(context);
    instructions.push(Instruction::IntegerConstant {
        size,
        value,
        destination,
    });
    destination
}

pub fn append_float_arithmetic(
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    operation: FloatArithmeticOperation,
    size: RegisterSize,
    source_a: Register,
    source_b: Register,
) -> Register {
    let destination = allocate_register(context);
    instructions.push(Instruction::FloatArithmetic {
        operation,
        size,
        source_a,
        source_b,
        destination,
    });
    destination
}

pub fn append_float_comparison(
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    operation: FloatComparisonOperation,
    size: RegisterSize,
    source_a: Register,
    source_b: Register,
) -> Register {
    let destination = allocate_register(context);
    instructions.push(Instruction::FloatComparison {
        operation,
        size,
        source_a,
        source_b,
        destination,
    });
    destination
}

pub fn append_float_conversion(
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    source_size: RegisterSize,
    destination_size: RegisterSize,
    source: Register,
) -> Register {
    let destination = allocate_register(context);
    instructions.push(Instruction::FloatConversion {
        source_size,
        destination_size,
        source,
        destination,
    });
    destination
}

pub fn append_float_truncation(
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    source_size: RegisterSize,
    destination_size: RegisterSize,
    source: Register,
) -> Register {
    let destination = allocate_register(context);
    instructions.push(Instruction::FloatTruncation {
        source_size,
        destination_size,
        source,
        destination,
    });
    destination
}

pub fn append_float_from_integer(
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    is_signed: bool,
    source_size: RegisterSize,
    destination_size: RegisterSize,
    source: Register,
) -> Register {
    let destination = allocate_register(context);
    instructions.push(Instruction::FloatFromInteger {
        is_signed,
        source_size,
        destination_size,
        source,
        destination,
    });
    destination
}

pub fn append_float_constant(
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    size: RegisterSize,
    value: f64,
) -> Register {
    let destination = allocate_register(context);
    instructions.push(Instruction::FloatConstant {
        size,
        value,
        destination,
    });
    destination
}

pub fn append_reference_static(
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    name: &str,
) -> Register {
    let destination = allocate_register(context);
    instructions.push(Instruction::ReferenceStatic {
        name: name.to_string(),
        destination,
    });
    destination
}

pub fn append_allocate_local(
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    size: u64,
    alignment: u64,
) -> Register {
    let destination = allocate_register(context);
    instructions.push(Instruction::AllocateLocal {
        size,
        alignment,
        destination,
    });
    destination
}

pub fn append_branch(
    instructions: &mut Vec<Instruction>,
    condition: Register,
    destination_instruction: usize,
) {
    instructions.push(Instruction::Branch {
        condition,
        destination_instruction,
    });
}

pub fn append_jump(instructions: &mut Vec<Instruction>, destination_instruction: usize) {
    instructions.push(Instruction::Jump {
        destination_instruction,
    });
}

/// Placeholder destination for forward jumps, patched via [`patch_jump`].
pub const PENDING_JUMP: usize = usize::MAX;

/// Fix a previously-appended branch or jump to point at `destination`.
pub fn patch_jump(instructions: &mut [Instruction], index: usize, destination: usize) {
    match &mut instructions[index] {
        Instruction::Branch {
            destination_instruction,
            ..
        }
        | Instruction::Jump {
            destination_instruction,
        } => *destination_instruction = destination,
        other => panic!("cannot patch non-jump instruction {other}"),
    }
}

pub fn append_copy_memory(
    instructions: &mut Vec<Instruction>,
    length: u64,
    source_address: Register,
    destination_address: Register,
    alignment: u64,
) {
    instructions.push(Instruction::CopyMemory {
        length,
        source_address,
        destination_address,
        alignment,
    });
}

pub fn append_load_integer(
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    size: RegisterSize,
    address: Register,
) -> Register {
    let destination = allocate_register(context);
    instructions.push(Instruction::LoadInteger {
        size,
        address,
        destination,
    });
    destination
}

pub fn append_store_integer(
    instructions: &mut Vec<Instruction>,
    size: RegisterSize,
    source: Register,
    address: Register,
) {
    instructions.push(Instruction::StoreInteger {
        size,
        source,
        address,
    });
}

pub fn append_load_float(
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    size: RegisterSize,
    address: Register,
) -> Register {
    let destination = allocate_register(context);
    instructions.push(Instruction::LoadFloat {
        size,
        address,
        destination,
    });
    destination
}

pub fn append_store_float(
    instructions: &mut Vec<Instruction>,
    size: RegisterSize,
    source: Register,
    address: Register,
) {
    instructions.push(Instruction::StoreFloat {
        size,
        source,
        address,
    });
}

/// Address of `base + offset` in a fresh register.
pub fn generate_address_offset(
    info: GlobalInfo,
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    base_address: Register,
    offset: u64,
) -> Register {
    let offset_register = append_integer_constant(
        context,
        instructions,
        info.architecture_sizes.address_size,
        offset,
    );

    append_integer_arithmetic(
        context,
        instructions,
        IntegerArithmeticOperation::Add,
        info.architecture_sizes.address_size,
        base_address,
        offset_register,
    )
}

/// Boolean NOT via comparison against zero.
pub fn generate_boolean_invert(
    info: GlobalInfo,
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    value: Register,
) -> Register {
    let zero_register = append_integer_constant(
        context,
        instructions,
        info.architecture_sizes.boolean_size,
        0,
    );

    append_integer_comparison(
        context,
        instructions,
        IntegerComparisonOperation::Equal,
        info.architecture_sizes.boolean_size,
        value,
        zero_register,
    )
}

/// Materialize an integer-typed runtime value into a register.
pub fn generate_in_register_integer_value(
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    ty: Integer,
    value: AnyRuntimeValue,
) -> Register {
    match value {
        AnyRuntimeValue::Constant(constant) => {
            append_integer_constant(context, instructions, ty.size, constant.unwrap_integer())
        }
        AnyRuntimeValue::Register(register) => register,
        AnyRuntimeValue::Address(address) => {
            append_load_integer(context, instructions, ty.size, address)
        }
        AnyRuntimeValue::UndeterminedStruct(_) => {
            panic!("undetermined struct cannot be an integer")
        }
    }
}

pub fn generate_in_register_boolean_value(
    info: GlobalInfo,
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    value: AnyRuntimeValue,
) -> Register {
    match value {
        AnyRuntimeValue::Constant(constant) => append_integer_constant(
            context,
            instructions,
            info.architecture_sizes.boolean_size,
            constant.unwrap_boolean() as u64,
        ),
        AnyRuntimeValue::Register(register) => register,
        AnyRuntimeValue::Address(address) => append_load_integer(
            context,
            instructions,
            info.architecture_sizes.boolean_size,
            address,
        ),
        AnyRuntimeValue::UndeterminedStruct(_) => {
            panic!("undetermined struct cannot be a boolean")
        }
    }
}

pub fn generate_in_register_pointer_value(
    info: GlobalInfo,
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    value: AnyRuntimeValue,
) -> Register {
    match value {
        AnyRuntimeValue::Constant(constant) => append_integer_constant(
            context,
            instructions,
            info.architecture_sizes.address_size,
            constant.unwrap_pointer(),
        ),
        AnyRuntimeValue::Register(register) => register,
        AnyRuntimeValue::Address(address) => append_load_integer(
            context,
            instructions,
            info.architecture_sizes.address_size,
            address,
        ),
        AnyRuntimeValue::UndeterminedStruct(_) => {
            panic!("undetermined struct cannot be a pointer")
        }
    }
}

// ---------------------------------------------------------------------------
// Function generation

/// Generate the IR for a resolved function, yielding the finished function
/// record and any literal data it interned.
pub fn do_generate_function<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    ty: FunctionTypeType<'a>,
    value: FunctionConstant<'a>,
    symbol: &'a str,
) -> DelayedResult<(Function, Vec<StaticConstant>)> {
    let declaration = value.declaration;
    let path = value.body_scope.file_path();

    let return_representation = if *ty.return_type == AnyType::Void {
        None
    } else {
        Some(get_type_representation(info, *ty.return_type))
    };

    let mut ir_parameters = Vec::with_capacity(ty.parameters.len() + 1);
    for &parameter_type in ty.parameters {
        match get_type_representation(info, parameter_type) {
            RegisterRepresentation::InRegister { size, is_float } => {
                ir_parameters.push(IrParameter { size, is_float });
            }
            RegisterRepresentation::Memory => {
                // Aggregates are passed by address.
                ir_parameters.push(IrParameter {
                    size: info.architecture_sizes.address_size,
                    is_float: false,
                });
            }
        }
    }

    let return_by_memory = matches!(return_representation, Some(RegisterRepresentation::Memory));
    if return_by_memory {
        ir_parameters.push(IrParameter {
            size: info.architecture_sizes.address_size,
            is_float: false,
        });
    }

    let ir_return = match return_representation {
        Some(RegisterRepresentation::InRegister { size, is_float }) => {
            Some(IrParameter { size, is_float })
        }
        _ => None,
    };

    let mut function = Function {
        name: symbol.to_string(),
        path: path.to_string(),
        range: declaration.range,
        parameters: ir_parameters,
        return_: ir_return,
        calling_convention: ty.calling_convention,
        is_external: value.is_external,
        is_no_mangle: value.is_external || value.is_no_mangle,
        libraries: value
            .external_libraries
            .iter()
            .map(|library| library.to_string())
            .collect(),
        instructions: Vec::new(),
    };

    if value.is_external {
        return done((function, Vec::new()));
    }

    let ir_parameter_count = function.parameters.len();

    let mut context = GenerationContext {
        return_type: *ty.return_type,
        return_parameter_register: return_by_memory.then(|| ir_parameter_count - 1),
        child_scopes: value.child_scopes,
        next_child_scope_index: 0,
        in_breakable_scope: false,
        break_jumps: Vec::new(),
        variable_scope_stack: vec![VariableScope {
            constant_scope: value.body_scope,
            variables: Vec::new(),
        }],
        next_register: ir_parameter_count,
        static_constants: Vec::new(),
        function_symbol: symbol,
        function_path: path,
        next_constant_index: 0,
    };

    let mut instructions = Vec::new();

    // Prologue: spill each runtime parameter into a local slot and bind it.
    let mut runtime_parameter_index = 0;
    for declaration_parameter in declaration.parameters.iter() {
        if declaration_parameter.is_constant {
            continue;
        }

        let parameter_type = ty.parameters[runtime_parameter_index];
        let size = parameter_type.size(info.architecture_sizes);
        let alignment = parameter_type.alignment(info.architecture_sizes);

        let address_register = append_allocate_local(&mut context, &mut instructions, size, alignment);

        match get_type_representation(info, parameter_type) {
            RegisterRepresentation::InRegister {
                size: value_size,
                is_float,
            } => {
                if is_float {
                    append_store_float(
                        &mut instructions,
                        value_size,
                        runtime_parameter_index,
                        address_register,
                    );
                } else {
                    append_store_integer(
                        &mut instructions,
                        value_size,
                        runtime_parameter_index,
                        address_register,
                    );
                }
            }
            RegisterRepresentation::Memory => {
                append_copy_memory(
                    &mut instructions,
                    size,
                    runtime_parameter_index,
                    address_register,
                    alignment,
                );
            }
        }

        add_new_variable(
            &mut context,
            declaration_parameter.name,
            address_register,
            parameter_type,
        )?;

        runtime_parameter_index += 1;
    }

    debug_assert_eq!(runtime_parameter_index, ty.parameters.len());

    for &statement in declaration.statements {
        if !statements::is_not_runtime_statement(statement) {
            ready!(generate_statement(
                info,
                jobs,
                arena,
                value.body_scope,
                &mut context,
                &mut instructions,
                statement
            ));
        }
    }

    debug_assert_eq!(context.next_child_scope_index, context.child_scopes.len());

    let has_return_at_end = matches!(
        declaration.statements.last(),
        Some(Statement::ReturnStatement { .. })
    );

    if !has_return_at_end {
        if *ty.return_type != AnyType::Void {
            return Err(error(
                value.body_scope,
                declaration.range,
                format!("Function '{}' must end with a return", declaration.name.text),
            ));
        }

        instructions.push(Instruction::Return { value: None });
    }

    function.instructions = instructions;

    done((function, context.static_constants))
}

// ---------------------------------------------------------------------------
// Static variable generation

pub fn do_generate_static_variable<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    declaration: &'a VariableDeclaration<'a>,
    scope: &'a ConstantScope<'a>,
    job_index: usize,
) -> DelayedResult<(StaticVariable, AnyType<'a>)> {
    let mut is_external = false;
    let mut libraries: Vec<String> = Vec::new();
    let mut is_no_mangle = false;

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

                    libraries.push(static_array_to_string(
                        scope,
                        parameter_expression.range(),
                        parameter.ty,
                        parameter.value,
                    )?);
                }

                is_external = true;
            }
            "no_mangle" => {
                if is_no_mangle {
                    return Err(error(scope, tag.range, "Duplicate 'no_mangle' tag"));
                }

                is_no_mangle = true;
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

    if is_external && is_no_mangle {
        return Err(error(
            scope,
            declaration.range,
            "External variables cannot be no_mangle",
        ));
    }

    let symbol = if is_external || is_no_mangle {
        declaration.name.text.to_string()
    } else {
        format!("{}.{}", declaration.name.text, job_index)
    };

    if is_external {
        if declaration.initializer.is_some() {
            return Err(error(
                scope,
                declaration.range,
                "External variables cannot have initializers",
            ));
        }

        let Some(type_expression) = declaration.ty else {
            return Err(error(
                scope,
                declaration.range,
                "External variables must have a type",
            ));
        };

        let ty = ready!(evaluate_type_expression(
            info,
            jobs,
            arena,
            scope,
            None,
            type_expression
        ));

        if !ty.is_runtime_type() {
            return Err(error(
                scope,
                type_expression.range(),
                format!("Cannot create variables of type '{ty}'"),
            ));
        }

        let static_variable = StaticVariable {
            name: symbol,
            path: scope.file_path().to_string(),
            range: declaration.range,
            size: ty.size(info.architecture_sizes),
            alignment: ty.alignment(info.architecture_sizes),
            is_external: true,
            is_no_mangle: true,
            libraries,
            initial_data: None,
        };

        return done((static_variable, ty));
    }

    let (ty, initial_data) = match (declaration.ty, declaration.initializer) {
        (Some(type_expression), Some(initializer)) => {
            let ty = ready!(evaluate_type_expression(
                info,
                jobs,
                arena,
                scope,
                None,
                type_expression
            ));

            if !ty.is_runtime_type() {
                return Err(error(
                    scope,
                    type_expression.range(),
                    format!("Cannot create variables of type '{ty}'"),
                ));
            }

            let initial_value = ready!(evaluate_constant_expression(
                info,
                jobs,
                arena,
                scope,
                None,
                initializer
            ));

            let coerced_value = coerce_constant_to_type(
                info,
                arena,
                scope,
                initializer.range(),
                initial_value.ty,
                initial_value.value,
                ty,
            )?;

            let mut data = vec![0u8; ty.size(info.architecture_sizes) as usize];
            write_value(info, &mut data, 0, ty, coerced_value);

            (ty, Some(data))
        }
        (Some(type_expression), None) => {
            let ty = ready!(evaluate_type_expression(
                info,
                jobs,
                arena,
                scope,
                None,
                type_expression
            ));

            if !ty.is_runtime_type() {
                return Err(error(
                    scope,
                    type_expression.range(),
                    format!("Cannot create variables of type '{ty}'"),
                ));
            }

            (ty, None)
        }
        (None, Some(initializer)) => {
            let initial_value = ready!(evaluate_constant_expression(
                info,
                jobs,
                arena,
                scope,
                None,
                initializer
            ));

            let ty = coerce_to_default_type(info, scope, initializer.range(), initial_value.ty)?;

            if !ty.is_runtime_type() {
                return Err(error(
                    scope,
                    initializer.range(),
                    format!("Cannot create variables of type '{ty}'"),
                ));
            }

            let coerced_value = coerce_constant_to_type(
                info,
                arena,
                scope,
                initializer.range(),
                initial_value.ty,
                initial_value.value,
                ty,
            )?;

            let mut data = vec![0u8; ty.size(info.architecture_sizes) as usize];
            write_value(info, &mut data, 0, ty, coerced_value);

            (ty, Some(data))
        }
        (None, None) => {
            return Err(error(
                scope,
                declaration.range,
                "Variable declarations must have a type or an initializer",
            ));
        }
    };

    let static_variable = StaticVariable {
        name: symbol,
        path: scope.file_path().to_string(),
        range: declaration.range,
        size: ty.size(info.architecture_sizes),
        alignment: ty.alignment(info.architecture_sizes),
        is_external: false,
        is_no_mangle,
        libraries,
        initial_data,
    };

    done((static_variable, ty))
}

/// Helper shared by call sites that need a range for an expression list.
pub(crate) fn expression_ranges(expressions: &[&crate::ast::Expression]) -> Vec<FileRange> {
    expressions.iter().map(|expression| expression.range()).collect()
}
