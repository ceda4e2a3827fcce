//! Expression lowering.
//!
//! Produces [`TypedRuntimeValue`]s: constants are carried as long as possible
//! for folding, l-values become address values, and everything else lands in
//! registers. Shares all coercion and constant-folding rules with the
//! constant evaluator.

use bumpalo::Bump;

use crate::ast::{BinaryOperator, Expression, FileRange, Statement, UnaryOperator};
use crate::constant::{
    calculate_string_hash, coerce_constant_to_integer_type, coerce_to_default_type,
    evaluate_constant_binary_operation, evaluate_constant_cast, evaluate_constant_expression,
    evaluate_constant_index, determine_binary_operation_type, get_simple_resolved_declaration,
    is_declaration_public, match_declaration, match_public_declaration, string_literal_value,
    AnyConstantValue, ConstantScope, DeclarationTable, GlobalInfo, TypedConstantValue,
};
use crate::error::{done, error, wait, DelayedResult};
use crate::ir::{
    CallReturn, FloatArithmeticOperation, FloatComparisonOperation, FunctionCallParameter,
    Instruction, IntegerArithmeticOperation, IntegerComparisonOperation, Register,
};
use crate::jobs::{JobKind, JobList, JobState, PolymorphicFunctionMatch, PolymorphicStructMatch};
use crate::ready;
use crate::types::{AnyType, FunctionTypeType, Integer, RegisterSize};

use super::coerce::{
    coerce_to_integer_register_value, coerce_to_float_register_value,
    coerce_to_pointer_register_value, coerce_to_type_register, coerce_to_type_write,
};
use super::statics::register_static_array_constant;
use super::{
    allocate_register, append_allocate_local, append_copy_memory, append_float_arithmetic,
    append_float_comparison, append_float_constant, append_float_conversion,
    append_float_from_integer, append_float_truncation, append_integer_arithmetic,
    append_integer_comparison, append_integer_constant, append_integer_extension,
    append_integer_truncation, append_load_float, append_load_integer, append_reference_static,
    generate_address_offset, generate_boolean_invert, generate_in_register_boolean_value,
    generate_in_register_pointer_value, get_type_representation, AnyRuntimeValue,
    GenerationContext, RegisterRepresentation, TypedRuntimeValue,
};

/// Search one scope level for a name in a runtime context. Identical to the
/// constant search except that top-level variable declarations resolve to the
/// address of their static storage.
#[allow(clippy::too_many_arguments)]
fn search_for_runtime_declaration<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    context: &mut GenerationContext<'a>,
    instructions: &mut Vec<Instruction>,
    name: &str,
    name_hash: u32,
    scope: &'a ConstantScope<'a>,
    statements: &'a [&'a Statement<'a>],
    declarations: DeclarationTable<'a>,
    external: bool,
) -> DelayedResult<Option<TypedRuntimeValue<'a>>> {
    if let Some(declaration) = declarations.search(name_hash, name) {
        if external && !is_declaration_public(declaration) {
            return done(None);
        }

        let value = ready!(get_simple_resolved_declaration(info, jobs, scope, declaration));
        return done(Some(TypedRuntimeValue {
            ty: value.ty,
            value: AnyRuntimeValue::Constant(value.value),
        }));
    }

    for &statement in statements {
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

                let search_value = ready!(search_for_runtime_declaration(
                    info,
                    jobs,
                    arena,
                    context,
                    instructions,
                    name,
                    name_hash,
                    module_scope,
                    module_scope.statements,
                    module_scope.declarations,
                    true
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

                        let search_value = ready!(search_for_runtime_declaration(
                            info,
                            jobs,
                            arena,
                            context,
                            instructions,
                            name,
                            name_hash,
                            scope,
                            static_if.statements,
                            branch_declarations,
                            false
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
            Statement::VariableDeclaration(variable_declaration) => {
                if scope.is_top_level && variable_declaration.name.text == name {
                    let mut matched = None;
                    for (index, job) in jobs.jobs.iter().enumerate() {
                        if let JobKind::TypeStaticVariable {
                            declaration: job_declaration,
                            resolved,
                            ..
                        } = &job.kind
                        {
                            if std::ptr::eq(*job_declaration, variable_declaration) {
                                matched = Some((index, job.state, *resolved));
                                break;
                            }
                        }
                    }

                    let Some((index, state, resolved)) = matched else {
                        unreachable!("static variable was never scheduled")
                    };

                    if state == JobState::Done {
                        let (ty, symbol) =
                            resolved.expect("completed static variable has a record");

                        let address_register =
                            append_reference_static(context, instructions, symbol);

                        return done(Some(TypedRuntimeValue {
                            ty,
                            value: AnyRuntimeValue::Address(address_register),
                        }));
                    }

                    return wait(index);
                }
            }
            _ => {}
        }
    }

    for scope_constant in scope.scope_constants {
        if scope_constant.name == name {
            return done(Some(TypedRuntimeValue {
                ty: scope_constant.ty,
                value: AnyRuntimeValue::Constant(scope_constant.value),
            }));
        }
    }

    done(None)
}

/// Evaluate a type expression in a runtime position.
pub fn evaluate_type_expression_runtime<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    scope: &'a ConstantScope<'a>,
    context: &mut GenerationContext<'a>,
    instructions: &mut Vec<Instruction>,
    expression: &'a Expression<'a>,
) -> DelayedResult<AnyType<'a>> {
    let expression_value = ready!(generate_expression(
        info,
        jobs,
        arena,
        scope,
        context,
        instructions,
        expression
    ));

    if expression_value.ty == AnyType::Type {
        done(expression_value.value.unwrap_constant().unwrap_type())
    } else {
        Err(error(
            scope,
            expression.range(),
            format!("Expected a type, got {}", expression_value.ty),
        ))
    }
}

pub fn generate_binary_operation<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    scope: &'a ConstantScope<'a>,
    context: &mut GenerationContext<'a>,
    instructions: &mut Vec<Instruction>,
    range: FileRange,
    left_expression: &'a Expression<'a>,
    right_expression: &'a Expression<'a>,
    operator: BinaryOperator,
) -> DelayedResult<TypedRuntimeValue<'a>> {
    let left = ready!(generate_expression(
        info,
        jobs,
        arena,
        scope,
        context,
        instructions,
        left_expression
    ));

    let right = ready!(generate_expression(
        info,
        jobs,
        arena,
        scope,
        context,
        instructions,
        right_expression
    ));

    done(generate_binary_operation_values(
        info,
        arena,
        scope,
        context,
        instructions,
        range,
        left_expression.range(),
        left,
        right_expression.range(),
        right,
        operator,
    )?)
}

/// Lower a binary operation whose operands are already evaluated. Used
/// directly by compound assignment, which must evaluate its target once.
#[allow(clippy::too_many_arguments)]
pub fn generate_binary_operation_values<'a>(
    info: GlobalInfo<'a>,
    arena: &'a Bump,
    scope: &'a ConstantScope<'a>,
    context: &mut GenerationContext<'a>,
    instructions: &mut Vec<Instruction>,
    range: FileRange,
    left_range: FileRange,
    left: TypedRuntimeValue<'a>,
    right_range: FileRange,
    right: TypedRuntimeValue<'a>,
    operator: BinaryOperator,
) -> Result<TypedRuntimeValue<'a>, crate::error::CompileError> {
    if let (AnyRuntimeValue::Constant(left_constant), AnyRuntimeValue::Constant(right_constant)) =
        (left.value, right.value)
    {
        let constant = evaluate_constant_binary_operation(
            info,
            arena,
            scope,
            range,
            operator,
            left_range,
            left.ty,
            left_constant,
            right_range,
            right.ty,
            right_constant,
        )?;

        return Ok(TypedRuntimeValue {
            ty: constant.ty,
            value: AnyRuntimeValue::Constant(constant.value),
        });
    }

    let ty = determine_binary_operation_type(scope, range, left.ty, right.ty)?;
    let determined_type = coerce_to_default_type(info, scope, range, ty)?;

    match determined_type {
        AnyType::Integer(integer) => {
            let left_register = coerce_to_integer_register_value(
                scope,
                context,
                instructions,
                left_range,
                left.ty,
                left.value,
                integer,
            )?;

            let right_register = coerce_to_integer_register_value(
                scope,
                context,
                instructions,
                right_range,
                right.ty,
                right.value,
                integer,
            )?;

            let arithmetic_operation = match operator {
                BinaryOperator::Addition => Some(IntegerArithmeticOperation::Add),
                BinaryOperator::Subtraction => Some(IntegerArithmeticOperation::Subtract),
                BinaryOperator::Multiplication => Some(IntegerArithmeticOperation::Multiply),
                BinaryOperator::Division => Some(if integer.is_signed {
                    IntegerArithmeticOperation::SignedDivide
                } else {
                    IntegerArithmeticOperation::UnsignedDivide
                }),
                BinaryOperator::Modulo => Some(if integer.is_signed {
                    IntegerArithmeticOperation::SignedModulus
                } else {
                    IntegerArithmeticOperation::UnsignedModulus
                }),
                BinaryOperator::BitwiseAnd => Some(IntegerArithmeticOperation::BitwiseAnd),
                BinaryOperator::BitwiseOr => Some(IntegerArithmeticOperation::BitwiseOr),
                _ => None,
            };

            if let Some(operation) = arithmetic_operation {
                let result_register = append_integer_arithmetic(
                    context,
                    instructions,
                    operation,
                    integer.size,
                    left_register,
                    right_register,
                );

                return Ok(TypedRuntimeValue {
                    ty: AnyType::Integer(integer),
                    value: AnyRuntimeValue::Register(result_register),
                });
            }

            let (comparison_operation, invert) = match operator {
                BinaryOperator::Equal => (IntegerComparisonOperation::Equal, false),
                BinaryOperator::NotEqual => (IntegerComparisonOperation::Equal, true),
                BinaryOperator::LessThan => (
                    if integer.is_signed {
                        IntegerComparisonOperation::SignedLessThan
                    } else {
                        IntegerComparisonOperation::UnsignedLessThan
                    },
                    false,
                ),
                BinaryOperator::GreaterThan => (
                    if integer.is_signed {
                        IntegerComparisonOperation::SignedGreaterThan
                    } else {
                        IntegerComparisonOperation::UnsignedGreaterThan
                    },
                    false,
                ),
                _ => {
                    return Err(error(
                        scope,
                        range,
                        "Cannot perform that operation on integers",
                    ));
                }
            };

            let mut result_register = append_integer_comparison(
                context,
                instructions,
                comparison_operation,
                integer.size,
                left_register,
                right_register,
            );

            if invert {
                result_register =
                    generate_boolean_invert(info, context, instructions, result_register);
            }

            Ok(TypedRuntimeValue {
                ty: AnyType::Boolean,
                value: AnyRuntimeValue::Register(result_register),
            })
        }
        AnyType::Boolean => {
            if left.ty != AnyType::Boolean {
                return Err(error(
                    scope,
                    left_range,
                    format!("Expected 'bool', got '{}'", left.ty),
                ));
            }
            if right.ty != AnyType::Boolean {
                return Err(error(
                    scope,
                    right_range,
                    format!("Expected 'bool', got '{}'", right.ty),
                ));
            }

            let left_register =
                generate_in_register_boolean_value(info, context, instructions, left.value);
            let right_register =
                generate_in_register_boolean_value(info, context, instructions, right.value);

            // Boolean and/or lower to bitwise ops on the boolean
            // representation; there is no short-circuiting at this level.
            let arithmetic_operation = match operator {
                BinaryOperator::BooleanAnd => Some(IntegerArithmeticOperation::BitwiseAnd),
                BinaryOperator::BooleanOr => Some(IntegerArithmeticOperation::BitwiseOr),
                _ => None,
            };

            let result_register = if let Some(operation) = arithmetic_operation {
                append_integer_arithmetic(
                    context,
                    instructions,
                    operation,
                    info.architecture_sizes.boolean_size,
                    left_register,
                    right_register,
                )
            } else {
                let invert = match operator {
                    BinaryOperator::Equal => false,
                    BinaryOperator::NotEqual => true,
                    _ => {
                        return Err(error(
                            scope,
                            range,
                            "Cannot perform that operation on 'bool'",
                        ));
                    }
                };

                let mut result_register = append_integer_comparison(
                    context,
                    instructions,
                    IntegerComparisonOperation::Equal,
                    info.architecture_sizes.boolean_size,
                    left_register,
                    right_register,
                );

                if invert {
                    result_register =
                        generate_boolean_invert(info, context, instructions, result_register);
                }

                result_register
            };

            Ok(TypedRuntimeValue {
                ty: AnyType::Boolean,
                value: AnyRuntimeValue::Register(result_register),
            })
        }
        AnyType::FloatType(float_type) => {
            let left_register = coerce_to_float_register_value(
                scope,
                context,
                instructions,
                left_range,
                left.ty,
                left.value,
                float_type,
            )?;

            let right_register = coerce_to_float_register_value(
                scope,
                context,
                instructions,
                right_range,
                right.ty,
                right.value,
                float_type,
            )?;

            let arithmetic_operation = match operator {
                BinaryOperator::Addition => Some(FloatArithmeticOperation::Add),
                BinaryOperator::Subtraction => Some(FloatArithmeticOperation::Subtract),
                BinaryOperator::Multiplication => Some(FloatArithmeticOperation::Multiply),
                BinaryOperator::Division => Some(FloatArithmeticOperation::Divide),
                BinaryOperator::Modulo => Some(FloatArithmeticOperation::Modulus),
                _ => None,
            };

            if let Some(operation) = arithmetic_operation {
                let result_register = append_float_arithmetic(
                    context,
                    instructions,
                    operation,
                    float_type.size,
                    left_register,
                    right_register,
                );

                return Ok(TypedRuntimeValue {
                    ty: AnyType::FloatType(float_type),
                    value: AnyRuntimeValue::Register(result_register),
                });
            }

            let (comparison_operation, invert) = match operator {
                BinaryOperator::Equal => (FloatComparisonOperation::Equal, false),
                BinaryOperator::NotEqual => (FloatComparisonOperation::Equal, true),
                BinaryOperator::LessThan => (FloatComparisonOperation::LessThan, false),
                BinaryOperator::GreaterThan => (FloatComparisonOperation::GreaterThan, false),
                _ => {
                    return Err(error(
                        scope,
                        range,
                        "Cannot perform that operation on floats",
                    ));
                }
            };

            let mut result_register = append_float_comparison(
                context,
                instructions,
                comparison_operation,
                float_type.size,
                left_register,
                right_register,
            );

            if invert {
                result_register =
                    generate_boolean_invert(info, context, instructions, result_register);
            }

            Ok(TypedRuntimeValue {
                ty: AnyType::Boolean,
                value: AnyRuntimeValue::Register(result_register),
            })
        }
        AnyType::Pointer(pointed) => {
            let left_register = coerce_to_pointer_register_value(
                info,
                scope,
                context,
                instructions,
                left_range,
                left.ty,
                left.value,
                pointed,
            )?;

            let right_register = coerce_to_pointer_register_value(
                info,
                scope,
                context,
                instructions,
                right_range,
                right.ty,
                right.value,
                pointed,
            )?;

            let invert = match operator {
                BinaryOperator::Equal => false,
                BinaryOperator::NotEqual => true,
                _ => {
                    return Err(error(
                        scope,
                        range,
                        format!(
                            "Cannot perform that operation on '{}'",
                            AnyType::Pointer(pointed)
                        ),
                    ));
                }
            };

            let mut result_register = append_integer_comparison(
                context,
                instructions,
                IntegerComparisonOperation::Equal,
                info.architecture_sizes.address_size,
                left_register,
                right_register,
            );

            if invert {
                result_register =
                    generate_boolean_invert(info, context, instructions, result_register);
            }

            Ok(TypedRuntimeValue {
                ty: AnyType::Boolean,
                value: AnyRuntimeValue::Register(result_register),
            })
        }
        AnyType::Enum(enum_type) => {
            let left_register = coerce_to_type_register(
                info,
                scope,
                context,
                instructions,
                left_range,
                left.ty,
                left.value,
                determined_type,
            )?;

            let right_register = coerce_to_type_register(
                info,
                scope,
                context,
                instructions,
                right_range,
                right.ty,
                right.value,
                determined_type,
            )?;

            let invert = match operator {
                BinaryOperator::Equal => false,
                BinaryOperator::NotEqual => true,
                _ => {
                    return Err(error(
                        scope,
                        range,
                        format!("Cannot perform that operation on '{determined_type}'"),
                    ));
                }
            };

            let mut result_register = append_integer_comparison(
                context,
                instructions,
                IntegerComparisonOperation::Equal,
                enum_type.backing.size,
                left_register,
                right_register,
            );

            if invert {
                result_register =
                    generate_boolean_invert(info, context, instructions, result_register);
            }

            Ok(TypedRuntimeValue {
                ty: AnyType::Boolean,
                value: AnyRuntimeValue::Register(result_register),
            })
        }
        other => panic!("binary operation on unexpected type {other}"),
    }
}

/// Queue (or join) IR generation for a function constant and reference its
/// symbol.
fn reference_function_static<'a>(
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    context: &mut GenerationContext<'a>,
    instructions: &mut Vec<Instruction>,
    function_type: FunctionTypeType<'a>,
    function_value: crate::constant::FunctionConstant<'a>,
) -> Register {
    let (_, symbol) = jobs.find_or_spawn_function_body(arena, function_type, function_value);
    append_reference_static(context, instructions, symbol)
}

pub fn generate_expression<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    scope: &'a ConstantScope<'a>,
    context: &mut GenerationContext<'a>,
    instructions: &mut Vec<Instruction>,
    expression: &'a Expression<'a>,
) -> DelayedResult<TypedRuntimeValue<'a>> {
    match expression {
        Expression::NamedReference(identifier) => {
            let name_hash = calculate_string_hash(identifier.text);

            debug_assert!(!context.variable_scope_stack.is_empty());

            // Innermost-out through the live variable scopes.
            for scope_index in (0..context.variable_scope_stack.len()).rev() {
                for variable_index in 0..context.variable_scope_stack[scope_index].variables.len()
                {
                    let variable =
                        &context.variable_scope_stack[scope_index].variables[variable_index];
                    if variable.name.text == identifier.text {
                        return done(TypedRuntimeValue {
                            ty: variable.ty,
                            value: AnyRuntimeValue::Address(variable.address_register),
                        });
                    }
                }

                let constant_scope = context.variable_scope_stack[scope_index].constant_scope;

                let search_value = ready!(search_for_runtime_declaration(
                    info,
                    jobs,
                    arena,
                    context,
                    instructions,
                    identifier.text,
                    name_hash,
                    constant_scope,
                    constant_scope.statements,
                    constant_scope.declarations,
                    false
                ));

                if let Some(value) = search_value {
                    return done(value);
                }
            }

            // Then outward through the enclosing constant scopes.
            let body_scope = context.variable_scope_stack[0].constant_scope;
            debug_assert!(!body_scope.is_top_level);

            let mut current_scope = match body_scope.parent {
                Some(parent) => parent,
                None => unreachable!("function body scope has a parent"),
            };

            loop {
                let search_value = ready!(search_for_runtime_declaration(
                    info,
                    jobs,
                    arena,
                    context,
                    instructions,
                    identifier.text,
                    name_hash,
                    current_scope,
                    current_scope.statements,
                    current_scope.declarations,
                    false
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
                    return done(TypedRuntimeValue {
                        ty: global_constant.ty,
                        value: AnyRuntimeValue::Constant(global_constant.value),
                    });
                }
            }

            Err(error(
                scope,
                identifier.range,
                format!("Cannot find named reference {}", identifier.text),
            ))
        }
        Expression::IndexReference {
            expression: inner,
            index,
            range,
        } => {
            let expression_value = ready!(generate_expression(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
                inner
            ));

            let index_value = ready!(generate_expression(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
                index
            ));

            if let (
                AnyRuntimeValue::Constant(expression_constant),
                AnyRuntimeValue::Constant(index_constant),
            ) = (expression_value.value, index_value.value)
            {
                let constant = evaluate_constant_index(
                    info,
                    scope,
                    expression_value.ty,
                    expression_constant,
                    inner.range(),
                    index_value.ty,
                    index_constant,
                    index.range(),
                )?;

                return done(TypedRuntimeValue {
                    ty: constant.ty,
                    value: AnyRuntimeValue::Constant(constant.value),
                });
            }

            let index_register = coerce_to_integer_register_value(
                scope,
                context,
                instructions,
                index.range(),
                index_value.ty,
                index_value.value,
                Integer {
                    size: info.architecture_sizes.address_size,
                    is_signed: false,
                },
            )?;

            let (base_address_register, element_type) = match expression_value.ty {
                AnyType::ArrayType(element_type) => {
                    let base = match expression_value.value {
                        AnyRuntimeValue::Constant(constant) => append_integer_constant(
                            context,
                            instructions,
                            info.architecture_sizes.address_size,
                            constant.unwrap_pointer(),
                        ),
                        AnyRuntimeValue::Register(register) => append_load_integer(
                            context,
                            instructions,
                            info.architecture_sizes.address_size,
                            register,
                        ),
                        AnyRuntimeValue::Address(address) => append_load_integer(
                            context,
                            instructions,
                            info.architecture_sizes.address_size,
                            address,
                        ),
                        AnyRuntimeValue::UndeterminedStruct(_) => {
                            panic!("array value cannot be an undetermined struct")
                        }
                    };

                    (base, *element_type)
                }
                AnyType::StaticArray {
                    length,
                    element_type,
                } => {
                    let base = match expression_value.value {
                        AnyRuntimeValue::Constant(constant) => {
                            let elements = constant.unwrap_static_array();
                            debug_assert_eq!(elements.len() as u64, length);

                            let name = register_static_array_constant(
                                info,
                                scope,
                                context,
                                *element_type,
                                elements,
                            );
                            append_reference_static(context, instructions, &name)
                        }
                        AnyRuntimeValue::Register(register) => register,
                        AnyRuntimeValue::Address(address) => address,
                        AnyRuntimeValue::UndeterminedStruct(_) => {
                            panic!("static array value cannot be an undetermined struct")
                        }
                    };

                    (base, *element_type)
                }
                other => {
                    return Err(error(scope, *range, format!("Cannot index {other}")));
                }
            };

            let element_size_register = append_integer_constant(
                context,
                instructions,
                info.architecture_sizes.address_size,
                element_type.size(info.architecture_sizes),
            );

            let offset_register = append_integer_arithmetic(
                context,
                instructions,
                IntegerArithmeticOperation::Multiply,
                info.architecture_sizes.address_size,
                element_size_register,
                index_register,
            );

            let address_register = append_integer_arithmetic(
                context,
                instructions,
                IntegerArithmeticOperation::Add,
                info.architecture_sizes.address_size,
                base_address_register,
                offset_register,
            );

            done(TypedRuntimeValue {
                ty: element_type,
                value: AnyRuntimeValue::Address(address_register),
            })
        }
        Expression::MemberReference {
            expression: inner,
            name,
            range,
        } => {
            let expression_value = ready!(generate_expression(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
                inner
            ));

            // Member access through a pointer dereferences it first.
            let (actual_type, actual_value) = match expression_value.ty {
                AnyType::Pointer(pointed) => {
                    let address_register = match expression_value.value {
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
                            panic!("pointer value cannot be an undetermined struct")
                        }
                    };

                    (*pointed, AnyRuntimeValue::Address(address_register))
                }
                _ => (expression_value.ty, expression_value.value),
            };

            let no_member = || {
                Err(error(
                    scope,
                    name.range,
                    format!("No member with name {}", name.text),
                ))
            };

            match actual_type {
                AnyType::ArrayType(element_type) => match name.text {
                    "length" => {
                        let usize_type = AnyType::Integer(Integer {
                            size: info.architecture_sizes.address_size,
                            is_signed: false,
                        });

                        let value = match actual_value {
                            AnyRuntimeValue::Constant(constant) => AnyRuntimeValue::Constant(
                                AnyConstantValue::Integer(constant.unwrap_array().length),
                            ),
                            AnyRuntimeValue::Register(register) => {
                                let length_address_register = generate_address_offset(
                                    info,
                                    context,
                                    instructions,
                                    register,
                                    info.architecture_sizes.address_size.byte_size(),
                                );
                                AnyRuntimeValue::Register(append_load_integer(
                                    context,
                                    instructions,
                                    info.architecture_sizes.address_size,
                                    length_address_register,
                                ))
                            }
                            AnyRuntimeValue::Address(address) => {
                                AnyRuntimeValue::Address(generate_address_offset(
                                    info,
                                    context,
                                    instructions,
                                    address,
                                    info.architecture_sizes.address_size.byte_size(),
                                ))
                            }
                            AnyRuntimeValue::UndeterminedStruct(_) => {
                                panic!("array value cannot be an undetermined struct")
                            }
                        };

                        done(TypedRuntimeValue {
                            ty: usize_type,
                            value,
                        })
                    }
                    "pointer" => {
                        let value = match actual_value {
                            AnyRuntimeValue::Constant(constant) => AnyRuntimeValue::Constant(
                                AnyConstantValue::Pointer(constant.unwrap_array().pointer),
                            ),
                            AnyRuntimeValue::Register(register) => {
                                AnyRuntimeValue::Register(append_load_integer(
                                    context,
                                    instructions,
                                    info.architecture_sizes.address_size,
                                    register,
                                ))
                            }
                            AnyRuntimeValue::Address(address) => AnyRuntimeValue::Address(address),
                            AnyRuntimeValue::UndeterminedStruct(_) => {
                                panic!("array value cannot be an undetermined struct")
                            }
                        };

                        done(TypedRuntimeValue {
                            ty: AnyType::Pointer(element_type),
                            value,
                        })
                    }
                    _ => no_member(),
                },
                AnyType::StaticArray {
                    length,
                    element_type,
                } => match name.text {
                    "length" => done(TypedRuntimeValue {
                        ty: AnyType::Integer(Integer {
                            size: info.architecture_sizes.address_size,
                            is_signed: false,
                        }),
                        value: AnyRuntimeValue::Constant(AnyConstantValue::Integer(length)),
                    }),
                    "pointer" => {
                        // In a runtime context a constant-element array is
                        // interned and the address of its first element is
                        // produced, unlike the constant evaluator which
                        // rejects this.
                        let address_register = match actual_value {
                            AnyRuntimeValue::Constant(constant) => {
                                let elements = constant.unwrap_static_array();
                                let name = register_static_array_constant(
                                    info,
                                    scope,
                                    context,
                                    *element_type,
                                    elements,
                                );
                                append_reference_static(context, instructions, &name)
                            }
                            AnyRuntimeValue::Register(register) => register,
                            AnyRuntimeValue::Address(address) => address,
                            AnyRuntimeValue::UndeterminedStruct(_) => {
                                panic!("static array value cannot be an undetermined struct")
                            }
                        };

                        done(TypedRuntimeValue {
                            ty: AnyType::Pointer(element_type),
                            value: AnyRuntimeValue::Register(address_register),
                        })
                    }
                    _ => no_member(),
                },
                AnyType::StructType(struct_type) => {
                    for (index, member) in struct_type.members.iter().enumerate() {
                        if member.name != name.text {
                            continue;
                        }

                        match actual_value {
                            AnyRuntimeValue::Constant(constant) => {
                                let members = constant.unwrap_struct();
                                debug_assert!(!struct_type.is_union());

                                return done(TypedRuntimeValue {
                                    ty: member.member_type,
                                    value: AnyRuntimeValue::Constant(members[index]),
                                });
                            }
                            AnyRuntimeValue::Register(register) => {
                                let address_register = generate_address_offset(
                                    info,
                                    context,
                                    instructions,
                                    register,
                                    struct_type.member_offset(info.architecture_sizes, index),
                                );

                                let value = match get_type_representation(info, member.member_type)
                                {
                                    RegisterRepresentation::InRegister { size, is_float } => {
                                        let register_index = if is_float {
                                            append_load_float(
                                                context,
                                                instructions,
                                                size,
                                                address_register,
                                            )
                                        } else {
                                            append_load_integer(
                                                context,
                                                instructions,
                                                size,
                                                address_register,
                                            )
                                        };
                                        AnyRuntimeValue::Register(register_index)
                                    }
                                    RegisterRepresentation::Memory => {
                                        AnyRuntimeValue::Register(address_register)
                                    }
                                };

                                return done(TypedRuntimeValue {
                                    ty: member.member_type,
                                    value,
                                });
                            }
                            AnyRuntimeValue::Address(address) => {
                                let address_register = generate_address_offset(
                                    info,
                                    context,
                                    instructions,
                                    address,
                                    struct_type.member_offset(info.architecture_sizes, index),
                                );

                                return done(TypedRuntimeValue {
                                    ty: member.member_type,
                                    value: AnyRuntimeValue::Address(address_register),
                                });
                            }
                            AnyRuntimeValue::UndeterminedStruct(_) => {
                                panic!("struct value cannot be an undetermined struct")
                            }
                        }
                    }

                    no_member()
                }
                AnyType::UndeterminedStruct(undetermined) => {
                    for (index, member) in undetermined.members.iter().enumerate() {
                        if member.name == name.text {
                            let value = match actual_value {
                                AnyRuntimeValue::UndeterminedStruct(members) => members[index],
                                AnyRuntimeValue::Constant(constant) => {
                                    AnyRuntimeValue::Constant(constant.unwrap_struct()[index])
                                }
                                _ => panic!("expected a struct-shaped value"),
                            };

                            return done(TypedRuntimeValue {
                                ty: member.member_type,
                                value,
                            });
                        }
                    }

                    no_member()
                }
                AnyType::FileModule => {
                    let module_scope = expression_value
                        .value
                        .unwrap_constant()
                        .unwrap_file_module();

                    let search_value = ready!(search_for_runtime_declaration(
                        info,
                        jobs,
                        arena,
                        context,
                        instructions,
                        name.text,
                        calculate_string_hash(name.text),
                        module_scope,
                        module_scope.statements,
                        module_scope.declarations,
                        true
                    ));

                    match search_value {
                        Some(value) => done(value),
                        None => Err(error(
                            scope,
                            name.range,
                            format!("No member with name '{}'", name.text),
                        )),
                    }
                }
                AnyType::Type => {
                    let ty = expression_value.value.unwrap_constant().unwrap_type();

                    if let AnyType::Enum(enum_type) = ty {
                        match enum_type.variant_value(name.text) {
                            Some(value) => done(TypedRuntimeValue {
                                ty: AnyType::Enum(enum_type),
                                value: AnyRuntimeValue::Constant(AnyConstantValue::Integer(value)),
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
                    *range,
                    format!("Type {other} has no members"),
                )),
            }
        }
        Expression::IntegerLiteral { value, .. } => done(TypedRuntimeValue {
            ty: AnyType::UndeterminedInteger,
            value: AnyRuntimeValue::Constant(AnyConstantValue::Integer(*value)),
        }),
        Expression::FloatLiteral { value, .. } => done(TypedRuntimeValue {
            ty: AnyType::UndeterminedFloat,
            value: AnyRuntimeValue::Constant(AnyConstantValue::Float(*value)),
        }),
        Expression::StringLiteral { characters, .. } => {
            let constant = string_literal_value(arena, characters);
            done(TypedRuntimeValue {
                ty: constant.ty,
                value: AnyRuntimeValue::Constant(constant.value),
            })
        }
        Expression::ArrayLiteral { elements, range } => {
            if elements.is_empty() {
                return Err(error(scope, *range, "Empty array literal"));
            }

            let first_element = ready!(generate_expression(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
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
            element_values.push(first_element);

            let mut all_constant =
                matches!(first_element.value, AnyRuntimeValue::Constant(_));

            for &element in &elements[1..] {
                let element_value = ready!(generate_expression(
                    info,
                    jobs,
                    arena,
                    scope,
                    context,
                    instructions,
                    element
                ));

                if !matches!(element_value.value, AnyRuntimeValue::Constant(_)) {
                    all_constant = false;
                }

                element_values.push(element_value);
            }

            let value = if all_constant {
                let mut constant_values = Vec::with_capacity(element_values.len());
                for (i, element_value) in element_values.iter().enumerate() {
                    constant_values.push(crate::constant::coerce_constant_to_type(
                        info,
                        arena,
                        scope,
                        elements[i].range(),
                        element_value.ty,
                        element_value.value.unwrap_constant(),
                        element_type,
                    )?);
                }

                AnyRuntimeValue::Constant(AnyConstantValue::StaticArray(
                    arena.alloc_slice_copy(&constant_values),
                ))
            } else {
                let element_size = element_type.size(info.architecture_sizes);

                let address_register = append_allocate_local(
                    context,
                    instructions,
                    elements.len() as u64 * element_size,
                    element_type.alignment(info.architecture_sizes),
                );

                let element_size_register = append_integer_constant(
                    context,
                    instructions,
                    info.architecture_sizes.address_size,
                    element_size,
                );

                let mut element_address_register = address_register;
                for (i, element_value) in element_values.iter().enumerate() {
                    coerce_to_type_write(
                        info,
                        scope,
                        context,
                        instructions,
                        elements[i].range(),
                        element_value.ty,
                        element_value.value,
                        element_type,
                        element_address_register,
                    )?;

                    if i != element_values.len() - 1 {
                        element_address_register = append_integer_arithmetic(
                            context,
                            instructions,
                            IntegerArithmeticOperation::Add,
                            info.architecture_sizes.address_size,
                            element_address_register,
                            element_size_register,
                        );
                    }
                }

                AnyRuntimeValue::Register(address_register)
            };

            done(TypedRuntimeValue {
                ty: AnyType::StaticArray {
                    length: elements.len() as u64,
                    element_type: arena.alloc(element_type),
                },
                value,
            })
        }
        Expression::StructLiteral { members, range } => {
            if members.is_empty() {
                return Err(error(scope, *range, "Empty struct literal"));
            }

            let mut type_members = Vec::with_capacity(members.len());
            let mut member_values = Vec::with_capacity(members.len());
            let mut all_constant = true;

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

                let member_value = ready!(generate_expression(
                    info,
                    jobs,
                    arena,
                    scope,
                    context,
                    instructions,
                    member.value
                ));

                type_members.push(crate::types::StructTypeMember {
                    name: member.name.text,
                    member_type: member_value.ty,
                });

                if !matches!(member_value.value, AnyRuntimeValue::Constant(_)) {
                    all_constant = false;
                }

                member_values.push(member_value.value);
            }

            let value = if all_constant {
                let constant_values: Vec<AnyConstantValue> = member_values
                    .iter()
                    .map(|value| value.unwrap_constant())
                    .collect();

                AnyRuntimeValue::Constant(AnyConstantValue::Struct(
                    arena.alloc_slice_copy(&constant_values),
                ))
            } else {
                AnyRuntimeValue::UndeterminedStruct(arena.alloc_slice_copy(&member_values))
            };

            done(TypedRuntimeValue {
                ty: AnyType::UndeterminedStruct(crate::types::UndeterminedStruct {
                    members: arena.alloc_slice_copy(&type_members),
                }),
                value,
            })
        }
        Expression::FunctionCall {
            expression: callee,
            parameters,
            range,
        } => {
            let expression_value = ready!(generate_expression(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
                callee
            ));

            match expression_value.ty {
                AnyType::FunctionType(_) | AnyType::PolymorphicFunction => {
                    let mut call_parameters = Vec::with_capacity(parameters.len());
                    for &parameter in parameters.iter() {
                        let parameter_value = ready!(generate_expression(
                            info,
                            jobs,
                            arena,
                            scope,
                            context,
                            instructions,
                            parameter
                        ));

                        call_parameters.push(parameter_value);
                    }

                    let (function_type, function_value) = match expression_value.ty {
                        AnyType::PolymorphicFunction => {
                            let polymorphic_function = expression_value
                                .value
                                .unwrap_constant()
                                .unwrap_polymorphic_function();
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

                            let mut polymorphic_parameters =
                                Vec::with_capacity(call_parameters.len());
                            for (i, declaration_parameter) in
                                declaration.parameters.iter().enumerate()
                            {
                                let mut parameter = TypedConstantValue {
                                    ty: AnyType::Void,
                                    value: AnyConstantValue::Void,
                                };

                                if declaration_parameter.is_polymorphic_determiner() {
                                    parameter.ty = call_parameters[i].ty;
                                }

                                if declaration_parameter.is_constant {
                                    let AnyRuntimeValue::Constant(constant) =
                                        call_parameters[i].value
                                    else {
                                        return Err(error(
                                            scope,
                                            parameters[i].range(),
                                            format!(
                                                "Non-constant value provided for constant parameter '{}'",
                                                declaration_parameter.name.text
                                            ),
                                        ));
                                    };

                                    parameter = TypedConstantValue {
                                        ty: call_parameters[i].ty,
                                        value: constant,
                                    };
                                }

                                polymorphic_parameters.push(parameter);
                            }

                            match jobs.find_polymorphic_function(
                                declaration,
                                polymorphic_function.scope,
                                &polymorphic_parameters,
                            ) {
                                PolymorphicFunctionMatch::Resolved(ty, value) => (ty, value),
                                PolymorphicFunctionMatch::InProgress(index) => {
                                    return wait(index);
                                }
                                PolymorphicFunctionMatch::NotFound => {
                                    let ranges = super::expression_ranges(parameters);
                                    let index = jobs.spawn_polymorphic_function(
                                        declaration,
                                        arena.alloc_slice_copy(&polymorphic_parameters),
                                        polymorphic_function.scope,
                                        scope,
                                        arena.alloc_slice_copy(&ranges),
                                    );
                                    return wait(index);
                                }
                            }
                        }
                        AnyType::FunctionType(function_type) => {
                            let function_value =
                                expression_value.value.unwrap_constant().unwrap_function();

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

                            (function_type, function_value)
                        }
                        _ => unreachable!(),
                    };

                    let (_, symbol) =
                        jobs.find_or_spawn_function_body(arena, function_type, function_value);

                    let return_representation = if *function_type.return_type == AnyType::Void {
                        None
                    } else {
                        Some(get_type_representation(info, *function_type.return_type))
                    };

                    let mut instruction_parameters = Vec::with_capacity(
                        function_type.parameters.len() + 1,
                    );

                    let mut runtime_parameter_index = 0;
                    for (i, call_parameter) in call_parameters.iter().enumerate() {
                        if function_value.declaration.parameters[i].is_constant {
                            continue;
                        }

                        let parameter_type =
                            function_type.parameters[runtime_parameter_index];

                        let parameter_register = coerce_to_type_register(
                            info,
                            scope,
                            context,
                            instructions,
                            parameters[i].range(),
                            call_parameter.ty,
                            call_parameter.value,
                            parameter_type,
                        )?;

                        let (size, is_float) =
                            match get_type_representation(info, parameter_type) {
                                RegisterRepresentation::InRegister { size, is_float } => {
                                    (size, is_float)
                                }
                                RegisterRepresentation::Memory => {
                                    (info.architecture_sizes.address_size, false)
                                }
                            };

                        instruction_parameters.push(FunctionCallParameter {
                            size,
                            is_float,
                            register: parameter_register,
                        });

                        runtime_parameter_index += 1;
                    }

                    debug_assert_eq!(runtime_parameter_index, function_type.parameters.len());

                    emit_function_call(
                        info,
                        context,
                        instructions,
                        function_type,
                        return_representation,
                        instruction_parameters,
                        |context, instructions| {
                            append_reference_static(context, instructions, symbol)
                        },
                    )
                }
                AnyType::BuiltinFunction => {
                    let builtin_name = expression_value.value.unwrap_constant().unwrap_builtin_function();

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

                            let parameter_value = ready!(generate_expression(
                                info,
                                jobs,
                                arena,
                                scope,
                                context,
                                instructions,
                                parameters[0]
                            ));

                            let ty = match parameter_value.ty {
                                AnyType::Type => {
                                    parameter_value.value.unwrap_constant().unwrap_type()
                                }
                                other => other,
                            };

                            if !ty.is_runtime_type() {
                                return Err(error(
                                    scope,
                                    parameters[0].range(),
                                    format!("'{}' has no size", parameter_value.ty),
                                ));
                            }

                            done(TypedRuntimeValue {
                                ty: AnyType::Integer(Integer {
                                    size: info.architecture_sizes.address_size,
                                    is_signed: false,
                                }),
                                value: AnyRuntimeValue::Constant(AnyConstantValue::Integer(
                                    ty.size(info.architecture_sizes),
                                )),
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

                            let parameter_value = ready!(generate_expression(
                                info,
                                jobs,
                                arena,
                                scope,
                                context,
                                instructions,
                                parameters[0]
                            ));

                            done(TypedRuntimeValue {
                                ty: AnyType::Type,
                                value: AnyRuntimeValue::Constant(AnyConstantValue::Type(
                                    parameter_value.ty,
                                )),
                            })
                        }
                        "memcpy" => {
                            if parameters.len() != 3 {
                                return Err(error(
                                    scope,
                                    *range,
                                    format!(
                                        "Incorrect parameter count. Expected 3 got {}",
                                        parameters.len()
                                    ),
                                ));
                            }

                            let u8_type: &AnyType =
                                arena.alloc(AnyType::Integer(Integer {
                                    size: RegisterSize::Size8,
                                    is_signed: false,
                                }));
                            let u8_pointer_type = AnyType::Pointer(u8_type);

                            let destination_value = ready!(generate_expression(
                                info,
                                jobs,
                                arena,
                                scope,
                                context,
                                instructions,
                                parameters[0]
                            ));

                            if destination_value.ty != u8_pointer_type {
                                return Err(error(
                                    scope,
                                    parameters[0].range(),
                                    format!(
                                        "Incorrect type for parameter 0. Expected '{}', got '{}'",
                                        u8_pointer_type, destination_value.ty
                                    ),
                                ));
                            }

                            let source_value = ready!(generate_expression(
                                info,
                                jobs,
                                arena,
                                scope,
                                context,
                                instructions,
                                parameters[1]
                            ));

                            if source_value.ty != u8_pointer_type {
                                return Err(error(
                                    scope,
                                    parameters[1].range(),
                                    format!(
                                        "Incorrect type for parameter 1. Expected '{}', got '{}'",
                                        u8_pointer_type, source_value.ty
                                    ),
                                ));
                            }

                            let size = ready!(evaluate_constant_expression(
                                info,
                                jobs,
                                arena,
                                scope,
                                None,
                                parameters[2]
                            ));

                            let size_value = coerce_constant_to_integer_type(
                                scope,
                                parameters[2].range(),
                                size.ty,
                                size.value,
                                Integer {
                                    size: info.architecture_sizes.address_size,
                                    is_signed: false,
                                },
                            )?;

                            let destination_address_register = generate_in_register_pointer_value(
                                info,
                                context,
                                instructions,
                                destination_value.value,
                            );

                            let source_address_register = generate_in_register_pointer_value(
                                info,
                                context,
                                instructions,
                                source_value.value,
                            );

                            append_copy_memory(
                                instructions,
                                size_value,
                                source_address_register,
                                destination_address_register,
                                1,
                            );

                            done(TypedRuntimeValue {
                                ty: AnyType::Void,
                                value: AnyRuntimeValue::Constant(AnyConstantValue::Void),
                            })
                        }
                        _ => unreachable!("unknown builtin function {builtin_name}"),
                    }
                }
                AnyType::Pointer(pointed) => {
                    let AnyType::FunctionType(function_type) = *pointed else {
                        return Err(error(
                            scope,
                            callee.range(),
                            format!("Cannot call '{}'", expression_value.ty),
                        ));
                    };

                    let address_register = generate_in_register_pointer_value(
                        info,
                        context,
                        instructions,
                        expression_value.value,
                    );

                    if parameters.len() != function_type.parameters.len() {
                        return Err(error(
                            scope,
                            *range,
                            format!(
                                "Incorrect number of parameters. Expected {}, got {}",
                                function_type.parameters.len(),
                                parameters.len()
                            ),
                        ));
                    }

                    let return_representation = if *function_type.return_type == AnyType::Void {
                        None
                    } else {
                        Some(get_type_representation(info, *function_type.return_type))
                    };

                    let mut instruction_parameters =
                        Vec::with_capacity(function_type.parameters.len() + 1);

                    for (i, &parameter) in parameters.iter().enumerate() {
                        let parameter_value = ready!(generate_expression(
                            info,
                            jobs,
                            arena,
                            scope,
                            context,
                            instructions,
                            parameter
                        ));

                        let parameter_type = function_type.parameters[i];

                        let parameter_register = coerce_to_type_register(
                            info,
                            scope,
                            context,
                            instructions,
                            parameter.range(),
                            parameter_value.ty,
                            parameter_value.value,
                            parameter_type,
                        )?;

                        let (size, is_float) = match get_type_representation(info, parameter_type)
                        {
                            RegisterRepresentation::InRegister { size, is_float } => {
                                (size, is_float)
                            }
                            RegisterRepresentation::Memory => {
                                (info.architecture_sizes.address_size, false)
                            }
                        };

                        instruction_parameters.push(FunctionCallParameter {
                            size,
                            is_float,
                            register: parameter_register,
                        });
                    }

                    emit_function_call(
                        info,
                        context,
                        instructions,
                        function_type,
                        return_representation,
                        instruction_parameters,
                        |_, _| address_register,
                    )
                }
                AnyType::Type => {
                    let ty = expression_value.value.unwrap_constant().unwrap_type();

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
                            None,
                            parameter
                        ));

                        parameter_values.push(crate::constant::coerce_constant_to_type(
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
                        PolymorphicStructMatch::Resolved(resolved) => done(TypedRuntimeValue {
                            ty: AnyType::Type,
                            value: AnyRuntimeValue::Constant(AnyConstantValue::Type(resolved)),
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
                    format!("Cannot call '{other}'"),
                )),
            }
        }
        Expression::BinaryOperation {
            operator,
            left,
            right,
            range,
        } => generate_binary_operation(
            info,
            jobs,
            arena,
            scope,
            context,
            instructions,
            *range,
            left,
            right,
            *operator,
        ),
        Expression::UnaryOperation {
            operator,
            expression: inner,
            range,
        } => {
            let expression_value = ready!(generate_expression(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
                inner
            ));

            match operator {
                UnaryOperator::Pointer => match expression_value.value {
                    AnyRuntimeValue::Constant(constant) => match expression_value.ty {
                        AnyType::FunctionType(function_type) => {
                            let function_value = constant.unwrap_function();

                            let address_register = reference_function_static(
                                jobs,
                                arena,
                                context,
                                instructions,
                                function_type,
                                function_value,
                            );

                            done(TypedRuntimeValue {
                                ty: AnyType::Pointer(
                                    arena.alloc(AnyType::FunctionType(function_type)),
                                ),
                                value: AnyRuntimeValue::Register(address_register),
                            })
                        }
                        AnyType::Type => {
                            let ty = constant.unwrap_type();

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

                            done(TypedRuntimeValue {
                                ty: AnyType::Type,
                                value: AnyRuntimeValue::Constant(AnyConstantValue::Type(
                                    AnyType::Pointer(arena.alloc(ty)),
                                )),
                            })
                        }
                        _ => Err(error(
                            scope,
                            inner.range(),
                            format!(
                                "Cannot take pointers to constants of type '{}'",
                                expression_value.ty
                            ),
                        )),
                    },
                    AnyRuntimeValue::Register(_) | AnyRuntimeValue::UndeterminedStruct(_) => {
                        Err(error(
                            scope,
                            inner.range(),
                            "Cannot take pointers to anonymous values",
                        ))
                    }
                    AnyRuntimeValue::Address(address_register) => done(TypedRuntimeValue {
                        ty: AnyType::Pointer(arena.alloc(expression_value.ty)),
                        value: AnyRuntimeValue::Register(address_register),
                    }),
                },
                UnaryOperator::BooleanInvert => {
                    if expression_value.ty != AnyType::Boolean {
                        return Err(error(
                            scope,
                            inner.range(),
                            format!("Expected bool, got '{}'", expression_value.ty),
                        ));
                    }

                    let register_index = match expression_value.value {
                        AnyRuntimeValue::Constant(constant) => {
                            return done(TypedRuntimeValue {
                                ty: AnyType::Boolean,
                                value: AnyRuntimeValue::Constant(AnyConstantValue::Boolean(
                                    !constant.unwrap_boolean(),
                                )),
                            });
                        }
                        AnyRuntimeValue::Register(register) => register,
                        AnyRuntimeValue::Address(address) => append_load_integer(
                            context,
                            instructions,
                            info.architecture_sizes.boolean_size,
                            address,
                        ),
                        AnyRuntimeValue::UndeterminedStruct(_) => {
                            panic!("boolean value cannot be an undetermined struct")
                        }
                    };

                    let result_register =
                        generate_boolean_invert(info, context, instructions, register_index);

                    done(TypedRuntimeValue {
                        ty: AnyType::Boolean,
                        value: AnyRuntimeValue::Register(result_register),
                    })
                }
                UnaryOperator::Negation => match expression_value.ty {
                    AnyType::UndeterminedInteger => {
                        let integer_value =
                            expression_value.value.unwrap_constant().unwrap_integer();

                        done(TypedRuntimeValue {
                            ty: AnyType::UndeterminedInteger,
                            value: AnyRuntimeValue::Constant(AnyConstantValue::Integer(
                                (integer_value as i64).wrapping_neg() as u64,
                            )),
                        })
                    }
                    AnyType::Integer(integer) => {
                        let register_index = match expression_value.value {
                            AnyRuntimeValue::Constant(constant) => {
                                return done(TypedRuntimeValue {
                                    ty: AnyType::UndeterminedInteger,
                                    value: AnyRuntimeValue::Constant(AnyConstantValue::Integer(
                                        (constant.unwrap_integer() as i64).wrapping_neg() as u64,
                                    )),
                                });
                            }
                            AnyRuntimeValue::Register(register) => register,
                            AnyRuntimeValue::Address(address) => append_load_integer(
                                context,
                                instructions,
                                integer.size,
                                address,
                            ),
                            AnyRuntimeValue::UndeterminedStruct(_) => {
                                panic!("integer value cannot be an undetermined struct")
                            }
                        };

                        let zero_register =
                            append_integer_constant(context, instructions, integer.size, 0);

                        let result_register = append_integer_arithmetic(
                            context,
                            instructions,
                            IntegerArithmeticOperation::Subtract,
                            integer.size,
                            zero_register,
                            register_index,
                        );

                        done(TypedRuntimeValue {
                            ty: AnyType::Integer(integer),
                            value: AnyRuntimeValue::Register(result_register),
                        })
                    }
                    AnyType::FloatType(float_type) => {
                        let register_index = match expression_value.value {
                            AnyRuntimeValue::Constant(constant) => {
                                return done(TypedRuntimeValue {
                                    ty: AnyType::FloatType(float_type),
                                    value: AnyRuntimeValue::Constant(AnyConstantValue::Float(
                                        -constant.unwrap_float(),
                                    )),
                                });
                            }
                            AnyRuntimeValue::Register(register) => register,
                            AnyRuntimeValue::Address(address) => append_load_float(
                                context,
                                instructions,
                                float_type.size,
                                address,
                            ),
                            AnyRuntimeValue::UndeterminedStruct(_) => {
                                panic!("float value cannot be an undetermined struct")
                            }
                        };

                        let zero_register =
                            append_float_constant(context, instructions, float_type.size, 0.0);

                        let result_register = append_float_arithmetic(
                            context,
                            instructions,
                            FloatArithmeticOperation::Subtract,
                            float_type.size,
                            zero_register,
                            register_index,
                        );

                        done(TypedRuntimeValue {
                            ty: AnyType::FloatType(float_type),
                            value: AnyRuntimeValue::Register(result_register),
                        })
                    }
                    AnyType::UndeterminedFloat => {
                        let float_value = expression_value.value.unwrap_constant().unwrap_float();

                        done(TypedRuntimeValue {
                            ty: AnyType::UndeterminedFloat,
                            value: AnyRuntimeValue::Constant(AnyConstantValue::Float(-float_value)),
                        })
                    }
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
            range,
        } => {
            let expression_value = ready!(generate_expression(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
                inner
            ));

            let target_type = ready!(evaluate_type_expression_runtime(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
                target
            ));

            // Constants fold through the constant cast rules.
            if let AnyRuntimeValue::Constant(constant) = expression_value.value {
                if let Ok(value) = evaluate_constant_cast(
                    info,
                    arena,
                    scope,
                    expression_value.ty,
                    constant,
                    inner.range(),
                    target_type,
                ) {
                    return done(TypedRuntimeValue {
                        ty: target_type,
                        value: AnyRuntimeValue::Constant(value),
                    });
                }
            }

            // Implicit coercion covers the lossless cases.
            if let Ok(register) = coerce_to_type_register(
                info,
                scope,
                context,
                instructions,
                *range,
                expression_value.ty,
                expression_value.value,
                target_type,
            ) {
                return done(TypedRuntimeValue {
                    ty: target_type,
                    value: AnyRuntimeValue::Register(register),
                });
            }

            let invalid = || {
                Err(error(
                    scope,
                    *range,
                    format!(
                        "Cannot cast from '{}' to '{target_type}'",
                        expression_value.ty
                    ),
                ))
            };

            // Source as an integer register, for integer-like sources.
            let integer_source = |context: &mut GenerationContext<'a>,
                                  instructions: &mut Vec<Instruction>,
                                  size: RegisterSize|
             -> Register {
                match expression_value.value {
                    AnyRuntimeValue::Constant(constant) => append_integer_constant(
                        context,
                        instructions,
                        size,
                        constant.unwrap_integer(),
                    ),
                    AnyRuntimeValue::Register(register) => register,
                    AnyRuntimeValue::Address(address) => {
                        append_load_integer(context, instructions, size, address)
                    }
                    AnyRuntimeValue::UndeterminedStruct(_) => {
                        panic!("cast source cannot be an undetermined struct")
                    }
                }
            };

            let register = match target_type {
                AnyType::Integer(target_integer) => match expression_value.ty {
                    AnyType::Integer(integer) => {
                        let value_register = integer_source(context, instructions, integer.size);
                        resize_integer(
                            context,
                            instructions,
                            integer,
                            target_integer.size,
                            value_register,
                        )
                    }
                    AnyType::Enum(enum_type) => {
                        let value_register =
                            integer_source(context, instructions, enum_type.backing.size);
                        resize_integer(
                            context,
                            instructions,
                            enum_type.backing,
                            target_integer.size,
                            value_register,
                        )
                    }
                    AnyType::FloatType(float_type) => {
                        let value_register = match expression_value.value {
                            AnyRuntimeValue::Register(register) => register,
                            AnyRuntimeValue::Address(address) => append_load_float(
                                context,
                                instructions,
                                float_type.size,
                                address,
                            ),
                            _ => return invalid(),
                        };

                        append_float_truncation(
                            context,
                            instructions,
                            float_type.size,
                            target_integer.size,
                            value_register,
                        )
                    }
                    AnyType::Pointer(_) => {
                        if target_integer.size == info.architecture_sizes.address_size
                            && !target_integer.is_signed
                        {
                            generate_in_register_pointer_value(
                                info,
                                context,
                                instructions,
                                expression_value.value,
                            )
                        } else {
                            return invalid();
                        }
                    }
                    _ => return invalid(),
                },
                AnyType::FloatType(target_float) => match expression_value.ty {
                    AnyType::Integer(integer) => {
                        let value_register = integer_source(context, instructions, integer.size);
                        append_float_from_integer(
                            context,
                            instructions,
                            integer.is_signed,
                            integer.size,
                            target_float.size,
                            value_register,
                        )
                    }
                    AnyType::FloatType(float_type) => {
                        let value_register = match expression_value.value {
                            AnyRuntimeValue::Register(register) => register,
                            AnyRuntimeValue::Address(address) => append_load_float(
                                context,
                                instructions,
                                float_type.size,
                                address,
                            ),
                            _ => return invalid(),
                        };

                        append_float_conversion(
                            context,
                            instructions,
                            float_type.size,
                            target_float.size,
                            value_register,
                        )
                    }
                    _ => return invalid(),
                },
                AnyType::Pointer(_) => match expression_value.ty {
                    AnyType::Integer(integer) => {
                        if integer.size == info.architecture_sizes.address_size
                            && !integer.is_signed
                        {
                            integer_source(context, instructions, integer.size)
                        } else {
                            return invalid();
                        }
                    }
                    AnyType::Pointer(_) => generate_in_register_pointer_value(
                        info,
                        context,
                        instructions,
                        expression_value.value,
                    ),
                    _ => return invalid(),
                },
                AnyType::Enum(target_enum) => match expression_value.ty {
                    AnyType::Integer(integer) => {
                        let value_register = integer_source(context, instructions, integer.size);
                        resize_integer(
                            context,
                            instructions,
                            integer,
                            target_enum.backing.size,
                            value_register,
                        )
                    }
                    AnyType::Enum(enum_type) => {
                        let value_register =
                            integer_source(context, instructions, enum_type.backing.size);
                        resize_integer(
                            context,
                            instructions,
                            enum_type.backing,
                            target_enum.backing.size,
                            value_register,
                        )
                    }
                    _ => return invalid(),
                },
                _ => return invalid(),
            };

            done(TypedRuntimeValue {
                ty: target_type,
                value: AnyRuntimeValue::Register(register),
            })
        }
        Expression::Bake { call, range } => {
            let Expression::FunctionCall {
                expression: callee,
                parameters,
                ..
            } = *call
            else {
                return Err(error(scope, *range, "Expected a function call"));
            };

            let expression_value = ready!(generate_expression(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
                callee
            ));

            let mut call_parameters = Vec::with_capacity(parameters.len());
            for &parameter in parameters.iter() {
                let parameter_value = ready!(generate_expression(
                    info,
                    jobs,
                    arena,
                    scope,
                    context,
                    instructions,
                    parameter
                ));

                call_parameters.push(parameter_value);
            }

            match expression_value.ty {
                AnyType::PolymorphicFunction => {
                    let polymorphic_function = expression_value
                        .value
                        .unwrap_constant()
                        .unwrap_polymorphic_function();
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

                    let mut polymorphic_parameters = Vec::with_capacity(call_parameters.len());
                    for (i, declaration_parameter) in declaration.parameters.iter().enumerate() {
                        let mut parameter = TypedConstantValue {
                            ty: AnyType::Void,
                            value: AnyConstantValue::Void,
                        };

                        if declaration_parameter.is_polymorphic_determiner() {
                            parameter.ty = call_parameters[i].ty;
                        }

                        if declaration_parameter.is_constant {
                            let AnyRuntimeValue::Constant(constant) = call_parameters[i].value
                            else {
                                return Err(error(
                                    scope,
                                    parameters[i].range(),
                                    format!(
                                        "Non-constant value provided for constant parameter '{}'",
                                        declaration_parameter.name.text
                                    ),
                                ));
                            };

                            parameter = TypedConstantValue {
                                ty: call_parameters[i].ty,
                                value: constant,
                            };
                        }

                        polymorphic_parameters.push(parameter);
                    }

                    match jobs.find_polymorphic_function(
                        declaration,
                        polymorphic_function.scope,
                        &polymorphic_parameters,
                    ) {
                        PolymorphicFunctionMatch::Resolved(ty, value) => done(TypedRuntimeValue {
                            ty: AnyType::FunctionType(ty),
                            value: AnyRuntimeValue::Constant(AnyConstantValue::Function(value)),
                        }),
                        PolymorphicFunctionMatch::InProgress(index) => wait(index),
                        PolymorphicFunctionMatch::NotFound => {
                            let ranges = super::expression_ranges(parameters);
                            let index = jobs.spawn_polymorphic_function(
                                declaration,
                                arena.alloc_slice_copy(&polymorphic_parameters),
                                polymorphic_function.scope,
                                scope,
                                arena.alloc_slice_copy(&ranges),
                            );
                            wait(index)
                        }
                    }
                }
                AnyType::FunctionType(function_type) => {
                    let function_value = expression_value.value.unwrap_constant().unwrap_function();

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

                    done(TypedRuntimeValue {
                        ty: AnyType::FunctionType(function_type),
                        value: AnyRuntimeValue::Constant(AnyConstantValue::Function(
                            function_value,
                        )),
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
            let element_type = ready!(evaluate_type_expression_runtime(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
                element
            ));

            if !element_type.is_runtime_type() {
                return Err(error(
                    scope,
                    element.range(),
                    format!("Cannot have arrays of type '{element_type}'"),
                ));
            }

            let ty = match length {
                Some(length_expression) => {
                    let index_value = ready!(evaluate_constant_expression(
                        info,
                        jobs,
                        arena,
                        scope,
                        None,
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

                    AnyType::StaticArray {
                        length,
                        element_type: arena.alloc(element_type),
                    }
                }
                None => AnyType::ArrayType(arena.alloc(element_type)),
            };

            done(TypedRuntimeValue {
                ty: AnyType::Type,
                value: AnyRuntimeValue::Constant(AnyConstantValue::Type(ty)),
            })
        }
        Expression::FunctionType { .. } => {
            // Function-type expressions have no runtime component; evaluate
            // through the constant engine.
            let value = ready!(evaluate_constant_expression(
                info,
                jobs,
                arena,
                scope,
                None,
                expression
            ));

            done(TypedRuntimeValue {
                ty: value.ty,
                value: AnyRuntimeValue::Constant(value.value),
            })
        }
    }
}

/// Extend or truncate an integer register to another size.
fn resize_integer(
    context: &mut GenerationContext,
    instructions: &mut Vec<Instruction>,
    source: Integer,
    target_size: RegisterSize,
    value_register: Register,
) -> Register {
    use std::cmp::Ordering;

    match target_size.cmp(&source.size) {
        Ordering::Greater => append_integer_extension(
            context,
            instructions,
            source.is_signed,
            source.size,
            target_size,
            value_register,
        ),
        Ordering::Less => append_integer_truncation(
            context,
            instructions,
            source.size,
            target_size,
            value_register,
        ),
        Ordering::Equal => value_register,
    }
}

/// Append a call instruction, allocating the hidden return slot when the
/// return type is passed by memory.
fn emit_function_call<'a>(
    info: GlobalInfo<'a>,
    context: &mut GenerationContext<'a>,
    instructions: &mut Vec<Instruction>,
    function_type: FunctionTypeType<'a>,
    return_representation: Option<RegisterRepresentation>,
    mut parameters: Vec<FunctionCallParameter>,
    address: impl FnOnce(&mut GenerationContext<'a>, &mut Vec<Instruction>) -> Register,
) -> DelayedResult<TypedRuntimeValue<'a>> {
    let return_slot_register = match return_representation {
        Some(RegisterRepresentation::Memory) => {
            let slot = append_allocate_local(
                context,
                instructions,
                function_type.return_type.size(info.architecture_sizes),
                function_type.return_type.alignment(info.architecture_sizes),
            );

            parameters.push(FunctionCallParameter {
                size: info.architecture_sizes.address_size,
                is_float: false,
                register: slot,
            });

            Some(slot)
        }
        _ => None,
    };

    let address_register = address(context, instructions);

    let (return_, value) = match return_representation {
        Some(RegisterRepresentation::InRegister { size, is_float }) => {
            let return_register = allocate_register(context);
            (
                Some(CallReturn {
                    size,
                    is_float,
                    register: return_register,
                }),
                AnyRuntimeValue::Register(return_register),
            )
        }
        Some(RegisterRepresentation::Memory) => (
            None,
            AnyRuntimeValue::Register(
                return_slot_register.expect("memory return has a slot"),
            ),
        ),
        None => (None, AnyRuntimeValue::Constant(AnyConstantValue::Void)),
    };

    instructions.push(Instruction::FunctionCall {
        address: address_register,
        parameters,
        return_,
        calling_convention: function_type.calling_convention,
    });

    done(TypedRuntimeValue {
        ty: *function_type.return_type,
        value,
    })
}
