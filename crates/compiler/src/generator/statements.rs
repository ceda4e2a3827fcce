//! Statement lowering.
//!
//! Control flow becomes branches and jumps over instruction indices; forward
//! targets are appended with a placeholder destination and patched once the
//! target index is known.

use bumpalo::Bump;

use crate::ast::Statement;
use crate::constant::{coerce_to_default_type, ConstantScope, GlobalInfo};
use crate::error::{done, error, DelayedResult};
use crate::ir::{Instruction, IntegerArithmeticOperation, IntegerComparisonOperation};
use crate::jobs::JobList;
use crate::ready;
use crate::types::AnyType;

use super::coerce::{coerce_to_integer_register_value, coerce_to_type_register, coerce_to_type_write};
use super::expressions::{
    evaluate_type_expression_runtime, generate_binary_operation_values, generate_expression,
};
use super::{
    add_new_variable, allocate_register, append_allocate_local, append_branch,
    append_integer_arithmetic, append_integer_comparison, append_integer_constant, append_jump,
    append_load_integer, append_store_integer, generate_in_register_boolean_value,
    get_type_representation, patch_jump, AnyRuntimeValue, GenerationContext,
    RegisterRepresentation, VariableScope, PENDING_JUMP,
};

/// Statements handled during scope preparation and skipped at emission time.
pub fn is_not_runtime_statement(statement: &Statement) -> bool {
    matches!(
        statement,
        Statement::FunctionDeclaration(_)
            | Statement::ConstantDefinition(_)
            | Statement::StructDefinition(_)
            | Statement::EnumDefinition(_)
            | Statement::StaticIf(_)
            | Statement::Import { .. }
            | Statement::UsingStatement { .. }
    )
}

pub fn generate_statement<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    scope: &'a ConstantScope<'a>,
    context: &mut GenerationContext<'a>,
    instructions: &mut Vec<Instruction>,
    statement: &'a Statement<'a>,
) -> DelayedResult<()> {
    match statement {
        Statement::ExpressionStatement { expression, .. } => {
            ready!(generate_expression(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
                expression
            ));

            done(())
        }
        Statement::VariableDeclaration(variable_declaration) => {
            for tag in variable_declaration.tags.iter() {
                let message = match tag.name.text {
                    "extern" => "Local variables cannot be external",
                    "no_mangle" => "Local variables cannot be no_mangle",
                    other => {
                        return Err(error(
                            scope,
                            tag.name.range,
                            format!("Unknown tag '{other}'"),
                        ));
                    }
                };

                return Err(error(scope, variable_declaration.range, message));
            }

            let (ty, address_register) = match (
                variable_declaration.ty,
                variable_declaration.initializer,
            ) {
                (Some(type_expression), Some(initializer)) => {
                    let ty = ready!(evaluate_type_expression_runtime(
                        info,
                        jobs,
                        arena,
                        scope,
                        context,
                        instructions,
                        type_expression
                    ));

                    if !ty.is_runtime_type() {
                        return Err(error(
                            scope,
                            type_expression.range(),
                            format!("Cannot create variables of type '{ty}'"),
                        ));
                    }

                    let initializer_value = ready!(generate_expression(
                        info,
                        jobs,
                        arena,
                        scope,
                        context,
                        instructions,
                        initializer
                    ));

                    let address_register = append_allocate_local(
                        context,
                        instructions,
                        ty.size(info.architecture_sizes),
                        ty.alignment(info.architecture_sizes),
                    );

                    coerce_to_type_write(
                        info,
                        scope,
                        context,
                        instructions,
                        variable_declaration.range,
                        initializer_value.ty,
                        initializer_value.value,
                        ty,
                        address_register,
                    )?;

                    (ty, address_register)
                }
                (Some(type_expression), None) => {
                    let ty = ready!(evaluate_type_expression_runtime(
                        info,
                        jobs,
                        arena,
                        scope,
                        context,
                        instructions,
                        type_expression
                    ));

                    if !ty.is_runtime_type() {
                        return Err(error(
                            scope,
                            type_expression.range(),
                            format!("Cannot create variables of type '{ty}'"),
                        ));
                    }

                    let address_register = append_allocate_local(
                        context,
                        instructions,
                        ty.size(info.architecture_sizes),
                        ty.alignment(info.architecture_sizes),
                    );

                    (ty, address_register)
                }
                (None, Some(initializer)) => {
                    let initializer_value = ready!(generate_expression(
                        info,
                        jobs,
                        arena,
                        scope,
                        context,
                        instructions,
                        initializer
                    ));

                    let ty = coerce_to_default_type(
                        info,
                        scope,
                        initializer.range(),
                        initializer_value.ty,
                    )?;

                    if !ty.is_runtime_type() {
                        return Err(error(
                            scope,
                            initializer.range(),
                            format!("Cannot create variables of type '{ty}'"),
                        ));
                    }

                    let address_register = append_allocate_local(
                        context,
                        instructions,
                        ty.size(info.architecture_sizes),
                        ty.alignment(info.architecture_sizes),
                    );

                    coerce_to_type_write(
                        info,
                        scope,
                        context,
                        instructions,
                        variable_declaration.range,
                        initializer_value.ty,
                        initializer_value.value,
                        ty,
                        address_register,
                    )?;

                    (ty, address_register)
                }
                (None, None) => {
                    return Err(error(
                        scope,
                        variable_declaration.range,
                        "Variable declarations must have a type or an initializer",
                    ));
                }
            };

            add_new_variable(context, variable_declaration.name, address_register, ty)?;

            done(())
        }
        Statement::Assignment {
            target,
            value,
            range,
        } => {
            let target_value = ready!(generate_expression(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
                target
            ));

            let AnyRuntimeValue::Address(address_register) = target_value.value else {
                return Err(error(scope, target.range(), "Value is not assignable"));
            };

            let value = ready!(generate_expression(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
                value
            ));

            coerce_to_type_write(
                info,
                scope,
                context,
                instructions,
                *range,
                value.ty,
                value.value,
                target_value.ty,
                address_register,
            )?;

            done(())
        }
        Statement::BinaryOperationAssignment {
            target,
            operator,
            value,
            range,
        } => {
            // The target expression is evaluated exactly once; its address
            // serves as both the left operand and the store destination.
            let target_value = ready!(generate_expression(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
                target
            ));

            let AnyRuntimeValue::Address(address_register) = target_value.value else {
                return Err(error(scope, target.range(), "Value is not assignable"));
            };

            let right_value = ready!(generate_expression(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
                value
            ));

            let result = generate_binary_operation_values(
                info,
                arena,
                scope,
                context,
                instructions,
                *range,
                target.range(),
                target_value,
                value.range(),
                right_value,
                *operator,
            )?;

            coerce_to_type_write(
                info,
                scope,
                context,
                instructions,
                *range,
                result.ty,
                result.value,
                target_value.ty,
                address_register,
            )?;

            done(())
        }
        Statement::IfStatement {
            condition,
            statements: then_statements,
            else_ifs,
            else_statements,
            ..
        } => {
            let mut end_jumps = Vec::new();

            let condition_value = ready!(generate_expression(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
                condition
            ));

            if condition_value.ty != AnyType::Boolean {
                return Err(error(
                    scope,
                    condition.range(),
                    format!(
                        "Non-boolean if statement condition. Got {}",
                        condition_value.ty
                    ),
                ));
            }

            let condition_register = generate_in_register_boolean_value(
                info,
                context,
                instructions,
                condition_value.value,
            );

            // Branch over the jump that skips the arm.
            append_branch(instructions, condition_register, instructions.len() + 2);
            let skip_jump_index = instructions.len();
            append_jump(instructions, PENDING_JUMP);

            ready!(generate_block(
                info,
                jobs,
                arena,
                context,
                instructions,
                then_statements
            ));

            if !matches!(instructions.last(), Some(Instruction::Return { .. })) {
                end_jumps.push(instructions.len());
                append_jump(instructions, PENDING_JUMP);
            }

            let end_of_then_index = instructions.len();
            patch_jump(instructions, skip_jump_index, end_of_then_index);

            for else_if in else_ifs.iter() {
                let condition_value = ready!(generate_expression(
                    info,
                    jobs,
                    arena,
                    scope,
                    context,
                    instructions,
                    else_if.condition
                ));

                if condition_value.ty != AnyType::Boolean {
                    return Err(error(
                        scope,
                        else_if.condition.range(),
                        format!(
                            "Non-boolean if statement condition. Got {}",
                            condition_value.ty
                        ),
                    ));
                }

                let condition_register = generate_in_register_boolean_value(
                    info,
                    context,
                    instructions,
                    condition_value.value,
                );

                append_branch(instructions, condition_register, instructions.len() + 2);
                let skip_jump_index = instructions.len();
                append_jump(instructions, PENDING_JUMP);

                ready!(generate_block(
                    info,
                    jobs,
                    arena,
                    context,
                    instructions,
                    else_if.statements
                ));

                if !matches!(instructions.last(), Some(Instruction::Return { .. })) {
                    end_jumps.push(instructions.len());
                    append_jump(instructions, PENDING_JUMP);
                }

                let end_of_else_if_index = instructions.len();
                patch_jump(instructions, skip_jump_index, end_of_else_if_index);
            }

            if !else_statements.is_empty() {
                ready!(generate_block(
                    info,
                    jobs,
                    arena,
                    context,
                    instructions,
                    else_statements
                ));
            }

            let end = instructions.len();
            for jump_index in end_jumps {
                patch_jump(instructions, jump_index, end);
            }

            done(())
        }
        Statement::WhileLoop {
            condition,
            statements: body,
            ..
        } => {
            let condition_index = instructions.len();

            let condition_value = ready!(generate_expression(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
                condition
            ));

            if condition_value.ty != AnyType::Boolean {
                return Err(error(
                    scope,
                    condition.range(),
                    format!(
                        "Non-boolean while loop condition. Got {}",
                        condition_value.ty
                    ),
                ));
            }

            let condition_register = generate_in_register_boolean_value(
                info,
                context,
                instructions,
                condition_value.value,
            );

            append_branch(instructions, condition_register, instructions.len() + 2);
            let jump_out_index = instructions.len();
            append_jump(instructions, PENDING_JUMP);

            let old_in_breakable_scope = context.in_breakable_scope;
            let old_break_jumps = std::mem::take(&mut context.break_jumps);
            context.in_breakable_scope = true;

            ready!(generate_block(info, jobs, arena, context, instructions, body));

            let break_jumps = std::mem::replace(&mut context.break_jumps, old_break_jumps);
            context.in_breakable_scope = old_in_breakable_scope;

            if !matches!(instructions.last(), Some(Instruction::Return { .. })) {
                append_jump(instructions, condition_index);
            }

            let end = instructions.len();
            patch_jump(instructions, jump_out_index, end);
            for jump_index in break_jumps {
                patch_jump(instructions, jump_index, end);
            }

            done(())
        }
        Statement::ForLoop {
            index_name,
            from,
            to,
            statements: body,
            range,
        } => {
            let index_name = match index_name {
                Some(name) => *name,
                None => crate::ast::Identifier {
                    text: "it",
                    range: *range,
                },
            };

            let from_value = ready!(generate_expression(
                info,
                jobs,
                arena,
                scope,
                context,
                instructions,
                from
            ));

            // The index slot's size is only known once the index type is
            // determined; the allocate (and any from-store) are patched below.
            let index_address_register = allocate_register(context);
            let allocate_local_index = instructions.len();
            instructions.push(Instruction::AllocateLocal {
                size: 0,
                alignment: 0,
                destination: index_address_register,
            });

            let (condition_index, to_register, index_type) =
                if from_value.ty == AnyType::UndeterminedInteger {
                    let from_integer =
                        from_value.value.unwrap_constant().unwrap_integer();

                    let from_register = allocate_register(context);
                    let from_constant_index = instructions.len();
                    instructions.push(Instruction::IntegerConstant {
                        size: info.architecture_sizes.default_integer_size,
                        value: from_integer,
                        destination: from_register,
                    });

                    let from_store_index = instructions.len();
                    instructions.push(Instruction::StoreInteger {
                        size: info.architecture_sizes.default_integer_size,
                        source: from_register,
                        address: index_address_register,
                    });

                    let condition_index = instructions.len();

                    let to_value = ready!(generate_expression(
                        info,
                        jobs,
                        arena,
                        scope,
                        context,
                        instructions,
                        to
                    ));

                    // Default the index type from the `to` expression.
                    let determined_type =
                        coerce_to_default_type(info, scope, *range, to_value.ty)?;

                    let AnyType::Integer(integer) = determined_type else {
                        return Err(error(
                            scope,
                            *range,
                            format!(
                                "For loop index/range must be an integer. Got '{determined_type}'"
                            ),
                        ));
                    };

                    let byte_size = integer.size.byte_size();
                    match &mut instructions[allocate_local_index] {
                        Instruction::AllocateLocal { size, alignment, .. } => {
                            *size = byte_size;
                            *alignment = byte_size;
                        }
                        _ => unreachable!(),
                    }
                    match &mut instructions[from_constant_index] {
                        Instruction::IntegerConstant { size, .. } => *size = integer.size,
                        _ => unreachable!(),
                    }
                    match &mut instructions[from_store_index] {
                        Instruction::StoreInteger { size, .. } => *size = integer.size,
                        _ => unreachable!(),
                    }

                    crate::constant::check_undetermined_integer_to_integer_coercion(
                        scope,
                        *range,
                        integer,
                        from_integer as i64,
                    )?;

                    let to_register = coerce_to_integer_register_value(
                        scope,
                        context,
                        instructions,
                        to.range(),
                        to_value.ty,
                        to_value.value,
                        integer,
                    )?;

                    (condition_index, to_register, integer)
                } else {
                    let determined_type =
                        coerce_to_default_type(info, scope, *range, from_value.ty)?;

                    let AnyType::Integer(integer) = determined_type else {
                        return Err(error(
                            scope,
                            *range,
                            format!(
                                "For loop index/range must be an integer. Got '{determined_type}'"
                            ),
                        ));
                    };

                    let byte_size = integer.size.byte_size();
                    match &mut instructions[allocate_local_index] {
                        Instruction::AllocateLocal { size, alignment, .. } => {
                            *size = byte_size;
                            *alignment = byte_size;
                        }
                        _ => unreachable!(),
                    }

                    let from_register = coerce_to_integer_register_value(
                        scope,
                        context,
                        instructions,
                        from.range(),
                        from_value.ty,
                        from_value.value,
                        integer,
                    )?;

                    append_store_integer(
                        instructions,
                        integer.size,
                        from_register,
                        index_address_register,
                    );

                    let condition_index = instructions.len();

                    let to_value = ready!(generate_expression(
                        info,
                        jobs,
                        arena,
                        scope,
                        context,
                        instructions,
                        to
                    ));

                    let to_register = coerce_to_integer_register_value(
                        scope,
                        context,
                        instructions,
                        to.range(),
                        to_value.ty,
                        to_value.value,
                        integer,
                    )?;

                    (condition_index, to_register, integer)
                };

            let current_index_register = append_load_integer(
                context,
                instructions,
                index_type.size,
                index_address_register,
            );

            let comparison_operation = if index_type.is_signed {
                IntegerComparisonOperation::SignedGreaterThan
            } else {
                IntegerComparisonOperation::UnsignedGreaterThan
            };

            let condition_register = append_integer_comparison(
                context,
                instructions,
                comparison_operation,
                index_type.size,
                current_index_register,
                to_register,
            );

            let branch_out_index = instructions.len();
            append_branch(instructions, condition_register, PENDING_JUMP);

            let for_scope = context.child_scopes[context.next_child_scope_index];
            context.next_child_scope_index += 1;
            debug_assert!(context.next_child_scope_index <= context.child_scopes.len());

            context.variable_scope_stack.push(VariableScope {
                constant_scope: for_scope,
                variables: Vec::new(),
            });

            let old_in_breakable_scope = context.in_breakable_scope;
            let old_break_jumps = std::mem::take(&mut context.break_jumps);
            context.in_breakable_scope = true;

            add_new_variable(
                context,
                index_name,
                index_address_register,
                AnyType::Integer(index_type),
            )?;

            for &child_statement in body.iter() {
                if !is_not_runtime_statement(child_statement) {
                    ready!(generate_statement(
                        info,
                        jobs,
                        arena,
                        for_scope,
                        context,
                        instructions,
                        child_statement
                    ));
                }
            }

            let break_jumps = std::mem::replace(&mut context.break_jumps, old_break_jumps);
            context.in_breakable_scope = old_in_breakable_scope;
            context.variable_scope_stack.pop();

            let one_register =
                append_integer_constant(context, instructions, index_type.size, 1);

            let next_index_register = append_integer_arithmetic(
                context,
                instructions,
                IntegerArithmeticOperation::Add,
                index_type.size,
                current_index_register,
                one_register,
            );

            append_store_integer(
                instructions,
                index_type.size,
                next_index_register,
                index_address_register,
            );

            append_jump(instructions, condition_index);

            let end = instructions.len();
            for jump_index in break_jumps {
                patch_jump(instructions, jump_index, end);
            }
            patch_jump(instructions, branch_out_index, end);

            done(())
        }
        Statement::ReturnStatement { value, range } => {
            let value_register = match value {
                Some(value_expression) => {
                    if context.return_type == AnyType::Void {
                        return Err(error(scope, *range, "Erroneous return value"));
                    }

                    let value = ready!(generate_expression(
                        info,
                        jobs,
                        arena,
                        scope,
                        context,
                        instructions,
                        value_expression
                    ));

                    match get_type_representation(info, context.return_type) {
                        RegisterRepresentation::InRegister { .. } => {
                            let register_index = coerce_to_type_register(
                                info,
                                scope,
                                context,
                                instructions,
                                value_expression.range(),
                                value.ty,
                                value.value,
                                context.return_type,
                            )?;

                            Some(register_index)
                        }
                        RegisterRepresentation::Memory => {
                            let return_parameter_register = context
                                .return_parameter_register
                                .expect("memory return has a parameter register");

                            coerce_to_type_write(
                                info,
                                scope,
                                context,
                                instructions,
                                value_expression.range(),
                                value.ty,
                                value.value,
                                context.return_type,
                                return_parameter_register,
                            )?;

                            None
                        }
                    }
                }
                None => {
                    if context.return_type != AnyType::Void {
                        return Err(error(scope, *range, "Missing return value"));
                    }

                    None
                }
            };

            instructions.push(Instruction::Return {
                value: value_register,
            });

            done(())
        }
        Statement::BreakStatement { range } => {
            if !context.in_breakable_scope {
                return Err(error(scope, *range, "Not in a break-able scope"));
            }

            context.break_jumps.push(instructions.len());
            append_jump(instructions, PENDING_JUMP);

            done(())
        }
        _ => unreachable!("statement has no runtime lowering"),
    }
}

/// Lower a block's statements inside the next pre-created child scope.
fn generate_block<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    context: &mut GenerationContext<'a>,
    instructions: &mut Vec<Instruction>,
    statements: &'a [&'a Statement<'a>],
) -> DelayedResult<()> {
    let block_scope = context.child_scopes[context.next_child_scope_index];
    context.next_child_scope_index += 1;
    debug_assert!(context.next_child_scope_index <= context.child_scopes.len());

    context.variable_scope_stack.push(VariableScope {
        constant_scope: block_scope,
        variables: Vec::new(),
    });

    for &child_statement in statements {
        if !is_not_runtime_statement(child_statement) {
            ready!(generate_statement(
                info,
                jobs,
                arena,
                block_scope,
                context,
                instructions,
                child_statement
            ));
        }
    }

    context.variable_scope_stack.pop();

    done(())
}
