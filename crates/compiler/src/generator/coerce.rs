//! Runtime implicit coercion.
//!
//! Mirrors the constant evaluator's coercion rules but produces IR: either a
//! register holding the coerced value (`coerce_to_type_register`) or stores
//! through a caller-provided address (`coerce_to_type_write`). Both fold
//! through the constant path when the operand is still a constant.

use crate::ast::FileRange;
use crate::constant::{
    check_undetermined_integer_to_integer_coercion, AnyConstantValue, ConstantScope, GlobalInfo,
};
use crate::error::{error, CompileError};
use crate::ir::Instruction;
use crate::ir::Register;
use crate::types::{AnyType, Integer, FloatType};

use super::statics::{register_static_array_constant, register_struct_constant};
use super::{
    append_allocate_local, append_copy_memory, append_float_constant, append_integer_constant,
    append_load_float, append_reference_static, append_store_integer, append_store_float,
    generate_address_offset, generate_in_register_boolean_value,
    generate_in_register_integer_value, generate_in_register_pointer_value, AnyRuntimeValue,
    GenerationContext,
};

pub fn coerce_to_integer_register_value<'a>(
    scope: &ConstantScope<'a>,
    context: &mut GenerationContext<'a>,
    instructions: &mut Vec<Instruction>,
    range: FileRange,
    ty: AnyType<'a>,
    value: AnyRuntimeValue<'a>,
    target_type: Integer,
) -> Result<Register, CompileError> {
    match ty {
        AnyType::Integer(integer) if integer == target_type => Ok(
            generate_in_register_integer_value(context, instructions, target_type, value),
        ),
        AnyType::UndeterminedInteger => {
            let integer_value = value.unwrap_constant().unwrap_integer();

            check_undetermined_integer_to_integer_coercion(
                scope,
                range,
                target_type,
                integer_value as i64,
            )?;

            Ok(append_integer_constant(
                context,
                instructions,
                target_type.size,
                integer_value,
            ))
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

pub fn coerce_to_float_register_value<'a>(
    scope: &ConstantScope<'a>,
    context: &mut GenerationContext<'a>,
    instructions: &mut Vec<Instruction>,
    range: FileRange,
    ty: AnyType<'a>,
    value: AnyRuntimeValue<'a>,
    target_type: FloatType,
) -> Result<Register, CompileError> {
    match ty {
        AnyType::UndeterminedInteger => {
            let integer_value = value.unwrap_constant().unwrap_integer();
            Ok(append_float_constant(
                context,
                instructions,
                target_type.size,
                integer_value as i64 as f64,
            ))
        }
        AnyType::FloatType(float_type) if float_type.size == target_type.size => match value {
            AnyRuntimeValue::Constant(constant) => Ok(append_float_constant(
                context,
                instructions,
                float_type.size,
                constant.unwrap_float(),
            )),
            AnyRuntimeValue::Register(register) => Ok(register),
            AnyRuntimeValue::Address(address) => Ok(append_load_float(
                context,
                instructions,
                float_type.size,
                address,
            )),
            AnyRuntimeValue::UndeterminedStruct(_) => {
                panic!("undetermined struct cannot be a float")
            }
        },
        AnyType::UndeterminedFloat => {
            let float_value = value.unwrap_constant().unwrap_float();
            Ok(append_float_constant(
                context,
                instructions,
                target_type.size,
                float_value,
            ))
        }
        _ => Err(error(
            scope,
            range,
            format!(
                "Cannot implicitly convert '{}' to '{}'",
                ty,
                AnyType::FloatType(target_type)
            ),
        )),
    }
}

pub fn coerce_to_pointer_register_value<'a>(
    info: GlobalInfo<'a>,
    scope: &ConstantScope<'a>,
    context: &mut GenerationContext<'a>,
    instructions: &mut Vec<Instruction>,
    range: FileRange,
    ty: AnyType<'a>,
    value: AnyRuntimeValue<'a>,
    target_pointed: &'a AnyType<'a>,
) -> Result<Register, CompileError> {
    match ty {
        AnyType::UndeterminedInteger => {
            let integer_value = value.unwrap_constant().unwrap_integer();
            Ok(append_integer_constant(
                context,
                instructions,
                info.architecture_sizes.address_size,
                integer_value,
            ))
        }
        AnyType::Pointer(pointed) if *pointed == *target_pointed => Ok(
            generate_in_register_pointer_value(info, context, instructions, value),
        ),
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

/// Produce the coerced value in a register. For aggregates the register holds
/// the value's address.
pub fn coerce_to_type_register<'a>(
    info: GlobalInfo<'a>,
    scope: &ConstantScope<'a>,
    context: &mut GenerationContext<'a>,
    instructions: &mut Vec<Instruction>,
    range: FileRange,
    ty: AnyType<'a>,
    value: AnyRuntimeValue<'a>,
    target_type: AnyType<'a>,
) -> Result<Register, CompileError> {
    let mismatch = || {
        Err(error(
            scope,
            range,
            format!("Cannot implicitly convert '{ty}' to '{target_type}'"),
        ))
    };

    match target_type {
        AnyType::Integer(integer) => coerce_to_integer_register_value(
            scope,
            context,
            instructions,
            range,
            ty,
            value,
            integer,
        ),
        AnyType::Boolean => {
            if ty == AnyType::Boolean {
                Ok(generate_in_register_boolean_value(
                    info,
                    context,
                    instructions,
                    value,
                ))
            } else {
                mismatch()
            }
        }
        AnyType::FloatType(float_type) => coerce_to_float_register_value(
            scope,
            context,
            instructions,
            range,
            ty,
            value,
            float_type,
        ),
        AnyType::Pointer(pointed) => coerce_to_pointer_register_value(
            info,
            scope,
            context,
            instructions,
            range,
            ty,
            value,
            pointed,
        ),
        AnyType::Enum(target_enum) => match ty {
            AnyType::Enum(enum_type)
                if std::ptr::eq(enum_type.definition, target_enum.definition) =>
            {
                Ok(generate_in_register_integer_value(
                    context,
                    instructions,
                    target_enum.backing,
                    value,
                ))
            }
            _ => mismatch(),
        },
        AnyType::ArrayType(target_element) => {
            match ty {
                AnyType::ArrayType(element) if *element == *target_element => match value {
                    AnyRuntimeValue::Register(register) => Ok(register),
                    AnyRuntimeValue::Address(address) => Ok(address),
                    AnyRuntimeValue::Constant(_) => {
                        // A fully constant array value still has to live
                        // somewhere addressable; write it into a local slot.
                        let address_size = info.architecture_sizes.address_size;
                        let slot = append_allocate_local(
                            context,
                            instructions,
                            2 * address_size.byte_size(),
                            address_size.byte_size(),
                        );
                        coerce_to_type_write(
                            info,
                            scope,
                            context,
                            instructions,
                            range,
                            ty,
                            value,
                            target_type,
                            slot,
                        )?;
                        Ok(slot)
                    }
                    AnyRuntimeValue::UndeterminedStruct(_) => mismatch(),
                },
                AnyType::StaticArray {
                    length,
                    element_type,
                } if *element_type == *target_element => {
                    let pointer_register = match value {
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
                        AnyRuntimeValue::UndeterminedStruct(_) => return mismatch(),
                    };

                    let address_size = info.architecture_sizes.address_size;

                    let address_register = append_allocate_local(
                        context,
                        instructions,
                        2 * address_size.byte_size(),
                        address_size.byte_size(),
                    );

                    append_store_integer(
                        instructions,
                        address_size,
                        pointer_register,
                        address_register,
                    );

                    let length_address_register = generate_address_offset(
                        info,
                        context,
                        instructions,
                        address_register,
                        address_size.byte_size(),
                    );

                    let length_register =
                        append_integer_constant(context, instructions, address_size, length);

                    append_store_integer(
                        instructions,
                        address_size,
                        length_register,
                        length_address_register,
                    );

                    Ok(address_register)
                }
                AnyType::UndeterminedStruct(undetermined) => {
                    if undetermined.members.len() == 2
                        && undetermined.members[0].name == "pointer"
                        && undetermined.members[1].name == "length"
                    {
                        let member_0 = undetermined_member_value(value, 0);
                        let member_1 = undetermined_member_value(value, 1);

                        let pointer_result = coerce_to_pointer_register_value(
                            info,
                            scope,
                            context,
                            instructions,
                            range,
                            undetermined.members[0].member_type,
                            member_0,
                            target_element,
                        );

                        if let Ok(pointer_register) = pointer_result {
                            let length_result = coerce_to_integer_register_value(
                                scope,
                                context,
                                instructions,
                                range,
                                undetermined.members[1].member_type,
                                member_1,
                                Integer {
                                    size: info.architecture_sizes.address_size,
                                    is_signed: false,
                                },
                            );

                            if let Ok(length_register) = length_result {
                                let address_size = info.architecture_sizes.address_size;

                                let address_register = append_allocate_local(
                                    context,
                                    instructions,
                                    2 * address_size.byte_size(),
                                    address_size.byte_size(),
                                );

                                append_store_integer(
                                    instructions,
                                    address_size,
                                    pointer_register,
                                    address_register,
                                );

                                let length_address_register = generate_address_offset(
                                    info,
                                    context,
                                    instructions,
                                    address_register,
                                    address_size.byte_size(),
                                );

                                append_store_integer(
                                    instructions,
                                    address_size,
                                    length_register,
                                    length_address_register,
                                );

                                return Ok(address_register);
                            }
                        }
                    }

                    mismatch()
                }
                _ => mismatch(),
            }
        }
        AnyType::StaticArray {
            length: target_length,
            element_type: target_element,
        } => match ty {
            AnyType::StaticArray {
                length,
                element_type,
            } if *element_type == *target_element && length == target_length => match value {
                AnyRuntimeValue::Register(register) => Ok(register),
                AnyRuntimeValue::Address(address) => Ok(address),
                AnyRuntimeValue::Constant(constant) => {
                    let elements = constant.unwrap_static_array();
                    let name = register_static_array_constant(
                        info,
                        scope,
                        context,
                        *element_type,
                        elements,
                    );
                    Ok(append_reference_static(context, instructions, &name))
                }
                AnyRuntimeValue::UndeterminedStruct(_) => mismatch(),
            },
            _ => mismatch(),
        },
        AnyType::StructType(target_struct) => match ty {
            AnyType::StructType(struct_type)
                if std::ptr::eq(struct_type.definition, target_struct.definition)
                    && struct_type.members == target_struct.members =>
            {
                match value {
                    AnyRuntimeValue::Register(register) => Ok(register),
                    AnyRuntimeValue::Address(address) => Ok(address),
                    AnyRuntimeValue::Constant(constant) => {
                        let members = constant.unwrap_struct();
                        let name =
                            register_struct_constant(info, scope, context, struct_type, members);
                        Ok(append_reference_static(context, instructions, &name))
                    }
                    AnyRuntimeValue::UndeterminedStruct(_) => mismatch(),
                }
            }
            AnyType::UndeterminedStruct(undetermined) => {
                if target_struct.is_union() {
                    if undetermined.members.len() == 1 {
                        for member in target_struct.members.iter() {
                            if member.name == undetermined.members[0].name {
                                let address_register = append_allocate_local(
                                    context,
                                    instructions,
                                    AnyType::StructType(target_struct)
                                        .size(info.architecture_sizes),
                                    AnyType::StructType(target_struct)
                                        .alignment(info.architecture_sizes),
                                );

                                let member_value = undetermined_member_value(value, 0);

                                if coerce_to_type_write(
                                    info,
                                    scope,
                                    context,
                                    instructions,
                                    range,
                                    undetermined.members[0].member_type,
                                    member_value,
                                    member.member_type,
                                    address_register,
                                )
                                .is_ok()
                                {
                                    return Ok(address_register);
                                }

                                break;
                            }
                        }
                    }

                    mismatch()
                } else {
                    if target_struct.members.len() == undetermined.members.len() {
                        let same_members = target_struct
                            .members
                            .iter()
                            .zip(undetermined.members.iter())
                            .all(|(a, b)| a.name == b.name);

                        if same_members {
                            let address_register = append_allocate_local(
                                context,
                                instructions,
                                AnyType::StructType(target_struct).size(info.architecture_sizes),
                                AnyType::StructType(target_struct)
                                    .alignment(info.architecture_sizes),
                            );

                            let mut success = true;
                            for (index, member) in undetermined.members.iter().enumerate() {
                                let member_address_register = generate_address_offset(
                                    info,
                                    context,
                                    instructions,
                                    address_register,
                                    target_struct.member_offset(info.architecture_sizes, index),
                                );

                                let member_value = undetermined_member_value(value, index);

                                if coerce_to_type_write(
                                    info,
                                    scope,
                                    context,
                                    instructions,
                                    range,
                                    member.member_type,
                                    member_value,
                                    target_struct.members[index].member_type,
                                    member_address_register,
                                )
                                .is_err()
                                {
                                    success = false;
                                    break;
                                }
                            }

                            if success {
                                return Ok(address_register);
                            }
                        }
                    }

                    mismatch()
                }
            }
            _ => mismatch(),
        },
        _ => mismatch(),
    }
}

fn undetermined_member_value<'a>(
    value: AnyRuntimeValue<'a>,
    index: usize,
) -> AnyRuntimeValue<'a> {
    match value {
        AnyRuntimeValue::UndeterminedStruct(members) => members[index],
        AnyRuntimeValue::Constant(constant) => {
            AnyRuntimeValue::Constant(constant.unwrap_struct()[index])
        }
        _ => panic!("expected a struct-shaped value"),
    }
}

/// Coerce and write the value into memory at `address_register`.
#[allow(clippy::too_many_arguments)]
pub fn coerce_to_type_write<'a>(
    info: GlobalInfo<'a>,
    scope: &ConstantScope<'a>,
    context: &mut GenerationContext<'a>,
    instructions: &mut Vec<Instruction>,
    range: FileRange,
    ty: AnyType<'a>,
    value: AnyRuntimeValue<'a>,
    target_type: AnyType<'a>,
    address_register: Register,
) -> Result<(), CompileError> {
    let mismatch = || {
        Err(error(
            scope,
            range,
            format!("Cannot implicitly convert '{ty}' to '{target_type}'"),
        ))
    };

    match target_type {
        AnyType::Integer(integer) => {
            let register = coerce_to_integer_register_value(
                scope,
                context,
                instructions,
                range,
                ty,
                value,
                integer,
            )?;
            append_store_integer(instructions, integer.size, register, address_register);
            Ok(())
        }
        AnyType::Boolean if ty == AnyType::Boolean => {
            let register =
                generate_in_register_boolean_value(info, context, instructions, value);
            append_store_integer(
                instructions,
                info.architecture_sizes.boolean_size,
                register,
                address_register,
            );
            Ok(())
        }
        AnyType::FloatType(float_type) => {
            let register = coerce_to_float_register_value(
                scope,
                context,
                instructions,
                range,
                ty,
                value,
                float_type,
            )?;
            append_store_float(instructions, float_type.size, register, address_register);
            Ok(())
        }
        AnyType::Pointer(target_pointed) => match ty {
            AnyType::UndeterminedInteger => {
                let integer_value = value.unwrap_constant().unwrap_integer();
                let register = append_integer_constant(
                    context,
                    instructions,
                    info.architecture_sizes.address_size,
                    integer_value,
                );
                append_store_integer(
                    instructions,
                    info.architecture_sizes.address_size,
                    register,
                    address_register,
                );
                Ok(())
            }
            AnyType::Pointer(pointed) if *pointed == *target_pointed => {
                let register =
                    generate_in_register_pointer_value(info, context, instructions, value);
                append_store_integer(
                    instructions,
                    info.architecture_sizes.address_size,
                    register,
                    address_register,
                );
                Ok(())
            }
            _ => mismatch(),
        },
        AnyType::Enum(target_enum) => match ty {
            AnyType::Enum(enum_type)
                if std::ptr::eq(enum_type.definition, target_enum.definition) =>
            {
                let register = generate_in_register_integer_value(
                    context,
                    instructions,
                    target_enum.backing,
                    value,
                );
                append_store_integer(
                    instructions,
                    target_enum.backing.size,
                    register,
                    address_register,
                );
                Ok(())
            }
            _ => mismatch(),
        },
        AnyType::ArrayType(target_element) => {
            let address_size = info.architecture_sizes.address_size;

            match ty {
                AnyType::ArrayType(element) if *element == *target_element => match value {
                    AnyRuntimeValue::Constant(constant) => {
                        // The constant is either a true {pointer, length} pair
                        // or interned constant elements carried through an
                        // earlier coercion.
                        let (pointer_register, length) = match constant {
                            AnyConstantValue::Array(array_value) => (
                                append_integer_constant(
                                    context,
                                    instructions,
                                    address_size,
                                    array_value.pointer,
                                ),
                                array_value.length,
                            ),
                            _ => {
                                let elements = constant.unwrap_static_array();
                                let name = register_static_array_constant(
                                    info,
                                    scope,
                                    context,
                                    *element,
                                    elements,
                                );
                                (
                                    append_reference_static(context, instructions, &name),
                                    elements.len() as u64,
                                )
                            }
                        };

                        append_store_integer(
                            instructions,
                            address_size,
                            pointer_register,
                            address_register,
                        );

                        let length_register =
                            append_integer_constant(context, instructions, address_size, length);
                        let length_address_register = generate_address_offset(
                            info,
                            context,
                            instructions,
                            address_register,
                            address_size.byte_size(),
                        );
                        append_store_integer(
                            instructions,
                            address_size,
                            length_register,
                            length_address_register,
                        );

                        Ok(())
                    }
                    AnyRuntimeValue::Register(source) | AnyRuntimeValue::Address(source) => {
                        append_copy_memory(
                            instructions,
                            2 * address_size.byte_size(),
                            source,
                            address_register,
                            address_size.byte_size(),
                        );
                        Ok(())
                    }
                    AnyRuntimeValue::UndeterminedStruct(_) => mismatch(),
                },
                AnyType::StaticArray {
                    length,
                    element_type,
                } if *element_type == *target_element => {
                    let pointer_register = match value {
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
                        AnyRuntimeValue::UndeterminedStruct(_) => return mismatch(),
                    };

                    append_store_integer(
                        instructions,
                        address_size,
                        pointer_register,
                        address_register,
                    );

                    let length_address_register = generate_address_offset(
                        info,
                        context,
                        instructions,
                        address_register,
                        address_size.byte_size(),
                    );

                    let length_register =
                        append_integer_constant(context, instructions, address_size, length);

                    append_store_integer(
                        instructions,
                        address_size,
                        length_register,
                        length_address_register,
                    );

                    Ok(())
                }
                AnyType::UndeterminedStruct(undetermined) => {
                    if undetermined.members.len() == 2
                        && undetermined.members[0].name == "pointer"
                        && undetermined.members[1].name == "length"
                    {
                        let member_0 = undetermined_member_value(value, 0);
                        let member_1 = undetermined_member_value(value, 1);

                        let pointer_result = coerce_to_pointer_register_value(
                            info,
                            scope,
                            context,
                            instructions,
                            range,
                            undetermined.members[0].member_type,
                            member_0,
                            target_element,
                        );

                        if let Ok(pointer_register) = pointer_result {
                            let length_result = coerce_to_integer_register_value(
                                scope,
                                context,
                                instructions,
                                range,
                                undetermined.members[1].member_type,
                                member_1,
                                Integer {
                                    size: address_size,
                                    is_signed: false,
                                },
                            );

                            if let Ok(length_register) = length_result {
                                append_store_integer(
                                    instructions,
                                    address_size,
                                    pointer_register,
                                    address_register,
                                );

                                let length_address_register = generate_address_offset(
                                    info,
                                    context,
                                    instructions,
                                    address_register,
                                    address_size.byte_size(),
                                );

                                append_store_integer(
                                    instructions,
                                    address_size,
                                    length_register,
                                    length_address_register,
                                );

                                return Ok(());
                            }
                        }
                    }

                    mismatch()
                }
                _ => mismatch(),
            }
        }
        AnyType::StaticArray {
            length: target_length,
            element_type: target_element,
        } => match ty {
            AnyType::StaticArray {
                length,
                element_type,
            } if *element_type == *target_element && length == target_length => {
                let source_address_register = match value {
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
                    AnyRuntimeValue::UndeterminedStruct(_) => return mismatch(),
                };

                append_copy_memory(
                    instructions,
                    length * element_type.size(info.architecture_sizes),
                    source_address_register,
                    address_register,
                    element_type.alignment(info.architecture_sizes),
                );

                Ok(())
            }
            _ => mismatch(),
        },
        AnyType::StructType(target_struct) => match ty {
            AnyType::StructType(struct_type)
                if std::ptr::eq(struct_type.definition, target_struct.definition)
                    && struct_type.members == target_struct.members =>
            {
                let source_address_register = match value {
                    AnyRuntimeValue::Constant(constant) => {
                        let members = constant.unwrap_struct();
                        let name =
                            register_struct_constant(info, scope, context, struct_type, members);
                        append_reference_static(context, instructions, &name)
                    }
                    AnyRuntimeValue::Register(register) => register,
                    AnyRuntimeValue::Address(address) => address,
                    AnyRuntimeValue::UndeterminedStruct(_) => return mismatch(),
                };

                append_copy_memory(
                    instructions,
                    AnyType::StructType(struct_type).size(info.architecture_sizes),
                    source_address_register,
                    address_register,
                    AnyType::StructType(struct_type).alignment(info.architecture_sizes),
                );

                Ok(())
            }
            AnyType::UndeterminedStruct(undetermined) => {
                if target_struct.is_union() {
                    if undetermined.members.len() == 1 {
                        for member in target_struct.members.iter() {
                            if member.name == undetermined.members[0].name {
                                let member_value = undetermined_member_value(value, 0);

                                return coerce_to_type_write(
                                    info,
                                    scope,
                                    context,
                                    instructions,
                                    range,
                                    undetermined.members[0].member_type,
                                    member_value,
                                    member.member_type,
                                    address_register,
                                );
                            }
                        }
                    }

                    mismatch()
                } else {
                    if target_struct.members.len() == undetermined.members.len() {
                        let same_members = target_struct
                            .members
                            .iter()
                            .zip(undetermined.members.iter())
                            .all(|(a, b)| a.name == b.name);

                        if same_members {
                            for (index, member) in undetermined.members.iter().enumerate() {
                                let member_value = undetermined_member_value(value, index);

                                let member_address_register = generate_address_offset(
                                    info,
                                    context,
                                    instructions,
                                    address_register,
                                    target_struct.member_offset(info.architecture_sizes, index),
                                );

                                coerce_to_type_write(
                                    info,
                                    scope,
                                    context,
                                    instructions,
                                    range,
                                    member.member_type,
                                    member_value,
                                    target_struct.members[index].member_type,
                                    member_address_register,
                                )?;
                            }

                            return Ok(());
                        }
                    }

                    mismatch()
                }
            }
            _ => mismatch(),
        },
        _ => mismatch(),
    }
}
