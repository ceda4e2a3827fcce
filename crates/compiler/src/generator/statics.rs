//! Typed byte images for constants, and interning of literal data that must
//! be referenceable by address. All multi-byte fields are little-endian.

use crate::constant::{AnyConstantValue, ConstantScope, GlobalInfo};
use crate::ir::StaticConstant;
use crate::types::{AnyType, RegisterSize, StructType};

use super::GenerationContext;

pub fn write_integer(buffer: &mut [u8], offset: u64, size: RegisterSize, value: u64) {
    let offset = offset as usize;
    let bytes = value.to_le_bytes();
    buffer[offset..offset + size.byte_size() as usize]
        .copy_from_slice(&bytes[..size.byte_size() as usize]);
}

fn write_struct(
    info: GlobalInfo,
    buffer: &mut [u8],
    offset: u64,
    struct_type: StructType,
    member_values: &[AnyConstantValue],
) {
    for (index, member) in struct_type.members.iter().enumerate() {
        write_value(
            info,
            buffer,
            offset + struct_type.member_offset(info.architecture_sizes, index),
            member.member_type,
            member_values[index],
        );
    }
}

fn write_static_array(
    info: GlobalInfo,
    buffer: &mut [u8],
    offset: u64,
    element_type: AnyType,
    elements: &[AnyConstantValue],
) {
    let element_size = element_type.size(info.architecture_sizes);

    for (index, &element) in elements.iter().enumerate() {
        write_value(
            info,
            buffer,
            offset + index as u64 * element_size,
            element_type,
            element,
        );
    }
}

/// Serialize a constant into `buffer` at `offset` according to its type's
/// layout. The buffer must have room for `ty.size(..)` bytes at the offset.
pub fn write_value(
    info: GlobalInfo,
    buffer: &mut [u8],
    offset: u64,
    ty: AnyType,
    value: AnyConstantValue,
) {
    match ty {
        AnyType::Integer(integer) => {
            write_integer(buffer, offset, integer.size, value.unwrap_integer());
        }
        AnyType::Boolean => {
            write_integer(
                buffer,
                offset,
                info.architecture_sizes.boolean_size,
                value.unwrap_boolean() as u64,
            );
        }
        AnyType::FloatType(float_type) => {
            let float_value = value.unwrap_float();
            let bits = match float_type.size {
                RegisterSize::Size32 => (float_value as f32).to_bits() as u64,
                RegisterSize::Size64 => float_value.to_bits(),
                _ => panic!("invalid float size"),
            };
            write_integer(buffer, offset, float_type.size, bits);
        }
        AnyType::Pointer(_) => {
            write_integer(
                buffer,
                offset,
                info.architecture_sizes.address_size,
                value.unwrap_pointer(),
            );
        }
        AnyType::Enum(enum_type) => {
            write_integer(buffer, offset, enum_type.backing.size, value.unwrap_integer());
        }
        AnyType::ArrayType(_) => {
            let array_value = value.unwrap_array();
            write_integer(
                buffer,
                offset,
                info.architecture_sizes.address_size,
                array_value.pointer,
            );
            write_integer(
                buffer,
                offset + info.architecture_sizes.address_size.byte_size(),
                info.architecture_sizes.address_size,
                array_value.length,
            );
        }
        AnyType::StaticArray { element_type, .. } => {
            write_static_array(
                info,
                buffer,
                offset,
                *element_type,
                value.unwrap_static_array(),
            );
        }
        AnyType::StructType(struct_type) => {
            write_struct(info, buffer, offset, struct_type, value.unwrap_struct());
        }
        _ => panic!("type '{ty}' has no byte image"),
    }
}

/// Intern a constant-element array as referenceable static data, returning
/// its symbol name.
pub fn register_static_array_constant<'a>(
    info: GlobalInfo<'a>,
    scope: &ConstantScope<'a>,
    context: &mut GenerationContext<'a>,
    element_type: AnyType<'a>,
    elements: &[AnyConstantValue<'a>],
) -> String {
    let element_size = element_type.size(info.architecture_sizes);
    let mut data = vec![0u8; (element_size * elements.len() as u64) as usize];

    write_static_array(info, &mut data, 0, element_type, elements);

    let name = context.next_constant_name();
    context.static_constants.push(StaticConstant {
        name: name.clone(),
        path: scope.file_path().to_string(),
        range: Default::default(),
        data,
        alignment: element_type.alignment(info.architecture_sizes),
    });

    name
}

/// Intern a struct constant as referenceable static data, returning its
/// symbol name.
pub fn register_struct_constant<'a>(
    info: GlobalInfo<'a>,
    scope: &ConstantScope<'a>,
    context: &mut GenerationContext<'a>,
    struct_type: StructType<'a>,
    members: &[AnyConstantValue<'a>],
) -> String {
    let mut data = vec![0u8; AnyType::StructType(struct_type).size(info.architecture_sizes) as usize];

    write_struct(info, &mut data, 0, struct_type, members);

    let name = context.next_constant_name();
    context.static_constants.push(StaticConstant {
        name: name.clone(),
        path: scope.file_path().to_string(),
        range: Default::default(),
        data,
        alignment: AnyType::StructType(struct_type).alignment(info.architecture_sizes),
    });

    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::GlobalInfo;
    use crate::types::{ArchitectureSizes, Integer};

    const SIZES: ArchitectureSizes = ArchitectureSizes {
        address_size: RegisterSize::Size64,
        default_integer_size: RegisterSize::Size64,
        default_float_size: RegisterSize::Size32,
        boolean_size: RegisterSize::Size8,
    };

    fn info() -> GlobalInfo<'static> {
        GlobalInfo {
            global_constants: &[],
            architecture_sizes: SIZES,
        }
    }

    #[test]
    fn integers_are_little_endian() {
        let mut buffer = [0u8; 4];
        write_integer(&mut buffer, 0, RegisterSize::Size32, 0x01020304);
        assert_eq!(buffer, [0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn value_images_occupy_exactly_size_of_bytes() {
        let ty = AnyType::Integer(Integer {
            size: RegisterSize::Size16,
            is_signed: false,
        });
        let size = ty.size(SIZES) as usize;

        let mut buffer = vec![0xAAu8; size + 2];
        write_value(
            info(),
            &mut buffer,
            1,
            ty,
            AnyConstantValue::Integer(0xBEEF),
        );

        // Only the two bytes at offset 1 were touched.
        assert_eq!(buffer, vec![0xAA, 0xEF, 0xBE, 0xAA]);
    }

    #[test]
    fn array_constant_image_is_pointer_then_length() {
        let element = AnyType::Integer(Integer {
            size: RegisterSize::Size8,
            is_signed: false,
        });
        let ty = AnyType::ArrayType(&element);

        let mut buffer = vec![0u8; 16];
        write_value(
            info(),
            &mut buffer,
            0,
            ty,
            AnyConstantValue::Array(crate::constant::ArrayConstant {
                pointer: 0x11,
                length: 5,
            }),
        );

        assert_eq!(buffer[0], 0x11);
        assert_eq!(buffer[8], 5);
    }

    #[test]
    fn float_images_use_ieee_bits() {
        let ty = AnyType::FloatType(crate::types::FloatType {
            size: RegisterSize::Size32,
        });

        let mut buffer = vec![0u8; 4];
        write_value(info(), &mut buffer, 0, ty, AnyConstantValue::Float(1.0));
        assert_eq!(buffer, 1.0f32.to_bits().to_le_bytes());
    }
}
