//! The linear intermediate representation.
//!
//! A function body is a flat list of register-machine instructions; virtual
//! registers are numbered monotonically per function and branch targets are
//! indices into the same instruction list. Statics are referenced by their
//! emitted symbol name, which is also what the backend's name mapping reports.

use crate::ast::FileRange;
use crate::types::{CallingConvention, RegisterSize};

pub type Register = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerArithmeticOperation {
    Add,
    Subtract,
    Multiply,
    SignedDivide,
    UnsignedDivide,
    SignedModulus,
    UnsignedModulus,
    BitwiseAnd,
    BitwiseOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerComparisonOperation {
    Equal,
    SignedLessThan,
    UnsignedLessThan,
    SignedGreaterThan,
    UnsignedGreaterThan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatArithmeticOperation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatComparisonOperation {
    Equal,
    LessThan,
    GreaterThan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionCallParameter {
    pub size: RegisterSize,
    pub is_float: bool,
    pub register: Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallReturn {
    pub size: RegisterSize,
    pub is_float: bool,
    pub register: Register,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    IntegerArithmetic {
        operation: IntegerArithmeticOperation,
        size: RegisterSize,
        source_a: Register,
        source_b: Register,
        destination: Register,
    },
    IntegerComparison {
        operation: IntegerComparisonOperation,
        size: RegisterSize,
        source_a: Register,
        source_b: Register,
        destination: Register,
    },
    IntegerExtension {
        is_signed: bool,
        source_size: RegisterSize,
        destination_size: RegisterSize,
        source: Register,
        destination: Register,
    },
    IntegerTruncation {
        source_size: RegisterSize,
        destination_size: RegisterSize,
        source: Register,
        destination: Register,
    },
    IntegerConstant {
        size: RegisterSize,
        value: u64,
        destination: Register,
    },
    FloatArithmetic {
        operation: FloatArithmeticOperation,
        size: RegisterSize,
        source_a: Register,
        source_b: Register,
        destination: Register,
    },
    FloatComparison {
        operation: FloatComparisonOperation,
        size: RegisterSize,
        source_a: Register,
        source_b: Register,
        destination: Register,
    },
    /// Change a float's size.
    FloatConversion {
        source_size: RegisterSize,
        destination_size: RegisterSize,
        source: Register,
        destination: Register,
    },
    /// Truncate a float to an integer.
    FloatTruncation {
        source_size: RegisterSize,
        destination_size: RegisterSize,
        source: Register,
        destination: Register,
    },
    /// Convert an integer to a float.
    FloatFromInteger {
        is_signed: bool,
        source_size: RegisterSize,
        destination_size: RegisterSize,
        source: Register,
        destination: Register,
    },
    FloatConstant {
        size: RegisterSize,
        value: f64,
        destination: Register,
    },
    /// Produce the address of a named runtime static.
    ReferenceStatic {
        name: String,
        destination: Register,
    },
    /// Reserve a stack slot; the destination holds its base address.
    AllocateLocal {
        size: u64,
        alignment: u64,
        destination: Register,
    },
    LoadInteger {
        size: RegisterSize,
        address: Register,
        destination: Register,
    },
    StoreInteger {
        size: RegisterSize,
        source: Register,
        address: Register,
    },
    LoadFloat {
        size: RegisterSize,
        address: Register,
        destination: Register,
    },
    StoreFloat {
        size: RegisterSize,
        source: Register,
        address: Register,
    },
    CopyMemory {
        length: u64,
        source_address: Register,
        destination_address: Register,
        alignment: u64,
    },
    /// Jump to `destination_instruction` when the condition register is true.
    Branch {
        condition: Register,
        destination_instruction: usize,
    },
    Jump {
        destination_instruction: usize,
    },
    FunctionCall {
        address: Register,
        parameters: Vec<FunctionCallParameter>,
        return_: Option<CallReturn>,
        calling_convention: CallingConvention,
    },
    Return {
        value: Option<Register>,
    },
}

fn slot(size: RegisterSize, is_float: bool) -> String {
    let prefix = if is_float { 'f' } else { 'i' };
    format!("{}{}", prefix, size.bit_size())
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::IntegerArithmetic {
                operation,
                size,
                source_a,
                source_b,
                destination,
            } => {
                let name = match operation {
                    IntegerArithmeticOperation::Add => "add",
                    IntegerArithmeticOperation::Subtract => "sub",
                    IntegerArithmeticOperation::Multiply => "mul",
                    IntegerArithmeticOperation::SignedDivide => "sdiv",
                    IntegerArithmeticOperation::UnsignedDivide => "udiv",
                    IntegerArithmeticOperation::SignedModulus => "smod",
                    IntegerArithmeticOperation::UnsignedModulus => "umod",
                    IntegerArithmeticOperation::BitwiseAnd => "and",
                    IntegerArithmeticOperation::BitwiseOr => "or",
                };
                write!(
                    f,
                    "r{destination} = {name} i{} r{source_a}, r{source_b}",
                    size.bit_size()
                )
            }
            Instruction::IntegerComparison {
                operation,
                size,
                source_a,
                source_b,
                destination,
            } => {
                let name = match operation {
                    IntegerComparisonOperation::Equal => "eq",
                    IntegerComparisonOperation::SignedLessThan => "slt",
                    IntegerComparisonOperation::UnsignedLessThan => "ult",
                    IntegerComparisonOperation::SignedGreaterThan => "sgt",
                    IntegerComparisonOperation::UnsignedGreaterThan => "ugt",
                };
                write!(
                    f,
                    "r{destination} = {name} i{} r{source_a}, r{source_b}",
                    size.bit_size()
                )
            }
            Instruction::IntegerExtension {
                is_signed,
                source_size,
                destination_size,
                source,
                destination,
            } => {
                let name = if *is_signed { "sext" } else { "zext" };
                write!(
                    f,
                    "r{destination} = {name} i{} r{source} to i{}",
                    source_size.bit_size(),
                    destination_size.bit_size()
                )
            }
            Instruction::IntegerTruncation {
                source_size,
                destination_size,
                source,
                destination,
            } => write!(
                f,
                "r{destination} = trunc i{} r{source} to i{}",
                source_size.bit_size(),
                destination_size.bit_size()
            ),
            Instruction::IntegerConstant {
                size,
                value,
                destination,
            } => write!(f, "r{destination} = const i{} {value}", size.bit_size()),
            Instruction::FloatArithmetic {
                operation,
                size,
                source_a,
                source_b,
                destination,
            } => {
                let name = match operation {
                    FloatArithmeticOperation::Add => "fadd",
                    FloatArithmeticOperation::Subtract => "fsub",
                    FloatArithmeticOperation::Multiply => "fmul",
                    FloatArithmeticOperation::Divide => "fdiv",
                    FloatArithmeticOperation::Modulus => "fmod",
                };
                write!(
                    f,
                    "r{destination} = {name} f{} r{source_a}, r{source_b}",
                    size.bit_size()
                )
            }
            Instruction::FloatComparison {
                operation,
                size,
                source_a,
                source_b,
                destination,
            } => {
                let name = match operation {
                    FloatComparisonOperation::Equal => "feq",
                    FloatComparisonOperation::LessThan => "flt",
                    FloatComparisonOperation::GreaterThan => "fgt",
                };
                write!(
                    f,
                    "r{destination} = {name} f{} r{source_a}, r{source_b}",
                    size.bit_size()
                )
            }
            Instruction::FloatConversion {
                source_size,
                destination_size,
                source,
                destination,
            } => write!(
                f,
                "r{destination} = fconv f{} r{source} to f{}",
                source_size.bit_size(),
                destination_size.bit_size()
            ),
            Instruction::FloatTruncation {
                source_size,
                destination_size,
                source,
                destination,
            } => write!(
                f,
                "r{destination} = ftrunc f{} r{source} to i{}",
                source_size.bit_size(),
                destination_size.bit_size()
            ),
            Instruction::FloatFromInteger {
                is_signed,
                source_size,
                destination_size,
                source,
                destination,
            } => {
                let name = if *is_signed { "sitofp" } else { "uitofp" };
                write!(
                    f,
                    "r{destination} = {name} i{} r{source} to f{}",
                    source_size.bit_size(),
                    destination_size.bit_size()
                )
            }
            Instruction::FloatConstant {
                size,
                value,
                destination,
            } => write!(f, "r{destination} = fconst f{} {value}", size.bit_size()),
            Instruction::ReferenceStatic { name, destination } => {
                write!(f, "r{destination} = static '{name}'")
            }
            Instruction::AllocateLocal {
                size,
                alignment,
                destination,
            } => write!(f, "r{destination} = alloca {size} align {alignment}"),
            Instruction::LoadInteger {
                size,
                address,
                destination,
            } => write!(f, "r{destination} = load i{} [r{address}]", size.bit_size()),
            Instruction::StoreInteger {
                size,
                source,
                address,
            } => write!(f, "store i{} r{source}, [r{address}]", size.bit_size()),
            Instruction::LoadFloat {
                size,
                address,
                destination,
            } => write!(f, "r{destination} = load f{} [r{address}]", size.bit_size()),
            Instruction::StoreFloat {
                size,
                source,
                address,
            } => write!(f, "store f{} r{source}, [r{address}]", size.bit_size()),
            Instruction::CopyMemory {
                length,
                source_address,
                destination_address,
                alignment,
            } => write!(
                f,
                "copy {length} [r{source_address}] -> [r{destination_address}] align {alignment}"
            ),
            Instruction::Branch {
                condition,
                destination_instruction,
            } => write!(f, "branch r{condition} -> @{destination_instruction}"),
            Instruction::Jump {
                destination_instruction,
            } => write!(f, "jump -> @{destination_instruction}"),
            Instruction::FunctionCall {
                address,
                parameters,
                return_,
                calling_convention,
            } => {
                if let Some(return_) = return_ {
                    write!(
                        f,
                        "r{} = call {} r{address}(",
                        return_.register,
                        slot(return_.size, return_.is_float)
                    )?;
                } else {
                    write!(f, "call void r{address}(")?;
                }
                for (i, parameter) in parameters.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(
                        f,
                        "{} r{}",
                        slot(parameter.size, parameter.is_float),
                        parameter.register
                    )?;
                }
                write!(f, ")")?;
                if *calling_convention != CallingConvention::Default {
                    write!(f, " {calling_convention}")?;
                }
                Ok(())
            }
            Instruction::Return { value } => match value {
                Some(register) => write!(f, "return r{register}"),
                None => write!(f, "return"),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrParameter {
    pub size: RegisterSize,
    pub is_float: bool,
}

/// An emitted function, ready for a code-generator backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Emitted symbol name (already mangled unless external / no_mangle).
    pub name: String,
    pub path: String,
    pub range: FileRange,
    pub parameters: Vec<IrParameter>,
    pub return_: Option<IrParameter>,
    pub calling_convention: CallingConvention,
    pub is_external: bool,
    pub is_no_mangle: bool,
    pub libraries: Vec<String>,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticVariable {
    pub name: String,
    pub path: String,
    pub range: FileRange,
    pub size: u64,
    pub alignment: u64,
    pub is_external: bool,
    pub is_no_mangle: bool,
    pub libraries: Vec<String>,
    pub initial_data: Option<Vec<u8>>,
}

/// Literal data (strings, array/struct literals) interned so it can be
/// referenced by address.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticConstant {
    pub name: String,
    pub path: String,
    pub range: FileRange,
    pub data: Vec<u8>,
    pub alignment: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeStatic {
    Function(Function),
    Variable(StaticVariable),
    Constant(StaticConstant),
}

impl RuntimeStatic {
    pub fn name(&self) -> &str {
        match self {
            RuntimeStatic::Function(function) => &function.name,
            RuntimeStatic::Variable(variable) => &variable.name,
            RuntimeStatic::Constant(constant) => &constant.name,
        }
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "function '{}' (", self.name)?;
        for (i, parameter) in self.parameters.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", slot(parameter.size, parameter.is_float))?;
        }
        write!(f, ")")?;
        if let Some(return_) = &self.return_ {
            write!(f, " -> {}", slot(return_.size, return_.is_float))?;
        }
        if self.calling_convention != CallingConvention::Default {
            write!(f, " {}", self.calling_convention)?;
        }
        if self.is_external {
            write!(f, " external")?;
            for library in &self.libraries {
                write!(f, " '{library}'")?;
            }
        }
        for (index, instruction) in self.instructions.iter().enumerate() {
            write!(f, "\n  @{index}: {instruction}")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for StaticVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "static variable '{}' size {} align {}",
            self.name, self.size, self.alignment
        )?;
        if self.is_external {
            write!(f, " external")?;
        }
        if let Some(data) = &self.initial_data {
            write!(f, " = {data:02x?}")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for StaticConstant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "static constant '{}' align {} = {:02x?}",
            self.name, self.alignment, self.data
        )
    }
}

impl std::fmt::Display for RuntimeStatic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeStatic::Function(function) => write!(f, "{function}"),
            RuntimeStatic::Variable(variable) => write!(f, "{variable}"),
            RuntimeStatic::Constant(constant) => write!(f, "{constant}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_rendering() {
        let add = Instruction::IntegerArithmetic {
            operation: IntegerArithmeticOperation::Add,
            size: RegisterSize::Size32,
            source_a: 0,
            source_b: 1,
            destination: 2,
        };
        assert_eq!(add.to_string(), "r2 = add i32 r0, r1");

        let branch = Instruction::Branch {
            condition: 4,
            destination_instruction: 9,
        };
        assert_eq!(branch.to_string(), "branch r4 -> @9");

        let call = Instruction::FunctionCall {
            address: 1,
            parameters: vec![FunctionCallParameter {
                size: RegisterSize::Size64,
                is_float: false,
                register: 0,
            }],
            return_: Some(CallReturn {
                size: RegisterSize::Size32,
                is_float: false,
                register: 2,
            }),
            calling_convention: CallingConvention::Default,
        };
        assert_eq!(call.to_string(), "r2 = call i32 r1(i64 r0)");
    }

    #[test]
    fn function_rendering_numbers_instructions() {
        let function = Function {
            name: "main".to_string(),
            path: "main.mica".to_string(),
            range: FileRange::default(),
            parameters: vec![],
            return_: Some(IrParameter {
                size: RegisterSize::Size32,
                is_float: false,
            }),
            calling_convention: CallingConvention::Default,
            is_external: false,
            is_no_mangle: false,
            libraries: vec![],
            instructions: vec![
                Instruction::IntegerConstant {
                    size: RegisterSize::Size32,
                    value: 0,
                    destination: 0,
                },
                Instruction::Return { value: Some(0) },
            ],
        };
        let rendered = function.to_string();
        assert!(rendered.starts_with("function 'main' () -> i32"));
        assert!(rendered.contains("@0: r0 = const i32 0"));
        assert!(rendered.contains("@1: return r0"));
    }
}
