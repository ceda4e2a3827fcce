//! Units of semantic work.
//!
//! Every pending resolution is a job in an append-only list; jobs refer to
//! each other by index, which stays valid as the list grows. Each job carries
//! its inputs plus `Option` output slots filled in when it completes. The
//! spawn helpers centralize the deduplication rules: one parse per file, one
//! body generation per (type, declaration, body scope), one polymorphic
//! instantiation per distinct parameter tuple.

use bumpalo::Bump;
use tracing::debug;

use crate::ast::{
    ConstantDefinition, EnumDefinition, FileRange, FunctionDeclaration, Statement, StaticIf,
    StructDefinition, VariableDeclaration,
};
use crate::constant::{
    constant_values_equal, AnyConstantValue, ConstantScope, DeclarationTable, FunctionConstant,
    TypedConstantValue,
};
use crate::types::{AnyType, FunctionTypeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Working,
    /// Suspended until the job with this index is Done.
    Waiting(usize),
    Done,
}

#[derive(Debug, Clone, Copy)]
pub enum JobKind<'a> {
    ParseFile {
        path: &'a str,
        scope: Option<&'a ConstantScope<'a>>,
    },
    TypeStaticIf {
        statement: &'a Statement<'a>,
        static_if: &'a StaticIf<'a>,
        scope: &'a ConstantScope<'a>,
        condition: Option<bool>,
        declarations: Option<DeclarationTable<'a>>,
    },
    TypeFunctionDeclaration {
        declaration: &'a FunctionDeclaration<'a>,
        scope: &'a ConstantScope<'a>,
        resolved: Option<TypedConstantValue<'a>>,
    },
    TypePolymorphicFunction {
        declaration: &'a FunctionDeclaration<'a>,
        parameters: &'a [TypedConstantValue<'a>],
        scope: &'a ConstantScope<'a>,
        call_scope: &'a ConstantScope<'a>,
        call_parameter_ranges: &'a [FileRange],
        resolved: Option<(FunctionTypeType<'a>, FunctionConstant<'a>)>,
    },
    TypeConstantDefinition {
        definition: &'a ConstantDefinition<'a>,
        scope: &'a ConstantScope<'a>,
        resolved: Option<TypedConstantValue<'a>>,
    },
    TypeStructDefinition {
        definition: &'a StructDefinition<'a>,
        scope: &'a ConstantScope<'a>,
        resolved: Option<AnyType<'a>>,
    },
    TypePolymorphicStruct {
        definition: &'a StructDefinition<'a>,
        parameters: &'a [AnyConstantValue<'a>],
        scope: &'a ConstantScope<'a>,
        resolved: Option<AnyType<'a>>,
    },
    TypeEnumDefinition {
        definition: &'a EnumDefinition<'a>,
        scope: &'a ConstantScope<'a>,
        resolved: Option<AnyType<'a>>,
    },
    TypeFunctionBody {
        ty: FunctionTypeType<'a>,
        value: FunctionConstant<'a>,
        /// Emitted symbol name, fixed at spawn time so call sites can
        /// reference the function before its body is generated. The finished
        /// function record goes straight into the collected runtime statics.
        symbol: &'a str,
    },
    TypeStaticVariable {
        declaration: &'a VariableDeclaration<'a>,
        scope: &'a ConstantScope<'a>,
        /// Resolved type and emitted symbol name, set on completion; the
        /// variable record itself goes into the collected runtime statics.
        resolved: Option<(AnyType<'a>, &'a str)>,
    },
}

impl<'a> JobKind<'a> {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::ParseFile { .. } => "ParseFile",
            JobKind::TypeStaticIf { .. } => "TypeStaticIf",
            JobKind::TypeFunctionDeclaration { .. } => "TypeFunctionDeclaration",
            JobKind::TypePolymorphicFunction { .. } => "TypePolymorphicFunction",
            JobKind::TypeConstantDefinition { .. } => "TypeConstantDefinition",
            JobKind::TypeStructDefinition { .. } => "TypeStructDefinition",
            JobKind::TypePolymorphicStruct { .. } => "TypePolymorphicStruct",
            JobKind::TypeEnumDefinition { .. } => "TypeEnumDefinition",
            JobKind::TypeFunctionBody { .. } => "TypeFunctionBody",
            JobKind::TypeStaticVariable { .. } => "TypeStaticVariable",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Job<'a> {
    pub state: JobState,
    pub kind: JobKind<'a>,
}

/// The outcome of looking for an existing polymorphic function instantiation.
pub enum PolymorphicFunctionMatch<'a> {
    Resolved(FunctionTypeType<'a>, FunctionConstant<'a>),
    InProgress(usize),
    NotFound,
}

pub enum PolymorphicStructMatch<'a> {
    Resolved(AnyType<'a>),
    InProgress(usize),
    NotFound,
}

#[derive(Default)]
pub struct JobList<'a> {
    pub jobs: Vec<Job<'a>>,
}

impl<'a> JobList<'a> {
    pub fn new() -> Self {
        JobList { jobs: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn push(&mut self, kind: JobKind<'a>) -> usize {
        let index = self.jobs.len();
        debug!(job = index, kind = kind.name(), "spawning job");
        self.jobs.push(Job {
            state: JobState::Working,
            kind,
        });
        index
    }

    /// Spawn a parse job unless the file is already being parsed.
    pub fn spawn_parse_file(&mut self, path: &'a str) -> usize {
        for (index, job) in self.jobs.iter().enumerate() {
            if let JobKind::ParseFile {
                path: existing_path,
                ..
            } = &job.kind
            {
                if *existing_path == path {
                    return index;
                }
            }
        }

        self.push(JobKind::ParseFile { path, scope: None })
    }

    pub fn find_parse_file(&self, path: &str) -> Option<usize> {
        self.jobs.iter().position(|job| {
            matches!(&job.kind, JobKind::ParseFile { path: existing, .. } if *existing == path)
        })
    }

    pub fn spawn_static_if(
        &mut self,
        static_if: &'a StaticIf<'a>,
        scope: &'a ConstantScope<'a>,
        statement: &'a Statement<'a>,
    ) -> usize {
        self.push(JobKind::TypeStaticIf {
            statement,
            static_if,
            scope,
            condition: None,
            declarations: None,
        })
    }

    pub fn spawn_function_declaration(
        &mut self,
        declaration: &'a FunctionDeclaration<'a>,
        scope: &'a ConstantScope<'a>,
    ) -> usize {
        self.push(JobKind::TypeFunctionDeclaration {
            declaration,
            scope,
            resolved: None,
        })
    }

    pub fn spawn_constant_definition(
        &mut self,
        definition: &'a ConstantDefinition<'a>,
        scope: &'a ConstantScope<'a>,
    ) -> usize {
        self.push(JobKind::TypeConstantDefinition {
            definition,
            scope,
            resolved: None,
        })
    }

    pub fn spawn_struct_definition(
        &mut self,
        definition: &'a StructDefinition<'a>,
        scope: &'a ConstantScope<'a>,
    ) -> usize {
        self.push(JobKind::TypeStructDefinition {
            definition,
            scope,
            resolved: None,
        })
    }

    pub fn spawn_enum_definition(
        &mut self,
        definition: &'a EnumDefinition<'a>,
        scope: &'a ConstantScope<'a>,
    ) -> usize {
        self.push(JobKind::TypeEnumDefinition {
            definition,
            scope,
            resolved: None,
        })
    }

    pub fn spawn_static_variable(
        &mut self,
        declaration: &'a VariableDeclaration<'a>,
        scope: &'a ConstantScope<'a>,
    ) -> usize {
        self.push(JobKind::TypeStaticVariable {
            declaration,
            scope,
            resolved: None,
        })
    }

    /// Match an instantiation request against existing jobs: same declaration
    /// and defining scope, then per-parameter equality — type equality for
    /// polymorphic determiners and constant parameters, structural value
    /// equality for constant parameters.
    pub fn find_polymorphic_function(
        &self,
        declaration: &'a FunctionDeclaration<'a>,
        scope: &'a ConstantScope<'a>,
        parameters: &[TypedConstantValue<'a>],
    ) -> PolymorphicFunctionMatch<'a> {
        for (index, job) in self.jobs.iter().enumerate() {
            let JobKind::TypePolymorphicFunction {
                declaration: job_declaration,
                parameters: job_parameters,
                scope: job_scope,
                resolved,
                ..
            } = &job.kind
            else {
                continue;
            };

            if !std::ptr::eq(*job_declaration, declaration) || !std::ptr::eq(*job_scope, scope) {
                continue;
            }

            let mut matching = true;
            for (i, declaration_parameter) in declaration.parameters.iter().enumerate() {
                let relevant =
                    declaration_parameter.is_polymorphic_determiner() || declaration_parameter.is_constant;

                if relevant && job_parameters[i].ty != parameters[i].ty {
                    matching = false;
                    break;
                }

                if declaration_parameter.is_constant
                    && !constant_values_equal(parameters[i].value, job_parameters[i].value)
                {
                    matching = false;
                    break;
                }
            }

            if !matching {
                continue;
            }

            return match (job.state, resolved) {
                (JobState::Done, Some((ty, value))) => {
                    PolymorphicFunctionMatch::Resolved(*ty, *value)
                }
                _ => PolymorphicFunctionMatch::InProgress(index),
            };
        }

        PolymorphicFunctionMatch::NotFound
    }

    pub fn spawn_polymorphic_function(
        &mut self,
        declaration: &'a FunctionDeclaration<'a>,
        parameters: &'a [TypedConstantValue<'a>],
        scope: &'a ConstantScope<'a>,
        call_scope: &'a ConstantScope<'a>,
        call_parameter_ranges: &'a [FileRange],
    ) -> usize {
        self.push(JobKind::TypePolymorphicFunction {
            declaration,
            parameters,
            scope,
            call_scope,
            call_parameter_ranges,
            resolved: None,
        })
    }

    pub fn find_polymorphic_struct(
        &self,
        definition: &'a StructDefinition<'a>,
        parameters: &[AnyConstantValue<'a>],
    ) -> PolymorphicStructMatch<'a> {
        for (index, job) in self.jobs.iter().enumerate() {
            let JobKind::TypePolymorphicStruct {
                definition: job_definition,
                parameters: job_parameters,
                resolved,
                ..
            } = &job.kind
            else {
                continue;
            };

            if !std::ptr::eq(*job_definition, definition) {
                continue;
            }

            let matching = parameters
                .iter()
                .zip(job_parameters.iter())
                .all(|(&a, &b)| constant_values_equal(a, b));
            if !matching {
                continue;
            }

            return match (job.state, resolved) {
                (JobState::Done, Some(resolved)) => PolymorphicStructMatch::Resolved(*resolved),
                _ => PolymorphicStructMatch::InProgress(index),
            };
        }

        PolymorphicStructMatch::NotFound
    }

    pub fn spawn_polymorphic_struct(
        &mut self,
        definition: &'a StructDefinition<'a>,
        parameters: &'a [AnyConstantValue<'a>],
        scope: &'a ConstantScope<'a>,
    ) -> usize {
        self.push(JobKind::TypePolymorphicStruct {
            definition,
            parameters,
            scope,
            resolved: None,
        })
    }

    pub fn find_function_body(
        &self,
        ty: FunctionTypeType<'a>,
        value: FunctionConstant<'a>,
    ) -> Option<(usize, &'a str)> {
        for (index, job) in self.jobs.iter().enumerate() {
            if let JobKind::TypeFunctionBody {
                ty: job_ty,
                value: job_value,
                symbol,
                ..
            } = &job.kind
            {
                if AnyType::FunctionType(*job_ty) == AnyType::FunctionType(ty)
                    && std::ptr::eq(job_value.declaration, value.declaration)
                    && std::ptr::eq(job_value.body_scope, value.body_scope)
                {
                    return Some((index, *symbol));
                }
            }
        }

        None
    }

    /// Queue IR generation for a resolved function, or join the job that is
    /// already doing it. Returns the job index and emitted symbol name.
    pub fn find_or_spawn_function_body(
        &mut self,
        arena: &'a Bump,
        ty: FunctionTypeType<'a>,
        value: FunctionConstant<'a>,
    ) -> (usize, &'a str) {
        if let Some(found) = self.find_function_body(ty, value) {
            return found;
        }

        let index = self.jobs.len();
        let symbol: &'a str = if value.is_external || value.is_no_mangle {
            value.declaration.name.text
        } else {
            arena.alloc_str(&format!("{}.{}", value.declaration.name.text, index))
        };

        self.push(JobKind::TypeFunctionBody { ty, value, symbol });

        (index, symbol)
    }
}
