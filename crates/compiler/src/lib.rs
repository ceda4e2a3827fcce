//! Mica compiler front- and mid-end.
//!
//! Given a root source file this crate produces a fully typed program: every
//! function body lowered to the linear IR of [`ir`], every top-level variable
//! laid out with its initial byte image, ready for an object-code backend.
//!
//! The core is a cooperative job scheduler: parsing, declaration resolution,
//! static-if evaluation, polymorphic instantiation and IR generation are all
//! jobs in one append-only list. A job that needs another's result returns a
//! `Waiting` marker and is retried once the other completes; a fixed point
//! with unfinished jobs is a circular dependency. There is no topological
//! pre-pass and no threading — scheduling order is a deterministic function
//! of source layout.

pub mod ast;
pub mod builtins;
pub mod config;
pub mod constant;
pub mod error;
pub mod generator;
pub mod ir;
pub mod jobs;
pub mod lexer;
pub mod parser;
pub mod types;

use std::path::Path;

use bumpalo::Bump;
use tracing::debug;

use crate::config::{Os, Target};
use crate::constant::{
    calculate_string_hash, evaluate_constant_expression, search_for_declaration, AnyConstantValue,
    ConstantScope, DeclarationTable, GlobalInfo,
};
use crate::error::{CompileError, Delayed};
use crate::generator::{do_generate_function, do_generate_static_variable};
use crate::ir::{Function, RuntimeStatic};
use crate::jobs::{JobKind, JobList, JobState};
use crate::types::{AnyType, Integer, RegisterSize};

pub use crate::config::{Architecture, BuildConfig, Toolchain};
pub use crate::error::Diagnostic;

#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    pub target: Target,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            target: Target::host(),
        }
    }
}

/// The fully typed program handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    /// Functions, static variables and static constants, in completion order.
    pub statics: Vec<RuntimeStatic>,
    /// External libraries required by `#extern` declarations, deduplicated.
    pub libraries: Vec<String>,
    /// The emitted symbol name of `main`.
    pub entry_symbol: String,
}

impl CompiledProgram {
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.statics.iter().filter_map(|static_| match static_ {
            RuntimeStatic::Function(function) => Some(function),
            _ => None,
        })
    }

    pub fn entry_function(&self) -> &Function {
        self.functions()
            .find(|function| function.name == self.entry_symbol)
            .expect("entry symbol names an emitted function")
    }

    /// The textual IR listing, one block per runtime static.
    pub fn render_ir(&self) -> String {
        let mut rendered = String::new();
        for static_ in &self.statics {
            if !rendered.is_empty() {
                rendered.push_str("\n\n");
            }
            rendered.push_str(&static_.to_string());
        }
        rendered
    }
}

/// Compile the program rooted at `path`.
pub fn compile_file(path: &Path, options: &CompileOptions) -> Result<CompiledProgram, CompileError> {
    let arena = Bump::new();
    compile_in(&arena, path, options)
}

fn compile_in<'a>(
    arena: &'a Bump,
    path: &Path,
    options: &CompileOptions,
) -> Result<CompiledProgram, CompileError> {
    options.target.validate()?;

    let info = GlobalInfo {
        global_constants: builtins::build_global_constants(arena, options.target),
        architecture_sizes: options.target.architecture_sizes(),
    };

    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let root_path: &'a str = arena.alloc_str(&absolute.to_string_lossy());

    let mut jobs = JobList::new();
    let root_job = jobs.spawn_parse_file(root_path);

    let mut statics: Vec<RuntimeStatic> = Vec::new();
    let mut libraries: Vec<String> = Vec::new();
    if options.target.os == Os::Windows {
        libraries.push("kernel32".to_string());
    }

    // The fixed-point loop: each scan visits jobs in insertion order and
    // performs at most one transition before restarting.
    loop {
        let mut did_work = false;

        for index in 0..jobs.len() {
            match jobs.jobs[index].state {
                JobState::Done => continue,
                JobState::Waiting(target) => {
                    if jobs.jobs[target].state != JobState::Done {
                        continue;
                    }
                    jobs.jobs[index].state = JobState::Working;
                }
                JobState::Working => {}
            }

            dispatch(
                info,
                &mut jobs,
                arena,
                index,
                &mut statics,
                &mut libraries,
            )?;

            did_work = true;
            break;
        }

        if !did_work {
            break;
        }
    }

    // Any job still unfinished is part of a dependency cycle.
    if jobs.jobs.iter().any(|job| job.state != JobState::Done) {
        let mut report = CompileError::message("Circular dependency detected");

        for job in &jobs.jobs {
            if job.state == JobState::Done {
                continue;
            }

            let (scope, range) = match &job.kind {
                JobKind::ParseFile { .. } => continue,
                JobKind::TypeStaticIf {
                    static_if, scope, ..
                } => (*scope, static_if.range),
                JobKind::TypeFunctionDeclaration {
                    declaration, scope, ..
                } => (*scope, declaration.range),
                JobKind::TypePolymorphicFunction {
                    declaration, scope, ..
                } => (*scope, declaration.range),
                JobKind::TypeConstantDefinition {
                    definition, scope, ..
                } => (*scope, definition.range),
                JobKind::TypeStructDefinition {
                    definition, scope, ..
                } => (*scope, definition.range),
                JobKind::TypePolymorphicStruct {
                    definition, scope, ..
                } => (*scope, definition.range),
                JobKind::TypeEnumDefinition {
                    definition, scope, ..
                } => (*scope, definition.range),
                JobKind::TypeFunctionBody { value, .. } => {
                    (value.body_scope, value.declaration.range)
                }
                JobKind::TypeStaticVariable {
                    declaration, scope, ..
                } => (*scope, declaration.range),
            };

            report = report.with_note(scope.file_path(), range, "Here");
        }

        return Err(report);
    }

    let entry_symbol = resolve_entry_point(info, &mut jobs, arena, root_path, root_job)?;

    Ok(CompiledProgram {
        statics,
        libraries,
        entry_symbol,
    })
}

/// Run one job until it completes, suspends, or fails.
fn dispatch<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    index: usize,
    statics: &mut Vec<RuntimeStatic>,
    libraries: &mut Vec<String>,
) -> Result<(), CompileError> {
    let kind = jobs.jobs[index].kind;
    debug!(job = index, kind = kind.name(), "dispatching");

    match kind {
        JobKind::ParseFile { path, scope } => {
            debug_assert!(scope.is_none());

            let source = std::fs::read_to_string(path).map_err(|error| {
                CompileError::message(format!("Cannot read '{path}': {error}"))
            })?;

            let statements = parser::parse_source(arena, path, &source)?;

            let file_scope: &'a ConstantScope<'a> = arena.alloc(ConstantScope {
                statements,
                declarations: DeclarationTable::build(arena, statements),
                scope_constants: &[],
                is_top_level: true,
                parent: None,
                source_file_path: Some(path),
            });

            // The parse job is Done before its declarations are processed so
            // the declarations can look their own file up by path.
            {
                let job = &mut jobs.jobs[index];
                job.state = JobState::Done;
                if let JobKind::ParseFile { scope, .. } = &mut job.kind {
                    *scope = Some(file_scope);
                }
            }

            let mut scratch_child_scopes = Vec::new();
            constant::process_scope(
                jobs,
                arena,
                file_scope,
                statements,
                &mut scratch_child_scopes,
                true,
            )?;

            Ok(())
        }
        JobKind::TypeStaticIf {
            statement,
            static_if,
            scope,
            ..
        } => {
            match constant::do_resolve_static_if(info, jobs, arena, static_if, scope, statement)? {
                Delayed::Done(resolution) => {
                    let job = &mut jobs.jobs[index];
                    job.state = JobState::Done;
                    if let JobKind::TypeStaticIf {
                        condition,
                        declarations,
                        ..
                    } = &mut job.kind
                    {
                        *condition = Some(resolution.condition);
                        *declarations = Some(resolution.declarations);
                    }
                }
                Delayed::Waiting(target) => jobs.jobs[index].state = JobState::Waiting(target),
            }

            Ok(())
        }
        JobKind::TypeFunctionDeclaration {
            declaration, scope, ..
        } => {
            match constant::do_resolve_function_declaration(info, jobs, arena, declaration, scope)?
            {
                Delayed::Done(value) => {
                    {
                        let job = &mut jobs.jobs[index];
                        job.state = JobState::Done;
                        if let JobKind::TypeFunctionDeclaration { resolved, .. } = &mut job.kind {
                            *resolved = Some(value);
                        }
                    }

                    // A resolved function with a body (or an extern) gets its
                    // IR generated exactly once.
                    if let AnyType::FunctionType(function_type) = value.ty {
                        let function_value = value.value.unwrap_function();
                        jobs.find_or_spawn_function_body(arena, function_type, function_value);
                    }
                }
                Delayed::Waiting(target) => jobs.jobs[index].state = JobState::Waiting(target),
            }

            Ok(())
        }
        JobKind::TypePolymorphicFunction {
            declaration,
            parameters,
            scope,
            call_scope,
            call_parameter_ranges,
            ..
        } => {
            match constant::do_resolve_polymorphic_function(
                info,
                jobs,
                arena,
                declaration,
                parameters,
                scope,
                call_scope,
                call_parameter_ranges,
            )? {
                Delayed::Done(value) => {
                    let job = &mut jobs.jobs[index];
                    job.state = JobState::Done;
                    if let JobKind::TypePolymorphicFunction { resolved, .. } = &mut job.kind {
                        *resolved = Some(value);
                    }
                }
                Delayed::Waiting(target) => jobs.jobs[index].state = JobState::Waiting(target),
            }

            Ok(())
        }
        JobKind::TypeConstantDefinition {
            definition, scope, ..
        } => {
            match evaluate_constant_expression(
                info,
                jobs,
                arena,
                scope,
                None,
                definition.expression,
            )? {
                Delayed::Done(value) => {
                    let job = &mut jobs.jobs[index];
                    job.state = JobState::Done;
                    if let JobKind::TypeConstantDefinition { resolved, .. } = &mut job.kind {
                        *resolved = Some(value);
                    }
                }
                Delayed::Waiting(target) => jobs.jobs[index].state = JobState::Waiting(target),
            }

            Ok(())
        }
        JobKind::TypeStructDefinition {
            definition, scope, ..
        } => {
            match constant::do_resolve_struct_definition(info, jobs, arena, definition, scope)? {
                Delayed::Done(ty) => {
                    let job = &mut jobs.jobs[index];
                    job.state = JobState::Done;
                    if let JobKind::TypeStructDefinition { resolved, .. } = &mut job.kind {
                        *resolved = Some(ty);
                    }
                }
                Delayed::Waiting(target) => jobs.jobs[index].state = JobState::Waiting(target),
            }

            Ok(())
        }
        JobKind::TypePolymorphicStruct {
            definition,
            parameters,
            scope,
            ..
        } => {
            match constant::do_resolve_polymorphic_struct(
                info, jobs, arena, definition, parameters, scope,
            )? {
                Delayed::Done(ty) => {
                    let job = &mut jobs.jobs[index];
                    job.state = JobState::Done;
                    if let JobKind::TypePolymorphicStruct { resolved, .. } = &mut job.kind {
                        *resolved = Some(ty);
                    }
                }
                Delayed::Waiting(target) => jobs.jobs[index].state = JobState::Waiting(target),
            }

            Ok(())
        }
        JobKind::TypeEnumDefinition {
            definition, scope, ..
        } => {
            match constant::do_resolve_enum_definition(info, jobs, arena, definition, scope)? {
                Delayed::Done(ty) => {
                    let job = &mut jobs.jobs[index];
                    job.state = JobState::Done;
                    if let JobKind::TypeEnumDefinition { resolved, .. } = &mut job.kind {
                        *resolved = Some(ty);
                    }
                }
                Delayed::Waiting(target) => jobs.jobs[index].state = JobState::Waiting(target),
            }

            Ok(())
        }
        JobKind::TypeFunctionBody { ty, value, symbol } => {
            match do_generate_function(info, jobs, arena, ty, value, symbol)? {
                Delayed::Done((function, static_constants)) => {
                    jobs.jobs[index].state = JobState::Done;

                    if function.is_external {
                        merge_libraries(libraries, &function.libraries);
                    }

                    statics.push(RuntimeStatic::Function(function));
                    for constant in static_constants {
                        statics.push(RuntimeStatic::Constant(constant));
                    }
                }
                Delayed::Waiting(target) => jobs.jobs[index].state = JobState::Waiting(target),
            }

            Ok(())
        }
        JobKind::TypeStaticVariable {
            declaration, scope, ..
        } => {
            match do_generate_static_variable(info, jobs, arena, declaration, scope, index)? {
                Delayed::Done((static_variable, ty)) => {
                    let symbol: &'a str = arena.alloc_str(&static_variable.name);

                    {
                        let job = &mut jobs.jobs[index];
                        job.state = JobState::Done;
                        if let JobKind::TypeStaticVariable { resolved, .. } = &mut job.kind {
                            *resolved = Some((ty, symbol));
                        }
                    }

                    if static_variable.is_external {
                        merge_libraries(libraries, &static_variable.libraries);
                    }

                    statics.push(RuntimeStatic::Variable(static_variable));
                }
                Delayed::Waiting(target) => jobs.jobs[index].state = JobState::Waiting(target),
            }

            Ok(())
        }
    }
}

fn merge_libraries(libraries: &mut Vec<String>, new_libraries: &[String]) {
    for library in new_libraries {
        if !libraries.iter().any(|existing| existing == library) {
            libraries.push(library.clone());
        }
    }
}

/// §4.7: after the fixed point, `main` must exist in the root file's top
/// scope as a zero-parameter function returning i32.
fn resolve_entry_point<'a>(
    info: GlobalInfo<'a>,
    jobs: &mut JobList<'a>,
    arena: &'a Bump,
    root_path: &'a str,
    root_job: usize,
) -> Result<String, CompileError> {
    let root_scope = match &jobs.jobs[root_job].kind {
        JobKind::ParseFile {
            scope: Some(scope), ..
        } => *scope,
        _ => unreachable!("root parse job completed"),
    };

    let search = search_for_declaration(
        info,
        jobs,
        arena,
        "main",
        calculate_string_hash("main"),
        root_scope,
        root_scope.statements,
        root_scope.declarations,
        false,
        None,
    )?;

    let found = match search {
        Delayed::Done(found) => found,
        // With every job Done the search cannot suspend.
        Delayed::Waiting(_) => unreachable!("entry search suspended after fixed point"),
    };

    let Some(main_value) = found else {
        return Err(CompileError::message(format!(
            "{root_path}: Cannot find 'main'"
        )));
    };

    let AnyType::FunctionType(function_type) = main_value.ty else {
        return Err(CompileError::message(format!(
            "'main' must be a function. Got '{}'",
            main_value.ty
        )));
    };

    let function_value = match main_value.value {
        AnyConstantValue::Function(function_value) => function_value,
        _ => unreachable!("function-typed constant is a function"),
    };

    if !function_type.parameters.is_empty() {
        return Err(CompileError::new(
            root_scope.file_path(),
            function_value.declaration.range,
            "'main' must have zero parameters",
        ));
    }

    let expected_return = AnyType::Integer(Integer {
        size: RegisterSize::Size32,
        is_signed: true,
    });

    if *function_type.return_type != expected_return {
        return Err(CompileError::new(
            root_scope.file_path(),
            function_value.declaration.range,
            format!(
                "Incorrect 'main' return type. Expected '{expected_return}', got '{}'",
                function_type.return_type
            ),
        ));
    }

    let Some((_, symbol)) = jobs.find_function_body(function_type, function_value) else {
        unreachable!("main's body generation was scheduled when its declaration resolved")
    };

    Ok(symbol.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        Instruction, IntegerArithmeticOperation, IrParameter, StaticVariable,
    };
    use serial_test::serial;
    use std::fs;

    fn test_target() -> Target {
        Target {
            architecture: Architecture::X64,
            os: config::Os::Linux,
            toolchain: Toolchain::Gnu,
            build_config: BuildConfig::Debug,
        }
    }

    fn compile_project(
        files: &[(&str, &str)],
        target: Target,
    ) -> Result<CompiledProgram, CompileError> {
        let directory = tempfile::tempdir().unwrap();

        for (name, source) in files {
            fs::write(directory.path().join(name), source).unwrap();
        }

        compile_file(
            &directory.path().join(files[0].0),
            &CompileOptions { target },
        )
    }

    fn compile_source(source: &str) -> Result<CompiledProgram, CompileError> {
        compile_project(&[("main.mica", source)], test_target())
    }

    fn static_variables(program: &CompiledProgram) -> Vec<&StaticVariable> {
        program
            .statics
            .iter()
            .filter_map(|static_| match static_ {
                RuntimeStatic::Variable(variable) => Some(variable),
                _ => None,
            })
            .collect()
    }

    // Scenario 1: the trivial program produces exactly one function whose
    // body is a constant followed by a return.
    #[test]
    fn trivial_return() {
        let program = compile_source("main :: () -> i32 { return 0; }").unwrap();

        let functions: Vec<_> = program.functions().collect();
        assert_eq!(functions.len(), 1);

        let main = program.entry_function();
        assert_eq!(
            main.return_,
            Some(IrParameter {
                size: RegisterSize::Size32,
                is_float: false,
            })
        );
        assert_eq!(
            main.instructions,
            vec![
                Instruction::IntegerConstant {
                    size: RegisterSize::Size32,
                    value: 0,
                    destination: 0,
                },
                Instruction::Return { value: Some(0) },
            ]
        );
    }

    // Scenario 2: a static-if gates a declaration's visibility.
    #[test]
    fn static_if_gates_declarations() {
        let program = compile_source(
            "#if true { x :: 42; }\n\
             main :: () -> i32 { return x; }",
        )
        .unwrap();

        let main = program.entry_function();
        assert_eq!(
            main.instructions[0],
            Instruction::IntegerConstant {
                size: RegisterSize::Size32,
                value: 42,
                destination: 0,
            }
        );

        let error = compile_source(
            "#if false { x :: 42; }\n\
             main :: () -> i32 { return x; }",
        )
        .unwrap_err();
        assert!(error.mentions("Cannot find named reference x"), "{error}");
    }

    // Scenario 3: one instantiation per distinct polymorphic parameter
    // tuple; a second call with equal parameters joins the first.
    #[test]
    fn polymorphic_instantiations_are_deduplicated() {
        let program = compile_source(
            "id :: ($T: type, value: T) -> T { return value; }\n\
             main :: () -> i32 {\n\
               x := id(i32, 7);\n\
               y := id(i32, 9);\n\
               return x;\n\
             }",
        )
        .unwrap();

        let instantiations: Vec<_> = program
            .functions()
            .filter(|function| function.name.starts_with("id."))
            .collect();
        assert_eq!(instantiations.len(), 1);

        // Prologue spills the parameter; the body loads it back and returns.
        let id = instantiations[0];
        assert_eq!(
            id.instructions,
            vec![
                Instruction::AllocateLocal {
                    size: 4,
                    alignment: 4,
                    destination: 1,
                },
                Instruction::StoreInteger {
                    size: RegisterSize::Size32,
                    source: 0,
                    address: 1,
                },
                Instruction::LoadInteger {
                    size: RegisterSize::Size32,
                    address: 1,
                    destination: 2,
                },
                Instruction::Return { value: Some(2) },
            ]
        );
    }

    #[test]
    fn distinct_polymorphic_parameters_get_distinct_instantiations() {
        let program = compile_source(
            "id :: ($T: type, value: T) -> T { return value; }\n\
             main :: () -> i32 {\n\
               x := id(i32, 7);\n\
               y := id(i64, 9);\n\
               return x;\n\
             }",
        )
        .unwrap();

        let instantiations: Vec<_> = program
            .functions()
            .filter(|function| function.name.starts_with("id."))
            .collect();
        assert_eq!(instantiations.len(), 2);
    }

    // Scenario 4: a `{pointer, length}` literal coerces to a slice; the
    // generated IR fills a two-word slot.
    #[test]
    fn undetermined_struct_coerces_to_slice() {
        let program = compile_source(
            "take :: (data: []u8) -> i32 { return 0; }\n\
             main :: () -> i32 {\n\
               buffer : u8 = 0;\n\
               return take({ pointer = *buffer, length = 5 });\n\
             }",
        )
        .unwrap();

        let main = program.entry_function();

        assert!(main.instructions.iter().any(|instruction| matches!(
            instruction,
            Instruction::AllocateLocal { size: 16, .. }
        )));

        let stores = main
            .instructions
            .iter()
            .filter(|instruction| matches!(
                instruction,
                Instruction::StoreInteger {
                    size: RegisterSize::Size64,
                    ..
                }
            ))
            .count();
        assert!(stores >= 2, "expected pointer and length stores");

        let error = compile_source(
            "take :: (data: []u8) -> i32 { return 0; }\n\
             main :: () -> i32 {\n\
               buffer : u8 = 0;\n\
               return take({ pointer = *buffer, length = 5.5 });\n\
             }",
        )
        .unwrap_err();
        assert!(error.mentions("Cannot implicitly convert"), "{error}");
    }

    // Scenario 5: size_of on a polymorphic struct instantiation folds to a
    // constant without generating any extra IR.
    #[test]
    fn size_of_polymorphic_struct_instantiation() {
        let program = compile_source(
            "Pair :: struct(T: type) { first: T, second: T }\n\
             size :: size_of(Pair(u32));\n\
             main :: () -> i32 { return size as i32; }",
        )
        .unwrap();

        assert_eq!(program.statics.len(), 1);

        let main = program.entry_function();
        assert_eq!(
            main.instructions,
            vec![
                Instruction::IntegerConstant {
                    size: RegisterSize::Size32,
                    value: 8,
                    destination: 0,
                },
                Instruction::Return { value: Some(0) },
            ]
        );
    }

    // Scenario 6: break outside a breakable scope.
    #[test]
    fn break_outside_loop_is_rejected() {
        let error = compile_source(
            "main :: () -> i32 {\n\
               if true { break; }\n\
               return 0;\n\
             }",
        )
        .unwrap_err();
        assert!(error.mentions("Not in a break-able scope"), "{error}");
    }

    #[test]
    fn while_loop_branches_and_backjumps() {
        let program = compile_source(
            "main :: () -> i32 {\n\
               while false { break; }\n\
               return 0;\n\
             }",
        )
        .unwrap();

        let main = program.entry_function();
        assert_eq!(
            main.instructions,
            vec![
                // condition
                Instruction::IntegerConstant {
                    size: RegisterSize::Size8,
                    value: 0,
                    destination: 0,
                },
                Instruction::Branch {
                    condition: 0,
                    destination_instruction: 3,
                },
                Instruction::Jump {
                    destination_instruction: 5,
                },
                // body: break
                Instruction::Jump {
                    destination_instruction: 5,
                },
                // back edge
                Instruction::Jump {
                    destination_instruction: 0,
                },
                // post-loop
                Instruction::IntegerConstant {
                    size: RegisterSize::Size32,
                    value: 0,
                    destination: 1,
                },
                Instruction::Return { value: Some(1) },
            ]
        );
    }

    #[test]
    fn for_loop_counts_with_an_index_slot() {
        let program = compile_source(
            "main :: () -> i32 {\n\
               total : i32 = 0;\n\
               for i: 0..3 { }\n\
               return total;\n\
             }",
        )
        .unwrap();

        let main = program.entry_function();

        // Index comparison uses signed greater-than against `to` and jumps
        // back to the condition.
        assert!(main.instructions.iter().any(|instruction| matches!(
            instruction,
            Instruction::IntegerComparison {
                operation: crate::ir::IntegerComparisonOperation::SignedGreaterThan,
                ..
            }
        )));
        assert!(main
            .instructions
            .iter()
            .any(|instruction| matches!(instruction, Instruction::Jump { .. })));
    }

    #[test]
    fn static_variables_get_little_endian_images() {
        let program = compile_source(
            "counter : i32 = 5;\n\
             main :: () -> i32 { return counter; }",
        )
        .unwrap();

        let variables = static_variables(&program);
        assert_eq!(variables.len(), 1);
        assert_eq!(variables[0].size, 4);
        assert_eq!(variables[0].initial_data, Some(vec![5, 0, 0, 0]));

        // main loads through the static's address.
        let main = program.entry_function();
        assert!(main.instructions.iter().any(|instruction| matches!(
            instruction,
            Instruction::ReferenceStatic { name, .. } if name == &variables[0].name
        )));
    }

    #[test]
    fn struct_member_access_round_trips() {
        let program = compile_source(
            "Point :: struct { x: i32, y: i32 }\n\
             main :: () -> i32 {\n\
               p : Point;\n\
               p.y = 3;\n\
               return p.y;\n\
             }",
        )
        .unwrap();

        let main = program.entry_function();

        // Struct slot, then a store through the offset member address.
        assert!(main.instructions.iter().any(|instruction| matches!(
            instruction,
            Instruction::AllocateLocal { size: 8, .. }
        )));
        assert!(main.instructions.iter().any(|instruction| matches!(
            instruction,
            Instruction::StoreInteger {
                size: RegisterSize::Size32,
                ..
            }
        )));
    }

    #[test]
    fn unions_overlay_and_coerce_from_single_member_literals() {
        let program = compile_source(
            "Value :: union { integer: i64, half: f64 }\n\
             main :: () -> i32 {\n\
               v : Value = { integer = 9 };\n\
               return 0;\n\
             }",
        )
        .unwrap();

        let main = program.entry_function();
        assert!(main.instructions.iter().any(|instruction| matches!(
            instruction,
            Instruction::AllocateLocal { size: 8, .. }
        )));
    }

    #[test]
    fn enums_compare_on_their_backing_integer() {
        let program = compile_source(
            "Color :: enum u8 { red, green, blue }\n\
             main :: () -> i32 {\n\
               c := Color.green;\n\
               if c == Color.green { return 1; }\n\
               return 0;\n\
             }",
        )
        .unwrap();

        let main = program.entry_function();
        assert!(main.instructions.iter().any(|instruction| matches!(
            instruction,
            Instruction::IntegerComparison {
                operation: crate::ir::IntegerComparisonOperation::Equal,
                size: RegisterSize::Size8,
                ..
            }
        )));
    }

    #[test]
    fn enum_variant_values_auto_increment() {
        let error = compile_source(
            "Tiny :: enum u8 { a = 255, b }\n\
             main :: () -> i32 { return 0; }",
        )
        .unwrap_err();
        assert!(error.mentions("cannot fit in 'u8'"), "{error}");
    }

    #[test]
    fn extern_functions_collect_libraries_and_keep_their_names() {
        let program = compile_project(
            &[(
                "main.mica",
                "ExitProcess :: (code: u32) #extern(\"kernel32\") #call_conv(\"stdcall\");\n\
                 main :: () -> i32 {\n\
                   ExitProcess(0);\n\
                   return 0;\n\
                 }",
            )],
            Target {
                os: config::Os::Windows,
                toolchain: Toolchain::Msvc,
                ..test_target()
            },
        )
        .unwrap();

        assert_eq!(
            program
                .libraries
                .iter()
                .filter(|library| library.as_str() == "kernel32")
                .count(),
            1
        );

        let exit_process = program
            .functions()
            .find(|function| function.name == "ExitProcess")
            .expect("extern keeps its unmangled name");
        assert!(exit_process.is_external);
        assert!(exit_process.instructions.is_empty());

        let main = program.entry_function();
        assert!(main.instructions.iter().any(|instruction| matches!(
            instruction,
            Instruction::FunctionCall {
                calling_convention: crate::types::CallingConvention::StdCall,
                ..
            }
        )));
    }

    #[test]
    #[serial]
    fn imports_and_using_expose_public_declarations() {
        let program = compile_project(
            &[
                (
                    "main.mica",
                    "#import \"util.mica\";\n\
                     main :: () -> i32 { return util.answer; }",
                ),
                ("util.mica", "answer :: 42;"),
            ],
            test_target(),
        )
        .unwrap();

        assert_eq!(
            program.entry_function().instructions[0],
            Instruction::IntegerConstant {
                size: RegisterSize::Size32,
                value: 42,
                destination: 0,
            }
        );

        let program = compile_project(
            &[
                (
                    "main.mica",
                    "#import \"util.mica\";\n\
                     using util;\n\
                     main :: () -> i32 { return answer; }",
                ),
                ("util.mica", "answer :: 41;"),
            ],
            test_target(),
        )
        .unwrap();

        assert_eq!(
            program.entry_function().instructions[0],
            Instruction::IntegerConstant {
                size: RegisterSize::Size32,
                value: 41,
                destination: 0,
            }
        );
    }

    #[test]
    fn string_literals_are_interned_as_static_constants() {
        let program = compile_source(
            "length_of :: (text: []u8) -> i32 { return 0; }\n\
             main :: () -> i32 { return length_of(\"hi\"); }",
        )
        .unwrap();

        let constants: Vec<_> = program
            .statics
            .iter()
            .filter_map(|static_| match static_ {
                RuntimeStatic::Constant(constant) => Some(constant),
                _ => None,
            })
            .collect();
        assert_eq!(constants.len(), 1);
        assert_eq!(constants[0].data, b"hi");
    }

    // Boolean and/or lower to bitwise operations; no short-circuiting is
    // generated.
    #[test]
    fn boolean_operators_are_bitwise() {
        let program = compile_source(
            "main :: () -> i32 {\n\
               a := true;\n\
               b := a && false;\n\
               return 0;\n\
             }",
        )
        .unwrap();

        let main = program.entry_function();
        assert!(main.instructions.iter().any(|instruction| matches!(
            instruction,
            Instruction::IntegerArithmetic {
                operation: IntegerArithmeticOperation::BitwiseAnd,
                size: RegisterSize::Size8,
                ..
            }
        )));
        assert!(!main
            .instructions
            .iter()
            .any(|instruction| matches!(instruction, Instruction::Branch { .. })));
    }

    #[test]
    fn compound_assignment_reads_and_writes_the_target_once() {
        let program = compile_source(
            "main :: () -> i32 {\n\
               x : i32 = 1;\n\
               x += 2;\n\
               return x;\n\
             }",
        )
        .unwrap();

        let main = program.entry_function();

        // Exactly one local slot: the target is not re-evaluated into a
        // second allocation.
        let allocations = main
            .instructions
            .iter()
            .filter(|instruction| matches!(instruction, Instruction::AllocateLocal { .. }))
            .count();
        assert_eq!(allocations, 1);

        assert!(main.instructions.iter().any(|instruction| matches!(
            instruction,
            Instruction::IntegerArithmetic {
                operation: IntegerArithmeticOperation::Add,
                size: RegisterSize::Size32,
                ..
            }
        )));
    }

    #[test]
    fn aggregate_returns_use_a_hidden_pointer_parameter() {
        let program = compile_source(
            "Point :: struct { x: i64, y: i64 }\n\
             origin :: () -> Point {\n\
               p : Point;\n\
               return p;\n\
             }\n\
             main :: () -> i32 {\n\
               p := origin();\n\
               return 0;\n\
             }",
        )
        .unwrap();

        let origin = program
            .functions()
            .find(|function| function.name.starts_with("origin."))
            .unwrap();

        // No in-register return; instead a trailing address parameter.
        assert_eq!(origin.return_, None);
        assert_eq!(origin.parameters.len(), 1);
        assert_eq!(
            origin.parameters[0],
            IrParameter {
                size: RegisterSize::Size64,
                is_float: false,
            }
        );
    }

    #[test]
    fn circular_constant_definitions_are_reported() {
        let error = compile_source(
            "a :: b;\n\
             b :: a;\n\
             main :: () -> i32 { return 0; }",
        )
        .unwrap_err();

        assert!(error.mentions("Circular dependency detected"), "{error}");
        let here_count = error
            .diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.message == "Here")
            .count();
        assert!(here_count >= 2, "{error}");
    }

    #[test]
    fn entry_point_contract_is_enforced() {
        let error = compile_source("x :: 1;").unwrap_err();
        assert!(error.mentions("Cannot find 'main'"), "{error}");

        let error = compile_source("main :: 5;\n").unwrap_err();
        assert!(error.mentions("'main' must be a function"), "{error}");

        let error = compile_source("main :: () { return; }").unwrap_err();
        assert!(error.mentions("Incorrect 'main' return type"), "{error}");

        let error =
            compile_source("main :: (x: i32) -> i32 { return 0; }").unwrap_err();
        assert!(error.mentions("'main' must have zero parameters"), "{error}");
    }

    #[test]
    fn functions_must_end_with_a_return() {
        let error = compile_source("main :: () -> i32 { }").unwrap_err();
        assert!(error.mentions("must end with a return"), "{error}");
    }

    #[test]
    fn diagnostics_are_anchored_to_file_line_column() {
        let error = compile_source("main :: () -> i32 { return missing; }").unwrap_err();

        let diagnostic = &error.diagnostics[0];
        assert!(diagnostic.path.ends_with("main.mica"));
        assert_eq!(diagnostic.range.first_line, 1);
        assert!(diagnostic.message.contains("Cannot find named reference"));
    }

    #[test]
    #[serial]
    fn compilation_is_deterministic() {
        let source = "Pair :: struct(T: type) { first: T, second: T }\n\
                      make :: ($T: type, value: T) -> T { return value; }\n\
                      greeting :: \"hello\";\n\
                      counter : i64 = 3;\n\
                      main :: () -> i32 {\n\
                        x := make(i32, 1);\n\
                        y := make(i64, 2);\n\
                        counter = 4;\n\
                        return x;\n\
                      }";

        let first = compile_source(source).unwrap();
        let second = compile_source(source).unwrap();

        assert_eq!(first.render_ir(), second.render_ir());
        assert_eq!(first.libraries, second.libraries);
        assert_eq!(first.entry_symbol, second.entry_symbol);
    }

    #[test]
    fn float_arithmetic_lowers_to_float_instructions() {
        let program = compile_source(
            "main :: () -> i32 {\n\
               f : f32 = 1.5;\n\
               f = f + 0.5;\n\
               return 0;\n\
             }",
        )
        .unwrap();

        let main = program.entry_function();
        assert!(main.instructions.iter().any(|instruction| matches!(
            instruction,
            Instruction::FloatArithmetic {
                operation: crate::ir::FloatArithmeticOperation::Add,
                size: RegisterSize::Size32,
                ..
            }
        )));
    }

    #[test]
    fn explicit_casts_emit_conversions() {
        let program = compile_source(
            "main :: () -> i32 {\n\
               x : i64 = 300;\n\
               return x as i32;\n\
             }",
        )
        .unwrap();

        let main = program.entry_function();
        assert!(main.instructions.iter().any(|instruction| matches!(
            instruction,
            Instruction::IntegerTruncation {
                source_size: RegisterSize::Size64,
                destination_size: RegisterSize::Size32,
                ..
            }
        )));
    }

    #[test]
    fn function_pointers_can_be_taken_and_called() {
        let program = compile_source(
            "double :: (x: i32) -> i32 { return x * 2; }\n\
             main :: () -> i32 {\n\
               f := *double;\n\
               return f(21);\n\
             }",
        )
        .unwrap();

        // Both main and double are emitted; main calls through the loaded
        // pointer.
        assert_eq!(program.functions().count(), 2);

        let main = program.entry_function();
        assert!(main.instructions.iter().any(|instruction| matches!(
            instruction,
            Instruction::ReferenceStatic { name, .. } if name.starts_with("double.")
        )));
        assert!(main
            .instructions
            .iter()
            .any(|instruction| matches!(instruction, Instruction::FunctionCall { .. })));
    }
}
