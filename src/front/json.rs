//! Loads a reified program from a JSON description.
//!
//! The format mirrors the IR one to one: classes with fields and methods,
//! methods with named locals and a statement list. Types are written by
//! name (`"A"`, `"A[]"`); all classes are registered before the hierarchy
//! and the bodies are resolved, so declaration order does not matter.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::AnalysisError;
use crate::ir::known_names;
use crate::ir::program::{ClassId, MethodBody, MethodId, Program, TypeId, VarId};
use crate::ir::stmt::{CallKind, CallSiteData, ExceptionHandler, MethodRef, Stmt};

#[derive(Deserialize)]
struct ProgramDto {
    classes: Vec<ClassDto>,
}

#[derive(Deserialize)]
struct ClassDto {
    name: String,
    #[serde(rename = "super")]
    superclass: Option<String>,
    #[serde(default)]
    interface: bool,
    #[serde(default = "default_true")]
    application: bool,
    #[serde(default)]
    interfaces: Vec<String>,
    #[serde(default)]
    fields: Vec<FieldDto>,
    #[serde(default)]
    methods: Vec<MethodDto>,
}

#[derive(Deserialize)]
struct FieldDto {
    name: String,
    #[serde(rename = "type")]
    ty: Option<String>,
    #[serde(default, rename = "static")]
    is_static: bool,
}

#[derive(Deserialize)]
struct MethodDto {
    name: String,
    #[serde(default)]
    descriptor: String,
    #[serde(default, rename = "static")]
    is_static: bool,
    #[serde(default, rename = "abstract")]
    is_abstract: bool,
    #[serde(default)]
    entry: bool,
    #[serde(default)]
    vars: Vec<VarDto>,
    #[serde(default)]
    params: Vec<String>,
    #[serde(default, rename = "this")]
    this_var: Option<String>,
    #[serde(default)]
    handlers: Vec<HandlerDto>,
    /// Absent for abstract and native methods.
    stmts: Option<Vec<StmtDto>>,
}

#[derive(Deserialize)]
struct VarDto {
    name: String,
    #[serde(rename = "type")]
    ty: Option<String>,
}

#[derive(Deserialize)]
struct HandlerDto {
    var: String,
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
enum StmtDto {
    New { lhs: String, #[serde(rename = "type")] ty: String },
    ConstString { lhs: String, value: String },
    Copy { lhs: String, rhs: String },
    Cast { lhs: String, rhs: String, #[serde(rename = "type")] ty: String },
    LoadField { lhs: String, base: String, field: String },
    StoreField { base: String, field: String, rhs: String },
    LoadStatic { lhs: String, field: String },
    StoreStatic { field: String, rhs: String },
    LoadArray { lhs: String, base: String },
    StoreArray { base: String, rhs: String },
    Invoke {
        kind: String,
        #[serde(default)]
        recv: Option<String>,
        class: String,
        name: String,
        #[serde(default)]
        descriptor: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        result: Option<String>,
    },
    Throw { var: String },
    Return { var: String },
}

fn default_true() -> bool {
    true
}

/// Loads a program from a JSON file.
pub fn load_program(path: &Path) -> Result<Program, AnalysisError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AnalysisError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse_program(&text)
}

/// Parses a program from JSON text.
pub fn parse_program(text: &str) -> Result<Program, AnalysisError> {
    let dto: ProgramDto = serde_json::from_str(text)
        .map_err(|e| AnalysisError::FrontEnd(format!("malformed program: {e}")))?;
    let mut loader = Loader {
        program: Program::new(),
    };
    loader.load(&dto)?;
    Ok(loader.program)
}

struct Loader {
    program: Program,
}

impl Loader {
    fn load(&mut self, dto: &ProgramDto) -> Result<(), AnalysisError> {
        // First pass: register every class so forward references resolve.
        for class_dto in &dto.classes {
            if self.program.class_by_name(&class_dto.name).is_none() {
                let class = self.program.add_class(&class_dto.name, None, class_dto.interface);
                self.program.set_application(class, class_dto.application);
            }
        }

        // Second pass: hierarchy, fields and method declarations.
        let mut method_ids: Vec<(MethodId, &ClassDto, &MethodDto)> = Vec::new();
        for class_dto in &dto.classes {
            let class = self.class(&class_dto.name)?;
            let superclass = match &class_dto.superclass {
                Some(name) => Some(self.class(name)?),
                None if class_dto.interface || class_dto.name == known_names::OBJECT => None,
                None => self.program.class_by_name(known_names::OBJECT),
            };
            self.program.set_superclass(class, superclass);
            for iface in &class_dto.interfaces {
                let iface = self.class(iface)?;
                self.program.add_interface_impl(class, iface);
            }
            for field in &class_dto.fields {
                let ty = field.ty.as_deref().map(|t| self.parse_type(t)).transpose()?;
                self.program.add_field(class, &field.name, ty, field.is_static);
            }
            for method_dto in &class_dto.methods {
                let method = self.program.add_method(
                    class,
                    &method_dto.name,
                    &method_dto.descriptor,
                    method_dto.is_static,
                );
                if method_dto.is_abstract {
                    self.program.set_abstract(method);
                }
                if method_dto.entry {
                    self.program.add_entry_point(method);
                }
                method_ids.push((method, class_dto, method_dto));
            }
        }

        // Third pass: bodies.
        for (method, _class_dto, method_dto) in method_ids {
            if let Some(stmts) = &method_dto.stmts {
                let body = self.build_body(method, method_dto, stmts)?;
                self.program.set_body(method, body);
            }
        }
        Ok(())
    }

    fn build_body(
        &mut self,
        method: MethodId,
        dto: &MethodDto,
        stmt_dtos: &[StmtDto],
    ) -> Result<MethodBody, AnalysisError> {
        let mut vars: HashMap<String, VarId> = HashMap::new();
        for var in &dto.vars {
            let ty = var.ty.as_deref().map(|t| self.parse_type(t)).transpose()?;
            let id = self.program.new_var(method, &var.name, ty);
            vars.insert(var.name.clone(), id);
        }
        let mut var = |program: &mut Program, name: &str| -> VarId {
            *vars
                .entry(name.to_string())
                .or_insert_with(|| program.new_var(method, name, None))
        };

        let this_var = dto.this_var.as_deref().map(|name| var(&mut self.program, name));
        let params = dto
            .params
            .iter()
            .map(|name| var(&mut self.program, name))
            .collect();

        let mut stmts = Vec::with_capacity(stmt_dtos.len());
        let mut ret_vars = Vec::new();
        for stmt in stmt_dtos {
            let stmt = match stmt {
                StmtDto::New { lhs, ty } => {
                    let ty = self.parse_type(ty)?;
                    let site = self.program.add_alloc_site(method, ty);
                    Stmt::New {
                        lhs: var(&mut self.program, lhs),
                        site,
                    }
                }
                StmtDto::ConstString { lhs, value } => {
                    let site = self.program.add_string_literal_site(method, value);
                    Stmt::New {
                        lhs: var(&mut self.program, lhs),
                        site,
                    }
                }
                StmtDto::Copy { lhs, rhs } => Stmt::Copy {
                    lhs: var(&mut self.program, lhs),
                    rhs: var(&mut self.program, rhs),
                },
                StmtDto::Cast { lhs, rhs, ty } => Stmt::Cast {
                    lhs: var(&mut self.program, lhs),
                    rhs: var(&mut self.program, rhs),
                    ty: self.parse_type(ty)?,
                },
                StmtDto::LoadField { lhs, base, field } => Stmt::LoadField {
                    lhs: var(&mut self.program, lhs),
                    base: var(&mut self.program, base),
                    field: self.field(field)?,
                },
                StmtDto::StoreField { base, field, rhs } => Stmt::StoreField {
                    base: var(&mut self.program, base),
                    field: self.field(field)?,
                    rhs: var(&mut self.program, rhs),
                },
                StmtDto::LoadStatic { lhs, field } => Stmt::LoadStatic {
                    lhs: var(&mut self.program, lhs),
                    field: self.field(field)?,
                },
                StmtDto::StoreStatic { field, rhs } => Stmt::StoreStatic {
                    field: self.field(field)?,
                    rhs: var(&mut self.program, rhs),
                },
                StmtDto::LoadArray { lhs, base } => Stmt::LoadArray {
                    lhs: var(&mut self.program, lhs),
                    base: var(&mut self.program, base),
                },
                StmtDto::StoreArray { base, rhs } => Stmt::StoreArray {
                    base: var(&mut self.program, base),
                    rhs: var(&mut self.program, rhs),
                },
                StmtDto::Invoke {
                    kind,
                    recv,
                    class,
                    name,
                    descriptor,
                    args,
                    result,
                } => {
                    let kind = parse_call_kind(kind)?;
                    let target = MethodRef {
                        class: self.class(class)?,
                        name: name.as_str().into(),
                        descriptor: descriptor.as_str().into(),
                    };
                    let recv = recv.as_deref().map(|name| var(&mut self.program, name));
                    let args = args.iter().map(|name| var(&mut self.program, name)).collect();
                    let result = result.as_deref().map(|name| var(&mut self.program, name));
                    let site = self.program.add_call_site(CallSiteData {
                        method,
                        kind,
                        recv,
                        target,
                        args,
                        result,
                    });
                    Stmt::Call(site)
                }
                StmtDto::Throw { var: v } => Stmt::Throw {
                    var: var(&mut self.program, v),
                },
                StmtDto::Return { var: v } => {
                    let v = var(&mut self.program, v);
                    ret_vars.push(v);
                    Stmt::Return { var: v }
                }
            };
            stmts.push(stmt);
        }

        let handlers = dto
            .handlers
            .iter()
            .map(|h| {
                Ok(ExceptionHandler {
                    catch_var: var(&mut self.program, &h.var),
                    ty: self.parse_type(&h.ty)?,
                })
            })
            .collect::<Result<Vec<_>, AnalysisError>>()?;

        Ok(MethodBody {
            this_var,
            params,
            ret_vars,
            stmts,
            handlers,
        })
    }

    fn class(&self, name: &str) -> Result<ClassId, AnalysisError> {
        self.program
            .class_by_name(name)
            .ok_or_else(|| AnalysisError::FrontEnd(format!("unknown class `{name}`")))
    }

    /// Parses `"A"` or `"A[]"` (arrays of arbitrary depth).
    fn parse_type(&mut self, name: &str) -> Result<TypeId, AnalysisError> {
        if let Some(elem) = name.strip_suffix("[]") {
            let elem = self.parse_type(elem)?;
            return Ok(self.program.array_type(elem));
        }
        let class = self.class(name)?;
        Ok(self.program.reference_type(class))
    }

    /// Resolves a `Class.field` reference.
    fn field(&self, spec: &str) -> Result<crate::ir::program::FieldId, AnalysisError> {
        let (class_name, field_name) = spec
            .rsplit_once('.')
            .ok_or_else(|| AnalysisError::FrontEnd(format!("malformed field reference `{spec}`")))?;
        let class = self.class(class_name)?;
        self.program
            .class(class)
            .fields
            .iter()
            .copied()
            .find(|&f| &*self.program.field(f).name == field_name)
            .ok_or_else(|| AnalysisError::FrontEnd(format!("unknown field `{spec}`")))
    }
}

fn parse_call_kind(kind: &str) -> Result<CallKind, AnalysisError> {
    match kind {
        "static" => Ok(CallKind::Static),
        "virtual" => Ok(CallKind::Virtual),
        "interface" => Ok(CallKind::Interface),
        "special" => Ok(CallKind::Special),
        "dynamic" => Ok(CallKind::Dynamic),
        _ => Err(AnalysisError::FrontEnd(format!("unknown call kind `{kind}`"))),
    }
}
