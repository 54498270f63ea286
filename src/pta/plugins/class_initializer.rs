//! Class-initialization modeling: the first use of a class (allocation,
//! static field access or static call) makes its `<clinit>` reachable,
//! superclasses first, each class at most once.

use std::collections::HashSet;

use super::super::solver::SolverView;
use super::Plugin;
use crate::error::PluginResult;
use crate::ir::context::EMPTY_CONTEXT;
use crate::ir::program::{CSMethod, ClassId, Type};
use crate::ir::stmt::{CallKind, Stmt};

#[derive(Default)]
pub struct ClassInitializer {
    initialized: HashSet<ClassId>,
}

impl ClassInitializer {
    pub fn new() -> Self {
        Self::default()
    }

    fn initialize(&mut self, view: &mut SolverView<'_>, class: ClassId) {
        if !self.initialized.insert(class) {
            return;
        }
        if let Some(superclass) = view.program.class(class).superclass {
            self.initialize(view, superclass);
        }
        if let Some(clinit) = view.program.class(class).clinit {
            // Class initializers run once, outside any calling context.
            view.mark_reachable(CSMethod::new(EMPTY_CONTEXT, clinit));
        }
    }
}

impl Plugin for ClassInitializer {
    fn name(&self) -> &'static str {
        "class-initializer"
    }

    fn on_new_cs_method(&mut self, view: &mut SolverView<'_>, csm: CSMethod) -> PluginResult {
        let program = view.program;
        let Some(body) = &program.method(csm.method).body else {
            return Ok(());
        };
        let mut triggers = Vec::new();
        for stmt in &body.stmts {
            match stmt {
                Stmt::New { site, .. } => {
                    if let Type::Reference(class) = program.type_of(program.alloc_site(*site).ty) {
                        triggers.push(class);
                    }
                }
                Stmt::LoadStatic { field, .. } | Stmt::StoreStatic { field, .. } => {
                    triggers.push(program.field(*field).class);
                }
                Stmt::Call(site) => {
                    let data = program.call_site(*site);
                    if data.kind == CallKind::Static {
                        triggers.push(data.target.class);
                    }
                }
                _ => {}
            }
        }
        for class in triggers {
            self.initialize(view, class);
        }
        Ok(())
    }
}
