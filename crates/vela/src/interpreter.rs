//! The embedding API: compile and run source against a fresh global scope,
//! with builtins installed, exceptions wired up, and an optional module
//! loader and resource limits.

use crate::bytecode::CodeObject;
use crate::error::{Error, Result};
use crate::exceptions::ExceptionTypes;
use crate::modules::{ModuleBuilder as RegistryBuilder, ModuleLoader, ModuleRegistry};
use crate::value::Value;
use crate::vm::{Frame, Limits, Vm};
use std::cell::RefCell;
use std::rc::Rc;

/// Result of running source with print output capture.
#[derive(Debug, Clone)]
pub struct Output {
    pub value: Value,
    pub output: Vec<String>,
}

/// A single instance of the language, holding its own global scope, VM, and
/// registered modules. Each `Interpreter` is independent; nothing is shared
/// process-wide across instances (the spec's "process-wide" global state
/// is realized here as state scoped to one `Interpreter`, per §9's note on
/// bundling global state into an explicit context in a host without true
/// global mutable state).
pub struct Interpreter {
    vm: Vm,
    globals: Rc<Frame>,
    print_buffer: Rc<RefCell<Vec<String>>>,
    modules: Rc<RefCell<ModuleRegistry>>,
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Frame::new(None);
        let exceptions = Rc::new(ExceptionTypes::new());
        let print_buffer = Rc::new(RefCell::new(Vec::new()));
        crate::builtins::install(&globals, print_buffer.clone());
        for (name, ty) in exceptions.entries() {
            globals.define(name.to_string(), Value::Type(ty));
        }
        let modules = Rc::new(RefCell::new(ModuleRegistry::new()));
        let loader: Rc<ModuleLoader> = {
            let modules = modules.clone();
            Rc::new(move |dotted: &str| modules.borrow().get(dotted))
        };
        let vm = Vm::new(globals.clone(), exceptions, Some(loader), Limits::default());
        Interpreter { vm, globals, print_buffer, modules }
    }

    /// Register a module importable from source as `import name`.
    pub fn module(&mut self, name: &str, build: impl FnOnce(&mut RegistryBuilder)) {
        self.modules.borrow_mut().register(name, build);
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.globals.define(name.into(), value);
    }

    pub fn limit(&mut self, limits: Limits) {
        self.vm.set_limits(limits);
    }

    pub fn run(&mut self, source: &str) -> Result<Value> {
        let code = compile(source)?;
        self.vm.execute(code)
    }

    pub fn capture(&mut self, source: &str) -> Result<Output> {
        self.print_buffer.borrow_mut().clear();
        let value = self.run(source)?;
        let output = self.print_buffer.borrow_mut().drain(..).collect();
        Ok(Output { value, output })
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(source: &str) -> Result<Rc<CodeObject>> {
    let block = crate::parser::parse_program(source).map_err(|d| Error::Syntax(Box::new(d)))?;
    let code = crate::compiler::compile(&block, source).map_err(|d| Error::Syntax(Box::new(d)))?;
    Ok(Rc::new(code))
}
