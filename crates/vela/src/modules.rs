//! The module-loader seam and the builder embedders use to populate it.
//!
//! No concrete standard-library module (json, math, the filesystem, …) ships
//! in this core — those are the embedder's call. What lives here is the
//! plumbing: a loader signature the `import` opcode can call, and a builder
//! that turns a handful of native functions and constants into a `Value`.

use crate::value::{ModuleObj, NativeFn, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Resolves a dotted module path to a module value, or `None` for "no such
/// module" (the VM turns that into `ImportError`).
pub type ModuleLoader = dyn Fn(&str) -> Option<Value>;

/// Collects named modules and dispatches `import` against them by exact
/// dotted-name match. This is the loader embedders reach for first; anything
/// more dynamic (compiling source on demand, precompiled bytecode caches)
/// is just another `Fn(&str) -> Option<Value>` closure.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Value>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, build: impl FnOnce(&mut ModuleBuilder)) {
        let name = name.into();
        let mut builder = ModuleBuilder::new(name.clone());
        build(&mut builder);
        self.modules.insert(name, builder.finish());
    }

    pub fn loader(self: Rc<Self>) -> Rc<ModuleLoader> {
        Rc::new(move |dotted: &str| self.modules.get(dotted).cloned())
    }

    /// Look up an already-registered module by its exact dotted name.
    pub fn get(&self, dotted: &str) -> Option<Value> {
        self.modules.get(dotted).cloned()
    }
}

/// Builds one module's attribute table: `function`/`constant` calls mirror
/// the shape a type body's `func`/assignment statements produce, so a
/// native module and a scripted one look the same from `GetAttr`'s side.
pub struct ModuleBuilder {
    name: String,
    attrs: HashMap<String, Value>,
}

impl ModuleBuilder {
    fn new(name: String) -> Self {
        Self { name, attrs: HashMap::new() }
    }

    pub fn function(&mut self, name: &str, func: impl Fn(&[Value]) -> crate::error::Result<Value> + 'static) {
        let func: NativeFn = Rc::new(func);
        self.attrs.insert(name.to_string(), Value::Func(Rc::new(crate::value::FuncObj::Native { name: name.to_string(), func })));
    }

    pub fn constant(&mut self, name: &str, value: Value) {
        self.attrs.insert(name.to_string(), value);
    }

    fn finish(self) -> Value {
        Value::Module(Rc::new(ModuleObj { name: self.name, attrs: RefCell::new(self.attrs) }))
    }
}
