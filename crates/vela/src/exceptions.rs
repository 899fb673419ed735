//! The builtin exception-type hierarchy.
//!
//! Exception types are ordinary [`TypeObj`] singletons linked through
//! `base`, not a Rust enum — `catch TypeError` and a user `type Foo(TypeError)
//! { }` go through exactly the same `is_subtype_of` walk. This module builds
//! the fixed tree once and the interpreter binds each node into the global
//! namespace under its name.

use crate::value::{ExceptionObj, TypeObj, Value};
use std::rc::Rc;

/// Every builtin exception type, linked into the hierarchy:
///
/// ```text
/// exception
/// ├── out_of_iter_exception
/// ├── error
/// │   ├── internal_error
/// │   ├── syntax_error
/// │   ├── import_error
/// │   ├── type_error
/// │   │   └── template_error
/// │   ├── name_error
/// │   ├── attr_error
/// │   ├── key_error
/// │   │   └── index_error
/// │   ├── val_error
/// │   │   ├── assert_error
/// │   │   └── math_error
/// │   │       └── overflow_error
/// │   ├── arg_error
/// │   ├── size_error
/// │   ├── io_error
/// │   └── os_error
/// └── warning
///     ├── platform_warning
///     └── syntax_warning
/// ```
pub struct ExceptionTypes {
    pub exception: Rc<TypeObj>,
    pub out_of_iter_exception: Rc<TypeObj>,
    pub error: Rc<TypeObj>,
    pub internal_error: Rc<TypeObj>,
    pub syntax_error: Rc<TypeObj>,
    pub import_error: Rc<TypeObj>,
    pub type_error: Rc<TypeObj>,
    pub template_error: Rc<TypeObj>,
    pub name_error: Rc<TypeObj>,
    pub attr_error: Rc<TypeObj>,
    pub key_error: Rc<TypeObj>,
    pub index_error: Rc<TypeObj>,
    pub val_error: Rc<TypeObj>,
    pub assert_error: Rc<TypeObj>,
    pub math_error: Rc<TypeObj>,
    pub overflow_error: Rc<TypeObj>,
    pub arg_error: Rc<TypeObj>,
    pub size_error: Rc<TypeObj>,
    pub io_error: Rc<TypeObj>,
    pub os_error: Rc<TypeObj>,
    pub warning: Rc<TypeObj>,
    pub platform_warning: Rc<TypeObj>,
    pub syntax_warning: Rc<TypeObj>,
}

fn sub(name: &str, base: &Rc<TypeObj>) -> Rc<TypeObj> {
    TypeObj::new(name, Some(base.clone()))
}

impl ExceptionTypes {
    pub fn new() -> Self {
        let exception = TypeObj::new("Exception", None);
        let out_of_iter_exception = sub("OutOfIterException", &exception);
        let error = sub("Error", &exception);
        let internal_error = sub("InternalError", &error);
        let syntax_error = sub("SyntaxError", &error);
        let import_error = sub("ImportError", &error);
        let type_error = sub("TypeError", &error);
        let template_error = sub("TemplateError", &type_error);
        let name_error = sub("NameError", &error);
        let attr_error = sub("AttrError", &error);
        let key_error = sub("KeyError", &error);
        let index_error = sub("IndexError", &key_error);
        let val_error = sub("ValError", &error);
        let assert_error = sub("AssertError", &val_error);
        let math_error = sub("MathError", &val_error);
        let overflow_error = sub("OverflowError", &math_error);
        let arg_error = sub("ArgError", &error);
        let size_error = sub("SizeError", &error);
        let io_error = sub("IOError", &error);
        let os_error = sub("OSError", &error);
        let warning = sub("Warning", &exception);
        let platform_warning = sub("PlatformWarning", &warning);
        let syntax_warning = sub("SyntaxWarning", &warning);

        ExceptionTypes {
            exception,
            out_of_iter_exception,
            error,
            internal_error,
            syntax_error,
            import_error,
            type_error,
            template_error,
            name_error,
            attr_error,
            key_error,
            index_error,
            val_error,
            assert_error,
            math_error,
            overflow_error,
            arg_error,
            size_error,
            io_error,
            os_error,
            warning,
            platform_warning,
            syntax_warning,
        }
    }

    /// All (name, type) pairs, for binding into the global namespace.
    pub fn entries(&self) -> Vec<(&'static str, Rc<TypeObj>)> {
        vec![
            ("Exception", self.exception.clone()),
            ("OutOfIterException", self.out_of_iter_exception.clone()),
            ("Error", self.error.clone()),
            ("InternalError", self.internal_error.clone()),
            ("SyntaxError", self.syntax_error.clone()),
            ("ImportError", self.import_error.clone()),
            ("TypeError", self.type_error.clone()),
            ("TemplateError", self.template_error.clone()),
            ("NameError", self.name_error.clone()),
            ("AttrError", self.attr_error.clone()),
            ("KeyError", self.key_error.clone()),
            ("IndexError", self.index_error.clone()),
            ("ValError", self.val_error.clone()),
            ("AssertError", self.assert_error.clone()),
            ("MathError", self.math_error.clone()),
            ("OverflowError", self.overflow_error.clone()),
            ("ArgError", self.arg_error.clone()),
            ("SizeError", self.size_error.clone()),
            ("IOError", self.io_error.clone()),
            ("OSError", self.os_error.clone()),
            ("Warning", self.warning.clone()),
            ("PlatformWarning", self.platform_warning.clone()),
            ("SyntaxWarning", self.syntax_warning.clone()),
        ]
    }

    pub fn make(&self, ty: &Rc<TypeObj>, message: impl Into<String>) -> Value {
        Value::Exception(Rc::new(ExceptionObj { ty: ty.clone(), message: message.into(), cause: None, args: Vec::new() }))
    }

    pub fn name_error(&self, name: &str) -> Value {
        self.make(&self.name_error, format!("name '{name}' is not defined"))
    }

    pub fn attr_error(&self, type_name: &str, attr: &str) -> Value {
        self.make(&self.attr_error, format!("'{type_name}' object has no attribute '{attr}'"))
    }

    pub fn type_error(&self, message: impl Into<String>) -> Value {
        self.make(&self.type_error, message)
    }

    pub fn key_error(&self, message: impl Into<String>) -> Value {
        self.make(&self.key_error, message)
    }

    pub fn index_error(&self, message: impl Into<String>) -> Value {
        self.make(&self.index_error, message)
    }

    pub fn val_error(&self, message: impl Into<String>) -> Value {
        self.make(&self.val_error, message)
    }

    pub fn assert_error(&self, message: impl Into<String>) -> Value {
        self.make(&self.assert_error, message)
    }

    pub fn math_error(&self, message: impl Into<String>) -> Value {
        self.make(&self.math_error, message)
    }

    pub fn overflow_error(&self, message: impl Into<String>) -> Value {
        self.make(&self.overflow_error, message)
    }

    pub fn arg_error(&self, message: impl Into<String>) -> Value {
        self.make(&self.arg_error, message)
    }

    pub fn out_of_iter(&self) -> Value {
        self.make(&self.out_of_iter_exception, "iterator exhausted")
    }

    pub fn import_error(&self, module: &str) -> Value {
        self.make(&self.import_error, format!("no module named '{module}'"))
    }
}

impl Default for ExceptionTypes {
    fn default() -> Self {
        Self::new()
    }
}
