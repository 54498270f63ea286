//! Well-known class and method names with special analysis semantics.
//!
//! The heap model consults these for object coalescing, and the bundled
//! plugins for modeling class initialization, threads and reflection. All
//! lookups degrade gracefully when the program does not declare the class.

use std::collections::HashMap;

use lazy_static::lazy_static;

use super::program::{ClassId, Program};

pub const OBJECT: &str = "java.lang.Object";
pub const STRING: &str = "java.lang.String";
pub const STRING_BUILDER: &str = "java.lang.StringBuilder";
pub const STRING_BUFFER: &str = "java.lang.StringBuffer";
pub const THROWABLE: &str = "java.lang.Throwable";
pub const THREAD: &str = "java.lang.Thread";
pub const CLASS: &str = "java.lang.Class";
pub const REFLECT_METHOD: &str = "java.lang.reflect.Method";

pub const CLINIT: &str = "<clinit>";
pub const INIT: &str = "<init>";
pub const THREAD_START: &str = "start";
pub const THREAD_RUN: &str = "run";
pub const FOR_NAME: &str = "forName";
pub const NEW_INSTANCE: &str = "newInstance";
pub const GET_METHOD: &str = "getMethod";
pub const INVOKE: &str = "invoke";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum KnownClass {
    Object,
    String,
    StringBuilder,
    StringBuffer,
    Throwable,
    Thread,
    Class,
    ReflectMethod,
}

lazy_static! {
    static ref KNOWN_CLASSES: HashMap<&'static str, KnownClass> = {
        let mut map = HashMap::new();
        map.insert(OBJECT, KnownClass::Object);
        map.insert(STRING, KnownClass::String);
        map.insert(STRING_BUILDER, KnownClass::StringBuilder);
        map.insert(STRING_BUFFER, KnownClass::StringBuffer);
        map.insert(THROWABLE, KnownClass::Throwable);
        map.insert(THREAD, KnownClass::Thread);
        map.insert(CLASS, KnownClass::Class);
        map.insert(REFLECT_METHOD, KnownClass::ReflectMethod);
        map
    };
}

pub fn known_class(name: &str) -> Option<KnownClass> {
    KNOWN_CLASSES.get(name).copied()
}

/// Whether `class` is one of the string-builder classes.
pub fn is_string_builder(program: &Program, class: ClassId) -> bool {
    matches!(
        known_class(&program.class(class).name),
        Some(KnownClass::StringBuilder | KnownClass::StringBuffer)
    )
}

/// Whether `class` is `java.lang.Throwable` or one of its subclasses.
pub fn is_throwable(program: &Program, class: ClassId) -> bool {
    match program.class_by_name(THROWABLE) {
        Some(throwable) => program.is_subclass(class, throwable),
        None => false,
    }
}

/// Whether `class` is `java.lang.Thread` or one of its subclasses.
pub fn is_thread(program: &Program, class: ClassId) -> bool {
    match program.class_by_name(THREAD) {
        Some(thread) => program.is_subclass(class, thread),
        None => false,
    }
}
