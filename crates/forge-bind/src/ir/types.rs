//! Type registry for Forge-Bind
//!
//! The registry answers, for each description type name, how a value crosses
//! the boundary between the managed runtime and the native object model.
//!
//! # Type Mapping Overview
//!
//! | Description type | TypeScript | Rust | Managed test | Conversion |
//! |------------------|------------|------|--------------|------------|
//! | `boolean` | `boolean` | `bool` | `typeof x === "boolean"` | coerce |
//! | `byte` .. `unsigned long long` | `number` | `i8` .. `u64` | `typeof x === "number"` | coerce |
//! | `float`, `double` | `number` | `f32`, `f64` | `typeof x === "number"` | coerce |
//! | `DOMString` | `string` | `String` | `typeof x === "string"` | coerce |
//! | `any` | `unknown` | `rt::ManagedValue` | `x !== NOT_SUPPLIED` | convert |
//! | `void` | `void` | `()` | - | - |
//! | interface `Foo` | `Foo` | `&Foo` | `x instanceof Foo` | unwrap |
//!
//! # Conversions
//!
//! - **coerce** never fails (`CoerceManaged`), the adapter needs no error path
//!   for it.
//! - **convert** may fail (`FromManaged`), the adapter propagates the error.
//! - **unwrap** borrows the native object behind a managed wrapper and fails
//!   when the value wraps something else.
//!
//! Return values always go through `ToManaged`.

use crate::error::{Location, StructuralError};
use crate::ir::Description;
use crate::runtime::ManagedValue;
use indexmap::IndexMap;
use proc_macro2::TokenStream;
use quote::quote;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Runtime type test used by managed-side dispatch guards
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTest {
    /// `typeof x === "<tag>"`
    Typeof(String),
    /// `x instanceof <Class>`, subclasses included
    Instanceof(String),
    /// Any supplied value matches
    Any,
}

impl TypeTest {
    /// Render the test against a TypeScript expression
    pub fn to_typescript(&self, expr: &str) -> String {
        match self {
            TypeTest::Typeof(tag) => format!("typeof {} === \"{}\"", expr, tag),
            TypeTest::Instanceof(class) => format!("{} instanceof {}", expr, class),
            TypeTest::Any => format!("{} !== NOT_SUPPLIED", expr),
        }
    }

    /// Evaluate the test against a runtime value's shallow type tag
    pub fn matches(&self, value: &ManagedValue) -> bool {
        match self {
            TypeTest::Typeof(tag) => value.type_tag() == Some(tag.as_str()),
            TypeTest::Instanceof(class) => value.is_instance_of(class),
            TypeTest::Any => !matches!(value, ManagedValue::NotSupplied),
        }
    }
}

/// How an argument is turned into its native representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Conversion {
    /// Infallible coercion
    #[default]
    Coerce,
    /// Fallible conversion
    Convert,
    /// Borrow the native object behind a managed wrapper
    Unwrap,
}

/// Everything the generator needs to know about one type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    /// TypeScript type name
    pub managed: String,
    /// Rust type path
    pub native: String,
    /// Managed-side runtime test
    pub test: TypeTest,
    /// Argument conversion strategy
    #[serde(default)]
    pub conversion: Conversion,
    /// Conversion must run inside a conversion scope
    #[serde(default)]
    pub scoped: bool,
    /// Extra `use` paths the adapter module needs
    #[serde(default)]
    pub includes: Vec<String>,
    /// Native accessor used for reflected getters
    #[serde(default)]
    pub reflect_getter: Option<String>,
    /// Native accessor used for reflected setters
    #[serde(default)]
    pub reflect_setter: Option<String>,
}

impl TypeInfo {
    /// Create a type with a `typeof` test and infallible coercion
    pub fn primitive(managed: &str, native: &str) -> Self {
        Self {
            managed: managed.to_string(),
            native: native.to_string(),
            test: TypeTest::Typeof(managed.to_string()),
            conversion: Conversion::Coerce,
            scoped: false,
            includes: Vec::new(),
            reflect_getter: None,
            reflect_setter: None,
        }
    }

    /// Create a wrapper type for an interface
    pub fn interface(name: &str, native: &str) -> Self {
        Self {
            managed: name.to_string(),
            native: native.to_string(),
            test: TypeTest::Instanceof(name.to_string()),
            conversion: Conversion::Unwrap,
            scoped: false,
            includes: Vec::new(),
            reflect_getter: None,
            reflect_setter: None,
        }
    }

    /// Create the void type
    pub fn void() -> Self {
        Self {
            managed: "void".to_string(),
            native: "()".to_string(),
            test: TypeTest::Any,
            conversion: Conversion::Coerce,
            scoped: false,
            includes: Vec::new(),
            reflect_getter: None,
            reflect_setter: None,
        }
    }

    /// Set the conversion strategy
    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = conversion;
        self
    }

    /// Mark as requiring a conversion scope
    pub fn scoped(mut self) -> Self {
        self.scoped = true;
        self
    }

    /// Add an auxiliary import
    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.includes.push(path.into());
        self
    }

    /// Set reflect accessors
    pub fn reflected_by(mut self, getter: &str, setter: &str) -> Self {
        self.reflect_getter = Some(getter.to_string());
        self.reflect_setter = Some(setter.to_string());
        self
    }

    pub fn is_void(&self) -> bool {
        self.native == "()"
    }

    /// Whether argument conversion can raise
    pub fn is_fallible(&self) -> bool {
        !matches!(self.conversion, Conversion::Coerce)
    }

    /// Parse the native type as a Rust type
    pub fn native_type(&self, type_name: &str) -> Result<syn::Type, StructuralError> {
        syn::parse_str::<syn::Type>(&self.native).map_err(|e| {
            StructuralError::InvalidNativeType {
                type_name: type_name.to_string(),
                native: self.native.clone(),
                reason: e.to_string(),
            }
        })
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.managed)
    }
}

/// Query surface the generator consumes
///
/// Only [`TypeRegistry::type_info`] is required; the remaining queries are
/// derived from it and can be overridden by registries with special needs.
pub trait TypeRegistry {
    /// Look up a type by description name
    fn type_info(&self, type_name: &str) -> Option<&TypeInfo>;

    /// Look up a type, failing with a located error
    fn lookup(&self, type_name: &str, location: &Location) -> Result<&TypeInfo, StructuralError> {
        self.type_info(type_name)
            .ok_or_else(|| StructuralError::UnknownType {
                location: location.clone(),
                type_name: type_name.to_string(),
            })
    }

    /// Expression converting `source` (a `&ManagedValue`) to the native type
    fn conversion_expression(
        &self,
        type_name: &str,
        source: TokenStream,
        runtime: &syn::Path,
        location: &Location,
    ) -> Result<TokenStream, StructuralError> {
        let info = self.lookup(type_name, location)?;
        let native = info.native_type(type_name)?;
        Ok(match info.conversion {
            Conversion::Coerce => quote! {
                <#native as #runtime::CoerceManaged>::coerce(#source)
            },
            Conversion::Convert => quote! {
                <#native as #runtime::FromManaged>::from_managed(#source)?
            },
            Conversion::Unwrap => quote! {
                #runtime::unwrap::<#native>(#source)?
            },
        })
    }

    /// Expression converting a native `value` back to a `ManagedValue`
    fn return_expression(&self, value: TokenStream, runtime: &syn::Path) -> TokenStream {
        quote! { #runtime::ToManaged::to_managed(#value) }
    }

    /// Native parameter declaration for the type
    fn parameter_declaration(
        &self,
        type_name: &str,
        location: &Location,
    ) -> Result<String, StructuralError> {
        let info = self.lookup(type_name, location)?;
        Ok(match info.conversion {
            Conversion::Unwrap => format!("&{}", info.native),
            Conversion::Coerce | Conversion::Convert => info.native.clone(),
        })
    }

    /// Whether converting the type needs a conversion scope
    fn requires_scoped_resource(&self, type_name: &str) -> bool {
        self.type_info(type_name).is_some_and(|info| info.scoped)
    }

    /// Imports the adapter module needs for the type
    fn auxiliary_includes(&self, type_name: &str) -> BTreeSet<String> {
        self.type_info(type_name)
            .map(|info| info.includes.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Registry seeded with the builtin types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultTypeRegistry {
    types: IndexMap<String, TypeInfo>,
}

impl Default for DefaultTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultTypeRegistry {
    /// Create a registry holding the builtin types
    pub fn new() -> Self {
        let mut types = IndexMap::new();
        types.insert("void".to_string(), TypeInfo::void());
        types.insert(
            "boolean".to_string(),
            TypeInfo::primitive("boolean", "bool")
                .reflected_by("has_attribute", "set_boolean_attribute"),
        );

        let numbers = [
            ("byte", "i8"),
            ("octet", "u8"),
            ("short", "i16"),
            ("unsigned short", "u16"),
            ("long", "i32"),
            ("unsigned long", "u32"),
            ("long long", "i64"),
            ("unsigned long long", "u64"),
            ("float", "f32"),
            ("double", "f64"),
        ];
        for (name, native) in numbers {
            let mut info = TypeInfo::primitive("number", native);
            if native.starts_with('i') || native.starts_with('u') {
                info = info.reflected_by("get_integral_attribute", "set_integral_attribute");
            }
            types.insert(name.to_string(), info);
        }

        types.insert(
            "DOMString".to_string(),
            TypeInfo::primitive("string", "String").reflected_by("get_attribute", "set_attribute"),
        );
        types.insert(
            "any".to_string(),
            TypeInfo {
                managed: "unknown".to_string(),
                native: "rt::ManagedValue".to_string(),
                test: TypeTest::Any,
                conversion: Conversion::Convert,
                scoped: true,
                includes: Vec::new(),
                reflect_getter: None,
                reflect_setter: None,
            },
        );

        Self { types }
    }

    /// Create a registry that also knows every interface of a description
    pub fn for_description(description: &Description) -> Self {
        let mut registry = Self::new();
        for interface in &description.interfaces {
            registry.register(
                interface.name.clone(),
                TypeInfo::interface(&interface.name, interface.native_type()),
            );
        }
        registry
    }

    /// Register or replace a type
    pub fn register(&mut self, name: impl Into<String>, info: TypeInfo) {
        self.types.insert(name.into(), info);
    }

    /// Add a type (builder style)
    pub fn with_type(mut self, name: impl Into<String>, info: TypeInfo) -> Self {
        self.register(name, info);
        self
    }

    /// Registered type names in registration order
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

impl TypeRegistry for DefaultTypeRegistry {
    fn type_info(&self, type_name: &str) -> Option<&TypeInfo> {
        self.types.get(type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> syn::Path {
        syn::parse_str("forge_bind::runtime").unwrap()
    }

    #[test]
    fn test_builtin_types() {
        let registry = DefaultTypeRegistry::new();

        let long = registry.type_info("long").unwrap();
        assert_eq!(long.managed, "number");
        assert_eq!(long.native, "i32");
        assert!(!long.is_fallible());

        let string = registry.type_info("DOMString").unwrap();
        assert_eq!(string.test.to_typescript("x"), "typeof x === \"string\"");

        assert!(registry.type_info("void").unwrap().is_void());
        assert!(registry.type_info("Canvas").is_none());
    }

    #[test]
    fn test_type_tests_match_tags() {
        let number = TypeTest::Typeof("number".into());
        assert!(number.matches(&ManagedValue::Number(1.0)));
        assert!(!number.matches(&ManagedValue::String("1".into())));
        assert!(!number.matches(&ManagedValue::Null));

        let canvas = TypeTest::Instanceof("Canvas".into());
        assert!(canvas.matches(&ManagedValue::object("Canvas")));
        assert!(!canvas.matches(&ManagedValue::object("Image")));

        let node = TypeTest::Instanceof("Node".into());
        let element = ManagedValue::object("Element").extending(["Node"]);
        assert!(node.matches(&element));
        assert!(!canvas.matches(&element));
        assert_eq!(TypeTest::Any.to_typescript("v"), "v !== NOT_SUPPLIED");

        assert!(TypeTest::Any.matches(&ManagedValue::Null));
        assert!(!TypeTest::Any.matches(&ManagedValue::NotSupplied));
    }

    #[test]
    fn test_conversion_expressions() {
        let registry =
            DefaultTypeRegistry::new().with_type("Canvas", TypeInfo::interface("Canvas", "Canvas"));
        let loc = Location::interface("Test");
        let source = quote! { args.argument(1) };

        let coerce = registry
            .conversion_expression("double", source.clone(), &runtime(), &loc)
            .unwrap()
            .to_string();
        assert!(coerce.contains("CoerceManaged"));
        assert!(!coerce.contains('?'));

        let unwrap = registry
            .conversion_expression("Canvas", source, &runtime(), &loc)
            .unwrap()
            .to_string();
        assert!(unwrap.contains("unwrap :: < Canvas >"));
        assert!(unwrap.ends_with('?'));
    }

    #[test]
    fn test_parameter_declaration() {
        let registry =
            DefaultTypeRegistry::new().with_type("Canvas", TypeInfo::interface("Canvas", "Canvas"));
        let loc = Location::interface("Test");
        assert_eq!(registry.parameter_declaration("Canvas", &loc).unwrap(), "&Canvas");
        assert_eq!(registry.parameter_declaration("long", &loc).unwrap(), "i32");
        assert!(matches!(
            registry.parameter_declaration("Missing", &loc),
            Err(StructuralError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_scoped_and_includes() {
        let registry = DefaultTypeRegistry::new().with_type(
            "Point",
            TypeInfo::interface("Point", "Point")
                .scoped()
                .include("crate::geometry::Point"),
        );
        assert!(registry.requires_scoped_resource("Point"));
        assert!(registry.requires_scoped_resource("any"));
        assert!(!registry.requires_scoped_resource("long"));
        assert!(registry
            .auxiliary_includes("Point")
            .contains("crate::geometry::Point"));
    }

    #[test]
    fn test_invalid_native_type() {
        let info = TypeInfo::primitive("number", "not a type !");
        assert!(matches!(
            info.native_type("broken"),
            Err(StructuralError::InvalidNativeType { .. })
        ));
    }
}
