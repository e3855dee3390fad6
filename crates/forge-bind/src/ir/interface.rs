//! Interface members
//!
//! Interfaces, operations, attributes and parameters as loaded from a
//! description. Raw (`Raw*`) forms mirror the JSON document; converting them
//! parses extension flags and checks names, so the validated forms can be
//! trusted by the planner.

use crate::error::{Location, StructuralError};
use crate::ir::flags::{ExtAttr, ExtAttrs, FlagTarget};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A formal parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Description type name
    #[serde(rename = "type")]
    pub type_name: String,
    /// Argument may be omitted
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    /// Parameter flags
    #[serde(skip_serializing_if = "ExtAttrs::is_empty")]
    pub flags: ExtAttrs,
}

impl Parameter {
    /// Create a required parameter
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            optional: false,
            flags: ExtAttrs::new(),
        }
    }

    /// Mark as optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Mark as a callback-style parameter
    pub fn callback(mut self) -> Self {
        self.flags = self.flags.with(ExtAttr::Callback);
        self
    }

    pub fn is_callback(&self) -> bool {
        self.flags.contains(&ExtAttr::Callback)
    }

    /// Optional and counted for arity (callback parameters are not)
    pub fn is_optional_positional(&self) -> bool {
        self.optional && !self.is_callback()
    }
}

/// Parameters, return type and flags of one callable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Signature {
    /// Ordered parameters
    pub parameters: Vec<Parameter>,
    /// Return type name
    pub return_type: String,
    /// Native call reports an exception code
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub raises_exception: bool,
    /// Member flags
    #[serde(skip_serializing_if = "ExtAttrs::is_empty")]
    pub flags: ExtAttrs,
}

impl Signature {
    /// Create a signature without parameters
    pub fn new(return_type: impl Into<String>) -> Self {
        Self {
            parameters: Vec::new(),
            return_type: return_type.into(),
            raises_exception: false,
            flags: ExtAttrs::new(),
        }
    }

    /// Create a void signature without parameters
    pub fn void() -> Self {
        Self::new("void")
    }

    /// Add a parameter
    pub fn param(mut self, param: Parameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// Mark the native call as reporting exception codes
    pub fn raises(mut self) -> Self {
        self.raises_exception = true;
        self
    }

    /// Add a flag
    pub fn with_flag(mut self, attr: ExtAttr) -> Self {
        self.flags = self.flags.with(attr);
        self
    }

    /// Full parameter count
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Positions of optional parameters that count for arity, ascending
    pub fn optional_positions(&self) -> Vec<usize> {
        self.parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_optional_positional())
            .map(|(i, _)| i)
            .collect()
    }

    /// Parameters of the signature truncated to `arity`
    pub fn truncated(&self, arity: usize) -> &[Parameter] {
        &self.parameters[..arity.min(self.parameters.len())]
    }

    pub fn returns_void(&self) -> bool {
        self.return_type == "void"
    }
}

/// A named operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Operation {
    /// Operation name
    pub name: String,
    /// Whether the operation is static
    #[serde(rename = "static", skip_serializing_if = "std::ops::Not::not")]
    pub is_static: bool,
    /// Signature
    #[serde(flatten)]
    pub signature: Signature,
    /// Owning interface name
    #[serde(skip)]
    pub interface: String,
}

impl Operation {
    /// Create an instance operation
    pub fn new(name: impl Into<String>, signature: Signature) -> Self {
        Self {
            name: name.into(),
            is_static: false,
            signature,
            interface: String::new(),
        }
    }

    /// Mark as static
    pub fn static_op(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn flags(&self) -> &ExtAttrs {
        &self.signature.flags
    }

    pub fn is_custom(&self) -> bool {
        self.flags().contains(&ExtAttr::Custom)
    }
}

/// A named attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Attribute {
    /// Attribute name
    pub name: String,
    /// Description type name
    #[serde(rename = "type")]
    pub type_name: String,
    /// Whether a setter is generated
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub readonly: bool,
    /// Native getter reports an exception code
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub raises_on_get: bool,
    /// Attribute flags
    #[serde(skip_serializing_if = "ExtAttrs::is_empty")]
    pub flags: ExtAttrs,
    /// Owning interface name
    #[serde(skip)]
    pub interface: String,
}

impl Attribute {
    /// Create a writable attribute
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            readonly: false,
            raises_on_get: false,
            flags: ExtAttrs::new(),
            interface: String::new(),
        }
    }

    /// Mark as read-only
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Mark the getter as reporting exception codes
    pub fn raises_on_get(mut self) -> Self {
        self.raises_on_get = true;
        self
    }

    /// Add a flag
    pub fn with_flag(mut self, attr: ExtAttr) -> Self {
        self.flags = self.flags.with(attr);
        self
    }

    pub fn has_custom_getter(&self) -> bool {
        self.flags.contains(&ExtAttr::Custom) || self.flags.contains(&ExtAttr::CustomGetter)
    }

    pub fn has_custom_setter(&self) -> bool {
        self.flags.contains(&ExtAttr::Custom) || self.flags.contains(&ExtAttr::CustomSetter)
    }
}

/// A described interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interface {
    /// Interface name
    pub name: String,
    /// Direct parents, most significant first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    /// Interface flags
    #[serde(skip_serializing_if = "ExtAttrs::is_empty")]
    pub flags: ExtAttrs,
    /// Constructor parameters (used when a constructor flag is present)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constructor_parameters: Vec<Parameter>,
    /// Operations in declaration order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<Operation>,
    /// Attributes in declaration order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
    /// Documentation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl Interface {
    /// Create an empty interface
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
            flags: ExtAttrs::new(),
            constructor_parameters: Vec::new(),
            operations: Vec::new(),
            attributes: Vec::new(),
            doc: None,
        }
    }

    /// Add a parent
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    /// Add an interface flag
    pub fn with_flag(mut self, attr: ExtAttr) -> Self {
        self.flags = self.flags.with(attr);
        self
    }

    /// Add a constructor parameter
    pub fn constructor_param(mut self, param: Parameter) -> Self {
        self.constructor_parameters.push(param);
        self
    }

    /// Add an operation, recording this interface as its owner
    pub fn operation(mut self, mut op: Operation) -> Self {
        op.interface = self.name.clone();
        self.operations.push(op);
        self
    }

    /// Add an attribute, recording this interface as its owner
    pub fn attribute(mut self, mut attr: Attribute) -> Self {
        attr.interface = self.name.clone();
        self.attributes.push(attr);
        self
    }

    /// Set documentation
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Rust type implementing the interface
    pub fn native_type(&self) -> &str {
        self.flags.native_type().unwrap_or(&self.name)
    }

    /// Whether any constructor flag is present
    pub fn has_constructor(&self) -> bool {
        self.flags.contains(&ExtAttr::Constructor)
            || self.flags.contains(&ExtAttr::NamedConstructor)
            || self.flags.contains(&ExtAttr::CustomConstructor)
    }

    pub fn is_pure(&self) -> bool {
        self.flags.contains(&ExtAttr::PureInterface)
    }

    pub fn has_index_getter(&self) -> bool {
        self.flags.contains(&ExtAttr::NumericIndexedGetter)
            || self.flags.contains(&ExtAttr::CustomIndexedGetter)
    }

    pub fn has_index_setter(&self) -> bool {
        self.flags.contains(&ExtAttr::CustomIndexedSetter)
    }

    /// Check names and member uniqueness
    pub fn validate(&self) -> Result<(), StructuralError> {
        if self.name.is_empty() {
            return Err(StructuralError::EmptyInterfaceName);
        }
        let location = Location::interface(&self.name);
        check_identifier(&self.name, &location)?;

        for param in &self.constructor_parameters {
            check_identifier(&param.name, &Location::member(&self.name, "constructor"))?;
        }

        for op in &self.operations {
            let location = Location::member(&self.name, &op.name);
            check_identifier(&op.name, &location)?;
            for param in &op.signature.parameters {
                check_identifier(&param.name, &location)?;
            }
        }

        let mut seen = HashSet::new();
        for attr in &self.attributes {
            let location = Location::member(&self.name, &attr.name);
            check_identifier(&attr.name, &location)?;
            if !seen.insert(attr.name.as_str()) {
                return Err(StructuralError::DuplicateAttribute { location });
            }
        }

        Ok(())
    }
}

fn check_identifier(name: &str, location: &Location) -> Result<(), StructuralError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StructuralError::InvalidIdentifier {
            location: location.clone(),
            name: name.to_string(),
        })
    }
}

type RawFlags = BTreeMap<String, Option<String>>;

fn void_type() -> String {
    "void".to_string()
}

/// Parameter as written in a description
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawParameter {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    flags: RawFlags,
}

impl RawParameter {
    fn into_parameter(self, location: &Location) -> Result<Parameter, StructuralError> {
        Ok(Parameter {
            flags: ExtAttrs::parse(&self.flags, FlagTarget::Parameter, location)?,
            name: self.name,
            type_name: self.type_name,
            optional: self.optional,
        })
    }
}

/// Operation as written in a description
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawOperation {
    name: String,
    #[serde(default, rename = "static")]
    is_static: bool,
    #[serde(default = "void_type")]
    return_type: String,
    #[serde(default)]
    raises_exception: bool,
    #[serde(default)]
    parameters: Vec<RawParameter>,
    #[serde(default)]
    flags: RawFlags,
}

/// Attribute as written in a description
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawAttribute {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    readonly: bool,
    #[serde(default)]
    raises_on_get: bool,
    #[serde(default)]
    flags: RawFlags,
}

/// Interface as written in a description
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawInterface {
    name: String,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    flags: RawFlags,
    #[serde(default)]
    constructor_parameters: Vec<RawParameter>,
    #[serde(default)]
    operations: Vec<RawOperation>,
    #[serde(default)]
    attributes: Vec<RawAttribute>,
    #[serde(default)]
    doc: Option<String>,
}

impl TryFrom<RawInterface> for Interface {
    type Error = StructuralError;

    fn try_from(raw: RawInterface) -> Result<Self, Self::Error> {
        let name = raw.name;
        let flags = ExtAttrs::parse(&raw.flags, FlagTarget::Interface, &Location::interface(&name))?;

        let ctor_location = Location::member(&name, "constructor");
        let constructor_parameters = raw
            .constructor_parameters
            .into_iter()
            .map(|p| p.into_parameter(&ctor_location))
            .collect::<Result<Vec<_>, _>>()?;

        let mut operations = Vec::with_capacity(raw.operations.len());
        for op in raw.operations {
            let location = Location::member(&name, &op.name);
            let parameters = op
                .parameters
                .into_iter()
                .map(|p| p.into_parameter(&location))
                .collect::<Result<Vec<_>, _>>()?;
            operations.push(Operation {
                signature: Signature {
                    parameters,
                    return_type: op.return_type,
                    raises_exception: op.raises_exception,
                    flags: ExtAttrs::parse(&op.flags, FlagTarget::Operation, &location)?,
                },
                name: op.name,
                is_static: op.is_static,
                interface: name.clone(),
            });
        }

        let mut attributes = Vec::with_capacity(raw.attributes.len());
        for attr in raw.attributes {
            let location = Location::member(&name, &attr.name);
            attributes.push(Attribute {
                flags: ExtAttrs::parse(&attr.flags, FlagTarget::Attribute, &location)?,
                name: attr.name,
                type_name: attr.type_name,
                readonly: attr.readonly,
                raises_on_get: attr.raises_on_get,
                interface: name.clone(),
            });
        }

        let interface = Interface {
            name,
            parents: raw.parents,
            flags,
            constructor_parameters,
            operations,
            attributes,
            doc: raw.doc,
        };
        interface.validate()?;
        Ok(interface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_positions_skip_callbacks() {
        let sig = Signature::void()
            .param(Parameter::new("x", "double"))
            .param(Parameter::new("listener", "EventListener").optional().callback())
            .param(Parameter::new("w", "double").optional());

        assert_eq!(sig.arity(), 3);
        assert_eq!(sig.optional_positions(), vec![2]);
        assert_eq!(sig.truncated(1).len(), 1);
        assert_eq!(sig.truncated(9).len(), 3);
    }

    #[test]
    fn test_builder_records_owner() {
        let iface = Interface::new("Canvas")
            .operation(Operation::new("draw", Signature::void()))
            .attribute(Attribute::new("width", "long"));

        assert_eq!(iface.operations[0].interface, "Canvas");
        assert_eq!(iface.attributes[0].interface, "Canvas");
        assert_eq!(iface.native_type(), "Canvas");
    }

    #[test]
    fn test_raw_conversion_parses_flags() {
        let raw: RawInterface = serde_json::from_value(serde_json::json!({
            "name": "Image",
            "flags": { "NamedConstructor": null, "NativeType": "crate::dom::Image" },
            "operations": [{
                "name": "decode",
                "flags": { "CallWith": "ExecutionContext" },
                "parameters": [{ "name": "done", "type": "VoidCallback", "optional": true,
                                 "flags": { "Callback": null } }]
            }]
        }))
        .unwrap();

        let iface = Interface::try_from(raw).unwrap();
        assert!(iface.has_constructor());
        assert_eq!(iface.native_type(), "crate::dom::Image");
        assert!(iface.operations[0].signature.returns_void());
        assert!(iface.operations[0].signature.parameters[0].is_callback());
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        let iface = Interface::new("Canvas")
            .attribute(Attribute::new("width", "long"))
            .attribute(Attribute::new("width", "double"));
        assert!(matches!(
            iface.validate(),
            Err(StructuralError::DuplicateAttribute { .. })
        ));
    }

    #[test]
    fn test_invalid_identifier_rejected() {
        let iface = Interface::new("Canvas").operation(Operation::new("draw-it", Signature::void()));
        assert!(matches!(
            iface.validate(),
            Err(StructuralError::InvalidIdentifier { ref name, .. }) if name == "draw-it"
        ));
        assert!(matches!(
            Interface::new("").validate(),
            Err(StructuralError::EmptyInterfaceName)
        ));
    }
}
