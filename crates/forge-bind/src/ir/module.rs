//! Interface descriptions
//!
//! A [`Description`] is the whole input of one generation run: every
//! interface, in declaration order. Declaration order is significant, the
//! global resolver consults interfaces in exactly this order.

use crate::error::{LoadError, StructuralError};
use crate::ir::flags::ExtAttr;
use crate::ir::interface::{Interface, RawInterface};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// All interfaces of a generation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Description {
    /// Interfaces in declaration order
    pub interfaces: Vec<Interface>,
}

#[derive(Debug, Deserialize)]
struct RawDescription {
    #[serde(default)]
    interfaces: Vec<RawInterface>,
}

impl Description {
    /// Create an empty description
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON description
    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        let raw: RawDescription = serde_json::from_str(json)?;
        let interfaces = raw
            .interfaces
            .into_iter()
            .map(Interface::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let description = Self { interfaces };
        description.validate()?;
        Ok(description)
    }

    /// Serialize back to the JSON description format
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Add an interface
    pub fn interface(mut self, interface: Interface) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Append every interface of another description
    pub fn extend(&mut self, other: Description) {
        self.interfaces.extend(other.interfaces);
    }

    /// Look up an interface by name
    pub fn find(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// Interface names in declaration order
    pub fn interface_names(&self) -> Vec<&str> {
        self.interfaces.iter().map(|i| i.name.as_str()).collect()
    }

    /// Validate every interface and interface name uniqueness
    pub fn validate(&self) -> Result<(), StructuralError> {
        let mut seen = HashSet::new();
        for interface in &self.interfaces {
            interface.validate()?;
            if !seen.insert(interface.name.as_str()) {
                return Err(StructuralError::DuplicateInterface(interface.name.clone()));
            }
        }
        Ok(())
    }

    /// The interface followed by its known ancestors, nearest first
    ///
    /// Parents missing from the description are skipped.
    pub fn lineage<'a>(&'a self, name: &str) -> Vec<&'a Interface> {
        let mut lineage = Vec::new();
        let mut visited = HashSet::new();
        let mut pending = vec![name.to_string()];

        while let Some(current) = pending.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(interface) = self.find(&current) {
                lineage.push(interface);
                pending.extend(interface.parents.iter().rev().cloned());
            }
        }
        lineage
    }

    /// Whether the interface or one of its ancestors carries the flag
    pub fn inherits_flag(&self, name: &str, attr: &ExtAttr) -> bool {
        self.lineage(name)
            .iter()
            .any(|interface| interface.flags.contains(attr))
    }

    /// First ancestor with a native implementation
    pub fn implementation_parent(&self, interface: &Interface) -> Option<&Interface> {
        interface
            .parents
            .iter()
            .filter_map(|parent| self.find(parent))
            .find(|parent| !parent.is_pure())
    }

    /// Interfaces ordered so that known parents precede their children
    ///
    /// Otherwise declaration order is preserved.
    pub fn hierarchy_order(&self) -> Vec<&Interface> {
        let index: HashMap<&str, &Interface> = self
            .interfaces
            .iter()
            .map(|i| (i.name.as_str(), i))
            .collect();
        let mut ordered = Vec::with_capacity(self.interfaces.len());
        let mut placed = HashSet::new();

        fn visit<'a>(
            interface: &'a Interface,
            index: &HashMap<&str, &'a Interface>,
            placed: &mut HashSet<&'a str>,
            ordered: &mut Vec<&'a Interface>,
        ) {
            if !placed.insert(interface.name.as_str()) {
                return;
            }
            for parent in &interface.parents {
                if let Some(parent) = index.get(parent.as_str()) {
                    visit(parent, index, placed, ordered);
                }
            }
            ordered.push(interface);
        }

        for interface in &self.interfaces {
            visit(interface, &index, &mut placed, &mut ordered);
        }
        ordered
    }
}

/// Builder for assembling a description from several sources
#[derive(Debug, Default)]
pub struct DescriptionBuilder {
    interfaces: Vec<Interface>,
}

impl DescriptionBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an interface
    pub fn interface(mut self, interface: Interface) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Add every interface of a loaded description
    pub fn description(mut self, description: Description) -> Self {
        self.interfaces.extend(description.interfaces);
        self
    }

    /// Build and validate the description
    pub fn build(self) -> Result<Description, StructuralError> {
        let description = Description {
            interfaces: self.interfaces,
        };
        description.validate()?;
        Ok(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Attribute, Operation, Parameter, Signature};

    const CANVAS: &str = r#"{
        "interfaces": [
            {
                "name": "Canvas",
                "parents": ["Node"],
                "flags": { "Constructor": null },
                "operations": [
                    {
                        "name": "draw",
                        "parameters": [
                            { "name": "x", "type": "double" },
                            { "name": "y", "type": "double" },
                            { "name": "w", "type": "double", "optional": true }
                        ]
                    }
                ],
                "attributes": [ { "name": "width", "type": "long" } ]
            },
            { "name": "Node", "flags": { "EventTarget": null } }
        ]
    }"#;

    #[test]
    fn test_from_json() {
        let description = Description::from_json(CANVAS).unwrap();
        assert_eq!(description.interface_names(), vec!["Canvas", "Node"]);

        let canvas = description.find("Canvas").unwrap();
        assert_eq!(canvas.operations[0].signature.optional_positions(), vec![2]);
        assert_eq!(canvas.operations[0].interface, "Canvas");
        assert_eq!(canvas.attributes[0].type_name, "long");
    }

    #[test]
    fn test_json_round_trip_keeps_flags() {
        let description = Description::from_json(CANVAS).unwrap();
        let reparsed = Description::from_json(&description.to_json().unwrap()).unwrap();
        assert_eq!(description, reparsed);
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            Description::from_json("{ not json"),
            Err(LoadError::Json(_))
        ));

        let unknown = r#"{ "interfaces": [ { "name": "A", "flags": { "Bogus": null } } ] }"#;
        assert!(matches!(
            Description::from_json(unknown),
            Err(LoadError::Structural(StructuralError::UnknownFlag { .. }))
        ));

        let duplicate = r#"{ "interfaces": [ { "name": "A" }, { "name": "A" } ] }"#;
        assert!(matches!(
            Description::from_json(duplicate),
            Err(LoadError::Structural(StructuralError::DuplicateInterface(_)))
        ));
    }

    #[test]
    fn test_hierarchy_facts() {
        let description = Description::from_json(CANVAS).unwrap();
        assert!(description.inherits_flag("Canvas", &ExtAttr::EventTarget));
        assert!(!description.inherits_flag("Canvas", &ExtAttr::ActiveObject));

        let order: Vec<_> = description
            .hierarchy_order()
            .iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(order, vec!["Node", "Canvas"]);
    }

    #[test]
    fn test_lineage_ignores_unknown_and_cycles() {
        let description = Description::new()
            .interface(Interface::new("A").extends("B").extends("Missing"))
            .interface(Interface::new("B").extends("A"));

        let names: Vec<_> = description.lineage("A").iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_implementation_parent_skips_pure() {
        let description = Description::new()
            .interface(Interface::new("Mixin").with_flag(ExtAttr::PureInterface))
            .interface(Interface::new("Node"))
            .interface(Interface::new("Element").extends("Mixin").extends("Node"));

        let element = description.find("Element").unwrap();
        assert_eq!(
            description.implementation_parent(element).map(|i| i.name.as_str()),
            Some("Node")
        );
    }

    #[test]
    fn test_builder_validates() {
        let result = DescriptionBuilder::new()
            .interface(
                Interface::new("Canvas")
                    .operation(Operation::new(
                        "draw",
                        Signature::void().param(Parameter::new("x", "double")),
                    ))
                    .attribute(Attribute::new("width", "long")),
            )
            .interface(Interface::new("Canvas"))
            .build();
        assert!(matches!(result, Err(StructuralError::DuplicateInterface(_))));
    }
}
