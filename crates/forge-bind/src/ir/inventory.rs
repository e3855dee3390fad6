//! Compile-time interface inventory
//!
//! Crates that describe interfaces in Rust rather than JSON can register them
//! at compile time using the `linkme` crate's distributed slices.

use crate::error::StructuralError;
use crate::ir::{Description, Interface};

/// Distributed slice for collecting interfaces at compile time
#[linkme::distributed_slice]
pub static BIND_INTERFACES: [fn() -> Interface];

/// Collect all registered interfaces from the distributed slice
pub fn collect_interfaces() -> Vec<Interface> {
    BIND_INTERFACES.iter().map(|f| f()).collect()
}

/// Registry for collecting interfaces manually or from the inventory
#[derive(Debug, Default)]
pub struct InterfaceRegistry {
    interfaces: Vec<Interface>,
}

impl InterfaceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry from the distributed slice
    ///
    /// Link order decides slice order, so interfaces are sorted by name to
    /// keep generated output stable.
    pub fn from_inventory() -> Self {
        let mut interfaces = collect_interfaces();
        interfaces.sort_by(|a, b| a.name.cmp(&b.name));
        Self { interfaces }
    }

    /// Register an interface
    pub fn register(&mut self, interface: Interface) {
        self.interfaces.push(interface);
    }

    /// Get all registered interfaces
    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// Turn the registry into a validated description
    pub fn into_description(self) -> Result<Description, StructuralError> {
        let description = Description {
            interfaces: self.interfaces,
        };
        description.validate()?;
        Ok(description)
    }
}

/// Macro to register an interface in the distributed slice
#[macro_export]
macro_rules! register_interface {
    ($interface:expr) => {
        #[$crate::linkme::distributed_slice($crate::ir::BIND_INTERFACES)]
        #[linkme(crate = $crate::linkme)]
        static _BIND_INTERFACE: fn() -> $crate::ir::Interface = || $interface;
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Operation, Parameter, Signature};

    crate::register_interface!(Interface::new("InventorySample").operation(Operation::new(
        "ping",
        Signature::void().param(Parameter::new("count", "long"))
    )));

    #[test]
    fn test_interface_registry() {
        let mut registry = InterfaceRegistry::new();
        registry.register(Interface::new("Canvas"));
        registry.register(Interface::new("Image"));

        assert_eq!(registry.interfaces().len(), 2);
        let description = registry.into_description().unwrap();
        assert_eq!(description.interface_names(), vec!["Canvas", "Image"]);
    }

    #[test]
    fn test_registry_from_inventory() {
        let registry = InterfaceRegistry::from_inventory();
        let sample = registry
            .interfaces()
            .iter()
            .find(|i| i.name == "InventorySample")
            .unwrap();
        assert_eq!(sample.operations[0].interface, "InventorySample");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = InterfaceRegistry::new();
        registry.register(Interface::new("Canvas"));
        registry.register(Interface::new("Canvas"));
        assert!(registry.into_description().is_err());
    }
}
