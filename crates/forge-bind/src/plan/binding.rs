//! Binding names and resolver tables
//!
//! Every adapter is reachable under a binding name `<Interface>_<id>_<Role>`.
//! The pair (binding name, argument count) is the key the resolver looks up;
//! one binding name may back several arities, and constructors are looked up
//! by name alone.

use crate::error::StructuralError;
use crate::plan::callback::CallbackDescriptor;
use indexmap::IndexMap;
use std::fmt;

/// Role tag of a binding name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingRole {
    Getter,
    Setter,
    Callback,
}

impl BindingRole {
    pub fn as_str(self) -> &'static str {
        match self {
            BindingRole::Getter => "Getter",
            BindingRole::Setter => "Setter",
            BindingRole::Callback => "Callback",
        }
    }
}

/// Interface-qualified binding name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingName {
    pub interface: String,
    pub identifier: String,
    pub role: BindingRole,
}

impl BindingName {
    pub fn new(interface: &str, identifier: &str, role: BindingRole) -> Self {
        Self {
            interface: interface.to_string(),
            identifier: identifier.to_string(),
            role,
        }
    }

    pub fn getter(interface: &str, attribute: &str) -> Self {
        Self::new(interface, attribute, BindingRole::Getter)
    }

    pub fn setter(interface: &str, attribute: &str) -> Self {
        Self::new(interface, attribute, BindingRole::Setter)
    }

    pub fn callback(interface: &str, identifier: &str) -> Self {
        Self::new(interface, identifier, BindingRole::Callback)
    }

    pub fn constructor(interface: &str) -> Self {
        Self::callback(interface, "constructor")
    }

    pub fn index_getter(interface: &str) -> Self {
        Self::callback(interface, "numericIndexGetter")
    }

    pub fn index_setter(interface: &str) -> Self {
        Self::callback(interface, "numericIndexSetter")
    }

    /// Name of the Rust function implementing the binding
    ///
    /// `draw_1` + Callback becomes `draw_1_callback`, `numericIndexGetter` +
    /// Callback becomes `numeric_index_getter_callback`.
    pub fn function_name(&self) -> String {
        format!(
            "{}_{}",
            to_snake_case(&self.identifier),
            self.role.as_str().to_ascii_lowercase()
        )
    }
}

impl fmt::Display for BindingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.interface, self.identifier, self.role.as_str())
    }
}

/// Convert camelCase or PascalCase to snake_case
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev_lower = false;
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            out.push(c);
        }
    }
    out
}

/// Argument count a resolver entry answers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    Exact(usize),
    /// Any argument count (constructors)
    Any,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => n == count,
            Arity::Any => true,
        }
    }

    /// Whether two keys with the same binding name would collide
    pub fn overlaps(self, other: Arity) -> bool {
        match (self, other) {
            (Arity::Exact(a), Arity::Exact(b)) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::Any => write!(f, "any"),
        }
    }
}

/// Resolver entries of one interface, in insertion order
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceResolver {
    interface: String,
    entries: IndexMap<String, Vec<CallbackDescriptor>>,
}

impl InterfaceResolver {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            entries: IndexMap::new(),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Insert a descriptor under its (binding name, arity) key
    ///
    /// Fails when the key overlaps an existing entry.
    pub fn insert(&mut self, descriptor: CallbackDescriptor) -> Result<(), StructuralError> {
        let binding = descriptor.binding.to_string();
        let slot = self.entries.entry(binding.clone()).or_default();
        if slot.iter().any(|existing| existing.arity.overlaps(descriptor.arity)) {
            return Err(StructuralError::DuplicateBinding {
                interface: self.interface.clone(),
                binding,
                arity: descriptor.arity.to_string(),
            });
        }
        slot.push(descriptor);
        Ok(())
    }

    /// Look up the descriptor for a binding name and argument count
    pub fn resolve(&self, binding: &str, count: usize) -> Option<&CallbackDescriptor> {
        self.entries
            .get(binding)?
            .iter()
            .find(|descriptor| descriptor.arity.accepts(count))
    }

    /// All descriptors in insertion order
    pub fn descriptors(&self) -> impl Iterator<Item = &CallbackDescriptor> {
        self.entries.values().flatten()
    }

    /// All (binding name, arity) keys in insertion order
    pub fn keys(&self) -> Vec<(String, Arity)> {
        self.descriptors()
            .map(|d| (d.binding.to_string(), d.arity))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-interface resolvers in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolverTable {
    interfaces: Vec<InterfaceResolver>,
}

impl ResolverTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interface resolver
    pub fn push(&mut self, resolver: InterfaceResolver) {
        self.interfaces.push(resolver);
    }

    /// Append every resolver of another table, keeping its order
    pub fn merge(&mut self, other: ResolverTable) {
        self.interfaces.extend(other.interfaces);
    }

    /// Try each interface in declaration order, first hit wins
    pub fn resolve(&self, binding: &str, count: usize) -> Option<&CallbackDescriptor> {
        self.interfaces
            .iter()
            .find_map(|resolver| resolver.resolve(binding, count))
    }

    pub fn interfaces(&self) -> &[InterfaceResolver] {
        &self.interfaces
    }

    /// All keys, interface by interface
    pub fn keys(&self) -> Vec<(String, Arity)> {
        self.interfaces.iter().flat_map(InterfaceResolver::keys).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::callback::AdapterBody;

    fn descriptor(binding: BindingName, arity: Arity) -> CallbackDescriptor {
        CallbackDescriptor {
            interface: binding.interface.clone(),
            binding,
            arity,
            parameter_count: 0,
            needs_receiver: false,
            body: AdapterBody::Custom,
        }
    }

    #[test]
    fn test_binding_name_format() {
        assert_eq!(
            BindingName::callback("Canvas", "draw_1").to_string(),
            "Canvas_draw_1_Callback"
        );
        assert_eq!(BindingName::getter("Canvas", "width").to_string(), "Canvas_width_Getter");
        assert_eq!(
            BindingName::constructor("Image").to_string(),
            "Image_constructor_Callback"
        );
    }

    #[test]
    fn test_function_names() {
        assert_eq!(BindingName::callback("Canvas", "draw_1").function_name(), "draw_1_callback");
        assert_eq!(BindingName::setter("Canvas", "lineWidth").function_name(), "line_width_setter");
        assert_eq!(
            BindingName::index_getter("List").function_name(),
            "numeric_index_getter_callback"
        );
        assert_eq!(to_snake_case("innerHTML"), "inner_html");
    }

    #[test]
    fn test_same_name_different_arity() {
        let mut resolver = InterfaceResolver::new("List");
        resolver
            .insert(descriptor(BindingName::callback("List", "item"), Arity::Exact(1)))
            .unwrap();
        resolver
            .insert(descriptor(BindingName::callback("List", "item"), Arity::Exact(2)))
            .unwrap();

        assert_eq!(resolver.len(), 2);
        assert_eq!(
            resolver.resolve("List_item_Callback", 2).map(|d| d.arity),
            Some(Arity::Exact(2))
        );
        assert!(resolver.resolve("List_item_Callback", 3).is_none());
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut resolver = InterfaceResolver::new("Canvas");
        resolver
            .insert(descriptor(BindingName::callback("Canvas", "draw"), Arity::Exact(2)))
            .unwrap();
        let err = resolver
            .insert(descriptor(BindingName::callback("Canvas", "draw"), Arity::Exact(2)))
            .unwrap_err();
        assert!(matches!(err, StructuralError::DuplicateBinding { ref arity, .. } if arity == "2"));
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn test_any_arity_overlaps_everything() {
        let mut resolver = InterfaceResolver::new("Image");
        resolver
            .insert(descriptor(BindingName::constructor("Image"), Arity::Any))
            .unwrap();
        assert!(resolver.resolve("Image_constructor_Callback", 7).is_some());
        assert!(resolver
            .insert(descriptor(BindingName::constructor("Image"), Arity::Exact(1)))
            .is_err());
    }

    #[test]
    fn test_table_tries_interfaces_in_order() {
        let mut first = InterfaceResolver::new("A");
        first
            .insert(descriptor(BindingName::callback("A", "f"), Arity::Exact(1)))
            .unwrap();
        let mut second = InterfaceResolver::new("B");
        second
            .insert(descriptor(BindingName::callback("B", "g"), Arity::Exact(1)))
            .unwrap();

        let mut table = ResolverTable::new();
        table.push(first);
        let mut rest = ResolverTable::new();
        rest.push(second);
        table.merge(rest);

        assert_eq!(table.resolve("B_g_Callback", 1).map(|d| d.interface.as_str()), Some("B"));
        assert!(table.resolve("A_f_Callback", 0).is_none());
        assert_eq!(
            table.keys(),
            vec![
                ("A_f_Callback".to_string(), Arity::Exact(1)),
                ("B_g_Callback".to_string(), Arity::Exact(1)),
            ]
        );
    }
}
