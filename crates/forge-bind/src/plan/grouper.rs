//! Overload grouping
//!
//! Operations sharing a name form one overload group. A group either binds
//! directly (one callback at full arity) or is dispatched through a clause
//! chain; the decision is made here, once.

use crate::error::{Location, StructuralError};
use crate::ir::{ExtAttr, Interface, Operation};

/// Operations of one interface sharing a name, in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverloadGroup<'a> {
    pub interface: &'a str,
    pub name: &'a str,
    pub operations: Vec<&'a Operation>,
}

impl<'a> OverloadGroup<'a> {
    fn location(&self) -> Location {
        Location::member(self.interface, self.name)
    }

    /// Whether the group needs a dispatch clause chain
    ///
    /// True for true overloads and for signatures with optional parameters
    /// that count for arity.
    pub fn requires_dispatch(&self) -> bool {
        self.operations.len() > 1
            || self
                .operations
                .iter()
                .any(|op| !op.signature.optional_positions().is_empty())
    }

    pub fn is_static(&self) -> bool {
        self.operations.first().is_some_and(|op| op.is_static)
    }

    /// Overloads supplied externally
    ///
    /// A validated group is either entirely custom or not at all.
    pub fn is_custom(&self) -> bool {
        self.operations.first().is_some_and(|op| op.is_custom())
    }

    /// Largest parameter count across the group
    pub fn arity(&self) -> usize {
        self.operations
            .iter()
            .map(|op| op.signature.arity())
            .max()
            .unwrap_or(0)
    }

    /// Group-wide formal parameter names
    ///
    /// Every signature must use the same name at each position it declares.
    pub fn parameter_names(&self) -> Result<Vec<String>, StructuralError> {
        let mut names: Vec<String> = Vec::new();
        for op in &self.operations {
            for (position, param) in op.signature.parameters.iter().enumerate() {
                match names.get(position) {
                    Some(expected) if *expected != param.name => {
                        return Err(StructuralError::ParameterNameMismatch {
                            location: self.location(),
                            position,
                            expected: expected.clone(),
                            found: param.name.clone(),
                        });
                    }
                    Some(_) => {}
                    None => names.push(param.name.clone()),
                }
            }
        }
        Ok(names)
    }

    /// Check the group can be bound at all
    pub fn validate(&self) -> Result<(), StructuralError> {
        let is_static = self.is_static();
        if self.operations.iter().any(|op| op.is_static != is_static) {
            return Err(StructuralError::MixedStaticOverloads {
                location: self.location(),
            });
        }
        let is_custom = self.is_custom();
        if self.operations.iter().any(|op| op.is_custom() != is_custom) {
            return Err(StructuralError::MixedCustomOverloads {
                location: self.location(),
            });
        }
        self.parameter_names()?;
        Ok(())
    }
}

/// Group an interface's operations by name
///
/// Groups are ordered by the first declaration of each name; operations
/// flagged `CheckSecurity` are left out.
pub fn group_operations(interface: &Interface) -> Result<Vec<OverloadGroup<'_>>, StructuralError> {
    let mut groups: Vec<OverloadGroup<'_>> = Vec::new();
    for op in &interface.operations {
        if op.flags().contains(&ExtAttr::CheckSecurity) {
            continue;
        }
        match groups.iter_mut().find(|g| g.name == op.name) {
            Some(group) => group.operations.push(op),
            None => groups.push(OverloadGroup {
                interface: &interface.name,
                name: &op.name,
                operations: vec![op],
            }),
        }
    }

    for group in &groups {
        group.validate()?;
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Parameter, Signature};

    fn op(name: &str, params: &[(&str, bool)]) -> Operation {
        let sig = params.iter().fold(Signature::void(), |sig, (p, optional)| {
            let param = Parameter::new(*p, "double");
            sig.param(if *optional { param.optional() } else { param })
        });
        Operation::new(name, sig)
    }

    #[test]
    fn test_single_signature_binds_directly() {
        let iface = Interface::new("Canvas").operation(op("fill", &[("x", false)]));
        let groups = group_operations(&iface).unwrap();
        assert_eq!(groups.len(), 1);
        assert!(!groups[0].requires_dispatch());
    }

    #[test]
    fn test_optional_parameter_requires_dispatch() {
        let iface = Interface::new("File").operation(op("open", &[("mode", false), ("flags", true)]));
        let groups = group_operations(&iface).unwrap();
        assert!(groups[0].requires_dispatch());
    }

    #[test]
    fn test_optional_callback_does_not_count() {
        let iface = Interface::new("Image").operation(Operation::new(
            "decode",
            Signature::void().param(Parameter::new("done", "VoidCallback").optional().callback()),
        ));
        let groups = group_operations(&iface).unwrap();
        assert!(!groups[0].requires_dispatch());
    }

    #[test]
    fn test_groups_keep_declaration_order() {
        let iface = Interface::new("Canvas")
            .operation(op("draw", &[("x", false)]))
            .operation(op("clear", &[]))
            .operation(op("draw", &[("x", false), ("y", false)]));

        let groups = group_operations(&iface).unwrap();
        let names: Vec<_> = groups.iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["draw", "clear"]);
        assert_eq!(groups[0].operations.len(), 2);
        assert_eq!(groups[0].arity(), 2);
        assert_eq!(groups[0].parameter_names().unwrap(), vec!["x", "y"]);
        assert!(groups[0].requires_dispatch());
    }

    #[test]
    fn test_parameter_name_mismatch() {
        let iface = Interface::new("Canvas")
            .operation(op("draw", &[("x", false)]))
            .operation(op("draw", &[("left", false), ("y", false)]));
        let err = group_operations(&iface).unwrap_err();
        assert!(matches!(
            err,
            StructuralError::ParameterNameMismatch { position: 0, .. }
        ));
    }

    #[test]
    fn test_mixed_static_rejected() {
        let iface = Interface::new("Canvas")
            .operation(op("draw", &[("x", false)]))
            .operation(op("draw", &[("x", false), ("y", false)]).static_op());
        assert!(matches!(
            group_operations(&iface),
            Err(StructuralError::MixedStaticOverloads { .. })
        ));
    }

    #[test]
    fn test_mixed_custom_rejected() {
        let iface = Interface::new("Canvas")
            .operation(op("draw", &[("x", false)]))
            .operation(Operation::new(
                "draw",
                Signature::void()
                    .param(Parameter::new("x", "double"))
                    .param(Parameter::new("y", "double"))
                    .with_flag(ExtAttr::Custom),
            ));
        assert!(matches!(
            group_operations(&iface),
            Err(StructuralError::MixedCustomOverloads { ref location })
                if location.member.as_deref() == Some("draw")
        ));

        let all_custom = Interface::new("Canvas")
            .operation(Operation::new("blit", Signature::void().with_flag(ExtAttr::Custom)))
            .operation(Operation::new(
                "blit",
                Signature::void()
                    .param(Parameter::new("x", "double"))
                    .with_flag(ExtAttr::Custom),
            ));
        let groups = group_operations(&all_custom).unwrap();
        assert!(groups[0].is_custom());
    }

    #[test]
    fn test_check_security_skipped() {
        let iface = Interface::new("Window").operation(Operation::new(
            "postMessage",
            Signature::void().with_flag(ExtAttr::CheckSecurity),
        ));
        assert!(group_operations(&iface).unwrap().is_empty());
    }
}
