//! Binding planning
//!
//! Runs the generation pipeline for each interface:
//!
//! ```text
//! overload grouper -> dispatch planner (when required) -> callback synthesizer
//!                                                      -> resolver table
//! ```
//!
//! Every stage returns plain values. Nothing is emitted here; the codegen
//! module renders the result.

pub mod binding;
pub mod callback;
pub mod dispatch;
pub mod grouper;

pub use binding::*;
pub use callback::*;
pub use dispatch::*;
pub use grouper::*;

use crate::error::{Location, StructuralError};
use crate::ir::{
    Attribute, CallWith, Description, ExtAttr, Interface, Operation, Parameter, TypeRegistry,
};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Surface binding of an operation group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationBinding {
    /// One callback at full arity
    Direct {
        member: String,
        binding: BindingName,
        parameters: Vec<Parameter>,
        return_type: String,
        is_static: bool,
        variadic: bool,
    },
    /// Clause chain over several callbacks
    Dispatched(DispatchPlan),
}

impl OperationBinding {
    pub fn member(&self) -> &str {
        match self {
            OperationBinding::Direct { member, .. } => member,
            OperationBinding::Dispatched(plan) => &plan.member,
        }
    }
}

/// Surface binding of an attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeBinding {
    pub name: String,
    pub type_name: String,
    pub getter: BindingName,
    /// `None` for read-only attributes
    pub setter: Option<BindingName>,
}

/// Surface binding of a constructor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorBinding {
    pub binding: BindingName,
    pub parameters: Vec<Parameter>,
}

/// Everything generated for one interface
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceBindings {
    pub interface: String,
    /// Interface whose implementation class this one extends
    pub parent_class: Option<String>,
    pub is_event_target: bool,
    pub is_active: bool,
    pub constructor: Option<ConstructorBinding>,
    pub attributes: Vec<AttributeBinding>,
    pub operations: Vec<OperationBinding>,
    pub index_getter: Option<BindingName>,
    pub index_setter: Option<BindingName>,
    pub resolver: InterfaceResolver,
    pub auxiliary: BTreeSet<Auxiliary>,
}

impl InterfaceBindings {
    /// Descriptors in resolver order
    pub fn descriptors(&self) -> impl Iterator<Item = &CallbackDescriptor> {
        self.resolver.descriptors()
    }
}

/// Output of one generation run
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedBindings {
    /// Interfaces in declaration order
    pub interfaces: Vec<InterfaceBindings>,
    /// Interface names with parents before children
    pub class_order: Vec<String>,
}

impl GeneratedBindings {
    pub fn find(&self, interface: &str) -> Option<&InterfaceBindings> {
        self.interfaces.iter().find(|b| b.interface == interface)
    }

    /// Bindings in class order
    pub fn in_class_order(&self) -> impl Iterator<Item = &InterfaceBindings> {
        self.class_order.iter().filter_map(|name| self.find(name))
    }

    /// Global resolver over every interface, in declaration order
    pub fn resolver_table(&self) -> ResolverTable {
        let mut table = ResolverTable::new();
        for interface in &self.interfaces {
            table.push(interface.resolver.clone());
        }
        table
    }

    /// Total number of callbacks
    pub fn callback_count(&self) -> usize {
        self.interfaces.iter().map(|i| i.resolver.len()).sum()
    }
}

struct InterfacePlanner<'a> {
    ctx: SynthesisContext<'a>,
    resolver: InterfaceResolver,
    auxiliary: BTreeSet<Auxiliary>,
}

impl InterfacePlanner<'_> {
    fn register(&mut self, synthesized: Synthesized) -> Result<(), StructuralError> {
        self.auxiliary.extend(synthesized.auxiliary);
        self.resolver.insert(synthesized.descriptor)
    }

    fn attribute(&mut self, attr: &Attribute) -> Result<AttributeBinding, StructuralError> {
        let getter = synthesize_getter(self.ctx, attr)?;
        let getter_binding = getter.descriptor.binding.clone();
        self.register(getter)?;

        let setter_binding = if attr.readonly {
            None
        } else {
            let setter = synthesize_setter(self.ctx, attr)?;
            let binding = setter.descriptor.binding.clone();
            self.register(setter)?;
            Some(binding)
        };

        Ok(AttributeBinding {
            name: attr.name.clone(),
            type_name: attr.type_name.clone(),
            getter: getter_binding,
            setter: setter_binding,
        })
    }

    fn group(&mut self, group: &OverloadGroup<'_>) -> Result<OperationBinding, StructuralError> {
        let ctx = self.ctx;
        let interface = &ctx.interface.name;

        if group.is_custom() || !group.requires_dispatch() {
            let binding = BindingName::callback(interface, group.name);
            let first = group.operations[0];
            let arity = group.arity();
            let synthesized = if group.is_custom() {
                let key = if group.operations.iter().copied().any(is_variadic) {
                    Arity::Any
                } else {
                    Arity::Exact(usize::from(!group.is_static()) + arity)
                };
                synthesize_custom(binding.clone(), key, arity, !group.is_static())
            } else {
                synthesize_operation(ctx, first, arity, binding.clone())?
            };
            self.register(synthesized)?;

            let parameters = group
                .operations
                .iter()
                .max_by_key(|op| op.signature.arity())
                .map(|op| op.signature.parameters.clone())
                .unwrap_or_default();
            debug!(interface = %interface, member = group.name, "bound directly");
            return Ok(OperationBinding::Direct {
                member: group.name.to_string(),
                binding,
                parameters,
                return_type: first.signature.return_type.clone(),
                is_static: group.is_static(),
                variadic: group.operations.iter().copied().any(is_variadic),
            });
        }

        let plan = plan_dispatch(group, ctx.registry)?;
        for target in plan.targets() {
            let op = group.operations[target.operation];
            let synthesized =
                synthesize_operation(ctx, op, target.arity, target.binding.clone())?;
            self.register(synthesized)?;
        }
        debug!(
            interface = %interface,
            member = group.name,
            clauses = plan.clauses.len(),
            "planned dispatch"
        );
        Ok(OperationBinding::Dispatched(plan))
    }
}

fn is_variadic(op: &Operation) -> bool {
    op.flags().call_with() == Some(CallWith::CallStack)
}

/// Generate the bindings of one interface
///
/// Resolver entries are registered constructor first, then index accessors,
/// attributes and operations, each in declaration order.
pub fn generate_interface(
    description: &Description,
    interface: &Interface,
    registry: &dyn TypeRegistry,
) -> Result<InterfaceBindings, StructuralError> {
    let mut planner = InterfacePlanner {
        ctx: SynthesisContext {
            interface,
            registry,
        },
        resolver: InterfaceResolver::new(&interface.name),
        auxiliary: BTreeSet::new(),
    };

    let constructor = if interface.has_constructor() {
        let synthesized = synthesize_constructor(planner.ctx)?;
        let binding = synthesized.descriptor.binding.clone();
        planner.register(synthesized)?;
        Some(ConstructorBinding {
            binding,
            parameters: interface.constructor_parameters.clone(),
        })
    } else {
        None
    };

    let index_getter = if interface.has_index_getter() {
        let binding = BindingName::index_getter(&interface.name);
        planner.register(synthesize_custom(binding.clone(), Arity::Exact(2), 1, true))?;
        Some(binding)
    } else {
        None
    };
    let index_setter = if interface.has_index_setter() {
        let binding = BindingName::index_setter(&interface.name);
        planner.register(synthesize_custom(binding.clone(), Arity::Exact(3), 2, true))?;
        Some(binding)
    } else {
        None
    };

    let mut attributes = Vec::new();
    for attr in &interface.attributes {
        if attr.flags.contains(&ExtAttr::CheckSecurity) {
            continue;
        }
        attributes.push(planner.attribute(attr)?);
    }

    let mut operations = Vec::new();
    for group in group_operations(interface)? {
        operations.push(planner.group(&group)?);
    }
    check_function_names(&planner.resolver)?;

    debug!(
        interface = %interface.name,
        callbacks = planner.resolver.len(),
        "generated interface"
    );

    Ok(InterfaceBindings {
        interface: interface.name.clone(),
        parent_class: description
            .implementation_parent(interface)
            .map(|parent| parent.name.clone()),
        is_event_target: description.inherits_flag(&interface.name, &ExtAttr::EventTarget),
        is_active: description.inherits_flag(&interface.name, &ExtAttr::ActiveObject),
        constructor,
        attributes,
        operations,
        index_getter,
        index_setter,
        resolver: planner.resolver,
        auxiliary: planner.auxiliary,
    })
}

/// Reject callbacks that map to one Rust function name
///
/// `draw_1` next to an overloaded `draw`, or `drawText` next to `draw_text`,
/// would otherwise emit the same `fn` twice.
fn check_function_names(resolver: &InterfaceResolver) -> Result<(), StructuralError> {
    let mut seen: HashMap<String, String> = HashMap::new();
    for descriptor in resolver.descriptors() {
        let key = format!("{} ({})", descriptor.binding, descriptor.arity);
        let function = descriptor.function_name();
        if let Some(first) = seen.insert(function.clone(), key.clone()) {
            return Err(StructuralError::FunctionNameClash {
                location: Location::member(resolver.interface(), &descriptor.binding.identifier),
                function,
                first,
                second: key,
            });
        }
    }
    Ok(())
}

/// Generate the bindings of every interface
///
/// Fails on the first structural error; no partial result is returned.
pub fn generate(
    description: &Description,
    registry: &dyn TypeRegistry,
) -> Result<GeneratedBindings, StructuralError> {
    let interfaces = description
        .interfaces
        .iter()
        .map(|interface| generate_interface(description, interface, registry))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(GeneratedBindings {
        interfaces,
        class_order: description
            .hierarchy_order()
            .into_iter()
            .map(|interface| interface.name.clone())
            .collect(),
    })
}
