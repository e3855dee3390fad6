//! Native callback synthesis
//!
//! Builds the adapter body of one concrete callable as an ordered list of
//! [`AdapterStep`]s. The order is fixed:
//!
//! 1. conversion scope and scoped-resource acquisition
//! 2. feature-gate check
//! 3. receiver extraction (instance members only)
//! 4. argument marshalling
//! 5. native invocation
//! 6. return-value conversion (non-void only)
//!
//! A failing step ends the adapter; nothing after it runs. Members whose
//! implementation is supplied externally get [`AdapterBody::Custom`] and an
//! [`Auxiliary::CustomCallback`] declaration instead of steps.

use crate::error::{Location, StructuralError};
use crate::ir::{Attribute, CallWith, ExtAttr, FeatureGate, Interface, Operation, Parameter, TypeRegistry};
use crate::plan::binding::{to_snake_case, Arity, BindingName};
use crate::runtime::ScopedResource;
use std::collections::BTreeSet;

/// Message raised when script arguments cannot be captured
pub const SCRIPT_ARGUMENTS_FAILED: &str = "Failed to create script arguments";
/// Message raised when a constructor has no execution context
pub const CONSTRUCTOR_CONTEXT_FAILED: &str = "Failed to create an object";
/// Message raised when a named constructor has no caller identity
pub const CALLER_IDENTITY_FAILED: &str = "Failed to fetch caller identity";

/// What happens when a scoped resource is unavailable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OnUnavailable {
    /// Raise a resource-unavailable error with this message
    Raise(String),
    /// Return without a value and without raising
    ReturnVoid,
}

/// Native function being called
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Callee {
    /// `receiver.<function>(...)`
    Method(String),
    /// `<native_type>::<function>(...)`
    Associated { native_type: String, function: String },
    /// `<helper>::<function>(...)`, receiver passed as an argument
    Helper { helper: String, function: String },
}

impl Callee {
    pub fn function(&self) -> &str {
        match self {
            Callee::Method(function)
            | Callee::Associated { function, .. }
            | Callee::Helper { function, .. } => function,
        }
    }
}

/// One argument of the native call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallArgument {
    Receiver,
    /// Marshalled parameter, by name
    Parameter(String),
    Resource(ScopedResource),
    /// The runtime's user-gesture flag
    UserGesture,
    /// Content attribute name of a reflected attribute
    ContentAttribute(String),
}

/// The native call of an adapter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Invocation {
    pub callee: Callee,
    pub arguments: Vec<CallArgument>,
    /// An exception-code out-parameter is appended and checked
    pub raises_exception: bool,
    /// Return type name, `None` for void
    pub return_type: Option<String>,
}

/// One step of an adapter body
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AdapterStep {
    /// Open a conversion scope for the rest of the call
    EnterScope,
    Acquire {
        resource: ScopedResource,
        on_unavailable: OnUnavailable,
    },
    CheckFeature(FeatureGate),
    ExtractReceiver { native_type: String },
    Marshal {
        /// Native argument index
        index: usize,
        name: String,
        type_name: String,
        fallible: bool,
    },
    Invoke(Invocation),
    ConvertReturn { type_name: String },
}

impl AdapterStep {
    /// Whether the step can end the adapter with an error
    pub fn can_raise(&self) -> bool {
        match self {
            AdapterStep::EnterScope | AdapterStep::ConvertReturn { .. } => false,
            AdapterStep::Acquire { on_unavailable, .. } => {
                matches!(on_unavailable, OnUnavailable::Raise(_))
            }
            AdapterStep::CheckFeature(_) | AdapterStep::ExtractReceiver { .. } => true,
            AdapterStep::Marshal { fallible, .. } => *fallible,
            AdapterStep::Invoke(invocation) => invocation.raises_exception,
        }
    }
}

/// Adapter body of a callback
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AdapterBody {
    Steps(Vec<AdapterStep>),
    /// Implementation supplied externally
    Custom,
}

impl AdapterBody {
    pub fn steps(&self) -> &[AdapterStep] {
        match self {
            AdapterBody::Steps(steps) => steps,
            AdapterBody::Custom => &[],
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, AdapterBody::Custom)
    }

    /// Whether the adapter has an error path
    pub fn raises(&self) -> bool {
        self.steps().iter().any(AdapterStep::can_raise)
    }

    pub fn invocation(&self) -> Option<&Invocation> {
        self.steps().iter().find_map(|step| match step {
            AdapterStep::Invoke(invocation) => Some(invocation),
            _ => None,
        })
    }
}

/// A bound native callback
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallbackDescriptor {
    pub binding: BindingName,
    /// Native argument count (receiver included)
    pub arity: Arity,
    /// Declared parameters the adapter marshals
    pub parameter_count: usize,
    pub interface: String,
    pub needs_receiver: bool,
    pub body: AdapterBody,
}

impl CallbackDescriptor {
    /// Rust function implementing the callback
    pub fn function_name(&self) -> String {
        self.binding.function_name()
    }
}

/// Declaration an interface's adapter module needs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Auxiliary {
    /// `use <path>;`
    Import(String),
    /// Re-export of an externally supplied callback
    CustomCallback(String),
}

/// Synthesis output: the descriptor plus the declarations it requires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesized {
    pub descriptor: CallbackDescriptor,
    pub auxiliary: BTreeSet<Auxiliary>,
}

/// Inputs shared by every synthesis of one interface
#[derive(Clone, Copy)]
pub struct SynthesisContext<'a> {
    pub interface: &'a Interface,
    pub registry: &'a dyn TypeRegistry,
}

/// Reserve a binding whose implementation is supplied externally
pub fn synthesize_custom(
    binding: BindingName,
    arity: Arity,
    parameter_count: usize,
    needs_receiver: bool,
) -> Synthesized {
    let function = binding.function_name();
    Synthesized {
        descriptor: CallbackDescriptor {
            interface: binding.interface.clone(),
            binding,
            arity,
            parameter_count,
            needs_receiver,
            body: AdapterBody::Custom,
        },
        auxiliary: BTreeSet::from([Auxiliary::CustomCallback(function)]),
    }
}

/// Accumulates steps and call arguments for one adapter
struct AdapterBuilder<'a> {
    ctx: SynthesisContext<'a>,
    location: Location,
    steps: Vec<AdapterStep>,
    arguments: Vec<CallArgument>,
    auxiliary: BTreeSet<Auxiliary>,
}

impl<'a> AdapterBuilder<'a> {
    fn new(ctx: SynthesisContext<'a>, location: Location) -> Self {
        Self {
            ctx,
            location,
            steps: Vec::new(),
            arguments: Vec::new(),
            auxiliary: BTreeSet::new(),
        }
    }

    fn scope_if(&mut self, needed: bool) {
        if needed {
            self.steps.push(AdapterStep::EnterScope);
        }
    }

    fn acquire(&mut self, resource: ScopedResource, on_unavailable: OnUnavailable) {
        self.steps.push(AdapterStep::Acquire {
            resource,
            on_unavailable,
        });
        self.arguments.push(CallArgument::Resource(resource));
    }

    /// Resource handling for `CallWith` on members
    fn member_call_with(&mut self, call_with: Option<CallWith>) {
        match call_with {
            Some(CallWith::ExecutionContext) => {
                self.acquire(ScopedResource::ExecutionContext, OnUnavailable::ReturnVoid)
            }
            Some(CallWith::CallStack) => {
                self.acquire(
                    ScopedResource::ScriptArguments,
                    OnUnavailable::Raise(SCRIPT_ARGUMENTS_FAILED.to_string()),
                );
                self.acquire(ScopedResource::CallStack, OnUnavailable::ReturnVoid);
            }
            None => {}
        }
    }

    fn feature_gate(&mut self, gate: Option<FeatureGate>) {
        if let Some(gate) = gate {
            self.steps.push(AdapterStep::CheckFeature(gate));
        }
    }

    fn receiver(&mut self) {
        self.steps.push(AdapterStep::ExtractReceiver {
            native_type: self.ctx.interface.native_type().to_string(),
        });
    }

    fn include_type(&mut self, type_name: &str) {
        self.auxiliary.extend(
            self.ctx
                .registry
                .auxiliary_includes(type_name)
                .into_iter()
                .map(Auxiliary::Import),
        );
    }

    fn marshal(&mut self, index: usize, name: &str, type_name: &str) -> Result<(), StructuralError> {
        let info = self.ctx.registry.lookup(type_name, &self.location)?;
        info.native_type(type_name)?;
        let fallible = info.is_fallible();
        self.include_type(type_name);
        self.steps.push(AdapterStep::Marshal {
            index,
            name: name.to_string(),
            type_name: type_name.to_string(),
            fallible,
        });
        self.arguments.push(CallArgument::Parameter(name.to_string()));
        Ok(())
    }

    fn marshal_all(&mut self, first: usize, params: &[Parameter]) -> Result<(), StructuralError> {
        for (i, param) in params.iter().enumerate() {
            self.marshal(first + i, &param.name, &param.type_name)?;
        }
        Ok(())
    }

    /// Insert the receiver for `ImplementedBy` helpers
    fn receiver_argument(&mut self, call_with: Option<CallWith>) {
        let index = match call_with {
            Some(CallWith::ExecutionContext) => 1,
            _ => 0,
        };
        self.arguments.insert(index.min(self.arguments.len()), CallArgument::Receiver);
    }

    fn return_type(&mut self, type_name: &str) -> Result<Option<String>, StructuralError> {
        let info = self.ctx.registry.lookup(type_name, &self.location)?;
        if info.is_void() {
            return Ok(None);
        }
        info.native_type(type_name)?;
        self.include_type(type_name);
        Ok(Some(type_name.to_string()))
    }

    fn finish(
        mut self,
        callee: Callee,
        raises_exception: bool,
        return_type: Option<String>,
    ) -> (Vec<AdapterStep>, BTreeSet<Auxiliary>) {
        self.steps.push(AdapterStep::Invoke(Invocation {
            callee,
            arguments: self.arguments,
            raises_exception,
            return_type: return_type.clone(),
        }));
        if let Some(type_name) = return_type {
            self.steps.push(AdapterStep::ConvertReturn { type_name });
        }
        (self.steps, self.auxiliary)
    }
}

/// Synthesize the adapter for `op` truncated to `arity` parameters
pub fn synthesize_operation(
    ctx: SynthesisContext<'_>,
    op: &Operation,
    arity: usize,
    binding: BindingName,
) -> Result<Synthesized, StructuralError> {
    let signature = &op.signature;
    let flags = &signature.flags;
    let params = signature.truncated(arity);
    let first = usize::from(!op.is_static);
    let call_with = flags.call_with();
    let variadic = call_with == Some(CallWith::CallStack);
    let key = if variadic {
        Arity::Any
    } else {
        Arity::Exact(first + params.len())
    };

    if op.is_custom() {
        return Ok(synthesize_custom(binding, key, params.len(), !op.is_static));
    }

    let mut adapter = AdapterBuilder::new(ctx, Location::member(&ctx.interface.name, &op.name));
    adapter.scope_if(
        variadic
            || params
                .iter()
                .any(|p| ctx.registry.requires_scoped_resource(&p.type_name)),
    );
    adapter.member_call_with(call_with);
    adapter.feature_gate(flags.feature_gate());
    if !op.is_static {
        adapter.receiver();
    }
    adapter.marshal_all(first, params)?;
    if flags.contains(&ExtAttr::NeedsUserGesture) {
        adapter.arguments.push(CallArgument::UserGesture);
    }

    let function = to_snake_case(flags.implemented_as().unwrap_or(&op.name));
    let callee = match flags.implemented_by() {
        Some(helper) => {
            if !op.is_static {
                adapter.receiver_argument(call_with);
            }
            Callee::Helper {
                helper: helper.to_string(),
                function,
            }
        }
        None if op.is_static => Callee::Associated {
            native_type: ctx.interface.native_type().to_string(),
            function,
        },
        None => Callee::Method(function),
    };
    let return_type = adapter.return_type(&signature.return_type)?;
    let (steps, auxiliary) = adapter.finish(callee, signature.raises_exception, return_type);

    Ok(Synthesized {
        descriptor: CallbackDescriptor {
            interface: ctx.interface.name.clone(),
            binding,
            arity: key,
            parameter_count: params.len(),
            needs_receiver: !op.is_static,
            body: AdapterBody::Steps(steps),
        },
        auxiliary,
    })
}

fn reflected_name(attr: &Attribute, rename: Option<&str>) -> String {
    rename
        .map(str::to_string)
        .unwrap_or_else(|| attr.name.to_ascii_lowercase())
}

/// Synthesize an attribute getter
pub fn synthesize_getter(
    ctx: SynthesisContext<'_>,
    attr: &Attribute,
) -> Result<Synthesized, StructuralError> {
    let binding = BindingName::getter(&ctx.interface.name, &attr.name);
    if attr.has_custom_getter() {
        return Ok(synthesize_custom(binding, Arity::Exact(1), 0, true));
    }

    let location = Location::member(&ctx.interface.name, &attr.name);
    let call_with = attr.flags.call_with();
    let mut adapter = AdapterBuilder::new(ctx, location.clone());
    adapter.scope_if(call_with == Some(CallWith::CallStack));
    adapter.member_call_with(call_with);
    adapter.feature_gate(attr.flags.feature_gate());
    adapter.receiver();

    let callee = if let Some(rename) = attr.flags.reflect() {
        let getter = ctx
            .registry
            .lookup(&attr.type_name, &location)?
            .reflect_getter
            .clone()
            .ok_or_else(|| StructuralError::NotReflectable {
                location: location.clone(),
                type_name: attr.type_name.clone(),
            })?;
        adapter
            .arguments
            .push(CallArgument::ContentAttribute(reflected_name(attr, rename)));
        Callee::Method(getter)
    } else if let Some(helper) = attr.flags.implemented_by() {
        adapter.receiver_argument(call_with);
        Callee::Helper {
            helper: helper.to_string(),
            function: to_snake_case(&attr.name),
        }
    } else {
        Callee::Method(to_snake_case(&attr.name))
    };

    let return_type = adapter.return_type(&attr.type_name)?;
    let (steps, auxiliary) = adapter.finish(callee, attr.raises_on_get, return_type);

    Ok(Synthesized {
        descriptor: CallbackDescriptor {
            interface: ctx.interface.name.clone(),
            binding,
            arity: Arity::Exact(1),
            parameter_count: 0,
            needs_receiver: true,
            body: AdapterBody::Steps(steps),
        },
        auxiliary,
    })
}

/// Synthesize an attribute setter
pub fn synthesize_setter(
    ctx: SynthesisContext<'_>,
    attr: &Attribute,
) -> Result<Synthesized, StructuralError> {
    let binding = BindingName::setter(&ctx.interface.name, &attr.name);
    if attr.has_custom_setter() {
        return Ok(synthesize_custom(binding, Arity::Exact(2), 1, true));
    }

    let location = Location::member(&ctx.interface.name, &attr.name);
    let call_with = attr.flags.call_with();
    let mut adapter = AdapterBuilder::new(ctx, location.clone());
    adapter.scope_if(
        call_with == Some(CallWith::CallStack)
            || ctx.registry.requires_scoped_resource(&attr.type_name),
    );
    adapter.member_call_with(call_with);
    adapter.feature_gate(attr.flags.feature_gate());
    adapter.receiver();

    let callee = if let Some(rename) = attr.flags.reflect() {
        let setter = ctx
            .registry
            .lookup(&attr.type_name, &location)?
            .reflect_setter
            .clone()
            .ok_or_else(|| StructuralError::NotReflectable {
                location: location.clone(),
                type_name: attr.type_name.clone(),
            })?;
        adapter
            .arguments
            .push(CallArgument::ContentAttribute(reflected_name(attr, rename)));
        adapter.marshal(1, "value", &attr.type_name)?;
        Callee::Method(setter)
    } else {
        adapter.marshal(1, "value", &attr.type_name)?;
        let function = format!("set_{}", to_snake_case(&attr.name));
        match attr.flags.implemented_by() {
            Some(helper) => {
                adapter.receiver_argument(call_with);
                Callee::Helper {
                    helper: helper.to_string(),
                    function,
                }
            }
            None => Callee::Method(function),
        }
    };

    let (steps, auxiliary) = adapter.finish(callee, false, None);

    Ok(Synthesized {
        descriptor: CallbackDescriptor {
            interface: ctx.interface.name.clone(),
            binding,
            arity: Arity::Exact(2),
            parameter_count: 1,
            needs_receiver: true,
            body: AdapterBody::Steps(steps),
        },
        auxiliary,
    })
}

/// Synthesize the interface constructor
pub fn synthesize_constructor(ctx: SynthesisContext<'_>) -> Result<Synthesized, StructuralError> {
    let interface = ctx.interface;
    let binding = BindingName::constructor(&interface.name);
    let params = &interface.constructor_parameters;
    if interface.flags.contains(&ExtAttr::CustomConstructor) {
        return Ok(synthesize_custom(binding, Arity::Any, params.len(), false));
    }

    let location = Location::member(&interface.name, "constructor");
    let mut adapter = AdapterBuilder::new(ctx, location.clone());
    adapter.scope_if(
        params
            .iter()
            .any(|p| ctx.registry.requires_scoped_resource(&p.type_name)),
    );

    let named = interface.flags.contains(&ExtAttr::NamedConstructor);
    if named {
        adapter.acquire(
            ScopedResource::CallerIdentity,
            OnUnavailable::Raise(CALLER_IDENTITY_FAILED.to_string()),
        );
    }
    match interface.flags.call_with() {
        Some(CallWith::ExecutionContext) => adapter.acquire(
            ScopedResource::ExecutionContext,
            OnUnavailable::Raise(CONSTRUCTOR_CONTEXT_FAILED.to_string()),
        ),
        Some(CallWith::CallStack) => {
            return Err(StructuralError::InvalidFlagValue {
                location,
                flag: "CallWith".to_string(),
                value: Some("CallStack".to_string()),
            })
        }
        None => {}
    }
    adapter.feature_gate(interface.flags.feature_gate());
    adapter.marshal_all(0, params)?;

    let callee = Callee::Associated {
        native_type: interface.native_type().to_string(),
        function: if named {
            "create_for_named_constructor".to_string()
        } else {
            "create".to_string()
        },
    };
    let raises = interface.flags.contains(&ExtAttr::ConstructorRaisesException);
    let (steps, auxiliary) = adapter.finish(callee, raises, Some(interface.name.clone()));

    Ok(Synthesized {
        descriptor: CallbackDescriptor {
            interface: interface.name.clone(),
            binding,
            arity: Arity::Any,
            parameter_count: params.len(),
            needs_receiver: false,
            body: AdapterBody::Steps(steps),
        },
        auxiliary,
    })
}
