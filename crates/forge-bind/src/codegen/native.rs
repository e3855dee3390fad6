//! Rust native adapter generator
//!
//! Renders every synthesized adapter body as a Rust function. Each interface
//! becomes one module in `native.rs`:
//!
//! ```ignore
//! pub mod canvas {
//!     use super::*;
//!     use forge_bind::runtime as rt;
//!
//!     pub const IS_EVENT_TARGET: bool = false;
//!     pub const IS_ACTIVE: bool = false;
//!
//!     pub fn draw_1_callback(args: &mut dyn rt::NativeArguments) {
//!         if let Err(error) = draw_1_callback_body(args) {
//!             args.throw(error);
//!         }
//!     }
//!     // ...
//! }
//! ```
//!
//! Adapters that can fail are split into a `Result`-returning body and an
//! outer function that raises the error exactly once.

use super::CodegenOptions;
use crate::error::{Location, StructuralError};
use crate::ir::{FeatureGate, TypeRegistry};
use crate::plan::{
    to_snake_case, AdapterBody, AdapterStep, Auxiliary, CallArgument, Callee, CallbackDescriptor,
    GeneratedBindings, InterfaceBindings, Invocation, OnUnavailable,
};
use crate::runtime::ScopedResource;
use proc_macro2::{Ident, Literal, Span, TokenStream};
use quote::{format_ident, quote};
use std::collections::HashMap;

/// Locals generated adapters declare themselves
const RESERVED_LOCALS: &[&str] = &[
    "args",
    "this",
    "execution_context",
    "caller_identity",
    "script_arguments",
    "call_stack",
    "user_gesture",
    "exception_code",
    "result",
    "value",
    "rt",
];

/// Emit `name` as a Rust identifier, raw when it is a keyword
pub(crate) fn rust_ident(name: &str, location: &Location) -> Result<Ident, StructuralError> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
        && name.chars().all(|c| c == '_' || c.is_ascii_alphanumeric());
    if !valid || name == "_" {
        return Err(StructuralError::InvalidIdentifier {
            location: location.clone(),
            name: name.to_string(),
        });
    }
    if matches!(name, "self" | "Self" | "super" | "crate") {
        return Ok(format_ident!("{}_", name));
    }
    if syn::parse_str::<Ident>(name).is_ok() {
        Ok(Ident::new(name, Span::call_site()))
    } else {
        Ok(Ident::new_raw(name, Span::call_site()))
    }
}

/// Parse a Rust path from configuration or flags
pub(crate) fn rust_path(path: &str, location: &Location) -> Result<syn::Path, StructuralError> {
    syn::parse_str::<syn::Path>(path).map_err(|_| StructuralError::InvalidIdentifier {
        location: location.clone(),
        name: path.to_string(),
    })
}

fn rust_type(native: &str, location: &Location) -> Result<syn::Type, StructuralError> {
    syn::parse_str::<syn::Type>(native).map_err(|e| StructuralError::InvalidNativeType {
        type_name: location.to_string(),
        native: native.to_string(),
        reason: e.to_string(),
    })
}

/// Module name of an interface in `native.rs`
pub fn module_name(interface: &str) -> String {
    to_snake_case(interface)
}

/// Generator for `native.rs`
pub struct NativeGenerator<'a> {
    bindings: &'a GeneratedBindings,
    registry: &'a dyn TypeRegistry,
    options: &'a CodegenOptions,
}

impl<'a> NativeGenerator<'a> {
    /// Create a new native generator
    pub fn new(
        bindings: &'a GeneratedBindings,
        registry: &'a dyn TypeRegistry,
        options: &'a CodegenOptions,
    ) -> Self {
        Self {
            bindings,
            registry,
            options,
        }
    }

    /// Generate the complete `native.rs` source
    pub fn generate(&self) -> Result<String, StructuralError> {
        let mut output = String::from("// Generated by forge-bind - do not edit manually\n\n");
        for interface in &self.bindings.interfaces {
            output.push_str(&self.generate_module(interface)?.to_string());
            output.push_str("\n\n");
        }
        Ok(output)
    }

    /// Generate the adapter module of one interface
    pub fn generate_module(&self, interface: &InterfaceBindings) -> Result<TokenStream, StructuralError> {
        let location = Location::interface(&interface.interface);
        let module = rust_ident(&module_name(&interface.interface), &location)?;
        let runtime = rust_path(&self.options.runtime_path, &location)?;

        let mut imports = Vec::new();
        let mut customs = Vec::new();
        for auxiliary in &interface.auxiliary {
            match auxiliary {
                Auxiliary::Import(path) => {
                    let path = rust_path(path, &location)?;
                    imports.push(quote! { use #path; });
                }
                Auxiliary::CustomCallback(function) => customs.push(rust_ident(function, &location)?),
            }
        }
        let custom_use = if customs.is_empty() {
            TokenStream::new()
        } else {
            let custom = rust_path(&self.options.custom_path, &location)?;
            quote! { pub use #custom::#module::{#(#customs),*}; }
        };

        let mut functions = Vec::new();
        for descriptor in interface.descriptors() {
            if let AdapterBody::Steps(steps) = &descriptor.body {
                functions.push(self.adapter(descriptor, steps)?);
            }
        }

        let is_event_target = interface.is_event_target;
        let is_active = interface.is_active;
        Ok(quote! {
            #[allow(unused_imports, unused_variables, clippy::all)]
            pub mod #module {
                use super::*;
                use #runtime as rt;
                #(#imports)*
                #custom_use

                pub const IS_EVENT_TARGET: bool = #is_event_target;
                pub const IS_ACTIVE: bool = #is_active;

                #(#functions)*
            }
        })
    }

    fn adapter(
        &self,
        descriptor: &CallbackDescriptor,
        steps: &[AdapterStep],
    ) -> Result<TokenStream, StructuralError> {
        let location = Location::member(&descriptor.interface, &descriptor.binding.identifier);
        let function = descriptor.function_name();
        let name = rust_ident(&function, &location)?;
        let raises = steps.iter().any(AdapterStep::can_raise);

        let mut emitter = StepEmitter {
            registry: self.registry,
            location,
            raises,
            first_rest: usize::from(descriptor.needs_receiver) + descriptor.parameter_count,
            locals: HashMap::new(),
        };
        let body = steps
            .iter()
            .map(|step| emitter.step(step))
            .collect::<Result<Vec<_>, _>>()?;

        if raises {
            let body_name = format_ident!("{}_body", function);
            Ok(quote! {
                pub fn #name(args: &mut dyn rt::NativeArguments) {
                    if let Err(error) = #body_name(args) {
                        args.throw(error);
                    }
                }

                fn #body_name(args: &mut dyn rt::NativeArguments) -> Result<(), rt::BindingError> {
                    #(#body)*
                    Ok(())
                }
            })
        } else {
            Ok(quote! {
                pub fn #name(args: &mut dyn rt::NativeArguments) {
                    #(#body)*
                }
            })
        }
    }
}

struct StepEmitter<'a> {
    registry: &'a dyn TypeRegistry,
    location: Location,
    raises: bool,
    first_rest: usize,
    /// Parameter name to local variable
    locals: HashMap<String, Ident>,
}

impl StepEmitter<'_> {
    fn bail(&self, error: Option<TokenStream>) -> TokenStream {
        match (error, self.raises) {
            (Some(error), _) => quote! { return Err(#error); },
            (None, true) => quote! { return Ok(()); },
            (None, false) => quote! { return; },
        }
    }

    fn on_unavailable(&self, on_unavailable: &OnUnavailable) -> TokenStream {
        match on_unavailable {
            OnUnavailable::Raise(message) => {
                self.bail(Some(quote! { rt::BindingError::resource_unavailable(#message) }))
            }
            OnUnavailable::ReturnVoid => self.bail(None),
        }
    }

    fn local(&mut self, name: &str) -> Result<Ident, StructuralError> {
        if let Some(ident) = self.locals.get(name) {
            return Ok(ident.clone());
        }
        let mut snake = to_snake_case(name);
        if RESERVED_LOCALS.contains(&snake.as_str()) {
            snake.push('_');
        }
        let ident = rust_ident(&snake, &self.location)?;
        self.locals.insert(name.to_string(), ident.clone());
        Ok(ident)
    }

    fn step(&mut self, step: &AdapterStep) -> Result<TokenStream, StructuralError> {
        Ok(match step {
            AdapterStep::EnterScope => quote! { let _scope = args.enter_scope(); },
            AdapterStep::Acquire {
                resource,
                on_unavailable,
            } => {
                let otherwise = self.on_unavailable(on_unavailable);
                match resource {
                    ScopedResource::ExecutionContext => quote! {
                        let Some(execution_context) = args.execution_context() else { #otherwise };
                    },
                    ScopedResource::CallerIdentity => quote! {
                        let Some(caller_identity) = args.caller_identity() else { #otherwise };
                    },
                    ScopedResource::ScriptArguments => {
                        let first = Literal::usize_unsuffixed(self.first_rest);
                        quote! {
                            let Some(script_arguments) = args.script_arguments(#first) else { #otherwise };
                        }
                    }
                    ScopedResource::CallStack => quote! {
                        let call_stack = args.call_stack();
                        if call_stack.is_empty() { #otherwise }
                    },
                }
            }
            AdapterStep::CheckFeature(gate) => {
                let feature = gate.feature();
                let check = match gate {
                    FeatureGate::Runtime(_) => quote! { args.runtime_feature_enabled(#feature) },
                    FeatureGate::PerContext(_) => quote! { args.context_feature_enabled(#feature) },
                };
                let otherwise = self.bail(Some(quote! { rt::BindingError::feature_disabled(#feature) }));
                quote! {
                    if !#check { #otherwise }
                }
            }
            AdapterStep::ExtractReceiver { native_type } => {
                let ty = rust_type(native_type, &self.location)?;
                quote! { let this = rt::receiver::<#ty>(&*args)?; }
            }
            AdapterStep::Marshal {
                index,
                name,
                type_name,
                ..
            } => {
                let local = self.local(name)?;
                let index = Literal::usize_unsuffixed(*index);
                let runtime: syn::Path = syn::parse_quote!(rt);
                let conversion = self.registry.conversion_expression(
                    type_name,
                    quote! { args.argument(#index) },
                    &runtime,
                    &self.location,
                )?;
                quote! { let #local = #conversion; }
            }
            AdapterStep::Invoke(invocation) => self.invoke(invocation)?,
            AdapterStep::ConvertReturn { .. } => {
                let runtime: syn::Path = syn::parse_quote!(rt);
                let value = self.registry.return_expression(quote! { result }, &runtime);
                quote! {
                    let value = #value;
                    args.set_return_value(value);
                }
            }
        })
    }

    fn invoke(&mut self, invocation: &Invocation) -> Result<TokenStream, StructuralError> {
        let mut prelude = TokenStream::new();
        let mut arguments = Vec::new();
        for argument in &invocation.arguments {
            arguments.push(match argument {
                CallArgument::Receiver => quote! { this },
                CallArgument::Parameter(name) => {
                    let local = self.local(name)?;
                    quote! { #local }
                }
                CallArgument::Resource(ScopedResource::ExecutionContext) => {
                    quote! { &execution_context }
                }
                CallArgument::Resource(ScopedResource::CallerIdentity) => quote! { &caller_identity },
                CallArgument::Resource(ScopedResource::ScriptArguments) => {
                    quote! { script_arguments }
                }
                CallArgument::Resource(ScopedResource::CallStack) => quote! { call_stack },
                CallArgument::UserGesture => {
                    prelude.extend(quote! { let user_gesture = args.processing_user_gesture(); });
                    quote! { user_gesture }
                }
                CallArgument::ContentAttribute(name) => quote! { #name },
            });
        }
        if invocation.raises_exception {
            prelude.extend(quote! { let mut exception_code: rt::ExceptionCode = 0; });
            arguments.push(quote! { &mut exception_code });
        }

        let function = rust_ident(invocation.callee.function(), &self.location)?;
        let call = match &invocation.callee {
            Callee::Method(_) => quote! { this.#function(#(#arguments),*) },
            Callee::Associated { native_type, .. } => {
                let ty = rust_type(native_type, &self.location)?;
                quote! { <#ty>::#function(#(#arguments),*) }
            }
            Callee::Helper { helper, .. } => {
                let ty = rust_type(helper, &self.location)?;
                quote! { <#ty>::#function(#(#arguments),*) }
            }
        };
        let call = if invocation.return_type.is_some() {
            quote! { let result = #call; }
        } else {
            quote! { #call; }
        };
        let check = if invocation.raises_exception {
            let otherwise =
                self.bail(Some(quote! { rt::BindingError::native_exception(exception_code) }));
            quote! {
                if exception_code != 0 { #otherwise }
            }
        } else {
            TokenStream::new()
        };

        Ok(quote! {
            #prelude
            #call
            #check
        })
    }
}
