//! Rust resolver.rs code generator
//!
//! Generates one resolver function per interface plus the global `resolve`
//! that consults them in declaration order. `resolver.rs` is meant to be
//! included next to `native.rs`, whose interface modules it refers to.

use super::native::{module_name, rust_ident, rust_path};
use super::CodegenOptions;
use crate::error::{Location, StructuralError};
use crate::plan::{Arity, GeneratedBindings, InterfaceBindings};
use proc_macro2::{Literal, TokenStream};
use quote::{format_ident, quote};

/// Generator for `resolver.rs`
pub struct ResolverGenerator<'a> {
    bindings: &'a GeneratedBindings,
    options: &'a CodegenOptions,
}

impl<'a> ResolverGenerator<'a> {
    /// Create a new resolver generator
    pub fn new(bindings: &'a GeneratedBindings, options: &'a CodegenOptions) -> Self {
        Self { bindings, options }
    }

    /// Generate the complete `resolver.rs` source
    pub fn generate(&self) -> Result<String, StructuralError> {
        let runtime = rust_path(&self.options.runtime_path, &Location::interface("resolver"))?;

        let mut per_interface = Vec::new();
        let mut lookups = Vec::new();
        for interface in &self.bindings.interfaces {
            let function = format_ident!("resolve_{}", module_name(&interface.interface));
            per_interface.push(self.interface_resolver(interface, &runtime)?);
            lookups.push(quote! { #function(name, argument_count) });
        }

        let resolve = quote! {
            /// Find the native adapter registered for `name` taking `argument_count` arguments
            pub fn resolve(name: &str, argument_count: usize) -> Option<#runtime::NativeFunction> {
                None #(.or_else(|| #lookups))*
            }
        };

        let mut output = String::from("// Generated by forge-bind - do not edit manually\n\n");
        output.push_str(&resolve.to_string());
        output.push_str("\n\n");
        for tokens in per_interface {
            output.push_str(&tokens.to_string());
            output.push_str("\n\n");
        }
        Ok(output)
    }

    fn interface_resolver(
        &self,
        interface: &InterfaceBindings,
        runtime: &syn::Path,
    ) -> Result<TokenStream, StructuralError> {
        let location = Location::interface(&interface.interface);
        let module = rust_ident(&module_name(&interface.interface), &location)?;
        let function = format_ident!("resolve_{}", module_name(&interface.interface));

        let mut arms = Vec::new();
        for descriptor in interface.descriptors() {
            let binding = descriptor.binding.to_string();
            let callback = rust_ident(&descriptor.function_name(), &location)?;
            let count = match descriptor.arity {
                Arity::Exact(count) => {
                    let count = Literal::usize_unsuffixed(count);
                    quote! { #count }
                }
                Arity::Any => quote! { _ },
            };
            arms.push(quote! {
                (#binding, #count) => Some(#module::#callback as #runtime::NativeFunction),
            });
        }

        Ok(quote! {
            #[allow(unused_variables)]
            fn #function(name: &str, argument_count: usize) -> Option<#runtime::NativeFunction> {
                match (name, argument_count) {
                    #(#arms)*
                    _ => None,
                }
            }
        })
    }
}
