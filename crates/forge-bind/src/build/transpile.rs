//! TypeScript transpilation
//!
//! The binding surface is emitted as TypeScript and transpiled to JavaScript
//! for the runtime with deno_ast.

use deno_ast::{EmitOptions, MediaType, ParseParams, TranspileModuleOptions, TranspileOptions};
use thiserror::Error;

/// Specifier used for the generated binding surface
pub const BINDINGS_SPECIFIER: &str = "file:///bindings.ts";

/// Errors that can occur during transpilation
#[derive(Debug, Error)]
pub enum TranspileError {
    /// Failed to parse TypeScript
    #[error("Failed to parse TypeScript: {0}")]
    ParseError(String),

    /// Failed to transpile TypeScript
    #[error("Failed to transpile TypeScript: {0}")]
    TranspileError(String),
}

/// Transpile TypeScript source code to JavaScript
///
/// `specifier` is a file URL used in diagnostics, e.g. `file:///bindings.ts`.
pub fn transpile_ts(ts_code: &str, specifier: &str) -> Result<String, TranspileError> {
    let parsed = deno_ast::parse_module(ParseParams {
        specifier: deno_ast::ModuleSpecifier::parse(specifier)
            .map_err(|e| TranspileError::ParseError(e.to_string()))?,
        text: ts_code.into(),
        media_type: MediaType::TypeScript,
        capture_tokens: false,
        scope_analysis: false,
        maybe_syntax: None,
    })
    .map_err(|e| TranspileError::ParseError(e.to_string()))?;

    let transpile_result = parsed
        .transpile(
            &TranspileOptions::default(),
            &TranspileModuleOptions::default(),
            &EmitOptions::default(),
        )
        .map_err(|e| TranspileError::TranspileError(e.to_string()))?;

    Ok(transpile_result.into_source().text)
}

/// Transpile a generated binding surface
pub fn transpile_bindings(ts_code: &str) -> Result<String, TranspileError> {
    transpile_ts(ts_code, BINDINGS_SPECIFIER)
}
