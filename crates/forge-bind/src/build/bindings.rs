//! BindingsBuilder for build.rs scripts and the CLI
//!
//! Loads interface descriptions, runs the generation pipeline and writes the
//! artifacts. Everything is generated in memory first; nothing is written
//! unless the whole run succeeds.

use crate::build::transpile::{transpile_bindings, TranspileError};
use crate::codegen::{CodegenOptions, NativeGenerator, ResolverGenerator, TypeScriptGenerator};
use crate::error::{LoadError, StructuralError};
use crate::ir::{DefaultTypeRegistry, Description, InterfaceRegistry, TypeInfo};
use crate::plan::generate;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while building bindings
#[derive(Debug, Error)]
pub enum BindingsBuilderError {
    /// Environment variable not set
    #[error("Environment variable not set: {0}")]
    EnvVarMissing(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Transpilation error
    #[error("Transpilation error: {0}")]
    TranspileError(#[from] TranspileError),

    /// Description file not found
    #[error("Description not found: {0}")]
    DescriptionNotFound(PathBuf),

    /// Description file failed to load
    #[error("Failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: LoadError,
    },

    /// Generation failed
    #[error("Generation error: {0}")]
    Structural(#[from] StructuralError),

    /// Serializing the merged description failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Artifacts of one generation run, held in memory
#[derive(Debug, Clone)]
pub struct GeneratedArtifacts {
    pub bindings_ts: String,
    /// `None` when transpiling is disabled
    pub bindings_js: Option<String>,
    pub native_rs: String,
    pub resolver_rs: String,
    pub description_json: String,
    pub interface_count: usize,
    pub callback_count: usize,
}

impl GeneratedArtifacts {
    /// Write every artifact into `dir`
    pub fn write_to(&self, dir: &Path) -> Result<BuildOutput, std::io::Error> {
        fs::create_dir_all(dir)?;

        let output = BuildOutput {
            bindings_ts: dir.join("bindings.ts"),
            bindings_js: self.bindings_js.as_ref().map(|_| dir.join("bindings.js")),
            native_rs: dir.join("native.rs"),
            resolver_rs: dir.join("resolver.rs"),
            description_json: dir.join("description.json"),
        };

        fs::write(&output.bindings_ts, &self.bindings_ts)?;
        if let (Some(path), Some(js)) = (&output.bindings_js, &self.bindings_js) {
            fs::write(path, js)?;
        }
        fs::write(&output.native_rs, &self.native_rs)?;
        fs::write(&output.resolver_rs, &self.resolver_rs)?;
        fs::write(&output.description_json, &self.description_json)?;
        Ok(output)
    }
}

/// Output paths from a successful build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub bindings_ts: PathBuf,
    pub bindings_js: Option<PathBuf>,
    pub native_rs: PathBuf,
    pub resolver_rs: PathBuf,
    pub description_json: PathBuf,
}

/// Builder for generated bindings
///
/// Handles:
/// - loading JSON descriptions and inventory-registered interfaces
/// - running the generator
/// - TypeScript transpilation
/// - cargo:rerun-if-changed directives (when writing to `OUT_DIR`)
///
/// # Example
/// ```ignore
/// use forge_bind::build::BindingsBuilder;
///
/// fn main() {
///     BindingsBuilder::new()
///         .description_path("idl/canvas.json")
///         .build()
///         .expect("Failed to generate bindings");
/// }
/// ```
///
/// The crate then includes the adapters and the resolver side by side:
///
/// ```ignore
/// mod bindings {
///     include!(concat!(env!("OUT_DIR"), "/native.rs"));
///     include!(concat!(env!("OUT_DIR"), "/resolver.rs"));
/// }
/// ```
pub struct BindingsBuilder {
    description_paths: Vec<PathBuf>,
    description: Description,
    use_inventory: bool,
    types: Vec<(String, TypeInfo)>,
    options: CodegenOptions,
    out_dir: Option<PathBuf>,
    transpile: bool,
    additional_watch: Vec<PathBuf>,
}

impl Default for BindingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BindingsBuilder {
    /// Create a new bindings builder
    pub fn new() -> Self {
        Self {
            description_paths: Vec::new(),
            description: Description::new(),
            use_inventory: false,
            types: Vec::new(),
            options: CodegenOptions::default(),
            out_dir: None,
            transpile: true,
            additional_watch: Vec::new(),
        }
    }

    /// Add a JSON description file (relative paths resolve against the crate root)
    pub fn description_path(mut self, path: impl AsRef<Path>) -> Self {
        self.description_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Add interfaces described in Rust
    pub fn description(mut self, description: Description) -> Self {
        self.description.extend(description);
        self
    }

    /// Merge interfaces registered with `register_interface!`
    pub fn use_inventory(mut self) -> Self {
        self.use_inventory = true;
        self
    }

    /// Register an extra type with the type registry
    pub fn type_info(mut self, name: impl Into<String>, info: TypeInfo) -> Self {
        self.types.push((name.into(), info));
        self
    }

    /// Set the paths generated Rust code refers to
    pub fn codegen(mut self, options: CodegenOptions) -> Self {
        self.options = options;
        self
    }

    /// Write to `dir` instead of `OUT_DIR`
    pub fn out_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.out_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Enable or disable emitting bindings.js
    pub fn transpile(mut self, enabled: bool) -> Self {
        self.transpile = enabled;
        self
    }

    /// Add additional files to watch for rebuilds
    pub fn watch(mut self, path: impl AsRef<Path>) -> Self {
        self.additional_watch.push(path.as_ref().to_path_buf());
        self
    }

    fn resolve_path(path: &Path) -> PathBuf {
        match env::var("CARGO_MANIFEST_DIR") {
            Ok(manifest_dir) if path.is_relative() => Path::new(&manifest_dir).join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Assemble the merged, validated description
    pub fn load_description(&self) -> Result<Description, BindingsBuilderError> {
        let mut description = Description::new();
        for path in &self.description_paths {
            let full_path = Self::resolve_path(path);
            if !full_path.exists() {
                return Err(BindingsBuilderError::DescriptionNotFound(full_path));
            }
            let json = fs::read_to_string(&full_path)?;
            let loaded = Description::from_json(&json).map_err(|source| {
                BindingsBuilderError::Load {
                    path: full_path.clone(),
                    source,
                }
            })?;
            debug!(path = %full_path.display(), interfaces = loaded.interfaces.len(), "loaded description");
            description.extend(loaded);
        }

        description.extend(self.description.clone());
        if self.use_inventory {
            let inventory = InterfaceRegistry::from_inventory().into_description()?;
            debug!(interfaces = inventory.interfaces.len(), "merged inventory");
            description.extend(inventory);
        }

        description.validate()?;
        Ok(description)
    }

    /// Run the whole pipeline in memory
    pub fn generate(&self) -> Result<GeneratedArtifacts, BindingsBuilderError> {
        let description = self.load_description()?;

        let mut registry = DefaultTypeRegistry::for_description(&description);
        for (name, info) in &self.types {
            registry.register(name.clone(), info.clone());
        }

        let bindings = generate(&description, &registry)?;
        let bindings_ts = TypeScriptGenerator::new(&description, &bindings, &registry).generate()?;
        let bindings_js = if self.transpile {
            Some(transpile_bindings(&bindings_ts)?)
        } else {
            None
        };
        let native_rs = NativeGenerator::new(&bindings, &registry, &self.options).generate()?;
        let resolver_rs = ResolverGenerator::new(&bindings, &self.options).generate()?;

        Ok(GeneratedArtifacts {
            bindings_ts,
            bindings_js,
            native_rs,
            resolver_rs,
            description_json: description.to_json()?,
            interface_count: description.interfaces.len(),
            callback_count: bindings.callback_count(),
        })
    }

    /// Generate and write the bindings
    ///
    /// Writes into the configured output directory, or `OUT_DIR` when none
    /// was set; in the latter case cargo rerun directives are printed.
    pub fn build(self) -> Result<BuildOutput, BindingsBuilderError> {
        let (out_dir, from_cargo) = match &self.out_dir {
            Some(dir) => (dir.clone(), false),
            None => {
                let dir = env::var("OUT_DIR")
                    .map_err(|_| BindingsBuilderError::EnvVarMissing("OUT_DIR".to_string()))?;
                (PathBuf::from(dir), true)
            }
        };

        let artifacts = self.generate()?;
        let output = artifacts.write_to(&out_dir)?;

        if from_cargo {
            for path in self.description_paths.iter().chain(&self.additional_watch) {
                println!("cargo:rerun-if-changed={}", path.display());
            }
        }

        info!(
            interfaces = artifacts.interface_count,
            callbacks = artifacts.callback_count,
            out_dir = %out_dir.display(),
            "generated bindings"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Interface, Operation, Parameter, Signature};

    fn canvas() -> Description {
        Description::new().interface(Interface::new("Canvas").operation(Operation::new(
            "fill",
            Signature::void().param(Parameter::new("x", "double")),
        )))
    }

    #[test]
    fn test_generate_in_memory() {
        let artifacts = BindingsBuilder::new()
            .description(canvas())
            .transpile(false)
            .generate()
            .unwrap();

        assert_eq!(artifacts.interface_count, 1);
        assert_eq!(artifacts.callback_count, 1);
        assert!(artifacts.bindings_js.is_none());
        assert!(artifacts.bindings_ts.contains("export class Canvas extends NativeWrapper"));
        assert!(artifacts.resolver_rs.contains("Canvas_fill_Callback"));
    }

    #[test]
    fn test_build_writes_nothing_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let broken = Description::new().interface(Interface::new("Canvas").operation(
            Operation::new("fill", Signature::void().param(Parameter::new("x", "Unknown"))),
        ));

        let err = BindingsBuilder::new()
            .description(broken)
            .out_dir(dir.path().join("out"))
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            BindingsBuilderError::Structural(StructuralError::UnknownType { .. })
        ));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_missing_description_file() {
        let err = BindingsBuilder::new()
            .description_path("/nonexistent/canvas.json")
            .generate()
            .unwrap_err();
        assert!(matches!(err, BindingsBuilderError::DescriptionNotFound(_)));
    }

    #[test]
    fn test_duplicate_interface_across_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canvas.json");
        fs::write(&path, r#"{"interfaces": [{"name": "Canvas"}]}"#).unwrap();

        let err = BindingsBuilder::new()
            .description_path(&path)
            .description(canvas())
            .generate()
            .unwrap_err();
        assert!(matches!(
            err,
            BindingsBuilderError::Structural(StructuralError::DuplicateInterface(ref name)) if name == "Canvas"
        ));
    }

    #[test]
    fn test_inventory_merge() {
        let artifacts = BindingsBuilder::new()
            .use_inventory()
            .transpile(false)
            .generate()
            .unwrap();
        assert!(artifacts.bindings_ts.contains("export class InventorySample"));
    }
}
