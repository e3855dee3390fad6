//! bind.toml configuration

use anyhow::{Context, Result};
use forge_bind::codegen::CodegenOptions;
use forge_bind::ir::{Conversion, TypeInfo, TypeTest};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BindConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub codegen: CodegenOptions,
    /// Extra type registry entries by description type name
    pub types: BTreeMap<String, TypeConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Description files, relative to the config file
    pub descriptions: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output directory, relative to the config file
    pub dir: PathBuf,
    /// Emit bindings.js
    pub transpile: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("generated"),
            transpile: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypeConfig {
    pub managed: String,
    pub native: String,
    pub test: TypeTest,
    /// Argument conversion can fail
    #[serde(default)]
    pub fallible: bool,
    /// Overrides `fallible`
    #[serde(default)]
    pub conversion: Option<Conversion>,
    #[serde(default)]
    pub scoped: bool,
    #[serde(default)]
    pub includes: Vec<String>,
}

impl TypeConfig {
    pub fn into_type_info(self) -> TypeInfo {
        let conversion = self.conversion.unwrap_or(if self.fallible {
            Conversion::Convert
        } else {
            Conversion::Coerce
        });
        TypeInfo {
            managed: self.managed,
            native: self.native,
            test: self.test,
            conversion,
            scoped: self.scoped,
            includes: self.includes,
            reflect_getter: None,
            reflect_setter: None,
        }
    }
}

impl BindConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing bind.toml")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config at {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }
}
