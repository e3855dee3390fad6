//! Extension flags
//!
//! Descriptions carry extension flags as a string-keyed map. They are parsed
//! exactly once, at load time, into the closed [`ExtAttr`] set; everything
//! downstream matches on variants instead of probing strings.

use crate::error::{Location, StructuralError};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Extra context a native call is made with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallWith {
    /// The execution context of the calling script
    ExecutionContext,
    /// Script arguments and the current call stack
    CallStack,
}

impl FromStr for CallWith {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ExecutionContext" => Ok(CallWith::ExecutionContext),
            "CallStack" => Ok(CallWith::CallStack),
            _ => Err(()),
        }
    }
}

/// Runtime capability a member or constructor is gated on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureGate {
    /// Enabled process-wide
    Runtime(String),
    /// Enabled per execution context
    PerContext(String),
}

impl FeatureGate {
    /// Name of the gated feature
    pub fn feature(&self) -> &str {
        match self {
            FeatureGate::Runtime(name) | FeatureGate::PerContext(name) => name,
        }
    }

    /// Message raised when the gate is closed
    pub fn disabled_message(&self) -> String {
        format!("Feature {} is not enabled", self.feature())
    }
}

/// What kind of node a flag is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagTarget {
    Interface,
    Operation,
    Attribute,
    Parameter,
}

impl FlagTarget {
    fn describe(self) -> &'static str {
        match self {
            FlagTarget::Interface => "interfaces",
            FlagTarget::Operation => "operations",
            FlagTarget::Attribute => "attributes",
            FlagTarget::Parameter => "parameters",
        }
    }
}

/// One recognized extension flag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtAttr {
    /// Interface can be constructed from managed code
    Constructor,
    /// Constructor that needs the caller identity
    NamedConstructor,
    /// Constructor callback is supplied externally
    CustomConstructor,
    /// Constructor reports native exception codes
    ConstructorRaisesException,
    /// Interface without a native implementation
    PureInterface,
    /// Index getter backed by a native numeric getter
    NumericIndexedGetter,
    /// Index getter supplied externally
    CustomIndexedGetter,
    /// Index setter supplied externally
    CustomIndexedSetter,
    /// Instances are event targets
    EventTarget,
    /// Instances are active objects
    ActiveObject,
    /// Rust type backing the interface
    NativeType(String),
    /// Member callback is supplied externally
    Custom,
    /// Attribute getter is supplied externally
    CustomGetter,
    /// Attribute setter is supplied externally
    CustomSetter,
    /// Native call takes extra context
    CallWith(CallWith),
    /// Gated on a process-wide feature
    EnabledAtRuntime(String),
    /// Gated on a per-context feature
    EnabledPerContext(String),
    /// Native function name differs from the member name
    ImplementedAs(String),
    /// Native function lives on a helper type and takes the receiver
    ImplementedBy(String),
    /// Native call takes the user-gesture flag
    NeedsUserGesture,
    /// Member is excluded from generation
    CheckSecurity,
    /// Attribute reflects a content attribute (optionally renamed)
    Reflect(Option<String>),
    /// Parameter is an out-of-band callback, ignored for arity counting
    Callback,
}

impl ExtAttr {
    /// Flag name as written in descriptions
    pub fn name(&self) -> &'static str {
        match self {
            ExtAttr::Constructor => "Constructor",
            ExtAttr::NamedConstructor => "NamedConstructor",
            ExtAttr::CustomConstructor => "CustomConstructor",
            ExtAttr::ConstructorRaisesException => "ConstructorRaisesException",
            ExtAttr::PureInterface => "PureInterface",
            ExtAttr::NumericIndexedGetter => "NumericIndexedGetter",
            ExtAttr::CustomIndexedGetter => "CustomIndexedGetter",
            ExtAttr::CustomIndexedSetter => "CustomIndexedSetter",
            ExtAttr::EventTarget => "EventTarget",
            ExtAttr::ActiveObject => "ActiveObject",
            ExtAttr::NativeType(_) => "NativeType",
            ExtAttr::Custom => "Custom",
            ExtAttr::CustomGetter => "CustomGetter",
            ExtAttr::CustomSetter => "CustomSetter",
            ExtAttr::CallWith(_) => "CallWith",
            ExtAttr::EnabledAtRuntime(_) => "EnabledAtRuntime",
            ExtAttr::EnabledPerContext(_) => "EnabledPerContext",
            ExtAttr::ImplementedAs(_) => "ImplementedAs",
            ExtAttr::ImplementedBy(_) => "ImplementedBy",
            ExtAttr::NeedsUserGesture => "NeedsUserGesture",
            ExtAttr::CheckSecurity => "CheckSecurity",
            ExtAttr::Reflect(_) => "Reflect",
            ExtAttr::Callback => "Callback",
        }
    }

    /// Flag value as written in descriptions
    pub fn value(&self) -> Option<String> {
        match self {
            ExtAttr::CallWith(CallWith::ExecutionContext) => Some("ExecutionContext".to_string()),
            ExtAttr::CallWith(CallWith::CallStack) => Some("CallStack".to_string()),
            ExtAttr::NativeType(v)
            | ExtAttr::EnabledAtRuntime(v)
            | ExtAttr::EnabledPerContext(v)
            | ExtAttr::ImplementedAs(v)
            | ExtAttr::ImplementedBy(v) => Some(v.clone()),
            ExtAttr::Reflect(v) => v.clone(),
            _ => None,
        }
    }

    /// Parse a single `key[=value]` flag
    pub fn parse(
        key: &str,
        value: Option<&str>,
        location: &Location,
    ) -> Result<Self, StructuralError> {
        let invalid = || StructuralError::InvalidFlagValue {
            location: location.clone(),
            flag: key.to_string(),
            value: value.map(str::to_string),
        };
        let unit = |attr: ExtAttr| match value {
            None => Ok(attr),
            Some(_) => Err(invalid()),
        };
        let required = |make: fn(String) -> ExtAttr| match value {
            Some(v) if !v.is_empty() => Ok(make(v.to_string())),
            _ => Err(invalid()),
        };

        match key {
            "Constructor" => unit(ExtAttr::Constructor),
            "NamedConstructor" => unit(ExtAttr::NamedConstructor),
            "CustomConstructor" => unit(ExtAttr::CustomConstructor),
            "ConstructorRaisesException" => unit(ExtAttr::ConstructorRaisesException),
            "PureInterface" => unit(ExtAttr::PureInterface),
            "NumericIndexedGetter" => unit(ExtAttr::NumericIndexedGetter),
            "CustomIndexedGetter" => unit(ExtAttr::CustomIndexedGetter),
            "CustomIndexedSetter" => unit(ExtAttr::CustomIndexedSetter),
            "EventTarget" => unit(ExtAttr::EventTarget),
            "ActiveObject" => unit(ExtAttr::ActiveObject),
            "NativeType" => required(ExtAttr::NativeType),
            "Custom" => unit(ExtAttr::Custom),
            "CustomGetter" => unit(ExtAttr::CustomGetter),
            "CustomSetter" => unit(ExtAttr::CustomSetter),
            "CallWith" => value
                .and_then(|v| v.parse::<CallWith>().ok())
                .map(ExtAttr::CallWith)
                .ok_or_else(|| invalid()),
            "EnabledAtRuntime" => required(ExtAttr::EnabledAtRuntime),
            "EnabledPerContext" => required(ExtAttr::EnabledPerContext),
            "ImplementedAs" => required(ExtAttr::ImplementedAs),
            "ImplementedBy" => required(ExtAttr::ImplementedBy),
            "NeedsUserGesture" => unit(ExtAttr::NeedsUserGesture),
            "CheckSecurity" => unit(ExtAttr::CheckSecurity),
            "Reflect" => Ok(ExtAttr::Reflect(
                value.filter(|v| !v.is_empty()).map(str::to_string),
            )),
            "Callback" => unit(ExtAttr::Callback),
            _ => Err(StructuralError::UnknownFlag {
                location: location.clone(),
                flag: key.to_string(),
            }),
        }
    }

    fn allowed_on(&self, target: FlagTarget) -> bool {
        use ExtAttr as A;
        match target {
            FlagTarget::Interface => matches!(
                self,
                A::Constructor
                    | A::NamedConstructor
                    | A::CustomConstructor
                    | A::ConstructorRaisesException
                    | A::CallWith(_)
                    | A::EnabledAtRuntime(_)
                    | A::EnabledPerContext(_)
                    | A::PureInterface
                    | A::NumericIndexedGetter
                    | A::CustomIndexedGetter
                    | A::CustomIndexedSetter
                    | A::EventTarget
                    | A::ActiveObject
                    | A::NativeType(_)
            ),
            FlagTarget::Operation => matches!(
                self,
                A::Custom
                    | A::CallWith(_)
                    | A::ImplementedAs(_)
                    | A::ImplementedBy(_)
                    | A::NeedsUserGesture
                    | A::CheckSecurity
                    | A::EnabledAtRuntime(_)
                    | A::EnabledPerContext(_)
            ),
            FlagTarget::Attribute => matches!(
                self,
                A::Custom
                    | A::CustomGetter
                    | A::CustomSetter
                    | A::CallWith(_)
                    | A::Reflect(_)
                    | A::ImplementedBy(_)
                    | A::CheckSecurity
                    | A::EnabledAtRuntime(_)
                    | A::EnabledPerContext(_)
            ),
            FlagTarget::Parameter => matches!(self, A::Callback),
        }
    }
}

impl fmt::Display for ExtAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Validated flag set of one description node
///
/// Serializes back to the description's `{"Flag": value}` form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ExtAttrs(Vec<ExtAttr>);

impl ExtAttrs {
    /// Create an empty flag set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a raw flag map for the given target
    pub fn parse(
        raw: &BTreeMap<String, Option<String>>,
        target: FlagTarget,
        location: &Location,
    ) -> Result<Self, StructuralError> {
        let mut attrs = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            let attr = ExtAttr::parse(key, value.as_deref(), location)?;
            if !attr.allowed_on(target) {
                return Err(StructuralError::FlagNotAllowed {
                    location: location.clone(),
                    flag: key.clone(),
                    target: target.describe(),
                });
            }
            attrs.push(attr);
        }

        let flags = Self(attrs);
        flags.check_conflicts(location)?;
        Ok(flags)
    }

    fn check_conflicts(&self, location: &Location) -> Result<(), StructuralError> {
        let runtime = self.0.iter().any(|a| matches!(a, ExtAttr::EnabledAtRuntime(_)));
        let per_context = self.0.iter().any(|a| matches!(a, ExtAttr::EnabledPerContext(_)));
        if runtime && per_context {
            return Err(StructuralError::ConflictingFlags {
                location: location.clone(),
                first: "EnabledAtRuntime",
                second: "EnabledPerContext",
            });
        }
        Ok(())
    }

    /// Add a flag (builder style, unvalidated)
    pub fn with(mut self, attr: ExtAttr) -> Self {
        if !self.0.contains(&attr) {
            self.0.push(attr);
        }
        self
    }

    /// Check whether a flag is present
    pub fn contains(&self, attr: &ExtAttr) -> bool {
        self.0.contains(attr)
    }

    /// Iterate over all flags
    pub fn iter(&self) -> impl Iterator<Item = &ExtAttr> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn call_with(&self) -> Option<CallWith> {
        self.0.iter().find_map(|a| match a {
            ExtAttr::CallWith(call_with) => Some(*call_with),
            _ => None,
        })
    }

    pub fn feature_gate(&self) -> Option<FeatureGate> {
        self.0.iter().find_map(|a| match a {
            ExtAttr::EnabledAtRuntime(name) => Some(FeatureGate::Runtime(name.clone())),
            ExtAttr::EnabledPerContext(name) => Some(FeatureGate::PerContext(name.clone())),
            _ => None,
        })
    }

    pub fn implemented_as(&self) -> Option<&str> {
        self.0.iter().find_map(|a| match a {
            ExtAttr::ImplementedAs(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn implemented_by(&self) -> Option<&str> {
        self.0.iter().find_map(|a| match a {
            ExtAttr::ImplementedBy(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn native_type(&self) -> Option<&str> {
        self.0.iter().find_map(|a| match a {
            ExtAttr::NativeType(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// `Some(rename)` when the attribute is reflected
    pub fn reflect(&self) -> Option<Option<&str>> {
        self.0.iter().find_map(|a| match a {
            ExtAttr::Reflect(name) => Some(name.as_deref()),
            _ => None,
        })
    }
}

impl Serialize for ExtAttrs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for attr in &self.0 {
            map.serialize_entry(attr.name(), &attr.value())?;
        }
        map.end()
    }
}

impl FromIterator<ExtAttr> for ExtAttrs {
    fn from_iter<I: IntoIterator<Item = ExtAttr>>(iter: I) -> Self {
        iter.into_iter().fold(ExtAttrs::new(), ExtAttrs::with)
    }
}
