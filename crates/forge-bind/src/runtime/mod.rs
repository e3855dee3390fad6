//! Runtime contract for generated adapters
//!
//! Generated `native.rs` files compile against this module: every adapter is
//! a [`NativeFunction`] receiving the call's [`NativeArguments`], converting
//! values with [`CoerceManaged`], [`FromManaged`] and [`ToManaged`], and
//! reporting failures as a [`BindingError`].
//!
//! [`CallFrame`] is an in-memory [`NativeArguments`] implementation used by
//! hosts that drive adapters directly and by tests.

mod executor;

pub use executor::{execute, Completion, InvocationArguments, NativeHost};

use std::any::Any;
use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

// ============================================================================
// Values
// ============================================================================

/// A value crossing the managed/native boundary
#[derive(Clone, Default)]
pub enum ManagedValue {
    /// Argument was omitted by the caller (distinct from `Null`)
    #[default]
    NotSupplied,
    /// Explicit null
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    /// Wrapper object, optionally backed by a native object
    Object(ManagedObject),
}

/// Managed wrapper around a native object
#[derive(Clone)]
pub struct ManagedObject {
    class: String,
    /// Superclasses, nearest first
    ancestors: Vec<String>,
    native: Option<Arc<dyn Any + Send + Sync>>,
}

impl ManagedObject {
    /// Managed class name
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// `instanceof` semantics: the class itself or any superclass
    pub fn is_instance_of(&self, class: &str) -> bool {
        self.class == class || self.ancestors.iter().any(|ancestor| ancestor == class)
    }

    /// Borrow the native object as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.native.as_deref().and_then(|native| native.downcast_ref::<T>())
    }
}

impl PartialEq for ManagedObject {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class
            && match (&self.native, &other.native) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}

impl fmt::Debug for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedObject")
            .field("class", &self.class)
            .field("native", &self.native.is_some())
            .finish()
    }
}

/// The "not supplied" sentinel
pub static NOT_SUPPLIED: ManagedValue = ManagedValue::NotSupplied;

impl ManagedValue {
    /// Object of `class` without a native backing
    pub fn object(class: impl Into<String>) -> Self {
        ManagedValue::Object(ManagedObject {
            class: class.into(),
            ancestors: Vec::new(),
            native: None,
        })
    }

    /// Object of `class` wrapping a native value
    pub fn wrap<T: Any + Send + Sync>(class: impl Into<String>, native: T) -> Self {
        ManagedValue::Object(ManagedObject {
            class: class.into(),
            ancestors: Vec::new(),
            native: Some(Arc::new(native)),
        })
    }

    /// Record the superclasses of an object value, nearest first
    ///
    /// Non-object values are returned unchanged.
    pub fn extending<I, S>(mut self, ancestors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let ManagedValue::Object(object) = &mut self {
            object.ancestors = ancestors.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Whether the value is an object of `class` or one of its subclasses
    pub fn is_instance_of(&self, class: &str) -> bool {
        match self {
            ManagedValue::Object(object) => object.is_instance_of(class),
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ManagedValue::Null)
    }

    pub fn is_supplied(&self) -> bool {
        !matches!(self, ManagedValue::NotSupplied)
    }

    /// `typeof` tag of the value, `None` for null and the sentinel
    pub fn type_tag(&self) -> Option<&'static str> {
        match self {
            ManagedValue::Boolean(_) => Some("boolean"),
            ManagedValue::Number(_) => Some("number"),
            ManagedValue::String(_) => Some("string"),
            ManagedValue::Object(_) => Some("object"),
            ManagedValue::Null | ManagedValue::NotSupplied => None,
        }
    }

    /// Class name for objects
    pub fn class_name(&self) -> Option<&str> {
        match self {
            ManagedValue::Object(object) => Some(object.class()),
            _ => None,
        }
    }
}

impl PartialEq for ManagedValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ManagedValue::NotSupplied, ManagedValue::NotSupplied) => true,
            (ManagedValue::Null, ManagedValue::Null) => true,
            (ManagedValue::Boolean(a), ManagedValue::Boolean(b)) => a == b,
            (ManagedValue::Number(a), ManagedValue::Number(b)) => a == b,
            (ManagedValue::String(a), ManagedValue::String(b)) => a == b,
            (ManagedValue::Object(a), ManagedValue::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for ManagedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagedValue::NotSupplied => write!(f, "NotSupplied"),
            ManagedValue::Null => write!(f, "Null"),
            ManagedValue::Boolean(b) => write!(f, "Boolean({})", b),
            ManagedValue::Number(n) => write!(f, "Number({})", n),
            ManagedValue::String(s) => write!(f, "String({:?})", s),
            ManagedValue::Object(o) => write!(f, "Object({})", o.class()),
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// Infallible conversion from a managed value
pub trait CoerceManaged: Sized {
    fn coerce(value: &ManagedValue) -> Self;
}

/// Fallible conversion from a managed value
pub trait FromManaged: Sized {
    fn from_managed(value: &ManagedValue) -> Result<Self, BindingError>;
}

/// Conversion of a native result to a managed value
pub trait ToManaged {
    fn to_managed(self) -> ManagedValue;
}

fn to_number(value: &ManagedValue) -> f64 {
    match value {
        ManagedValue::Number(n) => *n,
        ManagedValue::Boolean(b) => f64::from(u8::from(*b)),
        ManagedValue::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        ManagedValue::Null => 0.0,
        ManagedValue::NotSupplied | ManagedValue::Object(_) => f64::NAN,
    }
}

impl CoerceManaged for bool {
    fn coerce(value: &ManagedValue) -> Self {
        match value {
            ManagedValue::Boolean(b) => *b,
            ManagedValue::Number(n) => *n != 0.0 && !n.is_nan(),
            ManagedValue::String(s) => !s.is_empty(),
            ManagedValue::Object(_) => true,
            ManagedValue::Null | ManagedValue::NotSupplied => false,
        }
    }
}

macro_rules! impl_numeric {
    ($($ty:ty),*) => {
        $(
            impl CoerceManaged for $ty {
                fn coerce(value: &ManagedValue) -> Self {
                    to_number(value) as $ty
                }
            }

            impl ToManaged for $ty {
                fn to_managed(self) -> ManagedValue {
                    ManagedValue::Number(self as f64)
                }
            }
        )*
    };
}

impl_numeric!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

impl CoerceManaged for String {
    fn coerce(value: &ManagedValue) -> Self {
        match value {
            ManagedValue::String(s) => s.clone(),
            ManagedValue::Boolean(b) => b.to_string(),
            ManagedValue::Number(n) if n.fract() == 0.0 && n.is_finite() => {
                format!("{}", *n as i64)
            }
            ManagedValue::Number(n) => n.to_string(),
            ManagedValue::Null => "null".to_string(),
            ManagedValue::NotSupplied => "undefined".to_string(),
            ManagedValue::Object(o) => format!("[object {}]", o.class()),
        }
    }
}

impl FromManaged for ManagedValue {
    fn from_managed(value: &ManagedValue) -> Result<Self, BindingError> {
        Ok(value.clone())
    }
}

impl<T: FromManaged> FromManaged for Option<T> {
    fn from_managed(value: &ManagedValue) -> Result<Self, BindingError> {
        match value {
            ManagedValue::Null | ManagedValue::NotSupplied => Ok(None),
            other => T::from_managed(other).map(Some),
        }
    }
}

impl ToManaged for () {
    fn to_managed(self) -> ManagedValue {
        ManagedValue::NotSupplied
    }
}

impl ToManaged for bool {
    fn to_managed(self) -> ManagedValue {
        ManagedValue::Boolean(self)
    }
}

impl ToManaged for String {
    fn to_managed(self) -> ManagedValue {
        ManagedValue::String(self)
    }
}

impl ToManaged for &str {
    fn to_managed(self) -> ManagedValue {
        ManagedValue::String(self.to_string())
    }
}

impl ToManaged for ManagedValue {
    fn to_managed(self) -> ManagedValue {
        self
    }
}

impl<T: ToManaged> ToManaged for Option<T> {
    fn to_managed(self) -> ManagedValue {
        match self {
            Some(value) => value.to_managed(),
            None => ManagedValue::Null,
        }
    }
}

/// Borrow the native object behind a managed wrapper
pub fn unwrap<T: Any>(value: &ManagedValue) -> Result<&T, BindingError> {
    match value {
        ManagedValue::Object(object) => object.downcast_ref::<T>().ok_or_else(|| {
            BindingError::conversion(format!(
                "{} object does not wrap a {}",
                object.class(),
                std::any::type_name::<T>()
            ))
        }),
        other => Err(BindingError::conversion(format!(
            "expected a {} object, got {:?}",
            std::any::type_name::<T>(),
            other
        ))),
    }
}

/// Borrow the receiver of an instance call
pub fn receiver<T: Any>(args: &dyn NativeArguments) -> Result<&T, BindingError> {
    unwrap::<T>(args.argument(0))
}

// ============================================================================
// Errors
// ============================================================================

/// Exception code reported by a native call through its out-parameter
pub type ExceptionCode = u32;

/// Error codes for adapter execution (for machine-readable errors)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BindingErrorCode {
    /// Argument could not be converted to its native type
    Conversion = 7000,
    /// No dispatch clause matched
    DispatchExhausted = 7001,
    /// Required feature is disabled
    FeatureDisabled = 7002,
    /// Required scoped resource could not be acquired
    ResourceUnavailable = 7003,
    /// Native call reported a nonzero exception code
    NativeException = 7004,
}

/// Error raised by a generated adapter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    #[error("[{code}] Conversion error: {message}")]
    Conversion { code: u32, message: String },

    #[error("[{code}] Dispatch exhausted: {message}")]
    DispatchExhausted { code: u32, message: String },

    #[error("[{code}] Feature disabled: {message}")]
    FeatureDisabled { code: u32, message: String },

    #[error("[{code}] Resource unavailable: {message}")]
    ResourceUnavailable { code: u32, message: String },

    #[error("[{code}] Native exception {exception}")]
    NativeException { code: u32, exception: ExceptionCode },
}

/// Message of the dispatch-exhausted error
pub const INVALID_ARGUMENTS: &str = "Incorrect number or type of arguments";

impl BindingError {
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion {
            code: BindingErrorCode::Conversion as u32,
            message: message.into(),
        }
    }

    pub fn dispatch_exhausted() -> Self {
        Self::DispatchExhausted {
            code: BindingErrorCode::DispatchExhausted as u32,
            message: INVALID_ARGUMENTS.to_string(),
        }
    }

    pub fn feature_disabled(feature: &str) -> Self {
        Self::FeatureDisabled {
            code: BindingErrorCode::FeatureDisabled as u32,
            message: format!("Feature {} is not enabled", feature),
        }
    }

    pub fn resource_unavailable(message: impl Into<String>) -> Self {
        Self::ResourceUnavailable {
            code: BindingErrorCode::ResourceUnavailable as u32,
            message: message.into(),
        }
    }

    pub fn native_exception(exception: ExceptionCode) -> Self {
        Self::NativeException {
            code: BindingErrorCode::NativeException as u32,
            exception,
        }
    }

    /// Numeric error code
    pub fn code(&self) -> u32 {
        match self {
            Self::Conversion { code, .. }
            | Self::DispatchExhausted { code, .. }
            | Self::FeatureDisabled { code, .. }
            | Self::ResourceUnavailable { code, .. }
            | Self::NativeException { code, .. } => *code,
        }
    }
}

// ============================================================================
// Scoped resources
// ============================================================================

/// Resource an adapter acquires before invoking native code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ScopedResource {
    ExecutionContext,
    CallerIdentity,
    ScriptArguments,
    CallStack,
}

impl ScopedResource {
    /// Human readable resource name
    pub fn describe(self) -> &'static str {
        match self {
            ScopedResource::ExecutionContext => "execution context",
            ScopedResource::CallerIdentity => "caller identity",
            ScopedResource::ScriptArguments => "script arguments",
            ScopedResource::CallStack => "call stack",
        }
    }
}

impl fmt::Display for ScopedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Execution context of the calling script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub id: u64,
}

/// Identity of the calling document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub origin: String,
}

/// Arguments captured for console-style calls
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScriptArguments {
    pub values: Vec<ManagedValue>,
}

/// Captured managed call stack
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallStack {
    pub frames: Vec<String>,
}

impl CallStack {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Guard that keeps a conversion scope open until dropped
#[derive(Debug, Default)]
pub struct ConversionScope {
    depth: Option<Rc<Cell<usize>>>,
}

impl ConversionScope {
    /// Open a scope counted in `depth`
    pub fn enter(depth: Rc<Cell<usize>>) -> Self {
        depth.set(depth.get() + 1);
        Self { depth: Some(depth) }
    }
}

impl Drop for ConversionScope {
    fn drop(&mut self) {
        if let Some(depth) = &self.depth {
            depth.set(depth.get().saturating_sub(1));
        }
    }
}

// ============================================================================
// Native calls
// ============================================================================

/// Arguments and environment of one native call
///
/// Index 0 is the receiver for instance calls; declared parameters follow.
pub trait NativeArguments {
    /// Number of supplied arguments (receiver included)
    fn count(&self) -> usize;

    /// Argument at `index`, the sentinel when out of range
    fn argument(&self, index: usize) -> &ManagedValue;

    fn set_return_value(&mut self, value: ManagedValue);

    /// Raise an error to the managed caller
    fn throw(&mut self, error: BindingError);

    fn execution_context(&self) -> Option<ExecutionContext>;

    fn caller_identity(&self) -> Option<CallerIdentity>;

    fn call_stack(&self) -> CallStack;

    fn runtime_feature_enabled(&self, feature: &str) -> bool;

    fn context_feature_enabled(&self, feature: &str) -> bool;

    fn processing_user_gesture(&self) -> bool;

    /// Capture the arguments from `first` onward
    fn script_arguments(&self, first: usize) -> Option<ScriptArguments> {
        Some(ScriptArguments {
            values: (first..self.count()).map(|i| self.argument(i).clone()).collect(),
        })
    }

    fn enter_scope(&self) -> ConversionScope {
        ConversionScope::default()
    }
}

/// Signature of every generated adapter
pub type NativeFunction = fn(&mut dyn NativeArguments);

/// In-memory call frame
#[derive(Debug, Default)]
pub struct CallFrame {
    arguments: Vec<ManagedValue>,
    return_value: Option<ManagedValue>,
    thrown: Option<BindingError>,
    execution_context: Option<ExecutionContext>,
    caller_identity: Option<CallerIdentity>,
    call_stack: CallStack,
    runtime_features: HashSet<String>,
    context_features: HashSet<String>,
    user_gesture: bool,
    scope_depth: Rc<Cell<usize>>,
}

impl CallFrame {
    /// Create a frame holding the given arguments
    pub fn new(arguments: Vec<ManagedValue>) -> Self {
        Self {
            arguments,
            ..Self::default()
        }
    }

    /// Create a frame for an instance call
    pub fn with_receiver(receiver: ManagedValue, arguments: Vec<ManagedValue>) -> Self {
        let mut all = Vec::with_capacity(arguments.len() + 1);
        all.push(receiver);
        all.extend(arguments);
        Self::new(all)
    }

    pub fn execution_context_of(mut self, context: ExecutionContext) -> Self {
        self.execution_context = Some(context);
        self
    }

    pub fn caller(mut self, identity: CallerIdentity) -> Self {
        self.caller_identity = Some(identity);
        self
    }

    pub fn stack(mut self, frames: Vec<String>) -> Self {
        self.call_stack = CallStack { frames };
        self
    }

    pub fn enable_runtime_feature(mut self, feature: impl Into<String>) -> Self {
        self.runtime_features.insert(feature.into());
        self
    }

    pub fn enable_context_feature(mut self, feature: impl Into<String>) -> Self {
        self.context_features.insert(feature.into());
        self
    }

    pub fn user_gesture(mut self) -> Self {
        self.user_gesture = true;
        self
    }

    pub fn return_value(&self) -> Option<&ManagedValue> {
        self.return_value.as_ref()
    }

    pub fn thrown(&self) -> Option<&BindingError> {
        self.thrown.as_ref()
    }

    /// Currently open conversion scopes
    pub fn scope_depth(&self) -> usize {
        self.scope_depth.get()
    }
}

impl NativeArguments for CallFrame {
    fn count(&self) -> usize {
        self.arguments.len()
    }

    fn argument(&self, index: usize) -> &ManagedValue {
        self.arguments.get(index).unwrap_or(&NOT_SUPPLIED)
    }

    fn set_return_value(&mut self, value: ManagedValue) {
        self.return_value = Some(value);
    }

    fn throw(&mut self, error: BindingError) {
        self.thrown = Some(error);
    }

    fn execution_context(&self) -> Option<ExecutionContext> {
        self.execution_context.clone()
    }

    fn caller_identity(&self) -> Option<CallerIdentity> {
        self.caller_identity.clone()
    }

    fn call_stack(&self) -> CallStack {
        self.call_stack.clone()
    }

    fn runtime_feature_enabled(&self, feature: &str) -> bool {
        self.runtime_features.contains(feature)
    }

    fn context_feature_enabled(&self, feature: &str) -> bool {
        self.context_features.contains(feature)
    }

    fn processing_user_gesture(&self) -> bool {
        self.user_gesture
    }

    fn enter_scope(&self) -> ConversionScope {
        ConversionScope::enter(Rc::clone(&self.scope_depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Canvas {
        width: i32,
    }

    #[test]
    fn test_sentinel_is_not_null() {
        assert_ne!(ManagedValue::NotSupplied, ManagedValue::Null);
        assert!(!ManagedValue::NotSupplied.is_supplied());
        assert!(ManagedValue::Null.is_supplied());
        assert_eq!(ManagedValue::Null.type_tag(), None);
    }

    #[test]
    fn test_coercions() {
        assert_eq!(i32::coerce(&ManagedValue::String(" 42 ".into())), 42);
        assert_eq!(f64::coerce(&ManagedValue::Boolean(true)), 1.0);
        assert!(f64::coerce(&ManagedValue::NotSupplied).is_nan());
        assert_eq!(String::coerce(&ManagedValue::Number(3.0)), "3");
        assert!(!bool::coerce(&ManagedValue::Null));
    }

    #[test]
    fn test_unwrap_native_object() {
        let value = ManagedValue::wrap("Canvas", Canvas { width: 300 });
        assert_eq!(unwrap::<Canvas>(&value).unwrap().width, 300);

        let err = unwrap::<Canvas>(&ManagedValue::Number(1.0)).unwrap_err();
        assert_eq!(err.code(), BindingErrorCode::Conversion as u32);

        let err = unwrap::<String>(&value).unwrap_err();
        assert!(matches!(err, BindingError::Conversion { .. }));
    }

    #[test]
    fn test_instance_of_walks_ancestors() {
        let element = ManagedValue::object("HTMLElement").extending(["Element", "Node"]);
        assert!(element.is_instance_of("HTMLElement"));
        assert!(element.is_instance_of("Node"));
        assert!(!element.is_instance_of("Document"));
        assert!(!ManagedValue::Null.is_instance_of("Node"));

        let number = ManagedValue::Number(1.0).extending(["Node"]);
        assert_eq!(number, ManagedValue::Number(1.0));
    }

    #[test]
    fn test_frame_pads_with_sentinel() {
        let frame = CallFrame::new(vec![ManagedValue::Number(1.0)]);
        assert_eq!(frame.count(), 1);
        assert_eq!(frame.argument(3), &ManagedValue::NotSupplied);
    }

    #[test]
    fn test_conversion_scope_nesting() {
        let frame = CallFrame::new(Vec::new());
        {
            let _outer = frame.enter_scope();
            let _inner = frame.enter_scope();
            assert_eq!(frame.scope_depth(), 2);
        }
        assert_eq!(frame.scope_depth(), 0);
    }

    #[test]
    fn test_error_codes_and_messages() {
        let err = BindingError::dispatch_exhausted();
        assert_eq!(err.code(), 7001);
        assert_eq!(
            err.to_string(),
            "[7001] Dispatch exhausted: Incorrect number or type of arguments"
        );
        assert_eq!(
            BindingError::feature_disabled("webgl").to_string(),
            "[7002] Feature disabled: Feature webgl is not enabled"
        );
    }
}
