//! Adapter plan executor
//!
//! Runs a [`CallbackDescriptor`]'s adapter steps directly against a
//! [`NativeHost`], with the same single-exit behavior as the generated Rust
//! adapters: the first failing step ends the call and its error is returned
//! once, no later step runs.

use super::{
    BindingError, CallStack, CallerIdentity, ConversionScope, ExceptionCode, ExecutionContext,
    ManagedValue, NativeArguments, ScopedResource, ScriptArguments,
};
use crate::ir::FeatureGate;
use crate::plan::{AdapterBody, AdapterStep, CallArgument, CallbackDescriptor, Invocation, OnUnavailable};

/// Everything collected for the native call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationArguments {
    pub receiver: Option<ManagedValue>,
    /// Marshalled parameters by name, in order
    pub parameters: Vec<(String, ManagedValue)>,
    pub execution_context: Option<ExecutionContext>,
    pub caller_identity: Option<CallerIdentity>,
    pub script_arguments: Option<ScriptArguments>,
    pub call_stack: Option<CallStack>,
    pub user_gesture: bool,
}

impl InvocationArguments {
    /// Marshalled parameter by name
    pub fn parameter(&self, name: &str) -> Option<&ManagedValue> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }
}

/// Native side of executed adapters
pub trait NativeHost {
    /// Convert an argument to its native representation
    fn convert(&mut self, type_name: &str, value: &ManagedValue) -> Result<ManagedValue, BindingError>;

    /// Convert an argument whose conversion cannot fail
    fn coerce(&mut self, _type_name: &str, value: &ManagedValue) -> ManagedValue {
        value.clone()
    }

    /// Perform the native call, reporting failures through `exception`
    fn invoke(
        &mut self,
        invocation: &Invocation,
        arguments: &InvocationArguments,
        exception: &mut ExceptionCode,
    ) -> ManagedValue;

    /// Run an externally supplied callback
    fn invoke_custom(
        &mut self,
        binding: &str,
        _args: &mut dyn NativeArguments,
    ) -> Result<(), BindingError> {
        Err(BindingError::resource_unavailable(format!(
            "custom callback {} is not available",
            binding
        )))
    }
}

/// How an executed adapter finished
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Return value installed
    Returned(ManagedValue),
    /// Native call made, nothing returned
    Void,
    /// A tolerated resource was unavailable; nothing was invoked
    Skipped(ScopedResource),
    /// Custom callback ran
    Custom,
}

fn acquire(
    resource: ScopedResource,
    args: &dyn NativeArguments,
    first_rest: usize,
    call: &mut InvocationArguments,
) -> bool {
    match resource {
        ScopedResource::ExecutionContext => {
            call.execution_context = args.execution_context();
            call.execution_context.is_some()
        }
        ScopedResource::CallerIdentity => {
            call.caller_identity = args.caller_identity();
            call.caller_identity.is_some()
        }
        ScopedResource::ScriptArguments => {
            call.script_arguments = args.script_arguments(first_rest);
            call.script_arguments.is_some()
        }
        ScopedResource::CallStack => {
            let stack = args.call_stack();
            if stack.is_empty() {
                return false;
            }
            call.call_stack = Some(stack);
            true
        }
    }
}

/// Execute a descriptor's adapter against `args`
pub fn execute(
    descriptor: &CallbackDescriptor,
    args: &mut dyn NativeArguments,
    host: &mut dyn NativeHost,
) -> Result<Completion, BindingError> {
    let steps = match &descriptor.body {
        AdapterBody::Custom => {
            host.invoke_custom(&descriptor.binding.to_string(), args)?;
            return Ok(Completion::Custom);
        }
        AdapterBody::Steps(steps) => steps,
    };

    let first_rest = usize::from(descriptor.needs_receiver) + descriptor.parameter_count;
    let mut call = InvocationArguments::default();
    let mut result = None;
    let mut completion = Completion::Void;
    let mut _scope: Option<ConversionScope> = None;

    for step in steps {
        match step {
            AdapterStep::EnterScope => _scope = Some(args.enter_scope()),
            AdapterStep::Acquire {
                resource,
                on_unavailable,
            } => {
                if !acquire(*resource, &*args, first_rest, &mut call) {
                    return match on_unavailable {
                        OnUnavailable::Raise(message) => {
                            Err(BindingError::resource_unavailable(message.clone()))
                        }
                        OnUnavailable::ReturnVoid => Ok(Completion::Skipped(*resource)),
                    };
                }
            }
            AdapterStep::CheckFeature(gate) => {
                let enabled = match gate {
                    FeatureGate::Runtime(feature) => args.runtime_feature_enabled(feature),
                    FeatureGate::PerContext(feature) => args.context_feature_enabled(feature),
                };
                if !enabled {
                    return Err(BindingError::feature_disabled(gate.feature()));
                }
            }
            AdapterStep::ExtractReceiver { native_type } => {
                let receiver = args.argument(0);
                if !matches!(receiver, ManagedValue::Object(_)) {
                    return Err(BindingError::conversion(format!(
                        "receiver is not a {} object",
                        native_type
                    )));
                }
                call.receiver = Some(receiver.clone());
            }
            AdapterStep::Marshal {
                index,
                name,
                type_name,
                fallible,
            } => {
                let value = if *fallible {
                    host.convert(type_name, args.argument(*index))?
                } else {
                    host.coerce(type_name, args.argument(*index))
                };
                call.parameters.push((name.clone(), value));
            }
            AdapterStep::Invoke(invocation) => {
                call.user_gesture = invocation.arguments.contains(&CallArgument::UserGesture)
                    && args.processing_user_gesture();
                let mut exception: ExceptionCode = 0;
                let value = host.invoke(invocation, &call, &mut exception);
                if invocation.raises_exception && exception != 0 {
                    return Err(BindingError::native_exception(exception));
                }
                result = Some(value);
            }
            AdapterStep::ConvertReturn { .. } => {
                let value = result.take().unwrap_or_default();
                args.set_return_value(value.clone());
                completion = Completion::Returned(value);
            }
        }
    }

    Ok(completion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DefaultTypeRegistry, ExtAttr, Interface, Operation, Parameter, Signature};
    use crate::plan::{synthesize_constructor, synthesize_operation, BindingName, SynthesisContext};
    use crate::runtime::{BindingErrorCode, CallFrame, CoerceManaged};

    /// Host that records invocations and echoes the first parameter
    #[derive(Default)]
    struct RecordingHost {
        invoked: Vec<String>,
        exception: ExceptionCode,
        reject_conversions: bool,
    }

    impl NativeHost for RecordingHost {
        fn convert(&mut self, type_name: &str, value: &ManagedValue) -> Result<ManagedValue, BindingError> {
            if self.reject_conversions {
                return Err(BindingError::conversion(format!("cannot convert to {}", type_name)));
            }
            Ok(value.clone())
        }

        fn coerce(&mut self, type_name: &str, value: &ManagedValue) -> ManagedValue {
            match type_name {
                "long" | "double" => ManagedValue::Number(f64::coerce(value)),
                _ => value.clone(),
            }
        }

        fn invoke(
            &mut self,
            invocation: &Invocation,
            arguments: &InvocationArguments,
            exception: &mut ExceptionCode,
        ) -> ManagedValue {
            self.invoked.push(invocation.callee.function().to_string());
            *exception = self.exception;
            arguments
                .parameters
                .first()
                .map(|(_, v)| v.clone())
                .unwrap_or(ManagedValue::Null)
        }
    }

    fn registry() -> DefaultTypeRegistry {
        DefaultTypeRegistry::new()
    }

    #[test]
    fn test_unavailable_caller_identity_raises_before_invocation() {
        let image = Interface::new("Image")
            .with_flag(ExtAttr::NamedConstructor)
            .constructor_param(Parameter::new("width", "long"));
        let registry = registry();
        let ctx = SynthesisContext { interface: &image, registry: &registry };
        let descriptor = synthesize_constructor(ctx).unwrap().descriptor;

        let mut frame = CallFrame::new(vec![ManagedValue::Number(10.0)]);
        let mut host = RecordingHost::default();
        let err = execute(&descriptor, &mut frame, &mut host).unwrap_err();

        assert_eq!(err.code(), BindingErrorCode::ResourceUnavailable as u32);
        assert!(err.to_string().ends_with("Failed to fetch caller identity"));
        assert!(host.invoked.is_empty());
        assert!(frame.return_value().is_none());
    }

    #[test]
    fn test_named_constructor_with_caller() {
        let image = Interface::new("Image")
            .with_flag(ExtAttr::NamedConstructor)
            .constructor_param(Parameter::new("width", "long"));
        let registry = registry();
        let ctx = SynthesisContext { interface: &image, registry: &registry };
        let descriptor = synthesize_constructor(ctx).unwrap().descriptor;

        let mut frame = CallFrame::new(vec![ManagedValue::String("12".into())]).caller(
            CallerIdentity {
                origin: "https://example.test".into(),
            },
        );
        let mut host = RecordingHost::default();
        let completion = execute(&descriptor, &mut frame, &mut host).unwrap();

        assert_eq!(host.invoked, vec!["create_for_named_constructor"]);
        assert_eq!(completion, Completion::Returned(ManagedValue::Number(12.0)));
    }

    #[test]
    fn test_missing_execution_context_is_void_no_op() {
        let canvas = Interface::new("Canvas");
        let registry = registry();
        let ctx = SynthesisContext { interface: &canvas, registry: &registry };
        let op = Operation::new(
            "flush",
            Signature::void().with_flag(ExtAttr::CallWith(crate::ir::CallWith::ExecutionContext)),
        );
        let descriptor =
            synthesize_operation(ctx, &op, 0, BindingName::callback("Canvas", "flush")).unwrap().descriptor;

        let mut frame = CallFrame::with_receiver(ManagedValue::object("Canvas"), Vec::new());
        let mut host = RecordingHost::default();
        let completion = execute(&descriptor, &mut frame, &mut host).unwrap();

        assert_eq!(completion, Completion::Skipped(ScopedResource::ExecutionContext));
        assert!(host.invoked.is_empty());
    }

    #[test]
    fn test_feature_gate_blocks_call() {
        let canvas = Interface::new("Canvas");
        let registry = registry();
        let ctx = SynthesisContext { interface: &canvas, registry: &registry };
        let op = Operation::new(
            "webgl",
            Signature::void().with_flag(ExtAttr::EnabledPerContext("webgl".into())),
        );
        let descriptor =
            synthesize_operation(ctx, &op, 0, BindingName::callback("Canvas", "webgl")).unwrap().descriptor;
        let mut host = RecordingHost::default();

        let mut frame = CallFrame::with_receiver(ManagedValue::object("Canvas"), Vec::new());
        let err = execute(&descriptor, &mut frame, &mut host).unwrap_err();
        assert_eq!(err, BindingError::feature_disabled("webgl"));

        let mut frame = CallFrame::with_receiver(ManagedValue::object("Canvas"), Vec::new())
            .enable_context_feature("webgl");
        assert_eq!(execute(&descriptor, &mut frame, &mut host).unwrap(), Completion::Void);
        assert_eq!(host.invoked, vec!["webgl"]);
    }

    #[test]
    fn test_nonzero_exception_code_skips_return_conversion() {
        let canvas = Interface::new("Canvas");
        let registry = registry();
        let ctx = SynthesisContext { interface: &canvas, registry: &registry };
        let op = Operation::new(
            "measure",
            Signature::new("double").param(Parameter::new("w", "double")).raises(),
        );
        let descriptor =
            synthesize_operation(ctx, &op, 1, BindingName::callback("Canvas", "measure")).unwrap().descriptor;

        let mut frame = CallFrame::with_receiver(
            ManagedValue::object("Canvas"),
            vec![ManagedValue::Number(2.0)],
        );
        let mut host = RecordingHost {
            exception: 12,
            ..Default::default()
        };
        let err = execute(&descriptor, &mut frame, &mut host).unwrap_err();

        assert_eq!(err, BindingError::native_exception(12));
        assert_eq!(host.invoked.len(), 1);
        assert!(frame.return_value().is_none());
    }

    #[test]
    fn test_infallible_arguments_skip_convert() {
        let canvas = Interface::new("Canvas");
        let registry = registry();
        let ctx = SynthesisContext { interface: &canvas, registry: &registry };
        let mut host = RecordingHost {
            reject_conversions: true,
            ..Default::default()
        };

        let scale = Operation::new("scale", Signature::void().param(Parameter::new("k", "double")));
        let descriptor =
            synthesize_operation(ctx, &scale, 1, BindingName::callback("Canvas", "scale")).unwrap().descriptor;
        let mut frame = CallFrame::with_receiver(
            ManagedValue::object("Canvas"),
            vec![ManagedValue::String("2".into())],
        );
        assert_eq!(execute(&descriptor, &mut frame, &mut host).unwrap(), Completion::Void);
        assert_eq!(host.invoked, vec!["scale"]);

        let store = Operation::new("store", Signature::void().param(Parameter::new("v", "any")));
        let descriptor =
            synthesize_operation(ctx, &store, 1, BindingName::callback("Canvas", "store")).unwrap().descriptor;
        let mut frame = CallFrame::with_receiver(
            ManagedValue::object("Canvas"),
            vec![ManagedValue::String("2".into())],
        );
        assert!(matches!(
            execute(&descriptor, &mut frame, &mut host),
            Err(BindingError::Conversion { .. })
        ));
        assert_eq!(host.invoked, vec!["scale"]);
    }

    #[test]
    fn test_missing_receiver_fails() {
        let canvas = Interface::new("Canvas");
        let registry = registry();
        let ctx = SynthesisContext { interface: &canvas, registry: &registry };
        let op = Operation::new("clear", Signature::void());
        let descriptor =
            synthesize_operation(ctx, &op, 0, BindingName::callback("Canvas", "clear")).unwrap().descriptor;

        let mut frame = CallFrame::new(Vec::new());
        let mut host = RecordingHost::default();
        assert!(matches!(
            execute(&descriptor, &mut frame, &mut host),
            Err(BindingError::Conversion { .. })
        ));
    }

    #[test]
    fn test_scope_closed_after_call() {
        let console = Interface::new("Console");
        let registry = registry();
        let ctx = SynthesisContext { interface: &console, registry: &registry };
        let op = Operation::new(
            "log",
            Signature::void().with_flag(ExtAttr::CallWith(crate::ir::CallWith::CallStack)),
        );
        let descriptor =
            synthesize_operation(ctx, &op, 0, BindingName::callback("Console", "log")).unwrap().descriptor;

        let mut frame = CallFrame::with_receiver(
            ManagedValue::object("Console"),
            vec![ManagedValue::String("hi".into())],
        )
        .stack(vec!["main".into()]);
        let mut host = RecordingHost::default();
        execute(&descriptor, &mut frame, &mut host).unwrap();
        assert_eq!(frame.scope_depth(), 0);
        assert_eq!(host.invoked, vec!["log"]);
    }
}
