//! TypeScript bindings.ts generator
//!
//! Generates the managed binding surface: one class per interface whose
//! members forward to native callbacks through `__native(binding, ...)`.
//! Overloaded members get a dispatcher that walks the planned clause chain
//! and calls a private method per clause target.

use crate::error::{Location, StructuralError};
use crate::ir::{Description, Parameter, TypeRegistry};
use crate::plan::{
    AttributeBinding, Check, ClauseAction, ConstructorBinding, DispatchPlan, GeneratedBindings,
    Guard, InterfaceBindings, OperationBinding,
};
use crate::runtime::INVALID_ARGUMENTS;

const PRELUDE: &str = r#"declare function __native(binding: string, ...args: unknown[]): any;

export const NOT_SUPPLIED: unique symbol = Symbol("NOT_SUPPLIED");
export const INVALID_ARGUMENTS = "{INVALID_ARGUMENTS}";

export class NativeWrapper {
  protected readonly __handle: unknown;

  constructor(handle: unknown) {
    this.__handle = handle;
  }
}
"#;

/// Names a parameter cannot take in the generated surface: reserved words in
/// strict-mode class bodies plus the names generated bodies refer to
const RESERVED_NAMES: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally",
    "for", "function", "if", "implements", "import", "in", "instanceof", "interface", "let",
    "new", "null", "package", "private", "protected", "public", "return", "static", "super",
    "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with",
    "yield", "rest", "NOT_SUPPLIED", "INVALID_ARGUMENTS", "TypeError", "__native",
];

/// Parameter name as emitted in TypeScript, with a trailing `_` when reserved
pub(crate) fn ts_ident(name: &str) -> String {
    if RESERVED_NAMES.contains(&name) {
        format!("{}_", name)
    } else {
        name.to_string()
    }
}

/// Generator for bindings.ts
pub struct TypeScriptGenerator<'a> {
    description: &'a Description,
    bindings: &'a GeneratedBindings,
    registry: &'a dyn TypeRegistry,
}

impl<'a> TypeScriptGenerator<'a> {
    /// Create a new TypeScript generator
    pub fn new(
        description: &'a Description,
        bindings: &'a GeneratedBindings,
        registry: &'a dyn TypeRegistry,
    ) -> Self {
        Self {
            description,
            bindings,
            registry,
        }
    }

    /// Generate the complete bindings.ts source
    pub fn generate(&self) -> Result<String, StructuralError> {
        let mut output = String::new();

        output.push_str("// forge-bind binding surface - TypeScript wrapper for native callbacks\n");
        output.push_str("// Generated by forge-bind - do not edit manually\n\n");
        output.push_str(&PRELUDE.replace("{INVALID_ARGUMENTS}", INVALID_ARGUMENTS));

        // Parents before children so `extends` always sees a defined class
        for interface in self.bindings.in_class_order() {
            output.push('\n');
            output.push_str(&self.generate_class(interface)?);
        }

        Ok(output)
    }

    fn managed_type(&self, type_name: &str, location: &Location) -> Result<String, StructuralError> {
        Ok(self.registry.lookup(type_name, location)?.managed.clone())
    }

    fn parameter_list(
        &self,
        params: &[Parameter],
        variadic: bool,
        location: &Location,
    ) -> Result<String, StructuralError> {
        let mut list = params
            .iter()
            .map(|p| {
                let optional_mark = if p.optional { "?" } else { "" };
                Ok(format!(
                    "{}{}: {}",
                    ts_ident(&p.name),
                    optional_mark,
                    self.managed_type(&p.type_name, location)?
                ))
            })
            .collect::<Result<Vec<_>, StructuralError>>()?;
        if variadic {
            list.push("...rest: unknown[]".to_string());
        }
        Ok(list.join(", "))
    }

    fn call_arguments(names: impl IntoIterator<Item = String>, receiver: bool, variadic: bool) -> String {
        let mut args: Vec<String> = Vec::new();
        if receiver {
            args.push("this.__handle".to_string());
        }
        args.extend(names.into_iter().map(|name| ts_ident(&name)));
        if variadic {
            args.push("...rest".to_string());
        }
        args.join(", ")
    }

    /// Generate the class of one interface
    fn generate_class(&self, interface: &InterfaceBindings) -> Result<String, StructuralError> {
        let mut output = String::new();
        let location = Location::interface(&interface.interface);

        if let Some(doc) = self
            .description
            .find(&interface.interface)
            .and_then(|i| i.doc.as_ref())
        {
            output.push_str("/**\n");
            for line in doc.lines() {
                output.push_str(&format!(" * {}\n", line));
            }
            output.push_str(" */\n");
        }

        let parent = interface.parent_class.as_deref().unwrap_or("NativeWrapper");
        output.push_str(&format!(
            "export class {} extends {} {{\n",
            interface.interface, parent
        ));

        let mut members = Vec::new();
        if let Some(constructor) = &interface.constructor {
            members.push(self.generate_constructor(constructor, &location)?);
        }
        for attribute in &interface.attributes {
            members.push(self.generate_attribute(attribute)?);
        }
        if let Some(getter) = &interface.index_getter {
            members.push(format!(
                "  item(index: number): any {{\n    return __native(\"{}\", this.__handle, index);\n  }}\n",
                getter
            ));
        }
        if let Some(setter) = &interface.index_setter {
            members.push(format!(
                "  setItem(index: number, value: any): void {{\n    __native(\"{}\", this.__handle, index, value);\n  }}\n",
                setter
            ));
        }
        for operation in &interface.operations {
            members.push(match operation {
                OperationBinding::Direct {
                    member,
                    binding,
                    parameters,
                    return_type,
                    is_static,
                    variadic,
                } => {
                    let location = Location::member(&interface.interface, member);
                    let static_keyword = if *is_static { "static " } else { "" };
                    let args = Self::call_arguments(
                        parameters.iter().map(|p| p.name.clone()),
                        !is_static,
                        *variadic,
                    );
                    format!(
                        "  {}{}({}): {} {{\n    return __native(\"{}\"{}{});\n  }}\n",
                        static_keyword,
                        member,
                        self.parameter_list(parameters, *variadic, &location)?,
                        self.managed_type(return_type, &location)?,
                        binding,
                        if args.is_empty() { "" } else { ", " },
                        args
                    )
                }
                OperationBinding::Dispatched(plan) => self.generate_dispatcher(plan)?,
            });
        }

        output.push_str(&members.join("\n"));
        output.push_str("}\n");
        Ok(output)
    }

    fn generate_constructor(
        &self,
        constructor: &ConstructorBinding,
        location: &Location,
    ) -> Result<String, StructuralError> {
        let args = Self::call_arguments(
            constructor.parameters.iter().map(|p| p.name.clone()),
            false,
            false,
        );
        Ok(format!(
            "  constructor({}) {{\n    super(__native(\"{}\"{}{}));\n  }}\n",
            self.parameter_list(&constructor.parameters, false, location)?,
            constructor.binding,
            if args.is_empty() { "" } else { ", " },
            args
        ))
    }

    fn generate_attribute(&self, attribute: &AttributeBinding) -> Result<String, StructuralError> {
        let location = Location::member(&attribute.getter.interface, &attribute.name);
        let ty = self.managed_type(&attribute.type_name, &location)?;
        let mut output = format!(
            "  get {}(): {} {{\n    return __native(\"{}\", this.__handle);\n  }}\n",
            attribute.name, ty, attribute.getter
        );
        if let Some(setter) = &attribute.setter {
            output.push_str(&format!(
                "\n  set {}(value: {}) {{\n    __native(\"{}\", this.__handle, value);\n  }}\n",
                attribute.name, ty, setter
            ));
        }
        Ok(output)
    }

    fn guard_condition(guard: &Guard) -> String {
        guard
            .checks
            .iter()
            .map(|check| match check {
                Check::TypeOrNull { name, test, .. } => {
                    let name = ts_ident(name);
                    format!("({} === null || {})", name, test.to_typescript(&name))
                }
                Check::NotSupplied { name, .. } => format!("{} === NOT_SUPPLIED", ts_ident(name)),
            })
            .collect::<Vec<_>>()
            .join(" && ")
    }

    /// Generate a dispatcher and the private method of every clause target
    fn generate_dispatcher(&self, plan: &DispatchPlan) -> Result<String, StructuralError> {
        let location = Location::member(&plan.interface, &plan.member);
        let static_keyword = if plan.is_static { "static " } else { "" };
        let mut params: Vec<String> = plan
            .parameter_names
            .iter()
            .map(|name| format!("{}: any = NOT_SUPPLIED", ts_ident(name)))
            .collect();
        if plan.variadic {
            params.push("...rest: unknown[]".to_string());
        }

        let mut output = format!(
            "  {}{}({}): any {{\n",
            static_keyword,
            plan.member,
            params.join(", ")
        );
        if !plan.variadic {
            output.push_str(&format!(
                "    if (arguments.length > {}) {{\n      throw new TypeError(INVALID_ARGUMENTS);\n    }}\n",
                plan.arity()
            ));
        }

        let mut exhaustive = false;
        for clause in &plan.clauses {
            let action = match &clause.action {
                ClauseAction::Call(target) => format!(
                    "return this._{}({});",
                    target.identifier(),
                    Self::call_arguments(
                        target.parameters.iter().map(|p| p.name.clone()),
                        false,
                        plan.variadic
                    )
                ),
                ClauseAction::Fail => "throw new TypeError(INVALID_ARGUMENTS);".to_string(),
            };
            if clause.guard.is_always() {
                output.push_str(&format!("    {}\n", action));
                exhaustive = true;
                break;
            }
            output.push_str(&format!(
                "    if ({}) {{\n      {}\n    }}\n",
                Self::guard_condition(&clause.guard),
                action
            ));
        }
        if !exhaustive {
            output.push_str("    throw new TypeError(INVALID_ARGUMENTS);\n");
        }
        output.push_str("  }\n");

        for target in plan.targets() {
            let args = Self::call_arguments(
                target.parameters.iter().map(|p| p.name.clone()),
                !plan.is_static,
                plan.variadic,
            );
            output.push_str(&format!(
                "\n  private {}_{}({}): {} {{\n    return __native(\"{}\"{}{});\n  }}\n",
                static_keyword,
                target.identifier(),
                self.parameter_list(&target.parameters, plan.variadic, &location)?,
                self.managed_type(&target.return_type, &location)?,
                target.binding,
                if args.is_empty() { "" } else { ", " },
                args
            ));
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Attribute, DefaultTypeRegistry, ExtAttr, Interface, Operation, Signature};
    use crate::plan::generate;
    use crate::runtime::{BindingError, ManagedValue};
    use pretty_assertions::assert_eq;

    fn render(description: &Description) -> String {
        let registry = DefaultTypeRegistry::for_description(description);
        let bindings = generate(description, &registry).unwrap();
        TypeScriptGenerator::new(description, &bindings, &registry)
            .generate()
            .unwrap()
    }

    fn section<'s>(output: &'s str, start: &str) -> &'s str {
        let begin = output.find(start).unwrap();
        let end = output[begin..].find("\n  }\n").unwrap() + begin + 5;
        &output[begin..end]
    }

    #[test]
    fn test_dispatcher_for_overloads() {
        let description = Description::default().interface(
            Interface::new("Canvas")
                .operation(Operation::new(
                    "draw",
                    Signature::void().param(Parameter::new("x", "double")),
                ))
                .operation(Operation::new(
                    "draw",
                    Signature::void()
                        .param(Parameter::new("x", "double"))
                        .param(Parameter::new("y", "double")),
                )),
        );
        let output = render(&description);

        assert_eq!(
            section(&output, "  draw("),
            r#"  draw(x: any = NOT_SUPPLIED, y: any = NOT_SUPPLIED): any {
    if (arguments.length > 2) {
      throw new TypeError(INVALID_ARGUMENTS);
    }
    if ((x === null || typeof x === "number") && y === NOT_SUPPLIED) {
      return this._draw_1(x);
    }
    if ((x === null || typeof x === "number") && (y === null || typeof y === "number")) {
      return this._draw_2(x, y);
    }
    throw new TypeError(INVALID_ARGUMENTS);
  }
"#
        );
        assert!(output.contains(
            "  private _draw_2(x: number, y: number): void {\n    return __native(\"Canvas_draw_2_Callback\", this.__handle, x, y);\n  }\n"
        ));
    }

    #[test]
    fn test_optional_parameter_clauses() {
        let description = Description::default().interface(Interface::new("File").operation(
            Operation::new(
                "open",
                Signature::void()
                    .param(Parameter::new("mode", "DOMString"))
                    .param(Parameter::new("flags", "long").optional()),
            ),
        ));
        let output = render(&description);

        assert_eq!(
            section(&output, "  open("),
            r#"  open(mode: any = NOT_SUPPLIED, flags: any = NOT_SUPPLIED): any {
    if (arguments.length > 2) {
      throw new TypeError(INVALID_ARGUMENTS);
    }
    if (flags === NOT_SUPPLIED) {
      return this._open_1(mode);
    }
    return this._open_2(mode, flags);
  }
"#
        );
    }

    #[test]
    fn test_class_hierarchy_and_members() {
        let description = Description::default()
            .interface(
                Interface::new("Image")
                    .extends("Node")
                    .with_flag(ExtAttr::Constructor)
                    .with_flag(ExtAttr::CustomIndexedGetter)
                    .constructor_param(Parameter::new("width", "long"))
                    .attribute(Attribute::new("width", "long").readonly())
                    .attribute(Attribute::new("alt", "DOMString"))
                    .with_doc("A decoded image"),
            )
            .interface(Interface::new("Node"));
        let output = render(&description);

        let node = output.find("export class Node extends NativeWrapper").unwrap();
        let image = output.find("export class Image extends Node").unwrap();
        assert!(node < image);
        assert!(output.contains("/**\n * A decoded image\n */\nexport class Image"));
        assert!(output.contains(
            "  constructor(width: number) {\n    super(__native(\"Image_constructor_Callback\", width));\n  }\n"
        ));
        assert!(output.contains("  get width(): number {\n    return __native(\"Image_width_Getter\", this.__handle);\n  }\n"));
        assert!(!output.contains("set width("));
        assert!(output.contains("  set alt(value: string) {\n    __native(\"Image_alt_Setter\", this.__handle, value);\n  }\n"));
        assert!(output.contains("__native(\"Image_numericIndexGetter_Callback\", this.__handle, index)"));
    }

    #[test]
    fn test_static_member() {
        let description = Description::default().interface(
            Interface::new("Clock")
                .operation(Operation::new("now", Signature::new("double")).static_op()),
        );
        let output = render(&description);
        assert!(output.contains("  static now(): number {\n    return __native(\"Clock_now_Callback\");\n  }\n"));
    }

    #[test]
    fn test_any_guard_agrees_with_select() {
        let description = Description::default().interface(
            Interface::new("Store")
                .operation(Operation::new(
                    "put",
                    Signature::void().param(Parameter::new("v", "long")),
                ))
                .operation(Operation::new(
                    "put",
                    Signature::void()
                        .param(Parameter::new("v", "any"))
                        .param(Parameter::new("w", "any")),
                )),
        );
        let registry = DefaultTypeRegistry::for_description(&description);
        let bindings = generate(&description, &registry).unwrap();
        let output = TypeScriptGenerator::new(&description, &bindings, &registry)
            .generate()
            .unwrap();

        assert!(output.contains(
            "    if ((v === null || v !== NOT_SUPPLIED) && (w === null || w !== NOT_SUPPLIED)) {\n      return this._put_2(v, w);\n    }\n"
        ));
        assert!(!output.contains("!== undefined"));

        let OperationBinding::Dispatched(plan) = &bindings.find("Store").unwrap().operations[0] else {
            panic!("put should be dispatched");
        };
        // put("s"): the string fails the `long` clause and `w` was omitted.
        let err = plan.select(&[ManagedValue::String("s".into())]).unwrap_err();
        assert_eq!(err, BindingError::dispatch_exhausted());
        let both = [ManagedValue::String("s".into()), ManagedValue::Null];
        assert_eq!(plan.select(&both).unwrap().identifier(), "put_2");
    }

    #[test]
    fn test_instanceof_guard_accepts_subclasses() {
        let description = Description::default()
            .interface(Interface::new("Node"))
            .interface(Interface::new("Elem").extends("Node"))
            .interface(
                Interface::new("Doc")
                    .operation(Operation::new(
                        "adopt",
                        Signature::void().param(Parameter::new("n", "Node")),
                    ))
                    .operation(Operation::new(
                        "adopt",
                        Signature::void()
                            .param(Parameter::new("n", "Node"))
                            .param(Parameter::new("deep", "boolean")),
                    )),
            );
        let registry = DefaultTypeRegistry::for_description(&description);
        let bindings = generate(&description, &registry).unwrap();
        let output = TypeScriptGenerator::new(&description, &bindings, &registry)
            .generate()
            .unwrap();
        assert!(output.contains("if ((n === null || n instanceof Node) && deep === NOT_SUPPLIED) {"));

        let OperationBinding::Dispatched(plan) = &bindings.find("Doc").unwrap().operations[0] else {
            panic!("adopt should be dispatched");
        };
        let ancestors: Vec<String> = description
            .lineage("Elem")
            .iter()
            .skip(1)
            .map(|interface| interface.name.clone())
            .collect();
        let elem = ManagedValue::object("Elem").extending(ancestors);
        assert_eq!(plan.select(&[elem]).unwrap().identifier(), "adopt_1");
    }

    #[test]
    fn test_reserved_parameter_names_are_renamed() {
        let description = Description::default().interface(
            Interface::new("File")
                .operation(Operation::new(
                    "open",
                    Signature::void()
                        .param(Parameter::new("mode", "DOMString"))
                        .param(Parameter::new("default", "long").optional()),
                ))
                .operation(Operation::new(
                    "log",
                    Signature::void().param(Parameter::new("arguments", "DOMString")),
                )),
        );
        let output = render(&description);

        assert!(output.contains("  open(mode: any = NOT_SUPPLIED, default_: any = NOT_SUPPLIED): any {"));
        assert!(output.contains("    if (default_ === NOT_SUPPLIED) {\n      return this._open_1(mode);\n    }\n"));
        assert!(output.contains("    return this._open_2(mode, default_);\n"));
        assert!(output.contains("  private _open_2(mode: string, default_: number): void {"));
        assert!(output.contains(
            "  log(arguments_: string): void {\n    return __native(\"File_log_Callback\", this.__handle, arguments_);\n  }\n"
        ));
        assert!(crate::build::transpile_bindings(&output).is_ok());
    }

    #[test]
    fn test_ts_ident() {
        assert_eq!(ts_ident("class"), "class_");
        assert_eq!(ts_ident("rest"), "rest_");
        assert_eq!(ts_ident("type"), "type");
        assert_eq!(ts_ident("mode"), "mode");
    }

    #[test]
    fn test_prelude() {
        let output = render(&Description::default());
        assert!(output.contains("declare function __native("));
        assert!(output.contains("export const INVALID_ARGUMENTS = \"Incorrect number or type of arguments\";"));
        assert!(output.contains("export class NativeWrapper {"));
    }
}
