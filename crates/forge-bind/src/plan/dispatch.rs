//! Dispatch clause planning
//!
//! Turns an overload group that needs dispatch into an ordered chain of
//! guarded clauses. Guards are tested in order and the first match wins, so
//! clause order is part of the generated system's observable behavior and is
//! never rearranged.

use crate::error::{Location, StructuralError};
use crate::ir::{CallWith, Parameter, TypeRegistry, TypeTest};
use crate::plan::binding::BindingName;
use crate::plan::grouper::OverloadGroup;
use crate::runtime::{BindingError, ManagedValue, NOT_SUPPLIED};

/// One condition over the call's declared arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Check {
    /// Argument matches the declared type or is null
    TypeOrNull {
        position: usize,
        name: String,
        test: TypeTest,
    },
    /// Argument is the "not supplied" sentinel
    NotSupplied { position: usize, name: String },
}

impl Check {
    pub fn position(&self) -> usize {
        match self {
            Check::TypeOrNull { position, .. } | Check::NotSupplied { position, .. } => *position,
        }
    }

    /// Evaluate against the declared arguments (receiver excluded)
    pub fn holds(&self, args: &[ManagedValue]) -> bool {
        let value = args.get(self.position()).unwrap_or(&NOT_SUPPLIED);
        match self {
            Check::TypeOrNull { test, .. } => value.is_null() || test.matches(value),
            Check::NotSupplied { .. } => !value.is_supplied(),
        }
    }
}

/// Conjunction of checks; empty means always true
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Guard {
    pub checks: Vec<Check>,
}

impl Guard {
    pub fn always() -> Self {
        Self::default()
    }

    pub fn is_always(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn holds(&self, args: &[ManagedValue]) -> bool {
        self.checks.iter().all(|check| check.holds(args))
    }
}

/// Callback a clause forwards to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClauseTarget {
    /// Index of the operation within its group
    pub operation: usize,
    /// Truncated parameter count
    pub arity: usize,
    pub binding: BindingName,
    /// Parameters of the truncated signature
    pub parameters: Vec<Parameter>,
    pub return_type: String,
}

impl ClauseTarget {
    /// Overload identifier, e.g. `draw_1`
    pub fn identifier(&self) -> &str {
        &self.binding.identifier
    }
}

/// What a matching clause does
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClauseAction {
    Call(ClauseTarget),
    /// Raise the invalid-arguments error
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DispatchClause {
    pub guard: Guard,
    pub action: ClauseAction,
}

/// Ordered clause chain for one overload group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DispatchPlan {
    pub interface: String,
    pub member: String,
    pub is_static: bool,
    /// Group-wide formal parameter names
    pub parameter_names: Vec<String>,
    /// Trailing arguments are captured as script arguments
    pub variadic: bool,
    pub clauses: Vec<DispatchClause>,
}

impl DispatchPlan {
    /// Group-wide arity
    pub fn arity(&self) -> usize {
        self.parameter_names.len()
    }

    /// Clause targets in clause order
    pub fn targets(&self) -> impl Iterator<Item = &ClauseTarget> {
        self.clauses.iter().filter_map(|clause| match &clause.action {
            ClauseAction::Call(target) => Some(target),
            ClauseAction::Fail => None,
        })
    }

    /// Whether the chain ends in the terminal failure clause
    pub fn has_terminal_failure(&self) -> bool {
        matches!(
            self.clauses.last(),
            Some(DispatchClause {
                action: ClauseAction::Fail,
                ..
            })
        )
    }

    /// Pick the clause target for the declared arguments of a call
    ///
    /// Missing trailing arguments count as not supplied. More arguments than
    /// the group declares never match.
    pub fn select(&self, args: &[ManagedValue]) -> Result<&ClauseTarget, BindingError> {
        if !self.variadic && args.len() > self.arity() {
            return Err(BindingError::dispatch_exhausted());
        }
        for clause in &self.clauses {
            if clause.guard.holds(args) {
                return match &clause.action {
                    ClauseAction::Call(target) => Ok(target),
                    ClauseAction::Fail => Err(BindingError::dispatch_exhausted()),
                };
            }
        }
        Err(BindingError::dispatch_exhausted())
    }
}

struct ClauseCounter<'a> {
    interface: &'a str,
    member: &'a str,
    next: usize,
}

impl ClauseCounter<'_> {
    fn binding(&mut self) -> BindingName {
        let identifier = format!("{}_{}", self.member, self.next);
        self.next += 1;
        BindingName::callback(self.interface, &identifier)
    }
}

/// Plan the clause chain of a group that requires dispatch
pub fn plan_dispatch(
    group: &OverloadGroup<'_>,
    registry: &dyn TypeRegistry,
) -> Result<DispatchPlan, StructuralError> {
    let names = group.parameter_names()?;
    let location = Location::member(group.interface, group.name);
    let mut counter = ClauseCounter {
        interface: group.interface,
        member: group.name,
        next: 1,
    };

    let type_or_null = |param: &Parameter, position: usize| -> Result<Check, StructuralError> {
        let info = registry.lookup(&param.type_name, &location)?;
        Ok(Check::TypeOrNull {
            position,
            name: names[position].clone(),
            test: info.test.clone(),
        })
    };
    let not_supplied = |position: usize| Check::NotSupplied {
        position,
        name: names[position].clone(),
    };

    let mut clauses = Vec::new();
    let target = |operation: usize, arity: usize, counter: &mut ClauseCounter<'_>| {
        let op = group.operations[operation];
        ClauseAction::Call(ClauseTarget {
            operation,
            arity,
            binding: counter.binding(),
            parameters: op.signature.truncated(arity).to_vec(),
            return_type: op.signature.return_type.clone(),
        })
    };

    if group.operations.len() == 1 {
        let op = group.operations[0];
        for position in op.signature.optional_positions().into_iter().rev() {
            clauses.push(DispatchClause {
                guard: Guard {
                    checks: vec![not_supplied(position)],
                },
                action: target(0, position, &mut counter),
            });
        }
        clauses.push(DispatchClause {
            guard: Guard::always(),
            action: target(0, op.signature.arity(), &mut counter),
        });
    } else {
        let guard_for = |index: usize, arity: usize| -> Result<Guard, StructuralError> {
            let params = &group.operations[index].signature.parameters;
            let checks = (0..names.len())
                .map(|i| {
                    if i < arity {
                        type_or_null(&params[i], i)
                    } else {
                        Ok(not_supplied(i))
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Guard { checks })
        };

        for (index, op) in group.operations.iter().enumerate() {
            for position in op.signature.optional_positions() {
                clauses.push(DispatchClause {
                    guard: guard_for(index, position)?,
                    action: target(index, position, &mut counter),
                });
            }
            clauses.push(DispatchClause {
                guard: guard_for(index, op.signature.arity())?,
                action: target(index, op.signature.arity(), &mut counter),
            });
        }
        clauses.push(DispatchClause {
            guard: Guard::always(),
            action: ClauseAction::Fail,
        });
    }

    Ok(DispatchPlan {
        interface: group.interface.to_string(),
        member: group.name.to_string(),
        is_static: group.is_static(),
        variadic: group
            .operations
            .iter()
            .any(|op| op.flags().call_with() == Some(CallWith::CallStack)),
        parameter_names: names,
        clauses,
    })
}
