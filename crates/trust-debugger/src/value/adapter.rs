//! Backend bridge consumed during evaluation.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::DEFAULT_CHILD_TIMEOUT;
use crate::error::{EvalError, EvalResult};

use super::context::EvaluationContext;
use super::object::{ChildRange, ObjectPath, ObjectValue, ObjectValueSource};
use super::reference::{ValueFlags, ValueRef};

/// Opaque debuggee value owned by the backend.
#[derive(Clone)]
pub struct TargetValue(Arc<dyn Any + Send + Sync>);

impl TargetValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for TargetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TargetValue(..)")
    }
}

/// Opaque debuggee type owned by the backend.
#[derive(Clone)]
pub struct TargetType(Arc<dyn Any + Send + Sync>);

impl TargetType {
    pub fn new<T: Any + Send + Sync>(ty: T) -> Self {
        Self(Arc::new(ty))
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TargetType(..)")
    }
}

/// Host-side rendering of a debuggee value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Char(char),
    String(String),
    /// Raw address.
    Pointer(u64),
    /// Anything else, already rendered by the backend.
    Other(String),
}

/// Runtime-specific value access used by evaluators and value references.
pub trait ObjectValueAdapter: Send + Sync {
    fn is_null(&self, ctx: &EvaluationContext, value: &TargetValue) -> bool;

    fn is_primitive(&self, ctx: &EvaluationContext, value: &TargetValue) -> bool;

    fn is_array(&self, ctx: &EvaluationContext, value: &TargetValue) -> bool;

    fn is_class_instance(&self, ctx: &EvaluationContext, value: &TargetValue) -> bool;

    fn value_type(&self, ctx: &EvaluationContext, value: &TargetValue) -> EvalResult<TargetType>;

    fn type_name(&self, ctx: &EvaluationContext, ty: &TargetType) -> String;

    fn local_variables(&self, ctx: &EvaluationContext) -> EvalResult<Vec<ValueRef>>;

    fn parameters(&self, ctx: &EvaluationContext) -> EvalResult<Vec<ValueRef>>;

    fn this_reference(&self, ctx: &EvaluationContext) -> EvalResult<Option<ValueRef>>;

    fn members(
        &self,
        ctx: &EvaluationContext,
        ty: &TargetType,
        object: &TargetValue,
    ) -> EvalResult<Vec<ValueRef>>;

    fn member(
        &self,
        ctx: &EvaluationContext,
        ty: &TargetType,
        object: &TargetValue,
        name: &str,
    ) -> EvalResult<Option<ValueRef>> {
        Ok(self
            .members(ctx, ty, object)?
            .into_iter()
            .find(|member| member.name() == name))
    }

    fn array_element(
        &self,
        _ctx: &EvaluationContext,
        _array: &TargetValue,
        _indices: &[usize],
    ) -> EvalResult<ValueRef> {
        Err(EvalError::not_supported())
    }

    fn cast(
        &self,
        ctx: &EvaluationContext,
        value: &TargetValue,
        ty: &TargetType,
    ) -> EvalResult<TargetValue>;

    fn to_literal(&self, ctx: &EvaluationContext, value: &TargetValue) -> EvalResult<Literal>;

    /// Materialize a host literal in the debuggee.
    fn create_literal(&self, _ctx: &EvaluationContext, _literal: &Literal) -> EvalResult<TargetValue> {
        Err(EvalError::not_supported())
    }

    fn create_object_value(
        &self,
        ctx: &EvaluationContext,
        source: Arc<dyn ObjectValueSource>,
        path: ObjectPath,
        value: &TargetValue,
        flags: ValueFlags,
    ) -> EvalResult<ObjectValue>;

    fn object_value_children(
        &self,
        ctx: &EvaluationContext,
        path: &ObjectPath,
        object: &TargetValue,
        range: ChildRange,
    ) -> EvalResult<Vec<ObjectValue>>;

    fn call_to_string(&self, ctx: &EvaluationContext, value: &TargetValue) -> EvalResult<String>;

    fn default_child_evaluation_timeout(&self) -> Duration {
        DEFAULT_CHILD_TIMEOUT
    }

    /// Block until pending runtime invocations settle.
    fn wait_runtime_invokes(&self) {}
}
