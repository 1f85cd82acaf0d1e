//! Inspection layer.
//! - ObjectValue: lazy, paginated value tree
//! - ValueReference: live handles resolved through an adapter
//! - ExpressionEvaluator: name resolution and literal rendering

mod adapter;
mod context;
mod evaluator;
mod object;
mod reference;

pub use adapter::{Literal, ObjectValueAdapter, TargetType, TargetValue};
pub use context::{EvaluationContext, EvaluationOptions};
pub use evaluator::{
    escape_string, literal_to_expression, resolve_identifier, resolve_type_names, CompletionData,
    CompletionItem, ExpressionEvaluator, NameResolvingEvaluator, TypeResolver,
};
pub use object::{ChildRange, ObjectPath, ObjectValue, ObjectValueKind, ObjectValueSource};
pub use reference::{
    LiteralValueReference, PlainValue, ValueFlags, ValueRef, ValueReference, ValueReferenceExt,
    ValueSource,
};
