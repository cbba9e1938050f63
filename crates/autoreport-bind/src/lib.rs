pub mod error;
pub mod plan;
pub mod predicate;
pub mod resolver;
pub mod suggest;

pub use error::{BindingError, BindingErrors};
pub use plan::{
    CompiledPredicate, ConditionalBinding, ConditionalFormat, Correlation, CorrelationParameter, ExecutionPlan,
    FieldRef, FieldTarget, NodeBinding, PlaceholderBinding, RepeatBinding,
};
pub use predicate::{CompareOp, Operand, Predicate, PredicateError};
pub use resolver::resolve;
pub use suggest::suggest;
