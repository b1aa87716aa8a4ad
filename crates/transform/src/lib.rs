//! Rule-based transformation engine — reshapes data between the platform's
//! canonical schema and each external system's wire format.

pub mod condition;
pub mod engine;
pub mod error;
pub mod functions;
pub mod lookup;
pub mod path;
pub mod repository;
pub mod rule;
pub mod validation;

pub use engine::{TransformMetadata, TransformOptions, TransformResult, TransformationEngine};
pub use error::{TransformError, TransformIssue};
pub use functions::FunctionRegistry;
pub use lookup::LookupStore;
pub use repository::{InMemoryRuleRepository, RuleRepository};
pub use rule::{
    DataType, FieldMapping, LookupTable, TransformationCondition, TransformationRule,
    TransformationType, ValidationRule, ValidationSeverity, ValidationType,
};
