//! Parameter schema and validation

pub mod schema;
pub mod validator;
pub mod value_set;

pub use schema::{
    DependencyEffect, DependencyRule, ParamKind, ParameterDef, ParameterSchema, SchemaError,
};
pub use validator::{validate, Rule, ValidationError, ValidationErrors};
pub use value_set::{RawValues, ValueSet};
