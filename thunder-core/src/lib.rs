//! Core contracts for the Thunder flow engine.
//!
//! This crate defines the flow definition model, the flow-instance context,
//! the executor contract, the collaborator provider traits, and typed
//! configuration. Engine, executor, and store crates all build on these
//! types without depending on each other.

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod flow;
pub mod page;
pub mod provider;

pub use config::{StoreMode, ThunderConfig};
pub use context::{
    Application, AssertionConfig, AuthenticatedUser, ExecutionRecord, FlowContext, FlowStatus,
    HttpContext,
};
pub use error::{ErrorDetail, ServiceError};
pub use executor::{
    ExecutionStatus, Executor, ExecutorError, ExecutorResponse, ExecutorType,
};
pub use flow::{
    is_valid_handle, ExecutorRef, FlowDefinition, FlowType, InputDescriptor, InputType,
    NodeDefinition, NodeType, Prompt, PromptAction, NON_SEARCHABLE_IDENTIFIERS,
};
pub use page::{Page, Pageable};
