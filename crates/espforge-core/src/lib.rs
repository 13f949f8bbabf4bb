//! espforge Core - Component model, validation, document generation and storage
//!
//! This crate provides the foundational types for espforge:
//! - Catalog components and their typed configuration variables
//! - Value validation by declared data type
//! - Projects: ordered collections of placed component instances
//! - Configuration document generation, validation and merging
//! - A directory-backed store for components, documents and projects

pub mod component;
pub mod document;
pub mod project;
pub mod store;
pub mod validation;
pub mod value;
pub mod variable;

pub use component::{normalize_name, Component, InstanceId, Position, Size};
pub use document::{
    build_document, component_entry, component_snippet, deep_merge, generate, merge_documents,
    parse_document, render, render_with_header, secrets_template, validate_document,
    DocumentError,
};
pub use project::{DeviceSettings, Project, ProjectError};
pub use store::{
    sha256_hex, CatalogStore, ComponentStore, StoreError, StoreManifest, StoredComponent,
    StoredDocument, StoredProject,
};
pub use validation::{validate, ValidationContext, ValidationFailure};
pub use value::{ConfigValue, DataType};
pub use variable::{ConfigVariable, ValueError};
