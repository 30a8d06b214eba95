//! Postgres schema differ.
//!
//! molt captures a database's schema as a typed object graph, builds a
//! second graph from a declarative YAML document, and computes the ordered
//! DDL statement sequence that transforms the first into the second.
//!
//! # How a run works
//!
//! 1. [`catalog::load_graph`] populates one registry per object kind from
//!    the system catalogs and links cross-references.
//! 2. [`Graph::from_doc`] does the same from the parsed document.
//! 3. [`diff::synthesize`] diffs the two graphs kind by kind in a fixed
//!    dependency order, defers removals of foundational kinds (types,
//!    functions, operators, schemas, ...) to a final reverse-order cleanup
//!    pass, and flattens everything into one statement list.
//!
//! The ordering is the contract: no statement ever references an object
//! that does not yet exist or has already been removed.
//!
//! # Example
//!
//! ```ignore
//! let document = molt::Document::parse(&std::fs::read_to_string("db.yaml")?)?;
//! let mut reader = molt::PgReader::connect("host=localhost dbname=app")?;
//! let stmts = molt::synthesize(&mut reader, &document, &molt::Options::default())?;
//! for stmt in stmts {
//!     println!("{stmt};");
//! }
//! ```

pub mod catalog;
pub mod ddl;
pub mod depends;
mod document;
mod error;
pub mod graph;
mod ident;
mod object;
mod registry;

pub mod diff;

pub use catalog::{CatalogReader, Field, PgReader, Row};
pub use ddl::Render;
pub use diff::{diff_graphs, flatten, synthesize, Options, Stmt};
pub use document::Document;
pub use error::Error;
pub use graph::Graph;
pub use ident::Quoter;
pub use object::{
    Attrs, CastAttrs, CollationAttrs, ColumnAttrs, ConstraintAttrs, ConversionAttrs,
    ExtensionAttrs, ForeignDataWrapperAttrs, ForeignTableAttrs, FunctionAttrs, IndexAttrs, Key,
    Kind, LanguageAttrs, Object, OperatorAttrs, OperatorClassAttrs, OperatorFamilyAttrs,
    RuleAttrs, SchemaAttrs, ServerAttrs, TableAttrs, TriggerAttrs, TsConfigurationAttrs,
    TsDictionaryAttrs, TsParserAttrs, TsTemplateAttrs, TypeAttrs, UserMappingAttrs,
};
pub use registry::Registry;

/// Result type for molt operations.
pub type Result<T> = std::result::Result<T, Error>;
