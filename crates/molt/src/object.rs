//! The typed-object model.
//!
//! Every database object molt knows about is an [`Object`]: a [`Kind`], a
//! composite [`Key`] of two or three identifying fields, a handful of common
//! optional fields (owner, comment, rename hint, catalog oid) and a
//! kind-specific [`Attrs`] payload. Two objects of the same kind with equal
//! keys are the same logical object on both sides of a diff.
//!
//! The document encodes kind + key as a *typed identifier* string, e.g.
//! `"operator class box_ops using gist"` or `"cast (integer as text)"`.
//! Parsing and rendering of that grammar lives here too.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::Error;

/// The closed set of object kinds, one registry each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Extension,
    Language,
    Schema,
    Type,
    Function,
    Operator,
    OperatorFamily,
    OperatorClass,
    Table,
    Constraint,
    Index,
    Column,
    Trigger,
    Rule,
    Conversion,
    TsDictionary,
    TsTemplate,
    TsParser,
    TsConfiguration,
    Cast,
    Collation,
    ForeignDataWrapper,
    Server,
    UserMapping,
    ForeignTable,
}

impl Kind {
    /// Per-kind diff order. Each kind may only depend on kinds processed
    /// earlier (or on kinds structurally incapable of forward references).
    /// This list is the authoritative ordering contract.
    pub const FORWARD_ORDER: [Kind; 25] = [
        Kind::Extension,
        Kind::Language,
        Kind::Schema,
        Kind::Type,
        Kind::Function,
        Kind::Operator,
        Kind::OperatorFamily,
        Kind::OperatorClass,
        Kind::Table,
        Kind::Constraint,
        Kind::Index,
        Kind::Column,
        Kind::Trigger,
        Kind::Rule,
        Kind::Conversion,
        Kind::TsDictionary,
        Kind::TsTemplate,
        Kind::TsParser,
        Kind::TsConfiguration,
        Kind::Cast,
        Kind::Collation,
        Kind::ForeignDataWrapper,
        Kind::Server,
        Kind::UserMapping,
        Kind::ForeignTable,
    ];

    /// Kinds whose removals are deferred to the cleanup pass, in the order
    /// the cleanup pass drops them (reverse dependency order).
    pub const CLEANUP_ORDER: [Kind; 10] = [
        Kind::Operator,
        Kind::OperatorClass,
        Kind::OperatorFamily,
        Kind::Function,
        Kind::Type,
        Kind::Extension,
        Kind::Schema,
        Kind::Server,
        Kind::ForeignDataWrapper,
        Kind::Language,
    ];

    /// The kind word used in typed identifiers and messages.
    pub fn word(self) -> &'static str {
        match self {
            Kind::Extension => "extension",
            Kind::Language => "language",
            Kind::Schema => "schema",
            Kind::Type => "type",
            Kind::Function => "function",
            Kind::Operator => "operator",
            Kind::OperatorFamily => "operator family",
            Kind::OperatorClass => "operator class",
            Kind::Table => "table",
            Kind::Constraint => "constraint",
            Kind::Index => "index",
            Kind::Column => "column",
            Kind::Trigger => "trigger",
            Kind::Rule => "rule",
            Kind::Conversion => "conversion",
            Kind::TsDictionary => "text search dictionary",
            Kind::TsTemplate => "text search template",
            Kind::TsParser => "text search parser",
            Kind::TsConfiguration => "text search configuration",
            Kind::Cast => "cast",
            Kind::Collation => "collation",
            Kind::ForeignDataWrapper => "foreign data wrapper",
            Kind::Server => "server",
            Kind::UserMapping => "user mapping",
            Kind::ForeignTable => "foreign table",
        }
    }

    /// Removal deferred to the cleanup pass?
    pub fn is_foundational(self) -> bool {
        Kind::CLEANUP_ORDER.contains(&self)
    }

    /// First key field is a schema name.
    pub fn schema_scoped(self) -> bool {
        !matches!(
            self,
            Kind::Schema
                | Kind::Extension
                | Kind::Language
                | Kind::Cast
                | Kind::ForeignDataWrapper
                | Kind::Server
                | Kind::UserMapping
        )
    }

    /// Lives inside a table (key is schema, table, name).
    pub fn table_scoped(self) -> bool {
        matches!(
            self,
            Kind::Column | Kind::Constraint | Kind::Index | Kind::Trigger | Kind::Rule
        )
    }

    /// Index of the name field inside the key, for rename handling.
    pub fn name_field(self) -> usize {
        if self.table_scoped() {
            2
        } else if self.schema_scoped() {
            1
        } else {
            0
        }
    }

    /// Match a typed identifier against the kind vocabulary. Returns the
    /// kind and the remainder after the kind word. Longer kind words win
    /// (`operator class c using gist` is not an operator named `class ...`).
    pub fn parse_word(entry: &str) -> Option<(Kind, &str)> {
        const WORDS: [(&str, Kind); 25] = [
            ("operator class ", Kind::OperatorClass),
            ("operator family ", Kind::OperatorFamily),
            ("operator ", Kind::Operator),
            ("text search configuration ", Kind::TsConfiguration),
            ("text search dictionary ", Kind::TsDictionary),
            ("text search parser ", Kind::TsParser),
            ("text search template ", Kind::TsTemplate),
            ("foreign data wrapper ", Kind::ForeignDataWrapper),
            ("foreign table ", Kind::ForeignTable),
            ("user mapping for ", Kind::UserMapping),
            ("extension ", Kind::Extension),
            ("language ", Kind::Language),
            ("schema ", Kind::Schema),
            ("type ", Kind::Type),
            ("function ", Kind::Function),
            ("table ", Kind::Table),
            ("constraint ", Kind::Constraint),
            ("index ", Kind::Index),
            ("column ", Kind::Column),
            ("trigger ", Kind::Trigger),
            ("rule ", Kind::Rule),
            ("conversion ", Kind::Conversion),
            ("cast ", Kind::Cast),
            ("collation ", Kind::Collation),
            ("server ", Kind::Server),
        ];
        for (word, kind) in WORDS {
            if let Some(rest) = entry.strip_prefix(word) {
                let rest = rest.trim();
                if !rest.is_empty() {
                    return Some((kind, rest));
                }
            }
        }
        None
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.word())
    }
}

/// Composite key: 1-3 identifying fields in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Vec<String>);

impl Key {
    pub fn one(a: impl Into<String>) -> Key {
        Key(vec![a.into()])
    }

    pub fn two(a: impl Into<String>, b: impl Into<String>) -> Key {
        Key(vec![a.into(), b.into()])
    }

    pub fn three(a: impl Into<String>, b: impl Into<String>, c: impl Into<String>) -> Key {
        Key(vec![a.into(), b.into(), c.into()])
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    pub fn field(&self, i: usize) -> &str {
        &self.0[i]
    }

    /// A copy of this key with the name field replaced, used to look up the
    /// pre-rename object a rename hint points at.
    pub fn with_name(&self, kind: Kind, name: &str) -> Key {
        let mut fields = self.0.clone();
        fields[kind.name_field()] = name.to_string();
        Key(fields)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// One database object, on either side of a diff.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub kind: Kind,
    pub key: Key,
    pub owner: Option<String>,
    pub description: Option<String>,
    /// Rename hint, document side only: the catalog-side name this object
    /// continues.
    pub oldname: Option<String>,
    /// Catalog identity, used only to join auxiliary catalog rows. Absent
    /// for document-sourced objects.
    pub oid: Option<i64>,
    /// Ownership references attached by the linker (registry order).
    pub children: Vec<(Kind, Key)>,
    /// Usage back-references attached by the linker (e.g. columns using a
    /// type). Stored as keys, resolved through the graph, never pointers.
    pub dependents: Vec<(Kind, Key)>,
    pub attrs: Attrs,
}

impl Object {
    pub fn new(kind: Kind, key: Key) -> Object {
        Object {
            kind,
            key,
            owner: None,
            description: None,
            oldname: None,
            oid: None,
            children: Vec::new(),
            dependents: Vec::new(),
            attrs: Attrs::default_for(kind),
        }
    }

    /// The schema this object lives in, if it is schema-scoped.
    pub fn schema(&self) -> Option<&str> {
        self.kind.schema_scoped().then(|| self.key.field(0))
    }

    /// The object's own name (last identifying field for most kinds).
    pub fn name(&self) -> &str {
        self.key.field(self.kind.name_field())
    }

    /// Render the typed identifier used as this object's document key.
    pub fn extern_key(&self) -> String {
        let k = &self.key;
        match self.kind {
            Kind::Cast => format!("cast ({} as {})", k.field(0), k.field(1)),
            Kind::Function => format!("function {}({})", k.field(1), k.field(2)),
            Kind::Operator => format!("operator {}({})", k.field(1), k.field(2)),
            Kind::OperatorClass => {
                format!("operator class {} using {}", k.field(1), k.field(2))
            }
            Kind::OperatorFamily => {
                format!("operator family {} using {}", k.field(1), k.field(2))
            }
            Kind::UserMapping => {
                format!("user mapping for {} server {}", k.field(0), k.field(1))
            }
            _ => format!("{} {}", self.kind.word(), self.name()),
        }
    }
}

/// Split a signature like `f(integer, text)` into name and argument list.
pub fn split_signature(s: &str) -> Result<(&str, &str), Error> {
    let open = s
        .find('(')
        .ok_or_else(|| Error::format(s, "expected a parenthesized argument list"))?;
    let close = s
        .rfind(')')
        .filter(|&c| c > open)
        .ok_or_else(|| Error::format(s, "unbalanced parentheses"))?;
    Ok((s[..open].trim(), s[open + 1..close].trim()))
}

/// Split `name using method` (operator classes and families).
pub fn split_using(s: &str) -> Result<(&str, &str), Error> {
    s.rsplit_once(" using ")
        .map(|(name, method)| (name.trim(), method.trim()))
        .ok_or_else(|| Error::format(s, "expected 'name using method'"))
}

/// Split `(source as target)` (casts).
pub fn split_cast(s: &str) -> Result<(&str, &str), Error> {
    let inner = s
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| Error::format(s, "expected '(source as target)'"))?;
    inner
        .split_once(" as ")
        .map(|(src, tgt)| (src.trim(), tgt.trim()))
        .ok_or_else(|| Error::format(s, "expected '(source as target)'"))
}

/// Split `user server name` (user mappings, after the `for` word).
pub fn split_user_mapping(s: &str) -> Result<(&str, &str), Error> {
    s.split_once(" server ")
        .map(|(user, server)| (user.trim(), server.trim()))
        .ok_or_else(|| Error::format(s, "expected 'user mapping for user server name'"))
}

// ---------------------------------------------------------------------------
// Kind-specific attributes
// ---------------------------------------------------------------------------

/// Kind-specific attributes. Exactly one variant per kind; unknown document
/// fields are rejected at deserialization time rather than silently kept.
#[derive(Debug, Clone, PartialEq)]
pub enum Attrs {
    Schema(SchemaAttrs),
    Extension(ExtensionAttrs),
    Language(LanguageAttrs),
    Cast(CastAttrs),
    Collation(CollationAttrs),
    Conversion(ConversionAttrs),
    Type(TypeAttrs),
    Table(TableAttrs),
    Column(ColumnAttrs),
    Constraint(ConstraintAttrs),
    Index(IndexAttrs),
    Function(FunctionAttrs),
    Operator(OperatorAttrs),
    OperatorClass(OperatorClassAttrs),
    OperatorFamily(OperatorFamilyAttrs),
    Rule(RuleAttrs),
    Trigger(TriggerAttrs),
    TsDictionary(TsDictionaryAttrs),
    TsTemplate(TsTemplateAttrs),
    TsParser(TsParserAttrs),
    TsConfiguration(TsConfigurationAttrs),
    ForeignDataWrapper(ForeignDataWrapperAttrs),
    Server(ServerAttrs),
    UserMapping(UserMappingAttrs),
    ForeignTable(ForeignTableAttrs),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaAttrs {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtensionAttrs {
    pub schema: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LanguageAttrs {
    pub trusted: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CastAttrs {
    pub function: Option<String>,
    /// `implicit`, `assignment` or `explicit`.
    pub context: Option<String>,
    /// `function`, `inout` or `binary`.
    pub method: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollationAttrs {
    pub lc_collate: Option<String>,
    pub lc_ctype: Option<String>,
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversionAttrs {
    pub source_encoding: Option<String>,
    pub dest_encoding: Option<String>,
    pub function: Option<String>,
    pub default: Option<bool>,
}

/// One struct for every type flavor; the populated field group decides
/// whether the type is an enum, a composite, a domain or a base type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeAttrs {
    /// Enum labels, in order.
    pub labels: Option<Vec<String>>,
    /// Composite attributes: ordered list of single-entry name -> type maps.
    pub attributes: Option<Vec<IndexMap<String, String>>>,
    /// Domain base type.
    pub base: Option<String>,
    /// Domain check constraint.
    pub check: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub internallength: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableAttrs {
    pub unlogged: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnAttrs {
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub not_null: Option<bool>,
    pub default: Option<String>,
    pub statistics: Option<i32>,
    pub inherited: Option<bool>,
}

/// Constraint flavor is decided by which of `check`, `primary_key`,
/// `unique` or `foreign_key` is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstraintAttrs {
    pub check: Option<String>,
    pub primary_key: Option<Vec<String>>,
    pub unique: Option<Vec<String>>,
    pub foreign_key: Option<Vec<String>>,
    pub ref_table: Option<String>,
    pub ref_columns: Option<Vec<String>>,
    pub on_update: Option<String>,
    pub on_delete: Option<String>,
    pub deferrable: Option<bool>,
    pub deferred: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexAttrs {
    pub access_method: Option<String>,
    pub keys: Option<Vec<String>>,
    pub unique: Option<bool>,
    pub predicate: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionAttrs {
    pub language: Option<String>,
    pub returns: Option<String>,
    pub source: Option<String>,
    /// `immutable`, `stable` or `volatile`.
    pub volatility: Option<String>,
    pub strict: Option<bool>,
    pub security_definer: Option<bool>,
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorAttrs {
    pub procedure: Option<String>,
    pub commutator: Option<String>,
    pub negator: Option<String>,
    pub restrict: Option<String>,
    pub join: Option<String>,
    pub hashes: Option<bool>,
    pub merges: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorClassAttrs {
    pub family: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub default: Option<bool>,
    pub storage: Option<String>,
    /// Strategy number -> operator signature.
    pub operators: Option<IndexMap<i32, String>>,
    /// Support number -> function signature.
    pub functions: Option<IndexMap<i32, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorFamilyAttrs {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleAttrs {
    /// `select`, `insert`, `update` or `delete`.
    pub event: Option<String>,
    pub instead: Option<bool>,
    pub condition: Option<String>,
    pub actions: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerAttrs {
    /// `before`, `after` or `instead of`.
    pub timing: Option<String>,
    pub events: Option<Vec<String>>,
    /// `row` or `statement`.
    pub level: Option<String>,
    pub procedure: Option<String>,
    pub condition: Option<String>,
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TsDictionaryAttrs {
    pub template: Option<String>,
    pub options: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TsTemplateAttrs {
    pub init: Option<String>,
    pub lexize: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TsParserAttrs {
    pub start: Option<String>,
    pub gettoken: Option<String>,
    pub end: Option<String>,
    pub lextypes: Option<String>,
    pub headline: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TsConfigurationAttrs {
    pub parser: Option<String>,
    /// Token type -> dictionaries consulted, in order.
    pub mappings: Option<IndexMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForeignDataWrapperAttrs {
    pub handler: Option<String>,
    pub validator: Option<String>,
    pub options: Option<IndexMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerAttrs {
    pub wrapper: Option<String>,
    #[serde(rename = "type")]
    pub server_type: Option<String>,
    pub version: Option<String>,
    pub options: Option<IndexMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserMappingAttrs {
    pub options: Option<IndexMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForeignTableAttrs {
    pub server: Option<String>,
    pub options: Option<IndexMap<String, String>>,
}

impl Attrs {
    pub fn default_for(kind: Kind) -> Attrs {
        match kind {
            Kind::Schema => Attrs::Schema(Default::default()),
            Kind::Extension => Attrs::Extension(Default::default()),
            Kind::Language => Attrs::Language(Default::default()),
            Kind::Cast => Attrs::Cast(Default::default()),
            Kind::Collation => Attrs::Collation(Default::default()),
            Kind::Conversion => Attrs::Conversion(Default::default()),
            Kind::Type => Attrs::Type(Default::default()),
            Kind::Table => Attrs::Table(Default::default()),
            Kind::Column => Attrs::Column(Default::default()),
            Kind::Constraint => Attrs::Constraint(Default::default()),
            Kind::Index => Attrs::Index(Default::default()),
            Kind::Function => Attrs::Function(Default::default()),
            Kind::Operator => Attrs::Operator(Default::default()),
            Kind::OperatorClass => Attrs::OperatorClass(Default::default()),
            Kind::OperatorFamily => Attrs::OperatorFamily(Default::default()),
            Kind::Rule => Attrs::Rule(Default::default()),
            Kind::Trigger => Attrs::Trigger(Default::default()),
            Kind::TsDictionary => Attrs::TsDictionary(Default::default()),
            Kind::TsTemplate => Attrs::TsTemplate(Default::default()),
            Kind::TsParser => Attrs::TsParser(Default::default()),
            Kind::TsConfiguration => Attrs::TsConfiguration(Default::default()),
            Kind::ForeignDataWrapper => Attrs::ForeignDataWrapper(Default::default()),
            Kind::Server => Attrs::Server(Default::default()),
            Kind::UserMapping => Attrs::UserMapping(Default::default()),
            Kind::ForeignTable => Attrs::ForeignTable(Default::default()),
        }
    }

    /// Deserialize a document fragment (with common fields and nested
    /// entries already stripped) into the kind's attribute struct. Unknown
    /// fields are an error, not silently attached.
    pub fn from_mapping(kind: Kind, mapping: Mapping) -> Result<Attrs, serde_yaml::Error> {
        let value = Value::Mapping(mapping);
        Ok(match kind {
            Kind::Schema => Attrs::Schema(serde_yaml::from_value(value)?),
            Kind::Extension => Attrs::Extension(serde_yaml::from_value(value)?),
            Kind::Language => Attrs::Language(serde_yaml::from_value(value)?),
            Kind::Cast => Attrs::Cast(serde_yaml::from_value(value)?),
            Kind::Collation => Attrs::Collation(serde_yaml::from_value(value)?),
            Kind::Conversion => Attrs::Conversion(serde_yaml::from_value(value)?),
            Kind::Type => Attrs::Type(serde_yaml::from_value(value)?),
            Kind::Table => Attrs::Table(serde_yaml::from_value(value)?),
            Kind::Column => Attrs::Column(serde_yaml::from_value(value)?),
            Kind::Constraint => Attrs::Constraint(serde_yaml::from_value(value)?),
            Kind::Index => Attrs::Index(serde_yaml::from_value(value)?),
            Kind::Function => Attrs::Function(serde_yaml::from_value(value)?),
            Kind::Operator => Attrs::Operator(serde_yaml::from_value(value)?),
            Kind::OperatorClass => Attrs::OperatorClass(serde_yaml::from_value(value)?),
            Kind::OperatorFamily => Attrs::OperatorFamily(serde_yaml::from_value(value)?),
            Kind::Rule => Attrs::Rule(serde_yaml::from_value(value)?),
            Kind::Trigger => Attrs::Trigger(serde_yaml::from_value(value)?),
            Kind::TsDictionary => Attrs::TsDictionary(serde_yaml::from_value(value)?),
            Kind::TsTemplate => Attrs::TsTemplate(serde_yaml::from_value(value)?),
            Kind::TsParser => Attrs::TsParser(serde_yaml::from_value(value)?),
            Kind::TsConfiguration => Attrs::TsConfiguration(serde_yaml::from_value(value)?),
            Kind::ForeignDataWrapper => Attrs::ForeignDataWrapper(serde_yaml::from_value(value)?),
            Kind::Server => Attrs::Server(serde_yaml::from_value(value)?),
            Kind::UserMapping => Attrs::UserMapping(serde_yaml::from_value(value)?),
            Kind::ForeignTable => Attrs::ForeignTable(serde_yaml::from_value(value)?),
        })
    }

    /// Serialize back to a document fragment, dropping unset fields.
    pub fn to_mapping(&self) -> Mapping {
        let value = match self {
            Attrs::Schema(a) => serde_yaml::to_value(a),
            Attrs::Extension(a) => serde_yaml::to_value(a),
            Attrs::Language(a) => serde_yaml::to_value(a),
            Attrs::Cast(a) => serde_yaml::to_value(a),
            Attrs::Collation(a) => serde_yaml::to_value(a),
            Attrs::Conversion(a) => serde_yaml::to_value(a),
            Attrs::Type(a) => serde_yaml::to_value(a),
            Attrs::Table(a) => serde_yaml::to_value(a),
            Attrs::Column(a) => serde_yaml::to_value(a),
            Attrs::Constraint(a) => serde_yaml::to_value(a),
            Attrs::Index(a) => serde_yaml::to_value(a),
            Attrs::Function(a) => serde_yaml::to_value(a),
            Attrs::Operator(a) => serde_yaml::to_value(a),
            Attrs::OperatorClass(a) => serde_yaml::to_value(a),
            Attrs::OperatorFamily(a) => serde_yaml::to_value(a),
            Attrs::Rule(a) => serde_yaml::to_value(a),
            Attrs::Trigger(a) => serde_yaml::to_value(a),
            Attrs::TsDictionary(a) => serde_yaml::to_value(a),
            Attrs::TsTemplate(a) => serde_yaml::to_value(a),
            Attrs::TsParser(a) => serde_yaml::to_value(a),
            Attrs::TsConfiguration(a) => serde_yaml::to_value(a),
            Attrs::ForeignDataWrapper(a) => serde_yaml::to_value(a),
            Attrs::Server(a) => serde_yaml::to_value(a),
            Attrs::UserMapping(a) => serde_yaml::to_value(a),
            Attrs::ForeignTable(a) => serde_yaml::to_value(a),
        };
        match value {
            Ok(Value::Mapping(m)) => m
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .collect(),
            _ => Mapping::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_order_covers_every_kind_once() {
        let mut seen = std::collections::HashSet::new();
        for kind in Kind::FORWARD_ORDER {
            assert!(seen.insert(kind), "{kind} appears twice in forward order");
        }
        assert_eq!(seen.len(), 25);
    }

    #[test]
    fn cleanup_order_is_exactly_the_foundational_set() {
        let mut seen = std::collections::HashSet::new();
        for kind in Kind::CLEANUP_ORDER {
            assert!(kind.is_foundational());
            assert!(seen.insert(kind), "{kind} appears twice in cleanup order");
        }
        for kind in Kind::FORWARD_ORDER {
            assert_eq!(kind.is_foundational(), seen.contains(&kind));
        }
    }

    #[test]
    fn parse_word_prefers_longer_kind_words() {
        assert_eq!(
            Kind::parse_word("operator class box_ops using gist"),
            Some((Kind::OperatorClass, "box_ops using gist"))
        );
        assert_eq!(
            Kind::parse_word("operator family integer_ops using btree"),
            Some((Kind::OperatorFamily, "integer_ops using btree"))
        );
        assert_eq!(
            Kind::parse_word("operator +(integer, integer)"),
            Some((Kind::Operator, "+(integer, integer)"))
        );
        assert_eq!(
            Kind::parse_word("text search dictionary simple_dict"),
            Some((Kind::TsDictionary, "simple_dict"))
        );
        assert_eq!(
            Kind::parse_word("user mapping for bob server files"),
            Some((Kind::UserMapping, "bob server files"))
        );
        assert_eq!(Kind::parse_word("tablespace fast"), None);
        assert_eq!(Kind::parse_word("schema "), None);
    }

    #[test]
    fn signature_splitting() {
        assert_eq!(split_signature("f(integer, text)").unwrap(), ("f", "integer, text"));
        assert_eq!(split_signature("f()").unwrap(), ("f", ""));
        assert!(split_signature("not_a_signature").is_err());
    }

    #[test]
    fn cast_and_using_splitting() {
        assert_eq!(split_cast("(integer as text)").unwrap(), ("integer", "text"));
        assert!(split_cast("integer as text").is_err());
        assert_eq!(split_using("box_ops using gist").unwrap(), ("box_ops", "gist"));
        assert!(split_using("box_ops").is_err());
    }

    #[test]
    fn extern_keys_round_trip_through_parse() {
        let cases = [
            Object::new(Kind::Schema, Key::one("public")),
            Object::new(Kind::Table, Key::two("public", "orders")),
            Object::new(Kind::Function, Key::three("public", "add", "integer, integer")),
            Object::new(Kind::OperatorClass, Key::three("public", "box_ops", "gist")),
            Object::new(Kind::Cast, Key::two("integer", "text")),
            Object::new(Kind::UserMapping, Key::two("bob", "files")),
        ];
        for obj in cases {
            let (kind, _) = Kind::parse_word(&obj.extern_key()).expect("parse failed");
            assert_eq!(kind, obj.kind, "round trip for {}", obj.extern_key());
        }
    }

    #[test]
    fn unknown_fragment_fields_are_rejected() {
        let mut m = Mapping::new();
        m.insert(Value::from("typo_field"), Value::from("x"));
        assert!(Attrs::from_mapping(Kind::Table, m).is_err());
    }

    #[test]
    fn attrs_mapping_drops_unset_fields() {
        let attrs = Attrs::Column(ColumnAttrs {
            type_: Some("text".into()),
            ..Default::default()
        });
        let m = attrs.to_mapping();
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("type"), Some(&Value::from("text")));
    }
}
