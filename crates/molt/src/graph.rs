//! The graph holder: one registry per kind, for one side of a diff.
//!
//! Two graphs exist per run: one populated from the catalog, one from the
//! document. After population the linker attaches ownership and usage
//! references as stored keys; nothing holds an owning pointer to anything
//! outside its own registry, so the graph stays cycle-free.

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::document::Document;
use crate::error::Error;
use crate::object::{
    split_cast, split_signature, split_user_mapping, split_using, Attrs, Key, Kind, Object,
};
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    pub schemas: Registry,
    pub extensions: Registry,
    pub languages: Registry,
    pub casts: Registry,
    pub types: Registry,
    pub tables: Registry,
    pub columns: Registry,
    pub constraints: Registry,
    pub indexes: Registry,
    pub functions: Registry,
    pub operators: Registry,
    pub operator_classes: Registry,
    pub operator_families: Registry,
    pub rules: Registry,
    pub triggers: Registry,
    pub conversions: Registry,
    pub ts_dictionaries: Registry,
    pub ts_templates: Registry,
    pub ts_parsers: Registry,
    pub ts_configurations: Registry,
    pub wrappers: Registry,
    pub servers: Registry,
    pub user_mappings: Registry,
    pub foreign_tables: Registry,
    pub collations: Registry,
}

/// Kinds that may nest directly inside a schema fragment.
const IN_SCHEMA: [Kind; 13] = [
    Kind::Type,
    Kind::Table,
    Kind::Function,
    Kind::Operator,
    Kind::OperatorFamily,
    Kind::OperatorClass,
    Kind::Conversion,
    Kind::TsDictionary,
    Kind::TsTemplate,
    Kind::TsParser,
    Kind::TsConfiguration,
    Kind::Collation,
    Kind::ForeignTable,
];

/// Kinds that may nest inside a table fragment (columns are a list, not
/// typed identifiers, so they are not here).
const IN_TABLE: [Kind; 4] = [Kind::Constraint, Kind::Index, Kind::Trigger, Kind::Rule];

impl Graph {
    pub fn new() -> Graph {
        Graph {
            schemas: Registry::new(Kind::Schema),
            extensions: Registry::new(Kind::Extension),
            languages: Registry::new(Kind::Language),
            casts: Registry::new(Kind::Cast),
            types: Registry::new(Kind::Type),
            tables: Registry::new(Kind::Table),
            columns: Registry::new(Kind::Column),
            constraints: Registry::new(Kind::Constraint),
            indexes: Registry::new(Kind::Index),
            functions: Registry::new(Kind::Function),
            operators: Registry::new(Kind::Operator),
            operator_classes: Registry::new(Kind::OperatorClass),
            operator_families: Registry::new(Kind::OperatorFamily),
            rules: Registry::new(Kind::Rule),
            triggers: Registry::new(Kind::Trigger),
            conversions: Registry::new(Kind::Conversion),
            ts_dictionaries: Registry::new(Kind::TsDictionary),
            ts_templates: Registry::new(Kind::TsTemplate),
            ts_parsers: Registry::new(Kind::TsParser),
            ts_configurations: Registry::new(Kind::TsConfiguration),
            wrappers: Registry::new(Kind::ForeignDataWrapper),
            servers: Registry::new(Kind::Server),
            user_mappings: Registry::new(Kind::UserMapping),
            foreign_tables: Registry::new(Kind::ForeignTable),
            collations: Registry::new(Kind::Collation),
        }
    }

    pub fn registry(&self, kind: Kind) -> &Registry {
        match kind {
            Kind::Schema => &self.schemas,
            Kind::Extension => &self.extensions,
            Kind::Language => &self.languages,
            Kind::Cast => &self.casts,
            Kind::Type => &self.types,
            Kind::Table => &self.tables,
            Kind::Column => &self.columns,
            Kind::Constraint => &self.constraints,
            Kind::Index => &self.indexes,
            Kind::Function => &self.functions,
            Kind::Operator => &self.operators,
            Kind::OperatorClass => &self.operator_classes,
            Kind::OperatorFamily => &self.operator_families,
            Kind::Rule => &self.rules,
            Kind::Trigger => &self.triggers,
            Kind::Conversion => &self.conversions,
            Kind::TsDictionary => &self.ts_dictionaries,
            Kind::TsTemplate => &self.ts_templates,
            Kind::TsParser => &self.ts_parsers,
            Kind::TsConfiguration => &self.ts_configurations,
            Kind::ForeignDataWrapper => &self.wrappers,
            Kind::Server => &self.servers,
            Kind::UserMapping => &self.user_mappings,
            Kind::ForeignTable => &self.foreign_tables,
            Kind::Collation => &self.collations,
        }
    }

    pub fn registry_mut(&mut self, kind: Kind) -> &mut Registry {
        match kind {
            Kind::Schema => &mut self.schemas,
            Kind::Extension => &mut self.extensions,
            Kind::Language => &mut self.languages,
            Kind::Cast => &mut self.casts,
            Kind::Type => &mut self.types,
            Kind::Table => &mut self.tables,
            Kind::Column => &mut self.columns,
            Kind::Constraint => &mut self.constraints,
            Kind::Index => &mut self.indexes,
            Kind::Function => &mut self.functions,
            Kind::Operator => &mut self.operators,
            Kind::OperatorClass => &mut self.operator_classes,
            Kind::OperatorFamily => &mut self.operator_families,
            Kind::Rule => &mut self.rules,
            Kind::Trigger => &mut self.triggers,
            Kind::Conversion => &mut self.conversions,
            Kind::TsDictionary => &mut self.ts_dictionaries,
            Kind::TsTemplate => &mut self.ts_templates,
            Kind::TsParser => &mut self.ts_parsers,
            Kind::TsConfiguration => &mut self.ts_configurations,
            Kind::ForeignDataWrapper => &mut self.wrappers,
            Kind::Server => &mut self.servers,
            Kind::UserMapping => &mut self.user_mappings,
            Kind::ForeignTable => &mut self.foreign_tables,
            Kind::Collation => &mut self.collations,
        }
    }

    pub fn insert(&mut self, object: Object) -> Result<(), Error> {
        self.registry_mut(object.kind).insert(object)
    }

    // -----------------------------------------------------------------
    // Document population
    // -----------------------------------------------------------------

    /// Build a graph from a parsed document. Fails fast on any malformed
    /// typed identifier, empty object body, unknown attribute field or
    /// duplicate key; a partially understood document never yields a graph.
    pub fn from_doc(doc: &Document) -> Result<Graph, Error> {
        let mut graph = Graph::new();
        let entries = doc.split()?;
        // Population order mirrors the forward diff order for the top-level
        // kinds; nested objects follow their container.
        for target in [
            Kind::Extension,
            Kind::Language,
            Kind::Schema,
            Kind::Cast,
            Kind::ForeignDataWrapper,
            Kind::UserMapping,
        ] {
            for &(kind, rest, value) in entries.iter().filter(|(k, _, _)| *k == target) {
                graph.load_top_level(kind, rest, value)?;
            }
        }
        graph.link();
        Ok(graph)
    }

    fn load_top_level(&mut self, kind: Kind, rest: &str, value: &Value) -> Result<(), Error> {
        match kind {
            Kind::Schema => {
                let key = Key::one(rest);
                let (object, nested) =
                    object_from_fragment(kind, key, value, &IN_SCHEMA, false)?;
                let schema = object.name().to_string();
                self.insert(object)?;
                for (child_kind, child_rest, child_value) in nested {
                    self.load_in_schema(&schema, child_kind, &child_rest, &child_value)?;
                }
            }
            Kind::Extension | Kind::Language => {
                let key = Key::one(rest);
                let (object, _) = object_from_fragment(kind, key, value, &[], true)?;
                self.insert(object)?;
            }
            Kind::Cast => {
                let (source, target) = split_cast(rest)?;
                let key = Key::two(source, target);
                let (object, _) = object_from_fragment(kind, key, value, &[], true)?;
                self.insert(object)?;
            }
            Kind::ForeignDataWrapper => {
                let key = Key::one(rest);
                let (object, nested) =
                    object_from_fragment(kind, key, value, &[Kind::Server], false)?;
                self.insert(object)?;
                for (child_kind, child_rest, child_value) in nested {
                    debug_assert_eq!(child_kind, Kind::Server);
                    let (mut server, _) = object_from_fragment(
                        Kind::Server,
                        Key::one(child_rest.as_str()),
                        &child_value,
                        &[],
                        true,
                    )?;
                    if let Attrs::Server(attrs) = &mut server.attrs {
                        attrs.wrapper.get_or_insert_with(|| rest.to_string());
                    }
                    self.insert(server)?;
                }
            }
            Kind::UserMapping => {
                let (user, server) = split_user_mapping(rest)?;
                let key = Key::two(user, server);
                let (object, _) = object_from_fragment(kind, key, value, &[], true)?;
                self.insert(object)?;
            }
            _ => unreachable!("not a top-level kind: {kind}"),
        }
        Ok(())
    }

    fn load_in_schema(
        &mut self,
        schema: &str,
        kind: Kind,
        rest: &str,
        value: &Value,
    ) -> Result<(), Error> {
        let key = match kind {
            Kind::Function | Kind::Operator => {
                let (name, args) = split_signature(rest)?;
                Key::three(schema, name, normalize_args(args))
            }
            Kind::OperatorClass | Kind::OperatorFamily => {
                let (name, method) = split_using(rest)?;
                Key::three(schema, name, method)
            }
            _ => Key::two(schema, rest),
        };
        match kind {
            Kind::Table => {
                let (object, nested) = object_from_fragment(kind, key, value, &IN_TABLE, false)?;
                let table = object.name().to_string();
                self.insert(object)?;
                self.load_columns(schema, &table, value)?;
                for (child_kind, child_rest, child_value) in nested {
                    let child_key = Key::three(schema, table.as_str(), child_rest.as_str());
                    let (child, _) =
                        object_from_fragment(child_kind, child_key, &child_value, &[], true)?;
                    self.insert(child)?;
                }
            }
            Kind::ForeignTable => {
                let (object, _) = object_from_fragment(kind, key, value, &[], false)?;
                let table = object.name().to_string();
                self.insert(object)?;
                self.load_columns(schema, &table, value)?;
            }
            _ => {
                let (object, _) = object_from_fragment(kind, key, value, &[], true)?;
                self.insert(object)?;
            }
        }
        Ok(())
    }

    /// Read the `columns` list of a table fragment: an ordered list of
    /// single-entry `name -> attributes` maps.
    fn load_columns(&mut self, schema: &str, table: &str, value: &Value) -> Result<(), Error> {
        let Some(columns) = value.as_mapping().and_then(|m| m.get("columns")) else {
            return Ok(());
        };
        let list = columns.as_sequence().ok_or_else(|| {
            Error::format(format!("table {table}"), "'columns' must be a list")
        })?;
        for item in list {
            let entry = item
                .as_mapping()
                .filter(|m| m.len() == 1)
                .ok_or_else(|| {
                    Error::format(
                        format!("table {table}"),
                        "each column entry must be a single name -> attributes map",
                    )
                })?;
            let (name_value, body) = entry.iter().next().expect("len checked above");
            let name = name_value.as_str().ok_or_else(|| {
                Error::format(format!("table {table}"), "column names must be strings")
            })?;
            let key = Key::three(schema, table, name);
            let (column, _) = object_from_fragment(Kind::Column, key, body, &[], true)?;
            self.insert(column)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Linking
    // -----------------------------------------------------------------

    /// Attach ownership and usage references. Requires every registry for
    /// this graph to be populated; safe to run again on an unchanged graph
    /// (references are rebuilt from scratch).
    pub fn link(&mut self) {
        for kind in Kind::FORWARD_ORDER {
            for obj in self.registry_mut(kind).iter_mut() {
                obj.children.clear();
                obj.dependents.clear();
            }
        }

        // schema -> contained objects
        for kind in IN_SCHEMA {
            let keys: Vec<Key> = self.registry(kind).keys().cloned().collect();
            for key in keys {
                let schema_key = Key::one(key.field(0));
                if let Some(schema) = self.schemas.get_mut(&schema_key) {
                    schema.children.push((kind, key));
                }
            }
        }

        // table -> columns, constraints, indexes, triggers, rules
        // (columns of foreign tables attach to the foreign table instead)
        for kind in [Kind::Column, Kind::Constraint, Kind::Index, Kind::Trigger, Kind::Rule] {
            let keys: Vec<Key> = self.registry(kind).keys().cloned().collect();
            for key in keys {
                let table_key = Key::two(key.field(0), key.field(1));
                if let Some(table) = self.tables.get_mut(&table_key) {
                    table.children.push((kind, key));
                } else if let Some(ftable) = self.foreign_tables.get_mut(&table_key) {
                    ftable.children.push((kind, key));
                }
            }
        }

        // wrapper -> servers, server -> user mappings
        let server_keys: Vec<(Key, Option<String>)> = self
            .servers
            .iter()
            .map(|s| {
                let wrapper = match &s.attrs {
                    Attrs::Server(a) => a.wrapper.clone(),
                    _ => None,
                };
                (s.key.clone(), wrapper)
            })
            .collect();
        for (key, wrapper) in server_keys {
            if let Some(wrapper) = wrapper {
                if let Some(fdw) = self.wrappers.get_mut(&Key::one(wrapper)) {
                    fdw.children.push((Kind::Server, key));
                }
            }
        }
        let mapping_keys: Vec<Key> = self.user_mappings.keys().cloned().collect();
        for key in mapping_keys {
            let server_key = Key::one(key.field(1));
            if let Some(server) = self.servers.get_mut(&server_key) {
                server.children.push((Kind::UserMapping, key));
            }
        }

        // language -> functions written in it
        let by_language: Vec<(Key, Key)> = self
            .functions
            .iter()
            .filter_map(|f| match &f.attrs {
                Attrs::Function(a) => a
                    .language
                    .as_ref()
                    .map(|lang| (Key::one(lang.as_str()), f.key.clone())),
                _ => None,
            })
            .collect();
        for (lang_key, func_key) in by_language {
            if let Some(lang) = self.languages.get_mut(&lang_key) {
                lang.dependents.push((Kind::Function, func_key));
            }
        }

        // type -> columns and functions that use it
        let column_types: Vec<(Key, Key)> = self
            .columns
            .iter()
            .filter_map(|c| match &c.attrs {
                Attrs::Column(a) => a
                    .type_
                    .as_ref()
                    .and_then(|t| self.find_type(t))
                    .map(|t| (t.key.clone(), c.key.clone())),
                _ => None,
            })
            .collect();
        for (type_key, column_key) in column_types {
            if let Some(t) = self.types.get_mut(&type_key) {
                t.dependents.push((Kind::Column, column_key));
            }
        }
        let function_types: Vec<(Key, Key)> = self
            .functions
            .iter()
            .filter_map(|f| match &f.attrs {
                Attrs::Function(a) => a
                    .returns
                    .as_ref()
                    .and_then(|t| self.find_type(t))
                    .map(|t| (t.key.clone(), f.key.clone())),
                _ => None,
            })
            .collect();
        for (type_key, func_key) in function_types {
            if let Some(t) = self.types.get_mut(&type_key) {
                t.dependents.push((Kind::Function, func_key));
            }
        }

        debug!(
            schemas = self.schemas.len(),
            tables = self.tables.len(),
            "linked object graph"
        );
    }

    // -----------------------------------------------------------------
    // Scope filter
    // -----------------------------------------------------------------

    /// Restrict the graph to the named schemas. Schema-scoped registries
    /// are filtered by their schema key field; extensions by their schema
    /// attribute; languages and casts are database-wide and are excluded
    /// entirely whenever scoping is requested.
    pub fn retain_schemas(&mut self, keep: &[String]) {
        let in_set = |name: &str| keep.iter().any(|k| k == name);
        for kind in Kind::FORWARD_ORDER {
            match kind {
                Kind::Schema => {
                    self.schemas.retain(|o| in_set(o.name()));
                }
                Kind::Language | Kind::Cast => self.registry_mut(kind).clear(),
                Kind::Extension => {
                    self.extensions.retain(|o| match &o.attrs {
                        Attrs::Extension(a) => a.schema.as_deref().is_none_or(|s| in_set(s)),
                        _ => true,
                    });
                }
                k if k.schema_scoped() => {
                    self.registry_mut(k).retain(|o| in_set(o.key.field(0)));
                }
                _ => {}
            }
        }
        self.link();
    }

    // -----------------------------------------------------------------
    // Export
    // -----------------------------------------------------------------

    /// Convert the graph back to the single nested document mapping.
    pub fn to_doc(&self, no_owner: bool, no_comments: bool) -> Document {
        let mut root = Mapping::new();
        for obj in self.extensions.iter() {
            root.insert(
                Value::from(obj.extern_key()),
                Value::Mapping(self.fragment(obj, no_owner, no_comments)),
            );
        }
        for obj in self.languages.iter() {
            root.insert(
                Value::from(obj.extern_key()),
                Value::Mapping(self.fragment(obj, no_owner, no_comments)),
            );
        }
        for obj in self.casts.iter() {
            root.insert(
                Value::from(obj.extern_key()),
                Value::Mapping(self.fragment(obj, no_owner, no_comments)),
            );
        }
        for obj in self.wrappers.iter() {
            root.insert(
                Value::from(obj.extern_key()),
                Value::Mapping(self.fragment(obj, no_owner, no_comments)),
            );
        }
        for obj in self.schemas.iter() {
            root.insert(
                Value::from(obj.extern_key()),
                Value::Mapping(self.fragment(obj, no_owner, no_comments)),
            );
        }
        for obj in self.user_mappings.iter() {
            root.insert(
                Value::from(obj.extern_key()),
                Value::Mapping(self.fragment(obj, no_owner, no_comments)),
            );
        }
        Document(root)
    }

    fn fragment(&self, obj: &Object, no_owner: bool, no_comments: bool) -> Mapping {
        let mut m = obj.attrs.to_mapping();
        if let Attrs::OperatorClass(attrs) = &obj.attrs {
            // A class in its own single-member family carries no information.
            if attrs.family.as_deref() == Some(obj.name()) {
                m.remove("family");
            }
        }
        if let Some(owner) = obj.owner.as_ref().filter(|_| !no_owner) {
            m.insert(Value::from("owner"), Value::from(owner.as_str()));
        }
        if let Some(desc) = obj.description.as_ref().filter(|_| !no_comments) {
            m.insert(Value::from("description"), Value::from(desc.as_str()));
        }

        // Columns first (ordered list), then nested typed entries.
        if matches!(obj.kind, Kind::Table | Kind::ForeignTable) {
            let columns: Vec<Value> = obj
                .children
                .iter()
                .filter(|(kind, _)| *kind == Kind::Column)
                .filter_map(|(_, key)| self.columns.get(key))
                .map(|col| {
                    let mut entry = Mapping::new();
                    entry.insert(
                        Value::from(col.name()),
                        Value::Mapping(self.fragment(col, no_owner, no_comments)),
                    );
                    Value::Mapping(entry)
                })
                .collect();
            if !columns.is_empty() {
                m.insert(Value::from("columns"), Value::Sequence(columns));
            }
        }
        for (kind, key) in &obj.children {
            // Columns were rendered above; user mappings are top-level
            // document entries, not part of their server's fragment.
            if matches!(*kind, Kind::Column | Kind::UserMapping) {
                continue;
            }
            if let Some(child) = self.registry(*kind).get(key) {
                m.insert(
                    Value::from(child.extern_key()),
                    Value::Mapping(self.fragment(child, no_owner, no_comments)),
                );
            }
        }
        m
    }

    // -----------------------------------------------------------------
    // Reference lookup
    // -----------------------------------------------------------------

    /// Find a type by name, qualified (`public.geom`) or bare (`geom`).
    /// Absence is not an error: built-in types are simply not in the graph.
    pub fn find_type(&self, name: &str) -> Option<&Object> {
        find_named(&self.types, name)
    }

    /// Find a function by `name(argtype, argtype)` signature.
    pub fn find_function(&self, signature: &str) -> Option<&Object> {
        find_signature(&self.functions, signature)
    }

    /// Find an operator by `name(lefttype, righttype)` signature.
    pub fn find_operator(&self, signature: &str) -> Option<&Object> {
        find_signature(&self.operators, signature)
    }

    /// Find an operator family by name (possibly qualified) and index method.
    pub fn find_operator_family(&self, name: &str, method: &str) -> Option<&Object> {
        match name.split_once('.') {
            Some((schema, bare)) => self
                .operator_families
                .get(&Key::three(schema, bare, method)),
            None => self
                .operator_families
                .iter()
                .find(|o| o.name() == name && o.key.field(2) == method),
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Graph::new()
    }
}

/// Resolve a possibly schema-qualified name against a two-field registry.
fn find_named<'a>(registry: &'a Registry, name: &str) -> Option<&'a Object> {
    match name.split_once('.') {
        Some((schema, bare)) => registry.get(&Key::two(schema, bare)),
        None => registry.iter().find(|o| o.name() == name),
    }
}

/// Resolve a `name(args)` signature against a three-field registry.
fn find_signature<'a>(registry: &'a Registry, signature: &str) -> Option<&'a Object> {
    let (name, args) = split_signature(signature).ok()?;
    let args = normalize_args(args);
    match name.split_once('.') {
        Some((schema, bare)) => registry.get(&Key::three(schema, bare, args)),
        None => registry
            .iter()
            .find(|o| o.name() == name && o.key.field(2) == args),
    }
}

/// Canonical spelling of an argument type list: single space after commas.
pub fn normalize_args(args: &str) -> String {
    args.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build one object from a document fragment. Splits the body into common
/// fields (owner, description, oldname), nested typed-identifier entries
/// (only those in `allowed_nested`), and the kind-specific attribute set.
/// `require_body` rejects empty fragments: a typed identifier with nothing
/// to say is a document mistake, except for pure containers.
fn object_from_fragment(
    kind: Kind,
    key: Key,
    value: &Value,
    allowed_nested: &[Kind],
    require_body: bool,
) -> Result<(Object, Vec<(Kind, String, Value)>), Error> {
    let mut object = Object::new(kind, key);
    let extern_key = object.extern_key();

    let mapping = match value {
        Value::Mapping(m) => m.clone(),
        Value::Null => Mapping::new(),
        _ => {
            return Err(Error::format(extern_key, "object body must be a mapping"));
        }
    };
    if require_body && mapping.is_empty() {
        return Err(Error::format(extern_key, "object has no specification"));
    }

    let mut attr_fields = Mapping::new();
    let mut nested = Vec::new();
    for (k, v) in mapping {
        let Some(field) = k.as_str().map(str::to_string) else {
            return Err(Error::format(extern_key, "fragment keys must be strings"));
        };
        match field.as_str() {
            "owner" => object.owner = string_field(&extern_key, "owner", v)?,
            "description" => object.description = string_field(&extern_key, "description", v)?,
            "oldname" => object.oldname = string_field(&extern_key, "oldname", v)?,
            "columns" if matches!(kind, Kind::Table | Kind::ForeignTable) => {
                // handled by the caller, in declaration order
            }
            _ => match Kind::parse_word(&field) {
                Some((child, rest)) if allowed_nested.contains(&child) => {
                    nested.push((child, rest.to_string(), v));
                }
                Some((child, _)) => {
                    return Err(Error::format(
                        field,
                        format!("a {child} cannot be declared inside a {kind}"),
                    ));
                }
                None => {
                    attr_fields.insert(Value::from(field), v);
                }
            },
        }
    }

    object.attrs = Attrs::from_mapping(kind, attr_fields)
        .map_err(|e| Error::format(&extern_key, e.to_string()))?;
    Ok((object, nested))
}

fn string_field(key: &str, field: &str, value: Value) -> Result<Option<String>, Error> {
    match value {
        Value::String(s) => Ok(Some(s)),
        _ => Err(Error::format(key, format!("'{field}' must be a string"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> Document {
        Document::parse(
            r#"
schema public:
  description: standard public schema
  type mood:
    labels: [sad, ok, happy]
  table orders:
    columns:
      - id:
          type: bigint
          not_null: true
      - mood:
          type: mood
    constraint orders_pkey:
      primary_key: [id]
    index orders_mood_idx:
      keys: [mood]
extension hstore:
  schema: public
  version: "1.8"
language plpgsql:
  trusted: true
cast (integer as text):
  function: int4out(integer)
  context: explicit
"#,
        )
        .unwrap()
    }

    #[test]
    fn from_doc_populates_all_registries() {
        let g = Graph::from_doc(&sample_doc()).unwrap();
        assert_eq!(g.schemas.len(), 1);
        assert_eq!(g.types.len(), 1);
        assert_eq!(g.tables.len(), 1);
        assert_eq!(g.columns.len(), 2);
        assert_eq!(g.constraints.len(), 1);
        assert_eq!(g.indexes.len(), 1);
        assert_eq!(g.extensions.len(), 1);
        assert_eq!(g.languages.len(), 1);
        assert_eq!(g.casts.len(), 1);
    }

    #[test]
    fn linker_attaches_children_and_dependents() {
        let g = Graph::from_doc(&sample_doc()).unwrap();
        let schema = g.schemas.get(&Key::one("public")).unwrap();
        assert!(schema.children.contains(&(Kind::Type, Key::two("public", "mood"))));
        assert!(schema.children.contains(&(Kind::Table, Key::two("public", "orders"))));

        let table = g.tables.get(&Key::two("public", "orders")).unwrap();
        let column_children: Vec<_> = table
            .children
            .iter()
            .filter(|(k, _)| *k == Kind::Column)
            .collect();
        assert_eq!(column_children.len(), 2);

        let mood = g.types.get(&Key::two("public", "mood")).unwrap();
        assert!(mood
            .dependents
            .contains(&(Kind::Column, Key::three("public", "orders", "mood"))));
    }

    #[test]
    fn linking_is_idempotent() {
        let mut g = Graph::from_doc(&sample_doc()).unwrap();
        let before = g.clone();
        g.link();
        assert_eq!(g, before);
    }

    #[test]
    fn empty_leaf_bodies_are_rejected() {
        let doc = Document::parse("schema public:\n  type mood:\n").unwrap();
        let err = Graph::from_doc(&doc).unwrap_err();
        assert!(matches!(err, Error::Format { .. }), "got {err:?}");
    }

    #[test]
    fn colliding_keys_are_rejected() {
        let doc = Document::parse(
            "schema public:\n  table orders:\n    columns:\n      - id:\n          type: bigint\n      - id:\n          type: text\n",
        )
        .unwrap();
        let err = Graph::from_doc(&doc).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { kind: "column", .. }), "got {err:?}");
    }

    #[test]
    fn misplaced_nested_kinds_are_rejected() {
        let doc = Document::parse(
            "schema public:\n  table orders:\n    table nested:\n      columns: []\n",
        )
        .unwrap();
        assert!(Graph::from_doc(&doc).is_err());
    }

    #[test]
    fn retain_schemas_filters_and_clears_database_wide_kinds() {
        let mut doc = sample_doc();
        doc.merge(
            Document::parse("schema audit:\n  table log:\n    columns:\n      - id:\n          type: bigint\n")
                .unwrap()
                .0,
        );
        let mut g = Graph::from_doc(&doc).unwrap();
        assert_eq!(g.schemas.len(), 2);

        g.retain_schemas(&["public".to_string()]);
        assert_eq!(g.schemas.len(), 1);
        assert!(g.tables.get(&Key::two("audit", "log")).is_none());
        assert!(g.tables.get(&Key::two("public", "orders")).is_some());
        // Database-wide kinds are excluded entirely under scoping.
        assert!(g.languages.is_empty());
        assert!(g.casts.is_empty());
    }

    #[test]
    fn document_round_trips_through_export() {
        let g = Graph::from_doc(&sample_doc()).unwrap();
        let exported = g.to_doc(false, false);
        let reloaded = Graph::from_doc(&exported).unwrap();
        assert_eq!(g, reloaded);
    }

    #[test]
    fn foreign_data_stack_round_trips_through_export() {
        let doc = Document::parse(
            "foreign data wrapper file_fdw:\n  validator: file_fdw_validator\n  server files:\n    type: file\nuser mapping for bob server files:\n  options:\n    user: bob\n",
        )
        .unwrap();
        let g = Graph::from_doc(&doc).unwrap();
        let exported = g.to_doc(false, false);
        // User mappings export as top-level entries, never inside their
        // server's fragment.
        let reloaded = Graph::from_doc(&exported).unwrap();
        assert_eq!(g, reloaded);
        assert_eq!(reloaded.user_mappings.len(), 1);
    }

    #[test]
    fn signature_lookup_handles_qualified_and_bare_names() {
        let doc = Document::parse(
            "schema public:\n  function add(integer, integer):\n    language: sql\n    returns: integer\n    source: select $1 + $2\n",
        )
        .unwrap();
        let g = Graph::from_doc(&doc).unwrap();
        assert!(g.find_function("add(integer, integer)").is_some());
        assert!(g.find_function("public.add(integer,integer)").is_some());
        assert!(g.find_function("missing(integer)").is_none());
    }
}
