//! Catalog access.
//!
//! [`CatalogReader`] is the seam between the engine and a live server: it
//! delivers rows of named fields per query and exposes an explicit rollback
//! so the shared connection returns to a clean transaction state after
//! every read, success or failure. [`PgReader`] implements it over a
//! blocking `postgres` connection; tests implement it over canned rows.
//!
//! Population issues one primary query per kind, plus auxiliary queries for
//! sub-attributes (operator class strategies and supports, enum labels,
//! composite attributes, text search mappings). A failed auxiliary query is
//! rolled back and absorbed - the feature is treated as absent. A failed
//! primary query aborts population and names the kind.

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

use crate::error::Error;
use crate::graph::{normalize_args, Graph};
use crate::object::{Attrs, ConstraintAttrs, Key, Kind, Object, RuleAttrs, TriggerAttrs};

/// One value in a catalog row.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl Field {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Field::Int(i) => Some(*i),
            _ => None,
        }
    }
}

/// One catalog row: ordered column name -> value.
pub type Row = IndexMap<String, Field>;

pub trait CatalogReader {
    /// Server version number (e.g. 150004), used to gate optional features.
    fn server_version(&self) -> u32;

    /// Run a catalog query and return its rows.
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, Error>;

    /// Return the connection's transaction state to clean, discarding any
    /// aborted transaction. Must be safe to call unconditionally.
    fn rollback(&mut self);
}

/// Populate a full graph from the catalog and link it.
pub fn load_graph(reader: &mut dyn CatalogReader) -> Result<Graph, Error> {
    let mut graph = Graph::new();
    for kind in Kind::FORWARD_ORDER {
        populate_kind(&mut graph, kind, reader)?;
    }
    graph.link();
    Ok(graph)
}

fn populate_kind(
    graph: &mut Graph,
    kind: Kind,
    reader: &mut dyn CatalogReader,
) -> Result<(), Error> {
    let rows = match reader.query(primary_query(kind)) {
        Ok(rows) => {
            reader.rollback();
            rows
        }
        Err(e) => {
            reader.rollback();
            return Err(Error::CatalogRead {
                kind: kind.word(),
                reason: e.to_string(),
            });
        }
    };
    debug!(kind = %kind, rows = rows.len(), "fetched catalog rows");
    for row in &rows {
        let object = object_from_row(kind, row)?;
        graph.insert(object)?;
    }

    match kind {
        Kind::Type => {
            merge_enum_labels(graph, reader);
            merge_composite_attributes(graph, reader);
        }
        Kind::OperatorClass => {
            merge_class_operators(graph, reader);
            merge_class_functions(graph, reader);
        }
        Kind::TsConfiguration => {
            merge_config_mappings(graph, reader);
        }
        _ => {}
    }
    Ok(())
}

/// Run an auxiliary query, absorbing failure: version-gated catalog shape
/// must not abort population of the whole kind.
fn aux_query(reader: &mut dyn CatalogReader, sql: &str) -> Vec<Row> {
    match reader.query(sql) {
        Ok(rows) => {
            reader.rollback();
            rows
        }
        Err(e) => {
            debug!(error = %e, "auxiliary catalog query failed; feature treated as absent");
            reader.rollback();
            Vec::new()
        }
    }
}

fn merge_enum_labels(graph: &mut Graph, reader: &mut dyn CatalogReader) {
    let rows = aux_query(reader, ENUM_LABEL_QUERY);
    let by_oid = oid_index(&graph.types);
    for row in rows {
        let (Some(oid), Some(label)) = (
            row.get("typoid").and_then(Field::as_int),
            row.get("label").and_then(Field::as_str),
        ) else {
            continue;
        };
        let Some(key) = by_oid.get(&oid) else { continue };
        if let Some(obj) = graph.types.get_mut(key) {
            if let Attrs::Type(attrs) = &mut obj.attrs {
                attrs.labels.get_or_insert_with(Vec::new).push(label.to_string());
            }
        }
    }
}

fn merge_composite_attributes(graph: &mut Graph, reader: &mut dyn CatalogReader) {
    let rows = aux_query(reader, COMPOSITE_ATTR_QUERY);
    let by_oid = oid_index(&graph.types);
    for row in rows {
        let (Some(oid), Some(name), Some(type_)) = (
            row.get("typoid").and_then(Field::as_int),
            row.get("name").and_then(Field::as_str),
            row.get("type").and_then(Field::as_str),
        ) else {
            continue;
        };
        let Some(key) = by_oid.get(&oid) else { continue };
        if let Some(obj) = graph.types.get_mut(key) {
            if let Attrs::Type(attrs) = &mut obj.attrs {
                let mut entry = IndexMap::new();
                entry.insert(name.to_string(), type_.to_string());
                attrs.attributes.get_or_insert_with(Vec::new).push(entry);
            }
        }
    }
}

fn merge_class_operators(graph: &mut Graph, reader: &mut dyn CatalogReader) {
    for row in aux_query(reader, CLASS_OPERATOR_QUERY) {
        let (Some(key), Some(strategy), Some(operator)) = (
            class_key(&row),
            row.get("strategy").and_then(Field::as_int),
            row.get("operator").and_then(Field::as_str),
        ) else {
            continue;
        };
        if let Some(obj) = graph.operator_classes.get_mut(&key) {
            if let Attrs::OperatorClass(attrs) = &mut obj.attrs {
                attrs
                    .operators
                    .get_or_insert_with(IndexMap::new)
                    .insert(strategy as i32, operator.to_string());
            }
        }
    }
}

fn merge_class_functions(graph: &mut Graph, reader: &mut dyn CatalogReader) {
    for row in aux_query(reader, CLASS_FUNCTION_QUERY) {
        let (Some(key), Some(support), Some(function)) = (
            class_key(&row),
            row.get("support").and_then(Field::as_int),
            row.get("function").and_then(Field::as_str),
        ) else {
            continue;
        };
        if let Some(obj) = graph.operator_classes.get_mut(&key) {
            if let Attrs::OperatorClass(attrs) = &mut obj.attrs {
                attrs
                    .functions
                    .get_or_insert_with(IndexMap::new)
                    .insert(support as i32, function.to_string());
            }
        }
    }
}

fn merge_config_mappings(graph: &mut Graph, reader: &mut dyn CatalogReader) {
    let rows = aux_query(reader, CONFIG_MAPPING_QUERY);
    let by_oid = oid_index(&graph.ts_configurations);
    for row in rows {
        let (Some(oid), Some(token), Some(dictionary)) = (
            row.get("cfgoid").and_then(Field::as_int),
            row.get("token").and_then(Field::as_str),
            row.get("dictionary").and_then(Field::as_str),
        ) else {
            continue;
        };
        let Some(key) = by_oid.get(&oid) else { continue };
        if let Some(obj) = graph.ts_configurations.get_mut(key) {
            if let Attrs::TsConfiguration(attrs) = &mut obj.attrs {
                attrs
                    .mappings
                    .get_or_insert_with(IndexMap::new)
                    .entry(token.to_string())
                    .or_default()
                    .push(dictionary.to_string());
            }
        }
    }
}

fn oid_index(registry: &crate::registry::Registry) -> IndexMap<i64, Key> {
    registry
        .iter()
        .filter_map(|o| o.oid.map(|oid| (oid, o.key.clone())))
        .collect()
}

fn class_key(row: &Row) -> Option<Key> {
    Some(Key::three(
        row.get("schema")?.as_str()?,
        row.get("name")?.as_str()?,
        row.get("index_method")?.as_str()?,
    ))
}

// ---------------------------------------------------------------------------
// Row -> Object
// ---------------------------------------------------------------------------

fn object_from_row(kind: Kind, row: &Row) -> Result<Object, Error> {
    let text = |column: &str| -> Option<String> {
        row.get(column).and_then(Field::as_str).map(str::to_string)
    };
    let need = |column: &str| -> Result<String, Error> {
        text(column).ok_or_else(|| Error::CatalogRead {
            kind: kind.word(),
            reason: format!("row is missing the '{column}' field"),
        })
    };

    let key = match kind {
        Kind::Schema | Kind::Extension | Kind::Language | Kind::ForeignDataWrapper | Kind::Server => {
            Key::one(need("name")?)
        }
        Kind::Cast => Key::two(need("source")?, need("target")?),
        Kind::UserMapping => Key::two(need("username")?, need("server")?),
        Kind::Function | Kind::Operator => Key::three(
            need("schema")?,
            need("name")?,
            normalize_args(&need("arguments")?),
        ),
        Kind::OperatorClass | Kind::OperatorFamily => {
            Key::three(need("schema")?, need("name")?, need("index_method")?)
        }
        k if k.table_scoped() => Key::three(need("schema")?, need("table")?, need("name")?),
        _ => Key::two(need("schema")?, need("name")?),
    };

    let mut object = Object::new(kind, key);
    object.owner = text("owner");
    object.description = text("description");
    object.oid = row.get("oid").and_then(Field::as_int);

    object.attrs = match kind {
        Kind::Constraint => Attrs::Constraint(constraint_attrs(row)),
        Kind::Trigger => Attrs::Trigger(trigger_attrs(row)),
        Kind::Rule => Attrs::Rule(rule_attrs(row)),
        _ => {
            let mapping = plain_attr_mapping(kind, row);
            Attrs::from_mapping(kind, mapping).map_err(|e| Error::CatalogRead {
                kind: kind.word(),
                reason: e.to_string(),
            })?
        }
    };
    Ok(object)
}

/// Columns consumed by the key or the common fields, never by attributes.
fn consumed_columns(kind: Kind) -> &'static [&'static str] {
    match kind {
        Kind::Cast => &["oid", "owner", "description", "source", "target"],
        Kind::UserMapping => &["oid", "owner", "description", "username", "server"],
        Kind::Function | Kind::Operator => {
            &["oid", "owner", "description", "schema", "name", "arguments"]
        }
        Kind::OperatorClass | Kind::OperatorFamily => {
            &["oid", "owner", "description", "schema", "name", "index_method"]
        }
        Kind::Type => &["oid", "owner", "description", "schema", "name", "kindcode"],
        // An extension's schema is an attribute, not part of its key.
        Kind::Extension => &["oid", "owner", "description", "name"],
        _ => &["oid", "owner", "description", "schema", "name", "table"],
    }
}

/// Generic row -> attribute-fragment conversion for kinds whose column
/// aliases line up with their attribute fields, plus the two list-shaped
/// fixups (index keys, foreign-data options).
fn plain_attr_mapping(kind: Kind, row: &Row) -> Mapping {
    let consumed = consumed_columns(kind);
    let mut mapping = Mapping::new();
    for (column, field) in row {
        if consumed.contains(&column.as_str()) {
            continue;
        }
        let value = match field {
            Field::Text(s) => Value::from(s.as_str()),
            Field::Int(i) => Value::from(*i),
            Field::Float(f) => Value::from(*f),
            Field::Bool(b) => Value::from(*b),
            Field::Null => continue,
        };
        match (kind, column.as_str()) {
            (Kind::Index, "keys") => {
                let keys: Vec<Value> = field
                    .as_str()
                    .unwrap_or_default()
                    .split('\u{1}')
                    .filter(|s| !s.is_empty())
                    .map(Value::from)
                    .collect();
                mapping.insert(Value::from("keys"), Value::Sequence(keys));
            }
            (
                Kind::ForeignDataWrapper | Kind::Server | Kind::UserMapping | Kind::ForeignTable,
                "options",
            ) => {
                if let Some(options) = parse_options(field.as_str().unwrap_or_default()) {
                    mapping.insert(Value::from("options"), options);
                }
            }
            _ => {
                mapping.insert(Value::from(column.as_str()), value);
            }
        }
    }
    mapping
}

/// `k=v<SOH>k=v` (array_to_string over a catalog options array) -> mapping.
fn parse_options(joined: &str) -> Option<Value> {
    let mut options = Mapping::new();
    for item in joined.split('\u{1}').filter(|s| !s.is_empty()) {
        let (k, v) = item.split_once('=')?;
        options.insert(Value::from(k), Value::from(v));
    }
    if options.is_empty() {
        None
    } else {
        Some(Value::Mapping(options))
    }
}

fn constraint_attrs(row: &Row) -> ConstraintAttrs {
    let text = |c: &str| row.get(c).and_then(Field::as_str).map(str::to_string);
    let flag = |c: &str| row.get(c).and_then(|f| match f {
        Field::Bool(b) => Some(*b),
        _ => None,
    });
    let columns: Vec<String> = text("columns")
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let mut attrs = ConstraintAttrs::default();
    match text("contype").as_deref() {
        Some("c") => attrs.check = text("expression"),
        Some("p") => attrs.primary_key = Some(columns),
        Some("u") => attrs.unique = Some(columns),
        Some("f") => {
            attrs.foreign_key = Some(columns);
            attrs.ref_table = text("ref_table");
            attrs.ref_columns = Some(
                text("ref_columns")
                    .unwrap_or_default()
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
            attrs.on_update = text("on_update");
            attrs.on_delete = text("on_delete");
            attrs.deferrable = flag("deferrable");
            attrs.deferred = flag("deferred");
        }
        _ => {}
    }
    attrs
}

/// Decode the packed `tgtype` bit field the way the server stores it.
fn trigger_attrs(row: &Row) -> TriggerAttrs {
    const ROW: i64 = 1 << 0;
    const BEFORE: i64 = 1 << 1;
    const INSERT: i64 = 1 << 2;
    const DELETE: i64 = 1 << 3;
    const UPDATE: i64 = 1 << 4;
    const TRUNCATE: i64 = 1 << 5;
    const INSTEAD: i64 = 1 << 6;

    let tgtype = row.get("tgtype").and_then(Field::as_int).unwrap_or(0);
    let mut events = Vec::new();
    for (bit, word) in [
        (INSERT, "insert"),
        (DELETE, "delete"),
        (UPDATE, "update"),
        (TRUNCATE, "truncate"),
    ] {
        if tgtype & bit != 0 {
            events.push(word.to_string());
        }
    }
    TriggerAttrs {
        timing: Some(
            if tgtype & INSTEAD != 0 {
                "instead of"
            } else if tgtype & BEFORE != 0 {
                "before"
            } else {
                "after"
            }
            .to_string(),
        ),
        events: Some(events),
        level: Some(if tgtype & ROW != 0 { "row" } else { "statement" }.to_string()),
        procedure: row.get("procedure").and_then(Field::as_str).map(str::to_string),
        condition: None,
        columns: None,
    }
}

/// Recover condition and actions from the reconstructed rule definition.
fn rule_attrs(row: &Row) -> RuleAttrs {
    let text = |c: &str| row.get(c).and_then(Field::as_str).map(str::to_string);
    let mut attrs = RuleAttrs {
        event: text("event"),
        instead: row.get("instead").and_then(|f| match f {
            Field::Bool(b) => Some(*b),
            _ => None,
        }),
        condition: None,
        actions: None,
    };
    if let Some(definition) = text("definition") {
        if let Some((head, tail)) = definition.split_once(" DO ") {
            let tail = tail
                .trim()
                .trim_start_matches("INSTEAD ")
                .trim_end_matches(';')
                .to_string();
            attrs.actions = Some(tail);
            if let Some((_, cond)) = head.split_once(" WHERE ") {
                attrs.condition = Some(cond.trim().to_string());
            }
        }
    }
    attrs
}

// ---------------------------------------------------------------------------
// Optional catalog features
// ---------------------------------------------------------------------------

/// Reserved words, for `--quote-reserved`.
pub fn reserved_words(
    reader: &mut dyn CatalogReader,
) -> Result<std::collections::HashSet<String>, Error> {
    let rows = reader.query("SELECT word FROM pg_get_keywords() WHERE catcode != 'U'")?;
    reader.rollback();
    Ok(rows
        .iter()
        .filter_map(|row| row.get("word").and_then(Field::as_str))
        .map(str::to_string)
        .collect())
}

/// Installed language template names. The template catalog only exists on a
/// window of server versions; outside it (or on any failure) the feature is
/// simply absent.
pub fn language_templates(reader: &mut dyn CatalogReader) -> Option<Vec<String>> {
    let version = reader.server_version();
    if !(90100..130000).contains(&version) {
        return None;
    }
    match reader.query("SELECT tmplname AS name FROM pg_pltemplate") {
        Ok(rows) => {
            reader.rollback();
            Some(
                rows.iter()
                    .filter_map(|row| row.get("name").and_then(Field::as_str))
                    .map(str::to_string)
                    .collect(),
            )
        }
        Err(e) => {
            warn!(error = %e, "language template lookup failed; continuing without");
            reader.rollback();
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn primary_query(kind: Kind) -> &'static str {
    match kind {
        Kind::Schema => {
            r#"SELECT n.oid, nspname AS name, rolname AS owner,
       obj_description(n.oid, 'pg_namespace') AS description
  FROM pg_namespace n JOIN pg_roles r ON r.oid = n.nspowner
 WHERE nspname !~ '^pg_' AND nspname != 'information_schema'
 ORDER BY nspname"#
        }
        Kind::Extension => {
            r#"SELECT e.oid, extname AS name, nspname AS schema, extversion AS version,
       obj_description(e.oid, 'pg_extension') AS description
  FROM pg_extension e JOIN pg_namespace n ON n.oid = extnamespace
 WHERE extname != 'plpgsql'
 ORDER BY extname"#
        }
        Kind::Language => {
            r#"SELECT l.oid, lanname AS name, rolname AS owner,
       CASE WHEN lanpltrusted THEN true END AS trusted,
       obj_description(l.oid, 'pg_language') AS description
  FROM pg_language l JOIN pg_roles r ON r.oid = lanowner
 WHERE lanispl
 ORDER BY lanname"#
        }
        Kind::Cast => {
            r#"SELECT c.oid, castsource::regtype::text AS source, casttarget::regtype::text AS target,
       CASE WHEN castfunc != 0 THEN castfunc::regprocedure::text END AS function,
       CASE castcontext WHEN 'i' THEN 'implicit' WHEN 'a' THEN 'assignment' ELSE 'explicit' END AS context,
       CASE castmethod WHEN 'f' THEN 'function' WHEN 'i' THEN 'inout' ELSE 'binary' END AS method,
       obj_description(c.oid, 'pg_cast') AS description
  FROM pg_cast c
 WHERE c.oid >= 16384
 ORDER BY c.oid"#
        }
        Kind::Collation => {
            r#"SELECT c.oid, nspname AS schema, collname AS name, rolname AS owner,
       collcollate AS lc_collate, collctype AS lc_ctype,
       CASE collprovider WHEN 'c' THEN 'libc' WHEN 'i' THEN 'icu' END AS provider,
       obj_description(c.oid, 'pg_collation') AS description
  FROM pg_collation c JOIN pg_namespace n ON n.oid = collnamespace
       JOIN pg_roles r ON r.oid = collowner
 WHERE nspname NOT IN ('pg_catalog', 'information_schema')
 ORDER BY nspname, collname"#
        }
        Kind::Conversion => {
            r#"SELECT c.oid, nspname AS schema, conname AS name, rolname AS owner,
       pg_encoding_to_char(conforencoding) AS source_encoding,
       pg_encoding_to_char(contoencoding) AS dest_encoding,
       conproc::regprocedure::text AS function,
       CASE WHEN condefault THEN true END AS "default",
       obj_description(c.oid, 'pg_conversion') AS description
  FROM pg_conversion c JOIN pg_namespace n ON n.oid = connamespace
       JOIN pg_roles r ON r.oid = conowner
 WHERE nspname NOT IN ('pg_catalog', 'information_schema')
 ORDER BY nspname, conname"#
        }
        Kind::Type => {
            r#"SELECT t.oid, nspname AS schema, typname AS name, rolname AS owner,
       typtype::text AS kindcode,
       CASE WHEN typtype = 'd' THEN typbasetype::regtype::text END AS base,
       CASE WHEN typtype = 'd' THEN
            (SELECT pg_get_expr(conbin, 0) FROM pg_constraint
              WHERE contypid = t.oid AND contype = 'c' LIMIT 1) END AS "check",
       CASE WHEN typtype = 'b' THEN typinput::regproc::text END AS input,
       CASE WHEN typtype = 'b' THEN typoutput::regproc::text END AS output,
       CASE WHEN typtype = 'b' AND typlen > 0 THEN typlen::int END AS internallength,
       obj_description(t.oid, 'pg_type') AS description
  FROM pg_type t JOIN pg_namespace n ON n.oid = typnamespace
       JOIN pg_roles r ON r.oid = typowner
 WHERE nspname NOT IN ('pg_catalog', 'information_schema')
   AND typtype IN ('b', 'c', 'd', 'e')
   AND NOT (typtype = 'c' AND EXISTS
        (SELECT 1 FROM pg_class WHERE oid = typrelid AND relkind != 'c'))
   AND NOT EXISTS
        (SELECT 1 FROM pg_type el WHERE el.oid = t.typelem AND el.typarray = t.oid)
   AND t.oid NOT IN
        (SELECT objid FROM pg_depend WHERE deptype = 'e' AND classid = 'pg_type'::regclass)
 ORDER BY nspname, typname"#
        }
        Kind::Table => {
            r#"SELECT c.oid, nspname AS schema, relname AS name, rolname AS owner,
       CASE WHEN relpersistence = 'u' THEN true END AS unlogged,
       obj_description(c.oid, 'pg_class') AS description
  FROM pg_class c JOIN pg_namespace n ON n.oid = relnamespace
       JOIN pg_roles r ON r.oid = relowner
 WHERE relkind = 'r' AND nspname NOT IN ('pg_catalog', 'information_schema')
   AND c.oid NOT IN
        (SELECT objid FROM pg_depend WHERE deptype = 'e' AND classid = 'pg_class'::regclass)
 ORDER BY nspname, relname"#
        }
        Kind::Column => {
            r#"SELECT nspname AS schema, relname AS "table", attname AS name,
       format_type(atttypid, atttypmod) AS type,
       CASE WHEN attnotnull THEN true END AS not_null,
       pg_get_expr(adbin, adrelid) AS "default",
       CASE WHEN attstattarget > 0 THEN attstattarget::int END AS statistics,
       CASE WHEN attinhcount > 0 THEN true END AS inherited,
       col_description(c.oid, attnum) AS description
  FROM pg_attribute a JOIN pg_class c ON c.oid = attrelid
       JOIN pg_namespace n ON n.oid = relnamespace
       LEFT JOIN pg_attrdef d ON adrelid = attrelid AND adnum = attnum
 WHERE relkind IN ('r', 'f') AND attnum > 0 AND NOT attisdropped
   AND nspname NOT IN ('pg_catalog', 'information_schema')
 ORDER BY nspname, relname, attnum"#
        }
        Kind::Constraint => {
            r#"SELECT c.oid, nspname AS schema, t.relname AS "table", conname AS name,
       contype::text AS contype,
       CASE WHEN contype = 'c' THEN pg_get_expr(conbin, conrelid) END AS expression,
       array_to_string(ARRAY(SELECT attname FROM pg_attribute a
            WHERE a.attrelid = conrelid AND a.attnum = ANY (conkey)
            ORDER BY array_position(conkey, a.attnum)), ',') AS columns,
       CASE WHEN contype = 'f' THEN confrelid::regclass::text END AS ref_table,
       array_to_string(ARRAY(SELECT attname FROM pg_attribute a
            WHERE a.attrelid = confrelid AND a.attnum = ANY (confkey)
            ORDER BY array_position(confkey, a.attnum)), ',') AS ref_columns,
       CASE confupdtype WHEN 'c' THEN 'cascade' WHEN 'n' THEN 'set null'
            WHEN 'd' THEN 'set default' WHEN 'r' THEN 'restrict' END AS on_update,
       CASE confdeltype WHEN 'c' THEN 'cascade' WHEN 'n' THEN 'set null'
            WHEN 'd' THEN 'set default' WHEN 'r' THEN 'restrict' END AS on_delete,
       CASE WHEN condeferrable THEN true END AS deferrable,
       CASE WHEN condeferred THEN true END AS deferred,
       obj_description(c.oid, 'pg_constraint') AS description
  FROM pg_constraint c JOIN pg_class t ON t.oid = conrelid
       JOIN pg_namespace n ON n.oid = t.relnamespace
 WHERE contype IN ('c', 'p', 'u', 'f')
   AND nspname NOT IN ('pg_catalog', 'information_schema')
 ORDER BY nspname, t.relname, conname"#
        }
        Kind::Index => {
            r#"SELECT i.oid, nspname AS schema, t.relname AS "table", i.relname AS name,
       amname AS access_method,
       CASE WHEN indisunique THEN true END AS "unique",
       array_to_string(ARRAY(SELECT pg_get_indexdef(indexrelid, k, true)
            FROM generate_series(1, indnkeyatts) k), chr(1)) AS keys,
       pg_get_expr(indpred, indrelid) AS predicate,
       obj_description(i.oid, 'pg_class') AS description
  FROM pg_index x JOIN pg_class i ON i.oid = indexrelid
       JOIN pg_class t ON t.oid = indrelid
       JOIN pg_namespace n ON n.oid = t.relnamespace
       JOIN pg_am am ON am.oid = i.relam
 WHERE NOT indisprimary
   AND i.oid NOT IN (SELECT conindid FROM pg_constraint)
   AND nspname NOT IN ('pg_catalog', 'information_schema')
 ORDER BY nspname, t.relname, i.relname"#
        }
        Kind::Function => {
            r#"SELECT p.oid, nspname AS schema, proname AS name,
       pg_get_function_identity_arguments(p.oid) AS arguments,
       rolname AS owner, lanname AS language,
       pg_get_function_result(p.oid) AS returns, prosrc AS source,
       CASE provolatile WHEN 'i' THEN 'immutable' WHEN 's' THEN 'stable' END AS volatility,
       CASE WHEN proisstrict THEN true END AS strict,
       CASE WHEN prosecdef THEN true END AS security_definer,
       CASE WHEN procost != 100 THEN procost::float8 END AS cost,
       obj_description(p.oid, 'pg_proc') AS description
  FROM pg_proc p JOIN pg_namespace n ON n.oid = pronamespace
       JOIN pg_roles r ON r.oid = proowner
       JOIN pg_language l ON l.oid = prolang
 WHERE nspname NOT IN ('pg_catalog', 'information_schema')
   AND p.oid NOT IN
        (SELECT objid FROM pg_depend WHERE deptype = 'e' AND classid = 'pg_proc'::regclass)
 ORDER BY nspname, proname"#
        }
        Kind::Operator => {
            r#"SELECT o.oid, nspname AS schema, oprname AS name,
       CASE WHEN oprleft != 0 THEN oprleft::regtype::text ELSE 'NONE' END || ', ' ||
       CASE WHEN oprright != 0 THEN oprright::regtype::text ELSE 'NONE' END AS arguments,
       rolname AS owner, oprcode::regproc::text AS procedure,
       CASE WHEN oprcom != 0 THEN oprcom::regoperator::text END AS commutator,
       CASE WHEN oprnegate != 0 THEN oprnegate::regoperator::text END AS negator,
       CASE WHEN oprrest != 0 THEN oprrest::regproc::text END AS restrict,
       CASE WHEN oprjoin != 0 THEN oprjoin::regproc::text END AS "join",
       CASE WHEN oprcanhash THEN true END AS hashes,
       CASE WHEN oprcanmerge THEN true END AS merges,
       obj_description(o.oid, 'pg_operator') AS description
  FROM pg_operator o JOIN pg_namespace n ON n.oid = oprnamespace
       JOIN pg_roles r ON r.oid = oprowner
 WHERE nspname NOT IN ('pg_catalog', 'information_schema')
 ORDER BY nspname, oprname"#
        }
        Kind::OperatorFamily => {
            r#"SELECT f.oid, nspname AS schema, opfname AS name, amname AS index_method,
       rolname AS owner,
       obj_description(f.oid, 'pg_opfamily') AS description
  FROM pg_opfamily f JOIN pg_am a ON a.oid = opfmethod
       JOIN pg_namespace n ON n.oid = opfnamespace
       JOIN pg_roles r ON r.oid = opfowner
 WHERE nspname NOT IN ('pg_catalog', 'information_schema')
 ORDER BY nspname, opfname, amname"#
        }
        Kind::OperatorClass => {
            r#"SELECT o.oid, nspname AS schema, opcname AS name, rolname AS owner,
       amname AS index_method, opfname AS family,
       opcintype::regtype::text AS type,
       CASE WHEN opcdefault THEN true END AS "default",
       CASE WHEN opckeytype != 0 THEN opckeytype::regtype::text END AS storage,
       obj_description(o.oid, 'pg_opclass') AS description
  FROM pg_opclass o JOIN pg_am a ON a.oid = opcmethod
       JOIN pg_roles r ON r.oid = opcowner
       JOIN pg_opfamily f ON f.oid = opcfamily
       JOIN pg_namespace n ON n.oid = opcnamespace
 WHERE nspname NOT IN ('pg_catalog', 'information_schema')
   AND o.oid NOT IN
        (SELECT objid FROM pg_depend WHERE deptype = 'e' AND classid = 'pg_opclass'::regclass)
 ORDER BY nspname, opcname, amname"#
        }
        Kind::Rule => {
            r#"SELECT r.oid, nspname AS schema, c.relname AS "table", rulename AS name,
       CASE ev_type WHEN '1' THEN 'select' WHEN '2' THEN 'update'
            WHEN '3' THEN 'insert' WHEN '4' THEN 'delete' END AS event,
       CASE WHEN is_instead THEN true END AS instead,
       pg_get_ruledef(r.oid) AS definition,
       obj_description(r.oid, 'pg_rewrite') AS description
  FROM pg_rewrite r JOIN pg_class c ON c.oid = ev_class
       JOIN pg_namespace n ON n.oid = relnamespace
 WHERE rulename != '_RETURN'
   AND nspname NOT IN ('pg_catalog', 'information_schema')
 ORDER BY nspname, c.relname, rulename"#
        }
        Kind::Trigger => {
            r#"SELECT t.oid, nspname AS schema, c.relname AS "table", tgname AS name,
       tgtype::int AS tgtype, tgfoid::regprocedure::text AS procedure,
       obj_description(t.oid, 'pg_trigger') AS description
  FROM pg_trigger t JOIN pg_class c ON c.oid = tgrelid
       JOIN pg_namespace n ON n.oid = relnamespace
 WHERE NOT tgisinternal
   AND nspname NOT IN ('pg_catalog', 'information_schema')
 ORDER BY nspname, c.relname, tgname"#
        }
        Kind::TsDictionary => {
            r#"SELECT d.oid, nspname AS schema, dictname AS name, rolname AS owner,
       tmplname AS template,
       NULLIF(dictinitoption, '') AS options,
       obj_description(d.oid, 'pg_ts_dict') AS description
  FROM pg_ts_dict d JOIN pg_ts_template t ON t.oid = dicttemplate
       JOIN pg_namespace n ON n.oid = dictnamespace
       JOIN pg_roles r ON r.oid = dictowner
 WHERE nspname NOT IN ('pg_catalog', 'information_schema')
 ORDER BY nspname, dictname"#
        }
        Kind::TsTemplate => {
            r#"SELECT t.oid, nspname AS schema, tmplname AS name,
       CASE WHEN tmplinit != 0 THEN tmplinit::regproc::text END AS init,
       tmpllexize::regproc::text AS lexize,
       obj_description(t.oid, 'pg_ts_template') AS description
  FROM pg_ts_template t JOIN pg_namespace n ON n.oid = tmplnamespace
 WHERE nspname NOT IN ('pg_catalog', 'information_schema')
 ORDER BY nspname, tmplname"#
        }
        Kind::TsParser => {
            r#"SELECT p.oid, nspname AS schema, prsname AS name,
       prsstart::regproc::text AS start, prstoken::regproc::text AS gettoken,
       prsend::regproc::text AS "end", prslextype::regproc::text AS lextypes,
       CASE WHEN prsheadline != 0 THEN prsheadline::regproc::text END AS headline,
       obj_description(p.oid, 'pg_ts_parser') AS description
  FROM pg_ts_parser p JOIN pg_namespace n ON n.oid = prsnamespace
 WHERE nspname NOT IN ('pg_catalog', 'information_schema')
 ORDER BY nspname, prsname"#
        }
        Kind::TsConfiguration => {
            r#"SELECT c.oid, nspname AS schema, cfgname AS name, rolname AS owner,
       p.prsname AS parser,
       obj_description(c.oid, 'pg_ts_config') AS description
  FROM pg_ts_config c JOIN pg_ts_parser p ON p.oid = cfgparser
       JOIN pg_namespace n ON n.oid = cfgnamespace
       JOIN pg_roles r ON r.oid = cfgowner
 WHERE nspname NOT IN ('pg_catalog', 'information_schema')
 ORDER BY nspname, cfgname"#
        }
        Kind::ForeignDataWrapper => {
            r#"SELECT w.oid, fdwname AS name, rolname AS owner,
       CASE WHEN fdwhandler != 0 THEN fdwhandler::regproc::text END AS handler,
       CASE WHEN fdwvalidator != 0 THEN fdwvalidator::regproc::text END AS validator,
       array_to_string(fdwoptions, chr(1)) AS options,
       obj_description(w.oid, 'pg_foreign_data_wrapper') AS description
  FROM pg_foreign_data_wrapper w JOIN pg_roles r ON r.oid = fdwowner
 ORDER BY fdwname"#
        }
        Kind::Server => {
            r#"SELECT s.oid, srvname AS name, rolname AS owner, fdwname AS wrapper,
       srvtype AS type, srvversion AS version,
       array_to_string(srvoptions, chr(1)) AS options,
       obj_description(s.oid, 'pg_foreign_server') AS description
  FROM pg_foreign_server s JOIN pg_foreign_data_wrapper w ON w.oid = srvfdw
       JOIN pg_roles r ON r.oid = srvowner
 ORDER BY srvname"#
        }
        Kind::UserMapping => {
            r#"SELECT CASE WHEN umuser != 0 THEN ro.rolname ELSE 'PUBLIC' END AS username,
       srvname AS server,
       array_to_string(umoptions, chr(1)) AS options
  FROM pg_user_mapping u JOIN pg_foreign_server s ON s.oid = umserver
       LEFT JOIN pg_roles ro ON ro.oid = umuser
 ORDER BY srvname, username"#
        }
        Kind::ForeignTable => {
            r#"SELECT c.oid, nspname AS schema, relname AS name, rolname AS owner,
       srvname AS server,
       array_to_string(ftoptions, chr(1)) AS options,
       obj_description(c.oid, 'pg_class') AS description
  FROM pg_foreign_table ft JOIN pg_class c ON c.oid = ftrelid
       JOIN pg_foreign_server s ON s.oid = ftserver
       JOIN pg_namespace n ON n.oid = relnamespace
       JOIN pg_roles r ON r.oid = relowner
 ORDER BY nspname, relname"#
        }
    }
}

const ENUM_LABEL_QUERY: &str = r#"SELECT enumtypid::bigint AS typoid, enumlabel AS label
  FROM pg_enum
 ORDER BY enumtypid, enumsortorder"#;

const COMPOSITE_ATTR_QUERY: &str = r#"SELECT t.oid::bigint AS typoid, attname AS name,
       format_type(atttypid, atttypmod) AS type
  FROM pg_type t JOIN pg_attribute a ON a.attrelid = t.typrelid
       JOIN pg_namespace n ON n.oid = t.typnamespace
 WHERE t.typtype = 'c' AND a.attnum > 0 AND NOT attisdropped
   AND nspname NOT IN ('pg_catalog', 'information_schema')
 ORDER BY t.oid, a.attnum"#;

const CLASS_OPERATOR_QUERY: &str = r#"SELECT nspname AS schema, opcname AS name, amname AS index_method,
       amopstrategy AS strategy, amopopr::regoperator::text AS operator
  FROM pg_amop ao
       JOIN pg_depend d ON d.classid = 'pg_amop'::regclass AND d.objid = ao.oid
       JOIN pg_opclass o ON d.refclassid = 'pg_opclass'::regclass AND d.refobjid = o.oid
       JOIN pg_am a ON a.oid = opcmethod
       JOIN pg_namespace n ON n.oid = opcnamespace
 WHERE nspname NOT IN ('pg_catalog', 'information_schema')
 ORDER BY nspname, opcname, amname, amopstrategy"#;

const CLASS_FUNCTION_QUERY: &str = r#"SELECT nspname AS schema, opcname AS name, amname AS index_method,
       amprocnum AS support, amproc::regprocedure::text AS function
  FROM pg_amproc ap
       JOIN pg_depend d ON d.classid = 'pg_amproc'::regclass AND d.objid = ap.oid
       JOIN pg_opclass o ON d.refclassid = 'pg_opclass'::regclass AND d.refobjid = o.oid
       JOIN pg_am a ON a.oid = opcmethod
       JOIN pg_namespace n ON n.oid = opcnamespace
 WHERE nspname NOT IN ('pg_catalog', 'information_schema')
 ORDER BY nspname, opcname, amname, amprocnum"#;

const CONFIG_MAPPING_QUERY: &str = r#"SELECT m.mapcfg::bigint AS cfgoid, t.alias AS token, d.dictname AS dictionary
  FROM pg_ts_config_map m
       JOIN pg_ts_config c ON c.oid = m.mapcfg
       JOIN pg_ts_dict d ON d.oid = m.mapdict
       JOIN LATERAL ts_token_type(c.cfgparser) t ON t.tokid = m.maptokentype
 ORDER BY m.mapcfg, m.maptokentype, m.mapseqno"#;

// ---------------------------------------------------------------------------
// Blocking postgres implementation
// ---------------------------------------------------------------------------

/// Catalog reader over one blocking connection.
pub struct PgReader {
    client: postgres::Client,
    version: u32,
}

impl PgReader {
    /// Connect and position the session for catalog reads: search path set
    /// to `public, pg_catalog` (falling back to `pg_catalog` alone) and the
    /// server version captured.
    pub fn connect(dsn: &str) -> Result<PgReader, Error> {
        let mut client = postgres::Client::connect(dsn, postgres::NoTls)?;
        if client
            .batch_execute("SET search_path TO public, pg_catalog")
            .is_err()
        {
            client.batch_execute("SET search_path TO pg_catalog")?;
        }
        let row = client.query_one("SHOW server_version_num", &[])?;
        let version: String = row.get(0);
        Ok(PgReader {
            client,
            version: version.trim().parse().unwrap_or(0),
        })
    }
}

impl CatalogReader for PgReader {
    fn server_version(&self) -> u32 {
        self.version
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>, Error> {
        let rows = self.client.query(sql, &[])?;
        Ok(rows.iter().map(convert_row).collect())
    }

    fn rollback(&mut self) {
        // Harmless outside a transaction; clears an aborted one so the next
        // registry's fetch starts clean.
        let _ = self.client.batch_execute("ROLLBACK");
    }
}

fn convert_row(row: &postgres::Row) -> Row {
    let mut fields = IndexMap::new();
    for (i, column) in row.columns().iter().enumerate() {
        let field = match column.type_().name() {
            "bool" => row
                .try_get::<_, Option<bool>>(i)
                .ok()
                .flatten()
                .map(Field::Bool),
            "int2" => row
                .try_get::<_, Option<i16>>(i)
                .ok()
                .flatten()
                .map(|v| Field::Int(v as i64)),
            "int4" => row
                .try_get::<_, Option<i32>>(i)
                .ok()
                .flatten()
                .map(|v| Field::Int(v as i64)),
            "int8" => row
                .try_get::<_, Option<i64>>(i)
                .ok()
                .flatten()
                .map(Field::Int),
            "oid" => row
                .try_get::<_, Option<u32>>(i)
                .ok()
                .flatten()
                .map(|v| Field::Int(v as i64)),
            "float4" => row
                .try_get::<_, Option<f32>>(i)
                .ok()
                .flatten()
                .map(|v| Field::Float(v as f64)),
            "float8" => row
                .try_get::<_, Option<f64>>(i)
                .ok()
                .flatten()
                .map(Field::Float),
            _ => row
                .try_get::<_, Option<String>>(i)
                .ok()
                .flatten()
                .map(Field::Text),
        };
        fields.insert(column.name().to_string(), field.unwrap_or(Field::Null));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Canned reader: responses matched by a substring of the query text.
    struct FakeReader {
        responses: Vec<(&'static str, Result<Vec<Row>, String>)>,
        rollbacks: usize,
    }

    impl FakeReader {
        fn new(responses: Vec<(&'static str, Result<Vec<Row>, String>)>) -> FakeReader {
            FakeReader {
                responses,
                rollbacks: 0,
            }
        }
    }

    impl CatalogReader for FakeReader {
        fn server_version(&self) -> u32 {
            150004
        }

        fn query(&mut self, sql: &str) -> Result<Vec<Row>, Error> {
            for (needle, response) in &self.responses {
                if sql.contains(needle) {
                    return response.clone().map_err(|reason| Error::CatalogRead {
                        kind: "fake",
                        reason,
                    });
                }
            }
            Ok(Vec::new())
        }

        fn rollback(&mut self) {
            self.rollbacks += 1;
        }
    }

    fn row(fields: &[(&str, Field)]) -> Row {
        fields
            .iter()
            .map(|(name, field)| (name.to_string(), field.clone()))
            .collect()
    }

    fn text(s: &str) -> Field {
        Field::Text(s.to_string())
    }

    #[test]
    fn load_graph_builds_objects_from_rows() {
        let mut reader = FakeReader::new(vec![
            (
                "FROM pg_namespace",
                Ok(vec![row(&[
                    ("oid", Field::Int(2200)),
                    ("name", text("public")),
                    ("owner", text("postgres")),
                    ("description", Field::Null),
                ])]),
            ),
            (
                "FROM pg_extension",
                Ok(vec![row(&[
                    ("oid", Field::Int(16390)),
                    ("name", text("hstore")),
                    ("schema", text("public")),
                    ("version", text("1.8")),
                    ("description", Field::Null),
                ])]),
            ),
            (
                "FROM pg_class c JOIN pg_namespace",
                Ok(vec![row(&[
                    ("oid", Field::Int(16401)),
                    ("schema", text("public")),
                    ("name", text("orders")),
                    ("owner", text("postgres")),
                    ("unlogged", Field::Null),
                    ("description", text("order ledger")),
                ])]),
            ),
            (
                "FROM pg_attribute a JOIN pg_class",
                Ok(vec![row(&[
                    ("schema", text("public")),
                    ("table", text("orders")),
                    ("name", text("id")),
                    ("type", text("bigint")),
                    ("not_null", Field::Bool(true)),
                    ("default", Field::Null),
                    ("inherited", Field::Null),
                    ("description", Field::Null),
                ])]),
            ),
        ]);

        let graph = load_graph(&mut reader).unwrap();
        assert_eq!(graph.schemas.len(), 1);
        let ext = graph.extensions.get(&Key::one("hstore")).unwrap();
        assert!(
            matches!(&ext.attrs, Attrs::Extension(a) if a.schema.as_deref() == Some("public"))
        );
        let table = graph.tables.get(&Key::two("public", "orders")).unwrap();
        assert_eq!(table.description.as_deref(), Some("order ledger"));
        assert_eq!(table.oid, Some(16401));
        let column = graph
            .columns
            .get(&Key::three("public", "orders", "id"))
            .unwrap();
        assert!(matches!(&column.attrs, Attrs::Column(a) if a.not_null == Some(true)));
        // One rollback per fetch keeps the shared connection clean.
        assert!(reader.rollbacks >= Kind::FORWARD_ORDER.len());
    }

    #[test]
    fn auxiliary_failure_is_absorbed_and_rolled_back() {
        let mut reader = FakeReader::new(vec![
            (
                "FROM pg_opclass o JOIN",
                Ok(vec![row(&[
                    ("oid", Field::Int(16500)),
                    ("schema", text("public")),
                    ("name", text("geom_gist")),
                    ("owner", text("postgres")),
                    ("index_method", text("gist")),
                    ("family", text("geom_gist")),
                    ("type", text("geom")),
                    ("default", Field::Null),
                    ("storage", Field::Null),
                    ("description", Field::Null),
                ])]),
            ),
            (
                "FROM pg_amop",
                Ok(vec![row(&[
                    ("schema", text("public")),
                    ("name", text("geom_gist")),
                    ("index_method", text("gist")),
                    ("strategy", Field::Int(1)),
                    ("operator", text("<(geom,geom)")),
                ])]),
            ),
            ("FROM pg_amproc", Err("version-gated shape".to_string())),
        ]);

        let graph = load_graph(&mut reader).unwrap();
        let opclass = graph
            .operator_classes
            .get(&Key::three("public", "geom_gist", "gist"))
            .unwrap();
        let Attrs::OperatorClass(attrs) = &opclass.attrs else {
            panic!("wrong attrs variant")
        };
        // The strategy rows made it in; the failed support fetch left that
        // feature absent instead of aborting population.
        assert_eq!(attrs.operators.as_ref().unwrap().get(&1).unwrap(), "<(geom,geom)");
        assert!(attrs.functions.is_none());
    }

    #[test]
    fn primary_failure_is_fatal_and_names_the_kind() {
        let mut reader = FakeReader::new(vec![(
            "FROM pg_namespace",
            Err("connection reset".to_string()),
        )]);
        let err = load_graph(&mut reader).unwrap_err();
        match err {
            Error::CatalogRead { kind, .. } => assert_eq!(kind, "schema"),
            other => panic!("expected CatalogRead, got {other:?}"),
        }
    }

    #[test]
    fn trigger_bits_decode_to_timing_events_and_level() {
        // BEFORE INSERT OR UPDATE ... FOR EACH ROW = 1 | 2 | 4 | 16
        let attrs = trigger_attrs(&row(&[
            ("tgtype", Field::Int(23)),
            ("procedure", text("check_orders()")),
        ]));
        assert_eq!(attrs.timing.as_deref(), Some("before"));
        assert_eq!(
            attrs.events.as_deref(),
            Some(&["insert".to_string(), "update".to_string()][..])
        );
        assert_eq!(attrs.level.as_deref(), Some("row"));
    }

    #[test]
    fn rule_definition_splits_into_condition_and_actions() {
        let attrs = rule_attrs(&row(&[
            ("event", text("update")),
            ("instead", Field::Bool(true)),
            (
                "definition",
                text("CREATE RULE guard AS ON UPDATE TO public.orders WHERE (old.sealed) DO INSTEAD NOTHING;"),
            ),
        ]));
        assert_eq!(attrs.condition.as_deref(), Some("(old.sealed)"));
        assert_eq!(attrs.actions.as_deref(), Some("NOTHING"));
        assert_eq!(attrs.instead, Some(true));
    }

    #[test]
    fn options_arrays_parse_into_maps() {
        let parsed = parse_options("host=a\u{1}dbname=x");
        let Some(Value::Mapping(m)) = parsed else { panic!("expected mapping") };
        assert_eq!(m.get("host"), Some(&Value::from("a")));
        assert_eq!(m.get("dbname"), Some(&Value::from("x")));
        assert!(parse_options("").is_none());
    }
}
