//! The diff engine.
//!
//! Compares two populated graphs key-by-key, kind-by-kind, and produces the
//! ordered statement sequence that transforms the first into the second.
//!
//! Two passes:
//!
//! 1. The *forward pass* runs every kind in [`Kind::FORWARD_ORDER`]. Members
//!    only in the new graph are created, members in both are altered (or
//!    renamed when an `oldname` hint matches), and removed members of
//!    ordinary kinds are dropped inline. A table rename shifts every child
//!    key, so children translate their keys through the parent rename and
//!    keep diffing against their old counterparts.
//! 2. Removed members of *foundational* kinds (containers and referenceable
//!    definitions: schemas, types, functions, operators and their classes
//!    and families, extensions, languages, servers, wrappers) are collected
//!    during the forward pass and dropped at the very end, in
//!    [`Kind::CLEANUP_ORDER`], after every object that could reference them
//!    has been handled.
//!
//! Statements accumulate as a tagged tree and are flattened exactly once at
//! the orchestrator boundary.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::catalog::{self, CatalogReader};
use crate::ddl::{self, Render};
use crate::depends::implied_deps;
use crate::document::Document;
use crate::error::Error;
use crate::graph::Graph;
use crate::ident::Quoter;
use crate::object::{Key, Kind, Object};

/// A statement, or an ordered list of statements. Diff steps may nest these
/// arbitrarily; [`flatten`] reduces the tree to one flat sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Sql(String),
    Group(Vec<Stmt>),
}

impl From<String> for Stmt {
    fn from(sql: String) -> Stmt {
        Stmt::Sql(sql)
    }
}

/// Reduce a statement tree to the flat ordered sequence. Used once, at the
/// orchestrator boundary.
pub fn flatten(stmts: Vec<Stmt>) -> Vec<String> {
    fn walk(stmt: Stmt, out: &mut Vec<String>) {
        match stmt {
            Stmt::Sql(sql) => out.push(sql),
            Stmt::Group(items) => {
                for item in items {
                    walk(item, out);
                }
            }
        }
    }
    let mut out = Vec::new();
    for stmt in stmts {
        walk(stmt, &mut out);
    }
    out
}

/// Synthesis options.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Restrict the diff to these schemas (empty = whole database).
    pub schemas: Vec<String>,
    /// Quote identifiers colliding with the server's reserved words.
    pub quote_reserved: bool,
    /// Omit ownership statements.
    pub no_owner: bool,
    /// Omit comment statements.
    pub no_comments: bool,
}

/// Compare the live catalog against a document and return the ordered DDL
/// realizing the document. The document graph is rebuilt from scratch on
/// every call, so the diff always compares a freshly parsed target against
/// the current catalog state.
pub fn synthesize(
    reader: &mut dyn CatalogReader,
    document: &Document,
    options: &Options,
) -> Result<Vec<String>, Error> {
    let mut old = catalog::load_graph(reader)?;

    let mut document = document.clone();
    if !options.schemas.is_empty() {
        document.retain_schemas(&options.schemas);
    }

    let mut render = Render {
        quoter: Quoter::new(),
        no_owner: options.no_owner,
        no_comments: options.no_comments,
        language_templates: catalog::language_templates(reader),
    };
    if options.quote_reserved {
        render.quoter = Quoter::with_reserved(catalog::reserved_words(reader)?);
    }

    let mut new = Graph::from_doc(&document)?;
    if !options.schemas.is_empty() {
        old.retain_schemas(&options.schemas);
        new.retain_schemas(&options.schemas);
    }

    let stmts = diff_graphs(&old, &new, &render);
    info!(statements = stmts.len(), "synthesized schema plan");
    Ok(stmts)
}

/// Diff two already-populated graphs. `old` is the current state, `new` the
/// desired state; the result transforms old into new.
pub fn diff_graphs(old: &Graph, new: &Graph, render: &Render) -> Vec<String> {
    let renamed_tables = table_renames(old, new);
    let mut deferred: Vec<Object> = Vec::new();
    let mut stmts: Vec<Stmt> = Vec::new();
    for kind in Kind::FORWARD_ORDER {
        stmts.push(diff_kind(kind, old, new, render, &renamed_tables, &mut deferred));
    }
    stmts.push(cleanup(deferred, old, render));
    flatten(stmts)
}

/// Tables (and foreign tables) renamed via an `oldname` hint, new key to
/// old key. A table rename shifts every child key, so the child passes
/// translate through this map and keep diffing children against their old
/// counterparts instead of reading them as dropped-and-recreated.
fn table_renames(old_graph: &Graph, new_graph: &Graph) -> HashMap<Key, Key> {
    let mut map = HashMap::new();
    for kind in [Kind::Table, Kind::ForeignTable] {
        let old = old_graph.registry(kind);
        let new = new_graph.registry(kind);
        for obj in new.iter() {
            let Some(oldname) = &obj.oldname else { continue };
            let old_key = obj.key.with_name(kind, oldname);
            if old_key != obj.key && old.contains(&old_key) && !new.contains(&old_key) {
                map.insert(obj.key.clone(), old_key);
            }
        }
    }
    map
}

fn diff_kind(
    kind: Kind,
    old_graph: &Graph,
    new_graph: &Graph,
    render: &Render,
    renamed_tables: &HashMap<Key, Key>,
    deferred: &mut Vec<Object>,
) -> Stmt {
    let old = old_graph.registry(kind);
    let new = new_graph.registry(kind);
    let mut group: Vec<Stmt> = Vec::new();

    // A child key translated to the old side: under a renamed table the
    // old counterpart lives under the table's previous name.
    let old_side = |key: &Key| -> Key {
        if !kind.table_scoped() {
            return key.clone();
        }
        match renamed_tables.get(&Key::two(key.field(0), key.field(1))) {
            Some(parent) => Key::three(parent.field(0), parent.field(1), key.field(2)),
            None => key.clone(),
        }
    };
    // ... and the reverse, for deciding the fate of old-side children.
    let new_side = |key: &Key| -> Key {
        if !kind.table_scoped() {
            return key.clone();
        }
        let parent = Key::two(key.field(0), key.field(1));
        match renamed_tables.iter().find(|(_, from)| **from == parent) {
            Some((to, _)) => Key::three(to.field(0), to.field(1), key.field(2)),
            None => key.clone(),
        }
    };

    // Rename hints: a document object whose oldname matches a live object
    // of the same kind (and containing schema) continues that object under
    // a new name instead of being created from scratch. Kinds without a
    // rename form fall through to plain create + drop.
    let mut renames: HashMap<Key, (Key, String)> = HashMap::new();
    for obj in new.iter() {
        let Some(oldname) = &obj.oldname else { continue };
        let previous = obj.key.with_name(kind, oldname);
        if previous == obj.key || new.contains(&previous) {
            continue;
        }
        let old_key = old_side(&previous);
        if old.contains(&old_key) {
            if let Some(sql) = ddl::rename(obj, oldname, render) {
                renames.insert(obj.key.clone(), (old_key, sql));
            }
        }
    }
    let renamed_from: HashSet<&Key> = renames.values().map(|(key, _)| key).collect();

    for obj in new.iter() {
        if let Some((old_key, sql)) = renames.get(&obj.key) {
            debug!(kind = %kind, from = %old_key, to = %obj.key, "rename");
            group.push(sql.clone().into());
            // Remaining attribute changes apply to the renamed object, so
            // the old side is compared under its post-rename key.
            let mut moved = old.get(old_key).expect("rename source exists").clone();
            moved.key = obj.key.clone();
            group.extend(
                ddl::alter(&moved, obj, new_graph, render)
                    .into_iter()
                    .map(Stmt::from),
            );
        } else {
            let old_key = old_side(&obj.key);
            match old.get(&old_key) {
                Some(old_obj) if old_key == obj.key => {
                    group.extend(
                        ddl::alter(old_obj, obj, new_graph, render)
                            .into_iter()
                            .map(Stmt::from),
                    );
                }
                Some(old_obj) => {
                    // A child of a renamed table diffs against its old self
                    // re-keyed, so every statement names the renamed table.
                    let mut moved = old_obj.clone();
                    moved.key = obj.key.clone();
                    group.extend(
                        ddl::alter(&moved, obj, new_graph, render)
                            .into_iter()
                            .map(Stmt::from),
                    );
                }
                None => {
                    // Columns of brand-new tables are inlined in CREATE TABLE.
                    if kind == Kind::Column && !table_exists(old_graph, &old_key) {
                        continue;
                    }
                    group.extend(ddl::create(obj, new_graph, render).into_iter().map(Stmt::from));
                }
            }
        }
    }

    for obj in old.iter() {
        if new.contains(&obj.key) || renamed_from.contains(&obj.key) {
            continue;
        }
        if kind.table_scoped() {
            let new_key = new_side(&obj.key);
            if new_key != obj.key {
                // The table was renamed: the child either survives under the
                // new name (handled above) or drops under it.
                if new.contains(&new_key) {
                    continue;
                }
                let mut moved = obj.clone();
                moved.key = new_key;
                group.push(ddl::drop_stmt(&moved, render).into());
                continue;
            }
            // Children of a table that is itself going away are covered by
            // its DROP TABLE.
            if !table_exists(new_graph, &obj.key) {
                continue;
            }
        }
        if kind.is_foundational() {
            debug!(kind = %kind, key = %obj.key, "removal deferred to cleanup pass");
            deferred.push(obj.clone());
        } else {
            group.push(ddl::drop_stmt(obj, render).into());
        }
    }

    Stmt::Group(group)
}

fn table_exists(graph: &Graph, child_key: &Key) -> bool {
    let table_key = Key::two(child_key.field(0), child_key.field(1));
    graph.tables.contains(&table_key) || graph.foreign_tables.contains(&table_key)
}

/// Drop the deferred foundational removals, in reverse dependency order
/// across kinds and dependents-first within each kind.
fn cleanup(deferred: Vec<Object>, old_graph: &Graph, render: &Render) -> Stmt {
    let mut group: Vec<Stmt> = Vec::new();
    for kind in Kind::CLEANUP_ORDER {
        let members: Vec<&Object> = deferred.iter().filter(|o| o.kind == kind).collect();
        for obj in order_drops(members, old_graph) {
            group.push(ddl::drop_stmt(obj, render).into());
        }
    }
    Stmt::Group(group)
}

/// Order same-kind drops so an object is removed before anything it
/// requires: if A's implied dependencies include B, A drops first.
fn order_drops<'a>(members: Vec<&'a Object>, graph: &Graph) -> Vec<&'a Object> {
    if members.len() < 2 {
        return members;
    }
    let keys: HashSet<&Key> = members.iter().map(|o| &o.key).collect();
    let deps_of: Vec<Vec<Key>> = members
        .iter()
        .map(|obj| {
            implied_deps(obj, graph)
                .into_iter()
                .filter(|(kind, key)| *kind == obj.kind && keys.contains(key))
                .map(|(_, key)| key)
                .collect()
        })
        .collect();

    let mut remaining: Vec<usize> = (0..members.len()).collect();
    let mut ordered = Vec::with_capacity(members.len());
    while !remaining.is_empty() {
        // Pick the first member no other remaining member depends on.
        let pick = remaining
            .iter()
            .position(|&i| {
                !remaining
                    .iter()
                    .any(|&j| j != i && deps_of[j].contains(&members[i].key))
            })
            .unwrap_or(0);
        let index = remaining.remove(pick);
        ordered.push(members[index]);
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_graph(yaml: &str) -> Graph {
        Graph::from_doc(&Document::parse(yaml).unwrap()).unwrap()
    }

    fn plain_render() -> Render {
        Render::default()
    }

    #[test]
    fn flatten_reduces_nested_groups_in_order() {
        let tree = vec![
            Stmt::Sql("a".into()),
            Stmt::Group(vec![
                Stmt::Sql("b".into()),
                Stmt::Group(vec![Stmt::Sql("c".into()), Stmt::Group(vec![])]),
                Stmt::Sql("d".into()),
            ]),
            Stmt::Sql("e".into()),
        ];
        assert_eq!(flatten(tree), ["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn identical_graphs_produce_no_statements() {
        let yaml = r#"
schema public:
  type mood:
    labels: [sad, ok]
  table orders:
    columns:
      - id:
          type: bigint
          not_null: true
    constraint orders_pkey:
      primary_key: [id]
language plpgsql:
  trusted: true
"#;
        let a = doc_graph(yaml);
        let b = doc_graph(yaml);
        assert_eq!(diff_graphs(&a, &b, &plain_render()), Vec::<String>::new());
    }

    #[test]
    fn rename_hint_emits_exactly_one_rename() {
        let old = doc_graph(
            "schema s:\n  table foo:\n    columns:\n      - id:\n          type: bigint\n",
        );
        let new = doc_graph(
            "schema s:\n  table bar:\n    oldname: foo\n    columns:\n      - id:\n          type: bigint\n",
        );
        let stmts = diff_graphs(&old, &new, &plain_render());
        assert_eq!(stmts, vec!["ALTER TABLE s.foo RENAME TO bar"]);
    }

    #[test]
    fn new_tables_inline_their_columns() {
        let old = doc_graph("schema public: {}\n");
        let new = doc_graph(
            "schema public:\n  table orders:\n    columns:\n      - id:\n          type: bigint\n",
        );
        let stmts = diff_graphs(&old, &new, &plain_render());
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].starts_with("CREATE TABLE public.orders"));
        assert!(stmts[0].contains("id bigint"));
    }

    #[test]
    fn dropped_tables_swallow_their_children() {
        let old = doc_graph(
            "schema public:\n  table orders:\n    columns:\n      - id:\n          type: bigint\n    index orders_idx:\n      keys: [id]\n",
        );
        let new = doc_graph("schema public: {}\n");
        let stmts = diff_graphs(&old, &new, &plain_render());
        assert_eq!(stmts, vec!["DROP TABLE public.orders"]);
    }

    #[test]
    fn foundational_drops_land_in_the_cleanup_pass() {
        let old = doc_graph(
            r#"
schema public:
  type geom:
    labels: [a]
  operator class geom_gist using gist:
    type: geom
  table t:
    columns:
      - id:
          type: bigint
"#,
        );
        let new = doc_graph(
            r#"
schema public:
  type geom:
    labels: [a]
  table t:
    columns:
      - id:
          type: bigint
  table extra:
    columns:
      - id:
          type: bigint
"#,
        );
        let stmts = diff_graphs(&old, &new, &plain_render());
        // The operator class drop comes last, after the unrelated create,
        // even though its kind diffs before tables in the forward pass.
        assert_eq!(
            stmts.last().map(String::as_str),
            Some("DROP OPERATOR CLASS public.geom_gist USING gist")
        );
        assert!(stmts.iter().any(|s| s.starts_with("CREATE TABLE public.extra")));
        // The unchanged type it references is not touched.
        assert!(!stmts.iter().any(|s| s.contains("TYPE public.geom")));
    }

    #[test]
    fn within_kind_drops_remove_dependents_first() {
        let old = doc_graph(
            r#"
schema public:
  type base_t:
    labels: [a]
  type dom_t:
    base: base_t
"#,
        );
        let new = doc_graph("schema public: {}\n");
        let stmts = diff_graphs(&old, &new, &plain_render());
        let dom = stmts.iter().position(|s| s == "DROP DOMAIN public.dom_t");
        let base = stmts.iter().position(|s| s == "DROP TYPE public.base_t");
        assert!(dom.is_some() && base.is_some());
        assert!(dom < base, "domain must drop before its base type: {stmts:?}");
    }
}
