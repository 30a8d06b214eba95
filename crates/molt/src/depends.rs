//! Implied dependencies.
//!
//! An object's implied dependencies are the other objects *in the same
//! graph* that must exist before it can be created: its type, its storage
//! type, the functions and operators its fields reference, the family it
//! belongs to. References that do not resolve (built-in and system objects)
//! are silently omitted - absence means "no same-graph ordering constraint",
//! not an error.
//!
//! The resolver is pure: no side effects, safe to call repeatedly, and the
//! result may be empty.

use crate::graph::Graph;
use crate::object::{Attrs, Key, Kind, Object};

/// Compute the set of same-graph objects `obj` requires to pre-exist.
pub fn implied_deps(obj: &Object, graph: &Graph) -> Vec<(Kind, Key)> {
    let mut deps = Deps::default();

    match &obj.attrs {
        Attrs::Cast(attrs) => {
            deps.push(graph.find_type(obj.key.field(0)));
            deps.push(graph.find_type(obj.key.field(1)));
            if let Some(function) = &attrs.function {
                deps.push(graph.find_function(function));
            }
        }
        Attrs::Column(attrs) => {
            if let Some(type_) = &attrs.type_ {
                deps.push(graph.find_type(type_));
            }
        }
        Attrs::Constraint(attrs) => {
            if attrs.foreign_key.is_some() {
                if let Some(ref_table) = &attrs.ref_table {
                    deps.push(find_table(graph, obj.key.field(0), ref_table));
                }
            }
        }
        Attrs::Conversion(attrs) => {
            if let Some(function) = &attrs.function {
                deps.push(graph.find_function(function));
            }
        }
        Attrs::Type(attrs) => {
            if let Some(base) = &attrs.base {
                deps.push(graph.find_type(base));
            }
        }
        Attrs::Function(attrs) => {
            if let Some(returns) = &attrs.returns {
                deps.push(graph.find_type(returns.trim_start_matches("setof ")));
            }
            for arg in obj.key.field(2).split(',') {
                let arg = arg.trim();
                if !arg.is_empty() {
                    deps.push(graph.find_type(arg));
                }
            }
            if let Some(language) = &attrs.language {
                deps.push(graph.languages.get(&Key::one(language.as_str())));
            }
        }
        Attrs::Operator(attrs) => {
            if let Some(procedure) = &attrs.procedure {
                deps.push(resolve_function(graph, procedure, obj.key.field(2)));
            }
            for linked in [&attrs.commutator, &attrs.negator].into_iter().flatten() {
                if linked.contains('(') {
                    deps.push(graph.find_operator(linked));
                }
            }
            for arg in obj.key.field(2).split(',') {
                let arg = arg.trim();
                if !arg.is_empty() && !arg.eq_ignore_ascii_case("none") {
                    deps.push(graph.find_type(arg));
                }
            }
        }
        Attrs::OperatorClass(attrs) => {
            if let Some(type_) = &attrs.type_ {
                deps.push(graph.find_type(type_));
            }
            if let Some(storage) = &attrs.storage {
                deps.push(graph.find_type(storage));
            }
            for function in attrs.functions.iter().flat_map(|m| m.values()) {
                deps.push(graph.find_function(function));
            }
            for operator in attrs.operators.iter().flat_map(|m| m.values()) {
                deps.push(graph.find_operator(operator));
            }
            if let Some(family) = &attrs.family {
                deps.push(graph.find_operator_family(family, obj.key.field(2)));
            }
        }
        Attrs::Trigger(attrs) => {
            if let Some(procedure) = &attrs.procedure {
                deps.push(resolve_function(graph, procedure, ""));
            }
        }
        Attrs::TsDictionary(attrs) => {
            if let Some(template) = &attrs.template {
                deps.push(find_in(graph, Kind::TsTemplate, template));
            }
        }
        Attrs::TsConfiguration(attrs) => {
            if let Some(parser) = &attrs.parser {
                deps.push(find_in(graph, Kind::TsParser, parser));
            }
            for dict in attrs.mappings.iter().flat_map(|m| m.values()).flatten() {
                deps.push(find_in(graph, Kind::TsDictionary, dict));
            }
        }
        Attrs::Server(attrs) => {
            if let Some(wrapper) = &attrs.wrapper {
                deps.push(graph.wrappers.get(&Key::one(wrapper.as_str())));
            }
        }
        Attrs::UserMapping(_) => {
            deps.push(graph.servers.get(&Key::one(obj.key.field(1))));
        }
        Attrs::ForeignTable(attrs) => {
            if let Some(server) = &attrs.server {
                deps.push(graph.servers.get(&Key::one(server.as_str())));
            }
        }
        Attrs::Schema(_)
        | Attrs::Extension(_)
        | Attrs::Language(_)
        | Attrs::Collation(_)
        | Attrs::Table(_)
        | Attrs::Index(_)
        | Attrs::OperatorFamily(_)
        | Attrs::Rule(_)
        | Attrs::TsTemplate(_)
        | Attrs::TsParser(_)
        | Attrs::ForeignDataWrapper(_) => {}
    }

    deps.0
}

#[derive(Default)]
struct Deps(Vec<(Kind, Key)>);

impl Deps {
    fn push(&mut self, found: Option<&Object>) {
        if let Some(obj) = found {
            let entry = (obj.kind, obj.key.clone());
            if !self.0.contains(&entry) {
                self.0.push(entry);
            }
        }
    }
}

/// A function reference may be a full signature or a bare name; a bare name
/// borrows the referencing object's argument list.
fn resolve_function<'a>(graph: &'a Graph, reference: &str, args: &str) -> Option<&'a Object> {
    if reference.contains('(') {
        graph.find_function(reference)
    } else {
        graph.find_function(&format!("{reference}({args})"))
    }
}

fn find_table<'a>(graph: &'a Graph, default_schema: &str, name: &str) -> Option<&'a Object> {
    match name.split_once('.') {
        Some((schema, bare)) => graph.tables.get(&Key::two(schema, bare)),
        None => graph.tables.get(&Key::two(default_schema, name)),
    }
}

fn find_in<'a>(graph: &'a Graph, kind: Kind, name: &str) -> Option<&'a Object> {
    let registry = graph.registry(kind);
    match name.split_once('.') {
        Some((schema, bare)) => registry.get(&Key::two(schema, bare)),
        None => registry.iter().find(|o| o.name() == name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn graph() -> Graph {
        Graph::from_doc(
            &Document::parse(
                r#"
schema public:
  type geom:
    input: geom_in(cstring)
    output: geom_out(geom)
  function geom_cmp(geom, geom):
    language: internal
    returns: integer
    source: geom_cmp
  operator <(geom, geom):
    procedure: geom_lt
  operator family geom_ops using gist:
    description: gist support for geom
  operator class geom_gist using gist:
    type: geom
    family: geom_ops
    operators:
      1: <(geom, geom)
    functions:
      1: geom_cmp(geom, geom)
"#,
            )
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn operator_class_pulls_type_operators_functions_and_family() {
        let g = graph();
        let opclass = g
            .operator_classes
            .get(&Key::three("public", "geom_gist", "gist"))
            .unwrap();
        let deps = implied_deps(opclass, &g);
        assert!(deps.contains(&(Kind::Type, Key::two("public", "geom"))));
        assert!(deps.contains(&(Kind::Operator, Key::three("public", "<", "geom, geom"))));
        assert!(deps.contains(&(Kind::Function, Key::three("public", "geom_cmp", "geom, geom"))));
        assert!(deps.contains(&(Kind::OperatorFamily, Key::three("public", "geom_ops", "gist"))));
    }

    #[test]
    fn unresolved_references_are_silently_omitted() {
        let g = graph();
        let func = g
            .functions
            .get(&Key::three("public", "geom_cmp", "geom, geom"))
            .unwrap();
        let deps = implied_deps(func, &g);
        // geom resolves; the built-in `integer` return type and the
        // `internal` language do not, and that is not an error.
        assert!(deps.contains(&(Kind::Type, Key::two("public", "geom"))));
        assert_eq!(deps.iter().filter(|(k, _)| *k == Kind::Language).count(), 0);
    }

    #[test]
    fn resolver_is_pure_and_may_return_nothing() {
        let g = graph();
        let schema = g.schemas.get(&Key::one("public")).unwrap();
        assert!(implied_deps(schema, &g).is_empty());
        assert_eq!(implied_deps(schema, &g), implied_deps(schema, &g));
    }
}
