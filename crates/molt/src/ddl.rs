//! Statement rendering.
//!
//! One renderer per statement family (create, drop, rename, alter, comment,
//! owner), each a match over the object kinds. The emitted text is minimal
//! but executable; what the engine actually guarantees is which statements
//! appear and in which order.

use indexmap::IndexMap;

use crate::graph::Graph;
use crate::ident::{literal, Quoter};
use crate::object::{Attrs, Kind, Object};

/// Rendering policy for one run.
#[derive(Debug, Clone, Default)]
pub struct Render {
    pub quoter: Quoter,
    pub no_owner: bool,
    pub no_comments: bool,
    /// Installed language templates; a language with a template is created
    /// bare and the server fills in the handler.
    pub language_templates: Option<Vec<String>>,
}

impl Render {
    fn ident(&self, name: &str) -> String {
        self.quoter.ident(name)
    }

    /// Schema-qualified name from the object's first two key fields.
    fn qualname(&self, obj: &Object) -> String {
        self.quoter.qualname(obj.key.field(0), obj.key.field(1))
    }

    /// The table a table-scoped object belongs to.
    fn tablename(&self, obj: &Object) -> String {
        self.quoter.qualname(obj.key.field(0), obj.key.field(1))
    }

    /// An index is addressed by schema and its own name, not its table's.
    fn indexname(&self, obj: &Object) -> String {
        self.quoter.qualname(obj.key.field(0), obj.name())
    }
}

/// Render the statements creating `obj`, plus its comment and ownership.
pub fn create(obj: &Object, graph: &Graph, r: &Render) -> Vec<String> {
    let mut stmts = vec![create_body(obj, graph, r)];
    stmts.extend(extra_create(obj, r));
    if !r.no_owner {
        if let Some(owner) = &obj.owner {
            if let Some(target) = alter_target(obj, r) {
                stmts.push(format!("ALTER {} OWNER TO {}", target, r.ident(owner)));
            }
        }
    }
    if !r.no_comments {
        if let Some(desc) = &obj.description {
            if let Some(target) = comment_target(obj, r) {
                stmts.push(format!("COMMENT ON {} IS {}", target, literal(desc)));
            }
        }
    }
    stmts
}

fn create_body(obj: &Object, graph: &Graph, r: &Render) -> String {
    match &obj.attrs {
        Attrs::Schema(_) => format!("CREATE SCHEMA {}", r.ident(obj.name())),
        Attrs::Extension(a) => {
            let mut sql = format!("CREATE EXTENSION {}", r.ident(obj.name()));
            if let Some(schema) = &a.schema {
                sql.push_str(&format!(" SCHEMA {}", r.ident(schema)));
            }
            if let Some(version) = &a.version {
                sql.push_str(&format!(" VERSION {}", literal(version)));
            }
            sql
        }
        Attrs::Language(a) => {
            let templated = r
                .language_templates
                .as_ref()
                .is_some_and(|t| t.iter().any(|n| n == obj.name()));
            if templated {
                format!("CREATE LANGUAGE {}", r.ident(obj.name()))
            } else {
                let trusted = if a.trusted == Some(true) { "TRUSTED " } else { "" };
                format!("CREATE {}LANGUAGE {}", trusted, r.ident(obj.name()))
            }
        }
        Attrs::Cast(a) => {
            let source = obj.key.field(0);
            let target = obj.key.field(1);
            let means = match (a.method.as_deref(), &a.function) {
                (_, Some(function)) => format!("WITH FUNCTION {function}"),
                (Some("inout"), None) => "WITH INOUT".to_string(),
                _ => "WITHOUT FUNCTION".to_string(),
            };
            let context = match a.context.as_deref() {
                Some("implicit") => " AS IMPLICIT",
                Some("assignment") => " AS ASSIGNMENT",
                _ => "",
            };
            format!("CREATE CAST ({source} AS {target}) {means}{context}")
        }
        Attrs::Collation(a) => {
            let mut clauses = Vec::new();
            if let Some(lc) = &a.lc_collate {
                clauses.push(format!("LC_COLLATE = {}", literal(lc)));
            }
            if let Some(lc) = &a.lc_ctype {
                clauses.push(format!("LC_CTYPE = {}", literal(lc)));
            }
            if let Some(provider) = &a.provider {
                clauses.push(format!("PROVIDER = {provider}"));
            }
            format!("CREATE COLLATION {} ({})", r.qualname(obj), clauses.join(", "))
        }
        Attrs::Conversion(a) => {
            let dflt = if a.default == Some(true) { "DEFAULT " } else { "" };
            format!(
                "CREATE {}CONVERSION {} FOR {} TO {} FROM {}",
                dflt,
                r.qualname(obj),
                literal(a.source_encoding.as_deref().unwrap_or_default()),
                literal(a.dest_encoding.as_deref().unwrap_or_default()),
                a.function.as_deref().unwrap_or_default(),
            )
        }
        Attrs::Type(a) => {
            if let Some(labels) = &a.labels {
                let labels: Vec<String> = labels.iter().map(|l| literal(l)).collect();
                format!("CREATE TYPE {} AS ENUM ({})", r.qualname(obj), labels.join(", "))
            } else if let Some(attributes) = &a.attributes {
                let fields: Vec<String> = attributes
                    .iter()
                    .flat_map(|entry| entry.iter())
                    .map(|(name, type_)| format!("{} {}", r.ident(name), type_))
                    .collect();
                format!("CREATE TYPE {} AS ({})", r.qualname(obj), fields.join(", "))
            } else if let Some(base) = &a.base {
                let mut sql = format!("CREATE DOMAIN {} AS {}", r.qualname(obj), base);
                if let Some(check) = &a.check {
                    sql.push_str(&format!(" CHECK ({check})"));
                }
                sql
            } else if a.input.is_some() || a.output.is_some() {
                let mut clauses = Vec::new();
                if let Some(input) = &a.input {
                    clauses.push(format!("INPUT = {input}"));
                }
                if let Some(output) = &a.output {
                    clauses.push(format!("OUTPUT = {output}"));
                }
                if let Some(len) = a.internallength {
                    clauses.push(format!("INTERNALLENGTH = {len}"));
                }
                format!("CREATE TYPE {} ({})", r.qualname(obj), clauses.join(", "))
            } else {
                format!("CREATE TYPE {}", r.qualname(obj))
            }
        }
        Attrs::Table(a) => {
            let unlogged = if a.unlogged == Some(true) { "UNLOGGED " } else { "" };
            let columns: Vec<String> = obj
                .children
                .iter()
                .filter(|(kind, _)| *kind == Kind::Column)
                .filter_map(|(_, key)| graph.columns.get(key))
                .map(|col| column_definition(col, r))
                .collect();
            format!(
                "CREATE {}TABLE {} (\n    {}\n)",
                unlogged,
                r.qualname(obj),
                columns.join(",\n    ")
            )
        }
        Attrs::Column(_) => {
            format!(
                "ALTER TABLE {} ADD COLUMN {}",
                r.tablename(obj),
                column_definition(obj, r)
            )
        }
        Attrs::Constraint(a) => {
            format!(
                "ALTER TABLE {} ADD CONSTRAINT {} {}",
                r.tablename(obj),
                r.ident(obj.name()),
                constraint_definition(a, r)
            )
        }
        Attrs::Index(a) => {
            let unique = if a.unique == Some(true) { "UNIQUE " } else { "" };
            let using = a
                .access_method
                .as_ref()
                .map(|m| format!(" USING {m}"))
                .unwrap_or_default();
            let keys = a
                .keys
                .as_ref()
                .map(|k| k.join(", "))
                .unwrap_or_default();
            let predicate = a
                .predicate
                .as_ref()
                .map(|p| format!(" WHERE {p}"))
                .unwrap_or_default();
            format!(
                "CREATE {}INDEX {} ON {}{} ({}){}",
                unique,
                r.ident(obj.name()),
                r.tablename(obj),
                using,
                keys,
                predicate
            )
        }
        Attrs::Function(a) => function_definition(obj, a, r, false),
        Attrs::Operator(a) => {
            let mut clauses = Vec::new();
            if let Some(procedure) = &a.procedure {
                clauses.push(format!("PROCEDURE = {procedure}"));
            }
            let args: Vec<&str> = obj.key.field(2).split(',').map(str::trim).collect();
            if let Some(left) = args.first().filter(|a| !a.eq_ignore_ascii_case("none")) {
                clauses.push(format!("LEFTARG = {left}"));
            }
            if let Some(right) = args.get(1).filter(|a| !a.eq_ignore_ascii_case("none")) {
                clauses.push(format!("RIGHTARG = {right}"));
            }
            if let Some(commutator) = &a.commutator {
                clauses.push(format!("COMMUTATOR = {commutator}"));
            }
            if let Some(negator) = &a.negator {
                clauses.push(format!("NEGATOR = {negator}"));
            }
            if let Some(restrict) = &a.restrict {
                clauses.push(format!("RESTRICT = {restrict}"));
            }
            if let Some(join) = &a.join {
                clauses.push(format!("JOIN = {join}"));
            }
            if a.hashes == Some(true) {
                clauses.push("HASHES".to_string());
            }
            if a.merges == Some(true) {
                clauses.push("MERGES".to_string());
            }
            format!(
                "CREATE OPERATOR {}.{} ({})",
                r.ident(obj.key.field(0)),
                obj.name(),
                clauses.join(", ")
            )
        }
        Attrs::OperatorFamily(_) => {
            format!(
                "CREATE OPERATOR FAMILY {} USING {}",
                r.qualname(obj),
                obj.key.field(2)
            )
        }
        Attrs::OperatorClass(a) => {
            let dflt = if a.default == Some(true) { "DEFAULT " } else { "" };
            let mut clauses = Vec::new();
            for (strategy, operator) in a.operators.iter().flatten() {
                clauses.push(format!("OPERATOR {strategy} {operator}"));
            }
            for (support, function) in a.functions.iter().flatten() {
                clauses.push(format!("FUNCTION {support} {function}"));
            }
            if let Some(storage) = &a.storage {
                clauses.push(format!("STORAGE {storage}"));
            }
            format!(
                "CREATE OPERATOR CLASS {}\n    {}FOR TYPE {} USING {} AS\n    {}",
                r.qualname(obj),
                dflt,
                a.type_.as_deref().unwrap_or_default(),
                obj.key.field(2),
                clauses.join(",\n    ")
            )
        }
        Attrs::Rule(a) => rule_definition(obj, a, r, false),
        Attrs::Trigger(a) => {
            let timing = a.timing.as_deref().unwrap_or("before").to_uppercase();
            let events = a
                .events
                .as_ref()
                .map(|e| {
                    e.iter()
                        .map(|ev| ev.to_uppercase())
                        .collect::<Vec<_>>()
                        .join(" OR ")
                })
                .unwrap_or_default();
            let level = a.level.as_deref().unwrap_or("statement").to_uppercase();
            let condition = a
                .condition
                .as_ref()
                .map(|c| format!(" WHEN ({c})"))
                .unwrap_or_default();
            format!(
                "CREATE TRIGGER {} {} {} ON {} FOR EACH {}{} EXECUTE FUNCTION {}",
                r.ident(obj.name()),
                timing,
                events,
                r.tablename(obj),
                level,
                condition,
                a.procedure.as_deref().unwrap_or_default()
            )
        }
        Attrs::TsDictionary(a) => {
            let mut clauses = vec![format!(
                "TEMPLATE = {}",
                a.template.as_deref().unwrap_or_default()
            )];
            if let Some(options) = &a.options {
                clauses.push(options.clone());
            }
            format!(
                "CREATE TEXT SEARCH DICTIONARY {} ({})",
                r.qualname(obj),
                clauses.join(", ")
            )
        }
        Attrs::TsTemplate(a) => {
            let mut clauses = Vec::new();
            if let Some(init) = &a.init {
                clauses.push(format!("INIT = {init}"));
            }
            clauses.push(format!(
                "LEXIZE = {}",
                a.lexize.as_deref().unwrap_or_default()
            ));
            format!(
                "CREATE TEXT SEARCH TEMPLATE {} ({})",
                r.qualname(obj),
                clauses.join(", ")
            )
        }
        Attrs::TsParser(a) => {
            let mut clauses = vec![
                format!("START = {}", a.start.as_deref().unwrap_or_default()),
                format!("GETTOKEN = {}", a.gettoken.as_deref().unwrap_or_default()),
                format!("END = {}", a.end.as_deref().unwrap_or_default()),
                format!("LEXTYPES = {}", a.lextypes.as_deref().unwrap_or_default()),
            ];
            if let Some(headline) = &a.headline {
                clauses.push(format!("HEADLINE = {headline}"));
            }
            format!(
                "CREATE TEXT SEARCH PARSER {} ({})",
                r.qualname(obj),
                clauses.join(", ")
            )
        }
        Attrs::TsConfiguration(a) => {
            format!(
                "CREATE TEXT SEARCH CONFIGURATION {} (PARSER = {})",
                r.qualname(obj),
                a.parser.as_deref().unwrap_or("default")
            )
        }
        Attrs::ForeignDataWrapper(a) => {
            let mut sql = format!("CREATE FOREIGN DATA WRAPPER {}", r.ident(obj.name()));
            if let Some(handler) = &a.handler {
                sql.push_str(&format!(" HANDLER {handler}"));
            }
            if let Some(validator) = &a.validator {
                sql.push_str(&format!(" VALIDATOR {validator}"));
            }
            if let Some(options) = &a.options {
                sql.push_str(&format!(" {}", options_list(options)));
            }
            sql
        }
        Attrs::Server(a) => {
            let mut sql = format!("CREATE SERVER {}", r.ident(obj.name()));
            if let Some(server_type) = &a.server_type {
                sql.push_str(&format!(" TYPE {}", literal(server_type)));
            }
            if let Some(version) = &a.version {
                sql.push_str(&format!(" VERSION {}", literal(version)));
            }
            sql.push_str(&format!(
                " FOREIGN DATA WRAPPER {}",
                r.ident(a.wrapper.as_deref().unwrap_or_default())
            ));
            if let Some(options) = &a.options {
                sql.push_str(&format!(" {}", options_list(options)));
            }
            sql
        }
        Attrs::UserMapping(a) => {
            let mut sql = format!(
                "CREATE USER MAPPING FOR {} SERVER {}",
                obj.key.field(0),
                r.ident(obj.key.field(1))
            );
            if let Some(options) = &a.options {
                sql.push_str(&format!(" {}", options_list(options)));
            }
            sql
        }
        Attrs::ForeignTable(a) => {
            let columns: Vec<String> = obj
                .children
                .iter()
                .filter(|(kind, _)| *kind == Kind::Column)
                .filter_map(|(_, key)| graph.columns.get(key))
                .map(|col| column_definition(col, r))
                .collect();
            let mut sql = format!(
                "CREATE FOREIGN TABLE {} ({}) SERVER {}",
                r.qualname(obj),
                columns.join(", "),
                r.ident(a.server.as_deref().unwrap_or_default())
            );
            if let Some(options) = &a.options {
                sql.push_str(&format!(" {}", options_list(options)));
            }
            sql
        }
    }
}

/// Statements that follow an object's create statement (configuration
/// mappings and similar attachments).
fn extra_create(obj: &Object, r: &Render) -> Vec<String> {
    match &obj.attrs {
        Attrs::TsConfiguration(a) => a
            .mappings
            .iter()
            .flatten()
            .map(|(token, dictionaries)| {
                format!(
                    "ALTER TEXT SEARCH CONFIGURATION {} ADD MAPPING FOR {} WITH {}",
                    r.qualname(obj),
                    token,
                    dictionaries.join(", ")
                )
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Render the statement removing `obj`.
pub fn drop_stmt(obj: &Object, r: &Render) -> String {
    match obj.kind {
        Kind::Column => format!(
            "ALTER TABLE {} DROP COLUMN {}",
            r.tablename(obj),
            r.ident(obj.name())
        ),
        Kind::Constraint => format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            r.tablename(obj),
            r.ident(obj.name())
        ),
        Kind::Index => format!("DROP INDEX {}", r.indexname(obj)),
        Kind::Trigger => format!(
            "DROP TRIGGER {} ON {}",
            r.ident(obj.name()),
            r.tablename(obj)
        ),
        Kind::Rule => format!(
            "DROP RULE {} ON {}",
            r.ident(obj.name()),
            r.tablename(obj)
        ),
        Kind::Cast => format!("DROP CAST ({} AS {})", obj.key.field(0), obj.key.field(1)),
        Kind::UserMapping => format!(
            "DROP USER MAPPING FOR {} SERVER {}",
            obj.key.field(0),
            r.ident(obj.key.field(1))
        ),
        Kind::Operator => format!(
            "DROP OPERATOR {}.{} ({})",
            r.ident(obj.key.field(0)),
            obj.name(),
            obj.key.field(2)
        ),
        Kind::OperatorClass => format!(
            "DROP OPERATOR CLASS {} USING {}",
            r.qualname(obj),
            obj.key.field(2)
        ),
        Kind::OperatorFamily => format!(
            "DROP OPERATOR FAMILY {} USING {}",
            r.qualname(obj),
            obj.key.field(2)
        ),
        Kind::Function => format!("DROP FUNCTION {}({})", r.qualname(obj), obj.key.field(2)),
        Kind::Type => {
            let is_domain = matches!(&obj.attrs, Attrs::Type(a) if a.base.is_some());
            if is_domain {
                format!("DROP DOMAIN {}", r.qualname(obj))
            } else {
                format!("DROP TYPE {}", r.qualname(obj))
            }
        }
        Kind::Schema | Kind::Extension | Kind::Language | Kind::ForeignDataWrapper | Kind::Server => {
            format!("DROP {} {}", kind_phrase(obj.kind), r.ident(obj.name()))
        }
        _ => format!("DROP {} {}", kind_phrase(obj.kind), r.qualname(obj)),
    }
}

/// Render the rename statement turning `old_name` into `obj`'s name, if the
/// kind supports renaming.
pub fn rename(obj: &Object, old_name: &str, r: &Render) -> Option<String> {
    let new_name = r.ident(obj.name());
    let old = r.ident(old_name);
    let schema = || r.ident(obj.key.field(0));
    Some(match obj.kind {
        Kind::Schema => format!("ALTER SCHEMA {old} RENAME TO {new_name}"),
        Kind::Table => format!("ALTER TABLE {}.{old} RENAME TO {new_name}", schema()),
        Kind::Type => format!("ALTER TYPE {}.{old} RENAME TO {new_name}", schema()),
        Kind::Collation => format!("ALTER COLLATION {}.{old} RENAME TO {new_name}", schema()),
        Kind::Conversion => format!("ALTER CONVERSION {}.{old} RENAME TO {new_name}", schema()),
        Kind::Index => format!("ALTER INDEX {}.{old} RENAME TO {new_name}", schema()),
        Kind::Column => format!(
            "ALTER TABLE {} RENAME COLUMN {old} TO {new_name}",
            r.tablename(obj)
        ),
        Kind::Constraint => format!(
            "ALTER TABLE {} RENAME CONSTRAINT {old} TO {new_name}",
            r.tablename(obj)
        ),
        Kind::Trigger => format!(
            "ALTER TRIGGER {old} ON {} RENAME TO {new_name}",
            r.tablename(obj)
        ),
        Kind::Function => format!(
            "ALTER FUNCTION {}.{old}({}) RENAME TO {new_name}",
            schema(),
            obj.key.field(2)
        ),
        Kind::OperatorClass => format!(
            "ALTER OPERATOR CLASS {}.{old} USING {} RENAME TO {new_name}",
            schema(),
            obj.key.field(2)
        ),
        Kind::OperatorFamily => format!(
            "ALTER OPERATOR FAMILY {}.{old} USING {} RENAME TO {new_name}",
            schema(),
            obj.key.field(2)
        ),
        Kind::TsDictionary => format!(
            "ALTER TEXT SEARCH DICTIONARY {}.{old} RENAME TO {new_name}",
            schema()
        ),
        Kind::TsTemplate => format!(
            "ALTER TEXT SEARCH TEMPLATE {}.{old} RENAME TO {new_name}",
            schema()
        ),
        Kind::TsParser => format!(
            "ALTER TEXT SEARCH PARSER {}.{old} RENAME TO {new_name}",
            schema()
        ),
        Kind::TsConfiguration => format!(
            "ALTER TEXT SEARCH CONFIGURATION {}.{old} RENAME TO {new_name}",
            schema()
        ),
        Kind::ForeignTable => format!(
            "ALTER FOREIGN TABLE {}.{old} RENAME TO {new_name}",
            schema()
        ),
        Kind::Server => format!("ALTER SERVER {old} RENAME TO {new_name}"),
        Kind::ForeignDataWrapper => {
            format!("ALTER FOREIGN DATA WRAPPER {old} RENAME TO {new_name}")
        }
        Kind::Language => format!("ALTER LANGUAGE {old} RENAME TO {new_name}"),
        // Casts, extensions, operators and user mappings have no rename form.
        Kind::Cast | Kind::Extension | Kind::Operator | Kind::Rule | Kind::UserMapping => {
            return None;
        }
    })
}

/// Render the minimal alter statement set covering every changed field
/// between two same-key objects. Empty when nothing changed.
pub fn alter(old: &Object, new: &Object, graph: &Graph, r: &Render) -> Vec<String> {
    let mut stmts = structural_alter(old, new, graph, r);

    if !r.no_owner && old.owner != new.owner {
        if let (Some(owner), Some(target)) = (&new.owner, alter_target(new, r)) {
            stmts.push(format!("ALTER {} OWNER TO {}", target, r.ident(owner)));
        }
    }
    if !r.no_comments && old.description != new.description {
        if let Some(target) = comment_target(new, r) {
            let comment = match &new.description {
                Some(desc) => literal(desc),
                None => "NULL".to_string(),
            };
            stmts.push(format!("COMMENT ON {} IS {}", target, comment));
        }
    }
    stmts
}

fn structural_alter(old: &Object, new: &Object, graph: &Graph, r: &Render) -> Vec<String> {
    let mut stmts = Vec::new();
    match (&old.attrs, &new.attrs) {
        (Attrs::Column(o), Attrs::Column(n)) => {
            let table = r.tablename(new);
            let column = r.ident(new.name());
            if o.type_ != n.type_ {
                if let Some(type_) = &n.type_ {
                    stmts.push(format!(
                        "ALTER TABLE {table} ALTER COLUMN {column} TYPE {type_} USING {column}::{type_}"
                    ));
                }
            }
            if o.not_null != n.not_null {
                if n.not_null == Some(true) {
                    stmts.push(format!("ALTER TABLE {table} ALTER COLUMN {column} SET NOT NULL"));
                } else {
                    stmts.push(format!("ALTER TABLE {table} ALTER COLUMN {column} DROP NOT NULL"));
                }
            }
            if o.default != n.default {
                match &n.default {
                    Some(default) => stmts.push(format!(
                        "ALTER TABLE {table} ALTER COLUMN {column} SET DEFAULT {default}"
                    )),
                    None => stmts.push(format!(
                        "ALTER TABLE {table} ALTER COLUMN {column} DROP DEFAULT"
                    )),
                }
            }
            if o.statistics != n.statistics {
                if let Some(statistics) = n.statistics {
                    stmts.push(format!(
                        "ALTER TABLE {table} ALTER COLUMN {column} SET STATISTICS {statistics}"
                    ));
                }
            }
        }
        (Attrs::Table(o), Attrs::Table(n)) => {
            if o.unlogged != n.unlogged {
                let mode = if n.unlogged == Some(true) { "UNLOGGED" } else { "LOGGED" };
                stmts.push(format!("ALTER TABLE {} SET {}", r.qualname(new), mode));
            }
        }
        (Attrs::Function(o), Attrs::Function(n)) => {
            if o != n {
                stmts.push(function_definition(new, n, r, true));
            }
        }
        (Attrs::Index(o), Attrs::Index(n)) => {
            if o != n {
                stmts.push(drop_stmt(old, r));
                stmts.push(create_body(new, graph, r));
            }
        }
        (Attrs::Constraint(o), Attrs::Constraint(n)) => {
            if o != n {
                stmts.push(drop_stmt(old, r));
                stmts.push(create_body(new, graph, r));
            }
        }
        (Attrs::Trigger(o), Attrs::Trigger(n)) => {
            if o != n {
                stmts.push(drop_stmt(old, r));
                stmts.push(create_body(new, graph, r));
            }
        }
        (Attrs::Rule(o), Attrs::Rule(n)) => {
            if o != n {
                stmts.push(rule_definition(new, n, r, true));
            }
        }
        (Attrs::Type(o), Attrs::Type(n)) => {
            stmts.extend(alter_type(old, o, n, r));
        }
        (Attrs::Extension(o), Attrs::Extension(n)) => {
            if o.version != n.version {
                if let Some(version) = &n.version {
                    stmts.push(format!(
                        "ALTER EXTENSION {} UPDATE TO {}",
                        r.ident(new.name()),
                        literal(version)
                    ));
                }
            }
            if o.schema != n.schema {
                if let Some(schema) = &n.schema {
                    stmts.push(format!(
                        "ALTER EXTENSION {} SET SCHEMA {}",
                        r.ident(new.name()),
                        r.ident(schema)
                    ));
                }
            }
        }
        (Attrs::Server(o), Attrs::Server(n)) => {
            if o.version != n.version {
                if let Some(version) = &n.version {
                    stmts.push(format!(
                        "ALTER SERVER {} VERSION {}",
                        r.ident(new.name()),
                        literal(version)
                    ));
                }
            }
            if let Some(clause) = options_diff(o.options.as_ref(), n.options.as_ref()) {
                stmts.push(format!("ALTER SERVER {} {}", r.ident(new.name()), clause));
            }
        }
        (Attrs::ForeignDataWrapper(o), Attrs::ForeignDataWrapper(n)) => {
            if o.handler != n.handler {
                let clause = match &n.handler {
                    Some(handler) => format!("HANDLER {handler}"),
                    None => "NO HANDLER".to_string(),
                };
                stmts.push(format!(
                    "ALTER FOREIGN DATA WRAPPER {} {}",
                    r.ident(new.name()),
                    clause
                ));
            }
            if o.validator != n.validator {
                let clause = match &n.validator {
                    Some(validator) => format!("VALIDATOR {validator}"),
                    None => "NO VALIDATOR".to_string(),
                };
                stmts.push(format!(
                    "ALTER FOREIGN DATA WRAPPER {} {}",
                    r.ident(new.name()),
                    clause
                ));
            }
            if let Some(clause) = options_diff(o.options.as_ref(), n.options.as_ref()) {
                stmts.push(format!(
                    "ALTER FOREIGN DATA WRAPPER {} {}",
                    r.ident(new.name()),
                    clause
                ));
            }
        }
        (Attrs::UserMapping(o), Attrs::UserMapping(n)) => {
            if let Some(clause) = options_diff(o.options.as_ref(), n.options.as_ref()) {
                stmts.push(format!(
                    "ALTER USER MAPPING FOR {} SERVER {} {}",
                    new.key.field(0),
                    r.ident(new.key.field(1)),
                    clause
                ));
            }
        }
        (Attrs::ForeignTable(o), Attrs::ForeignTable(n)) => {
            if let Some(clause) = options_diff(o.options.as_ref(), n.options.as_ref()) {
                stmts.push(format!(
                    "ALTER FOREIGN TABLE {} {}",
                    r.qualname(new),
                    clause
                ));
            }
        }
        (Attrs::Operator(o), Attrs::Operator(n)) => {
            let mut set = Vec::new();
            if o.restrict != n.restrict {
                set.push(format!(
                    "RESTRICT = {}",
                    n.restrict.as_deref().unwrap_or("NONE")
                ));
            }
            if o.join != n.join {
                set.push(format!("JOIN = {}", n.join.as_deref().unwrap_or("NONE")));
            }
            if !set.is_empty() {
                stmts.push(format!(
                    "ALTER OPERATOR {}.{} ({}) SET ({})",
                    r.ident(new.key.field(0)),
                    new.name(),
                    new.key.field(2),
                    set.join(", ")
                ));
            }
        }
        // Recreating is the only alter shape these kinds have.
        (Attrs::Cast(o), Attrs::Cast(n)) if o != n => {
            stmts.push(drop_stmt(old, r));
            stmts.push(create_body(new, graph, r));
        }
        (Attrs::Collation(o), Attrs::Collation(n)) if o != n => {
            stmts.push(drop_stmt(old, r));
            stmts.push(create_body(new, graph, r));
        }
        (Attrs::Conversion(o), Attrs::Conversion(n)) if o != n => {
            stmts.push(drop_stmt(old, r));
            stmts.push(create_body(new, graph, r));
        }
        (Attrs::TsDictionary(o), Attrs::TsDictionary(n)) if o != n => {
            stmts.push(drop_stmt(old, r));
            stmts.push(create_body(new, graph, r));
        }
        (Attrs::TsTemplate(o), Attrs::TsTemplate(n)) if o != n => {
            stmts.push(drop_stmt(old, r));
            stmts.push(create_body(new, graph, r));
        }
        (Attrs::TsParser(o), Attrs::TsParser(n)) if o != n => {
            stmts.push(drop_stmt(old, r));
            stmts.push(create_body(new, graph, r));
        }
        (Attrs::TsConfiguration(o), Attrs::TsConfiguration(n)) if o != n => {
            stmts.push(drop_stmt(old, r));
            stmts.extend(create(new, graph, &Render { no_owner: true, no_comments: true, ..r.clone() }));
        }
        (Attrs::OperatorClass(o), Attrs::OperatorClass(n)) if o != n => {
            stmts.push(drop_stmt(old, r));
            stmts.push(create_body(new, graph, r));
        }
        _ => {}
    }
    stmts
}

fn alter_type(old: &Object, o: &crate::object::TypeAttrs, n: &crate::object::TypeAttrs, r: &Render) -> Vec<String> {
    let mut stmts = Vec::new();
    if let (Some(old_labels), Some(new_labels)) = (&o.labels, &n.labels) {
        for label in new_labels {
            if !old_labels.contains(label) {
                stmts.push(format!(
                    "ALTER TYPE {} ADD VALUE {}",
                    r.qualname(old),
                    literal(label)
                ));
            }
        }
    }
    if let (Some(old_attrs), Some(new_attrs)) = (&o.attributes, &n.attributes) {
        let old_names: Vec<&String> = old_attrs.iter().flat_map(|m| m.keys()).collect();
        let new_names: Vec<&String> = new_attrs.iter().flat_map(|m| m.keys()).collect();
        for entry in new_attrs {
            for (name, type_) in entry {
                if !old_names.contains(&name) {
                    stmts.push(format!(
                        "ALTER TYPE {} ADD ATTRIBUTE {} {}",
                        r.qualname(old),
                        r.ident(name),
                        type_
                    ));
                }
            }
        }
        for entry in old_attrs {
            for name in entry.keys() {
                if !new_names.contains(&name) {
                    stmts.push(format!(
                        "ALTER TYPE {} DROP ATTRIBUTE {}",
                        r.qualname(old),
                        r.ident(name)
                    ));
                }
            }
        }
    }
    stmts
}

/// `name type [DEFAULT ...] [NOT NULL]` - shared by CREATE TABLE and
/// ADD COLUMN.
fn column_definition(col: &Object, r: &Render) -> String {
    let Attrs::Column(a) = &col.attrs else {
        return r.ident(col.name());
    };
    let mut def = format!(
        "{} {}",
        r.ident(col.name()),
        a.type_.as_deref().unwrap_or("text")
    );
    if let Some(default) = &a.default {
        def.push_str(&format!(" DEFAULT {default}"));
    }
    if a.not_null == Some(true) {
        def.push_str(" NOT NULL");
    }
    def
}

fn constraint_definition(a: &crate::object::ConstraintAttrs, r: &Render) -> String {
    if let Some(expr) = &a.check {
        return format!("CHECK ({expr})");
    }
    if let Some(columns) = &a.primary_key {
        return format!("PRIMARY KEY ({})", ident_list(columns, r));
    }
    if let Some(columns) = &a.unique {
        return format!("UNIQUE ({})", ident_list(columns, r));
    }
    if let Some(columns) = &a.foreign_key {
        let mut sql = format!("FOREIGN KEY ({})", ident_list(columns, r));
        if let Some(ref_table) = &a.ref_table {
            sql.push_str(&format!(" REFERENCES {ref_table}"));
            if let Some(ref_columns) = &a.ref_columns {
                sql.push_str(&format!(" ({})", ident_list(ref_columns, r)));
            }
        }
        if let Some(on_update) = &a.on_update {
            sql.push_str(&format!(" ON UPDATE {}", on_update.to_uppercase()));
        }
        if let Some(on_delete) = &a.on_delete {
            sql.push_str(&format!(" ON DELETE {}", on_delete.to_uppercase()));
        }
        if a.deferrable == Some(true) {
            sql.push_str(" DEFERRABLE");
            if a.deferred == Some(true) {
                sql.push_str(" INITIALLY DEFERRED");
            }
        }
        return sql;
    }
    String::new()
}

fn function_definition(
    obj: &Object,
    a: &crate::object::FunctionAttrs,
    r: &Render,
    replace: bool,
) -> String {
    let or_replace = if replace { "OR REPLACE " } else { "" };
    let mut sql = format!(
        "CREATE {}FUNCTION {}({})",
        or_replace,
        r.qualname(obj),
        obj.key.field(2)
    );
    if let Some(returns) = &a.returns {
        sql.push_str(&format!(" RETURNS {returns}"));
    }
    if let Some(language) = &a.language {
        sql.push_str(&format!(" LANGUAGE {language}"));
    }
    if let Some(volatility) = &a.volatility {
        sql.push_str(&format!(" {}", volatility.to_uppercase()));
    }
    if a.strict == Some(true) {
        sql.push_str(" STRICT");
    }
    if a.security_definer == Some(true) {
        sql.push_str(" SECURITY DEFINER");
    }
    if let Some(cost) = a.cost {
        sql.push_str(&format!(" COST {cost}"));
    }
    if let Some(source) = &a.source {
        sql.push_str(&format!(" AS $${source}$$"));
    }
    sql
}

fn rule_definition(obj: &Object, a: &crate::object::RuleAttrs, r: &Render, replace: bool) -> String {
    let or_replace = if replace { "OR REPLACE " } else { "" };
    let condition = a
        .condition
        .as_ref()
        .map(|c| format!(" WHERE {c}"))
        .unwrap_or_default();
    let instead = if a.instead == Some(true) { "INSTEAD " } else { "" };
    format!(
        "CREATE {}RULE {} AS ON {} TO {}{} DO {}{}",
        or_replace,
        r.ident(obj.name()),
        a.event.as_deref().unwrap_or_default().to_uppercase(),
        r.tablename(obj),
        condition,
        instead,
        a.actions.as_deref().unwrap_or("NOTHING")
    )
}

fn ident_list(names: &[String], r: &Render) -> String {
    names
        .iter()
        .map(|n| r.ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn options_list(options: &IndexMap<String, String>) -> String {
    let items: Vec<String> = options
        .iter()
        .map(|(k, v)| format!("{k} {}", literal(v)))
        .collect();
    format!("OPTIONS ({})", items.join(", "))
}

/// `OPTIONS (ADD ..., SET ..., DROP ...)` covering the difference between
/// two option maps, or None when they already agree.
fn options_diff(
    old: Option<&IndexMap<String, String>>,
    new: Option<&IndexMap<String, String>>,
) -> Option<String> {
    let empty = IndexMap::new();
    let old = old.unwrap_or(&empty);
    let new = new.unwrap_or(&empty);
    let mut items = Vec::new();
    for (k, v) in new {
        match old.get(k) {
            None => items.push(format!("ADD {k} {}", literal(v))),
            Some(prev) if prev != v => items.push(format!("SET {k} {}", literal(v))),
            _ => {}
        }
    }
    for k in old.keys() {
        if !new.contains_key(k) {
            items.push(format!("DROP {k}"));
        }
    }
    if items.is_empty() {
        None
    } else {
        Some(format!("OPTIONS ({})", items.join(", ")))
    }
}

/// The phrase after ALTER/DROP for simple kinds.
fn kind_phrase(kind: Kind) -> &'static str {
    match kind {
        Kind::Schema => "SCHEMA",
        Kind::Extension => "EXTENSION",
        Kind::Language => "LANGUAGE",
        Kind::Table => "TABLE",
        Kind::Index => "INDEX",
        Kind::Type => "TYPE",
        Kind::Collation => "COLLATION",
        Kind::Conversion => "CONVERSION",
        Kind::TsDictionary => "TEXT SEARCH DICTIONARY",
        Kind::TsTemplate => "TEXT SEARCH TEMPLATE",
        Kind::TsParser => "TEXT SEARCH PARSER",
        Kind::TsConfiguration => "TEXT SEARCH CONFIGURATION",
        Kind::ForeignDataWrapper => "FOREIGN DATA WRAPPER",
        Kind::Server => "SERVER",
        Kind::ForeignTable => "FOREIGN TABLE",
        Kind::Function => "FUNCTION",
        Kind::Operator => "OPERATOR",
        Kind::OperatorClass => "OPERATOR CLASS",
        Kind::OperatorFamily => "OPERATOR FAMILY",
        Kind::Cast => "CAST",
        Kind::Column => "COLUMN",
        Kind::Constraint => "CONSTRAINT",
        Kind::Trigger => "TRIGGER",
        Kind::Rule => "RULE",
        Kind::UserMapping => "USER MAPPING",
    }
}

/// Identifier phrase used after `ALTER <kind>` for ownership changes.
/// None for kinds that have no separate owner.
fn alter_target(obj: &Object, r: &Render) -> Option<String> {
    let phrase = kind_phrase(obj.kind);
    Some(match obj.kind {
        Kind::Schema | Kind::Language | Kind::ForeignDataWrapper | Kind::Server => {
            format!("{} {}", phrase, r.ident(obj.name()))
        }
        Kind::Type
        | Kind::Table
        | Kind::Collation
        | Kind::Conversion
        | Kind::TsDictionary
        | Kind::TsConfiguration
        | Kind::ForeignTable => format!("{} {}", phrase, r.qualname(obj)),
        Kind::Function => format!("FUNCTION {}({})", r.qualname(obj), obj.key.field(2)),
        Kind::Operator => format!(
            "OPERATOR {}.{} ({})",
            r.ident(obj.key.field(0)),
            obj.name(),
            obj.key.field(2)
        ),
        Kind::OperatorClass => {
            format!("OPERATOR CLASS {} USING {}", r.qualname(obj), obj.key.field(2))
        }
        Kind::OperatorFamily => {
            format!("OPERATOR FAMILY {} USING {}", r.qualname(obj), obj.key.field(2))
        }
        _ => return None,
    })
}

/// Identifier phrase used after `COMMENT ON`. None for kinds that cannot
/// carry a comment.
fn comment_target(obj: &Object, r: &Render) -> Option<String> {
    Some(match obj.kind {
        Kind::Column => format!(
            "COLUMN {}.{}",
            r.tablename(obj),
            r.ident(obj.name())
        ),
        Kind::Constraint => format!(
            "CONSTRAINT {} ON {}",
            r.ident(obj.name()),
            r.tablename(obj)
        ),
        Kind::Trigger => format!("TRIGGER {} ON {}", r.ident(obj.name()), r.tablename(obj)),
        Kind::Rule => format!("RULE {} ON {}", r.ident(obj.name()), r.tablename(obj)),
        Kind::Index => format!("INDEX {}", r.indexname(obj)),
        Kind::Cast => format!("CAST ({} AS {})", obj.key.field(0), obj.key.field(1)),
        Kind::Function => format!("FUNCTION {}({})", r.qualname(obj), obj.key.field(2)),
        Kind::Operator => format!(
            "OPERATOR {}.{} ({})",
            r.ident(obj.key.field(0)),
            obj.name(),
            obj.key.field(2)
        ),
        Kind::OperatorClass => {
            format!("OPERATOR CLASS {} USING {}", r.qualname(obj), obj.key.field(2))
        }
        Kind::OperatorFamily => {
            format!("OPERATOR FAMILY {} USING {}", r.qualname(obj), obj.key.field(2))
        }
        Kind::Schema | Kind::Extension | Kind::Language | Kind::ForeignDataWrapper | Kind::Server => {
            format!("{} {}", kind_phrase(obj.kind), r.ident(obj.name()))
        }
        Kind::UserMapping => return None,
        _ => format!("{} {}", kind_phrase(obj.kind), r.qualname(obj)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::object::Key;

    fn render() -> Render {
        Render::default()
    }

    fn graph_from(yaml: &str) -> Graph {
        Graph::from_doc(&Document::parse(yaml).unwrap()).unwrap()
    }

    #[test]
    fn create_table_inlines_columns_in_order() {
        let g = graph_from(
            "schema public:\n  table orders:\n    columns:\n      - id:\n          type: bigint\n          not_null: true\n      - note:\n          type: text\n",
        );
        let table = g.tables.get(&Key::two("public", "orders")).unwrap();
        let stmts = create(table, &g, &render());
        insta::assert_snapshot!(stmts[0], @r"
        CREATE TABLE public.orders (
            id bigint NOT NULL,
            note text
        )
        ");
    }

    #[test]
    fn create_enum_type_lists_labels() {
        let g = graph_from("schema public:\n  type mood:\n    labels: [sad, ok]\n");
        let t = g.types.get(&Key::two("public", "mood")).unwrap();
        assert_eq!(
            create(t, &g, &render())[0],
            "CREATE TYPE public.mood AS ENUM ('sad', 'ok')"
        );
    }

    #[test]
    fn create_operator_class_carries_strategies_and_supports() {
        let g = graph_from(
            "schema public:\n  operator class geom_gist using gist:\n    type: geom\n    storage: box\n    operators:\n      1: <(geom, geom)\n    functions:\n      1: geom_cmp(geom, geom)\n",
        );
        let oc = g
            .operator_classes
            .get(&Key::three("public", "geom_gist", "gist"))
            .unwrap();
        let sql = &create(oc, &g, &render())[0];
        assert!(sql.starts_with("CREATE OPERATOR CLASS public.geom_gist"));
        assert!(sql.contains("FOR TYPE geom USING gist"));
        assert!(sql.contains("OPERATOR 1 <(geom, geom)"));
        assert!(sql.contains("FUNCTION 1 geom_cmp(geom, geom)"));
        assert!(sql.contains("STORAGE box"));
    }

    #[test]
    fn column_alters_cover_each_changed_field() {
        let mut old = Object::new(Kind::Column, Key::three("public", "orders", "status"));
        old.attrs = Attrs::Column(crate::object::ColumnAttrs {
            type_: Some("text".into()),
            not_null: Some(false),
            ..Default::default()
        });
        let mut new = old.clone();
        new.attrs = Attrs::Column(crate::object::ColumnAttrs {
            type_: Some("order_status".into()),
            not_null: Some(true),
            default: Some("'ok'".into()),
            ..Default::default()
        });
        let g = Graph::new();
        let stmts = alter(&old, &new, &g, &render());
        assert_eq!(
            stmts,
            vec![
                "ALTER TABLE public.orders ALTER COLUMN status TYPE order_status USING status::order_status",
                "ALTER TABLE public.orders ALTER COLUMN status SET NOT NULL",
                "ALTER TABLE public.orders ALTER COLUMN status SET DEFAULT 'ok'",
            ]
        );
    }

    #[test]
    fn alter_is_empty_for_identical_objects() {
        let obj = Object::new(Kind::Table, Key::two("public", "orders"));
        assert!(alter(&obj, &obj, &Graph::new(), &render()).is_empty());
    }

    #[test]
    fn comment_changes_emit_comment_on() {
        let mut old = Object::new(Kind::Table, Key::two("public", "orders"));
        let mut new = old.clone();
        new.description = Some("order ledger".into());
        let stmts = alter(&old, &new, &Graph::new(), &render());
        assert_eq!(stmts, vec!["COMMENT ON TABLE public.orders IS 'order ledger'"]);

        old.description = Some("order ledger".into());
        new.description = None;
        let stmts = alter(&old, &new, &Graph::new(), &render());
        assert_eq!(stmts, vec!["COMMENT ON TABLE public.orders IS NULL"]);
    }

    #[test]
    fn options_diff_adds_sets_and_drops() {
        let old: IndexMap<String, String> =
            [("host", "a"), ("port", "5432")].iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let new: IndexMap<String, String> =
            [("host", "b"), ("dbname", "x")].iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let clause = options_diff(Some(&old), Some(&new)).unwrap();
        assert_eq!(clause, "OPTIONS (SET host 'b', ADD dbname 'x', DROP port)");
        assert!(options_diff(Some(&old), Some(&old)).is_none());
    }

    #[test]
    fn drop_statements_match_each_kind_shape() {
        let r = render();
        let cases = [
            (Object::new(Kind::Table, Key::two("public", "orders")), "DROP TABLE public.orders"),
            (Object::new(Kind::Schema, Key::one("audit")), "DROP SCHEMA audit"),
            (
                Object::new(Kind::Column, Key::three("public", "orders", "note")),
                "ALTER TABLE public.orders DROP COLUMN note",
            ),
            (
                Object::new(Kind::Index, Key::three("public", "orders", "orders_mood_idx")),
                "DROP INDEX public.orders_mood_idx",
            ),
            (
                Object::new(Kind::OperatorClass, Key::three("public", "geom_gist", "gist")),
                "DROP OPERATOR CLASS public.geom_gist USING gist",
            ),
            (
                Object::new(Kind::Cast, Key::two("integer", "text")),
                "DROP CAST (integer AS text)",
            ),
            (
                Object::new(Kind::UserMapping, Key::two("bob", "files")),
                "DROP USER MAPPING FOR bob SERVER files",
            ),
        ];
        for (obj, expected) in cases {
            assert_eq!(drop_stmt(&obj, &r), expected);
        }
    }

    #[test]
    fn index_statements_name_the_index_not_its_table() {
        let g = graph_from(
            "schema public:\n  table orders:\n    columns:\n      - id:\n          type: bigint\n    index orders_idx:\n      keys: [id]\n",
        );
        let old = g
            .indexes
            .get(&Key::three("public", "orders", "orders_idx"))
            .unwrap();
        assert_eq!(drop_stmt(old, &render()), "DROP INDEX public.orders_idx");

        let mut new = old.clone();
        new.attrs = Attrs::Index(crate::object::IndexAttrs {
            keys: Some(vec!["id".into(), "note".into()]),
            ..Default::default()
        });
        assert_eq!(
            alter(old, &new, &g, &render()),
            vec![
                "DROP INDEX public.orders_idx",
                "CREATE INDEX orders_idx ON public.orders (id, note)",
            ]
        );

        let mut commented = old.clone();
        commented.description = Some("hot path".into());
        assert_eq!(
            alter(old, &commented, &g, &render()),
            vec!["COMMENT ON INDEX public.orders_idx IS 'hot path'"]
        );
    }

    #[test]
    fn renames_use_the_old_name_as_target() {
        let r = render();
        let table = Object::new(Kind::Table, Key::two("public", "order"));
        assert_eq!(
            rename(&table, "orders", &r).unwrap(),
            "ALTER TABLE public.orders RENAME TO order"
        );
        let cast = Object::new(Kind::Cast, Key::two("integer", "text"));
        assert!(rename(&cast, "x", &r).is_none());
    }
}
