//! End-to-end planning tests over in-memory graphs and a canned catalog
//! reader. These pin the ordering contract: statements must never reference
//! an object that does not exist yet or is already gone.

use molt::{
    diff_graphs, synthesize, CatalogReader, Document, Error, Field, Graph, Options, Render, Row,
};

fn doc(yaml: &str) -> Document {
    Document::parse(yaml).unwrap()
}

fn graph(yaml: &str) -> Graph {
    Graph::from_doc(&doc(yaml)).unwrap()
}

fn plan(old: &Graph, new: &Graph) -> Vec<String> {
    diff_graphs(old, new, &Render::default())
}

#[test]
fn identical_graphs_across_many_kinds_yield_nothing() {
    let yaml = r#"
extension hstore:
  schema: public
  version: "1.8"
language plpgsql:
  trusted: true
schema public:
  type mood:
    labels: [sad, ok, happy]
  function mood_rank(mood):
    language: sql
    returns: integer
    source: select 1
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
    trigger orders_audit:
      timing: after
      events: [insert]
      level: row
      procedure: audit()
  text search dictionary simple_dict:
    template: simple
cast (integer as text):
  function: int4out(integer)
foreign data wrapper file_fdw:
  server files:
    type: file
user mapping for bob server files:
  options:
    user: bob
"#;
    let a = graph(yaml);
    let b = graph(yaml);
    assert_eq!(plan(&a, &b), Vec::<String>::new());
}

#[test]
fn new_type_is_created_before_the_column_that_needs_it() {
    let old = graph(
        r#"
schema public:
  table orders:
    columns:
      - status:
          type: text
"#,
    );
    let new = graph(
        r#"
schema public:
  type order_status:
    labels: [new, done]
  table orders:
    columns:
      - status:
          type: order_status
"#,
    );
    let stmts = plan(&old, &new);
    let create_type = stmts
        .iter()
        .position(|s| s == "CREATE TYPE public.order_status AS ENUM ('new', 'done')")
        .expect("missing type creation");
    let alter_column = stmts
        .iter()
        .position(|s| {
            s == "ALTER TABLE public.orders ALTER COLUMN status TYPE order_status USING status::order_status"
        })
        .expect("missing column type change");
    assert!(
        create_type < alter_column,
        "type must exist before the column uses it: {stmts:?}"
    );
}

#[test]
fn foundational_drops_come_after_every_dependent_statement() {
    let old = graph(
        r#"
schema public:
  type geom:
    labels: [pt]
  table shapes:
    columns:
      - g:
          type: geom
"#,
    );
    let new = graph("schema public: {}\n");
    let stmts = plan(&old, &new);
    let drop_table = stmts
        .iter()
        .position(|s| s == "DROP TABLE public.shapes")
        .expect("missing table drop");
    let drop_type = stmts
        .iter()
        .position(|s| s == "DROP TYPE public.geom")
        .expect("missing type drop");
    assert!(
        drop_table < drop_type,
        "a type drops only after the objects using it: {stmts:?}"
    );
    assert_eq!(drop_type, stmts.len() - 1, "cleanup pass runs last");
}

#[test]
fn removed_operator_class_drops_in_cleanup_while_its_type_stays() {
    let old = graph(
        r#"
schema public:
  type geom:
    labels: [pt]
  operator class my_gist using gist:
    type: geom
"#,
    );
    let new = graph(
        r#"
schema public:
  type geom:
    labels: [pt]
"#,
    );
    let stmts = plan(&old, &new);
    assert_eq!(stmts, vec!["DROP OPERATOR CLASS public.my_gist USING gist"]);
}

#[test]
fn rename_hint_produces_one_rename_and_no_create_or_drop() {
    let old = graph(
        "schema s:\n  table foo:\n    columns:\n      - id:\n          type: bigint\n",
    );
    let new = graph(
        "schema s:\n  table bar:\n    oldname: foo\n    columns:\n      - id:\n          type: bigint\n",
    );
    let stmts = plan(&old, &new);
    assert_eq!(stmts, vec!["ALTER TABLE s.foo RENAME TO bar"]);
}

#[test]
fn table_rename_still_diffs_the_surviving_children() {
    let old = graph(
        "schema s:\n  table foo:\n    columns:\n      - id:\n          type: bigint\n",
    );
    let new = graph(
        "schema s:\n  table bar:\n    oldname: foo\n    columns:\n      - id:\n          type: text\n",
    );
    assert_eq!(
        plan(&old, &new),
        vec![
            "ALTER TABLE s.foo RENAME TO bar",
            "ALTER TABLE s.bar ALTER COLUMN id TYPE text USING id::text",
        ]
    );
}

#[test]
fn table_rename_drops_removed_children_under_the_new_name() {
    let old = graph(
        r#"
schema s:
  table foo:
    columns:
      - id:
          type: bigint
      - note:
          type: text
    index foo_note_idx:
      keys: [note]
"#,
    );
    let new = graph(
        "schema s:\n  table bar:\n    oldname: foo\n    columns:\n      - id:\n          type: bigint\n",
    );
    assert_eq!(
        plan(&old, &new),
        vec![
            "ALTER TABLE s.foo RENAME TO bar",
            "DROP INDEX s.foo_note_idx",
            "ALTER TABLE s.bar DROP COLUMN note",
        ]
    );
}

#[test]
fn a_dropped_index_is_named_by_itself_not_its_table() {
    let old = graph(
        "schema public:\n  table orders:\n    columns:\n      - id:\n          type: bigint\n    index orders_idx:\n      keys: [id]\n",
    );
    let new = graph(
        "schema public:\n  table orders:\n    columns:\n      - id:\n          type: bigint\n",
    );
    assert_eq!(plan(&old, &new), vec!["DROP INDEX public.orders_idx"]);
}

#[test]
fn representative_plan_snapshot() {
    let old = graph(
        r#"
schema public:
  type status:
    labels: [new]
  table orders:
    columns:
      - id:
          type: bigint
          not_null: true
      - state:
          type: text
  table legacy:
    columns:
      - id:
          type: bigint
"#,
    );
    let new = graph(
        r#"
schema public:
  type status:
    labels: [new, done]
  table orders:
    columns:
      - id:
          type: bigint
          not_null: true
      - state:
          type: status
    index orders_state_idx:
      keys: [state]
language plpgsql:
  trusted: true
"#,
    );
    insta::assert_snapshot!(plan(&old, &new).join(";\n"), @r"
    CREATE TRUSTED LANGUAGE plpgsql;
    ALTER TYPE public.status ADD VALUE 'done';
    DROP TABLE public.legacy;
    CREATE INDEX orders_state_idx ON public.orders (state);
    ALTER TABLE public.orders ALTER COLUMN state TYPE status USING state::status
    ");
}

// ---------------------------------------------------------------------------
// synthesize() against a canned catalog
// ---------------------------------------------------------------------------

struct FakeCatalog {
    responses: Vec<(&'static str, Vec<Row>)>,
}

impl FakeCatalog {
    fn row(fields: &[(&str, Field)]) -> Row {
        fields
            .iter()
            .map(|(name, field)| (name.to_string(), field.clone()))
            .collect()
    }
}

impl CatalogReader for FakeCatalog {
    fn server_version(&self) -> u32 {
        150004
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>, Error> {
        for (needle, rows) in &self.responses {
            if sql.contains(needle) {
                return Ok(rows.clone());
            }
        }
        Ok(Vec::new())
    }

    fn rollback(&mut self) {}
}

fn text(s: &str) -> Field {
    Field::Text(s.to_string())
}

fn catalog_with_orders_table() -> FakeCatalog {
    FakeCatalog {
        responses: vec![
            (
                "FROM pg_namespace",
                vec![FakeCatalog::row(&[
                    ("oid", Field::Int(2200)),
                    ("name", text("public")),
                ])],
            ),
            (
                "FROM pg_class c JOIN pg_namespace",
                vec![FakeCatalog::row(&[
                    ("oid", Field::Int(16401)),
                    ("schema", text("public")),
                    ("name", text("orders")),
                ])],
            ),
            (
                "FROM pg_attribute a JOIN pg_class",
                vec![FakeCatalog::row(&[
                    ("schema", text("public")),
                    ("table", text("orders")),
                    ("name", text("status")),
                    ("type", text("text")),
                ])],
            ),
        ],
    }
}

#[test]
fn synthesize_orders_type_creation_before_column_alter() {
    let mut reader = catalog_with_orders_table();
    let document = doc(
        r#"
schema public:
  type order_status:
    labels: [new, done]
  table orders:
    columns:
      - status:
          type: order_status
"#,
    );
    let stmts = synthesize(&mut reader, &document, &Options::default()).unwrap();
    assert_eq!(
        stmts,
        vec![
            "CREATE TYPE public.order_status AS ENUM ('new', 'done')".to_string(),
            "ALTER TABLE public.orders ALTER COLUMN status TYPE order_status USING status::order_status"
                .to_string(),
        ]
    );
}

#[test]
fn synthesize_creates_the_foreign_data_stack_in_dependency_order() {
    let mut reader = FakeCatalog { responses: vec![] };
    let document = doc(
        r#"
foreign data wrapper file_fdw:
  validator: file_fdw_validator
  server files:
    type: file
user mapping for bob server files:
  options:
    user: bob
"#,
    );
    let stmts = synthesize(&mut reader, &document, &Options::default()).unwrap();
    assert_eq!(
        stmts,
        vec![
            "CREATE FOREIGN DATA WRAPPER file_fdw VALIDATOR file_fdw_validator".to_string(),
            "CREATE SERVER files TYPE 'file' FOREIGN DATA WRAPPER file_fdw".to_string(),
            "CREATE USER MAPPING FOR bob SERVER files OPTIONS (user 'bob')".to_string(),
        ]
    );
}

#[test]
fn malformed_documents_abort_before_any_statement() {
    let mut reader = catalog_with_orders_table();
    let document = doc("tablespace fast:\n  location: /x\n");
    let err = synthesize(&mut reader, &document, &Options::default()).unwrap_err();
    assert!(matches!(err, Error::Format { .. }), "got {err:?}");
}

#[test]
fn reserved_word_quoting_is_fed_from_the_catalog() {
    let mut reader = FakeCatalog {
        responses: vec![(
            "pg_get_keywords",
            vec![FakeCatalog::row(&[("word", text("user"))])],
        )],
    };
    let document = doc("schema user: {}\n");
    let options = Options {
        quote_reserved: true,
        ..Default::default()
    };
    let stmts = synthesize(&mut reader, &document, &options).unwrap();
    assert_eq!(stmts, vec!["CREATE SCHEMA \"user\""]);

    let mut reader = FakeCatalog { responses: vec![] };
    let plain = synthesize(&mut reader, &document, &Options::default()).unwrap();
    assert_eq!(plain, vec!["CREATE SCHEMA user"]);
}

#[test]
fn schema_scoping_restricts_both_sides_and_database_wide_kinds() {
    let mut reader = FakeCatalog {
        responses: vec![
            (
                "FROM pg_namespace",
                vec![
                    FakeCatalog::row(&[("oid", Field::Int(2200)), ("name", text("public"))]),
                    FakeCatalog::row(&[("oid", Field::Int(2300)), ("name", text("audit"))]),
                ],
            ),
            (
                "FROM pg_class c JOIN pg_namespace",
                vec![FakeCatalog::row(&[
                    ("oid", Field::Int(16500)),
                    ("schema", text("audit")),
                    ("name", text("log")),
                ])],
            ),
        ],
    };
    // The document drops the audit table and adds a language; under
    // --schema public neither may produce a statement.
    let document = doc("schema public: {}\nschema audit: {}\nlanguage plv8:\n  trusted: true\n");
    let options = Options {
        schemas: vec!["public".to_string()],
        ..Default::default()
    };
    let stmts = synthesize(&mut reader, &document, &options).unwrap();
    assert_eq!(stmts, Vec::<String>::new());
}
