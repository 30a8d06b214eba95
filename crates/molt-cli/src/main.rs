//! Command-line front end.
//!
//! Two verbs: `plan` reads a YAML document (one file or a directory of
//! per-object files) and prints the DDL that brings the connected database
//! to the described state; `dump` goes the other way and prints the live
//! schema as YAML.

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use molt::{Document, Options, PgReader};

#[derive(Parser)]
#[command(name = "molt", version, about = "PostgreSQL schema differ")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the statements transforming the database into the described state.
    Plan {
        /// YAML document: a single file, or a directory of per-object files.
        document: Utf8PathBuf,

        /// Connection string, e.g. "host=localhost user=app dbname=app".
        #[arg(long)]
        dsn: String,

        /// Restrict the diff to this schema (repeatable).
        #[arg(long = "schema", value_name = "NAME")]
        schemas: Vec<String>,

        /// Quote identifiers colliding with the server's reserved words.
        #[arg(long)]
        quote_reserved: bool,

        /// Omit ownership statements.
        #[arg(long)]
        no_owner: bool,

        /// Omit comment statements.
        #[arg(long)]
        no_comments: bool,
    },
    /// Print the database's schema as a YAML document.
    Dump {
        /// Connection string, e.g. "host=localhost user=app dbname=app".
        #[arg(long)]
        dsn: String,

        /// Restrict the dump to this schema (repeatable).
        #[arg(long = "schema", value_name = "NAME")]
        schemas: Vec<String>,

        /// Omit ownership fields.
        #[arg(long)]
        no_owner: bool,

        /// Omit comment fields.
        #[arg(long)]
        no_comments: bool,
    },
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> molt::Result<()> {
    match cli.command {
        Command::Plan {
            document,
            dsn,
            schemas,
            quote_reserved,
            no_owner,
            no_comments,
        } => {
            let document = load_document(&document)?;
            let mut reader = PgReader::connect(&dsn)?;
            let options = Options {
                schemas,
                quote_reserved,
                no_owner,
                no_comments,
            };
            for stmt in molt::synthesize(&mut reader, &document, &options)? {
                println!("{stmt};");
            }
        }
        Command::Dump {
            dsn,
            schemas,
            no_owner,
            no_comments,
        } => {
            let mut reader = PgReader::connect(&dsn)?;
            let mut graph = molt::catalog::load_graph(&mut reader)?;
            if !schemas.is_empty() {
                graph.retain_schemas(&schemas);
            }
            let doc = graph.to_doc(no_owner, no_comments);
            print!("{}", serde_yaml::to_string(&doc.to_value())?);
        }
    }
    Ok(())
}

/// Load a document from one file, or merge a directory of per-object files:
/// `<anything>.yaml` at the root merges into the top level, and every file
/// under a `schema.<name>/` subdirectory merges into that schema's fragment.
fn load_document(path: &Utf8Path) -> molt::Result<Document> {
    if !path.is_dir() {
        return Document::parse(&std::fs::read_to_string(path)?);
    }

    let mut doc = Document::default();
    let mut entries: Vec<Utf8PathBuf> = Vec::new();
    for entry in path.read_dir_utf8()? {
        entries.push(entry?.path().to_owned());
    }
    entries.sort();

    for entry in &entries {
        if entry.is_file() && entry.extension() == Some("yaml") {
            doc.merge(Document::parse(&std::fs::read_to_string(entry)?)?.0);
        }
    }
    for entry in &entries {
        let Some(name) = entry.file_name() else { continue };
        let Some(schema) = name.strip_prefix("schema.") else { continue };
        if !entry.is_dir() {
            continue;
        }
        let mut fragment = Document::default();
        let mut files: Vec<Utf8PathBuf> = Vec::new();
        for file in entry.read_dir_utf8()? {
            files.push(file?.path().to_owned());
        }
        files.sort();
        for file in files {
            if file.extension() == Some("yaml") {
                fragment.merge(Document::parse(&std::fs::read_to_string(&file)?)?.0);
            }
        }
        let key = serde_yaml::Value::from(format!("schema {schema}"));
        match doc.0.get_mut(&key) {
            Some(serde_yaml::Value::Mapping(existing)) => {
                for (k, v) in fragment.0 {
                    existing.insert(k, v);
                }
            }
            _ => {
                doc.0.insert(key, serde_yaml::Value::Mapping(fragment.0));
            }
        }
    }
    Ok(doc)
}
