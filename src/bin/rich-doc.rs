use clap::{Parser, Subcommand, ValueEnum};
use rich_doc::basic;
use rich_doc::model::{Node, Schema, SchemaSpec};
use rich_doc::transform::{Assoc, Mappable, Step, Transform};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing::debug;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Schema spec as JSON; the basic schema when absent
    #[arg(long, global = true)]
    schema: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Checks a document against the schema
    Check {
        doc: PathBuf,
    },
    /// Applies a JSON array of steps to a document
    Apply {
        #[arg(long)]
        doc: PathBuf,
        #[arg(long)]
        steps: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Maps a position through the steps' mapping
    Map {
        #[arg(long)]
        doc: PathBuf,
        #[arg(long)]
        steps: PathBuf,
        #[arg(long)]
        pos: usize,
        #[arg(long, value_enum, default_value_t = AssocArg::After)]
        assoc: AssocArg,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AssocArg {
    Before,
    After,
}

impl From<AssocArg> for Assoc {
    fn from(arg: AssocArg) -> Self {
        match arg {
            AssocArg::Before => Assoc::Before,
            AssocArg::After => Assoc::After,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let schema = or_exit(load_schema(cli.schema.as_deref()));

    match &cli.command {
        Commands::Check { doc } => check_command(&schema, doc),
        Commands::Apply { doc, steps, json } => apply_command(&schema, doc, steps, *json),
        Commands::Map {
            doc,
            steps,
            pos,
            assoc,
            json,
        } => map_command(&schema, doc, steps, *pos, (*assoc).into(), *json),
    }
}

fn or_exit<T>(result: Result<T, String>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            eprintln!("Error: {err}");
            process::exit(1);
        }
    }
}

fn read_json(path: &Path) -> Result<Value, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("{}: {e}", path.display()))
}

fn load_schema(path: Option<&Path>) -> Result<Schema, String> {
    let Some(path) = path else {
        return Ok(basic::schema());
    };
    let text = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let spec: SchemaSpec =
        serde_json::from_str(&text).map_err(|e| format!("{}: {e}", path.display()))?;
    Schema::new(spec).map_err(|e| e.to_string())
}

fn load_doc(schema: &Schema, path: &Path) -> Result<Node, String> {
    schema
        .node_from_json(&read_json(path)?)
        .map_err(|e| e.to_string())
}

/// Runs every step in the array at `path` through a transform.
fn run_steps(schema: &Schema, doc: Node, path: &Path) -> Result<Transform, String> {
    let steps = match read_json(path)? {
        Value::Array(steps) => steps,
        _ => return Err(format!("{}: expected an array of steps", path.display())),
    };
    let mut tr = Transform::new(doc);
    for (i, json) in steps.iter().enumerate() {
        let step = Step::from_json(schema, json).map_err(|e| format!("step {i}: {e}"))?;
        debug!(index = i, step = step.json_id(), "applying step");
        tr.step(step).map_err(|e| format!("step {i}: {e}"))?;
    }
    Ok(tr)
}

fn check_command(schema: &Schema, doc: &Path) {
    let doc = or_exit(load_doc(schema, doc));
    match doc.check() {
        Ok(()) => println!("ok"),
        Err(err) => {
            eprintln!("Error: {err}");
            process::exit(1);
        }
    }
}

fn apply_command(schema: &Schema, doc: &Path, steps: &Path, json: bool) {
    let doc = or_exit(load_doc(schema, doc));
    let tr = or_exit(run_steps(schema, doc, steps));
    if json {
        let output =
            or_exit(serde_json::to_string_pretty(&tr.doc().to_json()).map_err(|e| e.to_string()));
        println!("{output}");
    } else {
        println!("{}", tr.doc());
    }
}

fn map_command(schema: &Schema, doc: &Path, steps: &Path, pos: usize, assoc: Assoc, json: bool) {
    let doc = or_exit(load_doc(schema, doc));
    let tr = or_exit(run_steps(schema, doc, steps));
    if pos > tr.before().content().size() {
        or_exit::<()>(Err(format!("position {pos} is outside the document")));
    }
    let result = tr.mapping().map_result(pos, assoc);
    if json {
        let output = serde_json::json!({
            "pos": result.pos,
            "deleted": result.deleted(),
            "deletedBefore": result.deleted_before(),
            "deletedAfter": result.deleted_after(),
            "deletedAcross": result.deleted_across(),
        });
        println!("{output}");
    } else {
        println!(
            "{} deleted={} before={} after={} across={}",
            result.pos,
            result.deleted(),
            result.deleted_before(),
            result.deleted_after(),
            result.deleted_across()
        );
    }
}
