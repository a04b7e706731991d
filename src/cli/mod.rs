//! TM-013: CLI subcommands: init, validate, synth, plan, graph, drift, status.

use crate::core::graph::StackGraph;
use crate::core::{parser, planner, stack, state, synth, types};
use crate::tripwire::{drift, eventlog, hasher};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "tempmon",
    version,
    about = "Typed resource graph for an IoT temperature pipeline (IoT rule, Timestream, IAM)"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for `graph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new tempmon project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate tempmon.yaml and the declared graph
    Validate {
        /// Path to tempmon.yaml
        #[arg(short, long, default_value = "tempmon.yaml")]
        file: PathBuf,
    },

    /// Synthesize the template and manifest
    Synth {
        /// Path to tempmon.yaml
        #[arg(short, long, default_value = "tempmon.yaml")]
        file: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "cdk.out")]
        out: PathBuf,

        /// Print the template to stdout instead of writing files
        #[arg(long)]
        stdout: bool,
    },

    /// Show what changed since the last synthesis
    Plan {
        /// Path to tempmon.yaml
        #[arg(short, long, default_value = "tempmon.yaml")]
        file: PathBuf,

        /// Output directory holding the previous manifest
        #[arg(short, long, default_value = "cdk.out")]
        out: PathBuf,
    },

    /// Print nodes, edges, and deploy order
    Graph {
        /// Path to tempmon.yaml
        #[arg(short, long, default_value = "tempmon.yaml")]
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = GraphFormat::Text)]
        format: GraphFormat,
    },

    /// Detect hand edits to the synthesized template (tripwire)
    Drift {
        /// Output directory
        #[arg(short, long, default_value = "cdk.out")]
        out: PathBuf,

        /// Exit non-zero on any drift (for CI)
        #[arg(long)]
        tripwire: bool,
    },

    /// Show the manifest of the last synthesis
    Status {
        /// Output directory
        #[arg(short, long, default_value = "cdk.out")]
        out: PathBuf,
    },

    /// Print the JSON schema of tempmon.yaml
    Schema,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Synth { file, out, stdout } => cmd_synth(&file, &out, stdout),
        Commands::Plan { file, out } => cmd_plan(&file, &out),
        Commands::Graph { file, format } => cmd_graph(&file, format),
        Commands::Drift { out, tripwire } => cmd_drift(&out, tripwire),
        Commands::Status { out } => cmd_status(&out),
        Commands::Schema => cmd_schema(),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "tempmon", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join("tempmon.yaml");
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }
    std::fs::create_dir_all(path)
        .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;

    let yaml = serde_yaml_ng::to_string(&types::StackConfig::default())
        .map_err(|e| format!("serialize error: {}", e))?;
    std::fs::write(&config_path, yaml)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    println!("Initialized tempmon project at {}", path.display());
    println!("  Created: {}", config_path.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let config = parse_and_validate(file)?;
    let graph = declare(&config)?;
    println!(
        "OK: {} ({} resources, {} edges)",
        graph.name(),
        graph.len(),
        graph.edges().len()
    );
    Ok(())
}

/// Parse and validate a tempmon config file, returning errors if invalid.
fn parse_and_validate(file: &Path) -> Result<types::StackConfig, String> {
    let config = parser::parse_config_file(file)?;
    let errors = parser::validate_config(&config);
    if errors.is_empty() {
        return Ok(config);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err(format!("{} validation error(s)", errors.len()))
}

/// Declare the stack and re-check the graph.
fn declare(config: &types::StackConfig) -> Result<StackGraph, String> {
    let graph = stack::declare_stack(config).map_err(|e| e.to_string())?;
    let errors = graph.validate();
    if errors.is_empty() {
        return Ok(graph);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err(format!("{} structural error(s)", errors.len()))
}

fn cmd_synth(file: &Path, out: &Path, to_stdout: bool) -> Result<(), String> {
    let started = Instant::now();
    let config = parse_and_validate(file)?;
    let graph = declare(&config)?;
    let template = synth::synthesize(&graph);
    let rendered = synth::render(&template)?;

    if to_stdout {
        print!("{}", rendered);
        return Ok(());
    }

    let run_id = eventlog::generate_run_id();
    eventlog::append_event(
        out,
        types::ProvenanceEvent::SynthStarted {
            stack: graph.name().to_string(),
            run_id: run_id.clone(),
            tempmon_version: env!("CARGO_PKG_VERSION").to_string(),
        },
    )?;

    let template_hash = hasher::hash_string(&rendered);
    let manifest = state::new_manifest(&graph, &template, &template_hash);
    for (id, lock) in &manifest.resources {
        eventlog::append_event(
            out,
            types::ProvenanceEvent::ResourceDeclared {
                stack: graph.name().to_string(),
                resource: id.clone(),
                resource_type: lock.resource_type.clone(),
                hash: lock.hash.clone(),
            },
        )?;
    }

    state::save_template(out, &rendered)?;
    state::save_manifest(out, &manifest)?;

    let total_seconds = started.elapsed().as_secs_f64();
    eventlog::append_event(
        out,
        types::ProvenanceEvent::SynthCompleted {
            stack: graph.name().to_string(),
            run_id,
            resources: u32::try_from(manifest.resources.len()).unwrap_or(u32::MAX),
            template_hash: template_hash.clone(),
            total_seconds,
        },
    )?;
    info!(stack = graph.name(), resources = graph.len(), hash = %template_hash, "synthesized");

    println!(
        "Synthesized {} ({} resources) → {}",
        graph.name(),
        graph.len(),
        state::template_path(out).display()
    );
    println!("  Template hash: {}", template_hash);
    Ok(())
}

fn cmd_plan(file: &Path, out: &Path) -> Result<(), String> {
    let config = parse_and_validate(file)?;
    let graph = declare(&config)?;
    let template = synth::synthesize(&graph);
    let previous = state::load_manifest(out)?;
    let plan = planner::plan(&graph, &template, previous.as_ref())?;
    print_plan(&plan);
    Ok(())
}

/// Display a plan to stdout.
fn print_plan(plan: &types::ExecutionPlan) {
    println!("Planning: {} ({} resources)", plan.name, plan.changes.len());
    println!();

    for change in &plan.changes {
        let symbol = match change.action {
            types::PlanAction::Create => "+",
            types::PlanAction::Update => "~",
            types::PlanAction::Destroy => "-",
            types::PlanAction::NoOp => " ",
        };
        println!("  {} {}", symbol, change.description);
    }

    println!();
    println!("Deploy order: {}", plan.deploy_order.join(" → "));
    println!(
        "Plan: {} to add, {} to change, {} to destroy, {} unchanged.",
        plan.to_create, plan.to_update, plan.to_destroy, plan.unchanged
    );
}

fn cmd_graph(file: &Path, format: GraphFormat) -> Result<(), String> {
    let config = parse_and_validate(file)?;
    let graph = declare(&config)?;
    print!("{}", render_graph(&graph, format)?);
    Ok(())
}

fn render_graph(graph: &StackGraph, format: GraphFormat) -> Result<String, String> {
    let mut out = String::new();
    match format {
        GraphFormat::Json => {
            out = serde_json::to_string_pretty(graph)
                .map_err(|e| format!("JSON serialize error: {}", e))?;
            out.push('\n');
        }
        GraphFormat::Dot => {
            out.push_str(&format!("digraph \"{}\" {{\n", graph.name()));
            for node in graph.nodes() {
                out.push_str(&format!(
                    "  \"{}\" [label=\"{}\\n{}\"];\n",
                    node.id,
                    node.id,
                    node.kind()
                ));
            }
            for edge in graph.edges() {
                let style = match edge.kind {
                    types::EdgeKind::DependsOn => "bold",
                    types::EdgeKind::Reference => "solid",
                    types::EdgeKind::Grant => "dashed",
                };
                out.push_str(&format!(
                    "  \"{}\" -> \"{}\" [label=\"{}\", style={}];\n",
                    edge.from, edge.to, edge.kind, style
                ));
            }
            out.push_str("}\n");
        }
        GraphFormat::Text => {
            let order = planner::deploy_order(graph)
                .map_err(|m| format!("dependency cycle detected involving: {}", m))?;
            out.push_str(&format!("Stack: {}\n", graph.name()));
            out.push_str("Nodes:\n");
            for node in graph.nodes() {
                out.push_str(&format!(
                    "  {} [{}] {}\n",
                    node.id,
                    node.kind(),
                    node.kind().resource_type()
                ));
            }
            out.push_str("Edges:\n");
            for edge in graph.edges() {
                out.push_str(&format!("  {} -> {} ({})\n", edge.from, edge.to, edge.kind));
            }
            out.push_str(&format!("Deploy order: {}\n", order.join(" → ")));
        }
    }
    Ok(out)
}

fn cmd_drift(out: &Path, tripwire_mode: bool) -> Result<(), String> {
    let manifest = state::load_manifest(out)?.ok_or_else(|| {
        format!(
            "no manifest in {}; run `tempmon synth` first",
            out.display()
        )
    })?;

    println!(
        "Checking {} ({} resources)...",
        manifest.stack,
        manifest.resources.len()
    );
    let findings = drift::detect_drift(out, &manifest);

    if findings.is_empty() {
        println!("No drift detected.");
        return Ok(());
    }

    for f in &findings {
        println!("  DRIFTED: {} ({})", f.resource_id, f.detail);
        println!("    Expected: {}", f.expected_hash);
        println!("    Actual:   {}", f.actual_hash);
        eventlog::append_event(
            out,
            types::ProvenanceEvent::DriftDetected {
                stack: manifest.stack.clone(),
                resource: f.resource_id.clone(),
                expected_hash: f.expected_hash.clone(),
                actual_hash: f.actual_hash.clone(),
            },
        )?;
    }

    println!();
    println!("Drift detected: {} finding(s)", findings.len());
    if tripwire_mode {
        return Err(format!("{} drift finding(s)", findings.len()));
    }
    Ok(())
}

fn cmd_status(out: &Path) -> Result<(), String> {
    let Some(manifest) = state::load_manifest(out)? else {
        println!("No manifest found. Run `tempmon synth` first.");
        return Ok(());
    };

    println!("Stack: {}", manifest.stack);
    println!("  Generated: {}", manifest.generated_at);
    println!("  Generator: {}", manifest.generator);
    println!("  Template:  {}", manifest.template_hash);
    println!("  Resources: {}", manifest.resources.len());
    for (id, rl) in &manifest.resources {
        let after = if rl.depends_on.is_empty() {
            String::new()
        } else {
            format!(" (depends on {})", rl.depends_on.join(", "))
        };
        println!("    {}: {}{}", id, rl.resource_type, after);
    }
    Ok(())
}

fn cmd_schema() -> Result<(), String> {
    let schema = schemars::schema_for!(types::StackConfig);
    let json = serde_json::to_string_pretty(&schema)
        .map_err(|e| format!("JSON serialize error: {}", e))?;
    println!("{}", json);
    Ok(())
}
