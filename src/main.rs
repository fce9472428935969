//! benchmake CLI - build and run a Fortran kernel benchmark
//!
//! Selects a toolchain profile, brings the kernel object and the generated
//! extension up to date, and invokes the benchmark entry point.

use benchmake::config::{BuildConfig, CliArgs, Commands, OutputFormat};
use benchmake::core::{invocation_for, BuildEngine, Recipe};
use benchmake::error::Result;
use benchmake::progress::StepReporter;
use benchmake::toolchain::ToolchainKind;
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize logging; RUST_LOG wins over -v/-q
    let default_level = match (args.quiet, args.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "benchmake=debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(args: CliArgs) -> Result<()> {
    // Resolving the configuration validates the toolchain profile before
    // anything else happens
    let config = BuildConfig::from_cli(&args)?;
    tracing::debug!("Resolved configuration: {:?}", config);

    let command = args
        .command
        .clone()
        .unwrap_or(Commands::All { bench_args: Vec::new() });

    match command {
        Commands::Profiles => cmd_profiles(&config, args.format),
        Commands::Plan { recipe } => cmd_plan(config, recipe, args.format),
        other => {
            let recipe = other.recipe().unwrap_or(Recipe::All);
            cmd_recipe(config, recipe, &args)
        }
    }
}

fn cmd_recipe(config: BuildConfig, recipe: Recipe, args: &CliArgs) -> Result<()> {
    let reporter = if args.quiet {
        StepReporter::disabled()
    } else {
        StepReporter::new()
    };

    let engine = BuildEngine::new(config)?.with_reporter(reporter);
    let report = engine.execute(recipe)?;

    match args.format {
        OutputFormat::Json => println!("{}", report.to_json()),
        OutputFormat::Text if !args.quiet => report.print_summary(),
        OutputFormat::Text => {}
    }

    Ok(())
}

fn cmd_plan(config: BuildConfig, recipe: Recipe, format: OutputFormat) -> Result<()> {
    let engine = BuildEngine::new(config)?;
    let plan = engine.graph().plan(recipe)?;

    let mut steps = Vec::new();
    for id in &plan.steps {
        let Some(step) = engine.graph().step(*id) else {
            continue;
        };
        steps.push(json!({
            "step": id,
            "forced": plan.forced.contains(id),
            "deps": step.deps,
            "inputs": step.inputs.iter().map(|s| s.describe()).collect::<Vec<_>>(),
            "outputs": step.outputs.iter().map(|s| s.describe()).collect::<Vec<_>>(),
            "command": invocation_for(*id, engine.config()).to_string(),
        }));
    }

    match format {
        OutputFormat::Json => {
            let doc = json!({
                "recipe": recipe,
                "toolchain": engine.config().profile.kind,
                "steps": steps,
            });
            println!("{}", serde_json::to_string_pretty(&doc).unwrap_or_default());
        }
        OutputFormat::Text => {
            println!(
                "Plan for '{}' ({} toolchain):",
                recipe,
                engine.config().profile.kind.vendor()
            );
            if plan.steps.is_empty() {
                println!("  (no build steps; removes generated artifacts)");
            }
            for (i, id) in plan.steps.iter().enumerate() {
                let forced = if plan.forced.contains(id) { " [forced]" } else { "" };
                println!("  {}. {}{}", i + 1, id, forced);
                println!("     $ {}", invocation_for(*id, engine.config()));
            }
        }
    }
    Ok(())
}

fn cmd_profiles(config: &BuildConfig, format: OutputFormat) -> Result<()> {
    let active = config.profile.kind;
    let profiles: Vec<_> = ToolchainKind::ALL
        .iter()
        .map(|kind| {
            // The active entry shows overrides; the others show built-ins
            if *kind == active {
                config.profile.clone()
            } else {
                kind.builtin_profile()
            }
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let doc = json!({ "active": active, "profiles": profiles });
            println!("{}", serde_json::to_string_pretty(&doc).unwrap_or_default());
        }
        OutputFormat::Text => {
            for profile in &profiles {
                let marker = if profile.kind == active { "*" } else { " " };
                println!("{} {:<6} ({})", marker, profile.kind.name(), profile.kind.vendor());
                println!("    compiler: {} {}", profile.compiler, profile.compiler_flags.join(" "));
                match profile.link_command() {
                    Some(link) => println!("    linker:   {}", link),
                    None => println!("    linker:   (none)"),
                }
            }
        }
    }
    Ok(())
}
