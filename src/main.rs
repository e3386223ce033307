// Vibe-Forge: Main Entry Point
// Command-line driver for the studio pipeline

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use vibe_forge_lib::agents::ErrorCategory;
use vibe_forge_lib::settings::{default_memory_dir, settings_path};
use vibe_forge_lib::{
    FileMap, MemoryStore, Plan, ProgressEvent, QualityScorer, Studio, StudioRequest, StudioSettings, ValidationMode,
    Validator,
};

/// Extensions read from and written back to an artifact directory
const SOURCE_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "css", "json", "html"];

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_help();
        return;
    }

    let result = match args[1].as_str() {
        "--help" | "-h" => {
            print_help();
            Ok(())
        }
        "--version" | "-v" => {
            print_version();
            Ok(())
        }
        "generate" => generate(&args[2..]).await,
        "validate" => validate_file(&args[2..]),
        "score" => score_file(&args[2..]),
        "patterns" => list_patterns(&args[2..]),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_help();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

fn print_help() {
    println!(
        r#"
Vibe-Forge: AI App Studio
=========================

USAGE:
    vibe-forge [COMMAND] [OPTIONS]

COMMANDS:
    generate <dir> <request...>   Plan and write (or modify) the app in <dir>
    validate <file>               Run the validator over one file
    score <file>                  Quality-score a plan (.json) or a code file
    patterns [category]           List learned bug patterns

OPTIONS:
    -h, --help                    Print this help message
    -v, --version                 Print version information

Settings are read from {}.
Set RUST_LOG=debug for detailed logs.
"#,
        settings_path().display()
    );
}

fn print_version() {
    println!("Vibe-Forge v{}", env!("CARGO_PKG_VERSION"));
}

fn open_memory(settings: &StudioSettings) -> anyhow::Result<MemoryStore> {
    let mut pipeline = settings.pipeline.clone();
    if pipeline.memory_dir.is_none() {
        pipeline.memory_dir = Some(default_memory_dir());
    }
    pipeline.open_memory()
}

async fn generate(args: &[String]) -> anyhow::Result<()> {
    if args.len() < 2 {
        anyhow::bail!("Usage: vibe-forge generate <dir> <request...>");
    }
    let dir = PathBuf::from(&args[0]);
    let message = args[1..].join(" ");

    let settings = StudioSettings::load_or_default(&settings_path());
    let memory = open_memory(&settings)?;
    let agents = settings.build_agents()?;
    let summarizer = settings.build_model(&settings.agent_config.summarizer)?;

    let studio = Studio::builder(summarizer, memory)
        .agents(agents)
        .pipeline(settings.pipeline.clone())
        .progress(Arc::new(|event: ProgressEvent| {
            println!("[{}] {}: {}", event.orchestrator, event.phase, event.message);
        }))
        .build();

    let files = read_artifact(&dir)?;
    println!("🚀 {} ({} existing file(s))", message, files.len());

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let outcome = studio.handle(StudioRequest::new(message, files), &cancel).await?;
    write_artifact(&dir, &outcome.code.operations)?;

    for op in outcome.operations() {
        println!("✅ {} {}", op.kind.as_str(), op.filename);
    }
    for failure in &outcome.code.failures {
        println!("❌ {}: {}", failure.filename, failure.error);
    }
    if !outcome.is_success() {
        std::process::exit(2);
    }
    Ok(())
}

fn validate_file(args: &[String]) -> anyhow::Result<()> {
    let path = args.first().ok_or_else(|| anyhow::anyhow!("Usage: vibe-forge validate <file>"))?;
    let code = std::fs::read_to_string(path)?;
    let filename = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.clone());

    let result = Validator::default().validate(&code, &filename, ValidationMode::Full);
    for error in &result.errors {
        println!("error: {}", error);
    }
    for warning in &result.warnings {
        println!("warning: {}", warning);
    }
    for fix in &result.fixes {
        println!("fixable: {}", fix);
    }

    if result.valid {
        println!("✅ {} is valid", filename);
        Ok(())
    } else {
        anyhow::bail!("{} has {} error(s)", filename, result.errors.len())
    }
}

fn score_file(args: &[String]) -> anyhow::Result<()> {
    let path = args.first().ok_or_else(|| anyhow::anyhow!("Usage: vibe-forge score <file>"))?;
    let content = std::fs::read_to_string(path)?;
    let scorer = QualityScorer::default();

    let score = if path.ends_with(".json") {
        let plan: Plan = serde_json::from_str(&content)?;
        scorer.score_plan(&plan)
    } else {
        scorer.score_code(&content)
    };

    println!("Score: {:.2} ({})", score.score, if score.passed { "passed" } else { "below threshold" });
    for suggestion in &score.suggestions {
        println!("  - {}", suggestion);
    }
    Ok(())
}

fn list_patterns(args: &[String]) -> anyhow::Result<()> {
    let settings = StudioSettings::load_or_default(&settings_path());
    let memory = open_memory(&settings)?;

    let patterns = match args.first() {
        Some(name) => {
            let category = ErrorCategory::from_name(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown error category: {}", name))?;
            memory.patterns_for(category, usize::MAX)
        }
        None => memory.recent_patterns(usize::MAX),
    };

    if patterns.is_empty() {
        println!("No learned bug patterns yet");
    }
    for pattern in patterns {
        println!(
            "{} [{}] {}\n    fix: {}",
            pattern.timestamp.format("%Y-%m-%d %H:%M"),
            pattern.category,
            pattern.pattern,
            pattern.fix
        );
    }
    Ok(())
}

fn read_artifact(dir: &Path) -> anyhow::Result<FileMap> {
    let mut files = BTreeMap::new();
    if !dir.exists() {
        return Ok(files);
    }
    collect_sources(dir, dir, &mut files)?;
    Ok(files)
}

fn collect_sources(root: &Path, dir: &Path, files: &mut FileMap) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        if name.starts_with('.') || name == "node_modules" {
            continue;
        }
        if path.is_dir() {
            collect_sources(root, &path, files)?;
            continue;
        }
        let is_source = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SOURCE_EXTENSIONS.contains(&e))
            .unwrap_or(false);
        if is_source {
            let relative = path.strip_prefix(root)?.to_string_lossy().replace('\\', "/");
            files.insert(relative, std::fs::read_to_string(&path)?);
        }
    }
    Ok(())
}

fn write_artifact(dir: &Path, operations: &[vibe_forge_lib::FileOperation]) -> anyhow::Result<()> {
    for op in operations {
        let path = dir.join(&op.filename);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &op.content)?;
    }
    Ok(())
}
