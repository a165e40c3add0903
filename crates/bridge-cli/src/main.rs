use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};

use bridge_config::{BridgeConfig, CommandPolicyTable, ConfigLoader};
use bridge_core::engine::{self, Reporter, RuntimeOptions};
use bridge_guard::command_guard::{self, PolicyDecision};
use bridge_lock::BridgePaths;
use bridge_state::BridgeStateStore;
use bridge_types::{VisionId, VisionStatus};

#[derive(Parser, Debug)]
#[command(name = "bridge", version, long_version = concat!(
    env!("CARGO_PKG_VERSION"), " (", env!("BRIDGE_GIT_SHA"), ", ",
    env!("BRIDGE_BUILD_PROFILE"), ", ", env!("BRIDGE_RUSTC_VERSION"), ")"
))]
#[command(about = "Agent-orchestration convergence engine: sprint, review, converge, finalize")]
struct Cli {
    /// Project root the bridge operates against (defaults to the current directory)
    #[arg(long, global = true, default_value = ".")]
    project_root: PathBuf,

    /// Path to a YAML config document (missing file silently falls back to defaults)
    #[arg(long, global = true, default_value = "bridge.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a brand-new bridge run from JACK_IN through to JACKED_OUT or HALTED.
    JackIn {
        /// Number of iterations to attempt before forcing convergence (1-5)
        #[arg(long, default_value_t = 3)]
        depth: u8,
        #[arg(long, default_value_t = 1)]
        per_sprint: u32,
        #[arg(long, default_value = "default")]
        model: String,
        #[arg(long, default_value = "")]
        review_system_prompt: String,
        #[arg(long, default_value = "")]
        review_user_prompt: String,
        #[arg(long, default_value = "iteration")]
        review_type: String,
        #[arg(long, default_value = "30s")]
        per_pass_timeout: String,
        #[arg(long, default_value = "HEAD")]
        base_ref: String,
        #[arg(long)]
        job_id: Option<String>,
        #[arg(long)]
        cross_repo: bool,
        #[arg(long)]
        lore_scan: bool,
        #[arg(long)]
        github_trail: bool,
        #[arg(long)]
        vision_sprint: bool,
        #[arg(long)]
        research: bool,
        #[arg(long)]
        inquiry: bool,
        /// Model adapter program invoked for each review pass
        #[arg(long, default_value = "bridge-model-adapter")]
        adapter: String,
    },
    /// Resume a HALTED, ITERATING, or EXPLORING bridge from where it left off.
    Resume {
        #[arg(long, default_value = "default")]
        model: String,
        #[arg(long, default_value = "")]
        review_system_prompt: String,
        #[arg(long, default_value = "")]
        review_user_prompt: String,
        #[arg(long, default_value = "iteration")]
        review_type: String,
        #[arg(long, default_value = "30s")]
        per_pass_timeout: String,
        #[arg(long, default_value = "HEAD")]
        base_ref: String,
        #[arg(long, default_value = "bridge-model-adapter")]
        adapter: String,
    },
    /// Record an interrupt (used by the SIGINT/SIGTERM handler) and exit.
    Interrupt,
    /// Run the read-only health and environment diagnostics sweep.
    Doctor {
        #[arg(long)]
        json: bool,
    },
    /// Inspect or mutate the persisted bridge state document.
    State {
        #[command(subcommand)]
        cmd: StateCommands,
    },
    /// Inspect the vision registry.
    Vision {
        #[command(subcommand)]
        cmd: VisionCommands,
    },
    /// Evaluate a shell command against the destructive-command guard.
    Guard {
        command: String,
        #[arg(long)]
        bypass: bool,
    },
    /// Emit a shell-completion script for the given shell.
    Completions { shell: Shell },
}

#[derive(Subcommand, Debug)]
enum StateCommands {
    /// Print the value at a dot-path, e.g. `metrics.sprints_executed`.
    Get { field: String },
    /// Overwrite the value at a dot-path (type-preserving scalar parse).
    Set { field: String, value: String },
    /// Re-hash every recorded artifact and report drift.
    ValidateArtifacts,
    /// Remove the state file and its backup.
    Cleanup,
}

#[derive(Subcommand, Debug)]
enum VisionCommands {
    /// List every row in the vision index.
    List,
    /// Advance a vision's status (must be a legal DAG transition).
    SetStatus { id: String, status: String },
    /// Record a reference to a vision from a given bridge ID.
    Reference { id: String, bridge_id: String },
}

struct CliReporter;

impl Reporter for CliReporter {
    fn info(&mut self, msg: &str) {
        eprintln!("[info] {msg}");
    }

    fn warn(&mut self, msg: &str) {
        eprintln!("[warn] {msg}");
    }

    fn error(&mut self, msg: &str) {
        eprintln!("[error] {msg}");
    }
}

fn load_config(path: &PathBuf) -> Result<BridgeConfig> {
    let loader = ConfigLoader::load(path).with_context(|| format!("loading {}", path.display()))?;
    BridgeConfig::from_loader(&loader)
}

fn install_interrupt_handler(paths: BridgePaths, config: BridgeConfig) -> Result<()> {
    ctrlc::set_handler(move || {
        if let Err(e) = engine::interrupt(&paths, &config) {
            eprintln!("[error] failed to save interrupt state: {e}");
        }
        std::process::exit(1);
    })
    .context("installing SIGINT/SIGTERM handler")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = BridgePaths::new(&cli.project_root);
    let startup_config = load_config(&cli.config).unwrap_or_default();
    install_interrupt_handler(paths.clone(), startup_config)?;

    let mut reporter = CliReporter;

    match cli.cmd {
        Commands::JackIn {
            depth,
            per_sprint,
            model,
            review_system_prompt,
            review_user_prompt,
            review_type,
            per_pass_timeout,
            base_ref,
            job_id,
            cross_repo,
            lore_scan,
            github_trail,
            vision_sprint,
            research,
            inquiry,
            adapter,
        } => {
            let config = load_config(&cli.config)?;
            let opts = RuntimeOptions {
                depth,
                per_sprint,
                model,
                review_system_prompt,
                review_user_prompt,
                review_type,
                per_pass_timeout: parse_duration(&per_pass_timeout)?,
                base_ref,
                job_id,
                cross_repo_enabled: cross_repo,
                lore_scan_enabled: lore_scan,
                github_trail_enabled: github_trail,
                vision_sprint_enabled: vision_sprint,
                research_enabled: research,
                inquiry_enabled: inquiry,
            };
            let model_adapter = bridge_adapter::ProcessModelAdapter::new(adapter);
            let mut dispatcher = bridge_core::NullDispatcher;
            let doc = engine::run(&paths, &opts, &config, &model_adapter, &mut dispatcher, &mut reporter)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        Commands::Resume { model, review_system_prompt, review_user_prompt, review_type, per_pass_timeout, base_ref, adapter } => {
            let config = load_config(&cli.config)?;
            let opts = RuntimeOptions {
                model,
                review_system_prompt,
                review_user_prompt,
                review_type,
                per_pass_timeout: parse_duration(&per_pass_timeout)?,
                base_ref,
                ..RuntimeOptions::default()
            };
            let model_adapter = bridge_adapter::ProcessModelAdapter::new(adapter);
            let mut dispatcher = bridge_core::NullDispatcher;
            let doc = engine::run_resume(&paths, &opts, &config, &model_adapter, &mut dispatcher, &mut reporter)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        Commands::Interrupt => {
            let config = load_config(&cli.config)?;
            engine::interrupt(&paths, &config).map_err(|e| anyhow::anyhow!("{e}"))?;
        }
        Commands::Doctor { json } => {
            let report = bridge_doctor::run(&paths);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.human_readable());
            }
            std::process::exit(report.exit_code);
        }
        Commands::State { cmd } => {
            let config = load_config(&cli.config)?;
            run_state(&paths, &config, cmd)?;
        }
        Commands::Vision { cmd } => run_vision(&paths, cmd)?,
        Commands::Guard { command, bypass } => run_guard(&paths, &command, bypass)?,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
        }
    }

    Ok(())
}

fn parse_duration(raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw).with_context(|| format!("parsing duration {raw:?}"))
}

fn run_state(paths: &BridgePaths, config: &BridgeConfig, cmd: StateCommands) -> Result<()> {
    let mut store = BridgeStateStore::new(paths.state_dir(), paths.project_root());
    if let Ok(enc) = bridge_encrypt::StateEncryption::new(config.encryption.clone()) {
        store = store.with_encryption(enc);
    }
    match cmd {
        StateCommands::Get { field } => match store.get(&field)? {
            Some(v) => println!("{v}"),
            None => bail!("no bridge state found (or field {field:?} absent)"),
        },
        StateCommands::Set { field, value } => store.set(&field, &value)?,
        StateCommands::ValidateArtifacts => {
            let report = store.validate_artifacts()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        StateCommands::Cleanup => store.cleanup()?,
    }
    Ok(())
}

fn run_vision(paths: &BridgePaths, cmd: VisionCommands) -> Result<()> {
    let registry = bridge_vision::Registry::new(
        paths.vision_dir(),
        paths.vision_index(),
        paths.lore_file(),
        paths.lock_dir(),
    );
    match cmd {
        VisionCommands::List => {
            let index_path = paths.vision_index();
            if !index_path.exists() {
                println!("(no visions captured yet)");
                return Ok(());
            }
            let text = std::fs::read_to_string(&index_path)?;
            let table = bridge_vision::IndexTable::parse(&text)?;
            for row in &table.rows {
                println!("{} | {} | {} | {}", row.id, row.title, row.status, row.tags);
            }
        }
        VisionCommands::SetStatus { id, status } => {
            let vid = VisionId::parse(id)?;
            let next = parse_vision_status(&status)?;
            registry.update_status(&vid, next)?;
        }
        VisionCommands::Reference { id, bridge_id } => {
            let vid = VisionId::parse(id)?;
            let elevated = registry.record_reference(&vid, &bridge_id, chrono::Utc::now())?;
            if elevated {
                println!("lore-elevation signal: vision-elevated-{vid} written");
            }
        }
    }
    Ok(())
}

fn parse_vision_status(raw: &str) -> Result<VisionStatus> {
    match raw {
        "Captured" => Ok(VisionStatus::Captured),
        "Exploring" => Ok(VisionStatus::Exploring),
        "Proposed" => Ok(VisionStatus::Proposed),
        "Implemented" => Ok(VisionStatus::Implemented),
        "Deferred" => Ok(VisionStatus::Deferred),
        other => bail!("unrecognized vision status {other:?}"),
    }
}

fn run_guard(paths: &BridgePaths, command: &str, bypass: bool) -> Result<()> {
    let policy_path = paths.project_root().join("bridge-command-policy.json");
    let policy: CommandPolicyTable = if policy_path.exists() {
        serde_json::from_str(&std::fs::read_to_string(&policy_path)?)?
    } else {
        CommandPolicyTable::default()
    };
    let autonomous = command_guard::is_autonomous_mode();
    let verdict = command_guard::evaluate(command, &policy, autonomous, bypass);
    command_guard::audit_log(&paths.lock_dir().join("audit"), command, &verdict)?;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    if verdict.decision == PolicyDecision::Block {
        std::process::exit(1);
    }
    Ok(())
}
