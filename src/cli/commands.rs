use crate::classify::Classifier;
use crate::cli::error::{
    parse_status_code, user_error, validate_from_stage, validate_pair_id, validate_stage_number,
    validate_workers,
};
use crate::cli::output::{format_drain_report, format_pair_list_table, format_pair_summary};
use crate::config::Config;
use crate::dispatch::{CommandBackend, DispatchError, Dispatcher};
use crate::filter::{filter_pairs_by_type, search_pairs, PairFilter};
use crate::lifecycle::{StatusMachine, TransitionError};
use crate::models::{JobPair, StageMetrics, StatusCode};
use crate::paths::PathResolver;
use crate::processing::{PostProcessor, ProcessingPool};
use crate::store::{PairStore, SqliteStore};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

#[derive(Parser)]
#[command(name = "jobline")]
#[command(about = "Job pair tracking - pipeline status, post-processing and result review for solver jobs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show one pair with all of its stages
    Show {
        #[arg(value_parser = validate_pair_id)]
        pair: i64,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// List the pairs of a job
    List {
        job: i64,
        /// Stage to report (primary stage by default)
        #[arg(long, value_parser = validate_stage_number)]
        stage: Option<i64>,
        /// Result filter: all, incomplete, resource, failed, complete, solved, wrong, unknown
        #[arg(long = "type", default_value = "all")]
        filter_type: String,
        /// Case-insensitive search over benchmark, solver, configuration, status code and result
        #[arg(long)]
        search: Option<String>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Set the status of one stage
    SetStatus {
        #[arg(value_parser = validate_pair_id)]
        pair: i64,
        #[arg(value_parser = validate_stage_number)]
        stage: i64,
        /// Status code (0-22) or description
        #[arg(value_parser = parse_status_code)]
        status: StatusCode,
    },
    /// Set the status of a stage and every later stage (-1 for all stages)
    SetLater {
        #[arg(value_parser = validate_pair_id)]
        pair: i64,
        #[arg(value_parser = validate_from_stage, allow_negative_numbers = true)]
        from_stage: i64,
        #[arg(value_parser = parse_status_code)]
        status: StatusCode,
    },
    /// Stop a pair on the backend and mark all of its stages killed
    Kill {
        #[arg(value_parser = validate_pair_id)]
        pair: i64,
    },
    /// Submit a pending pair to the backend
    Submit {
        #[arg(value_parser = validate_pair_id)]
        pair: i64,
    },
    /// Post-process every stage waiting for it
    Process {
        #[arg(long, default_value = "1", value_parser = validate_workers)]
        workers: usize,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Post-process one stage with a given processor
    ProcessPair {
        #[arg(value_parser = validate_pair_id)]
        pair: i64,
        #[arg(value_parser = validate_stage_number)]
        stage: i64,
        processor: i64,
    },
    /// Put a stage back in the post-processing queue
    Requeue {
        #[arg(value_parser = validate_pair_id)]
        pair: i64,
        #[arg(value_parser = validate_stage_number)]
        stage: i64,
    },
    /// Print where a pair's output (or log) lives
    Path {
        #[arg(value_parser = validate_pair_id)]
        pair: i64,
        /// Output file of one stage instead of the pair directory
        #[arg(long, value_parser = validate_stage_number, conflicts_with = "log")]
        stage: Option<i64>,
        /// Execution log instead of output
        #[arg(long)]
        log: bool,
    },
    /// Print a stage's output
    Stdout {
        #[arg(value_parser = validate_pair_id)]
        pair: i64,
        #[arg(value_parser = validate_stage_number)]
        stage: i64,
        /// Only the first N lines
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print a pair's execution log
    Log {
        #[arg(value_parser = validate_pair_id)]
        pair: i64,
    },
    /// Record the resource usage reported for one stage
    RecordMetrics {
        #[arg(value_parser = validate_pair_id)]
        pair: i64,
        #[arg(value_parser = validate_stage_number)]
        stage: i64,
        /// Wall-clock seconds
        #[arg(long, default_value_t = 0.0)]
        wallclock: f64,
        /// CPU seconds
        #[arg(long, default_value_t = 0.0)]
        cpu: f64,
        #[arg(long, default_value_t = 0.0)]
        user_time: f64,
        #[arg(long, default_value_t = 0.0)]
        system_time: f64,
        /// Peak virtual memory
        #[arg(long, default_value_t = 0.0)]
        max_vmem: f64,
        /// Peak resident set size
        #[arg(long, default_value_t = 0.0)]
        max_res_set: f64,
    },
}

pub fn run() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // Prints help/version and exits 0, or prints the usage error and exits 2
        Err(e) => e.exit(),
    };

    let config = Config::load()?;
    let store = SqliteStore::open(&config).context("Failed to open database")?;
    handle_command(cli, &config, &store)
}

fn handle_command(cli: Cli, config: &Config, store: &SqliteStore) -> Result<()> {
    match cli.command {
        Commands::Show { pair, json } => handle_show(store, config, pair, json),
        Commands::List { job, stage, filter_type, search, json } => {
            handle_list(store, config, job, stage, &filter_type, search.as_deref(), json)
        }
        Commands::SetStatus { pair, stage, status } => handle_set_status(store, pair, stage, status),
        Commands::SetLater { pair, from_stage, status } => {
            handle_set_later(store, pair, from_stage, status)
        }
        Commands::Kill { pair } => handle_kill(store, config, pair),
        Commands::Submit { pair } => handle_submit(store, config, pair),
        Commands::Process { workers, json } => handle_process(store, config, workers, json),
        Commands::ProcessPair { pair, stage, processor } => {
            handle_process_pair(store, config, pair, stage, processor)
        }
        Commands::Requeue { pair, stage } => handle_requeue(store, pair, stage),
        Commands::Path { pair, stage, log } => handle_path(store, config, pair, stage, log),
        Commands::Stdout { pair, stage, limit } => handle_stdout(store, config, pair, stage, limit),
        Commands::Log { pair } => handle_log(store, config, pair),
        Commands::RecordMetrics {
            pair,
            stage,
            wallclock,
            cpu,
            user_time,
            system_time,
            max_vmem,
            max_res_set,
        } => {
            let metrics = StageMetrics { wallclock, cpu, user_time, system_time, max_vmem, max_res_set };
            handle_record_metrics(store, pair, stage, &metrics)
        }
    }
}

fn load_pair(store: &SqliteStore, pair_id: i64) -> Result<JobPair> {
    store
        .get_pair(pair_id)
        .with_context(|| format!("Failed to load pair {}", pair_id))?
        .ok_or_else(|| user_error(format!("Pair {} not found", pair_id)))
}

fn handle_show(store: &SqliteStore, config: &Config, pair_id: i64, json: bool) -> Result<()> {
    let pair = store
        .get_pair_detailed(pair_id)
        .with_context(|| format!("Failed to load pair {}", pair_id))?
        .ok_or_else(|| user_error(format!("Pair {} not found", pair_id)))?;
    let classifier = Classifier::new(config.result_keys.clone());

    if json {
        let correctness: Vec<_> = pair
            .stages
            .iter()
            .map(|stage| json!({
                "stage_number": stage.stage_number,
                "correctness": classifier.classify(stage),
            }))
            .collect();
        let out = json!({
            "pair": pair,
            "correctness": correctness,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print!("{}", format_pair_summary(&pair, &classifier));
    }
    Ok(())
}

fn handle_list(
    store: &SqliteStore,
    config: &Config,
    job_id: i64,
    stage: Option<i64>,
    filter_type: &str,
    search: Option<&str>,
    json: bool,
) -> Result<()> {
    let filter: PairFilter = filter_type.parse().map_err(|e| user_error(format!("{}", e)))?;
    let classifier = Classifier::new(config.result_keys.clone());

    let pairs = store
        .list_pairs_for_job(job_id)
        .with_context(|| format!("Failed to list pairs of job {}", job_id))?;
    let pairs = filter_pairs_by_type(pairs, filter, stage, &classifier);
    let pairs = match search {
        Some(query) => search_pairs(pairs, query, stage, &classifier),
        None => pairs,
    };

    if json {
        let rows: Vec<_> = pairs
            .iter()
            .map(|pair| {
                let selected = match stage {
                    Some(n) => pair.stage(n),
                    None => pair.primary_stage(),
                };
                json!({
                    "id": pair.id,
                    "benchmark": pair.bench.name,
                    "stage_number": selected.map(|s| s.stage_number),
                    "solver": selected.map(|s| s.solver.name.clone()),
                    "configuration": selected.map(|s| s.configuration.name.clone()),
                    "status_code": selected.map(|s| s.status.code.code()).unwrap_or(pair.status.code.code()),
                    "result": selected.and_then(|s| s.attribute(&classifier.keys().result)),
                    "correctness": selected.map(|s| classifier.classify(s)),
                    "wallclock": selected.map(|s| s.metrics.wallclock),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print!("{}", format_pair_list_table(&pairs, stage, &classifier));
    }
    Ok(())
}

fn handle_set_status(store: &SqliteStore, pair_id: i64, stage: i64, status: StatusCode) -> Result<()> {
    match StatusMachine::new(store).try_set_status(pair_id, stage, status) {
        Ok(()) => {
            println!("Pair {} stage {} is now {}", pair_id, stage, status);
            Ok(())
        }
        Err(TransitionError::Store(e)) => {
            Err(e.context(format!("Failed to set status of pair {} stage {}", pair_id, stage)))
        }
        Err(e) => Err(user_error(e.to_string())),
    }
}

fn handle_set_later(store: &SqliteStore, pair_id: i64, from_stage: i64, status: StatusCode) -> Result<()> {
    let pair = load_pair(store, pair_id)?;
    if !pair.stages.iter().any(|s| from_stage == -1 || s.stage_number >= from_stage) {
        return Err(user_error(format!(
            "Pair {} has no stages from {} on",
            pair_id, from_stage
        )));
    }
    if !StatusMachine::new(store).set_all_later_statuses(pair_id, from_stage, status) {
        anyhow::bail!("Failed to update stages of pair {}", pair_id);
    }
    if from_stage == -1 {
        println!("Pair {}: all stages set to {}", pair_id, status);
    } else {
        println!("Pair {}: stages {} and later set to {}", pair_id, from_stage, status);
    }
    Ok(())
}

fn handle_kill(store: &SqliteStore, config: &Config, pair_id: i64) -> Result<()> {
    let pair = load_pair(store, pair_id)?;
    let backend = CommandBackend::from_config(config);
    let dispatcher = Dispatcher::new(store, &backend, config);
    if !StatusMachine::new(store).kill_pair(&dispatcher, pair_id, pair.backend_handle) {
        anyhow::bail!("Failed to mark pair {} killed", pair_id);
    }
    println!("Killed pair {}", pair_id);
    Ok(())
}

fn handle_submit(store: &SqliteStore, config: &Config, pair_id: i64) -> Result<()> {
    let pair = store
        .get_pair_detailed(pair_id)
        .with_context(|| format!("Failed to load pair {}", pair_id))?
        .ok_or_else(|| user_error(format!("Pair {} not found", pair_id)))?;
    let backend = CommandBackend::from_config(config);
    match Dispatcher::new(store, &backend, config).submit(&pair) {
        Ok(handle) => {
            println!("Submitted pair {} (backend handle {})", pair_id, handle);
            Ok(())
        }
        Err(DispatchError::Internal(e)) => {
            Err(e.context(format!("Failed to submit pair {}", pair_id)))
        }
        Err(e) => Err(user_error(e.to_string())),
    }
}

fn handle_process(store: &SqliteStore, config: &Config, workers: usize, json: bool) -> Result<()> {
    let report = ProcessingPool::new(store, config, workers).drain()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", format_drain_report(&report));
    }
    Ok(())
}

fn handle_process_pair(
    store: &SqliteStore,
    config: &Config,
    pair_id: i64,
    stage: i64,
    processor_id: i64,
) -> Result<()> {
    load_pair(store, pair_id)?;
    let machine = StatusMachine::new(store);
    if !machine.claim_for_processing(pair_id, stage) {
        return Err(user_error(format!(
            "Pair {} stage {} is not awaiting post-processing",
            pair_id, stage
        )));
    }

    match PostProcessor::new(store, config).process(pair_id, stage, processor_id) {
        Ok(attributes) => {
            let mut keys: Vec<&String> = attributes.keys().collect();
            keys.sort();
            for key in keys {
                println!("{}={}", key, attributes[key]);
            }
            Ok(())
        }
        Err(e) => {
            machine.requeue_for_processing(pair_id, stage);
            Err(user_error(format!(
                "Post-processing pair {} stage {} failed: {}",
                pair_id, stage, e
            )))
        }
    }
}

fn handle_requeue(store: &SqliteStore, pair_id: i64, stage: i64) -> Result<()> {
    load_pair(store, pair_id)?;
    if !StatusMachine::new(store).requeue_for_processing(pair_id, stage) {
        return Err(user_error(format!(
            "Pair {} stage {} cannot be requeued for processing",
            pair_id, stage
        )));
    }
    println!("Requeued pair {} stage {} for processing", pair_id, stage);
    Ok(())
}

fn handle_path(
    store: &SqliteStore,
    config: &Config,
    pair_id: i64,
    stage: Option<i64>,
    log: bool,
) -> Result<()> {
    let pair = load_pair(store, pair_id)?;
    let paths = PathResolver::from_config(config);
    let path = if log {
        paths.log_path(&pair)?
    } else if let Some(stage) = stage {
        paths.stage_output_path(&pair, stage)?
    } else {
        paths.pair_path(&pair)?
    };
    println!("{}", path.display());
    Ok(())
}

fn handle_stdout(
    store: &SqliteStore,
    config: &Config,
    pair_id: i64,
    stage: i64,
    limit: Option<usize>,
) -> Result<()> {
    let pair = load_pair(store, pair_id)?;
    if pair.stage(stage).is_none() {
        return Err(user_error(format!("Pair {} has no stage {}", pair_id, stage)));
    }
    match PathResolver::from_config(config).read_stdout(&pair, stage, limit)? {
        Some(text) => {
            print!("{}", text);
            Ok(())
        }
        None => Err(user_error(format!(
            "No output recorded for pair {} stage {}",
            pair_id, stage
        ))),
    }
}

fn handle_log(store: &SqliteStore, config: &Config, pair_id: i64) -> Result<()> {
    let pair = load_pair(store, pair_id)?;
    match PathResolver::from_config(config).read_job_log(&pair)? {
        Some(text) => {
            print!("{}", text);
            Ok(())
        }
        None => Err(user_error(format!("No log recorded for pair {}", pair_id))),
    }
}

fn handle_record_metrics(
    store: &SqliteStore,
    pair_id: i64,
    stage: i64,
    metrics: &StageMetrics,
) -> Result<()> {
    let pair = load_pair(store, pair_id)?;
    if pair.stage(stage).is_none() {
        return Err(user_error(format!("Pair {} has no stage {}", pair_id, stage)));
    }
    store
        .record_stage_metrics(pair_id, stage, metrics)
        .with_context(|| format!("Failed to record metrics of pair {} stage {}", pair_id, stage))?;
    println!("Recorded metrics for pair {} stage {}", pair_id, stage);
    Ok(())
}
