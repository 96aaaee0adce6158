#![forbid(unsafe_code)]

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crosscap_lib::config::{validate, MatchConfig};
use crosscap_lib::ingest::{
    read_client_hello_records_from_path, read_packets_from_path, read_trailer_records_from_path,
};
use crosscap_lib::matching::serialize::save_matches;
use crosscap_lib::matching::{AuxiliaryTables, BucketStrategy, MatchMode, MatchStats};
use crosscap_lib::roles::{refine_roles, RoleDetector, ServiceList};
use crosscap_lib::topology::{load_service_groups, ServiceKey, TopologyAnalyzer};
use crosscap_lib::{build_connections, CancelToken, MatchEngine, Result};

#[derive(Parser, Debug)]
#[command(author, version, about = "Correlate TCP connections across two capture points")]
struct Cli {
    /// Decoded packet table for capture point A (TSV)
    capture_a: PathBuf,

    /// Decoded packet table for capture point B (TSV)
    capture_b: PathBuf,

    /// Vendor-trailer table for capture point A (TSV)
    #[arg(long, value_name = "FILE")]
    trailer_a: Option<PathBuf>,

    /// Vendor-trailer table for capture point B (TSV)
    #[arg(long, value_name = "FILE")]
    trailer_b: Option<PathBuf>,

    /// TLS Client Hello table for capture point A (TSV)
    #[arg(long, value_name = "FILE")]
    tls_a: Option<PathBuf>,

    /// TLS Client Hello table for capture point B (TSV)
    #[arg(long, value_name = "FILE")]
    tls_b: Option<PathBuf>,

    /// Configuration TOML file; flags below override its values
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bucketing strategy: auto, server, port, none
    #[arg(long)]
    strategy: Option<BucketStrategy>,

    /// Minimum normalized score for a valid match
    #[arg(long)]
    threshold: Option<f64>,

    /// Matching mode: one-to-one, one-to-many
    #[arg(long)]
    match_mode: Option<MatchMode>,

    /// Fold flows sharing a 5-tuple into one connection
    #[arg(long)]
    merge_five_tuple: bool,

    /// Enable time-stratified sampling of oversized inputs
    #[arg(long)]
    enable_sampling: bool,

    /// Connection count above which sampling kicks in
    #[arg(long)]
    sample_threshold: Option<usize>,

    /// Fraction of connections kept when sampling
    #[arg(long)]
    sample_rate: Option<f64>,

    /// Known-service list (IP or IP:PORT per line)
    #[arg(long, value_name = "FILE")]
    service_list: Option<PathBuf>,

    /// Service-to-group mapping, a JSON object of "port" to group id
    #[arg(long, value_name = "FILE")]
    service_groups: Option<PathBuf>,

    /// Write matches to this JSON file
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print the per-service topology summary
    #[arg(long)]
    topology: bool,
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "run failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;

    let packets_a = read_packets_from_path(&cli.capture_a)?;
    let packets_b = read_packets_from_path(&cli.capture_b)?;
    info!(
        packets_a = packets_a.len(),
        packets_b = packets_b.len(),
        "decoded packet tables"
    );

    let group_mode = config.group_mode();
    let connections_a = build_connections(packets_a, group_mode);
    let connections_b = build_connections(packets_b, group_mode);
    info!(
        connections_a = connections_a.len(),
        connections_b = connections_b.len(),
        "built connection summaries"
    );

    let service_list = match &cli.service_list {
        Some(path) => Some(ServiceList::load_from_path(path)?),
        None => None,
    };

    let mut detector = match service_list.clone() {
        Some(list) => RoleDetector::with_service_list(list),
        None => RoleDetector::new(),
    };
    for conn in connections_a.iter().chain(connections_b.iter()) {
        detector.collect_connection(conn);
    }
    detector.finalize_cardinality();

    let connections_a = refine_roles(connections_a, &detector);
    let connections_b = refine_roles(connections_b, &detector);

    let mut aux = AuxiliaryTables::default();
    if let Some(path) = &cli.trailer_a {
        aux.trailer_a = read_trailer_records_from_path(path)?;
    }
    if let Some(path) = &cli.trailer_b {
        aux.trailer_b = read_trailer_records_from_path(path)?;
    }
    if let Some(path) = &cli.tls_a {
        aux.tls_a = read_client_hello_records_from_path(path)?;
    }
    if let Some(path) = &cli.tls_b {
        aux.tls_b = read_client_hello_records_from_path(path)?;
    }

    let engine = MatchEngine::from_config(&config);
    let cancel = CancelToken::new();
    let matches = engine.run(connections_a.clone(), connections_b.clone(), &aux, &cancel);

    let stats = MatchStats::collect(&connections_a, &connections_b, &matches);
    info!(
        matched = stats.matched_pairs,
        unmatched_a = stats.unmatched_a,
        unmatched_b = stats.unmatched_b,
        average_score = stats.average_score,
        "matching finished"
    );

    if let Some(output) = &cli.output {
        if matches.is_empty() {
            // Never truncate a previous result file with an empty run.
            warn!(path = %output.display(), "no matches found; skipping output write");
        } else {
            save_matches(
                &matches,
                output,
                &cli.capture_a.display().to_string(),
                &cli.capture_b.display().to_string(),
                serde_json::Map::new(),
            )?;
        }
    }

    if cli.topology {
        let service_groups = match &cli.service_groups {
            Some(path) => Some(load_service_groups(path)?),
            None => None,
        };

        let mut analyzer = TopologyAnalyzer::new(
            matches,
            &cli.capture_a.display().to_string(),
            &cli.capture_b.display().to_string(),
        );
        if let Some(list) = service_list {
            analyzer = analyzer.with_service_list(list);
        }
        let topology = analyzer.analyze();
        print_topology(&topology, service_groups.as_ref());
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<MatchConfig> {
    let mut config = match &cli.config {
        Some(path) => crosscap_lib::load_from_path(path)?,
        None => MatchConfig::default(),
    };

    if let Some(strategy) = cli.strategy {
        config.bucket_strategy = strategy;
    }
    if let Some(threshold) = cli.threshold {
        config.score_threshold = threshold;
    }
    if let Some(mode) = cli.match_mode {
        config.match_mode = mode;
    }
    if cli.merge_five_tuple {
        config.merge_five_tuple = true;
    }
    if cli.enable_sampling {
        config.sampling.enabled = true;
    }
    if let Some(threshold) = cli.sample_threshold {
        config.sampling.threshold = threshold;
    }
    if let Some(rate) = cli.sample_rate {
        config.sampling.rate = rate;
    }

    validate(&config)?;
    Ok(config)
}

fn print_topology(
    topology: &crosscap_lib::TopologyInfo,
    service_groups: Option<&ahash::AHashMap<ServiceKey, u32>>,
) {
    println!("Capture Point A: {}", topology.file_a);
    println!("Capture Point B: {}", topology.file_b);
    for (idx, service) in topology.services.iter().enumerate() {
        let group = service_groups
            .and_then(|groups| groups.get(&service.key))
            .map(|id| format!(", group {id}"))
            .unwrap_or_default();
        println!(
            "Service {}: port {} (proto {}) - {} connections, position {:?}{group}",
            idx + 1,
            service.key.server_port,
            service.key.protocol,
            service.connection_count,
            service.position,
        );
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
