use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use advance_api::config::{load_config, ApiConfig, ScanConfig};
use advance_api::observability::init_logging;
use advance_api::scanner::{Pipeline, ScanResult, Scanner};
use advance_api::script::ScriptRuntime;

#[derive(Parser)]
#[command(name = "api-cli")]
#[command(about = "Inspect router scripts and a running Advance API server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run discovery locally and print what would be mounted
    Scan {
        #[arg(short, long)]
        config: PathBuf,

        /// Directory relative scan paths are resolved against
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Load and validate a configuration file
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List routes mounted by a running server
    Routes {
        #[arg(short, long, default_value = "http://localhost:3000/api")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { config, root, json } => {
            let config = load_config(&config)?;
            init_logging(&config.observability);
            let root = match root {
                Some(root) => root,
                None => std::env::current_dir()?,
            };
            let report = scan_all(&config, root).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Check { config } => {
            let config = load_config(&config)?;
            let scans = config.router_scan.iter().count() + config.modules.len();
            println!("Configuration OK ({} scan(s), prefix {})", scans, config.prefix);
        }
        Commands::Routes { url } => {
            let res = reqwest::Client::new()
                .get(format!("{}/routes", url.trim_end_matches('/')))
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

fn describe(label: Option<&str>, base: &str, result: &ScanResult) -> Value {
    let routes: Vec<Value> = result
        .routes()
        .iter()
        .map(|r| {
            json!({
                "method": r.method.as_str(),
                "path": r.path,
                "description": r.description,
                "source": r.provenance.source_file().display().to_string(),
            })
        })
        .collect();
    let issues: Vec<String> = result.issues().iter().map(|i| i.to_string()).collect();

    json!({
        "label": label,
        "base": base,
        "stats": result.stats(),
        "routes": routes,
        "issues": issues,
    })
}

async fn scan_one(
    pipeline: &Pipeline,
    root: PathBuf,
    label: Option<&str>,
    base: &str,
    scan: &ScanConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut scanner = Scanner::new(pipeline.clone(), root);
    if let Some(label) = label {
        scanner = scanner.with_label(label);
    }
    let result = scanner.scan(scan).await?;
    Ok(describe(label, base, &result))
}

async fn scan_all(config: &ApiConfig, root: PathBuf) -> Result<Vec<Value>, Box<dyn std::error::Error>> {
    let runtime = ScriptRuntime::new(&config.compiler);
    let pipeline = Pipeline::new(&runtime, &config.compiler);

    let mut report = Vec::new();
    if let Some(router_scan) = &config.router_scan {
        let root = router_scan.root.clone().unwrap_or_else(|| root.clone());
        report.push(scan_one(&pipeline, root, None, "", &router_scan.scan).await?);
    }
    for module in &config.modules {
        let root = module.root.clone().unwrap_or_else(|| root.clone());
        report.push(scan_one(&pipeline, root, Some(&module.label), &module.base, &module.scan).await?);
    }
    Ok(report)
}

fn print_report(report: &[Value]) {
    for scan in report {
        let label = scan["label"].as_str().unwrap_or("router_scan");
        println!("== {} (base: {:?}) ==", label, scan["base"].as_str().unwrap_or(""));
        for route in scan["routes"].as_array().into_iter().flatten() {
            println!(
                "  {:7} {:30} {}",
                route["method"].as_str().unwrap_or(""),
                route["path"].as_str().unwrap_or(""),
                route["source"].as_str().unwrap_or("")
            );
        }
        for issue in scan["issues"].as_array().into_iter().flatten() {
            println!("  ! {}", issue.as_str().unwrap_or(""));
        }
        println!("  stats: {}", scan["stats"]);
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let body: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
