// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Depthscape CLI - reconstruct a closed 3D scene from one image.
//!
//! Usage:
//!   depthscape <image_path> [options]

use anyhow::{bail, Context, Result};
use depthscape_service::{
    DepthSource, GenerationRequest, HeuristicDepthSource, HttpDepthSource, JobStatus,
    JsonMeshExporter, LogFormat, Orchestrator, ServiceConfig,
};
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct CliArgs {
    image_path: String,
    request: GenerationRequest,
    depth_url: Option<String>,
    output_path: String,
}

fn parse_args(args: &[String]) -> Result<Option<CliArgs>> {
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        return Ok(None);
    }

    let mut cli = CliArgs {
        image_path: args[1].clone(),
        request: GenerationRequest::default(),
        depth_url: None,
        output_path: String::from("scene.json"),
    };

    let mut i = 2;
    while i < args.len() {
        let value = |i: usize| -> Result<&String> {
            args.get(i + 1)
                .with_context(|| format!("Missing value for {}", args[i]))
        };
        match args[i].as_str() {
            "--complexity" => {
                cli.request.room_complexity = value(i)?.clone();
                i += 1;
            }
            "--wall-thickness" => {
                cli.request.wall_thickness = value(i)?
                    .parse()
                    .context("Invalid wall thickness value")?;
                i += 1;
            }
            "--no-hallucinate" => {
                cli.request.hallucinate_unseen = false;
            }
            "--no-interiors" => {
                cli.request.generate_interiors = false;
            }
            "--depth-url" => {
                cli.depth_url = Some(value(i)?.clone());
                i += 1;
            }
            "--output" => {
                cli.output_path = value(i)?.clone();
                i += 1;
            }
            other => bail!("Unknown option: {}", other),
        }
        i += 1;
    }
    Ok(Some(cli))
}

fn init_logging(format: LogFormat) {
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| "info,depthscape_service=debug".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = ServiceConfig::from_env();
    init_logging(config.log_format);

    let args: Vec<String> = env::args().collect();
    let cli = match parse_args(&args) {
        Ok(Some(cli)) => cli,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            print_usage();
            std::process::exit(1);
        }
    };

    if cli.depth_url.is_some() {
        config.depth_service_url = cli.depth_url.clone();
    }
    if !config.export_formats.iter().any(|f| f == "json") {
        config.export_formats.push("json".into());
    }

    tracing::info!(
        worker_threads = config.worker_threads,
        working_resolution = config.working_resolution,
        depth_service = config.depth_service_url.as_deref().unwrap_or("heuristic"),
        "Starting Depthscape"
    );

    // Initialize rayon thread pool
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_threads)
        .build_global()
        .context("Failed to initialize rayon thread pool")?;

    let depth: Arc<dyn DepthSource> = match &config.depth_service_url {
        Some(url) => Arc::new(HttpDepthSource::new(url, config.depth_timeout())),
        None => Arc::new(HeuristicDepthSource),
    };
    let orchestrator = Orchestrator::start(config, depth, Some(Arc::new(JsonMeshExporter)));

    let bytes = tokio::fs::read(&cli.image_path)
        .await
        .with_context(|| format!("Cannot read image '{}'", cli.image_path))?;

    let start = Instant::now();
    let job_id = orchestrator.submit(&bytes)?;
    orchestrator.enqueue(job_id, &cli.request)?;
    println!("Job {} queued", job_id);

    let mut last_step = String::new();
    let snapshot = loop {
        let snapshot = orchestrator.status(job_id)?;
        if snapshot.current_step != last_step {
            println!("[{:>3}%] {}", snapshot.progress, snapshot.current_step);
            last_step = snapshot.current_step.clone();
        }
        if snapshot.status.is_terminal() {
            break snapshot;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };

    if snapshot.status == JobStatus::Failed {
        let detail = snapshot
            .error
            .map(|e| format!("{} (recoverable: {})", e.message, e.recoverable))
            .unwrap_or_else(|| "unknown error".into());
        bail!("Job {} failed: {}", job_id, detail);
    }

    let mesh = orchestrator.result(job_id)?;
    let artifact = orchestrator.artifact(job_id, "json")?;
    tokio::fs::write(&cli.output_path, artifact.as_slice())
        .await
        .with_context(|| format!("Cannot write '{}'", cli.output_path))?;

    println!();
    println!("=== Done in {:.2}s ===", start.elapsed().as_secs_f64());
    if let Some(category) = snapshot.scene_category {
        println!(
            "  Scene: {}{}",
            category,
            if snapshot.low_confidence_reconstruction {
                " (low confidence)"
            } else {
                ""
            }
        );
    }
    println!(
        "  Mesh: {} vertices, {} triangles ({} synthetic)",
        mesh.mesh.vertex_count(),
        mesh.mesh.triangle_count(),
        mesh.synthetic_triangle_count()
    );
    println!(
        "  Loops: {} closed, {} open, watertight: {}",
        mesh.closed_loops.len(),
        mesh.open_loops.len(),
        mesh.is_watertight()
    );
    println!("  Output: {}", cli.output_path);
    Ok(())
}

fn print_usage() {
    println!("Depthscape - single image to closed 3D scene");
    println!();
    println!("Usage: depthscape <image_path> [options]");
    println!();
    println!("Options:");
    println!("  --complexity <low|medium|high>  Room complexity (default: medium)");
    println!("  --wall-thickness <F>            Back wall offset beyond the deepest surface (default: 0.3)");
    println!("  --no-hallucinate                Keep only the visible surface");
    println!("  --no-interiors                  Close the scene without interior elements");
    println!("  --depth-url <URL>               Remote depth service (default: local heuristic)");
    println!("  --output <PATH>                 Output JSON mesh (default: scene.json)");
    println!();
    println!("Environment:");
    println!("  WORKER_THREADS, DEPTH_TIMEOUT_SECS, WORKING_RESOLUTION, RUST_LOG, LOG_FORMAT, ...");
}
