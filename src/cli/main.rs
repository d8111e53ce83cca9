// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * ATLAS - Adaptive Security Reconnaissance Agent
 * Standalone CLI for bounded Reason -> Act -> Observe runs
 *
 * Features:
 * - Deterministic observational tool allowlist (no exploit payloads)
 * - Schema-constrained LLM reasoning with retry and fallback
 * - Priority-scored candidate frontier with per-path hit caps
 * - OWASP-tagged findings and a structured JSON trace per run
 *
 * (c) 2026 Bountyy Oy
 */

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, Level};

use atlas_agent::config::AgentConfig;
use atlas_agent::engine;

/// ATLAS - Adaptive Security Reconnaissance Agent
#[derive(Parser)]
#[command(name = "atlas")]
#[command(author = "Bountyy Oy <info@bountyy.fi>")]
#[command(version = "0.3.0")]
#[command(about = "Bounded reconnaissance agent for one allowlisted target.", long_about = None)]
struct Cli {
    /// Target URL (the allowlisted origin)
    #[arg(short, long, env = "TARGET_URL")]
    target: Option<String>,

    /// HTTP request budget for the run
    #[arg(long, env = "MAX_REQ_PER_RUN")]
    max_requests: Option<u32>,

    /// Reasoning-loop cap
    #[arg(long, env = "MAX_HOPS")]
    max_hops: Option<u32>,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "REQ_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Directory for trace artifacts
    #[arg(long, env = "TRACE_DIR")]
    trace_dir: Option<PathBuf>,

    /// Milliseconds to wait for the target to become ready
    #[arg(long, env = "WAIT_FOR_TARGET_MS")]
    wait_for_target_ms: Option<u64>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - only show errors
    #[arg(short, long)]
    quiet: bool,
}

fn print_banner(config: &AgentConfig) {
    println!();
    println!("\x1b[36m================================================================\x1b[0m");
    println!("\x1b[36m  ATLAS - Adaptive Security Reconnaissance Agent\x1b[0m");
    println!("\x1b[36m================================================================\x1b[0m");
    println!("  Target:   {}", config.target_url);
    println!(
        "  Budget:   {} requests / {} hops",
        config.max_requests, config.max_hops
    );
    println!(
        "  Cortex:   {}",
        if config.has_llm_credential() {
            config.model.as_str()
        } else {
            "stub (no OPENAI_API_KEY)"
        }
    );
    println!("\x1b[36m================================================================\x1b[0m");
    println!();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("atlas-agent")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut config = AgentConfig::from_env()?;
    if let Some(target) = cli.target {
        config.target_url = target;
    }
    if let Some(max_requests) = cli.max_requests {
        config.max_requests = max_requests;
    }
    if let Some(max_hops) = cli.max_hops {
        config.max_hops = max_hops;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.request_timeout_ms = timeout_ms;
    }
    if let Some(trace_dir) = cli.trace_dir {
        config.trace_dir = trace_dir;
    }
    if let Some(wait_ms) = cli.wait_for_target_ms {
        config.wait_for_target_ms = wait_ms;
    }

    if !cli.quiet {
        print_banner(&config);
    }

    match engine::run_once(&config).await {
        Ok(summary) => {
            if !cli.quiet {
                println!();
                println!("  Run:        {}", summary.run_id);
                println!("  Findings:   {}", summary.findings_count);
                println!(
                    "  Requests:   {} (budget {})",
                    summary.requests_used, config.max_requests
                );
                println!("  Hops:       {}", summary.hops);
                println!("  Stopped:    {}", summary.stop_reason.as_str());
                println!("  Trace:      {}", summary.trace_path.display());
                println!();
            }
            Ok(())
        }
        Err(e) => {
            error!("Run failed before a trace could be written: {:#}", e);
            std::process::exit(1);
        }
    }
}
