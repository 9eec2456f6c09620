//! `Leadgate` CLI, the admin client for a running `Leadgate` server.
//!
//! Talks exclusively to the server's HTTP API: reads bot-detection
//! statistics, exports the decision log as CSV, resets it, and checks health.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ── CLI structure ────────────────────────────────────────────────────

/// Leadgate: bot-detection telemetry for the signup form.
#[derive(Parser)]
#[command(
    name = "leadgate",
    version,
    about = "Leadgate CLI: inspect, export and reset bot-detection telemetry",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         LEADGATE_ADDR          Server address (default: http://127.0.0.1:3000)\n  \
         LEADGATE_ADMIN_TOKEN   Admin token sent as x-admin-token\n\n\
         {DIM}Examples:{RESET}\n  \
         leadgate health\n  \
         leadgate stats --config\n  \
         leadgate export --output logs.csv\n  \
         leadgate reset"
    ),
)]
struct Cli {
    /// Leadgate server address.
    #[arg(long, env = "LEADGATE_ADDR", default_value = "http://127.0.0.1:3000")]
    addr: String,

    /// Admin token.
    #[arg(long, env = "LEADGATE_ADMIN_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show server health and configured segments.
    Health,
    /// Show bot-detection statistics.
    Stats {
        /// Include the active admission configuration.
        #[arg(long, default_value = "false")]
        config: bool,
        /// Print the raw JSON response.
        #[arg(long, default_value = "false")]
        json: bool,
    },
    /// Export the decision log as CSV.
    Export {
        /// Write to this file instead of stdout.
        #[arg(long, short)]
        output: Option<String>,
    },
    /// Clear the decision log.
    Reset,
}

// ── Pretty output helpers ────────────────────────────────────────────

fn header(icon: &str, title: &str) {
    println!("{BOLD}{CYAN}{icon} {title}{RESET}");
    println!("{DIM}─────────────────────────────────────────{RESET}");
}

fn kv_line(key: &str, value: &str) {
    println!("  {DIM}{key:<20}{RESET} {WHITE}{value}{RESET}");
}

fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

fn print_json(value: &Value) {
    if value.is_null() {
        return;
    }
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to format JSON: {e}"),
    }
}

fn print_stats(resp: &Value) {
    let stats = &resp["stats"];
    let count = |key: &str| stats.get(key).and_then(Value::as_u64).unwrap_or(0);
    let rate = stats.get("rejection_rate").and_then(Value::as_f64).unwrap_or(0.0);

    header("🛡", "Bot Detection");
    kv_line("Total", &count("total").to_string());
    kv_line("Admitted", &format!("{GREEN}{}{RESET}", count("admitted_count")));
    kv_line("Rejected", &format!("{RED}{}{RESET}", count("rejected_count")));
    kv_line("Rejection rate", &format!("{rate:.2}%"));

    if let Some(breakdown) = stats.get("breakdown_by_reason").and_then(Value::as_object) {
        if !breakdown.is_empty() {
            println!();
            header("📊", "Rejections by reason");
            for (reason, n) in breakdown {
                kv_line(reason, &n.as_u64().unwrap_or(0).to_string());
            }
        }
    }

    if let Some(recent) = stats.get("recent").and_then(Value::as_array) {
        if !recent.is_empty() {
            println!();
            header("🕑", "Recent decisions");
            for record in recent.iter().rev().take(10) {
                let at = record.get("recorded_at").and_then(Value::as_str).unwrap_or("-");
                let verdict = match record.get("reason").and_then(Value::as_str) {
                    Some(reason) => format!("{YELLOW}{reason}{RESET}"),
                    None => format!("{GREEN}admitted{RESET}"),
                };
                kv_line(at, &verdict);
            }
        }
    }

    if let Some(config) = resp.get("config") {
        println!();
        header("⚙", "Admission config");
        print_json(config);
    }

    println!();
}

// ── HTTP client ──────────────────────────────────────────────────────

struct Client {
    http: reqwest::Client,
    addr: String,
    token: Option<String>,
}

impl Client {
    fn new(addr: String, token: Option<String>) -> Self {
        let http = reqwest::Client::new();
        let addr = addr.trim_end_matches('/').to_owned();
        Self { http, addr, token }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.addr)
    }

    fn admin_token(&self) -> Result<&str> {
        self.token.as_deref().ok_or_else(|| {
            anyhow::anyhow!("no admin token provided, set LEADGATE_ADMIN_TOKEN or use --token")
        })
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let resp = self
            .http
            .get(self.url(path))
            .header("x-admin-token", self.admin_token()?)
            .send()
            .await
            .context("request failed")?;
        read_success(resp).await
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let body = self.get_text(path).await?;
        parse_body(&body)
    }

    async fn get_no_auth(&self, path: &str) -> Result<Value> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .context("request failed")?;
        parse_body(&read_success(resp).await?)
    }

    async fn delete(&self, path: &str) -> Result<Value> {
        let resp = self
            .http
            .delete(self.url(path))
            .header("x-admin-token", self.admin_token()?)
            .send()
            .await
            .context("request failed")?;
        parse_body(&read_success(resp).await?)
    }
}

async fn read_success(resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    let body = resp.text().await.context("failed to read response body")?;
    if !status.is_success() {
        bail!("server returned {status}: {body}");
    }
    Ok(body)
}

fn parse_body(body: &str) -> Result<Value> {
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).context("failed to parse response JSON")
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let client = Client::new(cli.addr, cli.token);

    match run(client, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("  {RED}{BOLD}✗ Error:{RESET} {e:#}");
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

async fn run(client: Client, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Health => cmd_health(&client).await,
        Commands::Stats { config, json } => cmd_stats(&client, config, json).await,
        Commands::Export { output } => cmd_export(&client, output.as_deref()).await,
        Commands::Reset => cmd_reset(&client).await,
    }
}

async fn cmd_health(client: &Client) -> Result<()> {
    let resp = client.get_no_auth("/v1/sys/health").await?;
    header("💓", "Leadgate Health");
    kv_line("Status", resp.get("status").and_then(Value::as_str).unwrap_or("unknown"));
    kv_line("Version", resp.get("version").and_then(Value::as_str).unwrap_or("-"));
    if let Some(segments) = resp.get("segments").and_then(Value::as_array) {
        let names: Vec<&str> = segments.iter().filter_map(Value::as_str).collect();
        kv_line("Segments", &names.join(", "));
    }
    println!();
    Ok(())
}

async fn cmd_stats(client: &Client, include_config: bool, raw: bool) -> Result<()> {
    let path = if include_config {
        "/v1/bot-detection/stats?config=true"
    } else {
        "/v1/bot-detection/stats"
    };
    let resp = client.get(path).await?;
    if raw {
        print_json(&resp);
    } else {
        print_stats(&resp);
    }
    Ok(())
}

async fn cmd_export(client: &Client, output: Option<&str>) -> Result<()> {
    let csv = client.get_text("/v1/bot-detection/export").await?;
    match output {
        Some(path) => {
            tokio::fs::write(path, &csv)
                .await
                .with_context(|| format!("failed to write {path}"))?;
            let rows = csv.lines().count().saturating_sub(1);
            success(&format!("exported {rows} records to {path}"));
        }
        None => print!("{csv}"),
    }
    Ok(())
}

async fn cmd_reset(client: &Client) -> Result<()> {
    let resp = client.delete("/v1/bot-detection/stats").await?;
    let message = resp
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("bot detection logs cleared");
    success(message);
    Ok(())
}
