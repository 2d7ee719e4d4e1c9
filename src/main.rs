use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use fincalc::api::{Cli, Command, calculate_from_json, run_http_server};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match cli.command {
        Command::Serve { bind, port } => run_http_server(bind, port)
            .await
            .context("server error"),
        Command::Calc { calculator, input } => {
            let json = read_input(&input)?;
            let result = calculate_from_json(&calculator, &json).map_err(|e| anyhow!(e))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

fn init_logging(level: Option<&str>) {
    let env = env_logger::Env::default().default_filter_or(level.unwrap_or("info"));
    env_logger::Builder::from_env(env).init();
}

fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut json = String::new();
        io::stdin()
            .read_to_string(&mut json)
            .context("failed to read request from stdin")?;
        return Ok(json);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read request file {path}"))
}
