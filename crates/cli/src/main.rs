use std::io::{self, Write};

use anyhow::{Context, bail};
use simdecide_cli::app::{self, ServeOptions};

const USAGE: &str = "usage: simdecide [serve | domains | scenarios <domain>]";

enum Command {
    Serve,
    Domains,
    Scenarios(String),
}

fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    Ok(match args {
        [] => Command::Serve,
        [cmd] if cmd == "serve" => Command::Serve,
        [cmd] if cmd == "domains" => Command::Domains,
        [cmd, domain] if cmd == "scenarios" => Command::Scenarios(domain.clone()),
        _ => bail!(USAGE),
    })
}

fn main() -> anyhow::Result<()> {
    simdecide_observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    let config = app::load_config()?;
    tracing::info!(seed = config.seed, records = config.record_count, "training domain models");
    let engine = app::build_engine(config)?;

    let stdout = io::stdout();
    match command {
        Command::Serve => {
            let options = ServeOptions::from_env()?;
            app::serve(&engine, io::stdin().lock(), stdout.lock(), options)?;
        }
        Command::Domains => {
            let mut out = stdout.lock();
            for domain in engine.domains() {
                writeln!(out, "{domain}")?;
            }
        }
        Command::Scenarios(domain) => {
            let scenarios = engine
                .scenarios(&domain)
                .with_context(|| format!("cannot list scenarios of {domain}"))?;
            let mut out = stdout.lock();
            serde_json::to_writer_pretty(&mut out, &scenarios)?;
            writeln!(out)?;
        }
    }
    Ok(())
}
