// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod flash;
mod planner;
mod server;
mod views;

use anyhow::{Context, Result};
use coach_app::DEFAULT_OWNER;
use coach_db::Store;
use coach_llm::{Generator, TextGenerator};
use config::Config;
use flash::FlashSigner;
use server::{App, Clock};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    init_tracing();
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `coach --print-example-config` to generate a v1 template",
            options.config_path.display()
        )
    })?;

    let db_path = config.db_path()?;
    if options.print_db_path {
        println!("{}", db_path.display());
        return Ok(());
    }

    let store = Store::open(&db_path).with_context(|| {
        format!(
            "open database {} -- if this path is wrong, set [storage].db_path or COACH_DB_PATH",
            db_path.display()
        )
    })?;
    store
        .ensure_ready()
        .with_context(|| format!("prepare database {}", db_path.display()))?;
    store.close()?;

    let generator = Generator::from_config(&config.ai_config()?).with_context(|| {
        format!(
            "invalid [ai] config in {}; fix base_url/model/timeout values",
            options.config_path.display()
        )
    })?;
    if !generator.is_configured() {
        warn!(
            env = config.api_key_env(),
            "no API key found; AI suggestions fall back to templates"
        );
    }

    let secret = config.session_secret();
    if secret.is_none() {
        warn!(
            env = config.secret_env(),
            "no session secret set; notices will not survive a restart"
        );
    }
    let signer = FlashSigner::from_secret(secret.as_deref());

    if options.check_only {
        info!(db = %db_path.display(), "configuration ok");
        return Ok(());
    }

    let listen = options
        .listen
        .unwrap_or_else(|| config.listen().to_owned());
    let app = App::new(
        db_path,
        DEFAULT_OWNER,
        Box::new(generator),
        signer,
        Clock::System,
    );
    server::serve(&app, &listen)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    listen: Option<String>,
    print_config_path: bool,
    print_db_path: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        listen: None,
        print_config_path: false,
        print_db_path: false,
        print_example: false,
        check_only: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--listen" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--listen requires a host:port address"))?;
                options.listen = Some(value.as_ref().to_owned());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow::anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("coach");
    println!("  --config <path>          Use a specific config path");
    println!("  --listen <host:port>     Override [server].listen");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path");
    println!("  --print-example-config   Print a v1 config template");
    println!("  --check                  Validate config + DB + AI settings, then exit");
    println!("  --help                   Show this help");
}
