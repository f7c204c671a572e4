//! WalKV admin CLI: one command against a data directory, then close
//!
//! Usage:
//!   walkv-cli <data_dir> put <key> <value>
//!   walkv-cli <data_dir> get <key>
//!   walkv-cli <data_dir> delete <key>
//!   walkv-cli <data_dir> exists <key>
//!   walkv-cli <data_dir> keys
//!   walkv-cli <data_dir> stats
//!   walkv-cli <data_dir> checkpoint
//!   walkv-cli <data_dir> batch <isolation> <key=value>...

use anyhow::{bail, Context};
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use walkv_core::{logging, Engine, EngineConfig, IsolationLevel};

fn print_usage() {
    eprintln!(
        "Usage:\n  walkv-cli <data_dir> put <key> <value>\n  walkv-cli <data_dir> get <key>\n  \
         walkv-cli <data_dir> delete <key>\n  walkv-cli <data_dir> exists <key>\n  \
         walkv-cli <data_dir> keys\n  walkv-cli <data_dir> stats\n  walkv-cli <data_dir> checkpoint\n  \
         walkv-cli <data_dir> batch <isolation> <key=value>..."
    );
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(2);
    }

    let mut config = EngineConfig::from_env().context("loading configuration")?;
    config.data_dir = PathBuf::from(&args[0]);
    logging::init_tracing(&config.logging)?;

    let engine = Engine::open_with(config)
        .with_context(|| format!("opening data directory {}", args[0]))?;

    let command = args[1].as_str();
    let operands = &args[2..];
    match (command, operands) {
        ("put", [key, value]) => {
            engine.put(key, value.as_bytes())?;
        }
        ("get", [key]) => {
            let value = engine.get(key)?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(&value)?;
            stdout.write_all(b"\n")?;
        }
        ("delete", [key]) => {
            engine.delete(key)?;
        }
        ("exists", [key]) => {
            println!("{}", engine.exists(key)?);
        }
        ("keys", []) => {
            let mut keys = engine.keys()?;
            keys.sort();
            for key in keys {
                println!("{}", key);
            }
        }
        ("stats", []) => {
            println!("{}", serde_json::to_string_pretty(&engine.stats()?)?);
        }
        ("checkpoint", []) => {
            engine.checkpoint()?;
        }
        ("batch", [isolation, pairs @ ..]) if !pairs.is_empty() => {
            let isolation: IsolationLevel = isolation.parse().map_err(anyhow::Error::msg)?;
            let mut txn = engine.begin_transaction(isolation)?;
            for pair in pairs {
                let (key, value) = pair
                    .split_once('=')
                    .with_context(|| format!("expected key=value, got {}", pair))?;
                txn.put(key, value.as_bytes())?;
            }
            txn.commit()?;
            println!("committed {} ({} writes)", txn.id(), pairs.len());
        }
        _ => {
            print_usage();
            bail!("unknown command or wrong number of arguments: {}", command);
        }
    }

    engine.close()?;
    Ok(())
}
