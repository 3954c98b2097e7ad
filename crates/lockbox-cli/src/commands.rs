use anyhow::Context;
use colored::Colorize;
use lockbox_ops::{
    ConnectorConfig, MediaType, ObjectStoreConnector, StoreDescriptor, StoreOptions,
    StoreSettings, TypedValue,
};
use serde_json::json;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let connector = open_connector(&cli)?;
    let ops = connector.operations();
    let store = cli.store.as_deref();
    let json = matches!(cli.format, OutputFormat::Json);

    match cli.command {
        Command::Store(args) => {
            let value = TypedValue::new(args.value.into_bytes(), MediaType::new(args.media_type));
            let options = StoreOptions {
                fail_if_present: args.fail_if_present,
                ..StoreOptions::default()
            };
            ops.store(&args.key, Some(value), options, store)?;
            if json {
                println!("{}", json!({ "stored": args.key }));
            } else {
                println!("{} Stored {}", "✓".green().bold(), args.key.yellow());
            }
        }
        Command::Retrieve(args) => {
            let value = ops.retrieve(&args.key, args.default.map(TypedValue::text), store)?;
            print_value(&args.key, &value, json);
        }
        Command::Remove(args) => {
            let value = ops.remove(&args.key, store)?;
            if json {
                println!("{}", json!({ "removed": args.key, "value": render(&value) }));
            } else {
                println!("{} Removed {}", "✓".green().bold(), args.key.yellow());
            }
        }
        Command::Contains(args) => {
            let present = ops.contains(&args.key, store)?;
            if json {
                println!("{}", json!({ "key": args.key, "present": present }));
            } else if present {
                println!("{} {}", args.key.yellow(), "present".green());
            } else {
                println!("{} {}", args.key.yellow(), "absent".dimmed());
            }
        }
        Command::Clear => {
            ops.clear(store)?;
            if json {
                println!("{}", json!({ "cleared": store_label(store) }));
            } else {
                println!("{} Cleared {}", "✓".green().bold(), store_label(store).bold());
            }
        }
        Command::Keys => {
            let keys = ops.retrieve_all_keys(store)?;
            if json {
                println!("{}", serde_json::to_string(&keys)?);
            } else if keys.is_empty() {
                println!("{} is empty.", store_label(store).bold());
            } else {
                for key in keys {
                    println!("{key}");
                }
            }
        }
        Command::All => {
            let entries = ops.retrieve_all(store)?;
            if json {
                let map: serde_json::Map<_, _> = entries
                    .iter()
                    .map(|(k, v)| (k.clone(), render(v)))
                    .collect();
                println!("{}", serde_json::Value::Object(map));
            } else if entries.is_empty() {
                println!("{} is empty.", store_label(store).bold());
            } else {
                for (key, value) in &entries {
                    print_value(key, value, false);
                }
            }
        }
        Command::Sweep => {
            let report = ops.sweep(store)?;
            if json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!(
                    "{} Sweep: {} expired, {} over capacity",
                    "✓".green(),
                    report.expired.to_string().bold(),
                    report.overflow.to_string().bold()
                );
            }
        }
    }

    connector.shutdown()?;
    Ok(())
}

fn open_connector(cli: &Cli) -> anyhow::Result<ObjectStoreConnector> {
    let config = match &cli.config {
        Some(path) => {
            debug!(config = %path.display(), "loading connector config");
            ConnectorConfig::load(path)?
        }
        None => ConnectorConfig {
            data_dir: cli.data_dir.clone(),
            default_partition_persistent: true,
            ..ConnectorConfig::default()
        },
    };
    let connector = ObjectStoreConnector::new(config).context("cannot open stores")?;

    // Stores not declared in the config are opened as plain persistent stores.
    if let Some(name) = &cli.store {
        if connector.definition(name).is_none() {
            debug!(store = %name, "store not declared in config; opening it as a persistent store");
            connector
                .define(StoreDescriptor::top_level(name.clone(), StoreSettings::default()))
                .with_context(|| format!("cannot open store '{name}'"))?;
        }
    }
    Ok(connector)
}

fn store_label(store: Option<&str>) -> String {
    store.unwrap_or("default partition").to_string()
}

fn render(value: &TypedValue) -> serde_json::Value {
    let data = match value.as_text() {
        Some(text) => json!(text),
        None => json!(value.data()),
    };
    json!({ "media_type": value.media_type().as_str(), "data": data })
}

fn print_value(key: &str, value: &TypedValue, json: bool) {
    if json {
        println!("{}", json!({ "key": key, "value": render(value) }));
        return;
    }
    match value.as_text() {
        Some(text) => println!("{} = {} {}", key.yellow(), text, format!("({})", value.media_type()).dimmed()),
        None => println!(
            "{} = <{} bytes> {}",
            key.yellow(),
            value.len(),
            format!("({})", value.media_type()).dimmed()
        ),
    }
}
