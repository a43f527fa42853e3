use std::io::{self, Write};

use clap::Parser;
use env_logger::Env;
use log::{
    Record, info,
    kv::{self, Key, Value, VisitSource},
};
use tokio::signal;

use worker::{Args, launcher};

/// Collects a record's structured fields as ` key=value` pairs.
struct Fields(String);

impl<'kvs> VisitSource<'kvs> for Fields {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), kv::Error> {
        self.0.push_str(&format!(" {key}={value}"));
        Ok(())
    }
}

fn fields(record: &Record) -> String {
    let mut fields = Fields(String::new());
    // Visiting into a string never fails.
    let _ = record.key_values().visit(&mut fields);
    fields.0
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let args = Args::parse();
    let spawn = args.spawn;

    let prefix = if spawn {
        "launcher".to_string()
    } else {
        format!("rank {}", args.local_rank)
    };

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(move |buf, record| {
            writeln!(
                buf,
                "[{prefix}] {} {}{}",
                record.level(),
                record.args(),
                fields(record)
            )
        })
        .init();

    let config = args.into_config()?;

    tokio::select! {
        ret = async {
            if spawn {
                launcher::spawn_ranks(&config).await
            } else {
                worker::run(config.clone()).await.map(|_| ())
            }
        } => {
            ret?;
            info!("wrapping up");
        }
        _ = signal::ctrl_c() => {
            info!("received SIGINT");
        }
    }

    Ok(())
}
