//! # CLI — UndertowKV Interactive Shell
//!
//! A REPL-style command-line interface for the UndertowKV write path. Reads
//! commands from stdin, executes them against the index, and prints results
//! to stdout. Designed for both interactive use and scripted testing (pipe
//! commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! SET key value            Insert or overwrite a row
//! DEL key                  Write a tombstone
//! UPSERT key default delta Deferred counter update (integers)
//! DUMP                     Dump the memory level to a run
//! COMPACT                  Merge all runs into one
//! STATS                    Print index debug info
//! EXIT / QUIT              Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! UNDERTOW_DIR          Data directory               (default: "data")
//! UNDERTOW_DUMP_KB      Dump threshold in KiB        (default: 1024)
//! UNDERTOW_RUN_TRIGGER  Compaction trigger           (default: 4, 0 = off)
//! ```

use anyhow::Result;
use cli::Shell;
use engine::Index;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use stmt::{BytewiseKeys, RowApplier};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let dir = env_or("UNDERTOW_DIR", "data");
    let dump_kb: usize = env_or("UNDERTOW_DUMP_KB", "1024").parse().unwrap_or(1024);
    let run_trigger: usize = env_or("UNDERTOW_RUN_TRIGGER", "4").parse().unwrap_or(4);

    let mut index = Index::open(
        &dir,
        Arc::new(BytewiseKeys),
        Arc::new(RowApplier),
        true,
        0,
    )?;
    index.set_dump_threshold(dump_kb * 1024);
    index.set_run_compaction_trigger(run_trigger);

    println!(
        "UndertowKV started (version={}, dir={}, dump={}KiB, run_trigger={})",
        index.version(),
        dir,
        dump_kb,
        run_trigger
    );

    let mut shell = Shell::new(index);
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            println!("bye");
            break;
        }

        match shell.exec(line) {
            Ok(out) => {
                if !out.is_empty() {
                    println!("{out}");
                }
            }
            Err(e) => println!("ERR {e}"),
        }
    }
    Ok(())
}
