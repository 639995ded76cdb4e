//! Command execution for the UndertowKV shell.
//!
//! The binary in `main.rs` is a thin stdin loop; everything it does goes
//! through [`Shell::exec`], which integration tests drive directly.

use anyhow::{bail, Result};
use engine::Index;
use stmt::row::encode_row;
use stmt::UpdateOp;

/// One interactive session over an [`Index`].
pub struct Shell {
    index: Index,
}

impl Shell {
    pub fn new(index: Index) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Executes a single command line and returns the text to print.
    ///
    /// ```text
    /// SET key value            Insert or overwrite a row
    /// DEL key                  Write a tombstone
    /// UPSERT key default delta Deferred counter update (integers)
    /// DUMP                     Dump the memory level to a run
    /// COMPACT                  Merge all runs into one
    /// STATS                    Print index debug info
    /// ```
    pub fn exec(&mut self, line: &str) -> Result<String> {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else {
            return Ok(String::new());
        };
        let args: Vec<&str> = parts.collect();

        match (cmd.to_ascii_uppercase().as_str(), args.as_slice()) {
            ("SET", [key, value]) => {
                self.index
                    .replace(key.as_bytes().to_vec(), encode_row(&[value.as_bytes()]))?;
                Ok("OK".to_string())
            }
            ("DEL", [key]) => {
                self.index.delete(key.as_bytes().to_vec())?;
                Ok("OK".to_string())
            }
            ("UPSERT", [key, default, delta]) => {
                let default: i64 = default.parse()?;
                let delta: i64 = delta.parse()?;
                self.index.upsert(
                    key.as_bytes().to_vec(),
                    encode_row(&[&stmt::row::int_field(default)]),
                    vec![UpdateOp::Add { field: 0, delta }],
                )?;
                Ok("OK".to_string())
            }
            ("DUMP", []) => {
                let horizon = self.index.version();
                match self.index.dump(horizon)? {
                    Some(run) => Ok(format!("dumped {} statements", run.entry_count())),
                    None => Ok("nothing to dump".to_string()),
                }
            }
            ("COMPACT", []) => {
                let horizon = self.index.version();
                self.index.compact(horizon)?;
                Ok(format!("{} runs", self.index.run_count()))
            }
            ("STATS", []) => Ok(format!("{:?}", self.index)),
            (cmd, _) => bail!("unknown or malformed command: {}", cmd),
        }
    }
}
