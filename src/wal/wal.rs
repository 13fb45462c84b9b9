use anyhow::{bail, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// WAL operation types
#[derive(Debug, Clone, PartialEq)]
pub enum WalOperation {
    CreateUser {
        id: u64,
        username: String,
        password_hash: String,
    },
    /// Full progression snapshot of one account after a mutation
    UpdateUser {
        id: u64,
        coins: u64,
        equipment_level: u32,
        resets: u32,
        reset_bonus_multiplier: f64,
    },
}

impl WalOperation {
    fn to_line(&self) -> String {
        match self {
            WalOperation::CreateUser {
                id,
                username,
                password_hash,
            } => {
                // Usernames are free text, so hex them to keep the '|' separator safe
                format!(
                    "CREATE|{}|{}|{}",
                    id,
                    hex::encode(username.as_bytes()),
                    password_hash
                )
            }
            WalOperation::UpdateUser {
                id,
                coins,
                equipment_level,
                resets,
                reset_bonus_multiplier,
            } => {
                // `{:?}` on f64 round-trips exactly
                format!(
                    "UPDATE|{}|{}|{}|{}|{:?}",
                    id, coins, equipment_level, resets, reset_bonus_multiplier
                )
            }
        }
    }

    fn from_line(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split('|').collect();

        match parts.first() {
            Some(&"CREATE") => {
                if parts.len() != 4 {
                    bail!("Invalid CREATE format");
                }
                let id = parts[1].parse::<u64>().context("Invalid user ID")?;
                let username_bytes = hex::decode(parts[2]).context("Invalid username hex")?;
                let username =
                    String::from_utf8(username_bytes).context("Username is not valid UTF-8")?;
                if parts[3].is_empty() {
                    bail!("Missing password hash");
                }

                Ok(WalOperation::CreateUser {
                    id,
                    username,
                    password_hash: parts[3].to_string(),
                })
            }
            Some(&"UPDATE") => {
                if parts.len() != 6 {
                    bail!("Invalid UPDATE format");
                }
                let id = parts[1].parse::<u64>().context("Invalid user ID")?;
                let coins = parts[2].parse::<u64>().context("Invalid coins")?;
                let equipment_level = parts[3].parse::<u32>().context("Invalid equipment level")?;
                let resets = parts[4].parse::<u32>().context("Invalid resets")?;
                let reset_bonus_multiplier = parts[5]
                    .parse::<f64>()
                    .context("Invalid reset bonus multiplier")?;

                if equipment_level == 0 {
                    bail!("equipment_level must be at least 1");
                }
                if !reset_bonus_multiplier.is_finite() || reset_bonus_multiplier < 1.0 {
                    bail!("reset_bonus_multiplier must be finite and at least 1.0");
                }

                Ok(WalOperation::UpdateUser {
                    id,
                    coins,
                    equipment_level,
                    resets,
                    reset_bonus_multiplier,
                })
            }
            _ => bail!("Unknown operation type"),
        }
    }
}

/// Append-only log of user record operations
pub struct Wal {
    file: Mutex<File>,
    path: PathBuf,
}

impl Wal {
    pub fn new(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open WAL file")?;

        Ok(Wal {
            file: Mutex::new(file),
            path,
        })
    }

    fn lock_file(&self) -> MutexGuard<'_, File> {
        // The guarded File carries no invariant a panicking writer could break
        self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn log_operation(&self, op: &WalOperation) -> Result<()> {
        let line = op.to_line();
        let mut file = self.lock_file();
        writeln!(file, "{}", line).context("Failed to write to WAL")?;
        file.flush().context("Failed to flush WAL")?;
        Ok(())
    }

    pub fn replay(&self) -> Result<Vec<WalOperation>> {
        let file = File::open(&self.path).context("Failed to open WAL for replay")?;
        let reader = BufReader::new(file);
        let mut operations = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.context("Failed to read line from WAL")?;
            let line = line.trim();

            // Skip empty lines
            if line.is_empty() {
                continue;
            }

            match WalOperation::from_line(line) {
                Ok(op) => operations.push(op),
                Err(e) => {
                    tracing::warn!(
                        line_num = line_num + 1,
                        error = %e,
                        "Failed to parse WAL line, skipping"
                    );
                }
            }
        }

        Ok(operations)
    }

    /// Replace the log with `operations`, written to a sibling file and
    /// renamed over the live log so a crash mid-write keeps the old log.
    pub fn compact(&self, operations: &[WalOperation]) -> Result<()> {
        let mut file = self.lock_file();

        let tmp_path = self.path.with_extension("compact");
        {
            let tmp = File::create(&tmp_path).context("Failed to create compacted WAL")?;
            let mut writer = BufWriter::new(tmp);
            for op in operations {
                writeln!(writer, "{}", op.to_line()).context("Failed to write compacted WAL")?;
            }
            writer.flush().context("Failed to flush compacted WAL")?;
            writer
                .get_ref()
                .sync_all()
                .context("Failed to sync compacted WAL")?;
        }

        fs::rename(&tmp_path, &self.path).context("Failed to replace WAL with compacted log")?;

        *file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .context("Failed to reopen WAL after compaction")?;

        Ok(())
    }
}
