//! Process-wide mutable state (§5): `output_version`, `max_sparse`, and the
//! four default sketch parameters. The reference implementation keeps
//! these as bare C statics (`g_output_version`, `g_max_sparse`,
//! `g_default_*`); per the design notes (§9) this crate hangs the same
//! knobs off one explicit `Config` struct behind a single process-wide
//! `OnceLock<Mutex<_>>` instead, so an embedder that wants per-session
//! isolation can construct and thread its own `Config` through the
//! `_with_config` entry points rather than touching the global at all.

use std::sync::{Mutex, OnceLock};

use crate::error::HllError;
use crate::settings::Settings;

pub const SUPPORTED_OUTPUT_VERSION: u8 = 1;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub output_version: u8,
    pub max_sparse: i64,
    pub defaults: Settings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_version: SUPPORTED_OUTPUT_VERSION,
            max_sparse: -1,
            // log_2m=11, reg_width=5, expthresh=auto, sparseon=true: the
            // reference implementation's DEFAULT_LOG2M/DEFAULT_REGWIDTH/
            // DEFAULT_EXPTHRESH/DEFAULT_SPARSEON.
            defaults: Settings::new(11, 5, -1, true).expect("default settings are always valid"),
        }
    }
}

impl Config {
    pub fn set_output_version(&mut self, version: u8) -> Result<(), HllError> {
        if version != SUPPORTED_OUTPUT_VERSION {
            return Err(HllError::invalid(format!(
                "unsupported output version {version}, only {SUPPORTED_OUTPUT_VERSION} is supported"
            )));
        }
        self.output_version = version;
        Ok(())
    }

    pub fn set_max_sparse(&mut self, n: i64) -> Result<(), HllError> {
        if n < -1 {
            return Err(HllError::invalid("max_sparse must be >= -1"));
        }
        self.max_sparse = n;
        Ok(())
    }

    pub fn set_defaults(
        &mut self,
        log_2m: u32,
        reg_width: u32,
        expthresh: i64,
        sparseon: bool,
    ) -> Result<(), HllError> {
        self.defaults = Settings::new(log_2m, reg_width, expthresh, sparseon)?;
        Ok(())
    }
}

fn cell() -> &'static Mutex<Config> {
    static CELL: OnceLock<Mutex<Config>> = OnceLock::new();
    CELL.get_or_init(|| Mutex::new(Config::default()))
}

/// A snapshot of the process-wide configuration.
pub fn global() -> Config {
    cell().lock().expect("config mutex poisoned").clone()
}

pub fn set_output_version(version: u8) -> Result<(), HllError> {
    cell()
        .lock()
        .expect("config mutex poisoned")
        .set_output_version(version)
}

pub fn set_max_sparse(n: i64) -> Result<(), HllError> {
    cell()
        .lock()
        .expect("config mutex poisoned")
        .set_max_sparse(n)
}

pub fn set_defaults(
    log_2m: u32,
    reg_width: u32,
    expthresh: i64,
    sparseon: bool,
) -> Result<(), HllError> {
    cell()
        .lock()
        .expect("config mutex poisoned")
        .set_defaults(log_2m, reg_width, expthresh, sparseon)
}
