//! This module records statistics about dexgen. The statistics are "best effort": counters are
//! updated under a lock that other threads may be contending, and nothing here is suitable for
//! precise benchmarking -- but it's better than nothing!

use parking_lot::Mutex;
#[cfg(not(test))]
use std::env;
use std::fs;

/// Record dexgen statistics if enabled. In non-testing mode, this is only enabled if the end user
/// defines the environment variable `DEXGEN_LOG_STATS`. In testing mode, this is always enabled,
/// with output being sent to `stderr`.
pub(crate) struct Stats {
    // On most runs we anticipate that the end user won't want to be recording statistics, so we
    // want the quickest possible check for "are any stats to be recorded?" The outer `Option`
    // makes that a simple null check: only if stats are to be recorded do we go to the expense of
    // locking a `Mutex`.
    inner: Option<Mutex<StatsInner>>,
}

struct StatsInner {
    /// The path to write output. If exactly equal to `-`, output will be written to stderr.
    output_path: String,
    /// How many methods were compiled successfully?
    methods_compiled_ok: u64,
    /// How many methods were compiled unsuccessfully with a fatal (internal) error?
    methods_compiled_err: u64,
    /// How many methods were handed back to the caller as unsupported?
    methods_fallback: u64,
    /// How many extra assembler passes did layout retries cost, summed over all methods?
    asm_retries: u64,
}

impl Stats {
    #[cfg(not(test))]
    pub(crate) fn new() -> Self {
        if let Ok(p) = env::var("DEXGEN_LOG_STATS") {
            Self {
                inner: Some(Mutex::new(StatsInner::new(p))),
            }
        } else {
            Self { inner: None }
        }
    }

    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self {
            inner: Some(Mutex::new(StatsInner::new("-".to_string()))),
        }
    }

    /// If `DEXGEN_LOG_STATS` was specified, update `inner` by running the function `f`, otherwise
    /// return immediately without calling `f`.
    fn update_with<F>(&self, f: F)
    where
        F: FnOnce(&mut StatsInner),
    {
        if let Some(mtx) = &self.inner {
            f(&mut mtx.lock());
        }
    }

    /// Increment the "a method has been compiled successfully" count.
    pub(crate) fn method_compiled_ok(&self) {
        self.update_with(|inner| inner.methods_compiled_ok += 1);
    }

    /// Increment the "a method's compilation failed with an internal error" count.
    pub(crate) fn method_compiled_err(&self) {
        self.update_with(|inner| inner.methods_compiled_err += 1);
    }

    /// Increment the "a method was rejected as unsupported" count.
    pub(crate) fn method_fallback(&self) {
        self.update_with(|inner| inner.methods_fallback += 1);
    }

    /// Add `n` assembler retry passes to the running total.
    pub(crate) fn asm_retries(&self, n: u64) {
        self.update_with(|inner| inner.asm_retries += n);
    }

    /// Output these statistics to the appropriate output path.
    pub(crate) fn output(&self) {
        self.update_with(|inner| inner.output());
    }
}

impl Drop for Stats {
    fn drop(&mut self) {
        self.output();
    }
}

impl StatsInner {
    fn new(output_path: String) -> Self {
        Self {
            output_path,
            methods_compiled_ok: 0,
            methods_compiled_err: 0,
            methods_fallback: 0,
            asm_retries: 0,
        }
    }

    /// Output these statistics to the appropriate output path.
    fn output(&self) {
        let json = self.to_json();
        if self.output_path == "-" {
            eprintln!("{json}");
        } else {
            fs::write(&self.output_path, json).ok();
        }
    }

    /// Turn these statistics into JSON. The output is guaranteed to be sorted by field name so
    /// that textual matching of the JSON string is possible.
    fn to_json(&self) -> String {
        let fields = [
            ("asm_retries".to_owned(), self.asm_retries.to_string()),
            (
                "methods_compiled_err".to_owned(),
                self.methods_compiled_err.to_string(),
            ),
            (
                "methods_compiled_ok".to_owned(),
                self.methods_compiled_ok.to_string(),
            ),
            (
                "methods_fallback".to_owned(),
                self.methods_fallback.to_string(),
            ),
        ];
        let mut s = String::from("{\n");
        s.push_str(
            &fields
                .iter()
                .map(|(k, v)| format!("    \"{k}\": {v}"))
                .collect::<Vec<_>>()
                .join(",\n"),
        );
        s.push_str("\n}");
        s
    }
}
