//! The implementation of the `DEXGEN_LOG_*` environment variables.

use std::{
    collections::HashSet,
    env,
    error::Error,
    fs::File,
    io::Write,
    path::PathBuf,
    sync::LazyLock,
};
use strum::{EnumCount, FromRepr};

/// How verbose should dexgen's normal logging be?
#[repr(u8)]
#[derive(Copy, Clone, Debug, EnumCount, FromRepr, PartialEq, PartialOrd)]
pub(crate) enum Verbosity {
    /// Disable logging entirely.
    Disabled,
    /// Log errors.
    Error,
    /// Log warnings.
    Warning,
    /// Log per-method compilation events (e.g. start/finish/fallback).
    MethodEvent,
}

pub(crate) struct Log {
    /// The requested [Verbosity] level for logging.
    level: Verbosity,
    /// The path to write to. A value of `None` should default to the platform specific standard
    /// for logging (e.g. stderr).
    path: Option<PathBuf>,
}

impl Log {
    pub(crate) fn new() -> Result<Self, Box<dyn Error>> {
        match env::var("DEXGEN_LOG") {
            Ok(s) => {
                let (path, level) = match s.split(':').collect::<Vec<_>>()[..] {
                    [path, level] => {
                        if path == "-" {
                            (None, level)
                        } else {
                            let path = PathBuf::from(path);
                            // If there's an existing log file, truncate (i.e. empty it), so that later
                            // appends to the log aren't appending to a previous log run.
                            File::create(&path).ok();
                            (Some(path), level)
                        }
                    }
                    [level] => (None, level),
                    [..] => {
                        return Err("DEXGEN_LOG must be of the format `[<path|->:]<level>".into());
                    }
                };
                let level = level
                    .parse::<u8>()
                    .map_err(|e| format!("Invalid DEXGEN_LOG level '{s}': {e}"))?;
                // This unwrap can only fail dynamically if we've got the types wrong statically
                // (i.e. it'll fail as soon as this code is executed for the first time).
                let max_level = u8::try_from(Verbosity::COUNT).unwrap() - 1;
                let level = Verbosity::from_repr(level)
                    .ok_or_else(|| format!("DEXGEN_LOG level {level} exceeds maximum {max_level}"))?;
                Ok(Self { path, level })
            }
            Err(_) => Ok(Self {
                path: None,
                level: Verbosity::Error,
            }),
        }
    }

    /// Log `msg` with the [Verbosity] level `verbosity`.
    ///
    /// # Panics
    ///
    /// If `level == Verbosity::Disabled`.
    pub(crate) fn log(&self, level: Verbosity, msg: &str) {
        if level <= self.level {
            let prefix = match level {
                Verbosity::Disabled => panic!(),
                Verbosity::Error => "dexgen-error",
                Verbosity::Warning => "dexgen-warning",
                Verbosity::MethodEvent => "dexgen-method-event",
            };
            match &self.path {
                Some(p) => {
                    let s = format!("{prefix}: {msg}\n");
                    File::options()
                        .append(true)
                        .open(p)
                        .map(|mut x| x.write(s.as_bytes()))
                        .ok();
                }
                None => {
                    eprintln!("{prefix}: {msg}");
                }
            }
        }
    }
}

/// Which intermediate representations can be dumped with `DEXGEN_LOG_IR`?
#[derive(Eq, Hash, PartialEq)]
pub(crate) enum IRPhase {
    /// The incoming MIR.
    Mir,
    /// The LIR before local optimisation.
    LirPre,
    /// The LIR after local optimisation and launch-pad scheduling.
    LirPost,
    /// The assembled layout, including instruction offsets.
    Asm,
}

static LOG_IR: LazyLock<Option<(String, HashSet<IRPhase>)>> = LazyLock::new(|| {
    let mut log_phases = HashSet::new();
    if let Ok(x) = env::var("DEXGEN_LOG_IR") {
        let (path, phases) = match x.split(':').collect::<Vec<_>>().as_slice() {
            [path, phases] => (*path, *phases),
            [phases] => ("-", *phases),
            _ => panic!("DEXGEN_LOG_IR must be of the format '[<path>:]<phase_1>[,...,<phase_n>]'"),
        };
        for x in phases.split(',') {
            log_phases.insert(IRPhase::from_str(x).unwrap());
        }
        if path != "-" {
            // If there's an existing log file, truncate (i.e. empty it), so that later
            // appends to the log aren't appending to a previous log run.
            File::create(path).ok();
        }
        Some((path.to_string(), log_phases))
    } else {
        None
    }
});

impl IRPhase {
    fn from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        match s {
            "mir" => Ok(Self::Mir),
            "lir-pre" => Ok(Self::LirPre),
            "lir-post" => Ok(Self::LirPost),
            "asm" => Ok(Self::Asm),
            _ => Err(format!("Invalid DEXGEN_LOG_IR value: {s}").into()),
        }
    }
}

pub(crate) fn should_log_ir(phase: IRPhase) -> bool {
    if let Some(true) = LOG_IR.as_ref().map(|(_, phases)| phases.contains(&phase)) {
        return true;
    }
    false
}

pub(crate) fn log_ir(s: &str) {
    match LOG_IR.as_ref().map(|(p, _)| p.as_str()) {
        Some("-") => eprint!("{s}"),
        Some(x) => {
            File::options()
                .append(true)
                .open(x)
                .map(|mut x| x.write(s.as_bytes()))
                .ok();
        }
        None => (),
    }
}
