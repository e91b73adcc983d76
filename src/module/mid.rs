//! Module identities and the serial numbers used to mint them.

use crate::error::{Result, SpiderError};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

const MID_SEPARATOR: char = '|';

/// The capability a module provides to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Fetcher,
    Extractor,
    Processor,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 3] = [
        ModuleKind::Fetcher,
        ModuleKind::Extractor,
        ModuleKind::Processor,
    ];

    /// The single-letter tag used in serialized identities.
    pub fn letter(&self) -> char {
        match self {
            ModuleKind::Fetcher => 'F',
            ModuleKind::Extractor => 'E',
            ModuleKind::Processor => 'P',
        }
    }

    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "F" => Some(ModuleKind::Fetcher),
            "E" => Some(ModuleKind::Extractor),
            "P" => Some(ModuleKind::Processor),
            _ => None,
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Fetcher => f.write_str("fetcher"),
            ModuleKind::Extractor => f.write_str("extractor"),
            ModuleKind::Processor => f.write_str("processor"),
        }
    }
}

/// Identity of a module instance: kind, serial number and optional network
/// address, serialized as `"<letter>|<serial>|<addr>"` (e.g. `F|1|127.0.0.1:8080`
/// or `E|2|`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mid {
    kind: ModuleKind,
    serial: u64,
    addr: Option<SocketAddr>,
}

impl Mid {
    pub fn new(kind: ModuleKind, serial: u64, addr: Option<SocketAddr>) -> Self {
        Self { kind, serial, addr }
    }

    /// Mints an identity using the next serial from `generator`.
    pub fn generate(kind: ModuleKind, generator: &SerialGenerator, addr: Option<SocketAddr>) -> Self {
        Self::new(kind, generator.next(), addr)
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }
}

impl fmt::Display for Mid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}{}", self.kind.letter(), MID_SEPARATOR, self.serial, MID_SEPARATOR)?;
        if let Some(addr) = self.addr {
            write!(f, "{}", addr)?;
        }
        Ok(())
    }
}

impl FromStr for Mid {
    type Err = SpiderError;

    fn from_str(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.trim().split(MID_SEPARATOR).collect();
        if parts.len() != 3 {
            return Err(SpiderError::illegal_parameter(format!("invalid mid {:?}", raw)));
        }
        let kind = ModuleKind::from_letter(parts[0]).ok_or_else(|| {
            SpiderError::illegal_parameter(format!("invalid module letter {:?} in mid", parts[0]))
        })?;
        let serial = parts[1].parse::<u64>().map_err(|e| {
            SpiderError::illegal_parameter(format!("invalid serial {:?} in mid: {}", parts[1], e))
        })?;
        let addr = match parts[2] {
            "" => None,
            addr => Some(addr.parse::<SocketAddr>().map_err(|e| {
                SpiderError::illegal_parameter(format!("invalid address {:?} in mid: {}", addr, e))
            })?),
        };
        Ok(Self { kind, serial, addr })
    }
}

impl Serialize for Mid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug)]
struct SerialState {
    current: u64,
    cycle: u64,
}

/// Cyclic serial-number generator. Hands out `start..=max` and wraps back to
/// `start`, counting the wraps.
#[derive(Debug)]
pub struct SerialGenerator {
    start: u64,
    max: u64,
    state: Mutex<SerialState>,
}

impl SerialGenerator {
    /// `max == 0` means no upper bound other than `u64::MAX`.
    pub fn new(start: u64, max: u64) -> Self {
        let max = if max == 0 { u64::MAX } else { max };
        Self {
            start,
            max: max.max(start),
            state: Mutex::new(SerialState {
                current: start,
                cycle: 0,
            }),
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    /// Returns the current serial and advances to the next one.
    pub fn next(&self) -> u64 {
        let mut state = self.state.lock();
        let serial = state.current;
        if state.current == self.max {
            state.current = self.start;
            state.cycle += 1;
        } else {
            state.current += 1;
        }
        serial
    }

    /// The serial the next call to [`next`](Self::next) will return.
    pub fn current(&self) -> u64 {
        self.state.lock().current
    }

    pub fn cycle_count(&self) -> u64 {
        self.state.lock().cycle
    }
}

impl Default for SerialGenerator {
    fn default() -> Self {
        Self::new(1, 0)
    }
}
