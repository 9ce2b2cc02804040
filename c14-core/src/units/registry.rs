//! Registry of the unit symbols found on carbon cycle model output.
//!
//! Every entry carries a factor converting the unit to the reference units
//! `kg`, `m` and `s`. Carbon mass units (`gC`, `PgC`, ...) are plain mass:
//! isotope bookkeeping never mixes carbon with CO2.

use super::dimension::Dimension;
use std::collections::HashMap;
use std::sync::LazyLock;

pub const SECONDS_PER_DAY: f64 = 24.0 * 3600.0;

/// Length of a year in days.
pub const DAYS_PER_YEAR: f64 = 365.25;

/// A month is a twelfth of a 365.25 day year.
pub const DAYS_PER_MONTH: f64 = DAYS_PER_YEAR / 12.0;

#[derive(Debug, Clone, PartialEq)]
pub struct UnitInfo {
    pub name: String,
    pub dimension: Dimension,
    /// Multiplier from this unit to the reference units.
    pub to_reference: f64,
}

impl UnitInfo {
    fn new(name: &str, dimension: Dimension, to_reference: f64) -> Self {
        Self {
            name: name.to_string(),
            dimension,
            to_reference,
        }
    }

    fn prefixed(&self, symbol: &str, factor: f64) -> Self {
        Self {
            name: symbol.to_string(),
            dimension: self.dimension,
            to_reference: self.to_reference * factor,
        }
    }
}

/// SI prefixes, longest symbol first so `da` wins over `d`.
static PREFIXES: &[(&str, f64)] = &[
    ("da", 1e1),
    ("E", 1e18),
    ("P", 1e15),
    ("T", 1e12),
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("h", 1e2),
    ("d", 1e-1),
    ("c", 1e-2),
    ("m", 1e-3),
    ("u", 1e-6),
    ("n", 1e-9),
];

pub static UNIT_REGISTRY: LazyLock<UnitRegistry> = LazyLock::new(UnitRegistry::new);

#[derive(Debug)]
pub struct UnitRegistry {
    units: HashMap<&'static str, UnitInfo>,
    aliases: HashMap<&'static str, &'static str>,
    /// Symbols that accept an SI prefix.
    prefixable: Vec<&'static str>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            units: HashMap::new(),
            aliases: HashMap::new(),
            prefixable: vec!["g", "gC", "t", "tC", "m", "s"],
        };
        registry.register_mass_units();
        registry.register_length_units();
        registry.register_time_units();
        registry
    }

    /// Looks up a symbol, resolving aliases and SI prefixes.
    pub fn lookup(&self, symbol: &str) -> Option<UnitInfo> {
        if let Some(info) = self.resolve(symbol) {
            return Some(info.clone());
        }
        PREFIXES.iter().find_map(|(prefix, factor)| {
            let base = symbol.strip_prefix(prefix)?;
            if !self.prefixable.contains(&base) {
                return None;
            }
            self.units
                .get(base)
                .map(|info| info.prefixed(symbol, *factor))
        })
    }

    fn resolve(&self, symbol: &str) -> Option<&UnitInfo> {
        self.units.get(symbol).or_else(|| {
            self.aliases
                .get(symbol)
                .and_then(|canonical| self.units.get(canonical))
        })
    }

    fn insert(&mut self, symbol: &'static str, dimension: Dimension, to_reference: f64) {
        self.units
            .insert(symbol, UnitInfo::new(symbol, dimension, to_reference));
    }

    fn register_mass_units(&mut self) {
        self.insert("g", Dimension::MASS, 1e-3);
        self.insert("t", Dimension::MASS, 1e3);
        self.insert("gC", Dimension::MASS, 1e-3);
        self.insert("tC", Dimension::MASS, 1e3);
        self.aliases.insert("C", "gC");
    }

    fn register_length_units(&mut self) {
        self.insert("m", Dimension::LENGTH, 1.0);
        self.insert("ha", Dimension::AREA, 1e4);
    }

    fn register_time_units(&mut self) {
        self.insert("s", Dimension::TIME, 1.0);
        self.insert("min", Dimension::TIME, 60.0);
        self.insert("h", Dimension::TIME, 3600.0);
        self.insert("day", Dimension::TIME, SECONDS_PER_DAY);
        self.insert("month", Dimension::TIME, DAYS_PER_MONTH * SECONDS_PER_DAY);
        self.insert("yr", Dimension::TIME, DAYS_PER_YEAR * SECONDS_PER_DAY);

        self.aliases.insert("d", "day");
        self.aliases.insert("days", "day");
        self.aliases.insert("hour", "h");
        self.aliases.insert("hours", "h");
        self.aliases.insert("mon", "month");
        self.aliases.insert("months", "month");
        self.aliases.insert("year", "yr");
        self.aliases.insert("years", "yr");
        self.aliases.insert("a", "yr");
    }
}
