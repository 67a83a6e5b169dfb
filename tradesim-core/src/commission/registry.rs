use super::{CommissionInfo, CommissionScheme};
use std::collections::HashMap;

/// Instrument → commission scheme, with a fallback for unlisted instruments.
#[derive(Debug)]
pub struct CommissionRegistry {
    default: Box<dyn CommissionScheme>,
    schemes: HashMap<String, Box<dyn CommissionScheme>>,
}

impl CommissionRegistry {
    pub fn new(default: Box<dyn CommissionScheme>) -> Self {
        Self {
            default,
            schemes: HashMap::new(),
        }
    }

    pub fn set_default(&mut self, scheme: Box<dyn CommissionScheme>) {
        self.default = scheme;
    }

    pub fn insert(&mut self, instrument: impl Into<String>, scheme: Box<dyn CommissionScheme>) {
        self.schemes.insert(instrument.into(), scheme);
    }

    pub fn get(&self, instrument: &str) -> &dyn CommissionScheme {
        self.schemes
            .get(instrument)
            .map_or(self.default.as_ref(), |s| s.as_ref())
    }

    pub fn has_override(&self, instrument: &str) -> bool {
        self.schemes.contains_key(instrument)
    }
}

impl Default for CommissionRegistry {
    fn default() -> Self {
        Self::new(Box::new(CommissionInfo::default()))
    }
}
