// 🏦 SwiftCode - one bank identifier code and its headquarters link
//
// Identity is the code itself. `is_headquarter` is never supplied from
// outside: it is always derived from the code.

use crate::classifier;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwiftCode {
    /// Primary key, case-sensitive
    pub swift_code: String,

    pub bank_name: String,

    /// ISO 3166-1 alpha-2, stored as provided
    #[serde(rename = "countryISO2")]
    pub country_iso2: String,

    pub country_name: String,

    pub address: String,

    pub is_headquarter: bool,

    /// Code of the headquarters this branch belongs to (association only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hq_swift_code: Option<String>,
}

impl SwiftCode {
    pub fn new(
        swift_code: String,
        bank_name: String,
        country_iso2: String,
        country_name: String,
        address: String,
    ) -> Self {
        let is_headquarter = classifier::is_headquarter(&swift_code);

        SwiftCode {
            swift_code,
            bank_name,
            country_iso2,
            country_name,
            address,
            is_headquarter,
            hq_swift_code: None,
        }
    }

    /// First 8 characters of the code, if it has that many
    pub fn prefix(&self) -> Option<&str> {
        classifier::institution_prefix(&self.swift_code)
    }

    /// Builder pattern: attach headquarters reference
    pub fn with_headquarters(mut self, hq_swift_code: impl Into<String>) -> Self {
        self.hq_swift_code = Some(hq_swift_code.into());
        self
    }

    pub fn is_branch(&self) -> bool {
        !self.is_headquarter
    }
}
