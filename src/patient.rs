use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

pub const MAX_DIGITS: usize = 10;

/// 患者・検査コード（1〜10桁の数字）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PatientCode(String);

impl PatientCode {
    pub fn parse(input: &str) -> Result<Self, MonitorError> {
        let code = input.trim();
        let valid = (1..=MAX_DIGITS).contains(&code.len())
            && code.bytes().all(|b| b.is_ascii_digit());
        if valid {
            Ok(Self(code.to_string()))
        } else {
            Err(MonitorError::InvalidPatientCode(input.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PatientCode {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PatientCode {
    type Error = MonitorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PatientCode> for String {
    fn from(code: PatientCode) -> Self {
        code.0
    }
}

impl fmt::Display for PatientCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
