//! Report types and institutions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Business report represented by a worksheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportType {
    Pjp,
    Collection,
    Projection,
    ProjectionVsActual,
    Outstanding,
    Unknown,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Pjp => "PJP",
            ReportType::Collection => "COLLECTION",
            ReportType::Projection => "PROJECTION",
            ReportType::ProjectionVsActual => "PROJECTION_VS_ACTUAL",
            ReportType::Outstanding => "OUTSTANDING",
            ReportType::Unknown => "UNKNOWN",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != ReportType::Unknown
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace(' ', "_").as_str() {
            "PJP" => Ok(ReportType::Pjp),
            "COLLECTION" => Ok(ReportType::Collection),
            "PROJECTION" => Ok(ReportType::Projection),
            "PROJECTION_VS_ACTUAL" => Ok(ReportType::ProjectionVsActual),
            "OUTSTANDING" => Ok(ReportType::Outstanding),
            "UNKNOWN" => Ok(ReportType::Unknown),
            other => Err(format!("unknown report type: {}", other)),
        }
    }
}

/// Counterpart organization whose reports are ingested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Institution {
    #[serde(rename = "JSB")]
    Jsb,
    #[serde(rename = "JUD")]
    Jud,
}

impl Institution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Institution::Jsb => "JSB",
            Institution::Jud => "JUD",
        }
    }

    /// Storage form used in natural keys; unknown institutions store as ''
    pub fn key(institution: Option<Institution>) -> &'static str {
        institution.map(|i| i.as_str()).unwrap_or("")
    }

    pub fn from_key(key: &str) -> Option<Institution> {
        match key {
            "JSB" => Some(Institution::Jsb),
            "JUD" => Some(Institution::Jud),
            _ => None,
        }
    }
}

impl fmt::Display for Institution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one worksheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedSheet {
    pub report_type: ReportType,
    pub institution: Option<Institution>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_type_round_trips_through_str() {
        for t in [
            ReportType::Pjp,
            ReportType::Collection,
            ReportType::Projection,
            ReportType::ProjectionVsActual,
            ReportType::Outstanding,
        ] {
            assert_eq!(t.as_str().parse::<ReportType>().unwrap(), t);
        }
        assert_eq!("projection vs actual".parse::<ReportType>().unwrap(), ReportType::ProjectionVsActual);
    }

    #[test]
    fn test_institution_key() {
        assert_eq!(Institution::key(Some(Institution::Jud)), "JUD");
        assert_eq!(Institution::key(None), "");
        assert_eq!(Institution::from_key(""), None);
    }
}
