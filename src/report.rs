//! Incident reports and the submission rule.

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Europe::Paris;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::ReportLog;

/// Format of the `timestamp` column in the log.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The fixed set of incident categories offered by the form.
///
/// Variants serialize to the labels stored in the shared log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncidentType {
    #[serde(rename = "Retard")]
    Delay,
    #[serde(rename = "Suppression")]
    Cancellation,
    #[serde(rename = "Grève")]
    Strike,
    #[serde(rename = "Travaux")]
    Works,
    #[serde(rename = "Fermeture")]
    Closure,
    #[serde(rename = "Autre")]
    Other,
}

impl IncidentType {
    pub const ALL: [IncidentType; 6] = [
        IncidentType::Delay,
        IncidentType::Cancellation,
        IncidentType::Strike,
        IncidentType::Works,
        IncidentType::Closure,
        IncidentType::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            IncidentType::Delay => "Retard",
            IncidentType::Cancellation => "Suppression",
            IncidentType::Strike => "Grève",
            IncidentType::Works => "Travaux",
            IncidentType::Closure => "Fermeture",
            IncidentType::Other => "Autre",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.into_iter().find(|t| t.label() == label)
    }
}

impl std::fmt::Display for IncidentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One row of the shared log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub timestamp: String,
    pub station: String,
    #[serde(default)]
    pub line: Option<String>,
    pub incident_type: IncidentType,
    #[serde(default)]
    pub comment: String,
}

impl Report {
    /// The name used to place this report on the map: the station, or the
    /// line when no station was given.
    pub fn place_name(&self) -> Option<&str> {
        let station = self.station.trim();
        if !station.is_empty() {
            return Some(station);
        }
        self.line.as_deref().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// Raw form fields as posted by the browser.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportForm {
    #[serde(default)]
    pub station: String,
    #[serde(default)]
    pub line: String,
    #[serde(default)]
    pub incident_type: String,
    #[serde(default)]
    pub comment: String,
}

impl ReportForm {
    /// Builds the row to append, or `None` when a required field is missing.
    ///
    /// Required: a station or a line, and a recognised incident type.
    pub fn into_report(self, now: DateTime<Utc>) -> Option<Report> {
        let station = self.station.trim().to_string();
        let line = Some(self.line.trim().to_string()).filter(|l| !l.is_empty());
        if station.is_empty() && line.is_none() {
            return None;
        }
        let incident_type = IncidentType::from_label(&self.incident_type)?;

        Some(Report {
            timestamp: format_timestamp(now),
            station,
            line,
            incident_type,
            comment: self.comment.trim().to_string(),
        })
    }
}

/// Renders `now` in the Paris wall-clock zone.
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.with_timezone(&Paris).format(TIMESTAMP_FORMAT).to_string()
}

/// Appends the report when the form is complete.
///
/// Returns the stored report, or `Ok(None)` when required fields are missing
/// and nothing was written.
#[tracing::instrument(skip_all, fields(station = %form.station, incident_type = %form.incident_type))]
pub async fn submit(log: &dyn ReportLog, form: ReportForm) -> Result<Option<Report>> {
    let Some(report) = form.into_report(Utc::now()) else {
        debug!("Incomplete submission ignored");
        return Ok(None);
    };

    log.append(&report).await?;
    info!(timestamp = %report.timestamp, "Report appended");
    Ok(Some(report))
}
