use std::io::Write;

use serde::Serialize;

use super::media::MediaHost;
use super::repository::{
    ApplicationFilter, ApplicationStore, ApplicationSummary, PageRequest, MAX_PAGE_SIZE,
};
use super::service::{AdmissionError, AdmissionService};

#[derive(Debug)]
pub enum ExportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Admission(AdmissionError),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Io(err) => write!(f, "failed to write export: {}", err),
            ExportError::Csv(err) => write!(f, "failed to encode CSV row: {}", err),
            ExportError::Admission(err) => write!(f, "could not read applications: {}", err),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Io(err) => Some(err),
            ExportError::Csv(err) => Some(err),
            ExportError::Admission(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for ExportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<AdmissionError> for ExportError {
    fn from(err: AdmissionError) -> Self {
        Self::Admission(err)
    }
}

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    #[serde(rename = "Application ID")]
    id: &'a str,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Email")]
    email: &'a str,
    #[serde(rename = "Phone")]
    phone: &'a str,
    #[serde(rename = "Program")]
    program: &'a str,
    #[serde(rename = "Class")]
    class_level: &'a str,
    #[serde(rename = "Transaction ID")]
    transaction_id: &'a str,
    #[serde(rename = "Status")]
    status: &'a str,
    #[serde(rename = "Submitted At")]
    submitted_at: String,
}

impl<'a> From<&'a ApplicationSummary> for ExportRow<'a> {
    fn from(summary: &'a ApplicationSummary) -> Self {
        Self {
            id: &summary.id.0,
            name: &summary.name,
            email: summary.email.as_deref().unwrap_or_default(),
            phone: summary.phone.as_deref().unwrap_or_default(),
            program: summary.program.label(),
            class_level: summary.class_level.label(),
            transaction_id: &summary.transaction_id,
            status: summary.status.label(),
            submitted_at: summary.submitted_at.to_rfc3339(),
        }
    }
}

/// Write summaries as CSV with a header row.
pub fn write_summaries<W: Write>(writer: W, rows: &[ApplicationSummary]) -> Result<(), ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(ExportRow::from(row))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Page through every application matching `filter`, newest first, and write
/// them as CSV. Returns the number of rows written.
pub async fn export_applications<S, M, W>(
    service: &AdmissionService<S, M>,
    filter: ApplicationFilter,
    writer: W,
) -> Result<usize, ExportError>
where
    S: ApplicationStore + 'static,
    M: MediaHost + 'static,
    W: Write,
{
    let mut rows = Vec::new();
    let mut page_number = 1;
    loop {
        let page = service
            .list(filter, PageRequest::new(Some(page_number), Some(MAX_PAGE_SIZE)))
            .await?;
        let fetched = page.applications.len();
        rows.extend(page.applications);
        if fetched == 0 || u64::from(page_number) >= page.total_pages {
            break;
        }
        page_number += 1;
    }

    write_summaries(writer, &rows)?;
    Ok(rows.len())
}
