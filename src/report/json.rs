use anyhow::Result;
use serde::Serialize;

use license_autoid::engine::RunReport;
use license_autoid::models::{IdentificationRecord, ProjectHandle};

#[derive(Serialize)]
struct JsonReport<'a> {
    project: &'a ProjectHandle,
    strategy: &'a str,
    #[serde(flatten)]
    run: &'a RunReport,
    identifications: &'a [IdentificationRecord],
}

pub fn render(
    project: &ProjectHandle,
    strategy: &str,
    records: &[IdentificationRecord],
    report: &RunReport,
) -> Result<()> {
    let doc = JsonReport {
        project,
        strategy,
        run: report,
        identifications: records,
    };
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}
