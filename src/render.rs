use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::model::{DocumentSnapshot, FillSet, Rect};
use crate::util::{now_utc_string, write_json_pretty};

pub trait Renderer {
    fn render(&mut self, snapshot: &DocumentSnapshot, fill_set: &FillSet) -> Result<RenderReport>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderFailure {
    pub full_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderReport {
    pub written: usize,
    pub failures: Vec<RenderFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FillPlacement {
    pub full_id: String,
    pub page: u32,
    pub rect: Rect,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FillPlan {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source: Option<String>,
    pub placements: Vec<FillPlacement>,
}

pub fn build_fill_plan(
    snapshot: &DocumentSnapshot,
    fill_set: &FillSet,
) -> (Vec<FillPlacement>, Vec<RenderFailure>) {
    let mut placements = Vec::with_capacity(fill_set.len());
    let mut failures = Vec::new();

    for (full_id, value) in fill_set {
        let Some(region) = snapshot.region(full_id) else {
            failures.push(RenderFailure {
                full_id: full_id.clone(),
                reason: "region not present in document".to_string(),
            });
            continue;
        };

        if region.rect.is_degenerate() {
            failures.push(RenderFailure {
                full_id: full_id.clone(),
                reason: format!(
                    "region has no drawable area ({}x{})",
                    region.rect.width, region.rect.height
                ),
            });
            continue;
        }

        placements.push(FillPlacement {
            full_id: full_id.clone(),
            page: region.page,
            rect: region.rect,
            value: value.clone(),
        });
    }

    placements.sort_by(|a, b| {
        a.page
            .cmp(&b.page)
            .then(a.rect.top.total_cmp(&b.rect.top))
            .then(a.rect.left.total_cmp(&b.rect.left))
    });

    (placements, failures)
}

#[derive(Debug, Clone)]
pub struct FillPlanWriter {
    path: PathBuf,
}

impl FillPlanWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Renderer for FillPlanWriter {
    fn render(&mut self, snapshot: &DocumentSnapshot, fill_set: &FillSet) -> Result<RenderReport> {
        let (placements, failures) = build_fill_plan(snapshot, fill_set);

        for failure in &failures {
            warn!(region = %failure.full_id, reason = %failure.reason, "skipping region");
        }

        let plan = FillPlan {
            manifest_version: 1,
            generated_at: now_utc_string(),
            source: snapshot.source.clone(),
            placements,
        };
        write_json_pretty(&self.path, &plan)?;

        info!(
            path = %self.path.display(),
            written = plan.placements.len(),
            failed = failures.len(),
            "wrote fill plan"
        );

        Ok(RenderReport {
            written: plan.placements.len(),
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Region;

    fn snapshot() -> DocumentSnapshot {
        DocumentSnapshot {
            source: Some("ira_distribution.pdf".to_string()),
            regions: vec![
                Region::from_full_id("f.Last[0]", 1, Rect::new(0.5, 0.3, 0.2, 0.03)),
                Region::from_full_id("f.First[0]", 1, Rect::new(0.1, 0.3, 0.2, 0.03)),
                Region::from_full_id("f.Hidden[0]", 1, Rect::new(0.1, 0.5, 0.0, 0.0)),
                Region::from_full_id("f.Zip[0]", 2, Rect::new(0.1, 0.1, 0.1, 0.03)),
            ],
            ..DocumentSnapshot::default()
        }
    }

    fn fill_set(entries: &[(&str, &str)]) -> FillSet {
        entries
            .iter()
            .map(|(full_id, value)| (full_id.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn plan_skips_unknown_and_degenerate_regions() {
        let (placements, failures) = build_fill_plan(
            &snapshot(),
            &fill_set(&[
                ("f.Last[0]", "Doe"),
                ("f.First[0]", "Jane"),
                ("f.Hidden[0]", "x"),
                ("f.Missing[0]", "y"),
                ("f.Zip[0]", "10001"),
            ]),
        );

        let order = placements
            .iter()
            .map(|placement| placement.full_id.as_str())
            .collect::<Vec<&str>>();
        assert_eq!(order, vec!["f.First[0]", "f.Last[0]", "f.Zip[0]"]);

        let failed = failures
            .iter()
            .map(|failure| failure.full_id.as_str())
            .collect::<Vec<&str>>();
        assert_eq!(failed, vec!["f.Hidden[0]", "f.Missing[0]"]);
    }

    #[test]
    fn writer_reports_written_and_failed_regions() {
        let path = std::env::temp_dir()
            .join(format!("formmap-render-{}", std::process::id()))
            .join("fill_plan.json");
        let mut writer = FillPlanWriter::new(path.clone());

        let report = writer
            .render(
                &snapshot(),
                &fill_set(&[("f.First[0]", "Jane"), ("f.Missing[0]", "y")]),
            )
            .expect("fill plan written");

        assert_eq!(report.written, 1);
        assert_eq!(report.failures.len(), 1);

        let written: serde_json::Value =
            crate::util::read_json(writer.path()).expect("fill plan is json");
        assert_eq!(written["placements"][0]["value"], "Jane");
        assert_eq!(written["source"], "ira_distribution.pdf");

        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }
}
