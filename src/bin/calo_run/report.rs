// Run Report: console summary and optional JSON dump of the run summary

use calo_engine::RunSummary;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub version: &'static str,
    pub prng: &'static str,
    pub seed: u64,
    pub summary: &'a RunSummary,
}

pub fn print_summary(summary: &RunSummary, layer_names: &[String]) {
    println!("  {:<12} {:>14}", "Layer", "Mean E (MeV)");
    println!("  {}", "-".repeat(28));
    for (j, mean) in summary.mean_layer_energy.iter().enumerate() {
        let name = layer_names
            .get(j)
            .map(String::as_str)
            .unwrap_or("?");
        println!("  {:<12} {:>14.4}", name, mean);
    }
    println!("  {}", "-".repeat(28));
    for t in &summary.tracker_hits {
        println!("  {:<12} {:>9} hits", t.tracker, t.hits);
    }
    println!(
        "\n  Events: {}  Hits: {}  Workers: {}",
        summary.events, summary.hits, summary.workers
    );
    for path in &summary.outputs {
        println!("  Output: {}", path.display());
    }
    println!();
}

pub fn write_report(path: &std::path::Path, report: &RunReport<'_>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    std::fs::write(path, json)
}
