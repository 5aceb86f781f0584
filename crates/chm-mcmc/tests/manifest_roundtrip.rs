mod common;

use chm_mcmc::manifest::{self, RunManifest};
use chm_mcmc::{kernel, RunConfig};
use common::observed_ctmc;
use tempfile::tempdir;

#[test]
fn run_directory_receives_trace_summary_and_manifest() {
    let dir = tempdir().unwrap();
    let run_dir = dir.path().join("run");
    let mut config = RunConfig::from_yaml_str(
        "generations: 12\nthinning: 3\nswap_interval: 2\nladder:\n  chains: 2\n\
         seed_policy:\n  master_seed: 77\n  label: smoke\n",
    )
    .unwrap();
    config.output.run_directory = Some(run_dir.clone());

    let scenario = dir.path().join("scenario.yaml");
    let report = kernel::run(&config, &observed_ctmc(), Some(&scenario)).unwrap();
    assert_eq!(report.trace.len(), 5);

    let trace_path = report.trace_path.clone().unwrap();
    let summary_path = report.summary_path.clone().unwrap();
    let manifest_path = report.manifest_path.clone().unwrap();
    assert!(trace_path.exists());
    assert!(summary_path.exists());

    let mut reader = csv::Reader::from_path(&trace_path).unwrap();
    let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(
        header,
        [
            "generation",
            "chain",
            "heat",
            "ln_posterior",
            "ln_likelihood",
            "clock_rate",
            "num_events"
        ]
    );
    let generations: Vec<String> = reader
        .records()
        .map(|record| record.unwrap()[0].to_string())
        .collect();
    assert_eq!(generations, ["0", "3", "6", "9", "12"]);

    let loaded = RunManifest::load(&manifest_path).unwrap();
    assert_eq!(loaded.config, config);
    assert_eq!(loaded.config_hash, manifest::config_hash(&config).unwrap());
    assert_eq!(loaded.master_seed, 77);
    assert_eq!(loaded.seed_label.as_deref(), Some("smoke"));
    assert_eq!(loaded.scenario, Some(scenario));

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary_path).unwrap()).unwrap();
    assert_eq!(summary["summary"]["generations"], 12);
}

#[test]
fn config_hash_tracks_content() {
    let base = RunConfig::default();
    let mut other = base.clone();
    other.swap_interval += 1;
    let hash = manifest::config_hash(&base).unwrap();
    assert_eq!(hash.len(), 64);
    assert_eq!(hash, manifest::config_hash(&base.clone()).unwrap());
    assert_ne!(hash, manifest::config_hash(&other).unwrap());
}

#[test]
fn missing_manifest_reports_read_error() {
    let dir = tempdir().unwrap();
    let err = RunManifest::load(&dir.path().join("absent.json")).unwrap_err();
    assert_eq!(err.info().code, "manifest-read");
}
