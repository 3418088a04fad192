use std::path::Path;

use serde_json::json;
use strand_core::capability::Capability;
use strand_core::job::JobRecord;
use strand_store::ResultStore;
use tempfile::TempDir;

/// A store rooted in a fresh temporary directory. Keep the `TempDir`
/// alive for the duration of the test.
pub fn temp_store() -> (TempDir, ResultStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ResultStore::new(dir.path());
    (dir, store)
}

/// A minimal PDB body comfortably above the minimum structure size.
pub fn sample_pdb() -> String {
    let mut pdb = String::new();
    for i in 1..=4 {
        pdb.push_str(&format!(
            "ATOM  {i:>5}  CA  ALA A{i:>4}      11.104  13.207  {:>6.3}  1.00  0.00           C\n",
            i as f64
        ));
    }
    pdb.push_str("END\n");
    pdb
}

pub fn queued_record(job_id: &str, capability: Capability, owner: &str) -> JobRecord {
    JobRecord::queued(job_id, capability, owner, json!({}), None)
}

/// Hand-write a job directory the way an older deployment would have:
/// just a payload and a primary artifact, no metadata.
pub fn write_bare_job(dir: &Path, artifact_file: &str, artifact: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("result.json"), r#"{"pdb":"legacy"}"#).unwrap();
    std::fs::write(dir.join(artifact_file), artifact).unwrap();
}
