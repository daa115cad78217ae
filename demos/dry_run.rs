use std::path::PathBuf;
use std::time::Instant;

use clipforge::engines::tone::ToneEngine;
use clipforge::runner::BatchRunner;
use clipforge::store::LocalStore;
use clipforge::{job, Generator};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let jobs = job::load_jobs(&PathBuf::from("demos/prompts.txt"))?;
    let store = LocalStore::new(std::env::temp_dir().join("clipforge-demo"));
    println!("Writing clips to {}", store.root().display());

    let start = Instant::now();
    let report = BatchRunner::new(&store, Generator::new(ToneEngine::new()), 0.526).run(&jobs);
    println!("First run finished in {:.2?}", start.elapsed());
    println!("{}", report.summary());

    // Everything is stored now, so the second pass only checks for existence.
    let rerun = BatchRunner::new(&store, Generator::new(ToneEngine::new()), 0.526).run(&jobs);
    println!(
        "Re-run: {} skipped, {} generated",
        rerun.skipped, rerun.generated
    );

    print!("{}", report.to_csv());
    Ok(())
}
