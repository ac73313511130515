//! Offline consistency audit for an annotation directory.
//!
//! Usage: `sanity_check <annot_dir> [--repair]`
//!
//! Prints every invariant violation found. With `--repair`, dangling
//! group references are cleared and the touched records flushed.

use anyhow::{bail, Context, Result};

use point_matcher::Matching;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let annot_dir = args
        .next()
        .context("usage: sanity_check <annot_dir> [--repair]")?;
    let do_repair = match args.next().as_deref() {
        None => false,
        Some("--repair") => true,
        Some(other) => bail!("unknown argument: {other}"),
    };

    let mut matching = Matching::open(&annot_dir)
        .with_context(|| format!("opening annotation directory {annot_dir}"))?;
    println!(
        "{} views, {} groups",
        matching.view_count(),
        matching.group_count()
    );

    let mut report = matching.audit()?;
    for violation in &report.violations {
        println!("violation: {violation}");
    }

    if do_repair && !report.is_clean() {
        let cleared = matching.repair()?;
        matching.flush()?;
        println!("repaired {cleared} dangling group reference(s)");
        report = matching.audit()?;
    }

    if report.is_clean() {
        println!("structure is consistent");
        Ok(())
    } else {
        println!("{} violation(s) remain", report.violations.len());
        std::process::exit(1);
    }
}
