//! Export an annotation directory as a pairwise match document.
//!
//! Usage: `export_matches <annot_dir> <output.json>`

use anyhow::{Context, Result};

use point_matcher::Matching;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let usage = "usage: export_matches <annot_dir> <output.json>";
    let annot_dir = args.next().context(usage)?;
    let out_path = args.next().context(usage)?;

    let mut matching = Matching::open(&annot_dir)
        .with_context(|| format!("opening annotation directory {annot_dir}"))?;
    println!(
        "{} views, {} groups",
        matching.view_count(),
        matching.group_count()
    );
    matching
        .export_to(&out_path)
        .with_context(|| format!("writing export document to {out_path}"))?;
    println!("exported to {out_path}");
    Ok(())
}
