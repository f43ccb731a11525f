//! `loradeploy inspect`.

use anyhow::{Context, Result};
use bundle::BundleArchive;
use std::path::Path;

/// Print the entries and packaged adapters of an archive.
pub fn run(path: &Path) -> Result<()> {
    let archive =
        BundleArchive::open(path).with_context(|| format!("reading {}", path.display()))?;
    for entry in archive.entries() {
        println!("{entry}");
    }
    let adapters = archive.adapter_names();
    println!(
        "\n{} entries, {} adapter(s): {}",
        archive.entries().len(),
        adapters.len(),
        adapters.into_iter().collect::<Vec<_>>().join(", ")
    );
    Ok(())
}
