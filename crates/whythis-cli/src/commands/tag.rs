//! Tag command handlers

use anyhow::Result;

use whythis_core::Store;

use crate::output::Output;

/// List all tags with usage counts
pub fn list(store: &Store, output: &Output) -> Result<()> {
    let tags = store.tags()?;
    output.print_tags(&tags);
    Ok(())
}
