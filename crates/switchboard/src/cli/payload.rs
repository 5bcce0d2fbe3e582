//! Reading input files into a payload.

use std::path::PathBuf;
use switchboard::{ContentBlock, PayloadSet};
use tracing::debug;

/// Read each file into one content block.
///
/// Earlier files get higher priority, so the last file is trimmed first.
pub async fn load_payload(files: &[PathBuf]) -> Result<PayloadSet, Box<dyn std::error::Error>> {
    let mut payload = PayloadSet::new();
    for (index, path) in files.iter().enumerate() {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        let priority = u32::try_from(files.len() - index).unwrap_or(u32::MAX);
        debug!(file = %path.display(), chars = content.len(), priority, "Loaded input file");
        payload.push(ContentBlock::new(path.display().to_string(), content).with_priority(priority));
    }
    Ok(payload)
}
