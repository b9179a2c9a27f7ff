use shellyfleet_domain::DiscoveredDevice;
use shellyfleet_sync::ImportPreview;

/// Render a list of discovered devices as human-readable text.
pub fn render_discovered(hits: &[DiscoveredDevice]) -> String {
    if hits.is_empty() {
        return "No devices found.".to_string();
    }
    let mut out = String::new();
    for hit in hits {
        out.push_str(&format!("{}  {}  ({:?})\n", hit.ip, hit.mac, hit.source));
    }
    out.push_str(&format!("\n{} device(s) found.", hits.len()));
    out
}

/// Render an import preview as human-readable text.
pub fn render_import_preview(preview: &ImportPreview) -> String {
    format!(
        "will create {}, update {}, delete {} (dry run, nothing applied)",
        preview.will_create, preview.will_update, preview.will_delete,
    )
}
