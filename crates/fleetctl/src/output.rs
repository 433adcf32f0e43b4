//! Terminal output for fleet summaries.

use fleet_shared::DeviceStatus;
use owo_colors::OwoColorize;

use crate::commands::FleetEntry;

const SERIAL_WIDTH: usize = 16;
const NAME_WIDTH: usize = 22;
const STATUS_WIDTH: usize = 8;
const SEEN_WIDTH: usize = 12;

/// Status label padded to the column width, colored when asked.
pub fn status_label(status: DeviceStatus, color: bool) -> String {
    let padded = format!("{:<width$}", status.as_str(), width = STATUS_WIDTH);
    if !color {
        return padded;
    }
    match status {
        DeviceStatus::Active => padded.bright_green().to_string(),
        DeviceStatus::Stale => padded.yellow().to_string(),
        DeviceStatus::Warning => padded.bright_yellow().to_string(),
        DeviceStatus::Error => padded.bright_red().to_string(),
        DeviceStatus::Missing => padded.dimmed().to_string(),
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let cut: String = s.chars().take(width.saturating_sub(1)).collect();
        format!("{}~", cut)
    }
}

/// One line per device, failures last, then a count line.
pub fn fleet_table(entries: &[FleetEntry], color: bool) -> String {
    let mut out = format!(
        "{:<sw$} {:<nw$} {:<stw$} {:<lw$} {}\n",
        "SERIAL",
        "NAME",
        "STATUS",
        "LAST SEEN",
        "IP",
        sw = SERIAL_WIDTH,
        nw = NAME_WIDTH,
        stw = STATUS_WIDTH,
        lw = SEEN_WIDTH,
    );

    let mut failures = Vec::new();
    let mut ok = 0usize;
    for entry in entries {
        match &entry.result {
            Ok(device) => {
                ok += 1;
                out.push_str(&format!(
                    "{:<sw$} {:<nw$} {} {:<lw$} {}\n",
                    truncate(&device.serial_number, SERIAL_WIDTH),
                    truncate(device.display_name(), NAME_WIDTH),
                    status_label(device.status, color),
                    device.last_seen_label,
                    device.primary_ip().unwrap_or("-"),
                    sw = SERIAL_WIDTH,
                    nw = NAME_WIDTH,
                    lw = SEEN_WIDTH,
                ));
            }
            Err(e) => failures.push((entry, e)),
        }
    }

    for (entry, e) in &failures {
        let name = entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let line = format!("{}: {:#}", name, e);
        if color {
            out.push_str(&format!("{}\n", line.bright_red()));
        } else {
            out.push_str(&format!("{}\n", line));
        }
    }

    out.push_str(&format!("{} devices, {} failed\n", ok, failures.len()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_status_label_is_padded() {
        assert_eq!(status_label(DeviceStatus::Stale, false), "stale   ");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("WS-ACC-014", 22), "WS-ACC-014");
        assert_eq!(truncate("abcdef", 4), "abc~");
    }
}
