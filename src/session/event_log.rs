// ABOUTME: Append-only per-run event log — the authoritative history for historical runs

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;

#[derive(Debug, Clone)]
pub struct EventRecord {
    pub timestamp: String,
    pub verb: String,
    pub details: String,
}

pub struct EventLog {
    runs_dir: PathBuf,
}

impl EventLog {
    pub fn new(base_dir: &std::path::Path) -> Self {
        Self {
            runs_dir: base_dir.join("runs"),
        }
    }

    fn path(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(run_id).join("events.log")
    }

    /// Appends `<ISO-minute-timestamp> <verb> [<details>]`. Writes are ordered by
    /// arrival; concurrent writers to the same run's log are not supported.
    pub fn append(&self, run_id: &str, verb: &str, details: &str) -> std::io::Result<()> {
        let run_dir = self.runs_dir.join(run_id);
        std::fs::create_dir_all(&run_dir)?;

        let timestamp = Utc::now().format("%Y-%m-%dT%H:%MZ").to_string();
        let line = if details.is_empty() {
            format!("{timestamp} {verb}\n")
        } else {
            format!("{timestamp} {verb} {details}\n")
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(run_id))?;
        file.write_all(line.as_bytes())
    }

    pub fn read(&self, run_id: &str) -> std::io::Result<Vec<EventRecord>> {
        let path = self.path(run_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(raw.lines().filter_map(parse_line).collect())
    }

    /// The authoritative config name for a run: the first `start` line's
    /// `config=` detail, falling back to the first dash-segment of the run ID.
    pub fn config_for_run(&self, run_id: &str) -> std::io::Result<String> {
        let records = self.read(run_id)?;
        for record in &records {
            if record.verb == "start" {
                if let Some(name) = extract_detail(&record.details, "config") {
                    return Ok(name);
                }
            }
        }
        Ok(run_id.split('-').next().unwrap_or(run_id).to_string())
    }
}

fn parse_line(line: &str) -> Option<EventRecord> {
    let mut parts = line.splitn(3, ' ');
    let timestamp = parts.next()?.to_string();
    let verb = parts.next()?.to_string();
    let details = parts.next().unwrap_or("").to_string();
    Some(EventRecord {
        timestamp,
        verb,
        details,
    })
}

fn extract_detail(details: &str, key: &str) -> Option<String> {
    details.split_whitespace().find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then(|| v.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn append_then_read_round_trips() {
        let tmp = TempDir::new().unwrap();
        let log = EventLog::new(tmp.path());
        log.append("run1", "start", "config=demo branch=scad-demo-t1-Jan01-0000")
            .unwrap();
        log.append("run1", "fetch", "repo=code branch=scad-demo-t1-Jan01-0000")
            .unwrap();

        let records = log.read("run1").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].verb, "start");
        assert_eq!(records[1].verb, "fetch");
    }

    #[test]
    fn config_for_run_falls_back_to_dash_segment() {
        let tmp = TempDir::new().unwrap();
        let log = EventLog::new(tmp.path());
        assert_eq!(
            log.config_for_run("demo-t1-Jan01-0000").unwrap(),
            "demo"
        );
    }

    #[test]
    fn config_for_run_prefers_start_event_detail() {
        let tmp = TempDir::new().unwrap();
        let log = EventLog::new(tmp.path());
        log.append("run1", "start", "config=demo branch=scad-demo-t1-Jan01-0000")
            .unwrap();
        assert_eq!(log.config_for_run("run1").unwrap(), "demo");
    }
}
