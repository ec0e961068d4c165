//! Allow/deny tally over an audit log.

use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

use serde_json::Value;

use crate::Result;

/// Counts of allowed and denied records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustScore {
    /// Records whose `allowed` value is truthy.
    pub allow: u64,
    /// Every other well-formed record.
    pub deny: u64,
}

impl TrustScore {
    /// Records counted.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.allow + self.deny
    }

    /// Allow ratio in `[0, 1]`; zero for an empty log.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn score(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.allow as f64 / total as f64,
        }
    }

    /// Tally NDJSON content. Blank lines, unparseable lines and non-object
    /// values are skipped. `allowed` counts when truthy: `true`, a non-zero
    /// number, or a non-empty string, array or object.
    #[must_use]
    pub fn from_lines(content: &str) -> Self {
        let mut tally = Self::default();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let Ok(Value::Object(record)) = serde_json::from_str::<Value>(line) else {
                continue;
            };
            if record.get("allowed").is_some_and(truthy) {
                tally.allow += 1;
            } else {
                tally.deny += 1;
            }
        }
        tally
    }

    /// Tally the log at `path`. A missing file counts as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Self::from_lines(&String::from_utf8_lossy(&bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

impl fmt::Display for TrustScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[trust-score] allow={} deny={} score={:.4}",
            self.allow,
            self.deny,
            self.score()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_log_scores_zero() {
        let tally = TrustScore::from_lines("");
        assert_eq!(tally, TrustScore::default());
        assert!(tally.score().abs() < f64::EPSILON);
        assert_eq!(tally.to_string(), "[trust-score] allow=0 deny=0 score=0.0000");
    }

    #[test]
    fn counts_allowed_and_denied_records() {
        let content = concat!(
            "{\"allowed\":true,\"caller_id\":\"spiffe://trust/serviceB\"}\n",
            "{\"allowed\":false,\"reason\":\"opa_error: timeout\"}\n",
            "{\"allowed\":true}\n",
        );
        let tally = TrustScore::from_lines(content);
        assert_eq!(tally, TrustScore { allow: 2, deny: 1 });
        assert_eq!(tally.to_string(), "[trust-score] allow=2 deny=1 score=0.6667");
    }

    #[test]
    fn malformed_and_blank_lines_are_skipped() {
        let content = "\n{\"allowed\":true}\nnot json\n   \n[1,2]\n{\"reason\":\"\"}\n";
        let tally = TrustScore::from_lines(content);
        // A record without `allowed` is a deny
        assert_eq!(tally, TrustScore { allow: 1, deny: 1 });
    }

    #[test]
    fn allowed_is_judged_by_truthiness() {
        let content = concat!(
            "{\"allowed\":1}\n",
            "{\"allowed\":\"yes\"}\n",
            "{\"allowed\":0}\n",
            "{\"allowed\":\"\"}\n",
            "{\"allowed\":null}\n",
        );
        assert_eq!(TrustScore::from_lines(content), TrustScore { allow: 2, deny: 3 });
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tally = TrustScore::load(&dir.path().join("absent.jsonl")).await.unwrap();
        assert_eq!(tally.total(), 0);
    }

    #[tokio::test]
    async fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        std::fs::write(&path, "{\"allowed\":false}\n{\"allowed\":false}\n").unwrap();
        let tally = TrustScore::load(&path).await.unwrap();
        assert_eq!(tally, TrustScore { allow: 0, deny: 2 });
    }
}
