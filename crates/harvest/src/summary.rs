use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkFailureKind {
    /// Fetching or extracting the page failed
    Extraction,
    /// The extracted payload couldn't be written out
    Serialization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkFailure {
    pub index: usize,
    pub url: String,
    pub kind: LinkFailureKind,
    pub reason: String,
}

/// What a batch run did, link by link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub attempted: usize,
    pub written: usize,
    /// Failed links, in input order
    pub failures: Vec<LinkFailure>,
}

impl RunSummary {
    pub fn new(attempted: usize) -> Self {
        Self {
            attempted,
            written: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.written == self.attempted
    }

    pub(crate) fn record_written(&mut self) {
        self.written += 1;
    }

    pub(crate) fn record_failure(
        &mut self,
        index: usize,
        url: &str,
        kind: LinkFailureKind,
        reason: impl Into<String>,
    ) {
        let reason = reason.into();
        log::warn!("Link #{index} {url} failed ({kind:?}): {reason}");
        self.failures.push(LinkFailure {
            index,
            url: url.to_string(),
            kind,
            reason,
        });
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} links extracted", self.written, self.attempted)?;
        for failure in &self.failures {
            write!(
                f,
                "\n  #{} {} [{:?}] {}",
                failure.index, failure.url, failure.kind, failure.reason
            )?;
        }
        Ok(())
    }
}
