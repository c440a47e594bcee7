use std::{fmt, str::FromStr};

/// Selects how a scan fans out over the cluster.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ScanType {
    /// One execution unit on every node matching the scan's node selector.
    #[default]
    Node,

    /// A single execution unit that inspects the cluster as a whole.
    Platform,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("scan type '{0}' is not valid")]
pub struct UnknownScanType(pub String);

// === impl ScanType ===

impl ScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Node => "Node",
            Self::Platform => "Platform",
        }
    }
}

impl FromStr for ScanType {
    type Err = UnknownScanType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Node" => Ok(Self::Node),
            "Platform" => Ok(Self::Platform),
            other => Err(UnknownScanType(other.to_string())),
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
