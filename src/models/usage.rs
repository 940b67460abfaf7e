//! Per-interval traffic samples

/// Traffic measured for one principal during one collection interval.
///
/// `traffic` is a delta (uplink + downlink since the previous read), never a
/// cumulative counter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageSample {
    pub email: String,
    pub traffic: u64,
}

impl UsageSample {
    pub fn new(email: impl Into<String>, traffic: u64) -> Self {
        Self {
            email: email.into(),
            traffic,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.traffic == 0
    }
}
