use std::time::Duration;

use super::error::AcquisitionError;
use crate::config::DownloadSection;

/// Outer retry around a whole download; the downloader retries fragments itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay_range: [u32; 2],
}

impl RetryPolicy {
    /// Linear interpolation from `delay_range[0]` on the first retry to
    /// `delay_range[1]` on the last.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        if self.attempts <= 1 {
            return Duration::from_secs(self.delay_range[0] as u64);
        }
        let min = self.delay_range[0] as f64;
        let max = self.delay_range[1] as f64;
        let ratio = (attempt.min(self.attempts - 1) as f64) / ((self.attempts - 1) as f64);
        let seconds = min + (max - min) * ratio;
        Duration::from_secs(seconds.round() as u64)
    }
}

impl TryFrom<&DownloadSection> for RetryPolicy {
    type Error = AcquisitionError;

    fn try_from(section: &DownloadSection) -> Result<Self, Self::Error> {
        if section.attempts == 0 {
            return Err(AcquisitionError::InvalidPolicy(
                "attempts must be greater than zero".to_string(),
            ));
        }
        let [low, high] = section.retry_delay_seconds;
        Ok(Self {
            attempts: section.attempts,
            delay_range: [low.min(high), low.max(high)],
        })
    }
}
