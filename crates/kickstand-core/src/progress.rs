/// Highest value reported while a stage is still running. 100 is reserved for
/// the explicit completion signal.
pub const MAX_IN_FLIGHT_PERCENT: u8 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub transferred: u64,
    pub total: Option<u64>,
}

impl ProgressEvent {
    pub fn new(transferred: u64, total: Option<u64>) -> Self {
        Self { transferred, total }
    }

    /// `None` while the total size is unknown.
    pub fn percent(&self) -> Option<u8> {
        let total = self.total.filter(|total| *total > 0)?;
        let bounded = self.transferred.min(total);
        Some(((bounded * 100) / total) as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Continue,
    Abort,
}

pub trait ProgressSink {
    fn on_progress(&mut self, event: ProgressEvent) -> Transfer;
}

impl<F> ProgressSink for F
where
    F: FnMut(ProgressEvent) -> Transfer,
{
    fn on_progress(&mut self, event: ProgressEvent) -> Transfer {
        self(event)
    }
}

pub trait ProgressReporter {
    fn report(&mut self, percent: u8, label: &str) -> Transfer;

    fn complete(&mut self, _label: &str) {}

    fn close(&mut self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn report(&mut self, _percent: u8, _label: &str) -> Transfer {
        Transfer::Continue
    }
}

/// Turns raw byte events into distinct, non-decreasing percentages capped at
/// [`MAX_IN_FLIGHT_PERCENT`].
#[derive(Debug, Default, Clone)]
pub struct PercentTracker {
    last: Option<u8>,
}

impl PercentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }

    pub fn observe(&mut self, event: ProgressEvent) -> Option<u8> {
        let percent = event.percent()?.min(MAX_IN_FLIGHT_PERCENT);
        if self.last.is_some_and(|last| percent <= last) {
            return None;
        }
        self.last = Some(percent);
        Some(percent)
    }
}

/// Adapts a [`ProgressReporter`] into the byte-level sink the downloader feeds.
pub struct ReporterSink<'a> {
    reporter: &'a mut dyn ProgressReporter,
    label: &'a str,
    tracker: PercentTracker,
    aborted: bool,
}

impl<'a> ReporterSink<'a> {
    /// Shows `label` at 0% right away so the stage is visible before the first chunk.
    pub fn begin(reporter: &'a mut dyn ProgressReporter, label: &'a str) -> Self {
        let aborted = reporter.report(0, label) == Transfer::Abort;
        Self {
            reporter,
            label,
            tracker: PercentTracker { last: Some(0) },
            aborted,
        }
    }
}

impl ProgressSink for ReporterSink<'_> {
    fn on_progress(&mut self, event: ProgressEvent) -> Transfer {
        if self.aborted {
            return Transfer::Abort;
        }
        match self.tracker.observe(event) {
            Some(percent) => self.reporter.report(percent, self.label),
            None => Transfer::Continue,
        }
    }
}
