/// Events emitted while a run is in progress.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    RunStart { total_steps: u64 },
    /// A block of steps was committed; `time` is the simulated time afterwards (ps).
    StepsCompleted { steps: u64, time: f64 },
    FrameRecorded { index: usize },
    RunFinish,

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}
