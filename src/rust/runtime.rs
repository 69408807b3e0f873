use rayon::{ThreadPool, ThreadPoolBuilder};

/// Thread settings for training.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Worker threads for forest fitting. 0 lets rayon decide.
    pub threads: usize,
}

impl RuntimeConfig {
    pub fn with_threads(threads: usize) -> Self {
        Self { threads }
    }
}

/// Builds the pool that training work is installed into.
pub fn create_thread_pool(config: &RuntimeConfig) -> Result<ThreadPool, rayon::ThreadPoolBuildError> {
    let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("triage-train-{i}"));

    // Configure threading
    if config.threads > 0 {
        builder = builder.num_threads(config.threads);
    }

    builder.build()
}
