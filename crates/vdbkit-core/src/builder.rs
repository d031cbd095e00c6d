use tracing::debug;

/// External model-build step bracketing every synchronization pass.
///
/// `start` and `stop` are always called in pairs by [`BuildSession`]. They are
/// not expected to tolerate overlapping passes on the same archive.
pub trait ModelBuilder: Send + Sync {
    fn start(&self);
    fn stop(&self);
}

/// Builder that only logs the bracket.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingBuilder;

impl ModelBuilder for LoggingBuilder {
    fn start(&self) {
        debug!("model build started");
    }

    fn stop(&self) {
        debug!("model build stopped");
    }
}

/// Calls `start` on creation and `stop` when dropped, including on early
/// return or cancellation.
pub struct BuildSession<'a> {
    builder: &'a dyn ModelBuilder,
}

impl<'a> BuildSession<'a> {
    pub fn begin(builder: &'a dyn ModelBuilder) -> Self {
        builder.start();
        Self { builder }
    }
}

impl Drop for BuildSession<'_> {
    fn drop(&mut self) {
        self.builder.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBuilder;

    #[test]
    fn session_brackets_scope() {
        let builder = MockBuilder::new();
        {
            let _session = BuildSession::begin(&builder);
            assert_eq!(builder.starts(), 1);
            assert_eq!(builder.stops(), 0);
        }
        assert_eq!(builder.stops(), 1);
    }

    #[test]
    fn session_stops_on_early_return() {
        fn fails(builder: &dyn ModelBuilder) -> Result<(), ()> {
            let _session = BuildSession::begin(builder);
            Err(())
        }
        let builder = MockBuilder::new();
        assert!(fails(&builder).is_err());
        assert_eq!(builder.starts(), builder.stops());
    }
}
