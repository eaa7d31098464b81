//! Lightweight operation tracing.

use std::time::Instant;

/// An RAII span over one facade operation: logs at entry and logs the
/// elapsed time when dropped, including on early returns.
pub(crate) struct Span {
    name: &'static str,
    started: Instant,
}

impl Span {
    pub(crate) fn enter(name: &'static str) -> Self {
        log::trace!("{name}: enter");
        Self {
            name,
            started: Instant::now(),
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        log::trace!("{}: exit after {:?}", self.name, self.started.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_survives_early_return() {
        fn inner() -> Result<(), ()> {
            let _span = Span::enter("test-op");
            Err(())
        }
        assert!(inner().is_err());
    }
}
