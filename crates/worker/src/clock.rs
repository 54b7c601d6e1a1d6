use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id source shared between clones.
///
/// Ids start at 1; 0 is never handed out.
#[derive(Debug, Default, Clone)]
pub struct IdClock {
	next: Arc<AtomicU64>,
}

impl IdClock {
	/// Creates a new clock starting at id 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next id.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}
