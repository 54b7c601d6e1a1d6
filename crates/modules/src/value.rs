use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque value published under a module key.
///
/// Cloning shares the payload. A module exported without a payload carries the
/// empty sentinel, which still counts as published.
#[derive(Clone, Default)]
pub struct ModuleValue {
	payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl ModuleValue {
	/// The "no payload" sentinel.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Wraps a payload.
	pub fn new<T: Any + Send + Sync>(value: T) -> Self {
		Self {
			payload: Some(Arc::new(value)),
		}
	}

	/// Wraps an already shared payload.
	pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
		Self { payload: Some(value) }
	}

	pub fn is_empty(&self) -> bool {
		self.payload.is_none()
	}

	/// Borrows the payload as `T`, if it is one.
	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		self.payload.as_deref()?.downcast_ref::<T>()
	}

	/// Returns a shared handle to the payload as `T`, if it is one.
	pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
		Arc::clone(self.payload.as_ref()?).downcast::<T>().ok()
	}

	/// Returns `true` when both values share the same payload, or are both empty.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		match (&self.payload, &other.payload) {
			(Some(a), Some(b)) => Arc::ptr_eq(a, b),
			(None, None) => true,
			_ => false,
		}
	}
}

impl fmt::Debug for ModuleValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_empty() { f.write_str("ModuleValue(empty)") } else { f.write_str("ModuleValue(..)") }
	}
}
