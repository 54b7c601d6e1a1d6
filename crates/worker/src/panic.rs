use std::any::Any;

/// Extracts the message carried by a panic payload, if it is a string.
pub fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		return Some((*msg).to_string());
	}
	payload.downcast_ref::<String>().cloned()
}

#[cfg(test)]
#[path = "panic_tests.rs"]
mod tests;
