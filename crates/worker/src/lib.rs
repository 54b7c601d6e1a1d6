//! Host task primitives for the module runtime.
//!
//! Everything the module core waits on is expressed as a closure queued onto an
//! [`EventLoop`]: listener fan-out, publish notifications that settle promises, and
//! timeouts armed through [`Timer`]. The loop runs queued tasks one at a time in
//! enqueue order, which gives the rest of the workspace a single logical thread of
//! control on top of a tokio runtime.

mod class;
mod clock;
mod event_loop;
mod panic;
mod spawn;
mod timer;

pub use class::TaskClass;
pub use clock::IdClock;
pub use event_loop::EventLoop;
pub use panic::panic_message;
pub use spawn::{global_handle, runtime_handle, spawn, spawn_on};
pub use timer::Timer;
