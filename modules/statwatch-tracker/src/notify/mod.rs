pub mod backend;
pub mod noop;
pub mod router;
pub mod webhook;
