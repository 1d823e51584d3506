//! Storage primitives shared by the backend stores.

mod atomic_json;

pub use atomic_json::AtomicJsonFile;
