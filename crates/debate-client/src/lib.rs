pub mod http;
pub mod sse;

pub mod mock;

pub use http::HttpDebateApi;
pub use mock::MockDebateApi;
