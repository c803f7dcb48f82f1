pub mod http_layers;
pub mod identity;
#[allow(clippy::module_inception)]
pub mod server;
pub mod state;
pub mod websocket;

pub use http_layers::{RequestId, REQUEST_ID_HEADER};
pub use identity::{Identity, EXTERNAL_USER_ID_HEADER};
pub use server::{make_app, make_metrics_app, run_server};
pub use state::ServerState;
