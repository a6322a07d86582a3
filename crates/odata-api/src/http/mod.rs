//! HTTP endpoints.
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `{root}/$batch` | POST | Multipart batch of requests and changesets |
//! | `{root}/` | GET | Service document |
//! | `{root}/{resource path}` | any | Single OData request |
//! | `/health` | GET | Liveness probe |
//! | `/ready` | GET | Storage readiness probe |
//! | `/metrics` | GET | Prometheus metrics |

pub mod routes;
pub mod state;

pub use routes::{
    create_router, create_router_with_body_limit, create_router_with_observability,
    create_router_with_observability_and_limit, DEFAULT_BODY_LIMIT, DEFAULT_METRICS_PATH,
};
pub use state::AppState;
