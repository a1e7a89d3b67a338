pub mod config;
pub mod deletion;
pub mod error;
pub mod gateway;
pub mod http;
pub mod index;
pub mod multipart;
pub mod naming;
pub mod observability;
pub mod reconcile;
pub mod resolver;
pub mod tree;
pub mod upload;

pub use error::{TreeError, TreeResult};
pub use gateway::{GatewayError, ObjectStoreGateway};
pub use http::TreeHttpHandler;
pub use index::{HierarchyIndex, Node, NodeId, NodeKind};
pub use tree::FileTree;
