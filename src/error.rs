// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use crate::gateway::GatewayError;
use crate::index::IndexError;
use thiserror::Error;

/// Errors surfaced by the hierarchy engine.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("store failure: {0}")]
    StoreFailure(#[from] GatewayError),
    #[error("index failure: {0}")]
    Index(String),
    /// An ancestor walk ran past the configured depth limit.
    #[error("corrupt hierarchy: {0}")]
    Corrupt(String),
}

impl From<IndexError> for TreeError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::NodeNotFound(id) => TreeError::NotFound(format!("node {id}")),
            IndexError::DuplicateKey { bucket, key } => {
                TreeError::Conflict(format!("key already indexed: {bucket}/{key}"))
            }
            IndexError::InvalidNode(msg) => TreeError::InvalidArgument(msg),
            IndexError::Internal(msg) => TreeError::Index(msg),
        }
    }
}

pub type TreeResult<T> = Result<T, TreeError>;
