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

use anyhow::Context;
use clap::Parser;
use s3tree::config::Config;
use s3tree::gateway::in_memory::{InMemoryGateway, SigningConfig};
use s3tree::index::in_memory::InMemoryIndex;
use s3tree::observability::tracing_setup;
use s3tree::{FileTree, TreeHttpHandler};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "s3tree")]
#[command(about = "Folder hierarchy over a bucket+key object store, served as a JSON API", long_about = None)]
struct Args {
    /// Address to listen on (e.g., 0.0.0.0:9100)
    #[arg(short, long)]
    listen: Option<String>,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_setup::init_tracing_from_env();

    let args = Args::parse();

    let cfg = if Path::new(&args.config).exists() {
        Config::from_path(&args.config)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("loading {}", args.config))?
    } else {
        tracing::warn!(path = %args.config, "config file not found, using defaults");
        Config::default()
    };

    let addr: SocketAddr = args
        .listen
        .as_ref()
        .unwrap_or(&cfg.listen_addr)
        .parse()
        .context("invalid listen address")?;

    let gateway = InMemoryGateway::new()
        .with_page_size(cfg.store.list_page_size)
        .with_signing(SigningConfig::from(&cfg.store));
    gateway.create_bucket(&cfg.store.bucket).await?;
    let index = InMemoryIndex::new();

    tracing::info!(
        bucket = %cfg.store.bucket,
        max_depth = cfg.hierarchy.max_depth,
        use_original_name = cfg.upload.use_original_name,
        overwrite = cfg.upload.overwrite,
        "in-memory store and index ready"
    );

    let tree = FileTree::new(Arc::new(gateway), Arc::new(index), &cfg);
    let server = TreeHttpHandler::new(tree);

    tokio::select! {
        r = server.serve(addr) => {
            if let Err(e) = r {
                tracing::error!("server exited with error: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("ctrl-c received, shutting down");
        }
    }

    Ok(())
}
