use std::sync::Arc;

use blockstore::{MemObjectStore, UserStore};
use tracing::info;

use crate::{check_fatal, BlockStoreArgs};

pub async fn run(args: BlockStoreArgs) {
    let config = crate::load_config(&args.config);

    // Driver injection point: deployments swap in their object store here.
    let bucket = Arc::new(MemObjectStore::new());

    let store = check_fatal(UserStore::new(config.block_store, bucket, None));
    check_fatal(store.start().await);
    info!(
        "block store server running on {:?}",
        store.local_addr()
    );

    check_fatal(tokio::signal::ctrl_c().await);
    info!("shutting down block store server");
    store.stop().await;
}
