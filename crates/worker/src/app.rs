//! Wiring: production adapters -> job queues -> handlers -> sweepers.

use std::sync::Arc;

use anyhow::Context;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use tracing::info;

use fleetpay_infra::{
    CARD_DELIVERY_NAMESPACE, LocalObjectStorage, PostgresEntityStore, RedisMetadataStore,
    RedisTimeIndexedQueue, STATEMENT_NAMESPACE,
};
use fleetpay_scheduler::{
    DeliveryStatusHandler, EntityStore, JobQueue, JsonStatementRenderer, ObjectStorage,
    StatementGenerationHandler, Sweeper, SweeperHandle, SystemClock,
};

use crate::config::WorkerConfig;

/// Both sweepers, built but not yet running.
pub struct Worker {
    delivery: Sweeper,
    statements: Sweeper,
}

/// Connect to Redis and Postgres and build the sweepers.
pub async fn build_worker(config: &WorkerConfig) -> anyhow::Result<Worker> {
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let entity_store = PostgresEntityStore::new(pool);
    entity_store
        .ensure_schema()
        .await
        .context("failed to prepare entity tables")?;
    let entities: Arc<dyn EntityStore> = Arc::new(entity_store);

    let client = redis::Client::open(config.redis_url.as_str()).context("invalid REDIS_URL")?;
    let conn = ConnectionManager::new(client)
        .await
        .context("failed to connect to Redis")?;

    let storage: Arc<dyn ObjectStorage> = Arc::new(match &config.storage_base_url {
        Some(base_url) => LocalObjectStorage::new(&config.storage_root, base_url.clone()),
        None => LocalObjectStorage::with_file_urls(&config.storage_root),
    });

    let delivery_jobs = job_queue(&conn, CARD_DELIVERY_NAMESPACE);
    let statement_jobs = job_queue(&conn, STATEMENT_NAMESPACE);
    let clock = Arc::new(SystemClock);

    let delivery = Sweeper::new(
        delivery_jobs,
        Arc::new(DeliveryStatusHandler::new(entities.clone())),
        clock.clone(),
        config.sweeper_config("card-delivery"),
    );
    let statements = Sweeper::new(
        statement_jobs.clone(),
        Arc::new(StatementGenerationHandler::new(
            entities,
            Arc::new(JsonStatementRenderer),
            storage,
            statement_jobs,
        )),
        clock,
        config.sweeper_config("statements"),
    );

    info!(
        storage_root = %config.storage_root.display(),
        interval_secs = config.sweep_interval.as_secs(),
        tolerance_secs = config.sweep_tolerance.as_secs(),
        "worker configured"
    );
    Ok(Worker {
        delivery,
        statements,
    })
}

fn job_queue(conn: &ConnectionManager, namespace: &str) -> JobQueue {
    JobQueue::new(
        Arc::new(RedisTimeIndexedQueue::from_connection(conn.clone(), namespace)),
        Arc::new(RedisMetadataStore::from_connection(conn.clone(), namespace)),
    )
}

impl Worker {
    /// Start both sweepers on the current runtime.
    pub fn start(self) -> RunningWorker {
        RunningWorker {
            delivery: self.delivery.spawn(),
            statements: self.statements.spawn(),
        }
    }
}

/// Handles of the running sweepers.
pub struct RunningWorker {
    delivery: SweeperHandle,
    statements: SweeperHandle,
}

impl RunningWorker {
    /// Stop both timers; in-flight sweeps run to completion.
    pub async fn shutdown(self) {
        info!("stopping sweepers");
        let (delivery, statements) =
            tokio::join!(self.delivery.shutdown(), self.statements.shutdown());
        info!(
            delivery_sweeps = delivery.sweeps,
            delivery_processed = delivery.processed,
            delivery_failed = delivery.failed,
            statement_sweeps = statements.sweeps,
            statement_processed = statements.processed,
            statement_failed = statements.failed,
            "worker stopped"
        );
    }
}
