use provas_backend::config::{get_config, init_config};
use provas_backend::database::pool::create_pool;
use provas_backend::services::queue_service::JobQueueService;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let queue = JobQueueService::new(pool.clone());

    for worker in 0..config.worker_count {
        let queue = queue.clone();
        tokio::spawn(async move {
            loop {
                match queue.run_once().await {
                    Ok(true) => {}
                    Ok(false) => {
                        tokio::time::sleep(Duration::from_millis(750)).await;
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, "Queue worker {} error", worker);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
    }
    info!("Started {} queue workers", config.worker_count);

    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create scheduler: {:?}", e))?;
    let grading_queue = queue.clone();
    let grading_tick = Job::new_async(config.grading_schedule.as_str(), move |_id, _sched| {
        let queue = grading_queue.clone();
        Box::pin(async move {
            if let Err(e) = queue.enqueue_grading().await {
                tracing::error!(error = ?e, "Failed to enqueue grading pass");
            }
        })
    })
    .map_err(|e| anyhow::anyhow!("Invalid grading schedule: {:?}", e))?;
    scheduler
        .add(grading_tick)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to schedule grading pass: {:?}", e))?;
    scheduler
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start scheduler: {:?}", e))?;
    info!("Grading pass scheduled with cadence {}", config.grading_schedule);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
