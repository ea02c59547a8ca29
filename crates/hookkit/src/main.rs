use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hookkit::config::{load_database_config, Settings};
use hookkit::queue::{ExecutionMode, QueueConfig, RunOptions, TaskQueue};
use hookkit::storage::memory::MemoryEngine;
use hookkit::storage::{
    ConnectionRegistry, DatabaseConfig, DatabaseController, StorageBinding, TableSchema,
    TransactionMode,
};
use rand::Rng;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// hookkit - Storage controllers and a priority task queue
#[derive(Parser, Debug)]
#[command(name = "hookkit")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a schema against the in-memory engine and exercise it
    Storage {
        /// JSON schema file (uses a built-in demo schema when omitted)
        #[arg(long, short)]
        schema: Option<PathBuf>,
    },
    /// Push simulated tasks with random priorities through the queue
    Queue {
        /// Number of tasks to submit
        #[arg(long, short, default_value = "8")]
        tasks: u32,

        /// Execution mode: sequential or parallel
        #[arg(long, short, env = "HOOKKIT_QUEUE_MODE")]
        mode: Option<String>,

        /// Tasks running at once in parallel mode
        #[arg(long, short, env = "HOOKKIT_QUEUE_CONCURRENCY")]
        concurrency: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hookkit=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env();

    match cli.command {
        Command::Storage { schema } => run_storage(schema, &settings).await,
        Command::Queue {
            tasks,
            mode,
            concurrency,
        } => {
            let config = queue_config(mode.as_deref(), concurrency, &settings)?;
            run_queue(tasks, config).await
        }
    }
}

fn queue_config(
    mode: Option<&str>,
    concurrency: Option<usize>,
    settings: &Settings,
) -> Result<QueueConfig> {
    let mode = match mode {
        Some(mode) => mode.parse::<ExecutionMode>()?,
        None => settings.queue_mode,
    };
    Ok(match (mode, concurrency) {
        (ExecutionMode::Parallel { .. }, Some(concurrency)) => QueueConfig::parallel(concurrency)?,
        (mode, _) => QueueConfig { mode },
    })
}

fn demo_schema() -> DatabaseConfig {
    DatabaseConfig::new("hookkit-demo", 1)
        .with_table("users", TableSchema::new("id").with_index("email"))
        .with_table("logs", TableSchema::new("seq").with_auto_increment())
}

async fn run_storage(schema: Option<PathBuf>, settings: &Settings) -> Result<()> {
    let config = match &schema {
        Some(path) => load_database_config(path)?,
        None => demo_schema(),
    };

    let engine = Arc::new(MemoryEngine::with_change_capacity(
        settings.change_channel_capacity,
    ));
    let binding = StorageBinding::new(ConnectionRegistry::new(engine));
    binding.configure(&config);
    let db = binding.ready().await?;

    tracing::info!(
        database = %db.name(),
        version = db.version(),
        tables = ?db.table_names(),
        "Database ready"
    );

    let mut changes = db.subscribe();
    let listener = tokio::spawn(async move {
        while let Ok(event) = changes.recv().await {
            tracing::info!(
                table = %event.table,
                kind = ?event.kind,
                key = ?event.key,
                "Change committed"
            );
        }
    });

    if schema.is_none() {
        walkthrough(&db).await?;
    } else {
        for table in db.table_names() {
            let count = db.table(table.as_str()).count().await?;
            tracing::info!(table = %table, indexes = ?db.index_names(&table), count, "Table");
        }
    }

    // Let the listener drain the last events before exiting.
    tokio::task::yield_now().await;
    binding.teardown();
    listener.abort();
    Ok(())
}

async fn walkthrough(db: &DatabaseController) -> Result<()> {
    let users = db.table("users");
    let logs = db.table("logs");

    users
        .bulk_insert(vec![
            json!({"id": 1, "name": "Ada", "email": "ada@example.com", "active": true}),
            json!({"id": 2, "name": "Brian", "email": "brian@example.com", "active": false}),
            json!({"id": 3, "name": "Chen", "email": "chen@example.com", "active": true}),
        ])
        .await?;

    users.update(2, json!({"active": true})).await?;
    users
        .upsert(json!({"id": 4, "name": "Dana", "email": "dana@example.com", "active": false}))
        .await?;

    if let Err(error) = users.insert(json!({"id": 1, "name": "Duplicate"})).await {
        tracing::warn!(error = %error, "Insert rejected");
    }

    let active = users.query(|user| user["active"] == json!(true)).await?;
    tracing::info!(active = active.len(), total = users.count().await?, "Queried users");

    // Delete a user and log it atomically.
    db.transaction(&["users", "logs"], TransactionMode::ReadWrite, |tx| async move {
        tx.table("users").delete(4).await?;
        tx.table("logs")
            .insert(json!({"message": "removed user 4"}))
            .await?;
        Ok(())
    })
    .await?;

    tracing::info!(
        users = users.count().await?,
        logs = logs.count().await?,
        user_4_exists = users.exists(4).await?,
        "Walkthrough finished"
    );
    Ok(())
}

async fn run_queue(tasks: u32, config: QueueConfig) -> Result<()> {
    tracing::info!(mode = ?config.mode, tasks, "Starting queue demo");

    let queue: TaskQueue<u32, u32, String> = TaskQueue::new(config, |id: u32| {
        let delay = Duration::from_millis(rand::rng().random_range(5..50));
        async move {
            tracing::info!(task = id, "Running");
            tokio::time::sleep(delay).await;
            if id % 5 == 4 {
                Err(format!("task {id} failed"))
            } else {
                Ok(id * id)
            }
        }
    });

    let submissions: Vec<_> = {
        let mut rng = rand::rng();
        (0..tasks)
            .map(|id| (id, RunOptions::with_priority(rng.random_range(0..5))))
            .collect()
    };
    let handles = queue.run_all(submissions.iter().copied());

    for ((id, options), handle) in submissions.into_iter().zip(handles) {
        let priority = options.priority;
        match handle.await {
            Ok(value) => tracing::info!(task = id, priority, value, "Task succeeded"),
            Err(error) => tracing::warn!(task = id, priority, error = %error, "Task failed"),
        }
    }

    let snapshot = queue.snapshot();
    tracing::info!(
        last_result = ?snapshot.last_result,
        last_error = ?snapshot.last_error,
        "Queue drained"
    );
    Ok(())
}
