use async_trait::async_trait;
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::{Duration, sleep};
use tracing::info;

use slowq_core::observability;
use slowq_core::{
    AppName, BoxError, Document, EngineConfig, InitBlock, Initializer, JobManager, JobOutcome,
    PollOutcome, Processor,
};

/// Submit one bounce report to the broadside app and poll until it is done.
#[derive(Debug, Parser)]
#[command(name = "slowq", version)]
struct Args {
    /// Worker count (defaults to SLOWQ_WORKERS or 4)
    #[arg(long)]
    workers: Option<usize>,

    /// Delay between polls
    #[arg(long, default_value_t = 100)]
    poll_interval_ms: u64,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[arg(long, default_value_t = 123)]
    user_id: u64,

    #[arg(long, default_value = "a@b.com")]
    from_email: String,
}

/// 検索バックエンドのモック（本番はコネクションを持つ）
struct SearchClient {
    open: AtomicBool,
}

impl SearchClient {
    fn connect() -> Self {
        Self {
            open: AtomicBool::new(true),
        }
    }

    fn bounces_for(&self, user_id: u64, from_email: &str) -> Result<Vec<String>, BoxError> {
        if !self.open.load(Ordering::Acquire) {
            return Err("search client closed".into());
        }
        Ok(vec![format!("{from_email}: mailbox full (user {user_id})")])
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

/// broadside の InitBlock: app ごとに 1 回だけ作られ、全ジョブで共有される
struct BroadsideBlock {
    search: SearchClient,
}

impl InitBlock for BroadsideBlock {
    fn close(&self) -> Result<(), BoxError> {
        self.search.close();
        info!("broadside search client closed");
        Ok(())
    }
}

struct BroadsideInitializer;

#[async_trait]
impl Initializer for BroadsideInitializer {
    type Block = BroadsideBlock;

    async fn init(&self, app: &AppName) -> Result<BroadsideBlock, BoxError> {
        info!(%app, "connecting search client");
        Ok(BroadsideBlock {
            search: SearchClient::connect(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportContext {
    user_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportInput {
    from_email: String,
}

struct BounceReportProcessor;

#[async_trait]
impl Processor for BounceReportProcessor {
    type Block = BroadsideBlock;

    async fn execute(
        &self,
        block: &BroadsideBlock,
        context: &Document,
        input: &Document,
    ) -> Result<JobOutcome, BoxError> {
        let ctx: ReportContext = serde_json::from_value(context.clone())?;
        let input: ReportInput = serde_json::from_value(input.clone())?;

        // 遅いクエリのつもり
        sleep(Duration::from_millis(200)).await;
        let bounces = block.search.bounces_for(ctx.user_id, &input.from_email)?;
        info!(user_id = ctx.user_id, bounces = bounces.len(), "bounce report built");

        Ok(JobOutcome::success(json!({
            "report": format!("{} {}", ctx.user_id, input.from_email)
        })))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    observability::init(args.json_logs);

    let mut config = EngineConfig::from_env()?;
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }

    // (A) 能力の登録
    let manager = Arc::new(JobManager::in_memory(config));
    manager.register_initializer("broadside", BroadsideInitializer)?;
    manager.register_processor("broadside", "bouncerpt", BounceReportProcessor)?;

    // (B) ワーカー起動
    let workers = manager.spawn_workers();

    // (C) 投入してすぐ request id を受け取る
    let request_id = manager
        .submit(
            "broadside",
            "bouncerpt",
            json!({ "userId": args.user_id }),
            json!({ "fromEmail": args.from_email }),
        )
        .await?;
    println!("submitted: {request_id}");

    // (D) 終わるまでポーリング
    let poll_interval = Duration::from_millis(args.poll_interval_ms);
    let outcome = loop {
        match manager.poll(request_id).await? {
            PollOutcome::TryLater => sleep(poll_interval).await,
            done => break done,
        }
    };
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    println!("counts: {:?}", manager.counts().await?);

    // (E) ワーカーを止めて InitBlock を閉じる
    let closed = manager.shutdown(workers).await?;
    info!(closed, "shutdown complete");
    Ok(())
}
